pub mod digester;
pub use digester::{DigestConfig, Digester, DigesterState, FlushOutcome};

pub mod monitor;
pub use monitor::{CycleError, CycleReport, Monitor};
