mod check;
mod init;
mod list;
mod purge;
mod stats;

pub use check::cmd_check;
pub use init::cmd_init;
pub use list::{cmd_active, cmd_closures, cmd_drones};
pub use purge::cmd_purge;
pub use stats::cmd_stats;
