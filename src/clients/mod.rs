pub mod faa;
pub mod ntfy;
