//! Command implementations for the CLI.

mod battery;
mod config;
mod discover;
mod history;
mod read;

pub use battery::cmd_battery;
pub use config::cmd_config;
pub use discover::cmd_discover;
pub use history::cmd_history;
pub use read::cmd_read;
