mod admin;
pub mod commands;

pub use admin::*;
pub use self::commands::AdminCommand;
