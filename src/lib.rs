pub mod admin_handlers;
pub mod config;
pub mod config_store;
pub mod dedup;
pub mod filters;
pub mod forwarding;
pub mod handlers;
pub mod keep_alive;
pub mod message_processor;
pub mod relay_client;
pub mod status;
pub mod text_replacer;
pub mod transport;
pub mod utils;

pub use config_store::ConfigStore;
pub use relay_client::{RelayClient, RelayError};
pub use status::{RelayState, RelayStatus};
