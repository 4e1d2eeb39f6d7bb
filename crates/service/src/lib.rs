pub mod config;
pub mod database;
pub mod http_server;
pub mod process;
pub mod state;

pub use config::{Config as ServiceConfig, ConfigError, FileConfig};
pub use process::{spawn_service, start_service, ShutdownHandle};
pub use state::State as ServiceState;
