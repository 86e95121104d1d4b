pub mod archive;
pub mod broker;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use crate::archive::XnatClient;
pub use crate::broker::BrokerConnection;
pub use crate::config::{cli::CliArgs, AppConfig};
pub use crate::core::orchestrator::JobOrchestrator;
pub use crate::domain::model::JobMessage;
pub use crate::utils::error::{CourierError, Result};
