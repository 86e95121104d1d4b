pub mod orchestrator;
pub mod packager;
pub mod poller;
pub mod tagger;

pub use crate::domain::model::{JobMessage, SessionIdentity, StagedStudy};
pub use crate::domain::ports::Archive;
pub use crate::utils::error::Result;
