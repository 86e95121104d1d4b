use crate::utils::error::{CourierError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tempfile::TempDir;

/// Body of a queue delivery: a folder of imaging objects ready for upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobMessage {
    pub folder_path: String,
}

impl JobMessage {
    pub fn from_bytes(body: &[u8]) -> Result<Self> {
        let message: JobMessage =
            serde_json::from_slice(body).map_err(|e| CourierError::MalformedJob {
                message: format!("body is not a job message: {}", e),
            })?;

        if message.folder_path.trim().is_empty() {
            return Err(CourierError::MalformedJob {
                message: "folder_path is empty".to_string(),
            });
        }

        Ok(message)
    }
}

/// The (collection, subject, experiment) triple identifying one archived study.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    pub collection: String,
    pub subject: String,
    pub experiment: String,
}

/// Per-job context produced by the tagger and consumed by the rest of the
/// pipeline. Owns the staging workspace; dropping it deletes the tagged
/// copies, so nothing survives into the next job.
#[derive(Debug)]
pub struct StagedStudy {
    pub workspace: TempDir,
    /// Tagged imaging copies in lexicographic filename order.
    pub imaging: Vec<PathBuf>,
    /// Companion candidate in the source folder, if any.
    pub companion: Option<PathBuf>,
    /// Site code of the first imaging object, resolves the destination.
    pub site_code: String,
    /// Subject and experiment from the structural record.
    pub subject: String,
    pub experiment: String,
}
