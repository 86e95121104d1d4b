use crate::domain::model::SessionIdentity;
use crate::utils::error::Result;
use async_trait::async_trait;

/// Upload transport to the image archive. The production implementation is the
/// HTTP import service; a DICOM network-association transport would implement
/// the same contract.
#[async_trait]
pub trait Archive: Send + Sync {
    /// Health probe, run before committing to an upload.
    async fn check_connectivity(&self) -> Result<()>;

    /// Submit one study package to the named collection in a single call.
    async fn import_package(&self, collection: &str, package: Vec<u8>) -> Result<()>;

    /// Whether the archive has finished ingesting the session.
    async fn session_ready(&self, session: &SessionIdentity) -> Result<bool>;

    /// Attach a companion file to the archived session.
    async fn upload_companion(
        &self,
        session: &SessionIdentity,
        file_name: &str,
        data: Vec<u8>,
    ) -> Result<()>;
}
