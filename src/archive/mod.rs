use crate::config::ArchiveConfig;
use crate::domain::model::SessionIdentity;
use crate::domain::ports::Archive;
use crate::utils::error::{CourierError, Result};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;

/// HTTP upload transport against the XNAT REST API. One client per process,
/// basic auth on every call.
pub struct XnatClient {
    base_url: String,
    username: String,
    password: String,
    client: Client,
}

impl XnatClient {
    pub fn new(config: &ArchiveConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
            client: Client::new(),
        }
    }

    fn session_url(&self, session: &SessionIdentity) -> String {
        format!(
            "{}/data/projects/{}/subjects/{}/experiments/{}",
            self.base_url, session.collection, session.subject, session.experiment
        )
    }
}

#[async_trait]
impl Archive for XnatClient {
    async fn check_connectivity(&self) -> Result<()> {
        tracing::info!("Checking archive connectivity");
        let response = self
            .client
            .get(&self.base_url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .map_err(|e| CourierError::Connectivity {
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(CourierError::Connectivity {
                reason: format!("archive responded with status {}", response.status()),
            });
        }
        Ok(())
    }

    async fn import_package(&self, collection: &str, package: Vec<u8>) -> Result<()> {
        let url = format!("{}/data/services/import", self.base_url);
        tracing::info!(
            "Uploading package ({} bytes) to collection {}",
            package.len(),
            collection
        );

        let response = self
            .client
            .post(&url)
            .query(&[
                ("PROJECT_ID", collection),
                ("overwrite", "append"),
                ("prearchive", "true"),
                ("inbody", "true"),
            ])
            .basic_auth(&self.username, Some(&self.password))
            .header(CONTENT_TYPE, "application/zip")
            .body(package)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CourierError::Upload { status, body });
        }

        tracing::info!("Archive accepted the package, ingestion is asynchronous");
        Ok(())
    }

    async fn session_ready(&self, session: &SessionIdentity) -> Result<bool> {
        let response = self
            .client
            .get(self.session_url(session))
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;

        Ok(response.status() == reqwest::StatusCode::OK)
    }

    async fn upload_companion(
        &self,
        session: &SessionIdentity,
        file_name: &str,
        data: Vec<u8>,
    ) -> Result<()> {
        let url = format!(
            "{}/resources/csv/files/{}",
            self.session_url(session),
            file_name
        );
        tracing::info!("Uploading companion file {} to archived session", file_name);

        let response = self
            .client
            .put(&url)
            .basic_auth(&self.username, Some(&self.password))
            .header(CONTENT_TYPE, "text/csv")
            .body(data)
            .send()
            .await?;

        // XNAT answers 200 on overwrite and 201 on first upload.
        match response.status().as_u16() {
            200 | 201 => Ok(()),
            _ => Err(CourierError::CompanionUpload {
                status: response.status(),
            }),
        }
    }
}
