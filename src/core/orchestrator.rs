use crate::config::{AppConfig, RouteConfig};
use crate::core::packager;
use crate::core::poller::ReadinessPoller;
use crate::core::tagger;
use crate::domain::model::{JobMessage, SessionIdentity};
use crate::domain::ports::Archive;
use crate::utils::error::{CourierError, Result};
use std::collections::HashMap;
use std::path::Path;

/// Runs the per-job pipeline: TAG -> ROUTE -> UPLOAD -> POLL ->
/// COMPANION_UPLOAD. Linear, no back-edges; the broker layer acknowledges on
/// success and leaves redelivery to its own policy on failure. All per-job
/// state lives in the `StagedStudy` built here and is dropped on return.
pub struct JobOrchestrator<A: Archive> {
    archive: A,
    sites: HashMap<String, String>,
    routing: HashMap<String, RouteConfig>,
    poller: ReadinessPoller,
}

impl<A: Archive> JobOrchestrator<A> {
    pub fn new(archive: A, config: &AppConfig) -> Self {
        Self {
            archive,
            sites: config.sites.clone(),
            routing: config.routing.clone(),
            poller: ReadinessPoller::from_config(&config.poller),
        }
    }

    pub async fn process(&self, job: &JobMessage) -> Result<()> {
        tracing::info!("📦 Processing job for folder: {}", job.folder_path);

        // TAG: stage tagged copies, purely local. Data errors abort here,
        // before the archive is ever contacted.
        let study = tagger::stage_study(Path::new(&job.folder_path), &self.sites)?;

        // Probe the archive before committing to the upload.
        self.archive.check_connectivity().await?;

        // ROUTE: one destination per job, from the canonical site code.
        let route =
            self.routing
                .get(&study.site_code)
                .ok_or_else(|| CourierError::UnknownRoute {
                    site: study.site_code.clone(),
                })?;
        let session = SessionIdentity {
            collection: route.collection.clone(),
            subject: study.subject.clone(),
            experiment: study.experiment.clone(),
        };

        // UPLOAD: one round trip for the whole study.
        let package = packager::build_package(&study)?;
        self.archive
            .import_package(&route.collection, package)
            .await?;

        // POLL: the synchronization barrier before the companion may follow.
        self.poller.wait_until_ready(&self.archive, &session).await?;

        // COMPANION_UPLOAD: absence is a no-op. Any companion failure, read
        // or upload, is logged but not fatal; the study itself is archived at
        // this point and failing the job would re-import the whole package.
        match &study.companion {
            Some(companion) => {
                let file_name = companion
                    .file_name()
                    .and_then(|name| name.to_str())
                    .unwrap_or("companion.csv");
                match std::fs::read(companion) {
                    Ok(data) => {
                        if let Err(e) = self
                            .archive
                            .upload_companion(&session, file_name, data)
                            .await
                        {
                            tracing::error!(
                                "Companion upload failed, study stays archived: {}",
                                e
                            );
                        }
                    }
                    Err(e) => {
                        tracing::error!(
                            "Companion file {} unreadable, study stays archived: {}",
                            companion.display(),
                            e
                        );
                    }
                }
            }
            None => tracing::info!("No companion file in job folder, nothing to attach"),
        }

        tracing::info!("✅ Job complete for folder: {}", job.folder_path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ArchiveConfig, BrokerConfig, PollerConfig};
    use crate::core::tagger::test_support::write_dicom;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// Recording archive: logs every call, optionally failing chosen stages.
    /// Clones share the call log, so tests keep a handle after handing one to
    /// the orchestrator.
    #[derive(Default, Clone)]
    struct RecordingArchive {
        calls: Arc<Mutex<Vec<String>>>,
        fail_connectivity: bool,
        fail_import: bool,
        fail_companion: bool,
        never_ready: bool,
        /// File deleted while the readiness probe runs, to model the job
        /// folder changing underneath an already-archived study.
        remove_during_poll: Arc<Mutex<Option<std::path::PathBuf>>>,
    }

    impl RecordingArchive {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl Archive for RecordingArchive {
        async fn check_connectivity(&self) -> Result<()> {
            self.record("connectivity".to_string());
            if self.fail_connectivity {
                return Err(CourierError::Connectivity {
                    reason: "unreachable".to_string(),
                });
            }
            Ok(())
        }

        async fn import_package(&self, collection: &str, package: Vec<u8>) -> Result<()> {
            self.record(format!("import {} ({} bytes)", collection, package.len()));
            if self.fail_import {
                return Err(CourierError::Upload {
                    status: reqwest::StatusCode::BAD_REQUEST,
                    body: "rejected".to_string(),
                });
            }
            Ok(())
        }

        async fn session_ready(&self, session: &SessionIdentity) -> Result<bool> {
            self.record(format!(
                "ready {}/{}/{}",
                session.collection, session.subject, session.experiment
            ));
            if let Some(path) = self.remove_during_poll.lock().unwrap().take() {
                std::fs::remove_file(path).unwrap();
            }
            Ok(!self.never_ready)
        }

        async fn upload_companion(
            &self,
            _session: &SessionIdentity,
            file_name: &str,
            _data: Vec<u8>,
        ) -> Result<()> {
            self.record(format!("companion {}", file_name));
            if self.fail_companion {
                return Err(CourierError::CompanionUpload {
                    status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                });
            }
            Ok(())
        }
    }

    fn test_config() -> AppConfig {
        AppConfig {
            broker: BrokerConfig {
                host: "localhost".to_string(),
                port: 5672,
                username: "guest".to_string(),
                password: "guest".to_string(),
                queue_name: "xnat-jobs".to_string(),
                keepalive_interval_secs: 10,
            },
            archive: ArchiveConfig {
                base_url: "http://localhost".to_string(),
                username: "admin".to_string(),
                password: "admin".to_string(),
            },
            poller: PollerConfig {
                interval_secs: 1,
                max_attempts: 3,
            },
            sites: HashMap::from([
                ("Tom".to_string(), "LUNG".to_string()),
                ("Tim".to_string(), "KIDNEY".to_string()),
            ]),
            routing: HashMap::from([
                (
                    "LUNG".to_string(),
                    RouteConfig {
                        collection: "LUNG".to_string(),
                        port: 8104,
                    },
                ),
                (
                    "KIDNEY".to_string(),
                    RouteConfig {
                        collection: "KIDNEY".to_string(),
                        port: 8104,
                    },
                ),
            ]),
        }
    }

    fn lung_study(with_companion: bool) -> TempDir {
        let folder = TempDir::new().unwrap();
        write_dicom(folder.path(), "a.dcm", "Tom", "Tom", "CT");
        write_dicom(folder.path(), "b.dcm", "Tom", "Tom", "CT");
        write_dicom(folder.path(), "c.dcm", "Tom", "Tom", "RTSTRUCT");
        if with_companion {
            std::fs::write(folder.path().join("radiomics.csv"), "a,b\n1,2\n").unwrap();
        }
        folder
    }

    fn job_for(folder: &TempDir) -> JobMessage {
        JobMessage {
            folder_path: folder.path().to_str().unwrap().to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_pipeline_runs_stages_in_order() {
        let archive = RecordingArchive::default();
        let orchestrator = JobOrchestrator::new(archive.clone(), &test_config());
        let folder = lung_study(true);

        orchestrator.process(&job_for(&folder)).await.unwrap();

        let calls = archive.calls();
        assert_eq!(calls[0], "connectivity");
        assert!(calls[1].starts_with("import LUNG"));
        assert_eq!(calls[2], "ready LUNG/Tom/Tom");
        assert_eq!(calls[3], "companion radiomics.csv");
        assert_eq!(calls.len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_companion_is_a_no_op() {
        let archive = RecordingArchive::default();
        let orchestrator = JobOrchestrator::new(archive.clone(), &test_config());
        let folder = lung_study(false);

        orchestrator.process(&job_for(&folder)).await.unwrap();

        let calls = archive.calls();
        assert!(!calls.iter().any(|call| call.starts_with("companion")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_patient_makes_no_archive_calls() {
        let archive = RecordingArchive::default();
        let orchestrator = JobOrchestrator::new(archive.clone(), &test_config());
        let folder = TempDir::new().unwrap();
        write_dicom(folder.path(), "a.dcm", "Stranger", "Stranger", "RTSTRUCT");

        let err = orchestrator.process(&job_for(&folder)).await.unwrap_err();

        assert!(matches!(err, CourierError::UnknownPatient { .. }));
        assert!(archive.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connectivity_failure_aborts_before_upload() {
        let archive = RecordingArchive {
            fail_connectivity: true,
            ..Default::default()
        };
        let orchestrator = JobOrchestrator::new(archive.clone(), &test_config());
        let folder = lung_study(true);

        let err = orchestrator.process(&job_for(&folder)).await.unwrap_err();

        assert!(matches!(err, CourierError::Connectivity { .. }));
        assert_eq!(archive.calls(), vec!["connectivity"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_upload_stops_before_polling() {
        let archive = RecordingArchive {
            fail_import: true,
            ..Default::default()
        };
        let orchestrator = JobOrchestrator::new(archive.clone(), &test_config());
        let folder = lung_study(true);

        let err = orchestrator.process(&job_for(&folder)).await.unwrap_err();

        assert!(matches!(err, CourierError::Upload { .. }));
        assert!(!archive.calls().iter().any(|call| call.starts_with("ready")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_readiness_timeout_fails_job_without_companion_upload() {
        let archive = RecordingArchive {
            never_ready: true,
            ..Default::default()
        };
        let orchestrator = JobOrchestrator::new(archive.clone(), &test_config());
        let folder = lung_study(true);

        let err = orchestrator.process(&job_for(&folder)).await.unwrap_err();

        assert!(matches!(err, CourierError::ReadinessTimeout { attempts: 3 }));
        assert!(!archive
            .calls()
            .iter()
            .any(|call| call.starts_with("companion")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_companion_vanishing_after_archival_does_not_fail_the_job() {
        let folder = lung_study(true);
        let archive = RecordingArchive {
            remove_during_poll: Arc::new(Mutex::new(Some(
                folder.path().join("radiomics.csv"),
            ))),
            ..Default::default()
        };
        let orchestrator = JobOrchestrator::new(archive.clone(), &test_config());

        // The companion disappears between staging and the upload stage; the
        // study is archived by then, so the job must still succeed.
        orchestrator.process(&job_for(&folder)).await.unwrap();

        assert!(!archive
            .calls()
            .iter()
            .any(|call| call.starts_with("companion")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_companion_failure_does_not_fail_the_job() {
        let archive = RecordingArchive {
            fail_companion: true,
            ..Default::default()
        };
        let orchestrator = JobOrchestrator::new(archive.clone(), &test_config());
        let folder = lung_study(true);

        orchestrator.process(&job_for(&folder)).await.unwrap();

        assert_eq!(archive.calls().last().unwrap(), "companion radiomics.csv");
    }
}
