use thiserror::Error;

#[derive(Error, Debug)]
pub enum CourierError {
    #[error("malformed job message: {message}")]
    MalformedJob { message: String },

    #[error("archive connectivity check failed: {reason}")]
    Connectivity { reason: String },

    #[error("patient id '{patient_id}' has no treatment-site mapping")]
    UnknownPatient { patient_id: String },

    #[error("no structural record found in {folder}, session identity unknown")]
    MissingSessionIdentity { folder: String },

    #[error("no imaging files found in {folder}")]
    EmptyStudy { folder: String },

    #[error("no routing entry for site code '{site}'")]
    UnknownRoute { site: String },

    #[error("archive rejected package upload with status {status}: {body}")]
    Upload {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("session not archived after {attempts} readiness probes")]
    ReadinessTimeout { attempts: u32 },

    #[error("companion upload failed with status {status}")]
    CompanionUpload { status: reqwest::StatusCode },

    #[error("DICOM error: {message}")]
    Dicom { message: String },

    #[error("Missing configuration field: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid configuration value for {field}: '{value}' ({reason})")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Broker error: {0}")]
    BrokerError(#[from] lapin::Error),

    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration parse error: {0}")]
    ConfigParseError(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, CourierError>;
