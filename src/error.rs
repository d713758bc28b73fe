use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum LoaderError {
    #[error("missing required setting {0}")]
    #[diagnostic(help("export {0} in the environment before running the loader"))]
    MissingSetting(String),

    #[error("invalid value for setting {key}: {message}")]
    InvalidSetting { key: String, message: String },

    #[error("unsupported mappings format: {0} (expected tsv, csv or xlsx)")]
    UnsupportedFormat(String),

    #[error("failed to convert mappings file: {0}")]
    Conversion(String),

    #[error("failed to read mappings file: {0}")]
    MappingRead(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("could not build HTTP client: {0}")]
    HttpClient(String),

    #[error("mappings download failed: {0}")]
    DownloadHttp(String),

    #[error("mappings download returned status {status}: {message}")]
    DownloadStatus { status: u16, message: String },

    #[error("invalid INSDC run accession: {0}")]
    InvalidRunAccession(String),

    #[error("invalid source accession: {0}")]
    InvalidSourceAccession(String),

    #[error("row has {len} fields, column {index} is out of range")]
    MissingColumn { index: usize, len: usize },

    #[error("registry request failed: {0}")]
    RegistryHttp(String),

    #[error("registry returned status {status}: {message}")]
    RegistryStatus { status: u16, message: String },

    #[error("could not decode registry datasets: {0}")]
    RegistryDecode(String),

    #[error("public check request failed: {0}")]
    VisibilityHttp(String),

    #[error("dataset submission failed: {0}")]
    SubmitHttp(String),

    #[error("dataset submission returned status {status}: {message}")]
    SubmitStatus { status: u16, message: String },
}

impl LoaderError {
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            LoaderError::MissingSetting(_)
                | LoaderError::InvalidSetting { .. }
                | LoaderError::UnsupportedFormat(_)
        )
    }
}
