use shieldeye_scanner::ScanError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    /// Invalid scan parameters; the scan never starts
    #[error("Invalid scan configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Scan(#[from] ScanError),

    /// Fault outside the per-task boundary; partial results are discarded
    #[error("Scan {scan_id} failed: {message}")]
    Execution { scan_id: String, message: String },
}

impl CoreError {
    pub fn config(message: impl Into<String>) -> Self {
        CoreError::Config(message.into())
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
