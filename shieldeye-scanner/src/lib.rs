pub mod cert;
pub mod error;
pub mod fetch;
pub mod links;
pub mod rate_limit;
pub mod result;

pub use cert::{CertStatus, CertificateInspector};
pub use error::ScanError;
pub use fetch::{ClientConfig, Fetcher};
pub use rate_limit::DomainRateLimiter;
pub use result::FetchedPage;
