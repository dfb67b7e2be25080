pub mod audit_log_service;
pub mod batch_service;
pub mod expiration_service;
pub mod paired_retry_service;
pub mod redemption_service;

pub use audit_log_service::*;
pub use batch_service::*;
pub use expiration_service::*;
pub use paired_retry_service::*;
pub use redemption_service::*;
