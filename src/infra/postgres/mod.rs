//! PostgreSQL persistence adapters.

mod certificate_store;
mod verification_store;

pub use certificate_store::PgCertificateStore;
pub use verification_store::PgVerificationStore;
