//! Infrastructure layer: error taxonomy, trait seams, the
//! transactional outbox, and PostgreSQL adapters.

mod error;
pub mod outbox;
mod postgres;
mod traits;

pub use error::{is_unique_violation, Result, ServiceError};
pub use outbox::{OutboxRelay, OutboxRow, PgOutbox};
pub use postgres::{PgCertificateStore, PgVerificationStore};
pub use traits::{
    CertificateStore, EventPublisher, PdfRenderer, RenderedPdf, VerificationStore,
};

#[cfg(test)]
pub use traits::{
    MockCertificateStore, MockEventPublisher, MockPdfRenderer, MockVerificationStore,
};
