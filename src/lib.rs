//! Carbon credit verification and certificate services.
//!
//! Two cooperating microservices sharing one crate:
//!
//! - the **verification service** adjudicates carbon-saving claims
//!   through a PENDING -> APPROVED | REJECTED state machine, and
//! - the **certificate service** turns approvals and marketplace
//!   purchases into content-addressed, SHA-256-hashed certificates.
//!
//! They communicate only over NATS JetStream; each owns its own
//! Postgres schema. Outgoing verification events go through a
//! transactional outbox so adjudication and event emission commit
//! together.

pub mod api;
pub mod auth;
pub mod bus;
pub mod certificate;
pub mod crypto;
pub mod domain;
pub mod infra;
pub mod migrations;
pub mod server;
pub mod verification;
