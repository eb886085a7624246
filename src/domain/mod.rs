//! Core domain types for the verification and certificate services.

mod certificate;
mod event;
mod verification;

pub use certificate::*;
pub use event::*;
pub use verification::*;
