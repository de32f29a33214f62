//! Repository layer
//!
//! Encapsulates SeaORM operations per table. The credential repository owns
//! the codec key so secrets are encrypted on write and decrypted on read;
//! the run repository exposes the atomic conditional writes the run state
//! machine relies on.

pub mod credential;
pub mod workflow_run;

pub use credential::CredentialRepository;
pub use workflow_run::WorkflowRunRepository;
