//! mneme — spaced-repetition study backend.
//!
//! The algorithmically interesting slice of a flashcard product: given a
//! user's cards, decide when each is next due and how a review outcome
//! moves that schedule. Everything else (card content, accounts, auth)
//! stays outside, behind the [`catalog`] and identity seams.

pub mod catalog;
pub mod config;
pub mod scheduler;
pub mod server;
pub mod store;

pub use catalog::{reconcile_user, CardCatalog, StaticCatalog};
pub use config::StudyConfig;
pub use scheduler::{CardState, CardStatus, ReviewRecord, SessionCoordinator, StudyError};
pub use store::{CardStateStore, MemoryStore, StoreError, Versioned};
