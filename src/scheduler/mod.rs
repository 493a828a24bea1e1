//! Spaced repetition scheduling engine
//!
//! This module provides:
//! - Per-card scheduling state and the review audit record
//! - SM-2 scheduling algorithm (pure, clock-free)
//! - Due queue construction with new/review interleaving
//! - Session coordination with optimistic per-card commits

pub mod algorithm;
pub mod models;
pub mod queue;
pub mod session;

pub use models::*;
pub use queue::DueQueueBuilder;
pub use session::{SessionCoordinator, StartedSession, StudyError};
