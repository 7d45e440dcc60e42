//! Shared types for the order lifecycle engine
//!
//! Common types used by the engine, its remote collaborators and UI code:
//! domain models, push-channel messages and the unified error system.

pub mod error;
pub mod message;
pub mod models;
pub mod util;

// Re-exports
pub use serde::{Deserialize, Serialize};

pub use error::{AppError, AppResult, ErrorCategory, ErrorCode};
pub use message::{LedgerMessage, LedgerUpdate};
pub use rust_decimal::Decimal;
