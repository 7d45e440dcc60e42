//! Error codes shared by the engine and its remote collaborators
//!
//! Remote layers report failures as an [`AppError`] carrying a numeric
//! [`ErrorCode`]; the engine classifies on the code alone and never on the
//! message text. [`ErrorCategory`] groups codes by their leading digit:
//!
//! | Range | Category |
//! |-------|----------|
//! | 0xxx | general (network, validation, bad responses) |
//! | 4xxx | order and cart |
//! | 5xxx | payment |
//! | 6xxx | catalog |
//!
//! ```
//! use shared::error::{AppError, ErrorCode};
//!
//! let err = AppError::item_unavailable("margherita");
//! assert_eq!(err.code, ErrorCode::ItemUnavailable);
//! assert_eq!(err.detail_str("dish_id"), Some("margherita"));
//! ```

mod category;
mod codes;
mod types;

pub use category::ErrorCategory;
pub use codes::{ErrorCode, InvalidErrorCode};
pub use types::{AppError, AppResult};
