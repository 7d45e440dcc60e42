//! Data models
//!
//! Shared between the engine, the remote layer and UI code.
//! Wire names follow the backend's GraphQL schema (camelCase).

pub mod cart;
pub mod catalog;
pub mod order;
pub mod payment;
pub mod reorder;

// Re-exports
pub use cart::*;
pub use catalog::*;
pub use order::*;
pub use payment::*;
pub use reorder::*;
