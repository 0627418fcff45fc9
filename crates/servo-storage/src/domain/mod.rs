//! # Domain Layer
//!
//! Pure storage types. No driver types leak out of this module.
//!
//! - `entities` - Session and item values
//! - `operations` - The persisted operations by role and their results
//! - `errors` - Storage error classification

pub mod entities;
pub mod errors;
pub mod operations;
