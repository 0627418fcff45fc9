//! # Ports Layer
//!
//! - `outbound.rs` - Driven ports (the backend the request pipeline talks to)

pub mod outbound;
