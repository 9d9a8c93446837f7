//! Core types for Sijang.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod coord;
pub mod id;
pub mod price;

pub use coord::Coordinates;
pub use id::*;
pub use price::{CurrencyCode, Price};
