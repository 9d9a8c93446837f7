//! Sijang client state model.
//!
//! Everything a view layer needs to drive the marketplace app: the cart,
//! the current-market selection with its saved list, per-shop favorites
//! with optimistic sync, shop listings, and the app mode flag - all over a
//! durable key-value store and a broadcast event bus.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod cart;
pub mod config;
pub mod events;
pub mod favorites;
pub mod listing;
pub mod mode;
pub mod selection;
pub mod state;
pub mod storage;
pub mod sync;

pub use state::AppState;
