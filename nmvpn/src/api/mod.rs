//! Public API module.
//!
//! This module contains the high-level user-facing API for the `nmvpn` crate.

pub mod models;
pub mod monitor;
pub mod traits;
