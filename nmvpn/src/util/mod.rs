//! Utility helpers.

pub(crate) mod utils;
