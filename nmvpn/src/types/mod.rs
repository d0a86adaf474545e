//! Type definitions and constants.
//!
//! This module contains NetworkManager constants used by the D-Bus client
//! and the outcome resolver.

pub(crate) mod constants;
