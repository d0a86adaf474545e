//! Core internal logic for VPN activation monitoring.
//!
//! This module contains the outcome resolver, the completion sink shared
//! with the caller, the success side effects, and the NetworkManager client.

pub(crate) mod completion;
pub(crate) mod dispatch;
pub(crate) mod nm_client;
pub(crate) mod resolver;
