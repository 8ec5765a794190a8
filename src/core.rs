//! Core system components.
//!
//! Contains the OWS protocol logic and the proxy service that serves it.

pub mod ows;
pub mod proxy;
