//! Proxy service implementation.
//!
//! Handles routing, engine direction, buffered engine exchanges and response
//! header handling on top of pingora.

pub mod director;
pub mod engine;
pub mod headers;
pub mod response;
pub mod router;
pub mod service;

pub use engine::{EngineClient, EngineResponse, EngineTarget, Upstream};
pub use service::OwsProxy;
