//! OWS protocol handling.
//!
//! Request classification, WFS transaction decoding and authorization,
//! capability rewriting, and the gateway tying them together.

pub mod authorize;
pub mod capabilities;
pub mod gateway;
pub mod params;
pub mod transaction;

pub use authorize::TransactionAuthorizer;
pub use capabilities::{CapabilityRewriter, RewriteError};
pub use gateway::{OwsGateway, OwsRequest};
pub use params::{Dispatch, OwsRequestParams};
pub use transaction::{Operation, TransactionError, WfsTransaction};
