//! Feature modules.
//!
//! Collaborators the gateway consumes through narrow interfaces.

pub mod projects;
