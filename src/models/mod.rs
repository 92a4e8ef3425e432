//! Core data models for the file drop.
//!
//! One uploaded file plus its sidecar metadata forms an object, keyed by the
//! random token that doubles as its directory name and public download key.

pub mod object;
