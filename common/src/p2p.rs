//! P2P-related types.
pub mod peer;
