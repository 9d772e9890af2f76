//! secmaster: reconciles vendor security-reference feeds against a canonical
//! registry of instruments and their exchange listings.
//!
//! Hexagonal architecture: domain logic in [`domain`], port traits in [`ports`],
//! concrete implementations in [`adapters`].

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod ports;
