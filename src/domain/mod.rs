//! Core domain types and reconciliation logic.

pub mod code_map;
pub mod disambiguation;
pub mod error;
pub mod listing;
pub mod reconcile;
pub mod record;
pub mod record_shape;
pub mod resolver;
pub mod security;
pub mod settings;
pub mod similarity;
