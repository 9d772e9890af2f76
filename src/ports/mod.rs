//! Port traits: the seams between the reconciliation engine and the outside
//! world.

pub mod config_port;
pub mod disambiguation_port;
pub mod record_source;
pub mod registry_port;
