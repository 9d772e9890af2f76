//! Concrete adapter implementations for ports.

pub mod console_prompt;
pub mod csv_record_source;
pub mod file_config_adapter;
#[cfg(feature = "sqlite")]
pub mod sqlite_repository;
