//! # Glossary Common Library
//!
//! Shared code for the AI/ML glossary services including:
//! - Error type used across crates
//! - Configuration loading and root folder resolution
//! - Database initialization, schema and row models
//! - Event types (GlossaryEvent enum) and the broadcast EventBus

pub mod config;
pub mod db;
pub mod error;
pub mod events;

pub use error::{Error, Result};
