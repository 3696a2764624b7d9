//! Database access for glossary-ingest
//!
//! Read queries behind the glossary API and persistence of batch
//! operations. Schema creation lives in `glossary_common::db`.

pub mod categories;
pub mod operations;
pub mod terms;
