//! Column header and free-text parsing for glossary spreadsheets

pub mod categories;
pub mod headers;

pub use categories::{
    clean_category_name, extract_category_from_text, extract_subcategories_from_text,
    is_tag_list,
};
pub use headers::{split_header, KeyColumns, Section, SectionMap};
