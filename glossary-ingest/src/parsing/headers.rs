//! Section/subsection structure encoded in column headers
//!
//! Glossary sheets name their columns `"<Section> – <Subsection>"`, e.g.
//! `"Introduction – Definition and Overview"`. Column 0 is always the term.

use serde::Serialize;

const EN_DASH: char = '–';

/// Split a header into `(section, subsection)`
///
/// Splits once on an en dash when present, otherwise on the first hyphen.
/// Headers without a separator are a bare section.
pub fn split_header(col: &str) -> (String, String) {
    let col = col.trim();
    let separator = if col.contains(EN_DASH) {
        Some(EN_DASH)
    } else if col.contains('-') {
        Some('-')
    } else {
        None
    };

    match separator.and_then(|sep| col.split_once(sep)) {
        Some((section, subsection)) => (section.trim().to_string(), subsection.trim().to_string()),
        None => (col.to_string(), String::new()),
    }
}

/// One section and its subsection columns, in header order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Section {
    pub name: String,
    pub subsections: Vec<(String, usize)>,
}

impl Section {
    /// First subsection whose name contains `needle`
    pub fn find(&self, needle: &str) -> Option<(&str, usize)> {
        self.subsections
            .iter()
            .find(|(name, _)| name.contains(needle))
            .map(|(name, col)| (name.as_str(), *col))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SectionMap {
    sections: Vec<Section>,
}

impl SectionMap {
    pub fn from_headers(headers: &[String]) -> Self {
        let mut map = SectionMap::default();

        for (col, header) in headers.iter().enumerate().skip(1) {
            if header.trim().is_empty() {
                continue;
            }
            let (section, subsection) = split_header(header);

            let idx = match map.sections.iter().position(|s| s.name == section) {
                Some(idx) => idx,
                None => {
                    map.sections.push(Section {
                        name: section,
                        subsections: Vec::new(),
                    });
                    map.sections.len() - 1
                }
            };

            if subsection.is_empty() {
                continue;
            }
            let subsections = &mut map.sections[idx].subsections;
            match subsections.iter_mut().find(|(name, _)| *name == subsection) {
                Some(entry) => entry.1 = col,
                None => subsections.push((subsection, col)),
            }
        }

        map
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn get(&self, section: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == section)
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Column of the first subsection of `section` containing `needle`
    pub fn find_column(&self, section: &str, needle: &str) -> Option<usize> {
        self.get(section).and_then(|s| s.find(needle)).map(|(_, col)| col)
    }

    /// Column of the last subsection of `section` accepted by `matches`
    fn last_column_where(&self, section: &str, matches: impl Fn(&str) -> bool) -> Option<usize> {
        self.get(section)?
            .subsections
            .iter()
            .rev()
            .find(|(name, _)| matches(name))
            .map(|(_, col)| *col)
    }
}

/// Columns the dataset processor reads directly
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyColumns {
    pub definition: Option<usize>,
    pub main_category: Option<usize>,
    pub subcategory: Option<usize>,
}

impl KeyColumns {
    /// "Tags and Keywords" columns hold cleaner comma lists, so they win
    /// over the prose columns under "Introduction". When several
    /// subsections match, the rightmost column wins.
    pub fn detect(map: &SectionMap) -> Self {
        let definition =
            map.last_column_where("Introduction", |name| name.contains("Definition and Overview"));
        let is_main = |name: &str| name.contains("Main Category");
        let main_category = map
            .last_column_where("Tags and Keywords", is_main)
            .or_else(|| map.last_column_where("Introduction", is_main));
        // "Category and Sub-category of the Term – Main Category" is a
        // main category column even though it mentions sub-categories
        let is_subcategory =
            |name: &str| name.contains("Sub-category") && !name.contains("Main Category");
        let subcategory = map
            .last_column_where("Tags and Keywords", is_subcategory)
            .or_else(|| map.last_column_where("Introduction", is_subcategory));

        let columns = Self {
            definition,
            main_category,
            subcategory,
        };
        tracing::info!(
            definition = ?columns.definition,
            main_category = ?columns.main_category,
            subcategory = ?columns.subcategory,
            "Key columns detected"
        );
        columns
    }
}
