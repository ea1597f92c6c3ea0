//! TOML course catalog loader.
//!
//! ```toml
//! [[courses]]
//! id = "COMP401"
//! name = "Data Structures"
//! description = "Foundations of data organization."
//! topics = ["Arrays", "Linked Lists", "Graphs"]
//! ```

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use studybuddy_core::model::{Course, CourseId};

#[derive(Debug, Deserialize)]
struct TomlCatalog {
    #[serde(default)]
    courses: Vec<TomlCourse>,
}

#[derive(Debug, Deserialize)]
struct TomlCourse {
    id: String,
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    topics: Vec<String>,
}

/// Load a course catalog file.
pub fn load_course_catalog(path: &Path) -> Result<Vec<Course>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read course catalog: {}", path.display()))?;

    parse_catalog_str(&content, path)
}

/// Parse a catalog from a TOML string. `source_path` is only used in error messages.
pub fn parse_catalog_str(content: &str, source_path: &Path) -> Result<Vec<Course>> {
    let parsed: TomlCatalog = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    parsed
        .courses
        .into_iter()
        .map(|c| {
            let id = c.id.trim();
            if id.is_empty() {
                anyhow::bail!("course '{}' has an empty id", c.name);
            }
            Ok(Course {
                id: CourseId::new(id),
                name: c.name,
                description: c.description,
                topics: c
                    .topics
                    .into_iter()
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .collect(),
            })
        })
        .collect()
}

/// A warning from catalog validation.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogWarning {
    /// The course the warning is about.
    pub course_id: CourseId,
    pub message: String,
}

impl std::fmt::Display for CatalogWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.course_id, self.message)
    }
}

/// Check a catalog for common authoring mistakes.
pub fn validate_catalog(courses: &[Course]) -> Vec<CatalogWarning> {
    let mut warnings = Vec::new();
    let mut seen_ids = HashSet::new();

    for course in courses {
        let warn = |message: String| CatalogWarning {
            course_id: course.id.clone(),
            message,
        };

        if !seen_ids.insert(&course.id) {
            warnings.push(warn(format!("duplicate course ID: {}", course.id)));
        }
        if course.topics.is_empty() {
            warnings.push(warn("course has no topics".into()));
        }
        let mut seen_topics = HashSet::new();
        for topic in &course.topics {
            if !seen_topics.insert(topic.to_lowercase()) {
                warnings.push(warn(format!("duplicate topic: {topic}")));
            }
        }
        if course.description.trim().is_empty() {
            warnings.push(warn("description is empty".into()));
        }
    }

    warnings
}
