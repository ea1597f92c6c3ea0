//! The `studybuddy check-catalog` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::Table;

use studybuddy_store::{load_course_catalog, validate_catalog};

pub fn execute(catalog_path: PathBuf) -> Result<()> {
    let courses = load_course_catalog(&catalog_path)?;

    let mut table = Table::new();
    table.set_header(vec!["Course", "Name", "Topics"]);
    for course in &courses {
        table.add_row(vec![
            course.id.to_string(),
            course.name.clone(),
            course.topics.len().to_string(),
        ]);
    }
    println!("Catalog: {} ({} courses)", catalog_path.display(), courses.len());
    println!("{table}");

    let warnings = validate_catalog(&courses);
    for w in &warnings {
        println!("  [{}] WARNING: {}", w.course_id, w.message);
    }

    if warnings.is_empty() {
        println!("Catalog valid.");
    } else {
        println!("\n{} warning(s) found.", warnings.len());
    }

    Ok(())
}
