//! Console report formatting
//!
//! Everything the user is meant to read goes to stdout through [`Report`];
//! diagnostics for operators go through the log on stderr.

use std::fmt::Display;
use std::path::Path;

use console::Style;

/// Styled progress and result lines
#[derive(Debug, Clone)]
pub struct Report {
    heading: Style,
    success: Style,
    failure: Style,
    detail: Style,
}

impl Default for Report {
    fn default() -> Self {
        Self::new()
    }
}

impl Report {
    /// Creates a report; styling is dropped when stdout is not a terminal
    pub fn new() -> Self {
        Self {
            heading: Style::new().bold(),
            success: Style::new().green(),
            failure: Style::new().red().bold(),
            detail: Style::new().dim(),
        }
    }

    pub fn beginning(&self) {
        println!("{}", self.heading.apply_to("Beginning metadata addition process..."));
    }

    pub fn merged(
        &self,
        output: &Path,
        size: impl Display,
        sha256: &str,
        metadata_size: impl Display,
        elapsed: impl Display,
    ) {
        println!("{}", self.success.apply_to(merged_line(output)));
        println!("{}", self.detail.apply_to(format!("{}, sha256 {}", size, sha256)));
        println!(
            "{}",
            self.detail.apply_to(format!("metadata {}, written in {}", metadata_size, elapsed))
        );
    }

    /// Prints the metadata JSON and the packed file names
    pub fn metadata(&self, json: &str, packed_files: &[String]) {
        println!("\n{}", self.heading.apply_to("Metadata and Associated Files:"));
        println!("{}", json);
        println!("\n{}", self.heading.apply_to("Associated files:"));
        print!("{}", format_file_list(packed_files));
    }

    pub fn verification_skipped(&self) {
        println!("{}", self.detail.apply_to("Verification skipped"));
    }

    pub fn verification_failed(&self, reason: impl Display) {
        println!("{}", self.failure.apply_to(format!("Verification failed: {}", reason)));
    }

    /// Reports a degraded run: the metadata was not attached but labels were written
    pub fn fallback(&self, stage: impl Display, error: impl Display, labels: &Path) {
        println!("{}", self.failure.apply_to(format!("Error {}: {}", stage, error)));
        println!("Created {} file only", labels.display());
    }

    pub fn config(&self, rendered: &str) {
        print!("{}", rendered);
    }
}

fn merged_line(output: &Path) -> String {
    format!("Metadata added successfully to {}", output.display())
}

/// One file name per line, or a placeholder when there are none
pub fn format_file_list(files: &[String]) -> String {
    if files.is_empty() {
        return "  (none)\n".to_string();
    }

    files.iter().map(|name| format!("  - {}\n", name)).collect()
}
