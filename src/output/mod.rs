//! Output sinks for resolved batch results.
//!
//! The text format is one `<identifier>;<label>` line per identifier, in the
//! order given by [`ResolvedResults::entries`]: priority identifiers first,
//! then secondary ones, each group sorted by identifier.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::info;

use crate::collect::ResolvedResults;
use crate::error::OutputError;
use crate::scheduler::Category;

/// Destination of a run's aggregated results.
pub trait OutputSink: Send + Sync {
    /// Persists the resolved results.
    fn write(&self, results: &ResolvedResults) -> Result<(), OutputError>;
}

/// Sink for runs that produce no result identifiers.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl OutputSink for NullSink {
    fn write(&self, _results: &ResolvedResults) -> Result<(), OutputError> {
        Ok(())
    }
}

/// Label written after each identifier, per category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryLabels {
    pub priority: String,
    pub secondary: String,
}

impl Default for CategoryLabels {
    fn default() -> Self {
        Self {
            priority: Category::Priority.as_str().to_string(),
            secondary: Category::Secondary.as_str().to_string(),
        }
    }
}

impl CategoryLabels {
    pub fn new(priority: impl Into<String>, secondary: impl Into<String>) -> Self {
        Self {
            priority: priority.into(),
            secondary: secondary.into(),
        }
    }

    /// Labels used by the world road map: `world_level` and
    /// `world_towns_level`.
    pub fn world_roads() -> Self {
        Self::new("world_level", "world_towns_level")
    }

    pub fn label(&self, category: Category) -> &str {
        match category {
            Category::Priority => &self.priority,
            Category::Secondary => &self.secondary,
        }
    }
}

/// Renders results into the line format.
pub fn render_lines(results: &ResolvedResults, labels: &CategoryLabels) -> Vec<String> {
    results
        .entries()
        .map(|(id, category)| format!("{id};{}", labels.label(category)))
        .collect()
}

/// Writes results to a text file.
///
/// Content goes to a sibling temporary file first and is renamed over the
/// target, so a failed write leaves no partial output behind.
#[derive(Debug, Clone)]
pub struct CategoryFileSink {
    path: PathBuf,
    labels: CategoryLabels,
}

impl CategoryFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            labels: CategoryLabels::default(),
        }
    }

    pub fn with_labels(mut self, labels: CategoryLabels) -> Self {
        self.labels = labels;
        self
    }

    fn temp_path(&self) -> Result<PathBuf, OutputError> {
        let name = self
            .path
            .file_name()
            .ok_or_else(|| OutputError::InvalidPath(self.path.clone()))?;
        let mut tmp_name = name.to_os_string();
        tmp_name.push(".tmp");
        Ok(self.path.with_file_name(tmp_name))
    }

    fn write_to(&self, tmp: &Path, results: &ResolvedResults) -> std::io::Result<()> {
        let mut writer = BufWriter::new(fs::File::create(tmp)?);
        for line in render_lines(results, &self.labels) {
            writeln!(writer, "{line}")?;
        }
        writer.flush()?;
        fs::rename(tmp, &self.path)
    }
}

impl OutputSink for CategoryFileSink {
    fn write(&self, results: &ResolvedResults) -> Result<(), OutputError> {
        let tmp = self.temp_path()?;
        if let Err(source) = self.write_to(&tmp, results) {
            let _ = fs::remove_file(&tmp);
            return Err(OutputError::Write {
                path: self.path.clone(),
                source,
            });
        }

        info!(
            path = %self.path.display(),
            lines = results.len(),
            "Wrote aggregated results"
        );
        Ok(())
    }
}
