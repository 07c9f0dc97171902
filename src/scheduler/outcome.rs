//! Work unit and outcome types shared by the queue, the workers and the
//! collectors.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Result category, ordered by precedence: earlier variants win when the
/// same identifier lands in more than one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Results produced by units whose endpoints are all priority-marked.
    Priority,
    /// Everything else.
    Secondary,
}

impl Category {
    /// All categories in precedence order.
    pub const ALL: [Category; 2] = [Category::Priority, Category::Secondary];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Priority => "priority",
            Self::Secondary => "secondary",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One independent piece of work dispatched to a single processor call.
///
/// Units are immutable once enumerated. `Display` must identify the unit
/// well enough to re-run it by hand from an error report.
pub trait WorkUnit: fmt::Display + fmt::Debug + Clone + Send + Sync + 'static {
    /// Category that results produced by this unit are filed under.
    ///
    /// Units without roles fall into the secondary set.
    fn category(&self) -> Category {
        Category::Secondary
    }
}

/// A domain identifier tagged with the category it was filed under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResultItem {
    pub id: String,
    pub category: Category,
}

impl ResultItem {
    pub fn new(id: impl Into<String>, category: Category) -> Self {
        Self {
            id: id.into(),
            category,
        }
    }
}

/// What a worker observed after the processor call for one unit returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessingOutcome {
    Success(Vec<ResultItem>),
    Failure(String),
}

impl ProcessingOutcome {
    /// Classifies raw identifiers returned for `unit` into result items.
    pub fn classify<U: WorkUnit>(unit: &U, ids: Vec<String>) -> Self {
        let category = unit.category();
        Self::Success(
            ids.into_iter()
                .map(|id| ResultItem::new(id, category))
                .collect(),
        )
    }
}
