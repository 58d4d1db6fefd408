//! Import statistics: counters and a human-readable summary.

use std::fmt;

/// Snapshot of an import session's progress.
///
/// Unresolved bindings are an expected, observable state: a binding whose
/// task, profile or transform never resolves stays incomplete without
/// failing the import.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ImportStats {
    pub schedules: usize,
    pub tasks: usize,
    pub profiles: usize,
    pub transforms: usize,
    pub paths: usize,
    pub groups: usize,
    pub bindings: usize,
    /// Bindings delivered to the consumer (fully resolved).
    pub notified_bindings: usize,
    pub timelines: usize,
    pub pages_fetched: usize,
    pub items_parsed: usize,
    pub items_skipped: usize,
}

impl ImportStats {
    /// Bindings still waiting on at least one dependency.
    pub fn unresolved_bindings(&self) -> usize {
        self.bindings.saturating_sub(self.notified_bindings)
    }
}

impl fmt::Display for ImportStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Schedules:  {}", self.schedules)?;
        writeln!(f, "Tasks:      {}", self.tasks)?;
        writeln!(f, "Profiles:   {}", self.profiles)?;
        writeln!(f, "Transforms: {}", self.transforms)?;
        writeln!(f, "Paths:      {}", self.paths)?;
        writeln!(f, "Groups:     {}", self.groups)?;
        writeln!(
            f,
            "Bindings:   {} ({} resolved, {} unresolved)",
            self.bindings,
            self.notified_bindings,
            self.unresolved_bindings()
        )?;
        writeln!(f, "Timelines:  {}", self.timelines)?;
        write!(
            f,
            "Pages:      {} fetched, {} items parsed, {} skipped",
            self.pages_fetched, self.items_parsed, self.items_skipped
        )
    }
}
