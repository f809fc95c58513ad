use std::collections::HashMap;
use tracing::debug;

/// A pure per-column normalizer: raw field value in, corrected value out.
pub type ColumnFixer = fn(&str) -> String;

/// Dispatch table mapping column names to their normalizers. Columns
/// without an entry pass their values through unchanged, so new fixers can
/// be registered without touching the row loop.
pub struct FixerRegistry {
    fixers: HashMap<String, ColumnFixer>,
}

impl FixerRegistry {
    /// A registry with no normalizers; every column is a passthrough.
    pub fn empty() -> Self {
        Self {
            fixers: HashMap::new(),
        }
    }

    /// The normalizers a standard SDS export needs.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register("LAT", fix_latlong);
        registry
    }

    pub fn register(&mut self, column: impl Into<String>, fixer: ColumnFixer) {
        self.fixers.insert(column.into(), fixer);
    }

    /// Apply the fixer registered for `column`, or identity when none is.
    pub fn fix(&self, column: &str, raw: &str) -> String {
        match self.fixers.get(column) {
            Some(fixer) => fixer(raw),
            None => raw.to_string(),
        }
    }
}

impl Default for FixerRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

/// Coordinate normalizer for the `LAT` column.
///
/// TODO: convert degree/minute/second coordinates to decimal degrees once
/// the upstream export's coordinate format is confirmed. Until then the raw
/// value passes through unchanged rather than being rewritten on a guess.
pub fn fix_latlong(raw: &str) -> String {
    debug!(value = raw, "latlong conversion pending, passing through");
    raw.to_string()
}
