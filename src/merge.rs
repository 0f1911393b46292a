//! Merging several datasets into one.
//!
//! Sources are processed in order of their start, records are re-keyed into
//! the output through the insertion API, and session boundaries combine to
//! the widest window. The output is frozen and satisfies the same read
//! contract as a loaded dataset, so merges compose.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::data::{Contents, Data};
use crate::diag::Warning;
use crate::error::{IcdataError, Result};

pub struct Merger {
    contents: Contents,
    ignore_mice_differences: bool,
}

impl Merger {
    pub fn new(contents: Contents) -> Merger {
        Merger { contents, ignore_mice_differences: false }
    }

    /// When set, an animal record conflicting with an already merged one
    /// (same name, incompatible sex) keeps the first record instead of
    /// aborting the merge.
    pub fn ignore_mice_differences(mut self, ignore: bool) -> Merger {
        self.ignore_mice_differences = ignore;
        self
    }

    pub fn merge(&self, sources: &[Data]) -> Result<Data> {
        let mut out = Data::new(self.contents);
        let diagnostics = out.diagnostics();

        // undetermined starts sort last; the sort is stable, so equal and
        // undetermined starts keep their given order
        let mut ordered: Vec<&Data> = sources.iter().collect();
        ordered.sort_by_key(|source| (source.get_start().is_none(), source.get_start()));

        let mut session_start: Option<DateTime<Utc>> = None;
        let mut session_end: Option<DateTime<Utc>> = None;
        let mut high_water: Option<DateTime<Utc>> = None;

        for source in ordered {
            let label = source.label();
            debug!(source = %label, "merging dataset");

            if let (Some(reached), Some(start)) = (high_water, source.get_start()) {
                if start < reached {
                    diagnostics.emit(Warning::PossibleVisitOverlap { source: label.clone() });
                }
            }
            if let (Some(merged_end), Some(start)) = (session_end, source.session_start()) {
                if start < merged_end {
                    diagnostics.emit(Warning::SessionBoundaryOverlap { source: label.clone() });
                }
            }
            session_start = min_defined(session_start, source.session_start());
            session_end = max_defined(session_end, source.session_end());

            for name in source.get_mice() {
                let animal = match source.get_animal(&name) {
                    Some(animal) => animal,
                    None => continue,
                };
                match out.register_animal(&animal) {
                    Ok(_) => (),
                    Err(IcdataError::DifferentMouse { .. }) if self.ignore_mice_differences => {
                        debug!(animal = %name, source = %label, "conflicting record ignored");
                    }
                    Err(e) => return Err(e),
                }
            }
            for group in source.get_groups() {
                match out.register_group(&group) {
                    Ok(_) => (),
                    Err(IcdataError::DifferentMouse { .. }) if self.ignore_mice_differences => (),
                    Err(e) => return Err(e),
                }
            }

            let visits = source.get_visits(None, None, None, None)?;
            high_water = max_defined(
                high_water,
                visits.iter().filter_map(|v| v.end().or(Some(v.start()))).max(),
            );
            out.insert_visits(&visits)?;

            if self.contents.log {
                let entries = source.get_log(None, None, None)?;
                high_water =
                    max_defined(high_water, entries.iter().map(|e| e.datetime()).max());
                out.insert_log(&entries)?;
            }
            if self.contents.environment {
                let readings = source.get_environment(None, None, None)?;
                high_water =
                    max_defined(high_water, readings.iter().map(|r| r.datetime()).max());
                out.insert_environment(&readings)?;
            }
            if self.contents.hardware {
                let events = source.get_hardware_events(None, None, None)?;
                high_water = max_defined(high_water, events.iter().map(|e| e.datetime()).max());
                out.insert_hardware_events(&events)?;
            }
        }

        out.set_session_bounds(session_start, session_end);
        out.freeze();
        info!(
            sources = sources.len(),
            mice = out.get_mice().len(),
            "merge complete"
        );
        Ok(out)
    }
}

fn min_defined<T: Ord>(a: Option<T>, b: Option<T>) -> Option<T> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn max_defined<T: Ord>(a: Option<T>, b: Option<T>) -> Option<T> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}
