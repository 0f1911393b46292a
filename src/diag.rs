//! Structured warning channel.
//!
//! Data-quality findings (orphaned records, temporal overlaps, multi-cage
//! residency) never abort a load. They are recorded here so that callers can
//! inspect them programmatically, and also emitted through `tracing` so they
//! show up in logs without any extra wiring.

use std::fmt;
use std::sync::{Arc, Mutex};

use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// The version descriptor was missing, unreadable or named an unknown
    /// version; the newest known dialect was used instead.
    UnknownSchemaVersion { found: Option<String> },
    /// A nosepoke row referenced a visit id with no matching visit row.
    OrphanedNosepoke { visit_id: String, line: usize },
    /// Two sessions of one archive overlap in time.
    SessionOverlap,
    /// The timezone offset differs between a session's start and end.
    TimezoneChange,
    /// A merged source begins before the latest event merged so far.
    PossibleVisitOverlap { source: String },
    /// Overlap of explicit session boundaries across merged sources.
    SessionBoundaryOverlap { source: String },
    /// One animal was observed visiting more than one cage.
    MultipleCages { animal: String, cages: Vec<u32> },
    /// A cage was requested for a mouse with no recorded visits.
    MouseNotFound { mouse: String },
    /// An Info/Application log note other than session start/stop markers.
    UnknownInfoNote { note: String },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Warning::UnknownSchemaVersion { found: Some(v) } => {
                write!(f, "Unknown data version: {}", v)
            }
            Warning::UnknownSchemaVersion { found: None } => {
                write!(f, "Unreadable or missing data descriptor")
            }
            Warning::OrphanedNosepoke { visit_id, line } => {
                write!(f, "Unmatched nosepoke (line {}): visit {}", line, visit_id)
            }
            Warning::SessionOverlap => write!(f, "Temporal overlap of sessions"),
            Warning::TimezoneChange => write!(f, "Timezone changed within a session"),
            Warning::PossibleVisitOverlap { source } => {
                write!(f, "Possible temporal overlap of visits when merging {}", source)
            }
            Warning::SessionBoundaryOverlap { source } => {
                write!(f, "Overlap of sessions detected when merging {}", source)
            }
            Warning::MultipleCages { animal, cages } => {
                let cages: Vec<String> = cages.iter().map(u32::to_string).collect();
                write!(f, "Animal {} found in multiple cages ({})", animal, cages.join(", "))
            }
            Warning::MouseNotFound { mouse } => {
                write!(f, "Mouse {} not found in any cage", mouse)
            }
            Warning::UnknownInfoNote { note } => {
                write!(f, "Unknown Info/Application message: {}", note)
            }
        }
    }
}

/// Collects warnings for later inspection and forwards them to `tracing`.
///
/// A single sink is shared (via `Arc`) between a dataset, its loader and any
/// merger consuming it, so everything observed during one logical load ends
/// up in one place.
#[derive(Debug, Default)]
pub struct Diagnostics {
    recorded: Mutex<Vec<Warning>>,
}

impl Diagnostics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn emit(&self, warning: Warning) {
        warn!("{}", warning);
        self.recorded.lock().unwrap().push(warning);
    }

    /// A snapshot of everything recorded so far, in emission order.
    pub fn warnings(&self) -> Vec<Warning> {
        self.recorded.lock().unwrap().clone()
    }

    pub fn count_matching(&self, predicate: impl Fn(&Warning) -> bool) -> usize {
        self.recorded.lock().unwrap().iter().filter(|w| predicate(w)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.recorded.lock().unwrap().is_empty()
    }
}
