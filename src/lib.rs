//! Ingestion, querying and merging of IntelliCage behavioral data.
//!
//! An IntelliCage archive (a directory or `.zip` of tab-separated tables and
//! XML descriptors) is loaded into a [`data::Data`]: an immutable, indexed
//! container of visits, nosepokes, log entries, environmental readings and
//! hardware events, with animals, groups and cage topology interned so that
//! identity comparisons are pointer comparisons. Several datasets can be
//! combined with a [`merge::Merger`]; data-quality findings are collected as
//! structured warnings rather than aborting a load.
//!
//! ```no_run
//! use icdata::{Contents, Loader};
//!
//! # fn main() -> icdata::Result<()> {
//! let data = Loader::new(Contents { log: true, ..Contents::default() })
//!     .load(std::path::Path::new("experiment.zip"))?;
//! for visit in data.get_visits(Some(&["Mickey"]), None, None, Some(&["Start"]))? {
//!     println!("{}", visit);
//! }
//! # Ok(())
//! # }
//! ```

pub mod data;
pub mod diag;
pub mod error;
pub mod loader;
pub mod manager;
pub mod merge;
pub mod nodes;
pub mod objectbase;
pub mod table;
pub mod timezones;

pub use data::{Contents, Data};
pub use error::{IcdataError, Result};
pub use loader::Loader;
pub use merge::Merger;
