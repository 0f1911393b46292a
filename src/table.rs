//! Raw access to an IntelliCage archive: a directory or a zip file holding
//! tab-separated tables and XML descriptors, either at the root or under an
//! `IntelliCage/` subdirectory.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::NaiveDateTime;
use csv::ReaderBuilder;
use tracing::debug;
use zip::ZipArchive;
use zip::result::ZipError;

use crate::error::{IcdataError, Result};
use crate::manager::KeeperHasher;

// ------------- Archive -------------
pub enum Archive {
    Dir(PathBuf),
    Zip(Mutex<ZipArchive<File>>),
}

impl Archive {
    pub fn open(path: &Path) -> Result<Archive> {
        if path.is_dir() {
            Ok(Archive::Dir(path.to_path_buf()))
        } else {
            let file = File::open(path)?;
            Ok(Archive::Zip(Mutex::new(ZipArchive::new(file)?)))
        }
    }

    /// Reads a member file, looking first at the archive root and then under
    /// `IntelliCage/`. A missing member is not an error: optional tables are
    /// simply absent from many archives.
    pub fn read(&self, name: &str) -> Result<Option<Vec<u8>>> {
        for candidate in [name.to_string(), format!("IntelliCage/{}", name)] {
            if let Some(bytes) = self.read_exact_path(&candidate)? {
                debug!(member = %candidate, bytes = bytes.len(), "read archive member");
                return Ok(Some(bytes));
            }
        }
        Ok(None)
    }

    fn read_exact_path(&self, name: &str) -> Result<Option<Vec<u8>>> {
        match self {
            Archive::Dir(root) => {
                let path = root.join(name);
                if !path.is_file() {
                    return Ok(None);
                }
                Ok(Some(std::fs::read(path)?))
            }
            Archive::Zip(zip) => {
                let mut zip = zip.lock().unwrap();
                let mut member = match zip.by_name(name) {
                    Ok(member) => member,
                    Err(ZipError::FileNotFound) => return Ok(None),
                    Err(e) => return Err(e.into()),
                };
                let mut bytes = Vec::with_capacity(member.size() as usize);
                member.read_to_end(&mut bytes)?;
                Ok(Some(bytes))
            }
        }
    }
}

// ------------- Table -------------
/// A parsed tab-separated table, stored column-major. Empty cells become
/// `None` so that downstream coercions see missing values uniformly.
pub struct Table {
    name: &'static str,
    columns: HashMap<String, Vec<Option<String>>, KeeperHasher>,
    rows: usize,
}

impl Table {
    pub fn parse(name: &'static str, bytes: &[u8]) -> Result<Table> {
        let mut reader = ReaderBuilder::new()
            .delimiter(b'\t')
            .flexible(true)
            .from_reader(bytes);
        let header: Vec<String> =
            reader.headers()?.iter().map(|h| h.trim().to_string()).collect();
        let mut cells: Vec<Vec<Option<String>>> = vec![Vec::new(); header.len()];
        let mut rows = 0;
        for record in reader.records() {
            let record = record?;
            for (index, cell) in cells.iter_mut().enumerate() {
                cell.push(match record.get(index) {
                    Some("") | None => None,
                    Some(value) => Some(value.to_string()),
                });
            }
            rows += 1;
        }
        let columns = header.into_iter().zip(cells).collect();
        Ok(Table { name, columns, rows })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.contains_key(column)
    }

    pub fn column(&self, column: &str) -> Result<&[Option<String>]> {
        self.columns.get(column).map(Vec::as_slice).ok_or_else(|| IcdataError::Malformed {
            table: self.name,
            message: format!("missing column {}", column),
        })
    }

    pub fn column_opt(&self, column: &str) -> Option<&[Option<String>]> {
        self.columns.get(column).map(Vec::as_slice)
    }
}

// ------------- cell coercions -------------
pub(crate) fn parse_int(table: &'static str, cell: &str) -> Result<i64> {
    cell.trim().parse().map_err(|_| IcdataError::Malformed {
        table,
        message: format!("not an integer: {:?}", cell),
    })
}

/// Floats may use a comma as the decimal separator, depending on the locale
/// of the machine that produced the archive.
pub(crate) fn parse_float(table: &'static str, cell: &str) -> Result<f64> {
    let normalized = cell.trim().replace(',', ".");
    normalized.parse().map_err(|_| IcdataError::Malformed {
        table,
        message: format!("not a number: {:?}", cell),
    })
}

/// Timestamps are recorded naive, in the local time of the recording
/// machine; the offset is recovered later from session metadata.
pub(crate) fn parse_datetime(table: &'static str, cell: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(cell.trim(), "%Y-%m-%d %H:%M:%S%.f").map_err(|_| {
        IcdataError::Malformed { table, message: format!("not a timestamp: {:?}", cell) }
    })
}

pub(crate) fn parse_seconds(table: &'static str, cell: &str) -> Result<chrono::TimeDelta> {
    let seconds = parse_float(table, cell)?;
    chrono::TimeDelta::new(seconds.trunc() as i64, (seconds.fract() * 1e9).round() as u32)
        .ok_or_else(|| IcdataError::Malformed {
            table,
            message: format!("duration out of range: {:?}", cell),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_cells_are_column_major_with_missing_as_none() {
        let raw = b"VisitID\tStart\tEnd\n1\t2012-12-18 12:00:00\t\n2\t2012-12-18 12:13:00\t2012-12-18 12:15:00\n";
        let table = Table::parse("Visits", raw).unwrap();
        assert_eq!(table.rows(), 2);
        assert_eq!(table.column("VisitID").unwrap()[1].as_deref(), Some("2"));
        assert_eq!(table.column("End").unwrap()[0], None);
        assert!(table.column("Side").is_err());
        assert!(!table.has_column("Side"));
    }

    #[test]
    fn short_rows_pad_with_none() {
        let raw = b"A\tB\tC\n1\t2\n";
        let table = Table::parse("test", raw).unwrap();
        assert_eq!(table.column("C").unwrap()[0], None);
    }

    #[test]
    fn comma_decimal_separator_is_accepted() {
        assert_eq!(parse_float("test", "21,5").unwrap(), 21.5);
        assert_eq!(parse_float("test", "21.5").unwrap(), 21.5);
        assert!(parse_float("test", "warm").is_err());
    }

    #[test]
    fn timestamps_parse_with_and_without_fraction() {
        let whole = parse_datetime("test", "2012-12-18 12:13:14").unwrap();
        let fractional = parse_datetime("test", "2012-12-18 12:13:14.500").unwrap();
        assert_eq!((fractional - whole).num_milliseconds(), 500);
    }

    #[test]
    fn seconds_parse_to_subsecond_precision() {
        let delta = parse_seconds("test", "2,25").unwrap();
        assert_eq!(delta.num_milliseconds(), 2250);
    }

    #[test]
    fn directory_archives_look_under_intellicage() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("IntelliCage")).unwrap();
        std::fs::write(dir.path().join("Animals.txt"), b"root").unwrap();
        std::fs::write(dir.path().join("IntelliCage").join("Visits.txt"), b"nested").unwrap();

        let archive = Archive::open(dir.path()).unwrap();
        assert_eq!(archive.read("Animals.txt").unwrap().unwrap(), b"root");
        assert_eq!(archive.read("Visits.txt").unwrap().unwrap(), b"nested");
        assert_eq!(archive.read("Missing.txt").unwrap(), None);
    }
}
