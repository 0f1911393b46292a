//! Loading of IntelliCage archives into a frozen `Data`.
//!
//! Two on-disk dialects are supported: the legacy `Version1` exports and the
//! `IntelliCage Plus 3` exports. The differences (column names, 0- versus
//! 1-based location numbering, which tables carry a cage column) are pure
//! data, captured in a per-version `Dialect` record rather than in code
//! paths.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDateTime, Offset, Utc};
use quick_xml::Reader;
use quick_xml::events::Event;
use tracing::{debug, info};

use crate::data::{Contents, Data};
use crate::diag::{Diagnostics, Warning};
use crate::error::{IcdataError, Result};
use crate::manager::{CageManager, Corner, KeeperHasher, SourceManager};
use crate::nodes::{
    Animal, EnvironmentalConditions, Group, HardwareEvent, HardwareKind, LickRecord, LogEntry,
    Nosepoke, NosepokeErrors, HardwareSnapshot, Session, Visit, VisitQuality,
};
use crate::table::{parse_datetime, parse_float, parse_int, parse_seconds, Archive, Table};
use crate::timezones::{infer_offsets, localize};

// ------------- schema dialects -------------
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaVersion {
    Version1,
    IntelliCagePlus3,
}

impl SchemaVersion {
    fn dialect(&self) -> &'static Dialect {
        match self {
            SchemaVersion::Version1 => &VERSION1,
            SchemaVersion::IntelliCagePlus3 => &PLUS3,
        }
    }
}

/// Column names and numbering conventions of one schema version.
struct Dialect {
    animal_name: &'static str,
    animal_tag: &'static str,
    animal_sex: &'static str,
    animal_group: &'static str,
    animal_notes: &'static str,
    visit_id: &'static str,
    visit_animal: &'static str,
    visit_animal_is_tag: bool,
    lick_number: &'static str,
    lick_contact_time: &'static str,
    lick_duration: &'static str,
    log_category: &'static str,
    log_type: &'static str,
    log_notes: &'static str,
    hardware_type: &'static str,
    env_has_cage: bool,
    /// Legacy exports number cages, corners and sides from zero.
    location_offset: i64,
}

impl Dialect {
    fn location(&self, raw: i64) -> u32 {
        (raw + self.location_offset).max(0) as u32
    }
}

static VERSION1: Dialect = Dialect {
    animal_name: "Name",
    animal_tag: "Tag",
    animal_sex: "Sex",
    animal_group: "Group",
    animal_notes: "Notes",
    visit_id: "ID",
    visit_animal: "Animal",
    visit_animal_is_tag: false,
    lick_number: "LicksNumber",
    lick_contact_time: "LickContactTime",
    lick_duration: "LicksDuration",
    log_category: "Category",
    log_type: "Type",
    log_notes: "Notes",
    hardware_type: "Type",
    env_has_cage: false,
    location_offset: 1,
};

static PLUS3: Dialect = Dialect {
    animal_name: "AnimalName",
    animal_tag: "AnimalTag",
    animal_sex: "Sex",
    animal_group: "GroupName",
    animal_notes: "AnimalNotes",
    visit_id: "VisitID",
    visit_animal: "AnimalTag",
    visit_animal_is_tag: true,
    lick_number: "LickNumber",
    lick_contact_time: "LickContactTime",
    lick_duration: "LickDuration",
    log_category: "LogCategory",
    log_type: "LogType",
    log_notes: "LogNotes",
    hardware_type: "HardwareType",
    env_has_cage: true,
    location_offset: 0,
};

fn version_from_descriptor(text: &str) -> Option<SchemaVersion> {
    let normalized: String = text
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
        .collect::<String>()
        .to_lowercase();
    match normalized.as_str() {
        "version1" | "1" => Some(SchemaVersion::Version1),
        "intellicageplus3" | "plus3" => Some(SchemaVersion::IntelliCagePlus3),
        _ => None,
    }
}

/// Schema version from `DataDescriptor.xml`. A missing, unreadable or
/// unrecognized descriptor falls back to the newest dialect with a warning.
fn detect_version(archive: &Archive, diagnostics: &Diagnostics) -> Result<SchemaVersion> {
    let bytes = match archive.read("DataDescriptor.xml")? {
        Some(bytes) => bytes,
        None => {
            diagnostics.emit(Warning::UnknownSchemaVersion { found: None });
            return Ok(SchemaVersion::IntelliCagePlus3);
        }
    };
    let found = xml_element_text(&bytes, "Version")?;
    match found.as_deref().and_then(version_from_descriptor) {
        Some(version) => Ok(version),
        None => {
            diagnostics.emit(Warning::UnknownSchemaVersion { found });
            Ok(SchemaVersion::IntelliCagePlus3)
        }
    }
}

/// Text content of the first occurrence of the named element.
fn xml_element_text(bytes: &[u8], element: &str) -> Result<Option<String>> {
    let text = std::str::from_utf8(bytes).map_err(|e| IcdataError::Malformed {
        table: "xml",
        message: e.to_string(),
    })?;
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);
    let mut inside = false;
    loop {
        match reader.read_event()? {
            Event::Start(e) if e.name().as_ref() == element.as_bytes() => inside = true,
            Event::End(e) if e.name().as_ref() == element.as_bytes() => inside = false,
            Event::Text(t) if inside => return Ok(Some(t.unescape()?.into_owned())),
            Event::Eof => return Ok(None),
            _ => (),
        }
    }
}

// ------------- sessions -------------
fn parse_session_time(raw: &str) -> Result<DateTime<FixedOffset>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z"))
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f %z"))
        .map_err(|_| IcdataError::Malformed {
            table: "Sessions",
            message: format!("not a session timestamp: {:?}", raw),
        })
}

/// Sessions from `Sessions.xml`. An end timestamp in year 1 is the
/// recorder's placeholder for a session still running at export time.
fn extract_sessions(bytes: &[u8]) -> Result<Vec<Session>> {
    let text = std::str::from_utf8(bytes).map_err(|e| IcdataError::Malformed {
        table: "Sessions",
        message: e.to_string(),
    })?;
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);
    let mut sessions = Vec::new();
    let mut field: Option<&'static str> = None;
    let mut start: Option<DateTime<FixedOffset>> = None;
    let mut end: Option<DateTime<FixedOffset>> = None;
    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                field = match e.name().as_ref() {
                    b"Start" => Some("Start"),
                    b"End" => Some("End"),
                    _ => None,
                };
            }
            Event::Text(t) => {
                let value = t.unescape()?.into_owned();
                match field {
                    Some("Start") => start = Some(parse_session_time(&value)?),
                    Some("End") if !value.trim().starts_with("0001") => {
                        end = Some(parse_session_time(&value)?);
                    }
                    _ => (),
                }
            }
            Event::End(e) => {
                field = None;
                if e.name().as_ref() == b"Session" {
                    if let Some(start) = start.take() {
                        sessions.push(Session { start, end: end.take() });
                    }
                    end = None;
                }
            }
            Event::Eof => break,
            _ => (),
        }
    }
    Ok(sessions)
}

/// Collapses the recorded sessions into the single window used for offset
/// recovery: earliest start to latest end, the end undetermined if any
/// session is still open. Overlapping sessions and a mid-window offset
/// change are reported but not fatal.
fn effective_session(sessions: &[Session], diagnostics: &Diagnostics) -> Option<Session> {
    if sessions.is_empty() {
        return None;
    }
    let mut ordered: Vec<&Session> = sessions.iter().collect();
    ordered.sort_by_key(|s| s.start);
    for pair in ordered.windows(2) {
        if pair[0].overlaps(pair[1]) {
            diagnostics.emit(Warning::SessionOverlap);
        }
    }
    let start = sessions.iter().map(|s| s.start).min()?;
    let end = if sessions.iter().all(|s| s.end.is_some()) {
        sessions.iter().filter_map(|s| s.end).max()
    } else {
        None
    };
    if let Some(end) = end {
        if end.offset() != start.offset() {
            diagnostics.emit(Warning::TimezoneChange);
        }
    }
    Some(Session { start, end })
}

// ------------- timestamp resolution -------------
struct TimeResolver {
    session: Option<Session>,
}

impl TimeResolver {
    /// Localizes one timestamp column. Without session metadata the naive
    /// timestamps are taken as UTC.
    fn resolve_column(
        &self,
        table: &'static str,
        cells: &[Option<String>],
    ) -> Result<Vec<Option<DateTime<Utc>>>> {
        let mut naive: Vec<NaiveDateTime> = Vec::new();
        let mut parsed: Vec<Option<NaiveDateTime>> = Vec::with_capacity(cells.len());
        for cell in cells {
            match cell {
                Some(text) => {
                    let t = parse_datetime(table, text)?;
                    naive.push(t);
                    parsed.push(Some(t));
                }
                None => parsed.push(None),
            }
        }
        let offsets = match &self.session {
            Some(session) => infer_offsets(&naive, session)?,
            None => vec![Utc.fix(); naive.len()],
        };
        let mut offsets = offsets.into_iter();
        Ok(parsed
            .into_iter()
            .map(|t| t.map(|t| localize(t, offsets.next().unwrap_or_else(|| Utc.fix()))))
            .collect())
    }
}

// ------------- cell helpers -------------
fn cell<'a>(column: Option<&'a [Option<String>]>, row: usize) -> Option<&'a str> {
    column.and_then(|c| c.get(row)).and_then(|v| v.as_deref())
}

fn required_cell<'a>(
    table: &'static str,
    column: &'a [Option<String>],
    row: usize,
) -> Result<&'a str> {
    column
        .get(row)
        .and_then(|v| v.as_deref())
        .ok_or_else(|| IcdataError::Malformed {
            table,
            message: format!("missing value in row {}", row + 1),
        })
}

fn opt_int(table: &'static str, cell: Option<&str>) -> Result<Option<i64>> {
    cell.map(|c| parse_int(table, c)).transpose()
}

fn opt_seconds(table: &'static str, cell: Option<&str>) -> Result<Option<chrono::TimeDelta>> {
    cell.map(|c| parse_seconds(table, c)).transpose()
}

// ------------- animals -------------
struct AnimalSheet {
    animals: Vec<Animal>,
    /// group name -> member animal names
    groups: Vec<(String, String)>,
    /// transponder tag -> animal name
    tags: HashMap<String, String, KeeperHasher>,
}

fn wrap_animals(dialect: &Dialect, table: &Table) -> Result<AnimalSheet> {
    let names = table.column(dialect.animal_name)?;
    let tags = table.column_opt(dialect.animal_tag);
    let sexes = table.column_opt(dialect.animal_sex);
    let groups = table.column_opt(dialect.animal_group);
    let notes = table.column_opt(dialect.animal_notes);

    let mut sheet = AnimalSheet { animals: Vec::new(), groups: Vec::new(), tags: HashMap::default() };
    for row in 0..table.rows() {
        let name = required_cell("Animals", names, row)?.trim();
        sheet.animals.push(Animal::from_row(
            name,
            cell(tags, row),
            cell(sexes, row),
            cell(notes, row),
        ));
        if let Some(tag) = cell(tags, row) {
            sheet.tags.insert(tag.trim().to_string(), name.to_string());
        }
        if let Some(group) = cell(groups, row) {
            sheet.groups.push((group.trim().to_string(), name.to_string()));
        }
    }
    Ok(sheet)
}

// ------------- nosepokes -------------
struct NosepokeRow {
    start: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
    side: Option<u32>,
    licks: LickRecord,
    errors: NosepokeErrors,
    hardware: HardwareSnapshot,
    line: usize,
}

impl NosepokeRow {
    fn build(self, corner: &Corner, source: &Arc<str>) -> Result<Arc<Nosepoke>> {
        let side = match self.side {
            Some(number) => Some(corner.side_by_number(number)?),
            None => None,
        };
        Ok(Nosepoke::new(
            self.start,
            self.end,
            side,
            self.licks,
            self.errors,
            self.hardware,
            Arc::clone(source),
            self.line,
        ))
    }
}

fn group_nosepokes(
    dialect: &Dialect,
    resolver: &TimeResolver,
    table: &Table,
) -> Result<HashMap<String, Vec<NosepokeRow>, KeeperHasher>> {
    let starts = resolver.resolve_column("Nosepokes", table.column("Start")?)?;
    let ends = resolver.resolve_column("Nosepokes", table.column("End")?)?;
    let ids = table.column("VisitID")?;
    let sides = table.column_opt("Side");
    let lick_number = table.column_opt(dialect.lick_number);
    let lick_contact = table.column_opt(dialect.lick_contact_time);
    let lick_duration = table.column_opt(dialect.lick_duration);
    let side_condition = table.column_opt("SideCondition");
    let side_error = table.column_opt("SideError");
    let time_error = table.column_opt("TimeError");
    let condition_error = table.column_opt("ConditionError");
    let air = table.column_opt("AirState");
    let door = table.column_opt("DoorState");
    let led1 = table.column_opt("LED1State");
    let led2 = table.column_opt("LED2State");
    let led3 = table.column_opt("LED3State");

    let mut grouped: HashMap<String, Vec<NosepokeRow>, KeeperHasher> = HashMap::default();
    for row in 0..table.rows() {
        let id = required_cell("Nosepokes", ids, row)?.trim().to_string();
        let start = starts[row].ok_or_else(|| IcdataError::Malformed {
            table: "Nosepokes",
            message: format!("missing start in row {}", row + 1),
        })?;
        grouped.entry(id).or_default().push(NosepokeRow {
            start,
            end: ends[row],
            side: opt_int("Nosepokes", cell(sides, row))?.map(|raw| dialect.location(raw)),
            licks: LickRecord {
                number: opt_int("Nosepokes", cell(lick_number, row))?,
                contact_time: opt_seconds("Nosepokes", cell(lick_contact, row))?,
                duration: opt_seconds("Nosepokes", cell(lick_duration, row))?,
            },
            errors: NosepokeErrors {
                side_condition: opt_int("Nosepokes", cell(side_condition, row))?,
                side_error: opt_int("Nosepokes", cell(side_error, row))?,
                time_error: opt_int("Nosepokes", cell(time_error, row))?,
                condition_error: opt_int("Nosepokes", cell(condition_error, row))?,
            },
            hardware: HardwareSnapshot {
                air: opt_int("Nosepokes", cell(air, row))?,
                door: opt_int("Nosepokes", cell(door, row))?,
                led1: opt_int("Nosepokes", cell(led1, row))?,
                led2: opt_int("Nosepokes", cell(led2, row))?,
                led3: opt_int("Nosepokes", cell(led3, row))?,
            },
            line: row + 1,
        });
    }
    Ok(grouped)
}

// ------------- visits -------------
#[allow(clippy::too_many_arguments)]
fn wrap_visits(
    data: &mut Data,
    dialect: &Dialect,
    resolver: &TimeResolver,
    table: &Table,
    nosepokes: Option<&Table>,
    tag_to_name: &HashMap<String, String, KeeperHasher>,
    source_name: &str,
    diagnostics: &Diagnostics,
) -> Result<Vec<Arc<Visit>>> {
    let starts = resolver.resolve_column("Visits", table.column("Start")?)?;
    let ends = resolver.resolve_column("Visits", table.column("End")?)?;
    let cage_col = table.column("Cage")?;
    let corner_col = table.column("Corner")?;
    let animal_col = table.column(dialect.visit_animal)?;
    let id_col = table.column_opt(dialect.visit_id);
    let module_col = table.column_opt("ModuleName");
    let corner_condition = table.column_opt("CornerCondition");
    let place_error = table.column_opt("PlaceError");
    let antenna_number = table.column_opt("AntennaNumber");
    let antenna_duration = table.column_opt("AntennaDuration");
    let presence_number = table.column_opt("PresenceNumber");
    let presence_duration = table.column_opt("PresenceDuration");
    let visit_solution = table.column_opt("VisitSolution");

    let mut pokes = match nosepokes {
        Some(table) => group_nosepokes(dialect, resolver, table)?,
        None => HashMap::default(),
    };

    // register animals first: registration borrows the dataset mutably
    let mut row_animals = Vec::with_capacity(table.rows());
    for row in 0..table.rows() {
        let reference = required_cell("Visits", animal_col, row)?.trim();
        let animal = if dialect.visit_animal_is_tag {
            match tag_to_name.get(reference) {
                Some(name) => data.register_animal(&Animal::new(name, None))?,
                // a tag with no roster entry still gets a usable record
                None => data.register_animal(&Animal::from_row(
                    reference,
                    Some(reference),
                    None,
                    None,
                ))?,
            }
        } else {
            data.register_animal(&Animal::new(reference, None))?
        };
        row_animals.push(animal);
    }

    let source = data.sources().get(source_name);
    let mut visits = Vec::with_capacity(table.rows());
    for row in 0..table.rows() {
        let line = row + 1;
        let cage_number = dialect.location(parse_int("Visits", required_cell("Visits", cage_col, row)?)?);
        let corner_number =
            dialect.location(parse_int("Visits", required_cell("Visits", corner_col, row)?)?);
        let cage = data.cages().get(cage_number);
        let corner = cage.corner(corner_number)?;
        let start = starts[row].ok_or_else(|| IcdataError::Malformed {
            table: "Visits",
            message: format!("missing start in row {}", line),
        })?;
        let visit_nosepokes = if nosepokes.is_some() {
            let id = cell(id_col, row).map(str::trim).unwrap_or("");
            let mut rows = pokes.remove(id).unwrap_or_default();
            rows.sort_by_key(|r| (r.start, r.end));
            Some(
                rows.into_iter()
                    .map(|r| r.build(&corner, &source))
                    .collect::<Result<Vec<_>>>()?,
            )
        } else {
            None
        };
        let quality = VisitQuality {
            corner_condition: opt_int("Visits", cell(corner_condition, row))?,
            place_error: opt_int("Visits", cell(place_error, row))?,
            antenna_number: opt_int("Visits", cell(antenna_number, row))?,
            antenna_duration: opt_seconds("Visits", cell(antenna_duration, row))?,
            presence_number: opt_int("Visits", cell(presence_number, row))?,
            presence_duration: opt_seconds("Visits", cell(presence_duration, row))?,
            visit_solution: opt_int("Visits", cell(visit_solution, row))?,
        };
        visits.push(Visit::new(
            start,
            ends[row],
            Arc::clone(&row_animals[row]),
            cage,
            corner,
            cell(module_col, row).map(str::to_string),
            quality,
            Arc::clone(&source),
            line,
            visit_nosepokes,
        ));
    }

    // whatever was not claimed by a visit is reported and dropped
    let mut orphans: Vec<(String, Vec<NosepokeRow>)> = pokes.into_iter().collect();
    orphans.sort_by(|a, b| a.0.cmp(&b.0));
    for (visit_id, rows) in orphans {
        for poke in rows {
            diagnostics
                .emit(Warning::OrphanedNosepoke { visit_id: visit_id.clone(), line: poke.line });
        }
    }
    Ok(visits)
}

// ------------- log / environment / hardware -------------
fn resolve_location(
    dialect: &Dialect,
    cages: &CageManager,
    cage: Option<i64>,
    corner: Option<i64>,
    side: Option<i64>,
) -> Result<(
    Option<Arc<crate::manager::Cage>>,
    Option<Arc<Corner>>,
    Option<Arc<crate::manager::Side>>,
)> {
    let cage = match cage {
        Some(raw) => cages.get(dialect.location(raw)),
        None => return Ok((None, None, None)),
    };
    let corner = match corner {
        Some(raw) => cage.corner(dialect.location(raw))?,
        None => return Ok((Some(cage), None, None)),
    };
    let side = match side {
        Some(raw) => Some(corner.side_by_number(dialect.location(raw))?),
        None => None,
    };
    Ok((Some(cage), Some(corner), side))
}

fn wrap_log(
    dialect: &Dialect,
    resolver: &TimeResolver,
    table: &Table,
    cages: &CageManager,
    sources: &SourceManager,
    source_name: &str,
) -> Result<Vec<Arc<LogEntry>>> {
    let times = resolver.resolve_column("Log", table.column("DateTime")?)?;
    let categories = table.column(dialect.log_category)?;
    let kinds = table.column(dialect.log_type)?;
    let cage_col = table.column_opt("Cage");
    let corner_col = table.column_opt("Corner");
    let side_col = table.column_opt("Side");
    let notes_col = table.column_opt(dialect.log_notes);

    let source = sources.get(source_name);
    let mut entries = Vec::with_capacity(table.rows());
    for row in 0..table.rows() {
        let datetime = times[row].ok_or_else(|| IcdataError::Malformed {
            table: "Log",
            message: format!("missing timestamp in row {}", row + 1),
        })?;
        let (cage, corner, side) = resolve_location(
            dialect,
            cages,
            opt_int("Log", cell(cage_col, row))?,
            opt_int("Log", cell(corner_col, row))?,
            opt_int("Log", cell(side_col, row))?,
        )?;
        entries.push(LogEntry::new(
            datetime,
            required_cell("Log", categories, row)?.to_string(),
            required_cell("Log", kinds, row)?.to_string(),
            cage,
            corner,
            side,
            cell(notes_col, row).map(str::to_string),
            Arc::clone(&source),
            row + 1,
        ));
    }
    Ok(entries)
}

fn wrap_environment(
    dialect: &Dialect,
    resolver: &TimeResolver,
    table: &Table,
    cages: &CageManager,
    sources: &SourceManager,
    source_name: &str,
) -> Result<Vec<Arc<EnvironmentalConditions>>> {
    let times = resolver.resolve_column("Environment", table.column("DateTime")?)?;
    let temperatures = table.column("Temperature")?;
    let illuminations = table.column("Illumination")?;
    let cage_col = if dialect.env_has_cage { table.column_opt("Cage") } else { None };

    let source = sources.get(source_name);
    let mut readings = Vec::with_capacity(table.rows());
    for row in 0..table.rows() {
        let datetime = times[row].ok_or_else(|| IcdataError::Malformed {
            table: "Environment",
            message: format!("missing timestamp in row {}", row + 1),
        })?;
        let cage = opt_int("Environment", cell(cage_col, row))?
            .map(|raw| cages.get(dialect.location(raw)));
        readings.push(EnvironmentalConditions::new(
            datetime,
            parse_float("Environment", required_cell("Environment", temperatures, row)?)?,
            parse_int("Environment", required_cell("Environment", illuminations, row)?)?,
            cage,
            Arc::clone(&source),
            row + 1,
        ));
    }
    Ok(readings)
}

fn wrap_hardware(
    dialect: &Dialect,
    resolver: &TimeResolver,
    table: &Table,
    cages: &CageManager,
    sources: &SourceManager,
    source_name: &str,
) -> Result<Vec<Arc<HardwareEvent>>> {
    let times = resolver.resolve_column("HardwareEvents", table.column("DateTime")?)?;
    let kinds = table.column(dialect.hardware_type)?;
    let states = table.column("State")?;
    let cage_col = table.column_opt("Cage");
    let corner_col = table.column_opt("Corner");
    let side_col = table.column_opt("Side");

    let source = sources.get(source_name);
    let mut events = Vec::with_capacity(table.rows());
    for row in 0..table.rows() {
        let datetime = times[row].ok_or_else(|| IcdataError::Malformed {
            table: "HardwareEvents",
            message: format!("missing timestamp in row {}", row + 1),
        })?;
        let kind = HardwareKind::from_code(parse_int(
            "HardwareEvents",
            required_cell("HardwareEvents", kinds, row)?,
        )?);
        let (cage, corner, side) = resolve_location(
            dialect,
            cages,
            opt_int("HardwareEvents", cell(cage_col, row))?,
            opt_int("HardwareEvents", cell(corner_col, row))?,
            opt_int("HardwareEvents", cell(side_col, row))?,
        )?;
        events.push(HardwareEvent::new(
            datetime,
            kind,
            cage,
            corner,
            side,
            parse_int("HardwareEvents", required_cell("HardwareEvents", states, row)?)?,
            Arc::clone(&source),
            row + 1,
        ));
    }
    Ok(events)
}

// ------------- session markers -------------
const SESSION_STARTED: &str = "Session is started";
const SESSION_STOPPED: &str = "Session is stopped";

/// The apparatus writes explicit session markers into the log as
/// Info/Application notes. The earliest start and the latest stop win.
fn session_markers(
    log: &[Arc<LogEntry>],
    diagnostics: &Diagnostics,
) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
    let mut start = None;
    let mut end = None;
    for entry in log {
        if entry.category() != "Info" || entry.kind() != "Application" {
            continue;
        }
        match entry.notes().map(str::trim) {
            Some(SESSION_STARTED) => {
                if start.is_none() {
                    start = Some(entry.datetime());
                }
            }
            Some(SESSION_STOPPED) => end = Some(entry.datetime()),
            Some(other) => {
                diagnostics.emit(Warning::UnknownInfoNote { note: other.to_string() });
            }
            None => (),
        }
    }
    (start, end)
}

// ------------- Loader -------------
/// Loads one archive (a directory or a `.zip`) into a frozen `Data`.
pub struct Loader {
    contents: Contents,
}

impl Default for Loader {
    fn default() -> Self {
        Loader::new(Contents::default())
    }
}

impl Loader {
    pub fn new(contents: Contents) -> Loader {
        Loader { contents }
    }

    pub fn load(&self, path: &Path) -> Result<Data> {
        let mut data = Data::new(self.contents);
        let diagnostics = data.diagnostics();
        let source_name = path.display().to_string();
        let archive = Archive::open(path)?;

        let version = detect_version(&archive, &diagnostics)?;
        let dialect = version.dialect();
        info!(source = %source_name, ?version, "loading archive");

        let sessions = match archive.read("Sessions.xml")? {
            Some(bytes) => extract_sessions(&bytes)?,
            None => Vec::new(),
        };
        let session = effective_session(&sessions, &diagnostics);
        let resolver = TimeResolver { session: session.clone() };

        let mut tag_to_name = HashMap::default();
        if let Some(bytes) = archive.read("Animals.txt")? {
            let table = Table::parse("Animals", &bytes)?;
            let sheet = wrap_animals(dialect, &table)?;
            debug!(animals = sheet.animals.len(), "roster loaded");
            for animal in &sheet.animals {
                data.register_animal(animal)?;
            }
            for (group_name, member) in &sheet.groups {
                let group = Group::new(group_name);
                if let Some(animal) = data.get_animal(member) {
                    group.add_member(animal);
                }
                data.register_group(&group)?;
            }
            tag_to_name = sheet.tags;
        }

        let visits_bytes =
            archive.read("Visits.txt")?.ok_or_else(|| IcdataError::Malformed {
                table: "Visits",
                message: "missing from archive".to_string(),
            })?;
        let visits_table = Table::parse("Visits", &visits_bytes)?;
        let nosepokes_table = if self.contents.nosepokes {
            archive
                .read("Nosepokes.txt")?
                .map(|bytes| Table::parse("Nosepokes", &bytes))
                .transpose()?
        } else {
            None
        };
        let visits = wrap_visits(
            &mut data,
            dialect,
            &resolver,
            &visits_table,
            nosepokes_table.as_ref(),
            &tag_to_name,
            &source_name,
            &diagnostics,
        )?;
        data.insert_visits(&visits)?;

        let mut marker_start = None;
        let mut marker_end = None;
        if self.contents.log {
            if let Some(bytes) = archive.read("Log.txt")? {
                let table = Table::parse("Log", &bytes)?;
                let entries = wrap_log(
                    dialect,
                    &resolver,
                    &table,
                    data.cages(),
                    data.sources(),
                    &source_name,
                )?;
                (marker_start, marker_end) = session_markers(&entries, &diagnostics);
                data.insert_log(&entries)?;
            }
        }
        if self.contents.environment {
            if let Some(bytes) = archive.read("Environment.txt")? {
                let table = Table::parse("Environment", &bytes)?;
                let readings = wrap_environment(
                    dialect,
                    &resolver,
                    &table,
                    data.cages(),
                    data.sources(),
                    &source_name,
                )?;
                data.insert_environment(&readings)?;
            }
        }
        if self.contents.hardware {
            if let Some(bytes) = archive.read("HardwareEvents.txt")? {
                let table = Table::parse("HardwareEvents", &bytes)?;
                let events = wrap_hardware(
                    dialect,
                    &resolver,
                    &table,
                    data.cages(),
                    data.sources(),
                    &source_name,
                )?;
                data.insert_hardware_events(&events)?;
            }
        }

        let session_start =
            marker_start.or_else(|| session.as_ref().map(|s| s.start.with_timezone(&Utc)));
        let session_end = marker_end
            .or_else(|| session.as_ref().and_then(|s| s.end).map(|e| e.with_timezone(&Utc)));
        data.set_session_bounds(session_start, session_end);

        data.freeze();
        Ok(data)
    }
}
