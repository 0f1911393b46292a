//! The unified record model for IntelliCage data.
//!
//! All records are immutable after construction. The only sanctioned
//! mutation is `Animal::merge` / `Group::merge`, which touch exactly the
//! mergeable fields (tags, notes, a previously unknown sex, group
//! membership) behind interior locks. Everything else changes only by
//! `adopt`ing a record into another dataset, which produces a fresh record
//! whose cage/corner/side/source references are canonical to the target.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock, RwLock, Weak};

use chrono::{DateTime, TimeDelta, Utc};

use crate::error::{IcdataError, Result};
use crate::manager::{Cage, CageManager, Corner, Side, SourceManager};
use crate::objectbase::{AttrValue, Attributed};

// ------------- Animal -------------
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Sex {
    Female,
    Male,
    Other(String),
}

impl FromStr for Sex {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.trim() {
            "Female" | "female" | "F" | "f" => Sex::Female,
            "Male" | "male" | "M" | "m" => Sex::Male,
            other => Sex::Other(other.to_string()),
        })
    }
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Sex::Female => write!(f, "Female"),
            Sex::Male => write!(f, "Male"),
            Sex::Other(s) => write!(f, "{}", s),
        }
    }
}

/// An animal, identified by its name. One physical animal may carry several
/// transponder tags over its lifetime, so tags (and notes) accumulate on
/// merge; sex may only be filled in when previously unknown.
#[derive(Debug)]
pub struct Animal {
    name: String,
    tags: RwLock<BTreeSet<String>>,
    sex: RwLock<Option<Sex>>,
    notes: RwLock<BTreeSet<String>>,
}

impl Animal {
    pub fn new(name: &str, sex: Option<Sex>) -> Animal {
        Animal {
            name: name.to_string(),
            tags: RwLock::new(BTreeSet::new()),
            sex: RwLock::new(sex),
            notes: RwLock::new(BTreeSet::new()),
        }
    }

    /// One animal as read from a row of the `Animals` table.
    pub fn from_row(
        name: &str,
        tag: Option<&str>,
        sex: Option<&str>,
        notes: Option<&str>,
    ) -> Animal {
        let animal = Animal::new(name, sex.map(|s| s.parse().unwrap_or(Sex::Other(s.into()))));
        if let Some(tag) = tag {
            animal.tags.write().unwrap().insert(tag.trim().to_string());
        }
        if let Some(notes) = notes {
            animal.notes.write().unwrap().insert(notes.to_string());
        }
        animal
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tags(&self) -> BTreeSet<String> {
        self.tags.read().unwrap().clone()
    }

    pub fn sex(&self) -> Option<Sex> {
        self.sex.read().unwrap().clone()
    }

    pub fn notes(&self) -> BTreeSet<String> {
        self.notes.read().unwrap().clone()
    }

    /// Unions tags and notes, fills in a previously unknown sex. Two
    /// records of the same name with incompatible known sexes describe
    /// different mice and must not be merged.
    pub fn merge(&self, other: &Animal) -> Result<()> {
        // merging a record into itself must not reacquire its own locks
        if std::ptr::eq(self, other) {
            return Ok(());
        }
        if self.name != other.name {
            return Err(IcdataError::DifferentMouse {
                name: other.name.clone(),
                details: format!("name {} != {}", self.name, other.name),
            });
        }
        {
            let mut sex = self.sex.write().unwrap();
            match (sex.as_ref(), other.sex()) {
                (Some(mine), Some(theirs)) if *mine != theirs => {
                    return Err(IcdataError::DifferentMouse {
                        name: self.name.clone(),
                        details: format!("sex {} != {}", mine, theirs),
                    });
                }
                (None, Some(theirs)) => *sex = Some(theirs),
                _ => (),
            }
        }
        self.tags.write().unwrap().extend(other.tags());
        self.notes.write().unwrap().extend(other.notes());
        Ok(())
    }

    /// A detached deep copy with the current state of the mergeable fields.
    pub fn clone_detached(&self) -> Animal {
        Animal {
            name: self.name.clone(),
            tags: RwLock::new(self.tags()),
            sex: RwLock::new(self.sex()),
            notes: RwLock::new(self.notes()),
        }
    }
}

impl fmt::Display for Animal {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

// ------------- Group -------------
/// A named group of animals. Members are added idempotently (by name) and
/// merging two same-named groups unions their membership.
#[derive(Debug)]
pub struct Group {
    name: String,
    members: RwLock<Vec<Arc<Animal>>>,
}

impl Group {
    pub fn new(name: &str) -> Group {
        Group { name: name.to_string(), members: RwLock::new(Vec::new()) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn members(&self) -> Vec<Arc<Animal>> {
        self.members.read().unwrap().clone()
    }

    pub fn add_member(&self, animal: Arc<Animal>) {
        let mut members = self.members.write().unwrap();
        if !members.iter().any(|a| a.name() == animal.name()) {
            members.push(animal);
        }
    }

    pub fn merge(&self, animals: impl IntoIterator<Item = Arc<Animal>>) {
        for animal in animals {
            self.add_member(animal);
        }
    }
}

// ------------- Session -------------
/// One continuous recording window of the apparatus, with the recorded
/// local UTC offsets preserved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub start: DateTime<chrono::FixedOffset>,
    pub end: Option<DateTime<chrono::FixedOffset>>,
}

impl Session {
    pub fn overlaps(&self, other: &Session) -> bool {
        let other_end = match other.end {
            Some(end) => end,
            None => return false,
        };
        match self.end {
            Some(end) => self.start < other_end && other.start < end,
            None => false,
        }
    }
}

// ------------- Nosepoke -------------
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LickRecord {
    pub number: Option<i64>,
    pub contact_time: Option<TimeDelta>,
    pub duration: Option<TimeDelta>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NosepokeErrors {
    pub side_condition: Option<i64>,
    pub side_error: Option<i64>,
    pub time_error: Option<i64>,
    pub condition_error: Option<i64>,
}

/// Hardware state captured at the moment of the nosepoke.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HardwareSnapshot {
    pub air: Option<i64>,
    pub door: Option<i64>,
    pub led1: Option<i64>,
    pub led2: Option<i64>,
    pub led3: Option<i64>,
}

/// A sub-event of a visit: the animal pokes one side of the corner.
///
/// The back-reference to the owning visit is non-owning and is bound
/// exactly once, by `Visit::new`, after the full nosepoke tuple exists.
#[derive(Debug)]
pub struct Nosepoke {
    start: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
    side: Option<Arc<Side>>,
    licks: LickRecord,
    errors: NosepokeErrors,
    hardware: HardwareSnapshot,
    source: Arc<str>,
    line: usize,
    visit: OnceLock<Weak<Visit>>,
}

impl Nosepoke {
    pub fn new(
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
        side: Option<Arc<Side>>,
        licks: LickRecord,
        errors: NosepokeErrors,
        hardware: HardwareSnapshot,
        source: Arc<str>,
        line: usize,
    ) -> Arc<Nosepoke> {
        Arc::new(Nosepoke {
            start,
            end,
            side,
            licks,
            errors,
            hardware,
            source,
            line,
            visit: OnceLock::new(),
        })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.end
    }

    pub fn side(&self) -> Option<Arc<Side>> {
        self.side.clone()
    }

    pub fn door(&self) -> Option<&'static str> {
        self.side.as_ref().map(|s| s.door())
    }

    pub fn licks(&self) -> LickRecord {
        self.licks
    }

    pub fn errors(&self) -> NosepokeErrors {
        self.errors
    }

    pub fn hardware(&self) -> HardwareSnapshot {
        self.hardware
    }

    pub fn source(&self) -> Arc<str> {
        Arc::clone(&self.source)
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn duration(&self) -> Result<TimeDelta> {
        match self.end {
            Some(end) => Ok(end - self.start),
            None => Err(IcdataError::DurationCannotBeCalculated),
        }
    }

    /// The owning visit, if still alive.
    pub fn visit(&self) -> Option<Arc<Visit>> {
        self.visit.get().and_then(Weak::upgrade)
    }

    fn bind_to_visit(&self, visit: &Arc<Visit>) {
        let _ = self.visit.set(Arc::downgrade(visit));
    }

    fn adopt(&self, sources: &SourceManager, corner: &Corner) -> Result<Arc<Nosepoke>> {
        let side = match &self.side {
            Some(side) => Some(corner.side_by_number(side.number())?),
            None => None,
        };
        Ok(Nosepoke::new(
            self.start,
            self.end,
            side,
            self.licks,
            self.errors,
            self.hardware,
            sources.get(&self.source),
            self.line,
        ))
    }
}

impl fmt::Display for Nosepoke {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "< Nosepoke to {} door (at {}) >",
            self.door().unwrap_or("?"),
            self.start.format("%Y-%m-%d %H:%M:%S%.3f")
        )
    }
}

// ------------- Visit -------------
/// Optional per-visit quality and error counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VisitQuality {
    pub corner_condition: Option<i64>,
    pub place_error: Option<i64>,
    pub antenna_number: Option<i64>,
    pub antenna_duration: Option<TimeDelta>,
    pub presence_number: Option<i64>,
    pub presence_duration: Option<TimeDelta>,
    pub visit_solution: Option<i64>,
}

/// The central event record: one animal entering one corner of its cage.
///
/// `nosepokes` is a tri-state: `None` means nosepoke data was not requested
/// at load time, `Some(vec![])` means it was and the visit had none.
#[derive(Debug)]
pub struct Visit {
    start: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
    animal: Arc<Animal>,
    cage: Arc<Cage>,
    corner: Arc<Corner>,
    module: Option<String>,
    quality: VisitQuality,
    source: Arc<str>,
    line: usize,
    nosepokes: Option<Vec<Arc<Nosepoke>>>,
}

impl Visit {
    pub fn new(
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
        animal: Arc<Animal>,
        cage: Arc<Cage>,
        corner: Arc<Corner>,
        module: Option<String>,
        quality: VisitQuality,
        source: Arc<str>,
        line: usize,
        nosepokes: Option<Vec<Arc<Nosepoke>>>,
    ) -> Arc<Visit> {
        let visit = Arc::new(Visit {
            start,
            end,
            animal,
            cage,
            corner,
            module,
            quality,
            source,
            line,
            nosepokes,
        });
        if let Some(nosepokes) = &visit.nosepokes {
            for nosepoke in nosepokes {
                nosepoke.bind_to_visit(&visit);
            }
        }
        visit
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.end
    }

    pub fn animal(&self) -> Arc<Animal> {
        Arc::clone(&self.animal)
    }

    pub fn cage(&self) -> Arc<Cage> {
        Arc::clone(&self.cage)
    }

    pub fn corner(&self) -> Arc<Corner> {
        Arc::clone(&self.corner)
    }

    pub fn module(&self) -> Option<&str> {
        self.module.as_deref()
    }

    pub fn quality(&self) -> VisitQuality {
        self.quality
    }

    pub fn source(&self) -> Arc<str> {
        Arc::clone(&self.source)
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn nosepokes(&self) -> Option<&[Arc<Nosepoke>]> {
        self.nosepokes.as_deref()
    }

    pub fn duration(&self) -> Result<TimeDelta> {
        match self.end {
            Some(end) => Ok(end - self.start),
            None => Err(IcdataError::DurationCannotBeCalculated),
        }
    }

    // Aggregates over loaded nosepokes; None when nosepoke data was not
    // requested at load time.
    pub fn nosepoke_number(&self) -> Option<usize> {
        self.nosepokes.as_ref().map(Vec::len)
    }

    pub fn nosepoke_duration(&self) -> Option<TimeDelta> {
        self.sum_nosepokes(|np| np.duration().ok())
    }

    pub fn lick_number(&self) -> Option<i64> {
        self.nosepokes
            .as_ref()
            .map(|nps| nps.iter().filter_map(|np| np.licks().number).sum())
    }

    pub fn lick_duration(&self) -> Option<TimeDelta> {
        self.sum_nosepokes(|np| np.licks().duration)
    }

    pub fn lick_contact_time(&self) -> Option<TimeDelta> {
        self.sum_nosepokes(|np| np.licks().contact_time)
    }

    fn sum_nosepokes(
        &self,
        field: impl Fn(&Arc<Nosepoke>) -> Option<TimeDelta>,
    ) -> Option<TimeDelta> {
        self.nosepokes.as_ref().map(|nps| {
            nps.iter()
                .filter_map(&field)
                .fold(TimeDelta::zero(), |acc, delta| acc + delta)
        })
    }

    /// A copy of this visit whose animal, cage topology and source are the
    /// given canonical instances (re-keying when a record moves between
    /// datasets). Child nosepokes are adopted along with the visit and
    /// bound to the fresh copy.
    pub fn adopt(
        &self,
        sources: &SourceManager,
        cages: &CageManager,
        animal: Arc<Animal>,
    ) -> Result<Arc<Visit>> {
        let cage = cages.get(self.cage.number());
        let corner = cage.corner(self.corner.number())?;
        let nosepokes = match &self.nosepokes {
            Some(nps) => Some(
                nps.iter()
                    .map(|np| np.adopt(sources, &corner))
                    .collect::<Result<Vec<_>>>()?,
            ),
            None => None,
        };
        Ok(Visit::new(
            self.start,
            self.end,
            animal,
            cage,
            corner,
            self.module.clone(),
            self.quality,
            sources.get(&self.source),
            self.line,
            nosepokes,
        ))
    }
}

impl fmt::Display for Visit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "< Visit of \"{}\" to corner #{} of cage #{} (at {}) >",
            self.animal,
            self.corner,
            self.cage,
            self.start.format("%Y-%m-%d %H:%M:%S%.3f")
        )
    }
}

impl Attributed for Visit {
    const KIND: &'static str = "Visit";

    fn attribute(&self, path: &str) -> Result<AttrValue> {
        Ok(match path {
            "Start" => AttrValue::Time(self.start),
            "End" => self.end.into(),
            "Duration" => AttrValue::seconds(self.duration()?),
            "Animal" | "Animal.Name" => AttrValue::Text(self.animal.name().to_string()),
            "Animal.Sex" => self.animal.sex().map(|s| s.to_string()).into(),
            "Cage" => AttrValue::Int(self.cage.number() as i64),
            "Corner" => AttrValue::Int(self.corner.number() as i64),
            "Module" => self.module.clone().into(),
            "CornerCondition" => self.quality.corner_condition.into(),
            "PlaceError" => self.quality.place_error.into(),
            "AntennaNumber" => self.quality.antenna_number.into(),
            "AntennaDuration" => opt_seconds(self.quality.antenna_duration),
            "PresenceNumber" => self.quality.presence_number.into(),
            "PresenceDuration" => opt_seconds(self.quality.presence_duration),
            "VisitSolution" => self.quality.visit_solution.into(),
            "NosepokeNumber" => self.nosepoke_number().map(|n| n as i64).into(),
            "NosepokeDuration" => opt_seconds(self.nosepoke_duration()),
            "LickNumber" => self.lick_number().into(),
            "LickDuration" => opt_seconds(self.lick_duration()),
            "LickContactTime" => opt_seconds(self.lick_contact_time()),
            "_source" => AttrValue::Text(self.source.to_string()),
            "_line" => AttrValue::Int(self.line as i64),
            _ => return Err(Self::unknown_attribute(path)),
        })
    }
}

fn opt_seconds(delta: Option<TimeDelta>) -> AttrValue {
    match delta {
        Some(delta) => AttrValue::seconds(delta),
        None => AttrValue::Null,
    }
}

// ------------- LogEntry -------------
#[derive(Debug)]
pub struct LogEntry {
    datetime: DateTime<Utc>,
    category: String,
    kind: String,
    cage: Option<Arc<Cage>>,
    corner: Option<Arc<Corner>>,
    side: Option<Arc<Side>>,
    notes: Option<String>,
    source: Arc<str>,
    line: usize,
}

impl LogEntry {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        datetime: DateTime<Utc>,
        category: String,
        kind: String,
        cage: Option<Arc<Cage>>,
        corner: Option<Arc<Corner>>,
        side: Option<Arc<Side>>,
        notes: Option<String>,
        source: Arc<str>,
        line: usize,
    ) -> Arc<LogEntry> {
        Arc::new(LogEntry { datetime, category, kind, cage, corner, side, notes, source, line })
    }

    pub fn datetime(&self) -> DateTime<Utc> {
        self.datetime
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn cage(&self) -> Option<Arc<Cage>> {
        self.cage.clone()
    }

    pub fn corner(&self) -> Option<Arc<Corner>> {
        self.corner.clone()
    }

    pub fn side(&self) -> Option<Arc<Side>> {
        self.side.clone()
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn source(&self) -> Arc<str> {
        Arc::clone(&self.source)
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn adopt(&self, sources: &SourceManager, cages: &CageManager) -> Result<Arc<LogEntry>> {
        let (cage, corner, side) =
            adopt_location(cages, self.cage.as_deref(), self.corner.as_deref(), self.side.as_deref())?;
        Ok(LogEntry::new(
            self.datetime,
            self.category.clone(),
            self.kind.clone(),
            cage,
            corner,
            side,
            self.notes.clone(),
            sources.get(&self.source),
            self.line,
        ))
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "< Log {}, {} (at {}) >",
            self.category,
            self.kind,
            self.datetime.format("%Y-%m-%d %H:%M:%S%.3f")
        )
    }
}

impl Attributed for LogEntry {
    const KIND: &'static str = "LogEntry";

    fn attribute(&self, path: &str) -> Result<AttrValue> {
        Ok(match path {
            "DateTime" => AttrValue::Time(self.datetime),
            "Category" => AttrValue::Text(self.category.clone()),
            "Type" => AttrValue::Text(self.kind.clone()),
            "Cage" => self.cage.as_ref().map(|c| c.number()).into(),
            "Corner" => self.corner.as_ref().map(|c| c.number()).into(),
            "Side" => self.side.as_ref().map(|s| s.number()).into(),
            "Notes" => self.notes.clone().into(),
            "_source" => AttrValue::Text(self.source.to_string()),
            "_line" => AttrValue::Int(self.line as i64),
            _ => return Err(Self::unknown_attribute(path)),
        })
    }
}

/// Hierarchical re-keying of an optional cage/corner/side triple through a
/// cage manager; a missing level cuts the resolution short.
fn adopt_location(
    cages: &CageManager,
    cage: Option<&Cage>,
    corner: Option<&Corner>,
    side: Option<&Side>,
) -> Result<(Option<Arc<Cage>>, Option<Arc<Corner>>, Option<Arc<Side>>)> {
    let cage = match cage {
        Some(cage) => cages.get(cage.number()),
        None => return Ok((None, None, None)),
    };
    let corner = match corner {
        Some(corner) => cage.corner(corner.number())?,
        None => return Ok((Some(cage), None, None)),
    };
    let side = match side {
        Some(side) => Some(corner.side_by_number(side.number())?),
        None => None,
    };
    Ok((Some(cage), Some(corner), side))
}

// ------------- EnvironmentalConditions -------------
#[derive(Debug)]
pub struct EnvironmentalConditions {
    datetime: DateTime<Utc>,
    temperature: f64,
    illumination: i64,
    cage: Option<Arc<Cage>>,
    source: Arc<str>,
    line: usize,
}

impl EnvironmentalConditions {
    pub fn new(
        datetime: DateTime<Utc>,
        temperature: f64,
        illumination: i64,
        cage: Option<Arc<Cage>>,
        source: Arc<str>,
        line: usize,
    ) -> Arc<EnvironmentalConditions> {
        Arc::new(EnvironmentalConditions { datetime, temperature, illumination, cage, source, line })
    }

    pub fn datetime(&self) -> DateTime<Utc> {
        self.datetime
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn illumination(&self) -> i64 {
        self.illumination
    }

    pub fn cage(&self) -> Option<Arc<Cage>> {
        self.cage.clone()
    }

    pub fn source(&self) -> Arc<str> {
        Arc::clone(&self.source)
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn adopt(
        &self,
        sources: &SourceManager,
        cages: &CageManager,
    ) -> Result<Arc<EnvironmentalConditions>> {
        Ok(EnvironmentalConditions::new(
            self.datetime,
            self.temperature,
            self.illumination,
            self.cage.as_ref().map(|c| cages.get(c.number())),
            sources.get(&self.source),
            self.line,
        ))
    }
}

impl fmt::Display for EnvironmentalConditions {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "< Illumination: {:3}, Temperature: {:4.1} (at {}) >",
            self.illumination,
            self.temperature,
            self.datetime.format("%Y-%m-%d %H:%M:%S%.3f")
        )
    }
}

impl Attributed for EnvironmentalConditions {
    const KIND: &'static str = "EnvironmentalConditions";

    fn attribute(&self, path: &str) -> Result<AttrValue> {
        Ok(match path {
            "DateTime" => AttrValue::Time(self.datetime),
            "Temperature" => AttrValue::float(self.temperature),
            "Illumination" => AttrValue::Int(self.illumination),
            "Cage" => self.cage.as_ref().map(|c| c.number()).into(),
            "_source" => AttrValue::Text(self.source.to_string()),
            "_line" => AttrValue::Int(self.line as i64),
            _ => return Err(Self::unknown_attribute(path)),
        })
    }
}

// ------------- HardwareEvent -------------
/// The hardware subsystem an event belongs to, read from the raw `Type`
/// code. Unknown codes keep the raw value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HardwareKind {
    Air,
    Door,
    Led,
    Unknown(i64),
}

impl HardwareKind {
    pub fn from_code(code: i64) -> HardwareKind {
        match code {
            0 => HardwareKind::Air,
            1 => HardwareKind::Door,
            2 => HardwareKind::Led,
            other => HardwareKind::Unknown(other),
        }
    }

    pub fn code(&self) -> i64 {
        match self {
            HardwareKind::Air => 0,
            HardwareKind::Door => 1,
            HardwareKind::Led => 2,
            HardwareKind::Unknown(code) => *code,
        }
    }
}

impl fmt::Display for HardwareKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            HardwareKind::Air => write!(f, "Air"),
            HardwareKind::Door => write!(f, "Door"),
            HardwareKind::Led => write!(f, "LED"),
            HardwareKind::Unknown(code) => write!(f, "Unknown({})", code),
        }
    }
}

#[derive(Debug)]
pub struct HardwareEvent {
    datetime: DateTime<Utc>,
    kind: HardwareKind,
    cage: Option<Arc<Cage>>,
    corner: Option<Arc<Corner>>,
    side: Option<Arc<Side>>,
    state: i64,
    source: Arc<str>,
    line: usize,
}

impl HardwareEvent {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        datetime: DateTime<Utc>,
        kind: HardwareKind,
        cage: Option<Arc<Cage>>,
        corner: Option<Arc<Corner>>,
        side: Option<Arc<Side>>,
        state: i64,
        source: Arc<str>,
        line: usize,
    ) -> Arc<HardwareEvent> {
        Arc::new(HardwareEvent { datetime, kind, cage, corner, side, state, source, line })
    }

    pub fn datetime(&self) -> DateTime<Utc> {
        self.datetime
    }

    pub fn kind(&self) -> HardwareKind {
        self.kind
    }

    pub fn cage(&self) -> Option<Arc<Cage>> {
        self.cage.clone()
    }

    pub fn corner(&self) -> Option<Arc<Corner>> {
        self.corner.clone()
    }

    pub fn side(&self) -> Option<Arc<Side>> {
        self.side.clone()
    }

    pub fn state(&self) -> i64 {
        self.state
    }

    pub fn source(&self) -> Arc<str> {
        Arc::clone(&self.source)
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn adopt(
        &self,
        sources: &SourceManager,
        cages: &CageManager,
    ) -> Result<Arc<HardwareEvent>> {
        let (cage, corner, side) =
            adopt_location(cages, self.cage.as_deref(), self.corner.as_deref(), self.side.as_deref())?;
        Ok(HardwareEvent::new(
            self.datetime,
            self.kind,
            cage,
            corner,
            side,
            self.state,
            sources.get(&self.source),
            self.line,
        ))
    }
}

impl fmt::Display for HardwareEvent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "< {}Event: {} (at {}) >",
            self.kind,
            self.state,
            self.datetime.format("%Y-%m-%d %H:%M:%S%.3f")
        )
    }
}

impl Attributed for HardwareEvent {
    const KIND: &'static str = "HardwareEvent";

    fn attribute(&self, path: &str) -> Result<AttrValue> {
        Ok(match path {
            "DateTime" => AttrValue::Time(self.datetime),
            "Type" => AttrValue::Int(self.kind.code()),
            "Cage" => self.cage.as_ref().map(|c| c.number()).into(),
            "Corner" => self.corner.as_ref().map(|c| c.number()).into(),
            "Side" => self.side.as_ref().map(|s| s.number()).into(),
            "State" => AttrValue::Int(self.state),
            "_source" => AttrValue::Text(self.source.to_string()),
            "_line" => AttrValue::Int(self.line as i64),
            _ => return Err(Self::unknown_attribute(path)),
        })
    }
}
