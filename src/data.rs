//! The dataset container.
//!
//! A `Data` owns the animal and group registries, one indexed store per
//! record kind, and the interning managers every contained record is keyed
//! through. Records enter through the `insert_*` methods, which re-key them
//! to this dataset's canonical instances; once `freeze`n the dataset rejects
//! further insertion and behaves as an immutable query target.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::diag::{Diagnostics, Warning};
use crate::error::{IcdataError, Result};
use crate::manager::{CageManager, KeeperHasher, SourceManager};
use crate::nodes::{Animal, EnvironmentalConditions, Group, HardwareEvent, LogEntry, Visit};
use crate::objectbase::{sorted_by, AttrValue, ObjectBase, Selector};

/// Which optional record kinds a dataset carries. Visits are always loaded.
#[derive(Debug, Clone, Copy)]
pub struct Contents {
    pub nosepokes: bool,
    pub log: bool,
    pub environment: bool,
    pub hardware: bool,
}

impl Default for Contents {
    fn default() -> Self {
        Contents { nosepokes: true, log: false, environment: false, hardware: false }
    }
}

pub struct Data {
    diagnostics: Arc<Diagnostics>,
    contents: Contents,
    frozen: bool,
    animals: HashMap<String, Arc<Animal>, KeeperHasher>,
    groups: HashMap<String, Arc<Group>, KeeperHasher>,
    visits: ObjectBase<Visit>,
    log: ObjectBase<LogEntry>,
    environment: ObjectBase<EnvironmentalConditions>,
    hardware: ObjectBase<HardwareEvent>,
    cages: CageManager,
    sources: SourceManager,
    session_start: Option<DateTime<Utc>>,
    session_end: Option<DateTime<Utc>>,
    inmates: HashMap<u32, BTreeSet<String>, KeeperHasher>,
    residency: HashMap<String, Vec<u32>, KeeperHasher>,
}

impl std::fmt::Debug for Data {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Data")
            .field("frozen", &self.frozen)
            .field("animals", &self.animals.len())
            .field("groups", &self.groups.len())
            .field("visits", &self.visits.len())
            .field("log", &self.log.len())
            .field("environment", &self.environment.len())
            .field("hardware", &self.hardware.len())
            .field("session_start", &self.session_start)
            .field("session_end", &self.session_end)
            .finish()
    }
}

impl Data {
    pub fn new(contents: Contents) -> Data {
        Data {
            diagnostics: Diagnostics::new(),
            contents,
            frozen: false,
            animals: HashMap::default(),
            groups: HashMap::default(),
            visits: ObjectBase::new(),
            log: ObjectBase::new(),
            environment: ObjectBase::new(),
            hardware: ObjectBase::new(),
            cages: CageManager::new(),
            sources: SourceManager::new(),
            session_start: None,
            session_end: None,
            inmates: HashMap::default(),
            residency: HashMap::default(),
        }
    }

    pub fn diagnostics(&self) -> Arc<Diagnostics> {
        Arc::clone(&self.diagnostics)
    }

    pub fn contents(&self) -> Contents {
        self.contents
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub(crate) fn cages(&self) -> &CageManager {
        &self.cages
    }

    pub(crate) fn sources(&self) -> &SourceManager {
        &self.sources
    }

    // ------------- registration -------------
    /// Registers an animal, merging into the already known record of the
    /// same name if there is one, and returns this dataset's canonical
    /// instance.
    pub fn register_animal(&mut self, animal: &Animal) -> Result<Arc<Animal>> {
        self.ensure_unfrozen()?;
        match self.animals.get(animal.name()) {
            Some(known) => {
                known.merge(animal)?;
                Ok(Arc::clone(known))
            }
            None => {
                let fresh = Arc::new(animal.clone_detached());
                self.animals.insert(fresh.name().to_string(), Arc::clone(&fresh));
                Ok(fresh)
            }
        }
    }

    /// Registers a group, unioning membership with any same-named group.
    /// Members are registered as animals along the way.
    pub fn register_group(&mut self, group: &Group) -> Result<Arc<Group>> {
        self.ensure_unfrozen()?;
        let members = group
            .members()
            .iter()
            .map(|member| self.register_animal(member))
            .collect::<Result<Vec<_>>>()?;
        let known = match self.groups.get(group.name()) {
            Some(known) => Arc::clone(known),
            None => {
                let fresh = Arc::new(Group::new(group.name()));
                self.groups.insert(group.name().to_string(), Arc::clone(&fresh));
                fresh
            }
        };
        known.merge(members);
        Ok(known)
    }

    // ------------- insertion -------------
    pub fn insert_visits(&mut self, visits: &[Arc<Visit>]) -> Result<()> {
        self.ensure_unfrozen()?;
        let mut adopted = Vec::with_capacity(visits.len());
        for visit in visits {
            // resolution is by name; conflicting records are a registration
            // concern, not an insertion one
            let animal = match self.get_animal(visit.animal().name()) {
                Some(known) => known,
                None => self.register_animal(&visit.animal())?,
            };
            adopted.push(visit.adopt(&self.sources, &self.cages, animal)?);
        }
        debug!(count = adopted.len(), "inserting visits");
        self.visits.put(adopted);
        self.rebuild_residency();
        Ok(())
    }

    pub fn insert_log(&mut self, entries: &[Arc<LogEntry>]) -> Result<()> {
        self.ensure_unfrozen()?;
        let adopted = entries
            .iter()
            .map(|entry| entry.adopt(&self.sources, &self.cages))
            .collect::<Result<Vec<_>>>()?;
        self.log.put(adopted);
        Ok(())
    }

    pub fn insert_environment(&mut self, readings: &[Arc<EnvironmentalConditions>]) -> Result<()> {
        self.ensure_unfrozen()?;
        let adopted = readings
            .iter()
            .map(|reading| reading.adopt(&self.sources, &self.cages))
            .collect::<Result<Vec<_>>>()?;
        self.environment.put(adopted);
        Ok(())
    }

    pub fn insert_hardware_events(&mut self, events: &[Arc<HardwareEvent>]) -> Result<()> {
        self.ensure_unfrozen()?;
        let adopted = events
            .iter()
            .map(|event| event.adopt(&self.sources, &self.cages))
            .collect::<Result<Vec<_>>>()?;
        self.hardware.put(adopted);
        Ok(())
    }

    /// Overrides the recorded session window. Loading and merging set this
    /// from session metadata; callers assembling a dataset by hand may set
    /// it directly.
    pub fn set_session_bounds(
        &mut self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) {
        self.session_start = start;
        self.session_end = end;
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
        self.rebuild_residency();
    }

    fn ensure_unfrozen(&self) -> Result<()> {
        if self.frozen { Err(IcdataError::UnableToInsertIntoFrozen) } else { Ok(()) }
    }

    fn rebuild_residency(&mut self) {
        self.inmates.clear();
        self.residency.clear();
        for visit in self.visits.objects() {
            let cage = visit.cage().number();
            let name = visit.animal().name().to_string();
            self.inmates.entry(cage).or_default().insert(name.clone());
            let cages = self.residency.entry(name).or_default();
            if !cages.contains(&cage) {
                cages.push(cage);
                cages.sort_unstable();
            }
        }
    }

    // ------------- queries -------------
    /// Visits, optionally restricted to the named mice and to a half-open
    /// `[start, end)` window on visit start, optionally sorted by the given
    /// attribute paths. A name with no registered visits simply matches
    /// nothing.
    pub fn get_visits(
        &self,
        mice: Option<&[&str]>,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        order: Option<&[&str]>,
    ) -> Result<Vec<Arc<Visit>>> {
        let mut selectors: Vec<(&str, Selector)> = Vec::new();
        if let Some(mice) = mice {
            selectors.push((
                "Animal.Name",
                Selector::any_of(mice.iter().map(|name| AttrValue::Text(name.to_string()))),
            ));
        }
        if start.is_some() || end.is_some() {
            selectors.push(("Start", time_window(start, end)));
        }
        let visits = self.visits.get(&selectors)?;
        match order {
            Some(order) => sorted_by(visits, order),
            None => Ok(visits),
        }
    }

    pub fn get_log(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        order: Option<&[&str]>,
    ) -> Result<Vec<Arc<LogEntry>>> {
        Self::get_events(&self.log, start, end, order)
    }

    pub fn get_environment(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        order: Option<&[&str]>,
    ) -> Result<Vec<Arc<EnvironmentalConditions>>> {
        Self::get_events(&self.environment, start, end, order)
    }

    pub fn get_hardware_events(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        order: Option<&[&str]>,
    ) -> Result<Vec<Arc<HardwareEvent>>> {
        Self::get_events(&self.hardware, start, end, order)
    }

    fn get_events<T: crate::objectbase::Attributed>(
        base: &ObjectBase<T>,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        order: Option<&[&str]>,
    ) -> Result<Vec<Arc<T>>> {
        let mut selectors: Vec<(&str, Selector)> = Vec::new();
        if start.is_some() || end.is_some() {
            selectors.push(("DateTime", time_window(start, end)));
        }
        let events = base.get(&selectors)?;
        match order {
            Some(order) => sorted_by(events, order),
            None => Ok(events),
        }
    }

    /// The beginning of the dataset: the recorded session start if known,
    /// otherwise the earliest visit start.
    pub fn get_start(&self) -> Option<DateTime<Utc>> {
        self.session_start
            .or_else(|| self.visits.objects().iter().map(|v| v.start()).min())
    }

    /// The end of the dataset: the recorded session end if known, otherwise
    /// the latest visit end.
    pub fn get_end(&self) -> Option<DateTime<Utc>> {
        self.session_end
            .or_else(|| self.visits.objects().iter().filter_map(|v| v.end()).max())
    }

    pub(crate) fn session_start(&self) -> Option<DateTime<Utc>> {
        self.session_start
    }

    pub(crate) fn session_end(&self) -> Option<DateTime<Utc>> {
        self.session_end
    }

    /// A human-readable identification of where this dataset came from,
    /// taken from the provenance of its records.
    pub(crate) fn label(&self) -> String {
        self.visits
            .objects()
            .first()
            .map(|v| v.source().to_string())
            .unwrap_or_else(|| "<unnamed>".to_string())
    }

    pub fn get_mice(&self) -> Vec<String> {
        let mut mice: Vec<String> = self.animals.keys().cloned().collect();
        mice.sort();
        mice
    }

    pub fn get_animal(&self, name: &str) -> Option<Arc<Animal>> {
        self.animals.get(name).cloned()
    }

    pub fn get_group(&self, name: &str) -> Option<Arc<Group>> {
        self.groups.get(name).cloned()
    }

    pub fn get_groups(&self) -> Vec<Arc<Group>> {
        let mut groups: Vec<Arc<Group>> = self.groups.values().cloned().collect();
        groups.sort_by(|a, b| a.name().cmp(b.name()));
        groups
    }

    /// The cages a mouse has lived in, judged by its visits, in ascending
    /// order. A single-element vector is the common case; a mouse seen in
    /// several cages yields them all plus a warning, a mouse with no visits
    /// yields nothing plus a warning.
    pub fn get_cage(&self, mouse: &str) -> Vec<u32> {
        match self.residency.get(mouse) {
            Some(cages) => {
                if cages.len() > 1 {
                    self.diagnostics.emit(Warning::MultipleCages {
                        animal: mouse.to_string(),
                        cages: cages.clone(),
                    });
                }
                cages.clone()
            }
            None => {
                self.diagnostics.emit(Warning::MouseNotFound { mouse: mouse.to_string() });
                Vec::new()
            }
        }
    }

    /// Animals observed visiting the given cage.
    pub fn get_inmates(&self, cage: u32) -> Vec<Arc<Animal>> {
        match self.inmates.get(&cage) {
            Some(names) => names.iter().filter_map(|name| self.get_animal(name)).collect(),
            None => Vec::new(),
        }
    }
}

/// Half-open `[start, end)` predicate over time-valued attributes.
fn time_window(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Selector {
    Selector::filter(move |value| match value.as_time() {
        Some(t) => start.is_none_or(|s| t >= s) && end.is_none_or(|e| t < e),
        None => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::{Sex, VisitQuality};
    use chrono::TimeZone;

    fn noon(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2012, 12, 18, 12, minute, 0).unwrap()
    }

    fn visit(name: &str, cage: u32, minute: u32) -> Arc<Visit> {
        let cages = CageManager::new();
        let sources = SourceManager::new();
        let cage = cages.get(cage);
        let corner = cage.corner(1).unwrap();
        Visit::new(
            noon(minute),
            Some(noon(minute + 1)),
            Arc::new(Animal::new(name, None)),
            cage,
            corner,
            None,
            VisitQuality::default(),
            sources.get("test"),
            1,
            None,
        )
    }

    #[test]
    fn registration_merges_same_named_animals() {
        let mut data = Data::new(Contents::default());
        let first = data
            .register_animal(&Animal::from_row("Mickey", Some("42"), None, None))
            .unwrap();
        let second = data
            .register_animal(&Animal::from_row("Mickey", Some("1337"), Some("Male"), None))
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.tags().len(), 2);
        assert_eq!(first.sex(), Some(Sex::Male));
    }

    #[test]
    fn group_membership_of_a_canonical_animal_is_harmless() {
        let mut data = Data::new(Contents::default());
        let mickey = data
            .register_animal(&Animal::from_row("Mickey", Some("42"), Some("Male"), None))
            .unwrap();

        // the group holds the dataset's own canonical instance, so member
        // registration merges the record with itself
        let group = Group::new("cage A");
        group.add_member(Arc::clone(&mickey));
        let registered = data.register_group(&group).unwrap();

        assert_eq!(registered.members().len(), 1);
        assert!(Arc::ptr_eq(&registered.members()[0], &mickey));
        assert_eq!(mickey.tags().len(), 1);
        assert_eq!(mickey.sex(), Some(Sex::Male));
    }

    #[test]
    fn frozen_data_rejects_insertion() {
        let mut data = Data::new(Contents::default());
        data.freeze();
        assert!(matches!(
            data.insert_visits(&[visit("Mickey", 1, 0)]),
            Err(IcdataError::UnableToInsertIntoFrozen)
        ));
        assert!(matches!(
            data.register_animal(&Animal::new("Mickey", None)),
            Err(IcdataError::UnableToInsertIntoFrozen)
        ));
    }

    #[test]
    fn inserted_visits_are_rekeyed_to_own_managers() {
        let mut data = Data::new(Contents::default());
        data.insert_visits(&[visit("Mickey", 1, 0), visit("Minnie", 1, 5)]).unwrap();
        let visits = data.get_visits(None, None, None, None).unwrap();
        assert!(Arc::ptr_eq(&visits[0].cage(), &visits[1].cage()));
        assert!(Arc::ptr_eq(&visits[0].animal(), &data.get_animal("Mickey").unwrap()));
    }

    #[test]
    fn visit_queries_filter_by_mouse_and_window() {
        let mut data = Data::new(Contents::default());
        data.insert_visits(&[
            visit("Mickey", 1, 0),
            visit("Minnie", 1, 10),
            visit("Mickey", 1, 20),
        ])
        .unwrap();
        data.freeze();

        let mickey = data.get_visits(Some(&["Mickey"]), None, None, None).unwrap();
        assert_eq!(mickey.len(), 2);

        // half-open window: a visit starting exactly at `end` is excluded
        let windowed = data
            .get_visits(None, Some(noon(0)), Some(noon(20)), Some(&["Start"]))
            .unwrap();
        assert_eq!(windowed.len(), 2);
        assert_eq!(windowed[1].animal().name(), "Minnie");

        assert!(data.get_visits(Some(&["Pluto"]), None, None, None).unwrap().is_empty());
    }

    #[test]
    fn bounds_derive_from_visits_unless_sessions_say_otherwise() {
        let mut data = Data::new(Contents::default());
        data.insert_visits(&[visit("Mickey", 1, 5), visit("Mickey", 1, 15)]).unwrap();
        assert_eq!(data.get_start(), Some(noon(5)));
        assert_eq!(data.get_end(), Some(noon(16)));

        data.set_session_bounds(Some(noon(0)), Some(noon(30)));
        assert_eq!(data.get_start(), Some(noon(0)));
        assert_eq!(data.get_end(), Some(noon(30)));
    }

    #[test]
    fn residency_reporting() {
        let mut data = Data::new(Contents::default());
        data.insert_visits(&[
            visit("Mickey", 1, 0),
            visit("Mickey", 2, 5),
            visit("Minnie", 2, 10),
        ])
        .unwrap();
        data.freeze();

        assert_eq!(data.get_cage("Minnie"), vec![2]);
        assert_eq!(data.get_cage("Mickey"), vec![1, 2]);
        assert!(data.get_cage("Pluto").is_empty());
        let warnings = data.diagnostics().warnings();
        assert!(warnings.iter().any(|w| matches!(w, Warning::MultipleCages { animal, .. } if animal == "Mickey")));
        assert!(warnings.iter().any(|w| matches!(w, Warning::MouseNotFound { mouse } if mouse == "Pluto")));

        let inmates = data.get_inmates(2);
        assert_eq!(inmates.len(), 2);
        assert!(data.get_inmates(9).is_empty());
    }
}
