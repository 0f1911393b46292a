//! A generic container for attribute-indexed filtering of event records.
//!
//! Records are appended in load order and queried repeatedly with
//! overlapping predicates (e.g. one visit query per mouse in a loop over all
//! mice). For every attribute path queried a mask manager is built lazily
//! and kept; membership selectors additionally cache one bitset per distinct
//! accepted value, so the per-value scan happens once however many queries
//! share it. Conjunction of selectors is bitmap intersection.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use ordered_float::OrderedFloat;
use roaring::RoaringBitmap;

use crate::error::{IcdataError, Result};
use crate::manager::KeeperHasher;

// ------------- AttrValue -------------
/// A record attribute in a uniform, hashable and totally ordered form.
///
/// Durations surface as `Float` seconds. `Null` stands for an absent value
/// and never satisfies a membership selector unless explicitly listed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AttrValue {
    Null,
    Int(i64),
    Float(OrderedFloat<f64>),
    Text(String),
    Time(DateTime<Utc>),
}

impl AttrValue {
    pub fn float(value: f64) -> Self {
        AttrValue::Float(OrderedFloat(value))
    }

    pub fn seconds(delta: chrono::TimeDelta) -> Self {
        AttrValue::float(delta.num_microseconds().unwrap_or(0) as f64 / 1e6)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, AttrValue::Null)
    }

    pub fn as_time(&self) -> Option<DateTime<Utc>> {
        match self {
            AttrValue::Time(t) => Some(*t),
            _ => None,
        }
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::Int(value)
    }
}

impl From<u32> for AttrValue {
    fn from(value: u32) -> Self {
        AttrValue::Int(value as i64)
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Text(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::Text(value)
    }
}

impl From<DateTime<Utc>> for AttrValue {
    fn from(value: DateTime<Utc>) -> Self {
        AttrValue::Time(value)
    }
}

impl<T> From<Option<T>> for AttrValue
where
    T: Into<AttrValue>,
{
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => AttrValue::Null,
        }
    }
}

// ------------- Attributed -------------
/// Read access to record attributes by their IntelliCage names, with
/// dot-separated paths for nested access (`"Animal.Name"`).
pub trait Attributed {
    const KIND: &'static str;

    fn attribute(&self, path: &str) -> Result<AttrValue>;

    fn unknown_attribute(path: &str) -> IcdataError {
        IcdataError::UnknownAttribute { kind: Self::KIND, path: path.to_string() }
    }
}

// ------------- Selector -------------
pub enum Selector {
    /// Membership in a finite set of accepted values. Benefits from
    /// per-value mask caching.
    In(Vec<AttrValue>),
    /// An arbitrary predicate over the attribute value, evaluated once per
    /// query against the full value vector.
    Filter(Box<dyn Fn(&AttrValue) -> bool + Send + Sync>),
}

impl Selector {
    pub fn any_of<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<AttrValue>,
    {
        Selector::In(values.into_iter().map(Into::into).collect())
    }

    pub fn filter(f: impl Fn(&AttrValue) -> bool + Send + Sync + 'static) -> Self {
        Selector::Filter(Box::new(f))
    }
}

// ------------- MaskManager -------------
#[derive(Debug)]
struct MaskManager {
    values: Vec<AttrValue>,
    cached: HashMap<AttrValue, RoaringBitmap, KeeperHasher>,
}

impl MaskManager {
    fn new(values: Vec<AttrValue>) -> Self {
        Self { values, cached: HashMap::default() }
    }

    fn mask(&mut self, selector: &Selector) -> RoaringBitmap {
        match selector {
            Selector::Filter(predicate) => self
                .values
                .iter()
                .enumerate()
                .filter_map(|(i, v)| predicate(v).then_some(i as u32))
                .collect(),
            Selector::In(accepted) => {
                let mut combined = RoaringBitmap::new();
                for value in accepted {
                    combined |= self.value_mask(value);
                }
                combined
            }
        }
    }

    fn value_mask(&mut self, value: &AttrValue) -> &RoaringBitmap {
        if !self.cached.contains_key(value) {
            let mask: RoaringBitmap = self
                .values
                .iter()
                .enumerate()
                .filter_map(|(i, v)| (v == value).then_some(i as u32))
                .collect();
            self.cached.insert(value.clone(), mask);
        }
        &self.cached[value]
    }
}

// ------------- ObjectBase -------------
pub type Converter = fn(AttrValue) -> AttrValue;

pub struct ObjectBase<T> {
    objects: Vec<Arc<T>>,
    converters: HashMap<&'static str, Converter, KeeperHasher>,
    masks: Mutex<HashMap<String, MaskManager, KeeperHasher>>,
}

impl<T: Attributed> Default for ObjectBase<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Attributed> ObjectBase<T> {
    pub fn new() -> Self {
        Self {
            objects: Vec::new(),
            converters: HashMap::default(),
            masks: Mutex::new(HashMap::default()),
        }
    }

    /// Converters are applied once, when an attribute's backing vector is
    /// materialized, not per query.
    pub fn with_converters(
        converters: impl IntoIterator<Item = (&'static str, Converter)>,
    ) -> Self {
        Self {
            objects: Vec::new(),
            converters: converters.into_iter().collect(),
            masks: Mutex::new(HashMap::default()),
        }
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// The full contents in insertion order, borrowed.
    pub fn objects(&self) -> &[Arc<T>] {
        &self.objects
    }

    /// Appends records in order. All cached masks refer to the old record
    /// count and are dropped wholesale.
    pub fn put(&mut self, objects: impl IntoIterator<Item = Arc<T>>) {
        self.objects.extend(objects);
        self.masks.lock().unwrap().clear();
    }

    /// Records satisfying *every* selector, in insertion order. No
    /// selectors means the full contents; the returned vector is always a
    /// fresh one, so callers cannot reach the internal storage through it.
    pub fn get(&self, selectors: &[(&str, Selector)]) -> Result<Vec<Arc<T>>> {
        if selectors.is_empty() {
            return Ok(self.objects.clone());
        }

        let mut masks = self.masks.lock().unwrap();
        let mut combined: Option<RoaringBitmap> = None;
        for (path, selector) in selectors {
            let manager = self.mask_manager(&mut masks, path)?;
            let mask = manager.mask(selector);
            combined = Some(match combined {
                None => mask,
                Some(acc) => acc & mask,
            });
        }

        let combined = combined.unwrap_or_default();
        Ok(combined
            .iter()
            .map(|i| Arc::clone(&self.objects[i as usize]))
            .collect())
    }

    /// The value of one attribute for every record, in insertion order.
    pub fn attribute_values(&self, path: &str) -> Result<Vec<AttrValue>> {
        self.objects.iter().map(|o| o.attribute(path)).collect()
    }

    fn mask_manager<'m>(
        &self,
        masks: &'m mut HashMap<String, MaskManager, KeeperHasher>,
        path: &str,
    ) -> Result<&'m mut MaskManager> {
        match masks.entry(path.to_string()) {
            Entry::Occupied(e) => Ok(e.into_mut()),
            Entry::Vacant(e) => {
                let mut values = self.attribute_values(path)?;
                if let Some(convert) = self.converters.get(path) {
                    values = values.into_iter().map(convert).collect();
                }
                Ok(e.insert(MaskManager::new(values)))
            }
        }
    }
}

/// Stable sort by a composite key of attribute values; an empty order
/// leaves the insertion order untouched.
pub fn sorted_by<T: Attributed>(items: Vec<Arc<T>>, order: &[&str]) -> Result<Vec<Arc<T>>> {
    if order.is_empty() {
        return Ok(items);
    }
    let mut keyed: Vec<(Vec<AttrValue>, Arc<T>)> = items
        .into_iter()
        .map(|item| {
            let key: Result<Vec<AttrValue>> =
                order.iter().map(|path| item.attribute(path)).collect();
            key.map(|key| (key, item))
        })
        .collect::<Result<_>>()?;
    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(keyed.into_iter().map(|(_, item)| item).collect())
}
