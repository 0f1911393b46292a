//! Interning managers for cage topology and provenance strings.
//!
//! Within one dataset every reference to cage N (and to its corners and
//! sides) must be the *same* `Arc`, not merely an equal value, so that
//! grouping by identity is correct and cheap. The managers here follow the
//! keeper pattern: lazily construct a canonical instance on first miss and
//! hand out clones of the same `Arc` ever after.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::BuildHasherDefault;
use std::sync::{Arc, Mutex, Weak};

use seahash::SeaHasher;

use crate::error::{IcdataError, Result};

pub type KeeperHasher = BuildHasherDefault<SeaHasher>;

// ------------- Side -------------
/// One of the two sides of a corner. Sides are numbered consecutively
/// across the cage: corner `c` owns sides `2c - 1` (left) and `2c` (right).
#[derive(Debug)]
pub struct Side {
    number: u32,
    corner: Weak<Corner>,
}

impl Side {
    pub fn number(&self) -> u32 {
        self.number
    }

    /// Door label derived from the side numbering.
    pub fn door(&self) -> &'static str {
        if self.number % 2 == 1 { "left" } else { "right" }
    }

    pub fn corner(&self) -> Option<Arc<Corner>> {
        self.corner.upgrade()
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.number)
    }
}

// ------------- Corner -------------
#[derive(Debug)]
pub struct Corner {
    number: u32,
    cage: Weak<Cage>,
    sides: [Arc<Side>; 2],
}

impl Corner {
    fn build(number: u32, cage: Weak<Cage>) -> Arc<Corner> {
        Arc::new_cyclic(|corner| Corner {
            number,
            cage,
            sides: [
                Arc::new(Side { number: number * 2 - 1, corner: corner.clone() }),
                Arc::new(Side { number: number * 2, corner: corner.clone() }),
            ],
        })
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn cage(&self) -> Option<Arc<Cage>> {
        self.cage.upgrade()
    }

    pub fn left(&self) -> Arc<Side> {
        Arc::clone(&self.sides[0])
    }

    pub fn right(&self) -> Arc<Side> {
        Arc::clone(&self.sides[1])
    }

    /// Resolves a side given as its number, the string form of the number,
    /// or the literal `"left"`/`"right"`.
    pub fn side(&self, spec: &str) -> Result<Arc<Side>> {
        match spec.trim() {
            "left" => Ok(self.left()),
            "right" => Ok(self.right()),
            other => match other.parse::<u32>() {
                Ok(number) => self.side_by_number(number),
                Err(_) => Err(IcdataError::NoSide(spec.to_string())),
            },
        }
    }

    pub fn side_by_number(&self, number: u32) -> Result<Arc<Side>> {
        self.sides
            .iter()
            .find(|s| s.number == number)
            .cloned()
            .ok_or_else(|| IcdataError::NoSide(number.to_string()))
    }
}

impl fmt::Display for Corner {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.number)
    }
}

// ------------- Cage -------------
/// A cage of four corners. Construction always builds the full topology, so
/// any corner or side obtained from a kept cage is canonical.
#[derive(Debug)]
pub struct Cage {
    number: u32,
    corners: [Arc<Corner>; 4],
}

impl Cage {
    fn build(number: u32) -> Arc<Cage> {
        Arc::new_cyclic(|cage| Cage {
            number,
            corners: std::array::from_fn(|i| Corner::build(i as u32 + 1, cage.clone())),
        })
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn corner(&self, number: u32) -> Result<Arc<Corner>> {
        if (1..=4).contains(&number) {
            Ok(Arc::clone(&self.corners[(number - 1) as usize]))
        } else {
            Err(IcdataError::NoCorner(number.to_string()))
        }
    }

    pub fn corner_spec(&self, spec: &str) -> Result<Arc<Corner>> {
        match spec.trim().parse::<u32>() {
            Ok(number) => self.corner(number),
            Err(_) => Err(IcdataError::NoCorner(spec.to_string())),
        }
    }
}

impl fmt::Display for Cage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.number)
    }
}

// ------------- CageManager -------------
#[derive(Debug, Default)]
pub struct CageManager {
    kept: Mutex<HashMap<u32, Arc<Cage>, KeeperHasher>>,
}

impl CageManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// The canonical cage for the given number, built lazily on first miss.
    pub fn get(&self, number: u32) -> Arc<Cage> {
        let mut kept = self.kept.lock().unwrap();
        Arc::clone(kept.entry(number).or_insert_with(|| Cage::build(number)))
    }

    pub fn len(&self) -> usize {
        self.kept.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.kept.lock().unwrap().is_empty()
    }
}

// ------------- SourceManager -------------
/// Interns provenance strings, so that a dataset holds one shared `Arc<str>`
/// per input file however many records came from it.
#[derive(Debug, Default)]
pub struct SourceManager {
    kept: Mutex<HashSet<Arc<str>, KeeperHasher>>,
}

impl SourceManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, source: &str) -> Arc<str> {
        let mut kept = self.kept.lock().unwrap();
        match kept.get(source) {
            Some(kept_source) => Arc::clone(kept_source),
            None => {
                let keepsake: Arc<str> = Arc::from(source);
                kept.insert(Arc::clone(&keepsake));
                keepsake
            }
        }
    }

    pub fn len(&self) -> usize {
        self.kept.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_lookup_is_pointer_identical() {
        let manager = CageManager::new();
        let first = manager.get(5).corner(2).unwrap().side_by_number(3).unwrap();
        let second = manager.get(5).corner(2).unwrap().side_by_number(3).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn side_resolution_accepts_all_spellings() {
        let manager = CageManager::new();
        let corner = manager.get(1).corner(2).unwrap();
        let left = corner.side("left").unwrap();
        assert!(Arc::ptr_eq(&left, &corner.side("3").unwrap()));
        assert!(Arc::ptr_eq(&left, &corner.side_by_number(3).unwrap()));
        assert_eq!(corner.side("right").unwrap().number(), 4);
    }

    #[test]
    fn door_labels() {
        let manager = CageManager::new();
        let corner = manager.get(1).corner(3).unwrap();
        assert_eq!(corner.left().door(), "left");
        assert_eq!(corner.right().door(), "right");
        assert_eq!(corner.left().number(), 5);
    }

    #[test]
    fn invalid_topology_is_a_hard_error() {
        let manager = CageManager::new();
        let cage = manager.get(1);
        assert!(matches!(cage.corner(5), Err(IcdataError::NoCorner(_))));
        assert!(matches!(cage.corner(0), Err(IcdataError::NoCorner(_))));
        let corner = cage.corner(2).unwrap();
        assert!(matches!(corner.side("5"), Err(IcdataError::NoSide(_))));
        assert!(matches!(corner.side("sideways"), Err(IcdataError::NoSide(_))));
    }

    #[test]
    fn sources_are_interned() {
        let manager = SourceManager::new();
        let a = manager.get("archive.zip");
        let b = manager.get("archive.zip");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(manager.len(), 1);
    }
}
