use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use icdata::diag::Warning;
use icdata::manager::{CageManager, SourceManager};
use icdata::nodes::{Animal, Visit, VisitQuality};
use icdata::{Contents, Data};

fn noon(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2012, 12, 18, 12, minute, 0).unwrap()
}

fn visit(name: &str, cage: u32, corner: u32, minute: u32) -> Arc<Visit> {
    let cages = CageManager::new();
    let sources = SourceManager::new();
    let cage = cages.get(cage);
    let corner = cage.corner(corner).unwrap();
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

fn setup() -> Data {
    let mut data = Data::new(Contents::default());
    data.insert_visits(&[
        visit("Mickey", 1, 1, 0),
        visit("Minnie", 1, 2, 10),
        visit("Mickey", 1, 3, 20),
        visit("Jerry", 2, 1, 30),
    ])
    .unwrap();
    data.freeze();
    data
}

#[test]
fn reregistration_is_idempotent() {
    let mut data = Data::new(Contents::default());
    data.register_animal(&Animal::from_row("Mickey", Some("42"), None, None)).unwrap();
    data.register_animal(&Animal::from_row("Mickey", Some("1337"), None, None)).unwrap();
    assert_eq!(data.get_mice().len(), 1);
    let tags = data.get_animal("Mickey").unwrap().tags();
    assert!(tags.contains("42") && tags.contains("1337"));
}

#[test]
fn time_range_is_half_open_and_order_preserving() {
    let data = setup();
    // [noon(10), noon(30)): includes the visit starting at 10, excludes 30
    let windowed = data.get_visits(None, Some(noon(10)), Some(noon(30)), None).unwrap();
    assert_eq!(windowed.len(), 2);
    assert_eq!(windowed[0].animal().name(), "Minnie");
    assert_eq!(windowed[1].animal().name(), "Mickey");

    let from = data.get_visits(None, Some(noon(20)), None, None).unwrap();
    assert_eq!(from.len(), 2);
    let until = data.get_visits(None, None, Some(noon(10)), None).unwrap();
    assert_eq!(until.len(), 1);
}

#[test]
fn mouse_and_window_filters_intersect() {
    let data = setup();
    let both = data
        .get_visits(Some(&["Mickey"]), Some(noon(10)), Some(noon(40)), None)
        .unwrap();
    let by_mouse = data.get_visits(Some(&["Mickey"]), None, None, None).unwrap();
    let by_window = data.get_visits(None, Some(noon(10)), Some(noon(40)), None).unwrap();
    for item in &both {
        assert!(by_mouse.iter().any(|v| Arc::ptr_eq(v, item)));
        assert!(by_window.iter().any(|v| Arc::ptr_eq(v, item)));
    }
    assert_eq!(both.len(), 1);
    assert_eq!(both[0].start(), noon(20));
}

#[test]
fn ordering_by_attributes() {
    let data = setup();
    let ordered = data
        .get_visits(None, None, None, Some(&["Animal.Name", "Start"]))
        .unwrap();
    let names: Vec<String> =
        ordered.iter().map(|v| v.animal().name().to_string()).collect();
    assert_eq!(names, vec!["Jerry", "Mickey", "Mickey", "Minnie"]);
    assert!(ordered[1].start() < ordered[2].start());
}

#[test]
fn ghost_mouse_queries() {
    let data = setup();
    // scenario: a mouse that never visited anything
    assert!(data.get_visits(Some(&["Ghost"]), None, None, None).unwrap().is_empty());
    assert!(data.get_cage("Ghost").is_empty());
    assert_eq!(
        data.diagnostics()
            .count_matching(|w| matches!(w, Warning::MouseNotFound { mouse } if mouse == "Ghost")),
        1
    );
}

#[test]
fn frozen_data_keeps_its_visit_count() {
    let mut data = setup();
    let before = data.get_visits(None, None, None, None).unwrap().len();
    assert!(data.insert_visits(&[visit("Pluto", 3, 1, 40)]).is_err());
    assert_eq!(data.get_visits(None, None, None, None).unwrap().len(), before);
}
