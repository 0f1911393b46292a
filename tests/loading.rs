use std::fs;
use std::path::Path;

use chrono::{TimeZone, Utc};
use icdata::diag::Warning;
use icdata::{Contents, Loader};

fn write(dir: &Path, name: &str, content: &str) {
    fs::write(dir.join(name), content).unwrap();
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn everything() -> Contents {
    Contents { nosepokes: true, log: true, environment: true, hardware: true }
}

fn plus3_archive(dir: &Path) {
    init_tracing();
    write(
        dir,
        "DataDescriptor.xml",
        "<DataDescriptor><Version>IntelliCage Plus 3</Version></DataDescriptor>",
    );
    write(
        dir,
        "Animals.txt",
        "AnimalName\tAnimalTag\tSex\tGroupName\tAnimalNotes\n\
         Mickey\t42\tMale\tC57\t\n\
         Minnie\t1337\tFemale\tC57\t\n",
    );
    write(
        dir,
        "Visits.txt",
        "VisitID\tAnimalTag\tStart\tEnd\tCage\tCorner\tModuleName\tCornerCondition\n\
         1\t42\t2012-12-18 12:00:00.000\t2012-12-18 12:00:30.000\t1\t2\tDefault\t1\n\
         2\t1337\t2012-12-18 12:05:00.000\t2012-12-18 12:05:20.000\t1\t3\tDefault\t0\n",
    );
    write(
        dir,
        "Nosepokes.txt",
        "VisitID\tStart\tEnd\tSide\tLickNumber\tLickContactTime\tLickDuration\tSideCondition\n\
         1\t2012-12-18 12:00:10.000\t2012-12-18 12:00:12.000\t4\t5\t0,5\t1,25\t1\n\
         1\t2012-12-18 12:00:05.000\t2012-12-18 12:00:07.000\t3\t0\t0\t0\t0\n",
    );
    write(
        dir,
        "Log.txt",
        "DateTime\tLogCategory\tLogType\tCage\tCorner\tSide\tLogNotes\n\
         2012-12-18 11:55:00.000\tInfo\tApplication\t\t\t\tSession is started\n\
         2012-12-18 12:02:00.000\tInfo\tEnvironment\t1\t\t\tTemperature out of range\n\
         2012-12-18 12:30:00.000\tInfo\tApplication\t\t\t\tSession is stopped\n",
    );
    write(
        dir,
        "Environment.txt",
        "DateTime\tTemperature\tIllumination\tCage\n\
         2012-12-18 12:00:00.000\t21,5\t100\t1\n",
    );
    write(
        dir,
        "HardwareEvents.txt",
        "DateTime\tHardwareType\tCage\tCorner\tSide\tState\n\
         2012-12-18 12:00:11.000\t1\t1\t2\t4\t1\n",
    );
}

#[test]
fn plus3_archive_loads_fully() {
    let dir = tempfile::tempdir().unwrap();
    plus3_archive(dir.path());
    let data = Loader::new(everything()).load(dir.path()).unwrap();

    assert!(data.is_frozen());
    assert_eq!(data.get_mice(), vec!["Mickey".to_string(), "Minnie".to_string()]);
    let mickey = data.get_animal("Mickey").unwrap();
    assert!(mickey.tags().contains("42"));

    let groups = data.get_groups();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].name(), "C57");
    assert_eq!(groups[0].members().len(), 2);

    let visits = data.get_visits(None, None, None, Some(&["Start"])).unwrap();
    assert_eq!(visits.len(), 2);
    assert_eq!(visits[0].animal().name(), "Mickey");
    assert_eq!(visits[0].cage().number(), 1);
    assert_eq!(visits[0].corner().number(), 2);
    assert_eq!(visits[0].quality().corner_condition, Some(1));

    // nosepokes attach to their visit, sorted by (Start, End)
    let pokes = visits[0].nosepokes().unwrap();
    assert_eq!(pokes.len(), 2);
    assert!(pokes[0].start() < pokes[1].start());
    assert_eq!(pokes[1].licks().number, Some(5));
    assert_eq!(pokes[1].licks().duration.unwrap().num_milliseconds(), 1250);
    assert_eq!(pokes[1].side().unwrap().number(), 4);
    assert_eq!(pokes[1].door(), Some("right"));
    assert_eq!(visits[1].nosepokes().unwrap().len(), 0);
    assert_eq!(visits[0].lick_number(), Some(5));

    let log = data.get_log(None, None, None).unwrap();
    assert_eq!(log.len(), 3);
    assert_eq!(log[1].category(), "Info");
    assert_eq!(log[1].kind(), "Environment");
    assert_eq!(log[1].cage().unwrap().number(), 1);

    let env = data.get_environment(None, None, None).unwrap();
    assert_eq!(env.len(), 1);
    assert_eq!(env[0].temperature(), 21.5);
    assert_eq!(env[0].illumination(), 100);

    let hw = data.get_hardware_events(None, None, None).unwrap();
    assert_eq!(hw.len(), 1);
    assert_eq!(hw[0].kind(), icdata::nodes::HardwareKind::Door);
    assert_eq!(hw[0].side().unwrap().number(), 4);

    let inmates = data.get_inmates(1);
    assert_eq!(inmates.len(), 2);
}

#[test]
fn session_markers_override_visit_bounds() {
    let dir = tempfile::tempdir().unwrap();
    plus3_archive(dir.path());
    let data = Loader::new(everything()).load(dir.path()).unwrap();

    // all visits fall strictly inside the marked session
    assert_eq!(data.get_start(), Some(Utc.with_ymd_and_hms(2012, 12, 18, 11, 55, 0).unwrap()));
    assert_eq!(data.get_end(), Some(Utc.with_ymd_and_hms(2012, 12, 18, 12, 30, 0).unwrap()));
}

#[test]
fn version1_dialect_rebases_locations_and_headers() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "DataDescriptor.xml",
        "<DataDescriptor><Version>Version1</Version></DataDescriptor>",
    );
    write(
        dir.path(),
        "Animals.txt",
        "Name\tTag\tSex\tGroup\tNotes\nMickey\t42\tMale\tC57\t\n",
    );
    write(
        dir.path(),
        "Visits.txt",
        "ID\tAnimal\tStart\tEnd\tCage\tCorner\n\
         1\tMickey\t2012-12-18 12:00:00.000\t2012-12-18 12:00:30.000\t0\t1\n",
    );
    write(
        dir.path(),
        "Nosepokes.txt",
        "VisitID\tStart\tEnd\tSide\tLicksNumber\tLicksDuration\n\
         1\t2012-12-18 12:00:10.000\t2012-12-18 12:00:12.000\t3\t2\t0,75\n",
    );
    let data = Loader::new(everything()).load(dir.path()).unwrap();

    let visits = data.get_visits(None, None, None, None).unwrap();
    assert_eq!(visits.len(), 1);
    // zero-based locations resolve to the same interned topology
    assert_eq!(visits[0].cage().number(), 1);
    assert_eq!(visits[0].corner().number(), 2);
    let pokes = visits[0].nosepokes().unwrap();
    assert_eq!(pokes[0].side().unwrap().number(), 4);
    assert_eq!(pokes[0].licks().number, Some(2));
    assert_eq!(pokes[0].licks().duration.unwrap().num_milliseconds(), 750);
    assert!(data.diagnostics().is_empty());
}

#[test]
fn missing_descriptor_falls_back_with_one_warning() {
    let dir = tempfile::tempdir().unwrap();
    plus3_archive(dir.path());
    fs::remove_file(dir.path().join("DataDescriptor.xml")).unwrap();
    let data = Loader::new(Contents::default()).load(dir.path()).unwrap();

    assert_eq!(data.get_visits(None, None, None, None).unwrap().len(), 2);
    assert_eq!(
        data.diagnostics()
            .count_matching(|w| matches!(w, Warning::UnknownSchemaVersion { found: None })),
        1
    );
}

#[test]
fn orphaned_nosepokes_are_excluded_with_warnings() {
    let dir = tempfile::tempdir().unwrap();
    plus3_archive(dir.path());
    write(
        dir.path(),
        "Nosepokes.txt",
        "VisitID\tStart\tEnd\tSide\tLickNumber\n\
         99\t2012-12-18 12:00:10.000\t2012-12-18 12:00:12.000\t4\t5\n",
    );
    let data = Loader::new(everything()).load(dir.path()).unwrap();

    let visits = data.get_visits(None, None, None, None).unwrap();
    assert!(visits.iter().all(|v| v.nosepokes().unwrap().is_empty()));
    assert_eq!(
        data.diagnostics().count_matching(
            |w| matches!(w, Warning::OrphanedNosepoke { visit_id, .. } if visit_id == "99")
        ),
        1
    );
}

#[test]
fn session_offsets_localize_naive_timestamps() {
    let dir = tempfile::tempdir().unwrap();
    plus3_archive(dir.path());
    write(
        dir.path(),
        "Sessions.xml",
        "<ArrayOfSession><Session><Interval>\
            <Start>2012-12-18T00:00:00.0000000+01:00</Start>\
            <End>2012-12-19T00:00:00.0000000+01:00</End>\
        </Interval></Session></ArrayOfSession>",
    );
    let data = Loader::new(Contents::default()).load(dir.path()).unwrap();

    let visits = data.get_visits(None, None, None, Some(&["Start"])).unwrap();
    // 12:00 local at +01:00 is 11:00 UTC
    assert_eq!(visits[0].start(), Utc.with_ymd_and_hms(2012, 12, 18, 11, 0, 0).unwrap());
}

#[test]
fn tables_under_intellicage_subdirectory_are_found() {
    let dir = tempfile::tempdir().unwrap();
    plus3_archive(dir.path());
    let nested = dir.path().join("IntelliCage");
    fs::create_dir(&nested).unwrap();
    for table in ["Visits.txt", "Nosepokes.txt", "Animals.txt"] {
        fs::rename(dir.path().join(table), nested.join(table)).unwrap();
    }
    let data = Loader::new(Contents::default()).load(dir.path()).unwrap();
    assert_eq!(data.get_visits(None, None, None, None).unwrap().len(), 2);
}
