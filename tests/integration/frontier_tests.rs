//! Frontier dedup, state machine and selection

use crate::common::{recording_pipeline, TestDb};
use moebius::crawler::{SelectOutcome, Task};
use moebius::storage::{Repository, StorageError};
use moebius::{parse, unparse, CrawlStatus};
use std::thread;

#[test]
fn test_submit_decomposes_url() {
    let db = TestDb::new();
    let storage = db.open();
    let conn = storage.connection();

    let url = "http://example.com:8042/over/there?name=ferret#nose";
    let entry = conn.submit(&parse(url).unwrap()).unwrap();

    assert_eq!(entry.status, CrawlStatus::New);
    assert_eq!(conn.get_scheme(entry.scheme_id).unwrap().name, "http");

    let authority = conn.get_authority(entry.authority_id.unwrap()).unwrap();
    assert_eq!(authority.host, "example.com");
    assert_eq!(authority.port, Some(8042));

    let components = conn.entry_components(&entry).unwrap();
    assert_eq!(components.authority().as_deref(), Some("example.com:8042"));
    assert_eq!(unparse(&components), url);
    assert_eq!(parse(&unparse(&components)).unwrap(), components);
}

#[test]
fn test_equivalent_urls_share_one_entry() {
    let db = TestDb::new();
    let storage = db.open();
    let conn = storage.connection();

    let variants = [
        "http://example.com/a/b",
        "HTTP://EXAMPLE.com/a/b",
        "http://example.com:80/a/b",
        "http://example.com/a/./b",
        "http://example.com/a/c/../b",
    ];

    let ids: Vec<i64> = variants
        .iter()
        .map(|url| conn.submit(&parse(url).unwrap()).unwrap().id)
        .collect();

    assert!(ids.iter().all(|id| *id == ids[0]));
    assert_eq!(conn.count_by_status().unwrap()[&CrawlStatus::New], 1);
}

#[test]
fn test_distinct_components_are_distinct_entries() {
    let db = TestDb::new();
    let storage = db.open();
    let conn = storage.connection();

    let urls = [
        "http://example.com/a",
        "https://example.com/a",
        "http://example.com:8080/a",
        "http://example.com/a;type=x",
        "http://example.com/a?q=1",
        "http://example.com/a#top",
    ];
    for url in urls {
        conn.submit(&parse(url).unwrap()).unwrap();
    }

    assert_eq!(
        conn.count_by_status().unwrap()[&CrawlStatus::New],
        urls.len() as u64
    );
}

#[test]
fn test_terminal_states_are_final() {
    let db = TestDb::new();
    let storage = db.open();
    let conn = storage.connection();

    let entry = conn.submit(&parse("http://example.com/").unwrap()).unwrap();
    let entry = conn.transition(&entry, CrawlStatus::Requested).unwrap();
    let got = conn.transition(&entry, CrawlStatus::Got).unwrap();

    for next in CrawlStatus::all() {
        assert!(matches!(
            conn.transition(&got, next),
            Err(StorageError::InvalidTransition { .. })
        ));
    }

    // A second Requested -> Ignored from a stale copy is rejected too
    assert!(matches!(
        conn.transition(&entry, CrawlStatus::Ignored),
        Err(StorageError::InvalidTransition {
            from: CrawlStatus::Got,
            to: CrawlStatus::Ignored
        })
    ));
}

#[test]
fn test_concurrent_submit_yields_one_row() {
    let db = TestDb::new();
    db.open();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let path = db.path();
            thread::spawn(move || {
                let mut storage = moebius::storage::SqliteStorage::new(&path).unwrap();
                (0..20)
                    .map(|i| {
                        let url = format!("http://example.com/page{}", i % 5);
                        let components = parse(&url).unwrap();
                        storage
                            .transaction(|tx| tx.submit(&components))
                            .unwrap()
                            .id
                    })
                    .collect::<Vec<i64>>()
            })
        })
        .collect();

    let mut ids: Vec<i64> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    ids.sort_unstable();
    ids.dedup();

    assert_eq!(ids.len(), 5);
    let storage = db.open();
    assert_eq!(
        storage.connection().count_by_status().unwrap()[&CrawlStatus::New],
        5
    );
}

#[test]
fn test_select_on_empty_then_one_entry() {
    let db = TestDb::new();
    let mut storage = db.open();
    let (pipeline, dispatcher) = recording_pipeline();

    let report = pipeline.select_and_request(&mut storage).unwrap();
    assert_eq!(report.outcome, SelectOutcome::Exhausted);

    let entry = moebius::crawler::seed(&mut storage, "http://example.com/").unwrap();
    let report = pipeline.select_and_request(&mut storage).unwrap();

    match report.outcome {
        SelectOutcome::Requested { entry: selected, .. } => assert_eq!(selected.id, entry.id),
        other => panic!("expected Requested, got {:?}", other),
    }
    assert_eq!(
        storage.connection().get_entry(entry.id).unwrap().status,
        CrawlStatus::Requested
    );
    assert_eq!(
        dispatcher.take(),
        vec![Task::FetchAndStore {
            url: "http://example.com/".to_string()
        }]
    );
}

#[test]
fn test_concurrent_selectors_never_share_an_entry() {
    let db = TestDb::new();
    {
        let mut storage = db.open();
        for i in 0..10 {
            moebius::crawler::seed(&mut storage, &format!("http://example.com/{}", i)).unwrap();
        }
    }

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let path = db.path();
            thread::spawn(move || {
                let mut storage = moebius::storage::SqliteStorage::new(&path).unwrap();
                let (pipeline, _dispatcher) = recording_pipeline();
                let mut selected = Vec::new();
                while let SelectOutcome::Requested { entry, .. } =
                    pipeline.select_and_request(&mut storage).unwrap().outcome
                {
                    selected.push(entry.id);
                }
                selected
            })
        })
        .collect();

    let mut ids: Vec<i64> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    let total = ids.len();
    ids.sort_unstable();
    ids.dedup();

    assert_eq!(total, 10);
    assert_eq!(ids.len(), 10);
}
