//! Pipeline operations against a mock HTTP server

use crate::common::{recording_pipeline, TestDb};
use moebius::crawler::{seed, FetchError, FetchOutcome, Task};
use moebius::storage::{content_digest, Repository};
use moebius::{parse, CrawlStatus, MoebiusError};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_fetch_and_store_hashes_exact_bytes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"foobarbuzz".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let db = TestDb::new();
    let mut storage = db.open();
    let (pipeline, dispatcher) = recording_pipeline();

    let entry = seed(&mut storage, &server.uri()).unwrap();
    pipeline.select_and_request(&mut storage).unwrap();

    let url = match dispatcher.take().pop() {
        Some(Task::FetchAndStore { url }) => url,
        other => panic!("expected a fetch task, got {:?}", other),
    };
    let outcome = pipeline.fetch_and_store(&mut storage, &url).await.unwrap();

    let page = match outcome {
        FetchOutcome::Stored { page, .. } => page,
        other => panic!("expected Stored, got {:?}", other),
    };
    assert_eq!(
        page.content_hash,
        "06ee9a1c28885a20e1c6a854091f033eddb878e176e367648a5c43dd104b01d1"
    );
    assert_eq!(page.content_hash, content_digest(b"foobarbuzz"));

    let conn = storage.connection();
    assert_eq!(conn.get_entry(entry.id).unwrap().status, CrawlStatus::Got);
    assert_eq!(conn.fetch_page(page.id).unwrap().content, b"foobarbuzz");
    assert_eq!(conn.pages_for_entry(entry.id).unwrap().len(), 1);
    assert_eq!(
        dispatcher.take(),
        vec![Task::ExtractAndSubmit { page_id: page.id }]
    );
}

#[tokio::test]
async fn test_non_200_leaves_entry_requested() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let db = TestDb::new();
    let mut storage = db.open();
    let (pipeline, dispatcher) = recording_pipeline();

    let entry = seed(&mut storage, &format!("{}/broken", server.uri())).unwrap();
    pipeline.select_and_request(&mut storage).unwrap();
    let url = storage.connection().entry_url(&entry).unwrap();
    dispatcher.take();

    let result = pipeline.fetch_and_store(&mut storage, &url).await;
    assert!(matches!(
        result,
        Err(MoebiusError::Fetch(FetchError::Status { status: 500, .. }))
    ));

    let conn = storage.connection();
    assert_eq!(
        conn.get_entry(entry.id).unwrap().status,
        CrawlStatus::Requested
    );
    assert_eq!(conn.count_pages().unwrap(), 0);
    assert!(dispatcher.take().is_empty());
}

#[test]
fn test_extract_and_submit_adds_new_entries() {
    let db = TestDb::new();
    let mut storage = db.open();
    let (pipeline, _dispatcher) = recording_pipeline();

    let html = br#"<html><body><a href="/a">a</a> <a href="http://other.test/b">b</a></body></html>"#;
    let page = storage
        .transaction(|tx| {
            let entry = tx.submit(&parse("http://example.com/").unwrap())?;
            let entry = tx.transition(&entry, CrawlStatus::Requested)?;
            let page = tx.store_page(&entry, html, None)?;
            tx.transition(&entry, CrawlStatus::Got)?;
            Ok::<_, moebius::storage::StorageError>(page)
        })
        .unwrap();

    let report = pipeline.extract_and_submit(&mut storage, page.id).unwrap();
    assert_eq!(report.submitted, 2);
    assert_eq!(report.malformed, 0);

    let conn = storage.connection();
    for url in ["http://example.com/a", "http://other.test/b"] {
        let entry = conn
            .find_entry(&parse(url).unwrap())
            .unwrap()
            .unwrap_or_else(|| panic!("{} was not submitted", url));
        assert_eq!(entry.status, CrawlStatus::New);
    }
    assert_eq!(conn.count_by_status().unwrap()[&CrawlStatus::New], 2);
}

#[test]
fn test_extract_skips_malformed_links() {
    let db = TestDb::new();
    let mut storage = db.open();
    let (pipeline, _dispatcher) = recording_pipeline();

    // The unterminated IPv6 host never resolves, so it is dropped before submission
    let html = br#"<a href="http://[::1">bad</a><a href="/ok">ok</a><a href="mailto:x@example.com">m</a>"#;
    let page = storage
        .transaction(|tx| {
            let entry = tx.submit(&parse("http://example.com/").unwrap())?;
            let entry = tx.transition(&entry, CrawlStatus::Requested)?;
            let page = tx.store_page(&entry, html, Some("utf-8"))?;
            tx.transition(&entry, CrawlStatus::Got)?;
            Ok::<_, moebius::storage::StorageError>(page)
        })
        .unwrap();

    let report = pipeline.extract_and_submit(&mut storage, page.id).unwrap();
    assert_eq!(report.submitted, 2);

    let conn = storage.connection();
    assert!(conn
        .find_entry(&parse("mailto:x@example.com").unwrap())
        .unwrap()
        .is_some());
}
