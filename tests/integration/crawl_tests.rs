//! Full crawl through the coordinator
//!
//! These tests use wiremock to create mock HTTP servers and run the worker
//! pool and trigger end-to-end.

use crate::common::TestDb;
use moebius::crawler::{seed, Coordinator};
use moebius::storage::{Repository, SqliteStorage};
use moebius::{parse, CrawlStatus};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::watch;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn wait_for_counts<F>(db: &TestDb, done: F) -> HashMap<CrawlStatus, u64>
where
    F: Fn(&HashMap<CrawlStatus, u64>) -> bool,
{
    let storage = SqliteStorage::new(&db.path()).unwrap();
    for _ in 0..300 {
        let counts = storage.connection().count_by_status().unwrap();
        if done(&counts) {
            return counts;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!(
        "crawl did not finish: {:?}",
        storage.connection().count_by_status().unwrap()
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_full_crawl_single_site() {
    let server = MockServer::start().await;
    let base_url = server.uri();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html; charset=utf-8")
                .set_body_string(format!(
                    r#"<html><body>
                    <a href="{}/page1">Page 1</a>
                    <a href="/page2">Page 2</a>
                    <a href="mailto:someone@example.com">Mail</a>
                    </body></html>"#,
                    base_url
                )),
        )
        .expect(1)
        .mount(&server)
        .await;

    for page in ["/page1", "/page2"] {
        Mock::given(method("GET"))
            .and(path(page))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"<html><body><a href="/">home</a></body></html>"#),
            )
            .expect(1)
            .mount(&server)
            .await;
    }

    let db = TestDb::new();
    {
        let mut storage = db.open();
        seed(&mut storage, &base_url).unwrap();
    }

    let coordinator = Coordinator::new(db.config(2, 1)).unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(coordinator.run(shutdown_rx));

    let counts = wait_for_counts(&db, |c| c[&CrawlStatus::Got] >= 3).await;
    shutdown_tx.send(true).unwrap();
    handle.await.unwrap().unwrap();

    assert_eq!(counts[&CrawlStatus::Got], 3);

    let storage = db.open();
    let conn = storage.connection();
    assert_eq!(conn.count_pages().unwrap(), 3);

    // Links back to "/" were deduplicated against the seed
    let home = conn
        .find_entry(&parse(&base_url).unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(conn.pages_for_entry(home.id).unwrap().len(), 1);

    // The mailto link is never fetched; the next selection ignores it
    let mail = conn
        .find_entry(&parse("mailto:someone@example.com").unwrap())
        .unwrap()
        .unwrap();
    assert!(matches!(
        mail.status,
        CrawlStatus::New | CrawlStatus::Ignored
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failing_site_keeps_entry_requested() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let db = TestDb::new();
    let entry = {
        let mut storage = db.open();
        seed(&mut storage, &format!("{}/down", server.uri())).unwrap()
    };

    let coordinator = Coordinator::new(db.config(1, 1)).unwrap();
    let stats = coordinator.stats();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(coordinator.run(shutdown_rx));

    // max_attempts is 2: one retry, then the task is dropped
    for _ in 0..300 {
        if stats.dropped.load(std::sync::atomic::Ordering::SeqCst) >= 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    shutdown_tx.send(true).unwrap();
    handle.await.unwrap().unwrap();

    assert_eq!(stats.dropped.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert_eq!(stats.retried.load(std::sync::atomic::Ordering::SeqCst), 1);

    let storage = db.open();
    let conn = storage.connection();
    assert_eq!(
        conn.get_entry(entry.id).unwrap().status,
        CrawlStatus::Requested
    );
    assert_eq!(conn.count_pages().unwrap(), 0);
}
