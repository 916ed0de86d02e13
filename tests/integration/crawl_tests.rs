//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and run the full
//! crawl cycle end-to-end against an on-disk database.

use skein::config::{Config, CrawlerConfig, OutputConfig, UserAgentConfig};
use skein::crawler::Coordinator;
use skein::output::{load_statistics, StopReason};
use skein::storage::{SqliteStorage, Storage};
use std::path::Path;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration writing to a database inside `dir`
fn create_test_config(
    dir: &TempDir,
    workers: usize,
    max_pages: u64,
    max_depth: Option<u32>,
) -> Config {
    Config {
        seeds: vec![],
        crawler: CrawlerConfig {
            workers,
            max_pages,
            max_depth,
            politeness_delay_ms: 0,
            fetch_timeout_secs: 5,
            max_redirects: 10,
        },
        user_agent: UserAgentConfig {
            crawler_name: "TestBot".to_string(),
            crawler_version: "1.0.0".to_string(),
            contact_url: "https://example.com/contact".to_string(),
            contact_email: "test@example.com".to_string(),
        },
        output: OutputConfig {
            database_path: dir.path().join("crawl.db").to_string_lossy().into_owned(),
        },
    }
}

/// Serves `body` as HTML at `route`, expecting exactly `hits` requests
async fn serve_page(server: &MockServer, route: &str, body: &str, hits: u64) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/html"))
        .expect(hits)
        .mount(server)
        .await;
}

fn page_url(server: &MockServer, route: &str) -> String {
    format!("{}{}", server.uri(), route)
}

fn open_db(config: &Config) -> SqliteStorage {
    SqliteStorage::new(Path::new(&config.output.database_path)).expect("open database")
}

async fn crawl(config: &Config, seeds: &[String], fresh: bool) -> skein::CrawlSummary {
    Coordinator::new(config.clone(), fresh)
        .expect("create coordinator")
        .run(seeds)
        .await
        .expect("crawl run")
}

#[tokio::test]
async fn test_full_crawl_records_pages_and_links() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    serve_page(
        &server,
        "/",
        r#"<html><head><title>Home</title>
            <meta name="description" content="Start here"></head><body>
            <h1>Welcome</h1>
            <a href="/a">A</a> <a href="/b">Page <b>B</b></a> <a href="mailto:me@example.com">mail</a>
        </body></html>"#,
        1,
    )
    .await;
    serve_page(
        &server,
        "/a",
        r#"<title>A</title><p>Page A</p><a href="/b">B</a><a href="/">home</a>"#,
        1,
    )
    .await;
    serve_page(&server, "/b", r#"<title>B</title><a href="c">C</a>"#, 1).await;
    serve_page(&server, "/c", "<title>C</title><p>Leaf</p>", 1).await;

    let config = create_test_config(&dir, 2, 100, None);
    let summary = crawl(&config, &[page_url(&server, "/")], false).await;

    assert_eq!(summary.stop_reason, StopReason::Drained);
    assert_eq!(summary.pages_saved, 4);
    assert_eq!(summary.targets_discarded(), 0);
    assert_eq!(summary.seeds_admitted, 1);
    assert_eq!(summary.targets_admitted, 4);
    assert_eq!(summary.pending_targets, 0);

    let db = open_db(&config);
    assert_eq!(db.count_pages().unwrap(), 4);

    let home = db.get_page_by_url(&page_url(&server, "/")).unwrap().unwrap();
    assert_eq!(home.title, "Home");
    assert_eq!(home.content, "Welcome");
    assert_eq!(home.description, "Start here");
    assert_eq!(home.content_hash, skein::crawler::content_hash("Welcome"));
    assert_eq!(home.depth, 0);
    assert_eq!(home.referrer, None);
    assert_eq!(home.outbound_links.len(), 2);

    let c = db.get_page_by_url(&page_url(&server, "/c")).unwrap().unwrap();
    assert_eq!(c.depth, 2);
    assert_eq!(c.referrer, Some(page_url(&server, "/b")));

    let anchors: Vec<String> = db
        .get_outgoing_links(&page_url(&server, "/"))
        .unwrap()
        .into_iter()
        .map(|l| l.anchor_text)
        .collect();
    assert_eq!(anchors, vec!["A", "Page B"]);

    // / -> a, / -> b, a -> b, a -> /, b -> c
    assert_eq!(db.count_links().unwrap(), 5);
    assert_eq!(db.count_resolved_links().unwrap(), 5);

    let stats = load_statistics(&db).unwrap();
    assert_eq!(stats.pages_by_depth.get(&1), Some(&2));
    assert_eq!(stats.visited_urls, 4);
    assert_eq!(stats.pending_targets, 0);
    assert_eq!(
        stats.latest_run.unwrap().status,
        skein::storage::RunStatus::Completed
    );
}

#[tokio::test]
async fn test_fetch_error_does_not_stop_crawl() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    serve_page(
        &server,
        "/",
        r#"<a href="/broken">broken</a><a href="/ok">ok</a>"#,
        1,
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;
    serve_page(&server, "/ok", "<p>fine</p>", 1).await;

    let config = create_test_config(&dir, 1, 100, None);
    let summary = crawl(&config, &[page_url(&server, "/")], false).await;

    assert_eq!(summary.stop_reason, StopReason::Drained);
    assert_eq!(summary.pages_saved, 2);
    assert_eq!(summary.fetch_errors, 1);
    assert_eq!(summary.targets_discarded(), 1);

    let db = open_db(&config);
    assert!(db
        .get_page_by_url(&page_url(&server, "/broken"))
        .unwrap()
        .is_none());

    // The edge to the failed page stays recorded but unresolved
    assert_eq!(db.count_links().unwrap(), 2);
    assert_eq!(db.count_resolved_links().unwrap(), 1);
    assert_eq!(db.latest_run().unwrap().unwrap().targets_discarded, 1);
}

#[tokio::test]
async fn test_page_budget_closes_frontier() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    let links: String = (1..10)
        .map(|i| format!(r#"<a href="/p{}">p{}</a>"#, i, i))
        .collect();
    serve_page(&server, "/", &links, 1).await;
    for i in 1..10 {
        Mock::given(method("GET"))
            .and(path(format!("/p{}", i)))
            .respond_with(ResponseTemplate::new(200).set_body_raw("<p>leaf</p>", "text/html"))
            .mount(&server)
            .await;
    }

    let config = create_test_config(&dir, 1, 3, None);
    let summary = crawl(&config, &[page_url(&server, "/")], false).await;

    assert_eq!(summary.stop_reason, StopReason::BudgetReached);
    assert_eq!(summary.pages_saved, 3);
    assert_eq!(summary.pending_targets, 7);

    let db = open_db(&config);
    assert_eq!(db.count_pages().unwrap(), 3);
    assert_eq!(db.count_pending_targets().unwrap(), 7);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_page_budget_with_concurrent_workers() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    let links: String = (0..20)
        .map(|i| format!(r#"<a href="/leaf{}">leaf</a>"#, i))
        .collect();
    serve_page(&server, "/", &links, 1).await;
    for i in 0..20 {
        Mock::given(method("GET"))
            .and(path(format!("/leaf{}", i)))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(format!("<p>leaf {}</p>", i), "text/html")
                    .set_delay(std::time::Duration::from_millis(20)),
            )
            .mount(&server)
            .await;
    }

    let workers = 4;
    let max_pages = 3;
    let config = create_test_config(&dir, workers, max_pages, None);
    let summary = crawl(&config, &[page_url(&server, "/")], false).await;

    // Workers finish the targets they already hold when the budget closes
    // the frontier, so up to one per other worker may be saved past it
    assert_eq!(summary.stop_reason, StopReason::BudgetReached);
    assert!(summary.pages_saved >= max_pages);
    assert!(
        summary.pages_saved <= max_pages + workers as u64 - 1,
        "saved {} pages",
        summary.pages_saved
    );

    let db = open_db(&config);
    assert_eq!(db.count_pages().unwrap(), summary.pages_saved);
    assert_eq!(summary.targets_admitted, 21);
    assert_eq!(
        db.count_pending_targets().unwrap(),
        21 - summary.pages_saved
    );
}

#[tokio::test]
async fn test_non_html_targets_are_discarded() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    serve_page(
        &server,
        "/",
        r#"<a href="/logo.png">logo</a><a href="/about">about</a>"#,
        1,
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/logo.png"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(vec![0x89, b'P', b'N', b'G'], "image/png"),
        )
        .expect(1)
        .mount(&server)
        .await;
    serve_page(&server, "/about", "<p>About us</p>", 1).await;

    let config = create_test_config(&dir, 2, 100, None);
    let summary = crawl(&config, &[page_url(&server, "/")], false).await;

    assert_eq!(summary.stop_reason, StopReason::Drained);
    assert_eq!(summary.pages_saved, 2);
    assert_eq!(summary.fetch_errors, 1);

    let db = open_db(&config);
    assert!(db
        .get_page_by_url(&page_url(&server, "/logo.png"))
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_max_depth_is_never_exceeded() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    serve_page(&server, "/", r#"<a href="/one">1</a>"#, 1).await;
    serve_page(&server, "/one", r#"<a href="/two">2</a>"#, 1).await;
    serve_page(&server, "/two", "<p>too deep</p>", 0).await;

    let config = create_test_config(&dir, 2, 100, Some(1));
    let summary = crawl(&config, &[page_url(&server, "/")], false).await;

    assert_eq!(summary.stop_reason, StopReason::Drained);
    assert_eq!(summary.pages_saved, 2);

    let db = open_db(&config);
    assert_eq!(db.count_visited_urls().unwrap(), 2);
    assert_eq!(db.depth_breakdown().unwrap().keys().max(), Some(&1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_workers_fetch_each_page_once() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    // Every page links to every other page
    let routes: Vec<String> = (0..12).map(|i| format!("/n{}", i)).collect();
    let body: String = routes
        .iter()
        .map(|r| format!(r#"<a href="{}">{}</a>"#, r, r))
        .collect();
    for route in &routes {
        serve_page(&server, route, &body, 1).await;
    }

    let config = create_test_config(&dir, 8, 100, None);
    let summary = crawl(&config, &[page_url(&server, "/n0")], false).await;

    assert_eq!(summary.stop_reason, StopReason::Drained);
    assert_eq!(summary.pages_saved, 12);
    assert_eq!(summary.targets_admitted, 12);

    let db = open_db(&config);
    assert_eq!(db.count_pages().unwrap(), 12);
    assert_eq!(db.count_links().unwrap(), 12 * 11);
    assert_eq!(db.count_resolved_links().unwrap(), 12 * 11);
}

#[tokio::test]
async fn test_restart_skips_visited_seed() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    serve_page(&server, "/", "<p>only once</p>", 1).await;

    let config = create_test_config(&dir, 1, 100, None);
    let seeds = [page_url(&server, "/")];

    let first = crawl(&config, &seeds, false).await;
    assert_eq!(first.pages_saved, 1);

    let second = crawl(&config, &seeds, false).await;
    assert_eq!(second.seeds_admitted, 0);
    assert_eq!(second.seeds_skipped, 1);
    assert_eq!(second.pages_saved, 0);
    assert_eq!(second.stop_reason, StopReason::Drained);
    assert!(second.run_id > first.run_id);
}

#[tokio::test]
async fn test_fresh_run_recrawls_seed() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    serve_page(&server, "/", "<title>Again</title>", 2).await;

    let config = create_test_config(&dir, 1, 100, None);
    let seeds = [page_url(&server, "/")];

    crawl(&config, &seeds, false).await;
    let second = crawl(&config, &seeds, true).await;

    assert_eq!(second.seeds_admitted, 1);
    assert_eq!(second.pages_saved, 1);

    // The page is updated in place rather than duplicated
    assert_eq!(open_db(&config).count_pages().unwrap(), 1);
}

#[tokio::test]
async fn test_interrupted_crawl_resumes_pending_targets() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    serve_page(
        &server,
        "/",
        r#"<a href="/x">x</a><a href="/y">y</a><a href="/z">z</a>"#,
        1,
    )
    .await;
    for route in ["/x", "/y", "/z"] {
        serve_page(&server, route, r#"<a href="/">home</a>"#, 1).await;
    }

    let mut config = create_test_config(&dir, 1, 2, None);
    let first = crawl(&config, &[page_url(&server, "/")], false).await;
    assert_eq!(first.stop_reason, StopReason::BudgetReached);
    assert_eq!(first.pages_saved, 2);
    assert_eq!(first.pending_targets, 2);

    config.crawler.max_pages = 100;
    let second = crawl(&config, &[], false).await;
    assert_eq!(second.stop_reason, StopReason::Drained);
    assert_eq!(second.pages_saved, 2);

    let db = open_db(&config);
    assert_eq!(db.count_pages().unwrap(), 4);
    assert_eq!(db.count_pending_targets().unwrap(), 0);

    let z = db.get_page_by_url(&page_url(&server, "/z")).unwrap().unwrap();
    assert_eq!(z.depth, 1);
    assert_eq!(z.referrer, Some(page_url(&server, "/")));
}
