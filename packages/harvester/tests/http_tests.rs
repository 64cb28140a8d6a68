//! HTTP-level tests for the fetcher, HEAD probe and proxy checker against a
//! local server.

use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use harvester::{
    CrawlConfig, Crawler, FileProbe, Fetcher, HarvestContext, HttpFetcher, HttpFileProbe,
    HttpProxyChecker, MemoryStore, PageStore, ProxyAddress, ProxyChecker, ProxyError,
    ProxySnapshot,
};

fn fetcher() -> HttpFetcher {
    HttpFetcher::new(Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_fetch_reports_status_and_content_type() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw("<p>hi</p>", "text/html; charset=utf-8"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let page = fetcher().fetch(&format!("{}/page", server.uri()), None).await.unwrap();
    assert_eq!(page.status, 200);
    assert!(page.is_html());
    assert_eq!(page.body, b"<p>hi</p>");

    let missing = fetcher().fetch(&format!("{}/missing", server.uri()), None).await.unwrap();
    assert_eq!(missing.status, 404);
}

#[tokio::test]
async fn test_fetch_follows_redirects() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(
            ResponseTemplate::new(301).insert_header("location", format!("{}/new", server.uri())),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/new"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("<p>moved</p>", "text/html"))
        .mount(&server)
        .await;

    let page = fetcher().fetch(&format!("{}/old", server.uri()), None).await.unwrap();
    assert_eq!(page.url, format!("{}/new", server.uri()));
}

#[tokio::test]
async fn test_head_probe_content_type() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/report.pdf"))
        .respond_with(ResponseTemplate::new(200).insert_header("content-type", "application/pdf"))
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/fake.pdf"))
        .respond_with(ResponseTemplate::new(200).insert_header("content-type", "text/html"))
        .mount(&server)
        .await;

    let probe = HttpFileProbe::new(Duration::from_secs(5)).unwrap();
    assert_eq!(
        probe.content_type(&format!("{}/report.pdf", server.uri())).await.unwrap(),
        "application/pdf"
    );
    assert_eq!(
        probe.content_type(&format!("{}/fake.pdf", server.uri())).await.unwrap(),
        "text/html"
    );
}

#[tokio::test]
async fn test_crawl_confirms_files_over_http() {
    let server = MockServer::start().await;
    let html = r#"<html><head><title>Docs</title></head><body>
        <a href="/report.pdf">Report</a>
        <a href="/fake.pdf">Not really</a>
    </body></html>"#;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(html, "text/html"))
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/report.pdf"))
        .respond_with(ResponseTemplate::new(200).insert_header("content-type", "application/pdf"))
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/fake.pdf"))
        .respond_with(ResponseTemplate::new(200).insert_header("content-type", "text/html"))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let crawler = Crawler::new(
        Arc::new(fetcher()),
        store.clone(),
        Arc::new(HttpFileProbe::new(Duration::from_secs(5)).unwrap()),
        CrawlConfig::default().without_delays(),
    );
    let ctx = HarvestContext::default();
    let url = format!("{}/", server.uri());

    let report = crawler
        .crawl(&ctx, &[url.clone()], &ProxySnapshot::empty(), 0)
        .await
        .unwrap();
    assert_eq!(report.succeeded(), 1);

    let page = store.get(&url).await.unwrap().unwrap();
    assert_eq!(page.title, "Docs");
    let files: Vec<_> = page.files.iter().map(|f| f.url.clone()).collect();
    assert_eq!(files, vec![format!("{}/report.pdf", server.uri())]);
}

/// A mock server standing in as the forward proxy for plain-HTTP checks.
async fn echo_proxy(response: ResponseTemplate) -> (MockServer, ProxyAddress) {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ip"))
        .respond_with(response)
        .mount(&server)
        .await;
    let proxy = ProxyAddress::new("127.0.0.1", server.address().port());
    (server, proxy)
}

const ECHO_ENDPOINT: &str = "http://echo.test/ip";

#[tokio::test]
async fn test_proxy_check_reads_origin() {
    let body = r#"{"origin": "203.0.113.7"}"#;
    let (server, proxy) = echo_proxy(ResponseTemplate::new(200).set_body_string(body)).await;

    let checker = HttpProxyChecker::new(Duration::from_secs(5));
    let result = checker.check(&proxy, ECHO_ENDPOINT).await.unwrap();

    assert_eq!(result.origin, "203.0.113.7");
    assert!(result.latency_ms >= 0.0);
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_proxy_check_rejects_body_without_origin() {
    let body = "<html>captive portal</html>";
    let (_server, proxy) = echo_proxy(ResponseTemplate::new(200).set_body_string(body)).await;

    let checker = HttpProxyChecker::new(Duration::from_secs(5));
    let err = checker.check(&proxy, ECHO_ENDPOINT).await.unwrap_err();

    assert!(
        matches!(err, ProxyError::Check(ref reason) if reason.contains("origin")),
        "{:?}",
        err
    );
}

#[tokio::test]
async fn test_proxy_check_rejects_non_200() {
    let (_server, proxy) = echo_proxy(ResponseTemplate::new(503)).await;

    let checker = HttpProxyChecker::new(Duration::from_secs(5));
    let err = checker.check(&proxy, ECHO_ENDPOINT).await.unwrap_err();

    assert!(
        matches!(err, ProxyError::Check(ref reason) if reason == "status code: 503"),
        "{:?}",
        err
    );
}
