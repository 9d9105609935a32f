use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tally::app::{build_routers, AppParts};
use tally::config::AppConfig;
use tally::ingest::geo::GeoResolver;
use tally::storage::EventStore;
use tokio::net::TcpListener;

/// Spawn the server on a random port with file-only storage and no geo lookup.
async fn spawn_server() -> (SocketAddr, tempfile::TempDir, tokio::task::JoinHandle<()>) {
    let dir = tempfile::tempdir().unwrap();

    let mut config = AppConfig::default();
    config.storage.file_path = dir.path().join("analytics-events.json");
    config.geo.enabled = false;

    let store = Arc::new(EventStore::from_config(&config));
    let app = build_routers(AppParts {
        config,
        store,
        geo: GeoResolver::disabled(),
    })
    .merged();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give server a moment to start
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    (addr, dir, handle)
}

async fn post_event(client: &reqwest::Client, addr: SocketAddr, body: Value) -> reqwest::Response {
    client
        .post(format!("http://{addr}/api/cms/event"))
        .header("user-agent", "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_0) Safari/605.1.15")
        .json(&body)
        .send()
        .await
        .unwrap()
}

async fn summary(client: &reqwest::Client, addr: SocketAddr) -> Value {
    let resp = client
        .get(format!("http://{addr}/api/admin/analytics?days=7"))
        .header("cookie", "cms_admin=1")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    resp.json().await.unwrap()
}

#[tokio::test]
async fn test_health() {
    let (addr, _dir, _handle) = spawn_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("http://{addr}/health"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database_configured"], false);
}

#[tokio::test]
async fn test_missing_event_name_is_rejected() {
    let (addr, _dir, _handle) = spawn_server().await;
    let client = reqwest::Client::new();

    let resp = post_event(&client, addr, json!({ "path": "/" })).await;
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Missing event name.");
}

#[tokio::test]
async fn test_malformed_timestamp_is_dropped_not_rejected() {
    let (addr, _dir, _handle) = spawn_server().await;
    let client = reqwest::Client::new();

    let resp = post_event(
        &client,
        addr,
        json!({ "eventName": "page_view", "occurredAt": "not-a-date" }),
    )
    .await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["ok"], true);
    assert_eq!(body["accepted"], 0);
}

#[tokio::test]
async fn test_batch_ingest_feeds_summary() {
    let (addr, _dir, _handle) = spawn_server().await;
    let client = reqwest::Client::new();

    let batch = json!({
        "events": [
            { "eventName": "page_view", "sessionId": "s1", "path": "/" },
            { "eventName": "section_view", "sessionId": "s1", "path": "/", "section": "case-studies" },
            { "eventName": "section_view", "sessionId": "s1", "path": "/", "section": "contact" },
            {
                "eventName": "outbound_click",
                "sessionId": "s1",
                "path": "/",
                "label": "Book a call",
                "href": "https://cal.com/someone/intro"
            },
            { "eventName": "page_view", "sessionId": "s2", "path": "/admin" },
            { "path": "/no-name" }
        ]
    });
    let resp = post_event(&client, addr, batch).await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["accepted"], 5);

    let summary = summary(&client, addr).await;
    assert_eq!(summary["totalEvents"], 5);
    assert_eq!(summary["totalClicks"], 1);
    assert_eq!(summary["last24hClicks"], 1);
    assert_eq!(summary["dailyClicks"].as_array().unwrap().len(), 7);
    assert_eq!(summary["hourlyClicks"].as_array().unwrap().len(), 24);

    let funnel = &summary["conversionFunnel"];
    assert_eq!(funnel["landingSessions"], 1);
    assert_eq!(funnel["caseStudySessions"], 1);
    assert_eq!(funnel["contactSectionSessions"], 1);
    assert_eq!(funnel["contactClickSessions"], 1);
    assert_eq!(funnel["contactToClickRate"], 100.0);

    // Admin traffic is stored but never shown.
    let recent = summary["recentEvents"].as_array().unwrap();
    assert_eq!(recent.len(), 4);
    assert!(recent.iter().all(|e| e["path"] != "/admin"));
    assert_eq!(summary["topTargets"][0]["href"], "https://cal.com/someone/intro");
}

#[tokio::test]
async fn test_summary_requires_admin_cookie() {
    let (addr, _dir, _handle) = spawn_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("http://{addr}/api/admin/analytics"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Unauthorized");

    let resp = client
        .get(format!("http://{addr}/api/admin/analytics"))
        .header("cookie", "cms_admin=0")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn test_legacy_click_endpoint() {
    let (addr, _dir, _handle) = spawn_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("http://{addr}/api/cms/click"))
        .json(&json!({ "source": "hero", "label": "GitHub" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Missing click payload.");

    let resp = client
        .post(format!("http://{addr}/api/cms/click"))
        .json(&json!({ "source": "hero", "label": "GitHub", "href": "https://github.com/someone" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let summary = summary(&client, addr).await;
    assert_eq!(summary["totalClicks"], 1);
    assert_eq!(summary["sourceBreakdown"][0]["source"], "hero");
    assert_eq!(summary["recentEvents"][0]["eventName"], "click");
}
