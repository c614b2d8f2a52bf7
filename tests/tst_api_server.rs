// HTTP surface tests: page, JSON endpoints and raw.json download
mod common;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use common::{EMPTY_CHAIN, SPY_CHAIN};
use httpmock::{Method::GET, MockServer};
use netgex::ConfigError;
use netgex::api_server_axum::{AppState, router};
use serde_json::Value;
use std::path::PathBuf;
use tower::ServiceExt;

async fn get(state: &AppState, uri: &str) -> (StatusCode, Vec<(String, String)>, Vec<u8>) {
    let response = router(state.clone())
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let headers = response
        .headers()
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or_default().to_string()))
        .collect();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec();
    (status, headers, body)
}

async fn get_text(state: &AppState, uri: &str) -> String {
    let (status, _, body) = get(state, uri).await;
    assert_eq!(status, StatusCode::OK);
    String::from_utf8(body).unwrap()
}

async fn get_json(state: &AppState, uri: &str) -> Value {
    let (status, _, body) = get(state, uri).await;
    assert_eq!(status, StatusCode::OK);
    serde_json::from_slice(&body).unwrap()
}

fn state_for(server: &MockServer) -> AppState {
    AppState::with_provider(Ok(common::provider_config(server)), None, None).unwrap()
}

fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("netgex-api-{}-{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn header_value<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
}

#[tokio::test]
async fn test_missing_credentials_block_requests() {
    let server = MockServer::start();
    let any = server.mock(|when, then| {
        when.method(GET);
        then.status(200).body(SPY_CHAIN);
    });
    let state = AppState::with_provider(Err(ConfigError::Missing("RAPIDAPI_KEY")), None, None).unwrap();

    let page = get_text(&state, "/?ticker=SPY&calculate=1").await;
    assert!(page.contains("Configuration error"));
    assert!(page.contains("RAPIDAPI_KEY"));
    assert!(!page.contains("<table class=\"netgex\">"));

    let api = get_json(&state, "/api/net-gex?ticker=SPY").await;
    assert_eq!(api["success"], false);
    assert!(api["error"].as_str().unwrap().starts_with("Configuration error"));

    let (status, _, _) = get(&state, "/api/raw.json").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let debug = get_json(&state, "/api/debug").await;
    assert_eq!(debug["errors"].as_array().unwrap().len(), 2);
    assert_eq!(any.calls(), 0);
}

#[tokio::test]
async fn test_page_without_calculate_makes_no_request() {
    let server = MockServer::start();
    let mock = common::mock_chain(&server, "SPY", SPY_CHAIN);
    let state = state_for(&server);

    let page = get_text(&state, "/").await;

    assert_eq!(mock.calls(), 0);
    assert!(page.contains("name=\"ticker\" value=\"SPY\""));
    assert!(page.contains("<option value=\"\">nearest</option>"));
    assert!(page.contains("name=\"calculate\""));
    assert!(!page.contains("class=\"error\""));
}

#[tokio::test]
async fn test_calculate_renders_both_tables() {
    let server = MockServer::start();
    let mock = common::mock_chain(&server, "SPY", SPY_CHAIN);
    let state = state_for(&server);

    let page = get_text(&state, "/?ticker=spy&expiration=&k=2.5&calculate=1").await;

    mock.assert();
    assert!(page.contains("<table class=\"provider\">"));
    assert!(page.contains("<table class=\"netgex\">"));
    assert!(page.contains(">500.0<"));
    assert!(page.contains(">-750.0<"));
    assert!(page.contains("<option value=\"2025-01-17\" selected>2025-01-17</option>"));
    assert!(page.contains("/api/raw.json"));
}

#[tokio::test]
async fn test_net_gex_json() {
    let server = MockServer::start();
    common::mock_chain(&server, "SPY", SPY_CHAIN);
    let state = state_for(&server);

    let api = get_json(&state, "/api/net-gex?ticker=SPY&k=2.5").await;

    assert_eq!(api["success"], true);
    let data = &api["data"];
    assert_eq!(data["ticker"], "SPY");
    assert_eq!(data["spot"], 104.5);
    assert_eq!(data["expiration"], "2025-01-17");
    assert_eq!(data["provider_rows"].as_array().unwrap().len(), 3);

    let net: Vec<f64> = data["net_gex_rows"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["net_gex"].as_f64().unwrap())
        .collect();
    assert_eq!(net, vec![500.0, 0.0, -750.0]);
    assert_eq!(data["metrics"]["k"], 2.5);
}

#[tokio::test]
async fn test_raw_json_is_byte_identical() {
    let server = MockServer::start();
    common::mock_chain(&server, "SPY", SPY_CHAIN);
    let state = state_for(&server);

    let (status, _, body) = get(&state, "/api/raw.json").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, b"No provider response yet");

    get_json(&state, "/api/net-gex?ticker=SPY").await;

    let (status, headers, body) = get(&state, "/api/raw.json").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, SPY_CHAIN.as_bytes());
    assert_eq!(header_value(&headers, header::CONTENT_TYPE.as_str()), Some("application/json"));
    assert!(
        header_value(&headers, header::CONTENT_DISPOSITION.as_str())
            .unwrap()
            .contains("raw.json")
    );
}

#[tokio::test]
async fn test_raw_json_kept_for_failed_response() {
    let server = MockServer::start();
    let body = r#"{"message":"You have exceeded the MONTHLY quota"}"#;
    common::mock_status(&server, "SPY", 200, body);
    let state = state_for(&server);

    let page = get_text(&state, "/?ticker=SPY&calculate=1").await;
    assert!(page.contains("exceeded the MONTHLY quota"));
    assert!(!page.contains("<table class=\"netgex\">"));

    // debug panel shows the failed body
    let raw_section = page.split("<h3>Raw JSON</h3>").nth(1).expect("raw JSON section");
    assert!(raw_section.contains("&quot;message&quot;: &quot;You have exceeded the MONTHLY quota&quot;"));

    let (status, _, raw) = get(&state, "/api/raw.json").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(raw, body.as_bytes());

    // no successful calculation to export
    let (status, _, _) = get(&state, "/api/net-gex.csv").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_empty_chain_renders_empty_tables() {
    let server = MockServer::start();
    common::mock_chain(&server, "SPY", EMPTY_CHAIN);
    let state = state_for(&server);

    let page = get_text(&state, "/?ticker=SPY&calculate=1").await;

    assert!(!page.contains("class=\"error\""));
    assert!(page.contains("<table class=\"netgex\">"));
    assert!(!page.contains("<td class=\"pos\">"));
    assert!(!page.contains("<td class=\"neg\">"));
    assert!(page.contains("No data for the Net GEX chart."));
}

#[tokio::test]
async fn test_missing_expiration_block_is_an_error() {
    let server = MockServer::start();
    common::mock_chain(&server, "SPY", SPY_CHAIN);
    let state = state_for(&server);

    let page = get_text(&state, "/?ticker=SPY&expiration=2025-01-24&k=2.5&calculate=1").await;

    assert!(page.contains("class=\"error\""));
    assert!(page.contains("no option chain for the requested expiration"));
    assert!(!page.contains("<table class=\"netgex\">"));

    let api = get_json(&state, "/api/net-gex?ticker=SPY&expiration=2025-01-24").await;
    assert_eq!(api["success"], false);
}

#[tokio::test]
async fn test_log_file_download() {
    let dir = temp_dir("logs");
    std::fs::write(dir.join("netgex.log.2026-10-16"), "yesterday\n").unwrap();
    std::fs::write(dir.join("netgex.log.2026-10-17"), "{\"level\":\"INFO\"}\n").unwrap();

    let server = MockServer::start();
    let empty = state_for(&server).with_log_dir(temp_dir("no-logs"));
    let (status, _, _) = get(&empty, "/api/log").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let state = state_for(&server).with_log_dir(&dir);
    let (status, headers, body) = get(&state, "/api/log").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"{\"level\":\"INFO\"}\n");
    assert!(
        header_value(&headers, "content-disposition")
            .unwrap()
            .contains("netgex.log.2026-10-17")
    );

    let page = get_text(&state, "/").await;
    assert!(page.contains("href=\"/api/log\""));
    assert!(page.contains("href=\"/api/debug-file/latest\""));
    let _ = std::fs::remove_dir_all(dir);
}

#[tokio::test]
async fn test_latest_debug_file_download() {
    let dir = temp_dir("dumps");
    let server = MockServer::start();
    common::mock_chain(&server, "SPY", SPY_CHAIN);
    let state = AppState::with_provider(Ok(common::provider_config(&server)), Some(dir.clone()), None).unwrap();

    let (status, _, _) = get(&state, "/api/debug-file/latest").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    get_json(&state, "/api/net-gex?ticker=SPY&k=2.5").await;

    let (status, headers, body) = get(&state, "/api/debug-file/latest").await;
    assert_eq!(status, StatusCode::OK);
    let disposition = header_value(&headers, "content-disposition").unwrap();
    assert!(disposition.contains(".json"));
    let dump: Value = serde_json::from_slice(&body).unwrap();
    assert!(dump.is_object());
    let _ = std::fs::remove_dir_all(dir);
}

#[tokio::test]
async fn test_invalid_input_is_reported_not_fetched() {
    let server = MockServer::start();
    let mock = common::mock_chain(&server, "SPY", SPY_CHAIN);
    let state = state_for(&server);

    let page = get_text(&state, "/?ticker=SPY&expiration=17-01-2025&calculate=1").await;
    assert!(page.contains("class=\"error\""));

    let api = get_json(&state, "/api/net-gex?ticker=SPY&k=abc").await;
    assert_eq!(api["success"], false);
    assert!(api["error"].as_str().unwrap().contains("Invalid k"));

    assert_eq!(mock.calls(), 0);
}

#[tokio::test]
async fn test_csv_after_calculation() {
    let server = MockServer::start();
    common::mock_chain(&server, "SPY", SPY_CHAIN);
    let state = state_for(&server);

    get_json(&state, "/api/net-gex?ticker=SPY&k=2.5").await;
    let (status, headers, body) = get(&state, "/api/net-gex.csv").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(header_value(&headers, "content-type"), Some("text/csv"));
    let csv = String::from_utf8(body).unwrap();
    assert_eq!(csv.lines().count(), 4);
    assert!(csv.contains("-750"));
}

#[tokio::test]
async fn test_expirations_endpoint() {
    let server = MockServer::start();
    common::mock_chain(&server, "SPY", SPY_CHAIN);
    let state = state_for(&server);

    let api = get_json(&state, "/api/expirations?ticker=spy").await;

    assert_eq!(api["success"], true);
    assert_eq!(api["data"]["ticker"], "SPY");
    assert_eq!(api["data"]["expirations"][0], "2025-01-17");
    assert_eq!(api["data"]["expirations"][1], "2025-01-24");
}
