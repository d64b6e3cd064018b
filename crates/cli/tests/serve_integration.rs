//! Integration tests for the `reap serve` HTTP API.
//!
//! Each test starts the server as a child process on a unique port,
//! makes HTTP requests, and verifies the responses.

use std::io::Read;
use std::net::TcpStream;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

/// Atomic port counter to avoid port conflicts between parallel tests.
/// Base port is derived from process ID so separate test binaries don't
/// collide on the same port range.
static NEXT_PORT: AtomicU16 = AtomicU16::new(0);
static PORT_INIT: std::sync::Once = std::sync::Once::new();

const OWNER: &str = "0x66aB6D9362d4F35596279692F0251Db635165871";
const STRANGER: &str = "0x33A4622B82D4c04a53e170c638B944ce27cffce3";
const TOKEN_ID: u64 = 293730023;

fn next_port() -> u16 {
    PORT_INIT.call_once(|| {
        let base = 20000 + (std::process::id() as u16 % 20000);
        NEXT_PORT.store(base, Ordering::SeqCst);
    });
    NEXT_PORT.fetch_add(1, Ordering::SeqCst)
}

/// Start `reap serve` on the given port with extra environment variables.
fn start_server(port: u16, envs: &[(&str, &str)]) -> Child {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_reap"));
    cmd.arg("serve").arg("--port").arg(port.to_string());
    cmd.env_remove("REAP_API_KEY").env_remove("REAP_RATE_LIMIT");
    for (k, v) in envs {
        cmd.env(k, v);
    }
    cmd.stdout(Stdio::null());
    cmd.stderr(Stdio::null());

    let child = cmd.spawn().expect("failed to start reap serve");
    // Wait for server to be ready by polling the port
    for _ in 0..50 {
        if TcpStream::connect(format!("127.0.0.1:{}", port)).is_ok() {
            return child;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    child
}

fn send(port: u16, request: String) -> (u16, String) {
    let mut stream = TcpStream::connect(format!("127.0.0.1:{}", port)).expect("failed to connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    std::io::Write::write_all(&mut stream, request.as_bytes()).expect("failed to write");

    let mut response = String::new();
    let _ = stream.read_to_string(&mut response);
    parse_http_response(&response)
}

/// Helper: make a simple HTTP GET request and return (status, body).
fn http_get(port: u16, path: &str) -> (u16, String) {
    http_get_with_headers(port, path, &[])
}

fn http_get_with_headers(port: u16, path: &str, extra_headers: &[(&str, &str)]) -> (u16, String) {
    let mut header_lines = String::new();
    for (name, value) in extra_headers {
        header_lines.push_str(&format!("{}: {}\r\n", name, value));
    }
    send(
        port,
        format!(
            "GET {} HTTP/1.1\r\nHost: localhost:{}\r\n{}Connection: close\r\n\r\n",
            path, port, header_lines
        ),
    )
}

/// Helper: make a simple HTTP POST request and return (status, body).
fn http_post(port: u16, path: &str, body: &serde_json::Value) -> (u16, String) {
    http_post_raw(port, path, Some("application/json"), &body.to_string())
}

/// POST an arbitrary body, optionally without a Content-Type header.
fn http_post_raw(port: u16, path: &str, content_type: Option<&str>, body: &str) -> (u16, String) {
    let content_type = content_type
        .map(|ct| format!("Content-Type: {}\r\n", ct))
        .unwrap_or_default();
    send(
        port,
        format!(
            "POST {} HTTP/1.1\r\nHost: localhost:{}\r\n{}Content-Length: {}\r\nConnection: close\r\n\r\n{}",
            path, port, content_type, body.len(), body
        ),
    )
}

/// Parse an HTTP response into (status_code, body).
fn parse_http_response(response: &str) -> (u16, String) {
    let parts: Vec<&str> = response.splitn(2, "\r\n\r\n").collect();
    let headers = parts.first().unwrap_or(&"").to_string();
    let body = parts.get(1).unwrap_or(&"").to_string();

    let status = headers
        .lines()
        .next()
        .unwrap_or("")
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(0);

    let body = if headers.to_lowercase().contains("transfer-encoding: chunked") {
        decode_chunked(&body)
    } else {
        body
    };
    (status, body)
}

/// Decode chunked transfer encoding.
fn decode_chunked(data: &str) -> String {
    let mut result = String::new();
    let mut remaining = data;

    while let Some(line_end) = remaining.find("\r\n") {
        let size = match usize::from_str_radix(remaining[..line_end].trim(), 16) {
            Ok(s) => s,
            Err(_) => break,
        };
        if size == 0 {
            break;
        }
        let chunk_start = line_end + 2;
        let chunk_end = chunk_start + size;
        if chunk_end > remaining.len() {
            result.push_str(&remaining[chunk_start..]);
            break;
        }
        result.push_str(&remaining[chunk_start..chunk_end]);
        remaining = remaining.get(chunk_end + 2..).unwrap_or("");
    }

    result
}

fn json(body: &str) -> serde_json::Value {
    serde_json::from_str(body).expect("valid JSON")
}

fn vineyard(caller: &str) -> serde_json::Value {
    serde_json::json!({
        "name": "Arunga Vineyard",
        "size": "294.32ha",
        "location": "Lyaduywa, Kenya",
        "image_hash": "QmUfideC1r5JhMVwgd8vjC7DtVnXw3QGfCSQA7fUVHK789",
        "soil": "Loam",
        "token_id": TOKEN_ID,
        "caller": caller,
    })
}

#[test]
fn health_returns_200_with_version() {
    let port = next_port();
    let mut child = start_server(port, &[]);

    let (status, body) = http_get(port, "/health");
    child.kill().ok();
    child.wait().ok();

    assert_eq!(status, 200);
    let json = json(&body);
    assert_eq!(json["status"], "ok");
    assert!(json.get("version").is_some(), "version field must be present");
}

#[test]
fn metadata_reports_name_symbol_and_empty_supply() {
    let port = next_port();
    let mut child = start_server(port, &[]);

    let (status, body) = http_get(port, "/metadata");
    child.kill().ok();
    child.wait().ok();

    assert_eq!(status, 200);
    let json = json(&body);
    assert_eq!(json["name"], "Reap");
    assert_eq!(json["symbol"], "REA");
    assert_eq!(json["total_supply"], 0);
}

#[test]
fn tokenize_then_transition_flow() {
    let port = next_port();
    let mut child = start_server(port, &[]);

    let (tok_status, tok_body) = http_post(port, "/farms", &vineyard(OWNER));
    let (exists_status, exists_body) = http_get(port, &format!("/farms/{}/exists", TOKEN_ID));
    let (owner_status, owner_body) = http_get(port, &format!("/farms/{}/owner", TOKEN_ID));
    let (tr_status, tr_body) = http_post(
        port,
        &format!("/farms/{}/state", TOKEN_ID),
        &serde_json::json!({ "state": "Preparation", "caller": OWNER }),
    );
    let (state_status, state_body) = http_get(port, &format!("/farms/{}/state", TOKEN_ID));
    let (_, history_body) = http_get(port, &format!("/farms/{}/history", TOKEN_ID));
    let (_, balance_body) = http_get(port, &format!("/owners/{}/balance", OWNER));
    let (idx_status, idx_body) = http_get(port, &format!("/owners/{}/farms/1", OWNER));
    let (_, global_body) = http_get(port, "/registry/farms/1");
    child.kill().ok();
    child.wait().ok();

    assert_eq!(tok_status, 201);
    let receipt = json(&tok_body);
    assert_eq!(receipt["farm"]["state"], "Dormant");
    assert_eq!(receipt["farm"]["owner"], OWNER);
    assert_eq!(receipt["events"][0]["event"], "farm_tokenized");
    assert_eq!(receipt["events"][1]["event"], "registry_grown");
    assert_eq!(receipt["events"][1]["total_farms"], 1);

    assert_eq!(exists_status, 200);
    assert_eq!(json(&exists_body)["exists"], true);
    assert_eq!(owner_status, 200);
    assert_eq!(json(&owner_body)["owner"], OWNER);

    assert_eq!(tr_status, 200);
    let events = json(&tr_body)["events"].clone();
    assert_eq!(events[0]["event"], "state_transitioned");
    assert_eq!(events[0]["from"], "Dormant");
    assert_eq!(events[0]["to"], "Preparation");

    assert_eq!(state_status, 200);
    assert_eq!(json(&state_body)["state"], "Preparation");
    assert_eq!(json(&history_body)["history"][0]["sequence"], 1);
    assert_eq!(json(&balance_body)["balance"], 1);
    assert_eq!(idx_status, 200);
    assert_eq!(json(&idx_body)["token_id"], TOKEN_ID);
    assert_eq!(json(&global_body)["name"], "Arunga Vineyard");
}

#[test]
fn transition_by_non_owner_is_forbidden() {
    let port = next_port();
    let mut child = start_server(port, &[]);

    http_post(port, "/farms", &vineyard(OWNER));
    let (status, body) = http_post(
        port,
        &format!("/farms/{}/state", TOKEN_ID),
        &serde_json::json!({ "state": "Planting", "caller": STRANGER }),
    );
    let (_, state_body) = http_get(port, &format!("/farms/{}/state", TOKEN_ID));
    child.kill().ok();
    child.wait().ok();

    assert_eq!(status, 403);
    assert_eq!(json(&body)["kind"], "unauthorized");
    assert_eq!(json(&state_body)["state"], "Dormant");
}

#[test]
fn missing_farm_is_not_found() {
    let port = next_port();
    let mut child = start_server(port, &[]);

    let (get_status, get_body) = http_get(port, "/farms/42");
    let (tr_status, _) = http_post(
        port,
        "/farms/42/state",
        &serde_json::json!({ "state": "Planting", "caller": OWNER }),
    );
    let (idx_status, _) = http_get(port, "/registry/farms/1");
    let (exists_status, exists_body) = http_get(port, "/farms/42/exists");
    let (route_status, _) = http_get(port, "/nope");
    child.kill().ok();
    child.wait().ok();

    assert_eq!(get_status, 404);
    assert_eq!(json(&get_body)["kind"], "not_found");
    assert_eq!(tr_status, 404);
    assert_eq!(idx_status, 404);
    assert_eq!(exists_status, 200);
    assert_eq!(json(&exists_body)["exists"], false);
    assert_eq!(route_status, 404);
}

#[test]
fn duplicate_token_is_conflict() {
    let port = next_port();
    let mut child = start_server(port, &[]);

    let (first, _) = http_post(port, "/farms", &vineyard(OWNER));
    let (second, body) = http_post(port, "/farms", &vineyard(STRANGER));
    let (_, metadata) = http_get(port, "/metadata");
    child.kill().ok();
    child.wait().ok();

    assert_eq!(first, 201);
    assert_eq!(second, 409);
    assert_eq!(json(&body)["kind"], "duplicate_id");
    assert_eq!(json(&metadata)["total_supply"], 1);
}

#[test]
fn malformed_requests_are_bad_requests() {
    let port = next_port();
    let mut child = start_server(port, &[]);

    let mut blank_name = vineyard(OWNER);
    blank_name["name"] = serde_json::json!("");
    let (blank_status, blank_body) = http_post(port, "/farms", &blank_name);
    let (missing_status, missing_body) = http_post(
        port,
        "/farms",
        &serde_json::json!({ "name": "Arunga Vineyard", "caller": OWNER }),
    );
    http_post(port, "/farms", &vineyard(OWNER));
    let (state_status, state_body) = http_post(
        port,
        &format!("/farms/{}/state", TOKEN_ID),
        &serde_json::json!({ "state": "", "caller": OWNER }),
    );
    child.kill().ok();
    child.wait().ok();

    assert_eq!(blank_status, 400);
    assert_eq!(json(&blank_body)["kind"], "invalid_input");
    assert_eq!(missing_status, 400);
    assert_eq!(json(&missing_body)["kind"], "invalid_input");
    assert_eq!(state_status, 400);
    assert_eq!(json(&state_body)["kind"], "invalid_input");
}

#[test]
fn unparseable_requests_get_json_invalid_input() {
    let port = next_port();
    let mut child = start_server(port, &[]);

    let (syntax_status, syntax_body) =
        http_post_raw(port, "/farms", Some("application/json"), "{not json");
    let (untyped_status, untyped_body) =
        http_post_raw(port, "/farms", None, &vineyard(OWNER).to_string());
    let (token_status, token_body) = http_get(port, "/farms/abc");
    let (index_status, index_body) = http_get(port, &format!("/owners/{}/farms/first", OWNER));
    let (post_status, post_body) = http_post(
        port,
        "/farms/abc/state",
        &serde_json::json!({ "state": "Planting", "caller": OWNER }),
    );
    let (_, metadata) = http_get(port, "/metadata");
    child.kill().ok();
    child.wait().ok();

    for (status, body) in [
        (syntax_status, syntax_body),
        (untyped_status, untyped_body),
        (token_status, token_body),
        (index_status, index_body),
        (post_status, post_body),
    ] {
        assert_eq!(status, 400, "body: {}", body);
        assert_eq!(json(&body)["kind"], "invalid_input", "body: {}", body);
    }
    assert_eq!(json(&metadata)["total_supply"], 0);
}

#[test]
fn transfer_moves_farm_between_owners() {
    let port = next_port();
    let mut child = start_server(port, &[]);

    http_post(port, "/farms", &vineyard(OWNER));
    let (status, body) = http_post(
        port,
        &format!("/farms/{}/transfer", TOKEN_ID),
        &serde_json::json!({ "to": STRANGER, "caller": OWNER }),
    );
    let (_, owner_body) = http_get(port, &format!("/farms/{}/owner", TOKEN_ID));
    let (_, old_balance) = http_get(port, &format!("/owners/{}/balance", OWNER));
    let (_, new_farms) = http_get(port, &format!("/owners/{}/farms", STRANGER));
    child.kill().ok();
    child.wait().ok();

    assert_eq!(status, 200);
    assert_eq!(json(&body)["events"][0]["event"], "transferred");
    assert_eq!(json(&owner_body)["owner"], STRANGER);
    assert_eq!(json(&old_balance)["balance"], 0);
    let farms = json(&new_farms)["farms"].clone();
    assert_eq!(farms.as_array().map(Vec::len), Some(1));
}

#[test]
fn api_key_required_when_configured() {
    let port = next_port();
    let mut child = start_server(port, &[("REAP_API_KEY", "s3cret")]);

    let (health_status, _) = http_get(port, "/health");
    let (anon_status, _) = http_get(port, "/metadata");
    let (wrong_status, _) = http_get_with_headers(port, "/metadata", &[("X-API-Key", "nope")]);
    let (bearer_status, _) =
        http_get_with_headers(port, "/metadata", &[("Authorization", "Bearer s3cret")]);
    child.kill().ok();
    child.wait().ok();

    assert_eq!(health_status, 200);
    assert_eq!(anon_status, 401);
    assert_eq!(wrong_status, 403);
    assert_eq!(bearer_status, 200);
}

#[test]
fn rate_limit_applies_per_client() {
    let port = next_port();
    let mut child = start_server(port, &[("REAP_RATE_LIMIT", "2")]);

    let (first, _) = http_get(port, "/health");
    let (second, _) = http_get(port, "/health");
    let (third, body) = http_get(port, "/health");
    child.kill().ok();
    child.wait().ok();

    assert_eq!(first, 200);
    assert_eq!(second, 200);
    assert_eq!(third, 429);
    assert_eq!(json(&body)["kind"], "rate_limited");
}
