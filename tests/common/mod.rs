//! Shared fixtures: synthesized torrents and mock Gazelle endpoints.

#![allow(dead_code)]

use std::path::Path;
use std::time::Duration;

use httpmock::MockServer;

use fertilizer::api::GazelleApi;
use fertilizer::bencode::{self, Value};

pub const SUCCESS_RESPONSE: &str =
    r#"{"status": "success", "response": {"torrent": {"filePath": "foo", "id": 123}}}"#;
pub const KNOWN_BAD_RESPONSE: &str = r#"{"status": "failure", "error": "bad hash parameter"}"#;
pub const UNKNOWN_BAD_RESPONSE: &str = r#"{"status": "failure", "error": "unknown error"}"#;
pub const ANNOUNCE_SUCCESS_RESPONSE: &str =
    r#"{"status": "success", "response": {"passkey": "bar"}}"#;

/// A minimal single-file torrent dictionary.
pub fn make_torrent(announce: Option<&str>, source: Option<&[u8]>, name: &str) -> Value {
    let mut info = Value::Dict(Default::default());
    info.insert(b"length", Value::Int(1024));
    info.insert(b"name", Value::bytes(name.as_bytes()));
    info.insert(b"piece length", Value::Int(262144));
    info.insert(b"pieces", Value::bytes(vec![0u8; 20]));
    if let Some(source) = source {
        info.insert(b"source", Value::bytes(source));
    }

    let mut torrent = Value::Dict(Default::default());
    if let Some(announce) = announce {
        torrent.insert(b"announce", Value::bytes(announce.as_bytes()));
    }
    torrent.insert(b"info", info);
    torrent
}

pub fn red_source_torrent() -> Value {
    make_torrent(
        Some("https://flacsfor.me/123abc/announce"),
        Some(b"RED"),
        "red_source",
    )
}

pub fn ops_source_torrent() -> Value {
    make_torrent(
        Some("https://home.opsfet.ch/123abc/announce"),
        Some(b"OPS"),
        "ops_source",
    )
}

/// A torrent neither source flag nor announce fragment can place.
pub fn unknown_source_torrent() -> Value {
    make_torrent(Some("https://unknown.example/announce"), None, "no_source")
}

pub fn write_torrent(path: &Path, torrent: &Value) {
    bencode::save_file(path, torrent).unwrap();
}

/// API client aimed at a mock server: no rate limit, one attempt.
pub fn mock_api(server: &MockServer, sitename: &'static str, tracker_url: &str) -> GazelleApi {
    GazelleApi::new(
        sitename,
        server.base_url(),
        tracker_url,
        "secret".to_string(),
        Duration::ZERO,
    )
    .unwrap()
    .with_max_retries(1)
}

pub fn mock_red_api(server: &MockServer) -> GazelleApi {
    mock_api(server, "RED", "https://flacsfor.me")
}

pub fn mock_ops_api(server: &MockServer) -> GazelleApi {
    mock_api(server, "OPS", "https://home.opsfet.ch")
}
