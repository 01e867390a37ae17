//! Transmission RPC backend.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::StatusCode;
use serde_json::{Value as Json, json};

use super::{TorrentClient, TorrentInfo, determine_label, extract_credentials_from_url};
use crate::bencode;
use crate::metainfo::calculate_infohash;

const RPC_TIMEOUT: Duration = Duration::from_secs(10);
const SESSION_ID_HEADER: &str = "X-Transmission-Session-Id";

/// Transmission torrent status values (the `status` field of `torrent-get`).
const STATUS_QUEUED_SEED: i64 = 5;
const STATUS_SEEDING: i64 = 6;

pub struct TransmissionBt {
    base_url: String,
    username: String,
    password: String,
    client: reqwest::blocking::Client,
    session_id: Mutex<Option<String>>,
}

impl TransmissionBt {
    pub fn new(rpc_url: &str) -> crate::Result<Self> {
        let (base_url, username, password) =
            extract_credentials_from_url(rpc_url, Some("transmission/rpc"))?;

        Ok(Self {
            base_url,
            username,
            password,
            client: reqwest::blocking::Client::builder()
                .timeout(RPC_TIMEOUT)
                .build()?,
            session_id: Mutex::new(None),
        })
    }

    // Transmission answers 409 to a request with a stale or absent session
    // id and hands out a fresh one in the response headers. Deliberately
    // avoids the re-auth wrapper to rule out an authentication loop.
    fn authenticate(&self) -> crate::Result<()> {
        let session_id = self.session_id.lock().unwrap().clone().unwrap_or_default();
        let response = self
            .client
            .post(&self.base_url)
            .basic_auth(&self.username, Some(&self.password))
            .header(SESSION_ID_HEADER, session_id)
            .send()
            .map_err(|e| {
                crate::Error::TorrentClientAuthentication(format!(
                    "TransmissionBt login failed: {e}"
                ))
            })?;

        if response.status() == StatusCode::CONFLICT {
            let session_id = response
                .headers()
                .get(SESSION_ID_HEADER)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string);
            *self.session_id.lock().unwrap() = session_id;
        } else if let Err(e) = response.error_for_status() {
            return Err(crate::Error::TorrentClientAuthentication(format!(
                "TransmissionBt login failed: {e}"
            )));
        }

        if self.session_id.lock().unwrap().is_none() {
            return Err(crate::Error::TorrentClientAuthentication(
                "TransmissionBt login failed: Invalid username or password".to_string(),
            ));
        }

        Ok(())
    }

    /// One transparent re-authentication when the session id is rejected
    /// with a 409.
    fn wrap_request(&self, method: &str, arguments: Json) -> crate::Result<Json> {
        match self.request(method, arguments.clone()) {
            Err(crate::Error::TorrentClientAuthentication(_)) => {
                self.authenticate()?;
                self.request(method, arguments)
            }
            result => result,
        }
    }

    fn request(&self, method: &str, arguments: Json) -> crate::Result<Json> {
        let session_id = self.session_id.lock().unwrap().clone().unwrap_or_default();
        let response = self
            .client
            .post(&self.base_url)
            .basic_auth(&self.username, Some(&self.password))
            .header(SESSION_ID_HEADER, session_id)
            .json(&json!({"method": method, "arguments": arguments}))
            .send()
            .map_err(|e| {
                crate::Error::TorrentClient(format!(
                    "TransmissionBt request to '{}' for method '{method}' failed: {e}",
                    self.base_url
                ))
            })?;

        if response.status() == StatusCode::CONFLICT {
            return Err(crate::Error::TorrentClientAuthentication(
                "Failed to authenticate with TransmissionBt".to_string(),
            ));
        }
        if !response.status().is_success() {
            return Err(crate::Error::TorrentClient(format!(
                "TransmissionBt request to '{}' for method '{method}' failed: {}",
                self.base_url,
                response.status()
            )));
        }

        response.json().map_err(|_| {
            crate::Error::TorrentClient("Client returned malformed json response".to_string())
        })
    }

    fn does_torrent_exist(&self, infohash: &str) -> bool {
        self.get_torrent_info(infohash).is_ok()
    }
}

impl TorrentClient for TransmissionBt {
    fn setup(&self) -> crate::Result<()> {
        self.authenticate()
    }

    fn get_torrent_info(&self, infohash: &str) -> crate::Result<TorrentInfo> {
        let infohash = infohash.to_lowercase();
        let response = self.wrap_request(
            "torrent-get",
            json!({
                "fields": ["labels", "downloadDir", "percentDone", "status", "doneDate", "name"],
                "ids": [&infohash]
            }),
        )?;

        let torrent = response
            .pointer("/arguments/torrents/0")
            .ok_or_else(|| {
                crate::Error::TorrentClient(format!("Torrent not found in client ({infohash})"))
            })?;

        let percent_done = torrent["percentDone"].as_f64().unwrap_or_default();
        let done_date = torrent["doneDate"].as_i64().unwrap_or_default();
        let status = torrent["status"].as_i64().unwrap_or_default();
        let complete = (percent_done == 1.0 || done_date > 0)
            && (status == STATUS_SEEDING || status == STATUS_QUEUED_SEED);

        let save_path = PathBuf::from(torrent["downloadDir"].as_str().unwrap_or_default());
        let name = torrent["name"].as_str().unwrap_or_default();
        let label = torrent["labels"]
            .as_array()
            .and_then(|labels| labels.first())
            .and_then(Json::as_str)
            .map(str::to_string);

        Ok(TorrentInfo {
            complete,
            label,
            content_path: save_path.join(name),
            save_path,
        })
    }

    fn inject_torrent(
        &self,
        source_infohash: &str,
        new_torrent_filepath: &Path,
        save_path_override: Option<&Path>,
    ) -> crate::Result<String> {
        let source_torrent_info = self.get_torrent_info(source_infohash)?;
        if !source_torrent_info.complete {
            return Err(crate::Error::TorrentClient(
                "Cannot inject a torrent that is not complete".to_string(),
            ));
        }

        let new_torrent_data = bencode::load_file(new_torrent_filepath).ok_or_else(|| {
            crate::Error::TorrentDecoding("Error decoding torrent file".to_string())
        })?;
        let new_torrent_infohash = calculate_infohash(&new_torrent_data)?.to_lowercase();
        if self.does_torrent_exist(&new_torrent_infohash) {
            return Err(crate::Error::TorrentExistsInClient(format!(
                "New torrent already exists in client ({new_torrent_infohash})"
            )));
        }

        let save_path = save_path_override.unwrap_or(&source_torrent_info.save_path);
        let response = self.wrap_request(
            "torrent-add",
            json!({
                "download-dir": save_path.to_string_lossy(),
                "metainfo": BASE64.encode(fs::read(new_torrent_filepath)?),
                "labels": [determine_label(&source_torrent_info)]
            }),
        )?;

        let result = response["result"].as_str().unwrap_or("no result");
        if result != "success" {
            return Err(crate::Error::TorrentClient(format!(
                "TransmissionBt refused the new torrent: {result}"
            )));
        }

        Ok(new_torrent_infohash)
    }
}
