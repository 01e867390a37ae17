//! Deluge JSON-RPC backend.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Value as Json, json};

use super::{TorrentClient, TorrentInfo, determine_label, extract_credentials_from_url, injection_filename};
use crate::bencode;
use crate::metainfo::calculate_infohash;

const RPC_TIMEOUT: Duration = Duration::from_secs(10);

/// Error code Deluge uses for a rejected or expired session.
const AUTH_ERROR_CODE: i64 = 1;

pub struct Deluge {
    href: String,
    password: String,
    client: reqwest::blocking::Client,
    state: Mutex<DelugeState>,
}

#[derive(Default)]
struct DelugeState {
    cookie: Option<String>,
    request_id: u64,
    label_plugin_enabled: bool,
}

impl Deluge {
    pub fn new(rpc_url: &str) -> crate::Result<Self> {
        let (href, _username, password) = extract_credentials_from_url(rpc_url, None)?;

        Ok(Self {
            href,
            password,
            client: reqwest::blocking::Client::builder()
                .timeout(RPC_TIMEOUT)
                .build()?,
            state: Mutex::new(DelugeState::default()),
        })
    }

    fn authenticate(&self) -> crate::Result<()> {
        if self.password.is_empty() {
            return Err(crate::Error::TorrentClient(
                "You need to define a password in the Deluge RPC URL. (e.g. http://:<PASSWORD>@localhost:8112/json)"
                    .to_string(),
            ));
        }

        let auth_response = self.request("auth.login", json!([self.password]))?;
        if auth_response != Json::Bool(true) {
            return Err(crate::Error::TorrentClient(
                "Reached Deluge RPC endpoint but failed to authenticate".to_string(),
            ));
        }

        self.request("web.connected", json!([]))?;
        Ok(())
    }

    fn is_label_plugin_enabled(&self) -> crate::Result<bool> {
        let plugins = self.wrap_request("core.get_enabled_plugins", json!([]))?;
        Ok(plugins
            .as_array()
            .is_some_and(|list| list.iter().any(|p| p == "Label")))
    }

    /// One transparent re-authentication when the session is rejected
    /// (Deluge signals this with error code 1).
    fn wrap_request(&self, method: &str, params: Json) -> crate::Result<Json> {
        match self.request(method, params.clone()) {
            Err(crate::Error::TorrentClientAuthentication(_)) => {
                self.authenticate()?;
                self.request(method, params)
            }
            result => result,
        }
    }

    fn request(&self, method: &str, params: Json) -> crate::Result<Json> {
        let (request_id, cookie) = {
            let mut state = self.state.lock().unwrap();
            state.request_id += 1;
            (state.request_id, state.cookie.clone())
        };

        let mut request = self
            .client
            .post(&self.href)
            .json(&json!({"method": method, "params": params, "id": request_id}));
        if let Some(cookie) = cookie {
            request = request.header("Cookie", cookie);
        }

        let response = request.send().map_err(|e| {
            if e.is_timeout() {
                crate::Error::TorrentClient(format!("Deluge method {method} timed out after 10 seconds"))
            } else {
                crate::Error::TorrentClient(format!("Failed to connect to Deluge at {}", self.href))
            }
        })?;

        if let Some(set_cookie) = response.headers().get(reqwest::header::SET_COOKIE) {
            let cookie = set_cookie
                .to_str()
                .unwrap_or_default()
                .split(';')
                .next()
                .unwrap_or_default()
                .to_string();
            self.state.lock().unwrap().cookie = Some(cookie);
        }

        let json_response: Json = response.json().map_err(|_| {
            crate::Error::TorrentClient(format!("Deluge method {method} response was non-JSON"))
        })?;

        let error = &json_response["error"];
        if !error.is_null() {
            if error["code"].as_i64() == Some(AUTH_ERROR_CODE) {
                return Err(crate::Error::TorrentClientAuthentication(format!(
                    "Deluge method {method} was rejected for lack of authentication"
                )));
            }
            return Err(crate::Error::TorrentClient(format!(
                "Deluge method {method} returned an error: {error}"
            )));
        }

        Ok(json_response["result"].clone())
    }

    fn set_label(&self, infohash: &str, label: &str) -> crate::Result<()> {
        if !self.state.lock().unwrap().label_plugin_enabled {
            return Ok(());
        }

        let current_labels = self.wrap_request("label.get_labels", json!([]))?;
        let already_known = current_labels
            .as_array()
            .is_some_and(|labels| labels.iter().any(|l| l == label));
        if !already_known {
            self.wrap_request("label.add", json!([label]))?;
        }

        self.wrap_request("label.set_torrent", json!([infohash, label]))?;
        Ok(())
    }

    fn does_torrent_exist(&self, infohash: &str) -> bool {
        self.get_torrent_info(infohash).is_ok()
    }
}

impl TorrentClient for Deluge {
    fn setup(&self) -> crate::Result<()> {
        self.authenticate()?;
        let label_plugin_enabled = self.is_label_plugin_enabled()?;
        self.state.lock().unwrap().label_plugin_enabled = label_plugin_enabled;
        Ok(())
    }

    fn get_torrent_info(&self, infohash: &str) -> crate::Result<TorrentInfo> {
        let infohash = infohash.to_lowercase();
        let params = json!([
            ["name", "state", "progress", "save_path", "label", "total_remaining"],
            {"hash": &infohash}
        ]);

        let response = self.wrap_request("web.update_ui", params)?;
        let torrents = response.get("torrents").ok_or_else(|| {
            crate::Error::TorrentClient("Client returned unexpected response (object missing)".to_string())
        })?;
        let torrent = torrents.get(&infohash).ok_or_else(|| {
            crate::Error::TorrentClient(format!("Torrent not found in client ({infohash})"))
        })?;

        let state = torrent["state"].as_str().unwrap_or_default();
        let progress = torrent["progress"].as_f64().unwrap_or_default();
        let total_remaining = torrent["total_remaining"].as_f64().unwrap_or_default();
        let complete = (state == "Paused" && (progress == 100.0 || total_remaining == 0.0))
            || state == "Seeding"
            || progress == 100.0
            || total_remaining == 0.0;

        let save_path = PathBuf::from(torrent["save_path"].as_str().unwrap_or_default());
        let name = torrent["name"].as_str().unwrap_or_default();

        Ok(TorrentInfo {
            complete,
            label: torrent["label"].as_str().map(str::to_string),
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
        let params = json!([
            injection_filename(new_torrent_filepath),
            BASE64.encode(fs::read(new_torrent_filepath)?),
            {"download_location": save_path.to_string_lossy()}
        ]);

        let added_hash = self.wrap_request("core.add_torrent_file", params)?;
        let added_hash = added_hash
            .as_str()
            .ok_or_else(|| {
                crate::Error::TorrentClient("Deluge did not report an infohash for the added torrent".to_string())
            })?
            .to_string();

        self.set_label(&added_hash, &determine_label(&source_torrent_info))?;

        Ok(added_hash)
    }
}
