//! qBittorrent Web API (v2) backend.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::multipart;
use serde_json::Value as Json;

use super::{TorrentClient, TorrentInfo, determine_label, extract_credentials_from_url, injection_filename, TORRENT_LABEL};
use crate::bencode;
use crate::metainfo::calculate_infohash;
use crate::utils::url_join;

const RPC_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Qbittorrent {
    href: String,
    username: String,
    password: String,
    client: reqwest::blocking::Client,
    cookie: Mutex<Option<String>>,
}

impl Qbittorrent {
    pub fn new(qbit_url: &str) -> crate::Result<Self> {
        let (href, username, password) = extract_credentials_from_url(qbit_url, Some("/api/v2"))?;

        Ok(Self {
            href,
            username,
            password,
            client: reqwest::blocking::Client::builder()
                .timeout(RPC_TIMEOUT)
                .build()?,
            cookie: Mutex::new(None),
        })
    }

    // Deliberately avoids the re-auth wrapper: re-authenticating from
    // inside a failed authentication would loop forever.
    fn authenticate(&self) -> crate::Result<()> {
        let mut form: Vec<(&str, &str)> = Vec::new();
        if !self.username.is_empty() || !self.password.is_empty() {
            form.push(("username", &self.username));
            form.push(("password", &self.password));
        }

        let response = self
            .client
            .post(format!("{}/auth/login", self.href))
            .form(&form)
            .send()
            .and_then(|response| response.error_for_status())
            .map_err(|e| {
                crate::Error::TorrentClientAuthentication(format!("qBittorrent login failed: {e}"))
            })?;

        let sid = response
            .headers()
            .get_all(reqwest::header::SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .filter_map(|value| value.split(';').next())
            .find_map(|pair| pair.strip_prefix("SID="))
            .map(str::to_string);

        match sid {
            Some(sid) if !sid.is_empty() => {
                *self.cookie.lock().unwrap() = Some(sid);
                Ok(())
            }
            _ => Err(crate::Error::TorrentClientAuthentication(
                "qBittorrent login failed: Invalid username or password".to_string(),
            )),
        }
    }

    /// One transparent re-authentication when the SID cookie is rejected
    /// with a 403.
    fn wrap_request(
        &self,
        path: &str,
        build_body: impl Fn(reqwest::blocking::RequestBuilder) -> reqwest::blocking::RequestBuilder,
    ) -> crate::Result<String> {
        match self.request(path, &build_body) {
            Err(crate::Error::TorrentClientAuthentication(_)) => {
                self.authenticate()?;
                self.request(path, &build_body)
            }
            result => result,
        }
    }

    fn request(
        &self,
        path: &str,
        build_body: impl Fn(reqwest::blocking::RequestBuilder) -> reqwest::blocking::RequestBuilder,
    ) -> crate::Result<String> {
        let cookie = self.cookie.lock().unwrap().clone().unwrap_or_default();
        let request = self
            .client
            .post(url_join([self.href.as_str(), path]))
            .header("Cookie", format!("SID={cookie}"));

        let response = build_body(request).send().map_err(|e| {
            crate::Error::TorrentClient(format!("qBittorrent request to '{path}' failed: {e}"))
        })?;

        if response.status() == StatusCode::FORBIDDEN {
            return Err(crate::Error::TorrentClientAuthentication(
                "Failed to authenticate with qBittorrent".to_string(),
            ));
        }
        if !response.status().is_success() {
            return Err(crate::Error::TorrentClient(format!(
                "qBittorrent request to '{path}' failed: {}",
                response.status()
            )));
        }

        response.text().map_err(|e| {
            crate::Error::TorrentClient(format!("qBittorrent request to '{path}' failed: {e}"))
        })
    }

    fn does_torrent_exist(&self, infohash: &str) -> bool {
        self.get_torrent_info(infohash).is_ok()
    }
}

impl TorrentClient for Qbittorrent {
    fn setup(&self) -> crate::Result<()> {
        self.authenticate()
    }

    fn get_torrent_info(&self, infohash: &str) -> crate::Result<TorrentInfo> {
        let infohash = infohash.to_lowercase();
        let response = self.wrap_request("torrents/info", |request| {
            request.form(&[("hashes", infohash.as_str())])
        })?;

        let parsed: Json = serde_json::from_str(&response).map_err(|_| {
            crate::Error::TorrentClient("Client returned malformed json response".to_string())
        })?;
        let torrent = parsed
            .as_array()
            .and_then(|torrents| torrents.first())
            .ok_or_else(|| {
                crate::Error::TorrentClient(format!("Torrent not found in client ({infohash})"))
            })?;

        let progress = torrent["progress"].as_f64().unwrap_or_default();
        let state = torrent["state"].as_str().unwrap_or_default();
        let completion_on = torrent["completion_on"].as_i64().unwrap_or_default();
        let complete = progress == 1.0 || state == "pausedUP" || completion_on > 0;

        let save_path = PathBuf::from(torrent["save_path"].as_str().unwrap_or_default());
        // Older qBittorrent versions don't report content_path
        let content_path = match torrent["content_path"].as_str() {
            Some(content_path) => PathBuf::from(content_path),
            None => save_path.join(torrent["name"].as_str().unwrap_or_default()),
        };

        Ok(TorrentInfo {
            complete,
            label: torrent["category"].as_str().map(str::to_string),
            save_path,
            content_path,
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

        let metafile_bytes = fs::read(new_torrent_filepath)?;
        let filename = injection_filename(new_torrent_filepath);
        let category = determine_label(&source_torrent_info);
        let save_path = save_path_override
            .unwrap_or(&source_torrent_info.save_path)
            .to_string_lossy()
            .to_string();

        self.wrap_request("torrents/add", move |request| {
            let part = multipart::Part::bytes(metafile_bytes.clone()).file_name(filename.clone());
            let form = multipart::Form::new()
                .part("torrents", part)
                .text("autoTMM", "false")
                .text("category", category.clone())
                .text("tags", TORRENT_LABEL)
                .text("savepath", save_path.clone());
            request.multipart(form)
        })?;

        Ok(new_torrent_infohash)
    }
}
