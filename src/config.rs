//! Configuration loading and validation.
//!
//! Options come from a JSON file merged with environment variables (env
//! wins). Validation runs over the merged map up-front and reports every
//! problem at once rather than stopping at the first.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde_json::Value as Json;
use url::Url;

use crate::filesystem::assert_path_exists;

const DEFAULT_PORT: u16 = 9713;

const RED_KEY_PATTERN: &str = r"^[a-z0-9.]{41}$";
const OPS_KEY_PATTERN: &str = r"^[A-Za-z0-9+/]{116}$";

/// Environment variable to config key mapping.
const ENV_KEYS: &[(&str, &str)] = &[
    ("RED_KEY", "red_key"),
    ("OPS_KEY", "ops_key"),
    ("PORT", "port"),
    ("INJECT_TORRENTS", "inject_torrents"),
    ("INJECTION_LINK_DIRECTORY", "injection_link_directory"),
    ("DELUGE_RPC_URL", "deluge_rpc_url"),
    ("QBITTORRENT_URL", "qbittorrent_url"),
    ("TRANSMISSION_RPC_URL", "transmission_rpc_url"),
];

/// Validated runtime configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub red_key: String,
    pub ops_key: String,
    pub server_port: u16,
    pub inject_torrents: bool,
    pub injection_link_directory: Option<PathBuf>,
    pub deluge_rpc_url: Option<String>,
    pub transmission_rpc_url: Option<String>,
    pub qbittorrent_url: Option<String>,
}

/// Merge the JSON config file (when present) with recognized environment
/// variables into a flat string map for validation. Empty values are
/// treated as absent.
pub fn build_config_map(
    config_file: &Path,
    env: &HashMap<String, String>,
) -> crate::Result<HashMap<String, String>> {
    let mut map = HashMap::new();

    if config_file.exists() {
        let text = fs::read_to_string(config_file)?;
        let parsed: Json = serde_json::from_str(&text).map_err(|e| {
            crate::Error::Config(format!(
                "- \"{}\": could not be parsed as JSON: {e}",
                config_file.display()
            ))
        })?;

        if let Some(object) = parsed.as_object() {
            for (key, value) in object {
                let value = match value {
                    Json::String(s) => s.clone(),
                    Json::Bool(b) => b.to_string(),
                    Json::Number(n) => n.to_string(),
                    _ => continue,
                };
                if !value.is_empty() {
                    map.insert(key.clone(), value);
                }
            }
        }
    }

    for (env_key, config_key) in ENV_KEYS {
        if let Some(value) = env.get(*env_key) {
            if !value.is_empty() {
                map.insert(config_key.to_string(), value.clone());
            }
        }
    }

    Ok(map)
}

pub struct ConfigValidator {
    config_map: HashMap<String, String>,
}

impl ConfigValidator {
    const REQUIRED_KEYS: &'static [&'static str] = &["red_key", "ops_key"];
    const TORRENT_CLIENT_KEYS: &'static [&'static str] =
        &["deluge_rpc_url", "transmission_rpc_url", "qbittorrent_url"];

    pub fn new(config_map: HashMap<String, String>) -> Self {
        Self { config_map }
    }

    /// Validate every option and build the [`Config`]. All failures are
    /// collected into one [`Config`](crate::Error::Config) error.
    pub fn validate(&self) -> crate::Result<Config> {
        // BTreeMap keeps the error report in a stable order
        let mut errors: BTreeMap<String, String> = BTreeMap::new();

        self.validate_key_presence(&mut errors);
        self.validate_attributes(&mut errors);

        if !errors.is_empty() {
            let formatted = errors
                .iter()
                .map(|(key, message)| format!("- \"{key}\": {message}"))
                .collect::<Vec<_>>()
                .join("\n");
            return Err(crate::Error::Config(formatted));
        }

        Ok(Config {
            red_key: self.get("red_key").unwrap_or_default().to_string(),
            ops_key: self.get("ops_key").unwrap_or_default().to_string(),
            server_port: self
                .get("port")
                .and_then(|port| port.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            inject_torrents: self.inject_torrents_enabled(),
            injection_link_directory: self.get("injection_link_directory").map(PathBuf::from),
            deluge_rpc_url: self.get("deluge_rpc_url").map(str::to_string),
            transmission_rpc_url: self.get("transmission_rpc_url").map(str::to_string),
            qbittorrent_url: self.get("qbittorrent_url").map(str::to_string),
        })
    }

    fn validate_key_presence(&self, errors: &mut BTreeMap<String, String>) {
        for key in Self::REQUIRED_KEYS {
            if self.get(key).is_none() {
                errors.insert(
                    key.to_string(),
                    "Is required but was not found in the configuration".to_string(),
                );
            }
        }

        if self.inject_torrents_enabled() {
            if !Self::TORRENT_CLIENT_KEYS
                .iter()
                .any(|key| self.get(key).is_some())
            {
                errors.insert(
                    "torrent_clients".to_string(),
                    "A torrent client URL is required if \"inject_torrents\" is enabled".to_string(),
                );
            }

            if self.get("injection_link_directory").is_none() {
                errors.insert(
                    "injection_link_directory".to_string(),
                    "An injection directory path is required if \"inject_torrents\" is enabled"
                        .to_string(),
                );
            }
        }
    }

    fn validate_attributes(&self, errors: &mut BTreeMap<String, String>) {
        let checks: &[(&str, fn(&str) -> Result<(), String>)] = &[
            ("red_key", |key| validate_api_key(key, RED_KEY_PATTERN)),
            ("ops_key", |key| validate_api_key(key, OPS_KEY_PATTERN)),
            ("port", validate_port),
            ("deluge_rpc_url", |url| {
                validate_client_url(url, "deluge_rpc_url", true, "http://:<PASSWORD>@localhost:8112/json")
            }),
            ("transmission_rpc_url", |url| {
                validate_client_url(
                    url,
                    "transmission_rpc_url",
                    true,
                    "http://:<PASSWORD>@localhost:51413/transmission/rpc",
                )
            }),
            ("qbittorrent_url", |url| {
                validate_client_url(url, "qbittorrent_url", false, "")
            }),
            ("inject_torrents", validate_boolean),
            ("injection_link_directory", validate_directory),
        ];

        for (key, check) in checks {
            if errors.contains_key(*key) {
                continue;
            }
            if let Some(value) = self.get(key) {
                if let Err(message) = check(value) {
                    errors.insert(key.to_string(), message);
                }
            }
        }
    }

    fn inject_torrents_enabled(&self) -> bool {
        self.get("inject_torrents")
            .is_some_and(|value| value.trim().eq_ignore_ascii_case("true"))
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.config_map
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }
}

fn validate_api_key(key: &str, pattern: &str) -> Result<(), String> {
    let matches = Regex::new(pattern)
        .map(|re| re.is_match(key))
        .unwrap_or(false);

    if matches {
        Ok(())
    } else {
        Err(format!(
            "does not appear to match known API key patterns: \"{key}\""
        ))
    }
}

fn validate_port(port: &str) -> Result<(), String> {
    match port.parse::<u64>() {
        Ok(n) if (1..=65535).contains(&n) => Ok(()),
        _ => Err(format!("Invalid \"port\" ({port}): Not between 1 and 65535")),
    }
}

fn validate_client_url(
    url: &str,
    key: &str,
    requires_password: bool,
    example: &str,
) -> Result<(), String> {
    let parsed = Url::parse(url).map_err(|_| format!("Invalid \"{key}\" provided: {url}"))?;
    if parsed.host_str().is_none() {
        return Err(format!("Invalid \"{key}\" provided: {url}"));
    }

    if requires_password && parsed.password().unwrap_or_default().is_empty() {
        return Err(format!(
            "You need to define a password in the URL. (e.g. {example})"
        ));
    }

    Ok(())
}

fn validate_boolean(value: &str) -> Result<(), String> {
    match value.trim().to_lowercase().as_str() {
        "true" | "false" => Ok(()),
        _ => Err("value is not boolean (\"true\" or \"false\")".to_string()),
    }
}

fn validate_directory(path: &str) -> Result<(), String> {
    assert_path_exists(path)
        .map(|_| ())
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_map() -> HashMap<String, String> {
        HashMap::from([
            ("red_key".to_string(), format!("{}.", "a".repeat(40))),
            ("ops_key".to_string(), "b".repeat(116)),
        ])
    }

    #[test]
    fn test_valid_minimal_config() {
        let config = ConfigValidator::new(valid_map()).validate().unwrap();
        assert_eq!(config.server_port, 9713);
        assert!(!config.inject_torrents);
        assert!(config.deluge_rpc_url.is_none());
    }

    #[test]
    fn test_missing_keys_are_reported_together() {
        let error = ConfigValidator::new(HashMap::new()).validate().unwrap_err();
        let message = error.to_string();
        assert!(message.contains("\"red_key\""));
        assert!(message.contains("\"ops_key\""));
    }

    #[test]
    fn test_rejects_malformed_api_keys() {
        let mut map = valid_map();
        map.insert("red_key".to_string(), "UPPERCASE-IS-INVALID".to_string());

        let message = ConfigValidator::new(map).validate().unwrap_err().to_string();
        assert!(message.contains("known API key patterns"));
    }

    #[test]
    fn test_rejects_out_of_range_port() {
        let mut map = valid_map();
        map.insert("port".to_string(), "70000".to_string());

        let message = ConfigValidator::new(map).validate().unwrap_err().to_string();
        assert!(message.contains("Not between 1 and 65535"));
    }

    #[test]
    fn test_inject_torrents_requires_client_and_link_directory() {
        let mut map = valid_map();
        map.insert("inject_torrents".to_string(), "true".to_string());

        let message = ConfigValidator::new(map).validate().unwrap_err().to_string();
        assert!(message.contains("torrent client URL is required"));
        assert!(message.contains("injection directory path is required"));
    }

    #[test]
    fn test_deluge_url_requires_password() {
        let mut map = valid_map();
        map.insert(
            "deluge_rpc_url".to_string(),
            "http://localhost:8112/json".to_string(),
        );

        let message = ConfigValidator::new(map).validate().unwrap_err().to_string();
        assert!(message.contains("define a password"));
    }

    #[test]
    fn test_full_injection_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut map = valid_map();
        map.insert("inject_torrents".to_string(), "true".to_string());
        map.insert(
            "deluge_rpc_url".to_string(),
            "http://:secret@localhost:8112/json".to_string(),
        );
        map.insert(
            "injection_link_directory".to_string(),
            dir.path().to_string_lossy().to_string(),
        );
        map.insert("port".to_string(), "9800".to_string());

        let config = ConfigValidator::new(map).validate().unwrap();
        assert!(config.inject_torrents);
        assert_eq!(config.server_port, 9800);
        assert_eq!(
            config.injection_link_directory,
            Some(dir.path().to_path_buf())
        );
    }

    #[test]
    fn test_env_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_file = dir.path().join("config.json");
        fs::write(
            &config_file,
            serde_json::json!({"red_key": "from-file", "port": 1234}).to_string(),
        )
        .unwrap();

        let env = HashMap::from([("RED_KEY".to_string(), "from-env".to_string())]);
        let map = build_config_map(&config_file, &env).unwrap();

        assert_eq!(map["red_key"], "from-env");
        assert_eq!(map["port"], "1234");
    }

    #[test]
    fn test_missing_config_file_is_fine() {
        let map = build_config_map(Path::new("/nonexistent/config.json"), &HashMap::new()).unwrap();
        assert!(map.is_empty());
    }
}
