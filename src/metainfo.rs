//! Torrent metafile inspection
//!
//! Works on decoded [`Value`] dictionaries rather than a typed model: the
//! generator must re-encode the `info` dictionary byte-for-byte, so nothing
//! here is allowed to drop keys it does not understand.

use sha1::{Digest, Sha1};

use crate::bencode::Value;
use crate::trackers::Tracker;

/// True iff `s` is a 40-character hex string encoding a nonzero 160-bit
/// integer.
pub fn is_valid_infohash(s: &str) -> bool {
    s.len() == 40 && s.chars().all(|c| c.is_ascii_hexdigit()) && s.chars().any(|c| c != '0')
}

/// `info.source`, when present.
pub fn get_source(torrent: &Value) -> Option<&[u8]> {
    torrent.get(b"info")?.get(b"source")?.as_bytes()
}

/// `info.name`, when present.
pub fn get_name(torrent: &Value) -> Option<&[u8]> {
    torrent.get(b"info")?.get(b"name")?.as_bytes()
}

/// Announce URL candidates: the `announce` key (a single byte string or a
/// list), or a qBittorrent-style `trackers` list of lists from a fastresume
/// sidecar, flattened.
pub fn get_announce_urls(torrent: &Value) -> Vec<&[u8]> {
    if let Some(announce) = torrent.get(b"announce") {
        let urls = flatten_bytes(announce);
        if !urls.is_empty() {
            return urls;
        }
    }

    torrent
        .get(b"trackers")
        .map(flatten_bytes)
        .unwrap_or_default()
}

/// Resolve which tracker a torrent came from. `info.source` is checked
/// first; failing that, any announce URL containing a tracker's announce
/// fragment decides.
pub fn get_origin_tracker(torrent: &Value) -> Option<Tracker> {
    let source = get_source(torrent).unwrap_or(b"");
    let announce_urls = get_announce_urls(torrent);

    for tracker in [Tracker::Red, Tracker::Ops] {
        if tracker.source_flags_for_search().contains(&source) {
            return Some(tracker);
        }

        if announce_urls
            .iter()
            .any(|url| contains_subslice(url, tracker.announce_fragment()))
        {
            return Some(tracker);
        }
    }

    None
}

/// Uppercase hex SHA1 over the canonical encoding of `info`.
pub fn calculate_infohash(torrent: &Value) -> crate::Result<String> {
    let info = torrent.get(b"info").ok_or_else(missing_info)?;

    let mut hasher = Sha1::new();
    hasher.update(info.encode()?);
    Ok(hex::encode_upper(hasher.finalize()))
}

/// The infohash this torrent would have under a different `info.source`.
/// Operates on a deep copy; the caller's value is never mutated.
pub fn recalculate_hash_for_new_source(torrent: &Value, new_source: &[u8]) -> crate::Result<String> {
    let mut copy = torrent.clone();
    let info = copy.get_mut(b"info").ok_or_else(missing_info)?;
    if !info.insert(b"source", Value::bytes(new_source)) {
        return Err(missing_info());
    }

    calculate_infohash(&copy)
}

fn missing_info() -> crate::Error {
    crate::Error::TorrentDecoding("Torrent data does not contain 'info' key".into())
}

fn flatten_bytes(value: &Value) -> Vec<&[u8]> {
    match value {
        Value::Bytes(bytes) => vec![bytes],
        Value::List(list) => list.iter().flat_map(flatten_bytes).collect(),
        _ => Vec::new(),
    }
}

fn contains_subslice(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty()
        && haystack.len() >= needle.len()
        && haystack.windows(needle.len()).any(|w| w == needle)
}
