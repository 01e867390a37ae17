//! Cross-seed generation: given a torrent from one tracker, find the same
//! content on the sibling tracker and materialize a metafile for it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde_json::Value as Json;

use crate::api::GazelleApi;
use crate::bencode::{self, Value};
use crate::filesystem::replace_extension;
use crate::metainfo::{get_origin_tracker, recalculate_hash_for_new_source};
use crate::trackers::Tracker;

/// Infohash cache built per scan: uppercase hex infohash to the file that
/// carries it.
pub type InfohashCache = HashMap<String, PathBuf>;

/// Generate a metafile for the reciprocal tracker of `source_torrent_path`
/// if the same content exists there.
///
/// Returns the sibling tracker, the path of the new metafile, and whether it
/// already existed (true: idempotent hit, false: created just now).
///
/// The caches short-circuit API traffic: a candidate hash found in
/// `input_infohashes` means the caller's own input directory already holds a
/// sibling copy ([`TorrentAlreadyExists`](crate::Error::TorrentAlreadyExists));
/// one found in `output_infohashes` is returned as an idempotent success.
pub fn generate_new_torrent_from_file(
    source_torrent_path: &Path,
    output_directory: &Path,
    red_api: &GazelleApi,
    ops_api: &GazelleApi,
    input_infohashes: Option<&InfohashCache>,
    output_infohashes: Option<&InfohashCache>,
) -> crate::Result<(Tracker, PathBuf, bool)> {
    let (source_torrent_data, source_tracker) = load_torrent_and_tracker(source_torrent_path)?;
    let new_tracker = source_tracker.reciprocal();
    let api = match new_tracker {
        Tracker::Red => red_api,
        Tracker::Ops => ops_api,
    };

    let all_possible_hashes = source_tracker
        .reciprocal()
        .source_flags_for_creation()
        .iter()
        .map(|flag| recalculate_hash_for_new_source(&source_torrent_data, flag))
        .collect::<crate::Result<Vec<_>>>()?;

    if let Some(found) = find_matching_hash(&all_possible_hashes, input_infohashes) {
        return Err(crate::Error::TorrentAlreadyExists(format!(
            "Torrent already exists in input directory at {}",
            input_infohashes.unwrap()[&found].display()
        )));
    }
    if let Some(found) = find_matching_hash(&all_possible_hashes, output_infohashes) {
        return Ok((
            new_tracker,
            output_infohashes.unwrap()[&found].clone(),
            true,
        ));
    }

    let mut stored_error: Option<String> = None;

    for new_source in new_tracker.source_flags_for_creation() {
        let new_hash = recalculate_hash_for_new_source(&source_torrent_data, new_source)?;
        let api_response = api.find_torrent(&new_hash)?;

        if api_response.get("status").and_then(Json::as_str) == Some("success") {
            let new_torrent_filepath =
                generate_torrent_output_filepath(&api_response, new_tracker, new_source, output_directory)?;

            if new_torrent_filepath.exists() {
                return Ok((new_tracker, new_torrent_filepath, true));
            }

            let torrent_id = get_torrent_id(&api_response)?;
            let mut new_torrent_data = source_torrent_data.clone();
            new_torrent_data
                .get_mut(b"info")
                .ok_or_else(|| {
                    crate::Error::TorrentDecoding("Error decoding torrent file".to_string())
                })?
                .insert(b"source", Value::bytes(*new_source));
            new_torrent_data.insert(b"announce", Value::bytes(api.announce_url()?.into_bytes()));
            new_torrent_data.insert(
                b"comment",
                Value::bytes(
                    format!("{}/torrents.php?torrentid={torrent_id}", api.site_url()).into_bytes(),
                ),
            );

            bencode::save_file(&new_torrent_filepath, &new_torrent_data)?;
            tracing::info!(
                "Generated cross-seed for {} as {}",
                new_tracker.site_shortname(),
                new_torrent_filepath.display()
            );

            return Ok((new_tracker, new_torrent_filepath, false));
        }

        stored_error = api_response
            .get("error")
            .and_then(Json::as_str)
            .map(str::to_string);
    }

    match stored_error.as_deref() {
        Some("bad hash parameter") | Some("bad parameters") => {
            Err(crate::Error::TorrentNotFound(format!(
                "Torrent could not be found on {}",
                new_tracker.site_shortname()
            )))
        }
        _ => Err(crate::Error::Unknown(format!(
            "An unknown error occurred in the API response from {}",
            new_tracker.site_shortname()
        ))),
    }
}

/// `<output_root>/<shortname>/<unescaped filePath>[ <flag>].torrent`; the
/// bracket suffix is omitted for the empty flag. The filePath from the API
/// is used verbatim after HTML-unescaping, embedded directories included.
fn generate_torrent_output_filepath(
    api_response: &Json,
    new_tracker: Tracker,
    new_source: &[u8],
    output_directory: &Path,
) -> crate::Result<PathBuf> {
    let filepath_from_api = api_response
        .pointer("/response/torrent/filePath")
        .and_then(Json::as_str)
        .ok_or_else(|| {
            crate::Error::Unknown(format!(
                "API response from {} did not include a file path",
                new_tracker.site_shortname()
            ))
        })?;

    let unescaped = html_escape::decode_html_entities(filepath_from_api);
    let source_suffix = if new_source.is_empty() {
        String::new()
    } else {
        format!(" [{}]", String::from_utf8_lossy(new_source))
    };

    Ok(output_directory
        .join(new_tracker.site_shortname())
        .join(format!("{unescaped}{source_suffix}.torrent")))
}

fn get_torrent_id(api_response: &Json) -> crate::Result<String> {
    match api_response.pointer("/response/torrent/id") {
        Some(Json::Number(id)) => Ok(id.to_string()),
        Some(Json::String(id)) => Ok(id.clone()),
        _ => Err(crate::Error::Unknown(
            "API response did not include a torrent id".to_string(),
        )),
    }
}

fn find_matching_hash(
    all_possible_hashes: &[String],
    infohashes: Option<&InfohashCache>,
) -> Option<String> {
    let infohashes = infohashes?;
    all_possible_hashes
        .iter()
        .find(|hash| infohashes.contains_key(*hash))
        .cloned()
}

fn load_torrent_and_tracker(torrent_path: &Path) -> crate::Result<(Value, Tracker)> {
    // qBittorrent strips announce URLs from metafiles taken out of
    // BT_backup and keeps them in a `.fastresume` sidecar's `trackers`
    // list, so the sidecar is consulted as a fallback origin witness.
    let source_torrent_data = bencode::load_file(torrent_path)
        .filter(|data| data.get(b"info").is_some())
        .ok_or_else(|| crate::Error::TorrentDecoding("Error decoding torrent file".to_string()))?;

    let fastresume_data = bencode::load_file(replace_extension(torrent_path, ".fastresume"));

    let source_tracker = get_origin_tracker(&source_torrent_data)
        .or_else(|| fastresume_data.as_ref().and_then(get_origin_tracker))
        .ok_or_else(|| {
            crate::Error::UnknownTracker(
                "Torrent not from OPS or RED based on source or announce URL".to_string(),
            )
        })?;

    Ok((source_torrent_data, source_tracker))
}
