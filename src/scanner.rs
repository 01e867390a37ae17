//! Directory and single-file scan entry points.

use std::path::{Path, PathBuf};

use crate::api::GazelleApi;
use crate::bencode;
use crate::filesystem::{assert_path_exists, list_files_of_extension, mkdir_p};
use crate::generator::{InfohashCache, generate_new_torrent_from_file};
use crate::injection::Injection;
use crate::metainfo::calculate_infohash;
use crate::progress::Progress;

/// Scan a directory of `.torrent` files, generating cross-seeds for every
/// one that can be matched on the sibling tracker. Individual failures are
/// classified and counted; they never abort the loop. Returns the final
/// report.
pub fn scan_torrent_directory(
    input_directory: &Path,
    output_directory: &Path,
    red_api: &GazelleApi,
    ops_api: &GazelleApi,
    injector: Option<&Injection>,
) -> crate::Result<String> {
    let input_directory = assert_path_exists(input_directory)?;
    let output_directory = mkdir_p(output_directory)?;

    let input_torrents = list_files_of_extension(&input_directory, ".torrent");
    let output_torrents = list_files_of_extension(&output_directory, ".torrent");
    let input_infohashes = collect_infohashes_from_files(&input_torrents);
    let output_infohashes = collect_infohashes_from_files(&output_torrents);

    let mut progress = Progress::new(input_torrents.len());

    for (i, torrent_path) in input_torrents.iter().enumerate() {
        let basename = torrent_path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        println!("({}/{}) {basename}", i + 1, progress.total);

        let generated = generate_new_torrent_from_file(
            torrent_path,
            &output_directory,
            red_api,
            ops_api,
            Some(&input_infohashes),
            Some(&output_infohashes),
        );

        match generated {
            Ok((new_tracker, new_torrent_filepath, was_previously_generated)) => {
                if let Some(injector) = injector {
                    match injector.inject_torrent(torrent_path, &new_torrent_filepath, new_tracker)
                    {
                        Ok(_) => {}
                        Err(crate::Error::TorrentExistsInClient(message)) => {
                            progress.already_exists.print(&message);
                            continue;
                        }
                        Err(e) => {
                            progress.error.print(&e.to_string());
                            continue;
                        }
                    }
                }

                if was_previously_generated {
                    progress
                        .already_exists
                        .print("Found, but the output .torrent already exists.");
                } else {
                    progress.generated.print(&format!(
                        "Found with source '{}' and generated as '{}'.",
                        new_tracker.site_shortname(),
                        new_torrent_filepath.display()
                    ));
                }
            }
            Err(crate::Error::TorrentDecoding(message)) => progress.error.print(&message),
            Err(crate::Error::UnknownTracker(message)) => progress.skipped.print(&message),
            Err(crate::Error::TorrentAlreadyExists(message)) => {
                progress.already_exists.print(&message)
            }
            Err(crate::Error::TorrentNotFound(message)) => progress.not_found.print(&message),
            Err(e) => progress.error.print(&e.to_string()),
        }
    }

    Ok(progress.report())
}

/// Generate (and optionally inject) a cross-seed for a single `.torrent`
/// file. The output cache is still consulted so repeated runs are
/// idempotent; errors propagate to the caller.
pub fn scan_torrent_file(
    source_torrent_path: &Path,
    output_directory: &Path,
    red_api: &GazelleApi,
    ops_api: &GazelleApi,
    injector: Option<&Injection>,
) -> crate::Result<PathBuf> {
    let source_torrent_path = assert_path_exists(source_torrent_path)?;
    let output_directory = mkdir_p(output_directory)?;

    let output_torrents = list_files_of_extension(&output_directory, ".torrent");
    let output_infohashes = collect_infohashes_from_files(&output_torrents);

    let (new_tracker, new_torrent_filepath, _was_previously_generated) =
        generate_new_torrent_from_file(
            &source_torrent_path,
            &output_directory,
            red_api,
            ops_api,
            None,
            Some(&output_infohashes),
        )?;

    if let Some(injector) = injector {
        injector.inject_torrent(&source_torrent_path, &new_torrent_filepath, new_tracker)?;
    }

    Ok(new_torrent_filepath)
}

/// Build the `infohash -> filepath` cache for a set of metafiles, skipping
/// anything that cannot be decoded or lacks an `info` dictionary.
fn collect_infohashes_from_files(files: &[PathBuf]) -> InfohashCache {
    files
        .iter()
        .filter_map(|filename| {
            let torrent_data = bencode::load_file(filename)?;
            let infohash = calculate_infohash(&torrent_data).ok()?;
            Some((infohash, filename.clone()))
        })
        .collect()
}
