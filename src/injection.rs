//! Hardlink staging and torrent-client injection.
//!
//! Before a generated metafile is handed to the client, the source
//! torrent's on-disk data is mirrored under
//! `<link_dir>/<tracker shortname>/` as hardlinks, so both trackers seed
//! the same bytes without a copy. Staged entries are never deleted here.

use std::path::{Path, PathBuf};

use crate::bencode;
use crate::clients::{Deluge, Qbittorrent, TorrentClient, TransmissionBt};
use crate::config::Config;
use crate::filesystem::{link_tree, mkdir_p};
use crate::metainfo::calculate_infohash;
use crate::trackers::Tracker;

pub struct Injection {
    linking_directory: PathBuf,
    client: Box<dyn TorrentClient>,
}

impl std::fmt::Debug for Injection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Injection")
            .field("linking_directory", &self.linking_directory)
            .finish_non_exhaustive()
    }
}

impl Injection {
    pub fn new(client: Box<dyn TorrentClient>, linking_directory: impl Into<PathBuf>) -> Self {
        Self {
            linking_directory: linking_directory.into(),
            client,
        }
    }

    /// Build an injector from validated configuration. The first configured
    /// client URL wins, in the order Deluge, Transmission, qBittorrent.
    pub fn from_config(config: &Config) -> crate::Result<Self> {
        if !config.inject_torrents {
            return Err(crate::Error::TorrentInjection(
                "Torrent injection is disabled in the config file.".to_string(),
            ));
        }

        let linking_directory = config.injection_link_directory.clone().ok_or_else(|| {
            crate::Error::TorrentInjection(
                "No injection link directory specified in the config file.".to_string(),
            )
        })?;

        let client: Box<dyn TorrentClient> = if let Some(url) = &config.deluge_rpc_url {
            Box::new(Deluge::new(url)?)
        } else if let Some(url) = &config.transmission_rpc_url {
            Box::new(TransmissionBt::new(url)?)
        } else if let Some(url) = &config.qbittorrent_url {
            Box::new(Qbittorrent::new(url)?)
        } else {
            return Err(crate::Error::TorrentInjection(
                "No torrent client configuration specified in the config file.".to_string(),
            ));
        };

        Ok(Self::new(client, linking_directory))
    }

    /// Authenticate with the configured client.
    pub fn setup(&self) -> crate::Result<()> {
        self.client.setup()
    }

    /// Stage the source torrent's data for `new_tracker` and register the
    /// new metafile with the client, pointing it at the staged copy.
    pub fn inject_torrent(
        &self,
        source_torrent_filepath: &Path,
        new_torrent_filepath: &Path,
        new_tracker: Tracker,
    ) -> crate::Result<String> {
        let source_torrent_data = bencode::load_file(source_torrent_filepath).ok_or_else(|| {
            crate::Error::TorrentDecoding("Error decoding torrent file".to_string())
        })?;
        let source_infohash = calculate_infohash(&source_torrent_data)?;

        let content_path = self.determine_source_data_location(&source_infohash)?;
        let output_location = self.determine_output_location(&content_path, new_tracker)?;
        link_files_to_output_location(&content_path, &output_location)?;

        let save_path_override = self.linking_directory.join(new_tracker.site_shortname());
        self.client.inject_torrent(
            &source_infohash,
            new_torrent_filepath,
            Some(&save_path_override),
        )
    }

    // The client's `name`/content path is only a suggestion; verify the
    // data actually exists before linking anything at it.
    fn determine_source_data_location(&self, source_infohash: &str) -> crate::Result<PathBuf> {
        let torrent_info = self.client.get_torrent_info(source_infohash)?;
        let content_path = torrent_info.content_path;

        if content_path.exists() {
            Ok(content_path)
        } else {
            Err(crate::Error::TorrentInjection(format!(
                "Could not determine the location of the torrent data: {}",
                content_path.display()
            )))
        }
    }

    fn determine_output_location(
        &self,
        content_path: &Path,
        new_tracker: Tracker,
    ) -> crate::Result<PathBuf> {
        let tracker_directory = self.linking_directory.join(new_tracker.site_shortname());
        mkdir_p(&tracker_directory)?;

        let basename = content_path.file_name().ok_or_else(|| {
            crate::Error::TorrentInjection(format!(
                "Could not determine the location of the torrent data: {}",
                content_path.display()
            ))
        })?;

        Ok(tracker_directory.join(basename))
    }
}

fn link_files_to_output_location(
    content_path: &Path,
    output_location: &Path,
) -> crate::Result<()> {
    if output_location.exists() {
        return Err(already_linked(output_location));
    }

    link_tree(content_path, output_location).map_err(|e| match e {
        // A concurrent stage of the same content loses the race here
        crate::Error::Io(io) if io.kind() == std::io::ErrorKind::AlreadyExists => {
            already_linked(output_location)
        }
        other => other,
    })
}

fn already_linked(output_location: &Path) -> crate::Error {
    crate::Error::TorrentInjection(format!(
        "Cannot link given torrent since it's already been linked: {}",
        output_location.display()
    ))
}
