mod common;

use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use httpmock::prelude::*;
use tempfile::TempDir;

use common::*;
use fertilizer::Tracker;
use fertilizer::clients::{TorrentClient, TorrentInfo};
use fertilizer::injection::Injection;
use fertilizer::metainfo::calculate_infohash;
use fertilizer::scanner::scan_torrent_directory;

#[derive(Debug, Clone)]
struct InjectCall {
    source_infohash: String,
    new_torrent_filepath: PathBuf,
    save_path_override: Option<PathBuf>,
}

struct StubClient {
    info: TorrentInfo,
    calls: Arc<Mutex<Vec<InjectCall>>>,
}

impl StubClient {
    fn new(content_path: &Path) -> (Self, Arc<Mutex<Vec<InjectCall>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let client = Self {
            info: TorrentInfo {
                complete: true,
                label: None,
                save_path: content_path.parent().unwrap().to_path_buf(),
                content_path: content_path.to_path_buf(),
            },
            calls: calls.clone(),
        };
        (client, calls)
    }
}

impl TorrentClient for StubClient {
    fn setup(&self) -> fertilizer::Result<()> {
        Ok(())
    }

    fn get_torrent_info(&self, _infohash: &str) -> fertilizer::Result<TorrentInfo> {
        Ok(self.info.clone())
    }

    fn inject_torrent(
        &self,
        source_infohash: &str,
        new_torrent_filepath: &Path,
        save_path_override: Option<&Path>,
    ) -> fertilizer::Result<String> {
        self.calls.lock().unwrap().push(InjectCall {
            source_infohash: source_infohash.to_string(),
            new_torrent_filepath: new_torrent_filepath.to_path_buf(),
            save_path_override: save_path_override.map(Path::to_path_buf),
        });
        Ok(source_infohash.to_lowercase())
    }
}

#[test]
fn test_scan_stages_hardlinks_and_injects_once() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("input");
    let output = tmp.path().join("output");
    let link_root = tmp.path().join("injection");
    fs::create_dir_all(&input).unwrap();
    fs::create_dir_all(&link_root).unwrap();

    // on-disk torrent data: a directory with one file
    let data_dir = tmp.path().join("data").join("Big Buck Bunny");
    fs::create_dir_all(&data_dir).unwrap();
    fs::write(data_dir.join("foo.txt"), b"big buck bytes").unwrap();

    let source = make_torrent(
        Some("https://flacsfor.me/123abc/announce"),
        Some(b"RED"),
        "Big Buck Bunny",
    );
    write_torrent(&input.join("red_source.torrent"), &source);

    let red_server = MockServer::start();
    let ops_server = MockServer::start();
    ops_server.mock(|when, then| {
        when.method(GET).path("/ajax.php").query_param("action", "torrent");
        then.status(200).body(SUCCESS_RESPONSE);
    });
    ops_server.mock(|when, then| {
        when.method(GET).path("/ajax.php").query_param("action", "index");
        then.status(200).body(ANNOUNCE_SUCCESS_RESPONSE);
    });

    let (stub, calls) = StubClient::new(&data_dir);
    let injector = Injection::new(Box::new(stub), &link_root);

    let report = scan_torrent_directory(
        &input,
        &output,
        &mock_red_api(&red_server),
        &mock_ops_api(&ops_server),
        Some(&injector),
    )
    .unwrap();

    assert!(report.contains("Generated for cross-seeding: 1"));

    // the staged copy shares inodes with the original data
    let staged_file = link_root.join("OPS").join("Big Buck Bunny").join("foo.txt");
    assert!(staged_file.is_file());
    let staged_meta = fs::metadata(&staged_file).unwrap();
    let original_meta = fs::metadata(data_dir.join("foo.txt")).unwrap();
    assert_eq!(staged_meta.ino(), original_meta.ino());
    assert!(staged_meta.nlink() >= 2);

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].source_infohash, calculate_infohash(&source).unwrap());
    assert_eq!(
        calls[0].new_torrent_filepath,
        output.join("OPS").join("foo [OPS].torrent")
    );
    assert_eq!(calls[0].save_path_override, Some(link_root.join("OPS")));
}

#[test]
fn test_single_file_content_is_hardlinked_directly() {
    let tmp = TempDir::new().unwrap();
    let link_root = tmp.path().join("injection");
    fs::create_dir_all(&link_root).unwrap();

    let data_file = tmp.path().join("data").join("track.flac");
    fs::create_dir_all(data_file.parent().unwrap()).unwrap();
    fs::write(&data_file, b"flac bytes").unwrap();

    let source = make_torrent(
        Some("https://flacsfor.me/123abc/announce"),
        Some(b"RED"),
        "track.flac",
    );
    let source_path = tmp.path().join("track.torrent");
    write_torrent(&source_path, &source);
    let new_path = tmp.path().join("track [OPS].torrent");
    write_torrent(&new_path, &source);

    let (stub, _calls) = StubClient::new(&data_file);
    let injector = Injection::new(Box::new(stub), &link_root);

    injector
        .inject_torrent(&source_path, &new_path, Tracker::Ops)
        .unwrap();

    let staged = link_root.join("OPS").join("track.flac");
    assert_eq!(
        fs::metadata(&staged).unwrap().ino(),
        fs::metadata(&data_file).unwrap().ino()
    );

    // a second attempt at the same destination refuses to relink
    let error = injector
        .inject_torrent(&source_path, &new_path, Tracker::Ops)
        .unwrap_err();
    assert!(matches!(error, fertilizer::Error::TorrentInjection(_)));
    assert!(error.to_string().contains("already been linked"));
}

#[test]
fn test_missing_content_path_fails_before_linking() {
    let tmp = TempDir::new().unwrap();
    let link_root = tmp.path().join("injection");
    fs::create_dir_all(&link_root).unwrap();

    let source = make_torrent(
        Some("https://flacsfor.me/123abc/announce"),
        Some(b"RED"),
        "gone",
    );
    let source_path = tmp.path().join("gone.torrent");
    write_torrent(&source_path, &source);

    let (stub, calls) = StubClient::new(&tmp.path().join("data").join("gone"));
    let injector = Injection::new(Box::new(stub), &link_root);

    let error = injector
        .inject_torrent(&source_path, &source_path, Tracker::Ops)
        .unwrap_err();

    assert!(matches!(error, fertilizer::Error::TorrentInjection(_)));
    assert!(error.to_string().contains("Could not determine the location"));
    assert!(calls.lock().unwrap().is_empty());
}

#[test]
fn test_from_config_requires_injection_to_be_enabled() {
    let config = fertilizer::config::Config::default();
    let error = Injection::from_config(&config).unwrap_err();
    assert!(error.to_string().contains("disabled"));
}
