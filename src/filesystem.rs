//! Filesystem helpers shared by the scanner and the injection staging step.

use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Create a directory (and parents) unless it already exists, returning the
/// path for chaining.
pub fn mkdir_p<P: AsRef<Path>>(path: P) -> crate::Result<PathBuf> {
    let path = path.as_ref();
    if !path.exists() {
        fs::create_dir_all(path)?;
    }

    Ok(path.to_path_buf())
}

/// Fail with a NotFound IO error unless the path exists.
pub fn assert_path_exists<P: AsRef<Path>>(path: P) -> crate::Result<PathBuf> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(crate::Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("File or directory not found: {}", path.display()),
        )));
    }

    Ok(path.to_path_buf())
}

/// Recursively list files under `directory` whose name ends with
/// `extension`, in directory enumeration order.
pub fn list_files_of_extension(directory: &Path, extension: &str) -> Vec<PathBuf> {
    WalkDir::new(directory)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.file_name().to_string_lossy().ends_with(extension))
        .map(|entry| entry.into_path())
        .collect()
}

/// Swap a path's extension, keeping the rest of the path intact.
pub fn replace_extension(path: &Path, new_extension: &str) -> PathBuf {
    path.with_extension(new_extension.trim_start_matches('.'))
}

/// Mirror `src` at `dest` using hardlinks: a single file becomes one link, a
/// directory becomes a fresh directory skeleton whose file leaves are links
/// to the originals.
pub fn link_tree(src: &Path, dest: &Path) -> crate::Result<()> {
    if src.is_file() {
        fs::hard_link(src, dest)?;
        return Ok(());
    }

    fs::create_dir_all(dest)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let target = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            link_tree(&entry.path(), &target)?;
        } else {
            fs::hard_link(entry.path(), &target)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::MetadataExt;

    #[test]
    fn test_mkdir_p_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b");

        mkdir_p(&nested).unwrap();
        mkdir_p(&nested).unwrap();
        assert!(nested.is_dir());
    }

    #[test]
    fn test_assert_path_exists() {
        let dir = tempfile::tempdir().unwrap();
        assert!(assert_path_exists(dir.path()).is_ok());
        assert!(assert_path_exists(dir.path().join("missing")).is_err());
    }

    #[test]
    fn test_list_files_of_extension_recurses() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("a.torrent"), b"x").unwrap();
        fs::write(dir.path().join("sub/b.torrent"), b"x").unwrap();
        fs::write(dir.path().join("ignore.txt"), b"x").unwrap();

        let found = list_files_of_extension(dir.path(), ".torrent");
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|p| p.extension().unwrap() == "torrent"));
    }

    #[test]
    fn test_replace_extension() {
        assert_eq!(
            replace_extension(Path::new("/tmp/foo.torrent"), ".fastresume"),
            PathBuf::from("/tmp/foo.fastresume")
        );
    }

    #[test]
    fn test_link_tree_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("data.bin");
        let dest = dir.path().join("linked.bin");
        fs::write(&src, b"payload").unwrap();

        link_tree(&src, &dest).unwrap();

        assert_eq!(fs::read(&dest).unwrap(), b"payload");
        assert_eq!(fs::metadata(&src).unwrap().ino(), fs::metadata(&dest).unwrap().ino());
        assert!(fs::metadata(&dest).unwrap().nlink() >= 2);
    }

    #[test]
    fn test_link_tree_directory() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("album");
        fs::create_dir_all(src.join("cd1")).unwrap();
        fs::write(src.join("cd1/track.flac"), b"flac").unwrap();
        fs::write(src.join("cover.jpg"), b"jpg").unwrap();

        let dest = dir.path().join("staged");
        link_tree(&src, &dest).unwrap();

        for relative in ["cd1/track.flac", "cover.jpg"] {
            let original = fs::metadata(src.join(relative)).unwrap();
            let linked = fs::metadata(dest.join(relative)).unwrap();
            assert_eq!(original.ino(), linked.ino());
            assert!(linked.nlink() >= 2);
        }
    }
}
