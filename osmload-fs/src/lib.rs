//! Filesystem helpers for locating OSM inputs and database outputs.
//!
//! Paths are UTF-8 (`camino`) and every access goes through a `cap-std`
//! directory handle opened with ambient authority, so callers never touch
//! `std::fs` directly.
#![forbid(unsafe_code)]

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8};
use std::io;
use std::path::Component;

/// An opened input file together with its length in bytes.
#[derive(Debug)]
pub struct InputFile {
    /// Handle positioned at the start of the file.
    pub file: fs_utf8::File,
    /// Length reported by the filesystem when the file was opened.
    pub len: u64,
}

/// Open `path` for reading and record its length.
///
/// # Errors
/// Returns the underlying I/O error when the file cannot be opened or its
/// metadata cannot be read.
pub fn open_input(path: &Utf8Path) -> io::Result<InputFile> {
    let file = fs_utf8::File::open_ambient(path, ambient_authority())?;
    let len = file.metadata()?.len();
    Ok(InputFile { file, len })
}

/// Whether the existing entry at `path` is a regular file.
///
/// # Errors
/// Returns an error of kind [`io::ErrorKind::NotFound`] when `path` or its
/// parent directory does not exist, and any other error raised while reading
/// the metadata.
pub fn file_is_file(path: &Utf8Path) -> io::Result<bool> {
    let (dir, name) = open_parent_dir(path)?;
    Ok(dir.metadata(name.as_str())?.is_file())
}

/// Create the directory that will hold `path`, if it is missing.
///
/// # Errors
/// Returns an error when a directory along the way cannot be created.
pub fn ensure_parent_dir(path: &Utf8Path) -> io::Result<()> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_str().is_empty() || parent == Utf8Path::new("/") {
        return Ok(());
    }
    let (base_dir, relative) = split_base(parent)?;
    if relative.as_str().is_empty() {
        return Ok(());
    }
    base_dir.create_dir_all(&relative)
}

fn open_parent_dir(path: &Utf8Path) -> io::Result<(fs_utf8::Dir, String)> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    let name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?
        .to_owned();
    let dir = fs_utf8::Dir::open_ambient_dir(parent, ambient_authority())?;
    Ok((dir, name))
}

/// Split `parent` into an ambient root (`/`, a Windows prefix or `.`) and the
/// relative remainder that cap-std can resolve beneath it.
fn split_base(parent: &Utf8Path) -> io::Result<(fs_utf8::Dir, Utf8PathBuf)> {
    let std_parent = parent.as_std_path();
    let root = match std_parent.components().next() {
        Some(Component::Prefix(prefix)) => {
            let prefix = prefix
                .as_os_str()
                .to_str()
                .ok_or_else(|| io::Error::other("non-UTF-8 path prefix"))?;
            Some(Utf8PathBuf::from(prefix).join(std::path::MAIN_SEPARATOR_STR))
        }
        Some(Component::RootDir) => Some(Utf8PathBuf::from(std::path::MAIN_SEPARATOR_STR)),
        _ => None,
    };
    let (base, relative) = match root {
        Some(base) => {
            let relative = parent
                .strip_prefix(&base)
                .map_err(|_| io::Error::other("failed to strip root from absolute path"))?
                .to_path_buf();
            (base, relative)
        }
        None => (Utf8PathBuf::from("."), parent.to_path_buf()),
    };
    let dir = fs_utf8::Dir::open_ambient_dir(&base, ambient_authority())?;
    Ok((dir, relative))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use std::io::Read;
    use tempfile::TempDir;

    #[fixture]
    fn scratch() -> TempDir {
        TempDir::new().expect("create scratch dir")
    }

    fn utf8(dir: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("UTF-8 temp path")
    }

    #[rstest]
    fn open_input_reports_length(scratch: TempDir) {
        let path = utf8(&scratch).join("tiny.osm");
        std::fs::write(&path, b"<osm/>").expect("write fixture");
        let mut input = open_input(&path).expect("open fixture");
        assert_eq!(input.len, 6);
        let mut text = String::new();
        input.file.read_to_string(&mut text).expect("read fixture");
        assert_eq!(text, "<osm/>");
    }

    #[rstest]
    fn file_is_file_distinguishes_files_and_directories(scratch: TempDir) {
        let root = utf8(&scratch);
        let file = root.join("present.osm");
        std::fs::write(&file, b"").expect("write fixture");
        assert!(file_is_file(&file).expect("inspect file"));
        std::fs::create_dir(root.join("nested")).expect("create dir");
        assert!(!file_is_file(&root.join("nested")).expect("inspect dir"));
    }

    #[rstest]
    #[case("absent.osm")]
    #[case("missing/absent.osm")]
    fn file_is_file_reports_missing_paths(scratch: TempDir, #[case] relative: &str) {
        let err = file_is_file(&utf8(&scratch).join(relative)).expect_err("path is missing");
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[rstest]
    fn ensure_parent_dir_creates_nested_directories(scratch: TempDir) {
        let target = utf8(&scratch).join("a/b/map.sqlite");
        ensure_parent_dir(&target).expect("create parents");
        assert!(utf8(&scratch).join("a/b").is_dir());
        ensure_parent_dir(&target).expect("second call is a no-op");
    }

    #[rstest]
    fn ensure_parent_dir_accepts_bare_file_names() {
        ensure_parent_dir(Utf8Path::new("map.sqlite")).expect("no parent to create");
    }
}
