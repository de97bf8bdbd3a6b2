use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};

use crate::app::{ProgressEvent, ProgressSink};
use crate::archive::ArchiveClient;
use crate::domain::StagedLink;
use crate::error::AlmaError;

/// Creates `dir` and its parents. An existing directory is fine.
pub fn ensure_cache_dir(dir: &Utf8Path) -> Result<(), AlmaError> {
    match fs::create_dir_all(dir.as_std_path()) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists && dir.is_dir() => Ok(()),
        Err(err) => Err(AlmaError::Filesystem(format!("create {dir}: {err}"))),
    }
}

pub fn retrieve<A: ArchiveClient + ?Sized>(
    archive: &A,
    links: &[StagedLink],
    cache_dir: &Utf8Path,
    sink: &dyn ProgressSink,
) -> Result<Vec<Utf8PathBuf>, AlmaError> {
    ensure_cache_dir(cache_dir)?;
    sink.event(ProgressEvent {
        message: format!("phase=Download; {} files into {cache_dir}", links.len()),
        elapsed: None,
    });
    let start = std::time::Instant::now();
    let files = archive.download_files(links, cache_dir)?;
    sink.event(ProgressEvent {
        message: format!("download.done files={}", files.len()),
        elapsed: Some(start.elapsed()),
    });
    Ok(files)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn cache_dir_is_created_recursively_and_reused() {
        let temp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::from_path_buf(temp.path().join("a").join("b")).unwrap();
        ensure_cache_dir(&dir).unwrap();
        ensure_cache_dir(&dir).unwrap();
        assert!(dir.is_dir());
    }

    #[test]
    fn cache_dir_over_file_fails() {
        let temp = tempfile::tempdir().unwrap();
        let file = temp.path().join("occupied");
        std::fs::write(&file, b"x").unwrap();
        let dir = Utf8PathBuf::from_path_buf(file).unwrap();
        assert_matches!(ensure_cache_dir(&dir).unwrap_err(), AlmaError::Filesystem(_));
    }
}
