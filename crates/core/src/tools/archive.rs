//! Archive extraction with atomic publish.
//!
//! Archives are unpacked into a hidden staging sibling of the destination and
//! renamed into place only when every entry was written. A failed extraction
//! leaves no destination directory behind.

use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tar::Archive;
use xz2::read::XzDecoder;

use crate::{Error, Result};

/// Archive formats used by toolchain distributions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    /// `.tar.gz` / `.tgz`
    TarGz,
    /// `.tar.xz` / `.txz`
    TarXz,
    /// `.zip`
    Zip,
}

impl ArchiveKind {
    /// Detect the format from a file name.
    #[must_use]
    pub fn detect(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().to_lowercase();
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if name.ends_with(".tar.xz") || name.ends_with(".txz") {
            Some(Self::TarXz)
        } else if name.ends_with(".zip") {
            Some(Self::Zip)
        } else {
            None
        }
    }
}

/// Unpack `archive` so that its contents appear at `dest` atomically.
///
/// An existing `dest` is replaced.
///
/// # Errors
///
/// Returns [`Error::ToolExtraction`] for unknown formats or corrupt archives
/// and [`Error::CacheUnwritable`] if the staging directory cannot be created.
pub fn extract_atomic(archive: &Path, dest: &Path) -> Result<()> {
    let kind = ArchiveKind::detect(archive)
        .ok_or_else(|| Error::tool_extraction(archive, "unsupported archive format"))?;

    let staging = staging_dir(dest);
    if staging.exists() {
        std::fs::remove_dir_all(&staging).map_err(|e| Error::cache_unwritable(&staging, e))?;
    }
    std::fs::create_dir_all(&staging).map_err(|e| Error::cache_unwritable(&staging, e))?;

    let extracted = match kind {
        ArchiveKind::TarGz => open(archive).and_then(|f| unpack_tar(GzDecoder::new(f), &staging)),
        ArchiveKind::TarXz => open(archive).and_then(|f| unpack_tar(XzDecoder::new(f), &staging)),
        ArchiveKind::Zip => unpack_zip(archive, &staging),
    };

    if let Err(message) = extracted {
        let _ = std::fs::remove_dir_all(&staging);
        return Err(Error::tool_extraction(archive, message));
    }

    if dest.exists() {
        std::fs::remove_dir_all(dest).map_err(|e| Error::io(e, dest, "remove stale install"))?;
    }
    std::fs::rename(&staging, dest).map_err(|e| Error::io(e, dest, "publish install"))?;
    tracing::debug!(archive = %archive.display(), dest = %dest.display(), "Archive extracted");
    Ok(())
}

fn staging_dir(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map_or_else(|| "extract".into(), |n| n.to_string_lossy().into_owned());
    dest.with_file_name(format!(".{name}.tmp"))
}

fn open(archive: &Path) -> std::result::Result<BufReader<File>, String> {
    File::open(archive)
        .map(BufReader::new)
        .map_err(|e| format!("cannot open archive: {e}"))
}

fn unpack_tar<R: Read>(reader: R, into: &Path) -> std::result::Result<(), String> {
    let mut archive = Archive::new(reader);
    archive.set_overwrite(true);
    archive
        .unpack(into)
        .map_err(|e| format!("failed to unpack tar: {e}"))
}

fn unpack_zip(archive: &Path, into: &Path) -> std::result::Result<(), String> {
    let file = open(archive)?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| format!("failed to open zip: {e}"))?;

    for i in 0..zip.len() {
        let mut entry = zip
            .by_index(i)
            .map_err(|e| format!("failed to read zip entry: {e}"))?;

        let Some(relative) = entry.enclosed_name() else {
            continue;
        };
        let out = into.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&out).map_err(|e| e.to_string())?;
            continue;
        }

        if let Some(parent) = out.parent() {
            std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }
        let mut file = File::create(&out).map_err(|e| e.to_string())?;
        std::io::copy(&mut entry, &mut file)
            .map_err(|e| format!("failed to extract {}: {e}", out.display()))?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&out, std::fs::Permissions::from_mode(mode))
                .map_err(|e| e.to_string())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_tar_gz(path: &Path, files: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (name, contents) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o755);
            header.set_cksum();
            builder.append_data(&mut header, name, *contents).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    fn write_zip(path: &Path, files: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default().unix_permissions(0o755);
        for (name, contents) in files {
            zip.start_file(*name, options).unwrap();
            zip.write_all(contents).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_detect() {
        assert_eq!(ArchiveKind::detect(Path::new("a.tar.gz")), Some(ArchiveKind::TarGz));
        assert_eq!(ArchiveKind::detect(Path::new("a.TGZ")), Some(ArchiveKind::TarGz));
        assert_eq!(ArchiveKind::detect(Path::new("f.tar.xz")), Some(ArchiveKind::TarXz));
        assert_eq!(ArchiveKind::detect(Path::new("g-bin.zip")), Some(ArchiveKind::Zip));
        assert_eq!(ArchiveKind::detect(Path::new("tool.exe")), None);
    }

    #[test]
    fn test_extract_tar_gz() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("apache-maven-3.9.6-bin.tar.gz");
        write_tar_gz(
            &archive,
            &[("apache-maven-3.9.6/bin/mvn", b"#!/bin/sh\necho mvn\n")],
        );

        let dest = temp.path().join("maven").join("maven-3.9.6");
        std::fs::create_dir_all(dest.parent().unwrap()).unwrap();
        extract_atomic(&archive, &dest).unwrap();

        let mvn = dest.join("apache-maven-3.9.6/bin/mvn");
        assert_eq!(std::fs::read_to_string(mvn).unwrap(), "#!/bin/sh\necho mvn\n");
        assert!(!staging_dir(&dest).exists());
    }

    #[test]
    fn test_extract_zip_keeps_modes() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("gradle-7.6-bin.zip");
        write_zip(&archive, &[("gradle-7.6/bin/gradle", b"#!/bin/sh\n")]);

        let dest = temp.path().join("gradle-7.6");
        extract_atomic(&archive, &dest).unwrap();

        let gradle = dest.join("gradle-7.6/bin/gradle");
        assert!(gradle.exists());
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&gradle).unwrap().permissions().mode();
            assert_eq!(mode & 0o111, 0o111);
        }
    }

    #[test]
    fn test_corrupt_archive_leaves_no_destination() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("broken.tar.gz");
        std::fs::write(&archive, b"definitely not gzip").unwrap();

        let dest = temp.path().join("tool-1.0");
        let err = extract_atomic(&archive, &dest).unwrap_err();

        assert!(matches!(err, Error::ToolExtraction { .. }), "got {err:?}");
        assert!(!dest.exists());
        assert!(!staging_dir(&dest).exists());
    }

    #[test]
    fn test_unknown_format_rejected() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("tool.rar");
        std::fs::write(&archive, b"rar").unwrap();
        assert!(matches!(
            extract_atomic(&archive, &temp.path().join("out")),
            Err(Error::ToolExtraction { .. })
        ));
    }
}
