use crate::{Result, error};
use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use snafu::ResultExt;
use std::{
    fs::File,
    io::Read,
    path::{Path, PathBuf},
};
use xz2::read::XzDecoder;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ArchiveFormat {
    Tar,
    TarGz,
    TarXz,
    TarZst,
    TarBz2,
    Zip,
}

impl ArchiveFormat {
    /// Suffixes recognized in downloaded file names, longest first so that `.tar.gz` wins over
    /// `.tar`.
    const SUFFIXES: &'static [(&'static str, Self)] = &[
        (".tar.gz", Self::TarGz),
        (".tar.xz", Self::TarXz),
        (".tar.zst", Self::TarZst),
        (".tar.bz2", Self::TarBz2),
        (".tgz", Self::TarGz),
        (".txz", Self::TarXz),
        (".tbz2", Self::TarBz2),
        (".tar", Self::Tar),
        (".zip", Self::Zip),
    ];

    /// Detect the format from the archive's file name.
    pub(crate) fn from_path(path: &Path) -> Option<Self> {
        let file_name = path.file_name()?.to_str()?.to_ascii_lowercase();

        Self::SUFFIXES
            .iter()
            .find(|(suffix, _)| file_name.ends_with(suffix))
            .map(|(_, format)| *format)
    }
}

/// Extract the single file `member` from the archive at `archive_path`.
///
/// The member is matched against the full in-archive path, ignoring a leading `./` on either
/// side, and written next to the archive under its file name.  Returns the path of the extracted
/// file.
///
/// This does blocking I/O and decompression.
pub(crate) fn extract_member(archive_path: &Path, member: &str) -> Result<PathBuf> {
    let format = ArchiveFormat::from_path(archive_path).ok_or_else(|| {
        error::Error::UnsupportedArchive {
            path: archive_path.to_path_buf(),
        }
    })?;

    let wanted = normalize(member);
    let dest = match (Path::new(wanted).file_name(), archive_path.parent()) {
        (Some(file_name), Some(dir)) => dir.join(file_name),
        _ => {
            return error::ArchiveMemberNotFoundSnafu {
                archive: archive_path,
                member,
            }
            .fail();
        }
    };

    tracing::debug!(
        archive = %archive_path.display(),
        ?format,
        member = wanted,
        "Extracting archive member"
    );

    let file = File::open(archive_path).with_context(|_| error::IoSnafu { path: archive_path })?;

    let found = match format {
        ArchiveFormat::Tar => extract_tar_member(file, wanted, &dest)?,
        ArchiveFormat::TarGz => extract_tar_member(GzDecoder::new(file), wanted, &dest)?,
        ArchiveFormat::TarXz => extract_tar_member(XzDecoder::new(file), wanted, &dest)?,
        ArchiveFormat::TarBz2 => extract_tar_member(BzDecoder::new(file), wanted, &dest)?,
        ArchiveFormat::TarZst => {
            let decoder = zstd::stream::read::Decoder::new(file).map_err(extraction_failed)?;
            extract_tar_member(decoder, wanted, &dest)?
        }
        ArchiveFormat::Zip => extract_zip_member(file, wanted, &dest)?,
    };

    if !found {
        return error::ArchiveMemberNotFoundSnafu {
            archive: archive_path,
            member,
        }
        .fail();
    }

    Ok(dest)
}

/// Returns `false` if no regular file in the archive matched `wanted`.
fn extract_tar_member<R: Read>(reader: R, wanted: &str, dest: &Path) -> Result<bool> {
    let mut archive = tar::Archive::new(reader);

    for entry in archive.entries().map_err(extraction_failed)? {
        let mut entry = entry.map_err(extraction_failed)?;
        if !entry.header().entry_type().is_file() {
            continue;
        }

        let matches = {
            let path = entry.path().map_err(extraction_failed)?;
            normalize(&path.to_string_lossy()) == wanted
        };
        if !matches {
            continue;
        }

        write_member(&mut entry, dest)?;
        return Ok(true);
    }

    Ok(false)
}

fn extract_zip_member(file: File, wanted: &str, dest: &Path) -> Result<bool> {
    let mut archive = zip::ZipArchive::new(file).map_err(extraction_failed)?;

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).map_err(extraction_failed)?;
        if entry.is_dir() || normalize(entry.name()) != wanted {
            continue;
        }

        write_member(&mut entry, dest)?;
        return Ok(true);
    }

    Ok(false)
}

fn write_member(reader: &mut impl Read, dest: &Path) -> Result<()> {
    let mut out = File::create(dest).with_context(|_| error::IoSnafu { path: dest })?;
    std::io::copy(reader, &mut out).map_err(extraction_failed)?;
    Ok(())
}

fn normalize(path: &str) -> &str {
    path.trim_start_matches("./")
}

fn extraction_failed(e: impl std::error::Error + Send + Sync + 'static) -> error::Error {
    error::Error::ArchiveExtractionFailed {
        source: Box::new(e),
    }
}
