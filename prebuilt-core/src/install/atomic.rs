use crate::{Result, error};
use snafu::ResultExt;
use std::{
    fs::File,
    path::{Path, PathBuf},
};

/// Copy `src` to `dest` so that `dest` is never missing or partially written.
///
/// The file is first written to a temporary file in the destination directory and made
/// executable.  An existing `dest` is then moved aside to `.<name>.old`, replacing any earlier
/// backup, and the temporary file is renamed into place.  If that rename fails the backup is moved
/// back.  The temporary file is removed on every failure path.
///
/// This does blocking I/O.
pub(crate) fn install(src: &Path, dest: &Path) -> Result<()> {
    let (dir, file_name) = match (dest.parent(), dest.file_name()) {
        (Some(dir), Some(file_name)) => (dir, file_name),
        _ => {
            return Err(error::Error::Io {
                path: dest.to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "install destination has no file name",
                ),
            });
        }
    };

    std::fs::create_dir_all(dir).with_context(|_| error::IoSnafu { path: dir })?;

    let mut temp = tempfile::Builder::new()
        .prefix(".prebuilt-")
        .tempfile_in(dir)
        .with_context(|_| error::IoSnafu { path: dir })?;

    let mut source = File::open(src).with_context(|_| error::IoSnafu { path: src })?;
    std::io::copy(&mut source, temp.as_file_mut())
        .with_context(|_| error::IoSnafu { path: temp.path() })?;
    temp.as_file()
        .sync_all()
        .with_context(|_| error::IoSnafu { path: temp.path() })?;

    set_executable(temp.path())?;

    let backup = dir.join(format!(".{}.old", file_name.to_string_lossy()));
    let backed_up = backup_existing(dest, &backup)?;

    if let Err(e) = temp.persist(dest) {
        let temp_path = e.file.path().to_path_buf();

        if let Some(backup) = &backed_up {
            if let Err(restore) = std::fs::rename(backup, dest) {
                tracing::warn!(
                    backup = %backup.display(),
                    dest = %dest.display(),
                    error = %restore,
                    "Failed to restore previous binary"
                );
            }
        }

        return Err(error::Error::RenameFile {
            src: temp_path,
            dst: dest.to_path_buf(),
            source: e.error,
        });
    }

    tracing::debug!(
        dest = %dest.display(),
        backup = ?backed_up,
        "Installed binary"
    );

    Ok(())
}

/// Move an existing `dest` to `backup`.  Returns the backup path if there was anything to move.
fn backup_existing(dest: &Path, backup: &Path) -> Result<Option<PathBuf>> {
    if std::fs::symlink_metadata(dest).is_err() {
        return Ok(None);
    }

    if std::fs::symlink_metadata(backup).is_ok() {
        std::fs::remove_file(backup).with_context(|_| error::IoSnafu { path: backup })?;
    }

    std::fs::rename(dest, backup).with_context(|_| error::RenameFileSnafu {
        src: dest,
        dst: backup,
    })?;

    Ok(Some(backup.to_path_buf()))
}

#[cfg(unix)]
fn set_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .with_context(|_| error::IoSnafu { path })
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> Result<()> {
    Ok(())
}
