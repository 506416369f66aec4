// Owner-only file helpers for credential files and audit logs.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

const OWNER_FILE_MODE: u32 = 0o600;
const OWNER_DIR_MODE: u32 = 0o700;

pub fn ensure_owner_only_file(path: &Path) -> Result<()> {
    restrict_mode(path, OWNER_FILE_MODE)
}

pub fn ensure_owner_only_dir(path: &Path) -> Result<()> {
    restrict_mode(path, OWNER_DIR_MODE)
}

/// Create `path` and any missing parents, then restrict the leaf to 0700.
pub fn create_private_dir_all(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .with_context(|| format!("failed to create directory `{}`", path.display()))?;
    ensure_owner_only_dir(path)
}

fn restrict_mode(path: &Path, wanted: u32) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        if !path.exists() {
            return Ok(());
        }

        let metadata = fs::metadata(path)
            .with_context(|| format!("failed to read metadata for `{}`", path.display()))?;
        let mode = metadata.permissions().mode() & 0o777;
        if mode != wanted {
            fs::set_permissions(path, fs::Permissions::from_mode(wanted))
                .with_context(|| format!("failed to set owner-only mode on `{}`", path.display()))?;
        }
    }

    #[cfg(not(unix))]
    {
        let _ = (path, wanted);
    }

    Ok(())
}

pub fn open_private_append(path: &Path) -> std::io::Result<std::fs::File> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;

        OpenOptions::new().create(true).append(true).mode(OWNER_FILE_MODE).open(path)
    }
    #[cfg(not(unix))]
    {
        OpenOptions::new().create(true).append(true).open(path)
    }
}

pub fn open_private_truncate(path: &Path) -> std::io::Result<std::fs::File> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;

        OpenOptions::new().create(true).write(true).truncate(true).mode(OWNER_FILE_MODE).open(path)
    }
    #[cfg(not(unix))]
    {
        OpenOptions::new().create(true).write(true).truncate(true).open(path)
    }
}

/// Move an existing file aside to `<name>.bak`, replacing any older backup.
///
/// Returns the backup path, or `None` when there was nothing to rotate.
pub fn rotate_to_backup(path: &Path) -> Result<Option<PathBuf>> {
    if !path.exists() {
        return Ok(None);
    }

    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".bak");
    let backup = path.with_file_name(name);

    if backup.exists() {
        fs::remove_file(&backup)
            .with_context(|| format!("failed to remove old backup `{}`", backup.display()))?;
    }
    fs::rename(path, &backup).with_context(|| {
        format!("failed to rotate `{}` to `{}`", path.display(), backup.display())
    })?;
    ensure_owner_only_file(&backup)?;
    Ok(Some(backup))
}
