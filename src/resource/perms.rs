//! Permission bits and ownership reconciliation shared by file providers

use anyhow::{Context, Result};
use std::path::Path;

/// Set the permission bits of `path` to `mode` if they differ.
///
/// Returns whether the bits changed.
#[cfg(unix)]
pub fn ensure_mode(path: &Path, mode: u32) -> Result<bool> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = std::fs::metadata(path)
        .with_context(|| format!("Failed to stat {}", path.display()))?;
    let current = metadata.permissions().mode() & 0o7777;
    if current == mode {
        return Ok(false);
    }

    log::debug!("{}: mode {current:o} -> {mode:o}", path.display());
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .with_context(|| format!("Failed to set permissions on {}", path.display()))?;
    Ok(true)
}

#[cfg(not(unix))]
pub fn ensure_mode(_path: &Path, _mode: u32) -> Result<bool> {
    Err(crate::Error::Unsupported {
        operation: "chmod",
        platform: std::env::consts::OS,
    }
    .into())
}

/// Numeric owner resolved from optional user and group names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Owner {
    pub uid: u32,
    pub gid: u32,
}

/// Resolve names to ids.
///
/// A missing user means the current process user; a missing group means
/// the resolved user's primary group.
#[cfg(unix)]
pub fn resolve_owner(user: Option<&str>, group: Option<&str>) -> Result<Owner> {
    use nix::unistd::{Group, User, geteuid};

    let account = match user {
        Some(name) => User::from_name(name)
            .with_context(|| format!("Failed to look up user: {name}"))?
            .ok_or_else(|| crate::Error::UnknownUser(name.to_string()))?,
        None => {
            let uid = geteuid();
            User::from_uid(uid)
                .context("Failed to look up current user")?
                .ok_or_else(|| crate::Error::UnknownUser(uid.to_string()))?
        }
    };

    let gid = match group {
        Some(name) => {
            Group::from_name(name)
                .with_context(|| format!("Failed to look up group: {name}"))?
                .ok_or_else(|| crate::Error::UnknownGroup(name.to_string()))?
                .gid
        }
        None => account.gid,
    };

    Ok(Owner {
        uid: account.uid.as_raw(),
        gid: gid.as_raw(),
    })
}

/// Chown `path` when owner or group is requested and differs.
///
/// Nothing happens when neither is set. Returns whether ownership changed.
#[cfg(unix)]
pub fn ensure_owner(path: &Path, user: Option<&str>, group: Option<&str>) -> Result<bool> {
    use std::os::unix::fs::{MetadataExt, chown};

    if user.is_none() && group.is_none() {
        return Ok(false);
    }

    let wanted = resolve_owner(user, group)?;
    let metadata = std::fs::metadata(path)
        .with_context(|| format!("Failed to stat {}", path.display()))?;
    let current = Owner {
        uid: metadata.uid(),
        gid: metadata.gid(),
    };
    if current == wanted {
        return Ok(false);
    }

    log::debug!(
        "{}: owner {}:{} -> {}:{}",
        path.display(),
        current.uid,
        current.gid,
        wanted.uid,
        wanted.gid
    );
    chown(path, Some(wanted.uid), Some(wanted.gid))
        .with_context(|| format!("Failed to set ownership on {}", path.display()))?;
    Ok(true)
}

#[cfg(not(unix))]
pub fn ensure_owner(_path: &Path, user: Option<&str>, group: Option<&str>) -> Result<bool> {
    if user.is_none() && group.is_none() {
        return Ok(false);
    }
    Err(crate::Error::Unsupported {
        operation: "chown",
        platform: std::env::consts::OS,
    }
    .into())
}

/// Parse an octal mode string such as `0755` or `755`
pub fn parse_mode(mode: &str) -> Result<u32> {
    let digits = mode.trim().trim_start_matches("0o");
    let value = u32::from_str_radix(digits, 8)
        .with_context(|| format!("Invalid mode string: {mode}"))?;
    anyhow::ensure!(value <= 0o7777, "Invalid mode string: {mode}");
    Ok(value)
}
