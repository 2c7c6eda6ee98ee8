//! Path resolution for mincfg
//!
//! # Environment Variables
//!
//! - `MINCFG_CONFIG_DIR` - Override config directory
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `MINCFG_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/mincfg` (if set)
//! 3. Platform default:
//!    - Windows: `%APPDATA%\mincfg`
//!    - macOS/Linux: `~/.config/mincfg`

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "MINCFG_CONFIG_DIR";

/// Host-wide property overrides, merged after the runbook defaults
pub const PROPERTIES_FILE: &str = "properties.json";

/// Get the mincfg config directory path
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = expand(&dir);
        log::debug!(
            "Using config dir from {}: {}",
            ENV_CONFIG_DIR,
            path.display()
        );
        return Ok(path);
    }

    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg_config).join("mincfg");
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    #[cfg(windows)]
    {
        if let Some(app_data) = dirs::config_dir() {
            let path = app_data.join("mincfg");
            log::debug!("Using Windows config dir: {}", path.display());
            return Ok(path);
        }
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".config").join("mincfg");
    log::debug!("Using default config dir: {}", path.display());
    Ok(path)
}

/// `<config dir>/properties.json`, which may not exist
pub fn default_properties_file() -> Result<PathBuf> {
    Ok(config_dir()?.join(PROPERTIES_FILE))
}

/// Expand ~ and environment variables in a path string.
///
/// Unknown variables leave the input unchanged.
///
/// ```
/// use mincfg::paths;
///
/// let home_path = paths::expand("~/srv");
/// let var_path = paths::expand("$HOME/srv");
/// ```
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

/// Resolve `path` against `base` unless it is already absolute
pub fn resolve(base: &Path, path: &str) -> PathBuf {
    let expanded = expand(path);
    if expanded.is_absolute() {
        expanded
    } else {
        base.join(expanded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    /// Run `f` with `key` set, restoring the previous value afterwards
    fn with_env_var<F, R>(key: &str, value: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let original = env::var(key).ok();
        // SAFETY: Tests run in isolation and don't read env vars concurrently
        unsafe { env::set_var(key, value) };
        let result = f();
        match original {
            // SAFETY: Tests run in isolation
            Some(v) => unsafe { env::set_var(key, v) },
            None => unsafe { env::remove_var(key) },
        }
        result
    }

    fn without_env_var<F, R>(key: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let original = env::var(key).ok();
        // SAFETY: Tests run in isolation and don't read env vars concurrently
        unsafe { env::remove_var(key) };
        let result = f();
        if let Some(v) = original {
            // SAFETY: Tests run in isolation
            unsafe { env::set_var(key, v) };
        }
        result
    }

    #[test]
    fn test_config_dir_env_override() {
        with_env_var(ENV_CONFIG_DIR, "/custom/mincfg", || {
            assert_eq!(config_dir().unwrap(), PathBuf::from("/custom/mincfg"));
            assert_eq!(
                default_properties_file().unwrap(),
                PathBuf::from("/custom/mincfg/properties.json")
            );
        });
    }

    #[test]
    fn test_config_dir_env_override_with_tilde() {
        let home = dirs::home_dir().unwrap();
        with_env_var(ENV_CONFIG_DIR, "~/hosts/mincfg-tilde-test", || {
            assert_eq!(
                config_dir().unwrap(),
                home.join("hosts").join("mincfg-tilde-test")
            );
        });
    }

    #[test]
    fn test_xdg_config_home() {
        without_env_var(ENV_CONFIG_DIR, || {
            with_env_var("XDG_CONFIG_HOME", "/tmp/xdg-mincfg-test", || {
                assert_eq!(
                    config_dir().unwrap(),
                    PathBuf::from("/tmp/xdg-mincfg-test/mincfg")
                );
            });
        });
    }

    #[test]
    fn test_expand() {
        let home = dirs::home_dir().unwrap();
        assert_eq!(expand("~/srv/app"), home.join("srv").join("app"));
        assert_eq!(expand("/absolute/path"), PathBuf::from("/absolute/path"));
        assert_eq!(
            expand("/path/$MINCFG_NO_SUCH_VAR_12345/file"),
            PathBuf::from("/path/$MINCFG_NO_SUCH_VAR_12345/file")
        );
        with_env_var("MINCFG_TEST_VAR", "value", || {
            assert_eq!(
                expand("/path/$MINCFG_TEST_VAR/file"),
                PathBuf::from("/path/value/file")
            );
        });
    }

    #[test]
    fn test_resolve() {
        let base = Path::new("/srv/runbooks");
        assert_eq!(
            resolve(base, "templates/nginx.conf"),
            PathBuf::from("/srv/runbooks/templates/nginx.conf")
        );
        assert_eq!(resolve(base, "/etc/motd"), PathBuf::from("/etc/motd"));
    }
}
