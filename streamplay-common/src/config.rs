//! Configuration file resolution and TOML loading
//!
//! Config file resolution follows a fixed priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. Platform config directory (`<config_dir>/streamplay/config.toml`)
//! 4. None: caller falls back to compiled defaults

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Application directory name under the platform config dir
pub const APP_DIR_NAME: &str = "streamplay";

/// Config file name inside the application directory
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Resolve which config file (if any) should be loaded.
///
/// Explicit paths (CLI or env) are returned even if they do not exist so the
/// caller can report them; the platform default is returned only if present.
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: platform config dir
    let default_path = default_config_path()?;
    if default_path.exists() {
        Some(default_path)
    } else {
        debug!("No config file at {}", default_path.display());
        None
    }
}

/// Get default configuration file path for the platform
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Parse a TOML file into `T`
pub fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;

    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Invalid config file {}: {}", path.display(), e)))
}

/// Load `T` from the resolved config file, or `T::default()` when none exists.
///
/// A missing file is not an error; an unreadable or malformed one is.
pub fn load_or_default<T: DeserializeOwned + Default>(
    cli_arg: Option<&Path>,
    env_var_name: &str,
) -> Result<T> {
    match resolve_config_path(cli_arg, env_var_name) {
        Some(path) => {
            if !path.exists() {
                warn!("Config file {} not found, using defaults", path.display());
                return Ok(T::default());
            }
            debug!("Loading config from {}", path.display());
            load_toml(&path)
        }
        None => Ok(T::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Write;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    #[serde(default)]
    struct Sample {
        name: String,
        size: u32,
    }

    #[test]
    fn test_cli_arg_wins() {
        let path = PathBuf::from("/tmp/streamplay-explicit.toml");
        let resolved = resolve_config_path(Some(&path), "STREAMPLAY_TEST_UNUSED_VAR");
        assert_eq!(resolved, Some(path));
    }

    #[test]
    fn test_load_toml_parses_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "name = \"tts\"\nsize = 7").unwrap();

        let sample: Sample = load_toml(file.path()).unwrap();
        assert_eq!(
            sample,
            Sample {
                name: "tts".to_string(),
                size: 7
            }
        );
    }

    #[test]
    fn test_load_toml_rejects_garbage() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "size = \"not a number\"").unwrap();

        let result: Result<Sample> = load_toml(file.path());
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_missing_explicit_file_falls_back_to_default() {
        let path = PathBuf::from("/nonexistent/streamplay/config.toml");
        let sample: Sample = load_or_default(Some(&path), "STREAMPLAY_TEST_UNUSED_VAR").unwrap();
        assert_eq!(sample, Sample::default());
    }
}
