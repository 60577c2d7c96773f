use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name of the main configuration inside the config dir.
pub const CONFIG_FILE: &str = "config.json";

/// Environment variable that overrides the config directory.
pub(crate) const CONFIG_DIR_ENV: &str = "ATLASMAP_HOST_CONFIG_DIR";

/// Get the config directory using platform-appropriate location.
///
/// - macOS: `~/Library/Application Support/atlasmap-host/`
/// - Linux: `~/.config/atlasmap-host/` (or `$XDG_CONFIG_HOME`)
/// - Windows: `%APPDATA%/atlasmap-host/`
///
/// `ATLASMAP_HOST_CONFIG_DIR` wins over the platform location. Falls back to
/// `~/.atlasmap-host/` if no platform dir is available.
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV)
        && !dir.trim().is_empty()
    {
        return PathBuf::from(dir);
    }
    dirs::config_dir()
        .map(|d| d.join("atlasmap-host"))
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".atlasmap-host")
        })
}

/// Read `dir/filename` as JSON. A missing, unreadable or malformed file yields
/// `T::default()`; only the last two are worth a log line.
pub(crate) fn load_json_config_in<T: DeserializeOwned + Default>(dir: &Path, filename: &str) -> T {
    let path = dir.join(filename);
    let raw = match std::fs::read(&path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return T::default(),
        Err(e) => {
            tracing::warn!(path = %path.display(), "unreadable config, using defaults: {e}");
            return T::default();
        }
    };
    serde_json::from_slice(&raw).unwrap_or_else(|e| {
        tracing::error!(path = %path.display(), "malformed config, using defaults: {e}");
        T::default()
    })
}

/// Write `config` as pretty JSON to `dir/filename`, creating `dir` if needed.
pub(crate) fn save_json_config_in<T: Serialize>(
    dir: &Path,
    filename: &str,
    config: &T,
) -> Result<(), String> {
    let json = serde_json::to_vec_pretty(config)
        .map_err(|e| format!("Failed to serialize config: {e}"))?;
    std::fs::create_dir_all(dir)
        .map_err(|e| format!("Failed to create config directory {}: {e}", dir.display()))?;
    replace_file(&dir.join(filename), &json)
}

/// Replace `target` with `bytes` so readers see either the old or the new file.
/// The file is owner-only on Unix.
fn replace_file(target: &Path, bytes: &[u8]) -> Result<(), String> {
    let mut staged = target.as_os_str().to_owned();
    staged.push(format!(".{}.partial", std::process::id()));
    let staged = PathBuf::from(staged);

    let result = write_owner_only(&staged, bytes)
        .and_then(|()| std::fs::rename(&staged, target))
        .map_err(|e| format!("Failed to write config {}: {e}", target.display()));
    if result.is_err() {
        let _ = std::fs::remove_file(&staged);
    }
    result
}

fn write_owner_only(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    std::fs::write(path, bytes)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// AppConfig
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Origin of the worker's HTTP UI (scheme + host + port)
    #[serde(default = "default_origin")]
    pub origin: String,
    /// Java launcher used to run the worker archive
    #[serde(default = "default_java_bin")]
    pub java_bin: String,
    /// Worker archive, relative to the extension directory unless absolute
    #[serde(default = "default_worker_archive")]
    pub worker_archive: PathBuf,
    #[serde(default = "default_panel_title")]
    pub panel_title: String,
    /// Name of the output channel receiving the worker's stdout
    #[serde(default = "default_output_channel_name")]
    pub output_channel_name: String,
}

fn default_origin() -> String {
    "http://127.0.0.1:8585".to_string()
}

fn default_java_bin() -> String {
    "java".to_string()
}

fn default_worker_archive() -> PathBuf {
    PathBuf::from("jars").join("atlasmap-standalone.jar")
}

fn default_panel_title() -> String {
    "AtlasMap".to_string()
}

fn default_output_channel_name() -> String {
    "Atlasmap server".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            origin: default_origin(),
            java_bin: default_java_bin(),
            worker_archive: default_worker_archive(),
            panel_title: default_panel_title(),
            output_channel_name: default_output_channel_name(),
        }
    }
}

impl AppConfig {
    /// Parse and validate the configured origin. Only http and https are accepted.
    pub fn origin_url(&self) -> Result<url::Url, String> {
        parse_origin(&self.origin)
    }

    /// Absolute path of the worker archive for an extension installed at `extension_path`.
    pub fn worker_archive_path(&self, extension_path: &Path) -> PathBuf {
        if self.worker_archive.is_absolute() {
            self.worker_archive.clone()
        } else {
            extension_path.join(&self.worker_archive)
        }
    }
}

/// Parse an origin string, rejecting anything that is not http(s) with a host.
pub fn parse_origin(origin: &str) -> Result<url::Url, String> {
    let parsed = url::Url::parse(origin.trim()).map_err(|e| format!("Invalid origin URL: {e}"))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(format!(
                "Scheme \"{scheme}\" is not allowed for the origin; use http or https"
            ));
        }
    }

    if parsed.host_str().is_none() {
        return Err("Origin URL has no host".to_string());
    }

    Ok(parsed)
}

pub fn load_app_config() -> AppConfig {
    load_json_config_in(&config_dir(), CONFIG_FILE)
}

pub fn save_app_config(config: &AppConfig) -> Result<(), String> {
    save_json_config_in(&config_dir(), CONFIG_FILE, config)
}
