//! Config file discovery, loading, and environment variable overlay.

use crate::{ConfigError, MidiprocConfig};
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files in standard locations.
///
/// Returns paths in load order (system, user, local).
/// Only returns files that exist.
pub fn discover_config_files() -> Vec<PathBuf> {
    discover_config_files_with_override(None)
}

/// Discover config files, optionally with a CLI override path.
///
/// If `cli_path` is provided and exists, it replaces the local override.
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/midiproc/config.toml");
    if system.exists() {
        files.push(system);
    }

    // User config (XDG_CONFIG_HOME or ~/.config)
    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("midiproc/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("midiproc.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Read one file as a raw table, checking it against the config schema.
pub fn load_table(path: &Path) -> Result<toml::Table, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_table(&contents, path)
}

fn parse_table(contents: &str, path: &Path) -> Result<toml::Table, ConfigError> {
    let table: toml::Table = contents.parse().map_err(|e: toml::de::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    // Catch type errors here, while we still know which file they came from
    toml::Value::Table(table.clone())
        .try_into::<MidiprocConfig>()
        .map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    Ok(table)
}

/// Merge `overlay` into `base`, key by key; nested tables merge recursively.
pub fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Apply environment variable overrides to config.
pub fn apply_env_overrides(config: &mut MidiprocConfig, sources: &mut ConfigSources) {
    apply_overrides(config, sources, |key| env::var(key).ok());
}

/// Apply overrides from any key lookup; unparseable values are ignored.
pub fn apply_overrides<F>(config: &mut MidiprocConfig, sources: &mut ConfigSources, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let mut set = |key: &str, apply: &mut dyn FnMut(String) -> bool| {
        if let Some(v) = lookup(key) {
            if apply(v) {
                sources.env_overrides.push(key.to_string());
            }
        }
    };

    set("MIDIPROC_CAPACITY", &mut |v: String| parse_into(&v, &mut config.bridge.capacity));
    set("MIDIPROC_HANDOFF_CAPACITY", &mut |v: String| {
        parse_into(&v, &mut config.bridge.handoff_capacity)
    });
    set("MIDIPROC_PASS_THROUGH", &mut |v: String| match parse_bool(&v) {
        Some(b) => {
            config.bridge.pass_through = b;
            true
        }
        None => false,
    });
    set("MIDIPROC_OUTBOUND", &mut |v: String| {
        config.transport.outbound = v;
        true
    });
    set("MIDIPROC_INBOUND", &mut |v: String| {
        config.transport.inbound = v;
        true
    });
    set("MIDIPROC_SAMPLE_RATE", &mut |v: String| {
        parse_into(&v, &mut config.driver.sample_rate)
    });
    set("MIDIPROC_PERIOD_FRAMES", &mut |v: String| {
        parse_into(&v, &mut config.driver.period_frames)
    });
    set("MIDIPROC_LOG_LEVEL", &mut |v: String| {
        config.telemetry.log_level = v;
        true
    });
    // Also support RUST_LOG
    set("RUST_LOG", &mut |v: String| {
        config.telemetry.log_level = v;
        true
    });
}

fn parse_into<T: std::str::FromStr>(value: &str, target: &mut T) -> bool {
    match value.trim().parse() {
        Ok(v) => {
            *target = v;
            true
        }
        Err(_) => false,
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Expand ~ and environment variables in a path.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            return home.join(stripped);
        }
    } else if let Some(stripped) = path.strip_prefix('$') {
        // Handle $VAR/rest/of/path
        let (var_name, rest) = match stripped.find('/') {
            Some(pos) => (&stripped[..pos], Some(&stripped[pos + 1..])),
            None => (stripped, None),
        };
        if let Ok(var_value) = env::var(var_name) {
            let base = PathBuf::from(var_value);
            return match rest {
                Some(rest) => base.join(rest),
                None => base,
            };
        }
    }
    PathBuf::from(path)
}
