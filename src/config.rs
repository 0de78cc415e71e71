//! Configuration loading.
//!
//! Settings come from three layers, later ones winning:
//!
//! 1. an optional TOML file (`--config`, default `./stickies-notion.toml`),
//! 2. environment variables (`NOTION_TOKEN`, `NOTION_DB_ID`, `TZ`), with a
//!    `.env` file loaded by `main` beforehand,
//! 3. command-line overrides ([`Overrides`]).
//!
//! The result is a single immutable [`Config`] passed by reference to every
//! component.
//!
//! ```toml
//! [notion]
//! database_id = "0123456789abcdef0123456789abcdef"
//! max_retries = 3
//!
//! [import]
//! timezone = "America/Los_Angeles"
//!
//! [sources]
//! rtf_dir = "/Users/me/Library/Containers/com.apple.Stickies/Data/Library/Stickies"
//!
//! [converter]
//! engine = "auto"   # auto | pandoc | plain
//! ```

use anyhow::{bail, Context, Result};
use chrono_tz::Tz;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_TIMEZONE: &str = "America/New_York";

/// Fully resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub notion: NotionConfig,
    pub timezone: Tz,
    pub title_max_chars: usize,
    pub sources: SourcesConfig,
    pub converter: ConverterConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotionConfig {
    /// Integration token. Usually supplied via `NOTION_TOKEN`.
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub database_id: Option<String>,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_notion_version")]
    pub notion_version: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// First backoff delay; doubled on every further attempt.
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
}

impl Default for NotionConfig {
    fn default() -> Self {
        Self {
            token: None,
            database_id: None,
            api_base: default_api_base(),
            notion_version: default_notion_version(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            retry_base_ms: default_retry_base_ms(),
        }
    }
}

impl NotionConfig {
    /// Token and database id, or an error naming what is missing.
    pub fn credentials(&self) -> Result<(&str, &str)> {
        let token = self
            .token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| anyhow::anyhow!("NOTION_TOKEN is not set (see .env.example)"))?;
        let database_id = self
            .database_id
            .as_deref()
            .filter(|d| !d.is_empty())
            .ok_or_else(|| anyhow::anyhow!("NOTION_DB_ID is not set (see .env.example)"))?;
        Ok((token, database_id))
    }
}

fn default_api_base() -> String {
    "https://api.notion.com/v1".to_string()
}
fn default_notion_version() -> String {
    "2022-06-28".to_string()
}
fn default_max_retries() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_retry_base_ms() -> u64 {
    1000
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SourcesConfig {
    /// Legacy single-file database.
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    /// Directory of `.rtfd` bundles.
    #[serde(default)]
    pub rtf_dir: Option<PathBuf>,
    /// Saved-state descriptor; defaults to `<rtf_dir>/.SavedStickiesState`.
    #[serde(default)]
    pub state_path: Option<PathBuf>,
}

/// Which rich-text engine to use.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConverterEngine {
    /// Pandoc if it answers `--version`, plain text otherwise.
    Auto,
    Pandoc,
    Plain,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConverterConfig {
    #[serde(default = "default_engine")]
    pub engine: ConverterEngine,
    #[serde(default = "default_pandoc_path")]
    pub pandoc_path: PathBuf,
    #[serde(default = "default_converter_timeout")]
    pub timeout_secs: u64,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            engine: default_engine(),
            pandoc_path: default_pandoc_path(),
            timeout_secs: default_converter_timeout(),
        }
    }
}

fn default_engine() -> ConverterEngine {
    ConverterEngine::Auto
}
fn default_pandoc_path() -> PathBuf {
    PathBuf::from("pandoc")
}
fn default_converter_timeout() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
struct ImportSection {
    #[serde(default)]
    timezone: Option<String>,
    #[serde(default = "default_title_max_chars")]
    title_max_chars: usize,
}

impl Default for ImportSection {
    fn default() -> Self {
        Self {
            timezone: None,
            title_max_chars: default_title_max_chars(),
        }
    }
}

fn default_title_max_chars() -> usize {
    200
}

/// On-disk shape of the TOML file.
#[derive(Debug, Deserialize, Clone, Default)]
struct ConfigFile {
    #[serde(default)]
    notion: NotionConfig,
    #[serde(default)]
    import: ImportSection,
    #[serde(default)]
    sources: SourcesConfig,
    #[serde(default)]
    converter: ConverterConfig,
}

/// Command-line values that take precedence over file and environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub timezone: Option<String>,
    pub db_path: Option<PathBuf>,
    pub rtf_dir: Option<PathBuf>,
    pub state_path: Option<PathBuf>,
}

impl Config {
    /// Defaults only: no file, no environment.
    pub fn minimal() -> Self {
        Self {
            notion: NotionConfig::default(),
            timezone: DEFAULT_TIMEZONE.parse().unwrap_or(Tz::UTC),
            title_max_chars: default_title_max_chars(),
            sources: SourcesConfig::default(),
            converter: ConverterConfig::default(),
        }
    }
}

/// Load configuration from `path` (if it exists), the process environment,
/// and `overrides`.
pub fn load_config(path: &Path, overrides: &Overrides) -> Result<Config> {
    load_config_with_env(path, overrides, |key| std::env::var(key).ok())
}

/// Same as [`load_config`] with an injectable environment lookup.
pub fn load_config_with_env<F>(path: &Path, overrides: &Overrides, env: F) -> Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let file: ConfigFile = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content).with_context(|| "Failed to parse config file")?
    } else {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        ConfigFile::default()
    };

    let mut notion = file.notion;
    if let Some(token) = env("NOTION_TOKEN").filter(|v| !v.is_empty()) {
        notion.token = Some(token);
    }
    if let Some(db) = env("NOTION_DB_ID").filter(|v| !v.is_empty()) {
        notion.database_id = Some(db);
    }

    let timezone = resolve_timezone(
        overrides.timezone.as_deref(),
        env("TZ").as_deref(),
        file.import.timezone.as_deref(),
    )?;

    let mut sources = file.sources;
    if overrides.db_path.is_some() {
        sources.db_path = overrides.db_path.clone();
    }
    if overrides.rtf_dir.is_some() {
        sources.rtf_dir = overrides.rtf_dir.clone();
    }
    if overrides.state_path.is_some() {
        sources.state_path = overrides.state_path.clone();
    }

    if file.import.title_max_chars == 0 {
        bail!("import.title_max_chars must be > 0");
    }
    if notion.timeout_secs == 0 {
        bail!("notion.timeout_secs must be > 0");
    }
    if file.converter.timeout_secs == 0 {
        bail!("converter.timeout_secs must be > 0");
    }

    Ok(Config {
        notion,
        timezone,
        title_max_chars: file.import.title_max_chars,
        sources,
        converter: file.converter,
    })
}

/// CLI beats environment beats file. An unusable `TZ` from the environment
/// is ignored (it is often a path like `:/etc/localtime`); explicit values
/// must parse.
fn resolve_timezone(cli: Option<&str>, env: Option<&str>, file: Option<&str>) -> Result<Tz> {
    if let Some(name) = cli {
        return parse_tz(name).with_context(|| "invalid --tz");
    }
    if let Some(name) = env.filter(|v| !v.is_empty()) {
        match parse_tz(name) {
            Ok(tz) => return Ok(tz),
            Err(e) => tracing::warn!("ignoring TZ from environment: {}", e),
        }
    }
    if let Some(name) = file {
        return parse_tz(name).with_context(|| "invalid import.timezone");
    }
    parse_tz(DEFAULT_TIMEZONE)
}

fn parse_tz(name: &str) -> Result<Tz> {
    name.parse::<Tz>()
        .map_err(|e| anyhow::anyhow!("unknown IANA timezone '{}': {}", name, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn missing_file_uses_defaults() {
        let cfg = load_config_with_env(
            Path::new("/nonexistent/stickies-notion.toml"),
            &Overrides::default(),
            env_of(&[]),
        )
        .unwrap();
        assert_eq!(cfg.timezone, chrono_tz::America::New_York);
        assert_eq!(cfg.title_max_chars, 200);
        assert_eq!(cfg.notion.api_base, "https://api.notion.com/v1");
        assert_eq!(cfg.converter.engine, ConverterEngine::Auto);
        assert!(cfg.notion.credentials().is_err());
    }

    #[test]
    fn env_overrides_file_and_cli_overrides_env() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("cfg.toml");
        std::fs::write(
            &path,
            r#"
[notion]
token = "file-token"
database_id = "file-db"
max_retries = 1

[import]
timezone = "Europe/Berlin"

[converter]
engine = "plain"
"#,
        )
        .unwrap();

        let cfg = load_config_with_env(
            &path,
            &Overrides::default(),
            env_of(&[("NOTION_TOKEN", "env-token"), ("TZ", "Asia/Tokyo")]),
        )
        .unwrap();
        assert_eq!(cfg.notion.credentials().unwrap(), ("env-token", "file-db"));
        assert_eq!(cfg.notion.max_retries, 1);
        assert_eq!(cfg.timezone, chrono_tz::Asia::Tokyo);
        assert_eq!(cfg.converter.engine, ConverterEngine::Plain);

        let overrides = Overrides {
            timezone: Some("UTC".into()),
            rtf_dir: Some(PathBuf::from("/tmp/stickies")),
            ..Default::default()
        };
        let cfg = load_config_with_env(&path, &overrides, env_of(&[("TZ", "Asia/Tokyo")])).unwrap();
        assert_eq!(cfg.timezone, Tz::UTC);
        assert_eq!(cfg.sources.rtf_dir, Some(PathBuf::from("/tmp/stickies")));
    }

    #[test]
    fn bad_env_tz_is_ignored_but_bad_cli_tz_fails() {
        let cfg = load_config_with_env(
            Path::new("/nonexistent.toml"),
            &Overrides::default(),
            env_of(&[("TZ", ":/etc/localtime")]),
        )
        .unwrap();
        assert_eq!(cfg.timezone, chrono_tz::America::New_York);

        let overrides = Overrides {
            timezone: Some("Mars/Olympus".into()),
            ..Default::default()
        };
        assert!(load_config_with_env(Path::new("/nonexistent.toml"), &overrides, env_of(&[])).is_err());
    }

    #[test]
    fn rejects_zero_title_length() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("cfg.toml");
        std::fs::write(&path, "[import]\ntitle_max_chars = 0\n").unwrap();
        let err = load_config_with_env(&path, &Overrides::default(), env_of(&[])).unwrap_err();
        assert!(err.to_string().contains("title_max_chars"));
    }

    #[test]
    fn rejects_unknown_engine() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("cfg.toml");
        std::fs::write(&path, "[converter]\nengine = \"word\"\n").unwrap();
        assert!(load_config_with_env(&path, &Overrides::default(), env_of(&[])).is_err());
    }

    #[test]
    fn example_config_parses() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/stickies-notion.example.toml");
        let cfg = load_config_with_env(&path, &Overrides::default(), env_of(&[])).unwrap();
        assert_eq!(cfg.notion.max_retries, 3);
        assert_eq!(cfg.converter.engine, ConverterEngine::Auto);
        assert_eq!(cfg.timezone, chrono_tz::America::New_York);
    }
}
