//! Application configuration for vocabsync.
//!
//! User config lives at `~/.vocabsync/vocabsync.toml`.
//! `--config <path>` overrides the location; a missing file means defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, VocabError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "vocabsync.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".vocabsync";

// ---------------------------------------------------------------------------
// Config structs (matching vocabsync.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Data directory layout.
    #[serde(default)]
    pub data: DataConfig,

    /// Log level and optional log file.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Triple store endpoint.
    #[serde(default)]
    pub store: StoreConfig,

    /// Vocabulary download settings.
    #[serde(default)]
    pub download: DownloadConfig,

    /// Batch behaviour.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// SKOS repair backend.
    #[serde(default)]
    pub skosify: SkosifyConfig,

    /// Job ledger location.
    #[serde(default)]
    pub ledger: LedgerConfig,
}

/// `[data]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Base data path; every other path is resolved under it.
    #[serde(default = "default_base")]
    pub base: String,

    /// Archive of ingested vocabularies.
    #[serde(default = "default_vocabulary")]
    pub vocabulary: String,

    /// Per-job temporary slots.
    #[serde(default = "default_temporary")]
    pub temporary: String,

    /// Logs and reports.
    #[serde(default = "default_output")]
    pub output: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            base: default_base(),
            vocabulary: default_vocabulary(),
            temporary: default_temporary(),
            output: default_output(),
        }
    }
}

impl DataConfig {
    pub fn base_dir(&self) -> PathBuf {
        expand_home(&self.base)
    }

    pub fn vocabulary_dir(&self) -> PathBuf {
        self.base_dir().join(&self.vocabulary)
    }

    pub fn temporary_dir(&self) -> PathBuf {
        self.base_dir().join(&self.temporary)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.base_dir().join(&self.output)
    }
}

fn default_base() -> String {
    "~/vocabsync".into()
}
fn default_vocabulary() -> String {
    "vocabularies".into()
}
fn default_temporary() -> String {
    "tmp".into()
}
fn default_output() -> String {
    "output".into()
}

/// `[logging]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Level used when neither `RUST_LOG` nor `-v` say otherwise.
    #[serde(default = "default_level")]
    pub level: String,

    /// Log file name under `data.output`; stderr when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            file: None,
        }
    }
}

fn default_level() -> String {
    "info".into()
}

/// HTTP verb used to upload a graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UploadMethod {
    #[default]
    Put,
    Post,
}

/// `[store]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Dataset endpoint, e.g. `http://localhost:3030/skosmos`.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default)]
    pub upload_method: UploadMethod,

    /// Per-request timeout.
    #[serde(default = "default_store_timeout")]
    pub timeout_secs: u64,

    /// Public SPARQL endpoint written into catalog entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sparql_endpoint: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            upload_method: UploadMethod::Put,
            timeout_secs: default_store_timeout(),
            sparql_endpoint: None,
        }
    }
}

impl StoreConfig {
    /// SPARQL endpoint for catalog entries, defaulting to `<endpoint>/sparql`.
    pub fn sparql_endpoint(&self) -> String {
        self.sparql_endpoint
            .clone()
            .unwrap_or_else(|| format!("{}/sparql", self.endpoint.trim_end_matches('/')))
    }
}

fn default_endpoint() -> String {
    "http://localhost:3030/skosmos".into()
}
fn default_store_timeout() -> u64 {
    300
}

/// `[download]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    #[serde(default = "default_download_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_download_timeout(),
            max_redirects: default_max_redirects(),
        }
    }
}

fn default_download_timeout() -> u64 {
    600
}
fn default_max_redirects() -> usize {
    10
}

/// When the ledger is written back during a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PersistMode {
    #[default]
    PerJob,
    EndOfRun,
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Language tag forced onto untagged labels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_language: Option<String>,

    /// Number of jobs processed concurrently.
    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default)]
    pub persist: PersistMode,

    /// Keep temporary slots after each job for inspection.
    #[serde(default)]
    pub keep_temporary: bool,

    /// Merge `owl:imports` targets into the vocabulary before repair.
    #[serde(default)]
    pub follow_imports: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_language: None,
            workers: default_workers(),
            persist: PersistMode::PerJob,
            keep_temporary: false,
            follow_imports: false,
        }
    }
}

fn default_workers() -> usize {
    1
}

/// Which implementation performs SKOS repair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkosifyBackend {
    #[default]
    Native,
    Command,
}

/// `[skosify]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkosifyConfig {
    #[serde(default)]
    pub backend: SkosifyBackend,

    /// Executable used by the `command` backend.
    #[serde(default = "default_skosify_command")]
    pub command: String,

    /// Extra arguments passed to the executable.
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl Default for SkosifyConfig {
    fn default() -> Self {
        Self {
            backend: SkosifyBackend::Native,
            command: default_skosify_command(),
            extra_args: Vec::new(),
        }
    }
}

fn default_skosify_command() -> String {
    "skosify".into()
}

/// `[ledger]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Local database file under `data.base`.
    #[serde(default = "default_ledger_database")]
    pub database: String,

    /// Remote libSQL database URL; takes precedence over `database`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// File holding the auth token for `url`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<String>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            database: default_ledger_database(),
            url: None,
            credentials: None,
        }
    }
}

fn default_ledger_database() -> String {
    "ledger.db".into()
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.vocabsync/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| VocabError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.vocabsync/vocabsync.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| VocabError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| VocabError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| VocabError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content = toml::to_string_pretty(&config).map_err(|e| VocabError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| VocabError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Reject configurations the pipeline cannot run with.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    url::Url::parse(&config.store.endpoint).map_err(|e| {
        VocabError::config(format!(
            "store.endpoint '{}' is not a URL: {e}",
            config.store.endpoint
        ))
    })?;

    if config.pipeline.workers == 0 {
        return Err(VocabError::config("pipeline.workers must be at least 1"));
    }

    if let Some(lang) = &config.pipeline.default_language {
        if lang.trim().is_empty() {
            return Err(VocabError::config(
                "pipeline.default_language must not be empty when set",
            ));
        }
    }

    if config.ledger.url.is_some() && config.ledger.credentials.is_none() {
        return Err(VocabError::config(
            "ledger.url requires ledger.credentials (a file holding the auth token)",
        ));
    }

    Ok(())
}

/// Expand a leading `~/` to the user's home directory.
fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("endpoint"));
        assert!(toml_str.contains("http://localhost:3030/skosmos"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.pipeline.workers, 1);
        assert_eq!(parsed.store.upload_method, UploadMethod::Put);
        assert_eq!(parsed.skosify.backend, SkosifyBackend::Native);
    }

    #[test]
    fn config_with_sections() {
        let toml_str = r#"
[data]
base = "/srv/skosmos"
temporary = "scratch"

[store]
endpoint = "http://fuseki:3030/skosmos"
upload_method = "post"

[pipeline]
default_language = "en"
workers = 4
persist = "end-of-run"
follow_imports = true
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.data.temporary_dir(), PathBuf::from("/srv/skosmos/scratch"));
        assert_eq!(config.data.vocabulary_dir(), PathBuf::from("/srv/skosmos/vocabularies"));
        assert_eq!(config.store.upload_method, UploadMethod::Post);
        assert_eq!(config.pipeline.persist, PersistMode::EndOfRun);
        assert_eq!(config.pipeline.default_language.as_deref(), Some("en"));
        assert!(config.pipeline.follow_imports);
        assert!(!AppConfig::default().pipeline.follow_imports);
        assert_eq!(
            config.store.sparql_endpoint(),
            "http://fuseki:3030/skosmos/sparql"
        );
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut config = AppConfig::default();
        assert!(validate_config(&config).is_ok());

        config.pipeline.workers = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("workers"));

        let mut config = AppConfig::default();
        config.store.endpoint = "not a url".into();
        assert!(validate_config(&config).is_err());

        let mut config = AppConfig::default();
        config.ledger.url = Some("libsql://ledger.example.turso.io".into());
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("credentials"));
    }

    #[test]
    fn tilde_expands_to_home() {
        let data = DataConfig::default();
        assert!(!data.base_dir().to_string_lossy().starts_with('~'));
    }
}
