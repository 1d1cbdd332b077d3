//! Configuration loader and path helpers.
//!
//! Uses Figment to merge defaults + `config.toml` + `config.<env>.toml` +
//! `APP_*` env vars (`__` separates nested keys, e.g. `APP_CHUNKING__OVERLAP`).
//! `expand_path` handles `~` and `${VAR}` in user-supplied paths.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

use crate::chunker::ChunkingConfig;
use crate::error::{Error, Result};

pub const DEFAULT_COLLECTION: &str = "docs";
pub const DEFAULT_MODEL: &str = "paraphrase-multilingual-mpnet-base-v2";

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        Self::load_for_env(&env_name)
    }

    pub fn load_for_env(env_name: &str) -> anyhow::Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file("config.toml"));
        match env_name {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            other => tracing::warn!(env = other, "unknown RUST_ENV, using config.toml only"),
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.settings()?.validate()?;
        Ok(config)
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    pub fn settings(&self) -> anyhow::Result<Settings> {
        self.figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to read settings: {}", e))
    }
}

/// Typed view of the whole configuration tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub store: StoreSettings,
    pub chunking: ChunkingConfig,
    pub embed: EmbedSettings,
    pub retrieval: RetrievalSettings,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;
        if self.store.collection.trim().is_empty() {
            return Err(Error::InvalidConfiguration("store.collection must not be empty".into()));
        }
        if self.embed.batch_size == 0 {
            return Err(Error::InvalidConfiguration("embed.batch_size must be at least 1".into()));
        }
        if self.embed.hash_dim == 0 {
            return Err(Error::InvalidConfiguration("embed.hash_dim must be at least 1".into()));
        }
        if self.retrieval.top_k == 0 {
            return Err(Error::InvalidConfiguration("retrieval.top_k must be at least 1".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Directory holding the LanceDB tables.
    pub path: String,
    pub collection: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self { path: "data/vectordb".to_string(), collection: DEFAULT_COLLECTION.to_string() }
    }
}

impl StoreSettings {
    pub fn resolved_path(&self) -> PathBuf {
        expand_path(&self.path)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedSettings {
    /// `local` (sentence encoder) or `hash` (deterministic fake vectors).
    pub provider: String,
    pub model: String,
    pub model_dir: Option<String>,
    pub batch_size: usize,
    /// Token limit per input for the local model.
    pub max_len: usize,
    /// Dimensionality of the hash embedder.
    pub hash_dim: usize,
}

impl Default for EmbedSettings {
    fn default() -> Self {
        Self {
            provider: "local".to_string(),
            model: DEFAULT_MODEL.to_string(),
            model_dir: None,
            batch_size: 32,
            max_len: 256,
            hash_dim: 768,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub top_k: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self { top_k: 5 }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}
