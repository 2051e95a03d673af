//! Key/value sources that configuration is read from.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

/// A source of named string settings
pub trait ConfigSource {
    /// Raw value for `key`, if the source defines it
    fn get(&self, key: &str) -> Option<String>;
}

impl ConfigSource for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }
}

impl<S: ConfigSource + ?Sized> ConfigSource for &S {
    fn get(&self, key: &str) -> Option<String> {
        (**self).get(key)
    }
}

/// Reads settings from the process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSource;

impl ConfigSource for EnvSource {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Settings from a flat TOML file, e.g.
///
/// ```toml
/// EMAIL_HOSTNAME = "smtp.example.org"
/// EMAIL_PORT = 587
/// BADGE_REPORTS = true
/// ```
///
/// Integers and booleans are accepted and converted to their string form.
#[derive(Debug, Clone, Default)]
pub struct FileSource {
    values: HashMap<String, String>,
}

impl FileSource {
    pub fn load(path: &Path) -> Result<Self> {
        info!("Loading configuration from {}", path.display());
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let table: toml::Table = content.parse()?;
        let mut values = HashMap::with_capacity(table.len());
        for (key, value) in table {
            let value = match value {
                toml::Value::String(s) => s,
                toml::Value::Integer(i) => i.to_string(),
                toml::Value::Boolean(b) => b.to_string(),
                toml::Value::Array(items) => items
                    .into_iter()
                    .map(|item| match item {
                        toml::Value::String(s) => Ok(s),
                        other => anyhow::bail!("{} must contain only strings, got {}", key, other),
                    })
                    .collect::<Result<Vec<_>>>()?
                    .join(","),
                other => anyhow::bail!("unsupported value for {}: {}", key, other),
            };
            values.insert(key, value);
        }
        Ok(Self { values })
    }
}

impl ConfigSource for FileSource {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// Stack of sources where earlier layers take precedence
#[derive(Default)]
pub struct Layered {
    layers: Vec<Box<dyn ConfigSource + Send + Sync>>,
}

impl Layered {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a lower-precedence layer
    pub fn with(mut self, source: impl ConfigSource + Send + Sync + 'static) -> Self {
        self.layers.push(Box::new(source));
        self
    }
}

impl ConfigSource for Layered {
    fn get(&self, key: &str) -> Option<String> {
        self.layers.iter().find_map(|layer| layer.get(key))
    }
}
