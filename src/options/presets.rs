//! Named option bundles.
//!
//! A preset is a `/`-separated option list (`resize:fill:300:300/q:70`)
//! registered under a name. [`PresetTable`] is an immutable snapshot;
//! [`PresetRegistry`] lets a reload swap the whole table while in-flight
//! requests keep reading the snapshot they started with.

use super::processing_options::ProcessingOptions;
use super::query::{UrlOption, apply_url_options};
use crate::config::{ConfigError, ProxyConfig};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Preset name → option list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PresetTable {
    presets: BTreeMap<String, Vec<UrlOption>>,
}

impl PresetTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build and validate the table from `[presets]`.
    pub fn from_config(config: &ProxyConfig) -> Result<Self, ConfigError> {
        let mut table = Self::new();
        for (name, body) in &config.presets {
            table.insert(name, body)?;
        }
        table.validate(config.strict_options)?;
        Ok(table)
    }

    /// Register one preset from a `name=opt:arg/opt:arg` line.
    pub fn insert_line(&mut self, line: &str) -> Result<(), ConfigError> {
        let Some((name, body)) = line.split_once('=') else {
            return Err(ConfigError::Validation(format!(
                "invalid preset string: {line}"
            )));
        };
        self.insert(name.trim(), body.trim())
    }

    pub fn insert(&mut self, name: &str, body: &str) -> Result<(), ConfigError> {
        if name.is_empty() {
            return Err(ConfigError::Validation(format!(
                "empty preset name: {body}"
            )));
        }
        let options = parse_preset_body(body);
        if options.is_empty() {
            return Err(ConfigError::Validation(format!(
                "empty preset value: {name}"
            )));
        }
        self.presets.insert(name.to_string(), options);
        Ok(())
    }

    /// Apply every preset to fresh defaults so bad options, unknown nested
    /// presets, and cycles fail at load time rather than per request.
    /// Unknown option names only fail when `strict` is set.
    pub fn validate(&self, strict: bool) -> Result<(), ConfigError> {
        for (name, options) in &self.presets {
            let mut po = ProcessingOptions::default();
            apply_url_options(&mut po, options, self, strict).map_err(|e| {
                ConfigError::Validation(format!("preset `{name}`: {e}"))
            })?;
            debug!(preset = %name, "preset validated");
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&[UrlOption]> {
        self.presets.get(name).map(Vec::as_slice)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.presets.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.presets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }
}

/// `opt:arg:arg/opt:arg`; empty segments are skipped.
fn parse_preset_body(body: &str) -> Vec<UrlOption> {
    body.split('/')
        .filter(|s| !s.is_empty())
        .map(UrlOption::from_segment)
        .collect()
}

/// Process-wide preset table that can be swapped on reload.
#[derive(Debug, Default)]
pub struct PresetRegistry {
    table: RwLock<Arc<PresetTable>>,
}

impl PresetRegistry {
    pub fn new(table: PresetTable) -> Self {
        Self {
            table: RwLock::new(Arc::new(table)),
        }
    }

    /// The current table. Holds no lock after returning.
    pub fn snapshot(&self) -> Arc<PresetTable> {
        match self.table.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    pub fn replace(&self, table: PresetTable) {
        let table = Arc::new(table);
        match self.table.write() {
            Ok(mut guard) => *guard = table,
            Err(poisoned) => *poisoned.into_inner() = table,
        }
    }

    /// Rebuild from config; on error the current table stays in place.
    pub fn reload(&self, config: &ProxyConfig) -> Result<(), ConfigError> {
        let table = PresetTable::from_config(config)?;
        debug!(count = table.len(), "presets reloaded");
        self.replace(table);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(presets: &[(&str, &str)]) -> ProxyConfig {
        let mut config = ProxyConfig::default();
        for (name, body) in presets {
            config.presets.insert(name.to_string(), body.to_string());
        }
        config
    }

    #[test]
    fn parses_body_into_options() {
        let mut table = PresetTable::new();
        table.insert_line("thumb=resize:fill:100:100/q:70").unwrap();
        let opts = table.get("thumb").unwrap();
        assert_eq!(opts.len(), 2);
        assert_eq!(opts[0].name, "resize");
        assert_eq!(opts[0].args, vec!["fill", "100", "100"]);
        assert_eq!(opts[1].name, "q");
        assert_eq!(opts[1].args, vec!["70"]);
    }

    #[test]
    fn rejects_malformed_lines() {
        let mut table = PresetTable::new();
        assert!(table.insert_line("no-equals-sign").is_err());
        assert!(table.insert_line("=q:70").is_err());
        assert!(table.insert_line("empty=").is_err());
    }

    #[test]
    fn from_config_validates_options() {
        let config = config_with(&[("bad", "quality:200")]);
        let err = PresetTable::from_config(&config).unwrap_err();
        assert!(err.to_string().contains("bad"));
    }

    #[test]
    fn unknown_options_follow_strict_mode() {
        let mut config = config_with(&[("thumb", "w:100/future_opt:1")]);
        assert!(PresetTable::from_config(&config).is_err());

        config.strict_options = false;
        let table = PresetTable::from_config(&config).unwrap();
        assert_eq!(table.get("thumb").unwrap().len(), 2);

        // bad values are still rejected
        config.presets.insert("bad".into(), "quality:200".into());
        assert!(PresetTable::from_config(&config).is_err());
    }

    #[test]
    fn from_config_rejects_cycles() {
        let config = config_with(&[("a", "preset:b"), ("b", "preset:a")]);
        assert!(PresetTable::from_config(&config).is_err());
    }

    #[test]
    fn from_config_rejects_unknown_nested() {
        let config = config_with(&[("a", "preset:missing")]);
        assert!(PresetTable::from_config(&config).is_err());
    }

    #[test]
    fn registry_swaps_snapshots() {
        let registry = PresetRegistry::default();
        let before = registry.snapshot();
        assert!(before.is_empty());

        registry
            .reload(&config_with(&[("thumb", "w:100")]))
            .unwrap();
        assert!(registry.snapshot().contains("thumb"));
        assert!(before.is_empty());
    }

    #[test]
    fn failed_reload_keeps_old_table() {
        let registry = PresetRegistry::default();
        registry
            .reload(&config_with(&[("thumb", "w:100")]))
            .unwrap();
        assert!(registry.reload(&config_with(&[("x", "nope:1")])).is_err());
        assert!(registry.snapshot().contains("thumb"));
    }
}
