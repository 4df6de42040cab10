use crate::error::{ErrorContext, Result};
use crate::sources::{SourceId, SourceSelection};
use crate::types::{Config, ScoutError};
use log::debug;
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use toml::value::Table;

/// Builds the effective configuration: defaults, then the TOML file if it exists, then the environment.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = Config::default();

    if let Some(path) = path {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            apply_toml(&mut config, &contents)?;
        } else {
            debug!("Config file {} not found, using defaults", path.display());
        }
    }

    // a missing .env is fine
    dotenv::dotenv().ok();
    apply_env_overrides(&mut config);
    validate_config(&config)?;

    Ok(config)
}

pub fn apply_toml(config: &mut Config, contents: &str) -> Result<()> {
    let value: toml::Value = toml::from_str(contents).with_context(|| "Failed to parse config file".to_string())?;
    let Some(table) = value.as_table() else {
        return Ok(());
    };

    if let Some(sources) = table.get("sources") {
        config.sources = match sources {
            toml::Value::String(spec) => SourceSelection::parse(spec)?,
            toml::Value::Array(_) => SourceSelection::parse(&string_list(sources).join(","))?,
            _ => return Err(ScoutError::ConfigError("sources must be a string or a list".to_string())),
        };
    }
    if let Some(excluded) = table.get("exclude_sources") {
        config.excluded_sources = string_list(excluded)
            .iter()
            .map(|s| SourceId::from_str(s))
            .collect::<Result<_>>()?;
    }

    if let Some(secs) = seconds(table, "timeout")? {
        config.timeout = secs;
    }
    if let Some(secs) = seconds(table, "max_time")? {
        config.max_time = Some(secs);
    }
    if let Some(agent) = table.get("user_agent").and_then(|v| v.as_str()) {
        config.user_agent = agent.to_string();
    }
    if let Some(proxy) = table.get("proxy").and_then(|v| v.as_str()) {
        config.proxy = Some(proxy.to_string());
    }
    if let Some(n) = table.get("recursion_concurrency").and_then(|v| v.as_integer()) {
        config.recursion_concurrency = usize::try_from(n).with_context(|| "recursion_concurrency".to_string())?;
    }
    if let Some(keep) = table.get("keep_out_of_scope").and_then(|v| v.as_bool()) {
        config.keep_out_of_scope = keep;
    }

    if let Some(api_keys) = table.get("api_keys").and_then(|v| v.as_table()) {
        for (source, keys) in api_keys {
            config.api_keys.insert(source.clone(), string_list(keys));
        }
    }

    if let Some(rate_limits) = table.get("rate_limits").and_then(|v| v.as_table()) {
        for (source, limit) in rate_limits {
            let limit = limit.as_integer().and_then(|n| u32::try_from(n).ok());
            config.rate_limits.insert(source.clone(), limit);
        }
    }

    if let Some(resolver) = table.get("resolver").and_then(|v| v.as_table()) {
        if let Some(nameservers) = resolver.get("nameservers") {
            config.resolver.nameservers = string_list(nameservers);
        }
        if let Some(threads) = resolver.get("threads").and_then(|v| v.as_integer()) {
            config.resolver.threads = usize::try_from(threads).with_context(|| "resolver.threads".to_string())?;
        }
        if let Some(secs) = seconds(resolver, "timeout")? {
            config.resolver.timeout = secs;
        }
        if let Some(system) = resolver.get("use_system_resolver").and_then(|v| v.as_bool()) {
            config.resolver.use_system_resolver = system;
        }
        if let Some(keep) = resolver.get("keep_unresolved").and_then(|v| v.as_bool()) {
            config.resolver.keep_unresolved = keep;
        }
    }

    Ok(())
}

/// `<SOURCE>_API_KEYS=key1,key2` replaces the keys of that source.
fn apply_env_overrides(config: &mut Config) {
    for id in SourceId::ALL.into_iter().filter(SourceId::needs_key) {
        let var = format!("{}_API_KEYS", id.as_str().to_uppercase());
        if let Ok(keys) = env::var(&var) {
            let keys: Vec<String> = keys
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            config.api_keys.insert(id.as_str().to_string(), keys);
        }
    }
}

pub fn validate_config(config: &Config) -> Result<()> {
    if config.timeout.is_zero() {
        return Err(ScoutError::ConfigError("timeout must be greater than 0".to_string()));
    }
    if config.max_time.is_some_and(|t| t.is_zero()) {
        return Err(ScoutError::ConfigError("max_time must be greater than 0".to_string()));
    }
    if config.resolver.threads == 0 {
        return Err(ScoutError::ConfigError("resolver threads must be greater than 0".to_string()));
    }
    if config.resolver.timeout.is_zero() {
        return Err(ScoutError::ConfigError("resolver timeout must be greater than 0".to_string()));
    }
    if config.recursion_concurrency == 0 {
        return Err(ScoutError::ConfigError("recursion_concurrency must be greater than 0".to_string()));
    }
    Ok(())
}

fn string_list(value: &toml::Value) -> Vec<String> {
    match value {
        toml::Value::String(s) => vec![s.clone()],
        toml::Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str().map(|s| s.to_string()))
            .collect(),
        _ => Vec::new(),
    }
}

fn seconds(table: &Table, key: &str) -> Result<Option<Duration>> {
    match table.get(key) {
        None => Ok(None),
        Some(toml::Value::Integer(n)) => u64::try_from(*n)
            .map(|n| Some(Duration::from_secs(n)))
            .with_context(|| format!("{} must not be negative", key)),
        Some(toml::Value::Float(f)) if *f >= 0.0 => Ok(Some(Duration::from_secs_f64(*f))),
        Some(other) => Err(ScoutError::ConfigError(format!("{} must be a number of seconds, got {}", key, other))),
    }
}
