//! Command implementations

pub mod query;
pub mod serve;
pub mod sources;
pub mod tail;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use logdeck_core::{QuerySpec, ServerConfig, Severity};
use logdeck_query::LogQueryEngine;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use crate::cli::FilterArgs;

/// Options shared by every command
pub struct GlobalOpts {
    pub config: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
}

/// Load the config file (explicit, or discovered in the working directory) and apply overrides
pub fn load_config(opts: &GlobalOpts) -> Result<ServerConfig> {
    let mut config = match &opts.config {
        Some(path) => ServerConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => match std::env::current_dir()
            .ok()
            .and_then(|dir| ServerConfig::discover(&dir))
        {
            Some(path) => {
                debug!("Using config {}", path.display());
                ServerConfig::load(&path)
                    .with_context(|| format!("Failed to load config {}", path.display()))?
            }
            None => ServerConfig::default(),
        },
    };

    if let Some(dir) = &opts.log_dir {
        config.log_dir = Some(dir.clone());
    }
    Ok(config)
}

pub fn build_engine(config: &ServerConfig) -> Result<Arc<LogQueryEngine>> {
    config.validate()?;
    Ok(Arc::new(LogQueryEngine::from_config(config)?))
}

fn parse_time(name: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("Invalid --{} timestamp '{}'", name, value))
}

/// Turn CLI filters into a query
pub fn filter_spec(filter: &FilterArgs, page_size: usize) -> Result<QuerySpec> {
    let mut spec = QuerySpec::new().with_page_size(page_size);

    if let Some(severity) = &filter.severity {
        spec = spec.with_min_level(severity.parse::<Severity>()?);
    }
    if !filter.sources.is_empty() {
        spec = spec.with_sources(filter.sources.iter().cloned());
    }
    if let Some(text) = &filter.text {
        spec = spec.with_text(text.clone());
    }

    let from = filter.from.as_deref().map(|v| parse_time("from", v)).transpose()?;
    let to = filter.to.as_deref().map(|v| parse_time("to", v)).transpose()?;
    Ok(spec.with_time(from, to))
}
