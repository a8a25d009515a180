//! Source registry: configured and discovered log files

use logdeck_core::{Error, LogFormat, Result, ServerConfig, SourceConfig, SourceInfo};
use logdeck_logs::{decoder_for, LogSource};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use tracing::{debug, warn};

/// Where a source lives and how to decode it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDef {
    pub path: PathBuf,
    pub format: LogFormat,
}

/// Resolves source ids to files and caches opened handles.
///
/// Handles are opened lazily on first use; failed opens are not cached so a
/// file that appears later is picked up by the next query.
pub struct SourceRegistry {
    explicit: Vec<SourceConfig>,
    log_dir: Option<PathBuf>,
    pattern: glob::Pattern,
    default_format: LogFormat,
    handles: RwLock<HashMap<String, LogSource>>,
}

impl SourceRegistry {
    pub fn new(
        explicit: Vec<SourceConfig>,
        log_dir: Option<PathBuf>,
        pattern: &str,
        default_format: LogFormat,
    ) -> Result<Self> {
        let pattern = glob::Pattern::new(pattern)
            .map_err(|e| Error::config(format!("Invalid source pattern '{}': {}", pattern, e)))?;
        Ok(Self {
            explicit,
            log_dir,
            pattern,
            default_format,
            handles: RwLock::new(HashMap::new()),
        })
    }

    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        Self::new(
            config.sources.clone(),
            config.log_dir.clone(),
            &config.source_pattern,
            config.format,
        )
    }

    /// All known sources by id. Explicit entries win over discovered files.
    pub fn definitions(&self) -> BTreeMap<String, SourceDef> {
        let mut defs = BTreeMap::new();

        if let Some(dir) = &self.log_dir {
            match std::fs::read_dir(dir) {
                Ok(entries) => {
                    for entry in entries.flatten() {
                        let path = entry.path();
                        if !path.is_file() {
                            continue;
                        }
                        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                            continue;
                        };
                        if !self.pattern.matches(name) {
                            continue;
                        }
                        let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                            continue;
                        };
                        defs.insert(
                            id.to_string(),
                            SourceDef {
                                path: path.clone(),
                                format: self.default_format,
                            },
                        );
                    }
                }
                Err(e) => debug!("Log directory {} not readable: {}", dir.display(), e),
            }
        }

        for source in &self.explicit {
            defs.insert(
                source.id.clone(),
                SourceDef {
                    path: source.path.clone(),
                    format: source.format.unwrap_or(self.default_format),
                },
            );
        }

        defs
    }

    /// Pick the sources a query targets. Unknown explicit ids are `SourceNotFound`.
    pub fn resolve(&self, requested: Option<&[String]>) -> Result<Vec<(String, SourceDef)>> {
        let mut defs = self.definitions();
        match requested {
            None => Ok(defs.into_iter().collect()),
            Some(ids) => {
                let mut targets = Vec::with_capacity(ids.len());
                for id in ids {
                    if targets.iter().any(|(seen, _): &(String, SourceDef)| seen == id) {
                        continue;
                    }
                    let def = defs
                        .remove(id)
                        .ok_or_else(|| Error::SourceNotFound(id.clone()))?;
                    targets.push((id.clone(), def));
                }
                targets.sort_by(|a, b| a.0.cmp(&b.0));
                Ok(targets)
            }
        }
    }

    /// Open (or reuse) the handle for a resolved source
    pub fn open(&self, id: &str, def: &SourceDef) -> Result<LogSource> {
        if let Some(handle) = self.handles.read().get(id) {
            if handle.path() == def.path && handle.format() == def.format.to_string() {
                return Ok(handle.clone());
            }
        }

        let handle = LogSource::open(id, &def.path, decoder_for(def.format)).map_err(|e| {
            warn!("Failed to open log source {}: {}", id, e);
            e
        })?;
        debug!("Opened log source {} at {}", id, def.path.display());
        self.handles.write().insert(id.to_string(), handle.clone());
        Ok(handle)
    }

    /// Summaries for every known source
    pub fn list(&self) -> Vec<SourceInfo> {
        self.definitions()
            .into_iter()
            .map(|(id, def)| SourceInfo {
                size_bytes: std::fs::metadata(&def.path).ok().map(|m| m.len()),
                path: def.path.display().to_string(),
                format: def.format.to_string(),
                id,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn registry(dir: &TempDir, explicit: Vec<SourceConfig>) -> SourceRegistry {
        SourceRegistry::new(
            explicit,
            Some(dir.path().to_path_buf()),
            "*.log",
            LogFormat::Auto,
        )
        .unwrap()
    }

    #[test]
    fn test_discovers_log_files_only() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("api.log"), b"").unwrap();
        std::fs::write(dir.path().join("api.log.1"), b"").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"").unwrap();
        std::fs::create_dir(dir.path().join("nested.log")).unwrap();

        let defs = registry(&dir, vec![]).definitions();
        assert_eq!(defs.keys().collect::<Vec<_>>(), vec!["api"]);
    }

    #[test]
    fn test_explicit_sources_override() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("api.log"), b"").unwrap();
        let elsewhere = dir.path().join("other.json");

        let reg = registry(
            &dir,
            vec![SourceConfig {
                id: "api".to_string(),
                path: elsewhere.clone(),
                format: Some(LogFormat::Json),
            }],
        );
        let defs = reg.definitions();
        assert_eq!(defs["api"].path, elsewhere);
        assert_eq!(defs["api"].format, LogFormat::Json);
    }

    #[test]
    fn test_resolve_unknown() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("api.log"), b"").unwrap();
        let reg = registry(&dir, vec![]);

        assert_eq!(reg.resolve(None).unwrap().len(), 1);
        let err = reg.resolve(Some(&["db".to_string()])).unwrap_err();
        assert!(matches!(err, Error::SourceNotFound(id) if id == "db"));
    }

    #[test]
    fn test_resolve_dedups() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("api.log"), b"").unwrap();
        let reg = registry(&dir, vec![]);
        let targets = reg
            .resolve(Some(&["api".to_string(), "api".to_string()]))
            .unwrap();
        assert_eq!(targets.len(), 1);
    }

    #[test]
    fn test_open_caches_and_lists() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("api.log"), b"hello\n").unwrap();
        let reg = registry(&dir, vec![]);

        let (id, def) = reg.resolve(None).unwrap().remove(0);
        let first = reg.open(&id, &def).unwrap();
        let second = reg.open(&id, &def).unwrap();
        assert_eq!(first.path(), second.path());

        let listed = reg.list();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].size_bytes, Some(6));
        assert_eq!(listed[0].format, "auto");
    }

    #[test]
    fn test_missing_log_dir_is_empty() {
        let reg = SourceRegistry::new(
            vec![],
            Some(PathBuf::from("/nonexistent/logdeck/logs")),
            "*.log",
            LogFormat::Auto,
        )
        .unwrap();
        assert!(reg.definitions().is_empty());
    }
}
