//! Source registry backed by the service configuration file.
//!
//! The file is re-read on every lookup so sources can be added, removed, or
//! re-rooted without restarting the service. A file that fails to parse or
//! validate (for example while an editor is saving it) leaves the previous
//! source set in force.

use std::sync::atomic::{AtomicBool, Ordering};

use camino::Utf8PathBuf;
use parking_lot::RwLock;
use snapfeed_core::{Config, ConfigError, Source, SourceRegistry};
use tracing::{info, warn};

/// A [`SourceRegistry`] that reloads its sources from a JSON config file.
#[derive(Debug)]
pub struct ConfigFileSources {
    path: Utf8PathBuf,
    current: RwLock<Vec<Source>>,
    failing: AtomicBool,
}

impl ConfigFileSources {
    /// Creates a registry seeded with the sources of an already loaded config.
    pub fn new(path: impl Into<Utf8PathBuf>, initial: Vec<Source>) -> Self {
        Self {
            path: path.into(),
            current: RwLock::new(initial),
            failing: AtomicBool::new(false),
        }
    }

    fn load(&self) -> Result<Vec<Source>, ConfigError> {
        Ok(Config::from_json_file(&self.path)?.tracked_sources())
    }

    fn reload(&self) -> Vec<Source> {
        match self.load() {
            Ok(sources) => {
                if self.failing.swap(false, Ordering::Relaxed) {
                    info!(path = %self.path, "Configuration readable again");
                }
                let mut current = self.current.write();
                if *current != sources {
                    info!(
                        path = %self.path,
                        before = current.len(),
                        after = sources.len(),
                        "Tracked sources changed"
                    );
                    current.clone_from(&sources);
                }
                sources
            }
            Err(error) => {
                if !self.failing.swap(true, Ordering::Relaxed) {
                    warn!(
                        path = %self.path,
                        error = %error,
                        "Configuration reload failed, keeping previous sources"
                    );
                }
                self.current.read().clone()
            }
        }
    }
}

impl SourceRegistry for ConfigFileSources {
    fn tracked_sources(&self) -> Vec<Source> {
        self.reload()
    }

    fn contains(&self, name: &str) -> bool {
        self.current
            .read()
            .iter()
            .any(|source| source.name.as_str() == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8Path;
    use std::fs;
    use tempfile::TempDir;

    fn write_config(path: &Utf8Path, sources: &[(&str, &str)]) {
        let entries: Vec<String> = sources
            .iter()
            .map(|(name, root)| format!(r#"{{"name": "{name}", "root": "{root}"}}"#))
            .collect();
        fs::write(path, format!(r#"{{"sources": [{}]}}"#, entries.join(","))).unwrap();
    }

    fn setup() -> (TempDir, Utf8PathBuf) {
        let temp = TempDir::new().unwrap();
        let path = Utf8PathBuf::try_from(temp.path().join("snapfeed.json")).unwrap();
        (temp, path)
    }

    #[test]
    fn test_picks_up_added_source() {
        let (_temp, path) = setup();
        write_config(&path, &[("daq", "/data/daq")]);
        let registry = ConfigFileSources::new(&path, Vec::new());

        assert_eq!(registry.tracked_sources().len(), 1);
        assert!(registry.contains("daq"));

        write_config(&path, &[("daq", "/data/daq"), ("cam", "/data/cam")]);
        let sources = registry.tracked_sources();
        assert_eq!(sources.len(), 2);
        assert!(registry.contains("cam"));
    }

    #[test]
    fn test_broken_file_keeps_previous_sources() {
        let (_temp, path) = setup();
        write_config(&path, &[("daq", "/data/daq")]);
        let registry = ConfigFileSources::new(&path, Vec::new());
        assert_eq!(registry.tracked_sources().len(), 1);

        fs::write(&path, "{ not json").unwrap();
        let sources = registry.tracked_sources();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].name.as_str(), "daq");

        write_config(&path, &[]);
        assert!(registry.tracked_sources().is_empty());
        assert!(!registry.contains("daq"));
    }

    #[test]
    fn test_missing_file_keeps_seed() {
        let (_temp, path) = setup();
        let seed = vec![Source::new("daq".into(), Utf8PathBuf::from("/data/daq"))];
        let registry = ConfigFileSources::new(&path, seed);
        assert_eq!(registry.tracked_sources().len(), 1);
        assert!(registry.contains("daq"));
    }
}
