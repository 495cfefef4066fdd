use inspectcam::SessionOptions;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver};
use tracing::{error, info, warn};

/// Reads session options from a YAML file. Missing fields take defaults.
pub fn load_options(path: &Path) -> anyhow::Result<SessionOptions> {
    let content = fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read config {:?}: {}", path, e))?;
    let options = serde_yaml::from_str::<SessionOptions>(&content)
        .map_err(|e| anyhow::anyhow!("Failed to parse config {:?}: {}", path, e))?;
    Ok(options)
}

/// Watches an options file and hands back the new options after edits.
pub struct OptionsWatcher {
    path: PathBuf,
    _watcher: RecommendedWatcher,
    rx: Receiver<std::result::Result<Event, notify::Error>>,
}

impl OptionsWatcher {
    /// Create a new options watcher if a path is provided.
    pub fn new(path: Option<PathBuf>) -> Option<Self> {
        let path = path?;
        let (tx, rx) = channel();

        match RecommendedWatcher::new(tx, notify::Config::default()) {
            Ok(mut watcher) => {
                if let Err(e) = watcher.watch(&path, RecursiveMode::NonRecursive) {
                    warn!("Failed to watch config file {:?}: {}", path, e);
                    return None;
                }
                info!("Watching config file {:?} for changes", path);
                Some(Self {
                    path,
                    _watcher: watcher,
                    rx,
                })
            }
            Err(e) => {
                warn!("Failed to create config watcher: {}", e);
                None
            }
        }
    }

    /// Drains pending file events; returns freshly parsed options if the
    /// file changed and still parses.
    pub fn check_for_changes(&mut self) -> Option<SessionOptions> {
        let mut needs_reload = false;
        while let Ok(res) = self.rx.try_recv() {
            if let Ok(event) = res {
                if matches!(event.kind, notify::EventKind::Modify(_) | notify::EventKind::Create(_)) {
                    needs_reload = true;
                }
            }
        }

        if !needs_reload {
            return None;
        }

        info!("Config file changed, reloading options...");
        match load_options(&self.path) {
            Ok(options) => Some(options),
            Err(e) => {
                error!("{}", e);
                None
            }
        }
    }
}
