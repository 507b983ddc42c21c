//! Step-keyed checkpoints of named modules (`actor`, `critic`, ...).
//!
//! Files are written as `{name}_{step:08}.bin` with burn's `BinFileRecorder`;
//! only the latest `keep_last_n` steps are kept per name, and the module with
//! the best reported metric is mirrored to `{name}_best.bin`.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use burn::module::Module;
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use burn::tensor::backend::Backend;

/// Where and how often named modules are saved.
#[derive(Debug, Clone)]
pub struct CheckpointerConfig {
    pub checkpoint_dir: PathBuf,
    /// Cycles between saves (0 = only when asked explicitly).
    pub save_interval: usize,
    /// Checkpoints kept per module name (0 = keep all).
    pub keep_last_n: usize,
    pub save_best: bool,
}

impl Default for CheckpointerConfig {
    fn default() -> Self {
        Self {
            checkpoint_dir: PathBuf::from("runs/checkpoints"),
            save_interval: 100,
            keep_last_n: 5,
            save_best: true,
        }
    }
}

impl CheckpointerConfig {
    pub fn new(checkpoint_dir: impl Into<PathBuf>) -> Self {
        Self {
            checkpoint_dir: checkpoint_dir.into(),
            ..Default::default()
        }
    }

    pub fn with_save_interval(mut self, cycles: usize) -> Self {
        self.save_interval = cycles;
        self
    }

    pub fn with_keep_last_n(mut self, n: usize) -> Self {
        self.keep_last_n = n;
        self
    }

    /// Mirror the best-metric module to `{name}_best.bin`.
    pub fn with_save_best(mut self, enabled: bool) -> Self {
        self.save_best = enabled;
        self
    }
}

/// Failures while saving, listing or loading checkpoints.
#[derive(Debug)]
pub enum CheckpointError {
    Io(io::Error),
    /// Burn recorder error.
    Recorder(String),
    /// No checkpoint with the requested name exists.
    NoCheckpoints(String),
}

impl std::fmt::Display for CheckpointError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckpointError::Io(e) => write!(f, "checkpoint file error: {}", e),
            CheckpointError::Recorder(e) => write!(f, "cannot record module: {}", e),
            CheckpointError::NoCheckpoints(name) => write!(f, "no '{}' checkpoints on disk", name),
        }
    }
}

impl std::error::Error for CheckpointError {}

impl From<io::Error> for CheckpointError {
    fn from(e: io::Error) -> Self {
        CheckpointError::Io(e)
    }
}

/// Checkpoint metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointInfo {
    pub path: PathBuf,
    pub step: usize,
    pub metric: Option<f32>,
}

/// Saves, prunes and reloads module checkpoints.
pub struct Checkpointer {
    config: CheckpointerConfig,
    best_metric: BTreeMap<String, f32>,
    history: BTreeMap<String, Vec<CheckpointInfo>>,
}

impl Checkpointer {
    /// Create a checkpointer, creating the directory if needed.
    pub fn new(config: CheckpointerConfig) -> Result<Self, CheckpointError> {
        fs::create_dir_all(&config.checkpoint_dir)?;
        Ok(Self {
            config,
            best_metric: BTreeMap::new(),
            history: BTreeMap::new(),
        })
    }

    pub fn config(&self) -> &CheckpointerConfig {
        &self.config
    }

    /// Whether cycle `cycle` is a save point.
    pub fn should_save(&self, cycle: usize) -> bool {
        self.config.save_interval > 0 && cycle > 0 && cycle % self.config.save_interval == 0
    }

    fn file_name(name: &str, step: usize) -> String {
        format!("{}_{:08}.bin", name, step)
    }

    /// Save `model` under `name` for `step`.
    pub fn save<B: Backend, M: Module<B>>(
        &mut self,
        name: &str,
        model: &M,
        step: usize,
        metric: Option<f32>,
    ) -> Result<PathBuf, CheckpointError> {
        let path = self.config.checkpoint_dir.join(Self::file_name(name, step));
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        // The recorder appends the extension itself
        model
            .clone()
            .save_file(path.with_extension(""), &recorder)
            .map_err(|e| CheckpointError::Recorder(e.to_string()))?;

        let history = self.history.entry(name.to_string()).or_default();
        history.retain(|c| c.step != step);
        history.push(CheckpointInfo {
            path: path.clone(),
            step,
            metric,
        });

        if self.config.save_best {
            if let Some(m) = metric {
                let best = self.best_metric.entry(name.to_string()).or_insert(f32::NEG_INFINITY);
                if m > *best {
                    *best = m;
                    let best_path = self.config.checkpoint_dir.join(format!("{}_best", name));
                    model
                        .clone()
                        .save_file(best_path, &recorder)
                        .map_err(|e| CheckpointError::Recorder(e.to_string()))?;
                }
            }
        }

        self.cleanup_old_checkpoints(name);
        Ok(path)
    }

    /// Load a checkpoint file into `template`.
    pub fn load<B: Backend, M: Module<B>>(
        &self,
        template: M,
        path: &Path,
        device: &B::Device,
    ) -> Result<M, CheckpointError> {
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        template
            .load_file(path.with_extension(""), &recorder, device)
            .map_err(|e| CheckpointError::Recorder(e.to_string()))
    }

    /// Load the latest checkpoint saved under `name`, returning the step too.
    pub fn load_latest<B: Backend, M: Module<B>>(
        &self,
        name: &str,
        template: M,
        device: &B::Device,
    ) -> Result<(M, usize), CheckpointError> {
        let latest = self
            .list_checkpoints(name)?
            .pop()
            .ok_or_else(|| CheckpointError::NoCheckpoints(name.to_string()))?;
        let model = self.load(template, &latest.path, device)?;
        Ok((model, latest.step))
    }

    /// Checkpoints on disk for `name`, oldest step first.
    pub fn list_checkpoints(&self, name: &str) -> Result<Vec<CheckpointInfo>, CheckpointError> {
        let prefix = format!("{}_", name);
        let mut checkpoints: Vec<CheckpointInfo> = fs::read_dir(&self.config.checkpoint_dir)?
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let path = e.path();
                let step = path
                    .file_name()?
                    .to_str()?
                    .strip_prefix(&prefix)?
                    .strip_suffix(".bin")?
                    .parse()
                    .ok()?;
                Some(CheckpointInfo {
                    path,
                    step,
                    metric: None,
                })
            })
            .collect();
        checkpoints.sort_by_key(|c| c.step);
        Ok(checkpoints)
    }

    /// Best metric seen for `name`.
    pub fn best_metric(&self, name: &str) -> Option<f32> {
        self.best_metric.get(name).copied()
    }

    fn cleanup_old_checkpoints(&mut self, name: &str) {
        if self.config.keep_last_n == 0 {
            return;
        }
        if let Some(history) = self.history.get_mut(name) {
            while history.len() > self.config.keep_last_n {
                let old = history.remove(0);
                if let Err(e) = fs::remove_file(&old.path) {
                    log::warn!("failed to remove old checkpoint {}: {}", old.path.display(), e);
                }
            }
        }
    }
}
