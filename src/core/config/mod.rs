//! # Config Module
//!
//! One immutable configuration value, built once by the caller and passed by
//! reference into every phase.
//!
//! ## Example
//! ```rust,ignore
//! use nolossia::core::config::{NolossiaConfig, Sensitivity, WorkerStrategy};
//!
//! let config = NolossiaConfig::default()
//!     .with_sensitivity(Sensitivity::Balanced)
//!     .with_strategy(WorkerStrategy::Threads)
//!     .with_workers(4);
//! config.validate()?;
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NolossiaConfig {
    pub scan: ScanConfig,
    pub extract: ExtractConfig,
    pub classify: ClassifyConfig,
    pub executor: ExecutorConfig,
    pub plan: PlanConfig,
}

impl NolossiaConfig {
    pub fn with_sensitivity(mut self, sensitivity: Sensitivity) -> Self {
        self.classify.sensitivity = sensitivity;
        self
    }

    pub fn with_strategy(mut self, strategy: WorkerStrategy) -> Self {
        self.executor.strategy = strategy;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.executor.workers = Some(workers);
        self
    }

    /// Program launched as `<program> worker` for process workers
    pub fn with_worker_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.executor.worker_program = Some(program.into());
        self
    }

    pub fn with_scan(mut self, scan: ScanConfig) -> Self {
        self.scan = scan;
        self
    }

    pub fn with_max_pixels(mut self, max_pixels: u64) -> Self {
        self.extract.max_pixels = max_pixels;
        self
    }

    /// Reject values no phase can work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.executor.workers == Some(0) {
            return Err(ConfigError::ZeroWorkers);
        }
        for name in [&self.plan.review_dir, &self.plan.quarantine_dir] {
            let plain = !name.is_empty()
                && name != "."
                && name != ".."
                && !name.contains('/')
                && !name.contains('\\');
            if !plain {
                return Err(ConfigError::InvalidFolderName { name: name.clone() });
            }
        }
        Ok(())
    }
}

/// Configuration for file discovery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Whether to follow symbolic links (skipped and counted otherwise)
    pub follow_symlinks: bool,
    /// Whether to include hidden files and directories
    pub include_hidden: bool,
    /// Maximum directory depth (None = unlimited)
    pub max_depth: Option<usize>,
    /// Custom extensions to include (None = use defaults)
    pub extensions: Option<Vec<String>>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            follow_symlinks: false,
            include_hidden: false,
            max_depth: None,
            extensions: None,
        }
    }
}

/// Configuration for per-file extraction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractConfig {
    /// Images above this many pixels are not decoded for perceptual hashing
    pub max_pixels: u64,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            max_pixels: 178_956_970,
        }
    }
}

/// Hamming distance thresholds for near-duplicate linking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HammingBands {
    /// Links unconditionally at or below this distance
    pub strong: u32,
    /// Links with the strict predicate at or below this distance
    pub weak: u32,
}

/// Near-duplicate sensitivity preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sensitivity {
    #[default]
    Conservative,
    Balanced,
    Aggressive,
}

impl Sensitivity {
    pub fn bands(&self) -> HammingBands {
        match self {
            Sensitivity::Conservative => HammingBands { strong: 2, weak: 5 },
            Sensitivity::Balanced => HammingBands { strong: 3, weak: 7 },
            Sensitivity::Aggressive => HammingBands { strong: 4, weak: 10 },
        }
    }
}

impl FromStr for Sensitivity {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "conservative" => Ok(Sensitivity::Conservative),
            "balanced" => Ok(Sensitivity::Balanced),
            "aggressive" => Ok(Sensitivity::Aggressive),
            _ => Err(ConfigError::UnknownSensitivity(s.to_string())),
        }
    }
}

/// Configuration for the classifier
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassifyConfig {
    pub sensitivity: Sensitivity,
}

/// How extraction work is spread across workers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStrategy {
    /// Processes for large batches when a worker program is known, else threads
    #[default]
    Auto,
    Threads,
    Processes,
}

impl FromStr for WorkerStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(WorkerStrategy::Auto),
            "thread" | "threads" => Ok(WorkerStrategy::Threads),
            "process" | "processes" => Ok(WorkerStrategy::Processes),
            _ => Err(ConfigError::UnknownStrategy(s.to_string())),
        }
    }
}

/// Configuration for the concurrency executor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    pub strategy: WorkerStrategy,
    /// Pool size (None = available parallelism)
    pub workers: Option<usize>,
    pub worker_program: Option<PathBuf>,
    /// Smallest batch for which `Auto` starts process workers
    pub process_min_batch: usize,
}

impl ExecutorConfig {
    /// Resolved pool size
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            strategy: WorkerStrategy::Auto,
            workers: None,
            worker_program: None,
            process_min_batch: 64,
        }
    }
}

/// Names of the reserved destination folders
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanConfig {
    pub review_dir: String,
    pub quarantine_dir: String,
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            review_dir: "REVIEW".to_string(),
            quarantine_dir: "QUARANTINE_EXACT".to_string(),
        }
    }
}
