//! # Resilience Governor
//!
//! Pure policy for converting databases that may exceed host RAM: size
//! profiles, adaptive batch sizing, and release-sweep scheduling. The only
//! I/O is the memory probe.
//!
//! ## Size Profiles
//!
//! Estimated on-disk table size selects the processing profile:
//!
//! | Profile    | Size        | Batch | Memory limit | Streaming | Parallel |
//! |------------|-------------|-------|--------------|-----------|----------|
//! | small      | < 10 MB     | 200   | 200 MB       | off       | no       |
//! | medium     | 10 MB–1 GB  | 100   | 500 MB       | on        | no       |
//! | large      | 1–10 GB     | 50    | 1 GB         | on        | yes      |
//! | enterprise | > 10 GB     | 25    | 2 GB         | on        | yes      |
//!
//! Parallel table decoding is honored only under the enterprise profile;
//! the large profile's flag exists so the engine can surface the
//! recommendation.
//!
//! ## Adaptive Rule
//!
//! After each batch the governor reads RSS:
//!
//! - above 85 % of the limit: halve the batch size (floor 5) and request a
//!   release sweep;
//! - below 40 % for three consecutive batches: grow by 1.5x (cap 400).
//!
//! The batch size stays inside [5, 400] at all times. Memory pressure is
//! handled internally; it surfaces as a fatal [`MemoryPressure`] error
//! only when RSS still exceeds the limit after remediation has already
//! pushed the batch size to the floor.

mod probe;

pub use probe::{MemoryProbe, ScriptedProbe, SysinfoProbe};

use eyre::{bail, Result};
use tracing::{debug, warn};

use crate::config::{
    BATCH_GROWTH_DEN, BATCH_GROWTH_NUM, ENTERPRISE_BATCH_SIZE, ENTERPRISE_MEMORY_LIMIT,
    LARGE_BATCH_SIZE, LARGE_MEMORY_LIMIT, LARGE_TABLE_LIMIT, LOW_WATER_STREAK, MAX_BATCH_SIZE,
    MEDIUM_BATCH_SIZE, MEDIUM_MEMORY_LIMIT, MEDIUM_TABLE_LIMIT, MIN_BATCH_SIZE,
    RSS_HIGH_WATER_PERCENT, RSS_LOW_WATER_PERCENT, SMALL_BATCH_SIZE, SMALL_MEMORY_LIMIT,
    SMALL_TABLE_LIMIT,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Profile {
    Small,
    Medium,
    Large,
    Enterprise,
}

#[derive(Debug, Clone, Copy)]
pub struct ProfileSettings {
    pub initial_batch_size: usize,
    pub memory_limit_bytes: u64,
    pub streaming: bool,
    pub parallel: bool,
}

impl Profile {
    /// Profile for an estimated on-disk table size.
    pub fn classify(estimated_bytes: u64) -> Profile {
        if estimated_bytes <= SMALL_TABLE_LIMIT {
            Profile::Small
        } else if estimated_bytes <= MEDIUM_TABLE_LIMIT {
            Profile::Medium
        } else if estimated_bytes <= LARGE_TABLE_LIMIT {
            Profile::Large
        } else {
            Profile::Enterprise
        }
    }

    pub fn settings(&self) -> ProfileSettings {
        match self {
            Profile::Small => ProfileSettings {
                initial_batch_size: SMALL_BATCH_SIZE,
                memory_limit_bytes: SMALL_MEMORY_LIMIT,
                streaming: false,
                parallel: false,
            },
            Profile::Medium => ProfileSettings {
                initial_batch_size: MEDIUM_BATCH_SIZE,
                memory_limit_bytes: MEDIUM_MEMORY_LIMIT,
                streaming: true,
                parallel: false,
            },
            Profile::Large => ProfileSettings {
                initial_batch_size: LARGE_BATCH_SIZE,
                memory_limit_bytes: LARGE_MEMORY_LIMIT,
                streaming: true,
                parallel: true,
            },
            Profile::Enterprise => ProfileSettings {
                initial_batch_size: ENTERPRISE_BATCH_SIZE,
                memory_limit_bytes: ENTERPRISE_MEMORY_LIMIT,
                streaming: true,
                parallel: true,
            },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Profile::Small => "small",
            Profile::Medium => "medium",
            Profile::Large => "large",
            Profile::Enterprise => "enterprise",
        }
    }
}

/// Fatal operational error: the limit was still exceeded after remediation.
#[derive(Debug)]
pub struct MemoryPressure {
    pub rss: u64,
    pub limit: u64,
}

impl std::fmt::Display for MemoryPressure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "memory limit exceeded after remediation: rss {} over limit {}",
            self.rss, self.limit
        )
    }
}

impl std::error::Error for MemoryPressure {}

/// Feedback handed to the engine after each batch.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchControl {
    /// The engine should return transient buffers to the allocator now.
    pub release_requested: bool,
}

pub struct Governor {
    profile: Profile,
    memory_limit: u64,
    batch_size: usize,
    low_streak: u32,
    release_interval: u64,
    since_release: u64,
    pressured: bool,
    probe: Box<dyn MemoryProbe>,
}

impl Governor {
    pub fn new(
        profile: Profile,
        memory_limit_override: Option<u64>,
        release_interval: u64,
        probe: Box<dyn MemoryProbe>,
    ) -> Self {
        let settings = profile.settings();
        Self {
            profile,
            memory_limit: memory_limit_override.unwrap_or(settings.memory_limit_bytes),
            batch_size: settings
                .initial_batch_size
                .clamp(MIN_BATCH_SIZE, MAX_BATCH_SIZE),
            low_streak: 0,
            release_interval: release_interval.max(1),
            since_release: 0,
            pressured: false,
            probe,
        }
    }

    pub fn profile(&self) -> Profile {
        self.profile
    }

    pub fn memory_limit(&self) -> u64 {
        self.memory_limit
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn streaming(&self) -> bool {
        self.profile.settings().streaming
    }

    /// Adjusts the batch size from the current RSS reading. Fails only
    /// when the limit is still exceeded with the batch size already at
    /// the floor.
    pub fn after_batch(&mut self, rows_written: usize) -> Result<BatchControl> {
        let rss = self.probe.rss();
        let high_water = self.memory_limit / 100 * RSS_HIGH_WATER_PERCENT;
        let low_water = self.memory_limit / 100 * RSS_LOW_WATER_PERCENT;

        if rss > high_water {
            let at_floor = self.batch_size == MIN_BATCH_SIZE;
            if rss > self.memory_limit && self.pressured && at_floor {
                bail!(MemoryPressure {
                    rss,
                    limit: self.memory_limit
                });
            }
            self.pressured = rss > self.memory_limit;
            self.low_streak = 0;
            let halved = (self.batch_size / 2).max(MIN_BATCH_SIZE);
            if halved != self.batch_size {
                warn!(
                    rss,
                    limit = self.memory_limit,
                    from = self.batch_size,
                    to = halved,
                    "memory high water crossed, shrinking batch"
                );
            }
            self.batch_size = halved;
            return Ok(BatchControl {
                release_requested: true,
            });
        }

        self.pressured = false;
        if rss < low_water {
            self.low_streak += 1;
            if self.low_streak >= LOW_WATER_STREAK {
                self.low_streak = 0;
                let grown =
                    (self.batch_size * BATCH_GROWTH_NUM / BATCH_GROWTH_DEN).min(MAX_BATCH_SIZE);
                if grown != self.batch_size {
                    debug!(
                        rows_written,
                        from = self.batch_size,
                        to = grown,
                        "memory comfortable, growing batch"
                    );
                }
                self.batch_size = grown;
            }
        } else {
            self.low_streak = 0;
        }

        Ok(BatchControl::default())
    }

    /// Release-sweep cadence: true once per `release_interval` records.
    pub fn record_progress(&mut self, rows: u64) -> bool {
        self.since_release += rows;
        if self.since_release >= self.release_interval {
            self.since_release = 0;
            return true;
        }
        false
    }
}
