// Removal eligibility and folder size thresholds.

use std::time::{Duration, SystemTime};

use crate::config::CleanupConfig;
use crate::index::FileMeta;

/// Minimum age on both axes before a file may be removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecencyWindow {
    /// Time since last read.
    pub access: Duration,
    /// Time since the file was written.
    pub creation: Duration,
}

/// Which rule a removal is judged by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Trimming toward the target size; recently used files are kept.
    Soft,
    /// Trimming toward the hard maximum; only very fresh files are kept.
    Hard,
}

/// How many files a folder holds beyond each threshold. The two numbers
/// never count the same file twice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OverTarget {
    pub over_max: usize,
    pub over_optimal: usize,
}

impl OverTarget {
    pub fn is_zero(&self) -> bool {
        self.over_max == 0 && self.over_optimal == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvictionPolicy {
    pub startup_delay: Duration,
    pub min_idle_gap: Duration,
    pub max_starvation_gap: Duration,
    pub optimal_work_slice: Duration,
    pub target_items_per_folder: usize,
    pub max_items_per_folder: usize,
    pub soft_avoid: RecencyWindow,
    pub hard_prohibit: RecencyWindow,
}

impl EvictionPolicy {
    pub fn from_config(cfg: &CleanupConfig) -> Self {
        Self {
            startup_delay: cfg.startup_delay,
            min_idle_gap: cfg.min_idle_gap,
            max_starvation_gap: cfg.max_starvation_gap,
            optimal_work_slice: cfg.optimal_work_slice,
            target_items_per_folder: cfg.target_items_per_folder,
            max_items_per_folder: cfg.max_items_per_folder,
            soft_avoid: RecencyWindow {
                access: cfg.avoid_removal_if_used_within,
                creation: cfg.avoid_removal_if_created_within,
            },
            hard_prohibit: RecencyWindow {
                access: cfg.prohibit_removal_if_used_within,
                creation: cfg.prohibit_removal_if_created_within,
            },
        }
    }

    pub fn should_remove_soft(&self, meta: &FileMeta, now: SystemTime) -> bool {
        outside(meta, now, &self.soft_avoid)
    }

    pub fn should_remove_hard(&self, meta: &FileMeta, now: SystemTime) -> bool {
        outside(meta, now, &self.hard_prohibit)
    }

    pub fn should_remove(&self, tier: Tier, meta: &FileMeta, now: SystemTime) -> bool {
        match tier {
            Tier::Soft => self.should_remove_soft(meta, now),
            Tier::Hard => self.should_remove_hard(meta, now),
        }
    }

    /// Splits the excess of a folder with `count` files into the part above
    /// the maximum and the part between the target and the maximum.
    pub fn over_target(&self, count: usize) -> OverTarget {
        let over_max = count.saturating_sub(self.max_items_per_folder);
        let over_optimal = (count - over_max).saturating_sub(self.target_items_per_folder);
        OverTarget {
            over_max,
            over_optimal,
        }
    }
}

fn outside(meta: &FileMeta, now: SystemTime, window: &RecencyWindow) -> bool {
    older_than(now, meta.accessed_at, window.access) && older_than(now, meta.updated_at, window.creation)
}

// Timestamps in the future (clock skew) count as fresh.
fn older_than(now: SystemTime, at: SystemTime, window: Duration) -> bool {
    match now.duration_since(at) {
        Ok(age) => age > window,
        Err(_) => false,
    }
}
