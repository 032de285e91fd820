use std::{fmt::Display, time::Duration};

use crate::curator::DEFAULT_TOLERANCE_FACTOR;
use crate::validator::DEFAULT_TIMESTAMP_TOLERANCE;

/// Subset factors offered as curated renditions when nothing else is configured.
pub const DEFAULT_SUBSETS: [usize; 4] = [2, 3, 4, 5];

// --- Top-Level Configuration ---
#[derive(Debug, Clone)]
pub struct TrickPlayConfig {
    /// Subsetting factors, one curated I-frame variant is offered per entry
    pub subsets: Vec<usize>,

    /// Drop audio-only variants from an augmented master playlist (when video exists)
    pub remove_audio_only_variants: bool,

    pub curation: CurationConfig,
}

impl Default for TrickPlayConfig {
    fn default() -> Self {
        Self {
            subsets: DEFAULT_SUBSETS.to_vec(),
            remove_audio_only_variants: true,
            curation: CurationConfig::default(),
        }
    }
}

impl Display for TrickPlayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "TrickPlayConfig {{ subsets: {:?}, remove_audio_only_variants: {}, curation: {} }}",
            self.subsets, self.remove_audio_only_variants, self.curation
        )
    }
}

impl TrickPlayConfig {
    pub fn builder() -> TrickPlayConfigBuilder {
        TrickPlayConfigBuilder::default()
    }
}

// --- Curation Configuration ---
#[derive(Debug, Clone)]
pub struct CurationConfig {
    /// Fraction of the subset used as the selection margin around each nominal position
    pub tolerance_factor: f64,

    /// Timestamps closer than this are treated as equal when comparing playlist snapshots
    pub timestamp_tolerance: Duration,

    /// What to do when a source update no longer overlaps the previous snapshot
    pub resync_policy: ResyncPolicy,
}

impl Default for CurationConfig {
    fn default() -> Self {
        Self {
            tolerance_factor: DEFAULT_TOLERANCE_FACTOR,
            timestamp_tolerance: DEFAULT_TIMESTAMP_TOLERANCE,
            resync_policy: ResyncPolicy::default(),
        }
    }
}

impl Display for CurationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "CurationConfig {{ tolerance_factor: {:.2}, timestamp_tolerance: {}us, resync_policy: {:?} }}",
            self.tolerance_factor,
            self.timestamp_tolerance.as_micros(),
            self.resync_policy
        )
    }
}

/// Behaviour when the last segment of the previous source snapshot cannot be found in the
/// latest one, i.e. the origin replaced the whole window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResyncPolicy {
    /// Drop every previously curated entry and curate the latest source from scratch.
    #[default]
    FullResync,
    /// Ignore the update and keep serving the previously curated playlist.
    KeepStale,
}

#[derive(Debug, Clone, Default)]
pub struct TrickPlayConfigBuilder {
    config: TrickPlayConfig,
}

impl TrickPlayConfigBuilder {
    pub fn subsets(mut self, subsets: impl Into<Vec<usize>>) -> Self {
        self.config.subsets = subsets.into();
        self
    }

    pub fn remove_audio_only_variants(mut self, remove: bool) -> Self {
        self.config.remove_audio_only_variants = remove;
        self
    }

    pub fn tolerance_factor(mut self, factor: f64) -> Self {
        self.config.curation.tolerance_factor = factor;
        self
    }

    pub fn timestamp_tolerance(mut self, tolerance: Duration) -> Self {
        self.config.curation.timestamp_tolerance = tolerance;
        self
    }

    pub fn resync_policy(mut self, policy: ResyncPolicy) -> Self {
        self.config.curation.resync_policy = policy;
        self
    }

    pub fn build(self) -> TrickPlayConfig {
        self.config
    }
}
