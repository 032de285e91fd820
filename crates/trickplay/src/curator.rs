//! # Segment Curator
//!
//! Reduces a dense I-frame-only segment run to roughly one segment every `subset` frames.
//!
//! The first segment is always kept as the continuity anchor. The rest is scanned in windows
//! placed around every `subset`-th position, widened by a tolerance margin so the pick does not
//! land on the same relative frame each time. Within a window the segment with the smallest
//! byte-range length wins, since small I-frames decode fastest.
//!
//! Skipping segments invalidates their durations, so every kept segment is re-timed to last
//! until the next kept one starts.

use std::ops::Range;

use tracing::trace;

use crate::error::{Result, TrickPlayError};
use crate::model::Segment;

/// Margin, as a fraction of the subset, around each nominal window position.
pub const DEFAULT_TOLERANCE_FACTOR: f64 = 0.25;

pub const MIN_SUBSET: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentCurator {
    subset: usize,
    tolerance: usize,
}

impl SegmentCurator {
    pub fn new(subset: usize) -> Result<Self> {
        Self::with_tolerance_factor(subset, DEFAULT_TOLERANCE_FACTOR)
    }

    pub fn with_tolerance_factor(subset: usize, tolerance_factor: f64) -> Result<Self> {
        if subset < MIN_SUBSET {
            return Err(TrickPlayError::InvalidSubset(format!(
                "{subset} (must be at least {MIN_SUBSET})"
            )));
        }
        let tolerance = (subset as f64 * tolerance_factor.max(0.0)).floor() as usize;
        // A margin of half the subset or more would let windows overlap
        let tolerance = tolerance.min((subset - 1) / 2);
        Ok(Self { subset, tolerance })
    }

    #[inline]
    pub fn subset(&self) -> usize {
        self.subset
    }

    #[inline]
    pub fn tolerance(&self) -> usize {
        self.tolerance
    }

    /// Selection windows over a run of `len` segments, as half-open index ranges.
    ///
    /// Window `k` (k >= 1) starts at `k * subset - tolerance` and ends at
    /// `min(len - 1, start + 2 * tolerance)`. An empty window stands for its end index.
    pub fn windows(&self, len: usize) -> impl Iterator<Item = Range<usize>> + '_ {
        let last_index = len.saturating_sub(1);
        (self.subset - self.tolerance..len)
            .step_by(self.subset)
            .map(move |start| start..last_index.min(start + 2 * self.tolerance))
    }

    /// Picks the kept segments without re-timing them.
    pub fn select<'a>(&self, segments: &'a [Segment]) -> Vec<&'a Segment> {
        let Some(anchor) = segments.first() else {
            return Vec::new();
        };
        let mut selected = vec![anchor];
        if segments.len() < self.subset {
            return selected;
        }

        for window in self.windows(segments.len()) {
            let pick = smallest_segment_in_range(segments, window.start, window.end);
            trace!(
                "window {}..{} -> {} ({:?} bytes)",
                window.start,
                window.end,
                pick.url,
                pick.byte_range_length()
            );
            selected.push(pick);
        }
        selected
    }

    /// Curates `segments`, which start `segments[0].relative_start_time_us` into a playlist
    /// lasting `playlist_duration_us`. Kept segments keep their identity, relative start time and
    /// discontinuity numbering; durations stretch to the next kept segment, and the last kept
    /// segment runs to the end of the playlist.
    pub fn curate(&self, segments: &[Segment], playlist_duration_us: u64) -> Vec<Segment> {
        let selected = self.select(segments);
        selected
            .iter()
            .enumerate()
            .map(|(idx, current)| {
                let end_us = selected
                    .get(idx + 1)
                    .map_or(playlist_duration_us, |next| next.relative_start_time_us);
                current.copy_with_duration(end_us.saturating_sub(current.relative_start_time_us))
            })
            .collect()
    }
}

/// Smallest segment by byte-range length in `segments[start..end]`, first one on ties.
/// Segments without a byte range count as largest. An empty range yields `segments[end]`.
pub fn smallest_segment_in_range(segments: &[Segment], start: usize, end: usize) -> &Segment {
    segments[start..end]
        .iter()
        .min_by_key(|segment| segment.byte_range_length().unwrap_or(u64::MAX))
        .unwrap_or(&segments[end])
}
