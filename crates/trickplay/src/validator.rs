//! Consistency checks between two snapshots of the same live media playlist.
//!
//! A refreshed playlist is only worth incorporating when it is *newer* than what was already
//! seen, and it can only be trusted when the segments both snapshots share are the same media
//! in the same order.

use std::time::Duration;

use tracing::debug;

use crate::model::PlaylistSnapshot;

/// Program-date-time is commonly truncated to milliseconds by origins, while derived start
/// times carry microseconds.
pub const DEFAULT_TIMESTAMP_TOLERANCE: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy)]
pub struct UpdateValidator {
    timestamp_tolerance_us: i64,
}

impl Default for UpdateValidator {
    fn default() -> Self {
        Self::new(DEFAULT_TIMESTAMP_TOLERANCE)
    }
}

impl UpdateValidator {
    pub fn new(timestamp_tolerance: Duration) -> Self {
        Self {
            timestamp_tolerance_us: i64::try_from(timestamp_tolerance.as_micros())
                .unwrap_or(i64::MAX),
        }
    }

    /// Returns true if `candidate` represents a state of the stream `reference` had not reached.
    pub fn is_newer(&self, candidate: &PlaylistSnapshot, reference: &PlaylistSnapshot) -> bool {
        if candidate.media_sequence != reference.media_sequence {
            return candidate.media_sequence > reference.media_sequence;
        }
        if candidate.segments.len() != reference.segments.len() {
            return candidate.segments.len() > reference.segments.len();
        }
        if candidate.has_program_date_time
            && reference.has_program_date_time
            && candidate.start_time_us - reference.start_time_us > self.timestamp_tolerance_us
        {
            return true;
        }
        candidate.has_end_tag && !reference.has_end_tag
    }

    /// Returns true if the segments `candidate` shares with `reference` (located by media
    /// sequence number) are the same media in the same order, and the start times agree.
    ///
    /// With no overlap there is nothing to contradict and the update is accepted.
    pub fn is_update_valid(
        &self,
        candidate: &PlaylistSnapshot,
        reference: &PlaylistSnapshot,
    ) -> bool {
        if candidate.media_sequence < reference.media_sequence {
            debug!(
                "Media sequence went backwards for {}: {} -> {}",
                candidate.base_uri, reference.media_sequence, candidate.media_sequence
            );
            return false;
        }

        let offset = candidate.media_sequence - reference.media_sequence;
        let Some(first_shared) = usize::try_from(offset)
            .ok()
            .and_then(|offset| reference.segments.get(offset..))
            .filter(|shared| !shared.is_empty())
        else {
            return true;
        };

        let mismatch = first_shared
            .iter()
            .zip(candidate.segments.iter())
            .position(|(old, new)| !old.is_same_media(new));
        if let Some(idx) = mismatch {
            debug!(
                "Segment mismatch in {} at media sequence {}",
                candidate.base_uri,
                candidate.media_sequence + idx as u64
            );
            return false;
        }

        if candidate.has_program_date_time
            && reference.has_program_date_time
            && !candidate.segments.is_empty()
        {
            let expected_start_us =
                reference.start_time_us + first_shared[0].relative_start_time_us as i64;
            let drift_us = (candidate.start_time_us - expected_start_us).abs();
            if drift_us > self.timestamp_tolerance_us {
                debug!(
                    "Start time of {} drifted by {}us from the previous snapshot",
                    candidate.base_uri, drift_us
                );
                return false;
            }
        }

        true
    }
}

impl PlaylistSnapshot {
    /// See [`UpdateValidator::is_newer`].
    pub fn is_newer_than(&self, other: &PlaylistSnapshot) -> bool {
        UpdateValidator::default().is_newer(self, other)
    }

    /// See [`UpdateValidator::is_update_valid`].
    pub fn is_update_valid(&self, previous: &PlaylistSnapshot) -> bool {
        UpdateValidator::default().is_update_valid(self, previous)
    }
}
