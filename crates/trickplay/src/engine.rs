//! # Incremental Curation Engine
//!
//! Keeps one curated playlist in step with a live I-frame source playlist. The first snapshot is
//! curated in full; every later snapshot is compared with the one before it and only the delta is
//! applied: curated entries whose media left the source window are dropped from the front, newly
//! appended source segments are curated and spliced onto the back.
//!
//! One engine serves exactly one curated rendition. It holds `&mut self` state and is not meant to
//! be shared between threads.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::config::{CurationConfig, ResyncPolicy};
use crate::curator::SegmentCurator;
use crate::error::{Result, TrickPlayError};
use crate::model::{PlaylistSnapshot, Segment, SegmentId};
use crate::validator::UpdateValidator;

/// Curated playlists are numbered independently of their source.
pub const CURATED_FIRST_MEDIA_SEQUENCE: u64 = 1;

/// Difference between two source snapshots, expressed against the curated playlist.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistUpdates {
    /// Leading curated entries whose media was dropped from the source.
    pub remove_count: usize,
    /// Largest relative discontinuity sequence among the removed curated entries.
    pub discontinuity_delta: u64,
    /// Total duration of the removed curated entries.
    pub time_delta_us: u64,
    /// Source segments appended since the previous snapshot, as found in the latest snapshot.
    pub added_segments: Vec<Segment>,
    /// The previous snapshot's last segment is missing from a latest snapshot that should
    /// still contain it.
    pub continuity_lost: bool,
}

impl PlaylistUpdates {
    pub fn is_empty(&self) -> bool {
        self.remove_count == 0 && self.added_segments.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct SmallestIFramesCurator {
    previous_curated: Option<PlaylistSnapshot>,
    validator: UpdateValidator,
    tolerance_factor: f64,
    resync_policy: ResyncPolicy,
    /// Curated absolute discontinuity number minus the source's, for the same media.
    discontinuity_offset: i64,
    /// The last update lost continuity and the previous curated playlist was kept.
    stale: bool,
}

impl Default for SmallestIFramesCurator {
    fn default() -> Self {
        Self::new(&CurationConfig::default())
    }
}

impl SmallestIFramesCurator {
    pub fn new(config: &CurationConfig) -> Self {
        Self {
            previous_curated: None,
            validator: UpdateValidator::new(config.timestamp_tolerance),
            tolerance_factor: config.tolerance_factor,
            resync_policy: config.resync_policy,
            discontinuity_offset: 0,
            stale: false,
        }
    }

    /// Resumes from a curated playlist produced earlier.
    pub fn with_previous(config: &CurationConfig, previous_curated: PlaylistSnapshot) -> Self {
        Self {
            previous_curated: Some(previous_curated),
            ..Self::new(config)
        }
    }

    /// The most recently produced curated playlist.
    pub fn current(&self) -> Option<&PlaylistSnapshot> {
        self.previous_curated.as_ref()
    }

    /// Whether the last update lost continuity with the source and kept the previous curated
    /// playlist. The source snapshot it was given must not become the reference for the next
    /// update, otherwise the stale entries would never be removed.
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    fn segment_curator(&self, subset: usize) -> Result<SegmentCurator> {
        SegmentCurator::with_tolerance_factor(subset, self.tolerance_factor)
    }

    /// Curates the whole of `source` and makes the result the current curated playlist.
    pub fn generate_curated_playlist(
        &mut self,
        source: &PlaylistSnapshot,
        subset: usize,
        curated_uri: &str,
    ) -> Result<PlaylistSnapshot> {
        let curator = self.segment_curator(subset)?;
        let segments = curator.curate(&source.segments, source.duration_us());
        debug!(
            "Curated {} of {} segments from {} (subset {})",
            segments.len(),
            source.segments.len(),
            source.base_uri,
            subset
        );

        let curated = source.copy_with_updates(
            segments,
            curated_uri,
            source.start_time_us,
            CURATED_FIRST_MEDIA_SEQUENCE,
            source.discontinuity_sequence,
        );
        self.previous_curated = Some(curated.clone());
        self.discontinuity_offset = 0;
        self.stale = false;
        Ok(curated)
    }

    /// Applies the change from `previous` to `latest` (two successive source snapshots) to the
    /// current curated playlist.
    pub fn update_current_curated(
        &mut self,
        latest: &PlaylistSnapshot,
        previous: &PlaylistSnapshot,
        subset: usize,
    ) -> Result<PlaylistSnapshot> {
        self.stale = false;
        let Some(curated) = self.previous_curated.as_ref() else {
            return Err(TrickPlayError::NotInitialized(latest.base_uri.clone()));
        };
        let curator = self.segment_curator(subset)?;

        if !self.validator.is_newer(latest, previous) {
            debug!("Ignoring stale snapshot of {}", latest.base_uri);
            return Ok(curated.clone());
        }
        if !self.validator.is_update_valid(latest, previous) {
            warn!(
                "Inconsistent update of {} (media sequence {} -> {}), curating anyway",
                latest.base_uri, previous.media_sequence, latest.media_sequence
            );
        }

        let updates = compute_playlist_updates(curated, latest, previous);
        debug!(
            "Update of {}: remove {} curated, add {} source segments, discontinuity delta {}, time delta {}us",
            latest.base_uri,
            updates.remove_count,
            updates.added_segments.len(),
            updates.discontinuity_delta,
            updates.time_delta_us
        );

        let updated = if updates.continuity_lost {
            match self.resync_policy {
                ResyncPolicy::KeepStale => {
                    warn!(
                        "Lost continuity with {}, keeping the previous curated playlist",
                        latest.base_uri
                    );
                    self.stale = true;
                    return Ok(curated.clone());
                }
                ResyncPolicy::FullResync => {
                    warn!(
                        "Lost continuity with {}, curating the whole window again",
                        latest.base_uri
                    );
                    let resynced = resync(curated, latest, &curator);
                    self.discontinuity_offset = discontinuity_number(&resynced)
                        - discontinuity_number(latest);
                    resynced
                }
            }
        } else if updates.is_empty() {
            PlaylistSnapshot {
                has_end_tag: latest.has_end_tag,
                playlist_type: latest.playlist_type,
                ..curated.clone()
            }
        } else {
            apply_updates(curated, latest, &curator, updates, self.discontinuity_offset)
        };

        self.previous_curated = Some(updated.clone());
        Ok(updated)
    }
}

/// Compares two source snapshots and maps the difference onto `curated`.
pub fn compute_playlist_updates(
    curated: &PlaylistSnapshot,
    latest: &PlaylistSnapshot,
    previous: &PlaylistSnapshot,
) -> PlaylistUpdates {
    let media_sequence_delta = latest.media_sequence.saturating_sub(previous.media_sequence);
    let removed_len = usize::try_from(media_sequence_delta)
        .unwrap_or(usize::MAX)
        .min(previous.segments.len());
    let removed: HashSet<SegmentId<'_>> = previous.segments[..removed_len]
        .iter()
        .map(Segment::id)
        .collect();

    let mut remove_count = 0;
    let mut discontinuity_delta = 0;
    let mut time_delta_us = 0;
    for segment in curated
        .segments
        .iter()
        .take_while(|segment| removed.contains(&segment.id()))
    {
        remove_count += 1;
        discontinuity_delta = discontinuity_delta.max(segment.relative_discontinuity_sequence);
        time_delta_us += segment.duration_us;
    }

    let mut continuity_lost = false;
    let mut added_segments: &[Segment] = match previous.segments.last() {
        None => latest.segments.as_slice(),
        Some(last) => match latest.segments.iter().position(|s| s.is_same_media(last)) {
            Some(idx) => &latest.segments[idx + 1..],
            // The window rolled over exactly where the previous one ended
            None if latest.media_sequence == previous.end_media_sequence() => {
                latest.segments.as_slice()
            }
            None => {
                continuity_lost = !latest.segments.is_empty();
                &[]
            }
        },
    };

    // A repeated update would append the same media twice
    if let Some(curated_last) = curated.segments.last() {
        if let Some(idx) = added_segments
            .iter()
            .position(|s| s.is_same_media(curated_last))
        {
            added_segments = &added_segments[idx + 1..];
        }
    }

    PlaylistUpdates {
        remove_count,
        discontinuity_delta,
        time_delta_us,
        added_segments: added_segments.to_vec(),
        continuity_lost,
    }
}

fn apply_updates(
    curated: &PlaylistSnapshot,
    latest: &PlaylistSnapshot,
    curator: &SegmentCurator,
    updates: PlaylistUpdates,
    discontinuity_offset: i64,
) -> PlaylistSnapshot {
    let curated_base = curated.discontinuity_sequence.unwrap_or(0);
    let source_to_curated =
        discontinuity_number(latest) + discontinuity_offset - curated_base as i64;

    // Added segments are numbered against the latest source; renumber them against the
    // curated playlist before the common shift.
    let added = curator
        .curate(&updates.added_segments, latest.duration_us())
        .into_iter()
        .map(|segment| {
            let relative_discontinuity =
                (segment.relative_discontinuity_sequence as i64 + source_to_curated).max(0) as u64;
            Segment {
                relative_discontinuity_sequence: relative_discontinuity,
                ..segment
            }
        });

    let segments = clone_adjusted_segments(
        curated.segments[updates.remove_count..]
            .iter()
            .cloned()
            .chain(added),
        updates.discontinuity_delta,
    );

    let discontinuity_sequence = (curated.has_discontinuity_sequence()
        || updates.discontinuity_delta > 0)
        .then_some(curated_base + updates.discontinuity_delta);

    PlaylistSnapshot {
        has_end_tag: latest.has_end_tag,
        playlist_type: latest.playlist_type,
        ..curated.copy_with_updates(
            segments,
            curated.base_uri.clone(),
            curated.start_time_us + updates.time_delta_us as i64,
            curated.media_sequence + updates.remove_count as u64,
            discontinuity_sequence,
        )
    }
}

/// Curates the whole latest window. The curated media sequence continues past every previous
/// entry and the discontinuity sequence moves past the last one, so players treat the jump as
/// a discontinuity.
fn resync(
    curated: &PlaylistSnapshot,
    latest: &PlaylistSnapshot,
    curator: &SegmentCurator,
) -> PlaylistSnapshot {
    let segments = curator.curate(&latest.segments, latest.duration_us());
    let last_discontinuity = curated
        .segments
        .last()
        .map_or(0, |segment| segment.relative_discontinuity_sequence);
    let discontinuity_sequence =
        curated.discontinuity_sequence.unwrap_or(0) + last_discontinuity + 1;

    PlaylistSnapshot {
        has_end_tag: latest.has_end_tag,
        playlist_type: latest.playlist_type,
        has_program_date_time: latest.has_program_date_time,
        ..curated.copy_with_updates(
            segments,
            curated.base_uri.clone(),
            latest.start_time_us,
            curated.end_media_sequence(),
            Some(discontinuity_sequence),
        )
    }
}

fn discontinuity_number(playlist: &PlaylistSnapshot) -> i64 {
    playlist.discontinuity_sequence.unwrap_or(0) as i64
}

/// Lays `segments` end to end from zero and lowers their discontinuity numbering by
/// `discontinuity_delta`.
fn clone_adjusted_segments(
    segments: impl Iterator<Item = Segment>,
    discontinuity_delta: u64,
) -> Vec<Segment> {
    let mut start_us = 0;
    segments
        .map(|segment| {
            let adjusted = segment.copy_with_updates(
                start_us,
                segment
                    .relative_discontinuity_sequence
                    .saturating_sub(discontinuity_delta),
            );
            start_us += segment.duration_us;
            adjusted
        })
        .collect()
}
