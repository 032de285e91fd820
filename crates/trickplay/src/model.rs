//! # Playlist Model
//!
//! Immutable snapshot of one fetch of an HLS media playlist, in the shape every other module
//! works with. Snapshots are produced from the `m3u8-rs` object model and converted back into it
//! when a curated playlist has to be served.
//!
//! All times are microseconds. Derived playlists are built with the `copy_with_*` constructors,
//! never by mutating a snapshot in place.

use chrono::{DateTime, Utc};
use m3u8_rs::MediaSegment;
use std::collections::HashMap;

pub const MICROS_PER_SECOND: u64 = 1_000_000;

/// Converts an `#EXTINF` duration in seconds to microseconds.
#[inline]
pub fn secs_to_us(secs: f32) -> u64 {
    if secs <= 0.0 {
        return 0;
    }
    (secs as f64 * MICROS_PER_SECOND as f64).round() as u64
}

#[inline]
pub fn us_to_secs(us: u64) -> f32 {
    (us as f64 / MICROS_PER_SECOND as f64) as f32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByteRange {
    pub offset: u64,
    pub length: u64,
}

/// The part of a segment that identifies it across playlist snapshots: where its bytes live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SegmentId<'a> {
    pub url: &'a str,
    pub byte_range: Option<ByteRange>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaylistType {
    Event,
    Vod,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub url: String,
    pub byte_range: Option<ByteRange>,
    pub duration_us: u64,
    /// Offset from the start of the playlist.
    pub relative_start_time_us: u64,
    /// Number of discontinuities before this segment within the playlist.
    pub relative_discontinuity_sequence: u64,
    pub title: Option<String>,
}

impl Segment {
    pub fn new(url: impl Into<String>, duration_us: u64) -> Self {
        Self {
            url: url.into(),
            byte_range: None,
            duration_us,
            relative_start_time_us: 0,
            relative_discontinuity_sequence: 0,
            title: None,
        }
    }

    pub fn with_byte_range(mut self, offset: u64, length: u64) -> Self {
        self.byte_range = Some(ByteRange { offset, length });
        self
    }

    #[inline]
    pub fn id(&self) -> SegmentId<'_> {
        SegmentId {
            url: &self.url,
            byte_range: self.byte_range,
        }
    }

    /// Same URL and byte range.
    #[inline]
    pub fn is_same_media(&self, other: &Segment) -> bool {
        self.id() == other.id()
    }

    /// Byte-range length, if the playlist declares one.
    #[inline]
    pub fn byte_range_length(&self) -> Option<u64> {
        self.byte_range.map(|range| range.length)
    }

    #[inline]
    pub fn end_time_us(&self) -> u64 {
        self.relative_start_time_us + self.duration_us
    }

    pub fn copy_with_duration(&self, duration_us: u64) -> Self {
        Self {
            duration_us,
            ..self.clone()
        }
    }

    pub fn copy_with_updates(
        &self,
        relative_start_time_us: u64,
        relative_discontinuity_sequence: u64,
    ) -> Self {
        Self {
            relative_start_time_us,
            relative_discontinuity_sequence,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistSnapshot {
    pub base_uri: String,
    pub segments: Vec<Segment>,
    /// Absolute index of the first segment.
    pub media_sequence: u64,
    /// `None` when the playlist does not carry `#EXT-X-DISCONTINUITY-SEQUENCE`.
    pub discontinuity_sequence: Option<u64>,
    /// Absolute stream time of the first segment (epoch micros when program-date-time is known).
    pub start_time_us: i64,
    pub has_program_date_time: bool,
    pub target_duration_us: u64,
    pub playlist_type: Option<PlaylistType>,
    pub has_end_tag: bool,
    pub i_frames_only: bool,
    pub version: Option<usize>,
}

impl PlaylistSnapshot {
    /// Builds a snapshot from an ordered segment list, assigning contiguous relative start times.
    /// Discontinuity numbering on the segments is kept as given.
    pub fn new(base_uri: impl Into<String>, media_sequence: u64, segments: Vec<Segment>) -> Self {
        let mut start = 0;
        let segments = segments
            .into_iter()
            .map(|segment| {
                let relative_start = start;
                start += segment.duration_us;
                Segment {
                    relative_start_time_us: relative_start,
                    ..segment
                }
            })
            .collect::<Vec<_>>();
        let target_duration_us = max_duration_secs(&segments) * MICROS_PER_SECOND;

        Self {
            base_uri: base_uri.into(),
            segments,
            media_sequence,
            discontinuity_sequence: None,
            start_time_us: 0,
            has_program_date_time: false,
            target_duration_us,
            playlist_type: None,
            has_end_tag: false,
            i_frames_only: false,
            version: None,
        }
    }

    /// Converts a playlist handed over by the parser.
    pub fn from_m3u8(base_uri: impl Into<String>, playlist: &m3u8_rs::MediaPlaylist) -> Self {
        let mut segments = Vec::with_capacity(playlist.segments.len());
        let mut relative_start_time_us = 0u64;
        let mut relative_discontinuity_sequence = 0u64;
        let mut start_time_us = None;
        // Next implicit byte-range offset, per resource.
        let mut next_offsets: HashMap<&str, u64> = HashMap::new();

        for media_segment in &playlist.segments {
            if media_segment.discontinuity {
                relative_discontinuity_sequence += 1;
            }

            let byte_range = media_segment.byte_range.as_ref().map(|range| {
                let offset = range.offset.unwrap_or_else(|| {
                    next_offsets
                        .get(media_segment.uri.as_str())
                        .copied()
                        .unwrap_or(0)
                });
                next_offsets.insert(media_segment.uri.as_str(), offset + range.length);
                ByteRange {
                    offset,
                    length: range.length,
                }
            });

            if start_time_us.is_none() {
                if let Some(pdt) = media_segment.program_date_time {
                    start_time_us = Some(pdt.timestamp_micros() - relative_start_time_us as i64);
                }
            }

            let duration_us = secs_to_us(media_segment.duration);
            segments.push(Segment {
                url: media_segment.uri.clone(),
                byte_range,
                duration_us,
                relative_start_time_us,
                relative_discontinuity_sequence,
                title: media_segment.title.clone(),
            });
            relative_start_time_us += duration_us;
        }

        let playlist_type = match playlist.playlist_type {
            Some(m3u8_rs::MediaPlaylistType::Event) => Some(PlaylistType::Event),
            Some(m3u8_rs::MediaPlaylistType::Vod) => Some(PlaylistType::Vod),
            _ => None,
        };

        Self {
            base_uri: base_uri.into(),
            segments,
            media_sequence: playlist.media_sequence,
            discontinuity_sequence: (playlist.discontinuity_sequence > 0)
                .then_some(playlist.discontinuity_sequence),
            start_time_us: start_time_us.unwrap_or(0),
            has_program_date_time: start_time_us.is_some(),
            target_duration_us: playlist.target_duration * MICROS_PER_SECOND,
            playlist_type,
            has_end_tag: playlist.end_list,
            i_frames_only: playlist.i_frames_only,
            version: playlist.version,
        }
    }

    /// Converts back into the parser's object model so the playlist can be written out.
    pub fn to_m3u8(&self) -> m3u8_rs::MediaPlaylist {
        let first_pdt = self.program_date_time().map(|time| time.fixed_offset());

        let mut previous_discontinuity = 0;
        let segments = self
            .segments
            .iter()
            .enumerate()
            .map(|(idx, segment)| {
                let discontinuity = segment.relative_discontinuity_sequence > previous_discontinuity;
                previous_discontinuity = segment.relative_discontinuity_sequence;
                MediaSegment {
                    uri: segment.url.clone(),
                    duration: us_to_secs(segment.duration_us),
                    title: segment.title.clone(),
                    byte_range: segment.byte_range.map(|range| m3u8_rs::ByteRange {
                        length: range.length,
                        offset: Some(range.offset),
                    }),
                    discontinuity,
                    program_date_time: if idx == 0 { first_pdt } else { None },
                    ..MediaSegment::empty()
                }
            })
            .collect();

        let target_duration_secs = self
            .target_duration_us
            .div_ceil(MICROS_PER_SECOND)
            .max(max_duration_secs(&self.segments));

        m3u8_rs::MediaPlaylist {
            version: self.version,
            target_duration: target_duration_secs,
            media_sequence: self.media_sequence,
            segments,
            discontinuity_sequence: self.discontinuity_sequence.unwrap_or(0),
            end_list: self.has_end_tag,
            playlist_type: self.playlist_type.map(|kind| match kind {
                PlaylistType::Event => m3u8_rs::MediaPlaylistType::Event,
                PlaylistType::Vod => m3u8_rs::MediaPlaylistType::Vod,
            }),
            i_frames_only: self.i_frames_only,
            ..Default::default()
        }
    }

    /// Serializes the snapshot as m3u8 text.
    pub fn to_m3u8_bytes(&self) -> std::io::Result<Vec<u8>> {
        let mut out = Vec::new();
        self.to_m3u8().write_to(&mut out)?;
        Ok(out)
    }

    /// Total duration covered by the segments.
    #[inline]
    pub fn duration_us(&self) -> u64 {
        self.segments.last().map_or(0, Segment::end_time_us)
    }

    #[inline]
    pub fn has_discontinuity_sequence(&self) -> bool {
        self.discontinuity_sequence.is_some()
    }

    /// Absolute media sequence number one past the last segment.
    #[inline]
    pub fn end_media_sequence(&self) -> u64 {
        self.media_sequence + self.segments.len() as u64
    }

    pub fn copy_with_updates(
        &self,
        segments: Vec<Segment>,
        base_uri: impl Into<String>,
        start_time_us: i64,
        media_sequence: u64,
        discontinuity_sequence: Option<u64>,
    ) -> Self {
        Self {
            base_uri: base_uri.into(),
            segments,
            start_time_us,
            media_sequence,
            discontinuity_sequence,
            ..self.clone()
        }
    }

    /// Program-date-time of the first segment, when known.
    pub fn program_date_time(&self) -> Option<DateTime<Utc>> {
        if !self.has_program_date_time {
            return None;
        }
        DateTime::from_timestamp_micros(self.start_time_us)
    }
}

/// Longest segment duration rounded up to whole seconds.
fn max_duration_secs(segments: &[Segment]) -> u64 {
    segments
        .iter()
        .map(|segment| segment.duration_us.div_ceil(MICROS_PER_SECOND))
        .max()
        .unwrap_or(0)
}
