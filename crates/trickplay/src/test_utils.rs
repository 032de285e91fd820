//! Helpers shared by the unit tests: tracing setup and synthetic playlists.

#[cfg(test)]
use crate::master::{Variant, variants_from_m3u8};
use crate::model::{PlaylistSnapshot, Segment};

/// Macro to initialize tracing for tests
///
/// Usage:
/// - `init_test_tracing!()` - uses DEBUG level (default)
/// - `init_test_tracing!(INFO)` - uses specified level
#[macro_export]
macro_rules! init_test_tracing {
    () => {
        $crate::init_test_tracing!(DEBUG);
    };
    ($level:ident) => {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::$level)
            .with_test_writer()
            .try_init();
    };
}

pub use crate::init_test_tracing;

/// Parses m3u8 text that must be a media playlist.
#[cfg(test)]
pub fn parse_media(uri: &str, text: &str) -> PlaylistSnapshot {
    match m3u8_rs::parse_playlist_res(text.as_bytes()) {
        Ok(m3u8_rs::Playlist::MediaPlaylist(playlist)) => PlaylistSnapshot::from_m3u8(uri, &playlist),
        Ok(m3u8_rs::Playlist::MasterPlaylist(_)) => panic!("expected a media playlist"),
        Err(e) => panic!("failed to parse media playlist: {e}"),
    }
}

/// Parses m3u8 text that must be a master playlist.
#[cfg(test)]
pub fn parse_master(uri: &str, text: &str) -> Vec<Variant> {
    match m3u8_rs::parse_playlist_res(text.as_bytes()) {
        Ok(m3u8_rs::Playlist::MasterPlaylist(playlist)) => {
            variants_from_m3u8(uri, &playlist).expect("variant URIs resolve")
        }
        Ok(m3u8_rs::Playlist::MediaPlaylist(_)) => panic!("expected a master playlist"),
        Err(e) => panic!("failed to parse master playlist: {e}"),
    }
}

/// Segment for absolute media sequence `sequence`, identified by its own URL.
pub fn segment(sequence: u64, length: u64, duration_us: u64) -> Segment {
    Segment::new(format!("seg_{sequence}.ts"), duration_us).with_byte_range(0, length)
}

/// `count` equally sized, equally long segments starting at `media_sequence`.
pub fn uniform_playlist(
    uri: &str,
    media_sequence: u64,
    count: usize,
    duration_us: u64,
) -> PlaylistSnapshot {
    let segments = (0..count as u64)
        .map(|i| segment(media_sequence + i, 1000, duration_us))
        .collect();
    PlaylistSnapshot::new(uri, media_sequence, segments)
}

/// One segment per entry of `lengths`, each `duration_us` long.
pub fn sized_playlist(
    uri: &str,
    media_sequence: u64,
    lengths: &[u64],
    duration_us: u64,
) -> PlaylistSnapshot {
    let segments = lengths
        .iter()
        .enumerate()
        .map(|(i, length)| segment(media_sequence + i as u64, *length, duration_us))
        .collect();
    PlaylistSnapshot::new(uri, media_sequence, segments)
}

/// Sum of segment durations.
pub fn total_duration(segments: &[Segment]) -> u64 {
    segments.iter().map(|s| s.duration_us).sum()
}

/// Asserts `relative_start[i + 1] == relative_start[i] + duration[i]`.
pub fn assert_contiguous(segments: &[Segment]) {
    for pair in segments.windows(2) {
        assert_eq!(
            pair[1].relative_start_time_us,
            pair[0].end_time_us(),
            "gap between {} and {}",
            pair[0].url,
            pair[1].url
        );
    }
}
