//! # Frame Rate Analyzer
//!
//! Measures the frame rate actually delivered by I-frame-only renditions. Each I-frame segment is
//! one frame, so the rate is the segment count over the playlist duration.
//!
//! Curated variants declare their frame rate as a fraction of the source rendition (see
//! [`crate::master::augment_variants`]), so one measurement is enough to estimate the rate of
//! every other I-frame variant before its playlist has loaded.
//!
//! Updates arrive from the playlist-loading thread while track selection reads from another
//! thread; the table sits behind a single [`parking_lot::Mutex`] that is only held for the
//! lookup or insert itself.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::master::{Format, SOURCE_IFRAME_LABEL, Variant};
use crate::model::{MICROS_PER_SECOND, PlaylistSnapshot};

/// Projection of a [`Format`] onto the fields that survive the player re-wrapping it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FormatKey {
    pub bitrate: u64,
    pub width: Option<u64>,
    pub height: Option<u64>,
    frame_rate_bits: Option<u32>,
}

impl FormatKey {
    pub fn new(format: &Format) -> Self {
        Self {
            bitrate: format.bitrate,
            width: format.width,
            height: format.height,
            frame_rate_bits: format.frame_rate.map(f32::to_bits),
        }
    }

    pub fn frame_rate(&self) -> Option<f32> {
        self.frame_rate_bits.map(f32::from_bits)
    }
}

impl From<&Format> for FormatKey {
    fn from(format: &Format) -> Self {
        Self::new(format)
    }
}

#[derive(Debug, Clone, Copy)]
struct MeasuredRate {
    /// Declared rate relative to the source rendition
    multiplier: Option<f32>,
    fps: f32,
}

#[derive(Debug, Default)]
pub struct FrameRateAnalyzer {
    frame_rates: Mutex<HashMap<FormatKey, MeasuredRate>>,
}

impl FrameRateAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the frame rate of `playlist` if it belongs to an I-frame-only variant.
    ///
    /// Returns false when no variant has the playlist's URL.
    pub fn record_update(&self, variants: &[Variant], playlist: &PlaylistSnapshot) -> bool {
        let Some(variant) = variants.iter().find(|v| v.url == playlist.base_uri) else {
            warn!(
                "Playlist {} not found among the master playlist variants",
                playlist.base_uri
            );
            return false;
        };
        if !variant.format.trick_play {
            return true;
        }

        let Some(fps) = analyze_frame_rate(playlist) else {
            warn!(
                "Skipping frame rate of empty playlist {} ({} bps)",
                playlist.base_uri, variant.format.bitrate
            );
            return true;
        };

        let key = FormatKey::new(&variant.format);
        let measured = MeasuredRate {
            multiplier: frame_rate_multiplier(&variant.format),
            fps,
        };
        let previous = self.frame_rates.lock().insert(key, measured);
        if previous.is_none() {
            debug!(
                "Initial frame rate of {:.3} fps for {} ({} bps, {:?}x{:?})",
                fps, variant.url, key.bitrate, key.width, key.height
            );
        }
        true
    }

    /// Measured frame rate of `format`, or an estimate scaled from any other measured variant,
    /// or the declared rate when nothing has been measured yet.
    pub fn get_frame_rate_for(&self, format: &Format) -> Option<f32> {
        let key = FormatKey::new(format);
        let (exact, other) = {
            let frame_rates = self.frame_rates.lock();
            (
                frame_rates.get(&key).copied(),
                frame_rates.values().next().copied(),
            )
        };

        if let Some(measured) = exact {
            return Some(measured.fps);
        }
        match other {
            Some(measured) => {
                let ratio = frame_rate_multiplier(format)? / measured.multiplier?;
                Some(measured.fps * ratio)
            }
            None => format.frame_rate,
        }
    }

    pub fn len(&self) -> usize {
        self.frame_rates.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.frame_rates.lock().is_empty()
    }
}

/// Frames per second of an I-frame-only playlist, `None` when it covers no time.
pub fn analyze_frame_rate(playlist: &PlaylistSnapshot) -> Option<f32> {
    let total_duration_us: u64 = playlist.segments.iter().map(|s| s.duration_us).sum();
    if total_duration_us == 0 {
        return None;
    }
    let frames = playlist.segments.len() as f64;
    Some((frames * MICROS_PER_SECOND as f64 / total_duration_us as f64) as f32)
}

fn frame_rate_multiplier(format: &Format) -> Option<f32> {
    if format.label.as_deref() == Some(SOURCE_IFRAME_LABEL) {
        Some(1.0)
    } else {
        format.frame_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::master::augment_variants;
    use crate::model::Segment;
    use crate::test_utils::parse_master;
    use std::sync::Arc;
    use std::thread;

    const MASTER_URI: &str = "https://example.com/hls/master.m3u8";
    const SOURCE_URI: &str = "https://example.com/hls/test_playlist.m3u8";

    const MASTER: &str = r#"#EXTM3U
#EXT-X-VERSION:5
#EXT-X-STREAM-INF:BANDWIDTH=2160000,CODECS="mp4a.40.2,avc1.64001f",RESOLUTION=720x480
dummy.m3u8
#EXT-X-I-FRAME-STREAM-INF:BANDWIDTH=1373400,URI="test_playlist.m3u8",CODECS="avc1.640020",RESOLUTION=1280x720
"#;

    fn variants() -> Vec<Variant> {
        augment_variants(parse_master(MASTER_URI, MASTER), &[2], true)
    }

    fn base_format() -> Format {
        Format {
            bitrate: 1_373_400,
            average_bitrate: None,
            width: Some(1280),
            height: Some(720),
            frame_rate: Some(1.0),
            codecs: None,
            label: None,
            trick_play: true,
        }
    }

    fn second_format() -> Format {
        Format {
            bitrate: 1_373_400 / 2,
            frame_rate: Some(0.5),
            ..base_format()
        }
    }

    fn playlist(uri: &str, durations_us: impl IntoIterator<Item = u64>) -> PlaylistSnapshot {
        let segments = durations_us
            .into_iter()
            .enumerate()
            .map(|(i, duration)| Segment::new(format!("frame_{i}.ts"), duration))
            .collect();
        PlaylistSnapshot::new(uri, 0, segments)
    }

    fn two_second_frames(uri: &str) -> PlaylistSnapshot {
        playlist(uri, std::iter::repeat_n(2_000_000, 10))
    }

    fn three_second_frames(uri: &str) -> PlaylistSnapshot {
        playlist(
            uri,
            (0..10).map(|i| if i % 2 == 0 { 2_000_000 } else { 4_000_000 }),
        )
    }

    #[test]
    fn test_format_key() {
        let key = FormatKey::new(&base_format());
        assert_ne!(key, FormatKey::new(&second_format()));

        // Only the structural fields take part
        let relabelled = Format {
            label: Some("iFrame_org".to_string()),
            average_bitrate: Some(1),
            codecs: Some("avc1.640020".to_string()),
            ..base_format()
        };
        assert_eq!(key, FormatKey::from(&relabelled));
        assert_eq!(key.frame_rate(), Some(1.0));
    }

    #[test]
    fn test_analyze_frame_rate() {
        assert_eq!(analyze_frame_rate(&two_second_frames(SOURCE_URI)), Some(0.5));
        let fps = analyze_frame_rate(&three_second_frames(SOURCE_URI)).unwrap();
        assert!((fps - 0.333).abs() < 0.001);
        assert_eq!(analyze_frame_rate(&playlist(SOURCE_URI, Vec::new())), None);
    }

    #[test]
    fn test_nothing_measured_returns_declared_rate() {
        let analyzer = FrameRateAnalyzer::new();
        assert_eq!(analyzer.get_frame_rate_for(&base_format()), Some(1.0));
        let undeclared = Format {
            frame_rate: None,
            ..base_format()
        };
        assert_eq!(analyzer.get_frame_rate_for(&undeclared), None);
    }

    #[test]
    fn test_measured_rates() {
        crate::init_test_tracing!();
        let variants = variants();
        assert_eq!(variants.len(), 3);

        let analyzer = FrameRateAnalyzer::new();
        assert!(analyzer.record_update(&variants, &two_second_frames(SOURCE_URI)));
        let curated_uri = format!("{SOURCE_URI}#2");
        assert!(analyzer.record_update(&variants, &three_second_frames(&curated_uri)));
        assert_eq!(analyzer.len(), 2);

        assert_eq!(analyzer.get_frame_rate_for(&base_format()), Some(0.5));
        let fps = analyzer.get_frame_rate_for(&second_format()).unwrap();
        assert!((fps - 0.333).abs() < 0.001);
    }

    #[test]
    fn test_estimate_from_other_variant() {
        let analyzer = FrameRateAnalyzer::new();
        assert!(analyzer.record_update(&variants(), &two_second_frames(SOURCE_URI)));

        assert_eq!(analyzer.get_frame_rate_for(&base_format()), Some(0.5));
        // Declared at half the measured variant's rate
        assert_eq!(analyzer.get_frame_rate_for(&second_format()), Some(0.25));

        let double = Format {
            bitrate: 42,
            frame_rate: Some(2.0),
            ..base_format()
        };
        assert_eq!(analyzer.get_frame_rate_for(&double), Some(1.0));
    }

    #[test]
    fn test_unmatched_and_non_iframe_playlists() {
        let analyzer = FrameRateAnalyzer::new();
        let variants = variants();

        assert!(!analyzer.record_update(
            &variants,
            &two_second_frames("https://example.com/hls/unknown.m3u8")
        ));
        assert!(analyzer.record_update(
            &variants,
            &two_second_frames("https://example.com/hls/dummy.m3u8")
        ));
        assert!(analyzer.record_update(&variants, &playlist(SOURCE_URI, Vec::new())));
        assert!(analyzer.is_empty());
    }

    #[test]
    fn test_concurrent_update_and_lookup() {
        let analyzer = Arc::new(FrameRateAnalyzer::new());
        let variants = Arc::new(variants());

        let writer = {
            let analyzer = Arc::clone(&analyzer);
            let variants = Arc::clone(&variants);
            thread::spawn(move || {
                for i in 0..200u64 {
                    let duration = if i % 2 == 0 { 2_000_000 } else { 4_000_000 };
                    let playlist = playlist(SOURCE_URI, std::iter::repeat_n(duration, 10));
                    assert!(analyzer.record_update(&variants, &playlist));
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let analyzer = Arc::clone(&analyzer);
                thread::spawn(move || {
                    for _ in 0..200 {
                        let fps = analyzer.get_frame_rate_for(&second_format()).unwrap();
                        assert!(fps == 0.5 || fps == 0.25 || fps == 0.125);
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(analyzer.get_frame_rate_for(&base_format()), Some(0.25));
    }
}
