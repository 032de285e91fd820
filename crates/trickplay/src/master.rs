//! Master playlist variants and their augmentation with curated I-frame renditions.

use tracing::{debug, warn};
use url::Url;

use crate::curator::MIN_SUBSET;
use crate::error::Result;

/// Label given to the source I-frame variant the curated renditions are derived from.
pub const SOURCE_IFRAME_LABEL: &str = "iFrame_org";

/// Codec prefixes that identify a video track in a `CODECS` attribute.
const VIDEO_CODEC_PREFIXES: &[&str] = &[
    "avc1", "avc3", "hev1", "hvc1", "dvav", "dva1", "dvhe", "dvh1", "av01", "vp08", "vp09", "vp8",
    "vp9", "mp4v",
];

/// Structural description of a variant, as used for track selection.
#[derive(Debug, Clone, PartialEq)]
pub struct Format {
    /// Peak bitrate (`BANDWIDTH`)
    pub bitrate: u64,
    pub average_bitrate: Option<u64>,
    pub width: Option<u64>,
    pub height: Option<u64>,
    /// Declared frame rate. For I-frame renditions this is relative to the source rendition.
    pub frame_rate: Option<f32>,
    pub codecs: Option<String>,
    pub label: Option<String>,
    /// I-frame-only rendition
    pub trick_play: bool,
}

impl Format {
    pub fn has_video_codec(&self) -> bool {
        self.codecs.as_deref().is_some_and(|codecs| {
            codecs.split(',').any(|codec| {
                let codec = codec.trim().to_ascii_lowercase();
                VIDEO_CODEC_PREFIXES
                    .iter()
                    .any(|prefix| codec.starts_with(prefix))
            })
        })
    }

    pub fn is_video(&self) -> bool {
        self.trick_play || self.width.is_some() || self.has_video_codec()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variant {
    /// Absolute URL of the media playlist
    pub url: String,
    pub format: Format,
}

impl Variant {
    fn from_stream(base: &Url, stream: &m3u8_rs::VariantStream) -> Result<Self> {
        let url = base.join(&stream.uri)?;
        Ok(Self {
            url: url.to_string(),
            format: Format {
                bitrate: stream.bandwidth,
                average_bitrate: stream.average_bandwidth,
                width: stream.resolution.as_ref().map(|r| r.width),
                height: stream.resolution.as_ref().map(|r| r.height),
                frame_rate: stream.frame_rate.map(|rate| rate as f32),
                codecs: stream.codecs.clone(),
                label: None,
                trick_play: stream.is_i_frame,
            },
        })
    }
}

/// Resolves the variants of a parsed master playlist against `base_uri`.
pub fn variants_from_m3u8(
    base_uri: &str,
    playlist: &m3u8_rs::MasterPlaylist,
) -> Result<Vec<Variant>> {
    let base = Url::parse(base_uri)?;
    playlist
        .variants
        .iter()
        .map(|stream| Variant::from_stream(&base, stream))
        .collect()
}

/// Labels the source I-frame variants, offers one curated variant per subset factor derived from
/// the highest-bitrate I-frame variant and optionally drops audio-only variants.
pub fn augment_variants(
    variants: Vec<Variant>,
    subsets: &[usize],
    remove_audio_only: bool,
) -> Vec<Variant> {
    let mut augmented: Vec<Variant> = variants
        .into_iter()
        .map(|mut variant| {
            if variant.format.trick_play && variant.format.label.is_none() {
                // Unit rate; the real rate is measured once the playlist loads
                variant.format.label = Some(SOURCE_IFRAME_LABEL.to_string());
                variant.format.frame_rate = Some(1.0);
            }
            variant
        })
        .collect();

    if remove_audio_only && augmented.iter().any(|v| v.format.is_video()) {
        let before = augmented.len();
        augmented.retain(|v| v.format.is_video());
        if augmented.len() < before {
            debug!("Removed {} audio-only variants", before - augmented.len());
        }
    }

    let Some(source) = highest_bitrate_iframe(&augmented).cloned() else {
        return augmented;
    };

    for &subset in subsets {
        if subset < MIN_SUBSET {
            warn!("Skipping curated I-frame variant for subset factor {subset}");
            continue;
        }
        augmented.push(curated_variant(&source, subset));
    }
    augmented
}

/// The variant labelled [`SOURCE_IFRAME_LABEL`].
pub fn find_iframe_source(variants: &[Variant]) -> Option<&Variant> {
    variants
        .iter()
        .find(|v| v.format.label.as_deref() == Some(SOURCE_IFRAME_LABEL))
}

fn highest_bitrate_iframe(variants: &[Variant]) -> Option<&Variant> {
    variants
        .iter()
        .filter(|v| v.format.trick_play)
        .fold(None, |best: Option<&Variant>, v| match best {
            Some(best) if best.format.bitrate >= v.format.bitrate => Some(best),
            _ => Some(v),
        })
}

fn curated_variant(source: &Variant, subset: usize) -> Variant {
    let base = source.url.split('#').next().unwrap_or(&source.url);
    let bitrate = source.format.bitrate / subset as u64;
    Variant {
        url: format!("{base}#{subset}"),
        format: Format {
            bitrate,
            average_bitrate: Some(bitrate),
            frame_rate: Some(1.0 / subset as f32),
            label: Some(format!("iFrame_{subset}")),
            ..source.format.clone()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::parse_master;

    const MASTER_URI: &str = "https://cdn.example.com/live/master.m3u8";

    const MASTER: &str = r#"#EXTM3U
#EXT-X-STREAM-INF:BANDWIDTH=2000000,RESOLUTION=1280x720,CODECS="avc1.64001f,mp4a.40.2",FRAME-RATE=29.970
video/720p.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=800000,RESOLUTION=640x360,CODECS="avc1.4d401e,mp4a.40.2",FRAME-RATE=29.970
video/360p.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=64000,CODECS="mp4a.40.2"
audio/aac.m3u8
#EXT-X-I-FRAME-STREAM-INF:BANDWIDTH=150000,RESOLUTION=640x360,CODECS="avc1.4d401e",URI="iframe/360p.m3u8"
#EXT-X-I-FRAME-STREAM-INF:BANDWIDTH=300000,RESOLUTION=1280x720,CODECS="avc1.64001f",URI="iframe/720p.m3u8"
"#;

    #[test]
    fn test_variants_from_m3u8() {
        let variants = parse_master(MASTER_URI, MASTER);
        assert_eq!(variants.len(), 5);

        let first = &variants[0];
        assert_eq!(first.url, "https://cdn.example.com/live/video/720p.m3u8");
        assert_eq!(first.format.bitrate, 2_000_000);
        assert_eq!(first.format.width, Some(1280));
        assert!(!first.format.trick_play);

        let iframe = variants.iter().find(|v| v.format.trick_play).unwrap();
        assert_eq!(iframe.url, "https://cdn.example.com/live/iframe/360p.m3u8");
        assert_eq!(iframe.format.height, Some(360));
    }

    #[test]
    fn test_relative_base_uri_is_rejected() {
        let playlist = match m3u8_rs::parse_playlist_res(MASTER.as_bytes()) {
            Ok(m3u8_rs::Playlist::MasterPlaylist(playlist)) => playlist,
            _ => panic!("expected a master playlist"),
        };
        assert!(variants_from_m3u8("master.m3u8", &playlist).is_err());
    }

    #[test]
    fn test_augment_variants() {
        let variants = parse_master(MASTER_URI, MASTER);
        let augmented = augment_variants(variants, &[2, 3, 4, 5], true);

        // Audio-only variant dropped, four curated variants appended
        assert_eq!(augmented.len(), 8);
        assert!(augmented.iter().all(|v| v.format.is_video()));

        let labelled: Vec<&Variant> = augmented
            .iter()
            .filter(|v| v.format.label.as_deref() == Some(SOURCE_IFRAME_LABEL))
            .collect();
        assert_eq!(labelled.len(), 2);
        assert!(labelled.iter().all(|v| v.format.frame_rate == Some(1.0)));

        let curated: Vec<&Variant> = augmented[4..].iter().collect();
        let urls: Vec<&str> = curated.iter().map(|v| v.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://cdn.example.com/live/iframe/720p.m3u8#2",
                "https://cdn.example.com/live/iframe/720p.m3u8#3",
                "https://cdn.example.com/live/iframe/720p.m3u8#4",
                "https://cdn.example.com/live/iframe/720p.m3u8#5",
            ]
        );
        assert_eq!(curated[0].format.bitrate, 150_000);
        assert_eq!(curated[1].format.bitrate, 100_000);
        assert_eq!(curated[2].format.frame_rate, Some(0.25));
        assert_eq!(curated[3].format.label.as_deref(), Some("iFrame_5"));
        assert!(curated.iter().all(|v| v.format.trick_play));
        assert_eq!(curated[0].format.width, Some(1280));
    }

    #[test]
    fn test_find_iframe_source() {
        let variants = parse_master(MASTER_URI, MASTER);
        assert!(find_iframe_source(&variants).is_none());

        let augmented = augment_variants(variants, &[2], true);
        let source = find_iframe_source(&augmented).unwrap();
        assert!(source.format.trick_play);
        assert_eq!(source.url, "https://cdn.example.com/live/iframe/360p.m3u8");
    }

    #[test]
    fn test_keep_audio_only() {
        let variants = parse_master(MASTER_URI, MASTER);
        let augmented = augment_variants(variants, &[2, 3], false);
        assert_eq!(augmented.len(), 7);
        assert!(augmented.iter().any(|v| !v.format.is_video()));
    }

    #[test]
    fn test_audio_only_master_is_untouched() {
        let audio = r#"#EXTM3U
#EXT-X-STREAM-INF:BANDWIDTH=64000,CODECS="mp4a.40.2"
aac_64.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=128000,CODECS="mp4a.40.2"
aac_128.m3u8
"#;
        let variants = parse_master(MASTER_URI, audio);
        let augmented = augment_variants(variants.clone(), &[2, 3], true);
        assert_eq!(augmented, variants);
    }

    #[test]
    fn test_invalid_subsets_are_skipped() {
        let variants = parse_master(MASTER_URI, MASTER);
        let augmented = augment_variants(variants, &[0, 1, 3], true);
        assert_eq!(augmented.len(), 5);
        assert!(augmented[4].url.ends_with("#3"));
    }

    #[test]
    fn test_video_codec_detection() {
        let format = |codecs: &str| Format {
            bitrate: 1,
            average_bitrate: None,
            width: None,
            height: None,
            frame_rate: None,
            codecs: Some(codecs.to_string()),
            label: None,
            trick_play: false,
        };
        assert!(format("mp4a.40.2, hvc1.1.6.L93.90").is_video());
        assert!(format("AVC1.640028").is_video());
        assert!(!format("mp4a.40.2,ec-3").is_video());
    }
}
