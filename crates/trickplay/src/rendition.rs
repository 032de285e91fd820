//! Routing of loaded playlists to the curated renditions they belong to.
//!
//! A curated rendition is addressed by its source I-frame playlist URL with the subset factor as
//! fragment (`https://host/iframe.m3u8#3`). The fragment never reaches the origin, so the body
//! loaded for that URI is the dense source playlist; [`TrickPlayPlaylistParser`] recognises the
//! fragment and hands back the curated playlist in its place.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use m3u8_rs::{Playlist, parse_playlist_res};
use tracing::debug;
use url::Url;

use crate::config::{CurationConfig, TrickPlayConfig};
use crate::curator::MIN_SUBSET;
use crate::engine::SmallestIFramesCurator;
use crate::error::{Result, TrickPlayError};
use crate::frame_rate::FrameRateAnalyzer;
use crate::master::{Variant, augment_variants, variants_from_m3u8};
use crate::model::PlaylistSnapshot;
use crate::validator::UpdateValidator;

/// URI of a curated rendition: source playlist URL plus subset factor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CuratedUri {
    pub source_uri: String,
    pub subset: usize,
}

impl CuratedUri {
    /// `Ok(None)` for URIs without a fragment.
    pub fn parse(uri: &str) -> Result<Option<Self>> {
        let mut url = Url::parse(uri)?;
        let Some(fragment) = url.fragment() else {
            return Ok(None);
        };
        let subset = fragment
            .parse::<usize>()
            .ok()
            .filter(|subset| *subset >= MIN_SUBSET)
            .ok_or_else(|| TrickPlayError::InvalidSubset(format!("{fragment} in {uri}")))?;
        url.set_fragment(None);
        Ok(Some(Self {
            source_uri: url.to_string(),
            subset,
        }))
    }
}

impl fmt::Display for CuratedUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.source_uri, self.subset)
    }
}

/// Curation state of one curated URI.
#[derive(Debug)]
pub struct CuratedRendition {
    uri: CuratedUri,
    engine: SmallestIFramesCurator,
    validator: UpdateValidator,
    previous_source: Option<PlaylistSnapshot>,
}

impl CuratedRendition {
    pub fn new(uri: CuratedUri, config: &CurationConfig) -> Self {
        Self {
            uri,
            engine: SmallestIFramesCurator::new(config),
            validator: UpdateValidator::new(config.timestamp_tolerance),
            previous_source: None,
        }
    }

    pub fn uri(&self) -> &CuratedUri {
        &self.uri
    }

    pub fn current(&self) -> Option<&PlaylistSnapshot> {
        self.engine.current()
    }

    /// Curates a freshly loaded snapshot of the source playlist.
    pub fn on_source_loaded(&mut self, source: PlaylistSnapshot) -> Result<PlaylistSnapshot> {
        let curated = match &self.previous_source {
            None => self.engine.generate_curated_playlist(
                &source,
                self.uri.subset,
                &self.uri.to_string(),
            )?,
            Some(previous) => {
                self.engine
                    .update_current_curated(&source, previous, self.uri.subset)?
            }
        };

        // Stale snapshots, and windows the engine could not follow, must not become the
        // reference for the next update
        let replace = !self.engine.is_stale()
            && self
                .previous_source
                .as_ref()
                .is_none_or(|previous| self.validator.is_newer(&source, previous));
        if replace {
            self.previous_source = Some(source);
        }
        Ok(curated)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParsedPlaylist {
    /// Augmented variant list of a master playlist
    Master(Vec<Variant>),
    /// Media playlist, curated when it was requested through a curated URI
    Media(PlaylistSnapshot),
}

/// Playlist parser front end that augments master playlists and curates I-frame playlists
/// requested through curated URIs.
///
/// Owns one [`CuratedRendition`] per curated URI; the [`FrameRateAnalyzer`] is shared so track
/// selection can read it from another thread.
#[derive(Debug)]
pub struct TrickPlayPlaylistParser {
    config: TrickPlayConfig,
    renditions: HashMap<String, CuratedRendition>,
    variants: Option<Vec<Variant>>,
    frame_rates: Arc<FrameRateAnalyzer>,
}

impl TrickPlayPlaylistParser {
    pub fn new(config: TrickPlayConfig) -> Self {
        Self {
            config,
            renditions: HashMap::new(),
            variants: None,
            frame_rates: Arc::new(FrameRateAnalyzer::new()),
        }
    }

    pub fn frame_rate_analyzer(&self) -> Arc<FrameRateAnalyzer> {
        Arc::clone(&self.frame_rates)
    }

    /// Variants of the last master playlist parsed, after augmentation.
    pub fn variants(&self) -> Option<&[Variant]> {
        self.variants.as_deref()
    }

    pub fn rendition(&self, uri: &str) -> Option<&CuratedRendition> {
        self.renditions.get(uri)
    }

    pub fn parse(&mut self, uri: &str, bytes: &[u8]) -> Result<ParsedPlaylist> {
        match parse_playlist_res(bytes) {
            Ok(Playlist::MasterPlaylist(playlist)) => {
                let variants = augment_variants(
                    variants_from_m3u8(uri, &playlist)?,
                    &self.config.subsets,
                    self.config.remove_audio_only_variants,
                );
                debug!("Master playlist {} offers {} variants", uri, variants.len());
                self.variants = Some(variants.clone());
                Ok(ParsedPlaylist::Master(variants))
            }
            Ok(Playlist::MediaPlaylist(playlist)) => {
                let snapshot = match CuratedUri::parse(uri)? {
                    Some(curated_uri) => {
                        let source = PlaylistSnapshot::from_m3u8(&curated_uri.source_uri, &playlist);
                        self.renditions
                            .entry(uri.to_string())
                            .or_insert_with(|| {
                                CuratedRendition::new(curated_uri, &self.config.curation)
                            })
                            .on_source_loaded(source)?
                    }
                    None => PlaylistSnapshot::from_m3u8(uri, &playlist),
                };

                if let Some(variants) = &self.variants {
                    self.frame_rates.record_update(variants, &snapshot);
                }
                Ok(ParsedPlaylist::Media(snapshot))
            }
            Err(e) => Err(TrickPlayError::ParseError(format!(
                "Failed to parse playlist {uri}: {e}"
            ))),
        }
    }

    /// Like [`Self::parse`], for callers that only expect media playlists.
    pub fn parse_media(&mut self, uri: &str, bytes: &[u8]) -> Result<PlaylistSnapshot> {
        match self.parse(uri, bytes)? {
            ParsedPlaylist::Media(snapshot) => Ok(snapshot),
            ParsedPlaylist::Master(_) => Err(TrickPlayError::UnexpectedPlaylist(format!(
                "Expected Media Playlist, got Master for {uri}"
            ))),
        }
    }
}
