//! # HLS Trick-Play
//!
//! Curation of HLS I-frame-only playlists for trick-play (scrubbing, fast forward and rewind).
//!
//! A dense I-frame playlist carries one entry per key frame. For fast trick-play speeds that is far
//! more than a player can decode, so this crate derives sparser *curated* playlists that keep
//! roughly one frame out of every `subset`, preferring the smallest frames, and keeps them in step
//! with the live source playlist as it slides forward.
//!
//! ## Features
//!
//! - Playlist snapshot model on top of `m3u8-rs`, with conversion back to m3u8 text
//! - Live update checks (`is_newer_than` / `is_update_valid`)
//! - Smallest-frame window selection with duration re-timing
//! - Incremental curation that only processes appended segments
//! - Master playlist augmentation with one curated variant per subset factor
//! - Measured frame rates of I-frame renditions, safe to read from another thread
//!
//! ## License
//!
//! MIT License
//!

pub mod config;
pub mod curator;
pub mod engine;
pub mod error;
pub mod frame_rate;
pub mod master;
pub mod model;
pub mod rendition;
pub mod test_utils;
pub mod validator;

pub use config::{CurationConfig, ResyncPolicy, TrickPlayConfig};
pub use curator::SegmentCurator;
pub use engine::{PlaylistUpdates, SmallestIFramesCurator};
pub use error::{Result, TrickPlayError};
pub use frame_rate::{FormatKey, FrameRateAnalyzer};
pub use master::{Format, Variant, augment_variants, find_iframe_source};
pub use model::{ByteRange, PlaylistSnapshot, PlaylistType, Segment, SegmentId};
pub use rendition::{CuratedRendition, CuratedUri, ParsedPlaylist, TrickPlayPlaylistParser};
pub use validator::UpdateValidator;
