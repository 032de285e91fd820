use std::fs;
use std::io::Write;
use std::path::Path;

use hls_trickplay::{
    CuratedUri, ParsedPlaylist, TrickPlayConfig, TrickPlayPlaylistParser, Variant,
};
use tracing::{debug, info, warn};

use crate::cli::{AugmentArgs, CurateArgs, FrameRateArgs};
use crate::error::AppError;

pub fn curate(args: CurateArgs) -> Result<(), AppError> {
    let config = TrickPlayConfig::builder()
        .subsets([args.subset])
        .tolerance_factor(args.tolerance_factor)
        .resync_policy(args.resync.into())
        .build();
    info!("{config}");

    let curated_uri = CuratedUri::parse(&format!("{}#{}", args.uri, args.subset))?
        .ok_or_else(|| AppError::InvalidInput(format!("cannot derive a curated URI from {}", args.uri)))?
        .to_string();

    if let Some(dir) = &args.output_dir {
        fs::create_dir_all(dir)?;
    }

    let mut parser = TrickPlayPlaylistParser::new(config);
    let mut stdout = std::io::stdout().lock();
    for (idx, file) in args.files.iter().enumerate() {
        let bytes = fs::read(file)?;
        let curated = parser.parse_media(&curated_uri, &bytes)?;
        info!(
            "{}: {} curated segments, media sequence {}, {:.3}s",
            file.display(),
            curated.segments.len(),
            curated.media_sequence,
            curated.duration_us() as f64 / 1_000_000.0
        );

        let text = curated.to_m3u8_bytes()?;
        match &args.output_dir {
            Some(dir) => {
                let path = dir.join(format!("curated_{idx}.m3u8"));
                fs::write(&path, &text)?;
                debug!("Wrote {}", path.display());
            }
            None => stdout.write_all(&text)?,
        }
    }
    Ok(())
}

pub fn augment(args: AugmentArgs) -> Result<(), AppError> {
    let config = TrickPlayConfig::builder()
        .subsets(args.subsets)
        .remove_audio_only_variants(!args.keep_audio_only)
        .build();
    info!("{config}");

    let mut parser = TrickPlayPlaylistParser::new(config);
    let variants = parse_master(&mut parser, &args.uri, &args.master)?;

    let mut stdout = std::io::stdout().lock();
    for variant in &variants {
        writeln!(stdout, "{}", describe(variant))?;
    }
    Ok(())
}

pub fn frame_rate(args: FrameRateArgs) -> Result<(), AppError> {
    let config = TrickPlayConfig::builder().subsets(args.subsets).build();
    let mut parser = TrickPlayPlaylistParser::new(config);
    let variants = parse_master(&mut parser, &args.master_uri, &args.master)?;

    for (uri, file) in &args.media {
        let bytes = fs::read(file)?;
        let snapshot = parser.parse_media(uri, &bytes)?;
        if !variants.iter().any(|v| v.url == snapshot.base_uri) {
            warn!("{} is not a variant of {}", uri, args.master_uri);
        }
    }

    let analyzer = parser.frame_rate_analyzer();
    let mut stdout = std::io::stdout().lock();
    for variant in variants.iter().filter(|v| v.format.trick_play) {
        let fps = analyzer
            .get_frame_rate_for(&variant.format)
            .map_or_else(|| "unknown".to_string(), |fps| format!("{fps:.3} fps"));
        writeln!(stdout, "{}\t{}", describe(variant), fps)?;
    }
    Ok(())
}

fn parse_master(
    parser: &mut TrickPlayPlaylistParser,
    uri: &str,
    file: &Path,
) -> Result<Vec<Variant>, AppError> {
    let bytes = fs::read(file)?;
    match parser.parse(uri, &bytes)? {
        ParsedPlaylist::Master(variants) => Ok(variants),
        ParsedPlaylist::Media(_) => Err(AppError::InvalidInput(format!(
            "{} is a media playlist, expected a master playlist",
            file.display()
        ))),
    }
}

fn describe(variant: &Variant) -> String {
    let format = &variant.format;
    let resolution = match (format.width, format.height) {
        (Some(width), Some(height)) => format!("{width}x{height}"),
        _ => "-".to_string(),
    };
    let frame_rate = format
        .frame_rate
        .map_or_else(|| "-".to_string(), |rate| format!("{rate:.3}"));
    format!(
        "{}\t{}\t{} bps\t{}\t{}\t{}",
        format.label.as_deref().unwrap_or("-"),
        if format.trick_play { "iframe" } else { "media" },
        format.bitrate,
        resolution,
        frame_rate,
        variant.url
    )
}
