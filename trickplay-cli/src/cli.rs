use clap::{Args, Parser, Subcommand, ValueEnum};
use hls_trickplay::ResyncPolicy;
use hls_trickplay::config::DEFAULT_SUBSETS;
use hls_trickplay::curator::DEFAULT_TOLERANCE_FACTOR;
use std::path::PathBuf;

/// Define CLI arguments
#[derive(Parser)]
#[command(
    version,
    about = "HLS I-frame trick-play curation tool",
    long_about = "Curates dense HLS I-frame-only playlists into sparse trick-play renditions.\n\
                  \n\
                  Playlists are read from files, so live updates can be replayed offline:\n\
                  pass successive snapshots of the same I-frame playlist in fetch order."
)]
pub struct CliArgs {
    /// Enable verbose logging
    #[arg(short, long, global = true, help = "Enable detailed debug logging")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Curate successive snapshots of one I-frame playlist
    Curate(CurateArgs),

    /// Print the variants of a master playlist after adding curated I-frame renditions
    Augment(AugmentArgs),

    /// Measure the frame rate of I-frame renditions from media playlist snapshots
    FrameRate(FrameRateArgs),
}

#[derive(Args)]
pub struct CurateArgs {
    /// Subset factor: keep about one frame out of this many
    #[arg(short, long, help = "Keep about one I-frame out of every N (N >= 2)")]
    pub subset: usize,

    /// URL the snapshots were loaded from
    #[arg(
        short,
        long,
        default_value = "http://localhost/iframe.m3u8",
        help = "Absolute URL of the source I-frame playlist"
    )]
    pub uri: String,

    /// Output directory for curated playlists
    #[arg(
        short,
        long,
        help = "Write curated_<n>.m3u8 files here instead of printing them"
    )]
    pub output_dir: Option<PathBuf>,

    #[arg(
        long,
        default_value_t = DEFAULT_TOLERANCE_FACTOR,
        help = "Selection margin around each window position, as a fraction of the subset"
    )]
    pub tolerance_factor: f64,

    #[arg(
        long,
        value_enum,
        default_value_t = ResyncMode::Full,
        help = "What to do when an update no longer continues the previous snapshot"
    )]
    pub resync: ResyncMode,

    /// Snapshots of the source playlist, oldest first
    #[arg(required = true, help = "Media playlist snapshots in fetch order")]
    pub files: Vec<PathBuf>,
}

#[derive(Args)]
pub struct AugmentArgs {
    #[arg(
        long,
        value_delimiter = ',',
        default_values_t = DEFAULT_SUBSETS,
        help = "Comma separated subset factors to offer"
    )]
    pub subsets: Vec<usize>,

    #[arg(long, help = "Keep audio-only variants")]
    pub keep_audio_only: bool,

    #[arg(long, help = "Absolute URL the master playlist was loaded from")]
    pub uri: String,

    /// Master playlist file
    pub master: PathBuf,
}

#[derive(Args)]
pub struct FrameRateArgs {
    #[arg(long, help = "Master playlist file")]
    pub master: PathBuf,

    #[arg(long, help = "Absolute URL the master playlist was loaded from")]
    pub master_uri: String,

    #[arg(
        long,
        value_delimiter = ',',
        default_values_t = DEFAULT_SUBSETS,
        help = "Comma separated subset factors to offer"
    )]
    pub subsets: Vec<usize>,

    /// Media playlist snapshots as URI=FILE
    #[arg(
        long = "media",
        value_parser = parse_media_arg,
        help = "Media playlist snapshot as URI=FILE, repeatable"
    )]
    pub media: Vec<(String, PathBuf)>,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ResyncMode {
    /// Curate the whole new window
    Full,
    /// Keep serving the previous curated playlist
    KeepStale,
}

impl From<ResyncMode> for ResyncPolicy {
    fn from(mode: ResyncMode) -> Self {
        match mode {
            ResyncMode::Full => ResyncPolicy::FullResync,
            ResyncMode::KeepStale => ResyncPolicy::KeepStale,
        }
    }
}

fn parse_media_arg(value: &str) -> Result<(String, PathBuf), String> {
    let (uri, file) = value
        .rsplit_once('=')
        .ok_or_else(|| format!("expected URI=FILE, got '{value}'"))?;
    if uri.is_empty() || file.is_empty() {
        return Err(format!("expected URI=FILE, got '{value}'"));
    }
    Ok((uri.to_string(), PathBuf::from(file)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_media_arg() {
        let (uri, file) = parse_media_arg("http://host/iframe.m3u8#3=snap.m3u8").unwrap();
        assert_eq!(uri, "http://host/iframe.m3u8#3");
        assert_eq!(file, PathBuf::from("snap.m3u8"));

        let (uri, file) =
            parse_media_arg("https://cdn.example.com/iframe.m3u8?token=abc=#2=snap 1.m3u8").unwrap();
        assert_eq!(uri, "https://cdn.example.com/iframe.m3u8?token=abc=#2");
        assert_eq!(file, PathBuf::from("snap 1.m3u8"));

        assert!(parse_media_arg("snap.m3u8").is_err());
        assert!(parse_media_arg("=snap.m3u8").is_err());
    }

    #[test]
    fn test_cli_parsing() {
        let args = CliArgs::try_parse_from([
            "trickplay", "-v", "curate", "--subset", "4", "a.m3u8", "b.m3u8",
        ])
        .unwrap();
        assert!(args.verbose);
        let Command::Curate(curate) = args.command else {
            panic!("expected curate");
        };
        assert_eq!(curate.subset, 4);
        assert_eq!(curate.files.len(), 2);
        assert!(matches!(curate.resync, ResyncMode::Full));

        let args = CliArgs::try_parse_from([
            "trickplay",
            "augment",
            "--subsets",
            "2,8",
            "--uri",
            "http://host/master.m3u8",
            "master.m3u8",
        ])
        .unwrap();
        let Command::Augment(augment) = args.command else {
            panic!("expected augment");
        };
        assert_eq!(augment.subsets, vec![2, 8]);
        assert!(!augment.keep_audio_only);
    }
}
