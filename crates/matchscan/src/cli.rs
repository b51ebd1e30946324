use std::ffi::OsString;
use std::path::PathBuf;

use clap::parser::ValueSource;
use clap::{ArgMatches, CommandFactory, FromArgMatches, Parser};

use crate::pipeline::DEFAULT_STEP_SIZE;
use crate::stage::bbox::BoxPolicy;
use crate::stage::noise::{DEFAULT_MIN_MATCH_DURATION, NoisePolicy};
use crate::stage::refine::{DEFAULT_VOTES, RefineStrategy};

pub const DEFAULT_VIDEO_DIR: &str = "videos";
pub const DEFAULT_OUTPUT_DIR: &str = "output";

/// Which flags were typed on the command line rather than defaulted, so
/// config file values only replace defaults.
#[derive(Debug, Default)]
pub struct CliSources {
    pub step_size_from_cli: bool,
    pub video_dir_from_cli: bool,
    pub min_match_duration_from_cli: bool,
    pub noise_policy_from_cli: bool,
    pub bbox_policy_from_cli: bool,
    pub refine_strategy_from_cli: bool,
    pub votes_from_cli: bool,
    pub output_dir_from_cli: bool,
}

impl CliSources {
    fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            step_size_from_cli: value_from_cli(matches, "step_size"),
            video_dir_from_cli: value_from_cli(matches, "video_dir"),
            min_match_duration_from_cli: value_from_cli(matches, "min_match_duration"),
            noise_policy_from_cli: value_from_cli(matches, "noise_policy"),
            bbox_policy_from_cli: value_from_cli(matches, "bbox_policy"),
            refine_strategy_from_cli: value_from_cli(matches, "refine_strategy"),
            votes_from_cli: value_from_cli(matches, "votes"),
            output_dir_from_cli: value_from_cli(matches, "output_dir"),
        }
    }
}

fn value_from_cli(matches: &ArgMatches, id: &str) -> bool {
    matches
        .value_source(id)
        .is_some_and(|source| matches!(source, ValueSource::CommandLine))
}

pub fn parse_cli() -> (CliArgs, CliSources) {
    match parse_cli_from(std::env::args_os()) {
        Ok(parsed) => parsed,
        Err(err) => err.exit(),
    }
}

pub fn parse_cli_from<I, T>(args: I) -> Result<(CliArgs, CliSources), clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let matches = CliArgs::command().try_get_matches_from(args)?;
    let args = CliArgs::from_arg_matches(&matches)?;
    let sources = CliSources::from_matches(&matches);
    Ok((args, sources))
}

#[derive(Debug, Parser)]
#[command(
    name = "matchscan",
    about = "Find stage segments in a recorded match video",
    disable_help_subcommand = true
)]
pub struct CliArgs {
    /// Video file name, looked up inside --video_dir
    pub video_name: Option<String>,

    /// Save every sampled frame and each refined boundary frame as PNG
    #[arg(short = 's', long = "save_flag", alias = "save-flag")]
    pub save_flag: bool,

    /// Do not print the timeline plot and segment listing
    #[arg(short = 'H', long = "hide_flag", alias = "hide-flag")]
    pub hide_flag: bool,

    /// Frames between consecutive samples
    #[arg(
        long = "step_size",
        alias = "step-size",
        id = "step_size",
        default_value_t = DEFAULT_STEP_SIZE,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub step_size: u64,

    /// Directory that holds the input videos
    #[arg(long = "video_dir", alias = "video-dir", id = "video_dir", default_value = DEFAULT_VIDEO_DIR)]
    pub video_dir: PathBuf,

    /// Override the configuration file path
    #[arg(long = "config")]
    pub config: Option<PathBuf>,

    /// Lock decoding to a specific backend implementation
    #[arg(short = 'b', long = "backend")]
    pub backend: Option<String>,

    /// Print the list of available decoding backends
    #[arg(long = "list-backends")]
    pub list_backends: bool,

    /// Detection timeline (JSON) replayed by the timeline detector
    #[arg(long = "detections", value_name = "FILE")]
    pub detections: Option<PathBuf>,

    /// Restrict the label set (repeatable); defaults to the built-in stages
    #[arg(long = "label", id = "labels", value_name = "NAME")]
    pub labels: Vec<String>,

    /// Shortest run, in frames, kept as a match
    #[arg(
        long = "min-match-duration",
        id = "min_match_duration",
        default_value_t = DEFAULT_MIN_MATCH_DURATION
    )]
    pub min_match_duration: u64,

    /// What to do with runs shorter than --min-match-duration (drop, merge)
    #[arg(long = "noise-policy", id = "noise_policy", default_value_t = NoisePolicy::Drop)]
    pub noise_policy: NoisePolicy,

    /// How segment boxes are combined (average, highest-confidence)
    #[arg(long = "bbox-policy", id = "bbox_policy", default_value_t = BoxPolicy::Average)]
    pub bbox_policy: BoxPolicy,

    /// Boundary search (bisection, linear)
    #[arg(
        long = "refine-strategy",
        id = "refine_strategy",
        default_value_t = RefineStrategy::Bisection
    )]
    pub refine_strategy: RefineStrategy,

    /// Classifier queries per refinement probe
    #[arg(
        long = "votes",
        id = "votes",
        default_value_t = DEFAULT_VOTES,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub votes: u32,

    /// Cap on bisection probes per boundary
    #[arg(
        long = "max-probes",
        id = "max_probes",
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub max_probes: Option<u32>,

    /// Directory for saved frames and JSON output
    #[arg(long = "output-dir", id = "output_dir", default_value = DEFAULT_OUTPUT_DIR)]
    pub output_dir: PathBuf,

    /// Write history.json and segments.json into the output directory
    #[arg(long = "json")]
    pub json: bool,
}
