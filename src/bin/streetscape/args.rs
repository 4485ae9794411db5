use clap::{command, value_parser, Arg, ArgAction, ArgMatches, Command};
use std::{path::PathBuf, time::Duration};

use crate::validators::*;
use streetscape::{Config, FetchLimits, ImageParams, PartialFiles, SamplingParams};

const SEGMENTS_ARG: &str = "segments";
const OUTPUT_DIR_ARG: &str = "output_dir";
const DISTANCE_ARG: &str = "distance";
const NORMALIZED_ARG: &str = "normalized";
const NO_ENDS_ARG: &str = "no_ends";
const END_GAP_ARG: &str = "end_gap";
const HEADINGS_ARG: &str = "headings";
const SIZE_ARG: &str = "size";
const PAD_ARG: &str = "pad";
const PITCH_ARG: &str = "pitch";
const PREFIX_ARG: &str = "prefix";
const CONNECTIONS_ARG: &str = "max_connections";
const PARALLEL_FETCHES_ARG: &str = "num_parallel";
const TIMEOUT_ARG: &str = "timeout";
const REQUEST_RETRIES_ARG: &str = "num_retries";
const KEEP_PARTIAL_ARG: &str = "keep_partial";
const KEY_ARG: &str = "key";
const DRY_RUN_ARG: &str = "dry_run";

pub struct Args {
    pub segments: PathBuf,
    pub output_dir: PathBuf,
    pub sampling: SamplingParams,
    pub images: ImageParams,
    pub max_connections: usize,
    pub parallel_fetches: usize,
    pub timeout: Duration,
    pub retries: u8,
    pub keep_partial: bool,
    pub key: Option<String>,
    pub dry_run: bool,
}

impl std::convert::From<Args> for Config {
    fn from(args: Args) -> Self {
        let limits = FetchLimits {
            max_connections: args.max_connections,
            max_concurrent_requests: args.parallel_fetches,
            timeout: args.timeout,
            retries: args.retries,
            ..FetchLimits::default()
        };

        Self {
            sampling: args.sampling,
            images: args.images,
            metadata_limits: limits.clone(),
            download_limits: limits,
            partial_files: if args.keep_partial {
                PartialFiles::Keep
            } else {
                PartialFiles::Remove
            },
            output_folder: args.output_dir,
            api_key: args.key,
            ..Config::default()
        }
    }
}

fn value<T: Clone + Send + Sync + 'static>(matches: &ArgMatches, id: &str) -> T {
    matches
        .get_one::<T>(id)
        .cloned()
        .expect("argument has a default value")
}

impl Args {
    pub fn parse() -> Self {
        Self::from_matches(&cli().get_matches())
    }

    fn from_matches(matches: &ArgMatches) -> Self {
        let sampling = SamplingParams {
            distance: value(matches, DISTANCE_ARG),
            normalized: matches.get_flag(NORMALIZED_ARG),
            include_ends: !matches.get_flag(NO_ENDS_ARG),
            end_gap: value(matches, END_GAP_ARG),
        };

        let images = ImageParams {
            num_headings: value(matches, HEADINGS_ARG),
            image_size: value(matches, SIZE_ARG),
            heading_padding: value(matches, PAD_ARG),
            pitch: value(matches, PITCH_ARG),
            filename_prefix: value(matches, PREFIX_ARG),
            ..ImageParams::default()
        };

        Self {
            segments: value(matches, SEGMENTS_ARG),
            output_dir: value(matches, OUTPUT_DIR_ARG),
            sampling,
            images,
            max_connections: value(matches, CONNECTIONS_ARG),
            parallel_fetches: value(matches, PARALLEL_FETCHES_ARG),
            timeout: Duration::from_secs(value::<usize>(matches, TIMEOUT_ARG) as u64),
            retries: value::<usize>(matches, REQUEST_RETRIES_ARG).min(u8::MAX as usize) as u8,
            keep_partial: matches.get_flag(KEEP_PARTIAL_ARG),
            key: matches.get_one::<String>(KEY_ARG).cloned(),
            dry_run: matches.get_flag(DRY_RUN_ARG),
        }
    }
}

fn cli() -> Command {
    command!()
        .arg(
            Arg::new(SEGMENTS_ARG)
                .help("JSON file with the street segments: [{\"id\": .., \"coordinates\": [[lng, lat], ..], \"length\": ..}]")
                .required(true)
                .value_parser(value_parser!(PathBuf))
                .short('i')
                .long("segments"),
        )
        .arg(
            Arg::new(OUTPUT_DIR_ARG)
                .help("The folder to write images and reports to.")
                .default_value("output")
                .value_parser(value_parser!(PathBuf))
                .short('o')
                .long("output"),
        )
        .arg(
            Arg::new(DISTANCE_ARG)
                .help("Distance between grid points, in units of the segment length.")
                .value_parser(is_positive)
                .default_value("10")
                .short('d')
                .long("distance"),
        )
        .arg(
            Arg::new(NORMALIZED_ARG)
                .help("Interpret the distance as a fraction of each segment.")
                .action(ArgAction::SetTrue)
                .long("normalized"),
        )
        .arg(
            Arg::new(NO_ENDS_ARG)
                .help("Don't add both ends of every segment as grid points.")
                .action(ArgAction::SetTrue)
                .long("no-ends"),
        )
        .arg(
            Arg::new(END_GAP_ARG)
                .help("Grid points closer than this fraction to a segment end are dropped.")
                .value_parser(is_end_gap)
                .default_value("0.001")
                .long("end-gap"),
        )
        .arg(
            Arg::new(HEADINGS_ARG)
                .help("The amount of evenly spaced images taken per panorama.")
                .value_parser(value_parser!(u32).range(1..))
                .default_value("6")
                .long("headings"),
        )
        .arg(
            Arg::new(SIZE_ARG)
                .help("Edge length of the square images, in pixels.")
                .value_parser(value_parser!(u32).range(1..))
                .default_value("400")
                .long("size"),
        )
        .arg(
            Arg::new(PAD_ARG)
                .help("Degrees of field of view added on both sides of every image.")
                .value_parser(value_parser!(f64))
                .default_value("0")
                .allow_hyphen_values(true)
                .long("pad"),
        )
        .arg(
            Arg::new(PITCH_ARG)
                .help("Camera pitch in degrees.")
                .value_parser(is_angle)
                .default_value("-5")
                .allow_hyphen_values(true)
                .long("pitch"),
        )
        .arg(
            Arg::new(PREFIX_ARG)
                .help("Prefix of the image file names.")
                .default_value("image")
                .long("prefix"),
        )
        .arg(
            Arg::new(CONNECTIONS_ARG)
                .help("The maximum amount of open connections.")
                .value_parser(is_numeric_min(1))
                .default_value("100")
                .long("connections"),
        )
        .arg(
            Arg::new(PARALLEL_FETCHES_ARG)
                .help("The amount of requests in flight at once.")
                .value_parser(is_numeric_min(1))
                .default_value("20")
                .short('r')
                .long("rate"),
        )
        .arg(
            Arg::new(TIMEOUT_ARG)
                .help("Deadline (in seconds) for each batch of requests. Pass 0 for no deadline.")
                .value_parser(is_numeric_min(0))
                .default_value("0")
                .short('t')
                .long("timeout"),
        )
        .arg(
            Arg::new(REQUEST_RETRIES_ARG)
                .help("The amount of times to retry a failed HTTP request.")
                .value_parser(is_numeric_min(0))
                .default_value("0")
                .long("retries"),
        )
        .arg(
            Arg::new(KEEP_PARTIAL_ARG)
                .help("Keep the files of interrupted downloads instead of deleting them.")
                .action(ArgAction::SetTrue)
                .long("keep-partial"),
        )
        .arg(
            Arg::new(KEY_ARG)
                .help("Provider API key. Defaults to the GSV_API_KEY environment variable.")
                .short('k')
                .long("key"),
        )
        .arg(
            Arg::new(DRY_RUN_ARG)
                .help("Don't actually fetch anything, just determine how many requests would be made.")
                .action(ArgAction::SetTrue)
                .long("dry-run"),
        )
}
