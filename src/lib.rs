//! Sample points along a street network and collect panoramic street-level
//! imagery for them.
//!
//! The pipeline has three stages:
//!
//! 1. [`build_grid`] samples every street segment at a fixed distance,
//!    centering the points on the segment and optionally adding both ends.
//! 2. [`fetch_observations`] asks the imagery provider which grid points have
//!    a panorama nearby and deduplicates the answers by panorama id.
//! 3. [`build_image_requests`] and [`download_images`] shoot every panorama
//!    at evenly spaced headings and stream the images to disk.
//!
//! The network stages run many requests concurrently on a single task,
//! bounded by an admission gate, a connection cap and a batch deadline.
//! Individual failures are counted and reported, never raised.
//!
//! # Usage
//!
//! The `streetscape` binary reads segments from a JSON file. Set
//! `GSV_API_KEY` or pass `--key`.
//!
//! ```bash
//! streetscape \
//!   --segments ./streets.json \
//!   --distance 20 \
//!   --headings 4 \
//!   --output ./images \
//!   --rate 10
//! ```
//!
//! # Library Example
//! ```rust,no_run
//! use geo::line_string;
//! use streetscape::{pipeline, Config, Segment};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let streets = vec![Segment::with_length(
//!     "4243",
//!     line_string![(x: -83.7430, y: 42.2808), (x: -83.7416, y: 42.2808)],
//!     115.0,
//! )];
//!
//! let config = Config {
//!     output_folder: "./images".into(),
//!     api_key: Some("my-key".into()),
//!     ..Config::default()
//! };
//!
//! let outcome = pipeline::run(&config, &streets).await.expect("failed collecting imagery");
//! println!("{:?}", outcome.summary());
//! # }
//! ```

mod batch;
mod bearing;
mod config;
mod download;
mod error;
mod gate;
mod grid;
mod imagery;
mod metadata;
pub mod pipeline;
mod provider;
mod sampler;
mod segment;
mod transport;

pub use batch::progress_bar;
pub use bearing::azimuth;
pub use config::{ApiKey, Config, FetchLimits, API_KEY_ENV};
pub use download::{download_images, DownloadFailure, DownloadReport, PartialFiles};
pub use error::{Error, FetchError};
pub use gate::AdmissionGate;
pub use grid::{build_grid, Grid, GridPoint, MetadataRequest, SkippedSegment};
pub use imagery::{build_image_requests, ImageParams, ImageRequest, DEFAULT_FILENAME_TEMPLATE};
pub use metadata::{dedup_by_pano, fetch_observations, MetadataReport, ObservationPoint, PointFailure};
pub use provider::Provider;
pub use sampler::{sample, EndMarker, Sample, SamplingParams, MAX_SAMPLES_PER_SEGMENT};
pub use segment::{Located, Segment};
pub use transport::{Body, HttpTransport, Transport};
