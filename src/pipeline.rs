use std::{collections::BTreeMap, path::Path};

use anyhow::{ensure, Context, Result};
use serde::Serialize;
use tokio::fs;

use crate::batch::progress_bar;
use crate::config::{ApiKey, Config};
use crate::download::{download_images, DownloadReport};
use crate::grid::{build_grid, Grid};
use crate::imagery::{build_image_requests, ImageRequest};
use crate::metadata::{fetch_observations, MetadataReport};
use crate::segment::Segment;
use crate::transport::{HttpTransport, Transport};

/// What a run would do, computed without touching the network.
#[derive(Debug, Serialize)]
pub struct Plan {
    pub grid_points: usize,
    pub skipped_segments: usize,
    /// Upper bound: one image per heading for every grid point.
    pub max_images: usize,
}

/// Everything a run produced.
#[derive(Debug)]
pub struct Outcome {
    pub grid: Grid,
    pub metadata: MetadataReport,
    pub requests: Vec<ImageRequest>,
    pub downloads: DownloadReport,
}

/// Counts reported after a run.
#[derive(Debug, PartialEq, Serialize)]
pub struct Summary {
    pub grid_points: usize,
    pub skipped_segments: usize,
    pub observations: usize,
    pub excluded: BTreeMap<String, usize>,
    pub duplicates: usize,
    pub metadata_errors: usize,
    pub images_requested: usize,
    pub images_written: usize,
    pub bytes_written: u64,
    pub download_failures: usize,
}

impl Outcome {
    pub fn summary(&self) -> Summary {
        Summary {
            grid_points: self.grid.points.len(),
            skipped_segments: self.grid.skipped.len(),
            observations: self.metadata.observations.len(),
            excluded: self.metadata.excluded.clone(),
            duplicates: self.metadata.duplicates,
            metadata_errors: self.metadata.error_count(),
            images_requested: self.requests.len(),
            images_written: self.downloads.written,
            bytes_written: self.downloads.bytes,
            download_failures: self.downloads.failures.len(),
        }
    }
}

/// Samples the network and counts what a run would request.
pub fn plan(cfg: &Config, segments: &[Segment]) -> Result<Plan> {
    cfg.images.validate()?;
    let grid = build_grid(segments, &cfg.sampling)?;

    Ok(Plan {
        grid_points: grid.points.len(),
        skipped_segments: grid.skipped.len(),
        max_images: grid.points.len() * cfg.images.num_headings as usize,
    })
}

/// Runs the whole pipeline against the configured provider.
///
/// Creates the output folder if required. Fails before any network
/// activity if the configuration is invalid or no API key is available.
pub async fn run(cfg: &Config, segments: &[Segment]) -> Result<Outcome> {
    let key: ApiKey = cfg.validate()?;

    let metadata = HttpTransport::new(key.clone(), &cfg.metadata_limits)?;
    let images = HttpTransport::new(key, &cfg.download_limits)?;

    run_with(cfg, segments, &metadata, &images).await
}

/// [`run`] with caller supplied transports for the two stages.
pub async fn run_with<M, I>(
    cfg: &Config,
    segments: &[Segment],
    metadata_transport: &M,
    image_transport: &I,
) -> Result<Outcome>
where
    M: Transport,
    I: Transport,
{
    let grid = build_grid(segments, &cfg.sampling)?;

    let pb = progress_bar(grid.points.len(), "metadata")?;
    let metadata = fetch_observations(
        metadata_transport,
        &cfg.provider,
        &grid.points,
        &cfg.metadata_limits,
        &pb,
    )
    .await?;
    pb.finish_and_clear();

    let requests = build_image_requests(&metadata.observations, &cfg.images, &cfg.provider)?;

    ensure_output_folder(&cfg.output_folder).await?;

    let pb = progress_bar(requests.len(), "images")?;
    let downloads = download_images(
        image_transport,
        &requests,
        &cfg.output_folder,
        &cfg.download_limits,
        cfg.partial_files,
        &pb,
    )
    .await?;
    pb.finish_and_clear();

    Ok(Outcome {
        grid,
        metadata,
        requests,
        downloads,
    })
}

async fn ensure_output_folder(output_folder: &Path) -> Result<()> {
    ensure!(
        !output_folder.exists() || output_folder.is_dir(),
        "output {} must be a directory",
        output_folder.display()
    );

    if !output_folder.exists() {
        fs::create_dir_all(output_folder)
            .await
            .context("failed to create root output directory")?;
    }

    Ok(())
}
