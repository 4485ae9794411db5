use std::collections::{BTreeMap, HashSet};

use futures::{prelude::*, stream::FuturesUnordered};
use geo::Coord;
use indicatif::ProgressBar;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::batch::{retrying, Deadline};
use crate::config::FetchLimits;
use crate::error::{Error, FetchError};
use crate::gate::AdmissionGate;
use crate::grid::GridPoint;
use crate::provider::Provider;
use crate::transport::Transport;

const STATUS_OK: &str = "OK";

#[derive(Debug, Deserialize)]
struct MetadataResponse {
    status: String,
    location: Option<LatLng>,
    pano_id: Option<String>,
    date: Option<String>,
    copyright: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LatLng {
    lat: f64,
    lng: f64,
}

/// A location the provider confirmed to have panoramic imagery.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ObservationPoint {
    /// Position in the deduplicated collection.
    pub id: usize,
    pub pano_id: String,
    /// Where the panorama was taken; may differ from the grid point.
    pub location: Coord<f64>,
    pub date: Option<String>,
    pub copyright: Option<String>,
    /// Grid point the panorama was first found from.
    pub segment_id: String,
    pub point_index: usize,
}

/// A grid point whose lookup failed.
#[derive(Debug)]
pub struct PointFailure {
    pub segment_id: String,
    pub point_index: usize,
    pub error: FetchError,
}

/// Result of a metadata batch. Every requested grid point ends up as an
/// observation, an exclusion, a duplicate or a failure.
#[derive(Debug, Default)]
pub struct MetadataReport {
    pub observations: Vec<ObservationPoint>,
    pub requested: usize,
    /// Grid points without imagery, by provider status.
    pub excluded: BTreeMap<String, usize>,
    /// Grid points that resolved to an already found panorama.
    pub duplicates: usize,
    pub failures: Vec<PointFailure>,
}

impl MetadataReport {
    pub fn error_count(&self) -> usize {
        self.failures.len()
    }

    pub fn excluded_count(&self) -> usize {
        self.excluded.values().sum()
    }
}

enum Lookup {
    Found {
        pano_id: String,
        location: Coord<f64>,
        date: Option<String>,
        copyright: Option<String>,
    },
    NoImagery(String),
}

async fn lookup<T: Transport>(transport: &T, url: &Url) -> Result<Lookup, FetchError> {
    let body = transport.get(url).await?;
    let res: MetadataResponse = serde_json::from_slice(&body)?;

    if res.status != STATUS_OK {
        return Ok(Lookup::NoImagery(res.status));
    }

    let location = res
        .location
        .ok_or_else(|| FetchError::Malformed("OK response without location".to_owned()))?;
    let pano_id = res
        .pano_id
        .ok_or_else(|| FetchError::Malformed("OK response without pano_id".to_owned()))?;

    Ok(Lookup::Found {
        pano_id,
        location: Coord {
            x: location.lng,
            y: location.lat,
        },
        date: res.date,
        copyright: res.copyright,
    })
}

/// Keeps the first observation of every panorama, in order.
pub fn dedup_by_pano(points: Vec<ObservationPoint>) -> Vec<ObservationPoint> {
    let mut seen = HashSet::new();
    points
        .into_iter()
        .filter(|p| seen.insert(p.pano_id.clone()))
        .collect()
}

/// Asks the provider which grid points have imagery nearby.
///
/// At most `limits.max_concurrent_requests` lookups are in flight at once;
/// the whole batch is bounded by `limits.timeout`. Failed lookups are
/// reported, never propagated. The returned observations are in grid order,
/// deduplicated by panorama id.
pub async fn fetch_observations<T: Transport>(
    transport: &T,
    provider: &Provider,
    points: &[GridPoint],
    limits: &FetchLimits,
    progress: &ProgressBar,
) -> Result<MetadataReport, Error> {
    limits.validate()?;

    let urls = points
        .iter()
        .map(|p| provider.metadata_url(&p.metadata_request()))
        .collect::<Result<Vec<_>, _>>()?;

    let gate = AdmissionGate::new(limits.max_concurrent_requests);
    let deadline = Deadline::after(limits.timeout);
    let gate = &gate;

    let mut pending: FuturesUnordered<_> = urls
        .iter()
        .enumerate()
        .map(|(i, url)| async move {
            let res = deadline
                .run(async {
                    let _slot = gate.enter().await?;
                    retrying(limits.retries, limits.backoff, || lookup(transport, url)).await
                })
                .await;
            (i, res)
        })
        .collect();

    let mut settled = Vec::with_capacity(urls.len());
    while let Some(outcome) = pending.next().await {
        progress.inc(1);
        settled.push(outcome);
    }
    settled.sort_by_key(|(i, _)| *i);

    let mut report = MetadataReport {
        requested: points.len(),
        ..MetadataReport::default()
    };
    let mut found = Vec::new();

    for (i, res) in settled {
        let point = &points[i];
        match res {
            Ok(Lookup::Found {
                pano_id,
                location,
                date,
                copyright,
            }) => found.push(ObservationPoint {
                id: 0,
                pano_id,
                location,
                date,
                copyright,
                segment_id: point.segment_id.clone(),
                point_index: point.index,
            }),
            Ok(Lookup::NoImagery(status)) => {
                debug!(segment = %point.segment_id, index = point.index, %status, "no imagery");
                *report.excluded.entry(status).or_default() += 1;
            }
            Err(error) => {
                warn!(segment = %point.segment_id, index = point.index, %error, "metadata request failed");
                report.failures.push(PointFailure {
                    segment_id: point.segment_id.clone(),
                    point_index: point.index,
                    error,
                });
            }
        }
    }

    let total = found.len();
    let mut observations = dedup_by_pano(found);
    for (id, o) in observations.iter_mut().enumerate() {
        o.id = id;
    }
    report.duplicates = total - observations.len();
    report.observations = observations;

    info!(
        observations = report.observations.len(),
        excluded = report.excluded_count(),
        duplicates = report.duplicates,
        errors = report.error_count(),
        "{} observation points retrieved",
        report.observations.len()
    );

    Ok(report)
}
