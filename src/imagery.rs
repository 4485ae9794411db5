use std::collections::HashSet;

use maplit::hashmap;
use reqwest::Url;
use serde::{Serialize, Serializer};
use strfmt::strfmt;
use tracing::info;

use crate::error::Error;
use crate::metadata::ObservationPoint;
use crate::provider::{format_location, Provider};

/// File name layout of downloaded images. Supports the specifiers
/// `{prefix}`, `{id}`, `{heading}` and `{pano_id}`.
pub const DEFAULT_FILENAME_TEMPLATE: &str = "{prefix}_{id}_{heading}.jpg";

/// How to shoot each observation point.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageParams {
    /// Number of evenly spaced headings per observation point.
    pub num_headings: u32,

    /// Edge length of the square images, in pixels.
    pub image_size: u32,

    /// Extra field of view added on both sides of every shot, in degrees.
    pub heading_padding: f64,

    /// Camera pitch in degrees.
    pub pitch: f64,

    pub filename_prefix: String,

    pub filename_template: String,
}

impl Default for ImageParams {
    fn default() -> Self {
        Self {
            num_headings: 6,
            image_size: 400,
            heading_padding: 0.0,
            pitch: -5.0,
            filename_prefix: "image".to_owned(),
            filename_template: DEFAULT_FILENAME_TEMPLATE.to_owned(),
        }
    }
}

impl ImageParams {
    pub fn validate(&self) -> Result<(), Error> {
        if self.num_headings == 0 {
            return Err(Error::param("number of headings must be > 0"));
        }
        if self.image_size == 0 {
            return Err(Error::param("image size must be > 0"));
        }
        if !self.heading_padding.is_finite() {
            return Err(Error::param("heading padding must be finite"));
        }
        if !self.pitch.is_finite() {
            return Err(Error::param("pitch must be finite"));
        }
        self.filename(0, "pano", 0.0).map(|_| ())
    }

    /// Degrees between neighbouring headings.
    pub fn angle_step(&self) -> f64 {
        360.0 / f64::from(self.num_headings)
    }

    /// Field of view of a single shot.
    pub fn fov(&self) -> f64 {
        self.angle_step() + 2.0 * self.heading_padding
    }

    fn filename(&self, id: usize, pano_id: &str, heading: f64) -> Result<String, Error> {
        let vars = hashmap! {
            "prefix".to_owned() => self.filename_prefix.clone(),
            "id".to_owned() => id.to_string(),
            "heading".to_owned() => (heading as u32).to_string(),
            "pano_id".to_owned() => pano_id.replace(['/', '\\'], "_"),
        };

        let name = strfmt(&self.filename_template, &vars)
            .map_err(|e| Error::param(format!("failed formatting file name: {}", e)))?;

        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(Error::param(format!("{:?} is not a plain file name", name)));
        }
        Ok(name)
    }
}

/// One directional shot of an observation point.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ImageRequest {
    pub observation_id: usize,
    pub pano_id: String,
    pub heading: f64,
    pub fov: f64,
    #[serde(serialize_with = "url_str")]
    pub url: Url,
    pub filename: String,
}

fn url_str<S: Serializer>(url: &Url, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(url.as_str())
}

/// Builds `num_headings` image requests per observation point, headings
/// starting at 0° and spaced evenly.
///
/// # Example
/// ```rust
/// # use streetscape::{build_image_requests, ImageParams, ObservationPoint, Provider};
/// # use geo::Coord;
/// let point = ObservationPoint {
///     id: 3,
///     pano_id: "abc".into(),
///     location: Coord { x: -83.74, y: 42.28 },
///     date: None,
///     copyright: None,
///     segment_id: "1".into(),
///     point_index: 0,
/// };
/// let requests = build_image_requests(&[point], &ImageParams::default(), &Provider::default()).unwrap();
///
/// assert_eq!(requests.len(), 6);
/// assert_eq!(requests[1].filename, "image_3_60.jpg");
/// ```
pub fn build_image_requests(
    observations: &[ObservationPoint],
    params: &ImageParams,
    provider: &Provider,
) -> Result<Vec<ImageRequest>, Error> {
    params.validate()?;
    let endpoint = provider.image_endpoint()?;

    let step = params.angle_step();
    let fov = params.fov();
    let size = format!("{0}x{0}", params.image_size);

    let mut requests = Vec::with_capacity(observations.len() * params.num_headings as usize);
    let mut names = HashSet::with_capacity(requests.capacity());
    for obs in observations {
        let location = format_location(obs.location);

        for i in 0..params.num_headings {
            let heading = f64::from(i) * step;

            let mut url = endpoint.clone();
            url.query_pairs_mut()
                .append_pair("size", &size)
                .append_pair("heading", &heading.to_string())
                .append_pair("fov", &fov.to_string())
                .append_pair("pitch", &params.pitch.to_string())
                .append_pair("location", &location)
                .append_pair("source", &provider.source);

            let filename = params.filename(obs.id, &obs.pano_id, heading)?;
            if !names.insert(filename.clone()) {
                return Err(Error::param(format!(
                    "file name {:?} is rendered for more than one image, \
                     use fewer headings or a template with {{id}} and {{heading}}",
                    filename
                )));
            }

            requests.push(ImageRequest {
                observation_id: obs.id,
                pano_id: obs.pano_id.clone(),
                heading,
                fov,
                url,
                filename,
            });
        }
    }

    info!("Total {} urls created", requests.len());
    Ok(requests)
}
