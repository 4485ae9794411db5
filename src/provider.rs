use geo::Coord;
use reqwest::Url;

use crate::error::Error;
use crate::grid::MetadataRequest;

const METADATA_ENDPOINT: &str = "https://maps.googleapis.com/maps/api/streetview/metadata";
const IMAGE_ENDPOINT: &str = "https://maps.googleapis.com/maps/api/streetview";
const OUTDOOR: &str = "outdoor";

/// Endpoints of the street-level imagery provider.
#[derive(Clone, Debug, PartialEq)]
pub struct Provider {
    pub metadata_endpoint: String,
    pub image_endpoint: String,

    /// Value of the `source` filter sent with every request.
    pub source: String,
}

impl Default for Provider {
    fn default() -> Self {
        Self {
            metadata_endpoint: METADATA_ENDPOINT.to_owned(),
            image_endpoint: IMAGE_ENDPOINT.to_owned(),
            source: OUTDOOR.to_owned(),
        }
    }
}

/// `lat,lng` as the provider expects it.
pub(crate) fn format_location(c: Coord<f64>) -> String {
    format!("{},{}", c.y, c.x)
}

impl Provider {
    pub fn validate(&self) -> Result<(), Error> {
        parse_endpoint(&self.metadata_endpoint)?;
        parse_endpoint(&self.image_endpoint)?;
        Ok(())
    }

    /// URL of the metadata lookup for a grid point.
    pub fn metadata_url(&self, req: &MetadataRequest) -> Result<Url, Error> {
        let mut url = parse_endpoint(&self.metadata_endpoint)?;
        url.query_pairs_mut()
            .append_pair("location", &format_location(req.location))
            .append_pair("source", &self.source);
        Ok(url)
    }

    pub(crate) fn image_endpoint(&self) -> Result<Url, Error> {
        parse_endpoint(&self.image_endpoint)
    }
}

fn parse_endpoint(s: &str) -> Result<Url, Error> {
    let url = Url::parse(s).map_err(|e| Error::Config(format!("invalid endpoint {:?}: {}", s, e)))?;
    if url.cannot_be_a_base() {
        return Err(Error::Config(format!("invalid endpoint {:?}", s)));
    }
    Ok(url)
}
