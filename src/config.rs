use std::{env, fmt, path::PathBuf, time::Duration};

use crate::download::PartialFiles;
use crate::error::Error;
use crate::imagery::ImageParams;
use crate::provider::Provider;
use crate::sampler::SamplingParams;

/// Environment variable the API key is read from when none is configured.
pub const API_KEY_ENV: &str = "GSV_API_KEY";

pub(crate) const BACKOFF_DELAY: Duration = Duration::from_secs(10);

/// Concurrency and deadline limits for one batch of requests.
#[derive(Clone, Debug, PartialEq)]
pub struct FetchLimits {
    /// Maximum number of simultaneously open connections.
    pub max_connections: usize,

    /// Maximum number of requests in flight at once.
    pub max_concurrent_requests: usize,

    /// Deadline for the whole batch.
    ///
    /// Pass the zero duration to disable the deadline.
    pub timeout: Duration,

    /// Timeout for a single request, independent of the batch deadline.
    ///
    /// Pass the zero duration to disable it.
    pub request_timeout: Duration,

    /// How many times to retry a request after a transport failure.
    pub retries: u8,

    /// Delay between retries, and the fallback when a rate-limited response
    /// carries no `Retry-After`.
    pub backoff: Duration,

    /// How many `429 Too Many Requests` responses a single request waits out
    /// before it fails with that status.
    pub rate_limit_waits: u8,
}

impl Default for FetchLimits {
    fn default() -> Self {
        Self {
            max_connections: 100,
            max_concurrent_requests: 20,
            timeout: Duration::ZERO,
            request_timeout: Duration::ZERO,
            retries: 0,
            backoff: BACKOFF_DELAY,
            rate_limit_waits: 6,
        }
    }
}

impl FetchLimits {
    pub fn validate(&self) -> Result<(), Error> {
        if self.max_connections == 0 {
            return Err(Error::param("max_connections must be > 0"));
        }
        if self.max_concurrent_requests == 0 {
            return Err(Error::param("max_concurrent_requests must be > 0"));
        }
        Ok(())
    }
}

/// Provider API key. Appended to every outgoing request.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Uses `explicit` if given, otherwise reads [`API_KEY_ENV`].
    pub fn resolve(explicit: Option<&str>) -> Result<Self, Error> {
        let key = match explicit {
            Some(k) => k.to_owned(),
            None => env::var(API_KEY_ENV).map_err(|_| {
                Error::Config(format!(
                    "no API key configured and {} is not set",
                    API_KEY_ENV
                ))
            })?,
        };

        Self::new(key)
    }

    pub fn new(key: impl Into<String>) -> Result<Self, Error> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(Error::Config("API key is empty".to_owned()));
        }
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// Pipeline configuration.
#[derive(Debug, PartialEq)]
pub struct Config {
    pub sampling: SamplingParams,

    pub images: ImageParams,

    pub provider: Provider,

    /// Limits for the metadata lookups.
    pub metadata_limits: FetchLimits,

    /// Limits for the image downloads.
    pub download_limits: FetchLimits,

    /// What to do with files of failed downloads.
    pub partial_files: PartialFiles,

    /// The folder to write images to.
    pub output_folder: PathBuf,

    /// API key. Falls back to [`API_KEY_ENV`] when unset.
    pub api_key: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sampling: SamplingParams::default(),
            images: ImageParams::default(),
            provider: Provider::default(),
            metadata_limits: FetchLimits::default(),
            download_limits: FetchLimits::default(),
            partial_files: PartialFiles::default(),
            output_folder: PathBuf::from("output"),
            api_key: None,
        }
    }
}

impl Config {
    /// Validates every option and resolves the API key.
    ///
    /// This is the only place credentials are looked up; nothing touches
    /// the network before it succeeds.
    pub fn validate(&self) -> Result<ApiKey, Error> {
        self.sampling.validate()?;
        self.images.validate()?;
        self.provider.validate()?;
        self.metadata_limits.validate()?;
        self.download_limits.validate()?;

        ApiKey::resolve(self.api_key.as_deref())
    }
}
