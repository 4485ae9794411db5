use std::{cell::Cell, io, path::Path};

use futures::{prelude::*, stream::FuturesUnordered};
use indicatif::ProgressBar;
use reqwest::Url;
use tokio::{fs, io::AsyncWriteExt};
use tracing::{info, warn};

use crate::batch::{retrying, Deadline};
use crate::config::FetchLimits;
use crate::error::{Error, FetchError};
use crate::gate::AdmissionGate;
use crate::imagery::ImageRequest;
use crate::transport::Transport;

/// What happens to the file of a download that fails part-way.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum PartialFiles {
    /// Delete whatever was written.
    #[default]
    Remove,
    /// Leave the truncated file in place.
    Keep,
}

/// A download that did not complete.
#[derive(Debug)]
pub struct DownloadFailure {
    pub filename: String,
    pub error: FetchError,
}

#[derive(Debug, Default)]
pub struct DownloadReport {
    pub written: usize,
    pub bytes: u64,
    pub failures: Vec<DownloadFailure>,
}

/// Streams one body to `path`, truncating any existing file.
///
/// `touched` is set just before the file is opened so the caller knows
/// whether a failed attempt left anything on disk.
async fn save<T: Transport>(
    transport: &T,
    url: &Url,
    path: &Path,
    touched: &Cell<bool>,
) -> Result<u64, FetchError> {
    let mut body = transport.open(url).await?;

    touched.set(true);
    let mut file = fs::File::create(path).await?;

    let mut written = 0;
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;

    Ok(written)
}

async fn discard(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed removing partial file"),
    }
}

/// Downloads every request into `output_folder`.
///
/// Runs under the same discipline as the metadata lookups: admission gate,
/// batch deadline and independent failures. Bodies are written chunk by
/// chunk as they arrive. The folder must already exist.
pub async fn download_images<T: Transport>(
    transport: &T,
    requests: &[ImageRequest],
    output_folder: &Path,
    limits: &FetchLimits,
    partial: PartialFiles,
    progress: &ProgressBar,
) -> Result<DownloadReport, Error> {
    limits.validate()?;
    if !output_folder.is_dir() {
        return Err(Error::Config(format!(
            "output folder {} does not exist",
            output_folder.display()
        )));
    }

    let gate = AdmissionGate::new(limits.max_concurrent_requests);
    let deadline = Deadline::after(limits.timeout);
    let gate = &gate;

    let mut pending: FuturesUnordered<_> = requests
        .iter()
        .map(|req| async move {
            let path = output_folder.join(&req.filename);
            let touched = Cell::new(false);

            let res = deadline
                .run(async {
                    let _slot = gate.enter().await?;
                    retrying(limits.retries, limits.backoff, || {
                        save(transport, &req.url, &path, &touched)
                    })
                    .await
                })
                .await;

            if res.is_err() && touched.get() && partial == PartialFiles::Remove {
                discard(&path).await;
            }
            (req, res)
        })
        .collect();

    let mut report = DownloadReport::default();
    while let Some((req, res)) = pending.next().await {
        progress.inc(1);
        match res {
            Ok(bytes) => {
                report.written += 1;
                report.bytes += bytes;
            }
            Err(error) => {
                warn!(file = %req.filename, %error, "failed fetching image");
                report.failures.push(DownloadFailure {
                    filename: req.filename.clone(),
                    error,
                });
            }
        }
    }

    info!(
        written = report.written,
        failed = report.failures.len(),
        bytes = report.bytes,
        "{} images downloaded",
        report.written
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::fake::{FakeTransport, Reply};
    use std::time::Duration;

    fn request(i: usize) -> ImageRequest {
        ImageRequest {
            observation_id: i,
            pano_id: format!("p{}", i),
            heading: 0.0,
            fov: 90.0,
            url: Url::parse(&format!("https://img.test/{}", i)).unwrap(),
            filename: format!("image_{}_0.jpg", i),
        }
    }

    fn limits(timeout_ms: u64) -> FetchLimits {
        FetchLimits {
            timeout: Duration::from_millis(timeout_ms),
            ..FetchLimits::default()
        }
    }

    async fn download(
        transport: &FakeTransport,
        requests: &[ImageRequest],
        dir: &Path,
        limits: &FetchLimits,
        partial: PartialFiles,
    ) -> DownloadReport {
        download_images(transport, requests, dir, limits, partial, &ProgressBar::hidden())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn writes_chunks_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let req = request(0);
        let transport = FakeTransport::new().reply(
            &req.url,
            Reply::Chunks(vec![b"jp".to_vec(), b"eg".to_vec(), b"!".to_vec()]),
        );

        let report = download(&transport, &[req], dir.path(), &limits(0), PartialFiles::Remove).await;

        assert_eq!(report.written, 1);
        assert_eq!(report.bytes, 5);
        let written = std::fs::read(dir.path().join("image_0_0.jpg")).unwrap();
        assert_eq!(written, b"jpeg!");
    }

    #[tokio::test]
    async fn replaces_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        let req = request(0);
        std::fs::write(dir.path().join(&req.filename), b"an older, longer image").unwrap();
        let transport = FakeTransport::new().reply(&req.url, Reply::Body(b"new".to_vec()));

        download(&transport, &[req.clone()], dir.path(), &limits(0), PartialFiles::Remove).await;

        assert_eq!(std::fs::read(dir.path().join(&req.filename)).unwrap(), b"new");
    }

    #[tokio::test]
    async fn one_hanging_request_out_of_ten() {
        let dir = tempfile::tempdir().unwrap();
        let requests: Vec<ImageRequest> = (0..10).map(request).collect();

        let mut transport = FakeTransport::new();
        for req in &requests[..9] {
            transport = transport.reply(&req.url, Reply::Body(vec![0xff, 0xd8]));
        }
        let transport = transport.reply(&requests[9].url, Reply::Hang);

        let report = download(&transport, &requests, dir.path(), &limits(300), PartialFiles::Remove).await;

        assert_eq!(report.written, 9);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].filename, "image_9_0.jpg");
        assert!(report.failures[0].error.is_timeout());

        let files = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(files, 9);
    }

    #[tokio::test]
    async fn interrupted_download_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let req = request(0);
        let transport = FakeTransport::new().reply(&req.url, Reply::Stall(b"half".to_vec()));

        let report = download(&transport, &[req.clone()], dir.path(), &limits(200), PartialFiles::Remove).await;

        assert_eq!(report.written, 0);
        assert!(report.failures[0].error.is_timeout());
        assert!(!dir.path().join(&req.filename).exists());
    }

    #[tokio::test]
    async fn interrupted_download_can_be_kept() {
        let dir = tempfile::tempdir().unwrap();
        let req = request(0);
        let transport = FakeTransport::new().reply(&req.url, Reply::Stall(b"half".to_vec()));

        let report = download(&transport, &[req.clone()], dir.path(), &limits(200), PartialFiles::Keep).await;

        assert_eq!(report.failures.len(), 1);
        assert_eq!(std::fs::read(dir.path().join(&req.filename)).unwrap(), b"half");
    }

    #[tokio::test]
    async fn broken_transfer_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let req = request(0);
        let transport = FakeTransport::new().reply(&req.url, Reply::Broken(b"half".to_vec()));

        let report = download(&transport, &[req.clone()], dir.path(), &limits(0), PartialFiles::Remove).await;

        assert_eq!(report.failures.len(), 1);
        assert!(!dir.path().join(&req.filename).exists());
    }

    #[tokio::test]
    async fn refused_connection_keeps_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let req = request(0);
        std::fs::write(dir.path().join(&req.filename), b"from last run").unwrap();
        let transport = FakeTransport::new().reply(&req.url, Reply::Refused);

        let report = download(&transport, &[req.clone()], dir.path(), &limits(0), PartialFiles::Remove).await;

        assert_eq!(report.failures.len(), 1);
        assert_eq!(
            std::fs::read(dir.path().join(&req.filename)).unwrap(),
            b"from last run"
        );
    }

    #[tokio::test]
    async fn admission_gate_bounds_downloads() {
        let dir = tempfile::tempdir().unwrap();
        let requests: Vec<ImageRequest> = (0..12).map(request).collect();
        let mut transport = FakeTransport::new();
        for req in &requests {
            transport = transport.reply(&req.url, Reply::Body(b"x".to_vec()));
        }

        let limits = FetchLimits {
            max_concurrent_requests: 4,
            ..FetchLimits::default()
        };
        let report = download(&transport, &requests, dir.path(), &limits, PartialFiles::Remove).await;

        assert_eq!(report.written, 12);
        assert!(transport.peak() <= 4);
    }

    #[tokio::test]
    async fn missing_folder_is_rejected_up_front() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let transport = FakeTransport::new();

        let res = download_images(
            &transport,
            &[request(0)],
            &missing,
            &FetchLimits::default(),
            PartialFiles::Remove,
            &ProgressBar::hidden(),
        )
        .await;

        assert!(matches!(res, Err(Error::Config(_))));
        assert_eq!(transport.calls(), 0);
    }
}
