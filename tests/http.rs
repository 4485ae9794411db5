use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use geo::line_string;
use indicatif::ProgressBar;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
};

use streetscape::*;

type Routes = HashMap<&'static str, (u16, Vec<u8>)>;

struct Server {
    base: String,
    /// Request targets in arrival order.
    seen: Arc<Mutex<Vec<String>>>,
    /// Most requests served at the same time.
    peak: Arc<AtomicUsize>,
}

async fn serve(routes: Routes) -> Server {
    serve_slowly(routes, Duration::ZERO).await
}

/// Minimal HTTP/1.1 responder serving canned bodies by path. Every request
/// is held for `delay` before it is answered.
async fn serve_slowly(routes: Routes, delay: Duration) -> Server {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let peak = Arc::new(AtomicUsize::new(0));
    let active = Arc::new(AtomicUsize::new(0));
    let routes = Arc::new(routes);

    let (log, max) = (Arc::clone(&seen), Arc::clone(&peak));
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let routes = Arc::clone(&routes);
            let log = Arc::clone(&log);
            let max = Arc::clone(&max);
            let active = Arc::clone(&active);

            tokio::spawn(async move {
                let mut head = Vec::new();
                let mut buf = [0u8; 1024];
                while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => head.extend_from_slice(&buf[..n]),
                    }
                }

                let head = String::from_utf8_lossy(&head);
                let target = head.split_whitespace().nth(1).unwrap_or("/").to_owned();
                log.lock().unwrap().push(target.clone());

                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                max.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(delay).await;
                // count drops before the reply goes out
                active.fetch_sub(1, Ordering::SeqCst);

                let path = target.split('?').next().unwrap_or("/");
                let (code, body) = routes.get(path).cloned().unwrap_or((404, Vec::new()));
                let reason = match code {
                    200 => "OK",
                    429 => "Too Many Requests",
                    _ => "Error",
                };

                let response = format!(
                    "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    code,
                    reason,
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.write_all(&body).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    Server {
        base: format!("http://{}", addr),
        seen,
        peak,
    }
}

fn point(i: usize) -> GridPoint {
    GridPoint {
        segment_id: "4243".to_owned(),
        index: i,
        marker: EndMarker::Interior,
        fraction: 0.0,
        location: geo::Coord {
            x: -83.7430 + i as f64 * 0.0001,
            y: 42.2808,
        },
        bearing: 90.0,
    }
}

fn limits() -> FetchLimits {
    FetchLimits {
        max_connections: 2,
        max_concurrent_requests: 4,
        timeout: Duration::from_secs(10),
        ..FetchLimits::default()
    }
}

fn provider(base: &str, image_path: &str) -> Provider {
    Provider {
        metadata_endpoint: format!("{}/metadata", base),
        image_endpoint: format!("{}{}", base, image_path),
        ..Provider::default()
    }
}

fn street() -> Vec<Segment> {
    vec![Segment::with_length(
        "4243",
        line_string![(x: -83.7430, y: 42.2808), (x: -83.7416, y: 42.2808)],
        40.0,
    )]
}

#[tokio::test]
async fn collects_imagery_over_http() {
    let mut routes = Routes::new();
    routes.insert(
        "/metadata",
        (
            200,
            br#"{"status":"OK","pano_id":"abc","location":{"lat":42.2808,"lng":-83.7423},"date":"2021-06"}"#
                .to_vec(),
        ),
    );
    routes.insert("/image", (200, vec![0xff, 0xd8, 0xff, 0xe0]));
    let server = serve(routes).await;

    let provider = provider(&server.base, "/image");
    let transport = HttpTransport::new(ApiKey::new("secret").unwrap(), &limits()).unwrap();

    let grid = build_grid(&street(), &SamplingParams::default()).unwrap();
    assert_eq!(grid.points.len(), 5);

    let report = fetch_observations(&transport, &provider, &grid.points, &limits(), &ProgressBar::hidden())
        .await
        .unwrap();
    assert_eq!(report.error_count(), 0);
    assert_eq!(report.observations.len(), 1);
    assert_eq!(report.duplicates, 4);
    assert_eq!(report.observations[0].date.as_deref(), Some("2021-06"));

    let params = ImageParams {
        num_headings: 4,
        ..ImageParams::default()
    };
    let requests = build_image_requests(&report.observations, &params, &provider).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let downloads = download_images(
        &transport,
        &requests,
        dir.path(),
        &limits(),
        PartialFiles::Remove,
        &ProgressBar::hidden(),
    )
    .await
    .unwrap();

    assert_eq!(downloads.written, 4);
    assert!(downloads.failures.is_empty());
    for heading in &[0, 90, 180, 270] {
        let file = dir.path().join(format!("image_0_{}.jpg", heading));
        assert_eq!(std::fs::read(file).unwrap(), vec![0xff, 0xd8, 0xff, 0xe0]);
    }

    let seen = server.seen.lock().unwrap();
    assert_eq!(seen.len(), 5 + 4);
    assert!(seen.iter().all(|t| t.contains("key=secret")));
    assert!(seen.iter().all(|t| t.contains("source=outdoor")));
}

#[tokio::test]
async fn http_errors_are_reported_per_file() {
    let server = serve(Routes::new()).await;
    let provider = provider(&server.base, "/missing");
    let transport = HttpTransport::new(ApiKey::new("secret").unwrap(), &limits()).unwrap();

    let observation = ObservationPoint {
        id: 0,
        pano_id: "abc".to_owned(),
        location: geo::Coord { x: -83.7423, y: 42.2808 },
        date: None,
        copyright: None,
        segment_id: "4243".to_owned(),
        point_index: 0,
    };
    let requests = build_image_requests(&[observation], &ImageParams::default(), &provider).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let downloads = download_images(
        &transport,
        &requests,
        dir.path(),
        &limits(),
        PartialFiles::Remove,
        &ProgressBar::hidden(),
    )
    .await
    .unwrap();

    assert_eq!(downloads.written, 0);
    assert_eq!(downloads.failures.len(), 6);
    assert!(downloads
        .failures
        .iter()
        .all(|f| matches!(f.error, FetchError::Status(s) if s.as_u16() == 404)));
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn open_connections_stay_under_the_cap() {
    let mut routes = Routes::new();
    routes.insert("/metadata", (200, br#"{"status":"ZERO_RESULTS"}"#.to_vec()));
    let server = serve_slowly(routes, Duration::from_millis(100)).await;

    let limits = FetchLimits {
        max_connections: 2,
        max_concurrent_requests: 8,
        timeout: Duration::from_secs(20),
        ..FetchLimits::default()
    };
    let provider = provider(&server.base, "/image");
    let transport = HttpTransport::new(ApiKey::new("secret").unwrap(), &limits).unwrap();

    let points: Vec<GridPoint> = (0..8).map(point).collect();
    let report = fetch_observations(&transport, &provider, &points, &limits, &ProgressBar::hidden())
        .await
        .unwrap();

    assert_eq!(report.excluded_count(), 8);
    assert_eq!(server.seen.lock().unwrap().len(), 8);
    let peak = server.peak.load(Ordering::SeqCst);
    assert!(peak >= 1 && peak <= 2, "{} requests served at once", peak);
}

#[tokio::test]
async fn endless_rate_limiting_fails_the_request() {
    let mut routes = Routes::new();
    routes.insert("/metadata", (429, Vec::new()));
    let server = serve(routes).await;

    let limits = FetchLimits {
        backoff: Duration::from_millis(5),
        rate_limit_waits: 3,
        ..FetchLimits::default()
    };
    let provider = provider(&server.base, "/image");
    let transport = HttpTransport::new(ApiKey::new("secret").unwrap(), &limits).unwrap();

    let report = tokio::time::timeout(
        Duration::from_secs(10),
        fetch_observations(&transport, &provider, &[point(0)], &limits, &ProgressBar::hidden()),
    )
    .await
    .expect("rate limited request never settled")
    .unwrap();

    assert!(report.observations.is_empty());
    assert_eq!(report.error_count(), 1);
    assert!(matches!(
        report.failures[0].error,
        FetchError::Status(s) if s.as_u16() == 429
    ));
    // first attempt plus one per wait
    assert_eq!(server.seen.lock().unwrap().len(), 4);
}

#[tokio::test]
async fn unread_body_holds_its_connection() {
    let mut routes = Routes::new();
    routes.insert("/image", (200, vec![0xff; 64]));
    let server = serve(routes).await;

    let limits = FetchLimits {
        max_connections: 1,
        ..FetchLimits::default()
    };
    let transport = HttpTransport::new(ApiKey::new("secret").unwrap(), &limits).unwrap();
    let url = reqwest::Url::parse(&format!("{}/image", server.base)).unwrap();

    let body = transport.open(&url).await.unwrap();
    let blocked = tokio::time::timeout(Duration::from_millis(200), transport.get(&url)).await;
    assert!(blocked.is_err());
    assert_eq!(server.seen.lock().unwrap().len(), 1);

    drop(body);
    let bytes = tokio::time::timeout(Duration::from_secs(10), transport.get(&url))
        .await
        .expect("connection was not released")
        .unwrap();
    assert_eq!(bytes.len(), 64);
}
