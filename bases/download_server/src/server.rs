// bases/download_server/src/server.rs
use crate::api::{
    CancelResponse, DeletedResponse, DownloadItem, DownloadsResponse, InfoResponse,
    ProgressResponse, StartedResponse, StatsBody, StatsResponse, UrlRequest,
};
use crate::config::Config;
use crate::error::ApiError;
use askama::Template;
use axum::{
    body::Body,
    extract::{rejection::JsonRejection, Path, State},
    http::header,
    response::{
        sse::{Event, KeepAlive, Sse},
        Html, IntoResponse, Response,
    },
    routing::{delete, get, post},
    Json, Router,
};
use download_orchestrator::{JobId, Orchestrator};
use futures::Stream;
use media_downloader::AudioFormat;
use std::convert::Infallible;
use std::path::Path as FsPath;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::{info, warn};

/// Application state shared across handlers
#[derive(Clone)]
struct AppState {
    orchestrator: Orchestrator,
}

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate {
    downloads: Vec<DownloadItem>,
    stats: StatsBody,
}

/// How a library file is handed to the browser
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    Inline,
    Attachment,
}

pub fn router(orchestrator: Orchestrator, static_dir: &FsPath) -> Router {
    let state = AppState { orchestrator };

    Router::new()
        .route("/", get(index))
        .route("/info", post(get_info))
        .route("/download", post(start_download))
        .route("/progress/:id", get(get_progress))
        .route("/progress/:id/events", get(progress_events))
        .route("/cancel/:id", post(cancel))
        .route("/downloads", get(list_downloads))
        .route("/download-file/:filename", get(download_file))
        .route("/play-audio/:filename", get(play_audio))
        .route("/delete/:filename", delete(delete_file))
        .route("/stats", get(stats))
        .nest_service("/static", ServeDir::new(static_dir))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP server until ctrl-c
pub async fn run(config: Config, orchestrator: Orchestrator) -> color_eyre::Result<()> {
    let shutdown = CancellationToken::new();
    let sweeper = orchestrator.spawn_sweeper(shutdown.clone());
    let app = router(orchestrator, &config.static_dir);

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on http://{}", addr);
    info!("Library directory: {}", config.library_dir.display());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    shutdown.cancel();
    sweeper.await?;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Could not listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
}

fn parse_job_id(raw: &str) -> Result<JobId, ApiError> {
    raw.parse().map_err(|_| ApiError::not_found("Download not found"))
}

fn url_from(body: Result<Json<UrlRequest>, JsonRejection>) -> Result<String, ApiError> {
    let Json(request) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    if request.url.trim().is_empty() {
        return Err(ApiError::bad_request("No URL provided"));
    }
    Ok(request.url)
}

async fn index(State(state): State<AppState>) -> Result<Html<String>, ApiError> {
    let template = IndexTemplate {
        downloads: state
            .orchestrator
            .list_library()
            .await
            .into_iter()
            .map(DownloadItem::from)
            .collect(),
        stats: state.orchestrator.stats().await.into(),
    };

    let html = template
        .render()
        .map_err(|e| ApiError::internal(e.to_string()))?;
    Ok(Html(html))
}

async fn get_info(
    State(state): State<AppState>,
    body: Result<Json<UrlRequest>, JsonRejection>,
) -> Result<Json<InfoResponse>, ApiError> {
    let url = url_from(body)?;
    let report = state.orchestrator.get_info(&url).await?;
    Ok(Json(report.into()))
}

async fn start_download(
    State(state): State<AppState>,
    body: Result<Json<UrlRequest>, JsonRejection>,
) -> Result<Json<StartedResponse>, ApiError> {
    let url = url_from(body)?;
    let id = state.orchestrator.start_download(&url).await?;
    Ok(Json(StartedResponse::new(id)))
}

async fn get_progress(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ProgressResponse>, ApiError> {
    let id = parse_job_id(&id)?;
    let job = state.orchestrator.get_progress(&id)?;
    Ok(Json(ProgressResponse::from(&job)))
}

/// Push the job snapshot on every change until it reaches a terminal state
async fn progress_events(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let id = parse_job_id(&id)?;
    let mut updates = state.orchestrator.watch_progress(&id)?;

    let stream = async_stream::stream! {
        loop {
            let job = updates.borrow_and_update().clone();
            match Event::default().event("progress").json_data(ProgressResponse::from(&job)) {
                Ok(event) => yield Ok(event),
                Err(e) => {
                    warn!("Could not encode progress for job {}: {}", id, e);
                    break;
                }
            }
            if job.is_terminal() || updates.changed().await.is_err() {
                break;
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CancelResponse>, ApiError> {
    let id = parse_job_id(&id)?;
    let cancelled = state.orchestrator.cancel(&id)?;
    Ok(Json(CancelResponse {
        success: true,
        cancelled,
    }))
}

async fn list_downloads(State(state): State<AppState>) -> Json<DownloadsResponse> {
    let downloads = state
        .orchestrator
        .list_library()
        .await
        .into_iter()
        .map(DownloadItem::from)
        .collect();
    Json(DownloadsResponse {
        success: true,
        downloads,
    })
}

async fn download_file(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    serve_file(&state, &filename, Disposition::Attachment).await
}

async fn play_audio(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    serve_file(&state, &filename, Disposition::Inline).await
}

async fn serve_file(
    state: &AppState,
    filename: &str,
    disposition: Disposition,
) -> Result<Response, ApiError> {
    let (entry, file) = state.orchestrator.fetch_file(filename).await?;

    let mime = AudioFormat::from_path(FsPath::new(&entry.filename))
        .map(|format| format.mime_type())
        .unwrap_or("application/octet-stream");
    let disposition = match disposition {
        Disposition::Inline => "inline".to_string(),
        Disposition::Attachment => {
            format!("attachment; filename=\"{}\"", header_safe(&entry.filename))
        }
    };

    let headers = [
        (header::CONTENT_TYPE, mime.to_string()),
        (header::CONTENT_LENGTH, entry.size.bytes().to_string()),
        (header::CONTENT_DISPOSITION, disposition),
    ];
    Ok((headers, Body::from_stream(ReaderStream::new(file))).into_response())
}

/// Quoted-string safe rendition of a filename for Content-Disposition
fn header_safe(filename: &str) -> String {
    filename
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii() && !c.is_ascii_control() => c,
            _ => '_',
        })
        .collect()
}

async fn delete_file(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Json<DeletedResponse>, ApiError> {
    state.orchestrator.delete_file(&filename).await?;
    Ok(Json(DeletedResponse {
        success: true,
        message: "File deleted",
    }))
}

async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        success: true,
        stats: state.orchestrator.stats().await.into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::http::{Method, Request, StatusCode};
    use download_orchestrator::OrchestratorConfig;
    use media_downloader::{
        DownloadError, MediaFetcher, MediaId, MediaInfo, MediaResolver, ProgressSender, Transcoder,
    };
    use media_library::LibraryStore;
    use serde_json::Value;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;
    use time_primitives::MediaDuration;
    use tower::ServiceExt;
    use url::Url;

    struct StubTools;

    #[async_trait]
    impl MediaResolver for StubTools {
        async fn resolve(&self, url: &Url) -> Result<MediaInfo, DownloadError> {
            let media_id = MediaId::probe(url)
                .ok_or_else(|| DownloadError::ResolutionFailed("Unsupported URL".into()))?;
            Ok(MediaInfo {
                title: "Never Gonna".into(),
                uploader: None,
                duration: MediaDuration::from_secs(213),
                thumbnail_url: None,
                view_count: None,
                webpage_url: url.to_string(),
                media_id,
            })
        }
    }

    #[async_trait]
    impl MediaFetcher for StubTools {
        async fn fetch(
            &self,
            _url: &Url,
            work_dir: &std::path::Path,
            progress: ProgressSender,
        ) -> Result<PathBuf, DownloadError> {
            let _ = progress.send(100.0);
            let path = work_dir.join("source.webm");
            tokio::fs::write(&path, b"opus").await?;
            Ok(path)
        }
    }

    #[async_trait]
    impl Transcoder for StubTools {
        fn format(&self) -> AudioFormat {
            AudioFormat::Mp3
        }

        async fn transcode(
            &self,
            _input: &std::path::Path,
            output: &std::path::Path,
            _duration: MediaDuration,
            _progress: ProgressSender,
        ) -> Result<(), DownloadError> {
            tokio::fs::write(output, b"ID3 fake mp3").await?;
            Ok(())
        }
    }

    const FILENAME: &str = "Never Gonna [youtube-dQw4w9WgXcQ].mp3";
    const URL: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";

    async fn app() -> (Router, TempDir) {
        let dir = TempDir::new().unwrap();
        let library = Arc::new(LibraryStore::open(dir.path().join("downloads")).await.unwrap());
        let tools = Arc::new(StubTools);
        let orchestrator = Orchestrator::new(
            OrchestratorConfig::default(),
            library,
            tools.clone(),
            tools.clone(),
            tools,
        );
        (router(orchestrator, dir.path()), dir)
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> Response {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                request = request.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        app.clone().oneshot(request.body(body).unwrap()).await.unwrap()
    }

    async fn json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn download(app: &Router) -> String {
        download_job(app).await.1
    }

    async fn download_job(app: &Router) -> (String, String) {
        let response = send(app, Method::POST, "/download", Some(serde_json::json!({ "url": URL }))).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["success"], true);
        let id = body["download_id"].as_str().unwrap().to_string();

        for _ in 0..500 {
            let progress = json(send(app, Method::GET, &format!("/progress/{}", id), None).await).await;
            if progress["status"] == "completed" {
                assert_eq!(progress["progress"], 100.0);
                return (id, progress["filename"].as_str().unwrap().to_string());
            }
            assert_ne!(progress["status"], "error", "{}", progress);
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("download never completed");
    }

    #[tokio::test]
    async fn test_download_then_list_play_and_delete() {
        let (app, _dir) = app().await;
        let filename = download(&app).await;
        assert_eq!(filename, FILENAME);

        let listing = json(send(&app, Method::GET, "/downloads", None).await).await;
        assert_eq!(listing["success"], true);
        let item = &listing["downloads"][0];
        assert_eq!(item["filename"], FILENAME);
        assert_eq!(item["name"], "Never Gonna");
        assert_eq!(item["duration_formatted"], "03:33");
        assert_eq!(item["source_url"], URL);

        let encoded = FILENAME.replace(' ', "%20").replace('[', "%5B").replace(']', "%5D");

        let play = send(&app, Method::GET, &format!("/play-audio/{}", encoded), None).await;
        assert_eq!(play.status(), StatusCode::OK);
        assert_eq!(play.headers()[header::CONTENT_TYPE], "audio/mpeg");
        assert_eq!(play.headers()[header::CONTENT_DISPOSITION], "inline");
        let bytes = axum::body::to_bytes(play.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"ID3 fake mp3");

        let file = send(&app, Method::GET, &format!("/download-file/{}", encoded), None).await;
        assert_eq!(file.status(), StatusCode::OK);
        let disposition = file.headers()[header::CONTENT_DISPOSITION].to_str().unwrap();
        assert!(disposition.starts_with("attachment"));
        assert!(disposition.contains(FILENAME));

        let deleted = send(&app, Method::DELETE, &format!("/delete/{}", encoded), None).await;
        assert_eq!(deleted.status(), StatusCode::OK);
        assert_eq!(json(deleted).await["success"], true);

        let again = send(&app, Method::DELETE, &format!("/delete/{}", encoded), None).await;
        assert_eq!(again.status(), StatusCode::NOT_FOUND);
        assert_eq!(json(again).await["success"], false);

        let listing = json(send(&app, Method::GET, "/downloads", None).await).await;
        assert!(listing["downloads"].as_array().unwrap().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_delete_reports_file_left_on_disk() {
        let (app, dir) = app().await;
        let filename = download(&app).await;

        // A non-empty directory in place of the file cannot be removed
        let path = dir.path().join("downloads").join(&filename);
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("blocker"), b"x").unwrap();

        let encoded = filename.replace(' ', "%20").replace('[', "%5B").replace(']', "%5D");
        let partial = send(&app, Method::DELETE, &format!("/delete/{}", encoded), None).await;
        assert_eq!(partial.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json(partial).await;
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("could not be deleted from disk"));

        let again = send(&app, Method::DELETE, &format!("/delete/{}", encoded), None).await;
        assert_eq!(again.status(), StatusCode::NOT_FOUND);
        assert_eq!(json(again).await["error"], "File not found");
    }

    #[tokio::test]
    async fn test_info_reports_existing_file() {
        let (app, _dir) = app().await;

        let fresh = json(send(&app, Method::POST, "/info", Some(serde_json::json!({ "url": URL }))).await).await;
        assert_eq!(fresh["success"], true);
        assert_eq!(fresh["title"], "Never Gonna");
        assert_eq!(fresh["uploader"], "Unknown");
        assert_eq!(fresh["duration"], "03:33");
        assert_eq!(fresh["view_count"], 0);
        assert_eq!(fresh["already_downloaded"], false);
        assert!(fresh.get("existing_file").is_none());

        download(&app).await;

        let known = json(send(&app, Method::POST, "/info", Some(serde_json::json!({ "url": "https://youtu.be/dQw4w9WgXcQ" }))).await).await;
        assert_eq!(known["already_downloaded"], true);
        assert_eq!(known["existing_file"], FILENAME);
    }

    #[tokio::test]
    async fn test_second_download_is_a_conflict() {
        let (app, _dir) = app().await;
        download(&app).await;

        let response = send(&app, Method::POST, "/download", Some(serde_json::json!({ "url": URL }))).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["existing_file"], FILENAME);
        assert!(body["error"].as_str().unwrap().contains("already been downloaded"));
    }

    #[tokio::test]
    async fn test_bad_requests() {
        let (app, _dir) = app().await;

        let missing = send(&app, Method::POST, "/info", Some(serde_json::json!({}))).await;
        assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(missing).await["error"], "No URL provided");

        let malformed = send(&app, Method::POST, "/info", Some(serde_json::json!({ "url": "not a url" }))).await;
        assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(malformed).await["success"], false);

        let unsupported = send(&app, Method::POST, "/info", Some(serde_json::json!({ "url": "https://example.com/x" }))).await;
        assert_eq!(unsupported.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let traversal = send(&app, Method::GET, "/download-file/..%2F..%2Fetc%2Fpasswd", None).await;
        assert_eq!(traversal.status(), StatusCode::BAD_REQUEST);

        let missing_file = send(&app, Method::GET, "/play-audio/nothing.mp3", None).await;
        assert_eq!(missing_file.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unknown_progress_id() {
        let (app, _dir) = app().await;

        for id in [JobId::new().to_string(), "garbage".to_string()] {
            let response = send(&app, Method::GET, &format!("/progress/{}", id), None).await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
            let body = json(response).await;
            assert_eq!(body["success"], false);
            assert!(!body["error"].as_str().unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn test_stats_and_index_page() {
        let (app, _dir) = app().await;
        download(&app).await;

        let stats = json(send(&app, Method::GET, "/stats", None).await).await;
        assert_eq!(stats["success"], true);
        assert_eq!(stats["stats"]["total_downloads"], 1);
        assert_eq!(stats["stats"]["total_size"], 12);
        assert_eq!(stats["stats"]["total_size_formatted"], "12.00 Bytes");

        let page = send(&app, Method::GET, "/", None).await;
        assert_eq!(page.status(), StatusCode::OK);
        let html = axum::body::to_bytes(page.into_body(), usize::MAX).await.unwrap();
        let html = String::from_utf8(html.to_vec()).unwrap();
        assert!(html.contains("Never Gonna"));
    }

    #[tokio::test]
    async fn test_events_end_with_terminal_snapshot() {
        let (app, _dir) = app().await;
        let (id, _) = download_job(&app).await;

        let response = send(&app, Method::GET, &format!("/progress/{}/events", id), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/event-stream");

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.starts_with("event: progress"));
        assert!(text.contains(r#""status":"completed""#));
        assert!(text.contains(FILENAME));
    }

    #[tokio::test]
    async fn test_cors_is_permissive() {
        let (app, _dir) = app().await;
        let request = Request::builder()
            .uri("/stats")
            .header(header::ORIGIN, "https://elsewhere.test")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }

    #[test]
    fn test_header_safe_filename() {
        assert_eq!(header_safe("Café \"Live\".mp3"), "Caf_ _Live_.mp3");
    }
}
