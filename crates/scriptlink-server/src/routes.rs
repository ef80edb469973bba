//! HTTP route handlers for the streaming file server.
//!
//! Four handler sets cover the wire surface:
//! - `GET /*` serves a file at the resolved path (`/` maps to `index.html`),
//!   streamed in scratch-sized chunks
//! - `POST /*` receives a bounded opaque control payload
//! - `POST /upload/<path>` streams a bounded upload into a new file
//! - `GET /delete/<path>` unlinks the resolved target
//!
//! Every inbound request is mirrored into the session's event channel before
//! the filesystem is touched, so the scripting runtime observes requests
//! even when they subsequently fail.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use futures::TryStreamExt;
use tokio_util::io::{ReaderStream, StreamReader, SyncIoBridge};
use tracing::{debug, error, info};

use scriptlink_core::{EventBridge, EventKind, EventRecord};
use scriptlink_files::{content_type_for, path::PathError, resolve, resolve_file, StreamError};

/// Shared state for all route handlers of one server session.
pub struct ServerContext {
    /// Base directory served files live under.
    pub base_dir: PathBuf,
    /// Scratch buffer size; bounds control payloads and streaming chunks.
    pub scratch_size: usize,
    /// Maximum size of an individual uploaded file.
    pub max_file_size: u64,
    /// Combined base + request path byte bound.
    pub max_path_len: usize,
    /// Bridge into the session's event channel.
    pub bridge: Arc<EventBridge>,
}

/// Build the router for one server session.
///
/// Wildcard precedence mirrors the registration order of the original REST
/// surface: upload and delete prefixes first, then the catch-all GET/POST.
pub fn router(context: Arc<ServerContext>) -> Router {
    Router::new()
        .route("/", get(get_file).post(post_control))
        .route("/*path", get(get_file).post(post_control))
        .route("/upload/*path", post(upload_file).get(get_file))
        .route("/delete/*path", get(delete_target).post(post_control))
        .with_state(context)
}

/// Serve the file at the resolved request path.
async fn get_file(
    State(ctx): State<Arc<ServerContext>>,
    uri: Uri,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let payload = match read_control_body(&ctx, &headers, body).await {
        Ok(bytes) => bytes,
        Err(response) => return response,
    };

    ctx.bridge.forward(
        EventRecord::new(EventKind::Get)
            .subject(uri.to_string())
            .payload(payload),
    );

    let target = if uri.path() == "/" {
        "/index.html"
    } else {
        uri.path()
    };

    let resolved = match resolve(&ctx.base_dir, target, ctx.max_path_len) {
        Ok(path) => path,
        Err(e) => return path_error_response(&e),
    };

    let file = match tokio::fs::File::open(&resolved).await {
        Ok(file) => file,
        Err(e) => {
            error!("failed to read file {}: {}", resolved.display(), e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to read existing file",
            )
                .into_response();
        }
    };

    debug!("serving {}", resolved.display());
    let stream = ReaderStream::with_capacity(file, ctx.scratch_size);
    let mut response = Body::from_stream(stream).into_response();
    let _ = response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(content_type_for(&resolved)),
    );
    response
}

/// Receive a bounded opaque control payload and forward it as an event.
async fn post_control(
    State(ctx): State<Arc<ServerContext>>,
    uri: Uri,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let payload = match read_control_body(&ctx, &headers, body).await {
        Ok(bytes) => bytes,
        Err(response) => return response,
    };

    ctx.bridge.forward(
        EventRecord::new(EventKind::Post)
            .subject(uri.to_string())
            .payload(payload),
    );

    (StatusCode::OK, "Post control value successfully").into_response()
}

/// Stream an upload into a newly created file under the base directory.
async fn upload_file(
    State(ctx): State<Arc<ServerContext>>,
    Path(rel): Path<String>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let filename = format!("/{}", rel);

    ctx.bridge.forward(
        EventRecord::new(EventKind::Upload)
            .subject(filename.clone())
            .payload(Vec::new()),
    );

    let dest = match resolve_file(&ctx.base_dir, &filename, ctx.max_path_len) {
        Ok(path) => path,
        Err(e) => {
            error!("invalid upload target {}: {}", filename, e);
            return path_error_response(&e);
        }
    };

    let declared = content_length(&headers);
    if declared > ctx.max_file_size {
        error!("file too large: {} bytes", declared);
        return (
            StatusCode::BAD_REQUEST,
            format!("File size must be less than {} bytes!", ctx.max_file_size),
        )
            .into_response();
    }

    info!("receiving file: {}...", filename);

    // The body arrives async; the scratch-buffer streaming core is sync, so
    // bridge it onto a blocking worker for the duration of the transfer.
    let stream = body.into_data_stream().map_err(std::io::Error::other);
    let mut reader = SyncIoBridge::new(StreamReader::new(stream));
    let scratch_size = ctx.scratch_size;
    let max_file_size = ctx.max_file_size;
    let target = dest.clone();

    let outcome = tokio::task::spawn_blocking(move || {
        let mut scratch = vec![0u8; scratch_size];
        scriptlink_files::receive_file(&mut reader, &target, declared, max_file_size, &mut scratch)
    })
    .await;

    match outcome {
        Ok(Ok(written)) => {
            info!("file reception complete: {} ({} bytes)", dest.display(), written);
            (StatusCode::OK, "File uploaded successfully").into_response()
        }
        Ok(Err(StreamError::FileTooLarge { max, .. })) => (
            StatusCode::BAD_REQUEST,
            format!("File size must be less than {} bytes!", max),
        )
            .into_response(),
        Ok(Err(StreamError::Create(e))) => {
            error!("failed to create file {}: {}", dest.display(), e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to create file").into_response()
        }
        Ok(Err(StreamError::Write(e))) => {
            error!("file write failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to write file to storage",
            )
                .into_response()
        }
        Ok(Err(e)) => {
            error!("file reception failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to receive file").into_response()
        }
        Err(e) => {
            error!("upload task failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to receive file").into_response()
        }
    }
}

/// Unlink the resolved target, distinguishing a missing file from a failed
/// unlink.
async fn delete_target(
    State(ctx): State<Arc<ServerContext>>,
    Path(rel): Path<String>,
) -> Response {
    let filename = format!("/{}", rel);

    ctx.bridge.forward(
        EventRecord::new(EventKind::Delete)
            .subject(filename.clone())
            .payload(Vec::new()),
    );

    let target = match resolve_file(&ctx.base_dir, &filename, ctx.max_path_len) {
        Ok(path) => path,
        Err(e) => {
            error!("invalid delete target {}: {}", filename, e);
            return path_error_response(&e);
        }
    };

    match scriptlink_files::delete_file(&target) {
        Ok(()) => {
            info!("deleted {}", target.display());
            (StatusCode::OK, "File deleted successfully").into_response()
        }
        Err(scriptlink_files::DeleteError::NotFound) => {
            error!("file does not exist: {}", filename);
            (StatusCode::BAD_REQUEST, "File does not exist").into_response()
        }
        Err(scriptlink_files::DeleteError::Io(e)) => {
            error!("failed to delete {}: {}", target.display(), e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to delete file").into_response()
        }
    }
}

/// Read a request body bounded by the scratch capacity.
///
/// Rejects upfront on the declared length, before any bytes are pulled.
async fn read_control_body(
    ctx: &ServerContext,
    headers: &HeaderMap,
    body: Body,
) -> Result<Vec<u8>, Response> {
    let declared = content_length(headers) as usize;
    if declared >= ctx.scratch_size {
        return Err(
            (StatusCode::INTERNAL_SERVER_ERROR, "content too long").into_response(),
        );
    }

    match axum::body::to_bytes(body, ctx.scratch_size).await {
        Ok(bytes) => Ok(bytes.to_vec()),
        Err(e) => {
            error!("failed to receive control body: {}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to post control value",
            )
                .into_response())
        }
    }
}

fn content_length(headers: &HeaderMap) -> u64 {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

fn path_error_response(e: &PathError) -> Response {
    match e {
        PathError::TooLong { .. } => {
            (StatusCode::INTERNAL_SERVER_ERROR, "Filename too long").into_response()
        }
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "Invalid filename").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use scriptlink_core::channel;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    static DIR_SEQ: AtomicUsize = AtomicUsize::new(0);

    fn test_context() -> (Arc<ServerContext>, scriptlink_core::EventReceiver, PathBuf) {
        let base = std::env::temp_dir().join(format!(
            "scriptlink-routes-test-{}-{}",
            std::process::id(),
            DIR_SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        std::fs::create_dir_all(&base).unwrap();

        let (sender, receiver) = channel(16);
        let context = Arc::new(ServerContext {
            base_dir: base.clone(),
            scratch_size: 1024,
            max_file_size: 4096,
            max_path_len: 144,
            bridge: Arc::new(EventBridge::new(sender)),
        });
        (context, receiver, base)
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    #[tokio::test]
    async fn test_control_post_forwards_event() {
        let (ctx, mut rx, _base) = test_context();
        let app = router(ctx);

        let response = app
            .oneshot(
                Request::post("/relay?on=1")
                    .body(Body::from("toggle"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "Post control value successfully");

        let event = rx.try_recv().unwrap();
        assert_eq!(event.kind, EventKind::Post);
        assert_eq!(event.subject.as_deref(), Some("/relay?on=1"));
        assert_eq!(event.payload_lossy().unwrap(), "toggle");
    }

    #[tokio::test]
    async fn test_control_post_rejects_oversize_declared_length() {
        let (ctx, mut rx, _base) = test_context();
        let app = router(ctx);

        let response = app
            .oneshot(
                Request::post("/ctl")
                    .header(header::CONTENT_LENGTH, "1024")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_string(response).await, "content too long");
        // Rejected before the event is mirrored.
        assert!(rx.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_get_serves_with_content_type() {
        let (ctx, mut rx, base) = test_context();
        std::fs::write(base.join("page.html"), b"<html>hi</html>").unwrap();
        let app = router(ctx);

        let response = app
            .oneshot(Request::get("/page.html").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/html"
        );
        assert_eq!(body_string(response).await, "<html>hi</html>");

        let event = rx.try_recv().unwrap();
        assert_eq!(event.kind, EventKind::Get);
        assert_eq!(event.subject.as_deref(), Some("/page.html"));
    }

    #[tokio::test]
    async fn test_get_root_maps_to_index() {
        let (ctx, _rx, base) = test_context();
        std::fs::write(base.join("index.html"), b"home").unwrap();
        let app = router(ctx);

        let response = app
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "home");
    }

    #[tokio::test]
    async fn test_get_missing_file() {
        let (ctx, _rx, _base) = test_context();
        let app = router(ctx);

        let response = app
            .oneshot(Request::get("/absent.txt").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_string(response).await, "Failed to read existing file");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_upload_traversal_rejected() {
        let (ctx, _rx, base) = test_context();
        let app = router(ctx);

        let response = app
            .oneshot(
                Request::post("/upload/../escape.txt")
                    .body(Body::from("malicious"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_string(response).await, "Invalid filename");
        assert!(!base.parent().unwrap().join("escape.txt").exists());
    }

    #[tokio::test]
    async fn test_delete_trailing_slash_rejected() {
        let (ctx, _rx, _base) = test_context();
        let app = router(ctx);

        let response = app
            .oneshot(Request::get("/delete/dir/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_string(response).await, "Invalid filename");
    }
}
