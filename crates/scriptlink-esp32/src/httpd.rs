//! Streaming file server over the esp-idf HTTP server.
//!
//! Handlers run on the HTTP server task and share one scratch buffer owned
//! by the server context; the esp-idf server serializes handler execution,
//! so requests never interleave on it. Every request is mirrored into the
//! session's event channel before the filesystem is touched.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;
use embedded_svc::http::Method;
use esp_idf_svc::http::server::{Configuration as HttpServerConfiguration, EspHttpServer};
use log::{error, info};

use scriptlink_core::{
    channel, EventBridge, EventKind, EventReceiver, EventRecord, DEFAULT_CAPACITY,
};
use scriptlink_files::{self as files, path::PathError, StreamError};

use crate::io::{EmbeddedRead, EmbeddedWrite};
use crate::mdns;

/// Configuration for the file server session.
#[derive(Debug, Clone)]
pub struct HttpdConfig {
    /// Base directory served files live under (the mounted SPIFFS root).
    pub base_dir: PathBuf,
    /// mDNS hostname announced at server start.
    pub hostname: String,
    /// Scratch buffer size; bounds control payloads and streaming chunks.
    pub scratch_size: usize,
    /// Maximum size of an individual uploaded file.
    pub max_file_size: u64,
    /// Combined base + request path byte bound.
    pub max_path_len: usize,
    /// Capacity of the session's event channel.
    pub queue_capacity: usize,
}

impl Default for HttpdConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("/spiffs"),
            hostname: "scriptlink".to_string(),
            scratch_size: files::SCRATCH_SIZE,
            max_file_size: files::MAX_FILE_SIZE,
            max_path_len: files::MAX_PATH_LEN,
            queue_capacity: DEFAULT_CAPACITY,
        }
    }
}

struct HandlerContext {
    base_dir: PathBuf,
    scratch: Mutex<Vec<u8>>,
    max_file_size: u64,
    max_path_len: usize,
    bridge: EventBridge,
}

impl HandlerContext {
    fn scratch(&self) -> std::sync::MutexGuard<'_, Vec<u8>> {
        self.scratch.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A running file server session.
pub struct HttpdSession {
    server: EspHttpServer<'static>,
    receiver: EventReceiver,
    context: Arc<HandlerContext>,
    _mdns: esp_idf_svc::mdns::EspMdns,
}

impl HttpdSession {
    /// Register mDNS, create the event channel and start the HTTP server.
    pub fn start(config: HttpdConfig) -> Result<Self> {
        let mdns = mdns::register(&config.hostname, 80)?;

        let (sender, receiver) = channel(config.queue_capacity);
        let context = Arc::new(HandlerContext {
            base_dir: config.base_dir.clone(),
            scratch: Mutex::new(vec![0u8; config.scratch_size]),
            max_file_size: config.max_file_size,
            max_path_len: config.max_path_len,
            bridge: EventBridge::new(sender),
        });

        let mut server = EspHttpServer::new(&HttpServerConfiguration {
            uri_match_wildcard: true,
            ..Default::default()
        })?;

        let ctx = context.clone();
        server.fn_handler::<anyhow::Error, _>("/upload/*", Method::Post, move |request| {
            handle_upload(&ctx, request)
        })?;

        let ctx = context.clone();
        server.fn_handler::<anyhow::Error, _>("/delete/*", Method::Get, move |request| {
            handle_delete(&ctx, request)
        })?;

        let ctx = context.clone();
        server.fn_handler::<anyhow::Error, _>("/*", Method::Get, move |request| {
            handle_get(&ctx, request)
        })?;

        let ctx = context.clone();
        server.fn_handler::<anyhow::Error, _>("/*", Method::Post, move |request| {
            handle_post(&ctx, request)
        })?;

        info!("file server started, base {}", config.base_dir.display());

        Ok(Self {
            server,
            receiver,
            context,
            _mdns: mdns,
        })
    }

    /// Poll the session's event channel without blocking.
    pub fn poll(&mut self) -> Option<EventRecord> {
        self.receiver.try_recv()
    }

    /// How many events were dropped because the channel was full.
    pub fn dropped_events(&self) -> u64 {
        self.context.bridge.dropped()
    }

    /// Stop the server, then drain and close the channel.
    ///
    /// Returns the number of unconsumed events released during the drain.
    pub fn stop(mut self) -> usize {
        // Dropping the server stops it and unregisters the handlers; only
        // then is the channel drained, so no handler can enqueue afterwards.
        drop(self.server);
        let released = self.receiver.drain_and_close();
        info!("file server stopped");
        released
    }
}

type Request<'r, 'a> =
    embedded_svc::http::server::Request<&'r mut esp_idf_svc::http::server::EspHttpConnection<'a>>;

fn handle_get(ctx: &HandlerContext, mut request: Request<'_, '_>) -> Result<()> {
    let uri = request.uri().to_string();
    let declared = content_length(&request);
    let mut scratch = ctx.scratch();

    if declared >= scratch.len() {
        return write_text(request, 500, "content too long");
    }
    let payload = match files::read_bounded(&mut EmbeddedRead(&mut request), declared, &mut scratch)
    {
        Ok(payload) => payload,
        Err(e) => {
            error!("failed to receive request body: {}", e);
            return write_text(request, 500, "Failed to post control value");
        }
    };

    ctx.bridge.forward(
        EventRecord::new(EventKind::Get)
            .subject(uri.clone())
            .payload(payload),
    );

    let path_part = uri.split(['?', '#']).next().unwrap_or("/");
    let target = if path_part == "/" { "/index.html" } else { path_part };
    let resolved = match files::resolve(&ctx.base_dir, target, ctx.max_path_len) {
        Ok(path) => path,
        Err(e) => return write_path_error(request, &e),
    };

    if std::fs::metadata(&resolved).is_err() {
        error!("failed to read file: {}", resolved.display());
        return write_text(request, 500, "Failed to read existing file");
    }

    let content_type = files::content_type_for(&resolved);
    let mut response = request.into_response(200, Some("OK"), &[("Content-Type", content_type)])?;
    match files::send_file(&resolved, &mut EmbeddedWrite(&mut response), &mut scratch) {
        Ok(sent) => {
            info!("file sending complete: {} ({} bytes)", resolved.display(), sent);
            Ok(())
        }
        Err(e) => {
            // Bytes already on the wire cannot be retracted; dropping the
            // response aborts the connection.
            error!("file sending failed: {}", e);
            Ok(())
        }
    }
}

fn handle_post(ctx: &HandlerContext, mut request: Request<'_, '_>) -> Result<()> {
    let uri = request.uri().to_string();
    let declared = content_length(&request);
    let mut scratch = ctx.scratch();

    if declared >= scratch.len() {
        return write_text(request, 500, "content too long");
    }
    let payload = match files::read_bounded(&mut EmbeddedRead(&mut request), declared, &mut scratch)
    {
        Ok(payload) => payload,
        Err(e) => {
            error!("failed to receive control body: {}", e);
            return write_text(request, 500, "Failed to post control value");
        }
    };

    ctx.bridge.forward(
        EventRecord::new(EventKind::Post)
            .subject(uri)
            .payload(payload),
    );

    write_text(request, 200, "Post control value successfully")
}

fn handle_upload(ctx: &HandlerContext, mut request: Request<'_, '_>) -> Result<()> {
    let uri = request.uri().to_string();
    let filename = uri
        .strip_prefix("/upload")
        .unwrap_or(uri.as_str())
        .to_string();

    ctx.bridge.forward(
        EventRecord::new(EventKind::Upload)
            .subject(filename.clone())
            .payload(Vec::new()),
    );

    let dest = match files::resolve_file(&ctx.base_dir, &filename, ctx.max_path_len) {
        Ok(path) => path,
        Err(e) => {
            error!("invalid upload target {}: {}", filename, e);
            return write_path_error(request, &e);
        }
    };

    let declared = content_length(&request) as u64;
    if declared > ctx.max_file_size {
        error!("file too large: {} bytes", declared);
        return write_text(
            request,
            400,
            &format!("File size must be less than {} bytes!", ctx.max_file_size),
        );
    }

    info!("receiving file: {}...", filename);
    let mut scratch = ctx.scratch();
    let outcome = files::receive_file(
        &mut EmbeddedRead(&mut request),
        &dest,
        declared,
        ctx.max_file_size,
        &mut scratch,
    );

    match outcome {
        Ok(written) => {
            info!("file reception complete ({} bytes)", written);
            write_text(request, 200, "File uploaded successfully")
        }
        Err(StreamError::Create(e)) => {
            error!("failed to create file {}: {}", dest.display(), e);
            write_text(request, 500, "Failed to create file")
        }
        Err(StreamError::Write(e)) => {
            error!("file write failed: {}", e);
            write_text(request, 500, "Failed to write file to storage")
        }
        Err(e) => {
            error!("file reception failed: {}", e);
            write_text(request, 500, "Failed to receive file")
        }
    }
}

fn handle_delete(ctx: &HandlerContext, request: Request<'_, '_>) -> Result<()> {
    let uri = request.uri().to_string();
    let filename = uri
        .strip_prefix("/delete")
        .unwrap_or(uri.as_str())
        .to_string();

    ctx.bridge.forward(
        EventRecord::new(EventKind::Delete)
            .subject(filename.clone())
            .payload(Vec::new()),
    );

    let target = match files::resolve_file(&ctx.base_dir, &filename, ctx.max_path_len) {
        Ok(path) => path,
        Err(e) => {
            error!("invalid delete target {}: {}", filename, e);
            return write_path_error(request, &e);
        }
    };

    match files::delete_file(&target) {
        Ok(()) => {
            info!("deleted {}", target.display());
            write_text(request, 200, "File deleted successfully")
        }
        Err(files::DeleteError::NotFound) => {
            error!("file does not exist: {}", filename);
            write_text(request, 400, "File does not exist")
        }
        Err(files::DeleteError::Io(e)) => {
            error!("failed to delete {}: {}", target.display(), e);
            write_text(request, 500, "Failed to delete file")
        }
    }
}

fn content_length(request: &Request<'_, '_>) -> usize {
    request
        .header("Content-Length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

fn write_text(request: Request<'_, '_>, status: u16, body: &str) -> Result<()> {
    let mut response = request.into_status_response(status)?;
    embedded_svc::io::Write::write_all(&mut response, body.as_bytes())?;
    Ok(())
}

fn write_path_error(request: Request<'_, '_>, e: &PathError) -> Result<()> {
    match e {
        PathError::TooLong { .. } => write_text(request, 500, "Filename too long"),
        _ => write_text(request, 500, "Invalid filename"),
    }
}
