//! # scriptlink-files
//!
//! Filesystem-facing primitives for the streaming file server:
//! - Safe resolution of request URIs to on-disk paths
//! - Content type selection by file extension
//! - Scratch-buffer streaming of request and response bodies, with
//!   all-or-nothing upload semantics
//!
//! Everything here is synchronous `std::io`, so the same code drives both
//! the esp-idf HTTP server handlers and (bridged) the tokio host server.

pub mod content_type;
pub mod path;
pub mod stream;

pub use content_type::content_type_for;
pub use path::{resolve, resolve_file, PathError, MAX_PATH_LEN};
pub use stream::{
    delete_file, read_bounded, receive_file, receive_into, send_file, DeleteError, StreamError,
    MAX_FILE_SIZE, SCRATCH_SIZE,
};
