//! Scratch-buffer body streaming.
//!
//! Request and response bodies of arbitrary size move through one small,
//! caller-owned scratch buffer; no function here ever holds a full file in
//! memory. The scratch buffer belongs to exactly one request for the
//! duration of that request.
//!
//! Uploads are all-or-nothing from the filesystem's perspective: any failure
//! after the destination file has been created removes the partial file
//! before the error is returned. Serving a file is best-effort only — bytes
//! already written to the sink cannot be retracted, so a mid-stream error
//! simply aborts.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::Path;

use thiserror::Error;
use tracing::warn;

/// Default scratch buffer size in bytes.
pub const SCRATCH_SIZE: usize = 10240;

/// Default maximum size of an individual uploaded file (200 KB).
pub const MAX_FILE_SIZE: u64 = 200 * 1024;

/// How many consecutive transient read failures are retried before the
/// transfer is abandoned.
const MAX_RECV_RETRIES: u32 = 8;

/// Errors that can occur while streaming a body.
#[derive(Debug, Error)]
pub enum StreamError {
    /// A control payload's declared length does not fit the scratch buffer.
    #[error("content length {len} exceeds scratch capacity {capacity}")]
    BodyTooLarge {
        /// Declared content length.
        len: usize,
        /// Scratch buffer capacity.
        capacity: usize,
    },

    /// An upload's declared length exceeds the configured maximum file size.
    #[error("file size {len} exceeds maximum {max}")]
    FileTooLarge {
        /// Declared content length.
        len: u64,
        /// Configured maximum.
        max: u64,
    },

    /// The body ended before the declared length was received.
    #[error("body ended {remaining} bytes early")]
    UnexpectedEof {
        /// Bytes still owed when the body ended.
        remaining: u64,
    },

    /// Reading the body failed (after bounded retries for timeouts).
    #[error("failed to receive body: {0}")]
    Receive(#[source] io::Error),

    /// Creating the destination file failed.
    #[error("failed to create file: {0}")]
    Create(#[source] io::Error),

    /// Writing to the destination failed.
    #[error("failed to write file: {0}")]
    Write(#[source] io::Error),

    /// Opening the source file failed.
    #[error("failed to open file: {0}")]
    Open(#[source] io::Error),

    /// Reading the source file failed mid-stream.
    #[error("failed to read file: {0}")]
    Read(#[source] io::Error),

    /// Writing a chunk to the response sink failed.
    #[error("failed to send chunk: {0}")]
    Send(#[source] io::Error),
}

/// Errors that can occur while deleting a file.
#[derive(Debug, Error)]
pub enum DeleteError {
    /// The target does not exist.
    #[error("file does not exist")]
    NotFound,

    /// The target exists but could not be removed.
    #[error("failed to delete file: {0}")]
    Io(#[source] io::Error),
}

/// Read a complete bounded body (a control payload) through the scratch
/// buffer.
///
/// Rejects upfront when the declared length does not leave room in the
/// scratch buffer; no bytes are read in that case.
pub fn read_bounded<R: Read>(
    body: &mut R,
    content_len: usize,
    scratch: &mut [u8],
) -> Result<Vec<u8>, StreamError> {
    if content_len >= scratch.len() {
        return Err(StreamError::BodyTooLarge {
            len: content_len,
            capacity: scratch.len(),
        });
    }

    let mut filled = 0;
    let mut retries = 0;
    while filled < content_len {
        match body.read(&mut scratch[filled..content_len]) {
            Ok(0) => {
                return Err(StreamError::UnexpectedEof {
                    remaining: (content_len - filled) as u64,
                })
            }
            Ok(n) => {
                filled += n;
                retries = 0;
            }
            Err(e) if is_transient(&e) && retries < MAX_RECV_RETRIES => retries += 1,
            Err(e) => return Err(StreamError::Receive(e)),
        }
    }

    Ok(scratch[..content_len].to_vec())
}

/// Copy exactly `content_len` bytes from `body` into `sink` through the
/// scratch buffer.
///
/// Transient read failures (timeouts) are retried a bounded number of times;
/// any other short read is fatal. Returns the byte count on success.
pub fn receive_into<R: Read, W: Write>(
    body: &mut R,
    sink: &mut W,
    content_len: u64,
    scratch: &mut [u8],
) -> Result<u64, StreamError> {
    let mut remaining = content_len;
    let mut retries = 0;

    while remaining > 0 {
        let want = remaining.min(scratch.len() as u64) as usize;
        let received = match body.read(&mut scratch[..want]) {
            Ok(0) => return Err(StreamError::UnexpectedEof { remaining }),
            Ok(n) => {
                retries = 0;
                n
            }
            Err(e) if is_transient(&e) && retries < MAX_RECV_RETRIES => {
                retries += 1;
                continue;
            }
            Err(e) => return Err(StreamError::Receive(e)),
        };

        sink.write_all(&scratch[..received])
            .map_err(StreamError::Write)?;
        remaining -= received as u64;
    }

    Ok(content_len)
}

/// Stream an upload body into a newly created file.
///
/// Rejects upfront when the declared length exceeds `max_file_size`. On any
/// failure after the file has been created the partial file is removed
/// before the error returns — an upload either completes fully or leaves no
/// trace on disk.
pub fn receive_file<R: Read>(
    body: &mut R,
    dest: &Path,
    content_len: u64,
    max_file_size: u64,
    scratch: &mut [u8],
) -> Result<u64, StreamError> {
    if content_len > max_file_size {
        return Err(StreamError::FileTooLarge {
            len: content_len,
            max: max_file_size,
        });
    }

    let mut file = File::create(dest).map_err(StreamError::Create)?;

    match receive_into(body, &mut file, content_len, scratch) {
        Ok(written) => Ok(written),
        Err(e) => {
            drop(file);
            if let Err(unlink_err) = fs::remove_file(dest) {
                warn!(path = %dest.display(), error = %unlink_err, "failed to remove partial upload");
            }
            Err(e)
        }
    }
}

/// Stream a file into `sink` in scratch-sized chunks.
///
/// A read error mid-stream aborts the transfer; the caller terminates the
/// response as best it can. Returns the byte count on success.
pub fn send_file<W: Write>(
    src: &Path,
    sink: &mut W,
    scratch: &mut [u8],
) -> Result<u64, StreamError> {
    let mut file = File::open(src).map_err(StreamError::Open)?;
    let mut sent = 0u64;

    loop {
        let read = file.read(scratch).map_err(StreamError::Read)?;
        if read == 0 {
            return Ok(sent);
        }
        sink.write_all(&scratch[..read]).map_err(StreamError::Send)?;
        sent += read as u64;
    }
}

/// Delete a file, distinguishing a missing target from a failed unlink.
pub fn delete_file(path: &Path) -> Result<(), DeleteError> {
    match fs::metadata(path) {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(DeleteError::NotFound),
        Err(e) => return Err(DeleteError::Io(e)),
    }
    fs::remove_file(path).map_err(DeleteError::Io)
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static DIR_SEQ: AtomicUsize = AtomicUsize::new(0);

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "scriptlink-files-test-{}-{}",
            std::process::id(),
            DIR_SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    /// Reader that reports a timeout a fixed number of times before
    /// delegating to the inner reader.
    struct TimeoutThen<R> {
        timeouts: u32,
        inner: R,
    }

    impl<R: Read> Read for TimeoutThen<R> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.timeouts > 0 {
                self.timeouts -= 1;
                return Err(io::Error::new(io::ErrorKind::TimedOut, "recv timeout"));
            }
            self.inner.read(buf)
        }
    }

    #[test]
    fn test_read_bounded_round_trip() {
        let mut scratch = vec![0u8; 64];
        let mut body = Cursor::new(b"control payload".to_vec());
        let out = read_bounded(&mut body, 15, &mut scratch).unwrap();
        assert_eq!(out, b"control payload");
    }

    #[test]
    fn test_read_bounded_rejects_oversize_without_reading() {
        let mut scratch = vec![0u8; 8];
        let mut body = Cursor::new(b"0123456789".to_vec());
        match read_bounded(&mut body, 8, &mut scratch) {
            Err(StreamError::BodyTooLarge { len: 8, capacity: 8 }) => {}
            other => panic!("expected BodyTooLarge, got {:?}", other),
        }
        assert_eq!(body.position(), 0);
    }

    #[test]
    fn test_read_bounded_short_body() {
        let mut scratch = vec![0u8; 64];
        let mut body = Cursor::new(b"abc".to_vec());
        match read_bounded(&mut body, 10, &mut scratch) {
            Err(StreamError::UnexpectedEof { remaining: 7 }) => {}
            other => panic!("expected UnexpectedEof, got {:?}", other),
        }
    }

    #[test]
    fn test_receive_into_chunks_through_small_scratch() {
        let payload: Vec<u8> = (0..10_000u32).map(|n| (n % 251) as u8).collect();
        let mut body = Cursor::new(payload.clone());
        let mut sink = Vec::new();
        let mut scratch = vec![0u8; 256];

        let n = receive_into(&mut body, &mut sink, payload.len() as u64, &mut scratch).unwrap();
        assert_eq!(n, payload.len() as u64);
        assert_eq!(sink, payload);
    }

    #[test]
    fn test_receive_into_retries_transient_timeouts() {
        let mut body = TimeoutThen {
            timeouts: 3,
            inner: Cursor::new(b"delayed".to_vec()),
        };
        let mut sink = Vec::new();
        let mut scratch = vec![0u8; 16];

        receive_into(&mut body, &mut sink, 7, &mut scratch).unwrap();
        assert_eq!(sink, b"delayed");
    }

    #[test]
    fn test_receive_into_gives_up_after_bounded_retries() {
        let mut body = TimeoutThen {
            timeouts: u32::MAX,
            inner: Cursor::new(Vec::new()),
        };
        let mut sink = Vec::new();
        let mut scratch = vec![0u8; 16];

        match receive_into(&mut body, &mut sink, 4, &mut scratch) {
            Err(StreamError::Receive(e)) => assert_eq!(e.kind(), io::ErrorKind::TimedOut),
            other => panic!("expected Receive, got {:?}", other),
        }
    }

    #[test]
    fn test_receive_into_write_failure_is_fatal() {
        struct FullDisk;
        impl Write for FullDisk {
            fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::Other, "no space left"))
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let mut body = Cursor::new(vec![9u8; 64]);
        let mut scratch = vec![0u8; 16];
        match receive_into(&mut body, &mut FullDisk, 64, &mut scratch) {
            Err(StreamError::Write(_)) => {}
            other => panic!("expected Write, got {:?}", other),
        }
    }

    #[test]
    fn test_receive_file_round_trip() {
        let dir = temp_dir();
        let dest = dir.join("upload.bin");
        let payload = b"file contents".to_vec();
        let mut body = Cursor::new(payload.clone());
        let mut scratch = vec![0u8; 8];

        let n = receive_file(&mut body, &dest, payload.len() as u64, MAX_FILE_SIZE, &mut scratch)
            .unwrap();
        assert_eq!(n, payload.len() as u64);
        assert_eq!(fs::read(&dest).unwrap(), payload);
    }

    #[test]
    fn test_receive_file_rejects_oversize_before_creating() {
        let dir = temp_dir();
        let dest = dir.join("too-big.bin");
        let mut body = Cursor::new(vec![0u8; 16]);
        let mut scratch = vec![0u8; 16];

        match receive_file(&mut body, &dest, 1024, 512, &mut scratch) {
            Err(StreamError::FileTooLarge { len: 1024, max: 512 }) => {}
            other => panic!("expected FileTooLarge, got {:?}", other),
        }
        assert!(!dest.exists());
    }

    #[test]
    fn test_upload_atomicity_on_short_body() {
        let dir = temp_dir();
        let dest = dir.join("partial.bin");
        // Body delivers fewer bytes than declared: the write starts, then
        // the source dries up.
        let mut body = Cursor::new(vec![7u8; 100]);
        let mut scratch = vec![0u8; 32];

        match receive_file(&mut body, &dest, 500, MAX_FILE_SIZE, &mut scratch) {
            Err(StreamError::UnexpectedEof { remaining: 400 }) => {}
            other => panic!("expected UnexpectedEof, got {:?}", other),
        }
        // The partial file must be gone, never left truncated on disk.
        assert!(!dest.exists());
    }

    #[test]
    fn test_upload_atomicity_on_receive_error() {
        let dir = temp_dir();
        let dest = dir.join("broken.bin");
        struct BrokenRead;
        impl Read for BrokenRead {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::ConnectionReset, "peer gone"))
            }
        }
        let mut scratch = vec![0u8; 32];

        match receive_file(&mut BrokenRead, &dest, 64, MAX_FILE_SIZE, &mut scratch) {
            Err(StreamError::Receive(_)) => {}
            other => panic!("expected Receive, got {:?}", other),
        }
        assert!(!dest.exists());
    }

    #[test]
    fn test_send_file_round_trip() {
        let dir = temp_dir();
        let src = dir.join("served.txt");
        let payload: Vec<u8> = (0..5000u32).map(|n| (n % 241) as u8).collect();
        fs::write(&src, &payload).unwrap();

        let mut sink = Vec::new();
        let mut scratch = vec![0u8; 512];
        let n = send_file(&src, &mut sink, &mut scratch).unwrap();
        assert_eq!(n, payload.len() as u64);
        assert_eq!(sink, payload);
    }

    #[test]
    fn test_send_file_missing_source() {
        let dir = temp_dir();
        let mut sink = Vec::new();
        let mut scratch = vec![0u8; 64];
        match send_file(&dir.join("absent.txt"), &mut sink, &mut scratch) {
            Err(StreamError::Open(_)) => {}
            other => panic!("expected Open, got {:?}", other),
        }
        assert!(sink.is_empty());
    }

    #[test]
    fn test_send_file_aborts_on_sink_failure() {
        let dir = temp_dir();
        let src = dir.join("large.txt");
        fs::write(&src, vec![1u8; 4096]).unwrap();

        struct RefusingSink;
        impl Write for RefusingSink {
            fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "client went away"))
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        match send_file(&src, &mut RefusingSink, &mut vec![0u8; 256]) {
            Err(StreamError::Send(_)) => {}
            other => panic!("expected Send, got {:?}", other),
        }
    }

    #[test]
    fn test_delete_semantics() {
        let dir = temp_dir();
        let target = dir.join("victim.txt");

        // Deleting a nonexistent path is a distinct outcome.
        assert!(matches!(delete_file(&target), Err(DeleteError::NotFound)));

        fs::write(&target, b"bytes").unwrap();
        delete_file(&target).unwrap();
        assert!(!target.exists());

        // A second delete reports NotFound again.
        assert!(matches!(delete_file(&target), Err(DeleteError::NotFound)));
    }
}
