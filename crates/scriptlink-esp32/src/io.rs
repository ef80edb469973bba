//! Adapters between embedded-svc I/O traits and `std::io`.
//!
//! The streaming core in `scriptlink-files` speaks `std::io::Read`/`Write`;
//! esp-idf HTTP requests and responses speak the embedded-svc traits. These
//! thin wrappers translate one into the other so the same streaming code
//! runs on both platforms.

use std::io;

/// Wrap an embedded-svc reader as a `std::io::Read`.
pub struct EmbeddedRead<'a, R>(pub &'a mut R);

impl<R> io::Read for EmbeddedRead<'_, R>
where
    R: embedded_svc::io::Read,
    R::Error: std::fmt::Debug,
{
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0
            .read(buf)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, format!("{:?}", e)))
    }
}

/// Wrap an embedded-svc writer as a `std::io::Write`.
pub struct EmbeddedWrite<'a, W>(pub &'a mut W);

impl<W> io::Write for EmbeddedWrite<'_, W>
where
    W: embedded_svc::io::Write,
    W::Error: std::fmt::Debug,
{
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .write(buf)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, format!("{:?}", e)))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0
            .flush()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, format!("{:?}", e)))
    }
}
