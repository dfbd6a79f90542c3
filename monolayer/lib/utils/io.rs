use std::io::{self, Write};

use tokio_util::sync::CancellationToken;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A writer that copies every write to two inner writers.
///
/// The primary writer decides how many bytes were accepted; the secondary writer must accept
/// all of them.
#[derive(Debug)]
pub struct MultiWriter<A, B> {
    primary: A,
    secondary: B,
}

/// A writer that fails with [`io::ErrorKind::Interrupted`] once its token is cancelled.
#[derive(Debug)]
pub struct CancellableWriter<W> {
    inner: W,
    token: CancellationToken,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl<A, B> MultiWriter<A, B> {
    /// Creates a writer copying into `primary` and `secondary`.
    pub fn new(primary: A, secondary: B) -> Self {
        Self { primary, secondary }
    }

    /// Returns the inner writers.
    pub fn into_inner(self) -> (A, B) {
        (self.primary, self.secondary)
    }
}

impl<W> CancellableWriter<W> {
    /// Wraps `inner` so that writes stop once `token` is cancelled.
    pub fn new(inner: W, token: CancellationToken) -> Self {
        Self { inner, token }
    }

    /// Returns the inner writer.
    pub fn into_inner(self) -> W {
        self.inner
    }

    fn check(&self) -> io::Result<()> {
        if self.token.is_cancelled() {
            return Err(cancelled_error());
        }
        Ok(())
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Checks if `error` was raised by a [`CancellableWriter`] whose token was cancelled.
pub fn is_cancelled_error(error: &io::Error) -> bool {
    error.kind() == io::ErrorKind::Interrupted && error.to_string() == CANCELLED_MESSAGE
}

fn cancelled_error() -> io::Error {
    io::Error::new(io::ErrorKind::Interrupted, CANCELLED_MESSAGE)
}

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

const CANCELLED_MESSAGE: &str = "operation cancelled";

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl<A, B> Write for MultiWriter<A, B>
where
    A: Write,
    B: Write,
{
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.primary.write(buf)?;
        self.secondary.write_all(&buf[..n])?;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.primary.flush()?;
        self.secondary.flush()
    }
}

impl<W> Write for CancellableWriter<W>
where
    W: Write,
{
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.check()?;
        self.inner.write(buf)
    }

    // `write_all` retries on `Interrupted`, so it is overridden to surface cancellation.
    fn write_all(&mut self, mut buf: &[u8]) -> io::Result<()> {
        while !buf.is_empty() {
            self.check()?;
            match self.inner.write(buf) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => buf = &buf[n..],
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.check()?;
        self.inner.flush()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use sha2::{Digest, Sha256};

    use super::*;

    #[test]
    fn test_multi_writer_copies_to_both() -> anyhow::Result<()> {
        let mut writer = MultiWriter::new(Vec::new(), Sha256::new());
        writer.write_all(b"hello ")?;
        writer.write_all(b"world")?;

        let (bytes, hasher) = writer.into_inner();
        assert_eq!(bytes, b"hello world");
        assert_eq!(hasher.finalize().as_slice(), Sha256::digest(b"hello world").as_slice());

        Ok(())
    }

    #[test]
    fn test_cancellable_writer_stops_after_cancel() -> anyhow::Result<()> {
        let token = CancellationToken::new();
        let mut writer = CancellableWriter::new(Vec::new(), token.clone());
        writer.write_all(b"before")?;

        token.cancel();
        let err = writer.write_all(b"after").unwrap_err();
        assert!(is_cancelled_error(&err));
        assert_eq!(writer.into_inner(), b"before");

        Ok(())
    }
}
