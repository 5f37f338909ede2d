//! Input streams for dBASE tables
//!
//! A table can be read from a seekable stream (a file, an in-memory buffer)
//! or from a strictly-forward one (a socket, a pipe). The only place where
//! the difference matters is skipping: a seekable source seeks, a forward
//! source reads and discards.
//!
//! Both helpers tolerate short reads. A zero-byte read is treated as the
//! logical end of the stream and ends the operation without an error.

use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom};

/// Size of the scratch buffer used when discarding bytes
const DISCARD_CHUNK: usize = 4096;

/// A readable table stream with an optional seek capability
pub trait Source: Read {
    /// Seek access, if the stream supports it
    fn as_seek(&mut self) -> Option<&mut dyn Seek> {
        None
    }
}

/// Wraps a reader that must only be consumed front to back
#[derive(Debug)]
pub struct Forward<R>(pub R);

impl<R: Read> Read for Forward<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl<R: Read> Source for Forward<R> {}

/// Wraps a reader that can also seek
#[derive(Debug)]
pub struct Seekable<R>(pub R);

impl<R: Read> Read for Seekable<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl<R: Read + Seek> Source for Seekable<R> {
    fn as_seek(&mut self) -> Option<&mut dyn Seek> {
        Some(&mut self.0)
    }
}

impl Source for File {
    fn as_seek(&mut self) -> Option<&mut dyn Seek> {
        Some(self)
    }
}

impl<T: AsRef<[u8]>> Source for Cursor<T> {
    fn as_seek(&mut self) -> Option<&mut dyn Seek> {
        Some(self)
    }
}

impl<S: Source + ?Sized> Source for Box<S> {
    fn as_seek(&mut self) -> Option<&mut dyn Seek> {
        (**self).as_seek()
    }
}

/// Advance the stream by `count` bytes. Returns the number of bytes skipped,
/// which is less than `count` only if a forward stream ran dry.
pub fn skip<S: Source + ?Sized>(source: &mut S, count: u64) -> io::Result<u64> {
    if count == 0 {
        return Ok(0);
    }
    if let Some(seek) = source.as_seek() {
        seek.seek(SeekFrom::Current(count as i64))?;
        return Ok(count);
    }

    let mut scratch = [0u8; DISCARD_CHUNK];
    let mut skipped = 0u64;
    while skipped < count {
        let want = (count - skipped).min(DISCARD_CHUNK as u64) as usize;
        let n = read_retrying(source, &mut scratch[..want])?;
        if n == 0 {
            break;
        }
        skipped += n as u64;
    }
    Ok(skipped)
}

/// Read until `buf` is full or the stream ends. Returns the bytes read.
pub fn fill<R: Read + ?Sized>(source: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = read_retrying(source, &mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

fn read_retrying<R: Read + ?Sized>(source: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        match source.read(buf) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}

#[cfg(feature = "async")]
pub use async_source::{fill_async, skip_async, AsyncForward, AsyncSeekable, AsyncSource};
#[cfg(feature = "async")]
pub(crate) use async_source::cancellable;

#[cfg(feature = "async")]
mod async_source {
    use super::DISCARD_CHUNK;
    use std::io::{self, Cursor, SeekFrom};
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use std::future::Future;
    use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt, ReadBuf};
    use tokio_util::sync::CancellationToken;

    use crate::error::{DbfError, DbfResult};

    /// Async mirror of [`Source`](super::Source)
    pub trait AsyncSource: AsyncRead + Unpin {
        /// Seek access, if the stream supports it
        fn as_seek(&mut self) -> Option<&mut (dyn AsyncSeek + Unpin)> {
            None
        }
    }

    /// Wraps an async reader that must only be consumed front to back
    #[derive(Debug)]
    pub struct AsyncForward<R>(pub R);

    impl<R: AsyncRead + Unpin> AsyncRead for AsyncForward<R> {
        fn poll_read(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Pin::new(&mut self.0).poll_read(cx, buf)
        }
    }

    impl<R: AsyncRead + Unpin> AsyncSource for AsyncForward<R> {}

    /// Wraps an async reader that can also seek
    #[derive(Debug)]
    pub struct AsyncSeekable<R>(pub R);

    impl<R: AsyncRead + Unpin> AsyncRead for AsyncSeekable<R> {
        fn poll_read(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Pin::new(&mut self.0).poll_read(cx, buf)
        }
    }

    impl<R: AsyncRead + AsyncSeek + Unpin> AsyncSource for AsyncSeekable<R> {
        fn as_seek(&mut self) -> Option<&mut (dyn AsyncSeek + Unpin)> {
            Some(&mut self.0)
        }
    }

    impl AsyncSource for tokio::fs::File {
        fn as_seek(&mut self) -> Option<&mut (dyn AsyncSeek + Unpin)> {
            Some(self)
        }
    }

    impl<T: AsRef<[u8]> + Unpin> AsyncSource for Cursor<T> {
        fn as_seek(&mut self) -> Option<&mut (dyn AsyncSeek + Unpin)> {
            Some(self)
        }
    }

    /// Async form of [`skip`](super::skip)
    pub async fn skip_async<S: AsyncSource + ?Sized>(source: &mut S, count: u64) -> io::Result<u64> {
        if count == 0 {
            return Ok(0);
        }
        if let Some(seek) = source.as_seek() {
            seek.seek(SeekFrom::Current(count as i64)).await?;
            return Ok(count);
        }

        let mut scratch = [0u8; DISCARD_CHUNK];
        let mut skipped = 0u64;
        while skipped < count {
            let want = (count - skipped).min(DISCARD_CHUNK as u64) as usize;
            let n = source.read(&mut scratch[..want]).await?;
            if n == 0 {
                break;
            }
            skipped += n as u64;
        }
        Ok(skipped)
    }

    /// Await one stream operation, giving up early if `cancel` fires.
    /// Bytes already consumed by the interrupted operation stay consumed.
    pub(crate) async fn cancellable<T, F>(
        cancel: Option<&CancellationToken>,
        io: F,
        map_err: fn(io::Error) -> DbfError,
    ) -> DbfResult<T>
    where
        F: Future<Output = io::Result<T>>,
    {
        match cancel {
            Some(token) => tokio::select! {
                biased;
                () = token.cancelled() => Err(DbfError::Cancelled),
                result = io => result.map_err(map_err),
            },
            None => io.await.map_err(map_err),
        }
    }

    /// Async form of [`fill`](super::fill)
    pub async fn fill_async<R: AsyncRead + Unpin + ?Sized>(
        source: &mut R,
        buf: &mut [u8],
    ) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = source.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(filled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fragmented;

    #[test]
    fn test_skip_seekable() {
        let mut source = Cursor::new((0u8..100).collect::<Vec<_>>());
        assert_eq!(skip(&mut source, 40).unwrap(), 40);
        let mut byte = [0u8; 1];
        source.read_exact(&mut byte).unwrap();
        assert_eq!(byte[0], 40);
    }

    #[test]
    fn test_skip_forward_discards() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let mut source = Forward(Fragmented::new(Cursor::new(data), 7));
        assert_eq!(skip(&mut source, 9_000).unwrap(), 9_000);
        let mut byte = [0u8; 1];
        source.read_exact(&mut byte).unwrap();
        assert_eq!(byte[0], (9_000 % 251) as u8);
    }

    #[test]
    fn test_skip_past_end_is_not_an_error() {
        let mut source = Forward(Cursor::new(vec![1u8; 10]));
        assert_eq!(skip(&mut source, 25).unwrap(), 10);
        assert_eq!(skip(&mut source, 5).unwrap(), 0);
    }

    #[test]
    fn test_fill_short_reads() {
        let mut source = Fragmented::new(Cursor::new(vec![9u8; 50]), 3);
        let mut buf = [0u8; 64];
        assert_eq!(fill(&mut source, &mut buf).unwrap(), 50);
        assert!(buf[..50].iter().all(|&b| b == 9));
        assert!(buf[50..].iter().all(|&b| b == 0));
    }

    #[cfg(feature = "async")]
    #[tokio::test]
    async fn test_async_skip_and_fill() {
        let data: Vec<u8> = (0u8..200).collect();
        let mut forward = AsyncForward(Cursor::new(data.clone()));
        assert_eq!(skip_async(&mut forward, 150).await.unwrap(), 150);
        let mut buf = [0u8; 80];
        assert_eq!(fill_async(&mut forward, &mut buf).await.unwrap(), 50);
        assert_eq!(buf[0], 150);

        let mut seekable = Cursor::new(data);
        assert_eq!(skip_async(&mut seekable, 10).await.unwrap(), 10);
        let mut buf = [0u8; 1];
        fill_async(&mut seekable, &mut buf).await.unwrap();
        assert_eq!(buf[0], 10);
    }
}
