//! Bounded single-writer, single-reader byte pipe
//!
//! The writer side is a blocking [`std::io::Write`] meant to run on a blocking
//! task; the reader side is an [`AsyncRead`](tokio::io::AsyncRead) an uploader
//! can stream from. At most `capacity` chunks of roughly `chunk_size` bytes are
//! in flight, so a fast writer blocks until the reader catches up.
//!
//! The reader only sees a clean EOF after [`PipeWriter::close`]. If the writer
//! is dropped without closing, the reader gets an `UnexpectedEof` error instead,
//! so a half-written stream is never mistaken for a complete one.

use bytes::{Bytes, BytesMut};
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use tokio::sync::mpsc;
use tokio_stream::Stream;
use tokio_util::io::StreamReader;

pub const DEFAULT_CAPACITY: usize = 8;
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

enum Frame {
    Data(Bytes),
    End,
}

/// Create a connected writer/reader pair
pub fn pipe(capacity: usize, chunk_size: usize) -> (PipeWriter, PipeReader) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let writer = PipeWriter {
        tx: Some(tx),
        buf: BytesMut::with_capacity(chunk_size),
        chunk_size: chunk_size.max(1),
        written: 0,
    };
    let reader = StreamReader::new(Frames { rx, done: false });
    (writer, reader)
}

pub struct PipeWriter {
    tx: Option<mpsc::Sender<Frame>>,
    buf: BytesMut,
    chunk_size: usize,
    written: u64,
}

impl PipeWriter {
    /// Flush buffered bytes and signal a clean end of stream
    pub fn close(mut self) -> io::Result<u64> {
        self.send_buffered()?;
        self.send(Frame::End)?;
        self.tx = None;
        Ok(self.written)
    }

    fn send_buffered(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let chunk = self.buf.split().freeze();
        self.send(Frame::Data(chunk))
    }

    fn send(&self, frame: Frame) -> io::Result<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "pipe already closed"))?;
        tx.blocking_send(frame)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "pipe reader went away"))
    }
}

impl io::Write for PipeWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        self.written += data.len() as u64;
        if self.buf.len() >= self.chunk_size {
            self.send_buffered()?;
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.send_buffered()
    }
}

/// Async reader half of [`pipe`]
pub type PipeReader = StreamReader<Frames, Bytes>;

/// Chunk stream behind a [`PipeReader`]
pub struct Frames {
    rx: mpsc::Receiver<Frame>,
    done: bool,
}

impl Stream for Frames {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        match ready!(this.rx.poll_recv(cx)) {
            Some(Frame::Data(chunk)) => Poll::Ready(Some(Ok(chunk))),
            Some(Frame::End) => {
                this.done = true;
                Poll::Ready(None)
            }
            None => {
                this.done = true;
                Poll::Ready(Some(Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "writer stopped before the end of the stream",
                ))))
            }
        }
    }
}
