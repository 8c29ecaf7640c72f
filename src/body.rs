//! Request bodies that survive an authentication retry.
//!
//! A request may have to be sent twice: once anonymously and once more with
//! the credentials negotiated from the server's challenge. How the second copy
//! of the body is produced depends on what the caller handed in:
//!
//! - in-memory bytes are simply cloned,
//! - a seekable reader is rewound to offset 0 before every attempt,
//! - a plain stream is read from exactly once. Everything pulled from it is
//!   captured, and a retry sends the captured bytes followed by whatever the
//!   first attempt never got to.

use bytes::{Bytes, BytesMut};
use futures_util::future::poll_fn;
use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use std::fmt;
use std::io::{self, SeekFrom};
use std::mem;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncSeek};
use tokio_util::io::{poll_read_buf, ReaderStream};

const CHUNK_SIZE: usize = 64 * 1024;

/// A reader that can be rewound.
pub trait SeekableRead: AsyncRead + AsyncSeek + Send {}

impl<T: AsyncRead + AsyncSeek + Send> SeekableRead for T {}

/// The body of a WebDAV request.
///
/// # Examples
///
/// ```no_run
/// use davcall::RequestBody;
///
/// # async fn example() -> std::io::Result<()> {
/// // Cheap to replay.
/// let small = RequestBody::from("hello");
///
/// // Rewound before every attempt.
/// let file = tokio::fs::File::open("report.pdf").await?;
/// let seekable = RequestBody::seekable(file);
///
/// // Read exactly once; replayed from memory if the server challenges.
/// let piped = RequestBody::reader(tokio::io::stdin());
/// # Ok(())
/// # }
/// ```
pub struct RequestBody {
    kind: Kind,
}

enum Kind {
    Bytes(Bytes),
    Seekable(Pin<Box<dyn SeekableRead>>),
    Stream(BoxStream<'static, io::Result<Bytes>>),
}

impl RequestBody {
    /// A body backed by a reader that supports seeking.
    pub fn seekable<R>(reader: R) -> Self
    where
        R: AsyncRead + AsyncSeek + Send + 'static,
    {
        Self {
            kind: Kind::Seekable(Box::pin(reader)),
        }
    }

    /// A body backed by a non-seekable byte stream.
    pub fn stream<S>(stream: S) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        Self {
            kind: Kind::Stream(stream.boxed()),
        }
    }

    /// A body backed by a non-seekable reader.
    pub fn reader<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        Self::stream(ReaderStream::with_capacity(reader, CHUNK_SIZE))
    }

    pub(crate) fn into_replay(self) -> Replay {
        match self.kind {
            Kind::Bytes(bytes) => Replay::Bytes(bytes),
            Kind::Seekable(reader) => Replay::Seekable(Arc::new(Mutex::new(SeekState {
                reader,
                generation: 0,
            }))),
            Kind::Stream(source) => Replay::Tee {
                shared: TeeState::shared(source),
                attempts: 0,
            },
        }
    }
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            Kind::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Kind::Seekable(_) => f.write_str("Seekable"),
            Kind::Stream(_) => f.write_str("Stream"),
        }
    }
}

impl From<Bytes> for RequestBody {
    fn from(bytes: Bytes) -> Self {
        Self {
            kind: Kind::Bytes(bytes),
        }
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(bytes: Vec<u8>) -> Self {
        Bytes::from(bytes).into()
    }
}

impl From<String> for RequestBody {
    fn from(text: String) -> Self {
        Bytes::from(text).into()
    }
}

impl From<&'static str> for RequestBody {
    fn from(text: &'static str) -> Self {
        Bytes::from_static(text.as_bytes()).into()
    }
}

impl From<&'static [u8]> for RequestBody {
    fn from(bytes: &'static [u8]) -> Self {
        Bytes::from_static(bytes).into()
    }
}

/// Per-call replay state. Each call to [`Replay::next_attempt`] yields a body
/// that starts from the first byte.
pub(crate) enum Replay {
    Bytes(Bytes),
    Seekable(Arc<Mutex<SeekState>>),
    Tee {
        shared: Arc<Mutex<TeeState>>,
        attempts: usize,
    },
}

impl Replay {
    /// Prepares the body for the next attempt.
    ///
    /// Any stream handed out for an earlier attempt stops yielding data once
    /// this is called, so a transport still draining a rejected request cannot
    /// steal bytes from the retry.
    ///
    /// # Errors
    ///
    /// Fails if a seekable body cannot be rewound.
    pub(crate) async fn next_attempt(&mut self) -> io::Result<AttemptBody> {
        match self {
            Replay::Bytes(bytes) => Ok(AttemptBody::Full(bytes.clone())),
            Replay::Seekable(shared) => {
                let generation = rewind(shared).await?;
                Ok(AttemptBody::Seekable(SeekableStream {
                    shared: Arc::clone(shared),
                    generation,
                    buf: BytesMut::new(),
                }))
            }
            Replay::Tee { shared, attempts } => {
                if *attempts > 0 {
                    let (captured, rest) = {
                        let mut state = lock(shared);
                        (mem::take(&mut state.captured), state.source.take())
                    };
                    tracing::debug!(
                        replayed_bytes = captured.len(),
                        "Replaying captured request body"
                    );
                    let head: BoxStream<'static, io::Result<Bytes>> = if captured.is_empty() {
                        stream::empty().boxed()
                    } else {
                        stream::once(async move { Ok(captured.freeze()) }).boxed()
                    };
                    let source = match rest {
                        Some(rest) => head.chain(rest).boxed(),
                        None => head,
                    };
                    *shared = TeeState::shared(source);
                }
                *attempts += 1;
                Ok(AttemptBody::Tee(TeeStream {
                    shared: Arc::clone(shared),
                }))
            }
        }
    }

    /// Bytes pulled from a non-seekable source so far in the current attempt.
    #[cfg(test)]
    pub(crate) fn captured(&self) -> Option<Bytes> {
        match self {
            Replay::Tee { shared, .. } => Some(Bytes::copy_from_slice(&lock(shared).captured)),
            _ => None,
        }
    }
}

/// The body of a single attempt.
pub(crate) enum AttemptBody {
    Full(Bytes),
    Seekable(SeekableStream),
    Tee(TeeStream),
}

impl From<AttemptBody> for reqwest::Body {
    fn from(body: AttemptBody) -> Self {
        match body {
            AttemptBody::Full(bytes) => reqwest::Body::from(bytes),
            AttemptBody::Seekable(stream) => reqwest::Body::wrap_stream(stream),
            AttemptBody::Tee(stream) => reqwest::Body::wrap_stream(stream),
        }
    }
}

pub(crate) struct SeekState {
    reader: Pin<Box<dyn SeekableRead>>,
    generation: u64,
}

/// Seeks the shared reader back to the start and returns the new generation.
async fn rewind(shared: &Arc<Mutex<SeekState>>) -> io::Result<u64> {
    let mut generation = None;
    let mut started = false;

    poll_fn(|cx| -> Poll<io::Result<u64>> {
        let mut state = lock(shared);
        let generation = *generation.get_or_insert_with(|| {
            state.generation += 1;
            state.generation
        });

        if !started {
            // Settle any operation an abandoned attempt left in flight.
            if state.reader.as_mut().poll_complete(cx)?.is_pending() {
                return Poll::Pending;
            }
            state.reader.as_mut().start_seek(SeekFrom::Start(0))?;
            started = true;
        }

        match state.reader.as_mut().poll_complete(cx) {
            Poll::Ready(Ok(_)) => Poll::Ready(Ok(generation)),
            Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
            Poll::Pending => Poll::Pending,
        }
    })
    .await
}

pub(crate) struct SeekableStream {
    shared: Arc<Mutex<SeekState>>,
    generation: u64,
    buf: BytesMut,
}

impl Stream for SeekableStream {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let mut state = lock(&this.shared);
        if state.generation != this.generation {
            return Poll::Ready(None);
        }

        if this.buf.capacity() == 0 {
            this.buf.reserve(CHUNK_SIZE);
        }
        match poll_read_buf(state.reader.as_mut(), cx, &mut this.buf) {
            Poll::Ready(Ok(0)) => Poll::Ready(None),
            Poll::Ready(Ok(_)) => Poll::Ready(Some(Ok(this.buf.split().freeze()))),
            Poll::Ready(Err(e)) => Poll::Ready(Some(Err(e))),
            Poll::Pending => Poll::Pending,
        }
    }
}

pub(crate) struct TeeState {
    source: Option<BoxStream<'static, io::Result<Bytes>>>,
    captured: BytesMut,
}

impl TeeState {
    fn shared(source: BoxStream<'static, io::Result<Bytes>>) -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(Self {
            source: Some(source),
            captured: BytesMut::new(),
        }))
    }
}

/// Forwards a stream while keeping a copy of every chunk it yields.
pub(crate) struct TeeStream {
    shared: Arc<Mutex<TeeState>>,
}

impl Stream for TeeStream {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut guard = lock(&self.shared);
        let state = &mut *guard;
        let Some(source) = state.source.as_mut() else {
            return Poll::Ready(None);
        };

        match source.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                state.captured.extend_from_slice(&chunk);
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(None) => {
                state.source = None;
                Poll::Ready(None)
            }
            other => other,
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::TryStreamExt;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn drain(body: AttemptBody) -> Vec<u8> {
        match body {
            AttemptBody::Full(bytes) => bytes.to_vec(),
            AttemptBody::Seekable(stream) => collect(stream).await,
            AttemptBody::Tee(stream) => collect(stream).await,
        }
    }

    async fn collect<S: Stream<Item = io::Result<Bytes>>>(stream: S) -> Vec<u8> {
        let chunks: Vec<Bytes> = stream.try_collect().await.unwrap();
        chunks.concat()
    }

    /// A stream of `chunks` that counts how many items were pulled from it.
    fn counted(chunks: &[&'static str], pulls: Arc<AtomicUsize>) -> RequestBody {
        let items: Vec<io::Result<Bytes>> = chunks
            .iter()
            .map(|c| Ok(Bytes::from_static(c.as_bytes())))
            .collect();
        RequestBody::stream(stream::iter(items).inspect(move |_| {
            pulls.fetch_add(1, Ordering::SeqCst);
        }))
    }

    #[tokio::test]
    async fn test_bytes_replay() {
        let mut replay = RequestBody::from("payload").into_replay();
        assert_eq!(drain(replay.next_attempt().await.unwrap()).await, b"payload");
        assert_eq!(drain(replay.next_attempt().await.unwrap()).await, b"payload");
    }

    #[tokio::test]
    async fn test_seekable_restarts_at_zero() {
        let mut cursor = Cursor::new(b"0123456789".to_vec());
        cursor.set_position(4);
        let mut replay = RequestBody::seekable(cursor).into_replay();

        assert_eq!(
            drain(replay.next_attempt().await.unwrap()).await,
            b"0123456789"
        );
        assert_eq!(
            drain(replay.next_attempt().await.unwrap()).await,
            b"0123456789"
        );
    }

    #[tokio::test]
    async fn test_seekable_stale_stream_stops() {
        let mut replay = RequestBody::seekable(Cursor::new(b"abc".to_vec())).into_replay();
        let first = replay.next_attempt().await.unwrap();
        let second = replay.next_attempt().await.unwrap();

        assert!(drain(first).await.is_empty());
        assert_eq!(drain(second).await, b"abc");
    }

    #[tokio::test]
    async fn test_stream_read_once_and_replayed() {
        let pulls = Arc::new(AtomicUsize::new(0));
        let mut replay = counted(&["ab", "cd", "ef"], Arc::clone(&pulls)).into_replay();

        let first = drain(replay.next_attempt().await.unwrap()).await;
        assert_eq!(first, b"abcdef");
        assert_eq!(replay.captured().unwrap(), Bytes::from_static(b"abcdef"));
        assert_eq!(pulls.load(Ordering::SeqCst), 3);

        let second = drain(replay.next_attempt().await.unwrap()).await;
        assert_eq!(second, first);
        assert_eq!(pulls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_stream_partially_read_before_retry() {
        let pulls = Arc::new(AtomicUsize::new(0));
        let mut replay = counted(&["ab", "cd", "ef"], Arc::clone(&pulls)).into_replay();

        let AttemptBody::Tee(mut first) = replay.next_attempt().await.unwrap() else {
            panic!("expected a tee body");
        };
        assert_eq!(first.next().await.unwrap().unwrap(), "ab");

        let second = replay.next_attempt().await.unwrap();
        // The abandoned attempt no longer sees the source.
        assert!(first.next().await.is_none());
        assert_eq!(drain(second).await, b"abcdef");
        assert_eq!(pulls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_nested_replay() {
        let pulls = Arc::new(AtomicUsize::new(0));
        let mut replay = counted(&["x", "y"], Arc::clone(&pulls)).into_replay();

        for _ in 0..3 {
            assert_eq!(drain(replay.next_attempt().await.unwrap()).await, b"xy");
        }
        assert_eq!(pulls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_reader_body() {
        let mut replay = RequestBody::reader(&b"from a reader"[..]).into_replay();
        assert_eq!(
            drain(replay.next_attempt().await.unwrap()).await,
            b"from a reader"
        );
        assert_eq!(
            drain(replay.next_attempt().await.unwrap()).await,
            b"from a reader"
        );
    }
}
