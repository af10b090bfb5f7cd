use crate::coding::Coding;
use crate::encoder::Encoder;
use bytes::{Buf, Bytes, BytesMut};
use http_body::{Body, Frame, SizeHint};
use log::warn;
use pin_project_lite::pin_project;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

pin_project! {
    /// A response body produced by the compression middleware.
    ///
    /// The inner body is either compressed with the negotiated coding,
    /// passed through unchanged, or, for rejected requests, absent.
    #[project = CompressionBodyProj]
    #[allow(missing_docs)]
    pub enum CompressionBody<B> {
        /// Compressed body with encoder.
        Compressed {
            #[pin]
            inner: B,
            state: CompressedBody,
        },
        /// Passthrough body without compression.
        Passthrough {
            #[pin]
            inner: B,
        },
        /// Empty body of a `406 Not Acceptable` response.
        Empty,
    }
}

/// State and buffers for an actively compressed body.
pub(crate) struct CompressedBody {
    encoder: Encoder,
    always_flush: bool,
    state: CompressState,
    pending_trailers: Option<http::HeaderMap>,
}

/// State machine for compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CompressState {
    /// Reading data from inner body and compressing.
    Reading,
    /// Finishing compression after inner body is done.
    Finishing,
    /// Emitting buffered trailers.
    Trailers,
    /// Compression is complete, or the stream failed.
    Done,
}

type PollFrame = Poll<Option<Result<Frame<Bytes>, io::Error>>>;

impl CompressedBody {
    fn new(encoder: Encoder, always_flush: bool) -> Self {
        Self {
            encoder,
            always_flush,
            state: CompressState::Reading,
            pending_trailers: None,
        }
    }

    /// Returns the current compression state.
    pub(crate) fn state(&self) -> CompressState {
        self.state
    }

    /// Returns whether always flush is enabled.
    #[allow(dead_code)]
    pub(crate) fn always_flush(&self) -> bool {
        self.always_flush
    }

    /// Polls the inner body and compresses data.
    fn poll_compressed<B>(&mut self, cx: &mut Context<'_>, mut inner: Pin<&mut B>) -> PollFrame
    where
        B: Body,
        B::Data: Buf,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        loop {
            match self.state {
                CompressState::Done => return Poll::Ready(None),

                CompressState::Trailers => {
                    self.state = CompressState::Done;
                    return match self.pending_trailers.take() {
                        Some(trailers) => Poll::Ready(Some(Ok(Frame::trailers(trailers)))),
                        None => Poll::Ready(None),
                    };
                }

                CompressState::Finishing => {
                    let mut output = BytesMut::new();
                    if let Err(e) = self.encoder.finish(&mut output) {
                        return self.fail(e);
                    }
                    self.state = if self.pending_trailers.is_some() {
                        CompressState::Trailers
                    } else {
                        CompressState::Done
                    };
                    if !output.is_empty() {
                        return Poll::Ready(Some(Ok(Frame::data(output.freeze()))));
                    }
                }

                CompressState::Reading => match inner.as_mut().poll_frame(cx) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(None) => {
                        // Inner body is done, transition to finishing
                        self.state = CompressState::Finishing;
                    }
                    Poll::Ready(Some(Err(e))) => {
                        return self.fail(io::Error::other(e.into()));
                    }
                    Poll::Ready(Some(Ok(frame))) => match frame.into_data() {
                        Ok(data) => match self.compress_chunk(data) {
                            Ok(output) if output.is_empty() => {}
                            Ok(output) => return Poll::Ready(Some(Ok(Frame::data(output)))),
                            Err(e) => return self.fail(e),
                        },
                        Err(frame) => {
                            if let Ok(trailers) = frame.into_trailers() {
                                // Buffer trailers and finish compression first
                                self.pending_trailers = Some(trailers);
                                self.state = CompressState::Finishing;
                            }
                        }
                    },
                },
            }
        }
    }

    /// Compresses one data frame, flushing afterwards if always_flush is set.
    ///
    /// An empty result means the encoder buffered everything.
    fn compress_chunk<D: Buf>(&mut self, mut data: D) -> io::Result<Bytes> {
        let mut output = BytesMut::new();
        while data.has_remaining() {
            let chunk = data.chunk();
            let len = chunk.len();
            self.encoder.encode(chunk, &mut output)?;
            data.advance(len);
        }
        if self.always_flush {
            self.encoder.flush(&mut output)?;
        }
        Ok(output.freeze())
    }

    /// Ends the stream with an error; no trailer is emitted for it.
    fn fail(&mut self, e: io::Error) -> PollFrame {
        warn!("aborting {} response body: {e}", self.encoder.coding());
        self.encoder.release();
        self.pending_trailers = None;
        self.state = CompressState::Done;
        Poll::Ready(Some(Err(e)))
    }
}

impl<B> CompressionBody<B> {
    /// Creates a body compressed with `coding`.
    ///
    /// [`Coding::Identity`] yields a passthrough body.
    pub fn compressed(inner: B, coding: Coding, always_flush: bool) -> Self {
        match Encoder::new(coding) {
            Some(encoder) => Self::Compressed {
                inner,
                state: CompressedBody::new(encoder, always_flush),
            },
            None => Self::passthrough(inner),
        }
    }

    /// Creates a passthrough body without compression.
    pub fn passthrough(inner: B) -> Self {
        Self::Passthrough { inner }
    }

    /// Creates an empty body.
    pub fn empty() -> Self {
        Self::Empty
    }

    /// Returns the coding applied to the inner body, if it is compressed.
    pub fn coding(&self) -> Option<Coding> {
        match self {
            CompressionBody::Compressed { state, .. } => Some(state.encoder.coding()),
            CompressionBody::Passthrough { .. } | CompressionBody::Empty => None,
        }
    }
}

impl<B> Body for CompressionBody<B>
where
    B: Body,
    B::Data: Buf,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    type Data = Bytes;
    type Error = io::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.project() {
            CompressionBodyProj::Passthrough { inner } => match inner.poll_frame(cx) {
                Poll::Pending => Poll::Pending,
                Poll::Ready(None) => Poll::Ready(None),
                Poll::Ready(Some(Ok(frame))) => Poll::Ready(Some(Ok(
                    frame.map_data(|mut data| data.copy_to_bytes(data.remaining()))
                ))),
                Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(io::Error::other(e.into())))),
            },
            CompressionBodyProj::Compressed { inner, state } => state.poll_compressed(cx, inner),
            CompressionBodyProj::Empty => Poll::Ready(None),
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            CompressionBody::Passthrough { inner } => inner.is_end_stream(),
            CompressionBody::Compressed { state, .. } => state.state() == CompressState::Done,
            CompressionBody::Empty => true,
        }
    }

    fn size_hint(&self) -> SizeHint {
        match self {
            CompressionBody::Passthrough { inner } => inner.size_hint(),
            // Compressed size is unknown
            CompressionBody::Compressed { .. } => SizeHint::default(),
            CompressionBody::Empty => SizeHint::with_exact(0),
        }
    }
}
