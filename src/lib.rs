//! HTTP content-coding negotiation and response compression for Tower.
//!
//! This crate provides a Tower layer that reads the client's `Accept-Encoding`
//! header, picks the best coding both sides support, and compresses the
//! response body with Deflate, Gzip, Brotli or Zstd on the fly.
//!
//! # Example
//!
//! ```ignore
//! use http_negotiated_compression::CompressionLayer;
//! use tower::ServiceBuilder;
//!
//! let service = ServiceBuilder::new()
//!     .layer(CompressionLayer::new())
//!     .service(my_service);
//! ```
//!
//! # Negotiation
//!
//! Each `token[;q=weight]` directive is resolved through a
//! [`PrecedenceTable`]. The highest weight wins; equal weights are broken by
//! server precedence, `identity < deflate < gzip < br < zstd`. The wildcard
//! `*` ranks as `zstd` but keeps its own weight, so `zstd, *;q=0` still picks
//! `zstd`. A directive with `q=0` is never chosen.
//!
//! - No `Accept-Encoding` field: the strongest coding (`zstd`) is used.
//! - An empty field: the response is sent as-is (identity).
//! - Nothing acceptable: `406 Not Acceptable` with an empty body, and the
//!   inner service is not called.
//!
//! # Compression Rules
//!
//! A negotiated response is still sent uncompressed when:
//! - `Content-Encoding` header is already set
//! - `Content-Range` header is present (range responses)
//! - [`CompressionLayer::skip_incompressible`] is on and `Content-Type` is
//!   `image/*` (except `image/svg+xml`) or `application/grpc` (except
//!   `application/grpc-web`)
//! - `Content-Length` is below [`CompressionLayer::min_size`]
//!
//! The middleware will **always flush** after each chunk when:
//! - `X-Accel-Buffering: no` header is present
//! - `Content-Type` is `text/event-stream`
//! - `Content-Type` starts with `application/grpc-web`
//!
//! # Response Modifications
//!
//! When compression is applied:
//! - `Content-Encoding` header is set to the coding used
//! - `Content-Length` header is removed (compressed size is unknown)
//! - `Accept-Ranges` header is removed
//! - `Vary` header includes `Accept-Encoding`
//!
//! Outside of HTTP bodies, [`EncodingWriter`] applies a coding to any
//! [`std::io::Write`] sink.

#![deny(missing_docs)]

mod body;
mod coding;
mod encoder;
mod future;
mod layer;
mod parser;
mod precedence;
mod service;
mod writer;

pub use body::CompressionBody;
pub use coding::Coding;
pub use future::ResponseFuture;
pub use layer::{CompressionLayer, DEFAULT_MIN_SIZE};
pub use parser::{Directive, Negotiation, Parser, QValue, parse};
pub use precedence::PrecedenceTable;
pub use service::{CompressionService, negotiate};
pub use writer::EncodingWriter;
