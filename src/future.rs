use crate::body::CompressionBody;
use crate::coding::Coding;
use crate::layer::CompressionRules;
use http::{Response, StatusCode, header};
use log::debug;
use pin_project_lite::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

pin_project! {
    /// Future for compression service responses.
    pub struct ResponseFuture<F> {
        #[pin]
        kind: Kind<F>,
    }
}

pin_project! {
    #[project = KindProj]
    enum Kind<F> {
        Negotiated {
            #[pin]
            inner: F,
            coding: Coding,
            rules: CompressionRules,
            identity_refused: bool,
        },
        NotAcceptable,
    }
}

impl<F> ResponseFuture<F> {
    pub(crate) fn negotiated(
        inner: F,
        coding: Coding,
        rules: CompressionRules,
        identity_refused: bool,
    ) -> Self {
        Self {
            kind: Kind::Negotiated {
                inner,
                coding,
                rules,
                identity_refused,
            },
        }
    }

    pub(crate) fn not_acceptable() -> Self {
        Self {
            kind: Kind::NotAcceptable,
        }
    }
}

impl<F, B, E> Future for ResponseFuture<F>
where
    F: Future<Output = Result<Response<B>, E>>,
{
    type Output = Result<Response<CompressionBody<B>>, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.project().kind.project() {
            KindProj::NotAcceptable => Poll::Ready(Ok(not_acceptable_response())),
            KindProj::Negotiated {
                inner,
                coding,
                rules,
                identity_refused,
            } => match inner.poll(cx) {
                Poll::Pending => Poll::Pending,
                Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
                Poll::Ready(Ok(response)) => Poll::Ready(Ok(wrap_response(
                    response,
                    *coding,
                    rules,
                    *identity_refused,
                ))),
            },
        }
    }
}

/// Builds the `406 Not Acceptable` response: empty body, no
/// `Content-Encoding`.
fn not_acceptable_response<B>() -> Response<CompressionBody<B>> {
    let mut response = Response::new(CompressionBody::empty());
    *response.status_mut() = StatusCode::NOT_ACCEPTABLE;
    add_vary_accept_encoding(response.headers_mut());
    response
}

/// Wraps the response body with the negotiated coding if appropriate.
///
/// When the client refused identity, the size and content-type rules do not
/// apply: the response is compressed anyway.
fn wrap_response<B>(
    response: Response<B>,
    coding: Coding,
    rules: &CompressionRules,
    identity_refused: bool,
) -> Response<CompressionBody<B>> {
    let (mut parts, body) = response.into_parts();

    if coding == Coding::Identity {
        return Response::from_parts(parts, CompressionBody::passthrough(body));
    }

    if let Some(reason) = skip_reason(&parts.headers, rules, identity_refused) {
        debug!("not compressing response with {coding}: {reason}");
        return Response::from_parts(parts, CompressionBody::passthrough(body));
    }

    // Check for x-accel-buffering: no header or streaming content types
    let always_flush = parts
        .headers
        .get("x-accel-buffering")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("no"))
        || is_streaming_content_type(&parts.headers);

    parts.headers.insert(
        header::CONTENT_ENCODING,
        header::HeaderValue::from_static(coding.content_encoding()),
    );

    // Remove Content-Length since compressed size is unknown
    parts.headers.remove(header::CONTENT_LENGTH);

    // Remove Accept-Ranges since we can't support ranges on compressed content
    parts.headers.remove(header::ACCEPT_RANGES);

    add_vary_accept_encoding(&mut parts.headers);

    Response::from_parts(parts, CompressionBody::compressed(body, coding, always_flush))
}

/// Returns why the response must go out uncompressed, if it must.
fn skip_reason(
    headers: &header::HeaderMap,
    rules: &CompressionRules,
    identity_refused: bool,
) -> Option<&'static str> {
    if headers.contains_key(header::CONTENT_ENCODING) {
        return Some("already encoded");
    }
    if headers.contains_key(header::CONTENT_RANGE) {
        return Some("range response");
    }
    if identity_refused {
        return None;
    }
    if rules.skip_incompressible && is_uncompressible_content_type(headers) {
        return Some("incompressible content type");
    }
    if is_below_min_size(headers, rules.min_size) {
        return Some("below minimum size");
    }
    None
}

/// Adds Accept-Encoding to the Vary header if not already present.
fn add_vary_accept_encoding(headers: &mut header::HeaderMap) {
    let covered = headers
        .get_all(header::VARY)
        .iter()
        .filter_map(|vary| vary.to_str().ok())
        .flat_map(|vary| vary.split(','))
        .map(str::trim)
        .any(|v| v == "*" || v.eq_ignore_ascii_case("accept-encoding"));

    if !covered {
        headers.append(
            header::VARY,
            header::HeaderValue::from_static("accept-encoding"),
        );
    }
}

/// Checks if the content type should not be compressed.
fn is_uncompressible_content_type(headers: &header::HeaderMap) -> bool {
    let Some(content_type) = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
    else {
        return false;
    };

    // Skip all images except SVG
    if content_type.starts_with("image/") {
        return !content_type.starts_with("image/svg+xml");
    }

    // Skip gRPC except grpc-web
    if content_type.starts_with("application/grpc") {
        return !content_type.starts_with("application/grpc-web");
    }

    false
}

/// Checks if the content type requires always flushing (e.g., streaming).
fn is_streaming_content_type(headers: &header::HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| {
            ct.starts_with("text/event-stream") || ct.starts_with("application/grpc-web")
        })
}

/// Checks if Content-Length is below the minimum size.
fn is_below_min_size(headers: &header::HeaderMap, min_size: usize) -> bool {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok())
        .is_some_and(|len| len < min_size)
}
