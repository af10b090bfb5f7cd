use crate::coding::Coding;
use crate::future::ResponseFuture;
use crate::layer::CompressionRules;
use crate::parser::{Negotiation, Parser};
use crate::precedence::PrecedenceTable;
use http::{HeaderMap, Request, header};
use log::debug;
use std::task::{Context, Poll};
use tower::Service;

/// A Tower service that negotiates a content coding and compresses HTTP
/// response bodies.
#[derive(Debug, Clone)]
pub struct CompressionService<S> {
    inner: S,
    table: PrecedenceTable,
    rules: CompressionRules,
}

impl<S> CompressionService<S> {
    pub(crate) fn new(inner: S, table: PrecedenceTable, rules: CompressionRules) -> Self {
        Self {
            inner,
            table,
            rules,
        }
    }

    /// Returns the table used to resolve `Accept-Encoding` tokens.
    pub fn precedence(&self) -> &PrecedenceTable {
        &self.table
    }

    /// Returns a reference to the inner service.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Returns a mutable reference to the inner service.
    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// Consumes this service, returning the inner service.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for CompressionService<S>
where
    S: Service<Request<ReqBody>, Response = http::Response<ResBody>>,
{
    type Response = http::Response<crate::body::CompressionBody<ResBody>>;
    type Error = S::Error;
    type Future = ResponseFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let parser = scan_accept_encoding(req.headers(), &self.table);
        let negotiation = match &parser {
            Some(parser) => parser.finish(),
            None => self.table.strongest().into(),
        };
        let identity_refused = parser.is_some_and(|parser| parser.refuses(Coding::Identity));
        debug!(
            "{} {}: accept-encoding negotiated to {negotiation:?}",
            req.method(),
            req.uri().path()
        );

        match negotiation {
            Negotiation::Coding(coding) => ResponseFuture::negotiated(
                self.inner.call(req),
                coding,
                self.rules,
                identity_refused,
            ),
            // The inner service never sees a request it cannot answer.
            Negotiation::NotAcceptable => ResponseFuture::not_acceptable(),
        }
    }
}

/// Negotiates a coding from a request's headers.
///
/// Without any `Accept-Encoding` field every coding is acceptable, so the
/// strongest coding in `table` is chosen. Otherwise all field lines are
/// parsed as one list.
pub fn negotiate(headers: &HeaderMap, table: &PrecedenceTable) -> Negotiation {
    match scan_accept_encoding(headers, table) {
        Some(parser) => parser.finish(),
        None => table.strongest().into(),
    }
}

/// Feeds every `Accept-Encoding` field line to a parser, or returns `None`
/// when the request has no such field.
fn scan_accept_encoding<'t>(
    headers: &HeaderMap,
    table: &'t PrecedenceTable,
) -> Option<Parser<'t>> {
    let mut values = headers.get_all(header::ACCEPT_ENCODING).iter().peekable();
    values.peek()?;

    let mut parser = Parser::new(table);
    for value in values {
        parser.push(value);
    }
    Some(parser)
}
