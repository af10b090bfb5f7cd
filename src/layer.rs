use crate::precedence::PrecedenceTable;
use crate::service::CompressionService;
use tower::Layer;

/// Default minimum body size for compression: compress everything.
pub const DEFAULT_MIN_SIZE: usize = 0;

/// Which negotiated responses still go out uncompressed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct CompressionRules {
    pub(crate) min_size: usize,
    pub(crate) skip_incompressible: bool,
}

/// A Tower layer that negotiates `Accept-Encoding` and compresses HTTP
/// response bodies.
///
/// This layer wraps services and automatically compresses response bodies
/// with the best coding both sides support, or answers
/// `406 Not Acceptable` when there is none.
#[derive(Debug, Clone)]
pub struct CompressionLayer {
    table: PrecedenceTable,
    rules: CompressionRules,
}

impl CompressionLayer {
    /// Creates a new compression layer with default settings.
    ///
    /// The default table offers deflate, gzip, br and zstd, and every
    /// negotiated response is compressed.
    pub fn new() -> Self {
        Self {
            table: PrecedenceTable::default(),
            rules: CompressionRules {
                min_size: DEFAULT_MIN_SIZE,
                skip_incompressible: false,
            },
        }
    }

    /// Sets the table used to resolve `Accept-Encoding` tokens.
    pub fn precedence(mut self, table: PrecedenceTable) -> Self {
        self.table = table;
        self
    }

    /// Sets the minimum body size required for compression.
    ///
    /// Responses with a known Content-Length smaller than this value
    /// will not be compressed.
    pub fn min_size(mut self, size: usize) -> Self {
        self.rules.min_size = size;
        self
    }

    /// Leaves already-compressed media (images other than SVG, and gRPC
    /// other than grpc-web) uncompressed.
    pub fn skip_incompressible(mut self, skip: bool) -> Self {
        self.rules.skip_incompressible = skip;
        self
    }
}

impl Default for CompressionLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Layer<S> for CompressionLayer {
    type Service = CompressionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CompressionService::new(inner, self.table.clone(), self.rules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coding::Coding;

    #[test]
    fn test_defaults() {
        let layer = CompressionLayer::default();
        assert_eq!(layer.rules.min_size, 0);
        assert!(!layer.rules.skip_incompressible);
        assert_eq!(layer.table.strongest(), Some(Coding::Zstd));
    }

    #[test]
    fn test_builder() {
        let layer = CompressionLayer::new()
            .min_size(860)
            .skip_incompressible(true)
            .precedence(PrecedenceTable::new([("gzip", Coding::Gzip)]));
        assert_eq!(
            layer.rules,
            CompressionRules {
                min_size: 860,
                skip_incompressible: true,
            }
        );
        assert_eq!(layer.table.strongest(), Some(Coding::Gzip));
    }

    #[test]
    fn test_services_share_table() {
        let layer = CompressionLayer::new();
        let a = layer.layer(());
        let b = layer.layer(());
        assert_eq!(
            a.precedence().iter().collect::<Vec<_>>(),
            b.precedence().iter().collect::<Vec<_>>()
        );
    }
}
