use compression_codecs::{
    EncodeV2,
    brotli::{BrotliEncoder, params::EncoderParams as BrotliParams},
    gzip::GzipEncoder,
    zlib::ZlibEncoder,
    zstd::ZstdEncoder,
};
use compression_core::Level;
use std::fmt;

/// Content codings known to the negotiator.
///
/// Declaration order is the server-side precedence: when a client gives two
/// codings the same weight, the one declared later wins. `Ord` follows that
/// order, so `Coding::Zstd > Coding::Identity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Coding {
    /// No transformation.
    Identity,
    /// Zlib-wrapped deflate.
    Deflate,
    /// Gzip.
    Gzip,
    /// Brotli.
    Brotli,
    /// Zstandard.
    Zstd,
}

impl Coding {
    /// Every coding, lowest precedence first.
    pub const ALL: [Coding; 5] = [
        Coding::Identity,
        Coding::Deflate,
        Coding::Gzip,
        Coding::Brotli,
        Coding::Zstd,
    ];

    /// Returns the canonical token for this coding, as used in
    /// `Accept-Encoding` and `Content-Encoding`.
    pub fn content_encoding(&self) -> &'static str {
        match self {
            Coding::Identity => "identity",
            Coding::Deflate => "deflate",
            Coding::Gzip => "gzip",
            Coding::Brotli => "br",
            Coding::Zstd => "zstd",
        }
    }

    /// Returns the precedence ordinal of this coding.
    pub fn precedence(&self) -> u8 {
        *self as u8
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }

    /// Creates a streaming encoder for this coding.
    ///
    /// Returns `None` for [`Coding::Identity`], which has nothing to encode.
    pub(crate) fn encoder(&self) -> Option<Box<dyn EncodeV2 + Send>> {
        let encoder: Box<dyn EncodeV2 + Send> = match self {
            Coding::Identity => return None,
            Coding::Zstd => Box::new(ZstdEncoder::new(3)), // level 3 is a good default
            Coding::Brotli => Box::new(BrotliEncoder::new(BrotliParams::default())),
            Coding::Gzip => Box::new(GzipEncoder::new(Level::Default.into())),
            // HTTP "deflate" is the zlib format, not raw deflate.
            Coding::Deflate => Box::new(ZlibEncoder::new(Level::Default.into())),
        };
        Some(encoder)
    }
}

impl fmt::Display for Coding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.content_encoding())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_encoding() {
        assert_eq!(Coding::Identity.content_encoding(), "identity");
        assert_eq!(Coding::Zstd.content_encoding(), "zstd");
        assert_eq!(Coding::Brotli.content_encoding(), "br");
        assert_eq!(Coding::Gzip.content_encoding(), "gzip");
        assert_eq!(Coding::Deflate.content_encoding(), "deflate");
    }

    #[test]
    fn test_precedence_strictly_increasing() {
        for pair in Coding::ALL.windows(2) {
            assert!(pair[0] < pair[1]);
            assert!(pair[0].precedence() < pair[1].precedence());
        }
        assert_eq!(Coding::ALL.iter().max(), Some(&Coding::Zstd));
    }

    #[test]
    fn test_index_matches_position() {
        for (i, coding) in Coding::ALL.iter().enumerate() {
            assert_eq!(coding.index(), i);
        }
    }

    #[test]
    fn test_identity_has_no_encoder() {
        assert!(Coding::Identity.encoder().is_none());
        assert!(Coding::Gzip.encoder().is_some());
        assert!(Coding::Zstd.encoder().is_some());
    }
}
