use crate::coding::Coding;
use std::sync::Arc;

/// Token to coding mapping used to resolve `Accept-Encoding` directives.
///
/// The table is immutable once built and cheap to clone; every clone shares
/// the same entries. Tokens are matched ASCII case-insensitively.
///
/// The default table recognizes `identity`, `deflate`, `gzip`, `br` and
/// `zstd`, and maps the wildcard `*` to [`Coding::Zstd`], the strongest
/// coding the server offers.
#[derive(Debug, Clone)]
pub struct PrecedenceTable {
    entries: Arc<[(Box<str>, Coding)]>,
}

impl PrecedenceTable {
    /// Builds a table from `(token, coding)` pairs.
    ///
    /// Tokens are stored lowercased. If a token appears more than once the
    /// first pair wins.
    pub fn new<I, T>(entries: I) -> Self
    where
        I: IntoIterator<Item = (T, Coding)>,
        T: AsRef<str>,
    {
        let mut table: Vec<(Box<str>, Coding)> = Vec::new();
        for (token, coding) in entries {
            let token = token.as_ref().to_ascii_lowercase();
            if table.iter().all(|(existing, _)| **existing != *token) {
                table.push((token.into_boxed_str(), coding));
            }
        }
        Self {
            entries: table.into(),
        }
    }

    /// Resolves a token to its coding, or `None` if the token is unknown.
    pub fn lookup(&self, token: impl AsRef<[u8]>) -> Option<Coding> {
        let token = token.as_ref();
        self.entries
            .iter()
            .find(|(name, _)| name.as_bytes().eq_ignore_ascii_case(token))
            .map(|(_, coding)| *coding)
    }

    /// Returns the highest-precedence coding reachable through this table.
    ///
    /// This is what the server picks when the client sent no
    /// `Accept-Encoding` field at all.
    pub fn strongest(&self) -> Option<Coding> {
        self.entries.iter().map(|(_, coding)| *coding).max()
    }

    /// Iterates over the `(token, coding)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Coding)> {
        self.entries.iter().map(|(token, coding)| (&**token, *coding))
    }
}

impl Default for PrecedenceTable {
    fn default() -> Self {
        Self::new([
            ("identity", Coding::Identity),
            ("deflate", Coding::Deflate),
            ("gzip", Coding::Gzip),
            ("br", Coding::Brotli),
            ("zstd", Coding::Zstd),
            ("*", Coding::Zstd),
        ])
    }
}
