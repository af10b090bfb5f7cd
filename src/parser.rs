//! `Accept-Encoding` parsing and coding selection.
//!
//! The field value is a comma-separated list of `token` or `token;q=weight`
//! directives (RFC 9110 §12.5.3). A single forward pass records, per coding,
//! the weight the client gave it; the winner is the coding with the highest
//! `(weight, precedence)` pair.
//!
//! Only the separator shapes `,` and `, ` are understood. Other whitespace is
//! left inside the token, which then fails to resolve and is ignored.

use crate::coding::Coding;
use crate::precedence::PrecedenceTable;
use log::trace;
use std::fmt;

const WILDCARD: &[u8] = b"*";

/// A quality value, stored as thousandths in `0..=1000`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QValue(u16);

impl QValue {
    /// Weight `0`: not acceptable.
    pub const ZERO: QValue = QValue(0);
    /// Weight `1`, the default when a directive has no `q` parameter.
    pub const ONE: QValue = QValue(1000);

    /// Creates a quality value from thousandths, or `None` above `1000`.
    pub fn from_thousandths(value: u16) -> Option<QValue> {
        (value <= 1000).then_some(QValue(value))
    }

    /// Parses a `qvalue` per RFC 9110 §12.4.2.
    ///
    /// ```text
    /// qvalue = ( "0" [ "." 0*3DIGIT ] ) / ( "1" [ "." 0*3("0") ] )
    /// ```
    pub fn parse(s: impl AsRef<[u8]>) -> Option<QValue> {
        let s = s.as_ref();
        let (whole, fraction) = match s.iter().position(|&b| b == b'.') {
            Some(dot) => (&s[..dot], &s[dot + 1..]),
            None => (s, &b""[..]),
        };

        let whole = match whole {
            b"0" => 0,
            b"1" => 1000,
            _ => return None,
        };

        // A sender MUST NOT generate more than three digits after the point.
        if fraction.len() > 3 || !fraction.iter().all(u8::is_ascii_digit) {
            return None;
        }

        let fraction = fraction
            .iter()
            .zip([100, 10, 1])
            .map(|(digit, scale)| u16::from(digit - b'0') * scale)
            .sum::<u16>();

        QValue::from_thousandths(whole + fraction)
    }

    /// Returns the value in thousandths.
    pub fn thousandths(&self) -> u16 {
        self.0
    }

    /// Returns `true` for weight `0`.
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Returns the weight as a float in `[0, 1]`.
    pub fn as_f32(&self) -> f32 {
        f32::from(self.0) / 1000.0
    }
}

impl Default for QValue {
    fn default() -> Self {
        QValue::ONE
    }
}

impl fmt::Display for QValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            1000 => f.write_str("1"),
            0 => f.write_str("0"),
            n => {
                let digits = format!("{n:03}");
                write!(f, "0.{}", digits.trim_end_matches('0'))
            }
        }
    }
}

/// One `token[;q=weight]` element of an `Accept-Encoding` list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Directive<'a> {
    /// The coding token, exactly as sent.
    pub token: &'a [u8],
    /// The client's weight for the token.
    pub weight: QValue,
}

impl<'a> Directive<'a> {
    /// Parses one directive with its leading separator space already removed.
    ///
    /// Returns `None` if the quality suffix is malformed, in which case the
    /// whole directive must be ignored.
    pub fn parse(raw: &'a [u8]) -> Option<Directive<'a>> {
        let Some(semicolon) = raw.iter().position(|&b| b == b';') else {
            return Some(Directive {
                token: raw,
                weight: QValue::ONE,
            });
        };

        let token = &raw[..semicolon];
        let param = &raw[semicolon + 1..];
        let value = param
            .strip_prefix(b"q=")
            .or_else(|| param.strip_prefix(b"Q="))?;

        Some(Directive {
            token,
            weight: QValue::parse(value)?,
        })
    }
}

/// Outcome of negotiating one request's `Accept-Encoding`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Negotiation {
    /// The coding to respond with.
    Coding(Coding),
    /// Nothing the server offers is acceptable to the client.
    NotAcceptable,
}

impl Negotiation {
    /// Returns the chosen coding, if any.
    pub fn coding(&self) -> Option<Coding> {
        match self {
            Negotiation::Coding(coding) => Some(*coding),
            Negotiation::NotAcceptable => None,
        }
    }

    /// Returns `true` if a coding was chosen.
    pub fn is_acceptable(&self) -> bool {
        matches!(self, Negotiation::Coding(_))
    }
}

impl From<Option<Coding>> for Negotiation {
    fn from(coding: Option<Coding>) -> Self {
        coding.map_or(Negotiation::NotAcceptable, Negotiation::Coding)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Unseen,
    Weighted(QValue),
    Refused,
}

impl Slot {
    fn record(&mut self, weight: QValue) {
        *self = match *self {
            Slot::Refused => Slot::Refused,
            _ if weight.is_zero() => Slot::Refused,
            Slot::Weighted(seen) => Slot::Weighted(seen.max(weight)),
            Slot::Unseen => Slot::Weighted(weight),
        };
    }

    fn weight(self) -> Option<QValue> {
        match self {
            Slot::Weighted(weight) => Some(weight),
            Slot::Unseen | Slot::Refused => None,
        }
    }
}

/// Incremental `Accept-Encoding` parser.
///
/// Feed it every field line of the request with [`Parser::push`]; multiple
/// lines behave like one comma-joined list. [`Parser::finish`] reduces what
/// was seen to a single [`Negotiation`].
///
/// A coding given weight `0` is refused for the rest of the header, even if
/// it is mentioned again with a higher weight. When a coding is mentioned
/// several times with nonzero weights, the highest weight counts.
///
/// The wildcard `*` is tracked apart from the coding it resolves to: a
/// refused wildcard does not refuse a coding the client named, and a refused
/// coding does not refuse the wildcard.
#[derive(Debug, Clone)]
pub struct Parser<'t> {
    table: &'t PrecedenceTable,
    slots: [Slot; Coding::ALL.len()],
    wildcard: Slot,
    non_empty: bool,
}

impl<'t> Parser<'t> {
    /// Creates a parser resolving tokens through `table`.
    pub fn new(table: &'t PrecedenceTable) -> Self {
        Self {
            table,
            slots: [Slot::Unseen; Coding::ALL.len()],
            wildcard: Slot::Unseen,
            non_empty: false,
        }
    }

    /// Scans one field value.
    pub fn push(&mut self, value: impl AsRef<[u8]>) -> &mut Self {
        let value = value.as_ref();
        if value.is_empty() {
            return self;
        }
        self.non_empty = true;

        for raw in value.split(|&b| b == b',') {
            let raw = raw.strip_prefix(b" ").unwrap_or(raw);
            self.directive(raw);
        }
        self
    }

    fn directive(&mut self, raw: &[u8]) {
        let Some(directive) = Directive::parse(raw) else {
            trace!(
                "ignoring malformed accept-encoding directive {:?}",
                String::from_utf8_lossy(raw)
            );
            return;
        };

        let Some(coding) = self.table.lookup(directive.token) else {
            trace!(
                "ignoring unknown content coding {:?}",
                String::from_utf8_lossy(directive.token)
            );
            return;
        };

        let slot = if directive.token == WILDCARD {
            &mut self.wildcard
        } else {
            &mut self.slots[coding.index()]
        };
        slot.record(directive.weight);
    }

    /// Picks the winning coding.
    ///
    /// If every pushed value was empty (or nothing was pushed), the client
    /// asked for no content coding at all and the result is
    /// [`Coding::Identity`].
    pub fn finish(&self) -> Negotiation {
        if !self.non_empty {
            return Negotiation::Coding(Coding::Identity);
        }

        let wildcard = self
            .wildcard
            .weight()
            .zip(self.table.lookup(WILDCARD));

        self.slots
            .iter()
            .zip(Coding::ALL)
            .filter_map(|(slot, coding)| Some((slot.weight()?, coding)))
            .chain(wildcard)
            .max()
            .map(|(_, coding)| coding)
            .into()
    }

    /// Returns `true` if the client ruled `coding` out.
    ///
    /// That is an explicit weight `0` for the coding, or `*;q=0` when the
    /// coding itself was never named (RFC 9110 §12.5.3).
    pub fn refuses(&self, coding: Coding) -> bool {
        match self.slots[coding.index()] {
            Slot::Refused => true,
            Slot::Weighted(_) => false,
            Slot::Unseen => self.wildcard == Slot::Refused,
        }
    }
}

/// Parses a single `Accept-Encoding` field value and selects a coding.
///
/// An empty value selects [`Coding::Identity`]. A missing field is not the
/// same thing and must be handled by the caller; see
/// [`negotiate`](crate::negotiate).
pub fn parse(header: impl AsRef<[u8]>, table: &PrecedenceTable) -> Negotiation {
    Parser::new(table).push(header).finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn coding_of(header: &str) -> Option<Coding> {
        parse(header, &PrecedenceTable::default()).coding()
    }

    #[rstest]
    #[case("gzip, deflate, br;q=0.5", Some(Coding::Gzip))]
    #[case("deflate, gzip;q=0.5", Some(Coding::Deflate))]
    #[case("gzip;q=1.0, identity;q=0.5, *;q=0", Some(Coding::Gzip))]
    #[case("gzip, *", Some(Coding::Zstd))]
    #[case("gzip;q=0, *;q=0", None)]
    #[case("gzip, deflate, br, zstd", Some(Coding::Zstd))]
    #[case("gzip,br", Some(Coding::Brotli))]
    #[case("identity", Some(Coding::Identity))]
    #[case("br;q=0.4, gzip;q=0.8", Some(Coding::Gzip))]
    #[case("gzip;q=0.8, deflate;q=0.8", Some(Coding::Gzip))]
    #[case("deflate;q=0.8, gzip;q=0.8", Some(Coding::Gzip))]
    #[case("zstd;q=0, gzip", Some(Coding::Gzip))]
    #[case("gzip;q=0.001", Some(Coding::Gzip))]
    fn test_selection(#[case] header: &str, #[case] expected: Option<Coding>) {
        assert_eq!(coding_of(header), expected);
    }

    #[test]
    fn test_empty_header_is_identity() {
        assert_eq!(
            parse("", &PrecedenceTable::default()),
            Negotiation::Coding(Coding::Identity)
        );
    }

    #[test]
    fn test_default_weight_uses_precedence_not_order() {
        assert_eq!(coding_of("zstd, deflate"), Some(Coding::Zstd));
        assert_eq!(coding_of("deflate, zstd"), Some(Coding::Zstd));
        assert_eq!(coding_of("br, gzip, identity"), Some(Coding::Brotli));
        assert_eq!(coding_of("identity, gzip"), Some(Coding::Gzip));
    }

    #[test]
    fn test_zero_weight_never_selected() {
        assert_eq!(coding_of("zstd;q=0"), None);
        assert_eq!(coding_of("zstd;q=0, deflate;q=0.1"), Some(Coding::Deflate));
        assert_eq!(coding_of("zstd;q=0.000, gzip;q=0.5"), Some(Coding::Gzip));
    }

    #[test]
    fn test_first_zero_wins_for_repeated_token() {
        assert_eq!(coding_of("gzip;q=0, gzip;q=0.9"), None);
        assert_eq!(coding_of("gzip;q=0.9, gzip;q=0"), None);
        assert_eq!(coding_of("gzip;q=0, gzip, deflate;q=0.2"), Some(Coding::Deflate));
    }

    #[test]
    fn test_repeated_token_keeps_highest_weight() {
        assert_eq!(coding_of("gzip;q=0.2, br;q=0.5, gzip;q=0.9"), Some(Coding::Gzip));
        assert_eq!(coding_of("gzip;q=0.9, br;q=0.5, gzip;q=0.2"), Some(Coding::Gzip));
    }

    #[rstest]
    #[case("zstd, *;q=0", Some(Coding::Zstd))]
    #[case("zstd;q=0.5, *;q=0", Some(Coding::Zstd))]
    #[case("*;q=0, zstd, br;q=0.3", Some(Coding::Zstd))]
    #[case("*;q=0, br;q=0.3", Some(Coding::Brotli))]
    #[case("zstd;q=0, *", Some(Coding::Zstd))]
    #[case("zstd;q=0, *;q=0.5, gzip", Some(Coding::Gzip))]
    #[case("zstd;q=0, *;q=0", None)]
    fn test_wildcard_has_its_own_slot(#[case] header: &str, #[case] expected: Option<Coding>) {
        assert_eq!(coding_of(header), expected);
    }

    fn scan<'t>(table: &'t PrecedenceTable, header: &str) -> Parser<'t> {
        let mut parser = Parser::new(table);
        parser.push(header);
        parser
    }

    #[test]
    fn test_refuses() {
        let table = PrecedenceTable::default();
        assert!(scan(&table, "identity;q=0, gzip").refuses(Coding::Identity));
        assert!(scan(&table, "gzip, *;q=0").refuses(Coding::Identity));
        assert!(!scan(&table, "identity;q=0.5, *;q=0").refuses(Coding::Identity));
        assert!(!scan(&table, "gzip").refuses(Coding::Identity));
        assert!(!scan(&table, "").refuses(Coding::Identity));
        assert!(scan(&table, "br;q=0, *").refuses(Coding::Brotli));
        assert!(!scan(&table, "br;q=0, *").refuses(Coding::Gzip));
    }

    #[test]
    fn test_unrecognized_only_is_not_acceptable() {
        let result = parse("compress, x-foo;q=0.5", &PrecedenceTable::default());
        assert_eq!(result, Negotiation::NotAcceptable);
        assert!(!result.is_acceptable());
        assert_eq!(result.coding(), None);
    }

    #[test]
    fn test_unknown_zero_weight_ignored() {
        assert_eq!(coding_of("compress;q=0, gzip"), Some(Coding::Gzip));
    }

    #[test]
    fn test_too_many_fraction_digits_discards_directive() {
        assert_eq!(coding_of("gzip;q=0.5000"), None);
        assert_eq!(coding_of("br;q=0.1234, gzip;q=0.1"), Some(Coding::Gzip));
        // A discarded zero does not refuse the coding either.
        assert_eq!(coding_of("gzip;q=0.0000, gzip;q=0.5"), Some(Coding::Gzip));
    }

    #[test]
    fn test_malformed_quality_discards_directive() {
        assert_eq!(coding_of("gzip;q=abc, deflate"), Some(Coding::Deflate));
        assert_eq!(coding_of("br;q=, deflate"), Some(Coding::Deflate));
        assert_eq!(coding_of("br;q=1.5, deflate"), Some(Coding::Deflate));
        assert_eq!(coding_of("br;level=1, deflate"), Some(Coding::Deflate));
        assert_eq!(coding_of("br; q=1, deflate"), Some(Coding::Deflate));
    }

    #[test]
    fn test_quality_at_end_of_input() {
        assert_eq!(coding_of("deflate, br;q=0.9"), Some(Coding::Deflate));
        assert_eq!(coding_of("deflate;q=0.5, br;q=0.9"), Some(Coding::Brotli));
    }

    #[test]
    fn test_uppercase_tokens_and_q() {
        assert_eq!(coding_of("GZIP;Q=0.5, Deflate;q=0.4"), Some(Coding::Gzip));
    }

    #[test]
    fn test_extra_whitespace_not_tolerated() {
        // Two spaces leave one in front of the token.
        assert_eq!(coding_of("deflate,  zstd"), Some(Coding::Deflate));
        assert_eq!(coding_of("deflate\t,br"), Some(Coding::Brotli));
    }

    #[test]
    fn test_trailing_separator() {
        assert_eq!(coding_of("gzip, "), Some(Coding::Gzip));
        assert_eq!(coding_of(","), None);
    }

    #[test]
    fn test_idempotent() {
        let table = PrecedenceTable::default();
        for header in ["", "gzip, *", "gzip;q=0, *;q=0", "br;q=0.3, deflate"] {
            assert_eq!(parse(header, &table), parse(header, &table));
        }
    }

    #[test]
    fn test_multiple_field_lines() {
        let table = PrecedenceTable::default();
        let mut parser = Parser::new(&table);
        parser.push("gzip;q=0.5").push("br;q=0.7");
        assert_eq!(parser.finish(), Negotiation::Coding(Coding::Brotli));

        let mut parser = Parser::new(&table);
        parser.push("").push("");
        assert_eq!(parser.finish(), Negotiation::Coding(Coding::Identity));

        let mut parser = Parser::new(&table);
        parser.push("").push("gzip;q=0");
        assert_eq!(parser.finish(), Negotiation::NotAcceptable);
    }

    #[test]
    fn test_non_utf8_bytes_ignored() {
        let table = PrecedenceTable::default();
        assert_eq!(
            parse(&b"\xffgzip, deflate"[..], &table),
            Negotiation::Coding(Coding::Deflate)
        );
    }

    #[test]
    fn test_custom_table() {
        let table = PrecedenceTable::new([
            ("gzip", Coding::Gzip),
            ("x-gzip", Coding::Gzip),
            ("*", Coding::Gzip),
        ]);
        assert_eq!(parse("br, x-gzip;q=0.5", &table).coding(), Some(Coding::Gzip));
        assert_eq!(parse("zstd", &table).coding(), None);
        assert_eq!(parse("*", &table).coding(), Some(Coding::Gzip));
    }

    #[rstest]
    #[case("0", Some(0))]
    #[case("0.", Some(0))]
    #[case("0.5", Some(500))]
    #[case("0.05", Some(50))]
    #[case("0.123", Some(123))]
    #[case("1", Some(1000))]
    #[case("1.000", Some(1000))]
    #[case("1.001", None)]
    #[case("0.1234", None)]
    #[case(".5", None)]
    #[case("2", None)]
    #[case("", None)]
    #[case("0.5 ", None)]
    #[case("-0", None)]
    fn test_qvalue_parse(#[case] input: &str, #[case] expected: Option<u16>) {
        assert_eq!(QValue::parse(input).map(|q| q.thousandths()), expected);
    }

    #[test]
    fn test_qvalue_display() {
        assert_eq!(QValue::ONE.to_string(), "1");
        assert_eq!(QValue::ZERO.to_string(), "0");
        assert_eq!(QValue::parse("0.5").unwrap().to_string(), "0.5");
        assert_eq!(QValue::parse("0.05").unwrap().to_string(), "0.05");
        assert_eq!(QValue::parse("0.125").unwrap().to_string(), "0.125");
    }

    #[test]
    fn test_qvalue_as_f32() {
        assert_eq!(QValue::ONE.as_f32(), 1.0);
        assert_eq!(QValue::parse("0.5").unwrap().as_f32(), 0.5);
    }

    #[test]
    fn test_directive_parse() {
        assert_eq!(
            Directive::parse(b"gzip"),
            Some(Directive {
                token: b"gzip",
                weight: QValue::ONE
            })
        );
        assert_eq!(
            Directive::parse(b"br;q=0.25"),
            Some(Directive {
                token: b"br",
                weight: QValue::from_thousandths(250).unwrap()
            })
        );
        assert_eq!(Directive::parse(b"br;q=0.2500"), None);
    }
}
