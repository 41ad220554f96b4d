use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt;
use std::io::BufRead;

use tracing::{debug, trace, warn};

use crate::Error;
use crate::cancel::CancellationToken;
use crate::env::EnvFile;
use crate::variable::{Location, QuoteStyle, Variable, is_valid_name};

/// Classifies a syntax error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyntaxErrorKind {
    /// Neither `=` nor `:` found on a declaration line.
    MissingSeparator { text: String },
    /// Name does not match `[A-Za-z_][A-Za-z0-9_.-]*`.
    InvalidName { name: String },
    /// `export NAME` for a name not declared earlier in the file.
    UndeclaredExport { name: String },
}

impl fmt::Display for SyntaxErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSeparator { text } => {
                write!(f, "no separator found in line: {text}")
            }
            Self::InvalidName { name } => {
                write!(f, "invalid variable name {name:?}")
            }
            Self::UndeclaredExport { name } => {
                write!(f, "export of unset variable {name:?}")
            }
        }
    }
}

/// Error produced while splitting an env file into variables.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} at line {line}")]
pub struct SyntaxError {
    pub kind: SyntaxErrorKind,
    /// 1-based physical line number.
    pub line: usize,
}

/// Parse an env file read from `reader` with an unnamed source.
///
/// # Errors
///
/// Returns `Error::Syntax` on malformed declarations, `Error::Io` if
/// the reader fails and `Error::Cancelled` once `cancel` fires.
pub fn parse<R: BufRead>(reader: R, cancel: &CancellationToken) -> Result<EnvFile, Error> {
    Parser::new().parse(reader, cancel)
}

/// Configurable env file parser.
///
/// ```
/// use envfile_rs::{CancellationToken, Parser};
///
/// let file = Parser::new()
///     .source("app.env")
///     .parse("PORT=8080\n".as_bytes(), &CancellationToken::new())
///     .unwrap();
/// assert_eq!(file.variables()[0].location.as_str(), "app.env:1");
/// ```
#[derive(Debug, Clone, Default)]
pub struct Parser {
    source: String,
}

impl Parser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the source name used as the prefix of every `Location`.
    #[must_use]
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Split `reader` into variable declarations.
    ///
    /// Values are left unexpanded; see [`EnvFile::resolve`].
    ///
    /// # Errors
    ///
    /// See [`parse`].
    pub fn parse<R: BufRead>(
        &self,
        reader: R,
        cancel: &CancellationToken,
    ) -> Result<EnvFile, Error> {
        let mut lines = Lines {
            inner: reader,
            buf: Vec::new(),
            line: 0,
            cancel,
        };
        let mut variables = Vec::new();
        let mut declared = HashSet::new();

        while let Some(text) = lines.next_line()? {
            let start_line = lines.line;
            let trimmed = text.trim_start();

            if trimmed.is_empty() || trimmed.starts_with('#') {
                trace!(line = start_line, "skipping blank or comment line");
                continue;
            }

            let (rest, exported) = trimmed
                .strip_prefix("export ")
                .map_or((trimmed, false), |rest| (rest, true));

            let Some(sep) = rest.find(['=', ':']) else {
                let name = rest.trim();
                if exported && declared.contains(name) {
                    continue;
                }
                let kind = if exported {
                    SyntaxErrorKind::UndeclaredExport {
                        name: name.to_string(),
                    }
                } else {
                    SyntaxErrorKind::MissingSeparator { text: text.clone() }
                };
                return Err(SyntaxError {
                    kind,
                    line: start_line,
                }
                .into());
            };

            let name = rest[..sep].trim();
            if !is_valid_name(name) {
                return Err(SyntaxError {
                    kind: SyntaxErrorKind::InvalidName {
                        name: name.to_string(),
                    },
                    line: start_line,
                }
                .into());
            }

            let (raw_value, quote_style) = read_value(rest[sep + 1..].trim(), &mut lines)?;

            declared.insert(name.to_string());
            variables.push(Variable::new(
                name,
                raw_value,
                Location::new(&self.source, start_line),
                quote_style,
            ));
        }

        debug!(
            source = %self.source,
            variables = variables.len(),
            lines = lines.line,
            "parsed env file"
        );

        Ok(EnvFile::new(variables))
    }
}

const BOM: char = '\u{FEFF}';

/// Physical line reader that polls for cancellation before each line.
///
/// Bytes that are not valid UTF-8 are replaced with U+FFFD.
struct Lines<'a, R> {
    inner: R,
    buf: Vec<u8>,
    line: usize,
    cancel: &'a CancellationToken,
}

impl<R: BufRead> Lines<'_, R> {
    fn next_line(&mut self) -> Result<Option<String>, Error> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        self.buf.clear();
        if self.inner.read_until(b'\n', &mut self.buf)? == 0 {
            return Ok(None);
        }
        self.line += 1;

        let mut bytes = self.buf.as_slice();
        if let Some(rest) = bytes.strip_suffix(b"\n") {
            bytes = rest.strip_suffix(b"\r").unwrap_or(rest);
        }
        let text = String::from_utf8_lossy(bytes);
        if matches!(text, Cow::Owned(_)) {
            warn!(line = self.line, "replaced invalid UTF-8 bytes");
        }

        if self.line == 1 && text.starts_with(BOM) {
            return Ok(Some(text[BOM.len_utf8()..].to_string()));
        }
        Ok(Some(text.into_owned()))
    }
}

/// Extract the raw value from the text after the separator, pulling
/// further lines for multi-line quoted values.
fn read_value<R: BufRead>(
    value: &str,
    lines: &mut Lines<'_, R>,
) -> Result<(String, QuoteStyle), Error> {
    let quote = match value.as_bytes().first() {
        Some(&q) if q == b'"' || q == b'\'' => q,
        _ => return Ok((strip_inline_comment(value).to_string(), QuoteStyle::Unquoted)),
    };

    let mut text = value[1..].to_string();
    let mut from = 0;

    loop {
        if let Some(end) = find_closing_quote(&text, from, quote) {
            let rest = text[end + 1..].trim_start();
            if !rest.is_empty() && !rest.starts_with('#') {
                trace!(line = lines.line, "text after closing quote, keeping value unquoted");
                let mut raw = String::with_capacity(text.len() + 1);
                raw.push(char::from(quote));
                raw.push_str(&text);
                return Ok((raw, QuoteStyle::Unquoted));
            }
            let inner = &text[..end];
            return Ok(if quote == b'"' {
                (unescape_double_quoted(inner), QuoteStyle::DoubleQuoted)
            } else {
                (inner.to_string(), QuoteStyle::SingleQuoted)
            });
        }

        let Some(next) = lines.next_line()? else {
            trace!(line = lines.line, "unterminated quoted value at end of input");
            let mut raw = String::with_capacity(text.len() + 1);
            raw.push(char::from(quote));
            raw.push_str(&text);
            return Ok((raw, QuoteStyle::Unquoted));
        };

        trace!(line = lines.line, "continuing multi-line value");
        text.push('\n');
        from = text.len();
        text.push_str(&next);
    }
}

/// Byte index of the first closing `quote` at or after `from`.
///
/// A double quote preceded by an odd run of backslashes is escaped.
fn find_closing_quote(text: &str, from: usize, quote: u8) -> Option<usize> {
    let bytes = text.as_bytes();
    (from..bytes.len()).find(|&i| {
        bytes[i] == quote
            && (quote == b'\''
                || backslashes_before(bytes, i) % 2 == 0)
    })
}

/// Cut an unquoted value at its first unescaped `#`.
///
/// A `#` preceded by an odd run of backslashes is escaped.
fn strip_inline_comment(value: &str) -> &str {
    let bytes = value.as_bytes();
    (0..bytes.len())
        .find(|&i| bytes[i] == b'#' && backslashes_before(bytes, i) % 2 == 0)
        .map_or(value, |i| value[..i].trim_end())
}

fn backslashes_before(bytes: &[u8], i: usize) -> usize {
    bytes[..i].iter().rev().take_while(|&&b| b == b'\\').count()
}

/// Process the escape sequences allowed in double-quoted values.
///
/// Unknown escapes keep their backslash.
fn unescape_double_quoted(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let replacement = match chars.peek() {
            Some('n') => '\n',
            Some('t') => '\t',
            Some('r') => '\r',
            Some('\\') => '\\',
            Some('"') => '"',
            _ => {
                out.push('\\');
                continue;
            }
        };
        chars.next();
        out.push(replacement);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_str(input: &str) -> Result<EnvFile, Error> {
        parse(input.as_bytes(), &CancellationToken::new())
    }

    fn raw(input: &str) -> Vec<(String, String, QuoteStyle)> {
        parse_str(input)
            .expect("should parse")
            .variables()
            .iter()
            .map(|v| (v.name.clone(), v.raw_value.clone(), v.quote_style))
            .collect()
    }

    #[test]
    fn unquoted_with_inline_comment() {
        let vars = raw("FOO=bar   # trailing\n");
        assert_eq!(vars[0].1, "bar");
        assert_eq!(vars[0].2, QuoteStyle::Unquoted);
    }

    #[test]
    fn escaped_hash_is_not_a_comment() {
        let vars = raw(r"FOO=a\#b # c");
        assert_eq!(vars[0].1, r"a\#b");
    }

    #[test]
    fn escaped_backslash_before_hash_starts_comment() {
        let vars = raw(r"FOO=a\\#b");
        assert_eq!(vars[0].1, r"a\\");
        let vars = raw(r"FOO=a\\\#b");
        assert_eq!(vars[0].1, r"a\\\#b");
    }

    #[test]
    fn text_after_closing_quote_keeps_value_unquoted() {
        let vars = raw("A=\"a\"b c\nB='x'y\nC=\"m\nn\"o");
        assert_eq!(vars[0].1, "\"a\"b c");
        assert_eq!(vars[0].2, QuoteStyle::Unquoted);
        assert_eq!(vars[1].1, "'x'y");
        assert_eq!(vars[1].2, QuoteStyle::Unquoted);
        assert_eq!(vars[2].1, "\"m\nn\"o");
        assert_eq!(vars[2].2, QuoteStyle::Unquoted);
    }

    #[test]
    fn space_or_comment_after_closing_quote_is_dropped() {
        let vars = raw("A=\"a\"   \nB='x' # note\nC=\"y\"#tight");
        assert_eq!(vars[0].1, "a");
        assert_eq!(vars[0].2, QuoteStyle::DoubleQuoted);
        assert_eq!(vars[1].1, "x");
        assert_eq!(vars[1].2, QuoteStyle::SingleQuoted);
        assert_eq!(vars[2].1, "y");
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let file = parse(&b"A=1\nNAME=caf\xe9\nB=2\n"[..], &CancellationToken::new())
            .expect("should parse");
        let vars = file.variables();
        assert_eq!(vars[1].raw_value, "caf\u{FFFD}");
        assert_eq!(vars[2].location.as_str(), ":3");
    }

    #[test]
    fn invalid_utf8_in_name_reports_line() {
        let Err(Error::Syntax(err)) =
            parse(&b"A=1\nN\xe9=x\n"[..], &CancellationToken::new())
        else {
            panic!("expected syntax error");
        };
        assert_eq!(err.line, 2);
        assert!(matches!(err.kind, SyntaxErrorKind::InvalidName { .. }));
    }

    #[test]
    fn colon_before_equals_is_separator() {
        let vars = raw("URL:http://x=y");
        assert_eq!(vars[0].0, "URL");
        assert_eq!(vars[0].1, "http://x=y");
    }

    #[test]
    fn single_quoted_keeps_backslashes() {
        let vars = raw(r"FOO='a\nb\'");
        assert_eq!(vars[0].1, r"a\nb\");
        assert_eq!(vars[0].2, QuoteStyle::SingleQuoted);
    }

    #[test]
    fn double_quoted_escapes() {
        let vars = raw(r#"FOO="a\tb\\c\"d\qe""#);
        assert_eq!(vars[0].1, "a\tb\\c\"d\\qe");
        assert_eq!(vars[0].2, QuoteStyle::DoubleQuoted);
    }

    #[test]
    fn even_backslashes_close_quote() {
        let vars = raw(r#"FOO="a\\" # comment"#);
        assert_eq!(vars[0].1, "a\\");
    }

    #[test]
    fn multiline_location_is_first_line() {
        let file = parse_str("A=1\nB=\"x\ny\"\nC=2").expect("should parse");
        let vars = file.variables();
        assert_eq!(vars[1].raw_value, "x\ny");
        assert_eq!(vars[1].location.as_str(), ":2");
        assert_eq!(vars[2].location.as_str(), ":4");
    }

    #[test]
    fn unterminated_quote_runs_to_end() {
        let vars = raw("FOO=\"abc\nDEF=1");
        assert_eq!(vars.len(), 1);
        assert_eq!(vars[0].1, "\"abc\nDEF=1");
        assert_eq!(vars[0].2, QuoteStyle::Unquoted);
    }

    #[test]
    fn bom_is_stripped() {
        let vars = raw("\u{FEFF}FOO=bar");
        assert_eq!(vars[0].0, "FOO");
    }

    #[test]
    fn crlf_lines() {
        let vars = raw("A=1\r\nB=2\r\n");
        assert_eq!(vars[0].1, "1");
        assert_eq!(vars[1].1, "2");
    }

    #[test]
    fn export_of_declared_name_is_noop() {
        let vars = raw("FOO=1\nexport FOO\n");
        assert_eq!(vars.len(), 1);
    }

    #[test]
    fn export_of_undeclared_name() {
        let Err(Error::Syntax(err)) = parse_str("export FOO") else {
            panic!("expected syntax error");
        };
        assert_eq!(
            err.kind,
            SyntaxErrorKind::UndeclaredExport {
                name: "FOO".to_string()
            }
        );
        assert_eq!(err.line, 1);
    }

    #[test]
    fn missing_separator_reports_text() {
        let Err(Error::Syntax(err)) = parse_str("A=1\nJUSTTEXT") else {
            panic!("expected syntax error");
        };
        assert_eq!(err.line, 2);
        assert_eq!(err.to_string(), "no separator found in line: JUSTTEXT at line 2");
    }

    #[test]
    fn cancelled_before_first_line() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = parse("A=1".as_bytes(), &cancel);
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[test]
    fn source_prefixes_locations() {
        let file = Parser::new()
            .source("dev.env")
            .parse("\n\nA=1".as_bytes(), &CancellationToken::new())
            .expect("should parse");
        assert_eq!(file.variables()[0].location.as_str(), "dev.env:3");
    }
}
