//! The closed set of `$`-prefixed markers that disambiguate string tokens.
//!
//! A string token that does not start with [`SIGIL`] is literal text. Every
//! other string token is parsed into a [`Tag`] by [`Tag::parse`]; a marker
//! outside this registry is a decode error.

use crate::value::BufferKind;

pub const SIGIL: char = '$';

pub const UNDEFINED: &str = "$u";
pub const NAN: &str = "$NaN";
pub const POSITIVE_INFINITY: &str = "$Infinity";
pub const NEGATIVE_INFINITY: &str = "$-Infinity";
pub const NEGATIVE_ZERO: &str = "$-0";
pub const DONE: &str = "$Z";

/// Marker prefixes, without the sigil.
pub const ESCAPED_TEXT: char = '$';
pub const DATE: char = 'D';
pub const BIGINT: char = 'n';
pub const SYMBOL: char = 'Y';
pub const LIST: char = 'a';
pub const SET: char = 'S';
pub const MAP: char = 'M';
pub const RECORD: char = 'o';
pub const ERROR: char = 'E';
pub const DEFERRED: char = 'P';
pub const SEQUENCE: char = 'I';
pub const FORM: char = 'F';
pub const BUFFER: char = 'b';
pub const REJECTED: char = 'X';
pub const EXTENSION: char = '_';

/// Kinds of compound value addressed by slot id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefKind {
    List,
    Set,
    Map,
    Record,
    Error,
    Deferred,
    Sequence,
    Form,
    Buffer(BufferKind),
    Rejected,
}

impl RefKind {
    /// Renders the back-reference / forward-reference token for slot `id`.
    pub fn token(self, id: usize) -> String {
        let marker = match self {
            RefKind::List => LIST,
            RefKind::Set => SET,
            RefKind::Map => MAP,
            RefKind::Record => RECORD,
            RefKind::Error => ERROR,
            RefKind::Deferred => DEFERRED,
            RefKind::Sequence => SEQUENCE,
            RefKind::Form => FORM,
            RefKind::Rejected => REJECTED,
            RefKind::Buffer(kind) => return format!("{SIGIL}{BUFFER}{}{id}", kind.code()),
        };
        format!("{SIGIL}{marker}{id}")
    }
}

/// A parsed `$`-string token.
#[derive(Debug, Clone, PartialEq)]
pub enum Tag<'a> {
    Text(&'a str),
    Undefined,
    Number(f64),
    Date(&'a str),
    BigInt(&'a str),
    Symbol(&'a str),
    Ref(RefKind, usize),
    Extension { name: &'a str, id: usize },
    Done,
}

impl<'a> Tag<'a> {
    /// Classifies a string token. Plain text comes back as [`Tag::Text`].
    pub fn parse(token: &'a str) -> Option<Tag<'a>> {
        let Some(rest) = token.strip_prefix(SIGIL) else {
            return Some(Tag::Text(token));
        };
        match token {
            UNDEFINED => return Some(Tag::Undefined),
            NAN => return Some(Tag::Number(f64::NAN)),
            POSITIVE_INFINITY => return Some(Tag::Number(f64::INFINITY)),
            NEGATIVE_INFINITY => return Some(Tag::Number(f64::NEG_INFINITY)),
            NEGATIVE_ZERO => return Some(Tag::Number(-0.0)),
            DONE => return Some(Tag::Done),
            _ => {}
        }
        let marker = rest.chars().next()?;
        let body = &rest[marker.len_utf8()..];
        let kind = match marker {
            ESCAPED_TEXT => return Some(Tag::Text(rest)),
            DATE => return Some(Tag::Date(body)),
            BIGINT => return Some(Tag::BigInt(body)),
            SYMBOL => return Some(Tag::Symbol(body)),
            EXTENSION => {
                let (name, id) = body.rsplit_once('_')?;
                if name.is_empty() {
                    return None;
                }
                return Some(Tag::Extension {
                    name,
                    id: parse_id(id)?,
                });
            }
            BUFFER => {
                let code = body.chars().next()?;
                let kind = BufferKind::from_code(code)?;
                return Some(Tag::Ref(RefKind::Buffer(kind), parse_id(&body[1..])?));
            }
            LIST => RefKind::List,
            SET => RefKind::Set,
            MAP => RefKind::Map,
            RECORD => RefKind::Record,
            ERROR => RefKind::Error,
            DEFERRED => RefKind::Deferred,
            SEQUENCE => RefKind::Sequence,
            FORM => RefKind::Form,
            REJECTED => RefKind::Rejected,
            _ => return None,
        };
        Some(Tag::Ref(kind, parse_id(body)?))
    }
}

/// Escapes literal text so it never collides with a marker.
pub fn text_token(s: &str) -> String {
    if s.starts_with(SIGIL) {
        format!("{SIGIL}{s}")
    } else {
        s.to_owned()
    }
}

pub fn extension_token(name: &str, id: usize) -> String {
    format!("{SIGIL}{EXTENSION}{name}_{id}")
}

fn parse_id(s: &str) -> Option<usize> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_and_escaped_text() {
        assert_eq!(Tag::parse("hello"), Some(Tag::Text("hello")));
        assert_eq!(text_token("$5"), "$$5");
        assert_eq!(Tag::parse("$$5"), Some(Tag::Text("$5")));
    }

    #[test]
    fn reference_tokens_round_trip() {
        let kinds = [
            RefKind::List,
            RefKind::Set,
            RefKind::Map,
            RefKind::Record,
            RefKind::Error,
            RefKind::Deferred,
            RefKind::Sequence,
            RefKind::Form,
            RefKind::Rejected,
            RefKind::Buffer(BufferKind::F64),
            RefKind::Buffer(BufferKind::Raw),
        ];
        for kind in kinds {
            let token = kind.token(17);
            assert_eq!(Tag::parse(&token), Some(Tag::Ref(kind, 17)), "{token}");
        }
    }

    #[test]
    fn extension_names_may_contain_underscores() {
        let token = extension_token("my_point", 4);
        assert_eq!(
            Tag::parse(&token),
            Some(Tag::Extension {
                name: "my_point",
                id: 4
            })
        );
    }

    #[test]
    fn rejects_unregistered_markers() {
        assert_eq!(Tag::parse("$q1"), None);
        assert_eq!(Tag::parse("$a"), None);
        assert_eq!(Tag::parse("$a-1"), None);
        assert_eq!(Tag::parse("$"), None);
    }
}
