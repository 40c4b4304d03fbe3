//! Message templates.
//!
//! A template is plain text with named holes: `"User {Name} got {Count} items"`.
//! Holes are filled from the event's properties when the message is rendered,
//! so the same template yields both a readable message and structured data.
//!
//! Syntax:
//! - `{Name}` renders the property's native text (strings are quoted).
//! - `{Name:l}` renders string properties without quotes.
//! - `{@Name}` and `{$Name}` are accepted; the capture hint is ignored.
//! - `{{` and `}}` are literal braces.
//!
//! Anything that does not parse as a hole is kept as text, and a hole with no
//! matching property is rendered verbatim.

use std::fmt::Write;

use crate::value::{Properties, PropertyValue};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Text(String),
    Hole {
        name: String,
        format: Option<String>,
        raw: String,
    },
}

/// A parsed message template.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageTemplate {
    text: String,
    tokens: Vec<Token>,
}

impl MessageTemplate {
    /// Parses `text` into text runs and holes.
    pub fn parse(text: &str) -> Self {
        Self { text: text.to_owned(), tokens: tokenize(text) }
    }

    /// A template with no holes; renders `text` verbatim.
    pub fn literal(text: impl Into<String>) -> Self {
        let text = text.into();
        Self { tokens: vec![Token::Text(text.clone())], text }
    }

    /// The original template text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Names of the holes, in order of appearance.
    pub fn hole_names(&self) -> impl Iterator<Item = &str> {
        self.tokens.iter().filter_map(|token| match token {
            Token::Hole { name, .. } => Some(name.as_str()),
            Token::Text(_) => None,
        })
    }

    /// Binds positional arguments to hole names in order of appearance.
    ///
    /// A name that appears twice binds once. Surplus arguments are dropped.
    pub fn bind(&self, args: Vec<PropertyValue>) -> Properties {
        let mut properties = Properties::new();
        let mut args = args.into_iter();
        for name in self.hole_names() {
            if properties.contains_key(name) {
                continue;
            }
            match args.next() {
                Some(value) => properties.insert(name, value),
                None => break,
            }
        }
        properties
    }

    /// Renders the template, filling holes from `properties`.
    pub fn render(&self, properties: &Properties) -> String {
        let mut out = String::with_capacity(self.text.len());
        for token in &self.tokens {
            match token {
                Token::Text(text) => out.push_str(text),
                Token::Hole { name, format, raw } => match properties.get(name) {
                    Some(value) => match (value.as_str(), format.as_deref()) {
                        (Some(s), Some("l")) => out.push_str(s),
                        _ => {
                            let _ = write!(out, "{value}");
                        }
                    },
                    None => out.push_str(raw),
                },
            }
        }
        out
    }
}

fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut literal = String::new();
    let mut rest = text;

    while let Some(c) = rest.chars().next() {
        match c {
            '{' if rest.starts_with("{{") => {
                literal.push('{');
                rest = &rest[2..];
            }
            '}' if rest.starts_with("}}") => {
                literal.push('}');
                rest = &rest[2..];
            }
            '{' => match rest
                .find('}')
                .and_then(|end| parse_hole(&rest[..=end]).map(|hole| (hole, end + 1)))
            {
                Some((hole, len)) => {
                    if !literal.is_empty() {
                        tokens.push(Token::Text(std::mem::take(&mut literal)));
                    }
                    tokens.push(hole);
                    rest = &rest[len..];
                }
                None => {
                    literal.push('{');
                    rest = &rest[1..];
                }
            },
            _ => {
                literal.push(c);
                rest = &rest[c.len_utf8()..];
            }
        }
    }

    if !literal.is_empty() {
        tokens.push(Token::Text(literal));
    }
    tokens
}

/// `raw` spans from the opening `{` to the first `}` inclusive.
fn parse_hole(raw: &str) -> Option<Token> {
    let inner = &raw[1..raw.len() - 1];
    let inner = inner.strip_prefix(['@', '$']).unwrap_or(inner);
    let (name, format) = match inner.split_once(':') {
        Some((name, format)) if !format.is_empty() => (name, Some(format.to_owned())),
        Some(_) => return None,
        None => (inner, None),
    };
    let valid = !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_');
    valid.then(|| Token::Hole { name: name.to_owned(), format, raw: raw.to_owned() })
}
