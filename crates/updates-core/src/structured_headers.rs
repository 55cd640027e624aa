//! Structured field values for HTTP headers (RFC 8941).
//!
//! The update protocol carries its signature (`expo-signature`), the
//! accepted signature shape (`expo-expect-signature`) and the manifest
//! filters (`expo-manifest-filters`) as structured headers. This module
//! implements the parts of RFC 8941 those headers need: dictionaries, lists,
//! inner lists, parameters and all bare item types, plus a serializer for
//! dictionaries.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::fmt::Write as _;
use thiserror::Error;

/// Error produced when a header value is not a well-formed structured field.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} (at position {position})")]
pub struct StructuredHeaderError {
    /// Human-readable reason.
    pub message: String,
    /// Byte offset into the input where parsing stopped.
    pub position: usize,
}

/// A bare item value.
#[derive(Debug, Clone, PartialEq)]
pub enum BareItem {
    /// `42`, `-7`
    Integer(i64),
    /// `1.5`; at most three fractional digits.
    Decimal(f64),
    /// `"quoted"`, already unescaped.
    String(String),
    /// `token`, `*token`
    Token(String),
    /// `:base64:`, already decoded.
    ByteSequence(Vec<u8>),
    /// `?1` / `?0`
    Boolean(bool),
}

impl BareItem {
    /// The unescaped contents when this is a String item.
    pub fn as_string(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// The value when this is a Boolean item.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<&str> for BareItem {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<bool> for BareItem {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<i64> for BareItem {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

/// Ordered parameters attached to an item or inner list.
pub type Parameters = Vec<(String, BareItem)>;

/// A bare item plus its parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    /// Item value.
    pub value: BareItem,
    /// Parameters in the order they appeared.
    pub params: Parameters,
}

impl Item {
    /// Create an item without parameters.
    pub fn new(value: impl Into<BareItem>) -> Self {
        Self {
            value: value.into(),
            params: Vec::new(),
        }
    }
}

/// A parenthesized list of items plus its parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct InnerList {
    /// Items in order.
    pub items: Vec<Item>,
    /// Parameters of the list itself.
    pub params: Parameters,
}

/// A dictionary or list member.
#[derive(Debug, Clone, PartialEq)]
pub enum Member {
    /// A single item.
    Item(Item),
    /// An inner list.
    InnerList(InnerList),
}

impl Member {
    /// The item when this member is not an inner list.
    pub fn as_item(&self) -> Option<&Item> {
        match self {
            Self::Item(item) => Some(item),
            Self::InnerList(_) => None,
        }
    }
}

impl From<Item> for Member {
    fn from(item: Item) -> Self {
        Self::Item(item)
    }
}

/// An ordered dictionary. Re-inserting a key replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dictionary(Vec<(String, Member)>);

impl Dictionary {
    /// Create an empty dictionary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a member.
    pub fn insert(&mut self, key: impl Into<String>, member: impl Into<Member>) {
        let key = key.into();
        let member = member.into();
        if let Some(slot) = self.0.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = member;
        } else {
            self.0.push((key, member));
        }
    }

    /// Look up a member by key.
    pub fn get(&self, key: &str) -> Option<&Member> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, m)| m)
    }

    /// Iterate over members in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Member)> {
        self.0.iter().map(|(k, m)| (k.as_str(), m))
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the dictionary has no members.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Parse a dictionary header value.
///
/// # Errors
///
/// Returns [`StructuredHeaderError`] if the input is not a valid dictionary.
pub fn parse_dictionary(input: &str) -> Result<Dictionary, StructuredHeaderError> {
    let mut parser = Parser::new(input)?;
    parser.skip_sp();
    let dictionary = parser.dictionary()?;
    parser.skip_sp();
    parser.expect_end("Extra characters in string parsed as Dictionary")?;
    Ok(dictionary)
}

/// Parse a list header value.
///
/// # Errors
///
/// Returns [`StructuredHeaderError`] if the input is not a valid list.
pub fn parse_list(input: &str) -> Result<Vec<Member>, StructuredHeaderError> {
    let mut parser = Parser::new(input)?;
    parser.skip_sp();
    let list = parser.outer_list()?;
    parser.skip_sp();
    parser.expect_end("Extra characters in string parsed as List")?;
    Ok(list)
}

/// Parse a single item header value.
///
/// # Errors
///
/// Returns [`StructuredHeaderError`] if the input is not a valid item.
pub fn parse_item(input: &str) -> Result<Item, StructuredHeaderError> {
    let mut parser = Parser::new(input)?;
    parser.skip_sp();
    let item = parser.item()?;
    parser.skip_sp();
    parser.expect_end("Extra characters in string parsed as Item")?;
    Ok(item)
}

/// Serialize a dictionary to its header text.
///
/// Members whose value is `?1` are written as a bare key (`sig`), strings
/// are quoted with `"` and `\` backslash-escaped.
pub fn serialize_dictionary(dictionary: &Dictionary) -> String {
    let mut out = String::new();
    for (i, (key, member)) in dictionary.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(key);
        match member {
            Member::Item(item) if item.value == BareItem::Boolean(true) => {
                write_params(&mut out, &item.params);
            }
            Member::Item(item) => {
                out.push('=');
                write_item(&mut out, item);
            }
            Member::InnerList(list) => {
                out.push('=');
                out.push('(');
                for (j, item) in list.items.iter().enumerate() {
                    if j > 0 {
                        out.push(' ');
                    }
                    write_item(&mut out, item);
                }
                out.push(')');
                write_params(&mut out, &list.params);
            }
        }
    }
    out
}

fn write_item(out: &mut String, item: &Item) {
    write_bare_item(out, &item.value);
    write_params(out, &item.params);
}

fn write_params(out: &mut String, params: &Parameters) {
    for (key, value) in params {
        out.push(';');
        out.push_str(key);
        if *value != BareItem::Boolean(true) {
            out.push('=');
            write_bare_item(out, value);
        }
    }
}

fn write_bare_item(out: &mut String, value: &BareItem) {
    match value {
        BareItem::Integer(i) => {
            let _ = write!(out, "{i}");
        }
        BareItem::Decimal(d) => {
            let formatted = format!("{d:.3}");
            let trimmed = formatted.trim_end_matches('0');
            out.push_str(trimmed);
            if trimmed.ends_with('.') {
                out.push('0');
            }
        }
        BareItem::String(s) => {
            out.push('"');
            for c in s.chars() {
                if c == '"' || c == '\\' {
                    out.push('\\');
                }
                out.push(c);
            }
            out.push('"');
        }
        BareItem::Token(t) => out.push_str(t),
        BareItem::ByteSequence(bytes) => {
            out.push(':');
            out.push_str(&BASE64.encode(bytes));
            out.push(':');
        }
        BareItem::Boolean(b) => out.push_str(if *b { "?1" } else { "?0" }),
    }
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Result<Self, StructuredHeaderError> {
        if let Some(position) = input.bytes().position(|b| !b.is_ascii()) {
            return Err(StructuredHeaderError {
                message: "Invalid character in field line".to_string(),
                position,
            });
        }
        Ok(Self {
            input: input.as_bytes(),
            pos: 0,
        })
    }

    fn complaint(&self, message: impl Into<String>) -> StructuredHeaderError {
        StructuredHeaderError {
            message: message.into(),
            position: self.pos,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn has_remaining(&self) -> bool {
        self.pos < self.input.len()
    }

    fn skip_sp(&mut self) {
        while self.peek() == Some(b' ') {
            self.pos += 1;
        }
    }

    fn skip_ows(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t')) {
            self.pos += 1;
        }
    }

    fn expect_end(&self, message: &str) -> Result<(), StructuredHeaderError> {
        if self.has_remaining() {
            Err(self.complaint(message))
        } else {
            Ok(())
        }
    }

    fn dictionary(&mut self) -> Result<Dictionary, StructuredHeaderError> {
        let mut dictionary = Dictionary::new();
        while self.has_remaining() {
            let key = self.key()?;
            let member = if self.peek() == Some(b'=') {
                self.pos += 1;
                self.item_or_inner_list()?
            } else {
                Member::Item(Item {
                    value: BareItem::Boolean(true),
                    params: self.parameters()?,
                })
            };
            dictionary.insert(key, member);

            self.skip_ows();
            if !self.has_remaining() {
                break;
            }
            if self.peek() != Some(b',') {
                return Err(self.complaint("Expected COMMA in Dictionary"));
            }
            self.pos += 1;
            self.skip_ows();
            if !self.has_remaining() {
                return Err(self.complaint("Found trailing COMMA in Dictionary"));
            }
        }
        Ok(dictionary)
    }

    fn outer_list(&mut self) -> Result<Vec<Member>, StructuredHeaderError> {
        let mut members = Vec::new();
        while self.has_remaining() {
            members.push(self.item_or_inner_list()?);
            self.skip_ows();
            if !self.has_remaining() {
                break;
            }
            if self.peek() != Some(b',') {
                return Err(self.complaint("Expected COMMA in List"));
            }
            self.pos += 1;
            self.skip_ows();
            if !self.has_remaining() {
                return Err(self.complaint("Found trailing COMMA in List"));
            }
        }
        Ok(members)
    }

    fn item_or_inner_list(&mut self) -> Result<Member, StructuredHeaderError> {
        if self.peek() == Some(b'(') {
            self.inner_list().map(Member::InnerList)
        } else {
            self.item().map(Member::Item)
        }
    }

    fn inner_list(&mut self) -> Result<InnerList, StructuredHeaderError> {
        if self.advance() != Some(b'(') {
            return Err(self.complaint("Inner List must start with '('"));
        }
        let mut items = Vec::new();
        loop {
            self.skip_sp();
            match self.peek() {
                None => return Err(self.complaint("Inner List must end with ')'")),
                Some(b')') => {
                    self.pos += 1;
                    break;
                }
                Some(_) => {
                    items.push(self.item()?);
                    match self.peek() {
                        None => return Err(self.complaint("Missing data in Inner List")),
                        Some(b' ' | b')') => {}
                        Some(c) => {
                            return Err(self.complaint(format!(
                                "Expected SP or ')' in Inner List, got: '{}'",
                                c as char
                            )));
                        }
                    }
                }
            }
        }
        let params = self.parameters()?;
        Ok(InnerList { items, params })
    }

    fn item(&mut self) -> Result<Item, StructuredHeaderError> {
        let value = self.bare_item()?;
        let params = self.parameters()?;
        Ok(Item { value, params })
    }

    fn parameters(&mut self) -> Result<Parameters, StructuredHeaderError> {
        let mut params: Parameters = Vec::new();
        while self.peek() == Some(b';') {
            self.pos += 1;
            self.skip_sp();
            let key = self.key()?;
            let value = if self.peek() == Some(b'=') {
                self.pos += 1;
                self.bare_item()?
            } else {
                BareItem::Boolean(true)
            };
            if let Some(slot) = params.iter_mut().find(|(k, _)| *k == key) {
                slot.1 = value;
            } else {
                params.push((key, value));
            }
        }
        Ok(params)
    }

    fn key(&mut self) -> Result<String, StructuredHeaderError> {
        match self.peek() {
            None => return Err(self.complaint("Missing data in Key")),
            Some(c) if c == b'*' || c.is_ascii_lowercase() => {}
            Some(c) => {
                return Err(self.complaint(format!(
                    "Key must start with LCALPHA or '*': '{}'",
                    c as char
                )));
            }
        }
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_lowercase()
                || c.is_ascii_digit()
                || matches!(c, b'_' | b'-' | b'.' | b'*')
            {
                self.pos += 1;
            } else {
                break;
            }
        }
        Ok(String::from_utf8_lossy(&self.input[start..self.pos]).into_owned())
    }

    fn bare_item(&mut self) -> Result<BareItem, StructuredHeaderError> {
        match self.peek() {
            None => Err(self.complaint("Empty string found when parsing Bare Item")),
            Some(c) if c.is_ascii_digit() || c == b'-' => self.number(),
            Some(b'"') => self.string().map(BareItem::String),
            Some(b'?') => self.boolean().map(BareItem::Boolean),
            Some(c) if c == b'*' || c.is_ascii_alphabetic() => self.token().map(BareItem::Token),
            Some(b':') => self.byte_sequence().map(BareItem::ByteSequence),
            Some(c) => Err(self.complaint(format!(
                "Unexpected start character in Bare Item: '{}'",
                c as char
            ))),
        }
    }

    fn number(&mut self) -> Result<BareItem, StructuredHeaderError> {
        let mut sign = 1i64;
        if self.peek() == Some(b'-') {
            sign = -1;
            self.pos += 1;
        }
        if !self.peek().is_some_and(|c| c.is_ascii_digit()) {
            return Err(self.complaint("Illegal start for Integer or Decimal"));
        }

        let mut digits = String::new();
        let mut is_decimal = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                digits.push(c as char);
            } else if !is_decimal && c == b'.' {
                if digits.len() > 12 {
                    return Err(self.complaint("Illegal position for decimal point in Decimal"));
                }
                digits.push('.');
                is_decimal = true;
            } else {
                break;
            }
            self.pos += 1;
            let max_len = if is_decimal { 16 } else { 15 };
            if digits.len() > max_len {
                return Err(self.complaint(format!(
                    "{} too long: {} characters",
                    if is_decimal { "Decimal" } else { "Integer" },
                    digits.len()
                )));
            }
        }

        if !is_decimal {
            let value: i64 = digits
                .parse()
                .map_err(|_| self.complaint("Invalid Integer"))?;
            return Ok(BareItem::Integer(sign * value));
        }

        let fraction_len = digits.len() - digits.find('.').unwrap_or(0) - 1;
        if fraction_len < 1 {
            return Err(self.complaint("Decimal must not end in '.'"));
        }
        if fraction_len > 3 {
            return Err(self.complaint(format!(
                "Maximum number of fractional digits is 3, found: {fraction_len}"
            )));
        }
        let value: f64 = digits
            .parse()
            .map_err(|_| self.complaint("Invalid Decimal"))?;
        Ok(BareItem::Decimal(sign as f64 * value))
    }

    fn string(&mut self) -> Result<String, StructuredHeaderError> {
        if self.advance() != Some(b'"') {
            return Err(self.complaint("String must start with double quote"));
        }
        let mut out = String::new();
        while let Some(c) = self.advance() {
            match c {
                b'\\' => match self.advance() {
                    None => return Err(self.complaint("Incomplete escape sequence")),
                    Some(escaped @ (b'"' | b'\\')) => out.push(escaped as char),
                    Some(escaped) => {
                        self.pos -= 1;
                        return Err(self.complaint(format!(
                            "Invalid escape sequence character '{}'",
                            escaped as char
                        )));
                    }
                },
                b'"' => return Ok(out),
                c if c < 0x20 || c >= 0x7f => {
                    return Err(self.complaint("Invalid character in String"));
                }
                c => out.push(c as char),
            }
        }
        Err(self.complaint("Closing DQUOTE missing"))
    }

    fn token(&mut self) -> Result<String, StructuredHeaderError> {
        let start = self.pos;
        match self.advance() {
            Some(c) if c == b'*' || c.is_ascii_alphabetic() => {}
            _ => return Err(self.complaint("Token must start with ALPHA or *")),
        }
        while let Some(c) = self.peek() {
            if c <= b' ' || c >= 0x7f || b"\"(),;<=>?@[\\]{}".contains(&c) {
                break;
            }
            self.pos += 1;
        }
        Ok(String::from_utf8_lossy(&self.input[start..self.pos]).into_owned())
    }

    fn byte_sequence(&mut self) -> Result<Vec<u8>, StructuredHeaderError> {
        if self.advance() != Some(b':') {
            return Err(self.complaint("Byte Sequence must start with colon"));
        }
        let start = self.pos;
        loop {
            match self.advance() {
                None => return Err(self.complaint("Byte Sequence must end with COLON")),
                Some(b':') => break,
                Some(c) if c.is_ascii_alphanumeric() || matches!(c, b'+' | b'/' | b'=') => {}
                Some(c) => {
                    return Err(self.complaint(format!(
                        "Invalid Byte Sequence Character '{}'",
                        c as char
                    )));
                }
            }
        }
        let encoded = &self.input[start..self.pos - 1];
        BASE64
            .decode(encoded)
            .map_err(|e| self.complaint(format!("Invalid Byte Sequence: {e}")))
    }

    fn boolean(&mut self) -> Result<bool, StructuredHeaderError> {
        if self.advance() != Some(b'?') {
            return Err(self.complaint("Boolean must start with question mark"));
        }
        match self.advance() {
            Some(b'1') => Ok(true),
            Some(b'0') => Ok(false),
            None => Err(self.complaint("Missing data in Boolean")),
            Some(c) => {
                self.pos -= 1;
                Err(self.complaint(format!(
                    "Expected '0' or '1' in Boolean, found '{}'",
                    c as char
                )))
            }
        }
    }
}
