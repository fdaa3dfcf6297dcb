//! Distinguished name parsing and composition.
//!
//! Values are escaped per RFC 4514 when a DN is rendered, so composing
//! `OU=Sales, EMEA` under a base produces `OU=Sales\, EMEA,...` rather than a DN with an
//! extra component.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use adctl_core::Error as CoreError;

/// Errors that can occur when parsing a distinguished name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DistinguishedNameError {
    /// The distinguished name was empty.
    #[error("distinguished name cannot be empty")]
    Empty,
    /// A component was not of the form `attribute=value`.
    #[error("invalid distinguished name component: {0}")]
    InvalidComponent(String),
    /// A component had nothing to the left of the `=`.
    #[error("distinguished name component missing attribute: {0}")]
    MissingAttribute(String),
    /// A component had nothing to the right of the `=`.
    #[error("distinguished name component missing value for attribute {0}")]
    MissingValue(String),
    /// The input ended in the middle of an escape sequence.
    #[error("distinguished name contains an unterminated escape sequence")]
    UnterminatedEscape,
}

impl From<DistinguishedNameError> for CoreError {
    fn from(err: DistinguishedNameError) -> Self {
        CoreError::InvalidDn(err.to_string())
    }
}

/// One `attribute=value` assertion of a relative distinguished name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeValue {
    attribute: String,
    value: String,
}

impl AttributeValue {
    /// Attribute type, as written (e.g. `OU`).
    #[must_use]
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// Unescaped attribute value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }
}

/// Relative distinguished name; usually a single assertion, several when `+`-joined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelativeDistinguishedName {
    assertions: Vec<AttributeValue>,
}

impl RelativeDistinguishedName {
    /// Creates a single-valued RDN.
    #[must_use]
    pub fn new(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            assertions: vec![AttributeValue {
                attribute: attribute.into(),
                value: value.into(),
            }],
        }
    }

    /// The attribute assertions of this RDN.
    #[must_use]
    pub fn assertions(&self) -> &[AttributeValue] {
        &self.assertions
    }

    /// Value of the first assertion.
    #[must_use]
    pub fn value(&self) -> &str {
        self.assertions
            .first()
            .map_or("", |assertion| assertion.value.as_str())
    }

    fn render(&self) -> String {
        self.assertions
            .iter()
            .map(|a| format!("{}={}", a.attribute, escape_value(&a.value)))
            .collect::<Vec<_>>()
            .join("+")
    }
}

/// A parsed distinguished name, leaf first.
///
/// The string form is canonical: whitespace around separators is dropped and values are
/// re-escaped, while attribute names and value case are preserved as written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DistinguishedName {
    raw: String,
    rdns: Vec<RelativeDistinguishedName>,
}

impl DistinguishedName {
    /// Parses a distinguished name.
    ///
    /// # Errors
    ///
    /// Returns [`DistinguishedNameError`] if the input is empty or not valid RFC 4514 syntax.
    pub fn parse(input: impl AsRef<str>) -> Result<Self, DistinguishedNameError> {
        let input = input.as_ref().trim();
        if input.is_empty() {
            return Err(DistinguishedNameError::Empty);
        }

        let rdns = split_unescaped(input, ',')?
            .iter()
            .map(|component| parse_rdn(component))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::from_rdns(rdns))
    }

    fn from_rdns(rdns: Vec<RelativeDistinguishedName>) -> Self {
        let raw = rdns
            .iter()
            .map(RelativeDistinguishedName::render)
            .collect::<Vec<_>>()
            .join(",");
        Self { raw, rdns }
    }

    /// Borrows the canonical string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// RDNs in order, leaf first.
    #[must_use]
    pub fn rdns(&self) -> &[RelativeDistinguishedName] {
        &self.rdns
    }

    /// Builds the DN of a direct child entry, e.g. `child("OU", "Engineering")`.
    #[must_use]
    pub fn child(&self, attribute: &str, value: &str) -> Self {
        let mut rdns = Vec::with_capacity(self.rdns.len() + 1);
        rdns.push(RelativeDistinguishedName::new(attribute, value));
        rdns.extend(self.rdns.iter().cloned());
        Self::from_rdns(rdns)
    }

    /// DN of the containing entry, or `None` for a single-RDN name.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.rdns.len() < 2 {
            return None;
        }
        Some(Self::from_rdns(self.rdns[1..].to_vec()))
    }

    /// Value of the leaf RDN (the `Engineering` of `OU=Engineering,DC=example,DC=com`).
    #[must_use]
    pub fn leaf_value(&self) -> &str {
        self.rdns.first().map_or("", RelativeDistinguishedName::value)
    }

    /// Case-folded form used to compare entries; directories match DNs case-insensitively.
    #[must_use]
    pub fn normalized(&self) -> String {
        self.raw.to_lowercase()
    }

    /// Returns true if both names address the same entry.
    #[must_use]
    pub fn same_entry(&self, other: &Self) -> bool {
        self.normalized() == other.normalized()
    }
}

impl fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for DistinguishedName {
    type Err = DistinguishedNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for DistinguishedName {
    type Error = DistinguishedNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl TryFrom<&str> for DistinguishedName {
    type Error = DistinguishedNameError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<DistinguishedName> for String {
    fn from(value: DistinguishedName) -> Self {
        value.raw
    }
}

fn parse_rdn(component: &str) -> Result<RelativeDistinguishedName, DistinguishedNameError> {
    let assertions = split_unescaped(component, '+')?
        .iter()
        .map(|part| parse_assertion(part))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(RelativeDistinguishedName { assertions })
}

fn parse_assertion(part: &str) -> Result<AttributeValue, DistinguishedNameError> {
    // Attribute types never contain escapes, so the first `=` is the separator.
    let (attribute, value) = part
        .split_once('=')
        .ok_or_else(|| DistinguishedNameError::InvalidComponent(part.to_string()))?;
    let attribute = attribute.trim();
    let value = value.trim_start();

    if attribute.is_empty() {
        return Err(DistinguishedNameError::MissingAttribute(part.to_string()));
    }
    if attribute.contains('\\') {
        return Err(DistinguishedNameError::InvalidComponent(part.to_string()));
    }
    if value.is_empty() {
        return Err(DistinguishedNameError::MissingValue(attribute.to_string()));
    }

    Ok(AttributeValue {
        attribute: attribute.to_string(),
        value: unescape_value(value, part)?,
    })
}

/// Splits on `delimiter` outside escape sequences, keeping the escapes in each piece.
fn split_unescaped(input: &str, delimiter: char) -> Result<Vec<String>, DistinguishedNameError> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = input.chars();

    while let Some(ch) = chars.next() {
        if ch == '\\' {
            let escaped = chars
                .next()
                .ok_or(DistinguishedNameError::UnterminatedEscape)?;
            current.push(ch);
            current.push(escaped);
        } else if ch == delimiter {
            parts.push(std::mem::take(&mut current));
        } else {
            current.push(ch);
        }
    }
    parts.push(current);

    let parts: Vec<String> = parts.iter().map(|p| trim_component(p).to_string()).collect();
    if parts.iter().any(String::is_empty) {
        return Err(DistinguishedNameError::InvalidComponent(input.to_string()));
    }
    Ok(parts)
}

/// Trims separator whitespace while keeping an escaped trailing whitespace character.
fn trim_component(part: &str) -> &str {
    let trimmed = part.trim_start();
    let end = trimmed.trim_end().len();
    let trailing_backslashes = trimmed[..end]
        .chars()
        .rev()
        .take_while(|c| *c == '\\')
        .count();
    if trailing_backslashes % 2 == 1 {
        if let Some(escaped) = trimmed[end..].chars().next() {
            return &trimmed[..end + escaped.len_utf8()];
        }
    }
    &trimmed[..end]
}

/// Resolves `\c` and `\XX` escapes; hex pairs may spell out multi-byte UTF-8.
fn unescape_value(value: &str, component: &str) -> Result<String, DistinguishedNameError> {
    let mut bytes = Vec::with_capacity(value.len());
    let mut chars = value.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            let mut buf = [0u8; 4];
            bytes.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            continue;
        }

        let first = chars
            .next()
            .ok_or(DistinguishedNameError::UnterminatedEscape)?;
        match (first.to_digit(16), chars.peek().and_then(|c| c.to_digit(16))) {
            (Some(high), Some(low)) => {
                chars.next();
                // Two hex digits always fit in a byte.
                bytes.push(u8::try_from(high * 16 + low).unwrap_or_default());
            }
            _ => {
                let mut buf = [0u8; 4];
                bytes.extend_from_slice(first.encode_utf8(&mut buf).as_bytes());
            }
        }
    }

    String::from_utf8(bytes)
        .map_err(|_| DistinguishedNameError::InvalidComponent(component.to_string()))
}

fn escape_value(value: &str) -> String {
    let last = value.chars().count().saturating_sub(1);
    let mut escaped = String::with_capacity(value.len());

    for (idx, ch) in value.chars().enumerate() {
        let needs_escape = matches!(ch, ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=')
            || (idx == 0 && (ch.is_whitespace() || ch == '#'))
            || (idx == last && ch.is_whitespace());
        if needs_escape {
            escaped.push('\\');
        }
        escaped.push(ch);
    }

    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_ad_style_dn() {
        let dn = DistinguishedName::parse("CN=Jane Doe, OU=Users ,DC=example,DC=com").unwrap();
        assert_eq!(dn.as_str(), "CN=Jane Doe,OU=Users,DC=example,DC=com");
        assert_eq!(dn.leaf_value(), "Jane Doe");
        assert_eq!(dn.rdns().len(), 4);
    }

    #[test]
    fn parse_escaped_comma_and_hex_pairs() {
        let dn = DistinguishedName::parse("CN=Smith\\, John,OU=Users,DC=example,DC=com").unwrap();
        assert_eq!(dn.leaf_value(), "Smith, John");
        assert!(dn.as_str().starts_with("CN=Smith\\, John,OU=Users"));

        let hex = DistinguishedName::parse("CN=Caf\\C3\\A9,DC=example,DC=com").unwrap();
        assert_eq!(hex.leaf_value(), "Café");
    }

    #[test]
    fn parse_multi_valued_rdn() {
        let dn = DistinguishedName::parse("CN=John+UID=1234,DC=example,DC=com").unwrap();
        let leaf = &dn.rdns()[0];
        assert_eq!(leaf.assertions().len(), 2);
        assert_eq!(leaf.assertions()[1].attribute(), "UID");
        assert_eq!(dn.as_str(), "CN=John+UID=1234,DC=example,DC=com");
    }

    #[test]
    fn rejects_malformed_input() {
        assert_eq!(
            DistinguishedName::parse("   ").unwrap_err(),
            DistinguishedNameError::Empty
        );
        assert!(matches!(
            DistinguishedName::parse("CN=John,").unwrap_err(),
            DistinguishedNameError::InvalidComponent(_)
        ));
        assert!(matches!(
            DistinguishedName::parse("=John,DC=com").unwrap_err(),
            DistinguishedNameError::MissingAttribute(_)
        ));
        assert!(matches!(
            DistinguishedName::parse("CN=,DC=com").unwrap_err(),
            DistinguishedNameError::MissingValue(_)
        ));
        assert_eq!(
            DistinguishedName::parse("CN=John\\").unwrap_err(),
            DistinguishedNameError::UnterminatedEscape
        );
        assert!(matches!(
            DistinguishedName::parse("Engineering").unwrap_err(),
            DistinguishedNameError::InvalidComponent(_)
        ));
    }

    #[test]
    fn child_escapes_special_characters() {
        let base = DistinguishedName::parse("OU=Groups,DC=example,DC=com").unwrap();
        let child = base.child("OU", "Sales, EMEA");
        assert_eq!(child.as_str(), "OU=Sales\\, EMEA,OU=Groups,DC=example,DC=com");
        assert_eq!(child.leaf_value(), "Sales, EMEA");
        assert_eq!(child.parent().unwrap(), base);

        let padded = base.child("CN", " #lead ");
        assert_eq!(padded.as_str(), "CN=\\ #lead\\ ,OU=Groups,DC=example,DC=com");
        let reparsed = DistinguishedName::parse(padded.as_str()).unwrap();
        assert_eq!(reparsed.leaf_value(), " #lead ");
    }

    #[test]
    fn escaped_multibyte_whitespace_is_kept() {
        for (input, value) in [
            ("CN=a\\\u{3000},DC=example,DC=com", "a\u{3000}"),
            ("CN=a\\\u{a0},DC=example,DC=com", "a\u{a0}"),
        ] {
            let dn = DistinguishedName::parse(input).unwrap();
            assert_eq!(dn.leaf_value(), value);
            assert_eq!(dn.rdns().len(), 3);

            let reparsed = DistinguishedName::parse(dn.as_str()).unwrap();
            assert_eq!(reparsed.leaf_value(), value);
        }

        let padded = DistinguishedName::parse("DC=example,DC=com")
            .unwrap()
            .child("CN", "\u{3000}ideographic\u{3000}");
        let reparsed = DistinguishedName::parse(padded.as_str()).unwrap();
        assert_eq!(reparsed.leaf_value(), "\u{3000}ideographic\u{3000}");
    }

    #[test]
    fn unescaped_trailing_multibyte_whitespace_is_trimmed() {
        let dn = DistinguishedName::parse("CN=a\u{3000},DC=example,DC=com").unwrap();
        assert_eq!(dn.leaf_value(), "a");
    }

    #[test]
    fn same_entry_ignores_case() {
        let a = DistinguishedName::parse("CN=Jane,OU=Users,DC=Example,DC=com").unwrap();
        let b = DistinguishedName::parse("cn=jane, ou=users, dc=example, dc=com").unwrap();
        assert!(a.same_entry(&b));
        assert_ne!(a, b);
    }

    #[test]
    fn serde_uses_string_form() {
        let dn = DistinguishedName::parse("OU=Engineering,DC=example,DC=com").unwrap();
        let json = serde_json::to_string(&dn).unwrap();
        assert_eq!(json, "\"OU=Engineering,DC=example,DC=com\"");
        let back: DistinguishedName = serde_json::from_str(&json).unwrap();
        assert_eq!(back, dn);
        assert!(serde_json::from_str::<DistinguishedName>("\"nope\"").is_err());
    }
}
