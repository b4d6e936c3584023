//! SCIM 2.0 Filter Parser
//!
//! This module implements a parser for SCIM filter expressions per RFC 7644 Section 3.4.2.
//!
//! ## Grammar
//!
//! ```text
//! filter     = orExpr
//! orExpr     = andExpr { "or" andExpr }
//! andExpr    = notExpr { "and" notExpr }
//! notExpr    = "not" ( "(" filter ")" | attrExpr ) | "(" filter ")" | attrExpr
//! attrExpr   = attrPath "pr"
//!            | attrPath compareOp compValue
//!            | attrPath "[" valFilter "]" [ "." ATTRNAME ( "pr" | compareOp compValue ) ]
//! attrPath   = [ URN ":" ] ATTRNAME [ "." ATTRNAME ]
//! valFilter  = filter without nested "[...]"
//! compareOp  = "eq" | "ne" | "co" | "sw" | "ew" | "gt" | "ge" | "lt" | "le"
//! compValue  = "true" | "false" | "null" | NUMBER | STRING
//! ```
//!
//! Keywords and operators are case-insensitive. The trailing form
//! `emails[type eq "work"].value sw "j"` is desugared into a value path whose
//! sub-filter is `type eq "work" and value sw "j"`.
//!
//! ## Examples
//!
//! ```text
//! userName eq "john"
//! active eq true
//! name.familyName co "doe"
//! emails[type eq "work" and value co "@example.com"]
//! urn:ietf:params:scim:schemas:extension:enterprise:2.0:User:employeeNumber eq "42"
//! not (active eq false)
//! ```
//!
//! ## Security Limits
//!
//! To prevent DoS attacks from malicious filter expressions:
//! - Maximum filter length: 4096 bytes
//! - Maximum nesting depth: 32 levels
//!
//! Both are configurable through [`FilterLimits`].

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum allowed length of a SCIM filter expression (bytes).
///
/// This limit prevents excessive memory usage and CPU time when parsing
/// maliciously crafted filter expressions. 4KB is generous for any real-world
/// SCIM filter while providing protection against abuse.
pub const MAX_FILTER_LENGTH: usize = 4096;

/// Maximum allowed nesting depth of a SCIM filter expression.
///
/// Counts parentheses, `not` and value filter brackets.
pub const MAX_FILTER_DEPTH: usize = 32;

/// Parser resource limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterLimits {
    /// Maximum input length in bytes
    pub max_length: usize,
    /// Maximum nesting depth
    pub max_depth: usize,
}

impl Default for FilterLimits {
    fn default() -> Self {
        Self {
            max_length: MAX_FILTER_LENGTH,
            max_depth: MAX_FILTER_DEPTH,
        }
    }
}

/// A parsed SCIM filter expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Attribute comparison (e.g., `userName eq "john"`)
    Compare {
        attr: AttrPath,
        op: CompareOp,
        value: FilterValue,
    },
    /// Attribute presence check (e.g., `name pr`)
    Present { attr: AttrPath },
    /// Filter applied to the elements of a complex attribute
    /// (e.g., `emails[type eq "work"]`)
    ValuePath { attr: AttrPath, filter: Box<Filter> },
    /// Logical AND of two filters
    And(Box<Filter>, Box<Filter>),
    /// Logical OR of two filters
    Or(Box<Filter>, Box<Filter>),
    /// Logical NOT of a filter
    Not(Box<Filter>),
}

impl Filter {
    pub fn and(left: Filter, right: Filter) -> Self {
        Filter::And(Box::new(left), Box::new(right))
    }

    pub fn or(left: Filter, right: Filter) -> Self {
        Filter::Or(Box::new(left), Box::new(right))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(inner: Filter) -> Self {
        Filter::Not(Box::new(inner))
    }
}

/// Renders the canonical form. Re-parsing the output yields an equal filter.
impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Compare { attr, op, value } => write!(f, "{} {} {}", attr, op, value),
            Filter::Present { attr } => write!(f, "{} pr", attr),
            Filter::ValuePath { attr, filter } => write!(f, "{}[{}]", attr, filter),
            Filter::And(left, right) => write!(f, "({} and {})", left, right),
            Filter::Or(left, right) => write!(f, "({} or {})", left, right),
            Filter::Not(inner) => write!(f, "not ({})", inner),
        }
    }
}

/// An attribute path: optional schema URN, attribute, optional sub-attribute.
///
/// Names keep the casing they were written with; resolution against the
/// schema registry is case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttrPath {
    /// Schema URN prefix (e.g., `urn:ietf:params:scim:schemas:core:2.0:User`)
    pub urn: Option<String>,
    /// Main attribute name (e.g., "userName", "emails")
    pub attr: String,
    /// Sub-attribute for complex types (e.g., "familyName" in "name.familyName")
    pub sub_attr: Option<String>,
}

impl AttrPath {
    /// Create a simple attribute path
    pub fn simple(attr: impl Into<String>) -> Self {
        Self {
            urn: None,
            attr: attr.into(),
            sub_attr: None,
        }
    }

    /// Create a nested attribute path (e.g., "name.familyName")
    pub fn nested(attr: impl Into<String>, sub_attr: impl Into<String>) -> Self {
        Self {
            urn: None,
            attr: attr.into(),
            sub_attr: Some(sub_attr.into()),
        }
    }

    /// Qualify the path with a schema URN
    pub fn with_urn(mut self, urn: impl Into<String>) -> Self {
        self.urn = Some(urn.into());
        self
    }

    /// The same path with a different sub-attribute
    pub fn with_sub_attr(&self, sub_attr: Option<String>) -> Self {
        Self {
            urn: self.urn.clone(),
            attr: self.attr.clone(),
            sub_attr,
        }
    }
}

impl fmt::Display for AttrPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(urn) = &self.urn {
            write!(f, "{}:", urn)?;
        }
        write!(f, "{}", self.attr)?;
        if let Some(sub) = &self.sub_attr {
            write!(f, ".{}", sub)?;
        }
        Ok(())
    }
}

/// Comparison operators per RFC 7644.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompareOp {
    /// Equal
    Eq,
    /// Not equal
    Ne,
    /// Contains
    Co,
    /// Starts with
    Sw,
    /// Ends with
    Ew,
    /// Greater than
    Gt,
    /// Greater than or equal
    Ge,
    /// Less than
    Lt,
    /// Less than or equal
    Le,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompareOp::Eq => "eq",
            CompareOp::Ne => "ne",
            CompareOp::Co => "co",
            CompareOp::Sw => "sw",
            CompareOp::Ew => "ew",
            CompareOp::Gt => "gt",
            CompareOp::Ge => "ge",
            CompareOp::Lt => "lt",
            CompareOp::Le => "le",
        };
        write!(f, "{}", s)
    }
}

impl CompareOp {
    pub const ALL: [CompareOp; 9] = [
        CompareOp::Eq,
        CompareOp::Ne,
        CompareOp::Co,
        CompareOp::Sw,
        CompareOp::Ew,
        CompareOp::Gt,
        CompareOp::Ge,
        CompareOp::Lt,
        CompareOp::Le,
    ];

    /// Parse an operator keyword (case-insensitive).
    pub fn from_keyword(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "eq" => Some(CompareOp::Eq),
            "ne" => Some(CompareOp::Ne),
            "co" => Some(CompareOp::Co),
            "sw" => Some(CompareOp::Sw),
            "ew" => Some(CompareOp::Ew),
            "gt" => Some(CompareOp::Gt),
            "ge" => Some(CompareOp::Ge),
            "lt" => Some(CompareOp::Lt),
            "le" => Some(CompareOp::Le),
            _ => None,
        }
    }

    /// Substring operators (`co`, `sw`, `ew`)
    pub fn is_substring(self) -> bool {
        matches!(self, CompareOp::Co | CompareOp::Sw | CompareOp::Ew)
    }

    /// Ordering operators (`gt`, `ge`, `lt`, `le`)
    pub fn is_ordering(self) -> bool {
        matches!(
            self,
            CompareOp::Gt | CompareOp::Ge | CompareOp::Lt | CompareOp::Le
        )
    }
}

/// Filter comparison values, as written in the filter text.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    String(String),
    Bool(bool),
    Number(f64),
    Null,
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::String(s) => {
                write!(f, "\"")?;
                for c in s.chars() {
                    match c {
                        '"' => write!(f, "\\\"")?,
                        '\\' => write!(f, "\\\\")?,
                        '\n' => write!(f, "\\n")?,
                        '\t' => write!(f, "\\t")?,
                        '\r' => write!(f, "\\r")?,
                        c => write!(f, "{}", c)?,
                    }
                }
                write!(f, "\"")
            }
            FilterValue::Bool(b) => write!(f, "{}", b),
            FilterValue::Number(n) => write!(f, "{}", n),
            FilterValue::Null => write!(f, "null"),
        }
    }
}

/// Filter parsing error.
///
/// `offset` is the character (not byte) offset of the offending token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at position {offset}")]
pub struct FilterParseError {
    pub message: String,
    pub offset: usize,
}

/// Parse a SCIM filter expression with the default [`FilterLimits`].
///
/// # Errors
///
/// Returns an error if:
/// - The filter exceeds [`MAX_FILTER_LENGTH`] bytes
/// - The filter exceeds [`MAX_FILTER_DEPTH`] nesting levels
/// - The filter has invalid syntax
///
/// # Examples
///
/// ```
/// use scim_engine::scim::filter::parse_filter;
///
/// let filter = parse_filter("userName eq \"john\"").unwrap();
/// let filter = parse_filter("active eq true and emails[type eq \"work\"]").unwrap();
/// ```
pub fn parse_filter(input: &str) -> Result<Filter, FilterParseError> {
    parse_filter_with(input, &FilterLimits::default())
}

/// Parse a SCIM filter expression with explicit limits.
pub fn parse_filter_with(input: &str, limits: &FilterLimits) -> Result<Filter, FilterParseError> {
    let mut parser = Parser::new(input, limits)?;
    let filter = parser.parse_filter()?;
    parser.expect_end()?;
    Ok(filter)
}

/// Parse a PATCH operation path: `attrPath [ "[" valFilter "]" [ "." ATTRNAME ] ]`.
///
/// Returns the attribute path (with the trailing sub-attribute folded into
/// `sub_attr`) and the optional value filter.
pub(crate) fn parse_path_expression(
    input: &str,
    limits: &FilterLimits,
) -> Result<(AttrPath, Option<Filter>), FilterParseError> {
    let mut parser = Parser::new(input, limits)?;
    parser.skip_whitespace();
    let mut attr = parser.parse_attr_path()?;

    let value_filter = if parser.peek() == Some('[') {
        let bracket = parser.position;
        parser.advance();
        if attr.sub_attr.is_some() {
            return Err(parser.error(
                "Value filter must follow an attribute, not a sub-attribute",
                bracket,
            ));
        }
        let filter = parser.parse_bracketed()?;
        if parser.try_char('.') {
            attr.sub_attr = Some(parser.parse_attr_name()?);
        }
        Some(filter)
    } else {
        None
    };

    parser.expect_end()?;
    Ok((attr, value_filter))
}

// =============================================================================
// Parser Implementation
// =============================================================================

struct Parser<'a> {
    input: &'a str,
    position: usize,
    depth: usize,
    max_depth: usize,
    in_value_filter: bool,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str, limits: &FilterLimits) -> Result<Self, FilterParseError> {
        // Check length limit before parsing
        if input.len() > limits.max_length {
            return Err(FilterParseError {
                message: format!(
                    "Filter exceeds maximum length ({} bytes, max {})",
                    input.len(),
                    limits.max_length
                ),
                offset: 0,
            });
        }
        if input.trim().is_empty() {
            return Err(FilterParseError {
                message: "Filter is empty".to_string(),
                offset: 0,
            });
        }

        Ok(Self {
            input,
            position: 0,
            depth: 0,
            max_depth: limits.max_depth,
            in_value_filter: false,
        })
    }

    /// Build an error at a byte position, reported as a character offset.
    fn error(&self, message: impl Into<String>, at: usize) -> FilterParseError {
        FilterParseError {
            message: message.into(),
            offset: self.input[..at].chars().count(),
        }
    }

    /// Enter a nested scope (parentheses, brackets, etc.).
    /// Returns an error if the maximum nesting depth is exceeded.
    fn enter_scope(&mut self) -> Result<(), FilterParseError> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(self.error(
                format!("Filter exceeds maximum nesting depth ({})", self.max_depth),
                self.position,
            ));
        }
        Ok(())
    }

    /// Exit a nested scope.
    fn exit_scope(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    fn expect_end(&mut self) -> Result<(), FilterParseError> {
        self.skip_whitespace();
        if self.position < self.input.len() {
            return Err(self.error(
                format!("Unexpected input: '{}'", &self.input[self.position..]),
                self.position,
            ));
        }
        Ok(())
    }

    fn parse_filter(&mut self) -> Result<Filter, FilterParseError> {
        self.parse_or_expr()
    }

    // orExpr = andExpr { "or" andExpr }
    fn parse_or_expr(&mut self) -> Result<Filter, FilterParseError> {
        let mut left = self.parse_and_expr()?;

        while self.try_keyword("or") {
            let right = self.parse_and_expr()?;
            left = Filter::or(left, right);
        }

        Ok(left)
    }

    // andExpr = notExpr { "and" notExpr }
    fn parse_and_expr(&mut self) -> Result<Filter, FilterParseError> {
        let mut left = self.parse_not_expr()?;

        while self.try_keyword("and") {
            let right = self.parse_not_expr()?;
            left = Filter::and(left, right);
        }

        Ok(left)
    }

    // notExpr = "not" ( "(" filter ")" | attrExpr ) | "(" filter ")" | attrExpr
    fn parse_not_expr(&mut self) -> Result<Filter, FilterParseError> {
        self.skip_whitespace();

        if self.try_keyword("not") {
            self.skip_whitespace();
            self.enter_scope()?;
            let inner = if self.try_char('(') {
                self.parse_group_tail()?
            } else {
                self.parse_attr_expr()?
            };
            self.exit_scope();
            return Ok(Filter::not(inner));
        }

        if self.try_char('(') {
            self.enter_scope()?;
            let inner = self.parse_group_tail()?;
            self.exit_scope();
            return Ok(inner);
        }

        self.parse_attr_expr()
    }

    /// Everything after an opening parenthesis, up to and including `)`.
    fn parse_group_tail(&mut self) -> Result<Filter, FilterParseError> {
        let inner = self.parse_filter()?;
        self.skip_whitespace();
        if !self.try_char(')') {
            return Err(self.error("Expected ')' to close grouped expression", self.position));
        }
        Ok(inner)
    }

    // attrExpr = attrPath "pr" | attrPath compareOp compValue | valuePath
    fn parse_attr_expr(&mut self) -> Result<Filter, FilterParseError> {
        self.skip_whitespace();
        let attr = self.parse_attr_path()?;

        if self.peek() == Some('[') {
            let bracket = self.position;
            if self.in_value_filter {
                return Err(self.error("Value filters cannot be nested", bracket));
            }
            if attr.sub_attr.is_some() {
                return Err(self.error(
                    "Value filter must follow an attribute, not a sub-attribute",
                    bracket,
                ));
            }
            self.advance();
            let mut filter = self.parse_bracketed()?;

            // Trailing `].sub op value` folds into the sub-filter
            if self.try_char('.') {
                let sub = AttrPath::simple(self.parse_attr_name()?);
                let tail = self.parse_comparison(sub)?;
                filter = Filter::and(filter, tail);
            }

            return Ok(Filter::ValuePath {
                attr,
                filter: Box::new(filter),
            });
        }

        self.parse_comparison(attr)
    }

    /// Value filter body after `[`, up to and including `]`.
    fn parse_bracketed(&mut self) -> Result<Filter, FilterParseError> {
        self.enter_scope()?;
        self.in_value_filter = true;
        let filter = self.parse_filter()?;
        self.in_value_filter = false;
        self.exit_scope();
        self.skip_whitespace();
        if !self.try_char(']') {
            return Err(self.error("Expected ']' to close value filter", self.position));
        }
        Ok(filter)
    }

    fn parse_comparison(&mut self, attr: AttrPath) -> Result<Filter, FilterParseError> {
        self.skip_whitespace();

        if self.try_keyword("pr") {
            return Ok(Filter::Present { attr });
        }

        let op = self.parse_compare_op(&attr)?;
        let value = self.parse_value()?;

        Ok(Filter::Compare { attr, op, value })
    }

    // attrPath = [ URN ":" ] ATTRNAME [ "." ATTRNAME ]
    fn parse_attr_path(&mut self) -> Result<AttrPath, FilterParseError> {
        let start = self.position;
        let remaining = &self.input[self.position..];

        if remaining.len() >= 4 && remaining[..4].eq_ignore_ascii_case("urn:") {
            return self.parse_qualified_path(start);
        }

        let attr = self.parse_attr_name()?;
        let sub_attr = if self.try_char('.') {
            Some(self.parse_attr_name()?)
        } else {
            None
        };

        if self.peek() == Some('.') {
            return Err(self.error(
                "Attribute paths allow at most one sub-attribute",
                self.position,
            ));
        }

        Ok(AttrPath {
            urn: None,
            attr,
            sub_attr,
        })
    }

    /// `urn:...:attr[.sub]`; the attribute starts after the last `:`.
    fn parse_qualified_path(&mut self, start: usize) -> Result<AttrPath, FilterParseError> {
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || matches!(c, ':' | '.' | '_' | '-' | '$'))
        {
            self.advance();
        }
        let token = &self.input[start..self.position];

        // Safe: the token starts with "urn:"
        let colon = token.rfind(':').unwrap_or(3);
        let urn = &token[..colon];
        let rest = &token[colon + 1..];
        let rest_start = start + colon + 1;

        let mut parts = rest.split('.');
        let attr = parts.next().unwrap_or_default();
        let sub_attr = parts.next();
        if parts.next().is_some() {
            return Err(self.error(
                "Attribute paths allow at most one sub-attribute",
                rest_start,
            ));
        }
        if !is_attr_name(attr) {
            return Err(self.error("Expected attribute name after schema URN", rest_start));
        }
        if let Some(sub) = sub_attr
            && !is_attr_name(sub)
        {
            return Err(self.error(
                "Expected sub-attribute name",
                rest_start + attr.len() + 1,
            ));
        }

        Ok(AttrPath {
            urn: Some(urn.to_string()),
            attr: attr.to_string(),
            sub_attr: sub_attr.map(str::to_string),
        })
    }

    fn parse_attr_name(&mut self) -> Result<String, FilterParseError> {
        self.skip_whitespace();

        let start = self.position;

        // Attribute names must start with a letter (or `$` as in `$ref`)
        if !self
            .peek()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '$')
        {
            return Err(self.error("Expected attribute name", self.position));
        }
        self.advance();

        // Consume alphanumeric characters, underscores, and hyphens
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            self.advance();
        }

        Ok(self.input[start..self.position].to_string())
    }

    fn parse_compare_op(&mut self, attr: &AttrPath) -> Result<CompareOp, FilterParseError> {
        self.skip_whitespace();

        let start = self.position;
        while self.peek().is_some_and(|c| c.is_ascii_alphabetic()) {
            self.advance();
        }

        let op_str = &self.input[start..self.position];
        if op_str.is_empty() {
            return Err(self.error(
                format!("Expected operator after attribute '{}'", attr),
                start,
            ));
        }

        CompareOp::from_keyword(op_str)
            .ok_or_else(|| self.error(format!("Unknown operator: '{}'", op_str), start))
    }

    fn parse_value(&mut self) -> Result<FilterValue, FilterParseError> {
        self.skip_whitespace();

        // String value
        if self.peek() == Some('"') {
            return self.parse_string_value();
        }

        // Boolean or null
        if self.try_keyword("true") {
            return Ok(FilterValue::Bool(true));
        }
        if self.try_keyword("false") {
            return Ok(FilterValue::Bool(false));
        }
        if self.try_keyword("null") {
            return Ok(FilterValue::Null);
        }

        // Number
        if self
            .peek()
            .is_some_and(|c| c.is_ascii_digit() || c == '-' || c == '+')
        {
            return self.parse_number_value();
        }

        Err(self.error(
            "Expected value (string, boolean, number, or null)",
            self.position,
        ))
    }

    fn parse_string_value(&mut self) -> Result<FilterValue, FilterParseError> {
        let open = self.position;
        if !self.try_char('"') {
            return Err(self.error("Expected '\"' to start string", self.position));
        }

        let mut value = String::new();

        loop {
            match self.peek() {
                None => {
                    return Err(self.error("Unterminated string", open));
                }
                Some('"') => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    let escape = self.position;
                    self.advance();
                    let unescaped = match self.peek() {
                        Some('"') => '"',
                        Some('\\') => '\\',
                        Some('/') => '/',
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('r') => '\r',
                        Some('u') => {
                            self.advance();
                            value.push(self.parse_unicode_escape(escape)?);
                            continue;
                        }
                        _ => {
                            return Err(self.error("Invalid escape sequence", escape));
                        }
                    };
                    value.push(unescaped);
                    self.advance();
                }
                Some(c) => {
                    value.push(c);
                    self.advance();
                }
            }
        }

        Ok(FilterValue::String(value))
    }

    /// Four hex digits following `\u`.
    fn parse_unicode_escape(&mut self, escape: usize) -> Result<char, FilterParseError> {
        let start = self.position;
        for _ in 0..4 {
            if !self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
                return Err(self.error("Invalid unicode escape", escape));
            }
            self.advance();
        }
        u32::from_str_radix(&self.input[start..self.position], 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| self.error("Invalid unicode escape", escape))
    }

    fn parse_number_value(&mut self) -> Result<FilterValue, FilterParseError> {
        let start = self.position;

        // Optional sign
        if self.peek() == Some('-') || self.peek() == Some('+') {
            self.advance();
        }

        // Integer part
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }

        // Decimal part
        if self.peek() == Some('.') {
            self.advance();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }

        // Exponent part
        if self.peek().is_some_and(|c| c == 'e' || c == 'E') {
            self.advance();
            if self.peek() == Some('-') || self.peek() == Some('+') {
                self.advance();
            }
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }

        let num_str = &self.input[start..self.position];
        match num_str.parse::<f64>() {
            Ok(n) if n.is_finite() => Ok(FilterValue::Number(n)),
            _ => Err(self.error(format!("Invalid number: '{}'", num_str), start)),
        }
    }

    // Helper methods

    fn peek(&self) -> Option<char> {
        self.input[self.position..].chars().next()
    }

    fn advance(&mut self) {
        if let Some(c) = self.peek() {
            self.position += c.len_utf8();
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(|c| c.is_whitespace()) {
            self.advance();
        }
    }

    fn try_char(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn try_keyword(&mut self, keyword: &str) -> bool {
        self.skip_whitespace();

        let remaining = &self.input[self.position..];

        // Case-insensitive comparison
        if remaining.len() >= keyword.len()
            && remaining.is_char_boundary(keyword.len())
            && remaining[..keyword.len()].eq_ignore_ascii_case(keyword)
        {
            // Make sure keyword is not part of a larger identifier
            let after_keyword = remaining[keyword.len()..].chars().next();
            if after_keyword.is_none_or(|c| !(c.is_ascii_alphanumeric() || c == '.' || c == ':'))
            {
                self.position += keyword.len();
                return true;
            }
        }

        false
    }
}

fn is_attr_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

// =============================================================================
// Tests
// =============================================================================
