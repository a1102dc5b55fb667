//! GraphQL document scanning.
//!
//! Only enough of the GraphQL grammar is understood to find the top-level
//! definitions of an executable document and their kinds. Selection sets,
//! variable definitions and directives are skipped as balanced token groups.
//!
//! # Main Definition
//!
//! The *main definition* of a document is its first operation definition,
//! or its first fragment when the document holds no operation at all.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use crate::error::{Error, Result};

// ============================================================================
// OperationKind
// ============================================================================

/// Root kind of an operation definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// `query` or the anonymous `{ ... }` shorthand.
    Query,
    /// `mutation`.
    Mutation,
    /// `subscription`.
    Subscription,
}

impl OperationKind {
    /// Returns the GraphQL keyword for this kind.
    #[inline]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Mutation => "mutation",
            Self::Subscription => "subscription",
        }
    }

    fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "query" => Some(Self::Query),
            "mutation" => Some(Self::Mutation),
            "subscription" => Some(Self::Subscription),
            _ => None,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Definition
// ============================================================================

/// A top-level definition of an executable document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Definition {
    /// An operation definition.
    Operation {
        /// Root operation kind.
        kind: OperationKind,
        /// Operation name, if any.
        name: Option<String>,
    },
    /// A fragment definition.
    Fragment {
        /// Fragment name.
        name: String,
    },
}

impl Definition {
    /// Returns the operation kind, or `None` for fragments.
    #[inline]
    #[must_use]
    pub fn operation_kind(&self) -> Option<OperationKind> {
        match self {
            Self::Operation { kind, .. } => Some(*kind),
            Self::Fragment { .. } => None,
        }
    }
}

// ============================================================================
// Document
// ============================================================================

/// A scanned executable GraphQL document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    definitions: Vec<Definition>,
}

impl Document {
    /// Scans `source` into its top-level definitions.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDocument`] if the source is empty, has
    /// unbalanced brackets, unterminated strings, or contains definitions that
    /// are not operations or fragments.
    pub fn parse(source: &str) -> Result<Self> {
        let tokens = Lexer::new(source).tokenize()?;
        let definitions = parse_definitions(&tokens)?;

        if definitions.is_empty() {
            return Err(Error::invalid_document("document has no definitions"));
        }

        Ok(Self { definitions })
    }

    /// Returns all top-level definitions in source order.
    #[inline]
    #[must_use]
    pub fn definitions(&self) -> &[Definition] {
        &self.definitions
    }

    /// Returns the main definition.
    ///
    /// The first operation wins; otherwise the first fragment.
    #[must_use]
    pub fn main_definition(&self) -> &Definition {
        self.definitions
            .iter()
            .find(|d| matches!(d, Definition::Operation { .. }))
            .unwrap_or(&self.definitions[0])
    }

    /// Returns the operation kind of the main definition.
    #[inline]
    #[must_use]
    pub fn operation_kind(&self) -> Option<OperationKind> {
        self.main_definition().operation_kind()
    }

    /// Returns `true` if the main definition is a subscription operation.
    #[inline]
    #[must_use]
    pub fn is_subscription(&self) -> bool {
        self.operation_kind() == Some(OperationKind::Subscription)
    }

    /// Returns the name of the main operation, if it has one.
    #[must_use]
    pub fn operation_name(&self) -> Option<&str> {
        match self.main_definition() {
            Definition::Operation { name, .. } => name.as_deref(),
            Definition::Fragment { .. } => None,
        }
    }
}

// ============================================================================
// Definition Parsing
// ============================================================================

fn parse_definitions(tokens: &[Token<'_>]) -> Result<Vec<Definition>> {
    let mut definitions = Vec::new();
    let mut pos = 0;

    while pos < tokens.len() {
        let (definition, next) = match tokens[pos] {
            Token::Punct('{') => (
                Definition::Operation {
                    kind: OperationKind::Query,
                    name: None,
                },
                pos,
            ),
            Token::Name("fragment") => {
                let Some(Token::Name(name)) = tokens.get(pos + 1) else {
                    return Err(Error::invalid_document("fragment is missing a name"));
                };
                (
                    Definition::Fragment {
                        name: (*name).to_string(),
                    },
                    pos + 2,
                )
            }
            Token::Name(keyword) => {
                let Some(kind) = OperationKind::from_keyword(keyword) else {
                    return Err(Error::invalid_document(format!(
                        "unsupported definition `{keyword}`"
                    )));
                };
                let name = match tokens.get(pos + 1) {
                    Some(Token::Name(name)) => Some((*name).to_string()),
                    _ => None,
                };
                (Definition::Operation { kind, name }, pos + 1)
            }
            Token::Punct(c) => {
                return Err(Error::invalid_document(format!(
                    "unexpected `{c}` at top level"
                )));
            }
            Token::Value => {
                return Err(Error::invalid_document("unexpected value at top level"));
            }
        };

        pos = skip_to_selection_end(tokens, next)?;
        definitions.push(definition);
    }

    Ok(definitions)
}

/// Advances past the definition's selection set.
///
/// Braces inside `(...)` belong to variable defaults or arguments and do not
/// open the selection set.
fn skip_to_selection_end(tokens: &[Token<'_>], mut pos: usize) -> Result<usize> {
    let mut parens = 0usize;
    let mut braces = 0usize;

    while let Some(token) = tokens.get(pos) {
        pos += 1;
        match token {
            Token::Punct('(') => parens += 1,
            Token::Punct(')') => {
                parens = parens
                    .checked_sub(1)
                    .ok_or_else(|| Error::invalid_document("unbalanced `)`"))?;
            }
            Token::Punct('{') => braces += 1,
            Token::Punct('}') => {
                braces = braces
                    .checked_sub(1)
                    .ok_or_else(|| Error::invalid_document("unbalanced `}`"))?;
                if braces == 0 && parens == 0 {
                    return Ok(pos);
                }
            }
            _ => {}
        }
    }

    Err(Error::invalid_document("definition has no closed selection set"))
}

// ============================================================================
// Lexer
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token<'a> {
    Name(&'a str),
    Punct(char),
    /// Strings and numbers; their content never matters here.
    Value,
}

struct Lexer<'a> {
    source: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self { source, pos: 0 }
    }

    fn tokenize(mut self) -> Result<Vec<Token<'a>>> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token()? {
            tokens.push(token);
        }
        Ok(tokens)
    }

    fn rest(&self) -> &'a str {
        &self.source[self.pos..]
    }

    fn next_token(&mut self) -> Result<Option<Token<'a>>> {
        self.skip_ignored();

        let Some(c) = self.rest().chars().next() else {
            return Ok(None);
        };

        match c {
            '{' | '}' | '(' | ')' | '[' | ']' | ':' | '=' | '@' | '$' | '!' | '|' | '&' => {
                self.pos += 1;
                Ok(Some(Token::Punct(c)))
            }
            '.' => {
                if !self.rest().starts_with("...") {
                    return Err(Error::invalid_document("stray `.`"));
                }
                self.pos += 3;
                Ok(Some(Token::Punct('.')))
            }
            '"' => {
                self.skip_string()?;
                Ok(Some(Token::Value))
            }
            c if c == '_' || c.is_ascii_alphabetic() => {
                let len = self
                    .rest()
                    .find(|ch: char| !(ch == '_' || ch.is_ascii_alphanumeric()))
                    .unwrap_or(self.rest().len());
                let name = &self.rest()[..len];
                self.pos += len;
                Ok(Some(Token::Name(name)))
            }
            c if c == '-' || c.is_ascii_digit() => {
                let len = self
                    .rest()
                    .find(|ch: char| {
                        !(ch.is_ascii_alphanumeric() || matches!(ch, '-' | '+' | '.'))
                    })
                    .unwrap_or(self.rest().len());
                self.pos += len;
                Ok(Some(Token::Value))
            }
            other => Err(Error::invalid_document(format!(
                "unexpected character `{other}`"
            ))),
        }
    }

    fn skip_ignored(&mut self) {
        loop {
            let rest = self.rest();
            let trimmed = rest.trim_start_matches(|c: char| {
                c.is_whitespace() || c == ',' || c == '\u{feff}'
            });
            self.pos += rest.len() - trimmed.len();

            if trimmed.starts_with('#') {
                let len = trimmed.find(['\n', '\r']).unwrap_or(trimmed.len());
                self.pos += len;
            } else {
                return;
            }
        }
    }

    fn skip_string(&mut self) -> Result<()> {
        if self.rest().starts_with("\"\"\"") {
            self.pos += 3;
            loop {
                let rest = self.rest();
                let Some(idx) = rest.find("\"\"\"") else {
                    return Err(Error::invalid_document("unterminated block string"));
                };
                // `\"""` is an escaped triple quote inside a block string.
                if rest[..idx].ends_with('\\') {
                    self.pos += idx + 3;
                    continue;
                }
                self.pos += idx + 3;
                return Ok(());
            }
        }

        self.pos += 1;
        let mut escaped = false;
        for (idx, ch) in self.rest().char_indices() {
            match ch {
                '\n' | '\r' => break,
                '\\' if !escaped => escaped = true,
                '"' if !escaped => {
                    self.pos += idx + 1;
                    return Ok(());
                }
                _ => escaped = false,
            }
        }

        Err(Error::invalid_document("unterminated string"))
    }
}

// ============================================================================
// Tests
// ============================================================================
