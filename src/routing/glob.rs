//! Hosting-style glob patterns.
//!
//! # Responsibilities
//! - Decide whether a rule source is a glob or an exact literal
//! - Compile a glob into a matcher, failing fast on malformed input
//! - Match paths (separator `/`) and hostnames (separator `.`)
//!
//! # Syntax
//! - `*` matches zero or more characters within one segment
//! - `**` matches zero or more of any characters
//! - `**/` matches zero or more whole segments
//! - a trailing `/**` matches the parent itself or anything below it
//! - `!(a|b)` matches one segment that matches none of the alternatives
//! - everything else is literal
//!
//! # Design Decisions
//! - Patterns compile to a token program matched by backtracking;
//!   negation needs lookahead, which the `regex` crate does not offer
//! - Every glob token in a pattern is honoured, not only the first one
//! - Compiled globs are immutable and `Send + Sync`

use std::fmt;
use thiserror::Error;

/// Errors raised while compiling a glob.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GlobError {
    #[error("Empty pattern")]
    Empty,

    #[error("Unclosed negation group in pattern: {0}")]
    UnclosedNegation(String),

    #[error("Empty negation group in pattern: {0}")]
    EmptyNegation(String),

    #[error("Nested negation groups are not supported: {0}")]
    NestedNegation(String),
}

/// Returns true if `expr` uses glob syntax.
///
/// A pattern is a glob when it contains a negation group `!(...)`, any `*`,
/// or ends with `/`. Anything else is an exact literal.
pub fn is_pattern(expr: &str) -> bool {
    expr.contains('*') || expr.ends_with('/') || has_negation_group(expr)
}

fn has_negation_group(expr: &str) -> bool {
    let mut rest = expr;
    while let Some(start) = rest.find("!(") {
        let after = &rest[start + 2..];
        if let Some(end) = after.find(')') {
            let inner = &after[..end];
            if !inner.is_empty() && !inner.chars().any(char::is_whitespace) {
                return true;
            }
        }
        rest = after;
    }
    false
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(String),
    /// `*`
    Star,
    /// `**`
    Globstar,
    /// `**/`
    Dirs,
    /// trailing `/**`
    Subtree,
    /// `!(a|b)`
    Not(Vec<Vec<Token>>),
}

/// A compiled glob pattern.
#[derive(Debug, Clone)]
pub struct Glob {
    source: String,
    tokens: Vec<Token>,
    separator: u8,
    ignore_case: bool,
}

impl Glob {
    /// Compile a generic pattern (segments separated by `/`, no normalization).
    pub fn new(expr: &str) -> Result<Self, GlobError> {
        Self::compile(expr, b'/', false)
    }

    /// Compile a path pattern, normalizing it to start with `/`.
    pub fn path(expr: &str) -> Result<Self, GlobError> {
        if expr.starts_with('/') {
            Self::new(expr)
        } else {
            Self::new(&format!("/{}", expr))
        }
    }

    /// Compile a hostname pattern (segments separated by `.`, case-insensitive).
    pub fn host(expr: &str) -> Result<Self, GlobError> {
        Self::compile(expr, b'.', true)
    }

    fn compile(expr: &str, separator: u8, ignore_case: bool) -> Result<Self, GlobError> {
        if expr.is_empty() {
            return Err(GlobError::Empty);
        }
        let tokens = parse(expr, expr)?;
        Ok(Self {
            source: expr.to_string(),
            tokens,
            separator,
            ignore_case,
        })
    }

    /// Returns true if the whole candidate matches this pattern.
    pub fn is_match(&self, candidate: &str) -> bool {
        self.match_tokens(&self.tokens, candidate.as_bytes())
    }

    /// The (normalized) pattern this glob was compiled from.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    fn match_tokens(&self, tokens: &[Token], input: &[u8]) -> bool {
        let Some((token, rest)) = tokens.split_first() else {
            return input.is_empty();
        };

        match token {
            Token::Literal(lit) => {
                let lit = lit.as_bytes();
                input.len() >= lit.len()
                    && self.bytes_eq(&input[..lit.len()], lit)
                    && self.match_tokens(rest, &input[lit.len()..])
            }
            // Shortest segment first
            Token::Star => {
                for n in 0..=input.len() {
                    if n > 0 && input[n - 1] == self.separator {
                        break;
                    }
                    if self.match_tokens(rest, &input[n..]) {
                        return true;
                    }
                }
                false
            }
            Token::Globstar => (0..=input.len()).any(|n| self.match_tokens(rest, &input[n..])),
            Token::Dirs => {
                if self.match_tokens(rest, input) {
                    return true;
                }
                input
                    .iter()
                    .enumerate()
                    .filter(|(_, b)| **b == b'/')
                    .any(|(i, _)| self.match_tokens(rest, &input[i + 1..]))
            }
            Token::Subtree => input.is_empty() || input[0] == b'/',
            // The cheap tail check runs before the exclusion check, and a
            // trailing negation only tries the whole remaining segment
            Token::Not(alternatives) => {
                let segment_len = input
                    .iter()
                    .position(|b| *b == self.separator)
                    .unwrap_or(input.len());
                let excluded = |n: usize| alternatives.iter().any(|alt| self.match_tokens(alt, &input[..n]));

                if rest.is_empty() {
                    return segment_len == input.len() && !excluded(segment_len);
                }
                (0..=segment_len).any(|n| self.match_tokens(rest, &input[n..]) && !excluded(n))
            }
        }
    }

    fn bytes_eq(&self, a: &[u8], b: &[u8]) -> bool {
        if self.ignore_case {
            a.eq_ignore_ascii_case(b)
        } else {
            a == b
        }
    }
}

impl fmt::Display for Glob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

fn parse(expr: &str, whole: &str) -> Result<Vec<Token>, GlobError> {
    let mut tokens = Vec::new();
    let mut literal = String::new();
    let mut i = 0;

    while i < expr.len() {
        let rest = &expr[i..];

        if rest.starts_with("!(") {
            let inner_start = i + 2;
            let close = expr[inner_start..]
                .find(')')
                .ok_or_else(|| GlobError::UnclosedNegation(whole.to_string()))?;
            let inner = &expr[inner_start..inner_start + close];
            if inner.is_empty() {
                return Err(GlobError::EmptyNegation(whole.to_string()));
            }
            if inner.contains("!(") {
                return Err(GlobError::NestedNegation(whole.to_string()));
            }
            let alternatives = inner
                .split('|')
                .map(|alt| parse(alt, whole))
                .collect::<Result<Vec<_>, _>>()?;
            flush(&mut literal, &mut tokens);
            tokens.push(Token::Not(alternatives));
            i = inner_start + close + 1;
        } else if rest == "/**" {
            flush(&mut literal, &mut tokens);
            tokens.push(Token::Subtree);
            i += 3;
        } else if rest.starts_with("**") {
            flush(&mut literal, &mut tokens);
            let run = rest.bytes().take_while(|b| *b == b'*').count();
            i += run;
            if expr[i..].starts_with('/') {
                tokens.push(Token::Dirs);
                i += 1;
            } else {
                tokens.push(Token::Globstar);
            }
        } else if rest.starts_with('*') {
            flush(&mut literal, &mut tokens);
            tokens.push(Token::Star);
            i += 1;
        } else if let Some(c) = rest.chars().next() {
            literal.push(c);
            i += c.len_utf8();
        }
    }
    flush(&mut literal, &mut tokens);

    Ok(tokens)
}

fn flush(literal: &mut String, tokens: &mut Vec<Token>) {
    if !literal.is_empty() {
        tokens.push(Token::Literal(std::mem::take(literal)));
    }
}
