use crate::query::matcher::{Matcher, SizeMatcher, TextTarget};
use crate::query::text::{TextMatchMode, TextMatcher};
use thiserror::Error;

/// Query syntax errors; offsets are byte positions in the input
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("unterminated quote starting at {0}")]
    UnterminatedQuote(usize),

    #[error("unterminated regex starting at {0}")]
    UnterminatedRegex(usize),

    #[error("unclosed group starting at {0}")]
    UnterminatedGroup(usize),

    #[error("invalid regex {pattern:?}: {reason}")]
    InvalidRegex { pattern: String, reason: String },

    #[error("invalid size {0:?}")]
    InvalidSize(String),

    #[error("invalid hash {0:?}")]
    InvalidHash(String),

    #[error("unexpected {ch:?} at {offset}")]
    Unexpected { ch: char, offset: usize },

    #[error("negation at {0} has nothing to negate")]
    DanglingNegation(usize),

    #[error("alternative at {0} has no terms")]
    EmptyAlternative(usize),

    #[error("groups nested deeper than {max} at {0}", max = MAX_DEPTH)]
    TooDeep(usize),
}

/// Deepest group nesting the parser accepts
pub const MAX_DEPTH: usize = 256;

/// Result of [`parse_query`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedQuery {
    pub matcher: Matcher,
    /// Byte offset where parsing stopped: a terminator or the end of input
    pub consumed: usize,
}

/// Parse a query, stopping at the first top-level terminator.
///
/// Terminators inside quotes, regex bodies or parentheses do not stop
/// parsing, so a query can be embedded in a larger expression.
pub fn parse_query(input: &str, terminators: &[char]) -> Result<ParsedQuery, QueryError> {
    let mut parser = QueryParser::new(input, terminators);
    let matcher = parser.parse()?.unwrap_if_possible();
    Ok(ParsedQuery {
        matcher,
        consumed: parser.pos,
    })
}

/// Parse a whole query string
pub fn parse_matcher(input: &str) -> Result<Matcher, QueryError> {
    parse_query(input, &[]).map(|q| q.matcher)
}

/// Query parser
struct QueryParser<'a> {
    input: &'a str,
    terminators: &'a [char],
    pos: usize,
    depth: usize,
}

impl<'a> QueryParser<'a> {
    fn new(input: &'a str, terminators: &'a [char]) -> Self {
        Self {
            input,
            terminators,
            pos: 0,
            depth: 0,
        }
    }

    fn parse(&mut self) -> Result<Matcher, QueryError> {
        let matcher = self.parse_or()?;
        self.skip_whitespace();
        match self.peek_char() {
            Some(ch) if !self.is_terminator(ch) => Err(QueryError::Unexpected {
                ch,
                offset: self.pos,
            }),
            _ => Ok(matcher),
        }
    }

    fn parse_or(&mut self) -> Result<Matcher, QueryError> {
        let mut branches = vec![self.parse_and()?];

        self.skip_whitespace();
        while self.peek_char() == Some('|') {
            let bar = self.pos;
            if branches.last().is_some_and(Vec::is_empty) {
                return Err(QueryError::EmptyAlternative(bar));
            }
            self.advance();
            let branch = self.parse_and()?;
            if branch.is_empty() {
                return Err(QueryError::EmptyAlternative(bar));
            }
            branches.push(branch);
            self.skip_whitespace();
        }

        let mut nodes: Vec<Matcher> = branches.into_iter().map(all_of).collect();
        Ok(match nodes.len() {
            1 => nodes.swap_remove(0),
            _ => Matcher::Any(nodes),
        })
    }

    /// Terms up to the next `|`, `)` or terminator
    fn parse_and(&mut self) -> Result<Vec<Matcher>, QueryError> {
        let mut nodes = Vec::new();

        loop {
            self.skip_whitespace();
            match self.peek_char() {
                None | Some(')') | Some('|') => break,
                Some(ch) if self.is_terminator(ch) => break,
                _ => nodes.push(self.parse_unary()?),
            }
        }

        Ok(nodes)
    }

    /// A run of `-`/`!` markers collapses to its parity
    fn parse_unary(&mut self) -> Result<Matcher, QueryError> {
        let mut negated = false;
        loop {
            let marker = self.pos;
            if !(self.consume_char('-') || self.consume_char('!')) {
                break;
            }
            negated = !negated;
            match self.peek_char() {
                None | Some(')') | Some('|') => return Err(QueryError::DanglingNegation(marker)),
                Some(ch) if ch.is_whitespace() || self.is_terminator(ch) => {
                    return Err(QueryError::DanglingNegation(marker));
                }
                _ => {}
            }
        }

        let inner = self.parse_primary()?;
        Ok(if negated { Matcher::negate(inner) } else { inner })
    }

    fn parse_primary(&mut self) -> Result<Matcher, QueryError> {
        let start = self.pos;

        // Parenthesized expression
        if self.consume_char('(') {
            if self.depth >= MAX_DEPTH {
                return Err(QueryError::TooDeep(start));
            }
            self.depth += 1;
            let node = self.parse_or()?;
            self.skip_whitespace();
            if !self.consume_char(')') {
                return Err(QueryError::UnterminatedGroup(start));
            }
            self.depth -= 1;
            return Ok(node);
        }

        self.parse_term()
    }

    /// `[field ':'] value`
    fn parse_term(&mut self) -> Result<Matcher, QueryError> {
        let start = self.pos;

        // Check for field prefix
        while let Some(ch) = self.peek_char() {
            if ch.is_alphanumeric() || ch == '_' {
                self.advance();
            } else {
                break;
            }
        }
        if self.peek_char() == Some(':') && self.pos > start {
            let field = self.input[start..self.pos].to_ascii_lowercase();
            let target = match field.as_str() {
                "name" => Some(TextTarget::Name),
                "path" => Some(TextTarget::Path),
                "content" | "text" => Some(TextTarget::Content),
                _ => None,
            };
            match field.as_str() {
                "size" => {
                    self.advance();
                    let word = self.read_word();
                    return parse_size(word).map(Matcher::Size);
                }
                "hash" => {
                    self.advance();
                    let word = self.read_word();
                    return parse_hash(word).map(Matcher::Hash);
                }
                "re" if self.input[self.pos..].starts_with(":/") => {
                    // `re:/.../` is a regex value, not a field
                    self.pos = start;
                    return self.parse_value(TextTarget::Name);
                }
                _ => {}
            }
            if let Some(target) = target {
                self.advance();
                return self.parse_value(target);
            }
        }

        // Unknown field or plain word
        self.pos = start;
        self.parse_value(TextTarget::Name)
    }

    /// `['=' | '^'] (quoted | regex | word) ['$']`
    fn parse_value(&mut self, target: TextTarget) -> Result<Matcher, QueryError> {
        let mut mode = None;
        if self.consume_char('=') {
            mode = Some(TextMatchMode::Equals);
        } else if self.consume_char('^') {
            mode = Some(TextMatchMode::StartsWith);
        }

        let (matcher, default_mode) = match self.peek_char() {
            Some('"') => (self.parse_quoted()?, TextMatchMode::Contains),
            Some('/') => (self.parse_regex(1)?, TextMatchMode::Contains),
            _ if self.remaining().starts_with("re:/") => (self.parse_regex(4)?, TextMatchMode::Contains),
            _ => {
                let word = self.read_word();
                let (word, ends_with) = match word.strip_suffix('$') {
                    Some(stripped) if !stripped.is_empty() => (stripped, true),
                    _ => (word, false),
                };
                if ends_with {
                    mode = Some(TextMatchMode::EndsWith);
                }
                if word.is_empty() {
                    // A bare mode marker or field constrains nothing
                    (TextMatcher::Constant(true), TextMatchMode::Contains)
                } else if word.contains(['*', '?']) {
                    let matcher = TextMatcher::wildcard(word).map_err(|e| QueryError::InvalidRegex {
                        pattern: word.to_string(),
                        reason: e.to_string(),
                    })?;
                    (matcher, TextMatchMode::Equals)
                } else {
                    (TextMatcher::raw(word), TextMatchMode::Contains)
                }
            }
        };

        if self.consume_char('$') {
            mode = Some(TextMatchMode::EndsWith);
        }

        Ok(Matcher::text(target, mode.unwrap_or(default_mode), matcher))
    }

    fn parse_quoted(&mut self) -> Result<TextMatcher, QueryError> {
        let start = self.pos;
        self.consume_char('"');
        let mut text = String::new();

        loop {
            match self.peek_char() {
                None => return Err(QueryError::UnterminatedQuote(start)),
                Some('"') => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    self.advance();
                    match self.peek_char() {
                        Some(ch @ ('"' | '\\')) => {
                            text.push(ch);
                            self.advance();
                        }
                        _ => text.push('\\'),
                    }
                }
                Some(ch) => {
                    text.push(ch);
                    self.advance();
                }
            }
        }

        if text.is_empty() {
            Ok(TextMatcher::Constant(true))
        } else {
            Ok(TextMatcher::raw(text))
        }
    }

    /// Regex body after an opener of `opener_len` bytes, up to an unescaped `/`
    fn parse_regex(&mut self, opener_len: usize) -> Result<TextMatcher, QueryError> {
        let start = self.pos;
        self.pos += opener_len;
        let mut pattern = String::new();

        loop {
            match self.peek_char() {
                None => return Err(QueryError::UnterminatedRegex(start)),
                Some('/') => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    self.advance();
                    match self.peek_char() {
                        Some('/') => {
                            pattern.push('/');
                            self.advance();
                        }
                        Some(ch) => {
                            pattern.push('\\');
                            pattern.push(ch);
                            self.advance();
                        }
                        None => pattern.push('\\'),
                    }
                }
                Some(ch) => {
                    pattern.push(ch);
                    self.advance();
                }
            }
        }

        TextMatcher::regex(&pattern).map_err(|e| QueryError::InvalidRegex {
            pattern,
            reason: e.to_string(),
        })
    }

    /// Read until whitespace, a structural character or a terminator
    fn read_word(&mut self) -> &'a str {
        let start = self.pos;
        while let Some(ch) = self.peek_char() {
            if ch.is_whitespace() || ch == '|' || ch == '(' || ch == ')' || self.is_terminator(ch) {
                break;
            }
            self.advance();
        }
        &self.input[start..self.pos]
    }

    fn is_terminator(&self, ch: char) -> bool {
        self.depth == 0 && self.terminators.contains(&ch)
    }

    fn skip_whitespace(&mut self) {
        while self.peek_char().is_some_and(char::is_whitespace) {
            self.advance();
        }
    }

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn consume_char(&mut self, expected: char) -> bool {
        if self.peek_char() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn advance(&mut self) {
        if let Some(ch) = self.peek_char() {
            self.pos += ch.len_utf8();
        }
    }

    fn remaining(&self) -> &str {
        &self.input[self.pos..]
    }
}

fn all_of(mut nodes: Vec<Matcher>) -> Matcher {
    match nodes.len() {
        1 => nodes.swap_remove(0),
        _ => Matcher::All(nodes),
    }
}

/// `N`, `>N`, `>=N`, `<N`, `<=N`, `N..M`, `N..`, `..M` with optional k/m/g
fn parse_size(value: &str) -> Result<SizeMatcher, QueryError> {
    let invalid = || QueryError::InvalidSize(value.to_string());
    let number = |s: &str| parse_size_number(s).ok_or_else(invalid);

    if let Some(rest) = value.strip_prefix(">=") {
        Ok(SizeMatcher::at_least(number(rest)?))
    } else if let Some(rest) = value.strip_prefix("<=") {
        Ok(SizeMatcher::at_most(number(rest)?))
    } else if let Some(rest) = value.strip_prefix('>') {
        Ok(SizeMatcher::at_least(number(rest)?.checked_add(1).ok_or_else(invalid)?))
    } else if let Some(rest) = value.strip_prefix('<') {
        Ok(SizeMatcher::at_most(number(rest)?.checked_sub(1).ok_or_else(invalid)?))
    } else if let Some((lo, hi)) = value.split_once("..") {
        let min = if lo.is_empty() { i64::MIN } else { number(lo)? };
        let max = if hi.is_empty() { i64::MAX } else { number(hi)? };
        if lo.is_empty() && hi.is_empty() {
            return Err(invalid());
        }
        Ok(SizeMatcher::new(min, max))
    } else {
        let n = number(value)?;
        Ok(SizeMatcher::new(n, n))
    }
}

fn parse_size_number(s: &str) -> Option<i64> {
    let lower = s.to_ascii_lowercase();
    let (digits, multiplier) = match lower.as_bytes().last()? {
        b'k' => (&lower[..lower.len() - 1], 1i64 << 10),
        b'm' => (&lower[..lower.len() - 1], 1i64 << 20),
        b'g' => (&lower[..lower.len() - 1], 1i64 << 30),
        _ => (lower.as_str(), 1),
    };
    digits.parse::<i64>().ok()?.checked_mul(multiplier)
}

fn parse_hash(value: &str) -> Result<u32, QueryError> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => value.parse::<u32>().ok(),
    };
    parsed.ok_or_else(|| QueryError::InvalidHash(value.to_string()))
}
