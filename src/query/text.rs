use crate::error::Result;
use crate::search::Deadline;
use memchr::memmem;
use regex::{Regex, RegexBuilder};
use std::fmt;

/// How a pattern is placed against the haystack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextMatchMode {
    Contains,
    Equals,
    StartsWith,
    EndsWith,
}

impl TextMatchMode {
    pub const ALL: [TextMatchMode; 4] = [
        TextMatchMode::Contains,
        TextMatchMode::Equals,
        TextMatchMode::StartsWith,
        TextMatchMode::EndsWith,
    ];

    fn slot(self) -> usize {
        match self {
            TextMatchMode::Contains => 0,
            TextMatchMode::Equals => 1,
            TextMatchMode::StartsWith => 2,
            TextMatchMode::EndsWith => 3,
        }
    }

    /// Wrap an unanchored pattern with this mode's anchors
    fn anchor(self, pattern: &str) -> String {
        match self {
            TextMatchMode::Contains => format!("(?:{pattern})"),
            TextMatchMode::Equals => format!(r"\A(?:{pattern})\z"),
            TextMatchMode::StartsWith => format!(r"\A(?:{pattern})"),
            TextMatchMode::EndsWith => format!(r"(?:{pattern})\z"),
        }
    }
}

/// One pattern compiled once per mode
#[derive(Clone)]
pub struct CompiledPattern {
    source: String,
    modes: Box<[Regex; 4]>,
}

impl CompiledPattern {
    /// Compile `pattern` (already in regex syntax) for every mode,
    /// case-insensitive with `.` matching newlines
    fn new(source: String, pattern: &str) -> std::result::Result<Self, regex::Error> {
        let build = |mode: TextMatchMode| {
            RegexBuilder::new(&mode.anchor(pattern))
                .case_insensitive(true)
                .dot_matches_new_line(true)
                .build()
        };
        let modes = Box::new([
            build(TextMatchMode::Contains)?,
            build(TextMatchMode::Equals)?,
            build(TextMatchMode::StartsWith)?,
            build(TextMatchMode::EndsWith)?,
        ]);
        Ok(Self { source, modes })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn regex(&self, mode: TextMatchMode) -> &Regex {
        &self.modes[mode.slot()]
    }
}

impl fmt::Debug for CompiledPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CompiledPattern").field(&self.source).finish()
    }
}

impl PartialEq for CompiledPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for CompiledPattern {}

/// A pure string predicate. The same haystack and mode always give the same answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextMatcher {
    /// Same answer for every haystack and mode
    Constant(bool),
    /// Literal text, compared case-insensitively
    Raw { text: String, folded: String },
    /// `*`, `**` and `?` glob
    Wildcard(CompiledPattern),
    /// User-supplied regular expression
    Regex(CompiledPattern),
}

impl TextMatcher {
    pub fn raw(text: impl Into<String>) -> Self {
        let text = text.into();
        let folded = text.to_lowercase();
        TextMatcher::Raw { text, folded }
    }

    /// Compile a glob. `*` stops at `/`, `**` crosses it, `?` is one character.
    pub fn wildcard(glob: &str) -> std::result::Result<Self, regex::Error> {
        let pattern = wildcard_to_regex(glob);
        Ok(TextMatcher::Wildcard(CompiledPattern::new(glob.to_string(), &pattern)?))
    }

    /// Compile a regular expression verbatim
    pub fn regex(pattern: &str) -> std::result::Result<Self, regex::Error> {
        Ok(TextMatcher::Regex(CompiledPattern::new(pattern.to_string(), pattern)?))
    }

    /// True for matchers that ignore the haystack
    pub fn is_constant(&self) -> bool {
        matches!(self, TextMatcher::Constant(_))
    }

    /// Test `haystack` against this matcher.
    ///
    /// Non-constant matchers fail with `Timeout` if the deadline has passed
    /// before the match starts or by the time it finishes.
    pub fn is_match(&self, haystack: &str, mode: TextMatchMode, deadline: &Deadline) -> Result<bool> {
        match self {
            TextMatcher::Constant(value) => Ok(*value),
            TextMatcher::Raw { folded, .. } => {
                deadline.check()?;
                Ok(raw_match(&haystack.to_lowercase(), folded, mode))
            }
            TextMatcher::Wildcard(compiled) | TextMatcher::Regex(compiled) => {
                deadline.check()?;
                let matched = compiled.regex(mode).is_match(haystack);
                deadline.check()?;
                Ok(matched)
            }
        }
    }
}

fn raw_match(haystack: &str, needle: &str, mode: TextMatchMode) -> bool {
    match mode {
        TextMatchMode::Contains => memmem::find(haystack.as_bytes(), needle.as_bytes()).is_some(),
        TextMatchMode::Equals => haystack == needle,
        TextMatchMode::StartsWith => haystack.starts_with(needle),
        TextMatchMode::EndsWith => haystack.ends_with(needle),
    }
}

/// Translate a glob into regex syntax, escaping every literal run
pub fn wildcard_to_regex(glob: &str) -> String {
    let mut out = String::with_capacity(glob.len() * 2);
    let mut literal = String::new();
    let mut chars = glob.chars().peekable();

    let flush = |literal: &mut String, out: &mut String| {
        if !literal.is_empty() {
            out.push_str(&regex::escape(literal));
            literal.clear();
        }
    };

    while let Some(ch) = chars.next() {
        match ch {
            '*' => {
                flush(&mut literal, &mut out);
                if chars.peek() == Some(&'*') {
                    chars.next();
                    out.push_str(".*");
                } else {
                    out.push_str("[^/]*");
                }
            }
            '?' => {
                flush(&mut literal, &mut out);
                out.push('.');
            }
            _ => literal.push(ch),
        }
    }
    flush(&mut literal, &mut out);
    out
}

impl fmt::Display for TextMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextMatcher::Constant(true) => write!(f, "\"\""),
            TextMatcher::Constant(false) => write!(f, "<never>"),
            TextMatcher::Raw { text, .. } => {
                let needs_quotes = text.is_empty()
                    || text.starts_with(['/', '=', '^', '-', '!'])
                    || text.ends_with('$')
                    || text.contains(|c: char| c.is_whitespace() || "|()\":*?".contains(c));
                if needs_quotes {
                    write!(f, "\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
                } else {
                    write!(f, "{text}")
                }
            }
            TextMatcher::Wildcard(compiled) => write!(f, "{}", compiled.source()),
            TextMatcher::Regex(compiled) => write!(f, "/{}/", compiled.source().replace('/', "\\/")),
        }
    }
}
