use crate::error::Result;
use crate::query::text::{TextMatchMode, TextMatcher};
use crate::search::Deadline;
use std::fmt;

/// What a text term looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextTarget {
    /// The entry's own name
    Name,
    /// The full virtual path
    Path,
    /// The decoded text projection of a file
    Content,
}

impl TextTarget {
    fn prefix(self) -> &'static str {
        match self {
            TextTarget::Name => "",
            TextTarget::Path => "path:",
            TextTarget::Content => "content:",
        }
    }
}

/// Inclusive signed size range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SizeMatcher {
    pub min: i64,
    pub max: i64,
}

impl SizeMatcher {
    pub const ANY: SizeMatcher = SizeMatcher {
        min: i64::MIN,
        max: i64::MAX,
    };

    pub fn new(min: i64, max: i64) -> Self {
        Self { min, max }
    }

    pub fn at_least(min: i64) -> Self {
        Self { min, max: i64::MAX }
    }

    pub fn at_most(max: i64) -> Self {
        Self { min: i64::MIN, max }
    }

    pub fn matches(&self, value: i64) -> bool {
        self.min <= value && value <= self.max
    }

    pub fn is_unrestricted(&self) -> bool {
        self.min == i64::MIN && self.max == i64::MAX
    }
}

impl fmt::Display for SizeMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.min, self.max) {
            (i64::MIN, i64::MAX) => write!(f, "any"),
            (i64::MIN, max) => write!(f, "(-∞, {max}]"),
            (min, i64::MAX) => write!(f, "[{min}, ∞)"),
            (min, max) => write!(f, "[{min}, {max}]"),
        }
    }
}

/// A text predicate bound to its target and placement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextTerm {
    pub target: TextTarget,
    pub mode: TextMatchMode,
    pub matcher: TextMatcher,
}

impl TextTerm {
    pub fn new(target: TextTarget, mode: TextMatchMode, matcher: TextMatcher) -> Self {
        Self { target, mode, matcher }
    }

    fn needs_content(&self) -> bool {
        self.target == TextTarget::Content && !self.matcher.is_constant()
    }
}

/// What a matcher can see of an entry without opening it
#[derive(Debug, Clone, Copy)]
pub struct EntryFacts<'a> {
    pub name: &'a str,
    pub path: &'a str,
    pub hash: u32,
    /// `None` for folders
    pub size: Option<u64>,
}

impl<'a> EntryFacts<'a> {
    pub fn folder(name: &'a str, path: &'a str, hash: u32) -> Self {
        Self {
            name,
            path,
            hash,
            size: None,
        }
    }

    pub fn file(name: &'a str, path: &'a str, hash: u32, size: u64) -> Self {
        Self {
            name,
            path,
            hash,
            size: Some(size),
        }
    }

    pub fn is_folder(&self) -> bool {
        self.size.is_none()
    }
}

/// Predicate tree built from a query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Matcher {
    /// Every child must match; empty matches everything
    All(Vec<Matcher>),
    /// At least one child must match; empty matches nothing
    Any(Vec<Matcher>),
    Negating(Box<Matcher>),
    /// Full path hash equals
    Hash(u32),
    Size(SizeMatcher),
    Text(TextTerm),
}

impl Matcher {
    /// The matcher that accepts every entry
    pub fn always() -> Self {
        Matcher::All(Vec::new())
    }

    pub fn negate(inner: Matcher) -> Self {
        Matcher::Negating(Box::new(inner))
    }

    pub fn text(target: TextTarget, mode: TextMatchMode, matcher: TextMatcher) -> Self {
        Matcher::Text(TextTerm::new(target, mode, matcher))
    }

    /// Collapse every double negation in the tree
    pub fn unwrap_if_possible(self) -> Matcher {
        match self {
            Matcher::Negating(inner) => match *inner {
                Matcher::Negating(inner) => inner.unwrap_if_possible(),
                other => Matcher::negate(other.unwrap_if_possible()),
            },
            Matcher::All(children) => {
                Matcher::All(children.into_iter().map(Matcher::unwrap_if_possible).collect())
            }
            Matcher::Any(children) => {
                Matcher::Any(children.into_iter().map(Matcher::unwrap_if_possible).collect())
            }
            other => other,
        }
    }

    /// Whether any branch looks at decoded content
    pub fn requires_content(&self) -> bool {
        match self {
            Matcher::All(children) | Matcher::Any(children) => {
                children.iter().any(Matcher::requires_content)
            }
            Matcher::Negating(inner) => inner.requires_content(),
            Matcher::Text(term) => term.needs_content(),
            Matcher::Hash(_) | Matcher::Size(_) => false,
        }
    }

    /// Evaluate without content.
    ///
    /// `None` means the answer depends on content that has not been read.
    /// Folders have no content, so for them the result is always decided.
    pub fn evaluate_metadata(&self, facts: &EntryFacts<'_>, deadline: &Deadline) -> Result<Option<bool>> {
        match self {
            Matcher::All(children) => {
                let mut undecided = false;
                for child in children {
                    match child.evaluate_metadata(facts, deadline)? {
                        Some(false) => return Ok(Some(false)),
                        Some(true) => {}
                        None => undecided = true,
                    }
                }
                Ok(if undecided { None } else { Some(true) })
            }
            Matcher::Any(children) => {
                let mut undecided = false;
                for child in children {
                    match child.evaluate_metadata(facts, deadline)? {
                        Some(true) => return Ok(Some(true)),
                        Some(false) => {}
                        None => undecided = true,
                    }
                }
                Ok(if undecided { None } else { Some(false) })
            }
            Matcher::Negating(inner) => Ok(inner.evaluate_metadata(facts, deadline)?.map(|v| !v)),
            Matcher::Hash(expected) => Ok(Some(facts.hash == *expected)),
            Matcher::Size(range) => Ok(Some(
                facts
                    .size
                    .and_then(|s| i64::try_from(s).ok())
                    .is_some_and(|s| range.matches(s)),
            )),
            Matcher::Text(term) => match term.target {
                TextTarget::Name => term.matcher.is_match(facts.name, term.mode, deadline).map(Some),
                TextTarget::Path => term.matcher.is_match(facts.path, term.mode, deadline).map(Some),
                TextTarget::Content => match &term.matcher {
                    TextMatcher::Constant(value) => Ok(Some(*value)),
                    _ if facts.is_folder() => Ok(Some(false)),
                    _ => Ok(None),
                },
            },
        }
    }

    /// Evaluate with the decoded text of a file at hand
    pub fn evaluate_with_content(&self, facts: &EntryFacts<'_>, content: &str, deadline: &Deadline) -> Result<bool> {
        match self {
            Matcher::All(children) => {
                for child in children {
                    if !child.evaluate_with_content(facts, content, deadline)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Matcher::Any(children) => {
                for child in children {
                    if child.evaluate_with_content(facts, content, deadline)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Matcher::Negating(inner) => Ok(!inner.evaluate_with_content(facts, content, deadline)?),
            Matcher::Text(term) if term.target == TextTarget::Content => {
                term.matcher.is_match(content, term.mode, deadline)
            }
            other => Ok(other.evaluate_metadata(facts, deadline)?.unwrap_or(false)),
        }
    }

    /// Structural evaluation of a folder
    pub fn evaluate_folder(&self, facts: &EntryFacts<'_>, deadline: &Deadline) -> Result<bool> {
        Ok(self.evaluate_metadata(facts, deadline)?.unwrap_or(false))
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Matcher::All(children) if children.is_empty() => write!(f, "*any*"),
            Matcher::Any(children) if children.is_empty() => write!(f, "*none*"),
            Matcher::All(children) => write_joined(f, children, " "),
            Matcher::Any(children) => write_joined(f, children, " | "),
            Matcher::Negating(inner) => write!(f, "-{inner}"),
            Matcher::Hash(hash) => write!(f, "hash:0x{hash:08x}"),
            Matcher::Size(range) => write!(f, "size:{range}"),
            Matcher::Text(term) => {
                write!(f, "{}", term.target.prefix())?;
                match term.mode {
                    TextMatchMode::Contains => write!(f, "{}", term.matcher),
                    TextMatchMode::Equals => write!(f, "={}", term.matcher),
                    TextMatchMode::StartsWith => write!(f, "^{}", term.matcher),
                    TextMatchMode::EndsWith => write!(f, "{}$", term.matcher),
                }
            }
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, children: &[Matcher], sep: &str) -> fmt::Result {
    if children.len() == 1 {
        return write!(f, "{}", children[0]);
    }
    write!(f, "(")?;
    for (i, child) in children.iter().enumerate() {
        if i > 0 {
            write!(f, "{sep}")?;
        }
        write!(f, "{child}")?;
    }
    write!(f, ")")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VfsError;
    use std::time::Duration;

    fn name(text: &str) -> Matcher {
        Matcher::text(TextTarget::Name, TextMatchMode::Contains, TextMatcher::raw(text))
    }

    fn content(text: &str) -> Matcher {
        Matcher::text(TextTarget::Content, TextMatchMode::Contains, TextMatcher::raw(text))
    }

    fn file_facts() -> EntryFacts<'static> {
        EntryFacts::file("b0001.mdl", "chara/body/b0001.mdl", 0x1234, 150)
    }

    #[test]
    fn test_double_negation_unwraps() {
        let inner = name("body");
        let wrapped = Matcher::negate(Matcher::negate(inner.clone()));
        assert_eq!(wrapped.unwrap_if_possible(), inner);

        let triple = Matcher::negate(Matcher::negate(Matcher::negate(inner.clone())));
        assert_eq!(triple.unwrap_if_possible(), Matcher::negate(inner));
    }

    #[test]
    fn test_unwrap_reaches_nested_branches() {
        let tree = Matcher::All(vec![
            Matcher::negate(Matcher::negate(Matcher::Hash(7))),
            Matcher::Any(vec![Matcher::negate(Matcher::negate(name("a")))]),
        ]);
        assert_eq!(
            tree.unwrap_if_possible(),
            Matcher::All(vec![Matcher::Hash(7), Matcher::Any(vec![name("a")])])
        );
    }

    #[test]
    fn test_size_bounds_inclusive() {
        let range = SizeMatcher::new(100, 200);
        assert!(range.matches(100));
        assert!(range.matches(200));
        assert!(!range.matches(99));
        assert!(!range.matches(201));
    }

    #[test]
    fn test_size_display() {
        assert_eq!(SizeMatcher::ANY.to_string(), "any");
        assert_eq!(SizeMatcher::new(1, 2).to_string(), "[1, 2]");
        assert_eq!(SizeMatcher::at_least(5).to_string(), "[5, ∞)");
        assert_eq!(SizeMatcher::at_most(5).to_string(), "(-∞, 5]");
    }

    #[test]
    fn test_metadata_short_circuits() {
        let deadline = Deadline::unbounded();
        let facts = file_facts();

        // A failing name term decides an All without content
        let m = Matcher::All(vec![name("tex"), content("vertex")]);
        assert_eq!(m.evaluate_metadata(&facts, &deadline).unwrap(), Some(false));

        // A passing name term decides an Any without content
        let m = Matcher::Any(vec![name("b0001"), content("vertex")]);
        assert_eq!(m.evaluate_metadata(&facts, &deadline).unwrap(), Some(true));

        let m = Matcher::All(vec![name("b0001"), content("vertex")]);
        assert_eq!(m.evaluate_metadata(&facts, &deadline).unwrap(), None);
        assert!(m.requires_content());
        assert!(m.evaluate_with_content(&facts, "vertex data", &deadline).unwrap());
        assert!(!m.evaluate_with_content(&facts, "nothing", &deadline).unwrap());
    }

    #[test]
    fn test_negated_content() {
        let deadline = Deadline::unbounded();
        let m = Matcher::negate(content("secret"));
        assert_eq!(m.evaluate_metadata(&file_facts(), &deadline).unwrap(), None);
        assert!(m.evaluate_with_content(&file_facts(), "public", &deadline).unwrap());
        assert!(!m.evaluate_with_content(&file_facts(), "top secret", &deadline).unwrap());
    }

    #[test]
    fn test_folder_evaluation_is_structural() {
        let deadline = Deadline::unbounded();
        let folder = EntryFacts::folder("body", "chara/body", 9);
        assert!(name("bod").evaluate_folder(&folder, &deadline).unwrap());
        assert!(!content("x").evaluate_folder(&folder, &deadline).unwrap());
        assert!(!Matcher::Size(SizeMatcher::ANY).evaluate_folder(&folder, &deadline).unwrap());
        assert!(Matcher::Hash(9).evaluate_folder(&folder, &deadline).unwrap());
    }

    #[test]
    fn test_path_and_hash_terms() {
        let deadline = Deadline::unbounded();
        let facts = file_facts();
        let path = Matcher::text(TextTarget::Path, TextMatchMode::StartsWith, TextMatcher::raw("chara/"));
        assert_eq!(path.evaluate_metadata(&facts, &deadline).unwrap(), Some(true));
        assert_eq!(Matcher::Hash(0x1234).evaluate_metadata(&facts, &deadline).unwrap(), Some(true));
        assert_eq!(Matcher::Hash(1).evaluate_metadata(&facts, &deadline).unwrap(), Some(false));
    }

    #[test]
    fn test_constant_content_needs_no_content() {
        let m = Matcher::text(TextTarget::Content, TextMatchMode::Contains, TextMatcher::Constant(true));
        assert!(!m.requires_content());
        assert_eq!(m.evaluate_metadata(&file_facts(), &Deadline::unbounded()).unwrap(), Some(true));
    }

    #[test]
    fn test_timeout_propagates() {
        let deadline = Deadline::start(Some(Duration::ZERO));
        let err = name("x").evaluate_metadata(&file_facts(), &deadline).unwrap_err();
        assert!(matches!(err, VfsError::Timeout { .. }));
    }

    #[test]
    fn test_display() {
        let m = Matcher::All(vec![
            name("body"),
            Matcher::negate(Matcher::Size(SizeMatcher::at_least(1024))),
            Matcher::Any(vec![Matcher::Hash(0xAB), content("vertex")]),
        ]);
        assert_eq!(
            m.to_string(),
            "(body -size:[1024, ∞) (hash:0x000000ab | content:vertex))"
        );
        assert_eq!(Matcher::always().to_string(), "*any*");
    }
}
