pub mod matcher;
pub mod parser;
pub mod text;

pub use matcher::{EntryFacts, Matcher, SizeMatcher, TextTarget, TextTerm};
pub use parser::{parse_matcher, parse_query, ParsedQuery, QueryError};
pub use text::{TextMatchMode, TextMatcher};
