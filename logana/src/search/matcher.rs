use memchr::memmem::Finder;
use regex::bytes::Regex;
use std::borrow::Cow;

use crate::config::{LogicMode, SearchOptions};
use crate::errors::{SearchError, SearchResult};

/// How a single query term is tested against a line
#[derive(Debug, Clone)]
pub enum TermMatcher {
    /// Case-sensitive substring
    Literal(Finder<'static>),
    /// Substring of the lower-cased line; the needle is stored lower-cased
    FoldedLiteral(Finder<'static>),
    /// Unanchored regular expression, case folding baked in
    Regex(Regex),
}

impl TermMatcher {
    fn compile(term: &str, is_regex: bool, ignore_case: bool) -> SearchResult<Self> {
        if is_regex {
            let pattern = if ignore_case {
                format!("(?i){}", term)
            } else {
                term.to_string()
            };
            Regex::new(&pattern)
                .map(Self::Regex)
                .map_err(|e| SearchError::invalid_pattern(term, e))
        } else if ignore_case {
            let needle = term.to_lowercase();
            Ok(Self::FoldedLiteral(Finder::new(needle.as_bytes()).into_owned()))
        } else {
            Ok(Self::Literal(Finder::new(term.as_bytes()).into_owned()))
        }
    }
}

/// Compiled form of a query, shared read-only by every chunk task of a scan
#[derive(Debug, Clone)]
pub struct QueryMatcher {
    terms: Vec<TermMatcher>,
    logic: LogicMode,
    invert: bool,
}

impl QueryMatcher {
    /// Compiles every term of the query; the first bad regex aborts
    pub fn from_options(options: &SearchOptions) -> SearchResult<Self> {
        let terms = options
            .terms()
            .into_iter()
            .map(|term| TermMatcher::compile(term, options.is_regex, options.ignore_case))
            .collect::<SearchResult<Vec<_>>>()?;

        Ok(Self {
            terms,
            logic: options.logic,
            invert: options.invert,
        })
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Final verdict for one line, inversion applied
    pub fn is_match(&self, line: &[u8]) -> bool {
        self.combined(line) != self.invert
    }

    fn combined(&self, line: &[u8]) -> bool {
        // Lower-cased at most once per line, and only if a folded term needs it
        let mut folded: Option<Cow<'_, [u8]>> = None;
        let mut term_matches = |term: &TermMatcher| match term {
            TermMatcher::Literal(finder) => finder.find(line).is_some(),
            TermMatcher::FoldedLiteral(finder) => {
                let haystack = folded.get_or_insert_with(|| fold_case(line));
                finder.find(&haystack[..]).is_some()
            }
            TermMatcher::Regex(regex) => regex.is_match(line),
        };

        match self.logic {
            LogicMode::Or => self.terms.iter().any(&mut term_matches),
            LogicMode::And => self.terms.iter().all(&mut term_matches),
        }
    }
}

fn fold_case(line: &[u8]) -> Cow<'_, [u8]> {
    if line.is_ascii() {
        if line.iter().any(u8::is_ascii_uppercase) {
            Cow::Owned(line.to_ascii_lowercase())
        } else {
            Cow::Borrowed(line)
        }
    } else {
        Cow::Owned(String::from_utf8_lossy(line).to_lowercase().into_bytes())
    }
}
