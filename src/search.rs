//! Substring search across the four searchable text fields of an oficio.
//!
//! The same [`SearchFilter`] renders the SQL `LIKE` pattern used by the
//! repository and evaluates records in process, so both agree on which
//! records match. Matching is case-sensitive; the SQLite connection runs
//! with `case_sensitive_like` enabled.

/// Escape character used in rendered `LIKE` patterns.
pub const LIKE_ESCAPE: char = '\\';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchMode {
    /// The query is a plain substring; `%` and `_` match themselves.
    #[default]
    Literal,
    /// `%` and `_` in the query act as wildcards. Only the escape character
    /// itself is escaped.
    Pattern,
}

/// Borrowed view of the fields a search looks at.
#[derive(Debug, Clone, Copy)]
pub struct SearchFields<'a> {
    pub asunto: &'a str,
    pub remitente: &'a str,
    pub destinatario: &'a str,
    pub numero_oficio: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchFilter {
    query: String,
    mode: SearchMode,
}

impl SearchFilter {
    pub fn new(query: impl Into<String>, mode: SearchMode) -> Self {
        Self {
            query: query.into(),
            mode,
        }
    }

    pub fn literal(query: impl Into<String>) -> Self {
        Self::new(query, SearchMode::Literal)
    }

    /// Filter that matches every record.
    pub fn none() -> Self {
        Self::literal("")
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn mode(&self) -> SearchMode {
        self.mode
    }

    pub fn is_empty(&self) -> bool {
        self.query.is_empty()
    }

    /// `LIKE` pattern for the query, to be used with [`LIKE_ESCAPE`].
    /// `None` when the filter is empty and should not constrain the query.
    pub fn like_pattern(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        let inner = match self.mode {
            SearchMode::Literal => escape_like(&self.query),
            SearchMode::Pattern => self.query.replace(LIKE_ESCAPE, "\\\\"),
        };
        Some(format!("%{inner}%"))
    }

    pub fn matches(&self, fields: &SearchFields<'_>) -> bool {
        let Some(pattern) = self.like_pattern() else {
            return true;
        };
        let pattern: Vec<char> = pattern.chars().collect();
        let candidates = [
            Some(fields.asunto),
            Some(fields.remitente),
            Some(fields.destinatario),
            fields.numero_oficio,
        ];
        candidates
            .into_iter()
            .flatten()
            .any(|value| like_matches(&pattern, value))
    }
}

fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if ch == '%' || ch == '_' || ch == LIKE_ESCAPE {
            escaped.push(LIKE_ESCAPE);
        }
        escaped.push(ch);
    }
    escaped
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    AnySequence,
    AnyChar,
    Literal(char),
}

fn tokenize(pattern: &[char]) -> Vec<Token> {
    let mut tokens = Vec::with_capacity(pattern.len());
    let mut iter = pattern.iter().copied();
    while let Some(ch) = iter.next() {
        let token = match ch {
            LIKE_ESCAPE => match iter.next() {
                Some(next) => Token::Literal(next),
                None => Token::Literal(LIKE_ESCAPE),
            },
            '%' => Token::AnySequence,
            '_' => Token::AnyChar,
            other => Token::Literal(other),
        };
        tokens.push(token);
    }
    tokens
}

/// Case-sensitive `LIKE ... ESCAPE '\'` evaluation.
fn like_matches(pattern: &[char], value: &str) -> bool {
    let tokens = tokenize(pattern);
    let text: Vec<char> = value.chars().collect();

    // matched[j]: tokens[..i] match text[..j]
    let mut matched = vec![false; text.len() + 1];
    matched[0] = true;
    for token in &tokens {
        let mut next = vec![false; text.len() + 1];
        match token {
            Token::AnySequence => {
                let mut reachable = false;
                for j in 0..=text.len() {
                    reachable |= matched[j];
                    next[j] = reachable;
                }
            }
            Token::AnyChar => {
                for j in 1..=text.len() {
                    next[j] = matched[j - 1];
                }
            }
            Token::Literal(expected) => {
                for j in 1..=text.len() {
                    next[j] = matched[j - 1] && text[j - 1] == *expected;
                }
            }
        }
        matched = next;
    }
    matched[text.len()]
}
