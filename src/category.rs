use std::fmt;

#[cfg(feature = "serde")]
use serde::{Serialize, Serializer};

/// Reserved name of the non-lexical marker; see [`NonTerminal::non_lexical`].
const NON_LEXICAL_NAME: &str = "<non-lexical>";

/// A non-terminal grammar category. Two non-terminals are the same category
/// iff they carry the same name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct NonTerminal {
    name: String,
}

impl NonTerminal {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// The distinguished marker non-terminal. A rule that mentions it on its
    /// right-hand side is an error-recovery rule: the marker stands in for
    /// input the lexicon cannot account for.
    pub fn non_lexical() -> Self {
        Self::new(NON_LEXICAL_NAME)
    }

    pub fn is_non_lexical(&self) -> bool {
        self.name == NON_LEXICAL_NAME
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for NonTerminal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// How a [`Terminal`] decides whether an input token belongs to it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TokenMatcher {
    /// The token text equals the given text.
    Exact(String),
    /// Arbitrary predicate over the token text. Two predicate terminals are
    /// the same category only when they share the same function.
    Predicate(fn(&str) -> bool),
    /// Matches no token at all: a terminal with this matcher derives the
    /// empty string, and the parser steps over it without consuming input.
    Empty,
}

/// A terminal grammar category: a named class of input tokens.
///
/// Identity is the pair (name, matcher); for [`TokenMatcher::Predicate`]
/// the matcher compares by function identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Terminal {
    name: String,
    matcher: TokenMatcher,
}

impl Terminal {
    pub fn new(name: impl Into<String>, matcher: TokenMatcher) -> Self {
        Self {
            name: name.into(),
            matcher,
        }
    }

    /// A terminal matching exactly the given token text, named after it.
    pub fn exact(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            name: text.clone(),
            matcher: TokenMatcher::Exact(text),
        }
    }

    /// A named terminal matching by predicate.
    pub fn predicate(name: impl Into<String>, predicate: fn(&str) -> bool) -> Self {
        Self::new(name, TokenMatcher::Predicate(predicate))
    }

    /// The empty terminal: derives nothing and matches no token.
    pub fn empty() -> Self {
        Self::new("ε", TokenMatcher::Empty)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn matcher(&self) -> &TokenMatcher {
        &self.matcher
    }

    /// Whether this terminal accepts the given input token.
    pub fn matches(&self, token: &str) -> bool {
        match &self.matcher {
            TokenMatcher::Exact(text) => text == token,
            TokenMatcher::Predicate(predicate) => predicate(token),
            TokenMatcher::Empty => false,
        }
    }

    /// Whether this terminal derives the empty string.
    pub fn is_empty(&self) -> bool {
        self.matcher == TokenMatcher::Empty
    }
}

impl fmt::Display for Terminal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}'", self.name)
    }
}

#[cfg(feature = "serde")]
impl Serialize for Terminal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // Predicates cannot round-trip; a terminal serializes as its name.
        serializer.serialize_str(&self.name)
    }
}

/// A grammar symbol: either a [`NonTerminal`] or a [`Terminal`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum Category {
    Nonterminal(NonTerminal),
    Terminal(Terminal),
}

impl Category {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Category::Terminal(_))
    }

    pub fn is_nonterminal(&self) -> bool {
        matches!(self, Category::Nonterminal(_))
    }
}

impl From<NonTerminal> for Category {
    fn from(nonterminal: NonTerminal) -> Self {
        Category::Nonterminal(nonterminal)
    }
}

impl From<Terminal> for Category {
    fn from(terminal: Terminal) -> Self {
        Category::Terminal(terminal)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Nonterminal(nonterminal) => nonterminal.fmt(f),
            Category::Terminal(terminal) => terminal.fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonterminal_equality_is_by_name() {
        assert_eq!(NonTerminal::new("NP"), NonTerminal::new("NP"));
        assert_ne!(NonTerminal::new("NP"), NonTerminal::new("VP"));
    }

    #[test]
    fn exact_terminal_matches_its_text_only() {
        let saw = Terminal::exact("saw");
        assert!(saw.matches("saw"));
        assert!(!saw.matches("duck"));
    }

    #[test]
    fn predicate_terminal_equality_is_by_function_identity() {
        fn digits(token: &str) -> bool {
            token.chars().all(|c| c.is_ascii_digit())
        }
        fn letters(token: &str) -> bool {
            token.chars().all(|c| c.is_alphabetic())
        }
        let a = Terminal::predicate("number", digits);
        let b = Terminal::predicate("number", digits);
        let c = Terminal::predicate("number", letters);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.matches("42"));
        assert!(!a.matches("x7!"));
    }

    #[test]
    fn empty_terminal_matches_nothing() {
        let empty = Terminal::empty();
        assert!(empty.is_empty());
        assert!(!empty.matches(""));
        assert!(!empty.matches("a"));
    }

    #[test]
    fn non_lexical_marker() {
        assert!(NonTerminal::non_lexical().is_non_lexical());
        assert!(!NonTerminal::new("NP").is_non_lexical());
    }

    #[test]
    fn display() {
        assert_eq!(NonTerminal::new("NP").to_string(), "NP");
        assert_eq!(Terminal::exact("saw").to_string(), "'saw'");
        assert_eq!(Category::from(NonTerminal::new("S")).to_string(), "S");
    }
}
