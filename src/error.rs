use std::error;
use std::fmt;

/// Everything that can go wrong building a grammar or parsing input.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// A rule is structurally invalid: empty right-hand side, or a
    /// probability outside `[0, 1]` (or not a number at all).
    IllegalGrammar(String),
    /// The unit-production (or left-corner) cycle mass is not
    /// sub-stochastic, so the closure sum diverges under the chosen
    /// semiring and no finite scores exist.
    GrammarNotConvergent(String),
    /// Scanning could not advance any state past the given input position.
    UnexpectedToken {
        /// Zero-based index of the offending token.
        position: usize,
        /// The token text.
        token: String,
        /// Names of the terminals that had active states at this position.
        expected: Vec<String>,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::IllegalGrammar(reason) => write!(f, "illegal grammar: {reason}"),
            Error::GrammarNotConvergent(reason) => {
                write!(f, "grammar does not converge: {reason}")
            }
            Error::UnexpectedToken {
                position,
                token,
                expected,
            } => {
                write!(f, "unexpected token '{token}' at position {position}")?;
                if !expected.is_empty() {
                    write!(f, ", expected one of: {}", expected.join(", "))?;
                }
                Ok(())
            }
        }
    }
}

impl error::Error for Error {}
