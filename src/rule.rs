use std::fmt;

use crate::category::{Category, NonTerminal};

/// A production rule `LHS → RHS` with a probability, immutable once built.
///
/// The probability is stored twice: as given, and encoded under the
/// grammar's [`crate::Semiring`] so the parser never re-encodes per use.
/// Rules are created by [`crate::GrammarBuilder`], which validates them.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    lhs: NonTerminal,
    rhs: Vec<Category>,
    probability: f64,
    score: f64,
    is_error_rule: bool,
}

impl Rule {
    pub(crate) fn new(probability: f64, score: f64, lhs: NonTerminal, rhs: Vec<Category>) -> Self {
        let is_error_rule = rhs.iter().any(|category| match category {
            Category::Nonterminal(nonterminal) => nonterminal.is_non_lexical(),
            Category::Terminal(_) => false,
        });
        Self {
            lhs,
            rhs,
            probability,
            score,
            is_error_rule,
        }
    }

    pub fn lhs(&self) -> &NonTerminal {
        &self.lhs
    }

    pub fn rhs(&self) -> &[Category] {
        &self.rhs
    }

    /// The rule probability as originally given.
    pub fn probability(&self) -> f64 {
        self.probability
    }

    /// The rule probability encoded under the grammar's semiring.
    pub fn score(&self) -> f64 {
        self.score
    }

    /// Whether this rule has the form `X → Y` for non-terminals X, Y.
    pub fn is_unit_production(&self) -> bool {
        self.rhs.len() == 1 && self.rhs[0].is_nonterminal()
    }

    /// Whether any right-hand-side symbol is the non-lexical marker,
    /// making this an error-recovery rule.
    pub fn is_error_rule(&self) -> bool {
        self.is_error_rule
    }

    /// The category right of the dot, or `None` when the dot is at the end.
    ///
    /// # Panics
    ///
    /// Panics if `dot` lies outside `0..=rhs.len()`; dots are produced by
    /// the parser and an out-of-range one is a bug.
    pub fn category_at(&self, dot: usize) -> Option<&Category> {
        assert!(dot <= self.rhs.len(), "dot position {dot} out of range for {self}");
        self.rhs.get(dot)
    }

    /// Whether an item over this rule with the given dot is passive.
    pub fn is_passive(&self, dot: usize) -> bool {
        assert!(dot <= self.rhs.len(), "dot position {dot} out of range for {self}");
        dot == self.rhs.len()
    }

    /// Renders the dotted form, e.g. `S → NP · VP`.
    pub fn dotted(&self, dot: usize) -> String {
        assert!(dot <= self.rhs.len(), "dot position {dot} out of range for {self}");
        let mut out = format!("{} →", self.lhs);
        for (at, category) in self.rhs.iter().enumerate() {
            if at == dot {
                out.push_str(" ·");
            }
            out.push(' ');
            out.push_str(&category.to_string());
        }
        if dot == self.rhs.len() {
            out.push_str(" ·");
        }
        out
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} →", self.lhs)?;
        for category in &self.rhs {
            write!(f, " {category}")?;
        }
        write!(f, " ({:.2})", self.probability)
    }
}
