use std::collections::HashMap;

use crate::arena::{arena_id, Arena};
use crate::category::{Category, NonTerminal, Terminal};
use crate::closure::{star_closure, ClosureMatrix, Divergence};
use crate::error::Error;
use crate::rule::Rule;
use crate::semiring::Semiring;
use crate::tracing;

arena_id!(pub(crate) NonTerminalId);
arena_id!(pub(crate) TerminalId);
arena_id!(pub(crate) RuleId);

/// A right-hand-side symbol after interning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Symbol {
    Nonterminal(NonTerminalId),
    Terminal(TerminalId),
}

/// An immutable probabilistic context-free grammar, ready for parsing.
///
/// Built via [`Grammar::builder`]. Building interns every category into a
/// dense id, indexes rules by left-hand side, and precomputes the
/// left-corner closure R_L* and the unit-production closure R_U*, so a
/// grammar is safe to share across threads and parses once built.
#[derive(Debug, Clone)]
pub struct Grammar {
    semiring: Semiring,
    rules: Arena<Rule, RuleId>,
    nonterminals: Arena<NonTerminal, NonTerminalId>,
    terminals: Arena<Terminal, TerminalId>,
    nonterminal_ids: HashMap<NonTerminal, NonTerminalId>,
    rule_lhs: Vec<NonTerminalId>,
    rule_rhs: Vec<Vec<Symbol>>,
    rules_by_lhs: HashMap<NonTerminalId, Vec<RuleId>>,
    left_star: ClosureMatrix,
    unit_star: ClosureMatrix,
    /// For each non-terminal B: every rule C → δ with R_L*(B, C) > 0̄,
    /// paired with R_L*(B, C) ⊗ p(C → δ). This is exactly what predict
    /// emits for a state active on B.
    predictions: Vec<Vec<(RuleId, f64)>>,
    /// For each non-terminal Z: the non-terminals Y with R_U*(Z, Y) > 0̄.
    unit_star_targets: Vec<Vec<NonTerminalId>>,
}

impl Grammar {
    pub fn builder() -> GrammarBuilder {
        GrammarBuilder::new()
    }

    pub fn semiring(&self) -> Semiring {
        self.semiring
    }

    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    /// The rules with the given non-terminal on their left-hand side.
    pub fn rules_for(&self, lhs: &NonTerminal) -> impl Iterator<Item = &Rule> {
        self.nonterminal_id(lhs)
            .and_then(|id| self.rules_by_lhs.get(&id))
            .into_iter()
            .flatten()
            .map(|&id| self.rule(id))
    }

    /// R_L*(x, y) under the grammar's semiring; 0̄ for unknown symbols.
    pub fn left_star_score(&self, x: &NonTerminal, y: &NonTerminal) -> f64 {
        match (self.nonterminal_id(x), self.nonterminal_id(y)) {
            (Some(x), Some(y)) => self.left_star.score(x.into(), y.into()),
            _ => self.semiring.zero(),
        }
    }

    /// R_U*(x, y) under the grammar's semiring; 0̄ for unknown symbols.
    pub fn unit_star_score(&self, x: &NonTerminal, y: &NonTerminal) -> f64 {
        match (self.nonterminal_id(x), self.nonterminal_id(y)) {
            (Some(x), Some(y)) => self.unit_star.score(x.into(), y.into()),
            _ => self.semiring.zero(),
        }
    }

    /// All pairs (x, y) with R_L*(x, y) > 0̄, with their scores.
    pub fn left_star_entries(&self) -> impl Iterator<Item = (&NonTerminal, &NonTerminal, f64)> {
        self.closure_entries(&self.left_star)
    }

    /// All pairs (x, y) with R_U*(x, y) > 0̄, with their scores.
    pub fn unit_star_entries(&self) -> impl Iterator<Item = (&NonTerminal, &NonTerminal, f64)> {
        self.closure_entries(&self.unit_star)
    }

    fn closure_entries<'a>(
        &'a self,
        closure: &'a ClosureMatrix,
    ) -> impl Iterator<Item = (&'a NonTerminal, &'a NonTerminal, f64)> {
        self.nonterminals.iter_ids().flat_map(move |(x, from)| {
            closure.nonzero_columns(x.into()).iter().map(move |&y| {
                let to = self
                    .nonterminals
                    .get(NonTerminalId::from(y))
                    .expect("closure column is an interned non-terminal");
                (from, to, closure.score(x.into(), y))
            })
        })
    }

    pub(crate) fn rule(&self, id: RuleId) -> &Rule {
        self.rules.get(id).expect("valid rule id")
    }

    pub(crate) fn rule_lhs(&self, id: RuleId) -> NonTerminalId {
        self.rule_lhs[usize::from(id)]
    }

    pub(crate) fn rule_rhs(&self, id: RuleId) -> &[Symbol] {
        &self.rule_rhs[usize::from(id)]
    }

    pub(crate) fn nonterminal(&self, id: NonTerminalId) -> &NonTerminal {
        self.nonterminals.get(id).expect("valid non-terminal id")
    }

    pub(crate) fn terminal(&self, id: TerminalId) -> &Terminal {
        self.terminals.get(id).expect("valid terminal id")
    }

    pub(crate) fn nonterminal_id(&self, nonterminal: &NonTerminal) -> Option<NonTerminalId> {
        self.nonterminal_ids.get(nonterminal).copied()
    }

    pub(crate) fn terminals_with_ids(&self) -> impl Iterator<Item = (TerminalId, &Terminal)> {
        self.terminals.iter_ids()
    }

    pub(crate) fn predictions(&self, active: NonTerminalId) -> &[(RuleId, f64)] {
        &self.predictions[usize::from(active)]
    }

    pub(crate) fn unit_star_targets(&self, from: NonTerminalId) -> &[NonTerminalId] {
        &self.unit_star_targets[usize::from(from)]
    }

    pub(crate) fn unit_star(&self, from: NonTerminalId, to: NonTerminalId) -> f64 {
        self.unit_star.score(from.into(), to.into())
    }
}

/// Accumulates rules and produces a [`Grammar`].
///
/// ```rust
/// use pcfg::{Grammar, NonTerminal, Semiring, Terminal};
///
/// let a = NonTerminal::new("A");
/// let grammar = Grammar::builder()
///     .semiring(Semiring::Probability)
///     .weighted_rule(0.5, a.clone(), [NonTerminal::new("A").into()])
///     .weighted_rule(0.5, a.clone(), [Terminal::exact("x").into()])
///     .build()
///     .unwrap();
/// assert_eq!(grammar.rules().count(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct GrammarBuilder {
    semiring: Semiring,
    rules: Vec<(f64, NonTerminal, Vec<Category>)>,
}

impl GrammarBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Choose the score algebra. Defaults to [`Semiring::Probability`].
    pub fn semiring(mut self, semiring: Semiring) -> Self {
        self.semiring = semiring;
        self
    }

    /// Add a rule with probability 1.
    pub fn rule(self, lhs: NonTerminal, rhs: impl IntoIterator<Item = Category>) -> Self {
        self.weighted_rule(1.0, lhs, rhs)
    }

    /// Add a rule with the given probability.
    pub fn weighted_rule(
        mut self,
        probability: f64,
        lhs: NonTerminal,
        rhs: impl IntoIterator<Item = Category>,
    ) -> Self {
        self.rules.push((probability, lhs, rhs.into_iter().collect()));
        self
    }

    /// Validate the rules, intern categories, index, and compute both
    /// closures.
    ///
    /// # Errors
    ///
    /// [`Error::IllegalGrammar`] for an empty right-hand side or a
    /// probability outside `[0, 1]`; [`Error::GrammarNotConvergent`] when a
    /// left-corner or unit-production cycle carries probability mass ≥ 1,
    /// so the closure sum has no finite value.
    pub fn build(self) -> Result<Grammar, Error> {
        let _span = tracing::span!(tracing::Level::DEBUG, "grammar_build").entered();
        let semiring = self.semiring;

        let mut rules: Arena<Rule, RuleId> = Arena::new();
        let mut nonterminals: Arena<NonTerminal, NonTerminalId> = Arena::new();
        let mut terminals: Arena<Terminal, TerminalId> = Arena::new();
        let mut nonterminal_ids: HashMap<NonTerminal, NonTerminalId> = HashMap::new();
        let mut terminal_ids: HashMap<Terminal, TerminalId> = HashMap::new();
        let mut rule_lhs = Vec::new();
        let mut rule_rhs = Vec::new();
        let mut rules_by_lhs: HashMap<NonTerminalId, Vec<RuleId>> = HashMap::new();

        let mut intern_nonterminal = |nonterminal: &NonTerminal,
                                      nonterminals: &mut Arena<NonTerminal, NonTerminalId>|
         -> NonTerminalId {
            *nonterminal_ids
                .entry(nonterminal.clone())
                .or_insert_with(|| nonterminals.push(nonterminal.clone()))
        };

        for (probability, lhs, rhs) in &self.rules {
            if rhs.is_empty() {
                return Err(Error::IllegalGrammar(format!(
                    "rule for '{lhs}' has an empty right-hand side"
                )));
            }
            if !probability.is_finite() || !(0.0..=1.0).contains(probability) {
                return Err(Error::IllegalGrammar(format!(
                    "rule for '{lhs}' has probability {probability}, expected a value in [0, 1]"
                )));
            }

            let lhs_id = intern_nonterminal(lhs, &mut nonterminals);
            let rhs_symbols: Vec<Symbol> = rhs
                .iter()
                .map(|category| match category {
                    Category::Nonterminal(nonterminal) => {
                        Symbol::Nonterminal(intern_nonterminal(nonterminal, &mut nonterminals))
                    }
                    Category::Terminal(terminal) => {
                        let id = *terminal_ids
                            .entry(terminal.clone())
                            .or_insert_with(|| terminals.push(terminal.clone()));
                        Symbol::Terminal(id)
                    }
                })
                .collect();

            let score = semiring.from_probability(*probability);
            let rule_id = rules.push(Rule::new(*probability, score, lhs.clone(), rhs.clone()));
            rule_lhs.push(lhs_id);
            rule_rhs.push(rhs_symbols);
            rules_by_lhs.entry(lhs_id).or_default().push(rule_id);
        }

        let size = nonterminals.len();
        let mut left_one_step = vec![0.0; size * size];
        let mut unit_one_step = vec![0.0; size * size];
        for (rule_id, rule) in rules.iter_ids() {
            let row = usize::from(rule_lhs[usize::from(rule_id)]);
            let rhs = &rule_rhs[usize::from(rule_id)];

            // Rules led by an empty terminal contribute nothing here: the
            // parser steps over the empty symbol explicitly and predicts
            // from the resulting state instead.
            if let Symbol::Nonterminal(corner) = rhs[0] {
                left_one_step[row * size + usize::from(corner)] += rule.probability();
            }

            if rule.is_unit_production() {
                if let Symbol::Nonterminal(target) = rhs[0] {
                    unit_one_step[row * size + usize::from(target)] += rule.probability();
                }
            }
        }

        let left_star = star_closure(&left_one_step, size, semiring)
            .map_err(|divergence| convergence_error("left-corner", divergence))?;
        let unit_star = star_closure(&unit_one_step, size, semiring)
            .map_err(|divergence| convergence_error("unit-production", divergence))?;

        let predictions = (0..size)
            .map(|b| {
                let mut for_b = Vec::new();
                for &c in left_star.nonzero_columns(b) {
                    let reach = left_star.score(b, c);
                    if let Some(rule_ids) = rules_by_lhs.get(&NonTerminalId::from(c)) {
                        for &rule_id in rule_ids {
                            let rule = rules.get(rule_id).expect("valid rule id");
                            for_b.push((rule_id, semiring.times(reach, rule.score())));
                        }
                    }
                }
                for_b
            })
            .collect();

        let unit_star_targets = (0..size)
            .map(|z| {
                unit_star
                    .nonzero_columns(z)
                    .iter()
                    .map(|&y| NonTerminalId::from(y))
                    .collect()
            })
            .collect();

        tracing::event!(
            tracing::Level::DEBUG,
            "built grammar: {} rules, {} non-terminals, {} terminals",
            rules.len(),
            size,
            terminals.len()
        );

        Ok(Grammar {
            semiring,
            rules,
            nonterminals,
            terminals,
            nonterminal_ids,
            rule_lhs,
            rule_rhs,
            rules_by_lhs,
            left_star,
            unit_star,
            predictions,
            unit_star_targets,
        })
    }
}

fn convergence_error(relation: &str, divergence: Divergence) -> Error {
    let reason = match divergence {
        Divergence::Singular => format!("a {relation} cycle carries probability mass 1"),
        Divergence::ExcessMass => {
            format!("a {relation} cycle carries probability mass above 1")
        }
    };
    Error::GrammarNotConvergent(reason)
}
