use rustc_hash::FxHashMap;

use crate::arena::{arena_id, Arena};
use crate::grammar::{Grammar, NonTerminalId, RuleId, Symbol, TerminalId};
use crate::semiring::Semiring;

arena_id!(pub(crate) StateId);

/// An Earley item: a dotted rule instance spanning
/// `rule_start..position` of the input.
///
/// States are canonical: one chart entry per distinct tuple, never mutated
/// after creation. Scores live in columns beside the arena, keyed by
/// [`StateId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct State {
    pub rule: RuleId,
    /// Where this rule instance started.
    pub rule_start: usize,
    /// How many right-hand-side symbols have been recognized.
    pub dot: usize,
    /// The input position this item has been carried to.
    pub position: usize,
}

/// Best-derivation score of a state together with how its last symbol was
/// recognized; [`ViterbiOrigin::Complete`] is the back-pointer the best
/// parse tree is rebuilt from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ViterbiScore {
    pub score: f64,
    pub origin: ViterbiOrigin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ViterbiOrigin {
    /// Dot at zero: nothing recognized yet, score is the rule score.
    Start,
    /// Advanced over a terminal by scanning the token at `position - 1`.
    Scan,
    /// Advanced over an empty terminal, consuming no input.
    Empty,
    /// Advanced over the given completed state.
    Complete(StateId),
}

/// The chart: per-position Earley state sets with their scores and the
/// secondary indices the deduction phases query. Indices are updated inside
/// [`Chart::get_or_create`] so they can never go stale.
#[derive(Debug)]
pub(crate) struct Chart<'gram> {
    grammar: &'gram Grammar,
    states: Arena<State, StateId>,
    ids: FxHashMap<State, StateId>,
    forward: Vec<f64>,
    inner: Vec<f64>,
    viterbi: Vec<Option<ViterbiScore>>,
    /// States active on a non-terminal, by (position, that non-terminal).
    active_on_nonterminal: FxHashMap<(usize, NonTerminalId), Vec<StateId>>,
    /// States active on any non-terminal, by position.
    active_nonterminal_any: FxHashMap<usize, Vec<StateId>>,
    /// States active on some Z with R_U*(Z, Y) > 0̄, by (position, Y).
    active_unit_star_to: FxHashMap<(usize, NonTerminalId), Vec<StateId>>,
    /// States active on a (non-empty) terminal, by (position, terminal).
    active_on_terminal: FxHashMap<(usize, TerminalId), Vec<StateId>>,
    /// States active on an empty terminal, by position.
    active_on_empty: FxHashMap<usize, Vec<StateId>>,
    completed: FxHashMap<usize, Vec<StateId>>,
    completed_non_unit: FxHashMap<usize, Vec<StateId>>,
    states_per_position: FxHashMap<usize, usize>,
}

impl<'gram> Chart<'gram> {
    pub fn new(grammar: &'gram Grammar) -> Self {
        Self {
            grammar,
            states: Arena::new(),
            ids: FxHashMap::default(),
            forward: Vec::new(),
            inner: Vec::new(),
            viterbi: Vec::new(),
            active_on_nonterminal: FxHashMap::default(),
            active_nonterminal_any: FxHashMap::default(),
            active_unit_star_to: FxHashMap::default(),
            active_on_terminal: FxHashMap::default(),
            active_on_empty: FxHashMap::default(),
            completed: FxHashMap::default(),
            completed_non_unit: FxHashMap::default(),
            states_per_position: FxHashMap::default(),
        }
    }

    pub fn grammar(&self) -> &'gram Grammar {
        self.grammar
    }

    pub fn semiring(&self) -> Semiring {
        self.grammar.semiring()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Canonicalize the state, creating it and updating every index when it
    /// is new. Returns the id and whether the state was newly added.
    pub fn get_or_create(
        &mut self,
        position: usize,
        rule_start: usize,
        dot: usize,
        rule: RuleId,
    ) -> (StateId, bool) {
        let state = State {
            rule,
            rule_start,
            dot,
            position,
        };
        if let Some(&id) = self.ids.get(&state) {
            return (id, false);
        }

        let semiring = self.grammar.semiring();
        let id = self.states.push(state);
        self.ids.insert(state, id);
        self.forward.push(semiring.zero());
        self.inner.push(semiring.zero());
        // A dot-at-zero state has recognized exactly its rule choice, so its
        // best derivation so far scores the rule probability.
        self.viterbi.push((dot == 0).then(|| ViterbiScore {
            score: self.grammar.rule(rule).score(),
            origin: ViterbiOrigin::Start,
        }));
        *self.states_per_position.entry(position).or_insert(0) += 1;

        let rhs = self.grammar.rule_rhs(rule);
        assert!(dot <= rhs.len(), "dot position {dot} out of range, this is a bug");
        if dot == rhs.len() {
            self.completed.entry(position).or_default().push(id);
            if !self.grammar.rule(rule).is_unit_production() {
                self.completed_non_unit.entry(position).or_default().push(id);
            }
        } else {
            match rhs[dot] {
                Symbol::Nonterminal(active) => {
                    self.active_on_nonterminal
                        .entry((position, active))
                        .or_default()
                        .push(id);
                    self.active_nonterminal_any
                        .entry(position)
                        .or_default()
                        .push(id);
                    for &target in self.grammar.unit_star_targets(active) {
                        self.active_unit_star_to
                            .entry((position, target))
                            .or_default()
                            .push(id);
                    }
                }
                Symbol::Terminal(terminal) => {
                    if self.grammar.terminal(terminal).is_empty() {
                        self.active_on_empty.entry(position).or_default().push(id);
                    } else {
                        self.active_on_terminal
                            .entry((position, terminal))
                            .or_default()
                            .push(id);
                    }
                }
            }
        }

        (id, true)
    }

    pub fn id_of(&self, state: &State) -> Option<StateId> {
        self.ids.get(state).copied()
    }

    pub fn state(&self, id: StateId) -> State {
        *self.states.get(id).expect("valid state id")
    }

    /// The symbol right of the dot, `None` for a passive state.
    pub fn active_symbol(&self, id: StateId) -> Option<Symbol> {
        let state = self.state(id);
        self.grammar.rule_rhs(state.rule).get(state.dot).copied()
    }

    pub fn is_passive(&self, id: StateId) -> bool {
        let state = self.state(id);
        state.dot == self.grammar.rule_rhs(state.rule).len()
    }

    pub fn forward(&self, id: StateId) -> f64 {
        self.forward[usize::from(id)]
    }

    /// forward[id] ⊕= score
    pub fn add_forward(&mut self, id: StateId, score: f64) {
        let semiring = self.grammar.semiring();
        let entry = &mut self.forward[usize::from(id)];
        *entry = semiring.plus(*entry, score);
    }

    pub fn set_forward(&mut self, id: StateId, score: f64) {
        self.forward[usize::from(id)] = score;
    }

    pub fn inner(&self, id: StateId) -> f64 {
        self.inner[usize::from(id)]
    }

    pub fn set_inner(&mut self, id: StateId, score: f64) {
        self.inner[usize::from(id)] = score;
    }

    pub fn viterbi(&self, id: StateId) -> Option<ViterbiScore> {
        self.viterbi[usize::from(id)]
    }

    pub fn set_viterbi(&mut self, id: StateId, score: ViterbiScore) {
        self.viterbi[usize::from(id)] = Some(score);
    }

    /// Install `candidate` only when strictly better under the semiring
    /// ordering (or when no score is set yet). Returns whether it won.
    pub fn improve_viterbi(&mut self, id: StateId, candidate: ViterbiScore) -> bool {
        let semiring = self.grammar.semiring();
        let slot = &mut self.viterbi[usize::from(id)];
        let improved = match slot {
            None => true,
            Some(current) => semiring.is_better(candidate.score, current.score),
        };
        if improved {
            *slot = Some(candidate);
        }
        improved
    }

    pub fn active_on_nonterminal(&self, position: usize, active: NonTerminalId) -> &[StateId] {
        index_slice(&self.active_on_nonterminal, &(position, active))
    }

    pub fn active_nonterminal_any(&self, position: usize) -> &[StateId] {
        index_slice(&self.active_nonterminal_any, &position)
    }

    pub fn active_unit_star_to(&self, position: usize, target: NonTerminalId) -> &[StateId] {
        index_slice(&self.active_unit_star_to, &(position, target))
    }

    pub fn active_on_terminal(&self, position: usize, terminal: TerminalId) -> &[StateId] {
        index_slice(&self.active_on_terminal, &(position, terminal))
    }

    /// Terminals that had at least one active state at `position`; these
    /// are what the scanner was prepared to accept.
    pub fn expected_terminals(&self, position: usize) -> Vec<TerminalId> {
        let mut expected: Vec<TerminalId> = self
            .active_on_terminal
            .iter()
            .filter(|(key, states)| key.0 == position && !states.is_empty())
            .map(|(key, _)| key.1)
            .collect();
        expected.sort_by_key(|&terminal| usize::from(terminal));
        expected
    }

    pub fn active_on_empty(&self, position: usize) -> &[StateId] {
        index_slice(&self.active_on_empty, &position)
    }

    pub fn completed(&self, position: usize) -> &[StateId] {
        index_slice(&self.completed, &position)
    }

    pub fn completed_non_unit(&self, position: usize) -> &[StateId] {
        index_slice(&self.completed_non_unit, &position)
    }

    pub fn has_states_at(&self, position: usize) -> bool {
        self.states_per_position.get(&position).copied().unwrap_or(0) > 0
    }

    /// Completed states for the start symbol spanning the whole input.
    pub fn completed_start_states(&self, start: NonTerminalId, length: usize) -> Vec<StateId> {
        self.completed(length)
            .iter()
            .copied()
            .filter(|&id| {
                let state = self.state(id);
                state.rule_start == 0 && self.grammar.rule_lhs(state.rule) == start
            })
            .collect()
    }
}

fn index_slice<'a, K: std::hash::Hash + Eq>(
    index: &'a FxHashMap<K, Vec<StateId>>,
    key: &K,
) -> &'a [StateId] {
    index.get(key).map(Vec::as_slice).unwrap_or(&[])
}
