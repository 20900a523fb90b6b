//! Deferred score arithmetic for prediction and completion.
//!
//! Advancing states at a position produces forward and inner updates that
//! reference scores the same position is still accumulating (a completed
//! state's inner may grow while its predecessors are processed, and
//! zero-width derivations can feed back into themselves). Updates are
//! therefore recorded as expressions over *pending* score slots and
//! resolved only after the position's worklist is empty; resolution
//! iterates self-referential slots to their fixpoint.

use rustc_hash::FxHashMap;

use super::chart::StateId;
use crate::arena::{arena_id, Arena};
use crate::semiring::Semiring;

/// Stop iterating once no slot moved by more than this between passes.
const CONVERGENCE_TOLERANCE: f64 = 1e-15;

/// Hard cap on resolution passes. Acyclic graphs stabilize on the second
/// pass; cyclic ones converge geometrically at the rate of their cycle
/// mass, which grammar construction keeps below 1.
const MAX_PASSES: usize = 100_000;

arena_id!(pub(crate) ExprId);

/// Which score column of a state a pending slot stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum ScoreKind {
    Forward,
    Inner,
}

#[derive(Debug, Clone, Copy)]
enum ScoreExpr {
    Atom(f64),
    /// The eventual value of a state's score in this round.
    Pending(ScoreKind, StateId),
    Plus(ExprId, ExprId),
    Times(ExprId, ExprId),
}

#[derive(Debug, Clone, Copy)]
enum Resolution {
    Unresolved,
    InProgress,
    Done(f64),
}

#[derive(Debug)]
struct Slot {
    expr: ExprId,
    resolution: Resolution,
    /// The value from the previous resolution pass (initially the chart
    /// score the slot was created from); a self-referential expression
    /// reads this while its own pass is still in flight.
    previous: f64,
}

/// One position's worth of score expressions.
#[derive(Debug)]
pub(crate) struct DeferredScores {
    semiring: Semiring,
    exprs: Arena<ScoreExpr, ExprId>,
    slots: FxHashMap<(ScoreKind, StateId), Slot>,
}

impl DeferredScores {
    pub fn new(semiring: Semiring) -> Self {
        Self {
            semiring,
            exprs: Arena::new(),
            slots: FxHashMap::default(),
        }
    }

    pub fn atom(&mut self, value: f64) -> ExprId {
        self.exprs.push(ScoreExpr::Atom(value))
    }

    pub fn times(&mut self, a: ExprId, b: ExprId) -> ExprId {
        self.exprs.push(ScoreExpr::Times(a, b))
    }

    /// An expression standing for the value `state`'s score of `kind` will
    /// have after this round. Creates the slot from `current` when absent.
    pub fn pending(&mut self, kind: ScoreKind, state: StateId, current: f64) -> ExprId {
        self.ensure_slot(kind, state, current);
        self.exprs.push(ScoreExpr::Pending(kind, state))
    }

    /// slot(kind, state) ⊕= addition. Creates the slot from `current` when
    /// absent, so the addition lands on top of the existing chart score.
    pub fn accumulate(&mut self, kind: ScoreKind, state: StateId, addition: ExprId, current: f64) {
        self.ensure_slot(kind, state, current);
        let plus = {
            let slot = self
                .slots
                .get(&(kind, state))
                .expect("slot was just ensured");
            ScoreExpr::Plus(slot.expr, addition)
        };
        let expr = self.exprs.push(plus);
        self.slots
            .get_mut(&(kind, state))
            .expect("slot was just ensured")
            .expr = expr;
    }

    fn ensure_slot(&mut self, kind: ScoreKind, state: StateId, current: f64) {
        if !self.slots.contains_key(&(kind, state)) {
            let expr = self.exprs.push(ScoreExpr::Atom(current));
            self.slots.insert(
                (kind, state),
                Slot {
                    expr,
                    resolution: Resolution::Unresolved,
                    previous: current,
                },
            );
        }
    }

    /// Resolve every slot and hand back the final values.
    ///
    /// Resolution runs in passes. Within a pass each expression is
    /// evaluated recursively with memoization, and a slot re-entered while
    /// its own expression is in flight reads the previous pass's value.
    /// Passes repeat until no slot moves by more than the tolerance:
    /// acyclic graphs stabilize on the second pass, while self-referential
    /// slots (zero-width derivation cycles) converge geometrically to
    /// their fixpoint, so `x = 0.5 ⊕ 0.5 ⊗ x` resolves to 1 rather than
    /// to the first term of its series.
    pub fn resolve(mut self) -> Vec<(ScoreKind, StateId, f64)> {
        let mut keys: Vec<(ScoreKind, StateId)> = self.slots.keys().copied().collect();
        keys.sort_by_key(|&(kind, state)| (usize::from(state), kind == ScoreKind::Inner));

        for _pass in 0..MAX_PASSES {
            for &key in &keys {
                self.slots.get_mut(&key).expect("known slot").resolution = Resolution::Unresolved;
            }
            let mut largest_change = 0.0f64;
            for &(kind, state) in &keys {
                let value = self.resolve_slot(kind, state);
                let slot = self.slots.get_mut(&(kind, state)).expect("known slot");
                let change = if value == slot.previous {
                    0.0
                } else {
                    (value - slot.previous).abs()
                };
                largest_change = largest_change.max(change);
                slot.previous = value;
            }
            if largest_change <= CONVERGENCE_TOLERANCE {
                break;
            }
        }

        keys.into_iter()
            .map(|key| {
                let value = self.slots[&key].previous;
                (key.0, key.1, value)
            })
            .collect()
    }

    fn resolve_slot(&mut self, kind: ScoreKind, state: StateId) -> f64 {
        let slot = self
            .slots
            .get_mut(&(kind, state))
            .expect("pending expression references a known slot");
        match slot.resolution {
            Resolution::Done(value) => value,
            // A cycle: the slot's own expression is being resolved further
            // up the stack. Self-references read the previous pass's value.
            Resolution::InProgress => slot.previous,
            Resolution::Unresolved => {
                slot.resolution = Resolution::InProgress;
                let expr = slot.expr;
                let value = self.eval(expr);
                self.slots
                    .get_mut(&(kind, state))
                    .expect("slot still present")
                    .resolution = Resolution::Done(value);
                value
            }
        }
    }

    fn eval(&mut self, expr: ExprId) -> f64 {
        stacker::maybe_grow(64 * 1024, 1024 * 1024, || {
            let node = *self.exprs.get(expr).expect("valid expression id");
            match node {
                ScoreExpr::Atom(value) => value,
                ScoreExpr::Pending(kind, state) => self.resolve_slot(kind, state),
                ScoreExpr::Plus(a, b) => {
                    let a = self.eval(a);
                    let b = self.eval(b);
                    self.semiring.plus(a, b)
                }
                ScoreExpr::Times(a, b) => {
                    let a = self.eval(a);
                    let b = self.eval(b);
                    self.semiring.times(a, b)
                }
            }
        })
    }
}
