//! The probabilistic Earley engine: predict, scan, and complete over a
//! [`Chart`], with forward/inner scores accumulated per Stolcke and Viterbi
//! scores relaxed along explicit back-pointers.

pub(crate) mod chart;
pub(crate) mod deferred;
pub(crate) mod trees;

use rustc_hash::FxHashSet;

use crate::error::Error;
use crate::grammar::{Grammar, NonTerminalId, Symbol};
use crate::tracing;
use chart::{Chart, StateId, ViterbiOrigin, ViterbiScore};
use deferred::{DeferredScores, ScoreKind};

/// Optional per-position token confidence, already semiring-encoded. A NaN
/// return means "no opinion" and leaves the scanned scores untouched.
pub(crate) type ScanProbability<'a> = Option<&'a dyn Fn(usize) -> f64>;

/// Run the recognizer over `tokens`, returning the filled chart.
///
/// Per position i the flow is: settle (predict at i, step over empty
/// terminals, complete anything that became passive, relax Viterbi) →
/// scan i → i+1 → complete at i+1 → settle at i+1.
pub(crate) fn parse<'gram>(
    grammar: &'gram Grammar,
    start: NonTerminalId,
    tokens: &[&str],
    scan_probability: ScanProbability<'_>,
) -> Result<Chart<'gram>, Error> {
    let _span = tracing::span!(tracing::Level::DEBUG, "parse").entered();

    let mut chart = Chart::new(grammar);
    let mut predicted: FxHashSet<StateId> = FxHashSet::default();

    seed(&mut chart, start);
    let mut edges = CompletionEdges::default();
    settle(&mut chart, 0, &mut predicted, &mut edges);

    for (index, token) in tokens.iter().enumerate() {
        scan(&mut chart, index, token, scan_probability)?;
        let mut edges = CompletionEdges::default();
        complete(&mut chart, index + 1, &mut edges);
        settle(&mut chart, index + 1, &mut predicted, &mut edges);
    }

    Ok(chart)
}

/// (completer, predecessor) pairs already advanced at the current position.
/// Each pair may contribute its score update exactly once; the set lets the
/// settle loop re-offer zero-width completers to predecessors that did not
/// exist yet when the completer was first processed.
type CompletionEdges = FxHashSet<(StateId, StateId)>;

/// Create the initial states at position 0: every rule reachable from the
/// start symbol through the left-corner closure.
fn seed(chart: &mut Chart<'_>, start: NonTerminalId) {
    let _span = tracing::span!(tracing::Level::TRACE, "seed").entered();
    let grammar = chart.grammar();
    for &(rule, combined) in grammar.predictions(start) {
        let (id, _) = chart.get_or_create(0, 0, 0, rule);
        chart.add_forward(id, combined);
        chart.set_inner(id, grammar.rule(rule).score());
    }
}

/// Predict from the given states: for a state active on B, create a
/// dot-at-zero state for every rule C → δ with R_L*(B, C) > 0̄.
///
///   forward(C → ·δ) ⊕= forward(predictor) ⊗ R_L*(B, C) ⊗ p(C → δ)
///   inner(C → ·δ)   = p(C → δ)
///
/// The forward update is recorded as a deferred expression because the
/// predictor's own forward score may still be settling at this position.
/// Dot-at-zero states are never predicted from: the closure entry already
/// sums every chain below them, stepping into them would double-count.
fn predict_from(
    chart: &mut Chart<'_>,
    states: &[StateId],
    predicted: &mut FxHashSet<StateId>,
    deferred: &mut DeferredScores,
) {
    let _span = tracing::span!(tracing::Level::TRACE, "predict").entered();
    for &predictor in states {
        if chart.state(predictor).dot == 0 || !predicted.insert(predictor) {
            continue;
        }
        let Some(Symbol::Nonterminal(active)) = chart.active_symbol(predictor) else {
            unreachable!("predictor is indexed as active on a non-terminal");
        };
        let predictor_forward =
            deferred.pending(ScoreKind::Forward, predictor, chart.forward(predictor));
        let predictions: Vec<_> = chart.grammar().predictions(active).to_vec();
        for (rule, combined) in predictions {
            let position = chart.state(predictor).position;
            let (id, _) = chart.get_or_create(position, position, 0, rule);
            let reach = deferred.atom(combined);
            let contribution = deferred.times(predictor_forward, reach);
            deferred.accumulate(ScoreKind::Forward, id, contribution, chart.forward(id));
            let score = chart.grammar().rule(rule).score();
            chart.set_inner(id, score);
        }
    }
}

/// Scan the token at `position`, advancing every state active on a
/// matching terminal to `position + 1` with its scores carried over.
fn scan(
    chart: &mut Chart<'_>,
    position: usize,
    token: &str,
    scan_probability: ScanProbability<'_>,
) -> Result<(), Error> {
    let _span = tracing::span!(tracing::Level::TRACE, "scan").entered();
    let semiring = chart.semiring();
    let confidence = scan_probability
        .map(|hook| hook(position))
        .unwrap_or(f64::NAN);
    // NaN means the hook has nothing to say; scores pass through unchanged.
    let apply = |score: f64| {
        if confidence.is_nan() {
            score
        } else {
            semiring.times(score, confidence)
        }
    };

    let matching: Vec<_> = chart
        .grammar()
        .terminals_with_ids()
        .filter(|(_, terminal)| terminal.matches(token))
        .map(|(id, _)| id)
        .collect();

    for terminal in matching {
        let scannable = chart.active_on_terminal(position, terminal).to_vec();
        for pre_scan in scannable {
            let state = chart.state(pre_scan);
            let (post_scan, _) =
                chart.get_or_create(position + 1, state.rule_start, state.dot + 1, state.rule);
            chart.set_forward(post_scan, apply(chart.forward(pre_scan)));
            let post_inner = apply(chart.inner(pre_scan));
            chart.set_inner(post_scan, post_inner);
            chart.set_viterbi(
                post_scan,
                ViterbiScore {
                    score: post_inner,
                    origin: ViterbiOrigin::Scan,
                },
            );
        }
    }

    if !chart.has_states_at(position + 1) {
        let expected = chart
            .expected_terminals(position)
            .into_iter()
            .map(|id| chart.grammar().terminal(id).to_string())
            .collect();
        return Err(Error::UnexpectedToken {
            position,
            token: token.to_string(),
            expected,
        });
    }
    Ok(())
}

/// Complete at `position`, seeded with every completed non-unit-production
/// state there.
fn complete(chart: &mut Chart<'_>, position: usize, edges: &mut CompletionEdges) {
    let seeds = chart.completed_non_unit(position).to_vec();
    complete_states(chart, position, seeds, edges);
}

/// One deferred-resolution completion pass: for each completed state
/// `c = (Y → ν·, j, i)` and each state `s = (X → λ·Zμ, k, j)` with
/// R_U*(Z, Y) > 0̄, produce `s′ = (X → λZ·μ, k, i)` with
///
///   forward(s′) ⊕= R_U*(Z, Y) ⊗ forward(s) ⊗ inner(c)
///   inner(s′)   ⊕= R_U*(Z, Y) ⊗ inner(s) ⊗ inner(c)
///
/// recorded as deferred expressions, then resolved once the worklist is
/// empty. New passive non-unit states cascade within the same call.
fn complete_states(
    chart: &mut Chart<'_>,
    position: usize,
    seeds: Vec<StateId>,
    edges: &mut CompletionEdges,
) {
    if seeds.is_empty() {
        return;
    }
    let _span = tracing::span!(tracing::Level::TRACE, "complete").entered();
    let mut deferred = DeferredScores::new(chart.semiring());
    complete_round(chart, position, seeds, &mut deferred, edges);

    for (kind, state, value) in deferred.resolve() {
        match kind {
            ScoreKind::Forward => chart.set_forward(state, value),
            ScoreKind::Inner => chart.set_inner(state, value),
        }
    }
}

fn complete_round(
    chart: &mut Chart<'_>,
    position: usize,
    completed: Vec<StateId>,
    deferred: &mut DeferredScores,
    edges: &mut CompletionEdges,
) {
    let mut new_completed = Vec::new();

    for completer in completed {
        let completer_state = chart.state(completer);
        let origin = completer_state.rule_start;
        let lhs = chart.grammar().rule_lhs(completer_state.rule);
        let completer_inner = deferred.pending(ScoreKind::Inner, completer, chart.inner(completer));

        let to_advance = chart.active_unit_star_to(origin, lhs).to_vec();
        for predecessor in to_advance {
            if !edges.insert((completer, predecessor)) {
                continue;
            }
            let predecessor_state = chart.state(predecessor);
            assert_eq!(
                predecessor_state.position, origin,
                "unit-star index is keyed by position, this is a bug"
            );
            let Some(Symbol::Nonterminal(active)) = chart.active_symbol(predecessor) else {
                unreachable!("unit-star index holds states active on a non-terminal");
            };
            let unit_star = chart.grammar().unit_star(active, lhs);

            let previous_forward =
                deferred.pending(ScoreKind::Forward, predecessor, chart.forward(predecessor));
            let previous_inner =
                deferred.pending(ScoreKind::Inner, predecessor, chart.inner(predecessor));

            let (advanced, was_new) = chart.get_or_create(
                position,
                predecessor_state.rule_start,
                predecessor_state.dot + 1,
                predecessor_state.rule,
            );

            let reach = deferred.atom(unit_star);
            let forward_through = deferred.times(reach, previous_forward);
            let forward_update = deferred.times(forward_through, completer_inner);
            deferred.accumulate(
                ScoreKind::Forward,
                advanced,
                forward_update,
                chart.forward(advanced),
            );

            let reach = deferred.atom(unit_star);
            let inner_through = deferred.times(reach, previous_inner);
            let inner_update = deferred.times(inner_through, completer_inner);
            deferred.accumulate(
                ScoreKind::Inner,
                advanced,
                inner_update,
                chart.inner(advanced),
            );

            let advanced_rule = chart.state(advanced).rule;
            if was_new
                && chart.is_passive(advanced)
                && !chart.grammar().rule(advanced_rule).is_unit_production()
            {
                new_completed.push(advanced);
            }
        }
    }

    if !new_completed.is_empty() {
        complete_round(chart, position, new_completed, deferred, edges);
    }
}

/// Relax Viterbi scores downstream of a completed state. Unlike the
/// forward/inner pass this walks *direct* predecessors only: the single
/// best derivation keeps its explicit unit steps, and since no rule scores
/// above 1̄, looping a unit cycle can never improve, so relaxation
/// terminates on strict improvements alone.
fn relax_viterbi(chart: &mut Chart<'_>, completer: StateId) -> bool {
    let completer_viterbi = chart
        .viterbi(completer)
        .expect("completed state has a Viterbi score before relaxation, this is a bug");
    let completer_state = chart.state(completer);
    let origin = completer_state.rule_start;
    let lhs = chart.grammar().rule_lhs(completer_state.rule);
    let semiring = chart.semiring();

    let mut any_improved = false;
    let mut improved_completed = Vec::new();
    let to_advance = chart.active_on_nonterminal(origin, lhs).to_vec();
    for predecessor in to_advance {
        let predecessor_state = chart.state(predecessor);
        // A predecessor created by a zero-width completion in this very
        // sweep may not be scored yet; a later sweep pass picks it up.
        let Some(previous) = chart.viterbi(predecessor) else {
            continue;
        };

        let (advanced, _) = chart.get_or_create(
            completer_state.position,
            predecessor_state.rule_start,
            predecessor_state.dot + 1,
            predecessor_state.rule,
        );
        let candidate = ViterbiScore {
            score: semiring.times(completer_viterbi.score, previous.score),
            origin: ViterbiOrigin::Complete(completer),
        };
        if chart.improve_viterbi(advanced, candidate) {
            any_improved = true;
            if chart.is_passive(advanced) {
                improved_completed.push(advanced);
            }
        }
    }

    for advanced in improved_completed {
        stacker::maybe_grow(64 * 1024, 1024 * 1024, || {
            relax_viterbi(chart, advanced);
        });
    }
    any_improved
}

/// Drive position `position` to a fixpoint.
///
/// The loop is purely structural: it predicts from states not yet predicted
/// from, steps over empty terminals, and completes whatever became passive,
/// recording every score update as a deferred expression in one graph for
/// the whole position. It terminates when an iteration adds no state, no
/// completion edge, no empty advance, and no prediction — all four sets
/// only grow, so once they stand still nothing further can change. The
/// graph is then resolved in one go (iterating self-referential slots to
/// their fixpoint, which is where zero-width derivation cycles sum their
/// full geometric series), and the position ends with a Viterbi relaxation
/// sweep over its completed states.
fn settle(
    chart: &mut Chart<'_>,
    position: usize,
    predicted: &mut FxHashSet<StateId>,
    edges: &mut CompletionEdges,
) {
    let _span = tracing::span!(tracing::Level::TRACE, "settle").entered();
    let mut deferred = DeferredScores::new(chart.semiring());
    // Sources already stepped over an empty terminal, and the advances they
    // produced (the Viterbi side runs after resolution).
    let mut empty_advanced: FxHashSet<StateId> = FxHashSet::default();
    let mut empty_links: Vec<(StateId, StateId)> = Vec::new();

    loop {
        let states_before = chart.len();
        let edges_before = edges.len();
        let empties_before = empty_advanced.len();
        let predicted_before = predicted.len();

        let to_predict = chart.active_nonterminal_any(position).to_vec();
        predict_from(chart, &to_predict, predicted, &mut deferred);

        // Step over empty terminals: the advanced state receives its
        // source's scores, like a scan that consumes nothing. The copy is
        // an expression too, since the source may itself still be settling.
        let mut new_passive = Vec::new();
        let on_empty = chart.active_on_empty(position).to_vec();
        for source in on_empty {
            if !empty_advanced.insert(source) {
                continue;
            }
            let state = chart.state(source);
            let (advanced, was_new) =
                chart.get_or_create(position, state.rule_start, state.dot + 1, state.rule);

            let forward_copy =
                deferred.pending(ScoreKind::Forward, source, chart.forward(source));
            deferred.accumulate(
                ScoreKind::Forward,
                advanced,
                forward_copy,
                chart.forward(advanced),
            );
            let inner_copy = deferred.pending(ScoreKind::Inner, source, chart.inner(source));
            deferred.accumulate(ScoreKind::Inner, advanced, inner_copy, chart.inner(advanced));
            empty_links.push((source, advanced));

            if was_new && chart.is_passive(advanced) {
                new_passive.push(advanced);
            }
        }

        // Zero-width completers are re-offered so that states created after
        // their first round (predicted here, or advanced over another empty
        // derivation) still get advanced; the edge set keeps every
        // (completer, predecessor) contribution single-shot.
        let mut seeds = new_passive;
        for &completer in chart.completed_non_unit(position) {
            if chart.state(completer).rule_start == position && !seeds.contains(&completer) {
                seeds.push(completer);
            }
        }
        complete_round(chart, position, seeds, &mut deferred, edges);

        if chart.len() == states_before
            && edges.len() == edges_before
            && empty_advanced.len() == empties_before
            && predicted.len() == predicted_before
        {
            break;
        }
    }

    for (kind, state, value) in deferred.resolve() {
        match kind {
            ScoreKind::Forward => chart.set_forward(state, value),
            ScoreKind::Inner => chart.set_inner(state, value),
        }
    }

    // Viterbi over empty advances uses the settled inner of the source, the
    // same way a scan uses the pre-scan inner.
    for (source, advanced) in empty_links {
        let score = chart.inner(source);
        chart.improve_viterbi(
            advanced,
            ViterbiScore {
                score,
                origin: ViterbiOrigin::Empty,
            },
        );
    }

    loop {
        let mut any_improved = false;
        for completer in chart.completed(position).to_vec() {
            if chart.viterbi(completer).is_some() && relax_viterbi(chart, completer) {
                any_improved = true;
            }
        }
        if !any_improved {
            break;
        }
    }
    tracing::event!(
        tracing::Level::TRACE,
        "settled position {position}: {} states in chart",
        chart.len()
    );
}

#[cfg(test)]
mod tests {
    use super::chart::State;
    use super::*;
    use crate::category::{NonTerminal, Terminal};
    use crate::grammar::Grammar;
    use crate::semiring::Semiring;

    fn nt(name: &str) -> NonTerminal {
        NonTerminal::new(name)
    }

    fn parse_chart<'gram>(grammar: &'gram Grammar, start: &str, tokens: &[&str]) -> Chart<'gram> {
        let start = grammar.nonterminal_id(&nt(start)).unwrap();
        parse(grammar, start, tokens, None).unwrap()
    }

    fn start_inner_sum(chart: &Chart<'_>, start: &str, length: usize) -> f64 {
        let grammar = chart.grammar();
        let start = grammar.nonterminal_id(&nt(start)).unwrap();
        chart
            .completed_start_states(start, length)
            .into_iter()
            .fold(grammar.semiring().zero(), |sum, id| {
                grammar.semiring().plus(sum, chart.inner(id))
            })
    }

    #[test]
    fn single_token_grammar() {
        let grammar = Grammar::builder()
            .rule(nt("S"), [Terminal::exact("a").into()])
            .build()
            .unwrap();
        let chart = parse_chart(&grammar, "S", &["a"]);
        assert_eq!(start_inner_sum(&chart, "S", 1), 1.0);
    }

    #[test]
    fn scan_failure_reports_the_expected_terminals() {
        let grammar = Grammar::builder()
            .rule(nt("S"), [Terminal::exact("a").into()])
            .build()
            .unwrap();
        let start = grammar.nonterminal_id(&nt("S")).unwrap();
        let result = parse(&grammar, start, &["b"], None);
        assert_eq!(
            result.unwrap_err(),
            Error::UnexpectedToken {
                position: 0,
                token: "b".to_string(),
                expected: vec!["'a'".to_string()],
            }
        );
    }

    #[test]
    fn unit_cycle_mass_is_conflated_into_the_score() {
        // A → A [0.5] | 'x' [0.5]: P(x) = 0.5 · Σ 0.5ⁿ = 1
        let grammar = Grammar::builder()
            .weighted_rule(0.5, nt("A"), [nt("A").into()])
            .weighted_rule(0.5, nt("A"), [Terminal::exact("x").into()])
            .build()
            .unwrap();
        let chart = parse_chart(&grammar, "A", &["x"]);
        assert!((start_inner_sum(&chart, "A", 1) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn unit_cycle_viterbi_keeps_the_single_best_derivation() {
        let grammar = Grammar::builder()
            .weighted_rule(0.5, nt("A"), [nt("A").into()])
            .weighted_rule(0.5, nt("A"), [Terminal::exact("x").into()])
            .build()
            .unwrap();
        let chart = parse_chart(&grammar, "A", &["x"]);
        let start = grammar.nonterminal_id(&nt("A")).unwrap();
        let best = chart
            .completed_start_states(start, 1)
            .into_iter()
            .filter_map(|id| chart.viterbi(id).map(|v| v.score))
            .fold(f64::NEG_INFINITY, f64::max);
        assert_eq!(best, 0.5);
    }

    #[test]
    fn empty_terminal_recognizes_empty_input() {
        let grammar = Grammar::builder()
            .rule(nt("S"), [Terminal::empty().into()])
            .build()
            .unwrap();
        let chart = parse_chart(&grammar, "S", &[]);
        assert_eq!(start_inner_sum(&chart, "S", 0), 1.0);
    }

    #[test]
    fn nullable_recursion_sums_its_geometric_series() {
        // A → A B [0.5] | ε [0.5]; B → ε [1]: the empty input derives
        // through every unrolling of A → A B, so
        // P(A ⇒* ε) = Σₙ 0.5ⁿ⁺¹ = 0.5 / (1 − 0.5) = 1, not just the
        // first terms of the series.
        let grammar = Grammar::builder()
            .weighted_rule(0.5, nt("A"), [nt("A").into(), nt("B").into()])
            .weighted_rule(0.5, nt("A"), [Terminal::empty().into()])
            .rule(nt("B"), [Terminal::empty().into()])
            .build()
            .unwrap();
        let chart = parse_chart(&grammar, "A", &[]);
        assert!((start_inner_sum(&chart, "A", 0) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn forward_scores_accumulate_over_predictors() {
        // S → A 'x' [1]; A → 'a' [0.5] | 'b' [0.5]
        let grammar = Grammar::builder()
            .rule(nt("S"), [nt("A").into(), Terminal::exact("x").into()])
            .weighted_rule(0.5, nt("A"), [Terminal::exact("a").into()])
            .weighted_rule(0.5, nt("A"), [Terminal::exact("b").into()])
            .build()
            .unwrap();
        let chart = parse_chart(&grammar, "S", &["a", "x"]);
        assert_eq!(start_inner_sum(&chart, "S", 2), 0.5);
    }

    #[test]
    fn log_semiring_agrees_with_probability_semiring() {
        let build = |semiring| {
            Grammar::builder()
                .semiring(semiring)
                .rule(nt("S"), [nt("A").into(), nt("A").into()])
                .weighted_rule(0.25, nt("A"), [Terminal::exact("a").into()])
                .weighted_rule(0.75, nt("A"), [nt("B").into()])
                .rule(nt("B"), [Terminal::exact("a").into()])
                .build()
                .unwrap()
        };
        let probability = {
            let grammar = build(Semiring::Probability);
            let chart = parse_chart(&grammar, "S", &["a", "a"]);
            start_inner_sum(&chart, "S", 2)
        };
        let from_log = {
            let grammar = build(Semiring::LogProbability);
            let chart = parse_chart(&grammar, "S", &["a", "a"]);
            Semiring::LogProbability.to_probability(start_inner_sum(&chart, "S", 2))
        };
        assert!((probability - 1.0).abs() < 1e-9);
        assert!((from_log - probability).abs() < 1e-9);
    }

    #[test]
    fn scan_probability_hook_scales_scores() {
        let grammar = Grammar::builder()
            .rule(nt("S"), [Terminal::exact("a").into()])
            .build()
            .unwrap();
        let start = grammar.nonterminal_id(&nt("S")).unwrap();
        let hook = |_position: usize| 0.5;
        let chart = parse(&grammar, start, &["a"], Some(&hook)).unwrap();
        assert_eq!(start_inner_sum(&chart, "S", 1), 0.5);
    }

    #[test]
    fn nan_scan_probability_passes_scores_through() {
        let grammar = Grammar::builder()
            .rule(nt("S"), [Terminal::exact("a").into()])
            .build()
            .unwrap();
        let start = grammar.nonterminal_id(&nt("S")).unwrap();
        let hook = |_position: usize| f64::NAN;
        let chart = parse(&grammar, start, &["a"], Some(&hook)).unwrap();
        assert_eq!(start_inner_sum(&chart, "S", 1), 1.0);
    }

    #[test]
    fn predecessor_advanced_over_completion_exists() {
        // Invariant: completing Y over span j..i advances every state
        // active on Y at j into the chart at i.
        let grammar = Grammar::builder()
            .rule(nt("S"), [nt("A").into(), nt("A").into()])
            .weighted_rule(1.0, nt("A"), [Terminal::exact("a").into()])
            .build()
            .unwrap();
        let chart = parse_chart(&grammar, "S", &["a", "a"]);
        let s_rule = 0;
        let mid = chart.id_of(&State {
            rule: s_rule.into(),
            rule_start: 0,
            dot: 1,
            position: 1,
        });
        assert!(mid.is_some());
        let full = chart.id_of(&State {
            rule: s_rule.into(),
            rule_start: 0,
            dot: 2,
            position: 2,
        });
        assert!(full.is_some());
    }
}
