//! Recovering parse trees from a filled chart: the single best tree by
//! following Viterbi back-pointers, and the exhaustive set for a
//! (category, span) pair by walking passive states.

use rustc_hash::FxHashSet;

use super::chart::{Chart, State, StateId, ViterbiOrigin};
use crate::grammar::{NonTerminalId, Symbol};
use crate::parse_tree::{ParseTree, ParseTreeNode};

const STACK_RED_ZONE: usize = 64 * 1024;
const STACK_GROWTH: usize = 1024 * 1024;

/// Rebuild the derivation a passive state's Viterbi score stands for.
///
/// Each back-pointer couples the completed child with the resulting state;
/// walking the dotted rule right to left yields the children in reverse.
pub(crate) fn viterbi_tree<'gram>(
    chart: &Chart<'gram>,
    tokens: &[&'gram str],
    state: StateId,
) -> ParseTree<'gram> {
    let grammar = chart.grammar();
    let rule = chart.state(state).rule;
    let rhs = grammar.rule_rhs(rule);

    let mut children = Vec::new();
    let mut current = state;
    loop {
        let at = chart.state(current);
        if at.dot == 0 {
            break;
        }
        let viterbi = chart
            .viterbi(current)
            .expect("every state on the best path has a Viterbi score, this is a bug");
        let predecessor_position = match viterbi.origin {
            ViterbiOrigin::Start => {
                unreachable!("start origin only occurs at dot position zero")
            }
            ViterbiOrigin::Scan => {
                let Symbol::Terminal(terminal) = rhs[at.dot - 1] else {
                    unreachable!("scan advanced the dot over a terminal");
                };
                children.push(ParseTreeNode::Terminal {
                    terminal: grammar.terminal(terminal),
                    token: Some(tokens[at.position - 1]),
                });
                at.position - 1
            }
            ViterbiOrigin::Empty => {
                let Symbol::Terminal(terminal) = rhs[at.dot - 1] else {
                    unreachable!("an empty advance steps over a terminal");
                };
                children.push(ParseTreeNode::Terminal {
                    terminal: grammar.terminal(terminal),
                    token: None,
                });
                at.position
            }
            ViterbiOrigin::Complete(completed) => {
                let subtree = stacker::maybe_grow(STACK_RED_ZONE, STACK_GROWTH, || {
                    viterbi_tree(chart, tokens, completed)
                });
                children.push(ParseTreeNode::Nonterminal(subtree));
                chart.state(completed).rule_start
            }
        };
        current = chart
            .id_of(&State {
                rule: at.rule,
                rule_start: at.rule_start,
                dot: at.dot - 1,
                position: predecessor_position,
            })
            .expect("the predecessor of an advanced state is in the chart, this is a bug");
    }

    children.reverse();
    ParseTree::new(grammar.nonterminal(grammar.rule_lhs(rule)), children)
}

/// Every parse tree deriving `tokens[start..end]` from `category` that the
/// chart licenses. Derivations that re-enter a (category, span) pair still
/// being expanded are cut, so unit cycles contribute their finite acyclic
/// tree set rather than an endless family.
pub(crate) fn all_trees<'gram>(
    chart: &Chart<'gram>,
    tokens: &[&'gram str],
    category: NonTerminalId,
    start: usize,
    end: usize,
) -> Vec<ParseTree<'gram>> {
    let mut in_progress = FxHashSet::default();
    trees_for(chart, tokens, category, start, end, &mut in_progress)
}

fn trees_for<'gram>(
    chart: &Chart<'gram>,
    tokens: &[&'gram str],
    category: NonTerminalId,
    start: usize,
    end: usize,
    in_progress: &mut FxHashSet<(NonTerminalId, usize, usize)>,
) -> Vec<ParseTree<'gram>> {
    if !in_progress.insert((category, start, end)) {
        return Vec::new();
    }

    let grammar = chart.grammar();
    let mut trees = Vec::new();
    for &passive in chart.completed(end) {
        let state = chart.state(passive);
        if state.rule_start != start || grammar.rule_lhs(state.rule) != category {
            continue;
        }
        let rhs = grammar.rule_rhs(state.rule);
        let lhs = grammar.nonterminal(grammar.rule_lhs(state.rule));
        for children in factorizations(chart, tokens, rhs, start, end, in_progress) {
            trees.push(ParseTree::new(lhs, children));
        }
    }

    in_progress.remove(&(category, start, end));
    trees
}

/// All ways to spread `symbols` over `tokens[from..to]` consistent with the
/// chart: terminals must match the token at their position (empty terminals
/// consume nothing), non-terminal spans must have a passive state.
fn factorizations<'gram>(
    chart: &Chart<'gram>,
    tokens: &[&'gram str],
    symbols: &[Symbol],
    from: usize,
    to: usize,
    in_progress: &mut FxHashSet<(NonTerminalId, usize, usize)>,
) -> Vec<Vec<ParseTreeNode<'gram>>> {
    stacker::maybe_grow(STACK_RED_ZONE, STACK_GROWTH, || {
        let grammar = chart.grammar();
        let Some((&first, rest)) = symbols.split_first() else {
            return if from == to { vec![Vec::new()] } else { Vec::new() };
        };

        match first {
            Symbol::Terminal(id) => {
                let terminal = grammar.terminal(id);
                if terminal.is_empty() {
                    let mut results = factorizations(chart, tokens, rest, from, to, in_progress);
                    for children in &mut results {
                        children.insert(
                            0,
                            ParseTreeNode::Terminal {
                                terminal,
                                token: None,
                            },
                        );
                    }
                    results
                } else if from < to && terminal.matches(tokens[from]) {
                    let mut results =
                        factorizations(chart, tokens, rest, from + 1, to, in_progress);
                    for children in &mut results {
                        children.insert(
                            0,
                            ParseTreeNode::Terminal {
                                terminal,
                                token: Some(tokens[from]),
                            },
                        );
                    }
                    results
                } else {
                    Vec::new()
                }
            }
            Symbol::Nonterminal(category) => {
                let mut results = Vec::new();
                for mid in from..=to {
                    let subtrees = trees_for(chart, tokens, category, from, mid, in_progress);
                    if subtrees.is_empty() {
                        continue;
                    }
                    let rests = factorizations(chart, tokens, rest, mid, to, in_progress);
                    for subtree in &subtrees {
                        for tail in &rests {
                            let mut children = Vec::with_capacity(tail.len() + 1);
                            children.push(ParseTreeNode::Nonterminal(subtree.clone()));
                            children.extend(tail.iter().cloned());
                            results.push(children);
                        }
                    }
                }
                results
            }
        }
    })
}
