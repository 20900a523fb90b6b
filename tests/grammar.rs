#![cfg(test)]

use pcfg::{Category, Error, Grammar, NonTerminal, Semiring, Terminal};

fn nt(name: &str) -> Category {
    NonTerminal::new(name).into()
}

fn t(text: &str) -> Category {
    Terminal::exact(text).into()
}

fn sym(name: &str) -> NonTerminal {
    NonTerminal::new(name)
}

#[test]
fn builder_collects_rules() {
    let grammar = Grammar::builder()
        .rule(sym("S"), [nt("A"), nt("B")])
        .weighted_rule(0.25, sym("A"), [t("a")])
        .weighted_rule(0.75, sym("A"), [t("b")])
        .rule(sym("B"), [t("c")])
        .build()
        .unwrap();

    assert_eq!(grammar.rules().count(), 4);
    let rules: Vec<String> = grammar.rules().map(|rule| rule.to_string()).collect();
    assert_eq!(rules[0], "S → A B (1.00)");
    assert_eq!(rules[1], "A → 'a' (0.25)");
}

#[test]
fn default_rule_probability_is_one() {
    let grammar = Grammar::builder()
        .rule(sym("S"), [t("a")])
        .build()
        .unwrap();
    let rule = grammar.rules().next().unwrap();
    assert_eq!(rule.probability(), 1.0);
    assert_eq!(rule.score(), 1.0);
}

#[test]
fn semiring_choice_encodes_rule_scores() {
    let grammar = Grammar::builder()
        .semiring(Semiring::LogProbability)
        .weighted_rule(0.5, sym("S"), [t("a")])
        .build()
        .unwrap();
    let rule = grammar.rules().next().unwrap();
    assert_eq!(rule.probability(), 0.5);
    assert!((rule.score() - 0.5f64.ln().abs()).abs() < 1e-12);
}

#[test]
fn empty_rhs_is_illegal() {
    let result = Grammar::builder().rule(sym("S"), []).build();
    assert!(matches!(result, Err(Error::IllegalGrammar(_))));
}

#[test]
fn out_of_range_probability_is_illegal() {
    let result = Grammar::builder()
        .weighted_rule(1.25, sym("S"), [t("a")])
        .build();
    assert!(matches!(result, Err(Error::IllegalGrammar(_))));
}

#[test]
fn left_star_closure_is_a_fixpoint() {
    // R_L* = I ⊕ L ⊗ R_L*, spot-checked against the hand-computed series:
    // S → S a [0.5] gives R_L*(S, S) = Σ 0.5ⁿ = 2
    let grammar = Grammar::builder()
        .weighted_rule(0.5, sym("S"), [nt("S"), t("a")])
        .weighted_rule(0.5, sym("S"), [t("a")])
        .build()
        .unwrap();
    assert!((grammar.left_star_score(&sym("S"), &sym("S")) - 2.0).abs() < 1e-9);
}

#[test]
fn unit_star_closure_collapses_chains() {
    // A → B [0.5], B → C [0.5]: R_U*(A, C) = 0.25, reflexive entries are 1
    let grammar = Grammar::builder()
        .weighted_rule(0.5, sym("A"), [nt("B")])
        .weighted_rule(0.5, sym("A"), [t("a")])
        .weighted_rule(0.5, sym("B"), [nt("C")])
        .weighted_rule(0.5, sym("B"), [t("b")])
        .rule(sym("C"), [t("c")])
        .build()
        .unwrap();

    assert_eq!(grammar.unit_star_score(&sym("A"), &sym("A")), 1.0);
    assert_eq!(grammar.unit_star_score(&sym("A"), &sym("B")), 0.5);
    assert_eq!(grammar.unit_star_score(&sym("A"), &sym("C")), 0.25);
    assert_eq!(grammar.unit_star_score(&sym("C"), &sym("A")), 0.0);

    // left-corner closure dominates the unit closure entry-wise: every
    // unit chain is also a leftmost chain
    for (x, y, score) in grammar.unit_star_entries() {
        assert!(grammar.left_star_score(x, y) >= score);
    }
}

#[test]
fn divergent_left_recursion_is_reported() {
    // S → S a [1]: the left-corner series 1 + 1 + … diverges even though
    // no unit production exists
    let result = Grammar::builder()
        .rule(sym("S"), [nt("S"), t("a")])
        .build();
    assert!(matches!(result, Err(Error::GrammarNotConvergent(_))));
}

#[test]
fn error_rules_are_classified() {
    let grammar = Grammar::builder()
        .weighted_rule(0.5, sym("S"), [t("a")])
        .weighted_rule(0.5, sym("S"), [NonTerminal::non_lexical().into(), nt("S")])
        .build()
        .unwrap();
    let flags: Vec<bool> = grammar.rules().map(|rule| rule.is_error_rule()).collect();
    assert_eq!(flags, vec![false, true]);
}

#[test]
fn grammar_is_shareable_across_threads() {
    let grammar = Grammar::builder()
        .weighted_rule(0.5, sym("S"), [t("a")])
        .weighted_rule(0.5, sym("S"), [nt("S"), t("a")])
        .build()
        .unwrap();

    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                let parser = pcfg::Parser::new(&grammar);
                let probability = parser
                    .probability(&sym("S"), &["a", "a", "a"])
                    .unwrap();
                assert!((probability - 0.125).abs() < 1e-9);
            });
        }
    });
}
