use pcfg::{Category, Grammar, NonTerminal, Semiring, Terminal};

#[cfg(feature = "tracing")]
pub fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*};
    let filter_layer = tracing_subscriber::EnvFilter::from_default_env();
    let fmt_layer = fmt::Layer::default();
    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}

#[cfg(not(feature = "tracing"))]
pub fn init_tracing() {}

fn nt(name: &str) -> Category {
    NonTerminal::new(name).into()
}

fn t(text: &str) -> Category {
    Terminal::exact(text).into()
}

/// The ambiguous "he saw her duck" grammar.
pub fn sentence_grammar(semiring: Semiring) -> Grammar {
    Grammar::builder()
        .semiring(semiring)
        .rule(NonTerminal::new("S"), [nt("NP"), nt("VP")])
        .weighted_rule(0.5, NonTerminal::new("NP"), [t("he")])
        .weighted_rule(0.25, NonTerminal::new("NP"), [t("her")])
        .weighted_rule(0.25, NonTerminal::new("NP"), [nt("Det"), nt("N")])
        .weighted_rule(0.5, NonTerminal::new("VP"), [nt("VT"), nt("NP")])
        .weighted_rule(0.25, NonTerminal::new("VP"), [nt("VS"), nt("S")])
        .weighted_rule(0.25, NonTerminal::new("VP"), [nt("VI")])
        .rule(NonTerminal::new("VT"), [t("saw")])
        .rule(NonTerminal::new("VS"), [t("saw")])
        .rule(NonTerminal::new("VI"), [t("duck")])
        .rule(NonTerminal::new("N"), [t("duck")])
        .rule(NonTerminal::new("Det"), [t("her")])
        .build()
        .unwrap()
}

/// Right-recursive digit-string grammar; input length is the interesting
/// variable.
pub fn digits_grammar() -> Grammar {
    let mut builder = Grammar::builder()
        .weighted_rule(0.5, NonTerminal::new("number"), [nt("digit")])
        .weighted_rule(0.5, NonTerminal::new("number"), [nt("digit"), nt("number")]);
    for digit in 0..10 {
        builder = builder.weighted_rule(0.1, NonTerminal::new("digit"), [t(&digit.to_string())]);
    }
    builder.build().unwrap()
}

pub fn digit_tokens(length: usize) -> Vec<String> {
    (0..length).map(|index| ((index * 7) % 10).to_string()).collect()
}
