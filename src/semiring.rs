use std::fmt;

#[cfg(feature = "serde")]
use serde::Serialize;

/// The score algebra a grammar computes with. Every score in the parser
/// (rule probabilities, forward/inner/Viterbi values, closure entries) is an
/// `f64` carrier interpreted under one of these algebras.
///
/// | variant | ⊕ | ⊗ | 0̄ | 1̄ | carrier |
/// |---|---|---|---|---|---|
/// | `Probability` | `+` | `×` | `0` | `1` | probability |
/// | `LogProbability` | log-sum-exp | `+` | `+∞` | `0` | −ln probability |
/// | `MaxProbability` | `max` | `×` | `0` | `1` | probability |
///
/// `LogProbability` is the numerically robust choice for long inputs;
/// `MaxProbability` makes the total parse score itself a Viterbi maximum.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum Semiring {
    #[default]
    Probability,
    LogProbability,
    MaxProbability,
}

impl Semiring {
    /// The ⊕ identity: the score of an impossible derivation.
    pub fn zero(self) -> f64 {
        match self {
            Semiring::Probability | Semiring::MaxProbability => 0.0,
            Semiring::LogProbability => f64::INFINITY,
        }
    }

    /// The ⊗ identity: the score of a certain derivation.
    pub fn one(self) -> f64 {
        match self {
            Semiring::Probability | Semiring::MaxProbability => 1.0,
            Semiring::LogProbability => 0.0,
        }
    }

    pub fn plus(self, a: f64, b: f64) -> f64 {
        match self {
            Semiring::Probability => a + b,
            Semiring::LogProbability => log_sum_exp(a, b),
            Semiring::MaxProbability => a.max(b),
        }
    }

    pub fn times(self, a: f64, b: f64) -> f64 {
        match self {
            Semiring::Probability | Semiring::MaxProbability => a * b,
            Semiring::LogProbability => a + b,
        }
    }

    /// Encode a probability in `[0, 1]` as a carrier value.
    pub fn from_probability(self, p: f64) -> f64 {
        match self {
            Semiring::Probability | Semiring::MaxProbability => p,
            Semiring::LogProbability => -p.ln(),
        }
    }

    /// Decode a carrier value back into a probability.
    pub fn to_probability(self, score: f64) -> f64 {
        match self {
            Semiring::Probability | Semiring::MaxProbability => score,
            Semiring::LogProbability => (-score).exp(),
        }
    }

    /// Whether `a` is a strictly more probable score than `b`.
    pub fn is_better(self, a: f64, b: f64) -> bool {
        match self {
            Semiring::Probability | Semiring::MaxProbability => a > b,
            Semiring::LogProbability => a < b,
        }
    }
}

impl fmt::Display for Semiring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Semiring::Probability => write!(f, "probability"),
            Semiring::LogProbability => write!(f, "log-probability"),
            Semiring::MaxProbability => write!(f, "max-probability"),
        }
    }
}

/// −ln(e^−a + e^−b) without leaving log space. The smaller operand (the more
/// probable one) is factored out so the `exp` argument stays non-positive and
/// `ln_1p` sees a value in `(0, 1]`.
fn log_sum_exp(a: f64, b: f64) -> f64 {
    if a == f64::INFINITY {
        return b;
    }
    if b == f64::INFINITY {
        return a;
    }
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    lo - (lo - hi).exp().ln_1p()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-12;

    #[test]
    fn probability_identities() {
        let sr = Semiring::Probability;
        assert_eq!(sr.plus(sr.zero(), 0.3), 0.3);
        assert_eq!(sr.times(sr.one(), 0.3), 0.3);
        assert_eq!(sr.times(sr.zero(), 0.3), 0.0);
    }

    #[test]
    fn log_round_trip() {
        let sr = Semiring::LogProbability;
        for p in [0.0, 1e-300, 0.25, 0.5, 1.0] {
            assert!((sr.to_probability(sr.from_probability(p)) - p).abs() <= TOLERANCE);
        }
    }

    #[test]
    fn log_plus_matches_probability_plus() {
        let sr = Semiring::LogProbability;
        let sum = sr.plus(sr.from_probability(0.25), sr.from_probability(0.5));
        assert!((sr.to_probability(sum) - 0.75).abs() <= TOLERANCE);
    }

    #[test]
    fn log_plus_with_zero() {
        let sr = Semiring::LogProbability;
        assert_eq!(sr.plus(sr.zero(), sr.from_probability(0.5)), sr.from_probability(0.5));
        assert_eq!(sr.plus(sr.from_probability(0.5), sr.zero()), sr.from_probability(0.5));
    }

    #[test]
    fn log_times_is_product() {
        let sr = Semiring::LogProbability;
        let product = sr.times(sr.from_probability(0.25), sr.from_probability(0.5));
        assert!((sr.to_probability(product) - 0.125).abs() <= TOLERANCE);
    }

    #[test]
    fn max_plus_takes_the_better_operand() {
        let sr = Semiring::MaxProbability;
        assert_eq!(sr.plus(0.25, 0.5), 0.5);
        assert_eq!(sr.times(0.25, 0.5), 0.125);
    }

    #[test]
    fn ordering_is_semiring_defined() {
        assert!(Semiring::Probability.is_better(0.5, 0.25));
        assert!(Semiring::MaxProbability.is_better(0.5, 0.25));
        // log carrier: smaller is more probable
        let sr = Semiring::LogProbability;
        assert!(sr.is_better(sr.from_probability(0.5), sr.from_probability(0.25)));
    }
}
