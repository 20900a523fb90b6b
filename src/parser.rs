use crate::category::NonTerminal;
use crate::earley::{self, chart::Chart, trees};
use crate::error::Error;
use crate::grammar::{Grammar, NonTerminalId};
use crate::parse_tree::ParseTree;
use crate::semiring::Semiring;

/// A reusable parser over a built [`Grammar`].
///
/// Each call runs one complete parse; the chart lives only for the call, so
/// a parser may be used for any number of inputs. Distinct grammars can be
/// parsed from distinct threads; a single chart is never shared.
///
/// # Example
///
/// ```rust
/// use pcfg::{Grammar, NonTerminal, Parser, Terminal};
///
/// let s = NonTerminal::new("S");
/// let grammar = Grammar::builder()
///     .rule(s.clone(), [Terminal::exact("hello").into(), Terminal::exact("world").into()])
///     .build()?;
///
/// let parser = Parser::new(&grammar);
/// assert!(parser.recognize(&s, &["hello", "world"])?);
/// assert!(!parser.recognize(&s, &["hello", "earley"])?);
/// # Ok::<(), pcfg::Error>(())
/// ```
pub struct Parser<'gram> {
    grammar: &'gram Grammar,
    scan_probability: Option<Box<dyn Fn(usize) -> f64 + 'gram>>,
}

/// The best derivation found by [`Parser::viterbi_parse`], with its score.
#[derive(Debug, Clone, PartialEq)]
pub struct ViterbiParse<'gram> {
    tree: ParseTree<'gram>,
    score: f64,
    semiring: Semiring,
}

impl<'gram> ViterbiParse<'gram> {
    pub fn tree(&self) -> &ParseTree<'gram> {
        &self.tree
    }

    pub fn into_tree(self) -> ParseTree<'gram> {
        self.tree
    }

    /// The derivation's score under the grammar's semiring.
    pub fn score(&self) -> f64 {
        self.score
    }

    /// The derivation's probability.
    pub fn probability(&self) -> f64 {
        self.semiring.to_probability(self.score)
    }
}

impl<'gram> Parser<'gram> {
    pub fn new(grammar: &'gram Grammar) -> Self {
        Self {
            grammar,
            scan_probability: None,
        }
    }

    /// Install a per-token confidence hook. The hook maps a token position
    /// to a semiring value that scales the scores of everything scanned
    /// there; returning NaN leaves the position unscaled.
    pub fn with_scan_probability<F>(mut self, hook: F) -> Self
    where
        F: Fn(usize) -> f64 + 'gram,
    {
        self.scan_probability = Some(Box::new(hook));
        self
    }

    pub fn grammar(&self) -> &'gram Grammar {
        self.grammar
    }

    /// Whether the grammar derives `tokens` from `start`. A token no
    /// terminal accounts for makes this `false` rather than an error.
    pub fn recognize(&self, start: &NonTerminal, tokens: &[&str]) -> Result<bool, Error> {
        match self.chart(start, tokens) {
            Ok((chart, start_id)) => Ok(!chart
                .completed_start_states(start_id, tokens.len())
                .is_empty()),
            Err(Error::UnexpectedToken { .. }) => Ok(false),
            Err(error) => Err(error),
        }
    }

    /// The total score the grammar assigns to `tokens` from `start`: the
    /// ⊕-sum over all derivations, under the grammar's semiring. 0̄ when
    /// the input is not derivable.
    pub fn parse_score(&self, start: &NonTerminal, tokens: &[&str]) -> Result<f64, Error> {
        let (chart, start_id) = self.chart(start, tokens)?;
        let semiring = self.grammar.semiring();
        Ok(chart
            .completed_start_states(start_id, tokens.len())
            .into_iter()
            .fold(semiring.zero(), |sum, state| {
                semiring.plus(sum, chart.inner(state))
            }))
    }

    /// [`Parser::parse_score`] decoded into a probability in `[0, 1]`.
    pub fn probability(&self, start: &NonTerminal, tokens: &[&str]) -> Result<f64, Error> {
        let score = self.parse_score(start, tokens)?;
        Ok(self.grammar.semiring().to_probability(score))
    }

    /// The single highest-probability derivation and its score, or `None`
    /// when the input is not derivable from `start`.
    pub fn viterbi_parse<'a>(
        &'a self,
        start: &NonTerminal,
        tokens: &[&'a str],
    ) -> Result<Option<ViterbiParse<'a>>, Error> {
        let (chart, start_id) = self.chart(start, tokens)?;
        let semiring = self.grammar.semiring();

        let mut best: Option<(earley::chart::StateId, f64)> = None;
        for state in chart.completed_start_states(start_id, tokens.len()) {
            let Some(viterbi) = chart.viterbi(state) else {
                continue;
            };
            let better = match best {
                None => true,
                Some((_, score)) => semiring.is_better(viterbi.score, score),
            };
            if better {
                best = Some((state, viterbi.score));
            }
        }

        Ok(best.map(|(state, score)| ViterbiParse {
            tree: trees::viterbi_tree(&chart, tokens, state),
            score,
            semiring,
        }))
    }

    /// Every parse tree for `tokens` from `start`. May be exponentially
    /// large in the input length; derivations cycling through unit
    /// productions are cut after their acyclic part.
    pub fn parses<'a>(
        &'a self,
        start: &NonTerminal,
        tokens: &[&'a str],
    ) -> Result<Vec<ParseTree<'a>>, Error> {
        let (chart, start_id) = self.chart(start, tokens)?;
        Ok(trees::all_trees(&chart, tokens, start_id, 0, tokens.len()))
    }

    fn chart(
        &self,
        start: &NonTerminal,
        tokens: &[&str],
    ) -> Result<(Chart<'gram>, NonTerminalId), Error> {
        let start_id = self.grammar.nonterminal_id(start).ok_or_else(|| {
            Error::IllegalGrammar(format!("start symbol '{start}' does not occur in the grammar"))
        })?;
        let chart = earley::parse(
            self.grammar,
            start_id,
            tokens,
            self.scan_probability.as_deref(),
        )?;
        Ok((chart, start_id))
    }
}
