//! `pcfg`, a probabilistic Earley parser for context-free grammars.
//!
//! Build a grammar programmatically, then ask for any of three things about
//! a token sequence:
//!
//! - the **total likelihood** the grammar assigns to it, summed over every
//!   derivation ([`Parser::parse_score`], [`Parser::probability`]);
//! - the **single best derivation** with its score, recovered from Viterbi
//!   back-pointers ([`Parser::viterbi_parse`]);
//! - **all parse trees** the grammar licenses ([`Parser::parses`]).
//!
//! Scores are computed under a configurable [`Semiring`] (plain
//! probabilities, negative-log space, or max-probability). Recursive and
//! cyclic rules are handled analytically: the grammar precomputes the
//! left-corner and unit-production closures, so a rule like `A → A [0.5]`
//! contributes its full geometric series without the chart ever growing.
//!
//! ## Example
//!
//! ```rust
//! use pcfg::{Grammar, NonTerminal, Parser, Terminal};
//!
//! let s = NonTerminal::new("S");
//! let np = NonTerminal::new("NP");
//! let vp = NonTerminal::new("VP");
//!
//! let grammar = Grammar::builder()
//!     .rule(s.clone(), [np.clone().into(), vp.clone().into()])
//!     .weighted_rule(0.5, np.clone(), [Terminal::exact("he").into()])
//!     .weighted_rule(0.5, np.clone(), [Terminal::exact("her").into()])
//!     .rule(vp.clone(), [Terminal::exact("left").into()])
//!     .build()?;
//!
//! let parser = Parser::new(&grammar);
//! assert!(parser.recognize(&s, &["he", "left"])?);
//! assert_eq!(parser.probability(&s, &["he", "left"])?, 0.5);
//!
//! let best = parser.viterbi_parse(&s, &["he", "left"])?.unwrap();
//! assert_eq!(best.score(), 0.5);
//! println!("{}", best.tree());
//! # Ok::<(), pcfg::Error>(())
//! ```
//!
//! Tokenization is not this crate's business: input is any ordered sequence
//! of `&str` tokens, and a [`Terminal`] decides by predicate whether a
//! token belongs to it. Grammar text parsing is likewise out of scope; see
//! [`GrammarBuilder`] for the programmatic API.

mod arena;
mod category;
mod closure;
mod earley;
mod error;
mod grammar;
mod parse_tree;
mod parser;
mod rule;
mod semiring;
mod tracing;

pub use crate::category::{Category, NonTerminal, Terminal, TokenMatcher};
pub use crate::error::Error;
pub use crate::grammar::{Grammar, GrammarBuilder};
pub use crate::parse_tree::{ParseTree, ParseTreeNode};
pub use crate::parser::{Parser, ViterbiParse};
pub use crate::rule::Rule;
pub use crate::semiring::Semiring;
