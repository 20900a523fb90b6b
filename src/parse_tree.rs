use std::fmt;

#[cfg(feature = "serde")]
use serde::Serialize;

use crate::category::{NonTerminal, Terminal};

/// A derivation of some span of the input from a non-terminal.
///
/// Trees compare structurally: equal category and equal ordered children.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct ParseTree<'gram> {
    lhs: &'gram NonTerminal,
    children: Vec<ParseTreeNode<'gram>>,
}

/// One child of a [`ParseTree`]: a scanned terminal (with the token it
/// matched, or nothing for an empty terminal) or a nested sub-derivation.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum ParseTreeNode<'gram> {
    Terminal {
        terminal: &'gram Terminal,
        token: Option<&'gram str>,
    },
    Nonterminal(ParseTree<'gram>),
}

impl<'gram> ParseTree<'gram> {
    pub(crate) fn new(lhs: &'gram NonTerminal, children: Vec<ParseTreeNode<'gram>>) -> Self {
        Self { lhs, children }
    }

    /// The non-terminal this tree derives from.
    pub fn lhs(&self) -> &'gram NonTerminal {
        self.lhs
    }

    pub fn children(&self) -> &[ParseTreeNode<'gram>] {
        &self.children
    }

    /// The scanned tokens at this tree's leaves, left to right.
    pub fn tokens(&self) -> Vec<&'gram str> {
        let mut tokens = Vec::new();
        self.collect_tokens(&mut tokens);
        tokens
    }

    fn collect_tokens(&self, tokens: &mut Vec<&'gram str>) {
        for child in &self.children {
            match child {
                ParseTreeNode::Terminal {
                    token: Some(token), ..
                } => tokens.push(token),
                ParseTreeNode::Terminal { token: None, .. } => {}
                ParseTreeNode::Nonterminal(subtree) => subtree.collect_tokens(tokens),
            }
        }
    }

    fn fmt_at(&self, f: &mut fmt::Formatter<'_>, prefix: &str) -> fmt::Result {
        writeln!(f, "{}", self.lhs)?;
        let last = self.children.len().saturating_sub(1);
        for (index, child) in self.children.iter().enumerate() {
            let (tee, bar) = if index == last {
                ("└── ", "    ")
            } else {
                ("├── ", "│   ")
            };
            write!(f, "{prefix}{tee}")?;
            match child {
                ParseTreeNode::Terminal {
                    token: Some(token), ..
                } => writeln!(f, "'{token}'")?,
                ParseTreeNode::Terminal { terminal, token: None } => writeln!(f, "{terminal}")?,
                ParseTreeNode::Nonterminal(subtree) => {
                    subtree.fmt_at(f, &format!("{prefix}{bar}"))?;
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for ParseTree<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_at(f, "")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf<'gram>(terminal: &'gram Terminal, token: &'gram str) -> ParseTreeNode<'gram> {
        ParseTreeNode::Terminal {
            terminal,
            token: Some(token),
        }
    }

    #[test]
    fn equality_is_structural() {
        let np = NonTerminal::new("NP");
        let he = Terminal::exact("he");
        let her = Terminal::exact("her");

        let a = ParseTree::new(&np, vec![leaf(&he, "he")]);
        let b = ParseTree::new(&np, vec![leaf(&he, "he")]);
        let c = ParseTree::new(&np, vec![leaf(&her, "her")]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn equality_respects_child_order() {
        let s = NonTerminal::new("S");
        let a = Terminal::exact("a");
        let b = Terminal::exact("b");

        let left = ParseTree::new(&s, vec![leaf(&a, "a"), leaf(&b, "b")]);
        let right = ParseTree::new(&s, vec![leaf(&b, "b"), leaf(&a, "a")]);
        assert_ne!(left, right);
    }

    #[test]
    fn tokens_are_collected_in_order() {
        let s = NonTerminal::new("S");
        let np = NonTerminal::new("NP");
        let he = Terminal::exact("he");
        let saw = Terminal::exact("saw");

        let tree = ParseTree::new(
            &s,
            vec![
                ParseTreeNode::Nonterminal(ParseTree::new(&np, vec![leaf(&he, "he")])),
                leaf(&saw, "saw"),
            ],
        );
        assert_eq!(tree.tokens(), vec!["he", "saw"]);
    }

    #[test]
    fn display_draws_the_tree() {
        let s = NonTerminal::new("S");
        let np = NonTerminal::new("NP");
        let he = Terminal::exact("he");
        let saw = Terminal::exact("saw");

        let tree = ParseTree::new(
            &s,
            vec![
                ParseTreeNode::Nonterminal(ParseTree::new(&np, vec![leaf(&he, "he")])),
                leaf(&saw, "saw"),
            ],
        );
        let rendered = tree.to_string();
        let expected = "\
S
├── NP
│   └── 'he'
└── 'saw'
";
        assert_eq!(rendered, expected);
    }
}
