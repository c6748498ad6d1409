//! Textual placement policy grammar.
//!
//! Policies round-trip through a small statement language:
//!
//! ```text
//! REP 2 IN SpbCopies
//! EC 3/1
//! CBF 2
//! SELECT 2 IN SAME City FROM SpbSSD AS SpbCopies
//! FILTER City EQ 'Saint-Petersburg' AND SSD EQ '1' AS SpbSSD
//! ```
//!
//! Parsing is provided through [`FromStr`] and the canonical encoding
//! through [`Display`](std::fmt::Display) on
//! [`PlacementPolicy`]; parsing the encoded form yields an equal policy.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::policy::{
    Clause, EcRule, Filter, Op, PlacementPolicy, ReplicaDescriptor, Selector,
};

/// Errors raised while parsing a textual placement policy.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// The input ended in the middle of a statement.
    #[error("unexpected end of policy")]
    UnexpectedEof,

    /// A token other than the expected one was found.
    #[error("expected {expected}, got '{got}'")]
    Unexpected {
        /// Description of what the grammar required here.
        expected: String,
        /// The offending token text.
        got: String,
    },

    /// A count did not parse as an unsigned 32-bit integer.
    #[error("invalid number: '{0}'")]
    InvalidNumber(String),

    /// A statement began with an unknown keyword.
    #[error("unknown statement: '{0}'")]
    UnknownStatement(String),

    /// A quoted string was never closed.
    #[error("unterminated string literal")]
    UnterminatedString,

    /// The policy declares neither replicas nor EC rules.
    #[error("policy must declare at least one REP or EC statement")]
    MissingReplicas,
}

const KEYWORDS: &[&str] = &[
    "REP", "EC", "CBF", "SELECT", "IN", "FROM", "AS", "FILTER", "SAME", "DISTINCT", "AND",
    "OR", "EQ", "NE", "GT", "GE", "LT", "LE",
];

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':' | '*')
}

fn is_keyword(s: &str) -> bool {
    KEYWORDS.contains(&s)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    /// Quoted literal; never matches a keyword.
    Str(String),
    LParen,
    RParen,
    At,
    Slash,
}

impl Token {
    fn text(&self) -> String {
        match self {
            Self::Word(w) => w.clone(),
            Self::Str(s) => format!("'{s}'"),
            Self::LParen => "(".to_string(),
            Self::RParen => ")".to_string(),
            Self::At => "@".to_string(),
            Self::Slash => "/".to_string(),
        }
    }
}

fn lex(input: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            _ if c.is_whitespace() || c == ',' => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '@' => {
                chars.next();
                tokens.push(Token::At);
            }
            '/' => {
                chars.next();
                tokens.push(Token::Slash);
            }
            '\'' | '"' => {
                let quote = c;
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some(c) if c == quote => break,
                        Some(c) => s.push(c),
                        None => return Err(ParseError::UnterminatedString),
                    }
                }
                tokens.push(Token::Str(s));
            }
            _ if is_word_char(c) => {
                let mut w = String::new();
                while let Some(&c) = chars.peek() {
                    if !is_word_char(c) {
                        break;
                    }
                    w.push(c);
                    chars.next();
                }
                tokens.push(Token::Word(w));
            }
            _ => {
                return Err(ParseError::Unexpected {
                    expected: "a statement keyword".to_string(),
                    got: c.to_string(),
                })
            }
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Result<Token, ParseError> {
        let t = self.tokens.get(self.pos).cloned().ok_or(ParseError::UnexpectedEof)?;
        self.pos += 1;
        Ok(t)
    }

    /// Consumes the next token when it is the given keyword.
    fn eat_word(&mut self, word: &str) -> bool {
        if matches!(self.peek(), Some(Token::Word(w)) if w == word) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_word(&mut self, word: &str) -> Result<(), ParseError> {
        match self.next()? {
            Token::Word(w) if w == word => Ok(()),
            t => Err(ParseError::Unexpected { expected: format!("'{word}'"), got: t.text() }),
        }
    }

    /// An identifier or quoted literal.
    fn name(&mut self, expected: &str) -> Result<String, ParseError> {
        match self.next()? {
            Token::Word(w) => Ok(w),
            Token::Str(s) => Ok(s),
            t => {
                Err(ParseError::Unexpected { expected: expected.to_string(), got: t.text() })
            }
        }
    }

    fn number(&mut self) -> Result<u32, ParseError> {
        let text = self.name("a number")?;
        text.parse().map_err(|_| ParseError::InvalidNumber(text))
    }

    fn policy(&mut self) -> Result<PlacementPolicy, ParseError> {
        let mut policy = PlacementPolicy::new();
        while let Some(token) = self.peek() {
            let keyword = match token {
                Token::Word(w) => w.clone(),
                t => {
                    return Err(ParseError::Unexpected {
                        expected: "a statement keyword".to_string(),
                        got: t.text(),
                    })
                }
            };
            self.pos += 1;
            match keyword.as_str() {
                "REP" => {
                    let count = self.number()?;
                    let mut replica = ReplicaDescriptor::new(count);
                    if self.eat_word("IN") {
                        replica = replica.in_selector(self.name("a selector name")?);
                    }
                    policy = policy.with_replica(replica);
                }
                "EC" => {
                    let data = self.number()?;
                    match self.next()? {
                        Token::Slash => {}
                        t => {
                            return Err(ParseError::Unexpected {
                                expected: "'/'".to_string(),
                                got: t.text(),
                            })
                        }
                    }
                    let parity = self.number()?;
                    let mut rule = EcRule::new(data, parity);
                    if self.eat_word("IN") {
                        rule = rule.in_selector(self.name("a selector name")?);
                    }
                    policy = policy.with_ec_rule(rule);
                }
                "CBF" => {
                    policy = policy.with_backup_factor(self.number()?);
                }
                "SELECT" => {
                    let mut selector = Selector::new(self.number()?);
                    if self.eat_word("IN") {
                        if self.eat_word("SAME") {
                            selector = selector.with_clause(Clause::Same);
                        } else if self.eat_word("DISTINCT") {
                            selector = selector.with_clause(Clause::Distinct);
                        }
                        selector = selector.with_attribute(self.name("an attribute")?);
                    }
                    self.expect_word("FROM")?;
                    selector = selector.from_filter(self.name("a filter name")?);
                    if self.eat_word("AS") {
                        selector = selector.named(self.name("a selector name")?);
                    }
                    policy = policy.with_selector(selector);
                }
                "FILTER" => {
                    let filter = self.expr()?;
                    self.expect_word("AS")?;
                    policy = policy.with_filter(filter.named(self.name("a filter name")?));
                }
                other => return Err(ParseError::UnknownStatement(other.to_string())),
            }
        }

        if policy.replicas().is_empty() && policy.ec_rules().is_empty() {
            return Err(ParseError::MissingReplicas);
        }
        Ok(policy)
    }

    /// `expr := and_expr (OR and_expr)*`, n-ary.
    fn expr(&mut self) -> Result<Filter, ParseError> {
        let mut terms = vec![self.and_expr()?];
        while self.eat_word("OR") {
            terms.push(self.and_expr()?);
        }
        Ok(match terms.len() {
            1 => terms.remove(0),
            _ => Filter::or(terms),
        })
    }

    /// `and_expr := term (AND term)*`, n-ary.
    fn and_expr(&mut self) -> Result<Filter, ParseError> {
        let mut terms = vec![self.term()?];
        while self.eat_word("AND") {
            terms.push(self.term()?);
        }
        Ok(match terms.len() {
            1 => terms.remove(0),
            _ => Filter::and(terms),
        })
    }

    /// `term := '(' expr ')' | '@' name | key OP value`
    fn term(&mut self) -> Result<Filter, ParseError> {
        match self.peek() {
            Some(Token::LParen) => {
                self.pos += 1;
                let inner = self.expr()?;
                match self.next()? {
                    Token::RParen => Ok(inner),
                    t => Err(ParseError::Unexpected {
                        expected: "')'".to_string(),
                        got: t.text(),
                    }),
                }
            }
            Some(Token::At) => {
                self.pos += 1;
                Ok(Filter::reference(self.name("a filter name")?))
            }
            _ => {
                let key = self.name("an attribute key")?;
                let op = self.name("a comparison operation")?;
                let value = self.name("a comparison value")?;
                let build = match op.as_str() {
                    "EQ" => Filter::eq,
                    "NE" => Filter::ne,
                    "GT" => Filter::gt,
                    "GE" => Filter::ge,
                    "LT" => Filter::lt,
                    "LE" => Filter::le,
                    _ => {
                        return Err(ParseError::Unexpected {
                            expected: "a comparison operation".to_string(),
                            got: op,
                        })
                    }
                };
                Ok(build(key, value))
            }
        }
    }
}

impl FromStr for PlacementPolicy {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Parser { tokens: lex(s)?, pos: 0 }.policy()
    }
}

/// Quotes a token for the canonical encoding when it would not survive
/// re-lexing as a bare word.
fn quoted(s: &str) -> String {
    if s.is_empty() || is_keyword(s) || !s.chars().all(is_word_char) {
        format!("'{s}'")
    } else {
        s.to_string()
    }
}

fn write_expr(out: &mut fmt::Formatter<'_>, filter: &Filter, top: bool) -> fmt::Result {
    if !top && !filter.name().is_empty() {
        return write!(out, "@{}", filter.name());
    }
    match filter.op() {
        Op::And | Op::Or => {
            let joint = if filter.op() == Op::And { " AND " } else { " OR " };
            if !top {
                write!(out, "(")?;
            }
            for (i, sub) in filter.sub_filters().iter().enumerate() {
                if i > 0 {
                    write!(out, "{joint}")?;
                }
                write_expr(out, sub, false)?;
            }
            if !top {
                write!(out, ")")?;
            }
            Ok(())
        }
        op => write!(out, "{} {} {}", quoted(filter.key()), op, quoted(filter.value())),
    }
}

impl fmt::Display for PlacementPolicy {
    /// Canonical statement-per-line encoding; parsing it yields an equal
    /// policy.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        let mut line = |f: &mut fmt::Formatter<'_>| {
            if first {
                first = false;
                Ok(())
            } else {
                writeln!(f)
            }
        };

        for replica in self.replicas() {
            line(f)?;
            write!(f, "REP {}", replica.count())?;
            if !replica.selector().is_empty() {
                write!(f, " IN {}", quoted(replica.selector()))?;
            }
        }
        for rule in self.ec_rules() {
            line(f)?;
            write!(f, "EC {}/{}", rule.data_parts(), rule.parity_parts())?;
            if !rule.selector().is_empty() {
                write!(f, " IN {}", quoted(rule.selector()))?;
            }
        }
        if self.backup_factor() != 0 {
            line(f)?;
            write!(f, "CBF {}", self.backup_factor())?;
        }
        for selector in self.selectors() {
            line(f)?;
            write!(f, "SELECT {}", selector.count())?;
            if !selector.attribute().is_empty() {
                let clause = match selector.clause() {
                    Clause::Same => "SAME ",
                    Clause::Distinct => "DISTINCT ",
                    Clause::Unspecified => "",
                };
                write!(f, " IN {clause}{}", quoted(selector.attribute()))?;
            }
            write!(f, " FROM {}", quoted(selector.filter_name()))?;
            if !selector.name().is_empty() {
                write!(f, " AS {}", quoted(selector.name()))?;
            }
        }
        for filter in self.filters() {
            line(f)?;
            write!(f, "FILTER ")?;
            write_expr(f, filter, true)?;
            write!(f, " AS {}", quoted(filter.name()))?;
        }
        Ok(())
    }
}
