//! Grammar file parser.
//!
//! A grammar file is a list of cases. Each case rewrites one cost class into
//! `:`-separated alternatives and ends with the event guards of both trees:
//!
//! ```text
//! # both genes speciate; the adjacency is kept on both sides
//! c1(v1,v2) = c1(v1a,v2a) + c1(v1b,v2b) :
//!             c0(v1a,v2a) + c1(v1b,v2b) + B ; Spec ; Spec
//! ```
//!
//! A case continues on the next line while a line ends with `:` or `;`.
//! Lines starting with `#` are comments. Each alternative becomes one
//! [`Rule`]; they share the case's guard.
//!
//! ```rust
//! use adjtree_dp::parser::parse_grammar;
//!
//! let grammar = parse_grammar("c0(v1,v2) = 0 ; Extant ; Extant").unwrap();
//! assert_eq!(grammar.len(), 1);
//! ```

use crate::grammar::{CostAtom, CostClass, Destination, Grammar, GrammarError, Guard, Rule, Slot};
use crate::tree::{Event, UnknownEvent};
use std::iter::Peekable;
use std::str::{Chars, FromStr};
use thiserror::Error;

/// The DeCo adjacency grammar shipped with the crate.
pub const DECO_GRAMMAR: &str = include_str!("../grammars/deco.txt");

/// Parser error type.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("unexpected end of case")]
    UnexpectedEof,
    #[error("unexpected character: {0}")]
    UnexpectedChar(char),
    #[error("expected {expected}, found {found}")]
    Expected { expected: String, found: String },
    #[error("unknown slot `{0}`")]
    UnknownSlot(String),
    #[error("unknown cost atom `{0}`")]
    UnknownAtom(String),
    #[error(transparent)]
    Event(#[from] UnknownEvent),
    #[error(transparent)]
    Grammar(#[from] GrammarError),
    #[error("case {case} (line {line}): {source}")]
    InCase {
        case: usize,
        line: usize,
        source: Box<ParseError>,
    },
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(String),
    LParen,
    RParen,
    Comma,
    Plus,
    Colon,
    Semicolon,
    Equals,
    Eof,
}

struct Lexer<'a> {
    input: Peekable<Chars<'a>>,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Lexer {
            input: input.chars().peekable(),
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.input.peek().copied()
    }

    fn advance(&mut self) -> Option<char> {
        self.input.next()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.advance();
        }
    }

    fn read_while<F: Fn(char) -> bool>(&mut self, predicate: F) -> String {
        let mut result = String::new();
        while let Some(c) = self.peek() {
            if predicate(c) {
                result.push(c);
                self.advance();
            } else {
                break;
            }
        }
        result
    }

    fn next_token(&mut self) -> ParseResult<Token> {
        self.skip_whitespace();

        let Some(c) = self.peek() else {
            return Ok(Token::Eof);
        };
        let single = match c {
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            ',' => Some(Token::Comma),
            '+' => Some(Token::Plus),
            ':' => Some(Token::Colon),
            ';' => Some(Token::Semicolon),
            '=' => Some(Token::Equals),
            _ => None,
        };
        if let Some(token) = single {
            self.advance();
            return Ok(token);
        }
        match c {
            c if c.is_ascii_digit() => Ok(Token::Number(self.read_while(|c| c.is_ascii_digit()))),
            c if c.is_alphabetic() => Ok(Token::Ident(
                self.read_while(|c| c.is_alphanumeric() || c == '_'),
            )),
            c => Err(ParseError::UnexpectedChar(c)),
        }
    }
}

/// Parser for a single grammar case.
struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> ParseResult<Self> {
        let mut lexer = Lexer::new(input);
        let current = lexer.next_token()?;
        Ok(Parser { lexer, current })
    }

    fn advance(&mut self) -> ParseResult<Token> {
        let prev = std::mem::replace(&mut self.current, self.lexer.next_token()?);
        Ok(prev)
    }

    fn expect(&mut self, expected: Token) -> ParseResult<()> {
        if self.current == expected {
            self.advance()?;
            Ok(())
        } else if self.current == Token::Eof {
            Err(ParseError::UnexpectedEof)
        } else {
            Err(ParseError::Expected {
                expected: format!("{:?}", expected),
                found: format!("{:?}", self.current),
            })
        }
    }

    fn ident(&mut self, what: &str) -> ParseResult<String> {
        match self.advance()? {
            Token::Ident(name) => Ok(name),
            Token::Eof => Err(ParseError::UnexpectedEof),
            other => Err(ParseError::Expected {
                expected: what.to_string(),
                found: format!("{:?}", other),
            }),
        }
    }

    /// `c0`, `c1`, ... as a cost class; `None` for any other identifier.
    fn class_of(name: &str) -> Option<ParseResult<CostClass>> {
        let digits = name.strip_prefix('c')?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        Some(
            digits
                .parse::<usize>()
                .map_err(|_| GrammarError::DanglingClass(usize::MAX))
                .and_then(CostClass::from_index)
                .map_err(ParseError::from),
        )
    }

    fn parse_slot(&mut self, axis: u8) -> ParseResult<Slot> {
        let name = self.ident("slot")?;
        [Slot::Current, Slot::Left, Slot::Right]
            .into_iter()
            .find(|slot| slot.token(axis) == name)
            .ok_or(ParseError::UnknownSlot(name))
    }

    fn parse_slots(&mut self) -> ParseResult<(Slot, Slot)> {
        self.expect(Token::LParen)?;
        let slot1 = self.parse_slot(1)?;
        self.expect(Token::Comma)?;
        let slot2 = self.parse_slot(2)?;
        self.expect(Token::RParen)?;
        Ok((slot1, slot2))
    }

    fn parse_lhs(&mut self) -> ParseResult<CostClass> {
        let name = self.ident("cost class")?;
        let class = match Self::class_of(&name) {
            Some(class) => class?,
            None => {
                return Err(ParseError::Expected {
                    expected: "cost class".to_string(),
                    found: name,
                })
            }
        };
        if self.current == Token::LParen {
            let slots = self.parse_slots()?;
            if slots != (Slot::Current, Slot::Current) {
                return Err(ParseError::Expected {
                    expected: "(v1,v2)".to_string(),
                    found: format!("({},{})", slots.0.token(1), slots.1.token(2)),
                });
            }
        }
        Ok(class)
    }

    /// One `+`-joined alternative: destinations and cost atoms.
    fn parse_alternative(&mut self) -> ParseResult<(Vec<Destination>, Vec<CostAtom>)> {
        let mut destinations = Vec::new();
        let mut extra = Vec::new();
        loop {
            match self.advance()? {
                Token::Number(n) => {
                    extra.push(n.parse::<CostAtom>().map_err(ParseError::UnknownAtom)?)
                }
                Token::Ident(name) => match Self::class_of(&name) {
                    Some(class) => {
                        let class = class?;
                        let (slot1, slot2) = self.parse_slots()?;
                        destinations.push(Destination::new(class, slot1, slot2));
                    }
                    None => extra.push(name.parse::<CostAtom>().map_err(ParseError::UnknownAtom)?),
                },
                Token::Eof => return Err(ParseError::UnexpectedEof),
                other => {
                    return Err(ParseError::Expected {
                        expected: "destination or cost atom".to_string(),
                        found: format!("{:?}", other),
                    })
                }
            }
            if self.current != Token::Plus {
                break;
            }
            self.advance()?;
        }
        Ok((destinations, extra))
    }

    fn parse_events(&mut self) -> ParseResult<Vec<Event>> {
        let mut events = Vec::new();
        while let Token::Ident(name) = &self.current {
            events.push(name.parse::<Event>()?);
            self.advance()?;
        }
        Ok(events)
    }

    fn parse_case(&mut self) -> ParseResult<Vec<Rule>> {
        let lhs = self.parse_lhs()?;
        self.expect(Token::Equals)?;

        let mut alternatives = vec![self.parse_alternative()?];
        while self.current == Token::Colon {
            self.advance()?;
            alternatives.push(self.parse_alternative()?);
        }

        self.expect(Token::Semicolon)?;
        let events1 = self.parse_events()?;
        self.expect(Token::Semicolon)?;
        let events2 = self.parse_events()?;
        self.expect(Token::Eof)?;

        let guard = Guard::new(events1, events2);
        Ok(alternatives
            .into_iter()
            .map(|(destinations, extra)| Rule::new(lhs, destinations, guard.clone(), extra))
            .collect())
    }
}

/// Split the input into cases, each with the line it starts on.
fn split_cases(input: &str) -> Vec<(usize, String)> {
    let mut cases = Vec::new();
    let mut pending: Option<(usize, String)> = None;

    for (number, line) in input.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (_, text) = pending.get_or_insert_with(|| (number + 1, String::new()));
        text.push(' ');
        text.push_str(line);
        if !(line.ends_with(':') || line.ends_with(';')) {
            cases.extend(pending.take());
        }
    }
    cases.extend(pending);
    cases
}

/// Parse a single case into its rules.
pub fn parse_case(input: &str) -> ParseResult<Vec<Rule>> {
    Parser::new(input)?.parse_case()
}

/// Parse a grammar file.
pub fn parse_grammar(input: &str) -> ParseResult<Grammar> {
    let mut grammar = Grammar::new();
    for (case, (line, text)) in split_cases(input).into_iter().enumerate() {
        let in_case = |source: ParseError| ParseError::InCase {
            case: case + 1,
            line,
            source: Box::new(source),
        };
        for rule in parse_case(&text).map_err(in_case)? {
            grammar
                .add_rule(rule)
                .map_err(|e| in_case(ParseError::Grammar(e)))?;
        }
    }
    grammar.class_order()?;
    Ok(grammar)
}

impl FromStr for Grammar {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_grammar(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn case_error(err: ParseError) -> (usize, ParseError) {
        match err {
            ParseError::InCase { case, source, .. } => (case, *source),
            other => panic!("expected a case error, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_base_case() {
        let rules = parse_case("c1(v1,v2) = IsAdj ; Extant ; Extant").unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].lhs, CostClass::Adjacent);
        assert!(rules[0].is_base());
        assert_eq!(rules[0].extra, vec![CostAtom::IsAdj]);
        assert!(rules[0].guard.admits(Event::Extant, Event::Extant));
    }

    #[test]
    fn test_parse_alternatives() {
        let rules = parse_case(
            "c1(v1,v2) = c1(v1a,v2a) + c1(v1b,v2b) : \
             c0(v1a,v2b) + c1(v1b,v2a) + B + B ; Spec ; Spec GDup",
        )
        .unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(
            rules[1].destinations,
            vec![
                Destination::new(CostClass::NonAdjacent, Slot::Left, Slot::Right),
                Destination::new(CostClass::Adjacent, Slot::Right, Slot::Left),
            ]
        );
        assert_eq!(rules[1].extra, vec![CostAtom::AdjBreak, CostAtom::AdjBreak]);
        assert!(rules[0].guard.admits(Event::Spec, Event::GDup));
        assert_eq!(rules[0].guard, rules[1].guard);
    }

    #[test]
    fn test_parse_short_lhs_and_long_atoms() {
        let rules = parse_case("c0 = c1(v1,v2) + AdjGain + ZERO ; GLos ; Spec").unwrap();
        assert_eq!(rules[0].lhs, CostClass::NonAdjacent);
        assert_eq!(rules[0].extra, vec![CostAtom::AdjGain, CostAtom::Zero]);
    }

    #[test]
    fn test_parse_multiline_grammar() {
        let grammar = parse_grammar(
            "# leaves\n\
             c0(v1,v2) = 0 ; Extant ; Extant\n\
             \n\
             c1(v1,v2) = c1(v1a,v2a) + c1(v1b,v2b) :\n\
                         c0(v1a,v2a) + c1(v1b,v2b) + B ;\n\
                         Spec ; Spec\n",
        )
        .unwrap();
        assert_eq!(grammar.len(), 3);
        assert_eq!(grammar.rules_of(CostClass::Adjacent).count(), 2);
    }

    #[test]
    fn test_deco_grammar_parses() {
        let grammar = parse_grammar(DECO_GRAMMAR).unwrap();
        assert!(grammar.rules_of(CostClass::Adjacent).count() > 0);
        assert!(grammar.rules_of(CostClass::NonAdjacent).count() > 0);
    }

    #[test]
    fn test_errors_name_the_case() {
        let err =
            parse_grammar("c0 = 0 ; Extant ; Extant\nc1 = c0(v1c,v2) ; Spec ; Spec").unwrap_err();
        assert_eq!(
            case_error(err),
            (2, ParseError::UnknownSlot("v1c".to_string()))
        );

        let err = parse_grammar("c2(v1,v2) = 0 ; Spec ; Spec").unwrap_err();
        assert_eq!(
            case_error(err),
            (1, ParseError::Grammar(GrammarError::DanglingClass(2)))
        );

        let err = parse_grammar("c1 = c0(v1a,v2a) ; ; Spec").unwrap_err();
        assert_eq!(
            case_error(err),
            (
                1,
                ParseError::Grammar(GrammarError::EmptyGuard {
                    class: CostClass::Adjacent,
                    tree: 1
                })
            )
        );

        let err = parse_grammar("c1 = X ; Spec ; Spec").unwrap_err();
        assert_eq!(case_error(err), (1, ParseError::UnknownAtom("X".to_string())));

        let err = parse_grammar("c1 = 0 ; Speciation ; Spec").unwrap_err();
        assert!(matches!(case_error(err), (1, ParseError::Event(_))));

        let err = parse_grammar("c1 = 0 ; Spec").unwrap_err();
        assert_eq!(case_error(err), (1, ParseError::UnexpectedEof));
    }

    #[test]
    fn test_cyclic_grammar_rejected() {
        let err = parse_grammar(
            "c0 = c1(v1,v2) ; Extant ; Extant\nc1 = c0(v1,v2) + G ; Extant ; Extant",
        )
        .unwrap_err();
        assert_eq!(err, ParseError::Grammar(GrammarError::CyclicClasses));
    }
}
