// File: src/regex.rs
//
// Hand-rolled recursive-descent regex engine (spec.md §4.9), grounded in
// `examples/original_source/regex_lib.h`'s node-kind taxonomy
// (RNodeType/REClassType/RAnchorType). Greedy repeats use maximal munch
// with backtracking over the longest viable suffix; alternation is
// leftmost-first, not longest-match.

use crate::errors::{CompileError, SourceLocation};

#[derive(Debug, Clone, PartialEq)]
pub enum EscapeClass {
    Digit,
    NotDigit,
    Word,
    NotWord,
    Space,
    NotSpace,
}

impl EscapeClass {
    fn matches(&self, c: char) -> bool {
        match self {
            EscapeClass::Digit => c.is_ascii_digit(),
            EscapeClass::NotDigit => !c.is_ascii_digit(),
            EscapeClass::Word => c.is_alphanumeric() || c == '_',
            EscapeClass::NotWord => !(c.is_alphanumeric() || c == '_'),
            EscapeClass::Space => c.is_whitespace(),
            EscapeClass::NotSpace => !c.is_whitespace(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Anchor {
    Start,
    End,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Atom(char),
    Dot,
    Anchor(Anchor),
    EClass(EscapeClass),
    /// Character class `[...]`: `negated` flips membership; `ranges` holds
    /// both single chars (`a`, `a`) and spans (`a`, `z`).
    CClass { negated: bool, ranges: Vec<(char, char)> },
    Group(Box<Node>),
    Concat(Vec<Node>),
    Or(Vec<Node>),
    /// `{n,m}` fully general repeat; `Repeat0`/`Repeat1`/`Maybe` below are
    /// the common shorthands kept as distinct node kinds so the matcher
    /// doesn't need a generic bounded-repeat loop for the hot paths.
    Repeat0(Box<Node>),
    Repeat1(Box<Node>),
    Maybe(Box<Node>),
    RepeatN { node: Box<Node>, min: usize, max: Option<usize> },
}

pub struct RegexParser<'a> {
    chars: Vec<char>,
    pos: usize,
    _source: &'a str,
}

type PResult<T> = Result<T, CompileError>;

impl<'a> RegexParser<'a> {
    pub fn new(pattern: &'a str) -> Self {
        RegexParser { chars: pattern.chars().collect(), pos: 0, _source: pattern }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn err(&self, msg: &str) -> CompileError {
        CompileError::new(format!("regex: {msg}"), SourceLocation::unknown())
    }

    pub fn parse(&mut self) -> PResult<Node> {
        let node = self.parse_alternation()?;
        if self.pos != self.chars.len() {
            return Err(self.err("unexpected trailing input"));
        }
        Ok(node)
    }

    fn parse_alternation(&mut self) -> PResult<Node> {
        let mut branches = vec![self.parse_concat()?];
        while self.peek() == Some('|') {
            self.advance();
            branches.push(self.parse_concat()?);
        }
        if branches.len() == 1 {
            Ok(branches.pop().unwrap())
        } else {
            Ok(Node::Or(branches))
        }
    }

    fn parse_concat(&mut self) -> PResult<Node> {
        let mut parts = Vec::new();
        while let Some(c) = self.peek() {
            if c == '|' || c == ')' {
                break;
            }
            parts.push(self.parse_repeat()?);
        }
        if parts.len() == 1 {
            Ok(parts.pop().unwrap())
        } else {
            Ok(Node::Concat(parts))
        }
    }

    fn parse_repeat(&mut self) -> PResult<Node> {
        let atom = self.parse_atom()?;
        match self.peek() {
            Some('*') => {
                self.advance();
                Ok(Node::Repeat0(Box::new(atom)))
            }
            Some('+') => {
                self.advance();
                Ok(Node::Repeat1(Box::new(atom)))
            }
            Some('?') => {
                self.advance();
                Ok(Node::Maybe(Box::new(atom)))
            }
            Some('{') => {
                self.advance();
                let (min, max) = self.parse_bound()?;
                Ok(Node::RepeatN { node: Box::new(atom), min, max })
            }
            _ => Ok(atom),
        }
    }

    fn parse_bound(&mut self) -> PResult<(usize, Option<usize>)> {
        let min = self.parse_int()?;
        let max = if self.peek() == Some(',') {
            self.advance();
            if self.peek() == Some('}') {
                None
            } else {
                Some(self.parse_int()?)
            }
        } else {
            Some(min)
        };
        if self.advance() != Some('}') {
            return Err(self.err("expected '}' to close repeat bound"));
        }
        Ok((min, max))
    }

    fn parse_int(&mut self) -> PResult<usize> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
        if start == self.pos {
            return Err(self.err("expected a number in repeat bound"));
        }
        Ok(self.chars[start..self.pos].iter().collect::<String>().parse().unwrap())
    }

    fn parse_atom(&mut self) -> PResult<Node> {
        match self.advance() {
            Some('(') => {
                let inner = self.parse_alternation()?;
                if self.advance() != Some(')') {
                    return Err(self.err("expected ')'"));
                }
                Ok(Node::Group(Box::new(inner)))
            }
            Some('.') => Ok(Node::Dot),
            Some('^') => Ok(Node::Anchor(Anchor::Start)),
            Some('$') => Ok(Node::Anchor(Anchor::End)),
            Some('[') => self.parse_class(),
            Some('\\') => self.parse_escape(),
            Some(c) => Ok(Node::Atom(c)),
            None => Err(self.err("unexpected end of pattern")),
        }
    }

    fn parse_escape(&mut self) -> PResult<Node> {
        match self.advance() {
            Some('d') => Ok(Node::EClass(EscapeClass::Digit)),
            Some('D') => Ok(Node::EClass(EscapeClass::NotDigit)),
            Some('w') => Ok(Node::EClass(EscapeClass::Word)),
            Some('W') => Ok(Node::EClass(EscapeClass::NotWord)),
            Some('s') => Ok(Node::EClass(EscapeClass::Space)),
            Some('S') => Ok(Node::EClass(EscapeClass::NotSpace)),
            Some('n') => Ok(Node::Atom('\n')),
            Some('t') => Ok(Node::Atom('\t')),
            Some(c) => Ok(Node::Atom(c)),
            None => Err(self.err("dangling escape at end of pattern")),
        }
    }

    fn parse_class(&mut self) -> PResult<Node> {
        let negated = if self.peek() == Some('^') {
            self.advance();
            true
        } else {
            false
        };
        let mut ranges = Vec::new();
        while self.peek().is_some() && self.peek() != Some(']') {
            let lo = self.advance().unwrap();
            let lo = if lo == '\\' { self.advance().unwrap_or('\\') } else { lo };
            if self.peek() == Some('-') && self.chars.get(self.pos + 1).is_some_and(|&c| c != ']') {
                self.advance();
                let hi = self.advance().unwrap();
                ranges.push((lo, hi));
            } else {
                ranges.push((lo, lo));
            }
        }
        if self.advance() != Some(']') {
            return Err(self.err("expected ']' to close character class"));
        }
        Ok(Node::CClass { negated, ranges })
    }
}

pub fn parse(pattern: &str) -> PResult<Node> {
    RegexParser::new(pattern).parse()
}

/// Recursive backtracking matcher. `try_match` attempts to match `node`
/// starting at `pos` in `text`, calling `cont` with every position that
/// satisfies the remainder of the pattern (continuation-passing style is
/// what makes greedy-but-backtracking repeats tractable without an
/// explicit NFA).
fn try_match(node: &Node, text: &[char], pos: usize, cont: &mut dyn FnMut(usize) -> bool) -> bool {
    match node {
        Node::Atom(c) => pos < text.len() && text[pos] == *c && cont(pos + 1),
        Node::Dot => pos < text.len() && text[pos] != '\n' && cont(pos + 1),
        Node::EClass(ec) => pos < text.len() && ec.matches(text[pos]) && cont(pos + 1),
        Node::CClass { negated, ranges } => {
            if pos >= text.len() {
                return false;
            }
            let c = text[pos];
            let hit = ranges.iter().any(|&(lo, hi)| c >= lo && c <= hi);
            if hit != *negated {
                cont(pos + 1)
            } else {
                false
            }
        }
        Node::Anchor(Anchor::Start) => pos == 0 && cont(pos),
        Node::Anchor(Anchor::End) => pos == text.len() && cont(pos),
        Node::Group(inner) => try_match(inner, text, pos, cont),
        Node::Concat(parts) => match_concat(parts, text, pos, cont),
        Node::Or(branches) => {
            // Leftmost-first: try branches in source order, first success wins.
            for b in branches {
                if try_match(b, text, pos, cont) {
                    return true;
                }
            }
            false
        }
        Node::Maybe(inner) => {
            // Greedy: prefer matching once before falling back to skipping.
            if try_match(inner, text, pos, cont) {
                return true;
            }
            cont(pos)
        }
        Node::Repeat0(inner) => match_repeat(inner, text, pos, 0, None, cont),
        Node::Repeat1(inner) => match_repeat(inner, text, pos, 1, None, cont),
        Node::RepeatN { node, min, max } => match_repeat(node, text, pos, *min, *max, cont),
    }
}

fn match_concat(parts: &[Node], text: &[char], pos: usize, cont: &mut dyn FnMut(usize) -> bool) -> bool {
    match parts.split_first() {
        None => cont(pos),
        Some((first, rest)) => try_match(first, text, pos, &mut |p| match_concat(rest, text, p, cont)),
    }
}

/// Greedy repeat: maximal munch first, then backtrack one repetition at a
/// time looking for the longest viable suffix that still lets `cont`
/// succeed (spec.md §4.9).
fn match_repeat(
    inner: &Node,
    text: &[char],
    pos: usize,
    min: usize,
    max: Option<usize>,
    cont: &mut dyn FnMut(usize) -> bool,
) -> bool {
    fn go(
        inner: &Node,
        text: &[char],
        pos: usize,
        count: usize,
        min: usize,
        max: Option<usize>,
        cont: &mut dyn FnMut(usize) -> bool,
    ) -> bool {
        let can_repeat_more = max.map_or(true, |m| count < m);
        if can_repeat_more {
            let advanced = try_match(inner, text, pos, &mut |p| {
                if p == pos {
                    // Zero-width match inside a repeat: stop to avoid looping forever.
                    false
                } else {
                    go(inner, text, p, count + 1, min, max, cont)
                }
            });
            if advanced {
                return true;
            }
        }
        if count >= min {
            cont(pos)
        } else {
            false
        }
    }
    go(inner, text, pos, 0, min, max, cont)
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchData {
    pub start: usize,
    pub end: usize,
}

/// Finds the leftmost match starting at or after `from`, scanning start
/// positions left to right (leftmost-first overall, not longest-match).
pub fn find(node: &Node, haystack: &str, from: usize) -> Option<MatchData> {
    let text: Vec<char> = haystack.chars().collect();
    for start in from..=text.len() {
        let mut end = None;
        let matched = try_match(node, &text, start, &mut |p| {
            end = Some(p);
            true
        });
        if matched {
            return Some(MatchData { start, end: end.unwrap() });
        }
    }
    None
}

pub fn is_match(node: &Node, haystack: &str) -> bool {
    find(node, haystack, 0).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_literal_concat() {
        let node = parse("abc").unwrap();
        assert!(is_match(&node, "xxabcyy"));
        assert!(!is_match(&node, "xyz"));
    }

    #[test]
    fn greedy_star_takes_maximal_munch_then_backtracks() {
        let node = parse("a*a").unwrap();
        let m = find(&node, "aaaa", 0).unwrap();
        assert_eq!((m.start, m.end), (0, 4));
    }

    #[test]
    fn alternation_is_leftmost_first_not_longest() {
        let node = parse("a|ab").unwrap();
        let m = find(&node, "ab", 0).unwrap();
        assert_eq!((m.start, m.end), (0, 1));
    }

    #[test]
    fn character_class_and_negation() {
        let node = parse("[a-c]+").unwrap();
        assert!(is_match(&node, "cab"));
        let neg = parse("[^a-c]+").unwrap();
        assert!(!is_match(&neg, "a"));
        assert!(is_match(&neg, "xyz"));
    }

    #[test]
    fn anchors_bind_to_whole_haystack() {
        let node = parse("^abc$").unwrap();
        assert!(is_match(&node, "abc"));
        assert!(!is_match(&node, "xabc"));
    }
}
