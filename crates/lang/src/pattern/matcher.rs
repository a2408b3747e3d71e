//! Backtracking matcher
//!
//! Matching is continuation-driven: every element receives the rest of the
//! pattern as a continuation and succeeds only if the continuation does.
//! Positions are plain byte offsets, so a failed branch is dropped without
//! any state to undo.

use super::compile::{Element, Pattern, Placeholder};
use crate::model::ParsedNode;
use std::cell::RefCell;
use std::collections::HashMap;

/// Resolves a placeholder span into a parsed sub-expression
pub(crate) trait Resolver {
    fn resolve(&self, text: &str, placeholder: &Placeholder) -> Option<ParsedNode>;
}

/// Outcome of a successful pattern match
#[derive(Debug, Clone)]
pub struct MatchState {
    /// Parsed placeholder values by placeholder index
    pub exprs: Vec<Option<ParsedNode>>,
    /// XOR of the marks of all taken branches
    pub mark: i32,
    /// Chosen alternative of each traversed choice group, in order
    pub choices: Vec<usize>,
    /// Regex element captures (group 0 first), in order
    pub regexes: Vec<Vec<String>>,
    /// Placeholders skipped because their optional group was absent
    pub omitted: Vec<usize>,
}

impl MatchState {
    fn new(placeholders: usize) -> Self {
        Self {
            exprs: vec![None; placeholders],
            mark: 0,
            choices: Vec::new(),
            regexes: Vec::new(),
            omitted: Vec::new(),
        }
    }
}

#[derive(Clone, Copy)]
enum Cont<'c> {
    Done,
    Then(&'c [Element], &'c Cont<'c>),
}

/// First element the continuation will try, if any
fn peek<'c>(mut k: &'c Cont<'c>) -> Option<&'c Element> {
    loop {
        match *k {
            Cont::Done => return None,
            Cont::Then(rest, next) => {
                if let Some(first) = rest.first() {
                    return Some(first);
                }
                k = next;
            }
        }
    }
}

/// Trim and collapse whitespace runs outside of quoted text
pub(crate) fn normalize_input(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_quote = false;
    let mut pending_space = false;
    for c in text.trim().chars() {
        if !in_quote && c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        if c == '"' {
            in_quote = !in_quote;
        }
        out.push(c);
    }
    out
}

/// Case-insensitive literal match at `pos`, returning the end offset
fn match_literal(input: &str, pos: usize, literal: &str) -> Option<usize> {
    let mut chars = input.get(pos..)?.char_indices();
    let mut end = pos;
    for expected in literal.chars() {
        let (i, actual) = chars.next()?;
        if expected != actual && !expected.to_lowercase().eq(actual.to_lowercase()) {
            return None;
        }
        end = pos + i + actual.len_utf8();
    }
    Some(end)
}

pub(crate) struct Matcher<'a, R: Resolver> {
    pattern: &'a Pattern,
    input: &'a str,
    resolver: &'a R,
    memo: RefCell<HashMap<(usize, usize, usize), Option<ParsedNode>>>,
}

impl<'a, R: Resolver> Matcher<'a, R> {
    /// `input` must already be normalised
    pub fn new(pattern: &'a Pattern, input: &'a str, resolver: &'a R) -> Self {
        Self {
            pattern,
            input,
            resolver,
            memo: RefCell::new(HashMap::new()),
        }
    }

    pub fn run(&self) -> Option<MatchState> {
        let state = MatchState::new(self.pattern.placeholders.len());
        self.seq(&self.pattern.elements, 0, state, &Cont::Done)
    }

    fn seq(&self, elements: &[Element], pos: usize, st: MatchState, k: &Cont<'_>) -> Option<MatchState> {
        match elements.split_first() {
            Some((first, rest)) => self.element(first, pos, st, &Cont::Then(rest, k)),
            None => match *k {
                Cont::Done => (pos == self.input.len()).then_some(st),
                Cont::Then(rest, next) => self.seq(rest, pos, st, next),
            },
        }
    }

    fn resume(&self, pos: usize, st: MatchState, k: &Cont<'_>) -> Option<MatchState> {
        self.seq(&[], pos, st, k)
    }

    fn element(&self, element: &Element, pos: usize, st: MatchState, k: &Cont<'_>) -> Option<MatchState> {
        match element {
            Element::Literal(literal) => {
                let end = match_literal(self.input, pos, literal)?;
                self.resume(end, st, k)
            }

            Element::Space => {
                let bytes = self.input.as_bytes();
                if bytes.get(pos) == Some(&b' ') {
                    if let Some(done) = self.resume(pos + 1, st.clone(), k) {
                        return Some(done);
                    }
                }
                // Elastic: absent at either end of the line or after a space
                if pos == 0 || pos == bytes.len() || bytes[pos - 1] == b' ' {
                    self.resume(pos, st, k)
                } else {
                    None
                }
            }

            Element::Group(group) => {
                for &i in &group.try_order {
                    let alternative = &group.alternatives[i];
                    let mut branch = st.clone();
                    branch.mark ^= alternative.mark;
                    if !group.optional {
                        branch.choices.push(i);
                    }
                    if let Some(done) = self.seq(&alternative.elements, pos, branch, k) {
                        return Some(done);
                    }
                }
                if group.optional {
                    let mut absent = st;
                    absent.omitted.extend(group.placeholders.iter().copied());
                    self.resume(pos, absent, k)
                } else {
                    None
                }
            }

            Element::Placeholder(index) => {
                let placeholder = &self.pattern.placeholders[*index];
                for end in self.span_ends(pos).into_iter().rev() {
                    if !self.can_follow(end, k) {
                        continue;
                    }
                    let Some(node) = self.resolve(pos, end, placeholder) else {
                        continue;
                    };
                    let mut next = st.clone();
                    next.exprs[*index] = Some(node);
                    if let Some(done) = self.resume(end, next, k) {
                        return Some(done);
                    }
                }
                None
            }

            Element::Regex(index) => {
                let regex = &self.pattern.regexes[*index];
                let ends: Vec<usize> = self.input[pos..]
                    .char_indices()
                    .map(|(i, c)| pos + i + c.len_utf8())
                    .collect();
                for end in ends.into_iter().rev() {
                    if !self.can_follow(end, k) {
                        continue;
                    }
                    let Some(captures) = regex.captures(&self.input[pos..end]) else {
                        continue;
                    };
                    let groups = captures
                        .iter()
                        .map(|m| m.map(|m| m.as_str().to_string()).unwrap_or_default())
                        .collect();
                    let mut next = st.clone();
                    next.regexes.push(groups);
                    if let Some(done) = self.resume(end, next, k) {
                        return Some(done);
                    }
                }
                None
            }
        }
    }

    /// Cheap pre-check that the next element can start at `end`
    fn can_follow(&self, end: usize, k: &Cont<'_>) -> bool {
        match peek(k) {
            None => end == self.input.len(),
            Some(Element::Literal(literal)) => match_literal(self.input, end, literal).is_some(),
            Some(Element::Space) => end == self.input.len() || self.input.as_bytes()[end] == b' ',
            Some(_) => true,
        }
    }

    /// Ends of balanced, space-trimmed spans starting at `pos`, shortest first
    fn span_ends(&self, pos: usize) -> Vec<usize> {
        let rest = &self.input[pos..];
        if rest.starts_with(' ') {
            return Vec::new();
        }

        let mut ends = Vec::new();
        let mut depth: i32 = 0;
        let mut in_quote = false;
        for (i, c) in rest.char_indices() {
            match c {
                '"' => in_quote = !in_quote,
                '(' | '{' | '[' if !in_quote => depth += 1,
                ')' | '}' | ']' if !in_quote => {
                    depth -= 1;
                    if depth < 0 {
                        break;
                    }
                }
                _ => {}
            }
            if !in_quote && depth == 0 && c != ' ' {
                ends.push(pos + i + c.len_utf8());
            }
        }
        ends
    }

    fn resolve(&self, start: usize, end: usize, placeholder: &Placeholder) -> Option<ParsedNode> {
        let key = (start, end, placeholder.equivalent);
        if let Some(cached) = self.memo.borrow().get(&key) {
            return cached.clone();
        }
        let node = self.resolver.resolve(&self.input[start..end], placeholder);
        self.memo.borrow_mut().insert(key, node.clone());
        node
    }
}
