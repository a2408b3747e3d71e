//! Line parser
//!
//! Turns one line of script text into a [`ParsedNode`] tree. Candidates of
//! the requested kind are tried in priority order and the first pattern
//! whose placeholders all resolve, and whose factory accepts the match,
//! wins. Placeholder spans are resolved recursively: parentheses, value
//! lists, variables, quoted text, literals and finally expression
//! syntaxes.

use crate::builtins::{ConvertedExpr, DefaultValue, InterpolatedText, ListExpr, TextPart, VariableExpr};
use crate::context::Event;
use crate::diagnostic::{Diagnostic, DiagnosticCode};
use crate::engine::Engine;
use crate::model::{Args, EventImpl, ParsedNode};
use crate::pattern::{normalize_input, Matcher, Pattern, Placeholder, PlaceholderFlags, Resolver};
use crate::structure::Structure;
use crate::syntax::{MatchResult, SyntaxFactory, SyntaxInfo, SyntaxKind};
use crate::types::{ParseContext, SemanticType};
use crate::value::Value;
use serde::Serialize;
use std::any::TypeId;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Parser counters, shared by every parser of an engine
#[derive(Debug, Default)]
pub struct ParserStats {
    lines: AtomicU64,
    failed: AtomicU64,
    ambiguous: AtomicU64,
    too_deep: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ParserStatsSnapshot {
    pub lines: u64,
    pub failed: u64,
    pub ambiguous: u64,
    pub too_deep: u64,
}

impl ParserStats {
    pub fn snapshot(&self) -> ParserStatsSnapshot {
        ParserStatsSnapshot {
            lines: self.lines.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            ambiguous: self.ambiguous.load(Ordering::Relaxed),
            too_deep: self.too_deep.load(Ordering::Relaxed),
        }
    }
}

/// An event line of a trigger header
pub struct ParsedEvent {
    info: Arc<SyntaxInfo>,
    behavior: Arc<dyn EventImpl>,
    args: Vec<Option<ParsedNode>>,
}

impl ParsedEvent {
    pub fn info(&self) -> &Arc<SyntaxInfo> {
        &self.info
    }

    /// Host event names this line listens to
    pub fn listens(&self) -> &[String] {
        self.info.listens()
    }

    pub fn check(&self, event: &Event) -> bool {
        let args = Args::evaluate(&self.args, event);
        self.behavior.check(event, &args)
    }
}

impl fmt::Debug for ParsedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParsedEvent")
            .field("syntax", &self.info.describe())
            .field("args", &self.args)
            .finish()
    }
}

/// A matched structure header with its freshly created structure
pub struct ParsedStructure {
    pub info: Arc<SyntaxInfo>,
    pub structure: Box<dyn Structure>,
    pub result: MatchResult,
}

impl fmt::Debug for ParsedStructure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParsedStructure")
            .field("syntax", &self.info.describe())
            .field("result", &self.result)
            .finish()
    }
}

#[derive(Clone, Copy)]
pub struct Parser<'e> {
    engine: &'e Engine,
}

impl<'e> Parser<'e> {
    pub fn new(engine: &'e Engine) -> Self {
        Self { engine }
    }

    /// Parse a line as an expression, condition or effect.
    ///
    /// `expected` is the code name (singular or plural) an expression must
    /// produce; it defaults to `objects`. Event and structure lines carry
    /// more than a node and go through [`parse_event`](Self::parse_event)
    /// and [`parse_structure`](Self::parse_structure).
    pub fn parse_line(&self, text: &str, kind: SyntaxKind, expected: Option<&str>) -> Result<ParsedNode, Diagnostic> {
        match kind {
            SyntaxKind::Expression => self.parse_expression(text, expected.unwrap_or("objects")),
            SyntaxKind::Condition => self.parse_condition(text),
            SyntaxKind::Effect => self.parse_effect(text),
            SyntaxKind::Event | SyntaxKind::Structure => Err(Diagnostic::error(
                DiagnosticCode::WrongKind,
                format!("{} lines do not parse into a single node", kind),
            )),
        }
    }

    pub fn parse_expression(&self, text: &str, expected: &str) -> Result<ParsedNode, Diagnostic> {
        let (ty, plural) = self.engine.types().resolve_pattern_name(expected).ok_or_else(|| {
            Diagnostic::error(DiagnosticCode::NoMatchingSyntax, format!("Unknown type '{}'", expected))
        })?;
        let types = [ty];
        let expect = Expect {
            types: &types,
            plural,
            flags: PlaceholderFlags::default(),
        };
        let session = Session::new(self.engine);
        let node = session.expression(text, &expect);
        self.finish(&session, text, "expression", node)
    }

    pub fn parse_effect(&self, text: &str) -> Result<ParsedNode, Diagnostic> {
        let session = Session::new(self.engine);
        let node = session.effect(text);
        self.finish(&session, text, "effect", node)
    }

    pub fn parse_condition(&self, text: &str) -> Result<ParsedNode, Diagnostic> {
        let session = Session::new(self.engine);
        let node = session.condition(text);
        self.finish(&session, text, "condition", node)
    }

    /// A trigger body line: an effect, or else a condition
    pub fn parse_statement(&self, text: &str) -> Result<ParsedNode, Diagnostic> {
        let session = Session::new(self.engine);
        let node = session.effect(text).or_else(|| session.condition(text));
        self.finish(&session, text, "condition/effect", node)
    }

    pub fn parse_event(&self, text: &str) -> Result<ParsedEvent, Diagnostic> {
        let session = Session::new(self.engine);
        let event = session.first_match(SyntaxKind::Event, text, |_| true, |info, result| {
            let SyntaxFactory::Event { create, .. } = info.factory() else {
                return Ok(None);
            };
            let behavior = create(&result)?;
            Ok(Some(ParsedEvent {
                info: Arc::clone(info),
                behavior: Arc::from(behavior),
                args: result.exprs,
            }))
        });
        self.finish(&session, text, "event", event)
    }

    pub fn parse_structure(&self, text: &str) -> Result<ParsedStructure, Diagnostic> {
        let session = Session::new(self.engine);
        let structure = session.first_match(SyntaxKind::Structure, text, |_| true, |info, result| {
            let SyntaxFactory::Structure { create, .. } = info.factory() else {
                return Ok(None);
            };
            let structure = create(&result)?;
            Ok(Some(ParsedStructure {
                info: Arc::clone(info),
                structure,
                result,
            }))
        });
        self.finish(&session, text, "structure", structure)
    }

    fn finish<T>(&self, session: &Session<'_>, text: &str, what: &str, found: Option<T>) -> Result<T, Diagnostic> {
        let stats = self.engine.stats();
        stats.lines.fetch_add(1, Ordering::Relaxed);
        if let Some(found) = found {
            return Ok(found);
        }

        stats.failed.fetch_add(1, Ordering::Relaxed);
        if session.too_deep.get() {
            stats.too_deep.fetch_add(1, Ordering::Relaxed);
            return Err(Diagnostic::error(
                DiagnosticCode::TooDeeplyNested,
                format!(
                    "'{}' is nested too deeply (the limit is {} levels)",
                    text.trim(),
                    self.engine.config().max_parse_depth
                ),
            ));
        }
        if let Some(message) = session.rejection.borrow_mut().take() {
            return Err(Diagnostic::error(DiagnosticCode::Rejected, message));
        }
        Err(Diagnostic::error(
            DiagnosticCode::NoMatchingSyntax,
            format!("Can't understand this {}: '{}'", what, text.trim()),
        ))
    }
}

/// What a placeholder span must produce
struct Expect<'t> {
    types: &'t [Arc<SemanticType>],
    plural: bool,
    flags: PlaceholderFlags,
}

impl Expect<'_> {
    fn accepts_any(&self) -> bool {
        self.types.iter().any(|t| t.is_object())
    }
}

/// Memo key: a trimmed span and what it must produce
#[derive(PartialEq, Eq, Hash)]
struct SpanKey {
    text: String,
    types: Vec<usize>,
    plural: bool,
    flags: PlaceholderFlags,
}

impl SpanKey {
    fn new(text: &str, expect: &Expect<'_>) -> Self {
        Self {
            text: text.to_string(),
            types: expect.types.iter().map(|t| Arc::as_ptr(t) as usize).collect(),
            plural: expect.plural,
            flags: expect.flags,
        }
    }
}

/// A resolved span, successful or not.
///
/// `height` is how many levels below `depth` the resolution went. An
/// outcome that never reached the depth limit holds at any depth with
/// that much room left; one that did only holds at its own depth.
struct Resolved {
    node: Option<ParsedNode>,
    depth: usize,
    height: usize,
    limited: bool,
}

/// State of one top-level parse
struct Session<'e> {
    engine: &'e Engine,
    depth: Cell<usize>,
    too_deep: Cell<bool>,
    /// First factory rejection message, reported if nothing matches
    rejection: RefCell<Option<String>>,
    memo: RefCell<HashMap<SpanKey, Resolved>>,
    /// Deepest level entered by the resolution in progress
    deepest: Cell<usize>,
    /// Whether the resolution in progress hit the depth limit
    limited: Cell<bool>,
}

impl Resolver for Session<'_> {
    fn resolve(&self, text: &str, placeholder: &Placeholder) -> Option<ParsedNode> {
        let expect = Expect {
            types: &placeholder.types,
            plural: placeholder.plural,
            flags: placeholder.flags,
        };
        self.expression(text, &expect)
    }
}

impl<'e> Session<'e> {
    fn new(engine: &'e Engine) -> Self {
        Self {
            engine,
            depth: Cell::new(0),
            too_deep: Cell::new(false),
            rejection: RefCell::new(None),
            memo: RefCell::new(HashMap::new()),
            deepest: Cell::new(0),
            limited: Cell::new(false),
        }
    }

    fn object(&self) -> Arc<SemanticType> {
        self.engine.types().object()
    }

    /// Resolve a span, reusing earlier resolutions of the same span.
    ///
    /// Backtracking asks for the same spans over and over, failures
    /// included, so every outcome is remembered for the whole session.
    fn expression(&self, text: &str, expect: &Expect<'_>) -> Option<ParsedNode> {
        let depth = self.depth.get();
        let max_depth = self.engine.config().max_parse_depth;
        if depth >= max_depth {
            self.too_deep.set(true);
            self.limited.set(true);
            return None;
        }

        let text = text.trim();
        let key = SpanKey::new(text, expect);
        if let Some(found) = self.memo.borrow().get(&key) {
            let holds = if found.limited {
                found.depth == depth
            } else {
                depth + found.height < max_depth
            };
            if holds {
                self.deepest.set(self.deepest.get().max(depth + found.height));
                if found.limited {
                    self.limited.set(true);
                }
                return found.node.clone();
            }
        }

        let outer_deepest = self.deepest.replace(depth);
        let outer_limited = self.limited.replace(false);
        self.depth.set(depth + 1);
        let node = self.expression_at_depth(text, expect);
        self.depth.set(depth);

        let deepest = self.deepest.get();
        let limited = self.limited.get();
        self.memo.borrow_mut().insert(
            key,
            Resolved {
                node: node.clone(),
                depth,
                height: deepest - depth,
                limited,
            },
        );
        self.deepest.set(outer_deepest.max(deepest));
        self.limited.set(outer_limited || limited);
        node
    }

    fn expression_at_depth(&self, text: &str, expect: &Expect<'_>) -> Option<ParsedNode> {
        if text.is_empty() {
            return None;
        }

        if let Some(inner) = strip_enclosing(text, '(', ')') {
            if let Some(node) = self.expression(inner, expect) {
                return Some(node);
            }
        }

        if expect.plural {
            if let Some((items, and)) = split_list(text) {
                if let Some(node) = self.list(&items, and, expect) {
                    return Some(node);
                }
            }
        }

        if let Some(raw) = strip_enclosing(text, '{', '}') {
            if expect.flags.literal_only {
                return None;
            }
            return self.variable(raw, expect);
        }

        if let Some(inner) = unquote(text) {
            return self.text(inner, expect);
        }

        if !expect.flags.non_literal_only {
            if let Some(node) = self.literal(text, expect) {
                return Some(node);
            }
        }

        if expect.flags.literal_only {
            return None;
        }
        self.syntax_expression(text, expect)
    }

    fn list(&self, items: &[&str], and: bool, expect: &Expect<'_>) -> Option<ParsedNode> {
        let mut nodes = Vec::with_capacity(items.len());
        for item in items {
            nodes.push(Some(self.expression(item, expect)?));
        }

        let mut item_types = nodes.iter().flatten().filter_map(ParsedNode::return_type);
        let first = item_types.next().cloned();
        let return_type = match first {
            Some(first) if item_types.all(|t| Arc::ptr_eq(t, &first)) => first,
            _ if expect.types.len() == 1 => Arc::clone(&expect.types[0]),
            _ => self.object(),
        };
        Some(ParsedNode::literal_list(Arc::new(ListExpr::new(and)), nodes, return_type))
    }

    fn variable(&self, raw: &str, expect: &Expect<'_>) -> Option<ParsedNode> {
        let variable = VariableExpr::new(
            raw,
            Arc::clone(self.engine.comparators()),
            Arc::clone(self.engine.arithmetic()),
        )?;
        let node = ParsedNode::expression(
            None,
            format!("variable {{{}}}", raw.trim()),
            Arc::new(variable),
            Vec::new(),
            self.object(),
        );
        self.fit(node, expect)
    }

    fn text(&self, inner: &str, expect: &Expect<'_>) -> Option<ParsedNode> {
        let (parts, args) = self.interpolate(inner)?;
        let text_type = self
            .engine
            .types()
            .lookup_by_value_class(TypeId::of::<String>())
            .unwrap_or_else(|| self.object());

        let node = if args.is_empty() {
            if expect.flags.non_literal_only {
                return None;
            }
            let text = parts
                .into_iter()
                .map(|part| match part {
                    TextPart::Text(text) => text,
                    TextPart::Expr(_) => String::new(),
                })
                .collect::<String>();
            ParsedNode::literal(Value::new(text), text_type)
        } else {
            if expect.flags.literal_only {
                return None;
            }
            let behavior = InterpolatedText::new(parts, Arc::clone(self.engine.types()));
            ParsedNode::expression(None, "text", Arc::new(behavior), args, text_type)
        };
        self.fit(node, expect)
    }

    /// Split quoted text into literal runs and `%expression%` parts
    fn interpolate(&self, inner: &str) -> Option<(Vec<TextPart>, Vec<Option<ParsedNode>>)> {
        let objects = [self.object()];
        let any = Expect {
            types: &objects,
            plural: true,
            flags: PlaceholderFlags::default(),
        };

        let mut parts = Vec::new();
        let mut args = Vec::new();
        let mut buf = String::new();
        let mut rest = inner;
        while let Some(c) = rest.chars().next() {
            match c {
                '"' => {
                    buf.push('"');
                    rest = &rest[2..];
                }
                '%' if rest.starts_with("%%") => {
                    buf.push('%');
                    rest = &rest[2..];
                }
                '%' => {
                    let end = rest[1..].find('%')? + 1;
                    let node = self.expression(&rest[1..end], &any)?;
                    if !buf.is_empty() {
                        parts.push(TextPart::Text(std::mem::take(&mut buf)));
                    }
                    parts.push(TextPart::Expr(args.len()));
                    args.push(Some(node));
                    rest = &rest[end + 1..];
                }
                _ => {
                    buf.push(c);
                    rest = &rest[c.len_utf8()..];
                }
            }
        }
        if !buf.is_empty() || parts.is_empty() {
            parts.push(TextPart::Text(buf));
        }
        Some((parts, args))
    }

    fn literal(&self, text: &str, expect: &Expect<'_>) -> Option<ParsedNode> {
        let types = self.engine.types();
        for ty in expect.types {
            if ty.is_object() {
                let Some(value) = types.parse_any(text, ParseContext::Default) else {
                    continue;
                };
                let value_type = types
                    .lookup_by_value_class(value.value_type())
                    .unwrap_or_else(|| self.object());
                return Some(ParsedNode::literal(value, value_type));
            }
            if let Some(value) = ty.parse(text, ParseContext::Default) {
                return Some(ParsedNode::literal(value, Arc::clone(ty)));
            }
        }

        // A literal of another type that converts into an expected one
        let value = types.parse_any(text, ParseContext::Default)?;
        let value_type = types.lookup_by_value_class(value.value_type())?;
        self.fit(ParsedNode::literal(value, value_type), expect)
    }

    fn syntax_expression(&self, text: &str, expect: &Expect<'_>) -> Option<ParsedNode> {
        self.first_match(
            SyntaxKind::Expression,
            text,
            |info| self.compatible(info, expect),
            |info, result| {
                let SyntaxFactory::Expression(create) = info.factory() else {
                    return Ok(None);
                };
                let behavior = create(&result)?;
                let return_type = info.return_type().cloned().unwrap_or_else(|| self.object());
                let node = ParsedNode::expression(
                    Some(Arc::clone(info)),
                    info.describe(),
                    Arc::from(behavior),
                    result.exprs,
                    return_type,
                );
                Ok(self.fit(node, expect))
            },
        )
    }

    fn effect(&self, text: &str) -> Option<ParsedNode> {
        self.first_match(SyntaxKind::Effect, text, |_| true, |info, result| {
            let SyntaxFactory::Effect(create) = info.factory() else {
                return Ok(None);
            };
            let behavior = create(&result)?;
            Ok(Some(ParsedNode::effect(Arc::clone(info), Arc::from(behavior), result.exprs)))
        })
    }

    fn condition(&self, text: &str) -> Option<ParsedNode> {
        self.first_match(SyntaxKind::Condition, text, |_| true, |info, result| {
            let SyntaxFactory::Condition(create) = info.factory() else {
                return Ok(None);
            };
            let behavior = create(&result)?;
            Ok(Some(ParsedNode::condition(Arc::clone(info), Arc::from(behavior), result.exprs)))
        })
    }

    /// Whether an expression syntax may produce what `expect` needs
    fn compatible(&self, info: &SyntaxInfo, expect: &Expect<'_>) -> bool {
        let Some(ret) = info.return_type() else {
            return false;
        };
        ret.is_object()
            || expect.accepts_any()
            || expect.types.iter().any(|t| {
                Arc::ptr_eq(t, ret) || self.engine.converters().has_path(ret.value_type(), t.value_type())
            })
    }

    /// Adapt a node to `expect`: literals convert now, other nodes of a
    /// different type are wrapped in a runtime conversion
    fn fit(&self, node: ParsedNode, expect: &Expect<'_>) -> Option<ParsedNode> {
        if !expect.plural && !node.is_single() {
            return None;
        }
        let ret = Arc::clone(node.return_type()?);
        if expect.accepts_any() || expect.types.iter().any(|t| Arc::ptr_eq(t, &ret)) {
            return Some(node);
        }

        let converters = self.engine.converters();
        if let ParsedNode::Literal(lit) = &node {
            return expect.types.iter().find_map(|t| {
                converters
                    .convert(lit.value(), t.value_type())
                    .map(|value| ParsedNode::literal(value, Arc::clone(t)))
            });
        }

        let targets: Vec<Arc<SemanticType>> = if ret.is_object() {
            expect.types.to_vec()
        } else {
            expect
                .types
                .iter()
                .filter(|t| converters.has_path(ret.value_type(), t.value_type()))
                .cloned()
                .collect()
        };
        let return_type = match targets.as_slice() {
            [] => return None,
            [only] => Arc::clone(only),
            _ => self.object(),
        };
        let label = format!("{} as {}", node.label(), return_type.name());
        let converted = ConvertedExpr::new(node.clone(), targets, Arc::clone(converters));
        Some(ParsedNode::expression(
            None,
            label,
            Arc::new(converted),
            vec![Some(node)],
            return_type,
        ))
    }

    /// Try the descriptors of `kind` in order. `build` turns a match into
    /// the result: `Ok(None)` skips the match, `Err` records a rejection.
    fn first_match<T>(
        &self,
        kind: SyntaxKind,
        text: &str,
        accept: impl Fn(&SyntaxInfo) -> bool,
        mut build: impl FnMut(&Arc<SyntaxInfo>, MatchResult) -> Result<Option<T>, String>,
    ) -> Option<T> {
        let input = normalize_input(text);
        if input.is_empty() {
            return None;
        }
        let candidates = self.engine.syntaxes().descriptors_for(kind);

        for (ci, info) in candidates.iter().enumerate() {
            if !accept(info) {
                continue;
            }
            for (pi, pattern) in info.patterns().iter().enumerate() {
                let Some(state) = Matcher::new(pattern, &input, self).run() else {
                    continue;
                };
                let result = self.match_result(pattern, pi, state, &input);
                match build(info, result) {
                    Ok(Some(found)) => {
                        if self.engine.config().detect_ambiguity {
                            self.report_ambiguity(&input, &candidates, ci, pi, &accept);
                        }
                        return Some(found);
                    }
                    Ok(None) => {}
                    Err(message) => self.reject(info, message),
                }
            }
        }
        None
    }

    fn match_result(
        &self,
        pattern: &Pattern,
        index: usize,
        state: crate::pattern::MatchState,
        input: &str,
    ) -> MatchResult {
        let mut exprs = state.exprs;
        for &omitted in &state.omitted {
            let Some(placeholder) = pattern.placeholders().get(omitted) else {
                continue;
            };
            if placeholder.flags.no_default || exprs[omitted].is_some() {
                continue;
            }
            if let Some(ty) = placeholder.types.iter().find(|t| t.has_default()) {
                exprs[omitted] = Some(ParsedNode::expression(
                    None,
                    format!("default {}", ty.name()),
                    Arc::new(DefaultValue::new(Arc::clone(ty))),
                    Vec::new(),
                    Arc::clone(ty),
                ));
            }
        }
        MatchResult {
            pattern: index,
            exprs,
            mark: state.mark,
            choices: state.choices,
            regexes: state.regexes,
            text: input.to_string(),
        }
    }

    fn reject(&self, info: &SyntaxInfo, message: String) {
        tracing::debug!("{} rejected the match: {}", info.describe(), message);
        self.rejection.borrow_mut().get_or_insert(message);
    }

    /// Log the first other pattern that also matches `input`
    fn report_ambiguity(
        &self,
        input: &str,
        candidates: &[Arc<SyntaxInfo>],
        winner: usize,
        winner_pattern: usize,
        accept: &impl Fn(&SyntaxInfo) -> bool,
    ) {
        for (ci, info) in candidates.iter().enumerate().skip(winner) {
            if !accept(info) {
                continue;
            }
            let skip = if ci == winner { winner_pattern + 1 } else { 0 };
            for pattern in info.patterns().iter().skip(skip) {
                if Matcher::new(pattern, input, self).run().is_some() {
                    self.engine.stats().ambiguous.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(
                        "'{}' is ambiguous: it also matches '{}' of {}; using {}",
                        input,
                        pattern.source(),
                        info.describe(),
                        candidates[winner].describe()
                    );
                    return;
                }
            }
        }
    }
}

/// Inner text if `text` is wrapped in one balanced `open ... close` pair
fn strip_enclosing(text: &str, open: char, close: char) -> Option<&str> {
    let inner = text.strip_prefix(open)?.strip_suffix(close)?;
    let mut depth = 0i32;
    let mut in_quote = false;
    for c in inner.chars() {
        match c {
            '"' => in_quote = !in_quote,
            c if c == open && !in_quote => depth += 1,
            c if c == close && !in_quote => {
                depth -= 1;
                if depth < 0 {
                    return None;
                }
            }
            _ => {}
        }
    }
    (depth == 0).then_some(inner)
}

/// Inner text of a single quoted string, where `""` is an escaped quote
fn unquote(text: &str) -> Option<&str> {
    let inner = text.strip_prefix('"')?.strip_suffix('"')?;
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '"' && chars.next() != Some('"') {
            return None;
        }
    }
    Some(inner)
}

const LIST_SEPARATORS: [(&str, bool); 6] = [
    (", and ", true),
    (", or ", false),
    (", ", true),
    (" and ", true),
    (" or ", false),
    (" nor ", false),
];

/// Split a top-level value list; the flag is false for `or` lists
fn split_list(text: &str) -> Option<(Vec<&str>, bool)> {
    let bytes = text.as_bytes();
    let mut items = Vec::new();
    let mut and = true;
    let mut depth = 0i32;
    let mut in_quote = false;
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'"' => in_quote = !in_quote,
            b'(' | b'{' | b'[' if !in_quote => depth += 1,
            b')' | b'}' | b']' if !in_quote => depth -= 1,
            _ if !in_quote && depth == 0 => {
                let separator = LIST_SEPARATORS.iter().find(|(sep, _)| {
                    bytes.len() - i >= sep.len() && bytes[i..i + sep.len()].eq_ignore_ascii_case(sep.as_bytes())
                });
                if let Some((sep, is_and)) = separator {
                    items.push(text[start..i].trim());
                    and &= *is_and;
                    i += sep.len();
                    start = i;
                    continue;
                }
            }
            _ => {}
        }
        i += 1;
    }

    if items.is_empty() {
        return None;
    }
    items.push(text[start..].trim());
    if items.iter().any(|item| item.is_empty()) {
        return None;
    }
    Some((items, and))
}

#[cfg(test)]
mod tests {
    use super::*;
    use skript_config::EngineConfig;

    #[derive(Debug, Clone, PartialEq)]
    struct Token(String);

    #[test]
    fn test_literal_tries_every_accepted_type() {
        let engine = Engine::new(EngineConfig::default());
        // Known to the placeholder but not to the registry, so `object` can't parse it
        let token = Arc::new(
            SemanticType::builder::<Token>("token")
                .parser(|text, _| text.strip_prefix("tok-").map(|t| Value::new(Token(t.to_string()))))
                .build()
                .unwrap(),
        );
        let types = [engine.types().object(), Arc::clone(&token)];
        let expect = Expect {
            types: &types,
            plural: false,
            flags: PlaceholderFlags::default(),
        };

        let session = Session::new(&engine);
        let node = session.literal("tok-7", &expect).unwrap();
        assert!(Arc::ptr_eq(node.return_type().unwrap(), &token));
        assert!(session.literal("7", &expect).is_none());
    }

    #[test]
    fn test_span_outcomes_are_remembered() {
        let engine = Engine::with_defaults(EngineConfig::default()).unwrap();
        let session = Session::new(&engine);
        let objects = [engine.types().object()];
        let expect = Expect {
            types: &objects,
            plural: false,
            flags: PlaceholderFlags::default(),
        };

        assert!(session.expression("1 + foo", &expect).is_none());
        let remembered = session.memo.borrow().len();
        assert!(remembered > 0);
        assert!(session.expression(" 1 + foo ", &expect).is_none());
        assert_eq!(session.memo.borrow().len(), remembered);
        assert!(session.expression("1 + 2", &expect).is_some());
    }

    #[test]
    fn test_depth_limit_survives_memo() {
        let config = EngineConfig {
            max_parse_depth: 3,
            ..EngineConfig::default()
        };
        let engine = Engine::with_defaults(config).unwrap();
        let err = engine.parser().parse_expression("((((1))))", "objects").unwrap_err();
        assert_eq!(err.code, DiagnosticCode::TooDeeplyNested);
        assert!(engine.parser().parse_expression("(1)", "objects").is_ok());
    }

    #[test]
    fn test_strip_enclosing() {
        assert_eq!(strip_enclosing("(1 + 2)", '(', ')'), Some("1 + 2"));
        assert_eq!(strip_enclosing("(1) + (2)", '(', ')'), None);
        assert_eq!(strip_enclosing("{a::*}", '{', '}'), Some("a::*"));
        assert_eq!(strip_enclosing("(\")\")", '(', ')'), Some("\")\""));
    }

    #[test]
    fn test_unquote() {
        assert_eq!(unquote("\"hello\""), Some("hello"));
        assert_eq!(unquote("\"say \"\"hi\"\"\""), Some("say \"\"hi\"\""));
        assert_eq!(unquote("\"a\" and \"b\""), None);
        assert_eq!(unquote("\"\""), Some(""));
        assert_eq!(unquote("no quotes"), None);
    }

    #[test]
    fn test_split_list() {
        assert_eq!(split_list("1, 2 and 3"), Some((vec!["1", "2", "3"], true)));
        assert_eq!(split_list("1, 2, or 3"), Some((vec!["1", "2", "3"], false)));
        assert_eq!(split_list("\"a, b\" AND {x}"), Some((vec!["\"a, b\"", "{x}"], true)));
        assert_eq!(split_list("(1 and 2) or 3"), Some((vec!["(1 and 2)", "3"], false)));
        assert_eq!(split_list("brand new"), None);
        assert_eq!(split_list("1, "), None);
    }
}
