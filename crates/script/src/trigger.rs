//! Triggers: event handlers declared by `on <event>:` sections
//!
//! A trigger structure parses its event line in `init`, its body in
//! `load`, and publishes itself to the [`TriggerRegistry`] in
//! `post_load`. The host then calls [`TriggerRegistry::fire`] with an
//! [`Event`] to run every published trigger listening to it.

use crate::options::substitute;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use skript_core::{IdGenerator, ScriptName, SourcePos};
use skript_lang::{DiagnosticCode, Event, Node, ParsedEvent, ParsedNode, Structure, StructureContext};
use std::fmt;
use std::sync::Arc;

/// Identity of a published trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TriggerId(pub u64);

impl From<u64> for TriggerId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for TriggerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "trigger#{}", self.0)
    }
}

/// One executable item of a trigger body
#[derive(Debug)]
pub enum TriggerItem {
    /// An effect, or a condition guarding the rest of the body
    Statement(ParsedNode),
    /// `if` / `else if` / `else` chain; a branch without a condition is `else`
    Conditional(Vec<Branch>),
}

#[derive(Debug)]
pub struct Branch {
    pub condition: Option<ParsedNode>,
    pub body: Vec<TriggerItem>,
}

/// Run items in order. Returns `false` once a guard condition stopped the
/// trigger.
fn run_items(items: &[TriggerItem], event: &Event) -> bool {
    for item in items {
        match item {
            TriggerItem::Statement(node @ ParsedNode::Condition(_)) => {
                if !node.check(event) {
                    return false;
                }
            }
            TriggerItem::Statement(node) => node.execute(event),
            TriggerItem::Conditional(branches) => {
                let taken = branches
                    .iter()
                    .find(|b| b.condition.as_ref().map_or(true, |c| c.check(event)));
                if let Some(branch) = taken {
                    if !run_items(&branch.body, event) {
                        return false;
                    }
                }
            }
        }
    }
    true
}

/// A loaded event handler
#[derive(Debug)]
pub struct Trigger {
    pub script: ScriptName,
    pub pos: SourcePos,
    pub event: ParsedEvent,
    pub items: Vec<TriggerItem>,
}

impl Trigger {
    /// Run the body if the event line accepts the event
    pub fn run(&self, event: &Event) -> bool {
        if !self.event.check(event) {
            return false;
        }
        tracing::debug!("Running trigger of {} at {}", self.script, self.pos);
        run_items(&self.items, event);
        true
    }
}

/// Published triggers, by id and by the event names they listen to
#[derive(Default)]
pub struct TriggerRegistry {
    triggers: DashMap<TriggerId, Arc<Trigger>>,
    by_event: RwLock<std::collections::HashMap<String, Vec<TriggerId>>>,
    ids: IdGenerator<TriggerId>,
}

impl TriggerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, trigger: Trigger) -> TriggerId {
        let id = self.ids.next_id();
        let mut by_event = self.by_event.write();
        for name in trigger.event.listens() {
            by_event.entry(name.to_lowercase()).or_default().push(id);
        }
        self.triggers.insert(id, Arc::new(trigger));
        id
    }

    pub fn unregister(&self, id: TriggerId) -> bool {
        let Some((_, trigger)) = self.triggers.remove(&id) else {
            return false;
        };
        let mut by_event = self.by_event.write();
        for name in trigger.event.listens() {
            if let Some(ids) = by_event.get_mut(&name.to_lowercase()) {
                ids.retain(|other| *other != id);
            }
        }
        true
    }

    /// Run every trigger listening to the event, in registration order.
    ///
    /// Returns how many triggers accepted the event.
    pub fn fire(&self, event: &Event) -> usize {
        self.listening(event).iter().filter(|trigger| trigger.run(event)).count()
    }

    /// Like [`fire`](Self::fire), limited to the triggers of `scripts`
    pub fn fire_in(&self, event: &Event, scripts: &[ScriptName]) -> usize {
        self.listening(event)
            .iter()
            .filter(|trigger| scripts.contains(&trigger.script))
            .filter(|trigger| trigger.run(event))
            .count()
    }

    fn listening(&self, event: &Event) -> Vec<Arc<Trigger>> {
        let by_event = self.by_event.read();
        by_event
            .get(event.name())
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.triggers.get(id).map(|t| Arc::clone(&t)))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.triggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }

    /// Number of triggers listening to an event name
    pub fn listeners(&self, event: &str) -> usize {
        self.by_event
            .read()
            .get(&event.to_lowercase())
            .map_or(0, Vec::len)
    }
}

impl fmt::Debug for TriggerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TriggerRegistry").field("triggers", &self.triggers.len()).finish()
    }
}

/// The `[on] <event>:` structure
pub struct TriggerStructure {
    header: String,
    event: Option<ParsedEvent>,
    items: Vec<TriggerItem>,
    /// Where the trigger was published, once it is
    published: Option<(Arc<TriggerRegistry>, TriggerId)>,
}

impl TriggerStructure {
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            event: None,
            items: Vec::new(),
            published: None,
        }
    }

    pub fn id(&self) -> Option<TriggerId> {
        self.published.as_ref().map(|(_, id)| *id)
    }
}

/// Parse a section body into trigger items, reporting every line that
/// fails and keeping the rest
fn load_body(ctx: &mut StructureContext<'_>, nodes: &[Node]) -> Vec<TriggerItem> {
    let mut items = Vec::new();
    let mut branches: Vec<Branch> = Vec::new();
    // set when a condition of the current chain failed to parse
    let mut broken_chain = false;

    for node in nodes {
        let key = node.key.trim();

        if node.is_section() {
            let (condition, opens_chain) = if key.eq_ignore_ascii_case("else") {
                (None, false)
            } else if let Some(rest) = strip_keyword(key, "else if") {
                (Some(rest), false)
            } else if let Some(rest) = strip_keyword(key, "if") {
                (Some(rest), true)
            } else {
                flush(&mut items, &mut branches);
                broken_chain = false;
                ctx.error(
                    DiagnosticCode::InvalidStructure,
                    node.pos,
                    format!("Can't understand this section: '{}'", key),
                );
                continue;
            };

            if opens_chain {
                flush(&mut items, &mut branches);
                broken_chain = false;
            } else if broken_chain {
                continue;
            } else if branches.last().map_or(true, |b| b.condition.is_none()) {
                ctx.error(
                    DiagnosticCode::InvalidStructure,
                    node.pos,
                    format!("'{}' has to be placed just after another 'if' or 'else if' section", key),
                );
                continue;
            }

            let condition = match condition {
                Some(text) => match parse_condition(ctx, text, node.pos) {
                    Some(condition) => Some(condition),
                    None => {
                        broken_chain = true;
                        continue;
                    }
                },
                None => None,
            };
            let body = load_body(ctx, node.children());
            branches.push(Branch { condition, body });
            continue;
        }

        flush(&mut items, &mut branches);
        broken_chain = false;
        let Some(line) = substitute(ctx, key, node.pos) else {
            continue;
        };
        match ctx.parser().parse_statement(&line) {
            Ok(statement) => items.push(TriggerItem::Statement(statement)),
            Err(diagnostic) => ctx.report(diagnostic.at(node.pos)),
        }
    }

    flush(&mut items, &mut branches);
    items
}

fn flush(items: &mut Vec<TriggerItem>, branches: &mut Vec<Branch>) {
    if !branches.is_empty() {
        items.push(TriggerItem::Conditional(std::mem::take(branches)));
    }
}

fn parse_condition(ctx: &mut StructureContext<'_>, text: &str, pos: SourcePos) -> Option<ParsedNode> {
    let text = substitute(ctx, text, pos)?;
    match ctx.parser().parse_condition(&text) {
        Ok(condition) => Some(condition),
        Err(diagnostic) => {
            ctx.report(diagnostic.at(pos));
            None
        }
    }
}

/// `keyword rest` with a case-insensitive keyword followed by whitespace
fn strip_keyword<'a>(text: &'a str, keyword: &str) -> Option<&'a str> {
    let head = text.get(..keyword.len())?;
    let rest = &text[keyword.len()..];
    (head.eq_ignore_ascii_case(keyword) && rest.starts_with(char::is_whitespace)).then(|| rest.trim())
}

impl Structure for TriggerStructure {
    fn init(&mut self, ctx: &mut StructureContext<'_>) -> bool {
        let pos = ctx.node.pos;
        let Some(header) = substitute(ctx, &self.header, pos) else {
            return false;
        };
        match ctx.parser().parse_event(&header) {
            Ok(event) => {
                self.event = Some(event);
                true
            }
            Err(diagnostic) => {
                ctx.report(diagnostic);
                false
            }
        }
    }

    fn load(&mut self, ctx: &mut StructureContext<'_>) -> bool {
        let node: &Node = ctx.node;
        self.items = load_body(ctx, node.children());
        true
    }

    fn post_load(&mut self, ctx: &mut StructureContext<'_>) -> bool {
        let Some(registry) = ctx.data.get::<Arc<TriggerRegistry>>().cloned() else {
            let pos = ctx.node.pos;
            ctx.error(
                DiagnosticCode::InvalidStructure,
                pos,
                format!("'{}' was loaded without a trigger registry", self.header),
            );
            return false;
        };
        let Some(event) = self.event.take() else {
            return false;
        };
        let trigger = Trigger {
            script: ctx.script.clone(),
            pos: ctx.node.pos,
            event,
            items: std::mem::take(&mut self.items),
        };
        let id = registry.register(trigger);
        tracing::debug!("{}: published {} for '{}'", ctx.script, id, self.header);
        self.published = Some((registry, id));
        true
    }

    fn unload(&mut self) {
        if let Some((registry, id)) = self.published.take() {
            registry.unregister(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_keyword() {
        assert_eq!(strip_keyword("if {x} is 1", "if"), Some("{x} is 1"));
        assert_eq!(strip_keyword("IF  {x} is 1", "if"), Some("{x} is 1"));
        assert_eq!(strip_keyword("else if 1 is 1", "else if"), Some("1 is 1"));
        assert_eq!(strip_keyword("iffy", "if"), None);
        assert_eq!(strip_keyword("i", "if"), None);
    }

    #[test]
    fn test_trigger_id_display() {
        assert_eq!(TriggerId(3).to_string(), "trigger#3");
    }
}
