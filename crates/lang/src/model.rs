//! Parsed node model
//!
//! A parsed line is a tree of [`ParsedNode`]s. Behaviour comes from opaque
//! objects created by a syntax's factory and reached through the
//! capability traits below. Evaluation first evaluates every sub-node into
//! [`Args`], then hands them to the behaviour.

use crate::change::ChangeMode;
use crate::context::Event;
use crate::error::ChangeError;
use crate::syntax::{SyntaxInfo, SyntaxKind};
use crate::types::SemanticType;
use crate::value::Value;
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// Behaviour of an expression syntax
pub trait ExpressionImpl: Send + Sync {
    /// Values of the expression for this event (empty when unset)
    fn get(&self, event: &Event, args: &Args<'_>) -> Vec<Value>;

    fn is_single(&self) -> bool {
        true
    }

    /// For value lists: whether all (`and`) or any (`or`) values count
    fn is_and(&self) -> bool {
        true
    }

    /// Change modes this expression handles itself, with the accepted
    /// delta value classes (`Value` meaning any)
    fn accept_change(&self, _mode: ChangeMode) -> Option<Vec<TypeId>> {
        None
    }

    fn change(
        &self,
        _event: &Event,
        _args: &Args<'_>,
        _delta: Option<&[Value]>,
        _mode: ChangeMode,
    ) -> Result<(), ChangeError> {
        Ok(())
    }
}

/// Behaviour of a condition syntax
pub trait ConditionImpl: Send + Sync {
    fn check(&self, event: &Event, args: &Args<'_>) -> bool;

    /// Read from the match's mark by the factory; applied after `check`
    fn is_negated(&self) -> bool {
        false
    }
}

/// Behaviour of an effect syntax
pub trait EffectImpl: Send + Sync {
    fn execute(&self, event: &Event, args: &Args<'_>);
}

/// Behaviour of an event syntax
pub trait EventImpl: Send + Sync {
    /// Whether a fired event of a listened name concerns this trigger
    fn check(&self, _event: &Event, _args: &Args<'_>) -> bool {
        true
    }
}

/// Evaluated sub-nodes of a node
pub struct Args<'a> {
    nodes: &'a [Option<ParsedNode>],
    values: Vec<Vec<Value>>,
}

impl<'a> Args<'a> {
    pub fn evaluate(nodes: &'a [Option<ParsedNode>], event: &Event) -> Self {
        let values = nodes
            .iter()
            .map(|node| node.as_ref().map(|n| n.evaluate(event)).unwrap_or_default())
            .collect();
        Self { nodes, values }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Values of the i-th sub-node (empty if it was omitted)
    pub fn values(&self, i: usize) -> &[Value] {
        self.values.get(i).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn single(&self, i: usize) -> Option<&Value> {
        self.values(i).first()
    }

    pub fn get<T: Any>(&self, i: usize) -> Option<&T> {
        self.single(i).and_then(|v| v.downcast_ref::<T>())
    }

    pub fn node(&self, i: usize) -> Option<&'a ParsedNode> {
        self.nodes.get(i).and_then(Option::as_ref)
    }

    pub fn is_present(&self, i: usize) -> bool {
        self.node(i).is_some()
    }
}

#[derive(Debug, Clone)]
pub struct LiteralNode {
    value: Value,
    ty: Arc<SemanticType>,
}

impl LiteralNode {
    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn semantic_type(&self) -> &Arc<SemanticType> {
        &self.ty
    }
}

pub struct ExpressionNode {
    source: Option<Arc<SyntaxInfo>>,
    label: String,
    behavior: Arc<dyn ExpressionImpl>,
    args: Vec<Option<ParsedNode>>,
    return_type: Arc<SemanticType>,
    literal: bool,
}

pub struct EffectNode {
    source: Arc<SyntaxInfo>,
    behavior: Arc<dyn EffectImpl>,
    args: Vec<Option<ParsedNode>>,
}

pub struct ConditionNode {
    source: Arc<SyntaxInfo>,
    behavior: Arc<dyn ConditionImpl>,
    args: Vec<Option<ParsedNode>>,
    negated: bool,
}

/// A node of a parsed line
#[derive(Clone)]
pub enum ParsedNode {
    Literal(LiteralNode),
    Expression(Arc<ExpressionNode>),
    Effect(Arc<EffectNode>),
    Condition(Arc<ConditionNode>),
}

impl ParsedNode {
    pub fn literal(value: Value, ty: Arc<SemanticType>) -> Self {
        ParsedNode::Literal(LiteralNode { value, ty })
    }

    /// Create a new expression node; `source` is `None` for built-ins
    pub fn expression(
        source: Option<Arc<SyntaxInfo>>,
        label: impl Into<String>,
        behavior: Arc<dyn ExpressionImpl>,
        args: Vec<Option<ParsedNode>>,
        return_type: Arc<SemanticType>,
    ) -> Self {
        ParsedNode::Expression(Arc::new(ExpressionNode {
            source,
            label: label.into(),
            behavior,
            args,
            return_type,
            literal: false,
        }))
    }

    /// A list whose items are all literals still counts as a literal
    pub(crate) fn literal_list(
        behavior: Arc<dyn ExpressionImpl>,
        args: Vec<Option<ParsedNode>>,
        return_type: Arc<SemanticType>,
    ) -> Self {
        let literal = args.iter().flatten().all(ParsedNode::is_literal);
        ParsedNode::Expression(Arc::new(ExpressionNode {
            source: None,
            label: "list".into(),
            behavior,
            args,
            return_type,
            literal,
        }))
    }

    pub fn effect(source: Arc<SyntaxInfo>, behavior: Arc<dyn EffectImpl>, args: Vec<Option<ParsedNode>>) -> Self {
        ParsedNode::Effect(Arc::new(EffectNode { source, behavior, args }))
    }

    pub fn condition(
        source: Arc<SyntaxInfo>,
        behavior: Arc<dyn ConditionImpl>,
        args: Vec<Option<ParsedNode>>,
    ) -> Self {
        let negated = behavior.is_negated();
        ParsedNode::Condition(Arc::new(ConditionNode {
            source,
            behavior,
            args,
            negated,
        }))
    }

    pub fn kind(&self) -> SyntaxKind {
        match self {
            ParsedNode::Literal(_) | ParsedNode::Expression(_) => SyntaxKind::Expression,
            ParsedNode::Effect(_) => SyntaxKind::Effect,
            ParsedNode::Condition(_) => SyntaxKind::Condition,
        }
    }

    /// Descriptor the node was created from (`None` for literals and built-ins)
    pub fn source(&self) -> Option<&Arc<SyntaxInfo>> {
        match self {
            ParsedNode::Literal(_) => None,
            ParsedNode::Expression(node) => node.source.as_ref(),
            ParsedNode::Effect(node) => Some(&node.source),
            ParsedNode::Condition(node) => Some(&node.source),
        }
    }

    pub fn args(&self) -> &[Option<ParsedNode>] {
        match self {
            ParsedNode::Literal(_) => &[],
            ParsedNode::Expression(node) => &node.args,
            ParsedNode::Effect(node) => &node.args,
            ParsedNode::Condition(node) => &node.args,
        }
    }

    pub fn return_type(&self) -> Option<&Arc<SemanticType>> {
        match self {
            ParsedNode::Literal(lit) => Some(&lit.ty),
            ParsedNode::Expression(node) => Some(&node.return_type),
            _ => None,
        }
    }

    pub fn is_literal(&self) -> bool {
        match self {
            ParsedNode::Literal(_) => true,
            ParsedNode::Expression(node) => node.literal,
            _ => false,
        }
    }

    pub fn is_single(&self) -> bool {
        match self {
            ParsedNode::Expression(node) => node.behavior.is_single(),
            _ => true,
        }
    }

    pub fn is_and_list(&self) -> bool {
        match self {
            ParsedNode::Expression(node) => node.behavior.is_and(),
            _ => true,
        }
    }

    pub fn is_negated(&self) -> bool {
        matches!(self, ParsedNode::Condition(node) if node.negated)
    }

    /// Short human-readable description
    pub fn label(&self) -> String {
        match self {
            ParsedNode::Literal(lit) => format!("{:?} ({})", lit.value, lit.ty.name()),
            ParsedNode::Expression(node) => match &node.source {
                Some(info) => info.describe(),
                None => node.label.clone(),
            },
            ParsedNode::Effect(node) => node.source.describe(),
            ParsedNode::Condition(node) => node.source.describe(),
        }
    }

    /// Evaluate against an event. Literals ignore the event; conditions
    /// yield one boolean; effects run and yield nothing.
    pub fn evaluate(&self, event: &Event) -> Vec<Value> {
        match self {
            ParsedNode::Literal(lit) => vec![lit.value.clone()],
            ParsedNode::Expression(node) => {
                let args = Args::evaluate(&node.args, event);
                node.behavior.get(event, &args)
            }
            ParsedNode::Condition(_) => vec![Value::new(self.check(event))],
            ParsedNode::Effect(_) => {
                self.execute(event);
                Vec::new()
            }
        }
    }

    pub fn single(&self, event: &Event) -> Option<Value> {
        self.evaluate(event).into_iter().next()
    }

    /// Truth value: a condition's (negation applied) result, or whether an
    /// expression's first value is `true`
    pub fn check(&self, event: &Event) -> bool {
        match self {
            ParsedNode::Condition(node) => {
                let args = Args::evaluate(&node.args, event);
                node.behavior.check(event, &args) != node.negated
            }
            ParsedNode::Effect(_) => {
                self.execute(event);
                true
            }
            _ => self
                .single(event)
                .and_then(|v| v.downcast_ref::<bool>().copied())
                .unwrap_or(false),
        }
    }

    pub fn execute(&self, event: &Event) {
        match self {
            ParsedNode::Effect(node) => {
                let args = Args::evaluate(&node.args, event);
                node.behavior.execute(event, &args);
            }
            _ => {
                self.evaluate(event);
            }
        }
    }

    /// Delta value classes accepted for `mode`, or `None` if unsupported.
    /// Falls back to the change handler of the return type.
    pub fn accept_change(&self, mode: ChangeMode) -> Option<Vec<TypeId>> {
        match self {
            ParsedNode::Expression(node) => node.behavior.accept_change(mode).or_else(|| {
                node.return_type
                    .changer()
                    .and_then(|changer| changer.accept_change(mode))
            }),
            _ => None,
        }
    }

    /// Apply a change that [`accept_change`](Self::accept_change) declared.
    ///
    /// # Panics
    ///
    /// Panics if the node does not support `mode`. Callers must query
    /// `accept_change` at parse time; reaching this is a programming error.
    pub fn apply_change(&self, event: &Event, delta: Option<&[Value]>, mode: ChangeMode) -> Result<(), ChangeError> {
        if let ParsedNode::Expression(node) = self {
            if node.behavior.accept_change(mode).is_some() {
                let args = Args::evaluate(&node.args, event);
                return node.behavior.change(event, &args, delta, mode);
            }
            if let Some(changer) = node
                .return_type
                .changer()
                .filter(|changer| changer.accept_change(mode).is_some())
            {
                let current = self.evaluate(event);
                return changer.change(&current, delta, mode);
            }
        }
        panic!(
            "{} does not support the change mode '{}'; accept_change must be checked before applying a change",
            self.label(),
            mode
        );
    }
}

impl fmt::Debug for ParsedNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParsedNode::Literal(lit) => write!(f, "Literal({:?})", lit.value),
            ParsedNode::Expression(node) => f
                .debug_struct("Expression")
                .field("label", &self.label())
                .field("return_type", &node.return_type.code_name())
                .field("args", &node.args)
                .finish(),
            ParsedNode::Effect(node) => f
                .debug_struct("Effect")
                .field("label", &self.label())
                .field("args", &node.args)
                .finish(),
            ParsedNode::Condition(node) => f
                .debug_struct("Condition")
                .field("label", &self.label())
                .field("negated", &node.negated)
                .field("args", &node.args)
                .finish(),
        }
    }
}
