use super::{SyntaxKind, SyntaxPriority};
use crate::entry::EntryValidator;
use crate::model::{ConditionImpl, EffectImpl, EventImpl, ExpressionImpl, ParsedNode};
use crate::pattern::Pattern;
use crate::structure::{NodeType, Structure};
use crate::types::SemanticType;
use skript_core::SyntaxId;
use std::fmt;
use std::sync::Arc;

/// Everything a factory learns about a successful match
#[derive(Debug, Clone, Default)]
pub struct MatchResult {
    /// Index of the matched pattern within the descriptor
    pub pattern: usize,
    /// Sub-nodes by placeholder index, `None` where omitted
    pub exprs: Vec<Option<ParsedNode>>,
    /// XOR of the marks of every taken alternative
    pub mark: i32,
    /// Chosen alternative of every non-optional group, in pattern order
    pub choices: Vec<usize>,
    /// Captures of every regex element (index 0 is the whole match)
    pub regexes: Vec<Vec<String>>,
    /// The matched input, normalized
    pub text: String,
}

impl MatchResult {
    pub fn expr(&self, i: usize) -> Option<&ParsedNode> {
        self.exprs.get(i).and_then(Option::as_ref)
    }

    pub fn has_mark(&self, bits: i32) -> bool {
        self.mark & bits == bits
    }

    pub fn choice(&self, group: usize) -> Option<usize> {
        self.choices.get(group).copied()
    }

    /// Whole text matched by the i-th regex element
    pub fn regex(&self, i: usize) -> Option<&str> {
        self.regexes.get(i).and_then(|caps| caps.first()).map(String::as_str)
    }
}

/// Factory result: the behaviour, or the rejection message shown to the user
pub type FactoryResult<T> = Result<T, String>;

pub type ExpressionFactory = Arc<dyn Fn(&MatchResult) -> FactoryResult<Box<dyn ExpressionImpl>> + Send + Sync>;
pub type ConditionFactory = Arc<dyn Fn(&MatchResult) -> FactoryResult<Box<dyn ConditionImpl>> + Send + Sync>;
pub type EffectFactory = Arc<dyn Fn(&MatchResult) -> FactoryResult<Box<dyn EffectImpl>> + Send + Sync>;
pub type EventFactory = Arc<dyn Fn(&MatchResult) -> FactoryResult<Box<dyn EventImpl>> + Send + Sync>;
pub type StructureFactory = Arc<dyn Fn(&MatchResult) -> FactoryResult<Box<dyn Structure>> + Send + Sync>;

/// Per-kind factory; the variant decides the descriptor's kind
#[derive(Clone)]
pub enum SyntaxFactory {
    Expression(ExpressionFactory),
    Condition(ConditionFactory),
    Effect(EffectFactory),
    Event {
        create: EventFactory,
        /// Names of the host events this syntax listens to
        listens: Vec<String>,
    },
    Structure {
        create: StructureFactory,
        node_type: NodeType,
        entries: Option<EntryValidator>,
    },
}

impl SyntaxFactory {
    pub fn kind(&self) -> SyntaxKind {
        match self {
            SyntaxFactory::Expression(_) => SyntaxKind::Expression,
            SyntaxFactory::Condition(_) => SyntaxKind::Condition,
            SyntaxFactory::Effect(_) => SyntaxKind::Effect,
            SyntaxFactory::Event { .. } => SyntaxKind::Event,
            SyntaxFactory::Structure { .. } => SyntaxKind::Structure,
        }
    }
}

/// Registration request for a syntax element
pub struct SyntaxSpec {
    pub(crate) patterns: Vec<String>,
    pub(crate) factory: SyntaxFactory,
    pub(crate) return_type: Option<String>,
    pub(crate) priority: Option<SyntaxPriority>,
    pub(crate) origin: String,
}

impl SyntaxSpec {
    fn new(patterns: &[&str], factory: SyntaxFactory) -> Self {
        Self {
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
            factory,
            return_type: None,
            priority: None,
            origin: String::new(),
        }
    }

    pub fn effect<F>(patterns: &[&str], create: F) -> Self
    where
        F: Fn(&MatchResult) -> FactoryResult<Box<dyn EffectImpl>> + Send + Sync + 'static,
    {
        Self::new(patterns, SyntaxFactory::Effect(Arc::new(create)))
    }

    pub fn condition<F>(patterns: &[&str], create: F) -> Self
    where
        F: Fn(&MatchResult) -> FactoryResult<Box<dyn ConditionImpl>> + Send + Sync + 'static,
    {
        Self::new(patterns, SyntaxFactory::Condition(Arc::new(create)))
    }

    /// An expression returning values of the type `return_type` (a code name)
    pub fn expression<F>(return_type: &str, patterns: &[&str], create: F) -> Self
    where
        F: Fn(&MatchResult) -> FactoryResult<Box<dyn ExpressionImpl>> + Send + Sync + 'static,
    {
        let mut spec = Self::new(patterns, SyntaxFactory::Expression(Arc::new(create)));
        spec.return_type = Some(return_type.to_string());
        spec
    }

    pub fn event<F>(patterns: &[&str], listens: &[&str], create: F) -> Self
    where
        F: Fn(&MatchResult) -> FactoryResult<Box<dyn EventImpl>> + Send + Sync + 'static,
    {
        Self::new(
            patterns,
            SyntaxFactory::Event {
                create: Arc::new(create),
                listens: listens.iter().map(|l| l.to_lowercase()).collect(),
            },
        )
    }

    pub fn structure<F>(patterns: &[&str], node_type: NodeType, create: F) -> Self
    where
        F: Fn(&MatchResult) -> FactoryResult<Box<dyn Structure>> + Send + Sync + 'static,
    {
        Self::new(
            patterns,
            SyntaxFactory::Structure {
                create: Arc::new(create),
                node_type,
                entries: None,
            },
        )
    }

    /// Override the priority inferred from the patterns
    pub fn priority(mut self, priority: SyntaxPriority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Entry layout of a structure's section. Ignored for other kinds.
    pub fn entries(mut self, validator: EntryValidator) -> Self {
        if let SyntaxFactory::Structure { entries, .. } = &mut self.factory {
            *entries = Some(validator);
        }
        self
    }

    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    pub fn kind(&self) -> SyntaxKind {
        self.factory.kind()
    }
}

/// A registered syntax descriptor
pub struct SyntaxInfo {
    id: SyntaxId,
    patterns: Vec<Pattern>,
    priority: SyntaxPriority,
    return_type: Option<Arc<SemanticType>>,
    factory: SyntaxFactory,
    origin: String,
}

impl SyntaxInfo {
    pub(crate) fn new(
        id: SyntaxId,
        patterns: Vec<Pattern>,
        priority: SyntaxPriority,
        return_type: Option<Arc<SemanticType>>,
        factory: SyntaxFactory,
        origin: String,
    ) -> Self {
        Self {
            id,
            patterns,
            priority,
            return_type,
            factory,
            origin,
        }
    }

    pub fn id(&self) -> SyntaxId {
        self.id
    }

    pub fn kind(&self) -> SyntaxKind {
        self.factory.kind()
    }

    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(Pattern::source)
    }

    pub fn priority(&self) -> SyntaxPriority {
        self.priority
    }

    /// Declared return type, for expressions only
    pub fn return_type(&self) -> Option<&Arc<SemanticType>> {
        self.return_type.as_ref()
    }

    pub fn factory(&self) -> &SyntaxFactory {
        &self.factory
    }

    /// Addon that registered the descriptor
    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn listens(&self) -> &[String] {
        match &self.factory {
            SyntaxFactory::Event { listens, .. } => listens,
            _ => &[],
        }
    }

    pub fn node_type(&self) -> Option<NodeType> {
        match &self.factory {
            SyntaxFactory::Structure { node_type, .. } => Some(*node_type),
            _ => None,
        }
    }

    pub fn entries(&self) -> Option<&EntryValidator> {
        match &self.factory {
            SyntaxFactory::Structure { entries, .. } => entries.as_ref(),
            _ => None,
        }
    }

    /// `kind 'first pattern'`, for messages
    pub fn describe(&self) -> String {
        let first = self.sources().next().unwrap_or_default();
        format!("{} '{}'", self.kind(), first)
    }
}

impl fmt::Debug for SyntaxInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyntaxInfo")
            .field("id", &self.id)
            .field("kind", &self.kind())
            .field("patterns", &self.sources().collect::<Vec<_>>())
            .field("priority", &self.priority)
            .field("return_type", &self.return_type.as_ref().map(|t| t.code_name()))
            .field("origin", &self.origin)
            .finish()
    }
}
