//! Comparator Graph
//!
//! Comparators relate values of two value classes. A registered (A, B)
//! comparator also answers (B, A) queries through an inverse wrapper
//! unless it opts out; otherwise one operand is converted to the other's
//! type and compared once more.

use crate::convert::ConverterRegistry;
use crate::error::{RegistryError, Result};
use crate::value::Value;
use dashmap::DashMap;
use parking_lot::RwLock;
use skript_core::{EdgeId, IdGenerator};
use std::any::{Any, TypeId};
use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Result of a comparison, or a relation being queried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    Equal,
    NotEqual,
    Greater,
    GreaterOrEqual,
    Smaller,
    SmallerOrEqual,
    /// No comparator relates the operands
    Incomparable,
}

impl Relation {
    pub fn from_ordering(ordering: CmpOrdering) -> Self {
        match ordering {
            CmpOrdering::Less => Self::Smaller,
            CmpOrdering::Equal => Self::Equal,
            CmpOrdering::Greater => Self::Greater,
        }
    }

    pub fn from_equality(equal: bool) -> Self {
        if equal {
            Self::Equal
        } else {
            Self::NotEqual
        }
    }

    /// The relation seen with the operands swapped
    pub fn switched(self) -> Self {
        match self {
            Self::Greater => Self::Smaller,
            Self::Smaller => Self::Greater,
            Self::GreaterOrEqual => Self::SmallerOrEqual,
            Self::SmallerOrEqual => Self::GreaterOrEqual,
            other => other,
        }
    }

    /// Whether a comparison result satisfies this relation
    pub fn is_implied_by(self, result: Relation) -> bool {
        use Relation::*;
        match self {
            Equal => result == Equal,
            NotEqual => matches!(result, NotEqual | Greater | Smaller),
            Greater => result == Greater,
            GreaterOrEqual => matches!(result, Greater | Equal),
            Smaller => result == Smaller,
            SmallerOrEqual => matches!(result, Smaller | Equal),
            Incomparable => result == Incomparable,
        }
    }

    /// Whether testing this relation needs an ordering comparator
    pub fn is_ordering(self) -> bool {
        matches!(
            self,
            Self::Greater | Self::GreaterOrEqual | Self::Smaller | Self::SmallerOrEqual
        )
    }

    pub fn negated(self) -> Self {
        use Relation::*;
        match self {
            Equal => NotEqual,
            NotEqual => Equal,
            Greater => SmallerOrEqual,
            GreaterOrEqual => Smaller,
            Smaller => GreaterOrEqual,
            SmallerOrEqual => Greater,
            Incomparable => Incomparable,
        }
    }
}

pub type CompareFn = Arc<dyn Fn(&Value, &Value) -> Relation + Send + Sync>;

/// Capabilities of a comparator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComparatorOptions {
    /// Answers `<`/`>` queries, not only equality
    pub ordering: bool,
    /// May be queried with the operands swapped
    pub inversion: bool,
}

impl ComparatorOptions {
    pub const fn ordered() -> Self {
        Self {
            ordering: true,
            inversion: true,
        }
    }

    pub const fn equality() -> Self {
        Self {
            ordering: false,
            inversion: true,
        }
    }

    pub const fn without_inversion(self) -> Self {
        Self {
            inversion: false,
            ..self
        }
    }
}

/// A registered comparator
pub struct ComparatorEdge {
    pub id: EdgeId,
    pub left: TypeId,
    pub right: TypeId,
    pub left_name: &'static str,
    pub right_name: &'static str,
    pub options: ComparatorOptions,
    compare: CompareFn,
}

/// How a pair of value classes is compared, resolved once and cached
#[derive(Clone)]
enum Plan {
    Exact(Arc<ComparatorEdge>),
    Inverse(Arc<ComparatorEdge>),
    /// Convert the right operand to `to`, then compare
    ConvertRight { to: TypeId, plan: Box<Plan> },
    /// Convert the left operand to `to`, then compare
    ConvertLeft { to: TypeId, plan: Box<Plan> },
}

impl Plan {
    fn edge(&self) -> &ComparatorEdge {
        match self {
            Plan::Exact(edge) | Plan::Inverse(edge) => edge,
            Plan::ConvertRight { plan, .. } | Plan::ConvertLeft { plan, .. } => plan.edge(),
        }
    }
}

/// Registry of comparators
pub struct ComparatorRegistry {
    edges: RwLock<Arc<Vec<Arc<ComparatorEdge>>>>,
    cache: DashMap<(TypeId, TypeId), (u64, Option<Plan>)>,
    generation: AtomicU64,
    converters: Arc<ConverterRegistry>,
    ids: IdGenerator<EdgeId>,
}

impl ComparatorRegistry {
    /// Create a new registry that falls back to `converters`
    pub fn new(converters: Arc<ConverterRegistry>) -> Self {
        Self {
            edges: RwLock::new(Arc::new(Vec::new())),
            cache: DashMap::new(),
            generation: AtomicU64::new(0),
            converters,
            ids: IdGenerator::new(),
        }
    }

    /// Register a typed comparator
    pub fn register<A, B, C>(&self, compare: C, options: ComparatorOptions) -> Result<EdgeId>
    where
        A: Any + Send + Sync,
        B: Any + Send + Sync,
        C: Fn(&A, &B) -> Relation + Send + Sync + 'static,
    {
        let compare: CompareFn = Arc::new(move |a: &Value, b: &Value| {
            match (a.downcast_ref::<A>(), b.downcast_ref::<B>()) {
                (Some(a), Some(b)) => compare(a, b),
                _ => Relation::Incomparable,
            }
        });
        self.register_dyn(
            (TypeId::of::<A>(), std::any::type_name::<A>()),
            (TypeId::of::<B>(), std::any::type_name::<B>()),
            compare,
            options,
        )
    }

    pub fn register_dyn(
        &self,
        left: (TypeId, &'static str),
        right: (TypeId, &'static str),
        compare: CompareFn,
        options: ComparatorOptions,
    ) -> Result<EdgeId> {
        let mut edges = self.edges.write();
        if edges.iter().any(|e| e.left == left.0 && e.right == right.0) {
            return Err(RegistryError::DuplicateComparator {
                left: left.1,
                right: right.1,
            });
        }

        let edge = Arc::new(ComparatorEdge {
            id: self.ids.next_id(),
            left: left.0,
            right: right.0,
            left_name: left.1,
            right_name: right.1,
            options,
            compare,
        });
        let id = edge.id;
        let mut next = Vec::clone(&edges);
        next.push(edge);
        *edges = Arc::new(next);
        self.generation.fetch_add(1, Ordering::SeqCst);

        tracing::debug!("Registered comparator ({}, {})", left.1, right.1);
        Ok(id)
    }

    pub fn unregister(&self, id: EdgeId) -> bool {
        let mut edges = self.edges.write();
        if !edges.iter().any(|e| e.id == id) {
            return false;
        }
        let next: Vec<_> = edges.iter().filter(|e| e.id != id).cloned().collect();
        *edges = Arc::new(next);
        self.generation.fetch_add(1, Ordering::SeqCst);
        true
    }

    pub fn len(&self) -> usize {
        self.edges.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.read().is_empty()
    }

    /// Compare two values.
    ///
    /// Returns one of `Equal`, `NotEqual`, `Greater`, `Smaller` or
    /// `Incomparable`.
    pub fn compare(&self, x: &Value, y: &Value) -> Relation {
        match self.plan(x.value_type(), y.value_type()) {
            Some(plan) => self.run(&plan, x, y),
            None => Relation::Incomparable,
        }
    }

    /// Whether `x relation y` holds.
    ///
    /// Ordering relations are never satisfied through equality-only
    /// comparators.
    pub fn satisfies(&self, x: &Value, relation: Relation, y: &Value) -> bool {
        let Some(plan) = self.plan(x.value_type(), y.value_type()) else {
            return false;
        };
        if relation.is_ordering() && !plan.edge().options.ordering {
            return false;
        }
        let result = self.run(&plan, x, y);
        result != Relation::Incomparable && relation.is_implied_by(result)
    }

    /// Whether values of these classes can be ordered
    pub fn supports_ordering(&self, left: TypeId, right: TypeId) -> bool {
        self.plan(left, right)
            .map(|plan| plan.edge().options.ordering)
            .unwrap_or(false)
    }

    /// Whether any comparison between the two classes is possible
    pub fn is_comparable(&self, left: TypeId, right: TypeId) -> bool {
        self.plan(left, right).is_some()
    }

    fn run(&self, plan: &Plan, x: &Value, y: &Value) -> Relation {
        match plan {
            Plan::Exact(edge) => (edge.compare)(x, y),
            Plan::Inverse(edge) => (edge.compare)(y, x).switched(),
            Plan::ConvertRight { to, plan } => match self.converters.convert(y, *to) {
                Some(y) => self.run(plan, x, &y),
                None => Relation::Incomparable,
            },
            Plan::ConvertLeft { to, plan } => match self.converters.convert(x, *to) {
                Some(x) => self.run(plan, &x, y),
                None => Relation::Incomparable,
            },
        }
    }

    fn plan(&self, left: TypeId, right: TypeId) -> Option<Plan> {
        let generation = self.generation.load(Ordering::SeqCst) ^ (self.converters.generation() << 32);
        if let Some(entry) = self.cache.get(&(left, right)) {
            if entry.0 == generation {
                return entry.1.clone();
            }
        }

        let edges = Arc::clone(&self.edges.read());
        let plan = resolve(&edges, &self.converters, left, right);
        self.cache.insert((left, right), (generation, plan.clone()));
        plan
    }
}

fn direct(edges: &[Arc<ComparatorEdge>], left: TypeId, right: TypeId) -> Option<Plan> {
    if let Some(edge) = edges.iter().find(|e| e.left == left && e.right == right) {
        return Some(Plan::Exact(Arc::clone(edge)));
    }
    edges
        .iter()
        .find(|e| e.left == right && e.right == left && e.options.inversion)
        .map(|edge| Plan::Inverse(Arc::clone(edge)))
}

/// Exact, inverse, then one conversion of either operand
fn resolve(
    edges: &[Arc<ComparatorEdge>],
    converters: &ConverterRegistry,
    left: TypeId,
    right: TypeId,
) -> Option<Plan> {
    if let Some(plan) = direct(edges, left, right) {
        return Some(plan);
    }
    if left == right {
        return None;
    }

    if converters.has_path(right, left) {
        if let Some(plan) = direct(edges, left, left) {
            return Some(Plan::ConvertRight {
                to: left,
                plan: Box::new(plan),
            });
        }
    }
    if converters.has_path(left, right) {
        if let Some(plan) = direct(edges, right, right) {
            return Some(Plan::ConvertLeft {
                to: right,
                plan: Box::new(plan),
            });
        }
    }
    None
}
