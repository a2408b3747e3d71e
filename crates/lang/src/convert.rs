//! Converter Graph
//!
//! Directed graph of pairwise conversions between value classes. A lookup
//! tries direct edges first and then a bounded breadth-first search for a
//! chain, honouring each edge's chain-position flags.

use crate::error::{RegistryError, Result};
use crate::value::Value;
use dashmap::DashMap;
use parking_lot::RwLock;
use skript_core::{EdgeId, IdGenerator};
use std::any::{Any, TypeId};
use std::collections::{HashSet, VecDeque};
use std::ops::BitOr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub type ConvertFn = Arc<dyn Fn(&Value) -> Option<Value> + Send + Sync>;

/// Upper bound on candidate chains kept per type pair
const MAX_CANDIDATE_PATHS: usize = 32;

/// Chain-position and safety flags of a converter edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ConverterFlags(u8);

impl ConverterFlags {
    pub const NONE: ConverterFlags = ConverterFlags(0);
    /// Nothing may precede this edge: it can only be the first hop
    pub const NO_LEFT_CHAINING: ConverterFlags = ConverterFlags(1);
    /// Nothing may follow this edge: it can only be the last hop
    pub const NO_RIGHT_CHAINING: ConverterFlags = ConverterFlags(2);
    pub const NO_CHAINING: ConverterFlags = ConverterFlags(3);
    /// Widening/narrowing cast that may fail for some inputs
    pub const ALLOW_UNSAFE_CASTS: ConverterFlags = ConverterFlags(8);

    pub fn contains(&self, other: ConverterFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_unsafe(&self) -> bool {
        self.contains(Self::ALLOW_UNSAFE_CASTS)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }
}

impl BitOr for ConverterFlags {
    type Output = ConverterFlags;

    fn bitor(self, rhs: ConverterFlags) -> ConverterFlags {
        ConverterFlags(self.0 | rhs.0)
    }
}

/// A registered conversion between two value classes
pub struct ConverterEdge {
    pub id: EdgeId,
    pub from: TypeId,
    pub to: TypeId,
    pub from_name: &'static str,
    pub to_name: &'static str,
    pub flags: ConverterFlags,
    convert: ConvertFn,
}

impl ConverterEdge {
    pub fn apply(&self, value: &Value) -> Option<Value> {
        (self.convert)(value)
    }
}

impl std::fmt::Debug for ConverterEdge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {} ({:?})", self.from_name, self.to_name, self.flags)
    }
}

type Path = Vec<Arc<ConverterEdge>>;

/// Registry of converters
pub struct ConverterRegistry {
    edges: RwLock<Arc<Vec<Arc<ConverterEdge>>>>,
    /// Candidate chains per type pair, tagged with the generation they were found in
    paths: DashMap<(TypeId, TypeId), (u64, Arc<Vec<Path>>)>,
    generation: AtomicU64,
    max_chain: usize,
    ids: IdGenerator<EdgeId>,
}

impl ConverterRegistry {
    /// Create a new registry; chains are at most `max_chain` hops long
    pub fn new(max_chain: usize) -> Self {
        Self {
            edges: RwLock::new(Arc::new(Vec::new())),
            paths: DashMap::new(),
            generation: AtomicU64::new(0),
            max_chain: max_chain.max(1),
            ids: IdGenerator::new(),
        }
    }

    /// Register a typed converter
    pub fn register<F, T, C>(&self, convert: C, flags: ConverterFlags) -> Result<EdgeId>
    where
        F: Any + Send + Sync,
        T: Any + Send + Sync,
        C: Fn(&F) -> Option<T> + Send + Sync + 'static,
    {
        let convert: ConvertFn =
            Arc::new(move |value: &Value| value.downcast_ref::<F>().and_then(&convert).map(Value::new));
        self.register_dyn(
            (TypeId::of::<F>(), std::any::type_name::<F>()),
            (TypeId::of::<T>(), std::any::type_name::<T>()),
            convert,
            flags,
        )
    }

    /// Register a converter over type-erased values
    pub fn register_dyn(
        &self,
        from: (TypeId, &'static str),
        to: (TypeId, &'static str),
        convert: ConvertFn,
        flags: ConverterFlags,
    ) -> Result<EdgeId> {
        let mut edges = self.edges.write();

        let duplicate = edges
            .iter()
            .any(|e| e.from == from.0 && e.to == to.0 && e.flags.is_unsafe() == flags.is_unsafe());
        if duplicate {
            return Err(RegistryError::DuplicateConverter {
                from: from.1,
                to: to.1,
            });
        }

        let edge = Arc::new(ConverterEdge {
            id: self.ids.next_id(),
            from: from.0,
            to: to.0,
            from_name: from.1,
            to_name: to.1,
            flags,
            convert,
        });
        let id = edge.id;

        let mut next = Vec::clone(&edges);
        next.push(edge);
        *edges = Arc::new(next);
        self.invalidate();

        tracing::debug!("Registered converter {} -> {} ({:?})", from.1, to.1, flags);
        Ok(id)
    }

    pub fn unregister(&self, id: EdgeId) -> bool {
        let mut edges = self.edges.write();
        if !edges.iter().any(|e| e.id == id) {
            return false;
        }
        let next: Vec<_> = edges.iter().filter(|e| e.id != id).cloned().collect();
        *edges = Arc::new(next);
        self.invalidate();
        true
    }

    fn invalidate(&self) {
        self.paths.clear();
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Bumped on every change; dependent caches compare against it
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn max_chain(&self) -> usize {
        self.max_chain
    }

    pub fn len(&self) -> usize {
        self.edges.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.read().is_empty()
    }

    /// Convert a value to the value class `to`.
    ///
    /// Candidate chains are tried shortest first, then in registration
    /// order; the first that produces a value wins. `None` covers both "no
    /// chain exists" and "every chain declined the value".
    pub fn convert(&self, value: &Value, to: TypeId) -> Option<Value> {
        let from = value.value_type();
        if from == to || to == TypeId::of::<Value>() {
            return Some(value.clone());
        }

        self.candidate_paths(from, to).iter().find_map(|path| {
            path.iter()
                .try_fold(value.clone(), |current, edge| edge.apply(&current))
        })
    }

    /// Typed convenience wrapper around [`convert`](Self::convert)
    pub fn convert_to<T: Any + Clone>(&self, value: &Value) -> Option<T> {
        self.convert(value, TypeId::of::<T>())
            .and_then(|v| v.downcast_ref::<T>().cloned())
    }

    /// Whether any chain from `from` to `to` exists (identity included)
    pub fn has_path(&self, from: TypeId, to: TypeId) -> bool {
        from == to || to == TypeId::of::<Value>() || !self.candidate_paths(from, to).is_empty()
    }

    fn candidate_paths(&self, from: TypeId, to: TypeId) -> Arc<Vec<Path>> {
        if let Some(entry) = self.paths.get(&(from, to)) {
            if entry.0 == self.generation() {
                return Arc::clone(&entry.1);
            }
        }
        let (generation, edges) = self.snapshot();
        let paths = Arc::new(find_paths(&edges, from, to, self.max_chain));
        self.cache_paths(from, to, generation, Arc::clone(&paths));
        paths
    }

    /// Edges together with the generation they belong to
    fn snapshot(&self) -> (u64, Arc<Vec<Arc<ConverterEdge>>>) {
        let edges = self.edges.read();
        (self.generation(), Arc::clone(&edges))
    }

    /// Keep `paths` unless a newer generation was cached meanwhile
    fn cache_paths(&self, from: TypeId, to: TypeId, generation: u64, paths: Arc<Vec<Path>>) {
        self.paths
            .entry((from, to))
            .and_modify(|entry| {
                if entry.0 <= generation {
                    *entry = (generation, Arc::clone(&paths));
                }
            })
            .or_insert_with(|| (generation, Arc::clone(&paths)));
    }
}

impl Default for ConverterRegistry {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Whether `next` may be appended to `path`.
///
/// An unsafe edge may appear at most once and only at either end of a
/// chain: the first hop, or a final hop nothing is appended to.
fn can_extend(path: &Path, next: &ConverterEdge, max_chain: usize) -> bool {
    let Some(last) = path.last() else {
        return true;
    };
    if last.flags.contains(ConverterFlags::NO_RIGHT_CHAINING)
        || next.flags.contains(ConverterFlags::NO_LEFT_CHAINING)
    {
        return false;
    }

    // `last` stops being an end of the chain unless it is the first hop
    if last.flags.is_unsafe() && path.len() > 1 {
        return false;
    }
    if next.flags.is_unsafe() && path.iter().any(|e| e.flags.is_unsafe()) {
        return false;
    }
    path.len() < max_chain
}

fn find_paths(edges: &[Arc<ConverterEdge>], from: TypeId, to: TypeId, max_chain: usize) -> Vec<Path> {
    let mut found = Vec::new();
    let mut queue: VecDeque<Path> = VecDeque::new();

    // Safe direct edges before unsafe ones, each group in registration order
    let mut starts: Vec<_> = edges.iter().filter(|e| e.from == from).collect();
    starts.sort_by_key(|e| e.flags.is_unsafe());
    for edge in starts {
        queue.push_back(vec![Arc::clone(edge)]);
    }

    while let Some(path) = queue.pop_front() {
        let Some(last) = path.last() else { continue };
        if last.to == to {
            found.push(path);
            if found.len() >= MAX_CANDIDATE_PATHS {
                break;
            }
            continue;
        }

        let visited: HashSet<TypeId> = std::iter::once(from).chain(path.iter().map(|e| e.to)).collect();
        for edge in edges.iter().filter(|e| e.from == last.to) {
            if visited.contains(&edge.to) || !can_extend(&path, edge, max_chain) {
                continue;
            }
            let mut extended = path.clone();
            extended.push(Arc::clone(edge));
            queue.push_back(extended);
        }
    }

    found
}
