//! Type Registry
//!
//! Holds every registered [`SemanticType`]. Lookups go through an index
//! that is built lazily and dropped whenever a type is added or removed,
//! so late (plugin) registration is picked up on the next lookup.

use super::semantic::{ParseContext, SemanticType, OBJECT_TYPE};
use crate::error::{ParseError, RegistryError, Result};
use crate::value::Value;
use parking_lot::RwLock;
use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Default)]
struct TypeIndex {
    by_code: HashMap<String, Arc<SemanticType>>,
    by_value: HashMap<TypeId, Arc<SemanticType>>,
    /// Registration order adjusted by `before`/`after` hints
    ordered: Vec<Arc<SemanticType>>,
}

/// Registry of semantic types
#[derive(Debug)]
pub struct TypeRegistry {
    types: RwLock<Vec<Arc<SemanticType>>>,
    index: RwLock<Option<Arc<TypeIndex>>>,
}

impl TypeRegistry {
    /// Create a new registry holding only the `object` type
    pub fn new() -> Self {
        Self {
            types: RwLock::new(vec![Arc::new(SemanticType::object())]),
            index: RwLock::new(None),
        }
    }

    /// Register a type.
    ///
    /// Fails with `DuplicateType` if the code name is taken and with
    /// `DuplicateValueClass` if another type already describes the same
    /// Rust type.
    pub fn register(&self, ty: SemanticType) -> Result<Arc<SemanticType>> {
        let mut types = self.types.write();

        if let Some(existing) = types.iter().find(|t| t.code_name() == ty.code_name()) {
            return Err(RegistryError::DuplicateType(existing.code_name().to_string()));
        }
        if let Some(existing) = types.iter().find(|t| t.value_type() == ty.value_type()) {
            return Err(RegistryError::DuplicateValueClass(
                ty.rust_name(),
                existing.code_name().to_string(),
            ));
        }

        let ty = Arc::new(ty);
        types.push(Arc::clone(&ty));
        *self.index.write() = None;

        tracing::debug!("Registered type '{}' ({})", ty.code_name(), ty.rust_name());
        Ok(ty)
    }

    /// Remove a type by code name. The `object` type cannot be removed.
    pub fn unregister(&self, code_name: &str) -> Option<Arc<SemanticType>> {
        if code_name == OBJECT_TYPE {
            return None;
        }
        let mut types = self.types.write();
        let pos = types.iter().position(|t| t.code_name() == code_name)?;
        let removed = types.remove(pos);
        *self.index.write() = None;
        Some(removed)
    }

    fn index(&self) -> Arc<TypeIndex> {
        if let Some(index) = self.index.read().as_ref() {
            return Arc::clone(index);
        }

        let types = self.types.read();
        let mut slot = self.index.write();
        // Another thread may have rebuilt it while we waited
        if let Some(index) = slot.as_ref() {
            return Arc::clone(index);
        }

        let index = Arc::new(build_index(&types));
        *slot = Some(Arc::clone(&index));
        index
    }

    pub fn object(&self) -> Arc<SemanticType> {
        // Registered in `new` and never removable
        self.index()
            .by_code
            .get(OBJECT_TYPE)
            .cloned()
            .unwrap_or_else(|| Arc::new(SemanticType::object()))
    }

    pub fn lookup_by_codename(&self, code_name: &str) -> Option<Arc<SemanticType>> {
        self.index().by_code.get(code_name).cloned()
    }

    pub fn lookup_by_value_class(&self, value_type: TypeId) -> Option<Arc<SemanticType>> {
        self.index().by_value.get(&value_type).cloned()
    }

    /// Resolve a code name as written in a pattern, where `numbers` means a
    /// plural `number`. Returns the type and whether the plural was used.
    pub fn resolve_pattern_name(&self, name: &str) -> Option<(Arc<SemanticType>, bool)> {
        let index = self.index();
        if let Some(ty) = index.by_code.get(name) {
            return Some((Arc::clone(ty), false));
        }

        let singulars = [
            name.strip_suffix("ies").map(|s| format!("{}y", s)),
            name.strip_suffix("es").map(str::to_string),
            name.strip_suffix('s').map(str::to_string),
        ];
        singulars
            .into_iter()
            .flatten()
            .find_map(|singular| index.by_code.get(&singular).cloned())
            .map(|ty| (ty, true))
    }

    /// Find the type a user refers to by name ("numbers", "a text", ...)
    pub fn lookup_by_user_input(&self, text: &str) -> Option<(Arc<SemanticType>, bool)> {
        let text = text.trim();
        let text = text
            .strip_prefix("a ")
            .or_else(|| text.strip_prefix("an "))
            .unwrap_or(text);

        self.index().ordered.iter().find_map(|ty| {
            let plural = text.eq_ignore_ascii_case(ty.plural());
            if text.eq_ignore_ascii_case(ty.name()) || plural || ty.matches_user_input(text) {
                Some((Arc::clone(ty), plural || text.to_ascii_lowercase().ends_with('s')))
            } else {
                None
            }
        })
    }

    /// Parse text as a value of the named type
    pub fn parse(&self, text: &str, code_name: &str, ctx: ParseContext) -> std::result::Result<Value, ParseError> {
        let ty = self
            .lookup_by_codename(code_name)
            .ok_or_else(|| ParseError::UnknownType(code_name.to_string()))?;

        if ty.is_object() {
            return self.parse_any(text, ctx).ok_or_else(|| ParseError::InvalidValue {
                input: text.to_string(),
                type_name: ty.name().to_string(),
            });
        }
        if !ty.can_parse(ctx) {
            return Err(ParseError::NotParseable(ty.name().to_string()));
        }

        ty.parse(text, ctx).ok_or_else(|| ParseError::InvalidValue {
            input: text.to_string(),
            type_name: ty.name().to_string(),
        })
    }

    /// Try every parser, in hint order, returning the first success
    pub fn parse_any(&self, text: &str, ctx: ParseContext) -> Option<Value> {
        self.index().ordered.iter().find_map(|ty| ty.parse(text, ctx))
    }

    /// Format a value with the formatter of its own type
    pub fn format(&self, value: &Value) -> String {
        match self.lookup_by_value_class(value.value_type()) {
            Some(ty) => ty.format(value),
            None => format!("{:?}", value),
        }
    }

    /// Format a value as the named type, falling back to its own type
    pub fn format_as(&self, value: &Value, code_name: &str) -> String {
        match self.lookup_by_codename(code_name) {
            Some(ty) if ty.is_instance(value) && ty.has_formatter() => ty.format(value),
            _ => self.format(value),
        }
    }

    /// All types in parse order
    pub fn types(&self) -> Vec<Arc<SemanticType>> {
        self.index().ordered.clone()
    }

    pub fn len(&self) -> usize {
        self.types.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.read().is_empty()
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn build_index(types: &[Arc<SemanticType>]) -> TypeIndex {
    let mut index = TypeIndex::default();
    for ty in types {
        index.by_code.insert(ty.code_name().to_string(), Arc::clone(ty));
        index.by_value.insert(ty.value_type(), Arc::clone(ty));
    }
    index.ordered = order_by_hints(types);
    index
}

/// Stable topological sort over `before`/`after` hints: at every step the
/// earliest registered type whose predecessors are all placed comes next.
fn order_by_hints(types: &[Arc<SemanticType>]) -> Vec<Arc<SemanticType>> {
    let position: HashMap<&str, usize> = types
        .iter()
        .enumerate()
        .map(|(i, t)| (t.code_name(), i))
        .collect();

    // preds[i] = types that must come before i
    let mut preds: Vec<HashSet<usize>> = vec![HashSet::new(); types.len()];
    for (i, ty) in types.iter().enumerate() {
        for later in ty.before() {
            if let Some(&j) = position.get(later.as_str()) {
                if j != i {
                    preds[j].insert(i);
                }
            }
        }
        for earlier in ty.after() {
            if let Some(&j) = position.get(earlier.as_str()) {
                if j != i {
                    preds[i].insert(j);
                }
            }
        }
    }

    let mut placed = vec![false; types.len()];
    let mut ordered = Vec::with_capacity(types.len());
    while ordered.len() < types.len() {
        let next = (0..types.len())
            .find(|&i| !placed[i] && preds[i].iter().all(|&p| placed[p]));
        match next {
            Some(i) => {
                placed[i] = true;
                ordered.push(Arc::clone(&types[i]));
            }
            None => {
                tracing::warn!("Cyclic type ordering hints, remaining types keep registration order");
                for (i, ty) in types.iter().enumerate() {
                    if !placed[i] {
                        placed[i] = true;
                        ordered.push(Arc::clone(ty));
                    }
                }
            }
        }
    }
    ordered
}
