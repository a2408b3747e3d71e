use super::info::{SyntaxInfo, SyntaxSpec};
use super::{SyntaxKind, SyntaxPriority};
use crate::error::{RegistryError, Result};
use crate::pattern::Pattern;
use crate::types::TypeRegistry;
use parking_lot::RwLock;
use skript_core::{IdGenerator, SyntaxId};
use std::sync::Arc;

type Descriptors = Arc<Vec<Arc<SyntaxInfo>>>;

/// Registry of syntax descriptors, one ordered list per kind.
///
/// Lists are copy-on-write: readers take a snapshot `Arc` and never see a
/// half-applied registration.
pub struct SyntaxRegistry {
    types: Arc<TypeRegistry>,
    kinds: [RwLock<Descriptors>; 5],
    ids: IdGenerator<SyntaxId>,
}

impl SyntaxRegistry {
    /// Create a new registry resolving placeholder types against `types`
    pub fn new(types: Arc<TypeRegistry>) -> Self {
        Self {
            types,
            kinds: Default::default(),
            ids: IdGenerator::new(),
        }
    }

    /// Compile and register a syntax element
    pub fn register(&self, spec: SyntaxSpec) -> Result<Arc<SyntaxInfo>> {
        let info = self.build(self.ids.next_id(), spec)?;
        let info = Arc::new(info);
        self.insert(Arc::clone(&info));
        tracing::debug!(
            "Registered {} with priority {} ({} patterns)",
            info.describe(),
            info.priority().0,
            info.patterns().len()
        );
        Ok(info)
    }

    /// Remove a descriptor by id
    pub fn unregister(&self, id: SyntaxId) -> Option<Arc<SyntaxInfo>> {
        for slot in &self.kinds {
            let mut list = slot.write();
            if let Some(pos) = list.iter().position(|info| info.id() == id) {
                let mut next = Vec::clone(&list);
                let removed = next.remove(pos);
                *list = Arc::new(next);
                return Some(removed);
            }
        }
        None
    }

    /// Replace a descriptor, keeping its id. Used when an addon reloads.
    pub fn replace(&self, id: SyntaxId, spec: SyntaxSpec) -> Result<Arc<SyntaxInfo>> {
        let info = Arc::new(self.build(id, spec)?);
        if self.unregister(id).is_none() {
            return Err(RegistryError::UnknownSyntax(id));
        }
        self.insert(Arc::clone(&info));
        Ok(info)
    }

    /// Snapshot of the descriptors of a kind, in matching order
    pub fn descriptors_for(&self, kind: SyntaxKind) -> Descriptors {
        Arc::clone(&self.kinds[kind.slot()].read())
    }

    pub fn find(&self, id: SyntaxId) -> Option<Arc<SyntaxInfo>> {
        self.kinds
            .iter()
            .find_map(|slot| slot.read().iter().find(|info| info.id() == id).cloned())
    }

    pub fn len(&self) -> usize {
        self.kinds.iter().map(|slot| slot.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn build(&self, id: SyntaxId, spec: SyntaxSpec) -> Result<SyntaxInfo> {
        if spec.patterns.is_empty() {
            return Err(RegistryError::NoPatterns);
        }

        let patterns = spec
            .patterns
            .iter()
            .map(|source| Pattern::compile(source, &self.types))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let return_type = match &spec.return_type {
            Some(code_name) => Some(
                self.types
                    .lookup_by_codename(code_name)
                    .ok_or_else(|| RegistryError::UnknownType(code_name.clone()))?,
            ),
            None => None,
        };

        let priority = spec.priority.unwrap_or_else(|| {
            patterns
                .iter()
                .map(Pattern::inferred_priority)
                .max()
                .unwrap_or(SyntaxPriority::SIMPLE)
        });

        Ok(SyntaxInfo::new(
            id,
            patterns,
            priority,
            return_type,
            spec.factory,
            spec.origin,
        ))
    }

    /// Insert after every descriptor of lower or equal priority
    fn insert(&self, info: Arc<SyntaxInfo>) {
        let mut list = self.kinds[info.kind().slot()].write();
        let pos = list.partition_point(|other| other.priority() <= info.priority());
        let mut next = Vec::clone(&list);
        next.insert(pos, info);
        *list = Arc::new(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Event;
    use crate::model::{Args, EffectImpl};
    use crate::types::SemanticType;

    struct Nothing;

    impl EffectImpl for Nothing {
        fn execute(&self, _: &Event, _: &Args<'_>) {}
    }

    fn effect(patterns: &[&str]) -> SyntaxSpec {
        SyntaxSpec::effect(patterns, |_| Ok(Box::new(Nothing)))
    }

    fn registry() -> SyntaxRegistry {
        let types = Arc::new(TypeRegistry::new());
        types
            .register(SemanticType::builder::<i64>("integer").build().unwrap())
            .unwrap();
        SyntaxRegistry::new(types)
    }

    fn sources(registry: &SyntaxRegistry, kind: SyntaxKind) -> Vec<String> {
        registry
            .descriptors_for(kind)
            .iter()
            .map(|info| info.sources().next().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_priority_ordering() {
        let registry = registry();
        registry.register(effect(&["%integer% %integer%"])).unwrap();
        registry.register(effect(&["wait %integer%"])).unwrap();
        registry.register(effect(&["stop"])).unwrap();
        registry.register(effect(&["cancel"])).unwrap();

        assert_eq!(
            sources(&registry, SyntaxKind::Effect),
            vec!["stop", "cancel", "wait %integer%", "%integer% %integer%"]
        );
    }

    #[test]
    fn test_explicit_priority() {
        let registry = registry();
        registry.register(effect(&["stop"])).unwrap();
        registry
            .register(effect(&["wait %integer%"]).priority(SyntaxPriority::SIMPLE.before()))
            .unwrap();
        assert_eq!(sources(&registry, SyntaxKind::Effect), vec!["wait %integer%", "stop"]);
    }

    #[test]
    fn test_rejects_bad_specs() {
        let registry = registry();
        assert!(matches!(registry.register(effect(&[])), Err(RegistryError::NoPatterns)));
        assert!(matches!(
            registry.register(effect(&["wait %duration%"])),
            Err(RegistryError::Pattern(_))
        ));
        let spec = SyntaxSpec::expression("duration", &["forever"], |_| unreachable!());
        assert!(matches!(registry.register(spec), Err(RegistryError::UnknownType(_))));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unregister_and_replace_by_id() {
        let registry = registry();
        let a = registry.register(effect(&["stop"])).unwrap();
        let b = registry.register(effect(&["stop"])).unwrap();
        assert_ne!(a.id(), b.id());

        let snapshot = registry.descriptors_for(SyntaxKind::Effect);
        assert!(registry.unregister(a.id()).is_some());
        assert_eq!(snapshot.len(), 2);
        assert_eq!(registry.descriptors_for(SyntaxKind::Effect).len(), 1);
        assert!(registry.find(a.id()).is_none());

        let replaced = registry.replace(b.id(), effect(&["halt"])).unwrap();
        assert_eq!(replaced.id(), b.id());
        assert_eq!(sources(&registry, SyntaxKind::Effect), vec!["halt"]);
        assert!(matches!(
            registry.replace(a.id(), effect(&["halt"])),
            Err(RegistryError::UnknownSyntax(_))
        ));
    }
}
