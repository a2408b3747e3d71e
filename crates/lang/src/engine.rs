//! Engine: the registries of one scripting environment and addon loading

use crate::arithmetic::{ArithmeticRegistry, Operator};
use crate::compare::{ComparatorOptions, ComparatorRegistry, Relation};
use crate::context::Event;
use crate::convert::{ConverterFlags, ConverterRegistry};
use crate::diagnostic::Diagnostic;
use crate::error::{RegistryError, Result};
use crate::model::ParsedNode;
use crate::parser::{Parser, ParserStats};
use crate::syntax::{SyntaxInfo, SyntaxKind, SyntaxRegistry, SyntaxSpec};
use crate::types::{SemanticType, TypeBuilder, TypeRegistry};
use crate::value::Value;
use skript_config::EngineConfig;
use parking_lot::Mutex;
use skript_core::{EdgeId, SyntaxId};
use std::any::Any;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{error, info};

/// A bundle of registrations loaded as a unit
pub trait Addon: Send + Sync {
    fn name(&self) -> &str;

    fn register(&self, registrar: &mut Registrar<'_>) -> Result<()>;
}

enum Registration {
    Type(String),
    Converter(EdgeId),
    Comparator(EdgeId),
    Operation(EdgeId),
    Syntax(SyntaxId),
}

/// Registration handle given to an addon.
///
/// Every registration is journaled so a failing addon can be rolled back.
pub struct Registrar<'e> {
    engine: &'e Engine,
    addon: String,
    journal: Vec<Registration>,
}

impl<'e> Registrar<'e> {
    fn new(engine: &'e Engine, addon: &str) -> Self {
        Self {
            engine,
            addon: addon.to_string(),
            journal: Vec::new(),
        }
    }

    pub fn engine(&self) -> &'e Engine {
        self.engine
    }

    pub fn addon(&self) -> &str {
        &self.addon
    }

    pub fn register_type(&mut self, builder: TypeBuilder) -> Result<Arc<SemanticType>> {
        let ty = self.engine.types.register(builder.build()?)?;
        self.journal.push(Registration::Type(ty.code_name().to_string()));
        Ok(ty)
    }

    pub fn register_converter<F, T, C>(&mut self, convert: C, flags: ConverterFlags) -> Result<EdgeId>
    where
        F: Any + Send + Sync,
        T: Any + Send + Sync,
        C: Fn(&F) -> Option<T> + Send + Sync + 'static,
    {
        let id = self.engine.converters.register(convert, flags)?;
        self.journal.push(Registration::Converter(id));
        Ok(id)
    }

    pub fn register_comparator<A, B, C>(&mut self, compare: C, options: ComparatorOptions) -> Result<EdgeId>
    where
        A: Any + Send + Sync,
        B: Any + Send + Sync,
        C: Fn(&A, &B) -> Relation + Send + Sync + 'static,
    {
        let id = self.engine.comparators.register(compare, options)?;
        self.journal.push(Registration::Comparator(id));
        Ok(id)
    }

    pub fn register_operation<L, R, T, F>(&mut self, operator: Operator, operation: F) -> Result<EdgeId>
    where
        L: Any + Send + Sync,
        R: Any + Send + Sync,
        T: Any + Send + Sync,
        F: Fn(&L, &R) -> Option<T> + Send + Sync + 'static,
    {
        let id = self.engine.arithmetic.register(operator, operation)?;
        self.journal.push(Registration::Operation(id));
        Ok(id)
    }

    pub fn register_syntax(&mut self, spec: SyntaxSpec) -> Result<Arc<SyntaxInfo>> {
        let spec = if spec.origin.is_empty() {
            spec.origin(self.addon.clone())
        } else {
            spec
        };
        let info = self.engine.syntaxes.register(spec)?;
        self.journal.push(Registration::Syntax(info.id()));
        Ok(info)
    }

    fn registrations(&self) -> usize {
        self.journal.len()
    }

    /// Undo every registration, newest first
    fn rollback(self) {
        for registration in self.journal.into_iter().rev() {
            match registration {
                Registration::Type(code_name) => {
                    self.engine.types.unregister(&code_name);
                }
                Registration::Converter(id) => {
                    self.engine.converters.unregister(id);
                }
                Registration::Comparator(id) => {
                    self.engine.comparators.unregister(id);
                }
                Registration::Operation(id) => {
                    self.engine.arithmetic.unregister(id);
                }
                Registration::Syntax(id) => {
                    self.engine.syntaxes.unregister(id);
                }
            }
        }
    }
}

/// Registries and configuration of one scripting environment. Cloning
/// shares the registries.
#[derive(Clone)]
pub struct Engine {
    types: Arc<TypeRegistry>,
    converters: Arc<ConverterRegistry>,
    comparators: Arc<ComparatorRegistry>,
    arithmetic: Arc<ArithmeticRegistry>,
    syntaxes: Arc<SyntaxRegistry>,
    config: Arc<EngineConfig>,
    stats: Arc<ParserStats>,
    /// Names of the addons loaded so far
    addons: Arc<Mutex<BTreeSet<String>>>,
}

impl Engine {
    /// Create a new engine with empty registries (only the `object` type)
    pub fn new(config: EngineConfig) -> Self {
        let types = Arc::new(TypeRegistry::new());
        let converters = Arc::new(ConverterRegistry::new(config.max_converter_chain));
        Self {
            comparators: Arc::new(ComparatorRegistry::new(Arc::clone(&converters))),
            arithmetic: Arc::new(ArithmeticRegistry::new(Arc::clone(&converters))),
            syntaxes: Arc::new(SyntaxRegistry::new(Arc::clone(&types))),
            types,
            converters,
            config: Arc::new(config),
            stats: Arc::new(ParserStats::default()),
            addons: Arc::new(Mutex::new(BTreeSet::new())),
        }
    }

    /// Create a new engine with the default types and syntaxes loaded
    pub fn with_defaults(config: EngineConfig) -> Result<Self> {
        let engine = Self::new(config);
        engine.load_addon(&crate::defaults::DefaultTypes)?;
        Ok(engine)
    }

    /// Load an addon. On failure everything it registered is removed again.
    pub fn load_addon(&self, addon: &dyn Addon) -> Result<()> {
        self.register_addon(addon)?;
        self.addons.lock().insert(addon.name().to_string());
        Ok(())
    }

    /// Load an addon unless one of the same name is already loaded;
    /// returns whether it was loaded now
    pub fn ensure_addon(&self, addon: &dyn Addon) -> Result<bool> {
        let mut loaded = self.addons.lock();
        if loaded.contains(addon.name()) {
            return Ok(false);
        }
        self.register_addon(addon)?;
        loaded.insert(addon.name().to_string());
        Ok(true)
    }

    pub fn is_addon_loaded(&self, name: &str) -> bool {
        self.addons.lock().contains(name)
    }

    fn register_addon(&self, addon: &dyn Addon) -> Result<()> {
        let mut registrar = Registrar::new(self, addon.name());
        match addon.register(&mut registrar) {
            Ok(()) => {
                info!(
                    "Loaded addon '{}' ({} registrations)",
                    addon.name(),
                    registrar.registrations()
                );
                Ok(())
            }
            Err(err) => {
                error!("Failed to load addon '{}': {}", addon.name(), err);
                registrar.rollback();
                Err(RegistryError::Addon {
                    addon: addon.name().to_string(),
                    message: err.to_string(),
                })
            }
        }
    }

    pub fn parser(&self) -> Parser<'_> {
        Parser::new(self)
    }

    pub fn parse_line(&self, text: &str, kind: SyntaxKind, expected: Option<&str>) -> std::result::Result<ParsedNode, Diagnostic> {
        self.parser().parse_line(text, kind, expected)
    }

    pub fn evaluate(&self, node: &ParsedNode, event: &Event) -> Vec<Value> {
        node.evaluate(event)
    }

    pub fn types(&self) -> &Arc<TypeRegistry> {
        &self.types
    }

    pub fn converters(&self) -> &Arc<ConverterRegistry> {
        &self.converters
    }

    pub fn comparators(&self) -> &Arc<ComparatorRegistry> {
        &self.comparators
    }

    pub fn arithmetic(&self) -> &Arc<ArithmeticRegistry> {
        &self.arithmetic
    }

    pub fn syntaxes(&self) -> &Arc<SyntaxRegistry> {
        &self.syntaxes
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn stats(&self) -> &ParserStats {
        &self.stats
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("types", &self.types.len())
            .field("converters", &self.converters.len())
            .field("comparators", &self.comparators.len())
            .field("operations", &self.arithmetic.len())
            .field("syntaxes", &self.syntaxes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Args, EffectImpl};

    struct Nothing;

    impl EffectImpl for Nothing {
        fn execute(&self, _: &Event, _: &Args<'_>) {}
    }

    /// Registers a type, a converter and a syntax, then fails
    struct Broken;

    impl Addon for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn register(&self, registrar: &mut Registrar<'_>) -> Result<()> {
            registrar.register_type(SemanticType::builder::<u8>("byte"))?;
            registrar.register_converter::<u8, u16, _>(|b| Some(*b as u16), ConverterFlags::NONE)?;
            registrar.register_syntax(SyntaxSpec::effect(&["poke %byte%"], |_| Ok(Box::new(Nothing))))?;
            registrar.register_type(SemanticType::builder::<u16>("byte"))?;
            Ok(())
        }
    }

    struct Fine;

    impl Addon for Fine {
        fn name(&self) -> &str {
            "fine"
        }

        fn register(&self, registrar: &mut Registrar<'_>) -> Result<()> {
            registrar.register_type(SemanticType::builder::<u8>("byte"))?;
            registrar.register_syntax(SyntaxSpec::effect(&["poke %byte%"], |_| Ok(Box::new(Nothing))))?;
            Ok(())
        }
    }

    #[test]
    fn test_failed_addon_is_rolled_back() {
        let engine = Engine::new(EngineConfig::default());
        let err = engine.load_addon(&Broken).unwrap_err();
        assert!(matches!(err, RegistryError::Addon { ref addon, .. } if addon == "broken"));
        assert!(engine.types().lookup_by_codename("byte").is_none());
        assert!(engine.converters().is_empty());
        assert!(engine.syntaxes().is_empty());

        // Same names register cleanly afterwards
        engine.load_addon(&Fine).unwrap();
        let info = &engine.syntaxes().descriptors_for(SyntaxKind::Effect)[0];
        assert_eq!(info.origin(), "fine");
    }

    #[test]
    fn test_engine_clones_share_registries() {
        let engine = Engine::new(EngineConfig::default());
        let clone = engine.clone();
        engine.load_addon(&Fine).unwrap();
        assert!(clone.types().lookup_by_codename("byte").is_some());
        assert!(clone.is_addon_loaded("fine"));
    }

    #[test]
    fn test_ensure_addon_loads_once() {
        let engine = Engine::new(EngineConfig::default());
        let clone = engine.clone();
        assert!(engine.ensure_addon(&Fine).unwrap());
        assert!(!clone.ensure_addon(&Fine).unwrap());
        assert_eq!(engine.syntaxes().len(), 1);

        assert!(engine.ensure_addon(&Broken).is_err());
        assert!(!engine.is_addon_loaded("broken"));
    }
}
