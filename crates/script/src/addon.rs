//! Registration of the script-level structures

use crate::options::OptionsStructure;
use crate::trigger::TriggerStructure;
use skript_lang::{Addon, NodeType, Registrar, SyntaxPriority, SyntaxSpec};

/// Registers the `options:` and `on <event>:` structures.
///
/// Loaded once per engine. Triggers publish into the registry the loader
/// puts in each script's data, so managers sharing an engine stay apart.
pub struct ScriptAddon;

impl ScriptAddon {
    pub const NAME: &'static str = "skript-script";
}

impl Addon for ScriptAddon {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn register(&self, registrar: &mut Registrar<'_>) -> skript_lang::Result<()> {
        registrar.register_syntax(
            SyntaxSpec::structure(&["options"], NodeType::Section, |_| Ok(Box::new(OptionsStructure)))
                .priority(SyntaxPriority::SIMPLE),
        )?;

        registrar.register_syntax(
            SyntaxSpec::structure(&["[on] <.+>"], NodeType::Section, |result| {
                let header = result
                    .regex(0)
                    .ok_or_else(|| "An event handler needs an event".to_string())?;
                Ok(Box::new(TriggerStructure::new(header.trim())))
            })
            .priority(SyntaxPriority::PATTERN_MATCHES_EVERYTHING),
        )?;
        Ok(())
    }
}
