//! Semantic type records

use crate::change::Changer;
use crate::context::Event;
use crate::error::{RegistryError, Result};
use crate::value::Value;
use regex::Regex;
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// Code name of the universal type every value is an instance of
pub const OBJECT_TYPE: &str = "object";

pub type ParserFn = Arc<dyn Fn(&str, ParseContext) -> Option<Value> + Send + Sync>;
pub type FormatterFn = Arc<dyn Fn(&Value) -> String + Send + Sync>;
pub type DefaultFn = Arc<dyn Fn(&Event) -> Option<Value> + Send + Sync>;

/// Where a literal is being parsed from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParseContext {
    /// Literal inside a script line
    Default,
    /// Argument typed by a user at runtime
    Command,
    /// Value read from a configuration file
    Config,
}

impl ParseContext {
    fn bit(self) -> u8 {
        match self {
            Self::Default => 1,
            Self::Command => 2,
            Self::Config => 4,
        }
    }
}

/// Set of parse contexts a type's parser accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextMask(u8);

impl ContextMask {
    pub const NONE: ContextMask = ContextMask(0);
    pub const ALL: ContextMask = ContextMask(7);

    pub fn only(ctx: ParseContext) -> Self {
        Self(ctx.bit())
    }

    pub fn with(self, ctx: ParseContext) -> Self {
        Self(self.0 | ctx.bit())
    }

    pub fn contains(&self, ctx: ParseContext) -> bool {
        self.0 & ctx.bit() != 0
    }
}

impl Default for ContextMask {
    fn default() -> Self {
        Self::ALL
    }
}

/// Registry record describing how values of one Rust type are parsed,
/// formatted, defaulted and changed by scripts
pub struct SemanticType {
    code_name: String,
    name: String,
    plural: String,
    value_type: TypeId,
    rust_name: &'static str,
    parser: Option<ParserFn>,
    contexts: ContextMask,
    formatter: Option<FormatterFn>,
    default: Option<DefaultFn>,
    changer: Option<Arc<dyn Changer>>,
    user_patterns: Vec<Regex>,
    before: Vec<String>,
    after: Vec<String>,
}

impl SemanticType {
    /// Start building a type for the value class `T`
    pub fn builder<T: Any + Send + Sync>(code_name: &str) -> TypeBuilder {
        TypeBuilder::new(code_name, TypeId::of::<T>(), std::any::type_name::<T>())
    }

    pub(crate) fn object() -> Self {
        Self {
            code_name: OBJECT_TYPE.into(),
            name: "object".into(),
            plural: "objects".into(),
            value_type: TypeId::of::<Value>(),
            rust_name: "object",
            parser: None,
            contexts: ContextMask::NONE,
            formatter: None,
            default: None,
            changer: None,
            user_patterns: Vec::new(),
            before: Vec::new(),
            after: Vec::new(),
        }
    }

    pub fn code_name(&self) -> &str {
        &self.code_name
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn plural(&self) -> &str {
        &self.plural
    }

    pub fn value_type(&self) -> TypeId {
        self.value_type
    }

    pub fn rust_name(&self) -> &'static str {
        self.rust_name
    }

    pub fn is_object(&self) -> bool {
        self.code_name == OBJECT_TYPE
    }

    /// Whether a value is an instance of this type
    pub fn is_instance(&self, value: &Value) -> bool {
        self.is_object() || self.value_type == value.value_type()
    }

    pub fn can_parse(&self, ctx: ParseContext) -> bool {
        self.parser.is_some() && self.contexts.contains(ctx)
    }

    /// Run the type's parser, if it has one for this context
    pub fn parse(&self, text: &str, ctx: ParseContext) -> Option<Value> {
        if !self.contexts.contains(ctx) {
            return None;
        }
        let parser = self.parser.as_ref()?;
        parser(text, ctx).filter(|v| self.is_instance(v))
    }

    pub fn format(&self, value: &Value) -> String {
        match &self.formatter {
            Some(formatter) => formatter(value),
            None => format!("{:?}", value),
        }
    }

    pub fn has_formatter(&self) -> bool {
        self.formatter.is_some()
    }

    pub fn default_value(&self, event: &Event) -> Option<Value> {
        self.default.as_ref().and_then(|supplier| supplier(event))
    }

    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    pub fn changer(&self) -> Option<&Arc<dyn Changer>> {
        self.changer.as_ref()
    }

    /// Whether user-typed text names this type ("number", "numbers", ...)
    pub fn matches_user_input(&self, text: &str) -> bool {
        self.user_patterns.iter().any(|re| re.is_match(text))
    }

    pub fn before(&self) -> &[String] {
        &self.before
    }

    pub fn after(&self) -> &[String] {
        &self.after
    }
}

impl fmt::Debug for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SemanticType")
            .field("code_name", &self.code_name)
            .field("rust_name", &self.rust_name)
            .field("parser", &self.parser.is_some())
            .field("changer", &self.changer.is_some())
            .finish()
    }
}

/// Builder for [`SemanticType`]
pub struct TypeBuilder {
    code_name: String,
    name: Option<(String, String)>,
    value_type: TypeId,
    rust_name: &'static str,
    parser: Option<ParserFn>,
    contexts: ContextMask,
    formatter: Option<FormatterFn>,
    default: Option<DefaultFn>,
    changer: Option<Arc<dyn Changer>>,
    user_patterns: Vec<String>,
    before: Vec<String>,
    after: Vec<String>,
}

impl TypeBuilder {
    fn new(code_name: &str, value_type: TypeId, rust_name: &'static str) -> Self {
        Self {
            code_name: code_name.to_string(),
            name: None,
            value_type,
            rust_name,
            parser: None,
            contexts: ContextMask::ALL,
            formatter: None,
            default: None,
            changer: None,
            user_patterns: Vec::new(),
            before: Vec::new(),
            after: Vec::new(),
        }
    }

    /// Singular and plural user-facing names
    pub fn name(mut self, singular: &str, plural: &str) -> Self {
        self.name = Some((singular.to_string(), plural.to_string()));
        self
    }

    pub fn parser<F>(mut self, parser: F) -> Self
    where
        F: Fn(&str, ParseContext) -> Option<Value> + Send + Sync + 'static,
    {
        self.parser = Some(Arc::new(parser));
        self
    }

    pub fn contexts(mut self, contexts: ContextMask) -> Self {
        self.contexts = contexts;
        self
    }

    pub fn formatter<F>(mut self, formatter: F) -> Self
    where
        F: Fn(&Value) -> String + Send + Sync + 'static,
    {
        self.formatter = Some(Arc::new(formatter));
        self
    }

    /// Supplier used when a placeholder of this type is omitted
    pub fn default_value<F>(mut self, supplier: F) -> Self
    where
        F: Fn(&Event) -> Option<Value> + Send + Sync + 'static,
    {
        self.default = Some(Arc::new(supplier));
        self
    }

    pub fn changer(mut self, changer: Arc<dyn Changer>) -> Self {
        self.changer = Some(changer);
        self
    }

    /// Regex (case-insensitive, full match) naming this type in user input
    pub fn user(mut self, pattern: &str) -> Self {
        self.user_patterns.push(pattern.to_string());
        self
    }

    /// Try this type's parser before the named type's
    pub fn before(mut self, code_name: &str) -> Self {
        self.before.push(code_name.to_string());
        self
    }

    /// Try this type's parser after the named type's
    pub fn after(mut self, code_name: &str) -> Self {
        self.after.push(code_name.to_string());
        self
    }

    pub fn build(self) -> Result<SemanticType> {
        if !is_valid_code_name(&self.code_name) {
            return Err(RegistryError::InvalidCodeName(self.code_name));
        }

        let user_patterns = self
            .user_patterns
            .iter()
            .map(|p| {
                Regex::new(&format!("(?i)^(?:{})$", p)).map_err(|e| {
                    RegistryError::InvalidUserPattern {
                        code_name: self.code_name.clone(),
                        message: e.to_string(),
                    }
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let (name, plural) = self
            .name
            .unwrap_or_else(|| (self.code_name.clone(), format!("{}s", self.code_name)));

        Ok(SemanticType {
            code_name: self.code_name,
            name,
            plural,
            value_type: self.value_type,
            rust_name: self.rust_name,
            parser: self.parser,
            contexts: self.contexts,
            formatter: self.formatter,
            default: self.default,
            changer: self.changer,
            user_patterns,
            before: self.before,
            after: self.after,
        })
    }
}

/// `(?:any-)?[a-z0-9]+`
fn is_valid_code_name(code_name: &str) -> bool {
    let rest = code_name.strip_prefix("any-").unwrap_or(code_name);
    !rest.is_empty() && rest.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
}
