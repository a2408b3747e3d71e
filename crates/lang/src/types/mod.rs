//! Semantic types and the Type Registry

mod registry;
mod semantic;

pub use registry::TypeRegistry;
pub use semantic::{
    ContextMask, DefaultFn, FormatterFn, ParseContext, ParserFn, SemanticType, TypeBuilder,
    OBJECT_TYPE,
};
