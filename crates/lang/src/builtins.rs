//! Expressions the parser creates itself: variables, value lists, quoted
//! text with interpolation, runtime conversions and omitted-value defaults

use crate::arithmetic::{ArithmeticRegistry, Operator};
use crate::change::ChangeMode;
use crate::compare::{ComparatorRegistry, Relation};
use crate::context::Event;
use crate::convert::ConverterRegistry;
use crate::error::ChangeError;
use crate::model::{Args, ExpressionImpl, ParsedNode};
use crate::types::{SemanticType, TypeRegistry};
use crate::value::Value;
use std::any::TypeId;
use std::sync::Arc;

/// `{name}`, `{_name}` and the list forms `{name::*}`, `{_name::*}`
pub struct VariableExpr {
    name: String,
    local: bool,
    list: bool,
    comparators: Arc<ComparatorRegistry>,
    arithmetic: Arc<ArithmeticRegistry>,
}

impl VariableExpr {
    /// Build from the text between the braces. Returns `None` for an empty
    /// name.
    pub fn new(
        raw: &str,
        comparators: Arc<ComparatorRegistry>,
        arithmetic: Arc<ArithmeticRegistry>,
    ) -> Option<Self> {
        let raw = raw.trim();
        let (local, raw) = match raw.strip_prefix('_') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        let (list, name) = match raw.strip_suffix("::*") {
            Some(name) => (true, name),
            None => (false, raw),
        };
        if name.is_empty() || name.contains(|c: char| c == '{' || c == '}') {
            return None;
        }
        Some(Self {
            name: name.to_lowercase(),
            local,
            list,
            comparators,
            arithmetic,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_local(&self) -> bool {
        self.local
    }

    fn read(&self, event: &Event) -> Option<Value> {
        if self.local {
            event.local(&self.name)
        } else {
            event.globals().get(&self.name)
        }
    }

    fn write(&self, event: &Event, key: &str, value: Value) {
        if self.local {
            event.set_local(key, value);
        } else {
            event.globals().set(key, value);
        }
    }

    fn erase(&self, event: &Event, key: &str) {
        if self.local {
            event.remove_local(key);
        } else {
            event.globals().remove(key);
        }
    }

    fn entries(&self, event: &Event) -> Vec<(String, Value)> {
        if self.local {
            event.local_list(&self.name)
        } else {
            event.globals().list(&self.name)
        }
    }

    fn clear_list(&self, event: &Event) {
        if self.local {
            event.remove_local_list(&self.name);
        } else {
            event.globals().remove_list(&self.name);
        }
    }

    fn entry_key(&self, index: &str) -> String {
        format!("{}::{}", self.name, index)
    }

    fn next_index(&self, event: &Event) -> u64 {
        self.entries(event)
            .iter()
            .filter_map(|(index, _)| index.parse::<u64>().ok())
            .max()
            .unwrap_or(0)
            + 1
    }

    fn change_single(&self, event: &Event, delta: &[Value], mode: ChangeMode) -> Result<(), ChangeError> {
        match mode {
            ChangeMode::Set => {
                if let Some(value) = delta.first() {
                    self.write(event, &self.name, value.clone());
                }
            }
            ChangeMode::Add | ChangeMode::Remove => {
                let operator = if mode == ChangeMode::Add {
                    Operator::Add
                } else {
                    Operator::Subtract
                };
                for d in delta {
                    let next = match self.read(event) {
                        Some(current) => self.arithmetic.calculate(operator, &current, d).ok_or_else(|| {
                            ChangeError::InvalidDelta(format!(
                                "can't {} {:?} {} the variable {{{}}}",
                                mode,
                                d,
                                if mode == ChangeMode::Add { "to" } else { "from" },
                                self.name
                            ))
                        })?,
                        None if mode == ChangeMode::Add => d.clone(),
                        None => continue,
                    };
                    self.write(event, &self.name, next);
                }
            }
            _ => self.erase(event, &self.name),
        }
        Ok(())
    }

    fn change_list(&self, event: &Event, delta: &[Value], mode: ChangeMode) {
        match mode {
            ChangeMode::Set => {
                self.clear_list(event);
                for (i, value) in delta.iter().enumerate() {
                    self.write(event, &self.entry_key(&(i + 1).to_string()), value.clone());
                }
            }
            ChangeMode::Add => {
                let mut next = self.next_index(event);
                for value in delta {
                    self.write(event, &self.entry_key(&next.to_string()), value.clone());
                    next += 1;
                }
            }
            ChangeMode::Remove | ChangeMode::RemoveAll => {
                let mut entries = self.entries(event);
                for d in delta {
                    let matches: Vec<String> = entries
                        .iter()
                        .filter(|(_, v)| self.comparators.satisfies(v, Relation::Equal, d))
                        .map(|(index, _)| index.clone())
                        .take(if mode == ChangeMode::Remove { 1 } else { usize::MAX })
                        .collect();
                    for index in matches {
                        self.erase(event, &self.entry_key(&index));
                        entries.retain(|(i, _)| *i != index);
                    }
                }
            }
            ChangeMode::Delete | ChangeMode::Reset => self.clear_list(event),
        }
    }
}

impl ExpressionImpl for VariableExpr {
    fn get(&self, event: &Event, _args: &Args<'_>) -> Vec<Value> {
        if self.list {
            self.entries(event).into_iter().map(|(_, v)| v).collect()
        } else {
            self.read(event).into_iter().collect()
        }
    }

    fn is_single(&self) -> bool {
        !self.list
    }

    fn accept_change(&self, mode: ChangeMode) -> Option<Vec<TypeId>> {
        if mode == ChangeMode::RemoveAll && !self.list {
            return None;
        }
        Some(vec![TypeId::of::<Value>()])
    }

    fn change(
        &self,
        event: &Event,
        _args: &Args<'_>,
        delta: Option<&[Value]>,
        mode: ChangeMode,
    ) -> Result<(), ChangeError> {
        let delta = delta.unwrap_or(&[]);
        if self.list {
            self.change_list(event, delta, mode);
            Ok(())
        } else {
            self.change_single(event, delta, mode)
        }
    }
}

/// `a, b and c` / `a, b or c`
pub struct ListExpr {
    and: bool,
}

impl ListExpr {
    pub fn new(and: bool) -> Self {
        Self { and }
    }
}

impl ExpressionImpl for ListExpr {
    fn get(&self, _event: &Event, args: &Args<'_>) -> Vec<Value> {
        (0..args.len()).flat_map(|i| args.values(i).iter().cloned()).collect()
    }

    fn is_single(&self) -> bool {
        false
    }

    fn is_and(&self) -> bool {
        self.and
    }
}

/// Runtime conversion of an expression whose values are not statically
/// known to fit a placeholder. Values that convert to none of the targets
/// are dropped.
pub struct ConvertedExpr {
    source: ParsedNode,
    targets: Vec<Arc<SemanticType>>,
    converters: Arc<ConverterRegistry>,
}

impl ConvertedExpr {
    pub fn new(source: ParsedNode, targets: Vec<Arc<SemanticType>>, converters: Arc<ConverterRegistry>) -> Self {
        Self {
            source,
            targets,
            converters,
        }
    }
}

impl ExpressionImpl for ConvertedExpr {
    fn get(&self, _event: &Event, args: &Args<'_>) -> Vec<Value> {
        args.values(0)
            .iter()
            .filter_map(|value| {
                if self.targets.iter().any(|t| t.is_instance(value)) {
                    return Some(value.clone());
                }
                self.targets
                    .iter()
                    .find_map(|t| self.converters.convert(value, t.value_type()))
            })
            .collect()
    }

    fn is_single(&self) -> bool {
        self.source.is_single()
    }

    fn is_and(&self) -> bool {
        self.source.is_and_list()
    }

    fn accept_change(&self, mode: ChangeMode) -> Option<Vec<TypeId>> {
        self.source.accept_change(mode)
    }

    fn change(
        &self,
        event: &Event,
        _args: &Args<'_>,
        delta: Option<&[Value]>,
        mode: ChangeMode,
    ) -> Result<(), ChangeError> {
        self.source.apply_change(event, delta, mode)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextPart {
    Text(String),
    /// Index of the interpolated sub-node
    Expr(usize),
}

/// Quoted text containing `%expression%` parts
pub struct InterpolatedText {
    parts: Vec<TextPart>,
    types: Arc<TypeRegistry>,
}

impl InterpolatedText {
    pub fn new(parts: Vec<TextPart>, types: Arc<TypeRegistry>) -> Self {
        Self { parts, types }
    }
}

impl ExpressionImpl for InterpolatedText {
    fn get(&self, _event: &Event, args: &Args<'_>) -> Vec<Value> {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                TextPart::Text(text) => out.push_str(text),
                TextPart::Expr(i) => {
                    let items: Vec<String> = args.values(*i).iter().map(|v| self.types.format(v)).collect();
                    let and = args.node(*i).map(ParsedNode::is_and_list).unwrap_or(true);
                    if items.is_empty() {
                        out.push_str("<none>");
                    } else {
                        out.push_str(&join_list(&items, and));
                    }
                }
            }
        }
        vec![Value::new(out)]
    }
}

/// Event-supplied default of an omitted placeholder
pub struct DefaultValue {
    ty: Arc<SemanticType>,
}

impl DefaultValue {
    pub fn new(ty: Arc<SemanticType>) -> Self {
        Self { ty }
    }
}

impl ExpressionImpl for DefaultValue {
    fn get(&self, event: &Event, _args: &Args<'_>) -> Vec<Value> {
        self.ty.default_value(event).into_iter().collect()
    }
}

/// Join items as `a, b and c` (or `a, b or c`)
pub fn join_list(items: &[String], and: bool) -> String {
    match items {
        [] => String::new(),
        [only] => only.clone(),
        [init @ .., last] => format!("{} {} {}", init.join(", "), if and { "and" } else { "or" }, last),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compare::ComparatorOptions;
    use crate::convert::ConverterFlags;

    struct Fixture {
        converters: Arc<ConverterRegistry>,
        comparators: Arc<ComparatorRegistry>,
        arithmetic: Arc<ArithmeticRegistry>,
    }

    fn fixture() -> Fixture {
        let converters = Arc::new(ConverterRegistry::default());
        let comparators = Arc::new(ComparatorRegistry::new(converters.clone()));
        comparators
            .register::<i64, i64, _>(|a, b| Relation::from_ordering(a.cmp(b)), ComparatorOptions::ordered())
            .unwrap();
        let arithmetic = Arc::new(ArithmeticRegistry::new(converters.clone()));
        arithmetic
            .register::<i64, i64, i64, _>(Operator::Add, |a, b| a.checked_add(*b))
            .unwrap();
        arithmetic
            .register::<i64, i64, i64, _>(Operator::Subtract, |a, b| a.checked_sub(*b))
            .unwrap();
        Fixture {
            converters,
            comparators,
            arithmetic,
        }
    }

    fn variable(f: &Fixture, raw: &str) -> VariableExpr {
        VariableExpr::new(raw, f.comparators.clone(), f.arithmetic.clone()).unwrap()
    }

    fn ints(values: Vec<Value>) -> Vec<i64> {
        values.iter().filter_map(|v| v.downcast_ref::<i64>().copied()).collect()
    }

    fn change(var: &VariableExpr, event: &Event, delta: &[i64], mode: ChangeMode) {
        let delta: Vec<Value> = delta.iter().map(|&d| Value::new(d)).collect();
        var.change(event, &Args::evaluate(&[], event), Some(&delta), mode).unwrap();
    }

    fn get(var: &VariableExpr, event: &Event) -> Vec<i64> {
        ints(var.get(event, &Args::evaluate(&[], event)))
    }

    #[test]
    fn test_variable_names() {
        let f = fixture();
        let local = variable(&f, "_Count");
        assert!(local.is_local());
        assert_eq!(local.name(), "count");
        assert!(!variable(&f, "items::*").is_single());
        assert!(VariableExpr::new("", f.comparators.clone(), f.arithmetic.clone()).is_none());
        assert!(VariableExpr::new("_", f.comparators.clone(), f.arithmetic.clone()).is_none());
    }

    #[test]
    fn test_single_variable_changes() {
        let f = fixture();
        let event = Event::new("test");
        let var = variable(&f, "x");

        change(&var, &event, &[2], ChangeMode::Remove);
        assert!(get(&var, &event).is_empty());
        change(&var, &event, &[2], ChangeMode::Add);
        change(&var, &event, &[3], ChangeMode::Add);
        assert_eq!(get(&var, &event), vec![5]);
        change(&var, &event, &[1], ChangeMode::Remove);
        assert_eq!(get(&var, &event), vec![4]);
        change(&var, &event, &[9], ChangeMode::Set);
        assert_eq!(event.globals().get("x").and_then(|v| v.downcast_ref::<i64>().copied()), Some(9));
        change(&var, &event, &[], ChangeMode::Delete);
        assert!(get(&var, &event).is_empty());
        assert!(var.accept_change(ChangeMode::RemoveAll).is_none());
    }

    #[test]
    fn test_add_without_operation_fails() {
        let f = fixture();
        let event = Event::new("test");
        let var = variable(&f, "_x");
        change(&var, &event, &[1], ChangeMode::Set);
        let text = [Value::new(String::from("a"))];
        let result = var.change(&event, &Args::evaluate(&[], &event), Some(&text), ChangeMode::Add);
        assert!(matches!(result, Err(ChangeError::InvalidDelta(_))));
    }

    #[test]
    fn test_list_variable_changes() {
        let f = fixture();
        let event = Event::new("test");
        let list = variable(&f, "_l::*");

        change(&list, &event, &[1, 2, 1, 3], ChangeMode::Set);
        change(&list, &event, &[4], ChangeMode::Add);
        assert_eq!(get(&list, &event), vec![1, 2, 1, 3, 4]);
        change(&list, &event, &[1], ChangeMode::Remove);
        assert_eq!(get(&list, &event), vec![2, 1, 3, 4]);
        change(&list, &event, &[1, 4], ChangeMode::RemoveAll);
        assert_eq!(get(&list, &event), vec![2, 3]);
        change(&list, &event, &[], ChangeMode::Delete);
        assert!(get(&list, &event).is_empty());
    }

    #[test]
    fn test_converted_expression() {
        let f = fixture();
        f.converters
            .register::<String, i64, _>(|s| s.parse().ok(), ConverterFlags::NONE)
            .unwrap();
        let types = TypeRegistry::new();
        let integer = types
            .register(SemanticType::builder::<i64>("integer").build().unwrap())
            .unwrap();

        let source = ParsedNode::literal(Value::new(String::from("12")), types.object());
        let converted = ConvertedExpr::new(source.clone(), vec![integer], f.converters.clone());
        let event = Event::new("test");
        let args = [Some(source)];
        assert_eq!(ints(converted.get(&event, &Args::evaluate(&args, &event))), vec![12]);
    }

    #[test]
    fn test_join_list() {
        let items: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        assert_eq!(join_list(&items, true), "a, b and c");
        assert_eq!(join_list(&items[..2], false), "a or b");
        assert_eq!(join_list(&items[..1], true), "a");
    }
}
