//! Built-in addon: numbers, integers, text and booleans, their converters,
//! comparators and arithmetic, and the core syntaxes (comparison, change
//! effects, broadcast, arithmetic and the load event)

use crate::arithmetic::{ArithmeticRegistry, Operator};
use crate::builtins::join_list;
use crate::change::ChangeMode;
use crate::compare::{ComparatorOptions, ComparatorRegistry, Relation};
use crate::context::Event;
use crate::convert::{ConverterFlags, ConverterRegistry};
use crate::engine::{Addon, Registrar};
use crate::error::Result;
use crate::model::{Args, ConditionImpl, EffectImpl, EventImpl, ExpressionImpl, ParsedNode};
use crate::syntax::{MatchResult, SyntaxSpec};
use crate::types::{ContextMask, ParseContext, SemanticType, TypeRegistry};
use crate::value::Value;
use std::any::TypeId;
use std::cmp::Ordering;
use std::sync::Arc;

pub struct DefaultTypes;

impl Addon for DefaultTypes {
    fn name(&self) -> &str {
        "skript"
    }

    fn register(&self, registrar: &mut Registrar<'_>) -> Result<()> {
        register_types(registrar)?;
        register_relations(registrar)?;
        register_arithmetic(registrar)?;
        register_syntaxes(registrar)?;
        Ok(())
    }
}

/// Whole numbers print without decimals
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

fn register_types(registrar: &mut Registrar<'_>) -> Result<()> {
    registrar.register_type(
        SemanticType::builder::<f64>("number")
            .name("number", "numbers")
            .user("num(ber)?s?")
            .parser(|text, _| {
                let numeric = !text.is_empty()
                    && text.chars().any(|c| c.is_ascii_digit())
                    && text.chars().all(|c| c.is_ascii_digit() || c == '.' || c == '-');
                numeric.then(|| text.parse::<f64>().ok()).flatten().map(Value::new)
            })
            .formatter(|value| value.downcast_ref::<f64>().map(|n| format_number(*n)).unwrap_or_default()),
    )?;

    registrar.register_type(
        SemanticType::builder::<i64>("integer")
            .name("integer", "integers")
            .user("int(eger)?s?")
            .before("number")
            .parser(|text, _| {
                let digits = text.strip_prefix('-').unwrap_or(text);
                let integral = !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit());
                integral.then(|| text.parse::<i64>().ok()).flatten().map(Value::new)
            })
            .formatter(|value| value.downcast_ref::<i64>().map(i64::to_string).unwrap_or_default()),
    )?;

    // Unquoted text only parses in commands and configs
    registrar.register_type(
        SemanticType::builder::<String>("text")
            .name("text", "texts")
            .user("(text|string)s?")
            .parser(|text, _| Some(Value::new(text.to_string())))
            .contexts(ContextMask::only(ParseContext::Command).with(ParseContext::Config))
            .formatter(|value| value.downcast_ref::<String>().cloned().unwrap_or_default()),
    )?;

    registrar.register_type(
        SemanticType::builder::<bool>("boolean")
            .name("boolean", "booleans")
            .user("booleans?")
            .parser(|text, _| match text.to_lowercase().as_str() {
                "true" | "yes" | "on" => Some(Value::new(true)),
                "false" | "no" | "off" => Some(Value::new(false)),
                _ => None,
            })
            .formatter(|value| value.downcast_ref::<bool>().map(bool::to_string).unwrap_or_default()),
    )?;

    registrar.register_converter::<i64, f64, _>(|i| Some(*i as f64), ConverterFlags::NONE)?;
    Ok(())
}

fn ordering(ord: Option<Ordering>) -> Relation {
    ord.map(Relation::from_ordering).unwrap_or(Relation::Incomparable)
}

fn register_relations(registrar: &mut Registrar<'_>) -> Result<()> {
    registrar.register_comparator::<f64, f64, _>(|a, b| ordering(a.partial_cmp(b)), ComparatorOptions::ordered())?;
    registrar.register_comparator::<i64, i64, _>(|a, b| Relation::from_ordering(a.cmp(b)), ComparatorOptions::ordered())?;
    registrar.register_comparator::<i64, f64, _>(
        |a, b| ordering((*a as f64).partial_cmp(b)),
        ComparatorOptions::ordered(),
    )?;
    registrar.register_comparator::<String, String, _>(
        |a, b| Relation::from_equality(a.to_lowercase() == b.to_lowercase()),
        ComparatorOptions::equality(),
    )?;
    registrar.register_comparator::<bool, bool, _>(|a, b| Relation::from_equality(a == b), ComparatorOptions::equality())?;
    Ok(())
}

fn register_arithmetic(registrar: &mut Registrar<'_>) -> Result<()> {
    registrar.register_operation::<f64, f64, f64, _>(Operator::Add, |a, b| Some(a + b))?;
    registrar.register_operation::<f64, f64, f64, _>(Operator::Subtract, |a, b| Some(a - b))?;
    registrar.register_operation::<f64, f64, f64, _>(Operator::Multiply, |a, b| Some(a * b))?;
    registrar.register_operation::<f64, f64, f64, _>(Operator::Divide, |a, b| (*b != 0.0).then(|| a / b))?;
    registrar.register_operation::<f64, f64, f64, _>(Operator::Exponent, |a, b| Some(a.powf(*b)))?;

    registrar.register_operation::<i64, i64, i64, _>(Operator::Add, |a, b| a.checked_add(*b))?;
    registrar.register_operation::<i64, i64, i64, _>(Operator::Subtract, |a, b| a.checked_sub(*b))?;
    registrar.register_operation::<i64, i64, i64, _>(Operator::Multiply, |a, b| a.checked_mul(*b))?;
    registrar.register_operation::<i64, i64, f64, _>(Operator::Divide, |a, b| {
        (*b != 0).then(|| *a as f64 / *b as f64)
    })?;
    registrar.register_operation::<i64, i64, i64, _>(Operator::Exponent, |a, b| {
        u32::try_from(*b).ok().and_then(|exp| a.checked_pow(exp))
    })?;
    Ok(())
}

const COMPARISON_PATTERNS: [(&str, Option<Relation>); 7] = [
    ("%objects% (is|are) [1¦(not|neither)] %objects%", Some(Relation::Equal)),
    (
        "%objects% (is|are) [1¦not] (greater|more|higher|bigger|larger) than or equal to %objects%",
        Some(Relation::GreaterOrEqual),
    ),
    (
        "%objects% (is|are) [1¦not] (greater|more|higher|bigger|larger) than %objects%",
        Some(Relation::Greater),
    ),
    (
        "%objects% (is|are) [1¦not] (less|smaller|lower) than or equal to %objects%",
        Some(Relation::SmallerOrEqual),
    ),
    ("%objects% (is|are) [1¦not] (less|smaller|lower) than %objects%", Some(Relation::Smaller)),
    ("%objects% (1¦!=|==|=) %objects%", Some(Relation::Equal)),
    // relation taken from the chosen symbol
    ("%objects% (\\>=|\\<=|\\>|\\<) %objects%", None),
];

const SYMBOL_RELATIONS: [Relation; 4] = [
    Relation::GreaterOrEqual,
    Relation::SmallerOrEqual,
    Relation::Greater,
    Relation::Smaller,
];

const OPERATORS: [Operator; 5] = [
    Operator::Add,
    Operator::Subtract,
    Operator::Multiply,
    Operator::Divide,
    Operator::Exponent,
];

fn register_syntaxes(registrar: &mut Registrar<'_>) -> Result<()> {
    let engine = registrar.engine().clone();

    let patterns: Vec<&str> = COMPARISON_PATTERNS.iter().map(|(p, _)| *p).collect();
    let comparators = Arc::clone(engine.comparators());
    registrar.register_syntax(SyntaxSpec::condition(&patterns, move |result| {
        CompareCondition::create(result, Arc::clone(&comparators)).map(|c| Box::new(c) as Box<dyn ConditionImpl>)
    }))?;

    let changes: [(&str, ChangeMode, usize, Option<usize>); 6] = [
        ("set %~objects% to %objects%", ChangeMode::Set, 0, Some(1)),
        ("add %objects% to %~objects%", ChangeMode::Add, 1, Some(0)),
        ("remove all %objects% from %~objects%", ChangeMode::RemoveAll, 1, Some(0)),
        ("remove %objects% from %~objects%", ChangeMode::Remove, 1, Some(0)),
        ("(delete|clear) %~objects%", ChangeMode::Delete, 0, None),
        ("reset %~objects%", ChangeMode::Reset, 0, None),
    ];
    for (pattern, mode, target, delta) in changes {
        let converters = Arc::clone(engine.converters());
        registrar.register_syntax(SyntaxSpec::effect(&[pattern], move |result| {
            ChangeEffect::create(result, mode, target, delta, Arc::clone(&converters))
                .map(|e| Box::new(e) as Box<dyn EffectImpl>)
        }))?;
    }

    let types = Arc::clone(engine.types());
    registrar.register_syntax(SyntaxSpec::effect(&["broadcast %objects%"], move |_| {
        Ok(Box::new(Broadcast {
            types: Arc::clone(&types),
        }))
    }))?;

    let arithmetic = Arc::clone(engine.arithmetic());
    registrar.register_syntax(SyntaxSpec::expression(
        "object",
        &["%object% (+|-|*|/|^) %object%"],
        move |result| Arithmetic::create(result, Arc::clone(&arithmetic)).map(|a| Box::new(a) as Box<dyn ExpressionImpl>),
    ))?;

    registrar.register_syntax(SyntaxSpec::event(&["[script] load"], &["load"], |_| {
        Ok(Box::new(Always))
    }))?;
    registrar.register_syntax(SyntaxSpec::event(&["command %*text%"], &["command"], |result| {
        let name = result
            .expr(0)
            .and_then(literal_text)
            .ok_or_else(|| "A command name must be given as text".to_string())?;
        Ok(Box::new(CommandEvent {
            name: name.trim_start_matches('/').to_lowercase(),
        }))
    }))?;
    Ok(())
}

fn literal_text(node: &ParsedNode) -> Option<String> {
    match node {
        ParsedNode::Literal(lit) => lit.value().downcast_ref::<String>().cloned(),
        _ => None,
    }
}

/// Plural-aware comparison of two value lists
struct CompareCondition {
    relation: Relation,
    negated: bool,
    comparators: Arc<ComparatorRegistry>,
}

impl CompareCondition {
    fn create(result: &MatchResult, comparators: Arc<ComparatorRegistry>) -> std::result::Result<Self, String> {
        let relation = match COMPARISON_PATTERNS.get(result.pattern) {
            Some((_, Some(relation))) => *relation,
            _ => result
                .choice(0)
                .and_then(|choice| SYMBOL_RELATIONS.get(choice).copied())
                .ok_or_else(|| "Unknown comparison".to_string())?,
        };

        let known = |i: usize| {
            result
                .expr(i)
                .and_then(ParsedNode::return_type)
                .filter(|t| !t.is_object())
                .cloned()
        };
        if let (Some(left), Some(right)) = (known(0), known(1)) {
            if !comparators.is_comparable(left.value_type(), right.value_type()) {
                return Err(format!("Can't compare {} with {}", left.plural(), right.plural()));
            }
            if relation.is_ordering() && !comparators.supports_ordering(left.value_type(), right.value_type()) {
                return Err(format!(
                    "Can't test whether {} are greater or smaller than {}",
                    left.plural(),
                    right.plural()
                ));
            }
        }

        Ok(Self {
            relation,
            negated: result.has_mark(1),
            comparators,
        })
    }
}

impl ConditionImpl for CompareCondition {
    fn check(&self, _event: &Event, args: &Args<'_>) -> bool {
        let (left, right) = (args.values(0), args.values(1));
        if left.is_empty() || right.is_empty() {
            return false;
        }
        let left_and = args.node(0).map_or(true, ParsedNode::is_and_list);
        let right_and = args.node(1).map_or(true, ParsedNode::is_and_list);

        let holds = |l: &Value| {
            let test = |r: &Value| self.comparators.satisfies(l, self.relation, r);
            if right_and {
                right.iter().all(test)
            } else {
                right.iter().any(test)
            }
        };
        if left_and {
            left.iter().all(holds)
        } else {
            left.iter().any(holds)
        }
    }

    fn is_negated(&self) -> bool {
        self.negated
    }
}

/// `set`, `add`, `remove`, `remove all`, `delete` and `reset`
struct ChangeEffect {
    mode: ChangeMode,
    target: usize,
    delta: Option<usize>,
    /// Delta value classes the target accepts; `Value` means any
    accepted: Vec<TypeId>,
    converters: Arc<ConverterRegistry>,
}

impl ChangeEffect {
    fn create(
        result: &MatchResult,
        mode: ChangeMode,
        target: usize,
        delta: Option<usize>,
        converters: Arc<ConverterRegistry>,
    ) -> std::result::Result<Self, String> {
        let node = result.expr(target).ok_or_else(|| "Missing change target".to_string())?;
        let accepted = node.accept_change(mode).ok_or_else(|| refusal(node, mode))?;

        if let Some(delta_node) = delta.and_then(|i| result.expr(i)) {
            if mode == ChangeMode::Set && node.is_single() && !delta_node.is_single() {
                return Err(format!("{} can only be set to one value, not more", node.label()));
            }
            let accepts_any = accepted.contains(&TypeId::of::<Value>());
            if let Some(ty) = delta_node.return_type().filter(|t| !t.is_object() && !accepts_any) {
                let fits = accepted
                    .iter()
                    .any(|class| *class == ty.value_type() || converters.has_path(ty.value_type(), *class));
                if !fits {
                    return Err(format!("{} can't be {} {}", node.label(), past_tense(mode), ty.plural()));
                }
            }
        }

        Ok(Self {
            mode,
            target,
            delta,
            accepted,
            converters,
        })
    }

    fn convert_delta(&self, values: &[Value]) -> Vec<Value> {
        if self.accepted.contains(&TypeId::of::<Value>()) {
            return values.to_vec();
        }
        values
            .iter()
            .filter_map(|value| {
                if self.accepted.contains(&value.value_type()) {
                    return Some(value.clone());
                }
                self.accepted
                    .iter()
                    .find_map(|class| self.converters.convert(value, *class))
            })
            .collect()
    }
}

fn past_tense(mode: ChangeMode) -> &'static str {
    match mode {
        ChangeMode::Set => "set to",
        ChangeMode::Add => "added",
        ChangeMode::Remove | ChangeMode::RemoveAll => "removed",
        ChangeMode::Delete => "deleted",
        ChangeMode::Reset => "reset",
    }
}

fn refusal(node: &ParsedNode, mode: ChangeMode) -> String {
    let what = node.label();
    match mode {
        ChangeMode::Set => format!("{} can't be set to anything", what),
        ChangeMode::Add => format!("{} can't have anything added to it", what),
        ChangeMode::Remove | ChangeMode::RemoveAll => format!("{} can't have anything removed from it", what),
        ChangeMode::Delete => format!("{} can't be deleted", what),
        ChangeMode::Reset => format!("{} can't be reset", what),
    }
}

impl EffectImpl for ChangeEffect {
    fn execute(&self, event: &Event, args: &Args<'_>) {
        let Some(target) = args.node(self.target) else {
            return;
        };
        let delta = self.delta.map(|i| self.convert_delta(args.values(i)));
        if let Some(values) = &delta {
            if values.is_empty() && self.mode.takes_delta() {
                return;
            }
        }
        if let Err(err) = target.apply_change(event, delta.as_deref(), self.mode) {
            tracing::warn!("Failed to {} {}: {}", self.mode, target.label(), err);
        }
    }
}

struct Broadcast {
    types: Arc<TypeRegistry>,
}

impl EffectImpl for Broadcast {
    fn execute(&self, event: &Event, args: &Args<'_>) {
        let items: Vec<String> = args.values(0).iter().map(|v| self.types.format(v)).collect();
        if items.is_empty() {
            return;
        }
        let and = args.node(0).map_or(true, ParsedNode::is_and_list);
        event.emit(join_list(&items, and));
    }
}

struct Arithmetic {
    operator: Operator,
    arithmetic: Arc<ArithmeticRegistry>,
}

impl Arithmetic {
    fn create(result: &MatchResult, arithmetic: Arc<ArithmeticRegistry>) -> std::result::Result<Self, String> {
        let operator = result
            .choice(0)
            .and_then(|choice| OPERATORS.get(choice).copied())
            .ok_or_else(|| "Unknown operator".to_string())?;

        let known = |i: usize| {
            result
                .expr(i)
                .and_then(ParsedNode::return_type)
                .filter(|t| !t.is_object())
                .cloned()
        };
        if let (Some(left), Some(right)) = (known(0), known(1)) {
            if arithmetic
                .return_type(operator, left.value_type(), right.value_type())
                .is_none()
            {
                return Err(format!(
                    "Can't use {} between {} and {}",
                    operator.sign(),
                    left.plural(),
                    right.plural()
                ));
            }
        }
        Ok(Self { operator, arithmetic })
    }
}

impl ExpressionImpl for Arithmetic {
    fn get(&self, _event: &Event, args: &Args<'_>) -> Vec<Value> {
        match (args.single(0), args.single(1)) {
            (Some(left), Some(right)) => self.arithmetic.calculate(self.operator, left, right).into_iter().collect(),
            _ => Vec::new(),
        }
    }
}

struct Always;

impl EventImpl for Always {}

/// Listens to `command` events whose attached text is the command name
struct CommandEvent {
    name: String,
}

impl EventImpl for CommandEvent {
    fn check(&self, event: &Event, _args: &Args<'_>) -> bool {
        event
            .value_of(TypeId::of::<String>())
            .and_then(|v| v.downcast_ref::<String>().map(|s| s.trim_start_matches('/').to_lowercase()))
            .is_some_and(|name| name == self.name)
    }
}
