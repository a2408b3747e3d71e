//! End-to-end parsing and evaluation with the default addon loaded

use skript_config::EngineConfig;
use skript_lang::{
    Addon, Args, DiagnosticCode, EffectImpl, Engine, Event, ParsedNode, Registrar, SemanticType, SyntaxKind,
    SyntaxSpec, Value, Variables,
};
use proptest::prelude::*;
use std::any::TypeId;
use std::time::{Duration, Instant};

fn engine() -> Engine {
    Engine::with_defaults(EngineConfig::default()).unwrap()
}

fn run(engine: &Engine, event: &Event, line: &str) {
    let node = engine
        .parser()
        .parse_statement(line)
        .unwrap_or_else(|d| panic!("{}: {}", line, d));
    node.execute(event);
}

fn check(engine: &Engine, event: &Event, line: &str) -> bool {
    engine.parser().parse_condition(line).unwrap().check(event)
}

fn broadcast(engine: &Engine, line: &str) -> String {
    let event = Event::new("test");
    run(engine, &event, &format!("broadcast {}", line));
    event.take_output().join("\n")
}

#[test]
fn test_set_and_read_variable() {
    let engine = engine();
    let event = Event::new("test");
    run(&engine, &event, "set {x} to 5");

    let node = engine.parse_line("{x}", SyntaxKind::Expression, None).unwrap();
    let values = engine.evaluate(&node, &event);
    assert_eq!(values.len(), 1);
    assert_eq!(values[0].downcast_ref::<i64>(), Some(&5));
    assert!(!node.is_literal());
}

#[test]
fn test_add_and_remove_use_arithmetic() {
    let engine = engine();
    let event = Event::new("test");
    run(&engine, &event, "set {x} to 5");
    run(&engine, &event, "add 2 to {x}");
    run(&engine, &event, "remove 10 from {x}");
    assert_eq!(event.globals().get("x").unwrap().downcast_ref::<i64>(), Some(&-3));

    run(&engine, &event, "add 0.5 to {x}");
    assert_eq!(event.globals().get("x").unwrap().downcast_ref::<f64>(), Some(&-2.5));

    run(&engine, &event, "delete {x}");
    assert!(event.globals().get("x").is_none());
}

#[test]
fn test_locals_and_globals() {
    let engine = engine();
    let globals = Variables::new();
    let first = Event::with_globals("test", globals.clone());
    run(&engine, &first, "set {_local} to 1");
    run(&engine, &first, "set {shared} to 2");

    let second = Event::with_globals("test", globals);
    assert!(check(&engine, &second, "{shared} is 2"));
    assert!(!check(&engine, &second, "{_local} is 1"));
}

#[test]
fn test_comparisons() {
    let engine = engine();
    let event = Event::new("test");
    run(&engine, &event, "set {x} to 5");

    assert!(check(&engine, &event, "{x} is 5"));
    assert!(check(&engine, &event, "{x} is 5.0"));
    assert!(check(&engine, &event, "{x} is not 4"));
    assert!(check(&engine, &event, "{x} is greater than 4.5"));
    assert!(check(&engine, &event, "{x} is less than or equal to 5"));
    assert!(check(&engine, &event, "{x} >= 5"));
    assert!(!check(&engine, &event, "{x} < 5"));
    assert!(check(&engine, &event, "{x} != 6"));
    assert!(check(&engine, &event, "\"Hello\" is \"hello\""));
    assert!(check(&engine, &event, "{x} is 4, 5 or 6"));
    assert!(!check(&engine, &event, "{x} is 4, 5 and 6"));
    assert!(check(&engine, &event, "{x} is neither 3 nor 4"));
}

#[test]
fn test_unset_values_fail_positive_checks() {
    let engine = engine();
    let event = Event::new("test");
    assert!(!check(&engine, &event, "{missing} is 1"));
    assert!(check(&engine, &event, "{missing} is not 1"));
}

#[test]
fn test_list_variables() {
    let engine = engine();
    let event = Event::new("test");
    run(&engine, &event, "set {l::*} to 1, 2 and 3");
    run(&engine, &event, "add 4 to {l::*}");
    run(&engine, &event, "remove 2 from {l::*}");
    run(&engine, &event, "broadcast {l::*}");
    assert_eq!(event.take_output(), vec!["1, 3 and 4".to_string()]);
}

#[test]
fn test_text_interpolation() {
    let engine = engine();
    let event = Event::new("test");
    run(&engine, &event, "set {x} to 2.0");
    run(&engine, &event, "broadcast \"x is %{x}% (100%%), said \"\"me\"\"\"");
    assert_eq!(event.take_output(), vec!["x is 2 (100%), said \"me\"".to_string()]);

    assert_eq!(broadcast(&engine, "\"%{nothing}%\""), "<none>");
    assert_eq!(broadcast(&engine, "\"a\", \"b\" or \"c\""), "a, b or c");
}

#[test]
fn test_arithmetic_expression() {
    let engine = engine();
    assert_eq!(broadcast(&engine, "2 + 3"), "5");
    assert_eq!(broadcast(&engine, "7 / 2"), "3.5");
    assert_eq!(broadcast(&engine, "(1 + 2) * 3"), "9");
    assert_eq!(broadcast(&engine, "2 ^ 10"), "1024");

    let event = Event::new("test");
    run(&engine, &event, "set {x} to 1");
    run(&engine, &event, "set {x} to {x} + 1");
    assert!(check(&engine, &event, "{x} is 2"));
}

#[test]
fn test_no_matching_syntax() {
    let engine = engine();
    let err = engine.parser().parse_statement("fly to the moon").unwrap_err();
    assert_eq!(err.code, DiagnosticCode::NoMatchingSyntax);
    assert_eq!(err.message, "Can't understand this condition/effect: 'fly to the moon'");

    // `%~objects%` refuses literal targets
    let err = engine.parser().parse_effect("set 5 to 3").unwrap_err();
    assert_eq!(err.code, DiagnosticCode::NoMatchingSyntax);
}

#[test]
fn test_factory_rejections_are_reported() {
    let engine = engine();
    let err = engine.parser().parse_condition("1 is \"one\"").unwrap_err();
    assert_eq!(err.code, DiagnosticCode::Rejected);
    assert_eq!(err.message, "Can't compare integers with texts");

    let err = engine.parser().parse_condition("\"a\" > \"b\"").unwrap_err();
    assert_eq!(err.code, DiagnosticCode::Rejected);
}

#[test]
fn test_recursion_limit() {
    let config = EngineConfig {
        max_parse_depth: 4,
        ..EngineConfig::default()
    };
    let engine = Engine::with_defaults(config).unwrap();
    assert!(engine.parser().parse_effect("broadcast ((1))").is_ok());

    let err = engine.parser().parse_effect("broadcast ((((((1))))))").unwrap_err();
    assert_eq!(err.code, DiagnosticCode::TooDeeplyNested);
    assert_eq!(engine.stats().snapshot().too_deep, 1);
}

#[test]
fn test_event_and_structure_lines_need_their_own_entry_point() {
    let engine = engine();
    let err = engine.parse_line("load", SyntaxKind::Event, None).unwrap_err();
    assert_eq!(err.code, DiagnosticCode::WrongKind);

    let load = engine.parser().parse_event("script load").unwrap();
    assert_eq!(load.listens(), ["load".to_string()]);

    let command = engine.parser().parse_event("command \"/Hi\"").unwrap();
    assert!(command.check(&Event::new("command").with_value(String::from("hi"))));
    assert!(!command.check(&Event::new("command").with_value(String::from("bye"))));
    assert!(engine.parser().parse_event("command {x}").is_err());
}

#[test]
fn test_typed_expressions() {
    let engine = engine();
    let parser = engine.parser();
    let event = Event::new("test");

    let number = parser.parse_expression("5", "number").unwrap();
    assert!(number.is_literal());
    assert_eq!(number.single(&event).unwrap().downcast_ref::<f64>(), Some(&5.0));

    let list = parser.parse_expression("1, 2 and 3", "integers").unwrap();
    assert!(list.is_literal());
    assert_eq!(list.evaluate(&event).len(), 3);
    assert!(parser.parse_expression("1, 2 and 3", "integer").is_err());

    // Variables are converted at runtime
    run(&engine, &event, "set {n} to 3");
    let converted = parser.parse_expression("{n}", "number").unwrap();
    assert_eq!(converted.return_type().unwrap().code_name(), "number");
    assert_eq!(converted.single(&event).unwrap().downcast_ref::<f64>(), Some(&3.0));
}

#[derive(Debug, Clone)]
struct Player(String);

struct Greet;

impl EffectImpl for Greet {
    fn execute(&self, event: &Event, args: &Args<'_>) {
        let name = args.get::<Player>(0).map(|p| p.0.clone()).unwrap_or_default();
        event.emit(format!("hello {}", name));
    }
}

struct Players;

impl Addon for Players {
    fn name(&self) -> &str {
        "players"
    }

    fn register(&self, registrar: &mut Registrar<'_>) -> skript_lang::Result<()> {
        registrar.register_type(
            SemanticType::builder::<Player>("player")
                .name("player", "players")
                .default_value(|event| event.value_of(TypeId::of::<Player>())),
        )?;
        registrar.register_syntax(SyntaxSpec::effect(&["greet [%player%]"], |_| Ok(Box::new(Greet))))?;
        registrar.register_syntax(SyntaxSpec::effect(&["wave [at %-player%]"], |result| {
            assert!(result.expr(0).is_none());
            Ok(Box::new(Greet))
        }))?;
        Ok(())
    }
}

#[test]
fn test_omitted_placeholder_uses_event_default() {
    let engine = engine();
    engine.load_addon(&Players).unwrap();
    let event = Event::new("join").with_value(Player("Notch".into()));

    run(&engine, &event, "greet");
    run(&engine, &event, "wave");
    assert_eq!(event.take_output(), vec!["hello Notch".to_string(), "hello ".to_string()]);
}

#[test]
fn test_ambiguity_detection() {
    let config = EngineConfig {
        detect_ambiguity: true,
        ..EngineConfig::default()
    };
    let engine = Engine::with_defaults(config).unwrap();
    engine.load_addon(&Players).unwrap();
    engine
        .syntaxes()
        .register(SyntaxSpec::effect(&["greet"], |_| Ok(Box::new(Greet))))
        .unwrap();

    let node = engine.parser().parse_effect("greet").unwrap();
    assert!(matches!(node, ParsedNode::Effect(_)));
    assert_eq!(engine.stats().snapshot().ambiguous, 1);
}

#[test]
fn test_broadcast_formats_values() {
    let engine = engine();
    assert_eq!(broadcast(&engine, "true"), "true");
    assert_eq!(broadcast(&engine, "-1.25"), "-1.25");
}

struct Nothing;

impl EffectImpl for Nothing {
    fn execute(&self, _event: &Event, _args: &Args<'_>) {}
}

struct Totals;

impl Addon for Totals {
    fn name(&self) -> &str {
        "totals"
    }

    fn register(&self, registrar: &mut Registrar<'_>) -> skript_lang::Result<()> {
        registrar.register_type(
            SemanticType::builder::<i64>("number")
                .name("number", "numbers")
                .parser(|text, _| text.parse::<i64>().ok().map(Value::new))
                .formatter(|value| value.downcast_ref::<i64>().map(i64::to_string).unwrap_or_default()),
        )?;
        registrar.register_syntax(SyntaxSpec::effect(&["add %number% to total"], |_| Ok(Box::new(Nothing))))?;
        registrar.register_syntax(SyntaxSpec::effect(&["count %number% sheep"], |_| Ok(Box::new(Nothing))))?;
        Ok(())
    }
}

fn totals() -> Engine {
    let engine = Engine::new(EngineConfig::default());
    engine.load_addon(&Totals).unwrap();
    engine
}

#[test]
fn test_placeholder_sub_node_holds_parsed_value() {
    let engine = totals();
    let event = Event::new("test");

    let node = engine.parser().parse_effect("add 42 to total").unwrap();
    assert_eq!(node.kind(), SyntaxKind::Effect);
    let arg = node.args()[0].as_ref().unwrap();
    assert!(arg.is_literal());
    assert_eq!(arg.single(&event).unwrap().downcast_ref::<i64>(), Some(&42));

    let err = engine.parser().parse_effect("add forty-two to total").unwrap_err();
    assert_eq!(err.code, DiagnosticCode::NoMatchingSyntax);
}

#[test]
fn test_failing_chains_parse_in_bounded_time() {
    let engine = engine();
    let chain = vec!["1"; 8].join(" + ");

    let start = Instant::now();
    assert!(engine.parser().parse_effect(&format!("broadcast {} + foo", chain)).is_err());
    assert!(start.elapsed() < Duration::from_secs(5), "took {:?}", start.elapsed());

    let start = Instant::now();
    assert_eq!(broadcast(&engine, &chain), "8");
    assert!(start.elapsed() < Duration::from_secs(5), "took {:?}", start.elapsed());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn test_parse_is_deterministic(
        a in 0i64..1000,
        b in 0i64..1000,
        c in 0i64..1000,
        word in "[a-z]{1,8}",
    ) {
        let engine = engine();
        let event = Event::new("test");
        let line = format!("broadcast {} + {}, {} and \"{}\"", a, b, c, word);

        let first = engine.parser().parse_effect(&line).unwrap();
        let second = engine.parser().parse_effect(&line).unwrap();
        let other = Engine::with_defaults(EngineConfig::default()).unwrap();
        let third = other.parser().parse_effect(&line).unwrap();
        prop_assert_eq!(format!("{:?}", &first), format!("{:?}", &second));
        prop_assert_eq!(format!("{:?}", &first), format!("{:?}", &third));

        first.execute(&event);
        second.execute(&event);
        let expected = format!("{}, {} and {}", a + b, c, word);
        prop_assert_eq!(event.take_output(), vec![expected; 2]);
    }

    #[test]
    fn test_placeholder_values_format_back_to_input(n in any::<i64>()) {
        let engine = totals();
        let event = Event::new("test");
        let node = engine.parser().parse_effect(&format!("count {} sheep", n)).unwrap();
        let value = node.args()[0].as_ref().unwrap().single(&event).unwrap();
        prop_assert_eq!(engine.types().format(&value), n.to_string());
    }
}
