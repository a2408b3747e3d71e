//! Structure Loader phase ordering over randomly shaped batches

use parking_lot::Mutex;
use proptest::prelude::*;
use skript_config::EngineConfig;
use skript_lang::{
    Addon, DiagnosticCode, Engine, NodeType, Priority, Registrar, Structure, StructureContext, StructureState, SyntaxSpec,
};
use skript_script::{Loader, ScriptAddon, ScriptSource, TriggerRegistry};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Init,
    Load,
    PostLoad,
    Unload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailIn {
    Nothing,
    Init,
    Load,
}

type Log = Arc<Mutex<Vec<(Step, usize, u32)>>>;

/// Records every lifecycle call; header `step <id> <priority> <ok|init|load>`
struct Stepper {
    id: usize,
    priority: u32,
    fail: FailIn,
    log: Log,
}

impl Stepper {
    fn record(&self, step: Step) {
        self.log.lock().push((step, self.id, self.priority));
    }
}

impl Structure for Stepper {
    fn init(&mut self, _ctx: &mut StructureContext<'_>) -> bool {
        self.record(Step::Init);
        self.fail != FailIn::Init
    }

    fn load(&mut self, _ctx: &mut StructureContext<'_>) -> bool {
        self.record(Step::Load);
        self.fail != FailIn::Load
    }

    fn post_load(&mut self, _ctx: &mut StructureContext<'_>) -> bool {
        self.record(Step::PostLoad);
        true
    }

    fn unload(&mut self) {
        self.record(Step::Unload);
    }

    fn priority(&self) -> Priority {
        Priority::new(self.priority)
    }
}

struct StepAddon {
    log: Log,
}

impl Addon for StepAddon {
    fn name(&self) -> &str {
        "step"
    }

    fn register(&self, registrar: &mut Registrar<'_>) -> skript_lang::Result<()> {
        let log = Arc::clone(&self.log);
        registrar.register_syntax(SyntaxSpec::structure(&["step <.+>"], NodeType::Both, move |result| {
            let args: Vec<&str> = result.regex(0).unwrap_or_default().split_whitespace().collect();
            let [id, priority, mode] = args.as_slice() else {
                return Err("expected an id, a priority and a mode".to_string());
            };
            let fail = match *mode {
                "init" => FailIn::Init,
                "load" => FailIn::Load,
                _ => FailIn::Nothing,
            };
            Ok(Box::new(Stepper {
                id: id.parse().map_err(|_| "bad id".to_string())?,
                priority: priority.parse().map_err(|_| "bad priority".to_string())?,
                fail,
                log: Arc::clone(&log),
            }))
        }))?;
        Ok(())
    }
}

fn steps(log: &[(Step, usize, u32)], step: Step) -> Vec<(usize, u32)> {
    log.iter().filter(|e| e.0 == step).map(|e| (e.1, e.2)).collect()
}

fn mode_strategy() -> impl Strategy<Value = FailIn> {
    prop_oneof![
        4 => Just(FailIn::Nothing),
        1 => Just(FailIn::Init),
        1 => Just(FailIn::Load),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_phases_complete_in_order(
        specs in prop::collection::vec((0u32..4, mode_strategy()), 1..12),
        scripts in 1usize..4,
    ) {
        let log: Log = Arc::default();
        let engine = Engine::new(EngineConfig::default());
        engine.load_addon(&StepAddon { log: Arc::clone(&log) }).unwrap();

        let mut texts = vec![String::new(); scripts];
        for (id, (priority, fail)) in specs.iter().enumerate() {
            let mode = match fail {
                FailIn::Nothing => "ok",
                FailIn::Init => "init",
                FailIn::Load => "load",
            };
            texts[id % scripts].push_str(&format!("step {} {} {}\n", id, priority, mode));
        }
        let sources = texts
            .into_iter()
            .enumerate()
            .map(|(i, text)| ScriptSource::new(format!("s{}.sk", i), text))
            .collect();

        let (mut loaded, summary) = Loader::new(&engine).load(sources);
        let entries = log.lock().clone();

        // each phase finishes before the next begins
        let position = |step: Step| entries.iter().rposition(|e| e.0 == step);
        let first = |step: Step| entries.iter().position(|e| e.0 == step);
        if let (Some(last_init), Some(first_load)) = (position(Step::Init), first(Step::Load)) {
            prop_assert!(last_init < first_load);
        }
        if let (Some(last_load), Some(first_post)) = (position(Step::Load), first(Step::PostLoad)) {
            prop_assert!(last_load < first_post);
        }

        // ascending priority within a phase
        for step in [Step::Init, Step::Load, Step::PostLoad] {
            let priorities: Vec<u32> = steps(&entries, step).iter().map(|s| s.1).collect();
            prop_assert!(priorities.windows(2).all(|w| w[0] <= w[1]));
        }

        // failures are isolated to the failing structure
        let inits: Vec<usize> = steps(&entries, Step::Init).iter().map(|s| s.0).collect();
        let loads: Vec<usize> = steps(&entries, Step::Load).iter().map(|s| s.0).collect();
        let posts: Vec<usize> = steps(&entries, Step::PostLoad).iter().map(|s| s.0).collect();
        let unloads: Vec<usize> = steps(&entries, Step::Unload).iter().map(|s| s.0).collect();
        for (id, (_, fail)) in specs.iter().enumerate() {
            prop_assert!(inits.contains(&id));
            prop_assert_eq!(loads.contains(&id), *fail != FailIn::Init);
            prop_assert_eq!(posts.contains(&id), *fail == FailIn::Nothing);
            prop_assert_eq!(unloads.contains(&id), *fail != FailIn::Nothing);
        }
        let failing = specs.iter().filter(|s| s.1 != FailIn::Nothing).count();
        prop_assert_eq!(summary.failed, failing);
        prop_assert_eq!(summary.structures, specs.len() - failing);

        // unloading goes by descending priority
        log.lock().clear();
        for script in &mut loaded {
            script.unload();
            prop_assert!(script.is_unloaded());
            let priorities: Vec<u32> = log.lock().drain(..).map(|e| e.2).collect();
            prop_assert!(priorities.windows(2).all(|w| w[0] >= w[1]));
        }
    }
}

#[test]
fn test_states_after_load() {
    let log: Log = Arc::default();
    let engine = Engine::new(EngineConfig::default());
    engine.load_addon(&StepAddon { log: Arc::clone(&log) }).unwrap();

    let source = ScriptSource::new("s.sk", "step 0 5 ok\nstep 1 1 init\nstep 2 3 load\nstep x\n");
    let (scripts, summary) = Loader::new(&engine).load(vec![source]);
    let script = &scripts[0];

    let states: Vec<StructureState> = script.structures().map(|s| s.state()).collect();
    assert_eq!(states, vec![StructureState::PostLoaded]);
    assert_eq!(summary.failed, 2);
    // the malformed header is rejected by its factory, two failed phases report generically
    assert_eq!(summary.errors, 3);
    assert_eq!(
        steps(&log.lock(), Step::Init),
        vec![(1, 1), (2, 3), (0, 5)]
    );
}

#[test]
fn test_triggers_publish_into_the_loader_registry() {
    let engine = Engine::with_defaults(EngineConfig::default()).unwrap();
    engine.load_addon(&ScriptAddon).unwrap();
    let source = || ScriptSource::new("t.sk", "on load:\n\tbroadcast \"hi\"\n");

    let triggers = Arc::new(TriggerRegistry::new());
    let (_scripts, summary) = Loader::new(&engine)
        .with_triggers(Arc::clone(&triggers))
        .load(vec![source()]);
    assert!(!summary.has_errors(), "{:?}", summary.diagnostics);
    assert_eq!(triggers.len(), 1);

    // Without a registry the trigger has nowhere to go
    let (_, summary) = Loader::new(&engine).load(vec![source()]);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.diagnostics[0].code, DiagnosticCode::InvalidStructure);
}
