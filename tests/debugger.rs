mod common;

use common::*;
use escore::ast::build::*;
use escore::ast::{FunctionKind, SourceLocation, Statement, VarKind};
use escore::interpreter::{
    Agent, AgentOptions, BreakOnDebuggerStatement, Checkpoint, CheckpointGranularity,
    CheckpointPhase, DebuggerAction, DebuggerHook, DrainOutcome, Outcome, StepEveryCheckpoint,
};
use escore::{Completion, EngineError, JsValue};
use std::rc::Rc;

fn paused(outcome: Outcome) -> Checkpoint {
    match outcome {
        Outcome::Paused(checkpoint) => checkpoint,
        Outcome::Completed(completion) => panic!("expected a pause, completed with {completion:?}"),
    }
}

fn completed(outcome: Outcome) -> Completion {
    match outcome {
        Outcome::Completed(completion) => completion,
        Outcome::Paused(checkpoint) => panic!("unexpected pause at {checkpoint:?}"),
    }
}

fn with_hook(hook: impl DebuggerHook + 'static) -> Agent {
    let agent = agent();
    agent.set_debugger_hook(Some(Rc::new(hook)));
    agent
}

struct PauseAfterCalls;

impl DebuggerHook for PauseAfterCalls {
    fn on_checkpoint(&self, _agent: &Agent, checkpoint: &Checkpoint) -> DebuggerAction {
        if checkpoint.phase == CheckpointPhase::AfterCall {
            DebuggerAction::Pause
        } else {
            DebuggerAction::Continue
        }
    }
}

#[test]
fn debugger_statement_pauses_and_resumes() {
    let agent = with_hook(BreakOnDebuggerStatement);
    let outcome = agent
        .evaluate_script(program(vec![
            var(VarKind::Var, "x", Some(num(1.0))),
            debugger().at(2, 4),
            expr_stmt(assign("x", num(2.0))),
            expr_stmt(ident("x")),
        ]))
        .unwrap();
    let checkpoint = paused(outcome);
    assert_eq!(checkpoint.phase, CheckpointPhase::DebuggerStatement);
    assert_eq!(checkpoint.location, SourceLocation { line: 2, column: 4 });
    assert_eq!(checkpoint.node_kind, "DebuggerStatement");
    assert!(agent.is_paused());
    assert_eq!(number(&global(&agent, "x")), 1.0);

    // nothing else may start while a computation is paused
    assert!(matches!(
        agent.evaluate_script(program(vec![])),
        Err(EngineError::AlreadyPaused)
    ));

    let result = completed(agent.resume(None).unwrap());
    assert!(matches!(result, Completion::Normal(JsValue::Number(n)) if n == 2.0));
    assert!(!agent.is_paused());
    assert!(agent.context_stack().is_empty());
    assert!(matches!(agent.resume(None), Err(EngineError::NotPaused)));
}

/// `f0` calls `f1` ... calls `f{depth-1}`, whose body hits `debugger` and
/// returns 42; every caller returns its callee's result.
fn nested_calls(depth: usize) -> Vec<Statement> {
    let mut script = Vec::new();
    for i in 0..depth {
        let body = if i + 1 == depth {
            vec![debugger().at(9, 1), return_(Some(num(42.0)))]
        } else {
            vec![return_(Some(call(ident(&format!("f{}", i + 1)), vec![])))]
        };
        script.push(function_decl(FunctionKind::Normal, &format!("f{i}"), &[], body));
    }
    if depth == 0 {
        script.push(debugger().at(9, 1));
        script.push(expr_stmt(num(42.0)));
    } else {
        script.push(expr_stmt(call(ident("f0"), vec![])));
    }
    script
}

#[test]
fn suspension_reaches_the_top_unchanged_at_any_depth() {
    let mut baseline = None;
    for depth in [0, 1, 4, 16] {
        let agent = with_hook(BreakOnDebuggerStatement);
        let checkpoint = paused(agent.evaluate_script(program(nested_calls(depth))).unwrap());
        assert_eq!(checkpoint.stack_depth, depth + 1);
        assert_eq!(agent.context_stack().len(), depth + 1);
        let key = (checkpoint.node_kind, checkpoint.location, checkpoint.phase);
        match &baseline {
            None => baseline = Some(key),
            Some(expected) => assert_eq!(&key, expected),
        }
        let result = completed(agent.resume(None).unwrap());
        assert!(matches!(result, Completion::Normal(JsValue::Number(n)) if n == 42.0));
        assert!(agent.context_stack().is_empty());
    }
}

#[test]
fn resuming_an_after_call_checkpoint_can_replace_the_result() {
    let agent = with_hook(PauseAfterCalls);
    let outcome = agent
        .evaluate_script(program(vec![
            function_decl(FunctionKind::Normal, "f", &[], vec![return_(Some(num(1.0)))]),
            expr_stmt(add(call(ident("f"), vec![]).at(2, 0), num(10.0))),
        ]))
        .unwrap();
    let checkpoint = paused(outcome);
    assert_eq!(checkpoint.phase, CheckpointPhase::AfterCall);
    assert_eq!(checkpoint.node_kind, "CallExpression");
    assert_eq!(checkpoint.location.line, 2);
    let result = completed(agent.resume(Some(JsValue::Number(5.0))).unwrap());
    assert!(matches!(result, Completion::Normal(JsValue::Number(n)) if n == 15.0));
}

#[test]
fn resuming_without_a_value_keeps_the_call_result() {
    let agent = with_hook(PauseAfterCalls);
    let outcome = agent
        .evaluate_script(program(vec![
            function_decl(FunctionKind::Normal, "f", &[], vec![return_(Some(num(1.0)))]),
            expr_stmt(add(call(ident("f"), vec![]), num(10.0))),
        ]))
        .unwrap();
    paused(outcome);
    let result = completed(agent.resume(None).unwrap());
    assert!(matches!(result, Completion::Normal(JsValue::Number(n)) if n == 11.0));
}

#[test]
fn pause_inside_a_generator_keeps_the_whole_stack() {
    let agent = with_hook(BreakOnDebuggerStatement);
    let outcome = agent
        .evaluate_script(program(vec![
            function_decl(
                FunctionKind::Generator,
                "gen",
                &[],
                vec![
                    expr_stmt(yield_(num(1.0))),
                    debugger(),
                    expr_stmt(yield_(num(2.0))),
                ],
            ),
            var(VarKind::Var, "g", Some(call(ident("gen"), vec![]))),
            expr_stmt(method_call(ident("g"), "next", vec![])),
            expr_stmt(member(method_call(ident("g"), "next", vec![]), "value")),
        ]))
        .unwrap();
    paused(outcome);
    let stack = agent.context_stack();
    assert_eq!(stack.len(), 3, "script, next builtin, generator body: {stack:?}");
    let top = stack.last().unwrap();
    assert_eq!(top.function_name.as_deref(), Some("gen"));
    assert!(top.generator.is_some());
    assert_eq!(stack[1].function_name.as_deref(), Some("next"));
    assert!(stack[0].function_name.is_none());

    let result = completed(agent.resume(None).unwrap());
    assert!(matches!(result, Completion::Normal(JsValue::Number(n)) if n == 2.0));
    assert!(agent.context_stack().is_empty());
    // the generator is suspended again at its second yield
    let done = value(&agent, vec![expr_stmt(member(method_call(ident("g"), "next", vec![]), "done"))]);
    assert!(matches!(done, JsValue::Boolean(true)));
}

#[test]
fn pause_inside_a_job_surfaces_from_the_drain() {
    let agent = with_hook(BreakOnDebuggerStatement);
    completed(
        agent
            .evaluate_script(program(vec![
                var(VarKind::Var, "log", Some(string("start"))),
                function_decl(
                    FunctionKind::Async,
                    "f",
                    &[],
                    vec![
                        expr_stmt(await_(undefined())),
                        debugger(),
                        expr_stmt(assign("log", string("done"))),
                    ],
                ),
                expr_stmt(call(ident("f"), vec![])),
            ]))
            .unwrap(),
    );
    let DrainOutcome::Paused(checkpoint) = agent.run_jobs().unwrap() else {
        panic!("the job should pause");
    };
    assert_eq!(checkpoint.phase, CheckpointPhase::DebuggerStatement);
    assert_eq!(text(&global(&agent, "log")), "start");
    completed(agent.resume(None).unwrap());
    assert_eq!(text(&global(&agent, "log")), "done");
    assert!(matches!(agent.run_jobs().unwrap(), DrainOutcome::Idle));
}

fn count_pauses(granularity: CheckpointGranularity, script: Vec<Statement>) -> usize {
    let agent = Agent::new(AgentOptions::default().with_checkpoint_granularity(granularity));
    agent.set_debugger_hook(Some(Rc::new(StepEveryCheckpoint)));
    let mut outcome = agent.evaluate_script(program(script)).unwrap();
    let mut pauses = 0;
    while let Outcome::Paused(_) = outcome {
        pauses += 1;
        outcome = agent.resume(None).unwrap();
    }
    pauses
}

#[test]
fn statement_granularity_skips_expression_checkpoints() {
    let script = || {
        vec![
            expr_stmt(num(1.0)),
            expr_stmt(add(num(2.0), num(3.0))),
            expr_stmt(string("x")),
        ]
    };
    assert_eq!(count_pauses(CheckpointGranularity::Statement, script()), 3);
    // 3 statements plus 5 expressions
    assert_eq!(count_pauses(CheckpointGranularity::Node, script()), 8);
}

#[test]
fn checkpoints_report_the_running_realm() {
    let agent = with_hook(BreakOnDebuggerStatement);
    let realm = agent.create_realm();
    let checkpoint = paused(
        agent
            .evaluate_script_in(realm, program(vec![debugger()]))
            .unwrap(),
    );
    assert_eq!(checkpoint.realm, realm);
    completed(agent.resume(None).unwrap());
}
