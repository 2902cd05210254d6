#![allow(dead_code)]

use escore::ast::Statement;
use escore::ast::build::program;
use escore::interpreter::{Agent, AgentOptions, Outcome, PromiseState};
use escore::{Completion, JsValue};

pub fn agent() -> Agent {
    Agent::new(AgentOptions::default())
}

/// Evaluate a script that must run to completion without pausing.
pub fn run(agent: &Agent, body: Vec<Statement>) -> Completion {
    match agent.evaluate_script(program(body)).expect("evaluation refused") {
        Outcome::Completed(completion) => completion,
        Outcome::Paused(checkpoint) => panic!("unexpected pause at {checkpoint:?}"),
    }
}

pub fn value(agent: &Agent, body: Vec<Statement>) -> JsValue {
    match run(agent, body) {
        Completion::Normal(value) => value,
        other => panic!("expected a normal completion, got {other:?}"),
    }
}

pub fn drain(agent: &Agent) {
    agent.run_jobs().expect("agent has a job queue");
}

pub fn number(value: &JsValue) -> f64 {
    match value {
        JsValue::Number(n) => *n,
        other => panic!("expected a number, got {other:?}"),
    }
}

pub fn text(value: &JsValue) -> String {
    match value {
        JsValue::String(s) => s.to_rust_string(),
        other => panic!("expected a string, got {other:?}"),
    }
}

pub fn global(agent: &Agent, name: &str) -> JsValue {
    agent
        .get_global(name)
        .unwrap_or_else(|| panic!("global {name} is not defined"))
}

/// `(value, done)` of an iterator result object.
pub fn iter_result(agent: &Agent, result: &JsValue) -> (JsValue, bool) {
    let value = agent.get_property(result, "value").ok().expect("value");
    let done = matches!(
        agent.get_property(result, "done"),
        Completion::Normal(JsValue::Boolean(true))
    );
    (value, done)
}

pub fn state(agent: &Agent, promise: &JsValue) -> PromiseState {
    agent.promise_state(promise).expect("not a promise").0
}

pub fn settled(agent: &Agent, promise: &JsValue) -> (PromiseState, JsValue) {
    agent.promise_state(promise).expect("not a promise")
}
