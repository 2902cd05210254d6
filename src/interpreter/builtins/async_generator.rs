//! Async generators: a request queue in front of a resumable body.
//!
//! Every `next`/`return`/`throw` call enqueues a request and gets a promise.
//! Only the front request is ever being produced; the body settles it when it
//! yields or finishes, and a yield that finds more requests waiting keeps
//! running instead of suspending.

use super::*;
use crate::interpreter::call::call;

pub(super) fn setup_async_generator_prototype(b: &RealmBuilder<'_>, proto: JsObject) {
    // %AsyncGeneratorPrototype%.next
    b.method(
        proto,
        "next",
        1,
        async_native(|agent, this, args| {
            Box::pin(async move { async_generator_next(&agent, this, arg(&args, 0)).await })
        }),
    );

    // %AsyncGeneratorPrototype%.return
    b.method(
        proto,
        "return",
        1,
        async_native(|agent, this, args| {
            Box::pin(async move { async_generator_return(&agent, this, arg(&args, 0)).await })
        }),
    );

    // %AsyncGeneratorPrototype%.throw
    b.method(
        proto,
        "throw",
        1,
        async_native(|agent, this, args| {
            Box::pin(async move { async_generator_throw(&agent, this, arg(&args, 0)).await })
        }),
    );
}

fn with_async_generator<R>(
    agent: &Agent,
    generator: JsObject,
    f: impl FnOnce(&mut AsyncGeneratorData) -> R,
) -> R {
    let mut heap = agent.heap_mut();
    match &mut heap.get_mut(generator).kind {
        ObjectKind::AsyncGenerator(data) => f(data),
        _ => internal_error!("object {} is not an async generator", generator.id),
    }
}

fn state_of(agent: &Agent, generator: JsObject) -> AsyncGeneratorState {
    with_async_generator(agent, generator, |data| data.state)
}

fn set_state(agent: &Agent, generator: JsObject, state: AsyncGeneratorState) {
    with_async_generator(agent, generator, |data| data.state = state);
}

// §27.6.3.1 AsyncGeneratorStart
pub(crate) fn async_generator_start(
    agent: &Agent,
    ctx: ContextId,
    func: JsObject,
    node: Rc<FunctionNode>,
    env: EnvRef,
) -> Completion {
    let proto = match agent.get_prototype_from_constructor(func, |i| i.async_generator_prototype) {
        Completion::Normal(proto) => proto,
        abrupt => {
            agent.contexts_mut().release(ctx);
            return abrupt.into_abrupt();
        }
    };
    let generator = agent.allocate(ObjectData::new(
        Some(proto),
        ObjectKind::AsyncGenerator(AsyncGeneratorData {
            state: AsyncGeneratorState::SuspendedStart,
            context: Some(ctx),
            queue: Default::default(),
        }),
    ));
    let body_agent = agent.handle();
    let mut contexts = agent.contexts_mut();
    let context = contexts.get_mut(ctx);
    context.generator = Some(generator);
    context.code_evaluation_state = Some(Box::pin(async move {
        async_generator_body(&body_agent, generator, &node, &env).await
    }));
    trace!(generator = generator.id, context = %ctx, "async generator created");
    Completion::Normal(JsValue::Object(generator))
}

async fn async_generator_body(
    agent: &Agent,
    generator: JsObject,
    node: &FunctionNode,
    env: &EnvRef,
) -> Completion {
    let result = match exec::function_body(agent, &node.body, env).await {
        Completion::Normal(_) => Completion::Normal(JsValue::Undefined),
        Completion::Return(value) => Completion::Normal(value),
        Completion::Throw(error) => Completion::Throw(error),
        abrupt => internal_error!("{} escaped an async generator body", abrupt.kind_name()),
    };
    // the context is released as soon as this computation returns
    with_async_generator(agent, generator, |data| {
        data.state = AsyncGeneratorState::DrainingQueue;
        data.context = None;
    });
    async_generator_complete_step(agent, generator, result, true).await;
    async_generator_drain_queue(agent, generator).await;
    Completion::Normal(JsValue::Undefined)
}

// §27.6.3.2 AsyncGeneratorValidate
fn async_generator_validate(agent: &Agent, value: &JsValue) -> Completion<JsObject> {
    match value.as_object() {
        Some(obj) if matches!(agent.heap().get(obj).kind, ObjectKind::AsyncGenerator(_)) => {
            Completion::Normal(obj)
        }
        _ => agent.throw_type_error(&format!(
            "async generator method called on incompatible receiver {}",
            agent.describe(value)
        )),
    }
}

// §27.6.1.2 AsyncGenerator.prototype.next
async fn async_generator_next(agent: &Agent, this: JsValue, value: JsValue) -> Completion {
    let capability = promise::new_intrinsic_promise_capability(agent);
    let generator =
        if_abrupt_reject_promise!(agent, async_generator_validate(agent, &this), capability);
    let state = state_of(agent, generator);
    if state == AsyncGeneratorState::Completed {
        let result = agent.create_iter_result_object(JsValue::Undefined, true);
        x!(call(agent, capability.resolve.clone(), JsValue::Undefined, vec![result]).await);
        return Completion::Normal(capability.promise);
    }
    let completion = Completion::Normal(value);
    async_generator_enqueue(agent, generator, completion.clone(), capability.clone());
    if matches!(
        state,
        AsyncGeneratorState::SuspendedStart | AsyncGeneratorState::SuspendedYield
    ) {
        async_generator_resume(agent, generator, completion).await;
    }
    Completion::Normal(capability.promise)
}

// §27.6.1.3 AsyncGenerator.prototype.return
async fn async_generator_return(agent: &Agent, this: JsValue, value: JsValue) -> Completion {
    let capability = promise::new_intrinsic_promise_capability(agent);
    let generator =
        if_abrupt_reject_promise!(agent, async_generator_validate(agent, &this), capability);
    let completion = Completion::Return(value);
    async_generator_enqueue(agent, generator, completion.clone(), capability.clone());
    match state_of(agent, generator) {
        AsyncGeneratorState::SuspendedStart | AsyncGeneratorState::Completed => {
            finish_without_running(agent, generator);
            async_generator_await_return(agent, generator).await;
        }
        AsyncGeneratorState::SuspendedYield => {
            async_generator_resume(agent, generator, completion).await;
        }
        AsyncGeneratorState::Executing | AsyncGeneratorState::DrainingQueue => {}
    }
    Completion::Normal(capability.promise)
}

// §27.6.1.4 AsyncGenerator.prototype.throw
async fn async_generator_throw(agent: &Agent, this: JsValue, exception: JsValue) -> Completion {
    let capability = promise::new_intrinsic_promise_capability(agent);
    let generator =
        if_abrupt_reject_promise!(agent, async_generator_validate(agent, &this), capability);
    let mut state = state_of(agent, generator);
    if state == AsyncGeneratorState::SuspendedStart {
        finish_without_running(agent, generator);
        set_state(agent, generator, AsyncGeneratorState::Completed);
        state = AsyncGeneratorState::Completed;
    }
    if state == AsyncGeneratorState::Completed {
        return promise::reject_capability(agent, capability, exception).await;
    }
    let completion = Completion::Throw(exception);
    async_generator_enqueue(agent, generator, completion.clone(), capability.clone());
    if state == AsyncGeneratorState::SuspendedYield {
        async_generator_resume(agent, generator, completion).await;
    }
    Completion::Normal(capability.promise)
}

/// The body will never run: drop its context and start draining.
fn finish_without_running(agent: &Agent, generator: JsObject) {
    let ctx = with_async_generator(agent, generator, |data| {
        data.state = AsyncGeneratorState::DrainingQueue;
        data.context.take()
    });
    if let Some(ctx) = ctx {
        agent.contexts_mut().release(ctx);
    }
}

// §27.6.3.3 AsyncGeneratorEnqueue
fn async_generator_enqueue(
    agent: &Agent,
    generator: JsObject,
    completion: Completion,
    capability: PromiseCapability,
) {
    let queued = with_async_generator(agent, generator, |data| {
        data.queue.push_back(AsyncGeneratorRequest {
            completion,
            capability,
        });
        data.queue.len()
    });
    trace!(generator = generator.id, queued, "async generator request enqueued");
}

// §27.6.3.4 AsyncGeneratorCompleteStep
async fn async_generator_complete_step(
    agent: &Agent,
    generator: JsObject,
    completion: Completion,
    done: bool,
) {
    let Some(next) = with_async_generator(agent, generator, |data| data.queue.pop_front()) else {
        internal_error!("async generator {} completed a step with an empty queue", generator.id);
    };
    let capability = next.capability;
    let settled = match completion {
        Completion::Throw(error) => {
            call(agent, capability.reject, JsValue::Undefined, vec![error]).await
        }
        Completion::Normal(value) => {
            let result = agent.create_iter_result_object(value, done);
            call(agent, capability.resolve, JsValue::Undefined, vec![result]).await
        }
        other => internal_error!("async generator step completed with {}", other.kind_name()),
    };
    x!(settled);
}

// §27.6.3.5 AsyncGeneratorResume
async fn async_generator_resume(agent: &Agent, generator: JsObject, completion: Completion) {
    let (state, ctx) = with_async_generator(agent, generator, |data| {
        let state = data.state;
        data.state = AsyncGeneratorState::Executing;
        (state, data.context)
    });
    let Some(ctx) = ctx else {
        internal_error!("suspended async generator {} has no context", generator.id);
    };
    let message = match state {
        AsyncGeneratorState::SuspendedStart => None,
        AsyncGeneratorState::SuspendedYield => Some(ResumeMessage::AsyncGeneratorResume(completion)),
        other => internal_error!("resuming an async generator in state {other:?}"),
    };
    match drive_context(agent, ctx, message).await {
        Step::Completed(_)
        | Step::Suspended(SuspensionRequest::Await)
        | Step::Suspended(SuspensionRequest::AsyncGeneratorYield) => {}
        Step::Suspended(other) => {
            internal_error!("{} suspension inside an async generator body", other.kind_name())
        }
    }
}

// §27.6.3.6 AsyncGeneratorUnwrapYieldResumption
async fn async_generator_unwrap_yield_resumption(agent: &Agent, resumption: Completion) -> Completion {
    let Completion::Return(value) = resumption else {
        return resumption;
    };
    match await_value(agent, value).await {
        Completion::Normal(awaited) => Completion::Return(awaited),
        abrupt => abrupt,
    }
}

// §27.6.3.8 AsyncGeneratorYield, after the operand has been awaited
pub(crate) async fn async_generator_yield(agent: &Agent, value: JsValue) -> Completion {
    let Some(generator) = agent.running_generator() else {
        internal_error!("async generator yield outside a generator body");
    };
    async_generator_complete_step(agent, generator, Completion::Normal(value), false).await;
    let queued = with_async_generator(agent, generator, |data| {
        data.queue.front().map(|request| request.completion.clone())
    });
    let resumption = match queued {
        // another request is already waiting: keep running
        Some(completion) => completion,
        None => {
            set_state(agent, generator, AsyncGeneratorState::SuspendedYield);
            match suspend(agent, SuspensionRequest::AsyncGeneratorYield).await {
                ResumeMessage::AsyncGeneratorResume(completion) => completion,
                other => internal_error!("async generator resumed with {}", other.kind_name()),
            }
        }
    };
    async_generator_unwrap_yield_resumption(agent, resumption).await
}

// §27.6.3.9 AsyncGeneratorAwaitReturn
fn async_generator_await_return(agent: &Agent, generator: JsObject) -> LocalBoxFuture<'_, ()> {
    Box::pin(async_generator_await_return_inner(agent, generator))
}

async fn async_generator_await_return_inner(agent: &Agent, generator: JsObject) {
    let value = with_async_generator(agent, generator, |data| match data.queue.front() {
        Some(AsyncGeneratorRequest {
            completion: Completion::Return(value),
            ..
        }) => value.clone(),
        _ => internal_error!("AwaitReturn without a queued return request"),
    });
    let promise = match promise::promise_resolve(agent, agent.intrinsics().promise, value).await {
        Completion::Normal(promise) => promise,
        abrupt => {
            async_generator_complete_step(agent, generator, abrupt, true).await;
            async_generator_drain_queue(agent, generator).await;
            return;
        }
    };
    let Some(promise) = promise.as_object() else {
        internal_error!("PromiseResolve produced a non-object");
    };
    let on_fulfilled = return_settled_handler(agent, generator, ReactionType::Fulfill);
    let on_rejected = return_settled_handler(agent, generator, ReactionType::Reject);
    promise::perform_promise_then(agent, promise, on_fulfilled, on_rejected, None);
}

fn return_settled_handler(agent: &Agent, generator: JsObject, kind: ReactionType) -> JsValue {
    agent.create_builtin_function(
        "",
        1,
        async_native(move |agent, _this, args| {
            let value = arg(&args, 0);
            let completion = match kind {
                ReactionType::Fulfill => Completion::Normal(value),
                ReactionType::Reject => Completion::Throw(value),
            };
            Box::pin(async move {
                if state_of(&agent, generator) != AsyncGeneratorState::DrainingQueue {
                    internal_error!("awaited return settled outside draining-queue");
                }
                async_generator_complete_step(&agent, generator, completion, true).await;
                async_generator_drain_queue(&agent, generator).await;
                Completion::Normal(JsValue::Undefined)
            })
        }),
    )
}

// §27.6.3.10 AsyncGeneratorDrainQueue
fn async_generator_drain_queue(agent: &Agent, generator: JsObject) -> LocalBoxFuture<'_, ()> {
    Box::pin(async_generator_drain_queue_inner(agent, generator))
}

async fn async_generator_drain_queue_inner(agent: &Agent, generator: JsObject) {
    loop {
        let front = with_async_generator(agent, generator, |data| {
            let front = data.queue.front().map(|request| request.completion.clone());
            if front.is_none() {
                data.state = AsyncGeneratorState::Completed;
            }
            front
        });
        match front {
            None => return,
            Some(Completion::Return(_)) => {
                async_generator_await_return(agent, generator).await;
                return;
            }
            Some(completion) => {
                let completion = match completion {
                    Completion::Normal(_) => Completion::Normal(JsValue::Undefined),
                    other => other,
                };
                async_generator_complete_step(agent, generator, completion, true).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::build::*;
    use crate::ast::build::call;

    fn run(agent: &Agent, body: Vec<Statement>) -> Completion {
        match agent.evaluate_script(program(body)).unwrap() {
            Outcome::Completed(c) => c,
            Outcome::Paused(_) => panic!("unexpected pause"),
        }
    }

    fn make(agent: &Agent, body: Vec<Statement>) {
        run(
            agent,
            vec![
                var(VarKind::Var, "log", Some(string(""))),
                function_decl(FunctionKind::AsyncGenerator, "gen", &[], body),
                var(VarKind::Var, "g", Some(call(ident("gen"), vec![]))),
            ],
        );
    }

    fn request(agent: &Agent, method: &str, arg: Expression) -> JsValue {
        match run(agent, vec![expr_stmt(method_call(ident("g"), method, vec![arg]))]) {
            Completion::Normal(promise) => promise,
            other => panic!("{method} threw: {other:?}"),
        }
    }

    fn settled(agent: &Agent, promise: &JsValue) -> (PromiseState, JsValue, bool) {
        let (state, result) = agent.promise_state(promise).unwrap();
        if state != PromiseState::Fulfilled {
            return (state, result, false);
        }
        let value = agent.get_property(&result, "value").ok().unwrap();
        let done = matches!(
            agent.get_property(&result, "done"),
            Completion::Normal(JsValue::Boolean(true))
        );
        (state, value, done)
    }

    fn append(label: &str) -> Statement {
        expr_stmt(assign("log", add(ident("log"), string(label))))
    }

    fn log(agent: &Agent) -> String {
        match agent.get_global("log") {
            Some(JsValue::String(s)) => s.to_rust_string(),
            other => panic!("log is {other:?}"),
        }
    }

    #[test]
    fn queued_requests_resolve_in_submission_order() {
        let agent = Agent::new(AgentOptions::default());
        make(
            &agent,
            vec![
                expr_stmt(await_(num(0.0))),
                expr_stmt(yield_(num(1.0))),
                expr_stmt(yield_(num(2.0))),
            ],
        );
        let first = request(&agent, "next", undefined());
        let second = request(&agent, "next", undefined());
        let third = request(&agent, "next", undefined());
        // the body is parked on its first await; nothing has settled
        for p in [&first, &second, &third] {
            assert_eq!(agent.promise_state(p).unwrap().0, PromiseState::Pending);
        }
        agent.run_jobs().unwrap();
        let (_, v1, d1) = settled(&agent, &first);
        let (_, v2, d2) = settled(&agent, &second);
        let (_, v3, d3) = settled(&agent, &third);
        assert!(matches!(v1, JsValue::Number(n) if n == 1.0) && !d1);
        assert!(matches!(v2, JsValue::Number(n) if n == 2.0) && !d2);
        assert!(v3.is_undefined() && d3);
    }

    #[test]
    fn settlement_order_matches_submission_order() {
        let agent = Agent::new(AgentOptions::default());
        make(
            &agent,
            vec![
                expr_stmt(yield_(await_(num(1.0)))),
                expr_stmt(yield_(num(2.0))),
            ],
        );
        let record = |label: &str| arrow(&["r"], vec![append(label)]);
        run(
            &agent,
            vec![
                expr_stmt(method_call(
                    method_call(ident("g"), "next", vec![]),
                    "then",
                    vec![record("a")],
                )),
                expr_stmt(method_call(
                    method_call(ident("g"), "next", vec![]),
                    "then",
                    vec![record("b")],
                )),
            ],
        );
        assert_eq!(log(&agent), "");
        agent.run_jobs().unwrap();
        assert_eq!(log(&agent), "ab");
    }

    #[test]
    fn return_before_start_awaits_the_value_without_running() {
        let agent = Agent::new(AgentOptions::default());
        make(&agent, vec![append("ran")]);
        let promise = request(
            &agent,
            "return",
            call(member(ident("Promise"), "resolve"), vec![num(7.0)]),
        );
        assert_eq!(agent.promise_state(&promise).unwrap().0, PromiseState::Pending);
        agent.run_jobs().unwrap();
        let (state, value, done) = settled(&agent, &promise);
        assert_eq!(state, PromiseState::Fulfilled);
        assert!(matches!(value, JsValue::Number(n) if n == 7.0) && done);
        assert_eq!(log(&agent), "");
        let after = request(&agent, "next", undefined());
        let (_, value, done) = settled(&agent, &after);
        assert!(value.is_undefined() && done);
    }

    #[test]
    fn return_at_a_yield_awaits_and_runs_finally() {
        let agent = Agent::new(AgentOptions::default());
        make(
            &agent,
            vec![try_(
                vec![expr_stmt(yield_(num(1.0)))],
                None,
                Some(vec![append("finally")]),
            )],
        );
        request(&agent, "next", undefined());
        agent.run_jobs().unwrap();
        let promise = request(
            &agent,
            "return",
            call(member(ident("Promise"), "resolve"), vec![num(5.0)]),
        );
        agent.run_jobs().unwrap();
        let (state, value, done) = settled(&agent, &promise);
        assert_eq!(state, PromiseState::Fulfilled);
        assert!(matches!(value, JsValue::Number(n) if n == 5.0) && done);
        assert_eq!(log(&agent), "finally");
    }

    #[test]
    fn throw_before_start_rejects_and_completes() {
        let agent = Agent::new(AgentOptions::default());
        make(&agent, vec![append("ran")]);
        let promise = request(&agent, "throw", string("stop"));
        let (state, reason, _) = settled(&agent, &promise);
        assert_eq!(state, PromiseState::Rejected);
        assert!(matches!(reason, JsValue::String(ref s) if s.to_rust_string() == "stop"));
        let after = request(&agent, "next", undefined());
        let (_, value, done) = settled(&agent, &after);
        assert!(value.is_undefined() && done);
        assert_eq!(log(&agent), "");
    }

    #[test]
    fn body_throw_rejects_the_in_flight_request_and_drains() {
        let agent = Agent::new(AgentOptions::default());
        make(
            &agent,
            vec![expr_stmt(await_(num(0.0))), throw(string("boom"))],
        );
        let first = request(&agent, "next", undefined());
        let second = request(&agent, "next", undefined());
        agent.run_jobs().unwrap();
        let (state, reason, _) = settled(&agent, &first);
        assert_eq!(state, PromiseState::Rejected);
        assert!(matches!(reason, JsValue::String(ref s) if s.to_rust_string() == "boom"));
        let (state, value, done) = settled(&agent, &second);
        assert_eq!(state, PromiseState::Fulfilled);
        assert!(value.is_undefined() && done);
    }

    #[test]
    fn methods_on_non_generators_reject() {
        let agent = Agent::new(AgentOptions::default());
        let promise = futures::executor::block_on(async_generator_next(
            &agent,
            JsValue::Number(1.0),
            JsValue::Undefined,
        ));
        let Completion::Normal(promise) = promise else {
            panic!("validation failures reject rather than throw");
        };
        assert_eq!(agent.promise_state(&promise).unwrap().0, PromiseState::Rejected);
    }

    #[test]
    fn yield_awaits_its_operand() {
        let agent = Agent::new(AgentOptions::default());
        make(
            &agent,
            vec![expr_stmt(yield_(call(member(ident("Promise"), "resolve"), vec![num(3.0)])))],
        );
        let promise = request(&agent, "next", undefined());
        agent.run_jobs().unwrap();
        let (_, value, done) = settled(&agent, &promise);
        assert!(matches!(value, JsValue::Number(n) if n == 3.0) && !done);
    }
}
