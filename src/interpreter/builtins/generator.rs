use super::*;

pub(super) fn setup_generator_prototype(b: &RealmBuilder<'_>, proto: JsObject) {
    // %GeneratorPrototype%.next
    b.method(
        proto,
        "next",
        1,
        async_native(|agent, this, args| {
            Box::pin(async move { generator_resume(&agent, &this, arg(&args, 0)).await })
        }),
    );

    // %GeneratorPrototype%.return
    b.method(
        proto,
        "return",
        1,
        async_native(|agent, this, args| {
            let completion = Completion::Return(arg(&args, 0));
            Box::pin(async move { generator_resume_abrupt(&agent, &this, completion).await })
        }),
    );

    // %GeneratorPrototype%.throw
    b.method(
        proto,
        "throw",
        1,
        async_native(|agent, this, args| {
            let completion = Completion::Throw(arg(&args, 0));
            Box::pin(async move { generator_resume_abrupt(&agent, &this, completion).await })
        }),
    );
}

fn with_generator<R>(agent: &Agent, generator: JsObject, f: impl FnOnce(&mut GeneratorData) -> R) -> R {
    let mut heap = agent.heap_mut();
    match &mut heap.get_mut(generator).kind {
        ObjectKind::Generator(data) => f(data),
        _ => internal_error!("object {} is not a generator", generator.id),
    }
}

// §27.5.3.1 GeneratorStart. `ctx` is the generator function's context,
// already off the stack; it becomes the generator's own context.
pub(crate) fn generator_start(
    agent: &Agent,
    ctx: ContextId,
    func: JsObject,
    node: Rc<FunctionNode>,
    env: EnvRef,
) -> Completion {
    let proto = match agent.get_prototype_from_constructor(func, |i| i.generator_prototype) {
        Completion::Normal(proto) => proto,
        abrupt => {
            agent.contexts_mut().release(ctx);
            return abrupt.into_abrupt();
        }
    };
    let generator = agent.allocate(ObjectData::new(
        Some(proto),
        ObjectKind::Generator(GeneratorData {
            state: GeneratorState::SuspendedStart,
            context: Some(ctx),
        }),
    ));
    let body_agent = agent.handle();
    let mut contexts = agent.contexts_mut();
    let context = contexts.get_mut(ctx);
    context.generator = Some(generator);
    context.code_evaluation_state = Some(Box::pin(async move {
        generator_body(&body_agent, &node, &env).await
    }));
    trace!(generator = generator.id, context = %ctx, "generator created");
    Completion::Normal(JsValue::Object(generator))
}

/// The body as the generator's computation: a return becomes the final
/// `{ value, done: true }` result.
async fn generator_body(agent: &Agent, node: &FunctionNode, env: &EnvRef) -> Completion {
    match exec::function_body(agent, &node.body, env).await {
        Completion::Normal(_) => {
            Completion::Normal(agent.create_iter_result_object(JsValue::Undefined, true))
        }
        Completion::Return(value) => Completion::Normal(agent.create_iter_result_object(value, true)),
        Completion::Throw(error) => Completion::Throw(error),
        abrupt => internal_error!("{} escaped a generator body", abrupt.kind_name()),
    }
}

// §27.5.3.2 GeneratorValidate
fn generator_validate(agent: &Agent, value: &JsValue) -> Completion<(JsObject, GeneratorState)> {
    let state = value.as_object().and_then(|obj| match &agent.heap().get(obj).kind {
        ObjectKind::Generator(data) => Some((obj, data.state)),
        _ => None,
    });
    match state {
        Some((_, GeneratorState::Executing)) => agent.throw_type_error("Generator is already running"),
        Some(found) => Completion::Normal(found),
        None => agent.throw_type_error(&format!(
            "generator method called on incompatible receiver {}",
            agent.describe(value)
        )),
    }
}

// §27.5.3.3 GeneratorResume
pub(crate) async fn generator_resume(agent: &Agent, generator: &JsValue, value: JsValue) -> Completion {
    let (generator, state) = q!(generator_validate(agent, generator));
    if state == GeneratorState::Completed {
        return Completion::Normal(agent.create_iter_result_object(JsValue::Undefined, true));
    }
    let message = match state {
        GeneratorState::SuspendedStart => None,
        _ => Some(ResumeMessage::GeneratorResume(Completion::Normal(value))),
    };
    run_generator(agent, generator, message).await
}

// §27.5.3.4 GeneratorResumeAbrupt
pub(crate) async fn generator_resume_abrupt(
    agent: &Agent,
    generator: &JsValue,
    abrupt: Completion,
) -> Completion {
    let (generator, mut state) = q!(generator_validate(agent, generator));
    if state == GeneratorState::SuspendedStart {
        // the body never runs
        let ctx = with_generator(agent, generator, |data| {
            data.state = GeneratorState::Completed;
            data.context.take()
        });
        if let Some(ctx) = ctx {
            agent.contexts_mut().release(ctx);
        }
        state = GeneratorState::Completed;
    }
    if state == GeneratorState::Completed {
        return match abrupt {
            Completion::Return(value) => Completion::Normal(agent.create_iter_result_object(value, true)),
            other => other,
        };
    }
    run_generator(agent, generator, Some(ResumeMessage::GeneratorResume(abrupt))).await
}

async fn run_generator(agent: &Agent, generator: JsObject, message: Option<ResumeMessage>) -> Completion {
    let ctx = with_generator(agent, generator, |data| {
        data.state = GeneratorState::Executing;
        data.context
    });
    let Some(ctx) = ctx else {
        internal_error!("suspended generator {} has no context", generator.id);
    };
    match drive_context(agent, ctx, message).await {
        Step::Suspended(SuspensionRequest::Yield(result)) => {
            with_generator(agent, generator, |data| data.state = GeneratorState::SuspendedYield);
            Completion::Normal(result)
        }
        Step::Suspended(other) => {
            internal_error!("{} suspension inside a generator body", other.kind_name())
        }
        Step::Completed(completion) => {
            with_generator(agent, generator, |data| {
                data.state = GeneratorState::Completed;
                data.context = None;
            });
            trace!(generator = generator.id, "generator completed");
            completion
        }
    }
}

// §27.5.3.7 GeneratorYield
pub(crate) async fn generator_yield(agent: &Agent, iter_result: JsValue) -> Completion {
    match suspend(agent, SuspensionRequest::Yield(iter_result)).await {
        ResumeMessage::GeneratorResume(completion) => completion,
        other => internal_error!("generator resumed with {}", other.kind_name()),
    }
}

// §15.5.5 Yield
pub(crate) async fn yield_value(agent: &Agent, value: JsValue) -> Completion {
    if agent.in_async_generator() {
        let value = q!(await_value(agent, value).await);
        return async_generator::async_generator_yield(agent, value).await;
    }
    let result = agent.create_iter_result_object(value, false);
    generator_yield(agent, result).await
}
