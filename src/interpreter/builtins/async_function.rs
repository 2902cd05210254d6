use super::*;
use crate::interpreter::call::call;

// §27.7.5.1 AsyncFunctionStart. `ctx` is the function's own context, already
// off the stack; the body runs in it until its first await.
pub(crate) async fn async_function_start(
    agent: &Agent,
    ctx: ContextId,
    node: Rc<FunctionNode>,
    env: EnvRef,
) -> Completion {
    let capability = promise::new_intrinsic_promise_capability(agent);
    let body_agent = agent.handle();
    let body_capability = capability.clone();
    agent.contexts_mut().get_mut(ctx).code_evaluation_state = Some(Box::pin(async move {
        async_block_body(&body_agent, &node, &env, body_capability).await
    }));
    match drive_context(agent, ctx, None).await {
        Step::Completed(_) | Step::Suspended(SuspensionRequest::Await) => {}
        Step::Suspended(other) => {
            internal_error!("{} suspension inside an async function", other.kind_name())
        }
    }
    Completion::Normal(capability.promise)
}

// §27.7.5.2 AsyncBlockStart
async fn async_block_body(
    agent: &Agent,
    node: &FunctionNode,
    env: &EnvRef,
    capability: PromiseCapability,
) -> Completion {
    let (settle, value) = match exec::function_body(agent, &node.body, env).await {
        Completion::Normal(_) => (capability.resolve, JsValue::Undefined),
        Completion::Return(value) => (capability.resolve, value),
        Completion::Throw(error) => (capability.reject, error),
        abrupt => internal_error!("{} escaped an async function body", abrupt.kind_name()),
    };
    x!(call(agent, settle, JsValue::Undefined, vec![value]).await);
    Completion::Normal(JsValue::Undefined)
}

/// Await(value) from the running async function or async generator body.
pub(crate) fn await_value(agent: &Agent, value: JsValue) -> LocalBoxFuture<'_, Completion> {
    Box::pin(await_inner(agent, value))
}

// §6.2.3.1 Await
async fn await_inner(agent: &Agent, value: JsValue) -> Completion {
    let Some(ctx) = agent.running_context() else {
        internal_error!("await with an empty execution context stack");
    };
    let promise = q!(promise::promise_resolve(agent, agent.intrinsics().promise, value).await);
    let Some(promise) = promise.as_object() else {
        internal_error!("PromiseResolve produced a non-object");
    };
    let on_fulfilled = await_continuation(agent, ctx, ReactionType::Fulfill);
    let on_rejected = await_continuation(agent, ctx, ReactionType::Reject);
    promise::perform_promise_then(agent, promise, on_fulfilled, on_rejected, None);
    trace!(context = %ctx, "awaiting");
    match suspend(agent, SuspensionRequest::Await).await {
        ResumeMessage::AwaitResume(completion) => completion,
        other => internal_error!("await resumed with {}", other.kind_name()),
    }
}

/// Reaction handler that resumes the awaiting context with the settled value.
fn await_continuation(agent: &Agent, ctx: ContextId, kind: ReactionType) -> JsValue {
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
                resume_awaiting_context(&agent, ctx, completion).await;
                Completion::Normal(JsValue::Undefined)
            })
        }),
    )
}

async fn resume_awaiting_context(agent: &Agent, ctx: ContextId, completion: Completion) {
    match drive_context(agent, ctx, Some(ResumeMessage::AwaitResume(completion))).await {
        Step::Completed(_) => trace!(context = %ctx, "async body finished"),
        Step::Suspended(request) => {
            trace!(context = %ctx, request = request.kind_name(), "async body suspended again")
        }
    }
}
