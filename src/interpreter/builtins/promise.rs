use super::*;
use crate::interpreter::call::{call, construct};
use crate::interpreter::jobs::call_job_callback;
use std::cell::Cell;

pub(super) fn setup_promise(b: &RealmBuilder<'_>, proto: JsObject) -> JsObject {
    let call_without_new = sync_native(|agent: &Agent, _this: &JsValue, _args: &[JsValue]| {
        agent.throw_type_error("Promise constructor cannot be invoked without 'new'")
    });
    let construct_promise = native_constructor(|agent, args, new_target| {
        Box::pin(async move { promise_constructor(&agent, args, new_target).await })
    });
    let ctor = b.function("Promise", 1, call_without_new, Some(construct_promise));
    b.link_constructor(ctor, proto);
    b.agent
        .define_hidden(ctor, SYMBOL_SPECIES, JsValue::Object(ctor));

    // Promise.resolve
    b.method(
        ctor,
        "resolve",
        1,
        async_native(|agent, this, args| {
            Box::pin(async move { promise_resolve_static(&agent, this, arg(&args, 0)).await })
        }),
    );

    // Promise.reject
    b.method(
        ctor,
        "reject",
        1,
        async_native(|agent, this, args| {
            Box::pin(async move { promise_reject_static(&agent, this, arg(&args, 0)).await })
        }),
    );

    // Promise.prototype.then
    b.method(
        proto,
        "then",
        2,
        async_native(|agent, this, args| {
            Box::pin(async move {
                promise_then(&agent, this, arg(&args, 0), arg(&args, 1)).await
            })
        }),
    );

    // Promise.prototype.catch
    b.method(
        proto,
        "catch",
        1,
        async_native(|agent, this, args| {
            Box::pin(async move { promise_catch(&agent, this, arg(&args, 0)).await })
        }),
    );

    ctor
}

fn with_promise<R>(agent: &Agent, promise: JsObject, f: impl FnOnce(&mut PromiseData) -> R) -> R {
    let mut heap = agent.heap_mut();
    match &mut heap.get_mut(promise).kind {
        ObjectKind::Promise(data) => f(data),
        _ => internal_error!("object {} is not a promise", promise.id),
    }
}

fn allocate_promise(agent: &Agent, proto: JsObject) -> JsObject {
    agent.allocate(ObjectData::new(
        Some(proto),
        ObjectKind::Promise(PromiseData::new()),
    ))
}

// §27.2.3.1 Promise ( executor )
async fn promise_constructor(agent: &Agent, args: Vec<JsValue>, new_target: JsObject) -> Completion {
    let executor = arg(&args, 0);
    if !agent.is_callable(&executor) {
        return agent.throw_type_error(&format!(
            "Promise resolver {} is not a function",
            agent.describe(&executor)
        ));
    }
    let proto = q!(agent.get_prototype_from_constructor(new_target, |i| i.promise_prototype));
    let promise = allocate_promise(agent, proto);
    let (resolve, reject) = create_resolving_functions(agent, promise);
    let completion = call(agent, executor, JsValue::Undefined, vec![resolve, reject.clone()]).await;
    if let Completion::Throw(error) = completion {
        q!(call(agent, reject, JsValue::Undefined, vec![error]).await);
    }
    Completion::Normal(JsValue::Object(promise))
}

// §27.2.1.3 CreateResolvingFunctions
pub(crate) fn create_resolving_functions(agent: &Agent, promise: JsObject) -> (JsValue, JsValue) {
    let already_resolved = Rc::new(Cell::new(false));

    let resolved = already_resolved.clone();
    let resolve = agent.create_builtin_function(
        "",
        1,
        sync_native(move |agent: &Agent, _this: &JsValue, args: &[JsValue]| {
            if resolved.replace(true) {
                return Completion::Normal(JsValue::Undefined);
            }
            resolve_promise(agent, promise, arg(args, 0));
            Completion::Normal(JsValue::Undefined)
        }),
    );

    let resolved = already_resolved;
    let reject = agent.create_builtin_function(
        "",
        1,
        sync_native(move |agent: &Agent, _this: &JsValue, args: &[JsValue]| {
            if resolved.replace(true) {
                return Completion::Normal(JsValue::Undefined);
            }
            reject_promise(agent, promise, arg(args, 0));
            Completion::Normal(JsValue::Undefined)
        }),
    );

    (resolve, reject)
}

// §27.2.1.3.2 Promise Resolve Functions, after the AlreadyResolved check
fn resolve_promise(agent: &Agent, promise: JsObject, resolution: JsValue) {
    let Some(thenable) = resolution.as_object() else {
        fulfill_promise(agent, promise, resolution);
        return;
    };
    if thenable == promise {
        let error = agent.create_type_error("Chaining cycle detected for promise");
        reject_promise(agent, promise, error);
        return;
    }
    let then = match agent.get(thenable, "then") {
        Completion::Normal(then) => then,
        Completion::Throw(error) => {
            reject_promise(agent, promise, error);
            return;
        }
        other => internal_error!("[[Get]] returned a {} completion", other.kind_name()),
    };
    let Some(then) = then.as_object().filter(|_| agent.is_callable(&then)) else {
        fulfill_promise(agent, promise, resolution);
        return;
    };
    let then_job_callback = agent.host().make_job_callback(then);
    let job = new_promise_resolve_thenable_job(agent, promise, resolution, then_job_callback);
    agent.host().enqueue_promise_job(job);
}

// §27.2.1.4 FulfillPromise
fn fulfill_promise(agent: &Agent, promise: JsObject, value: JsValue) {
    let reactions = with_promise(agent, promise, |data| {
        if data.state != PromiseState::Pending {
            internal_error!("settling a promise that is already settled");
        }
        data.state = PromiseState::Fulfilled;
        data.result = value.clone();
        data.reject_reactions.clear();
        std::mem::take(&mut data.fulfill_reactions)
    });
    trace!(promise = promise.id, reactions = reactions.len(), "promise fulfilled");
    trigger_promise_reactions(agent, reactions, value);
}

// §27.2.1.7 RejectPromise
fn reject_promise(agent: &Agent, promise: JsObject, reason: JsValue) {
    let (reactions, handled) = with_promise(agent, promise, |data| {
        if data.state != PromiseState::Pending {
            internal_error!("settling a promise that is already settled");
        }
        data.state = PromiseState::Rejected;
        data.result = reason.clone();
        data.fulfill_reactions.clear();
        (std::mem::take(&mut data.reject_reactions), data.is_handled)
    });
    trace!(promise = promise.id, reactions = reactions.len(), "promise rejected");
    if !handled {
        agent
            .host()
            .promise_rejection_tracker(promise, RejectionOperation::Reject);
    }
    trigger_promise_reactions(agent, reactions, reason);
}

// §27.2.1.8 TriggerPromiseReactions
fn trigger_promise_reactions(agent: &Agent, reactions: Vec<PromiseReaction>, argument: JsValue) {
    for reaction in reactions {
        let job = new_promise_reaction_job(agent, reaction, argument.clone());
        agent.host().enqueue_promise_job(job);
    }
}

// §27.2.2.1 NewPromiseReactionJob
fn new_promise_reaction_job(agent: &Agent, reaction: PromiseReaction, argument: JsValue) -> Job {
    let realm = reaction
        .handler
        .as_ref()
        .map(|handler| agent.get_function_realm(handler.callback));
    Job::new(realm, move |agent| {
        Box::pin(async move { promise_reaction_job(&agent, reaction, argument).await })
    })
}

async fn promise_reaction_job(agent: &Agent, reaction: PromiseReaction, argument: JsValue) -> Completion {
    let handler_result = match &reaction.handler {
        Some(handler) => call_job_callback(agent, handler, JsValue::Undefined, vec![argument]).await,
        None => match reaction.kind {
            ReactionType::Fulfill => Completion::Normal(argument),
            ReactionType::Reject => Completion::Throw(argument),
        },
    };
    let Some(capability) = reaction.capability else {
        if let Completion::Throw(error) = handler_result {
            internal_error!("reaction without a capability threw {error}");
        }
        return Completion::Normal(JsValue::Undefined);
    };
    match handler_result {
        Completion::Throw(error) => {
            call(agent, capability.reject, JsValue::Undefined, vec![error]).await
        }
        Completion::Normal(value) => {
            call(agent, capability.resolve, JsValue::Undefined, vec![value]).await
        }
        other => internal_error!("promise handler returned a {} completion", other.kind_name()),
    }
}

// §27.2.2.2 NewPromiseResolveThenableJob
fn new_promise_resolve_thenable_job(
    agent: &Agent,
    promise: JsObject,
    thenable: JsValue,
    then: JobCallback,
) -> Job {
    let realm = agent.get_function_realm(then.callback);
    Job::new(Some(realm), move |agent| {
        Box::pin(async move { promise_resolve_thenable_job(&agent, promise, thenable, then).await })
    })
}

async fn promise_resolve_thenable_job(
    agent: &Agent,
    promise: JsObject,
    thenable: JsValue,
    then: JobCallback,
) -> Completion {
    let (resolve, reject) = create_resolving_functions(agent, promise);
    let then_call_result = call_job_callback(agent, &then, thenable, vec![resolve, reject.clone()]).await;
    match then_call_result {
        Completion::Throw(error) => call(agent, reject, JsValue::Undefined, vec![error]).await,
        other => other,
    }
}

/// A fresh pending %Promise% of the current realm with its resolving
/// functions. This is NewPromiseCapability(%Promise%), which cannot fail.
pub(crate) fn new_intrinsic_promise_capability(agent: &Agent) -> PromiseCapability {
    let promise = allocate_promise(agent, agent.intrinsics().promise_prototype);
    let (resolve, reject) = create_resolving_functions(agent, promise);
    PromiseCapability {
        promise: JsValue::Object(promise),
        resolve,
        reject,
    }
}

/// Rejects `capability` with `error` and hands back its promise.
pub(crate) async fn reject_capability(
    agent: &Agent,
    capability: PromiseCapability,
    error: JsValue,
) -> Completion {
    q!(call(agent, capability.reject, JsValue::Undefined, vec![error]).await);
    Completion::Normal(capability.promise)
}

// §27.2.1.5 NewPromiseCapability ( C )
pub(crate) async fn new_promise_capability(agent: &Agent, c: JsValue) -> Completion<PromiseCapability> {
    if !agent.is_constructor(&c) {
        return agent.throw_type_error(&format!("{} is not a constructor", agent.describe(&c)));
    }
    if let Some(ctor) = c.as_object() {
        let realm = agent.get_function_realm(ctor);
        let intrinsics = agent.realm(realm).intrinsics;
        if ctor == intrinsics.promise {
            let promise = allocate_promise(agent, intrinsics.promise_prototype);
            let (resolve, reject) = create_resolving_functions(agent, promise);
            return Completion::Normal(PromiseCapability {
                promise: JsValue::Object(promise),
                resolve,
                reject,
            });
        }
    }

    let slots: Rc<RefCell<(JsValue, JsValue)>> =
        Rc::new(RefCell::new((JsValue::Undefined, JsValue::Undefined)));
    let executor_slots = slots.clone();
    let executor = agent.create_builtin_function(
        "",
        2,
        sync_native(move |agent: &Agent, _this: &JsValue, args: &[JsValue]| {
            let mut slots = executor_slots.borrow_mut();
            if !slots.0.is_undefined() || !slots.1.is_undefined() {
                return agent.throw_type_error("Promise executor has already been invoked");
            }
            *slots = (arg(args, 0), arg(args, 1));
            Completion::Normal(JsValue::Undefined)
        }),
    );
    let promise = q!(construct(agent, c, vec![executor], None).await);
    let (resolve, reject) = slots.borrow().clone();
    if !agent.is_callable(&resolve) {
        return agent.throw_type_error("Promise resolve function is not callable");
    }
    if !agent.is_callable(&reject) {
        return agent.throw_type_error("Promise reject function is not callable");
    }
    Completion::Normal(PromiseCapability {
        promise,
        resolve,
        reject,
    })
}

// §27.2.4.7.1 PromiseResolve ( C, x )
pub(crate) async fn promise_resolve(agent: &Agent, c: JsObject, x: JsValue) -> Completion {
    if agent.is_promise(&x) {
        let x_constructor = q!(agent.get_v(&x, "constructor"));
        if same_value(&x_constructor, &JsValue::Object(c)) {
            return Completion::Normal(x);
        }
    }
    let capability = q!(new_promise_capability(agent, JsValue::Object(c)).await);
    q!(call(agent, capability.resolve, JsValue::Undefined, vec![x]).await);
    Completion::Normal(capability.promise)
}

// §27.2.5.4.1 PerformPromiseThen
pub(crate) fn perform_promise_then(
    agent: &Agent,
    promise: JsObject,
    on_fulfilled: JsValue,
    on_rejected: JsValue,
    capability: Option<PromiseCapability>,
) -> JsValue {
    let host = agent.host();
    let job_callback = |handler: &JsValue| {
        handler
            .as_object()
            .filter(|_| agent.is_callable(handler))
            .map(|callback| host.make_job_callback(callback))
    };
    let fulfill_reaction = PromiseReaction {
        capability: capability.clone(),
        kind: ReactionType::Fulfill,
        handler: job_callback(&on_fulfilled),
    };
    let reject_reaction = PromiseReaction {
        capability: capability.clone(),
        kind: ReactionType::Reject,
        handler: job_callback(&on_rejected),
    };

    let (state, result, was_handled) = with_promise(agent, promise, |data| {
        let snapshot = (data.state, data.result.clone(), data.is_handled);
        if data.state == PromiseState::Pending {
            data.fulfill_reactions.push(fulfill_reaction.clone());
            data.reject_reactions.push(reject_reaction.clone());
        }
        data.is_handled = true;
        snapshot
    });
    match state {
        PromiseState::Pending => {}
        PromiseState::Fulfilled => {
            host.enqueue_promise_job(new_promise_reaction_job(agent, fulfill_reaction, result));
        }
        PromiseState::Rejected => {
            if !was_handled {
                host.promise_rejection_tracker(promise, RejectionOperation::Handle);
            }
            host.enqueue_promise_job(new_promise_reaction_job(agent, reject_reaction, result));
        }
    }
    match capability {
        Some(capability) => capability.promise,
        None => JsValue::Undefined,
    }
}

// §7.3.22 SpeciesConstructor
fn species_constructor(agent: &Agent, promise: JsObject, default: JsObject) -> Completion {
    let ctor = q!(agent.get(promise, "constructor"));
    if ctor.is_undefined() {
        return Completion::Normal(JsValue::Object(default));
    }
    let Some(ctor) = ctor.as_object() else {
        return agent.throw_type_error("object.constructor is not an object");
    };
    let species = q!(agent.get(ctor, SYMBOL_SPECIES));
    if species.is_nullish() {
        return Completion::Normal(JsValue::Object(default));
    }
    if agent.is_constructor(&species) {
        return Completion::Normal(species);
    }
    agent.throw_type_error("object.constructor[Symbol.species] is not a constructor")
}

// §27.2.5.4 Promise.prototype.then
async fn promise_then(agent: &Agent, this: JsValue, on_fulfilled: JsValue, on_rejected: JsValue) -> Completion {
    let Some(promise) = this.as_object().filter(|_| agent.is_promise(&this)) else {
        return agent.throw_type_error(&format!(
            "Method Promise.prototype.then called on incompatible receiver {}",
            agent.describe(&this)
        ));
    };
    let c = q!(species_constructor(agent, promise, agent.intrinsics().promise));
    let capability = q!(new_promise_capability(agent, c).await);
    Completion::Normal(perform_promise_then(
        agent,
        promise,
        on_fulfilled,
        on_rejected,
        Some(capability),
    ))
}

// §27.2.5.1 Promise.prototype.catch
async fn promise_catch(agent: &Agent, this: JsValue, on_rejected: JsValue) -> Completion {
    let then = q!(agent.get_v(&this, "then"));
    if !agent.is_callable(&then) {
        return agent.throw_type_error("then is not a function");
    }
    call(agent, then, this, vec![JsValue::Undefined, on_rejected]).await
}

// §27.2.4.7 Promise.resolve
async fn promise_resolve_static(agent: &Agent, this: JsValue, x: JsValue) -> Completion {
    let Some(c) = this.as_object() else {
        return agent.throw_type_error("PromiseResolve called on non-object");
    };
    promise_resolve(agent, c, x).await
}

// §27.2.4.6 Promise.reject
async fn promise_reject_static(agent: &Agent, this: JsValue, reason: JsValue) -> Completion {
    let capability = q!(new_promise_capability(agent, this).await);
    q!(call(agent, capability.reject, JsValue::Undefined, vec![reason]).await);
    Completion::Normal(capability.promise)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::build::*;
    use crate::ast::build::call;
    use crate::interpreter::call::call as call_function;

    fn run(agent: &Agent, body: Vec<Statement>) -> Completion {
        match agent.evaluate_script(program(body)).unwrap() {
            Outcome::Completed(c) => c,
            Outcome::Paused(_) => panic!("unexpected pause"),
        }
    }

    fn settle(agent: &Agent, promise: &JsValue) -> (PromiseState, JsValue) {
        agent.run_jobs().unwrap();
        agent.promise_state(promise).unwrap()
    }

    #[test]
    fn self_resolution_rejects_once_with_type_error() {
        let agent = Agent::new(AgentOptions::default());
        let capability = new_intrinsic_promise_capability(&agent);
        let promise = capability.promise.clone();
        let resolve = capability.resolve.clone();
        let reject = capability.reject.clone();
        futures::executor::block_on(async {
            call_function(&agent, resolve.clone(), JsValue::Undefined, vec![promise.clone()]).await;
            call_function(&agent, resolve, JsValue::Undefined, vec![JsValue::Number(1.0)]).await;
            call_function(&agent, reject, JsValue::Undefined, vec![JsValue::Number(2.0)]).await;
        });
        let (state, reason) = agent.promise_state(&promise).unwrap();
        assert_eq!(state, PromiseState::Rejected);
        assert_eq!(
            agent.error_message(&reason).as_deref(),
            Some("Chaining cycle detected for promise")
        );
        let proto = agent.heap().get(reason.as_object().unwrap()).prototype;
        assert_eq!(proto, Some(agent.intrinsics().type_error_prototype));
    }

    #[test]
    fn reactions_on_settled_promises_wait_for_the_queue() {
        let agent = Agent::new(AgentOptions::default());
        let result = run(
            &agent,
            vec![
                var(VarKind::Var, "seen", Some(string("none"))),
                expr_stmt(method_call(
                    call(member(ident("Promise"), "resolve"), vec![num(1.0)]),
                    "then",
                    vec![arrow(&["v"], vec![expr_stmt(assign("seen", ident("v")))])],
                )),
                expr_stmt(ident("seen")),
            ],
        );
        assert!(matches!(result, Completion::Normal(JsValue::String(ref s)) if s.to_rust_string() == "none"));
        agent.run_jobs().unwrap();
        assert!(matches!(agent.get_global("seen"), Some(JsValue::Number(n)) if n == 1.0));
    }

    #[test]
    fn thenables_are_adopted_in_a_later_job() {
        let agent = Agent::new(AgentOptions::default());
        let result = run(
            &agent,
            vec![
                let_("thenable", object(vec![(
                    "then",
                    function(FunctionKind::Normal, &["res"], vec![expr_stmt(call(
                        ident("res"),
                        vec![num(42.0)],
                    ))]),
                )])),
                expr_stmt(new(
                    ident("Promise"),
                    vec![arrow(&["res"], vec![expr_stmt(call(ident("res"), vec![ident(
                        "thenable",
                    )]))])],
                )),
            ],
        );
        let Completion::Normal(promise) = result else {
            panic!("expected a promise");
        };
        assert_eq!(agent.promise_state(&promise).unwrap().0, PromiseState::Pending);
        assert_eq!(agent.job_queue().unwrap().len(), 1);
        let (state, value) = settle(&agent, &promise);
        assert_eq!(state, PromiseState::Fulfilled);
        assert!(matches!(value, JsValue::Number(n) if n == 42.0));
    }

    #[test]
    fn executor_throw_rejects_the_promise() {
        let agent = Agent::new(AgentOptions::default());
        let result = run(
            &agent,
            vec![expr_stmt(new(
                ident("Promise"),
                vec![arrow(&[], vec![throw(string("bad"))])],
            ))],
        );
        let Completion::Normal(promise) = result else {
            panic!("expected a promise");
        };
        let (state, reason) = agent.promise_state(&promise).unwrap();
        assert_eq!(state, PromiseState::Rejected);
        assert!(matches!(reason, JsValue::String(ref s) if s.to_rust_string() == "bad"));
    }

    #[test]
    fn promise_requires_new_and_a_callable_executor() {
        let agent = Agent::new(AgentOptions::default());
        assert!(run(&agent, vec![expr_stmt(call(ident("Promise"), vec![]))]).is_throw());
        assert!(run(&agent, vec![expr_stmt(new(ident("Promise"), vec![num(1.0)]))]).is_throw());
    }

    #[test]
    fn promise_resolve_returns_same_promise() {
        let agent = Agent::new(AgentOptions::default());
        let result = run(
            &agent,
            vec![
                let_("p", call(member(ident("Promise"), "resolve"), vec![num(1.0)])),
                expr_stmt(binary(
                    BinaryOperator::StrictEq,
                    call(member(ident("Promise"), "resolve"), vec![ident("p")]),
                    ident("p"),
                )),
            ],
        );
        assert!(matches!(result, Completion::Normal(JsValue::Boolean(true))));
    }

    #[test]
    fn generic_capability_constructs_the_receiver() {
        let agent = Agent::new(AgentOptions::default());
        // function Deferred(executor) { executor(() => {}, () => {}); this.tag = "custom"; }
        // Deferred.reject = Promise.reject; Deferred.reject(1).tag
        let result = run(
            &agent,
            vec![
                function_decl(FunctionKind::Normal, "Deferred", &["executor"], vec![
                    expr_stmt(call(ident("executor"), vec![arrow(&[], vec![]), arrow(&[], vec![])])),
                    expr_stmt(assign_member(this(), "tag", string("custom"))),
                ]),
                expr_stmt(assign_member(
                    ident("Deferred"),
                    "reject",
                    member(ident("Promise"), "reject"),
                )),
                expr_stmt(member(method_call(ident("Deferred"), "reject", vec![num(1.0)]), "tag")),
            ],
        );
        assert!(matches!(result, Completion::Normal(JsValue::String(ref s)) if s.to_rust_string() == "custom"));
    }

    #[test]
    fn capability_executor_rejects_a_second_initialisation() {
        let agent = Agent::new(AgentOptions::default());
        let resolver = || arrow(&[], vec![]);
        let result = run(
            &agent,
            vec![
                function_decl(FunctionKind::Normal, "Twice", &["executor"], vec![
                    expr_stmt(call(ident("executor"), vec![resolver(), resolver()])),
                    expr_stmt(call(ident("executor"), vec![resolver(), resolver()])),
                ]),
                expr_stmt(assign_member(
                    ident("Twice"),
                    "resolve",
                    member(ident("Promise"), "resolve"),
                )),
                expr_stmt(method_call(ident("Twice"), "resolve", vec![num(1.0)])),
            ],
        );
        let Completion::Throw(error) = result else {
            panic!("expected a TypeError");
        };
        assert_eq!(
            agent.error_message(&error).as_deref(),
            Some("Promise executor has already been invoked")
        );
    }

    #[test]
    fn rejection_tracking_is_revoked_by_a_late_handler() {
        let agent = Agent::new(AgentOptions::default());
        run(
            &agent,
            vec![let_("p", call(member(ident("Promise"), "reject"), vec![num(1.0)]))],
        );
        let queue = agent.job_queue().unwrap();
        assert_eq!(queue.unhandled_rejections().len(), 1);
        run(
            &agent,
            vec![expr_stmt(method_call(ident("p"), "catch", vec![arrow(&[], vec![])]))],
        );
        assert!(queue.unhandled_rejections().is_empty());
        agent.run_jobs().unwrap();
        assert!(queue.unhandled_rejections().is_empty());
    }
}
