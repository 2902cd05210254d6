use super::*;
use crate::interpreter::call::call;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IteratorKind {
    Sync,
    Async,
}

pub(super) fn setup_async_from_sync_iterator_prototype(b: &RealmBuilder<'_>, proto: JsObject) {
    // %AsyncFromSyncIteratorPrototype%.next
    b.method(
        proto,
        "next",
        1,
        async_native(|agent, this, args| {
            Box::pin(async move { async_from_sync_next(&agent, this, args.first().cloned()).await })
        }),
    );

    // %AsyncFromSyncIteratorPrototype%.return
    b.method(
        proto,
        "return",
        1,
        async_native(|agent, this, args| {
            Box::pin(async move { async_from_sync_return(&agent, this, args.first().cloned()).await })
        }),
    );

    // %AsyncFromSyncIteratorPrototype%.throw
    b.method(
        proto,
        "throw",
        1,
        async_native(|agent, this, args| {
            Box::pin(async move { async_from_sync_throw(&agent, this, arg(&args, 0)).await })
        }),
    );
}

// §7.4.2 GetIteratorFromMethod
async fn get_iterator_from_method(
    agent: &Agent,
    obj: &JsValue,
    method: JsValue,
) -> Completion<IteratorRecord> {
    let iterator = q!(call(agent, method, obj.clone(), vec![]).await);
    if iterator.as_object().is_none() {
        return agent.throw_type_error("Result of the Symbol.iterator method is not an object");
    }
    let next_method = q!(agent.get_v(&iterator, "next"));
    Completion::Normal(IteratorRecord {
        iterator,
        next_method,
    })
}

// §7.4.3 GetIterator
pub(crate) async fn get_iterator(
    agent: &Agent,
    obj: &JsValue,
    kind: IteratorKind,
) -> Completion<IteratorRecord> {
    if kind == IteratorKind::Async {
        let method = q!(agent.get_method(obj, SYMBOL_ASYNC_ITERATOR));
        if !method.is_undefined() {
            return get_iterator_from_method(agent, obj, method).await;
        }
        let sync_method = q!(agent.get_method(obj, SYMBOL_ITERATOR));
        if sync_method.is_undefined() {
            return agent.throw_type_error(&format!(
                "{} is not async iterable",
                agent.describe(obj)
            ));
        }
        let sync_record = q!(get_iterator_from_method(agent, obj, sync_method).await);
        return Completion::Normal(create_async_from_sync_iterator(agent, sync_record));
    }
    let method = q!(agent.get_method(obj, SYMBOL_ITERATOR));
    if method.is_undefined() {
        return agent.throw_type_error(&format!("{} is not iterable", agent.describe(obj)));
    }
    get_iterator_from_method(agent, obj, method).await
}

fn require_iter_result(agent: &Agent, result: JsValue) -> Completion {
    if result.as_object().is_none() {
        return agent.throw_type_error(&format!(
            "Iterator result {} is not an object",
            agent.describe(&result)
        ));
    }
    Completion::Normal(result)
}

// §7.4.4 IteratorNext
async fn iterator_next(agent: &Agent, record: &IteratorRecord, value: Option<JsValue>) -> Completion {
    let args = value.into_iter().collect();
    let result = q!(call(agent, record.next_method.clone(), record.iterator.clone(), args).await);
    require_iter_result(agent, result)
}

// §7.4.5 IteratorComplete
pub(crate) fn iterator_complete(agent: &Agent, result: &JsValue) -> Completion<bool> {
    let done = q!(agent.get_v(result, "done"));
    Completion::Normal(to_boolean(&done))
}

// §7.4.6 IteratorValue
pub(crate) fn iterator_value(agent: &Agent, result: &JsValue) -> Completion {
    agent.get_v(result, "value")
}

/// Shared tail of IteratorClose and AsyncIteratorClose.
fn close_result(agent: &Agent, inner: Completion, completion: Completion) -> Completion {
    if completion.is_throw() {
        return completion;
    }
    let inner = q!(inner);
    if inner.as_object().is_none() {
        return agent.throw_type_error("iterator.return() did not return an object");
    }
    completion
}

// §7.4.11 IteratorClose
pub(crate) async fn iterator_close(agent: &Agent, iterator: &JsValue, completion: Completion) -> Completion {
    let inner = match agent.get_method(iterator, "return") {
        Completion::Normal(method) if method.is_undefined() => return completion,
        Completion::Normal(method) => call(agent, method, iterator.clone(), vec![]).await,
        abrupt => abrupt,
    };
    close_result(agent, inner, completion)
}

// §7.4.13 AsyncIteratorClose
pub(crate) async fn async_iterator_close(
    agent: &Agent,
    iterator: &JsValue,
    completion: Completion,
) -> Completion {
    let inner = match agent.get_method(iterator, "return") {
        Completion::Normal(method) if method.is_undefined() => return completion,
        Completion::Normal(method) => match call(agent, method, iterator.clone(), vec![]).await {
            Completion::Normal(result) => await_value(agent, result).await,
            abrupt => abrupt,
        },
        abrupt => abrupt,
    };
    close_result(agent, inner, completion)
}

// §27.1.4.1 CreateAsyncFromSyncIterator
fn create_async_from_sync_iterator(agent: &Agent, sync_record: IteratorRecord) -> IteratorRecord {
    let prototype = agent.intrinsics().async_from_sync_iterator_prototype;
    let iterator = JsValue::Object(agent.allocate(ObjectData::new(
        Some(prototype),
        ObjectKind::AsyncFromSyncIterator(sync_record),
    )));
    let next_method = x!(agent.get_v(&iterator, "next"));
    IteratorRecord {
        iterator,
        next_method,
    }
}

fn sync_iterator_record(agent: &Agent, this: &JsValue) -> Completion<IteratorRecord> {
    let record = this.as_object().and_then(|obj| match &agent.heap().get(obj).kind {
        ObjectKind::AsyncFromSyncIterator(record) => Some(record.clone()),
        _ => None,
    });
    match record {
        Some(record) => Completion::Normal(record),
        None => agent.throw_type_error(&format!(
            "async-from-sync iterator method called on incompatible receiver {}",
            agent.describe(this)
        )),
    }
}

// §27.1.4.2.1 %AsyncFromSyncIteratorPrototype%.next
async fn async_from_sync_next(agent: &Agent, this: JsValue, value: Option<JsValue>) -> Completion {
    let capability = promise::new_intrinsic_promise_capability(agent);
    let record = if_abrupt_reject_promise!(agent, sync_iterator_record(agent, &this), capability);
    let result = if_abrupt_reject_promise!(agent, iterator_next(agent, &record, value).await, capability);
    async_from_sync_iterator_continuation(agent, result, capability).await
}

// §27.1.4.2.2 %AsyncFromSyncIteratorPrototype%.return
async fn async_from_sync_return(agent: &Agent, this: JsValue, value: Option<JsValue>) -> Completion {
    let capability = promise::new_intrinsic_promise_capability(agent);
    let record = if_abrupt_reject_promise!(agent, sync_iterator_record(agent, &this), capability);
    let method = if_abrupt_reject_promise!(
        agent,
        agent.get_method(&record.iterator, "return"),
        capability
    );
    if method.is_undefined() {
        let result =
            agent.create_iter_result_object(value.unwrap_or(JsValue::Undefined), true);
        x!(call(agent, capability.resolve.clone(), JsValue::Undefined, vec![result]).await);
        return Completion::Normal(capability.promise);
    }
    let args = value.into_iter().collect();
    let result = if_abrupt_reject_promise!(
        agent,
        call(agent, method, record.iterator.clone(), args).await,
        capability
    );
    let result = if_abrupt_reject_promise!(agent, require_iter_result(agent, result), capability);
    async_from_sync_iterator_continuation(agent, result, capability).await
}

// §27.1.4.2.3 %AsyncFromSyncIteratorPrototype%.throw
async fn async_from_sync_throw(agent: &Agent, this: JsValue, value: JsValue) -> Completion {
    let capability = promise::new_intrinsic_promise_capability(agent);
    let record = if_abrupt_reject_promise!(agent, sync_iterator_record(agent, &this), capability);
    let method = if_abrupt_reject_promise!(
        agent,
        agent.get_method(&record.iterator, "throw"),
        capability
    );
    if method.is_undefined() {
        return promise::reject_capability(agent, capability, value).await;
    }
    let result = if_abrupt_reject_promise!(
        agent,
        call(agent, method, record.iterator.clone(), vec![value]).await,
        capability
    );
    let result = if_abrupt_reject_promise!(agent, require_iter_result(agent, result), capability);
    async_from_sync_iterator_continuation(agent, result, capability).await
}

// §27.1.4.4 AsyncFromSyncIteratorContinuation
async fn async_from_sync_iterator_continuation(
    agent: &Agent,
    result: JsValue,
    capability: PromiseCapability,
) -> Completion {
    let done = if_abrupt_reject_promise!(agent, iterator_complete(agent, &result), capability);
    let value = if_abrupt_reject_promise!(agent, iterator_value(agent, &result), capability);
    let wrapper = if_abrupt_reject_promise!(
        agent,
        promise::promise_resolve(agent, agent.intrinsics().promise, value).await,
        capability
    );
    let Some(wrapper) = wrapper.as_object() else {
        internal_error!("PromiseResolve produced a non-object");
    };
    let unwrap = agent.create_builtin_function(
        "",
        1,
        sync_native(move |agent: &Agent, _this: &JsValue, args: &[JsValue]| {
            Completion::Normal(agent.create_iter_result_object(arg(args, 0), done))
        }),
    );
    promise::perform_promise_then(
        agent,
        wrapper,
        unwrap,
        JsValue::Undefined,
        Some(capability.clone()),
    );
    Completion::Normal(capability.promise)
}

// §15.5.5 YieldExpression : yield * AssignmentExpression
pub(crate) async fn yield_delegate(agent: &Agent, value: JsValue) -> Completion {
    let kind = if agent.in_async_generator() {
        IteratorKind::Async
    } else {
        IteratorKind::Sync
    };
    let record = q!(get_iterator(agent, &value, kind).await);
    let iterator = record.iterator.clone();
    let mut received = Completion::Normal(JsValue::Undefined);
    loop {
        let (inner_result, returning) = match received {
            Completion::Normal(value) => (
                call(agent, record.next_method.clone(), iterator.clone(), vec![value]).await,
                false,
            ),
            Completion::Throw(error) => {
                let throw = q!(agent.get_method(&iterator, "throw"));
                if throw.is_undefined() {
                    let closed = match kind {
                        IteratorKind::Async => {
                            async_iterator_close(agent, &iterator, Completion::Normal(JsValue::Undefined))
                                .await
                        }
                        IteratorKind::Sync => {
                            iterator_close(agent, &iterator, Completion::Normal(JsValue::Undefined))
                                .await
                        }
                    };
                    q!(closed);
                    return agent.throw_type_error("The iterator does not provide a 'throw' method");
                }
                (call(agent, throw, iterator.clone(), vec![error]).await, false)
            }
            Completion::Return(value) => {
                let method = q!(agent.get_method(&iterator, "return"));
                if method.is_undefined() {
                    let value = match kind {
                        IteratorKind::Async => q!(await_value(agent, value).await),
                        IteratorKind::Sync => value,
                    };
                    return Completion::Return(value);
                }
                (call(agent, method, iterator.clone(), vec![value]).await, true)
            }
            other => internal_error!("yield* resumed with a {} completion", other.kind_name()),
        };
        let mut inner_result = q!(inner_result);
        if kind == IteratorKind::Async {
            inner_result = q!(await_value(agent, inner_result).await);
        }
        let inner_result = q!(require_iter_result(agent, inner_result));
        if q!(iterator_complete(agent, &inner_result)) {
            let value = q!(iterator_value(agent, &inner_result));
            return if returning {
                Completion::Return(value)
            } else {
                Completion::Normal(value)
            };
        }
        received = match kind {
            IteratorKind::Async => {
                let value = q!(iterator_value(agent, &inner_result));
                async_generator::async_generator_yield(agent, value).await
            }
            IteratorKind::Sync => generator::generator_yield(agent, inner_result).await,
        };
    }
}
