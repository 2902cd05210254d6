//! [[Call]] and [[Construct]]. These live in the core because invoking
//! ECMAScript code pushes execution contexts and may suspend.

use super::builtins::{async_function, async_generator, generator};
use super::*;

impl Agent {
    pub(crate) fn push_context(&self, context: ExecutionContext) -> ContextId {
        let mut contexts = self.contexts_mut();
        let id = contexts.insert(context);
        contexts.push(id);
        id
    }

    /// Pop and release a context that was pushed inline.
    pub(crate) fn pop_context(&self, id: ContextId) {
        let mut contexts = self.contexts_mut();
        contexts.pop(id);
        contexts.release(id);
    }

    fn function_context(&self, func: JsObject, environment: Option<EnvRef>) -> ExecutionContext {
        ExecutionContext {
            function: Some(func),
            realm: self.get_function_realm(func),
            environment,
            generator: None,
            code_evaluation_state: None,
        }
    }

    // §10.2.1.1 OrdinaryFunctionCreate + MakeConstructor
    pub(crate) fn make_function(&self, node: &Rc<FunctionNode>, env: &EnvRef) -> JsValue {
        let intrinsics = self.intrinsics();
        let this_mode = if node.is_arrow {
            ThisMode::Lexical
        } else {
            ThisMode::NonLexical
        };
        let name = node.name.clone().unwrap_or_default();
        let data = FunctionData {
            name: name.clone(),
            realm: self.current_realm(),
            behavior: FunctionBehavior::Ecmascript(Rc::new(EcmascriptFunction {
                node: node.clone(),
                environment: env.clone(),
                this_mode,
            })),
        };
        let func = self.allocate(ObjectData::new(
            Some(intrinsics.function_prototype),
            ObjectKind::Function(data),
        ));
        self.define_hidden(func, "name", JsValue::string(&name));
        self.define_hidden(func, "length", JsValue::Number(node.params.len() as f64));

        let prototype = match node.kind {
            FunctionKind::Normal if !node.is_arrow => {
                let proto = self.ordinary_object();
                self.define_hidden(proto, "constructor", JsValue::Object(func));
                Some(proto)
            }
            FunctionKind::Generator => {
                Some(self.ordinary_object_with_proto(Some(intrinsics.generator_prototype)))
            }
            FunctionKind::AsyncGenerator => {
                Some(self.ordinary_object_with_proto(Some(intrinsics.async_generator_prototype)))
            }
            _ => None,
        };
        if let Some(proto) = prototype {
            self.define_hidden(func, "prototype", JsValue::Object(proto));
        }
        trace!(name = %name, kind = ?node.kind, "function created");
        JsValue::Object(func)
    }

    // §10.1.14 GetPrototypeFromConstructor
    pub(crate) fn get_prototype_from_constructor(
        &self,
        constructor: JsObject,
        default: fn(&Intrinsics) -> JsObject,
    ) -> Completion<JsObject> {
        let proto = q!(self.get(constructor, "prototype"));
        if let JsValue::Object(proto) = proto {
            return Completion::Normal(proto);
        }
        let realm = self.get_function_realm(constructor);
        Completion::Normal(default(&self.realm(realm).intrinsics))
    }
}

// §7.3.14 Call
pub(crate) fn call<'a>(
    agent: &'a Agent,
    func: JsValue,
    this: JsValue,
    args: Vec<JsValue>,
) -> LocalBoxFuture<'a, Completion> {
    Box::pin(call_inner(agent, func, this, args))
}

async fn call_inner(agent: &Agent, func: JsValue, this: JsValue, args: Vec<JsValue>) -> Completion {
    let behavior = func.as_object().and_then(|obj| {
        let heap = agent.heap();
        heap.get(obj)
            .function_data()
            .map(|data| (obj, data.behavior.clone()))
    });
    let Some((obj, behavior)) = behavior else {
        return agent.throw_type_error(&format!("{} is not a function", agent.describe(&func)));
    };
    match behavior {
        FunctionBehavior::Builtin { call, .. } => {
            let ctx = agent.push_context(agent.function_context(obj, None));
            let result = match call {
                NativeFunction::Sync(f) => f(agent, &this, &args),
                NativeFunction::Async(f) => f(agent.handle(), this, args).await,
            };
            agent.pop_context(ctx);
            result
        }
        FunctionBehavior::Ecmascript(data) => ordinary_call(agent, obj, data, this, args).await,
    }
}

// §10.2.1 [[Call]] for ECMAScript function objects
async fn ordinary_call(
    agent: &Agent,
    func: JsObject,
    data: Rc<EcmascriptFunction>,
    this: JsValue,
    args: Vec<JsValue>,
) -> Completion {
    let env = Environment::new(Some(data.environment.clone()));
    // §10.2.1.2 OrdinaryCallBindThis
    if data.this_mode == ThisMode::NonLexical {
        env.borrow_mut().initialize("this", BindingKind::Const, this);
    }
    let ctx = agent.push_context(agent.function_context(func, Some(env.clone())));
    function_declaration_instantiation(agent, &data.node, &env, args);
    ordinary_call_evaluate_body(agent, ctx, func, &data.node, env).await
}

// §10.2.1.4 OrdinaryCallEvaluateBody, dispatched on the function kind.
// Generator and async bodies keep `ctx` as their own detachable context.
async fn ordinary_call_evaluate_body(
    agent: &Agent,
    ctx: ContextId,
    func: JsObject,
    node: &Rc<FunctionNode>,
    env: EnvRef,
) -> Completion {
    match node.kind {
        FunctionKind::Normal => {
            let result = match exec::function_body(agent, &node.body, &env).await {
                Completion::Normal(_) => Completion::Normal(JsValue::Undefined),
                Completion::Return(value) => Completion::Normal(value),
                Completion::Throw(error) => Completion::Throw(error),
                abrupt => internal_error!("{} escaped a function body", abrupt.kind_name()),
            };
            agent.pop_context(ctx);
            result
        }
        FunctionKind::Generator => {
            agent.contexts_mut().pop(ctx);
            generator::generator_start(agent, ctx, func, node.clone(), env)
        }
        FunctionKind::AsyncGenerator => {
            agent.contexts_mut().pop(ctx);
            async_generator::async_generator_start(agent, ctx, func, node.clone(), env)
        }
        FunctionKind::Async => {
            agent.contexts_mut().pop(ctx);
            async_function::async_function_start(agent, ctx, node.clone(), env).await
        }
    }
}

// §10.2.11 FunctionDeclarationInstantiation, without an arguments object
fn function_declaration_instantiation(
    agent: &Agent,
    node: &FunctionNode,
    env: &EnvRef,
    args: Vec<JsValue>,
) {
    let mut args = args.into_iter();
    for param in &node.params {
        let value = args.next().unwrap_or(JsValue::Undefined);
        env.borrow_mut().initialize(param, BindingKind::Var, value);
    }
    exec::hoist_declarations(agent, &node.body, env);
}

// §7.3.15 Construct
pub(crate) fn construct<'a>(
    agent: &'a Agent,
    func: JsValue,
    args: Vec<JsValue>,
    new_target: Option<JsValue>,
) -> LocalBoxFuture<'a, Completion> {
    Box::pin(construct_inner(agent, func, args, new_target))
}

async fn construct_inner(
    agent: &Agent,
    func: JsValue,
    args: Vec<JsValue>,
    new_target: Option<JsValue>,
) -> Completion {
    if !agent.is_constructor(&func) {
        return agent.throw_type_error(&format!("{} is not a constructor", agent.describe(&func)));
    }
    let Some(obj) = func.as_object() else {
        internal_error!("constructor is not an object");
    };
    let new_target = match new_target.as_ref().and_then(JsValue::as_object) {
        Some(target) => target,
        None => obj,
    };
    let behavior = match agent.heap().get(obj).function_data() {
        Some(data) => data.behavior.clone(),
        None => internal_error!("constructor without function data"),
    };
    match behavior {
        FunctionBehavior::Builtin {
            construct: Some(construct),
            ..
        } => {
            let ctx = agent.push_context(agent.function_context(obj, None));
            let result = construct(agent.handle(), args, new_target).await;
            agent.pop_context(ctx);
            result
        }
        FunctionBehavior::Builtin { construct: None, .. } => {
            internal_error!("IsConstructor accepted a builtin without [[Construct]]")
        }
        // §10.2.2 [[Construct]] for base constructors
        FunctionBehavior::Ecmascript(data) => {
            let proto = q!(agent.get_prototype_from_constructor(new_target, |i| i.object_prototype));
            let this_obj = agent.ordinary_object_with_proto(Some(proto));
            match ordinary_call(agent, obj, data, JsValue::Object(this_obj), args).await {
                Completion::Normal(result @ JsValue::Object(_)) => Completion::Normal(result),
                Completion::Normal(_) => Completion::Normal(JsValue::Object(this_obj)),
                abrupt => abrupt,
            }
        }
    }
}
