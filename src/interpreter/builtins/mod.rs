use super::*;

/// `IfAbruptRejectPromise(value, capability)`: a throw rejects the capability
/// and returns its promise from the enclosing builtin.
macro_rules! if_abrupt_reject_promise {
    ($agent:expr, $value:expr, $capability:expr) => {
        match $value {
            Completion::Normal(v) => v,
            Completion::Throw(error) => {
                return promise::reject_capability($agent, $capability.clone(), error).await;
            }
            abrupt => internal_error!("{} completion inside a builtin", abrupt.kind_name()),
        }
    };
}

pub(crate) mod async_function;
pub(crate) mod async_generator;
pub(crate) mod generator;
pub(crate) mod iterator;
pub(crate) mod promise;

pub(crate) use async_function::await_value;

/// Well-known symbols are modelled as reserved property keys.
pub(crate) const SYMBOL_ITERATOR: &str = "Symbol(Symbol.iterator)";
pub(crate) const SYMBOL_ASYNC_ITERATOR: &str = "Symbol(Symbol.asyncIterator)";
pub(crate) const SYMBOL_SPECIES: &str = "Symbol(Symbol.species)";

pub(crate) fn sync_native(
    f: impl Fn(&Agent, &JsValue, &[JsValue]) -> Completion + 'static,
) -> NativeFunction {
    NativeFunction::Sync(Rc::new(f))
}

pub(crate) fn async_native(
    f: impl Fn(Agent, JsValue, Vec<JsValue>) -> LocalBoxFuture<'static, Completion> + 'static,
) -> NativeFunction {
    NativeFunction::Async(Rc::new(f))
}

pub(crate) fn native_constructor(
    f: impl Fn(Agent, Vec<JsValue>, JsObject) -> LocalBoxFuture<'static, Completion> + 'static,
) -> Rc<NativeConstructor> {
    Rc::new(f)
}

pub(crate) fn arg(args: &[JsValue], index: usize) -> JsValue {
    args.get(index).cloned().unwrap_or(JsValue::Undefined)
}

/// Allocates builtins for a realm that is not registered with the agent yet,
/// so everything is addressed explicitly rather than through the running
/// context.
struct RealmBuilder<'a> {
    agent: &'a Agent,
    realm: RealmId,
    function_prototype: JsObject,
}

impl RealmBuilder<'_> {
    fn object(&self, prototype: JsObject) -> JsObject {
        self.agent.ordinary_object_with_proto(Some(prototype))
    }

    fn function(
        &self,
        name: &str,
        length: usize,
        call: NativeFunction,
        construct: Option<Rc<NativeConstructor>>,
    ) -> JsObject {
        self.agent.builtin_function_object(
            self.realm,
            self.function_prototype,
            name,
            length,
            call,
            construct,
        )
    }

    fn method(&self, target: JsObject, name: &str, length: usize, call: NativeFunction) {
        self.keyed_method(target, name, name, length, call);
    }

    fn keyed_method(
        &self,
        target: JsObject,
        key: &str,
        name: &str,
        length: usize,
        call: NativeFunction,
    ) {
        let func = self.function(name, length, call, None);
        self.agent.define_hidden(target, key, JsValue::Object(func));
    }

    fn link_constructor(&self, constructor: JsObject, prototype: JsObject) {
        self.agent
            .define_hidden(constructor, "prototype", JsValue::Object(prototype));
        self.agent
            .define_hidden(prototype, "constructor", JsValue::Object(constructor));
    }

    fn error_class(
        &self,
        name: &str,
        parent: JsObject,
        default: fn(&Intrinsics) -> JsObject,
    ) -> (JsObject, JsObject) {
        let prototype = self.object(parent);
        self.agent
            .define_hidden(prototype, "name", JsValue::string(name));
        self.agent
            .define_hidden(prototype, "message", JsValue::string(""));
        let call = sync_native(move |agent: &Agent, _this: &JsValue, args: &[JsValue]| {
            Completion::Normal(error_from_arguments(agent, prototype, args))
        });
        let construct = native_constructor(move |agent, args, new_target| {
            Box::pin(async move { construct_error(&agent, &args, new_target, default) })
        });
        let constructor = self.function(name, 1, call, Some(construct));
        self.link_constructor(constructor, prototype);
        (constructor, prototype)
    }
}

fn error_from_arguments(agent: &Agent, prototype: JsObject, args: &[JsValue]) -> JsValue {
    let error = agent.allocate(ObjectData::new(Some(prototype), ObjectKind::Error));
    if let Some(message) = args.first()
        && !message.is_undefined()
    {
        agent.define_hidden(error, "message", JsValue::String(to_js_string(message)));
    }
    JsValue::Object(error)
}

// §20.5.1.1 Error ( message ) through [[Construct]]
fn construct_error(
    agent: &Agent,
    args: &[JsValue],
    new_target: JsObject,
    default: fn(&Intrinsics) -> JsObject,
) -> Completion {
    let prototype = q!(agent.get_prototype_from_constructor(new_target, default));
    Completion::Normal(error_from_arguments(agent, prototype, args))
}

fn return_this(_agent: &Agent, this: &JsValue, _args: &[JsValue]) -> Completion {
    Completion::Normal(this.clone())
}

// §9.3.2 CreateIntrinsics + §9.3.3 SetDefaultGlobalBindings
pub(crate) fn create_realm(agent: &Agent, realm: RealmId) -> Realm {
    let object_prototype = agent.ordinary_object_with_proto(None);
    let function_prototype = agent.ordinary_object_with_proto(Some(object_prototype));
    let b = RealmBuilder {
        agent,
        realm,
        function_prototype,
    };

    let (error, error_prototype) = b.error_class("Error", object_prototype, |i| i.error_prototype);
    let (type_error, type_error_prototype) =
        b.error_class("TypeError", error_prototype, |i| i.type_error_prototype);
    let (reference_error, reference_error_prototype) = b.error_class(
        "ReferenceError",
        error_prototype,
        |i| i.reference_error_prototype,
    );

    let iterator_prototype = b.object(object_prototype);
    b.keyed_method(
        iterator_prototype,
        SYMBOL_ITERATOR,
        "[Symbol.iterator]",
        0,
        sync_native(return_this),
    );
    let async_iterator_prototype = b.object(object_prototype);
    b.keyed_method(
        async_iterator_prototype,
        SYMBOL_ASYNC_ITERATOR,
        "[Symbol.asyncIterator]",
        0,
        sync_native(return_this),
    );

    let generator_prototype = b.object(iterator_prototype);
    generator::setup_generator_prototype(&b, generator_prototype);
    let async_generator_prototype = b.object(async_iterator_prototype);
    async_generator::setup_async_generator_prototype(&b, async_generator_prototype);
    let async_from_sync_iterator_prototype = b.object(async_iterator_prototype);
    iterator::setup_async_from_sync_iterator_prototype(&b, async_from_sync_iterator_prototype);

    let promise_prototype = b.object(object_prototype);
    let promise = promise::setup_promise(&b, promise_prototype);

    let intrinsics = Intrinsics {
        object_prototype,
        function_prototype,
        error_prototype,
        type_error,
        type_error_prototype,
        reference_error,
        reference_error_prototype,
        promise,
        promise_prototype,
        iterator_prototype,
        async_iterator_prototype,
        generator_prototype,
        async_generator_prototype,
        async_from_sync_iterator_prototype,
    };

    let global_env = Environment::new(None);
    {
        let mut env = global_env.borrow_mut();
        env.initialize("this", BindingKind::Const, JsValue::Undefined);
        env.initialize("undefined", BindingKind::Const, JsValue::Undefined);
        env.initialize("NaN", BindingKind::Const, JsValue::Number(f64::NAN));
        env.initialize("Infinity", BindingKind::Const, JsValue::Number(f64::INFINITY));
        for (name, value) in [
            ("Error", error),
            ("TypeError", type_error),
            ("ReferenceError", reference_error),
            ("Promise", promise),
        ] {
            env.initialize(name, BindingKind::Var, JsValue::Object(value));
        }
    }
    Realm {
        intrinsics,
        global_env,
    }
}

impl Agent {
    fn builtin_function_object(
        &self,
        realm: RealmId,
        prototype: JsObject,
        name: &str,
        length: usize,
        call: NativeFunction,
        construct: Option<Rc<NativeConstructor>>,
    ) -> JsObject {
        let func = self.allocate(ObjectData::new(
            Some(prototype),
            ObjectKind::Function(FunctionData {
                name: name.to_string(),
                realm,
                behavior: FunctionBehavior::Builtin { call, construct },
            }),
        ));
        self.define_hidden(func, "name", JsValue::string(name));
        self.define_hidden(func, "length", JsValue::Number(length as f64));
        func
    }

    // §10.3.4 CreateBuiltinFunction, in the current realm
    pub(crate) fn create_builtin_function(
        &self,
        name: &str,
        length: usize,
        call: NativeFunction,
    ) -> JsValue {
        let realm = self.current_realm();
        let prototype = self.intrinsics().function_prototype;
        JsValue::Object(self.builtin_function_object(realm, prototype, name, length, call, None))
    }

    // §7.4.14 CreateIterResultObject
    pub(crate) fn create_iter_result_object(&self, value: JsValue, done: bool) -> JsValue {
        let obj = self.ordinary_object();
        x!(self.create_data_property_or_throw(obj, "value", value));
        x!(self.create_data_property_or_throw(obj, "done", JsValue::Boolean(done)));
        JsValue::Object(obj)
    }

    /// Whether the running context belongs to an async generator body.
    pub(crate) fn in_async_generator(&self) -> bool {
        match self.running_generator() {
            Some(generator) => {
                matches!(self.heap().get(generator).kind, ObjectKind::AsyncGenerator(_))
            }
            None => false,
        }
    }
}
