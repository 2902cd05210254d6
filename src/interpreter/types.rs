use super::jobs::JobCallback;
use crate::ast::FunctionNode;
use crate::completion::Completion;
use crate::types::{JsObject, JsValue};
use futures::future::LocalBoxFuture;
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

/// Handle to an execution context in the agent's context arena. Slots are
/// reused; `generation` tells a released context from its slot's next tenant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ContextId {
    pub(crate) index: usize,
    pub(crate) generation: u32,
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.index)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RealmId(pub(crate) usize);

impl RealmId {
    pub const INITIAL: RealmId = RealmId(0);
}

pub type EnvRef = Rc<RefCell<Environment>>;

#[derive(Debug)]
pub struct Environment {
    pub(crate) bindings: FxHashMap<String, Binding>,
    pub(crate) parent: Option<EnvRef>,
}

#[derive(Debug, Clone)]
pub(crate) struct Binding {
    pub(crate) value: JsValue,
    pub(crate) kind: BindingKind,
    pub(crate) initialized: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum BindingKind {
    Var,
    Let,
    Const,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum BindingError {
    Constant,
    Uninitialized,
}

impl Environment {
    pub fn new(parent: Option<EnvRef>) -> EnvRef {
        Rc::new(RefCell::new(Environment {
            bindings: FxHashMap::default(),
            parent,
        }))
    }

    pub(crate) fn declare(&mut self, name: &str, kind: BindingKind) {
        if kind == BindingKind::Var && self.bindings.contains_key(name) {
            return;
        }
        self.bindings.insert(
            name.to_string(),
            Binding {
                value: JsValue::Undefined,
                kind,
                initialized: kind == BindingKind::Var,
            },
        );
    }

    /// Create (or overwrite) an initialized binding in this scope.
    pub(crate) fn initialize(&mut self, name: &str, kind: BindingKind, value: JsValue) {
        self.bindings.insert(
            name.to_string(),
            Binding {
                value,
                kind,
                initialized: true,
            },
        );
    }

    pub(crate) fn set(&mut self, name: &str, value: JsValue) -> Result<(), BindingError> {
        if let Some(binding) = self.bindings.get_mut(name) {
            if !binding.initialized {
                return Err(BindingError::Uninitialized);
            }
            if binding.kind == BindingKind::Const {
                return Err(BindingError::Constant);
            }
            binding.value = value;
            Ok(())
        } else if let Some(parent) = &self.parent {
            parent.borrow_mut().set(name, value)
        } else {
            // Global implicit declaration (sloppy mode)
            self.bindings.insert(
                name.to_string(),
                Binding {
                    value,
                    kind: BindingKind::Var,
                    initialized: true,
                },
            );
            Ok(())
        }
    }

    pub fn get(&self, name: &str) -> Option<JsValue> {
        if let Some(binding) = self.bindings.get(name) {
            if !binding.initialized {
                return None; // TDZ
            }
            Some(binding.value.clone())
        } else if let Some(parent) = &self.parent {
            parent.borrow().get(name)
        } else {
            None
        }
    }

    pub fn has(&self, name: &str) -> bool {
        if self.bindings.contains_key(name) {
            true
        } else if let Some(parent) = &self.parent {
            parent.borrow().has(name)
        } else {
            false
        }
    }
}

/// One activation record. Script, job and inline function contexts run on
/// the host stack and never hold `code_evaluation_state`; generator and async
/// contexts own their suspended computation while detached from the stack.
pub(crate) struct ExecutionContext {
    pub(crate) function: Option<JsObject>,
    pub(crate) realm: RealmId,
    pub(crate) environment: Option<EnvRef>,
    pub(crate) generator: Option<JsObject>,
    pub(crate) code_evaluation_state: Option<LocalBoxFuture<'static, Completion>>,
}

impl ExecutionContext {
    pub(crate) fn new(realm: RealmId) -> Self {
        Self {
            function: None,
            realm,
            environment: None,
            generator: None,
            code_evaluation_state: None,
        }
    }
}

/// Inspector view of one stack entry.
#[derive(Clone, Debug, PartialEq)]
pub struct ContextSnapshot {
    pub id: ContextId,
    pub function_name: Option<String>,
    pub realm: RealmId,
    pub generator: Option<JsObject>,
}

pub type SyncNative = dyn Fn(&super::Agent, &JsValue, &[JsValue]) -> Completion;
pub type AsyncNative =
    dyn Fn(super::Agent, JsValue, Vec<JsValue>) -> LocalBoxFuture<'static, Completion>;
/// Arguments and new.target.
pub type NativeConstructor =
    dyn Fn(super::Agent, Vec<JsValue>, JsObject) -> LocalBoxFuture<'static, Completion>;

/// Builtin behaviour. `Async` builtins may suspend (they drive generators).
#[derive(Clone)]
pub enum NativeFunction {
    Sync(Rc<SyncNative>),
    Async(Rc<AsyncNative>),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum ThisMode {
    Lexical,
    NonLexical,
}

pub(crate) struct EcmascriptFunction {
    pub(crate) node: Rc<FunctionNode>,
    pub(crate) environment: EnvRef,
    pub(crate) this_mode: ThisMode,
}

#[derive(Clone)]
pub(crate) enum FunctionBehavior {
    Builtin {
        call: NativeFunction,
        construct: Option<Rc<NativeConstructor>>,
    },
    Ecmascript(Rc<EcmascriptFunction>),
}

impl fmt::Debug for FunctionBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FunctionBehavior::Builtin { construct, .. } => {
                write!(f, "Builtin(constructor: {})", construct.is_some())
            }
            FunctionBehavior::Ecmascript(func) => {
                write!(f, "Ecmascript({:?}, {:?})", func.node.name, func.node.kind)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct FunctionData {
    pub(crate) name: String,
    pub(crate) realm: RealmId,
    pub(crate) behavior: FunctionBehavior,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromiseState {
    Pending,
    Fulfilled,
    Rejected,
}

#[derive(Debug, Clone)]
pub struct PromiseCapability {
    pub promise: JsValue,
    pub resolve: JsValue,
    pub reject: JsValue,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum ReactionType {
    Fulfill,
    Reject,
}

#[derive(Debug, Clone)]
pub(crate) struct PromiseReaction {
    pub(crate) capability: Option<PromiseCapability>,
    pub(crate) kind: ReactionType,
    pub(crate) handler: Option<JobCallback>,
}

#[derive(Debug)]
pub(crate) struct PromiseData {
    pub(crate) state: PromiseState,
    pub(crate) result: JsValue,
    pub(crate) fulfill_reactions: Vec<PromiseReaction>,
    pub(crate) reject_reactions: Vec<PromiseReaction>,
    pub(crate) is_handled: bool,
}

impl PromiseData {
    pub(crate) fn new() -> Self {
        Self {
            state: PromiseState::Pending,
            result: JsValue::Undefined,
            fulfill_reactions: Vec::new(),
            reject_reactions: Vec::new(),
            is_handled: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorState {
    SuspendedStart,
    SuspendedYield,
    Executing,
    Completed,
}

#[derive(Debug)]
pub(crate) struct GeneratorData {
    pub(crate) state: GeneratorState,
    pub(crate) context: Option<ContextId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsyncGeneratorState {
    SuspendedStart,
    SuspendedYield,
    Executing,
    DrainingQueue,
    Completed,
}

#[derive(Debug, Clone)]
pub(crate) struct AsyncGeneratorRequest {
    pub(crate) completion: Completion,
    pub(crate) capability: PromiseCapability,
}

#[derive(Debug)]
pub(crate) struct AsyncGeneratorData {
    pub(crate) state: AsyncGeneratorState,
    pub(crate) context: Option<ContextId>,
    pub(crate) queue: VecDeque<AsyncGeneratorRequest>,
}

#[derive(Debug, Clone)]
pub(crate) struct IteratorRecord {
    pub(crate) iterator: JsValue,
    pub(crate) next_method: JsValue,
}

#[derive(Debug)]
pub(crate) enum ObjectKind {
    Ordinary,
    Error,
    Function(FunctionData),
    Promise(PromiseData),
    Generator(GeneratorData),
    AsyncGenerator(AsyncGeneratorData),
    AsyncFromSyncIterator(IteratorRecord),
}

/// Data property. Accessors belong to the external object model.
#[derive(Debug, Clone)]
pub struct PropertyDescriptor {
    pub value: JsValue,
    pub writable: bool,
    pub enumerable: bool,
    pub configurable: bool,
}

impl PropertyDescriptor {
    pub fn data(value: JsValue) -> Self {
        Self {
            value,
            writable: true,
            enumerable: true,
            configurable: true,
        }
    }

    /// Builtin methods and `prototype` links: writable, non-enumerable.
    pub fn hidden(value: JsValue) -> Self {
        Self {
            value,
            writable: true,
            enumerable: false,
            configurable: true,
        }
    }
}

#[derive(Debug)]
pub(crate) struct ObjectData {
    pub(crate) prototype: Option<JsObject>,
    pub(crate) properties: FxHashMap<String, PropertyDescriptor>,
    pub(crate) extensible: bool,
    pub(crate) kind: ObjectKind,
}

impl ObjectData {
    pub(crate) fn new(prototype: Option<JsObject>, kind: ObjectKind) -> Self {
        Self {
            prototype,
            properties: FxHashMap::default(),
            extensible: true,
            kind,
        }
    }

    pub(crate) fn function_data(&self) -> Option<&FunctionData> {
        match &self.kind {
            ObjectKind::Function(data) => Some(data),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Intrinsics {
    pub object_prototype: JsObject,
    pub function_prototype: JsObject,
    pub error_prototype: JsObject,
    pub type_error: JsObject,
    pub type_error_prototype: JsObject,
    pub reference_error: JsObject,
    pub reference_error_prototype: JsObject,
    pub promise: JsObject,
    pub promise_prototype: JsObject,
    pub iterator_prototype: JsObject,
    pub async_iterator_prototype: JsObject,
    pub generator_prototype: JsObject,
    pub async_generator_prototype: JsObject,
    pub async_from_sync_iterator_prototype: JsObject,
}

pub(crate) struct Realm {
    pub(crate) intrinsics: Intrinsics,
    pub(crate) global_env: EnvRef,
}
