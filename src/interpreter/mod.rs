use crate::ast::*;
use crate::completion::{Completion, StatementCompletion};
use crate::error::EngineError;
use crate::types::{JsObject, JsString, JsValue};
use crate::{internal_error, q, x};
use futures::future::LocalBoxFuture;
use std::cell::{Cell, Ref, RefCell, RefMut};
use std::rc::Rc;
use tracing::{debug, trace, warn};

mod types;
pub use types::*;

mod heap;
use heap::{ContextArena, Heap};

mod object;
pub use object::{ObjectModel, OrdinaryObjects};

mod coroutine;
pub use coroutine::{
    BreakOnDebuggerStatement, Checkpoint, CheckpointPhase, DebuggerAction, DebuggerHook,
    Outcome, ResumeMessage, Step, StepEveryCheckpoint, SuspensionRequest, resume,
};
use coroutine::{Channel, PausedComputation, drive_context, suspend};

mod jobs;
pub use jobs::{DrainOutcome, HostHooks, Job, JobCallback, JobQueue, RejectionOperation};

mod helpers;
pub(crate) use helpers::*;
mod call;
mod eval;
mod exec;
mod builtins;

/// How finely `{potential-debugger}` checkpoints are emitted. After-call and
/// `debugger;` checkpoints are emitted at either granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CheckpointGranularity {
    /// Before every expression and statement.
    #[default]
    Node,
    /// Before statements only.
    Statement,
}

#[derive(Debug, Clone, Default)]
pub struct AgentOptions {
    pub checkpoint_granularity: CheckpointGranularity,
    /// Upper bound on jobs run by one `JobQueue::drain`; `None` is unbounded.
    pub max_jobs_per_drain: Option<usize>,
}

impl AgentOptions {
    pub fn with_checkpoint_granularity(mut self, granularity: CheckpointGranularity) -> Self {
        self.checkpoint_granularity = granularity;
        self
    }

    pub fn with_max_jobs_per_drain(mut self, limit: usize) -> Self {
        self.max_jobs_per_drain = Some(limit);
        self
    }
}

pub(crate) struct AgentInner {
    heap: RefCell<Heap>,
    contexts: RefCell<ContextArena>,
    realms: RefCell<Vec<Rc<Realm>>>,
    channel: RefCell<Channel>,
    paused: RefCell<Option<PausedComputation>>,
    debugger: RefCell<Option<Rc<dyn DebuggerHook>>>,
    host: Rc<dyn HostHooks>,
    queue: Option<Rc<JobQueue>>,
    objects: Rc<dyn ObjectModel>,
    options: AgentOptions,
    owners: Cell<usize>,
}

/// One independent ECMAScript agent: heap, realms, execution-context stack
/// and the host hooks it schedules through. Cloning yields another handle
/// to the same agent. When the last cloned handle is dropped, suspended
/// generators, pending awaits and a paused computation are discarded.
pub struct Agent {
    inner: Rc<AgentInner>,
    owner: bool,
}

impl Clone for Agent {
    fn clone(&self) -> Self {
        self.inner.owners.set(self.inner.owners.get() + 1);
        Agent {
            inner: self.inner.clone(),
            owner: true,
        }
    }
}

impl Drop for Agent {
    fn drop(&mut self) {
        if !self.owner {
            return;
        }
        let owners = self.inner.owners.get() - 1;
        self.inner.owners.set(owners);
        if owners == 0 {
            self.discard_suspended();
        }
    }
}

impl Agent {
    /// An agent scheduling onto its own bundled [`JobQueue`].
    pub fn new(options: AgentOptions) -> Self {
        let queue = Rc::new(JobQueue::default());
        Self::build(options, queue.clone(), Some(queue), Rc::new(OrdinaryObjects))
    }

    pub fn with_host(options: AgentOptions, host: Rc<dyn HostHooks>) -> Self {
        Self::build(options, host, None, Rc::new(OrdinaryObjects))
    }

    pub fn with_object_model(
        options: AgentOptions,
        host: Rc<dyn HostHooks>,
        objects: Rc<dyn ObjectModel>,
    ) -> Self {
        Self::build(options, host, None, objects)
    }

    fn build(
        options: AgentOptions,
        host: Rc<dyn HostHooks>,
        queue: Option<Rc<JobQueue>>,
        objects: Rc<dyn ObjectModel>,
    ) -> Self {
        let inner = Rc::new(AgentInner {
            heap: RefCell::new(Heap::default()),
            contexts: RefCell::new(ContextArena::default()),
            realms: RefCell::new(Vec::new()),
            channel: RefCell::new(Channel::default()),
            paused: RefCell::new(None),
            debugger: RefCell::new(None),
            host,
            queue,
            objects,
            options,
            owners: Cell::new(1),
        });
        let agent = Agent { inner, owner: true };
        agent.create_realm();
        agent
    }

    /// A handle for futures the agent stores in itself. It does not count as
    /// an owner, so it cannot keep the agent alive through those futures.
    pub(crate) fn handle(&self) -> Agent {
        Agent {
            inner: self.inner.clone(),
            owner: false,
        }
    }

    fn discard_suspended(&self) {
        let paused = self.inner.paused.borrow_mut().take();
        let suspended = self.contexts_mut().take_suspended();
        debug!(
            suspended = suspended.len(),
            paused = paused.is_some(),
            "last agent handle dropped"
        );
        drop(paused);
        drop(suspended);
    }

    pub fn options(&self) -> &AgentOptions {
        &self.inner.options
    }

    pub fn set_debugger_hook(&self, hook: Option<Rc<dyn DebuggerHook>>) {
        *self.inner.debugger.borrow_mut() = hook;
    }

    /// The bundled job queue, when the agent was built with [`Agent::new`].
    pub fn job_queue(&self) -> Option<Rc<JobQueue>> {
        self.inner.queue.clone()
    }

    /// DrainJobQueue on the bundled queue.
    pub fn run_jobs(&self) -> crate::error::Result<DrainOutcome> {
        match &self.inner.queue {
            Some(queue) => queue.drain(self),
            None => Err(EngineError::NoJobQueue),
        }
    }

    pub fn create_realm(&self) -> RealmId {
        let id = RealmId(self.inner.realms.borrow().len());
        let realm = builtins::create_realm(self, id);
        self.inner.realms.borrow_mut().push(Rc::new(realm));
        trace!(realm = id.0, "realm created");
        id
    }

    /// Evaluate a script in the initial realm.
    pub fn evaluate_script(&self, program: Program) -> crate::error::Result<Outcome> {
        self.evaluate_script_in(RealmId::INITIAL, program)
    }

    pub fn evaluate_script_in(
        &self,
        realm: RealmId,
        program: Program,
    ) -> crate::error::Result<Outcome> {
        if self.is_paused() {
            return Err(EngineError::AlreadyPaused);
        }
        let global_env = self.realm(realm).global_env.clone();
        let mut context = ExecutionContext::new(realm);
        context.environment = Some(global_env.clone());
        let id = self.contexts_mut().insert(context);
        self.contexts_mut().push(id);
        let agent = self.handle();
        let program = Rc::new(program);
        let future: LocalBoxFuture<'static, Completion> =
            Box::pin(async move { exec::script_evaluation(&agent, &program, &global_env).await });
        Ok(self.run_top_level(id, future))
    }

    /// Run one job as a top-level computation. A job whose realm is known
    /// runs inside a realm-only execution context for that realm. Hosts with
    /// their own queue call this for each job they were handed.
    pub fn run_job(&self, job: Job) -> crate::error::Result<Outcome> {
        if self.is_paused() {
            return Err(EngineError::AlreadyPaused);
        }
        let realm = job.realm.unwrap_or(RealmId::INITIAL);
        let id = self.contexts_mut().insert(ExecutionContext::new(realm));
        self.contexts_mut().push(id);
        let future = (job.run)(self.handle());
        Ok(self.run_top_level(id, future))
    }

    /// Snapshot of the execution-context stack, bottom first.
    pub fn context_stack(&self) -> Vec<ContextSnapshot> {
        let ids = self.contexts().stack().to_vec();
        ids.into_iter()
            .map(|id| {
                let (function, realm, generator) = {
                    let contexts = self.contexts();
                    let ctx = contexts.get(id);
                    (ctx.function, ctx.realm, ctx.generator)
                };
                ContextSnapshot {
                    id,
                    function_name: function.and_then(|f| self.function_name(f)),
                    realm,
                    generator,
                }
            })
            .collect()
    }

    /// Number of objects allocated so far. Nothing is freed, so this is what a
    /// collector cooperating through this hook would have to trace.
    pub fn allocated_objects(&self) -> usize {
        self.heap().allocated_objects()
    }

    /// Define a builtin function as a global binding of the current realm.
    pub fn define_global_function(
        &self,
        name: &str,
        f: impl Fn(&Agent, &JsValue, &[JsValue]) -> Completion + 'static,
    ) {
        let func = self.create_builtin_function(name, 0, builtins::sync_native(f));
        let realm = self.realm(self.current_realm());
        realm
            .global_env
            .borrow_mut()
            .initialize(name, BindingKind::Var, func);
    }

    pub fn get_global(&self, name: &str) -> Option<JsValue> {
        let realm = self.realm(self.current_realm());
        let value = realm.global_env.borrow().get(name);
        value
    }

    /// Read a property the way script code would.
    pub fn get_property(&self, value: &JsValue, key: &str) -> Completion {
        self.get_v(value, key)
    }

    pub fn promise_state(&self, value: &JsValue) -> Option<(PromiseState, JsValue)> {
        let obj = value.as_object()?;
        let heap = self.heap();
        match &heap.get(obj).kind {
            ObjectKind::Promise(p) => Some((p.state, p.result.clone())),
            _ => None,
        }
    }

    /// `message` of an error object, for diagnostics.
    pub fn error_message(&self, value: &JsValue) -> Option<String> {
        let obj = value.as_object()?;
        match self.get(obj, "message") {
            Completion::Normal(JsValue::String(s)) => Some(s.to_rust_string()),
            _ => None,
        }
    }

    pub(crate) fn heap(&self) -> Ref<'_, Heap> {
        self.inner.heap.borrow()
    }

    pub(crate) fn heap_mut(&self) -> RefMut<'_, Heap> {
        self.inner.heap.borrow_mut()
    }

    pub(crate) fn contexts(&self) -> Ref<'_, ContextArena> {
        self.inner.contexts.borrow()
    }

    pub(crate) fn contexts_mut(&self) -> RefMut<'_, ContextArena> {
        self.inner.contexts.borrow_mut()
    }

    pub(crate) fn host(&self) -> Rc<dyn HostHooks> {
        self.inner.host.clone()
    }

    pub(crate) fn object_model(&self) -> Rc<dyn ObjectModel> {
        self.inner.objects.clone()
    }

    pub(crate) fn realm(&self, id: RealmId) -> Rc<Realm> {
        match self.inner.realms.borrow().get(id.0) {
            Some(realm) => realm.clone(),
            None => internal_error!("unknown realm {}", id.0),
        }
    }

    pub(crate) fn running_context(&self) -> Option<ContextId> {
        self.contexts().running()
    }

    /// Realm of the running execution context, or the initial realm when
    /// the stack is empty.
    pub(crate) fn current_realm(&self) -> RealmId {
        let contexts = self.contexts();
        match contexts.running() {
            Some(id) => contexts.get(id).realm,
            None => RealmId::INITIAL,
        }
    }

    pub(crate) fn intrinsics(&self) -> Intrinsics {
        self.realm(self.current_realm()).intrinsics
    }

    /// Generator or async generator owning the running context.
    pub(crate) fn running_generator(&self) -> Option<JsObject> {
        let contexts = self.contexts();
        contexts.running().and_then(|id| contexts.get(id).generator)
    }

    pub(crate) fn allocate(&self, data: ObjectData) -> JsObject {
        self.heap_mut().allocate(data)
    }

    pub(crate) fn ordinary_object(&self) -> JsObject {
        let proto = self.intrinsics().object_prototype;
        self.ordinary_object_with_proto(Some(proto))
    }

    pub(crate) fn ordinary_object_with_proto(&self, prototype: Option<JsObject>) -> JsObject {
        self.allocate(ObjectData::new(prototype, ObjectKind::Ordinary))
    }

    fn function_name(&self, func: JsObject) -> Option<String> {
        let heap = self.heap();
        heap.get(func).function_data().map(|f| f.name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::build::*;
    use crate::ast::build::call;

    #[test]
    fn agents_are_independent() {
        let a = Agent::new(AgentOptions::default());
        let b = Agent::new(AgentOptions::default());
        a.evaluate_script(program(vec![var(VarKind::Var, "x", Some(num(1.0)))]))
            .unwrap();
        assert!(a.get_global("x").is_some());
        assert!(b.get_global("x").is_none());
    }

    #[test]
    fn script_completion_value_is_last_expression() {
        let agent = Agent::new(AgentOptions::default());
        let outcome = agent
            .evaluate_script(program(vec![
                expr_stmt(num(1.0)),
                expr_stmt(add(num(2.0), num(3.0))),
                empty(),
            ]))
            .unwrap();
        assert!(matches!(outcome, Outcome::Completed(Completion::Normal(JsValue::Number(n))) if n == 5.0));
        assert!(agent.context_stack().is_empty());
    }

    #[test]
    fn options_builder() {
        let options = AgentOptions::default()
            .with_checkpoint_granularity(CheckpointGranularity::Statement)
            .with_max_jobs_per_drain(10);
        assert_eq!(options.checkpoint_granularity, CheckpointGranularity::Statement);
        assert_eq!(options.max_jobs_per_drain, Some(10));
    }

    #[test]
    fn custom_host_has_no_bundled_queue() {
        let host = Rc::new(JobQueue::default());
        let agent = Agent::with_host(AgentOptions::default(), host);
        assert!(agent.job_queue().is_none());
        assert!(matches!(agent.run_jobs(), Err(EngineError::NoJobQueue)));
    }

    #[test]
    fn realms_get_distinct_intrinsics() {
        let agent = Agent::new(AgentOptions::default());
        let other = agent.create_realm();
        assert_ne!(
            agent.realm(RealmId::INITIAL).intrinsics.promise,
            agent.realm(other).intrinsics.promise
        );
    }

    fn suspended_generator_script() -> Program {
        program(vec![
            function_decl(
                FunctionKind::Generator,
                "gen",
                &[],
                vec![expr_stmt(yield_(num(1.0))), expr_stmt(yield_(num(2.0)))],
            ),
            var(VarKind::Var, "fresh", Some(call(ident("gen"), vec![]))),
            var(VarKind::Var, "started", Some(call(ident("gen"), vec![]))),
            expr_stmt(method_call(ident("started"), "next", vec![])),
            function_decl(
                FunctionKind::Async,
                "waiting",
                &[],
                vec![expr_stmt(await_(undefined()))],
            ),
            expr_stmt(call(ident("waiting"), vec![])),
        ])
    }

    #[test]
    fn dropping_the_last_handle_frees_suspended_computations() {
        let agent = Agent::new(AgentOptions::default());
        agent.evaluate_script(suspended_generator_script()).unwrap();
        let weak = Rc::downgrade(&agent.inner);
        drop(agent);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn dropping_a_paused_agent_frees_it() {
        let agent = Agent::new(AgentOptions::default());
        agent.set_debugger_hook(Some(Rc::new(BreakOnDebuggerStatement)));
        let outcome = agent
            .evaluate_script(program(vec![
                function_decl(FunctionKind::Generator, "gen", &[], vec![debugger()]),
                expr_stmt(method_call(call(ident("gen"), vec![]), "next", vec![])),
            ]))
            .unwrap();
        assert!(matches!(outcome, Outcome::Paused(_)));
        let weak = Rc::downgrade(&agent.inner);
        drop(agent);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn a_remaining_clone_keeps_suspended_generators_usable() {
        let agent = Agent::new(AgentOptions::default());
        agent.evaluate_script(suspended_generator_script()).unwrap();
        let other = agent.clone();
        drop(agent);
        let outcome = other
            .evaluate_script(program(vec![expr_stmt(member(
                method_call(ident("started"), "next", vec![]),
                "value",
            ))]))
            .unwrap();
        assert!(matches!(outcome, Outcome::Completed(Completion::Normal(JsValue::Number(n))) if n == 2.0));
        assert!(matches!(other.run_jobs(), Ok(DrainOutcome::Idle)));
    }
}
