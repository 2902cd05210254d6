//! Resumable evaluation.
//!
//! Every evaluation step is a future. A suspension point is the leaf
//! [`Suspend`] future: on first poll it posts a [`SuspensionRequest`] in the
//! agent's channel and returns `Pending`; `Pending` then travels up through
//! every enclosing `.await` untouched until it reaches whoever is polling the
//! context's computation (a generator, an await reaction, or the top-level
//! driver). Resuming stores a [`ResumeMessage`] in the channel and polls
//! again; the leaf picks it up and evaluation continues at the exact point it
//! stopped. Futures are only ever polled by hand with a no-op waker.

use super::*;
use crate::ast::{Expression, SourceLocation, Statement};
use futures::FutureExt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

#[derive(Debug, Clone)]
pub enum SuspensionRequest {
    Await,
    /// Carries the iterator result object handed to the generator's caller.
    Yield(JsValue),
    PotentialDebugger(Checkpoint),
    AsyncGeneratorYield,
}

impl SuspensionRequest {
    pub fn kind_name(&self) -> &'static str {
        match self {
            SuspensionRequest::Await => "await",
            SuspensionRequest::Yield(_) => "yield",
            SuspensionRequest::PotentialDebugger(_) => "potential-debugger",
            SuspensionRequest::AsyncGeneratorYield => "async-generator-yield",
        }
    }
}

#[derive(Debug, Clone)]
pub enum ResumeMessage {
    DebuggerResume(Option<JsValue>),
    AwaitResume(Completion),
    GeneratorResume(Completion),
    AsyncGeneratorResume(Completion),
}

impl ResumeMessage {
    pub fn kind_name(&self) -> &'static str {
        match self {
            ResumeMessage::DebuggerResume(_) => "debugger-resume",
            ResumeMessage::AwaitResume(_) => "await-resume",
            ResumeMessage::GeneratorResume(_) => "generator-resume",
            ResumeMessage::AsyncGeneratorResume(_) => "async-generator-resume",
        }
    }
}

/// Result of driving a context: it either finished or asked to suspend.
#[derive(Debug)]
pub enum Step {
    Completed(Completion),
    Suspended(SuspensionRequest),
}

/// Result of a top-level evaluation or job.
#[derive(Debug)]
pub enum Outcome {
    Completed(Completion),
    Paused(Checkpoint),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointPhase {
    BeforeNode,
    AfterCall,
    DebuggerStatement,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    pub node_kind: &'static str,
    pub location: SourceLocation,
    pub realm: RealmId,
    pub phase: CheckpointPhase,
    pub stack_depth: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebuggerAction {
    Continue,
    Pause,
}

pub trait DebuggerHook {
    fn on_checkpoint(&self, agent: &Agent, checkpoint: &Checkpoint) -> DebuggerAction;
}

/// Pauses at every checkpoint.
#[derive(Debug, Default)]
pub struct StepEveryCheckpoint;

impl DebuggerHook for StepEveryCheckpoint {
    fn on_checkpoint(&self, _agent: &Agent, _checkpoint: &Checkpoint) -> DebuggerAction {
        DebuggerAction::Pause
    }
}

/// Pauses only at `debugger;` statements.
#[derive(Debug, Default)]
pub struct BreakOnDebuggerStatement;

impl DebuggerHook for BreakOnDebuggerStatement {
    fn on_checkpoint(&self, _agent: &Agent, checkpoint: &Checkpoint) -> DebuggerAction {
        if checkpoint.phase == CheckpointPhase::DebuggerStatement {
            DebuggerAction::Pause
        } else {
            DebuggerAction::Continue
        }
    }
}

/// Single-slot mailbox between a suspended leaf and its driver.
#[derive(Default)]
pub(crate) struct Channel {
    pending: Option<SuspensionRequest>,
    incoming: Option<ResumeMessage>,
}

impl Agent {
    fn post_request(&self, request: SuspensionRequest) {
        let mut channel = self.inner.channel.borrow_mut();
        if let Some(previous) = &channel.pending {
            internal_error!(
                "{} suspension posted while {} is still pending",
                request.kind_name(),
                previous.kind_name()
            );
        }
        channel.pending = Some(request);
    }

    fn take_request(&self) -> SuspensionRequest {
        match self.inner.channel.borrow_mut().pending.take() {
            Some(request) => request,
            None => internal_error!("computation returned Pending without a suspension request"),
        }
    }

    fn deliver(&self, message: ResumeMessage) {
        let mut channel = self.inner.channel.borrow_mut();
        if let Some(previous) = &channel.incoming {
            internal_error!(
                "{} delivered while {} was never consumed",
                message.kind_name(),
                previous.kind_name()
            );
        }
        channel.incoming = Some(message);
    }

    fn take_message(&self) -> ResumeMessage {
        match self.inner.channel.borrow_mut().incoming.take() {
            Some(message) => message,
            None => internal_error!("suspended computation resumed without a message"),
        }
    }
}

/// The only future in the engine that ever returns `Pending`.
pub(crate) struct Suspend<'a> {
    agent: &'a Agent,
    request: Option<SuspensionRequest>,
}

impl Future for Suspend<'_> {
    type Output = ResumeMessage;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<ResumeMessage> {
        let this = self.get_mut();
        if let Some(request) = this.request.take() {
            this.agent.post_request(request);
            return Poll::Pending;
        }
        Poll::Ready(this.agent.take_message())
    }
}

pub(crate) fn suspend(agent: &Agent, request: SuspensionRequest) -> Suspend<'_> {
    Suspend {
        agent,
        request: Some(request),
    }
}

fn poll_once(future: &mut LocalBoxFuture<'static, Completion>) -> Poll<Completion> {
    let mut cx = Context::from_waker(futures::task::noop_waker_ref());
    future.poll_unpin(&mut cx)
}

/// Push `context`, run its computation until it completes or asks to
/// suspend, then pop it. Debugger pauses are forwarded to our own driver with
/// `context` still pushed so the whole stack survives the pause. A completed
/// context is released.
pub(crate) async fn drive_context(
    agent: &Agent,
    context: ContextId,
    mut message: Option<ResumeMessage>,
) -> Step {
    let state = agent.contexts_mut().get_mut(context).code_evaluation_state.take();
    let mut future = match state {
        Some(future) => future,
        None => internal_error!("execution context {context} has no suspended computation"),
    };
    agent.contexts_mut().push(context);
    loop {
        if let Some(message) = message.take() {
            agent.deliver(message);
        }
        match poll_once(&mut future) {
            Poll::Ready(completion) => {
                let mut contexts = agent.contexts_mut();
                contexts.pop(context);
                contexts.release(context);
                return Step::Completed(completion);
            }
            Poll::Pending => match agent.take_request() {
                SuspensionRequest::PotentialDebugger(checkpoint) => {
                    let answer =
                        suspend(agent, SuspensionRequest::PotentialDebugger(checkpoint)).await;
                    message = Some(answer);
                }
                request => {
                    let mut contexts = agent.contexts_mut();
                    contexts.get_mut(context).code_evaluation_state = Some(future);
                    contexts.pop(context);
                    return Step::Suspended(request);
                }
            },
        }
    }
}

/// resume(context, message): continue a suspended context.
pub async fn resume(
    agent: &Agent,
    context: ContextId,
    message: ResumeMessage,
) -> crate::error::Result<Step> {
    let suspended = {
        let contexts = agent.contexts();
        contexts.contains(context) && contexts.get(context).code_evaluation_state.is_some()
    };
    if !suspended {
        return Err(EngineError::ContextNotSuspended(context));
    }
    Ok(drive_context(agent, context, Some(message)).await)
}

/// A top-level computation stopped at a debugger checkpoint.
pub(crate) struct PausedComputation {
    pub(crate) context: ContextId,
    pub(crate) future: LocalBoxFuture<'static, Completion>,
}

impl Agent {
    /// Drive a script or job computation with `context` already pushed.
    pub(crate) fn run_top_level(
        &self,
        context: ContextId,
        mut future: LocalBoxFuture<'static, Completion>,
    ) -> Outcome {
        match poll_once(&mut future) {
            Poll::Ready(completion) => {
                let mut contexts = self.contexts_mut();
                contexts.pop(context);
                contexts.release(context);
                Outcome::Completed(completion)
            }
            Poll::Pending => match self.take_request() {
                SuspensionRequest::PotentialDebugger(checkpoint) => {
                    debug!(
                        node = checkpoint.node_kind,
                        line = checkpoint.location.line,
                        column = checkpoint.location.column,
                        "paused at debugger checkpoint"
                    );
                    *self.inner.paused.borrow_mut() = Some(PausedComputation { context, future });
                    Outcome::Paused(checkpoint)
                }
                request => internal_error!(
                    "{} suspension escaped to the top level",
                    request.kind_name()
                ),
            },
        }
    }

    /// Continue a computation paused at a debugger checkpoint. At an
    /// after-call checkpoint `value` replaces the call's result.
    pub fn resume(&self, value: Option<JsValue>) -> crate::error::Result<Outcome> {
        let Some(paused) = self.inner.paused.borrow_mut().take() else {
            return Err(EngineError::NotPaused);
        };
        debug!(context = %paused.context, "resuming from debugger pause");
        self.deliver(ResumeMessage::DebuggerResume(value));
        Ok(self.run_top_level(paused.context, paused.future))
    }

    pub fn is_paused(&self) -> bool {
        self.inner.paused.borrow().is_some()
    }

    /// {potential-debugger}: answered on the spot unless a hook asks to pause.
    /// Returns the value a debugger supplied with its resumption, if any.
    pub(crate) async fn checkpoint(
        &self,
        node_kind: &'static str,
        location: SourceLocation,
        phase: CheckpointPhase,
    ) -> Option<JsValue> {
        let hook = self.inner.debugger.borrow().clone()?;
        let checkpoint = Checkpoint {
            node_kind,
            location,
            realm: self.current_realm(),
            phase,
            stack_depth: self.contexts().stack().len(),
        };
        if hook.on_checkpoint(self, &checkpoint) == DebuggerAction::Continue {
            return None;
        }
        match suspend(self, SuspensionRequest::PotentialDebugger(checkpoint)).await {
            ResumeMessage::DebuggerResume(value) => value,
            other => internal_error!(
                "debugger checkpoint resumed with {}",
                other.kind_name()
            ),
        }
    }

    pub(crate) async fn before_statement(&self, stmt: &Statement) {
        self.checkpoint(stmt.kind_name(), stmt.loc, CheckpointPhase::BeforeNode)
            .await;
    }

    pub(crate) async fn before_expression(&self, expr: &Expression) {
        if self.inner.options.checkpoint_granularity == CheckpointGranularity::Statement {
            return;
        }
        self.checkpoint(expr.kind_name(), expr.loc, CheckpointPhase::BeforeNode)
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent_with_context() -> (Agent, ContextId) {
        let agent = Agent::new(AgentOptions::default());
        let ctx = agent
            .contexts_mut()
            .insert(ExecutionContext::new(RealmId::INITIAL));
        (agent, ctx)
    }

    fn deep<'a>(agent: &'a Agent, depth: usize) -> LocalBoxFuture<'a, Completion> {
        Box::pin(async move {
            if depth == 0 {
                match suspend(agent, SuspensionRequest::Yield(JsValue::Number(7.0))).await {
                    ResumeMessage::GeneratorResume(c) => c,
                    other => internal_error!("unexpected {}", other.kind_name()),
                }
            } else {
                deep(agent, depth - 1).await
            }
        })
    }

    #[test]
    fn suspension_surfaces_unchanged_through_nesting() {
        let (agent, ctx) = agent_with_context();
        let inner = agent.handle();
        agent.contexts_mut().get_mut(ctx).code_evaluation_state =
            Some(Box::pin(async move { deep(&inner, 50).await }));

        let mut first = Box::pin(drive_context(&agent, ctx, None));
        let step = match first.as_mut().poll(&mut Context::from_waker(futures::task::noop_waker_ref())) {
            Poll::Ready(step) => step,
            Poll::Pending => panic!("drive_context should not pend on a yield"),
        };
        assert!(matches!(step, Step::Suspended(SuspensionRequest::Yield(JsValue::Number(n))) if n == 7.0));
        assert!(agent.contexts().stack().is_empty());
        drop(first);

        let resumed = futures::executor::block_on(drive_context(
            &agent,
            ctx,
            Some(ResumeMessage::GeneratorResume(Completion::Normal(JsValue::string("back")))),
        ));
        assert!(matches!(resumed, Step::Completed(Completion::Normal(JsValue::String(ref s))) if s.to_rust_string() == "back"));
        assert!(!agent.contexts().contains(ctx));
    }

    #[test]
    fn resume_rejects_contexts_without_state() {
        let (agent, ctx) = agent_with_context();
        let result = futures::executor::block_on(resume(
            &agent,
            ctx,
            ResumeMessage::AwaitResume(Completion::Normal(JsValue::Undefined)),
        ));
        assert!(matches!(result, Err(EngineError::ContextNotSuspended(id)) if id == ctx));
    }

    #[test]
    fn top_level_resume_without_pause_is_an_error() {
        let agent = Agent::new(AgentOptions::default());
        assert!(matches!(agent.resume(None), Err(EngineError::NotPaused)));
    }

    #[test]
    #[should_panic(expected = "without a message")]
    fn polling_a_suspended_leaf_without_a_message_is_fatal() {
        let agent = Agent::new(AgentOptions::default());
        let mut leaf = suspend(&agent, SuspensionRequest::Await);
        let mut cx = Context::from_waker(futures::task::noop_waker_ref());
        assert!(Pin::new(&mut leaf).poll(&mut cx).is_pending());
        let _ = agent.take_request();
        let _ = Pin::new(&mut leaf).poll(&mut cx);
    }
}
