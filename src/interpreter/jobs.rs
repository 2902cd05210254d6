//! Host scheduling layer: jobs, job callbacks, rejection tracking and the
//! bundled FIFO queue.

use super::*;
use std::any::Any;
use std::collections::VecDeque;
use std::fmt;

pub type JobFn = dyn FnOnce(Agent) -> LocalBoxFuture<'static, Completion>;

/// A deferred closure plus the realm it must run in.
pub struct Job {
    pub(crate) run: Box<JobFn>,
    pub realm: Option<RealmId>,
}

impl Job {
    pub fn new(
        realm: Option<RealmId>,
        run: impl FnOnce(Agent) -> LocalBoxFuture<'static, Completion> + 'static,
    ) -> Self {
        Self {
            run: Box::new(run),
            realm,
        }
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Job(realm: {:?})", self.realm)
    }
}

/// JobCallback Record (§9.5.1)
#[derive(Clone)]
pub struct JobCallback {
    pub callback: JsObject,
    pub host_defined: Option<Rc<dyn Any>>,
}

impl fmt::Debug for JobCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JobCallback({})", self.callback.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionOperation {
    Reject,
    Handle,
}

pub trait HostHooks {
    /// HostEnqueuePromiseJob
    fn enqueue_promise_job(&self, job: Job);

    /// HostPromiseRejectionTracker
    fn promise_rejection_tracker(&self, _promise: JsObject, _operation: RejectionOperation) {}

    /// HostMakeJobCallback
    fn make_job_callback(&self, callback: JsObject) -> JobCallback {
        JobCallback {
            callback,
            host_defined: None,
        }
    }
}

// §9.5.3 HostCallJobCallback
pub(crate) async fn call_job_callback(
    agent: &Agent,
    job_callback: &JobCallback,
    this: JsValue,
    args: Vec<JsValue>,
) -> Completion {
    call::call(agent, JsValue::Object(job_callback.callback), this, args).await
}

#[derive(Debug)]
pub enum DrainOutcome {
    /// The queue is empty.
    Idle,
    /// A job stopped at a debugger checkpoint; `Agent::resume` it, then
    /// drain again.
    Paused(Checkpoint),
    /// `max_jobs_per_drain` jobs ran and more are queued.
    LimitReached,
}

/// FIFO job queue with unhandled-rejection bookkeeping.
#[derive(Default)]
pub struct JobQueue {
    jobs: RefCell<VecDeque<Job>>,
    unhandled: RefCell<Vec<JsObject>>,
}

impl JobQueue {
    pub fn len(&self) -> usize {
        self.jobs.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.borrow().is_empty()
    }

    /// Run queued jobs in enqueue order, including jobs they enqueue.
    pub fn drain(&self, agent: &Agent) -> crate::error::Result<DrainOutcome> {
        let mut ran = 0;
        loop {
            if let Some(limit) = agent.options().max_jobs_per_drain
                && ran >= limit
                && !self.is_empty()
            {
                warn!(limit, pending = self.len(), "job limit reached");
                return Ok(DrainOutcome::LimitReached);
            }
            let Some(job) = self.jobs.borrow_mut().pop_front() else {
                return Ok(DrainOutcome::Idle);
            };
            ran += 1;
            trace!(realm = ?job.realm, "running job");
            match agent.run_job(job)? {
                Outcome::Completed(Completion::Throw(error)) => {
                    warn!(%error, "uncaught exception in job");
                }
                Outcome::Completed(_) => {}
                Outcome::Paused(checkpoint) => return Ok(DrainOutcome::Paused(checkpoint)),
            }
        }
    }

    /// Rejected promises that never gained a handler, oldest first.
    pub fn unhandled_rejections(&self) -> Vec<JsObject> {
        self.unhandled.borrow().clone()
    }
}

impl HostHooks for JobQueue {
    fn enqueue_promise_job(&self, job: Job) {
        trace!(realm = ?job.realm, queued = self.len() + 1, "job enqueued");
        self.jobs.borrow_mut().push_back(job);
    }

    fn promise_rejection_tracker(&self, promise: JsObject, operation: RejectionOperation) {
        let mut unhandled = self.unhandled.borrow_mut();
        match operation {
            RejectionOperation::Reject => {
                debug!(promise = promise.id, "unhandled rejection");
                if !unhandled.contains(&promise) {
                    unhandled.push(promise);
                }
            }
            RejectionOperation::Handle => {
                debug!(promise = promise.id, "rejection handled late");
                unhandled.retain(|p| *p != promise);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording_job(log: &Rc<RefCell<Vec<u32>>>, n: u32) -> Job {
        let log = log.clone();
        Job::new(None, move |_agent| {
            Box::pin(async move {
                log.borrow_mut().push(n);
                Completion::Normal(JsValue::Undefined)
            })
        })
    }

    #[test]
    fn jobs_run_in_enqueue_order() {
        let agent = Agent::new(AgentOptions::default());
        let queue = agent.job_queue().unwrap();
        let log = Rc::new(RefCell::new(Vec::new()));
        for n in 0..4 {
            queue.enqueue_promise_job(recording_job(&log, n));
        }
        assert!(matches!(agent.run_jobs().unwrap(), DrainOutcome::Idle));
        assert_eq!(*log.borrow(), vec![0, 1, 2, 3]);
        assert!(queue.is_empty());
    }

    #[test]
    fn jobs_enqueued_while_draining_run_in_the_same_drain() {
        let agent = Agent::new(AgentOptions::default());
        let queue = agent.job_queue().unwrap();
        let log = Rc::new(RefCell::new(Vec::new()));
        let inner = recording_job(&log, 2);
        let outer_log = log.clone();
        queue.enqueue_promise_job(Job::new(None, move |agent| {
            Box::pin(async move {
                outer_log.borrow_mut().push(1);
                agent.host().enqueue_promise_job(inner);
                Completion::Normal(JsValue::Undefined)
            })
        }));
        agent.run_jobs().unwrap();
        assert_eq!(*log.borrow(), vec![1, 2]);
    }

    #[test]
    fn drain_stops_at_the_job_limit() {
        let agent = Agent::new(AgentOptions::default().with_max_jobs_per_drain(2));
        let queue = agent.job_queue().unwrap();
        let log = Rc::new(RefCell::new(Vec::new()));
        for n in 0..3 {
            queue.enqueue_promise_job(recording_job(&log, n));
        }
        assert!(matches!(agent.run_jobs().unwrap(), DrainOutcome::LimitReached));
        assert_eq!(queue.len(), 1);
        assert!(matches!(agent.run_jobs().unwrap(), DrainOutcome::Idle));
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn rejection_tracking_can_be_revoked() {
        let queue = JobQueue::default();
        let p = JsObject { id: 9 };
        queue.promise_rejection_tracker(p, RejectionOperation::Reject);
        queue.promise_rejection_tracker(p, RejectionOperation::Reject);
        assert_eq!(queue.unhandled_rejections(), vec![p]);
        queue.promise_rejection_tracker(p, RejectionOperation::Handle);
        assert!(queue.unhandled_rejections().is_empty());
    }
}
