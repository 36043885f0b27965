//! Readiness gate and deferred command queue.
//!
//! The gate tracks whether every configured pool exists. Until it does,
//! requests are captured as pending commands in a FIFO queue and callers get
//! a future that settles once the command has run. When the gate opens, the
//! queue is drained exactly once, in submission order.
//!
//! ## State Transitions
//!
//! ```text
//! NotStarted -> Initializing (begin)
//! Initializing -> Ready (open: queue drained)
//! Initializing -> Stuck (mark_stuck: queue kept, never drained)
//! any -> Closed (close: queue discarded, waiting callers get Error::Closed)
//! ```
//!
//! ## Drain Invariant
//!
//! Opening the gate flips the state to `Ready` and swaps the queue for an
//! empty one under a single lock acquisition. Iteration over the taken
//! commands happens after the lock is released. A request arriving during the
//! drain therefore observes `Ready` and runs directly: it can neither be
//! skipped nor run twice, and it never lands in the queue being drained.
//!
//! Drained commands are driven by a single task that polls them in queue
//! order, so each one reaches its first provider call in submission order
//! regardless of runtime flavor.
//!
//! ## Queue Timeout
//!
//! Each queued command carries a claim flag. The drain claims a command
//! before running it; a caller whose queue timeout fires claims it first and
//! the drain skips it. Whichever side claims first decides the outcome, so a
//! caller told [`Error::QueueTimeout`] is guaranteed the command never ran.

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::{oneshot, watch};

use crate::error::{Error, Result};
use crate::instrumentation::SanitizationConfig;

/// A future returned by the gate: either the direct execution or the pending
/// result of a queued command.
pub type Pending<T> = BoxFuture<'static, Result<T>>;

type Invocation = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// Lifecycle state of a [`ReadinessGate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadinessState {
    /// `initialize` has not been called.
    NotStarted,
    /// Pools are being created.
    Initializing,
    /// Every pool exists. Requests run immediately.
    Ready,
    /// Pool creation failed. Queued requests never run.
    Stuck,
    /// Shut down.
    Closed,
}

impl ReadinessState {
    /// Whether requests run without queuing.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

impl fmt::Display for ReadinessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotStarted => "not started",
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::Stuck => "stuck",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Which execute operation a command came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// `execute_one`.
    Single,
    /// `execute_many`.
    Batch,
}

/// Loggable description of a request.
///
/// The statement is sanitized on construction; bind values are reduced to a
/// count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSummary {
    /// Target pool alias.
    pub alias: String,
    /// Operation kind.
    pub kind: CommandKind,
    /// Sanitized statement text.
    pub statement: String,
    /// Number of bind values (single) or bind sets (batch).
    pub bind_count: usize,
}

impl CommandSummary {
    /// Describe a request.
    pub fn new(alias: &str, kind: CommandKind, statement: &str, bind_count: usize) -> Self {
        Self {
            alias: alias.to_owned(),
            kind,
            statement: SanitizationConfig::default().sanitize(statement),
            bind_count,
        }
    }
}

/// A request captured before readiness.
///
/// Owned by the gate until drained. Draining claims it and hands the
/// invocation to the drain task, which delivers the outcome to the waiting
/// caller.
struct PendingCommand {
    summary: CommandSummary,
    invoke: Invocation,
    claimed: Arc<AtomicBool>,
}

impl PendingCommand {
    /// Take the command for execution. False if its caller already gave up.
    fn claim(&self) -> bool {
        !self.claimed.swap(true, Ordering::SeqCst)
    }

    fn is_abandoned(&self) -> bool {
        self.claimed.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for PendingCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingCommand")
            .field("summary", &self.summary)
            .field("invoke", &"<fn>")
            .finish()
    }
}

struct GateInner {
    state: ReadinessState,
    queue: VecDeque<PendingCommand>,
}

/// Gate between request submission and pool readiness.
pub struct ReadinessGate {
    inner: Mutex<GateInner>,
    ready_tx: watch::Sender<bool>,
    queue_timeout: Option<Duration>,
}

impl fmt::Debug for ReadinessGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("ReadinessGate")
            .field("state", &inner.state)
            .field("pending", &inner.queue.len())
            .field("queue_timeout", &self.queue_timeout)
            .finish()
    }
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ReadinessGate {
    /// Create a gate in `NotStarted`.
    ///
    /// `queue_timeout` bounds how long a queued caller waits; `None` waits
    /// until the gate opens, which never happens if initialization fails.
    #[must_use]
    pub fn new(queue_timeout: Option<Duration>) -> Self {
        let (ready_tx, _) = watch::channel(false);
        Self {
            inner: Mutex::new(GateInner {
                state: ReadinessState::NotStarted,
                queue: VecDeque::new(),
            }),
            ready_tx,
            queue_timeout,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ReadinessState {
        self.inner.lock().state
    }

    /// Number of queued commands still awaited by their callers.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.inner
            .lock()
            .queue
            .iter()
            .filter(|c| !c.is_abandoned())
            .count()
    }

    /// Subscribe to the one-shot readiness notification.
    #[must_use]
    pub fn subscribe(&self) -> ReadySignal {
        ReadySignal {
            rx: self.ready_tx.subscribe(),
        }
    }

    /// Move from `NotStarted` to `Initializing`.
    ///
    /// Fails with [`Error::AlreadyInitialized`] from any other state, or
    /// [`Error::Closed`] once closed.
    pub fn begin(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        match inner.state {
            ReadinessState::NotStarted => {
                inner.state = ReadinessState::Initializing;
                Ok(())
            }
            ReadinessState::Closed => Err(Error::Closed),
            other => Err(Error::AlreadyInitialized(other)),
        }
    }

    /// Record that initialization failed. Queued commands stay queued.
    pub fn mark_stuck(&self) {
        let mut inner = self.inner.lock();
        if inner.state == ReadinessState::Initializing {
            inner.state = ReadinessState::Stuck;
            tracing::error!(
                pending = inner.queue.len(),
                "initialization failed; queued requests will not run"
            );
        }
    }

    /// Open the gate and drain the queue.
    ///
    /// Queued commands are driven by one task spawned onto the current tokio
    /// runtime, which polls them in submission order. Commands whose caller
    /// timed out are skipped. Returns the number of commands replayed.
    pub fn open(&self) -> Result<usize> {
        let drained = {
            let mut inner = self.inner.lock();
            match inner.state {
                ReadinessState::Initializing => {}
                ReadinessState::Closed => return Err(Error::Closed),
                other => return Err(Error::AlreadyInitialized(other)),
            }
            inner.state = ReadinessState::Ready;
            std::mem::take(&mut inner.queue)
        };

        self.ready_tx.send_replace(true);

        let mut replay = Vec::with_capacity(drained.len());
        for command in drained {
            if !command.claim() {
                tracing::debug!(
                    pool = %command.summary.alias,
                    kind = ?command.summary.kind,
                    "skipping queued request abandoned after queue timeout"
                );
                continue;
            }
            tracing::debug!(
                pool = %command.summary.alias,
                kind = ?command.summary.kind,
                "replaying queued request"
            );
            replay.push((command.invoke)());
        }

        let count = replay.len();
        if count > 0 {
            // join_all first polls its futures in the order given.
            tokio::spawn(futures_util::future::join_all(replay));
        }
        Ok(count)
    }

    /// Close the gate.
    ///
    /// Queued commands are discarded; their callers receive
    /// [`Error::Closed`]. Returns the number discarded.
    pub fn close(&self) -> usize {
        let discarded = {
            let mut inner = self.inner.lock();
            inner.state = ReadinessState::Closed;
            std::mem::take(&mut inner.queue)
        };
        if !discarded.is_empty() {
            tracing::warn!(
                discarded = discarded.len(),
                "discarding queued requests on shutdown"
            );
        }
        discarded.len()
    }

    /// Run `f` now if the gate is open, otherwise queue it.
    ///
    /// The readiness check and the enqueue happen when this method is
    /// called, not when the returned future is first polled, so queue order
    /// is call order. Nothing here blocks.
    ///
    /// A queued command runs to completion once the gate opens even if the
    /// returned future has been dropped by then. Only a fired queue timeout
    /// abandons it.
    pub fn run_or_defer<T, F, Fut>(&self, summary: CommandSummary, f: F) -> Pending<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let mut inner = self.inner.lock();
        let state = inner.state;
        match state {
            ReadinessState::Ready => {
                drop(inner);
                return f().boxed();
            }
            ReadinessState::Closed => {
                return futures_util::future::ready(Err(Error::Closed)).boxed();
            }
            ReadinessState::NotStarted | ReadinessState::Initializing | ReadinessState::Stuck => {}
        }

        let (tx, mut rx) = oneshot::channel();
        let claimed = Arc::new(AtomicBool::new(false));
        let invoke: Invocation = Box::new(move || {
            async move {
                // The caller may have stopped waiting; the command still ran.
                let _ = tx.send(f().await);
            }
            .boxed()
        });

        tracing::info!(
            pool = %summary.alias,
            kind = ?summary.kind,
            db.statement = %summary.statement,
            binds = summary.bind_count,
            position = inner.queue.len(),
            state = %state,
            "request queued until pools are ready"
        );
        inner.queue.push_back(PendingCommand {
            summary,
            invoke,
            claimed: Arc::clone(&claimed),
        });
        drop(inner);

        let queue_timeout = self.queue_timeout;
        async move {
            let outcome = match queue_timeout {
                Some(limit) => match tokio::time::timeout(limit, &mut rx).await {
                    Ok(outcome) => outcome,
                    // Give up only if the drain has not taken the command yet.
                    Err(_) if !claimed.swap(true, Ordering::SeqCst) => {
                        return Err(Error::QueueTimeout(limit));
                    }
                    Err(_) => rx.await,
                },
                None => rx.await,
            };
            // A dropped sender means the command was discarded, not run.
            outcome.unwrap_or(Err(Error::Closed))
        }
        .boxed()
    }
}

/// One-shot readiness notification.
///
/// Fires once, when the gate opens. Any number of subscribers may wait, and a
/// subscriber created after the gate opened completes immediately.
#[derive(Debug, Clone)]
pub struct ReadySignal {
    rx: watch::Receiver<bool>,
}

impl ReadySignal {
    /// Whether the gate has opened.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until the gate opens.
    ///
    /// Fails with [`Error::Closed`] if the gate is dropped without ever
    /// opening. If initialization got stuck this waits indefinitely.
    pub async fn wait(&mut self) -> Result<()> {
        self.rx
            .wait_for(|ready| *ready)
            .await
            .map(|_| ())
            .map_err(|_| Error::Closed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn summary(alias: &str) -> CommandSummary {
        CommandSummary::new(alias, CommandKind::Single, "SELECT 1 FROM DUAL", 0)
    }

    #[test]
    fn test_state_predicates() {
        assert!(ReadinessState::Ready.is_ready());
        assert!(!ReadinessState::Initializing.is_ready());
        assert_eq!(ReadinessState::Stuck.to_string(), "stuck");
    }

    #[test]
    fn test_summary_is_sanitized() {
        let s = CommandSummary::new("hr", CommandKind::Batch, "INSERT INTO t VALUES ('x', 42)", 3);
        assert_eq!(s.statement, "INSERT INTO t VALUES (?, ?)");
        assert_eq!(s.bind_count, 3);
    }

    #[test]
    fn test_begin_only_once() {
        let gate = ReadinessGate::default();
        gate.begin().unwrap();
        assert_eq!(gate.state(), ReadinessState::Initializing);
        assert!(matches!(
            gate.begin(),
            Err(Error::AlreadyInitialized(ReadinessState::Initializing))
        ));
    }

    #[tokio::test]
    async fn test_ready_path_runs_directly() {
        let gate = ReadinessGate::default();
        gate.begin().unwrap();
        assert_eq!(gate.open().unwrap(), 0);

        let out = gate
            .run_or_defer(summary("A"), || async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(out, 7);
        assert_eq!(gate.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_queued_commands_drain_in_order() {
        let gate = ReadinessGate::default();
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut pending = Vec::new();
        for i in 0..5 {
            let order = Arc::clone(&order);
            pending.push(gate.run_or_defer(summary("A"), move || async move {
                order.lock().push(i);
                Ok(i)
            }));
        }
        assert_eq!(gate.pending_len(), 5);
        assert!(order.lock().is_empty());

        gate.begin().unwrap();
        assert_eq!(gate.open().unwrap(), 5);
        assert_eq!(gate.pending_len(), 0);

        let results = futures_util::future::join_all(pending).await;
        let values: Vec<i32> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(values, vec![0, 1, 2, 3, 4]);
        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_queued_future_wakes_on_open() {
        let gate = ReadinessGate::default();
        let mut pending =
            tokio_test::task::spawn(gate.run_or_defer(summary("A"), || async { Ok("done") }));
        tokio_test::assert_pending!(pending.poll());

        gate.begin().unwrap();
        tokio_test::assert_pending!(pending.poll());

        gate.open().unwrap();
        tokio::task::yield_now().await;
        assert!(pending.is_woken());
        assert_eq!(tokio_test::assert_ready_ok!(pending.poll()), "done");
    }

    #[tokio::test]
    async fn test_queued_command_runs_even_if_caller_dropped() {
        let gate = ReadinessGate::default();
        let ran = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&ran);
        drop(gate.run_or_defer(summary("A"), move || async move {
            *flag.lock() = true;
            Ok(())
        }));

        gate.begin().unwrap();
        gate.open().unwrap();
        tokio::task::yield_now().await;
        assert!(*ran.lock());
    }

    #[tokio::test]
    async fn test_request_during_drain_bypasses_queue() {
        let gate = Arc::new(ReadinessGate::default());
        let order = Arc::new(Mutex::new(Vec::new()));

        let inner_gate = Arc::clone(&gate);
        let inner_order = Arc::clone(&order);
        let first = gate.run_or_defer(summary("A"), move || async move {
            inner_order.lock().push("queued");
            // Submitted while the drain is in progress: must not be queued.
            assert_eq!(inner_gate.pending_len(), 0);
            let order = Arc::clone(&inner_order);
            inner_gate
                .run_or_defer(summary("A"), move || async move {
                    order.lock().push("nested");
                    Ok(())
                })
                .await
        });

        gate.begin().unwrap();
        gate.open().unwrap();
        first.await.unwrap();
        assert_eq!(*order.lock(), vec!["queued", "nested"]);
        assert_eq!(gate.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_stuck_gate_keeps_queue() {
        let gate = ReadinessGate::default();
        let pending = gate.run_or_defer(summary("A"), || async { Ok(()) });
        gate.begin().unwrap();
        gate.mark_stuck();

        assert_eq!(gate.state(), ReadinessState::Stuck);
        assert_eq!(gate.pending_len(), 1);
        let waited = tokio::time::timeout(Duration::from_millis(50), pending).await;
        assert!(waited.is_err(), "queued request must not settle");

        // Requests keep queueing while stuck.
        let _later = gate.run_or_defer(summary("B"), || async { Ok(()) });
        assert_eq!(gate.pending_len(), 2);
        assert!(gate.open().is_err());
    }

    #[tokio::test]
    async fn test_close_rejects_queued_and_new_requests() {
        let gate = ReadinessGate::default();
        let pending = gate.run_or_defer(summary("A"), || async { Ok(()) });
        assert_eq!(gate.close(), 1);

        assert!(matches!(pending.await, Err(Error::Closed)));
        let after = gate.run_or_defer(summary("A"), || async { Ok(()) }).await;
        assert!(matches!(after, Err(Error::Closed)));
        assert!(matches!(gate.begin(), Err(Error::Closed)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_timeout_abandons_command() {
        let gate = ReadinessGate::new(Some(Duration::from_secs(5)));
        let ran = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&ran);
        let pending = gate.run_or_defer(summary("A"), move || async move {
            *flag.lock() = true;
            Ok(())
        });

        let err = pending.await.unwrap_err();
        assert!(matches!(err, Error::QueueTimeout(d) if d == Duration::from_secs(5)));
        assert_eq!(gate.pending_len(), 0);

        gate.begin().unwrap();
        assert_eq!(gate.open().unwrap(), 0);
        tokio::task::yield_now().await;
        assert!(!*ran.lock(), "timed-out command must not run");
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_timeout_after_drain_waits_for_outcome() {
        let gate = ReadinessGate::new(Some(Duration::from_secs(5)));
        let pending = gate.run_or_defer(summary("A"), || async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok("slow")
        });

        gate.begin().unwrap();
        assert_eq!(gate.open().unwrap(), 1);

        // Already running when the limit passes: the caller gets the result.
        assert_eq!(pending.await.unwrap(), "slow");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_drain_order_on_multi_thread_runtime() {
        let gate = Arc::new(ReadinessGate::default());
        let order = Arc::new(Mutex::new(Vec::new()));

        let pending: Vec<_> = (0..32)
            .map(|i| {
                let order = Arc::clone(&order);
                gate.run_or_defer(summary("A"), move || async move {
                    order.lock().push(i);
                    Ok(())
                })
            })
            .collect();

        let opener = Arc::clone(&gate);
        tokio::spawn(async move {
            opener.begin().unwrap();
            opener.open().unwrap();
        })
        .await
        .unwrap();

        for p in pending {
            p.await.unwrap();
        }
        assert_eq!(*order.lock(), (0..32).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_ready_signal_multiple_and_late_subscribers() {
        let gate = Arc::new(ReadinessGate::default());
        let mut early_a = gate.subscribe();
        let mut early_b = gate.subscribe();
        assert!(!early_a.is_ready());

        let waiter = tokio::spawn(async move {
            early_a.wait().await.unwrap();
        });

        gate.begin().unwrap();
        gate.open().unwrap();

        waiter.await.unwrap();
        early_b.wait().await.unwrap();

        let mut late = gate.subscribe();
        assert!(late.is_ready());
        tokio::time::timeout(Duration::from_millis(50), late.wait())
            .await
            .expect("late subscriber must not hang")
            .unwrap();
    }

    #[tokio::test]
    async fn test_ready_signal_gate_dropped() {
        let gate = ReadinessGate::default();
        let mut signal = gate.subscribe();
        drop(gate);
        assert!(matches!(signal.wait().await, Err(Error::Closed)));
    }
}
