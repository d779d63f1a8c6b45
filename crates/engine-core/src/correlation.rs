//! Async instruction correlation
//!
//! The engine answers requests out of band: a call returns only a
//! correlation id, and the real result arrives later as a completion
//! event on the shared callback channel. The [`Correlator`] is the table
//! linking ids to waiting [`AsyncInstruction`]s, with
//! remove-on-first-match semantics so a duplicate or stale completion is
//! observed by nobody.
//!
//! Per pending operation the state machine is
//! `Pending -> Completed(success) | Completed(error) | Cancelled`, all
//! terminal. Completion side effects (wiring engine handles into the
//! domain object graph) run strictly before the done flag flips, so a
//! caller that observes `is_done()` always sees a fully updated graph.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::debug;

use crate::error::{EngineError, EngineResult};
use crate::proto::CompletionEvent;

/// Side-effect callback run on successful completion, before the
/// operation is marked done.
pub type CompletionHook = Box<dyn FnOnce(&CompletionEvent) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Phase {
    Pending,
    Completed { error: Option<String> },
    Cancelled,
}

struct Shared {
    phase: Mutex<Phase>,
    done: Notify,
}

struct PendingEntry {
    shared: Arc<Shared>,
    hook: Option<CompletionHook>,
}

/// Correlation table for in-flight operations.
///
/// Cheap to clone; clones share the same table.
#[derive(Clone)]
pub struct Correlator {
    pending: Arc<DashMap<u64, PendingEntry>>,
}

impl Correlator {
    /// Create an empty correlation table.
    pub fn new() -> Self {
        Self {
            pending: Arc::new(DashMap::new()),
        }
    }

    /// Register a pending operation with no completion side effects.
    pub fn register(&self, async_id: u64) -> AsyncInstruction {
        self.install(async_id, None)
    }

    /// Register a pending operation whose `hook` runs on successful
    /// completion, strictly before `is_done()` starts returning true.
    /// Error completions skip the hook: a failed operation must not
    /// half-apply domain state.
    pub fn register_with_hook(
        &self,
        async_id: u64,
        hook: impl FnOnce(&CompletionEvent) + Send + Sync + 'static,
    ) -> AsyncInstruction {
        self.install(async_id, Some(Box::new(hook)))
    }

    fn install(&self, async_id: u64, hook: Option<CompletionHook>) -> AsyncInstruction {
        let shared = Arc::new(Shared {
            phase: Mutex::new(Phase::Pending),
            done: Notify::new(),
        });
        self.pending.insert(
            async_id,
            PendingEntry {
                shared: Arc::clone(&shared),
                hook,
            },
        );
        AsyncInstruction {
            async_id,
            shared,
            correlator: self.clone(),
        }
    }

    /// Resolve the pending operation matching `event.async_id`.
    ///
    /// The first matching completion wins: the entry is removed from the
    /// table atomically, so a second delivery of the same id (or a stale
    /// completion for a cancelled operation) finds nothing and is dropped
    /// silently. Returns whether a waiter was resolved.
    pub fn resolve(&self, event: &CompletionEvent) -> bool {
        let Some((_, mut entry)) = self.pending.remove(&event.async_id) else {
            debug!(
                async_id = event.async_id,
                "completion matched no pending operation, dropped"
            );
            return false;
        };

        let resolved = {
            // The hook runs under the phase lock so cancellation cannot
            // interleave between the side effects and the done flip.
            let mut phase = entry.shared.phase.lock();
            if *phase == Phase::Pending {
                if !event.is_error() {
                    if let Some(hook) = entry.hook.take() {
                        hook(event);
                    }
                }
                *phase = Phase::Completed {
                    error: event.error_message().map(str::to_string),
                };
                true
            } else {
                false
            }
        };

        entry.shared.done.notify_waiters();
        resolved
    }

    /// Number of operations still awaiting completion.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Cancel everything still pending. Teardown path.
    pub fn cancel_all(&self) {
        let ids: Vec<u64> = self.pending.iter().map(|entry| *entry.key()).collect();
        for async_id in ids {
            if let Some((_, entry)) = self.pending.remove(&async_id) {
                let mut phase = entry.shared.phase.lock();
                if *phase == Phase::Pending {
                    *phase = Phase::Cancelled;
                }
                drop(phase);
                entry.shared.done.notify_waiters();
            }
        }
    }
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Correlator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Correlator")
            .field("pending", &self.pending.len())
            .finish()
    }
}

/// Handle to one in-flight request/response pair.
///
/// Never blocks a thread: callers either poll [`is_done`](Self::is_done)
/// or await [`await_completion`](Self::await_completion). Clones observe
/// the same operation.
#[derive(Clone)]
pub struct AsyncInstruction {
    async_id: u64,
    shared: Arc<Shared>,
    correlator: Correlator,
}

impl AsyncInstruction {
    /// The correlation id this instruction waits on.
    pub fn async_id(&self) -> u64 {
        self.async_id
    }

    /// True once the operation completed (successfully or not).
    /// Cancelled operations never become done.
    pub fn is_done(&self) -> bool {
        matches!(*self.shared.phase.lock(), Phase::Completed { .. })
    }

    /// True when the engine reported a failure for this operation.
    pub fn is_error(&self) -> bool {
        matches!(
            *self.shared.phase.lock(),
            Phase::Completed { error: Some(_) }
        )
    }

    /// True when the caller cancelled before completion arrived.
    pub fn is_cancelled(&self) -> bool {
        *self.shared.phase.lock() == Phase::Cancelled
    }

    /// Engine-reported error text, when the operation failed.
    pub fn error_message(&self) -> Option<String> {
        match &*self.shared.phase.lock() {
            Phase::Completed { error } => error.clone(),
            _ => None,
        }
    }

    /// Cooperatively cancel.
    ///
    /// Prevents a not-yet-applied completion from mutating domain state;
    /// a completion event arriving afterward is observed by nobody. The
    /// engine may still perform the underlying action, which cannot be
    /// retracted from this side of the boundary.
    pub fn cancel(&self) {
        {
            let mut phase = self.shared.phase.lock();
            if *phase != Phase::Pending {
                return;
            }
            *phase = Phase::Cancelled;
        }
        self.correlator.pending.remove(&self.async_id);
        self.shared.done.notify_waiters();
    }

    /// Wait for the terminal state without holding a thread.
    ///
    /// Resolves to `Ok(())` on success, [`EngineError::EngineFailure`]
    /// when the engine reported an error, and [`EngineError::Cancelled`]
    /// when the caller cancelled first. Failed operations are never
    /// retried here; retry means a fresh request with a new id.
    pub async fn await_completion(&self) -> EngineResult<()> {
        loop {
            let notified = self.shared.done.notified();
            match &*self.shared.phase.lock() {
                Phase::Completed { error: None } => return Ok(()),
                Phase::Completed { error: Some(message) } => {
                    return Err(EngineError::engine_failure(message.clone()))
                }
                Phase::Cancelled => return Err(EngineError::Cancelled),
                Phase::Pending => {}
            }
            notified.await;
        }
    }
}

impl std::fmt::Debug for AsyncInstruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncInstruction")
            .field("async_id", &self.async_id)
            .field("phase", &*self.shared.phase.lock())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::CompletionPayload;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    fn success(async_id: u64) -> CompletionEvent {
        CompletionEvent {
            async_id,
            error: String::new(),
            payload: CompletionPayload::Disconnect,
        }
    }

    fn failure(async_id: u64, message: &str) -> CompletionEvent {
        CompletionEvent {
            async_id,
            error: message.to_string(),
            payload: CompletionPayload::None,
        }
    }

    #[test]
    fn completions_resolve_out_of_order() {
        let correlator = Correlator::new();
        let first = correlator.register(1);
        let second = correlator.register(2);

        assert!(correlator.resolve(&success(2)));
        assert!(second.is_done());
        assert!(!first.is_done());

        assert!(correlator.resolve(&success(1)));
        assert!(first.is_done());
    }

    #[test]
    fn duplicate_completion_is_a_no_op() {
        let correlator = Correlator::new();
        let instruction = correlator.register(7);

        assert!(correlator.resolve(&success(7)));
        assert!(instruction.is_done());
        assert!(!instruction.is_error());

        // Second delivery of the same id: nobody observes it.
        assert!(!correlator.resolve(&failure(7, "late and wrong")));
        assert!(!instruction.is_error());
    }

    #[test]
    fn unmatched_completion_is_dropped_silently() {
        let correlator = Correlator::new();
        assert!(!correlator.resolve(&success(42)));
    }

    #[test]
    fn hook_runs_before_done_becomes_observable() {
        let correlator = Correlator::new();
        let domain_state = Arc::new(AtomicBool::new(false));

        let hook_state = Arc::clone(&domain_state);
        let instruction = correlator.register_with_hook(3, move |_event| {
            hook_state.store(true, Ordering::SeqCst);
        });
        let probe = instruction.clone();

        // Nothing applied yet.
        assert!(!domain_state.load(Ordering::SeqCst));

        correlator.resolve(&success(3));
        assert!(probe.is_done());
        assert!(domain_state.load(Ordering::SeqCst));
    }

    #[test]
    fn error_completion_skips_the_hook() {
        let correlator = Correlator::new();
        let domain_state = Arc::new(AtomicBool::new(false));

        let hook_state = Arc::clone(&domain_state);
        let instruction = correlator.register_with_hook(4, move |_event| {
            hook_state.store(true, Ordering::SeqCst);
        });

        correlator.resolve(&failure(4, "publish rejected"));
        assert!(instruction.is_done());
        assert!(instruction.is_error());
        assert_eq!(
            instruction.error_message().as_deref(),
            Some("publish rejected")
        );
        assert!(!domain_state.load(Ordering::SeqCst));
    }

    #[test]
    fn cancellation_prevents_side_effects_even_if_completion_arrives() {
        let correlator = Correlator::new();
        let domain_state = Arc::new(AtomicBool::new(false));

        let hook_state = Arc::clone(&domain_state);
        let instruction = correlator.register_with_hook(5, move |_event| {
            hook_state.store(true, Ordering::SeqCst);
        });

        instruction.cancel();
        assert!(instruction.is_cancelled());
        assert_eq!(correlator.pending_count(), 0);

        // The completion the engine sends anyway is observed by nobody.
        assert!(!correlator.resolve(&success(5)));
        assert!(!domain_state.load(Ordering::SeqCst));
        assert!(!instruction.is_done());
    }

    #[tokio::test]
    async fn await_completion_wakes_on_resolution() {
        let correlator = Correlator::new();
        let instruction = correlator.register(9);

        let resolver = correlator.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            resolver.resolve(&success(9));
        });

        instruction.await_completion().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn await_completion_surfaces_engine_failure() {
        let correlator = Correlator::new();
        let instruction = correlator.register(10);
        correlator.resolve(&failure(10, "no such room"));

        let err = instruction.await_completion().await.unwrap_err();
        assert!(matches!(err, EngineError::EngineFailure { .. }));
    }

    #[test]
    fn await_completion_surfaces_cancellation() {
        let correlator = Correlator::new();
        let instruction = correlator.register(11);
        instruction.cancel();

        let err = tokio_test::block_on(instruction.await_completion()).unwrap_err();
        assert!(matches!(err, EngineError::Cancelled));
    }

    #[test]
    fn cancel_all_terminates_every_pending_operation() {
        let correlator = Correlator::new();
        let a = correlator.register(20);
        let b = correlator.register(21);

        correlator.cancel_all();
        assert!(a.is_cancelled());
        assert!(b.is_cancelled());
        assert_eq!(correlator.pending_count(), 0);
    }
}
