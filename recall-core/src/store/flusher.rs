//! Debounced snapshot writer.
//!
//! One flusher task runs per open store and is the only writer of its
//! backend, so at most one flush is ever in flight. Mutations signal a
//! [`Notify`](tokio::sync::Notify), which holds at most one permit; a burst
//! of mutations therefore wakes the task once. Each wake pushes the quiet
//! deadline out, while the hard deadline, fixed at the first unflushed
//! mutation, bounds how long a burst can postpone the write.
//!
//! Explicit flush requests queued while a write is running are answered
//! together by the single flush that follows it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, error, info, warn};

use super::{FlushPolicy, Shared};
use crate::error::{RecallError, Result};
use crate::persistence::SnapshotBackend;

const COMMAND_BUFFER: usize = 16;

/// Floor of the delay before retrying a failed flush.
const MIN_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Requests from store handles to the flusher.
pub(crate) enum Command {
    /// Write now and report the outcome.
    Flush(oneshot::Sender<Result<()>>),
    /// Write a final snapshot, run the backend's close hook and exit.
    Shutdown(oneshot::Sender<Result<()>>),
}

/// Deadlines of the pending debounced flush.
#[derive(Debug, Clone, Copy)]
struct Window {
    quiet_until: Instant,
    hard_until: Instant,
}

impl Window {
    fn open(now: Instant, policy: FlushPolicy) -> Self {
        Self {
            quiet_until: now + policy.quiet,
            hard_until: now + policy.max_coalesce,
        }
    }

    fn extend(self, now: Instant, policy: FlushPolicy) -> Self {
        Self {
            quiet_until: now + policy.quiet,
            ..self
        }
    }

    fn retry(now: Instant, delay: Duration) -> Self {
        Self {
            quiet_until: now + delay,
            hard_until: now + delay,
        }
    }

    fn wake_at(self) -> Instant {
        self.quiet_until.min(self.hard_until)
    }
}

/// Delay before the next retry of a failed flush: starts at the quiet
/// period (never below [`MIN_RETRY_DELAY`]) and doubles up to the
/// coalescing window.
#[derive(Debug, Clone, Copy)]
struct Backoff {
    initial: Duration,
    max: Duration,
    next: Duration,
}

impl Backoff {
    fn new(policy: FlushPolicy) -> Self {
        let initial = policy.quiet.max(MIN_RETRY_DELAY);
        Self {
            initial,
            max: policy.max_coalesce.max(initial),
            next: initial,
        }
    }

    fn reset(&mut self) {
        self.next = self.initial;
    }

    /// Window for the next attempt; later failures wait longer.
    fn schedule(&mut self, now: Instant) -> Window {
        let window = Window::retry(now, self.next);
        self.next = (self.next * 2).min(self.max);
        window
    }
}

pub(crate) struct Flusher {
    shared: Arc<Shared>,
    backend: Arc<dyn SnapshotBackend>,
    policy: FlushPolicy,
    commands: mpsc::Receiver<Command>,
    flushed_generation: u64,
}

impl Flusher {
    /// Spawn the flusher for `shared` onto the current tokio runtime.
    pub(crate) fn spawn(
        shared: Arc<Shared>,
        backend: Arc<dyn SnapshotBackend>,
        policy: FlushPolicy,
    ) -> (mpsc::Sender<Command>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let flushed_generation = shared.state.lock().table.generation();
        let flusher = Self {
            shared,
            backend,
            policy,
            commands: rx,
            flushed_generation,
        };
        let handle = tokio::spawn(flusher.run());
        (tx, handle)
    }

    async fn run(mut self) {
        let mut window: Option<Window> = None;
        let mut backoff = Backoff::new(self.policy);

        loop {
            let wake = window.map(Window::wake_at);
            let deadline = async move {
                match wake {
                    Some(at) => time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                biased;

                command = self.commands.recv() => match command {
                    Some(Command::Flush(reply)) => {
                        let (waiters, shutdown) = self.drain_flush_requests(reply);
                        if let Some(reply) = shutdown {
                            let result = self.finish().await;
                            answer_all(waiters, &result);
                            let _ = reply.send(result);
                            return;
                        }
                        let result = self.flush(true).await;
                        window = match &result {
                            Ok(()) => {
                                backoff.reset();
                                None
                            }
                            Err(_) => Some(backoff.schedule(Instant::now())),
                        };
                        answer_all(waiters, &result);
                    }
                    Some(Command::Shutdown(reply)) => {
                        let _ = reply.send(self.finish().await);
                        return;
                    }
                    None => {
                        // Every handle was dropped without close().
                        if let Err(e) = self.finish().await {
                            error!(error = %e, "Final card flush after drop failed");
                        }
                        return;
                    }
                },

                () = deadline => {
                    window = match self.flush(false).await {
                        Ok(()) => {
                            backoff.reset();
                            None
                        }
                        Err(_) => Some(backoff.schedule(Instant::now())),
                    };
                }

                () = self.shared.dirty.notified() => {
                    let now = Instant::now();
                    window = Some(match window {
                        Some(w) => w.extend(now, self.policy),
                        None => Window::open(now, self.policy),
                    });
                }
            }
        }
    }

    /// Collect every flush request already queued behind `first`.
    ///
    /// A queued shutdown ends the drain and is returned separately.
    fn drain_flush_requests(
        &mut self,
        first: oneshot::Sender<Result<()>>,
    ) -> (Vec<oneshot::Sender<Result<()>>>, Option<oneshot::Sender<Result<()>>>) {
        let mut waiters = vec![first];
        while let Ok(command) = self.commands.try_recv() {
            match command {
                Command::Flush(reply) => waiters.push(reply),
                Command::Shutdown(reply) => return (waiters, Some(reply)),
            }
        }
        if waiters.len() > 1 {
            debug!(requests = waiters.len(), "Coalesced queued flush requests");
        }
        (waiters, None)
    }

    /// Write the current snapshot unless it is already on disk and `force`
    /// is not set.
    async fn flush(&mut self, force: bool) -> Result<()> {
        let (generation, cards) = {
            let state = self.shared.state.lock();
            let generation = state.table.generation();
            if !force && generation == self.flushed_generation {
                return Ok(());
            }
            (generation, state.table.snapshot())
        };

        let count = cards.len();
        let backend = Arc::clone(&self.backend);
        let start = std::time::Instant::now();
        let outcome = tokio::task::spawn_blocking(move || backend.store(&cards))
            .await
            .map_err(|e| RecallError::Flush(e.to_string()))
            .and_then(|written| written);

        match outcome {
            Ok(()) => {
                self.flushed_generation = generation;
                debug!(
                    backend = self.backend.name(),
                    cards = count,
                    generation,
                    elapsed_us = start.elapsed().as_micros(),
                    "Card snapshot flushed"
                );
                Ok(())
            }
            Err(e) => {
                error!(
                    backend = self.backend.name(),
                    error = %e,
                    "Card snapshot flush failed; in-memory state kept for retry"
                );
                Err(match e {
                    RecallError::Flush(_) => e,
                    other => RecallError::Flush(other.to_string()),
                })
            }
        }
    }

    /// Final forced flush followed by the backend's close hook.
    async fn finish(&mut self) -> Result<()> {
        let result = self.flush(true).await;
        if result.is_ok() {
            let backend = Arc::clone(&self.backend);
            match tokio::task::spawn_blocking(move || backend.on_close()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "Backend close hook failed"),
                Err(e) => warn!(error = %e, "Backend close hook panicked"),
            }
        }
        info!(
            backend = self.backend.name(),
            ok = result.is_ok(),
            "Card store flusher stopped"
        );
        result
    }
}

fn error_copy(result: &Result<()>) -> Result<()> {
    match result {
        Ok(()) => Ok(()),
        Err(e) => Err(RecallError::Flush(e.to_string())),
    }
}

/// Send `result` to every waiter. Waiters that gave up are skipped.
fn answer_all(waiters: Vec<oneshot::Sender<Result<()>>>, result: &Result<()>) {
    for waiter in waiters {
        let _ = waiter.send(error_copy(result));
    }
}
