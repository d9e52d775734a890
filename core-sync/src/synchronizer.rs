//! # Metadata Synchronizer
//!
//! Drives one entity to a terminal state over two channels at once:
//!
//! - **push**: a [`PushChannel`] subscription on the entity's topic
//! - **pull**: a poll loop with exponential backoff on consecutive errors
//!
//! Both feed the same [`Reconciler`]; progress that survives ordering is
//! handed to the caller's progress callback and the first terminal update
//! ends the run.
//!
//! ## Poll loop
//!
//! ```text
//! attempt ──ok──────────> reset errors ──> sleep(base)
//!    │
//!    └─transient error──> errors += 1 ──> errors >= threshold ? Unreachable
//!                                      └> sleep(min(base * 1.5^errors, max))
//! attempts >= max_attempts (still non-terminal) ──> Timeout
//! ```
//!
//! With `poll_alongside_push` disabled, polling waits until the push
//! subscription fails or closes.

use bridge_traits::PushChannel;
use core_async::sync::{mpsc, watch, CancellationToken};
use core_async::time::sleep;
use core_runtime::config::{CoreConfig, PollConfig, SyncConfig};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, SyncError};
use crate::reconciler::{Decision, Reconciler, Source, Ticket};
use crate::source::{PollFailure, SyncSource};
use crate::update::{SyncProgress, SyncUpdate};

#[derive(Clone)]
pub struct MetadataSynchronizer {
    push_channel: Option<Arc<dyn PushChannel>>,
    poll: PollConfig,
    sync: SyncConfig,
}

impl std::fmt::Debug for MetadataSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataSynchronizer")
            .field("push", &self.push_channel.is_some())
            .field("poll", &self.poll)
            .field("sync", &self.sync)
            .finish()
    }
}

impl MetadataSynchronizer {
    pub fn new(
        push_channel: Option<Arc<dyn PushChannel>>,
        poll: PollConfig,
        sync: SyncConfig,
    ) -> Self {
        Self {
            push_channel,
            poll,
            sync,
        }
    }

    /// Build from `CoreConfig`, honoring the push feature flag.
    pub fn from_config(config: &CoreConfig, poll: PollConfig) -> Self {
        let push_channel = if config.features.enable_push_channel {
            config.push_channel.clone()
        } else {
            None
        };
        Self::new(push_channel, poll, config.sync)
    }

    pub fn poll_config(&self) -> &PollConfig {
        &self.poll
    }

    /// Run until the entity reaches a terminal state.
    ///
    /// `on_progress` is invoked for every progress update the reconciler
    /// accepts, in order. Cancelling `cancel` ends the run with
    /// `SyncError::Cancelled` and drops both channels.
    #[instrument(skip_all, fields(topic = %source.topic()))]
    pub async fn run<S, F>(
        &self,
        source: &S,
        on_progress: F,
        cancel: &CancellationToken,
    ) -> Result<S::Output>
    where
        S: SyncSource + ?Sized,
        F: Fn(SyncProgress) + Send + Sync,
    {
        let reconciler = Reconciler::new();
        let poll_immediately = self.push_channel.is_none() || self.sync.poll_alongside_push;
        let (start_polling, polling_gate) = watch::channel(poll_immediately);

        let mut push =
            std::pin::pin!(self.push_loop(source, &reconciler, &on_progress, start_polling));
        let mut poll =
            std::pin::pin!(self.poll_loop(source, &reconciler, &on_progress, polling_gate));
        let mut push_running = true;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Synchronization cancelled");
                    return Err(SyncError::Cancelled);
                }
                outcome = &mut push, if push_running => match outcome {
                    Some(result) => return result,
                    None => push_running = false,
                },
                outcome = &mut poll => return outcome,
            }
        }
    }

    /// [`run`](Self::run) with an async progress handler.
    ///
    /// Progress is handled in arrival order, and everything accepted before
    /// the terminal update is handled before this returns.
    pub async fn run_with<S, A, Fut>(
        &self,
        source: &S,
        mut on_progress: A,
        cancel: &CancellationToken,
    ) -> Result<S::Output>
    where
        S: SyncSource + ?Sized,
        A: FnMut(SyncProgress) -> Fut,
        Fut: Future<Output = ()>,
    {
        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
        let run = self.run(
            source,
            move |progress| {
                progress_tx.send(progress).ok();
            },
            cancel,
        );
        tokio::pin!(run);

        let result = loop {
            tokio::select! {
                result = &mut run => break result,
                Some(progress) = progress_rx.recv() => on_progress(progress).await,
            }
        };
        while let Ok(progress) = progress_rx.try_recv() {
            on_progress(progress).await;
        }
        result
    }

    /// Returns `Some` on a terminal push update, `None` once the channel is
    /// gone (polling has been enabled by then).
    async fn push_loop<S, F>(
        &self,
        source: &S,
        reconciler: &Reconciler,
        on_progress: &F,
        start_polling: watch::Sender<bool>,
    ) -> Option<Result<S::Output>>
    where
        S: SyncSource + ?Sized,
        F: Fn(SyncProgress) + Send + Sync,
    {
        let channel = self.push_channel.as_ref()?;
        let topic = source.topic();

        let mut subscription = match channel.subscribe(&topic).await {
            Ok(subscription) => subscription,
            Err(e) => {
                warn!(error = %e, "Push subscribe failed, polling instead");
                start_polling.send_replace(true);
                return None;
            }
        };

        if let Err(e) = subscription.send(json!({ "action": "status" })) {
            debug!(error = %e, "Could not request initial status over push");
        }

        loop {
            match subscription.next().await {
                Some(Ok(frame)) => {
                    let ticket = reconciler.issue();
                    let Some(update) = source.decode(&frame) else {
                        debug!("Ignoring push frame without state");
                        continue;
                    };
                    if let Some(result) =
                        settle(reconciler, ticket, update, on_progress, Source::Push)
                    {
                        return Some(result);
                    }
                }
                Some(Err(e)) => {
                    warn!(error = %e, "Push channel failed, polling instead");
                    start_polling.send_replace(true);
                    return None;
                }
                None => {
                    info!("Push channel closed by server");
                    start_polling.send_replace(true);
                    return None;
                }
            }
        }
    }

    async fn poll_loop<S, F>(
        &self,
        source: &S,
        reconciler: &Reconciler,
        on_progress: &F,
        mut polling_gate: watch::Receiver<bool>,
    ) -> Result<S::Output>
    where
        S: SyncSource + ?Sized,
        F: Fn(SyncProgress) + Send + Sync,
    {
        let gate_open = polling_gate.wait_for(|start| *start).await.is_ok();
        if !gate_open {
            debug!("Push loop ended without enabling polling");
        }

        let mut attempts = 0u32;
        let mut consecutive_errors = 0u32;

        loop {
            attempts += 1;
            let ticket = reconciler.issue();

            match source.poll().await {
                Ok(update) => {
                    consecutive_errors = 0;
                    if let Some(result) =
                        settle(reconciler, ticket, update, on_progress, Source::Poll)
                    {
                        return result;
                    }
                }
                Err(PollFailure::Terminal(message)) => {
                    if let Some(result) = settle(
                        reconciler,
                        ticket,
                        SyncUpdate::Failed(message),
                        on_progress,
                        Source::Poll,
                    ) {
                        return result;
                    }
                }
                Err(PollFailure::Transient(message)) => {
                    consecutive_errors += 1;
                    warn!(
                        attempt = attempts,
                        consecutive_errors,
                        error = %message,
                        "Poll failed"
                    );
                    if consecutive_errors >= self.poll.error_threshold {
                        reconciler.latch();
                        return Err(SyncError::Unreachable {
                            failures: consecutive_errors,
                            last_error: message,
                        });
                    }
                }
            }

            if attempts >= self.poll.max_attempts {
                warn!(attempts, "Poll attempt ceiling reached");
                reconciler.latch();
                return Err(SyncError::Timeout { attempts });
            }

            sleep(self.poll.delay_after(consecutive_errors)).await;
        }
    }
}

fn settle<T, F>(
    reconciler: &Reconciler,
    ticket: Ticket,
    update: SyncUpdate<T>,
    on_progress: &F,
    source: Source,
) -> Option<Result<T>>
where
    F: Fn(SyncProgress),
{
    match reconciler.apply(ticket, update) {
        Decision::Progress(progress) => {
            on_progress(progress);
            None
        }
        Decision::Ready(value) => {
            debug!(?source, "Entity ready");
            Some(Ok(value))
        }
        Decision::Failed(message) => {
            debug!(?source, %message, "Entity failed");
            Some(Err(SyncError::Failed(message)))
        }
        Decision::Stale => {
            debug!(?source, ticket = ticket.value(), "Dropped stale update");
            None
        }
        Decision::Latched => None,
    }
}
