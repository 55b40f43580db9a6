//! Inactivity monitor: the shutdown state machine.
//!
//! A fixed-interval poll loop asks the command channel for the player list,
//! tracks connectivity and player count, and owns a cancellable two-stage
//! shutdown sequence: a warning broadcast 60 seconds before the end of the
//! idle window, then save + shutdown when the window expires. Players
//! rejoining or the server becoming unreachable cancels the pending pair.
//!
//! Every piece of monitor state lives behind one `tokio::sync::Mutex`. The
//! warn and commit tasks re-check that their sequence is still the active
//! one *under that lock* and keep holding it across their single rcon call,
//! while cancellation aborts their join handles under the same lock. A
//! cancellation therefore lands either before the check (the task never
//! acts) or after the action completed (the action finishes exactly once) —
//! there is no window in which a cancelled sequence can still warn or shut
//! the server down.

use crate::bus::EventBus;
use crate::config::{MonitorConfig, WARN_OFFSET};
use crate::rcon::CommandChannel;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Reachability of the game server, as last observed by the poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Connectivity {
    /// No poll has completed yet.
    Unknown,
    Online,
    Offline,
}

/// The warn/commit pair of one shutdown sequence. Always created and
/// cancelled together.
struct ShutdownSequence {
    generation: u64,
    warn: JoinHandle<()>,
    commit: JoinHandle<()>,
}

impl ShutdownSequence {
    fn abort(&self) {
        self.warn.abort();
        self.commit.abort();
    }
}

/// Mutable monitor state. All access goes through the monitor's mutex.
struct MonitorState {
    connectivity: Connectivity,
    last_player_count: usize,
    next_generation: u64,
    sequence: Option<ShutdownSequence>,
}

impl MonitorState {
    fn new() -> Self {
        Self {
            connectivity: Connectivity::Unknown,
            last_player_count: 0,
            next_generation: 0,
            sequence: None,
        }
    }

    /// Is `generation` still the pending sequence? Scheduled tasks call this
    /// under the lock before performing their externally visible action.
    fn is_active(&self, generation: u64) -> bool {
        self.sequence
            .as_ref()
            .is_some_and(|seq| seq.generation == generation)
    }

    /// Cancel the pending sequence, if any. Returns whether one was pending.
    ///
    /// Aborting under the lock is what makes this safe: a task that already
    /// passed its `is_active` check is holding the lock, so we cannot reach
    /// this line until its action has completed.
    fn cancel_sequence(&mut self) -> bool {
        match self.sequence.take() {
            Some(seq) => {
                seq.abort();
                true
            }
            None => false,
        }
    }

    /// Clear the sequence after its commit task ran, without touching a
    /// newer sequence that may have replaced it.
    fn finish_sequence(&mut self, generation: u64) {
        if self.is_active(generation) {
            self.sequence = None;
        }
    }
}

/// The inactivity monitor. Construct once, then [`run`](Self::run) it under
/// a [`CancellationToken`]; it stops only when the token is cancelled.
pub struct Monitor {
    channel: Arc<dyn CommandChannel>,
    bus: Arc<EventBus>,
    watch_interval: Duration,
    shutdown_timeout: Duration,
    shutdown_grace_secs: u32,
    shutdown_reason: String,
    state: Mutex<MonitorState>,
}

impl Monitor {
    pub fn new(
        channel: Arc<dyn CommandChannel>,
        bus: Arc<EventBus>,
        config: &MonitorConfig,
    ) -> Self {
        Self {
            channel,
            bus,
            watch_interval: config.watch_interval(),
            shutdown_timeout: config.shutdown_timeout(),
            shutdown_grace_secs: config.shutdown_grace_secs,
            shutdown_reason: config.shutdown_reason.clone(),
            state: Mutex::new(MonitorState::new()),
        }
    }

    /// Run the poll loop until `token` is cancelled.
    ///
    /// Command channel failures are never fatal here; they only flip the
    /// connectivity state and cancel a pending sequence.
    pub async fn run(self: Arc<Self>, token: CancellationToken) {
        info!(
            watch_interval_secs = self.watch_interval.as_secs(),
            shutdown_timeout_secs = self.shutdown_timeout.as_secs(),
            "Inactivity monitor started"
        );
        if self.shutdown_timeout <= WARN_OFFSET {
            warn!(
                "shutdown_timeout is not longer than the 60s warn offset; \
                 the shutdown warning will broadcast immediately"
            );
        }

        let mut interval = tokio::time::interval(self.watch_interval);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = interval.tick() => {}
            }
            self.poll().await;
        }

        // Leave no timers behind on the way out.
        if self.state.lock().await.cancel_sequence() {
            info!("Monitor stopping, pending shutdown cancelled");
        }
        info!("Inactivity monitor stopped");
    }

    /// One poll cycle: fetch the player list and apply it to the state.
    async fn poll(self: &Arc<Self>) {
        // The rcon call runs without the lock; only applying the result
        // needs serialization.
        match self.channel.get_players().await {
            Err(error) => {
                let mut state = self.state.lock().await;
                if state.connectivity != Connectivity::Offline {
                    warn!(
                        code = error.error_code(),
                        %error,
                        "Unable to reach server, waiting for it to come back"
                    );
                    state.connectivity = Connectivity::Offline;
                }
                // An unreachable server is an undefined state: never let a
                // pending shutdown fire against it.
                if state.cancel_sequence() {
                    info!("Server went offline, pending shutdown cancelled");
                }
            }
            Ok(players) => {
                let count = players.len();
                let mut state = self.state.lock().await;
                if state.connectivity == Connectivity::Offline {
                    info!("Server is back online");
                }
                state.connectivity = Connectivity::Online;

                let changed = count != state.last_player_count;
                if changed {
                    state.last_player_count = count;
                    info!(count, "Player count changed");
                    self.bus.player_count_changed.publish(count);
                }

                if count > 0 {
                    if state.cancel_sequence() {
                        info!("Players returned, pending shutdown cancelled");
                    }
                } else if state.sequence.is_none() {
                    // A fresh sequence is always accompanied by a zero-count
                    // event, but a single cycle never publishes it twice.
                    if !changed {
                        self.bus.player_count_changed.publish(0);
                    }
                    self.start_sequence(&mut state);
                }
            }
        }
    }

    /// Schedule the warn/commit pair, anchored to now. Caller holds the lock
    /// and has verified no sequence is pending.
    fn start_sequence(self: &Arc<Self>, state: &mut MonitorState) {
        let generation = state.next_generation;
        state.next_generation += 1;

        info!(
            timeout_secs = self.shutdown_timeout.as_secs(),
            "No players online, shutting down server when the idle window expires"
        );

        let warn_delay = self.shutdown_timeout.saturating_sub(WARN_OFFSET);
        let warn = {
            let monitor = Arc::clone(self);
            tokio::spawn(async move { monitor.warn_task(generation, warn_delay).await })
        };
        let commit = {
            let monitor = Arc::clone(self);
            let delay = self.shutdown_timeout;
            tokio::spawn(async move { monitor.commit_task(generation, delay).await })
        };

        state.sequence = Some(ShutdownSequence {
            generation,
            warn,
            commit,
        });
    }

    /// Warn stage: broadcast the shutdown warning unless the sequence was
    /// cancelled first.
    async fn warn_task(self: Arc<Self>, generation: u64, delay: Duration) {
        tokio::time::sleep(delay).await;

        let state = self.state.lock().await;
        if !state.is_active(generation) {
            return;
        }
        let remaining = self.shutdown_timeout.min(WARN_OFFSET);
        info!(
            remaining_secs = remaining.as_secs(),
            "Broadcasting shutdown warning"
        );
        // Holding the lock across the call: once the warning is in flight,
        // cancellation waits for it instead of interrupting it.
        if let Err(error) = self.channel.broadcast("server_shutdown_warning").await {
            warn!(code = error.error_code(), %error, "Failed to broadcast shutdown warning");
        }
        drop(state);
    }

    /// Commit stage: save, shut down, publish `auto_shutdown`. The sub-state
    /// resets on every exit path so a later cycle can retry cleanly.
    async fn commit_task(self: Arc<Self>, generation: u64, delay: Duration) {
        tokio::time::sleep(delay).await;

        let mut state = self.state.lock().await;
        if !state.is_active(generation) {
            return;
        }
        info!("Idle window expired, saving and shutting down server");
        match self.channel.save().await {
            Ok(()) => {
                match self
                    .channel
                    .shutdown(self.shutdown_grace_secs, &self.shutdown_reason)
                    .await
                {
                    Ok(()) => self.bus.auto_shutdown.publish(()),
                    Err(error) => {
                        warn!(code = error.error_code(), %error, "Shutdown command failed")
                    }
                }
            }
            // Without a save we do not shut down; the next all-idle cycle
            // starts a fresh sequence and retries.
            Err(error) => warn!(code = error.error_code(), %error, "Save failed, shutdown skipped"),
        }
        state.finish_sequence(generation);
    }
}
