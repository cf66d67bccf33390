//! PollPaymentHandler - waits for a payment on behalf of a client.
//!
//! A [`PollingSession`] asks the status resolver on a fixed interval until
//! the payment is paid, the deadline passes, or the session is cancelled.
//! Cancelling (explicitly, or by dropping the session when the client goes
//! away) stops polling at once and releases the pending seat it was waiting
//! for, if any. A passed deadline ends in `Expired`, never in endless polling.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::{CancellationToken, DropGuard};

use super::{
    CancelPendingSeatCommand, CancelPendingSeatHandler, PaymentStatusView, ResolveStatusHandler,
    StatusQuery,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub deadline: Duration,
}

#[derive(Debug, Clone)]
pub struct PollPaymentCommand {
    pub query: StatusQuery,
    /// Pending seat to release if the session is cancelled.
    pub pending_seat: Option<CancelPendingSeatCommand>,
    /// Overrides the configured deadline.
    pub deadline: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PollState {
    Pending { attempts: u32 },
    Paid { status: PaymentStatusView },
    /// The payment window closed without a payment.
    Expired { attempts: u32 },
    Cancelled,
}

impl PollState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PollState::Pending { .. })
    }
}

pub struct PollPaymentHandler {
    resolver: Arc<ResolveStatusHandler>,
    cancel_pending: Arc<CancelPendingSeatHandler>,
    config: PollConfig,
}

impl PollPaymentHandler {
    pub fn new(
        resolver: Arc<ResolveStatusHandler>,
        cancel_pending: Arc<CancelPendingSeatHandler>,
        config: PollConfig,
    ) -> Self {
        Self {
            resolver,
            cancel_pending,
            config,
        }
    }

    /// Starts a session. Polling begins immediately on a background task.
    pub fn start(&self, cmd: PollPaymentCommand) -> PollingSession {
        let config = PollConfig {
            deadline: cmd.deadline.unwrap_or(self.config.deadline),
            ..self.config
        };
        let cancel = CancellationToken::new();
        let (tx, rx) = watch::channel(PollState::Pending { attempts: 0 });

        let task = tokio::spawn(run(
            self.resolver.clone(),
            self.cancel_pending.clone(),
            cmd,
            config,
            cancel.clone(),
            tx,
        ));

        PollingSession {
            state: rx,
            guard: cancel.clone().drop_guard(),
            cancel,
            task,
        }
    }
}

/// Handle on a running poll. Dropping it cancels the poll.
pub struct PollingSession {
    state: watch::Receiver<PollState>,
    cancel: CancellationToken,
    guard: DropGuard,
    task: JoinHandle<PollState>,
}

impl PollingSession {
    pub fn state(&self) -> PollState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PollState> {
        self.state.clone()
    }

    /// Stops polling and releases the pending seat.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Waits for the terminal state.
    pub async fn finished(self) -> PollState {
        let PollingSession { task, guard, .. } = self;
        let outcome = task.await;
        guard.disarm();
        match outcome {
            Ok(state) => state,
            Err(e) => {
                tracing::error!(error = %e, "Polling task failed");
                PollState::Cancelled
            }
        }
    }
}

async fn run(
    resolver: Arc<ResolveStatusHandler>,
    cancel_pending: Arc<CancelPendingSeatHandler>,
    cmd: PollPaymentCommand,
    config: PollConfig,
    cancel: CancellationToken,
    tx: watch::Sender<PollState>,
) -> PollState {
    let deadline = tokio::time::sleep(config.deadline);
    tokio::pin!(deadline);
    let mut ticker = tokio::time::interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut attempts: u32 = 0;

    let terminal = loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break PollState::Cancelled,
            _ = &mut deadline => break PollState::Expired { attempts },
            _ = ticker.tick() => {}
        }

        attempts += 1;
        let answer = tokio::select! {
            biased;
            _ = cancel.cancelled() => break PollState::Cancelled,
            _ = &mut deadline => break PollState::Expired { attempts },
            answer = resolver.handle(cmd.query.clone()) => answer,
        };

        match answer {
            Ok(view) if view.is_paid => break PollState::Paid { status: view },
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(
                    reference = %cmd.query.reference(),
                    attempts,
                    error = %e,
                    "Payment not resolvable yet"
                );
            }
        }
        tx.send_replace(PollState::Pending { attempts });
    };

    if terminal == PollState::Cancelled {
        if let Some(pending) = cmd.pending_seat {
            if let Err(e) = cancel_pending.handle(pending).await {
                tracing::warn!(error = %e, "Pending seat cleanup after cancelled poll failed");
            }
        }
    }

    tracing::info!(
        reference = %cmd.query.reference(),
        attempts,
        state = ?terminal,
        "Payment poll finished"
    );
    tx.send_replace(terminal.clone());
    terminal
}
