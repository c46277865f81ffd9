//! Long-lived liquidation ingestion with reconnection and cancellation.
//!
//! State machine:
//!
//! ```text
//! Connecting --first batch--> Streaming --transport drop--> Disconnected
//!     ^                                                          |
//!     +-------------------------- backoff elapsed ---------------+
//!
//! any state --cancel | subscription rejected | fatal | budget spent--> Faulted
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use futures_util::StreamExt;
use futures_util::stream::{self, BoxStream};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::{ConnectorError, IngestError};
use crate::market::connector::{ExchangeConnector, LiquidationSubscription};
use crate::market::market_data::LiquidationBatch;
use crate::market::streams::LiquidationStream;
use crate::streaming::reconnect::{ReconnectConfig, ReconnectPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestorState {
    Connecting,
    Streaming,
    Disconnected,
    /// Terminal. Reached on cancellation or an unrecoverable error.
    Faulted,
}

impl fmt::Display for IngestorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Streaming => "streaming",
            Self::Disconnected => "disconnected",
            Self::Faulted => "faulted",
        };
        f.write_str(name)
    }
}

/// Observes and cancels a running ingestor from another task.
#[derive(Debug, Clone)]
pub struct IngestorHandle {
    state: watch::Receiver<IngestorState>,
    reconnects: Arc<AtomicU32>,
    cancel: CancellationToken,
}

impl IngestorHandle {
    pub fn state(&self) -> IngestorState {
        *self.state.borrow()
    }

    /// A receiver notified on every state transition.
    pub fn watch(&self) -> watch::Receiver<IngestorState> {
        self.state.clone()
    }

    /// Streaming -> Connecting transitions so far.
    pub fn reconnects(&self) -> u32 {
        self.reconnects.load(Ordering::Relaxed)
    }

    /// Ends the stream within one receive cycle. Idempotent.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the ingestor reaches `target`, or stops if it faults.
    pub async fn wait_for(&mut self, target: IngestorState) -> IngestorState {
        match self
            .state
            .wait_for(|state| *state == target || *state == IngestorState::Faulted)
            .await
        {
            Ok(state) => *state,
            Err(_) => IngestorState::Faulted,
        }
    }
}

/// Subscribes to one venue's liquidation feed and keeps it alive.
pub struct LiquidationIngestor {
    connector: Arc<dyn ExchangeConnector>,
    stream: LiquidationStream,
    reconnect: ReconnectConfig,
    cancel: CancellationToken,
    state: watch::Sender<IngestorState>,
    reconnects: Arc<AtomicU32>,
}

impl LiquidationIngestor {
    pub fn new(connector: Arc<dyn ExchangeConnector>, stream: LiquidationStream, reconnect: ReconnectConfig) -> Self {
        let (state, _) = watch::channel(IngestorState::Connecting);
        Self {
            connector,
            stream,
            reconnect,
            cancel: CancellationToken::new(),
            state,
            reconnects: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Ties the ingestor to an outer shutdown token.
    pub fn with_cancellation(mut self, parent: &CancellationToken) -> Self {
        self.cancel = parent.child_token();
        self
    }

    pub fn handle(&self) -> IngestorHandle {
        IngestorHandle {
            state: self.state.subscribe(),
            reconnects: Arc::clone(&self.reconnects),
            cancel: self.cancel.clone(),
        }
    }

    /// Starts ingesting. Every item is an ordered, possibly empty batch.
    ///
    /// Transport drops are absorbed by reconnecting with backoff. A terminal
    /// fault is yielded once as `Err`, then the stream ends. Cancellation
    /// ends the stream without an error item. The subscription is closed
    /// exactly once on every exit path, including dropping the stream.
    pub fn stream(self) -> BoxStream<'static, Result<LiquidationBatch, IngestError>> {
        let session = Session {
            policy: ReconnectPolicy::new(self.reconnect),
            connector: self.connector,
            stream: self.stream,
            cancel: self.cancel,
            state: self.state,
            reconnects: self.reconnects,
            subscription: None,
            done: false,
        };

        stream::unfold(session, |mut session| async move {
            let item = session.next_item().await?;
            Some((item, session))
        })
        .boxed()
    }
}

enum Interrupt {
    Cancelled,
    Fault(IngestError),
}

struct Session {
    connector: Arc<dyn ExchangeConnector>,
    stream: LiquidationStream,
    cancel: CancellationToken,
    state: watch::Sender<IngestorState>,
    reconnects: Arc<AtomicU32>,
    policy: ReconnectPolicy,
    subscription: Option<Box<dyn LiquidationSubscription>>,
    done: bool,
}

impl Session {
    async fn next_item(&mut self) -> Option<Result<LiquidationBatch, IngestError>> {
        if self.done {
            return None;
        }

        loop {
            if self.subscription.is_none() {
                match self.connect().await {
                    Ok(subscription) => self.subscription = Some(subscription),
                    Err(interrupt) => return self.finish(interrupt).await,
                }
            }
            let Some(subscription) = self.subscription.as_mut() else {
                continue;
            };

            let received = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                result = subscription.next_batch() => Some(result),
            };

            match received {
                None => return self.finish(Interrupt::Cancelled).await,
                Some(Ok(batch)) => {
                    if *self.state.borrow() != IngestorState::Streaming {
                        self.set_state(IngestorState::Streaming);
                        self.policy.reset();
                    }
                    return Some(Ok(batch));
                }
                Some(Err(err)) if err.is_recoverable() => {
                    tracing::warn!(venue = self.connector.venue(), error = %err, "liquidation feed dropped");
                    let was_streaming = *self.state.borrow() == IngestorState::Streaming;
                    self.release().await;
                    self.set_state(IngestorState::Disconnected);
                    if was_streaming {
                        self.reconnects.fetch_add(1, Ordering::Relaxed);
                    }
                    if let Err(interrupt) = self.backoff().await {
                        return self.finish(interrupt).await;
                    }
                }
                Some(Err(err)) => {
                    let fault = IngestError::from_connector(self.connector.venue(), err);
                    return self.finish(Interrupt::Fault(fault)).await;
                }
            }
        }
    }

    /// Subscribes, retrying transport failures under the backoff policy.
    async fn connect(&mut self) -> Result<Box<dyn LiquidationSubscription>, Interrupt> {
        loop {
            self.set_state(IngestorState::Connecting);
            let attempt = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(Interrupt::Cancelled),
                result = self.connector.subscribe_liquidations(&self.stream) => result,
            };

            match attempt {
                Ok(subscription) => {
                    tracing::info!(venue = self.connector.venue(), stream = ?self.stream, "liquidation feed subscribed");
                    return Ok(subscription);
                }
                Err(err @ ConnectorError::Transport(_)) => {
                    tracing::warn!(venue = self.connector.venue(), error = %err, "subscribe failed, retrying");
                    self.backoff().await?;
                }
                Err(err) => return Err(Interrupt::Fault(IngestError::from_connector(self.connector.venue(), err))),
            }
        }
    }

    async fn backoff(&mut self) -> Result<(), Interrupt> {
        let Some(delay) = self.policy.next_delay() else {
            return Err(Interrupt::Fault(IngestError::ReconnectExhausted {
                venue: self.connector.venue().to_string(),
                attempts: self.policy.attempts(),
            }));
        };
        tracing::info!(
            venue = self.connector.venue(),
            attempt = self.policy.attempts(),
            delay_ms = delay.as_millis() as u64,
            "reconnecting after backoff"
        );

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Interrupt::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }

    async fn finish(&mut self, interrupt: Interrupt) -> Option<Result<LiquidationBatch, IngestError>> {
        self.release().await;
        self.set_state(IngestorState::Faulted);
        self.done = true;
        match interrupt {
            Interrupt::Cancelled => {
                tracing::info!(venue = self.connector.venue(), "liquidation ingestor cancelled");
                None
            }
            Interrupt::Fault(err) => {
                tracing::error!(venue = self.connector.venue(), error = %err, "liquidation ingestor faulted");
                Some(Err(err))
            }
        }
    }

    async fn release(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            subscription.close().await;
        }
    }

    /// Publishes `next` only when it differs, so watchers see transitions.
    fn set_state(&self, next: IngestorState) {
        let mut previous = next;
        let changed = self.state.send_if_modified(|state| {
            previous = std::mem::replace(state, next);
            previous != next
        });
        if changed {
            tracing::debug!(venue = self.connector.venue(), from = %previous, to = %next, "ingestor state");
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.set_state(IngestorState::Faulted);
        let Some(mut subscription) = self.subscription.take() else {
            return;
        };
        // Stream dropped mid-feed; close on the runtime if one is still around.
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                subscription.close().await;
            });
        }
    }
}
