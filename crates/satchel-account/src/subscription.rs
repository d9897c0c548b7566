//! Live transaction feed over a shared pub/sub channel.
//!
//! One [`SubscriptionManager`] owns one channel topic. Each subscription is
//! a forwarder task reading a bounded mpsc channel that the transport
//! writes into; the task normalizes every message into a [`TxEvent`] and
//! hands it to the caller's handler. Stopping the task is unsubscribing.
//!
//! Lifecycle per id: `Unsubscribed -> Subscribing -> Active -> Unsubscribed`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use satchel_core::chain::AccountVariant;
use satchel_core::error::{PathError, TransportError};
use satchel_core::path::AccountPath;
use satchel_core::traits::Transport;
use satchel_core::types::{LedgerTx, SubscriptionFilter};

use crate::error::EngineError;
use crate::events::TxEvent;

/// Receives every normalized event, in transport order.
pub type MessageHandler = Arc<dyn Fn(TxEvent) + Send + Sync>;

/// Receives transport failures. Never retried.
pub type ErrorHandler = Arc<dyn Fn(TransportError) + Send + Sync>;

/// Stable id for an account root and variant, e.g. `m/84'/0'/0'/p2wpkh`.
pub fn subscription_id(path: &AccountPath, variant: AccountVariant) -> Result<String, PathError> {
    Ok(format!("{}/{}", path.root()?, variant.label()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionState {
    Unsubscribed,
    Subscribing,
    Active,
}

struct Subscription {
    filter: SubscriptionFilter,
    state: SubscriptionState,
    /// Distinguishes this registration from a later one under the same id.
    generation: u64,
    stop: Option<oneshot::Sender<()>>,
    forwarder: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Signal the forwarder and wait for it to exit.
    async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(forwarder) = self.forwarder.take() {
            let _ = forwarder.await;
        }
    }
}

#[derive(Default)]
struct Inner {
    open: bool,
    next_generation: u64,
    subscriptions: HashMap<String, Subscription>,
}

/// Subscription bookkeeping for one engine instance.
///
/// The bookkeeping lock is never held across a transport call, so a slow
/// transport does not block [`state`](Self::state) or [`close`](Self::close).
pub struct SubscriptionManager {
    transport: Arc<dyn Transport>,
    topic: String,
    buffer: usize,
    inner: Mutex<Inner>,
    /// Serializes `subscribe` calls with each other.
    setup: Mutex<()>,
}

impl SubscriptionManager {
    pub fn new(transport: Arc<dyn Transport>, topic: impl Into<String>, buffer: usize) -> Self {
        Self {
            transport,
            topic: topic.into(),
            buffer: buffer.max(1),
            inner: Mutex::new(Inner::default()),
            setup: Mutex::new(()),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Register `id` for `addresses`, replacing any subscription with the same id.
    ///
    /// A replaced subscription is fully torn down, transport registration
    /// included, before the new one is set up. The shared channel is opened
    /// if it is closed. Setup failures are passed to `on_error` and also
    /// returned, and leave `id` unsubscribed.
    pub async fn subscribe(
        &self,
        id: &str,
        addresses: Vec<String>,
        on_message: MessageHandler,
        on_error: ErrorHandler,
    ) -> Result<(), EngineError> {
        let _setup = self.setup.lock().await;
        let filter = SubscriptionFilter {
            topic: self.topic.clone(),
            addresses,
        };

        let (previous, generation) = {
            let mut inner = self.inner.lock().await;
            inner.next_generation += 1;
            let generation = inner.next_generation;
            let pending = Subscription {
                filter: filter.clone(),
                state: SubscriptionState::Subscribing,
                generation,
                stop: None,
                forwarder: None,
            };
            (inner.subscriptions.insert(id.to_string(), pending), generation)
        };

        if let Some(previous) = previous {
            debug!(%id, "replacing subscription");
            let old_filter = previous.filter.clone();
            previous.stop().await;
            if let Err(e) = self.transport.unsubscribe(id, &old_filter).await {
                warn!(%id, error = %e, "transport unsubscribe of replaced subscription failed");
            }
        }

        if let Err(e) = self.ensure_open().await {
            self.discard(id, generation).await;
            on_error(e.clone());
            return Err(e.into());
        }

        let (feed, rx) = mpsc::channel(self.buffer);
        if let Err(e) = self.transport.subscribe(id, &filter, feed).await {
            self.discard(id, generation).await;
            warn!(%id, error = %e, "subscribe failed");
            on_error(e.clone());
            return Err(e.into());
        }

        {
            let mut inner = self.inner.lock().await;
            if let Some(sub) = inner
                .subscriptions
                .get_mut(id)
                .filter(|s| s.generation == generation)
            {
                let (stop_tx, stop_rx) = oneshot::channel();
                let own: HashSet<String> = filter.addresses.iter().cloned().collect();
                sub.forwarder = Some(tokio::spawn(forward(
                    id.to_string(),
                    rx,
                    stop_rx,
                    own,
                    on_message,
                    on_error,
                )));
                sub.stop = Some(stop_tx);
                sub.state = SubscriptionState::Active;
                info!(%id, addresses = filter.addresses.len(), "subscription active");
                return Ok(());
            }
        }

        // Unsubscribed or closed while the transport call ran.
        let _ = self.transport.unsubscribe(id, &filter).await;
        let e = TransportError::ConnectionClosed(format!("subscription {id} was cancelled"));
        debug!(%id, "subscription cancelled during setup");
        on_error(e.clone());
        Err(e.into())
    }

    async fn ensure_open(&self) -> Result<(), TransportError> {
        if self.inner.lock().await.open {
            return Ok(());
        }
        if let Err(e) = self.transport.open(&self.topic).await {
            warn!(topic = %self.topic, error = %e, "failed to open channel");
            return Err(e);
        }
        self.inner.lock().await.open = true;
        info!(topic = %self.topic, "opened channel");
        Ok(())
    }

    /// Drop the pending entry for `id` if it is still the one from `generation`.
    async fn discard(&self, id: &str, generation: u64) {
        let mut inner = self.inner.lock().await;
        if inner
            .subscriptions
            .get(id)
            .is_some_and(|s| s.generation == generation)
        {
            inner.subscriptions.remove(id);
        }
    }

    /// Tear down one subscription, or every subscription when `id` is `None`.
    ///
    /// Unknown ids are a no-op. The channel stays open.
    pub async fn unsubscribe(&self, id: Option<&str>) -> Result<(), EngineError> {
        let removed: Vec<(String, Subscription)> = {
            let mut inner = self.inner.lock().await;
            match id {
                Some(id) => inner.subscriptions.remove_entry(id).into_iter().collect(),
                None => inner.subscriptions.drain().collect(),
            }
        };

        let mut first_error = None;
        for (id, sub) in removed {
            let filter = sub.filter.clone();
            sub.stop().await;
            if let Err(e) = self.transport.unsubscribe(&id, &filter).await {
                warn!(%id, error = %e, "transport unsubscribe failed");
                first_error.get_or_insert(e);
            } else {
                debug!(%id, "unsubscribed");
            }
        }
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// Stop every forwarder and close the shared channel.
    ///
    /// A later [`subscribe`](Self::subscribe) reopens it.
    pub async fn close(&self) -> Result<(), EngineError> {
        let (removed, was_open) = {
            let mut inner = self.inner.lock().await;
            let removed: Vec<Subscription> =
                inner.subscriptions.drain().map(|(_, sub)| sub).collect();
            (removed, std::mem::replace(&mut inner.open, false))
        };
        for sub in removed {
            sub.stop().await;
        }
        if was_open {
            self.transport.close(&self.topic).await?;
            info!(topic = %self.topic, "closed channel");
        }
        Ok(())
    }

    pub async fn state(&self, id: &str) -> SubscriptionState {
        self.inner
            .lock()
            .await
            .subscriptions
            .get(id)
            .map_or(SubscriptionState::Unsubscribed, |s| s.state)
    }

    pub async fn is_open(&self) -> bool {
        self.inner.lock().await.open
    }

    /// Ids of current subscriptions, sorted.
    pub async fn active_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.lock().await.subscriptions.keys().cloned().collect();
        ids.sort();
        ids
    }
}

async fn forward(
    id: String,
    mut rx: mpsc::Receiver<Result<LedgerTx, TransportError>>,
    mut stop: oneshot::Receiver<()>,
    own: HashSet<String>,
    on_message: MessageHandler,
    on_error: ErrorHandler,
) {
    loop {
        tokio::select! {
            biased;
            _ = &mut stop => break,
            msg = rx.recv() => match msg {
                Some(Ok(tx)) => match TxEvent::from_ledger(&tx, &own) {
                    Ok(event) => on_message(event),
                    Err(e) => on_error(TransportError::Protocol(format!("{}: {e}", tx.txid))),
                },
                Some(Err(e)) => on_error(e),
                None => break,
            },
        }
    }
    debug!(%id, "forwarder stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;
    use satchel_core::types::LedgerTxIo;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::sync::Notify;
    use tokio::time::timeout;

    fn handlers() -> (
        MessageHandler,
        ErrorHandler,
        UnboundedReceiver<TxEvent>,
        UnboundedReceiver<TransportError>,
    ) {
        let (msg_tx, msg_rx) = mpsc::unbounded_channel();
        let (err_tx, err_rx) = mpsc::unbounded_channel();
        (
            Arc::new(move |e: TxEvent| {
                let _ = msg_tx.send(e);
            }),
            Arc::new(move |e: TransportError| {
                let _ = err_tx.send(e);
            }),
            msg_rx,
            err_rx,
        )
    }

    fn ledger_tx(to: &str, value: &str, confirmations: u64) -> LedgerTx {
        LedgerTx {
            txid: "ab".repeat(32),
            block_hash: None,
            block_height: None,
            timestamp: None,
            confirmations,
            fee: None,
            vin: vec![],
            vout: vec![LedgerTxIo {
                addresses: vec![to.into()],
                value: value.into(),
            }],
        }
    }

    fn manager(transport: &Arc<MockTransport>) -> SubscriptionManager {
        SubscriptionManager::new(transport.clone(), "txs", 8)
    }

    #[test]
    fn id_from_root_and_variant() {
        let path = AccountPath::new(84, 0, 0).with_address(true, 9);
        assert_eq!(
            subscription_id(&path, AccountVariant::NativeSegwit).unwrap(),
            "m/84'/0'/0'/p2wpkh"
        );
        let path = AccountPath::new(49, 2, 1);
        assert_eq!(
            subscription_id(&path, AccountVariant::WrappedSegwit).unwrap(),
            "m/49'/2'/1'/p2sh-p2wpkh"
        );
    }

    #[tokio::test]
    async fn subscribe_opens_channel_and_delivers_events() {
        let transport = Arc::new(MockTransport::default());
        let mgr = manager(&transport);
        let (on_msg, on_err, mut msgs, _errs) = handlers();

        mgr.subscribe("a", vec!["mine".into()], on_msg, on_err).await.unwrap();
        assert!(mgr.is_open().await);
        assert_eq!(mgr.state("a").await, SubscriptionState::Active);
        assert_eq!(transport.state.lock().unwrap().opens, 1);
        assert_eq!(transport.filter("a").unwrap().addresses, vec!["mine".to_string()]);

        assert!(transport.push("a", Ok(ledger_tx("mine", "1500", 0))).await);
        let event = timeout(Duration::from_secs(1), msgs.recv()).await.unwrap().unwrap();
        assert_eq!(event.transfers[0].value, 1_500);
        assert_eq!(event.status, crate::events::TxStatus::Pending);
    }

    #[tokio::test]
    async fn events_arrive_in_transport_order() {
        let transport = Arc::new(MockTransport::default());
        let mgr = manager(&transport);
        let (on_msg, on_err, mut msgs, _errs) = handlers();
        mgr.subscribe("a", vec!["mine".into()], on_msg, on_err).await.unwrap();

        for value in ["1", "2", "3"] {
            transport.push("a", Ok(ledger_tx("mine", value, 1))).await;
        }
        for expected in [1, 2, 3] {
            let event = timeout(Duration::from_secs(1), msgs.recv()).await.unwrap().unwrap();
            assert_eq!(event.transfers[0].value, expected);
        }
    }

    #[tokio::test]
    async fn transport_errors_go_to_error_handler() {
        let transport = Arc::new(MockTransport::default());
        let mgr = manager(&transport);
        let (on_msg, on_err, _msgs, mut errs) = handlers();
        mgr.subscribe("a", vec![], on_msg, on_err).await.unwrap();

        transport
            .push("a", Err(TransportError::ConnectionClosed("reset".into())))
            .await;
        let err = timeout(Duration::from_secs(1), errs.recv()).await.unwrap().unwrap();
        assert_eq!(err, TransportError::ConnectionClosed("reset".into()));
        assert_eq!(mgr.state("a").await, SubscriptionState::Active);
    }

    #[tokio::test]
    async fn malformed_message_is_reported() {
        let transport = Arc::new(MockTransport::default());
        let mgr = manager(&transport);
        let (on_msg, on_err, _msgs, mut errs) = handlers();
        mgr.subscribe("a", vec!["mine".into()], on_msg, on_err).await.unwrap();

        transport.push("a", Ok(ledger_tx("mine", "1.5", 1))).await;
        let err = timeout(Duration::from_secs(1), errs.recv()).await.unwrap().unwrap();
        assert!(matches!(err, TransportError::Protocol(_)));
    }

    #[tokio::test]
    async fn empty_address_set_is_active() {
        let transport = Arc::new(MockTransport::default());
        let mgr = manager(&transport);
        let (on_msg, on_err, _msgs, _errs) = handlers();
        mgr.subscribe("a", vec![], on_msg, on_err).await.unwrap();
        assert_eq!(mgr.state("a").await, SubscriptionState::Active);
        assert!(transport.filter("a").unwrap().addresses.is_empty());
    }

    #[tokio::test]
    async fn unsubscribe_is_idempotent() {
        let transport = Arc::new(MockTransport::default());
        let mgr = manager(&transport);
        let (on_msg, on_err, _msgs, _errs) = handlers();
        mgr.subscribe("a", vec![], on_msg, on_err).await.unwrap();

        mgr.unsubscribe(Some("a")).await.unwrap();
        assert_eq!(mgr.state("a").await, SubscriptionState::Unsubscribed);
        mgr.unsubscribe(Some("a")).await.unwrap();
        mgr.unsubscribe(Some("never-existed")).await.unwrap();
        assert_eq!(transport.state.lock().unwrap().unsubscribes, vec!["a".to_string()]);
        assert!(mgr.is_open().await);
    }

    #[tokio::test]
    async fn unsubscribe_all() {
        let transport = Arc::new(MockTransport::default());
        let mgr = manager(&transport);
        for id in ["a", "b", "c"] {
            let (on_msg, on_err, _msgs, _errs) = handlers();
            mgr.subscribe(id, vec![], on_msg, on_err).await.unwrap();
        }
        assert_eq!(mgr.active_ids().await, vec!["a", "b", "c"]);

        mgr.unsubscribe(None).await.unwrap();
        assert!(mgr.active_ids().await.is_empty());
        assert_eq!(transport.state.lock().unwrap().unsubscribes.len(), 3);
    }

    #[tokio::test]
    async fn resubscribe_replaces_previous() {
        let transport = Arc::new(MockTransport::default());
        let mgr = manager(&transport);
        let (on_msg1, on_err1, mut msgs1, _errs1) = handlers();
        let (on_msg2, on_err2, mut msgs2, _errs2) = handlers();

        mgr.subscribe("a", vec!["old".into()], on_msg1, on_err1).await.unwrap();
        mgr.subscribe("a", vec!["new".into()], on_msg2, on_err2).await.unwrap();
        assert_eq!(mgr.active_ids().await, vec!["a"]);
        assert_eq!(transport.state.lock().unwrap().opens, 1);

        transport.push("a", Ok(ledger_tx("new", "5", 1))).await;
        let event = timeout(Duration::from_secs(1), msgs2.recv()).await.unwrap().unwrap();
        assert_eq!(event.transfers[0].address, "new");
        // first forwarder has exited and dropped its handler
        assert!(msgs1.recv().await.is_none());
    }

    #[tokio::test]
    async fn close_stops_everything_and_reopens_on_subscribe() {
        let transport = Arc::new(MockTransport::default());
        let mgr = manager(&transport);
        let (on_msg, on_err, mut msgs, _errs) = handlers();
        mgr.subscribe("a", vec![], on_msg, on_err).await.unwrap();

        mgr.close().await.unwrap();
        assert!(!mgr.is_open().await);
        assert_eq!(mgr.state("a").await, SubscriptionState::Unsubscribed);
        assert!(msgs.recv().await.is_none());
        mgr.close().await.unwrap();
        assert_eq!(transport.state.lock().unwrap().closes, 1);

        let (on_msg, on_err, _msgs, _errs) = handlers();
        mgr.subscribe("a", vec![], on_msg, on_err).await.unwrap();
        assert!(mgr.is_open().await);
        assert_eq!(transport.state.lock().unwrap().opens, 2);
    }

    #[tokio::test]
    async fn setup_failure_reported_and_returned() {
        let transport = Arc::new(MockTransport {
            fail_subscribe: AtomicBool::new(true),
            ..MockTransport::default()
        });
        let mgr = manager(&transport);
        let (on_msg, on_err, _msgs, mut errs) = handlers();

        let err = mgr.subscribe("a", vec![], on_msg, on_err).await.unwrap_err();
        assert!(matches!(err, EngineError::Transport(TransportError::Protocol(_))));
        assert!(matches!(errs.recv().await, Some(TransportError::Protocol(_))));
        assert_eq!(mgr.state("a").await, SubscriptionState::Unsubscribed);
    }

    #[tokio::test]
    async fn open_failure_leaves_channel_closed() {
        let transport = Arc::new(MockTransport {
            fail_open: true,
            ..MockTransport::default()
        });
        let mgr = manager(&transport);
        let (on_msg, on_err, _msgs, _errs) = handlers();
        assert!(mgr.subscribe("a", vec![], on_msg, on_err).await.is_err());
        assert!(!mgr.is_open().await);
    }

    #[tokio::test]
    async fn failed_resubscribe_drops_previous_registration() {
        let transport = Arc::new(MockTransport::default());
        let mgr = manager(&transport);
        let (on_msg1, on_err1, mut msgs1, _errs1) = handlers();
        mgr.subscribe("a", vec!["old".into()], on_msg1, on_err1).await.unwrap();

        transport.fail_subscribe.store(true, Ordering::SeqCst);
        let (on_msg2, on_err2, _msgs2, mut errs2) = handlers();
        let err = mgr.subscribe("a", vec!["new".into()], on_msg2, on_err2).await.unwrap_err();
        assert!(matches!(err, EngineError::Transport(TransportError::Protocol(_))));
        assert!(matches!(errs2.recv().await, Some(TransportError::Protocol(_))));

        assert_eq!(mgr.state("a").await, SubscriptionState::Unsubscribed);
        assert!(transport.filter("a").is_none());
        assert_eq!(transport.state.lock().unwrap().unsubscribes, vec!["a".to_string()]);
        assert!(msgs1.recv().await.is_none());
    }

    async fn wait_for_state(mgr: &SubscriptionManager, id: &str, want: SubscriptionState) {
        timeout(Duration::from_secs(1), async {
            while mgr.state(id).await != want {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn pending_subscribe_is_observable_and_activates() {
        let gate = Arc::new(Notify::new());
        let transport = Arc::new(MockTransport {
            gate: Some(gate.clone()),
            ..MockTransport::default()
        });
        let mgr = Arc::new(manager(&transport));
        let (on_msg, on_err, _msgs, _errs) = handlers();

        let pending = tokio::spawn({
            let mgr = mgr.clone();
            async move { mgr.subscribe("a", vec![], on_msg, on_err).await }
        });
        wait_for_state(&mgr, "a", SubscriptionState::Subscribing).await;
        assert_eq!(mgr.active_ids().await, vec!["a"]);

        gate.notify_one();
        pending.await.unwrap().unwrap();
        assert_eq!(mgr.state("a").await, SubscriptionState::Active);
    }

    #[tokio::test]
    async fn close_during_subscribe_cancels_it() {
        let gate = Arc::new(Notify::new());
        let transport = Arc::new(MockTransport {
            gate: Some(gate.clone()),
            ..MockTransport::default()
        });
        let mgr = Arc::new(manager(&transport));
        let (on_msg, on_err, _msgs, mut errs) = handlers();

        let pending = tokio::spawn({
            let mgr = mgr.clone();
            async move { mgr.subscribe("a", vec![], on_msg, on_err).await }
        });
        wait_for_state(&mgr, "a", SubscriptionState::Subscribing).await;

        timeout(Duration::from_secs(1), mgr.close()).await.unwrap().unwrap();
        assert_eq!(mgr.state("a").await, SubscriptionState::Unsubscribed);

        gate.notify_one();
        let err = pending.await.unwrap().unwrap_err();
        assert!(matches!(err, EngineError::Transport(TransportError::ConnectionClosed(_))));
        assert!(matches!(errs.recv().await, Some(TransportError::ConnectionClosed(_))));
        assert_eq!(mgr.state("a").await, SubscriptionState::Unsubscribed);
        assert!(transport.filter("a").is_none());
    }
}
