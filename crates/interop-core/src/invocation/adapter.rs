//! Adapters between binary and payload-typed invocation channels.
//!
//! [`PayloadClient`] lets application code push payload text into a client
//! that only moves frames. [`PayloadObserver`] turns incoming frames back into
//! payload text for an application observer. Each adapter instance serves one
//! direction of one invocation and shares nothing with any other adapter.

use super::channel::{
    ChannelPhase, ChannelState, Frame, InvocationClient, InvocationObserver, Signal,
};
use super::marshal::{frame_from_payload, payload_from_frame, Marshaller};
use crate::error::{InvocationError, MarshalError};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// Payload-typed view of a binary invocation client.
///
/// Signals reach the binary client in the order they were issued. Once
/// `cancel` has been observed nothing else is delivered, including a `next`
/// or `complete` that was already waiting for its turn.
pub struct PayloadClient<C, M> {
    base: C,
    marshaller: M,
    state: ChannelState,
    // Serializes delivery to `base`; cancel bypasses it.
    send_lock: tokio::sync::Mutex<()>,
}

impl<C, M> PayloadClient<C, M>
where
    C: InvocationClient<Frame>,
    M: Marshaller,
    M::Value: DeserializeOwned,
{
    pub fn new(base: C, marshaller: M) -> Self {
        Self {
            base,
            marshaller,
            state: ChannelState::new(),
            send_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn phase(&self) -> ChannelPhase {
        self.state.phase()
    }

    pub fn marshaller(&self) -> &M {
        &self.marshaller
    }

    /// Terminate the channel with a marshalling failure.
    async fn fail(&self, error: MarshalError) {
        let _turn = self.send_lock.lock().await;
        if self.state.try_terminate(ChannelPhase::Errored) {
            warn!("Outgoing payload rejected: {}", error);
            if let Err(e) = self.base.error(error.into()).await {
                debug!("Binary client refused error signal: {}", e);
            }
        }
    }

    async fn terminate(
        &self,
        terminal: ChannelPhase,
        signal: Option<InvocationError>,
    ) -> Result<(), InvocationError> {
        let _turn = self.send_lock.lock().await;
        if !self.state.try_terminate(terminal) {
            let phase = self.state.phase();
            warn!("Terminal signal after {:?} ignored", phase);
            return Err(phase.rejection());
        }
        match signal {
            Some(error) => self.base.error(error).await,
            None => self.base.complete().await,
        }
    }
}

#[async_trait]
impl<C, M> InvocationClient<String> for PayloadClient<C, M>
where
    C: InvocationClient<Frame>,
    M: Marshaller,
    M::Value: DeserializeOwned,
{
    /// Marshal and forward one payload.
    ///
    /// A payload that fails to marshal terminates the channel through the
    /// binary client's `error` signal; the call itself still returns `Ok`.
    async fn next(&self, payload: String) -> Result<(), InvocationError> {
        if let Err(e) = self.state.check_open() {
            warn!("next after terminal signal rejected");
            return Err(e);
        }

        let frame = match frame_from_payload(&self.marshaller, &payload) {
            Ok(frame) => frame,
            Err(error) => {
                self.fail(error).await;
                return Ok(());
            }
        };

        let _turn = self.send_lock.lock().await;
        // Re-check under the lock: a cancel may have landed while we waited.
        self.state.check_open()?;
        self.base.next(frame).await
    }

    async fn complete(&self) -> Result<(), InvocationError> {
        self.terminate(ChannelPhase::Completed, None).await
    }

    async fn error(&self, error: InvocationError) -> Result<(), InvocationError> {
        self.terminate(ChannelPhase::Errored, Some(error)).await
    }

    async fn cancel(&self) {
        if self.state.try_terminate(ChannelPhase::Cancelled) {
            debug!("Cancelling invocation");
            self.base.cancel().await;
        }
    }
}

/// Payload-typed view feeding an application observer from binary frames.
///
/// Signals reach `base` one at a time and in arrival order. The base observer
/// may feed this adapter again from inside a callback; such signals are
/// queued and delivered once the current callback returns.
pub struct PayloadObserver<O, M> {
    base: O,
    marshaller: M,
    state: ChannelState,
    delivery: Mutex<Delivery>,
}

#[derive(Default)]
struct Delivery {
    queue: VecDeque<Signal<String>>,
    // Set while some caller is draining the queue into `base`.
    draining: bool,
}

impl<O, M> PayloadObserver<O, M>
where
    O: InvocationObserver<String>,
    M: Marshaller,
    M::Value: Serialize,
{
    pub fn new(base: O, marshaller: M) -> Self {
        Self {
            base,
            marshaller,
            state: ChannelState::new(),
            delivery: Mutex::new(Delivery::default()),
        }
    }

    pub fn phase(&self) -> ChannelPhase {
        self.state.phase()
    }

    fn delivery(&self) -> MutexGuard<'_, Delivery> {
        self.delivery.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue the signal produced by `admit`, then drain unless another caller
    /// already is. The lock is never held while `base` runs.
    fn dispatch(&self, admit: impl FnOnce() -> Option<Signal<String>>) {
        let mut delivery = self.delivery();
        if let Some(signal) = admit() {
            delivery.queue.push_back(signal);
        }
        if delivery.draining {
            return;
        }
        delivery.draining = true;
        while let Some(signal) = delivery.queue.pop_front() {
            drop(delivery);
            signal.deliver_to(&self.base);
            delivery = self.delivery();
        }
        delivery.draining = false;
    }
}

impl<O, M> InvocationObserver<Frame> for PayloadObserver<O, M>
where
    O: InvocationObserver<String>,
    M: Marshaller,
    M::Value: Serialize,
{
    fn next(&self, frame: Frame) {
        self.dispatch(|| {
            if !self.state.is_open() {
                warn!("Incoming frame after terminal signal dropped");
                return None;
            }
            match payload_from_frame(&self.marshaller, &frame) {
                Ok(payload) => Some(Signal::Next(payload)),
                Err(error) => {
                    if !self.state.try_terminate(ChannelPhase::Errored) {
                        return None;
                    }
                    warn!("Incoming frame rejected: {}", error);
                    Some(Signal::Error(error.into()))
                }
            }
        });
    }

    fn complete(&self) {
        self.dispatch(|| {
            self.state
                .try_terminate(ChannelPhase::Completed)
                .then_some(Signal::Complete)
        });
    }

    fn error(&self, error: InvocationError) {
        self.dispatch(|| {
            self.state
                .try_terminate(ChannelPhase::Errored)
                .then_some(Signal::Error(error))
        });
    }
}

/// Wrap a binary host client so handlers can speak payload text.
pub fn wrap_generic_host_client<C, M>(base: C, marshaller: M) -> PayloadClient<C, M>
where
    C: InvocationClient<Frame>,
    M: Marshaller,
    M::Value: DeserializeOwned,
{
    PayloadClient::new(base, marshaller)
}

/// Wrap a payload observer so it can be fed binary frames.
pub fn to_generic_observer<O, M>(base: O, marshaller: M) -> PayloadObserver<O, M>
where
    O: InvocationObserver<String>,
    M: Marshaller,
    M::Value: Serialize,
{
    PayloadObserver::new(base, marshaller)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invocation::marshal::JsonMarshaller;
    use crate::invocation::pipe::{observer_pipe, signal_pipe};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;

    fn marshaller() -> JsonMarshaller<Value> {
        JsonMarshaller::new()
    }

    fn frame(value: Value) -> Frame {
        marshaller().encode(&value).unwrap()
    }

    #[tokio::test]
    async fn test_forward_preserves_order() {
        let (binary, mut wire) = signal_pipe::<Frame>();
        let client = wrap_generic_host_client(binary, marshaller());

        for i in 1..=3 {
            client.next(format!(r#"{{"seq": {}}}"#, i)).await.unwrap();
        }
        client.complete().await.unwrap();

        assert_eq!(
            wire.collect_until_terminal().await,
            vec![
                Signal::Next(frame(json!({"seq": 1}))),
                Signal::Next(frame(json!({"seq": 2}))),
                Signal::Next(frame(json!({"seq": 3}))),
                Signal::Complete,
            ]
        );
    }

    #[tokio::test]
    async fn test_forward_malformed_payload_errors_channel() {
        let (binary, mut wire) = signal_pipe::<Frame>();
        let client = wrap_generic_host_client(binary, marshaller());

        client.next(r#"{"ok": true}"#.to_string()).await.unwrap();
        assert!(client.next("{broken".to_string()).await.is_ok());
        assert_eq!(client.phase(), ChannelPhase::Errored);
        assert_eq!(
            client.next(r#"{"ok": false}"#.to_string()).await,
            Err(InvocationError::Closed)
        );

        let signals = wire.drain();
        assert_eq!(signals.len(), 2);
        assert_eq!(signals[0], Signal::Next(frame(json!({"ok": true}))));
        assert!(matches!(
            signals[1],
            Signal::Error(InvocationError::Marshal(MarshalError::Payload { .. }))
        ));
    }

    #[tokio::test]
    async fn test_forward_terminal_once() {
        let (binary, mut wire) = signal_pipe::<Frame>();
        let client = wrap_generic_host_client(binary, marshaller());

        client.complete().await.unwrap();
        assert_eq!(client.complete().await, Err(InvocationError::Closed));
        assert_eq!(
            client.error(InvocationError::remote("late")).await,
            Err(InvocationError::Closed)
        );
        assert_eq!(
            client.next("1".to_string()).await,
            Err(InvocationError::Closed)
        );
        client.cancel().await;

        assert_eq!(wire.drain(), vec![Signal::Complete]);
    }

    #[tokio::test]
    async fn test_forward_error_verbatim() {
        let (binary, mut wire) = signal_pipe::<Frame>();
        let client = wrap_generic_host_client(binary, marshaller());

        client.error(InvocationError::handler("bad input")).await.unwrap();
        assert_eq!(
            wire.drain(),
            vec![Signal::Error(InvocationError::handler("bad input"))]
        );
    }

    #[tokio::test]
    async fn test_cancel_propagates_and_suppresses() {
        let (binary, mut wire) = signal_pipe::<Frame>();
        let client = wrap_generic_host_client(binary, marshaller());

        client.next("1".to_string()).await.unwrap();
        client.cancel().await;
        client.cancel().await;

        assert_eq!(
            client.next("2".to_string()).await,
            Err(InvocationError::Cancelled)
        );
        assert_eq!(client.complete().await, Err(InvocationError::Cancelled));
        assert_eq!(
            wire.drain(),
            vec![Signal::Next(frame(json!(1))), Signal::Cancel]
        );
    }

    /// Binary client whose `next` parks until released.
    struct SlowClient {
        inner: crate::invocation::pipe::SignalSender<Frame>,
        gate: tokio::sync::Semaphore,
    }

    #[async_trait]
    impl InvocationClient<Frame> for SlowClient {
        async fn next(&self, value: Frame) -> Result<(), InvocationError> {
            let _permit = self.gate.acquire().await.map_err(|_| InvocationError::Closed)?;
            self.inner.next(value).await
        }

        async fn complete(&self) -> Result<(), InvocationError> {
            self.inner.complete().await
        }

        async fn error(&self, error: InvocationError) -> Result<(), InvocationError> {
            self.inner.error(error).await
        }

        async fn cancel(&self) {
            self.inner.cancel().await
        }
    }

    #[tokio::test]
    async fn test_cancel_wins_over_queued_signals() {
        let (inner, mut wire) = signal_pipe::<Frame>();
        let slow = SlowClient {
            inner,
            gate: tokio::sync::Semaphore::new(0),
        };
        let client = Arc::new(wrap_generic_host_client(slow, marshaller()));

        // First next holds the send lock while parked in the binary client.
        let first = tokio::spawn({
            let client = client.clone();
            async move { client.next("1".to_string()).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        // Second next and complete queue behind it.
        let second = tokio::spawn({
            let client = client.clone();
            async move { client.next("2".to_string()).await }
        });
        let completion = tokio::spawn({
            let client = client.clone();
            async move { client.complete().await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        client.cancel().await;
        client.base.gate.add_permits(10);

        // The parked frame lands on an already-cancelled binary client and
        // nothing queued behind it is delivered.
        assert_eq!(first.await.unwrap(), Err(InvocationError::Cancelled));
        assert_eq!(second.await.unwrap(), Err(InvocationError::Cancelled));
        assert_eq!(completion.await.unwrap(), Err(InvocationError::Cancelled));
        assert_eq!(wire.drain(), vec![Signal::Cancel]);
    }

    #[tokio::test]
    async fn test_reverse_decodes_frames() {
        let (app, mut seen) = observer_pipe::<String>();
        let observer = to_generic_observer(app, marshaller());

        observer.next(frame(json!({"price": 1.25})));
        observer.complete();
        observer.next(frame(json!({"price": 2.5})));

        let signals = seen.drain();
        assert_eq!(signals.len(), 2);
        match &signals[0] {
            Signal::Next(text) => {
                let value: Value = serde_json::from_str(text).unwrap();
                assert_eq!(value, json!({"price": 1.25}));
            }
            other => panic!("expected next, got {:?}", other),
        }
        assert_eq!(signals[1], Signal::Complete);
    }

    #[tokio::test]
    async fn test_reverse_malformed_frame_errors_without_next() {
        let (app, mut seen) = observer_pipe::<String>();
        let observer = to_generic_observer(app, marshaller());

        observer.next(Frame::from_static(b"\x00\x01garbage"));
        observer.next(frame(json!("after")));
        observer.complete();

        let signals = seen.drain();
        assert_eq!(signals.len(), 1);
        assert!(matches!(
            signals[0],
            Signal::Error(InvocationError::Marshal(MarshalError::Decode { .. }))
        ));
        assert_eq!(observer.phase(), ChannelPhase::Errored);
    }

    #[tokio::test]
    async fn test_round_trip_through_both_adapters() {
        let (binary, mut wire) = signal_pipe::<Frame>();
        let client = wrap_generic_host_client(binary, marshaller());
        let (app, mut seen) = observer_pipe::<String>();
        let observer = to_generic_observer(app, marshaller());

        let original = json!({"id": 42, "tags": ["a", "b"], "nested": {"ok": true}});
        client.next(original.to_string()).await.unwrap();
        client.complete().await.unwrap();

        while let Some(signal) = wire.try_recv() {
            signal.deliver_to(&observer);
        }

        let signals = seen.drain();
        match &signals[0] {
            Signal::Next(text) => {
                assert_eq!(serde_json::from_str::<Value>(text).unwrap(), original)
            }
            other => panic!("expected next, got {:?}", other),
        }
        assert_eq!(signals[1], Signal::Complete);
    }

    #[tokio::test]
    async fn test_independent_channels_do_not_interleave() {
        let (binary_a, mut wire_a) = signal_pipe::<Frame>();
        let (binary_b, mut wire_b) = signal_pipe::<Frame>();
        let a = Arc::new(wrap_generic_host_client(binary_a, marshaller()));
        let b = Arc::new(wrap_generic_host_client(binary_b, marshaller()));

        let task_a = tokio::spawn({
            let a = a.clone();
            async move {
                for i in 0..50 {
                    a.next(format!(r#"{{"a": {}}}"#, i)).await.unwrap();
                    tokio::task::yield_now().await;
                }
            }
        });
        let task_b = tokio::spawn({
            let b = b.clone();
            async move {
                for i in 0..50 {
                    b.next(format!(r#"{{"b": {}}}"#, i)).await.unwrap();
                    tokio::task::yield_now().await;
                }
            }
        });
        task_a.await.unwrap();
        task_b.await.unwrap();

        let expected_a: Vec<_> = (0..50).map(|i| Signal::Next(frame(json!({"a": i})))).collect();
        let expected_b: Vec<_> = (0..50).map(|i| Signal::Next(frame(json!({"b": i})))).collect();
        assert_eq!(wire_a.drain(), expected_a);
        assert_eq!(wire_b.drain(), expected_b);
    }

    /// Observer that answers its first value by feeding the adapter again.
    struct Echoing {
        seen: std::sync::Mutex<Vec<String>>,
        adapter: std::sync::OnceLock<std::sync::Weak<EchoingAdapter>>,
    }

    type EchoingAdapter = PayloadObserver<Arc<Echoing>, JsonMarshaller<Value>>;

    impl InvocationObserver<String> for Echoing {
        fn next(&self, payload: String) {
            let first = {
                let mut seen = self.seen.lock().unwrap();
                seen.push(payload);
                seen.len() == 1
            };
            if first {
                if let Some(adapter) = self.adapter.get().and_then(std::sync::Weak::upgrade) {
                    adapter.next(frame(json!({"echo": true})));
                    adapter.complete();
                }
            }
        }

        fn complete(&self) {
            self.seen.lock().unwrap().push("complete".to_string());
        }

        fn error(&self, error: InvocationError) {
            self.seen.lock().unwrap().push(format!("error: {}", error));
        }
    }

    #[test]
    fn test_reverse_observer_may_feed_itself() {
        let echoing = Arc::new(Echoing {
            seen: std::sync::Mutex::new(Vec::new()),
            adapter: std::sync::OnceLock::new(),
        });
        let adapter: Arc<EchoingAdapter> = Arc::new(to_generic_observer(echoing.clone(), marshaller()));
        assert!(echoing.adapter.set(Arc::downgrade(&adapter)).is_ok());

        adapter.next(frame(json!({"n": 1})));

        assert_eq!(
            *echoing.seen.lock().unwrap(),
            vec![
                r#"{"n":1}"#.to_string(),
                r#"{"echo":true}"#.to_string(),
                "complete".to_string(),
            ]
        );
        assert_eq!(adapter.phase(), ChannelPhase::Completed);

        // Nothing is delivered after the nested complete.
        adapter.next(frame(json!({"n": 2})));
        assert_eq!(echoing.seen.lock().unwrap().len(), 3);
    }
}
