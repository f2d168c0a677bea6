//! In-process signal pipes.
//!
//! [`signal_pipe`] yields an [`InvocationClient`] whose signals are queued for
//! a [`SignalReceiver`]; [`observer_pipe`] does the same for the observer
//! half. Both enforce the terminal-once rule at the sending end, so the queue
//! never holds anything after its terminal signal.

use super::channel::{ChannelPhase, ChannelState, InvocationClient, InvocationObserver, Signal};
use crate::error::InvocationError;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Create a client half whose signals are read back from the receiver.
pub fn signal_pipe<T>() -> (SignalSender<T>, SignalReceiver<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        SignalSender {
            tx,
            state: ChannelState::new(),
        },
        SignalReceiver { rx },
    )
}

/// Create an observer half whose signals are read back from the receiver.
pub fn observer_pipe<T>() -> (SignalObserver<T>, SignalReceiver<T>) {
    let (sender, receiver) = signal_pipe();
    (SignalObserver { inner: sender }, receiver)
}

/// Client half of a signal pipe.
#[derive(Debug)]
pub struct SignalSender<T> {
    tx: mpsc::UnboundedSender<Signal<T>>,
    state: ChannelState,
}

impl<T> SignalSender<T> {
    pub fn phase(&self) -> ChannelPhase {
        self.state.phase()
    }

    fn push(&self, signal: Signal<T>) -> Result<(), InvocationError> {
        self.tx
            .send(signal)
            .map_err(|_| InvocationError::transport("signal receiver dropped"))
    }
}

#[async_trait]
impl<T: Send + 'static> InvocationClient<T> for SignalSender<T> {
    async fn next(&self, value: T) -> Result<(), InvocationError> {
        self.state.check_open()?;
        self.push(Signal::Next(value))
    }

    async fn complete(&self) -> Result<(), InvocationError> {
        if !self.state.try_terminate(ChannelPhase::Completed) {
            return Err(self.state.phase().rejection());
        }
        self.push(Signal::Complete)
    }

    async fn error(&self, error: InvocationError) -> Result<(), InvocationError> {
        if !self.state.try_terminate(ChannelPhase::Errored) {
            return Err(self.state.phase().rejection());
        }
        self.push(Signal::Error(error))
    }

    async fn cancel(&self) {
        if self.state.try_terminate(ChannelPhase::Cancelled) {
            // A dropped receiver has nothing left to cancel.
            let _ = self.push(Signal::Cancel);
        }
    }
}

/// Observer half of a signal pipe.
#[derive(Debug)]
pub struct SignalObserver<T> {
    inner: SignalSender<T>,
}

impl<T> SignalObserver<T> {
    pub fn phase(&self) -> ChannelPhase {
        self.inner.phase()
    }

    fn deliver(&self, signal: Signal<T>) {
        if let Err(e) = self.inner.push(signal) {
            debug!("Dropping observer signal: {}", e);
        }
    }
}

impl<T: Send> InvocationObserver<T> for SignalObserver<T> {
    fn next(&self, value: T) {
        if !self.inner.state.is_open() {
            warn!("Observer received next after terminal signal; ignoring");
            return;
        }
        self.deliver(Signal::Next(value));
    }

    fn complete(&self) {
        if self.inner.state.try_terminate(ChannelPhase::Completed) {
            self.deliver(Signal::Complete);
        }
    }

    fn error(&self, error: InvocationError) {
        if self.inner.state.try_terminate(ChannelPhase::Errored) {
            self.deliver(Signal::Error(error));
        }
    }
}

/// Reading end of a signal pipe.
#[derive(Debug)]
pub struct SignalReceiver<T> {
    rx: mpsc::UnboundedReceiver<Signal<T>>,
}

impl<T> SignalReceiver<T> {
    /// Wait for the next signal. `None` once the sending half is gone.
    pub async fn recv(&mut self) -> Option<Signal<T>> {
        self.rx.recv().await
    }

    /// Take a signal if one is already queued.
    pub fn try_recv(&mut self) -> Option<Signal<T>> {
        self.rx.try_recv().ok()
    }

    /// Every signal queued so far, without waiting.
    pub fn drain(&mut self) -> Vec<Signal<T>> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    /// Read signals up to and including the first terminal one.
    pub async fn collect_until_terminal(&mut self) -> Vec<Signal<T>> {
        let mut signals = Vec::new();
        while let Some(signal) = self.recv().await {
            let terminal = signal.is_terminal();
            signals.push(signal);
            if terminal {
                break;
            }
        }
        signals
    }

    /// Pump queued signals into an observer until a terminal signal or the
    /// sending half goes away.
    pub async fn forward_to<O: InvocationObserver<T> + ?Sized>(mut self, observer: &O) {
        while let Some(signal) = self.recv().await {
            let terminal = signal.is_terminal();
            signal.deliver_to(observer);
            if terminal {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_client_signals_arrive_in_order() {
        let (client, mut rx) = signal_pipe::<u32>();
        client.next(1).await.unwrap();
        client.next(2).await.unwrap();
        client.complete().await.unwrap();

        assert_eq!(
            rx.collect_until_terminal().await,
            vec![Signal::Next(1), Signal::Next(2), Signal::Complete]
        );
    }

    #[tokio::test]
    async fn test_client_rejects_after_complete() {
        let (client, mut rx) = signal_pipe::<u32>();
        client.complete().await.unwrap();

        assert_eq!(client.next(3).await, Err(InvocationError::Closed));
        assert_eq!(client.complete().await, Err(InvocationError::Closed));
        client.cancel().await;

        assert_eq!(rx.drain(), vec![Signal::Complete]);
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let (client, mut rx) = signal_pipe::<u32>();
        client.cancel().await;
        client.cancel().await;

        assert_eq!(client.next(1).await, Err(InvocationError::Cancelled));
        assert_eq!(rx.drain(), vec![Signal::Cancel]);
        assert_eq!(client.phase(), ChannelPhase::Cancelled);
    }

    #[tokio::test]
    async fn test_send_after_receiver_dropped() {
        let (client, rx) = signal_pipe::<u32>();
        drop(rx);
        assert!(matches!(
            client.next(1).await,
            Err(InvocationError::Transport { .. })
        ));
    }

    #[tokio::test]
    async fn test_observer_pipe_ignores_after_error() {
        let (observer, mut rx) = observer_pipe::<&'static str>();
        observer.next("a");
        observer.error(InvocationError::remote("gone"));
        observer.next("b");
        observer.complete();

        assert_eq!(
            rx.drain(),
            vec![
                Signal::Next("a"),
                Signal::Error(InvocationError::remote("gone"))
            ]
        );
    }

    #[tokio::test]
    async fn test_forward_to_stops_at_terminal() {
        let (client, rx) = signal_pipe::<u32>();
        let (observer, mut out) = observer_pipe::<u32>();
        client.next(5).await.unwrap();
        client.complete().await.unwrap();

        rx.forward_to(&observer).await;
        assert_eq!(out.drain(), vec![Signal::Next(5), Signal::Complete]);
    }
}
