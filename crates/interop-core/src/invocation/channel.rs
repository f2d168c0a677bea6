//! Streaming invocation channel protocol.
//!
//! A channel pair has a client half, which accepts outgoing values and may be
//! completed, failed or cancelled, and an observer half, which receives
//! incoming values followed by at most one terminal signal.

use crate::error::InvocationError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Raw wire frame moved by the invocation transport.
pub type Frame = bytes::Bytes;

/// Outgoing half of a streaming invocation.
///
/// After `complete`, `error` or `cancel` has been accepted no further `next`
/// may be delivered downstream. `cancel` is idempotent and never fails.
#[async_trait]
pub trait InvocationClient<T: Send + 'static>: Send + Sync {
    async fn next(&self, value: T) -> Result<(), InvocationError>;

    async fn complete(&self) -> Result<(), InvocationError>;

    async fn error(&self, error: InvocationError) -> Result<(), InvocationError>;

    async fn cancel(&self);
}

/// Incoming half of a streaming invocation.
pub trait InvocationObserver<T>: Send + Sync {
    fn next(&self, value: T);

    fn complete(&self);

    fn error(&self, error: InvocationError);
}

#[async_trait]
impl<T, C> InvocationClient<T> for Arc<C>
where
    T: Send + 'static,
    C: InvocationClient<T> + ?Sized,
{
    async fn next(&self, value: T) -> Result<(), InvocationError> {
        (**self).next(value).await
    }

    async fn complete(&self) -> Result<(), InvocationError> {
        (**self).complete().await
    }

    async fn error(&self, error: InvocationError) -> Result<(), InvocationError> {
        (**self).error(error).await
    }

    async fn cancel(&self) {
        (**self).cancel().await
    }
}

impl<T, O> InvocationObserver<T> for Arc<O>
where
    O: InvocationObserver<T> + ?Sized,
{
    fn next(&self, value: T) {
        (**self).next(value)
    }

    fn complete(&self) {
        (**self).complete()
    }

    fn error(&self, error: InvocationError) {
        (**self).error(error)
    }
}

/// One signal of the channel protocol, as a value.
#[derive(Debug, Clone, PartialEq)]
pub enum Signal<T> {
    Next(T),
    Complete,
    Error(InvocationError),
    Cancel,
}

impl<T> Signal<T> {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Signal::Next(_))
    }

    /// Hand this signal to an observer.
    ///
    /// Observers have no cancel signal; a `Cancel` is reported as
    /// `error(Cancelled)`.
    pub fn deliver_to<O: InvocationObserver<T> + ?Sized>(self, observer: &O) {
        match self {
            Signal::Next(value) => observer.next(value),
            Signal::Complete => observer.complete(),
            Signal::Error(error) => observer.error(error),
            Signal::Cancel => observer.error(InvocationError::Cancelled),
        }
    }
}

/// Lifecycle phase of one channel half.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChannelPhase {
    Open = 0,
    Completed = 1,
    Errored = 2,
    Cancelled = 3,
}

impl ChannelPhase {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => ChannelPhase::Open,
            1 => ChannelPhase::Completed,
            2 => ChannelPhase::Errored,
            _ => ChannelPhase::Cancelled,
        }
    }

    pub fn is_terminal(self) -> bool {
        self != ChannelPhase::Open
    }

    /// Error reported to a caller that signals after this phase was reached.
    pub fn rejection(self) -> InvocationError {
        match self {
            ChannelPhase::Cancelled => InvocationError::Cancelled,
            _ => InvocationError::Closed,
        }
    }
}

/// Terminal-once guard shared by every channel implementation in this crate.
///
/// Exactly one `try_terminate` call succeeds per channel.
#[derive(Debug, Default)]
pub struct ChannelState {
    phase: AtomicU8,
}

impl ChannelState {
    pub fn new() -> Self {
        Self {
            phase: AtomicU8::new(ChannelPhase::Open as u8),
        }
    }

    pub fn phase(&self) -> ChannelPhase {
        ChannelPhase::from_u8(self.phase.load(Ordering::SeqCst))
    }

    pub fn is_open(&self) -> bool {
        self.phase() == ChannelPhase::Open
    }

    /// Move from `Open` to `terminal`. Returns false if already terminated.
    pub fn try_terminate(&self, terminal: ChannelPhase) -> bool {
        debug_assert!(terminal.is_terminal());
        self.phase
            .compare_exchange(
                ChannelPhase::Open as u8,
                terminal as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    /// Reject a signal if the channel is no longer open.
    pub fn check_open(&self) -> Result<(), InvocationError> {
        match self.phase() {
            ChannelPhase::Open => Ok(()),
            terminal => Err(terminal.rejection()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<Signal<u32>>>,
    }

    impl InvocationObserver<u32> for Recorder {
        fn next(&self, value: u32) {
            self.seen.lock().unwrap().push(Signal::Next(value));
        }

        fn complete(&self) {
            self.seen.lock().unwrap().push(Signal::Complete);
        }

        fn error(&self, error: InvocationError) {
            self.seen.lock().unwrap().push(Signal::Error(error));
        }
    }

    #[test]
    fn test_new_state_is_open() {
        let state = ChannelState::new();
        assert!(state.is_open());
        assert!(state.check_open().is_ok());
    }

    #[test]
    fn test_terminate_only_once() {
        let state = ChannelState::new();
        assert!(state.try_terminate(ChannelPhase::Completed));
        assert!(!state.try_terminate(ChannelPhase::Cancelled));
        assert!(!state.try_terminate(ChannelPhase::Errored));
        assert_eq!(state.phase(), ChannelPhase::Completed);
        assert_eq!(state.check_open(), Err(InvocationError::Closed));
    }

    #[test]
    fn test_cancelled_rejection() {
        let state = ChannelState::new();
        assert!(state.try_terminate(ChannelPhase::Cancelled));
        assert_eq!(state.check_open(), Err(InvocationError::Cancelled));
    }

    #[test]
    fn test_signal_delivery() {
        let recorder = Arc::new(Recorder::default());
        Signal::Next(7).deliver_to(&recorder);
        Signal::Cancel.deliver_to(&*recorder);

        let seen = recorder.seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![Signal::Next(7), Signal::Error(InvocationError::Cancelled)]
        );
        assert!(!seen[0].is_terminal());
        assert!(seen[1].is_terminal());
    }
}
