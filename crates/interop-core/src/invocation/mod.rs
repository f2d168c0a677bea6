//! Streaming invocation marshalling.
//!
//! The invocation transport moves raw frames; application handlers work with
//! JSON payload text. This module bridges the two.
//!
//! # Layout
//!
//! - [`channel`] - the four-signal protocol (`next`/`complete`/`error`/`cancel`)
//! - [`marshal`] - pluggable wire codec and payload conversions
//! - [`adapter`] - forward (client) and reverse (observer) adapters
//! - [`handlers`] - unary, server-streaming and bidi string handlers
//! - [`pipe`] - in-process signal queues implementing both halves
//!
//! # Example
//!
//! ```rust
//! use interop_core::invocation::{
//!     signal_pipe, wrap_generic_host_client, Frame, InvocationClient, JsonMarshaller,
//! };
//!
//! # tokio_test_block_on(async {
//! let (binary, mut wire) = signal_pipe::<Frame>();
//! let client = wrap_generic_host_client(binary, JsonMarshaller::<serde_json::Value>::new());
//!
//! client.next(r#"{"qty": 5}"#.to_string()).await.unwrap();
//! client.complete().await.unwrap();
//!
//! assert_eq!(wire.drain().len(), 2);
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

pub mod adapter;
pub mod channel;
pub mod handlers;
pub mod marshal;
pub mod pipe;

pub use adapter::{to_generic_observer, wrap_generic_host_client, PayloadClient, PayloadObserver};
pub use channel::{
    ChannelPhase, ChannelState, Frame, InvocationClient, InvocationObserver, Signal,
};
pub use handlers::{
    serve_bidi_streaming, serve_server_streaming, serve_unary, BidiStreamingStringHandler,
    ServerStreamingStringHandler, StringClient, StringObserver, UnaryStringHandler,
};
pub use marshal::{
    frame_from_payload, parse_payload, payload_from_frame, render_payload, JsonMarshaller,
    Marshaller,
};
pub use pipe::{observer_pipe, signal_pipe, SignalObserver, SignalReceiver, SignalSender};
