//! String handlers for the three RPC interaction shapes.
//!
//! Handlers see requests and responses as JSON text. The `serve_*` helpers
//! wire a handler to the binary host client of one invocation, putting the
//! forward and reverse adapters in the right places for each shape.

use super::adapter::{PayloadClient, PayloadObserver};
use super::channel::{Frame, InvocationClient, InvocationObserver};
use super::marshal::{payload_from_frame, Marshaller};
use crate::error::InvocationError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tracing::warn;

/// Payload-typed client handed to streaming handlers.
pub type StringClient = Arc<dyn InvocationClient<String>>;

/// Payload-typed observer returned by bidi handlers.
pub type StringObserver = Arc<dyn InvocationObserver<String>>;

/// Request/response handler.
#[async_trait]
pub trait UnaryStringHandler: Send + Sync {
    async fn handle(&self, request: String) -> Result<String, InvocationError>;
}

#[async_trait]
impl<F, Fut> UnaryStringHandler for F
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<String, InvocationError>> + Send + 'static,
{
    async fn handle(&self, request: String) -> Result<String, InvocationError> {
        (self)(request).await
    }
}

/// Handler that answers one request with a stream driven through `host_client`.
///
/// The handler owns termination: it must end the stream with `complete` or
/// `error`.
#[async_trait]
pub trait ServerStreamingStringHandler: Send + Sync {
    async fn handle(&self, request: String, host_client: StringClient);
}

#[async_trait]
impl<F, Fut> ServerStreamingStringHandler for F
where
    F: Fn(String, StringClient) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn handle(&self, request: String, host_client: StringClient) {
        (self)(request, host_client).await
    }
}

/// Handler for a bidirectional stream.
///
/// Receives the outgoing client and returns the observer for incoming values.
pub trait BidiStreamingStringHandler: Send + Sync {
    fn handle(&self, host_client: StringClient) -> StringObserver;
}

impl<F> BidiStreamingStringHandler for F
where
    F: Fn(StringClient) -> StringObserver + Send + Sync,
{
    fn handle(&self, host_client: StringClient) -> StringObserver {
        (self)(host_client)
    }
}

/// Run a unary handler: decode the request frame, call the handler, then
/// send exactly one response followed by `complete`, or a single `error`.
pub async fn serve_unary<H, C, M>(
    handler: &H,
    request: Frame,
    host_client: C,
    marshaller: M,
) -> Result<(), InvocationError>
where
    H: UnaryStringHandler + ?Sized,
    C: InvocationClient<Frame>,
    M: Marshaller,
    M::Value: Serialize + DeserializeOwned,
{
    let client = PayloadClient::new(host_client, marshaller);

    let request = match payload_from_frame(client.marshaller(), &request) {
        Ok(request) => request,
        Err(error) => {
            warn!("Unary request rejected: {}", error);
            return client.error(error.into()).await;
        }
    };

    match handler.handle(request).await {
        Ok(response) => {
            client.next(response).await?;
            if client.phase().is_terminal() {
                // The response failed to marshal and the error already went out.
                return Ok(());
            }
            client.complete().await
        }
        Err(error) => client.error(error).await,
    }
}

/// Run a server-streaming handler against the host client.
pub async fn serve_server_streaming<H, C, M>(
    handler: &H,
    request: Frame,
    host_client: C,
    marshaller: M,
) -> Result<(), InvocationError>
where
    H: ServerStreamingStringHandler + ?Sized,
    C: InvocationClient<Frame> + 'static,
    M: Marshaller + 'static,
    M::Value: Serialize + DeserializeOwned,
{
    let request = match payload_from_frame(&marshaller, &request) {
        Ok(request) => request,
        Err(error) => {
            warn!("Streaming request rejected: {}", error);
            return host_client.error(error.into()).await;
        }
    };

    let client: StringClient = Arc::new(PayloadClient::new(host_client, marshaller));
    handler.handle(request, client).await;
    Ok(())
}

/// Start a bidi handler and return the binary observer for incoming frames.
///
/// The two directions get their own adapter and their own marshaller copy.
pub fn serve_bidi_streaming<H, C, M>(
    handler: &H,
    host_client: C,
    marshaller: M,
) -> PayloadObserver<StringObserver, M>
where
    H: BidiStreamingStringHandler + ?Sized,
    C: InvocationClient<Frame> + 'static,
    M: Marshaller + Clone + 'static,
    M::Value: Serialize + DeserializeOwned,
{
    let client: StringClient = Arc::new(PayloadClient::new(host_client, marshaller.clone()));
    let observer = handler.handle(client);
    PayloadObserver::new(observer, marshaller)
}
