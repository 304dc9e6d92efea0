//! The two-method bridge protocol.
//!
//! - [`contract`]: method names and argument/response keys.
//! - [`envelope`]: parsed requests, responses and dispatch outcomes.
//! - [`dispatcher`]: authentication, routing and the method handlers.
//! - [`wire`]: newline-delimited JSON framing for the socket transport.
//! - [`client`]: blocking socket client.

pub mod client;
pub mod contract;
pub mod dispatcher;
pub mod envelope;
pub mod wire;

pub use client::BridgeClient;
pub use dispatcher::Dispatcher;
pub use envelope::{DispatchOutcome, Method, RequestEnvelope, ResponseEnvelope};
pub use wire::{WireReply, WireRequest, MAX_FRAME_LEN};
