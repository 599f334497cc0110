//! Request handling plumbing for ProxyStack
//!
//! Handlers write into a [`ResponseWriter`] instead of returning a response
//! so that a handler can re-enter the chain with a fully formed internal
//! request (a subrequest) and consume the result either buffered
//! ([`CaptureWriter`]) or streamed ([`PipeResponseWriter`]).

pub mod capture;
pub mod context;
pub mod error;
pub mod handler;
pub mod pipe;
pub mod response;
pub mod server;

pub use capture::CaptureWriter;
pub use context::{AuthorizeFn, PipedResponse, ProxyContext, SubrequestSource};
pub use error::SubrequestError;
pub use handler::{compose, Handler, Layer, ResponseWriter};
pub use pipe::PipeResponseWriter;
pub use server::ProxyServer;
