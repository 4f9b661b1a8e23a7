//! JSON-RPC control surface
//!
//! Line-oriented JSON over the host link: one request object per line, one
//! response object per line. [`transport::LineFramer`] turns the byte stream
//! into frames, [`server::RpcServer`] dispatches by method name over a fixed
//! table, and [`handlers`] implements the method set the host test
//! orchestrator depends on.

pub mod handlers;
pub mod server;
pub mod transport;

pub use server::RpcServer;
pub use transport::{LineFramer, RpcTransport};
