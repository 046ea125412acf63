//! HTTP transport: the request engine and its shared client.

pub mod http;
pub mod request;

pub use request::TransportClient;
