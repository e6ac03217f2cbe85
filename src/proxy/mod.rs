//
// src/proxy/mod.rs
//
mod backend;
mod error;
mod pool;

pub use backend::{Backend, BodyBufferError, BufferedRequest};
pub use error::ProxyError;
pub use pool::BackendPool;
