//! Presence protocol endpoints: the private-queue [`Consumer`] and the
//! exchange-side [`Publisher`].

pub mod consumer;
pub mod publisher;

pub use consumer::{Consumer, Handler};
pub use publisher::{Publisher, ReplyRouting, RpcRouting};
