//! Backend specific [`ClientWrapper`](crate::client_wrapper::ClientWrapper) implementations.
//!
//! Each submodule offers a concrete client that speaks a particular backend's API while
//! conforming to the uniform mcpchat contract.

pub mod ollama;
