//! Parley core library: inbound email classification, message store, and the relay gateway
//! used by the CLI.

pub mod classify;
pub mod config;
pub mod gateway;
pub mod init;
pub mod llm;
pub mod message;
pub mod notify;
pub mod pipeline;
pub mod relay;
pub mod store;
