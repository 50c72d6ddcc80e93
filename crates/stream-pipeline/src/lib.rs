//! Stream Pipelines for Opticast
//!
//! Orchestrates the two directions of the stream:
//!
//! - sender: capture thread -> frame queue -> encode -> encrypt ->
//!   fragment -> transmit
//! - receiver: receive -> reassemble -> decrypt -> decode -> display
//!   queue -> display thread
//!
//! Each endpoint runs one network context (async task) and one frame
//! context (dedicated thread) connected through bounded queues. All
//! suspension points carry short timeouts and poll a shared shutdown
//! token; nothing blocks indefinitely.

mod config;
mod error;
mod queue;
mod reassembly;
mod receiver;
mod sender;
mod shutdown;
mod sink;
mod source;

pub use config::*;
pub use error::*;
pub use queue::*;
pub use reassembly::*;
pub use receiver::*;
pub use sender::*;
pub use shutdown::*;
pub use sink::*;
pub use source::*;
