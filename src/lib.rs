//! Raw-Ethernet frame transport core for an EtherCAT master.
//!
//! Multiplexes many in-flight EtherCAT datagrams over one (or two,
//! redundant) network interfaces using a frame-index reorder buffer, and
//! implements the cable-redundancy recovery protocol that tolerates a
//! single break anywhere in the ring. Datagram construction, slave state
//! machines, mailbox protocols, and cyclic scheduling above this layer
//! are out of scope — this crate consumes already-composed EtherCAT
//! payloads and hands back working counters.
//!
//! The explicit, [`Port`]-taking API (this crate's primary surface) lives
//! across [`port`], [`engine`], [`redundancy`], and [`confirm`]; a
//! process-wide compatibility façade for callers that assume a single
//! global master instance lives in [`legacy`].

pub mod bufstat;
pub mod confirm;
pub mod constants;
pub mod engine;
pub mod error;
pub mod frame;
pub mod legacy;
pub mod link;
pub mod mock;
pub mod port;
pub mod redundancy;
pub mod stack;
pub mod timer;

pub use bufstat::BufStat;
pub use confirm::src_confirm;
pub use engine::{in_frame, out_frame, out_frame_red, wait_in_frame};
pub use error::SetupError;
pub use frame::Wkc;
pub use link::{LinkConfig, RawLink};
pub use port::Port;
pub use redundancy::wait_in_frame_red;
pub use stack::Direction;
