//! Configuration library for the ACM bypass Time-Sensitive Networking
//! hardware block: time-triggered frame generation, ingress
//! classification, scheduled forwarding, and 802.1CB-style redundancy.
//!
//! A caller builds an in-memory [`Configuration`] from the leaves up —
//! [`Operation`]s into a [`Stream`], [`ScheduleEntry`]s onto that stream,
//! the stream into a [`Module`], the module into the `Configuration` — and
//! commits it to the device with [`Configuration::apply`]. Every additive
//! mutation is validated immediately (non-final, bottom-up); `apply` runs a
//! final top-down validation, compiles the object graph into hardware
//! tables, and writes them through [`device::DeviceInterface`] in a fixed
//! order.
//!
//! This crate does not forward a single data-path frame and does not
//! synthesize a schedule: periods, offsets and cycle times are supplied by
//! the caller and only checked, never invented.

pub mod arena;
pub mod compiler;
pub mod config;
pub mod config_file;
pub mod device;
pub mod error;
pub mod lookup;
pub mod module;
pub mod msgbuf;
pub mod operation;
pub mod schedule;
pub mod status;
pub mod stream;
pub mod validate;

pub use config::Configuration;
pub use error::{AcmError, AcmResult};
pub use lookup::LookupEntry;
pub use module::{ConnMode, DelayTable, Module, Speed};
pub use msgbuf::{Direction, MessageBuffer};
pub use operation::{Opcode, Operation};
pub use schedule::ScheduleEntry;
pub use status::{Capabilities, Diagnostics, StatusItem, VersionTriple};
pub use stream::{Stream, StreamId, StreamVariant};
