//! Hierarchical register maps for devices on a memory-like bus.
//!
//! A tree of [Device]s owns named [Variable]s placed at bit-level offsets. Starting the [Root]
//! merges the hardware-backed variables of each device into non-overlapping [Block]s, which
//! are read, written and verified in bus-sized chunks through a [Transport].

pub mod block;
pub mod builder;
pub mod chunker;
pub mod command;
pub mod device;
pub mod error;
pub mod logging;
pub mod lookup;
pub mod node;
pub mod root;
pub mod snapshot;
pub mod sweep;
pub mod transport;
pub mod value;
pub mod variable;

pub use block::Block;
pub use chunker::{RawData, RawValue};
pub use command::Command;
pub use device::{Device, DeviceOptions, EnableState, ResetKind};
pub use error::{RegError, RegResult};
pub use lookup::{ArrayGroup, ArrayKey, Lookup};
pub use node::{Node, NodeHandle, NodeKind};
pub use root::Root;
pub use transport::{MemoryEmulator, TransactionKind, Transport};
pub use value::{Base, Mode, ModeFilter, Value};
pub use variable::{LocalVariableOptions, RemoteVariableOptions, Variable};
