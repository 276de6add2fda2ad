//! Variables: named values placed in a device's address space, or held locally.

use crate::{
    block::Block,
    builder::Placement,
    device::EnableState,
    error::{RegError, RegResult},
    node::{Node, NodeHandle, NodeKind},
    transport::TransactionKind,
    value::{Base, Mode, Value},
};
use spin::{Once, RwLock};
use std::sync::Arc;
use utils::handle::{Handle, HandleRef};

/// Called with the variable path and value whenever the value is confirmed or changed.
pub type Listener = Arc<dyn Fn(&str, &Value) + Send + Sync>;

/// Options of a hardware-backed variable.
#[derive(Debug, Clone)]
pub struct RemoteVariableOptions {
    pub description: String,
    pub hidden: bool,
    /// Byte offset in the device. `None` leaves the variable without a block.
    pub offset: Option<u64>,
    pub bit_offset: u32,
    pub bit_size: u32,
    pub base: Base,
    pub mode: Mode,
    /// Include the hosting block in bulk sweeps.
    pub bulk: bool,
}

impl Default for RemoteVariableOptions {
    fn default() -> Self {
        RemoteVariableOptions {
            description: String::new(),
            hidden: false,
            offset: None,
            bit_offset: 0,
            bit_size: 32,
            base: Base::UInt,
            mode: Mode::ReadWrite,
            bulk: true,
        }
    }
}

impl RemoteVariableOptions {
    /// A read-write unsigned variable of `bit_size` bits at byte `offset`.
    pub fn at(offset: u64, bit_size: u32) -> RemoteVariableOptions {
        RemoteVariableOptions {
            offset: Some(offset),
            bit_size,
            ..Default::default()
        }
    }
}

/// Options of a software-only variable.
#[derive(Debug, Clone)]
pub struct LocalVariableOptions {
    pub description: String,
    pub hidden: bool,
    pub mode: Mode,
    pub value: Value,
}

impl Default for LocalVariableOptions {
    fn default() -> Self {
        LocalVariableOptions {
            description: String::new(),
            hidden: false,
            mode: Mode::ReadWrite,
            value: Value::UInt(0),
        }
    }
}

pub(crate) enum Storage {
    Remote {
        base: Base,
        declared: Option<Placement>,
        resolved: Once<Placement>,
    },
    Local {
        value: RwLock<Value>,
    },
    /// The enable flag of the parent device; the stored bit lives in the device.
    Enable,
}

pub struct Variable {
    mode: Mode,
    bulk: bool,
    pub(crate) storage: Storage,
    pub(crate) block: Once<HandleRef<Block>>,
    listeners: RwLock<Vec<Listener>>,
}

impl Variable {
    fn build(mode: Mode, bulk: bool, storage: Storage) -> NodeKind {
        NodeKind::Variable(Variable {
            mode,
            bulk,
            storage,
            block: Once::new(),
            listeners: RwLock::new(vec![]),
        })
    }

    pub fn remote(name: &str, options: RemoteVariableOptions) -> NodeHandle {
        let declared = options
            .offset
            .map(|offset| Placement::new(offset, options.bit_offset, options.bit_size));
        Node::create(name, &options.description, options.hidden, |_| {
            Variable::build(
                options.mode,
                options.bulk,
                Storage::Remote {
                    base: options.base,
                    declared,
                    resolved: Once::new(),
                },
            )
        })
    }

    pub fn local(name: &str, options: LocalVariableOptions) -> NodeHandle {
        Node::create(name, &options.description, options.hidden, |_| {
            Variable::build(
                options.mode,
                false,
                Storage::Local {
                    value: RwLock::new(options.value),
                },
            )
        })
    }

    pub(crate) fn enable() -> NodeHandle {
        Node::create(
            "enable",
            "Determines if device is enabled for hardware access",
            false,
            |_| Variable::build(Mode::ReadWrite, false, Storage::Enable),
        )
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_bulk(&self) -> bool {
        self.bulk
    }

    pub fn is_local(&self) -> bool {
        matches!(self.storage, Storage::Local { .. })
    }

    pub fn is_remote(&self) -> bool {
        matches!(self.storage, Storage::Remote { .. })
    }

    /// Final placement after block construction, or the declared one before it.
    pub fn placement(&self) -> Option<Placement> {
        match &self.storage {
            Storage::Remote {
                declared, resolved, ..
            } => resolved.get().copied().or(*declared),
            _ => None,
        }
    }

    pub fn block(&self) -> Option<Handle<Block>> {
        self.block.get().and_then(|b| b.get_handle())
    }

    pub fn add_listener(&self, listener: impl Fn(&str, &Value) + Send + Sync + 'static) {
        self.listeners.write().push(Arc::new(listener));
    }

    fn listeners(&self) -> Vec<Listener> {
        self.listeners.read().clone()
    }
}

impl Node {
    fn block_or_err(&self, var: &Variable) -> RegResult<Handle<Block>> {
        var.block().ok_or_else(|| RegError::NotAttached { path: self.path() })
    }

    /// Current value of a variable. With `read`, the hosting block is read from hardware
    /// first.
    pub fn get(&self, read: bool) -> RegResult<Value> {
        let var = self.variable_or_err()?;
        if read {
            if !var.mode.readable() {
                return Err(RegError::WriteOnly { path: self.path() });
            }
            match var.storage {
                Storage::Enable => {
                    let value = self.value()?;
                    self.updated();
                    return Ok(value);
                }
                _ => {
                    let block = self.block_or_err(var)?;
                    block.background_transaction(TransactionKind::Read)?;
                    block.check_transaction()?;
                }
            }
        }
        self.value()
    }

    /// Cached value of a variable, without bus access.
    pub fn value(&self) -> RegResult<Value> {
        let var = self.variable_or_err()?;
        match &var.storage {
            Storage::Remote { base, .. } => {
                let placement = var
                    .placement()
                    .ok_or_else(|| RegError::NotAttached { path: self.path() })?;
                check_width(self, placement.bit_size)?;
                let block = self.block_or_err(var)?;
                let bits = block.get_bits(&placement);
                Ok(base.from_bits(bits, placement.bit_size))
            }
            Storage::Local { value } => Ok(value.read().clone()),
            Storage::Enable => {
                let dev = self.parent_device().ok_or_else(|| RegError::NotAttached {
                    path: self.path(),
                })?;
                Ok(match dev.enable_state() {
                    EnableState::True => Value::Bool(true),
                    EnableState::False => Value::Bool(false),
                    EnableState::ParentSuppressed => Value::Str(EnableState::PARENT_DISP.into()),
                })
            }
        }
    }

    /// Set a variable. The hosting block becomes stale; with `write` it is written to hardware
    /// right away.
    pub fn set(&self, value: impl Into<Value>, write: bool) -> RegResult<()> {
        let value = value.into();
        let var = self.variable_or_err()?;
        if !var.mode.writable() {
            return Err(RegError::ReadOnly { path: self.path() });
        }
        match &var.storage {
            Storage::Remote { base, .. } => {
                let placement = var
                    .placement()
                    .ok_or_else(|| RegError::NotAttached { path: self.path() })?;
                check_width(self, placement.bit_size)?;
                let bits = base
                    .to_bits(&value, placement.bit_size)
                    .ok_or_else(|| RegError::InvalidValue {
                        path: self.path(),
                        value: value.to_string(),
                    })?;
                let block = self.block_or_err(var)?;
                block.set_bits(&placement, bits);
                if write {
                    block.background_transaction(TransactionKind::Write)?;
                    block.check_transaction()?;
                }
            }
            Storage::Local { value: stored } => {
                *stored.write() = value;
                if let Some(block) = var.block() {
                    block.mark_stale();
                    if write {
                        block.background_transaction(TransactionKind::Write)?;
                        return block.check_transaction();
                    }
                }
                self.updated();
            }
            Storage::Enable => {
                let dev = self.parent_device().ok_or_else(|| RegError::NotAttached {
                    path: self.path(),
                })?;
                match value {
                    Value::Str(s) if s == EnableState::PARENT_DISP => {}
                    other => {
                        let enabled = other.as_bool().ok_or_else(|| RegError::InvalidValue {
                            path: self.path(),
                            value: other.to_string(),
                        })?;
                        dev.set_enable(enabled);
                    }
                }
            }
        }
        Ok(())
    }

    /// Notify the listeners of a variable with its current value.
    pub fn updated(&self) {
        let Some(var) = self.as_variable() else {
            return;
        };
        let listeners = var.listeners();
        if listeners.is_empty() {
            return;
        }
        match self.value() {
            Ok(value) => {
                let path = self.path();
                for listener in listeners {
                    listener(&path, &value);
                }
            }
            Err(err) => log::warn!("Skipped update of '{}': {}", self.path(), err),
        }
    }
}

fn check_width(node: &Node, bit_size: u32) -> RegResult<()> {
    if bit_size > 64 {
        return Err(RegError::InvalidWidth {
            path: node.path(),
            word_bits: bit_size,
            stride: 8,
        });
    }
    Ok(())
}
