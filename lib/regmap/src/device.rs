//! Devices: hubs in the address space owning variables, blocks and child devices.

use crate::{
    block::Block,
    builder::{Placement, build_layout},
    error::{RegError, RegResult},
    node::{Node, NodeHandle, NodeKind},
    transport::Transport,
    variable::{RemoteVariableOptions, Storage, Variable},
};
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use log::info;
use spin::{Mutex, Once, RwLock};
use std::sync::Arc;
use utils::handle::Handle;

/// Effective enable state of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnableState {
    True,
    False,
    /// Enabled itself, but some ancestor is not.
    ParentSuppressed,
}

impl EnableState {
    /// Displayed value of [EnableState::ParentSuppressed].
    pub const PARENT_DISP: &'static str = "ParentFalse";
}

/// Kind of reset passed to reset hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetKind {
    Hard,
    Soft,
    Count,
}

/// Called on [Node::dev_reset] with the device and the reset kind.
pub type ResetHook = Arc<dyn Fn(&Node, ResetKind) + Send + Sync>;

/// Options of a device.
#[derive(Clone)]
pub struct DeviceOptions {
    pub description: String,
    pub hidden: bool,
    /// Local offset, OR'd into the address of the parent device.
    pub offset: u64,
    /// Size of the address range, informational.
    pub size: u64,
    /// Transport for this device and its descendants. Makes the device address absolute.
    pub mem_base: Option<Arc<dyn Transport>>,
    pub enabled: bool,
}

impl Default for DeviceOptions {
    fn default() -> Self {
        DeviceOptions {
            description: String::new(),
            hidden: false,
            offset: 0,
            size: 0,
            mem_base: None,
            enabled: true,
        }
    }
}

/// Negotiated memory access of a device.
pub struct Hub {
    transport: Option<Arc<dyn Transport>>,
    min_access: u64,
    max_access: u64,
}

impl Hub {
    fn negotiate(transport: Option<Arc<dyn Transport>>) -> Hub {
        let (min_access, max_access) = match &transport {
            Some(t) => (
                t.query_min_access_size() as u64,
                t.query_max_access_size() as u64,
            ),
            None => (config::DEFAULT_MIN_ACCESS, config::DEFAULT_MAX_ACCESS),
        };
        Hub {
            transport,
            min_access,
            max_access,
        }
    }

    pub fn transport(&self) -> Option<&Arc<dyn Transport>> {
        self.transport.as_ref()
    }

    pub fn min_access(&self) -> u64 {
        self.min_access
    }

    pub fn max_access(&self) -> u64 {
        self.max_access
    }
}

pub struct Device {
    offset: u64,
    size: u64,
    mem_base: Option<Arc<dyn Transport>>,
    enabled: AtomicBool,
    hub: Once<Hub>,
    blocks: Once<Vec<Handle<Block>>>,
    pub(crate) mem_lock: Mutex<()>,
    timeout_us: AtomicU64,
    reset_hook: RwLock<Option<ResetHook>>,
}

impl Device {
    pub fn create(name: &str, options: DeviceOptions) -> NodeHandle {
        let node = Node::create(name, &options.description, options.hidden, |_| {
            NodeKind::Device(Device {
                offset: options.offset,
                size: options.size,
                mem_base: options.mem_base,
                enabled: AtomicBool::new(options.enabled),
                hub: Once::new(),
                blocks: Once::new(),
                mem_lock: Mutex::new(()),
                timeout_us: AtomicU64::new(config::DEFAULT_TIMEOUT_US),
                reset_hook: RwLock::new(None),
            })
        });
        node.adopt(Variable::enable());
        info!("Making device {}", name);
        node
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Negotiated access, once the tree is started.
    pub fn hub(&self) -> Option<&Hub> {
        self.hub.get()
    }

    pub fn timeout_us(&self) -> u64 {
        self.timeout_us.load(Ordering::Relaxed)
    }
}

impl Node {
    /// Absolute bus address of a device, or of the device hosting this node.
    pub fn address(&self) -> u64 {
        match self.as_device() {
            Some(dev) if dev.mem_base.is_some() => dev.offset,
            Some(dev) => self
                .parent_device()
                .map_or(dev.offset, |parent| parent.address() | dev.offset),
            None => self.parent_device().map_or(0, |parent| parent.address()),
        }
    }

    /// Effective enable of a device, or of the device hosting this node. Evaluated on every
    /// call from the stored flags of the ancestor chain.
    pub fn enable_state(&self) -> EnableState {
        let Some(dev) = self.as_device() else {
            return self
                .parent_device()
                .map_or(EnableState::False, |parent| parent.enable_state());
        };
        if !dev.enabled.load(Ordering::Acquire) {
            return EnableState::False;
        }
        match self.parent_device() {
            Some(parent) if parent.enable_state() != EnableState::True => {
                EnableState::ParentSuppressed
            }
            _ => EnableState::True,
        }
    }

    /// Store the enable flag of a device and notify the enable variables below it.
    pub fn set_enable(&self, enabled: bool) {
        let Some(dev) = self.as_device() else {
            return;
        };
        let old = dev.enabled.swap(enabled, Ordering::AcqRel);
        if old != enabled {
            self.enable_changed();
        }
    }

    fn enable_changed(&self) {
        if let Ok(enable) = self.node("enable") {
            enable.updated();
        }
        for child in self.devices() {
            child.enable_changed();
        }
    }

    /// Blocks of a device, empty until the tree is started.
    pub fn blocks(&self) -> Vec<Handle<Block>> {
        self.as_device()
            .and_then(|dev| dev.blocks.get())
            .cloned()
            .unwrap_or_default()
    }

    /// Add `number` variables named `name[i]`, the i-th at `options.offset + i * stride`.
    pub fn add_remote_variables(
        &self,
        name: &str,
        options: RemoteVariableOptions,
        number: usize,
        stride: u64,
    ) -> RegResult<()> {
        self.device_or_err()?;
        for i in 0..number {
            let opts = RemoteVariableOptions {
                offset: options.offset.map(|offset| offset + i as u64 * stride),
                ..options.clone()
            };
            self.add(Variable::remote(&format!("{}[{}]", name, i), opts))?;
        }
        Ok(())
    }

    /// Set the hidden flag of the named variables, or of every variable when `names` is `None`.
    pub fn hide_variables(&self, hidden: bool, names: Option<&[&str]>) -> RegResult<()> {
        match names {
            None => {
                for var in self.variables() {
                    var.set_hidden(hidden);
                }
            }
            Some(names) => {
                for name in names {
                    self.node(name)?.set_hidden(hidden);
                }
            }
        }
        Ok(())
    }

    /// Apply a timeout in seconds to the blocks and transport of a device and its descendants.
    pub fn set_timeout(&self, seconds: f64) -> RegResult<()> {
        let dev = self.device_or_err()?;
        let micros = (seconds * 1_000_000.0) as u64;
        dev.timeout_us.store(micros, Ordering::Relaxed);
        for block in self.blocks() {
            block.set_timeout_us(micros);
        }
        if let Some(transport) = dev.hub().and_then(|hub| hub.transport()) {
            transport.set_timeout(micros);
        }
        for child in self.devices() {
            child.set_timeout(seconds)?;
        }
        Ok(())
    }

    pub fn set_reset_hook(
        &self,
        hook: impl Fn(&Node, ResetKind) + Send + Sync + 'static,
    ) -> RegResult<()> {
        let dev = self.device_or_err()?;
        *dev.reset_hook.write() = Some(Arc::new(hook));
        Ok(())
    }

    /// Run the reset hook of a device, then of every child device in order.
    pub fn dev_reset(&self, kind: ResetKind) -> RegResult<()> {
        let dev = self.device_or_err()?;
        let hook = dev.reset_hook.read().clone();
        if let Some(hook) = hook {
            hook(self, kind);
        }
        for child in self.devices() {
            child.dev_reset(kind)?;
        }
        Ok(())
    }

    /// Negotiate memory access from the own transport, or else from the parent device.
    pub(crate) fn connect_hub(&self) -> RegResult<()> {
        let dev = self.device_or_err()?;
        let transport = dev.mem_base.clone().or_else(|| {
            self.parent_device()
                .and_then(|parent| parent.as_device()?.hub()?.transport().cloned())
        });
        let hub = Hub::negotiate(transport);
        if let Some(transport) = hub.transport() {
            transport.set_timeout(dev.timeout_us());
        }
        dev.hub.call_once(|| hub);
        Ok(())
    }

    /// Create the blocks of a device from its variables.
    pub(crate) fn build_blocks(&self) -> RegResult<()> {
        let dev = self.device_or_err()?;
        let min_access = dev
            .hub()
            .map_or(config::DEFAULT_MIN_ACCESS, |hub| hub.min_access());
        let timeout = dev.timeout_us();
        let mut blocks = vec![];

        let mut remote: Vec<(NodeHandle, Placement)> = vec![];
        for node in self.variables() {
            let Some(var) = node.as_variable() else {
                continue;
            };
            match &var.storage {
                Storage::Local { .. } => {
                    let block = Handle::from(Block::local(self, &node, timeout));
                    var.block.call_once(|| block.create_ref());
                    blocks.push(block);
                }
                Storage::Remote { .. } => {
                    if let Some(placement) = var.placement() {
                        remote.push((node.clone(), placement));
                    }
                }
                Storage::Enable => {}
            }
        }

        let placements: Vec<Placement> = remote.iter().map(|(_, p)| *p).collect();
        let layout = build_layout(&self.path(), &placements, min_access);
        for ((node, _), placement) in remote.iter().zip(&layout.placements) {
            if let Some(Storage::Remote { resolved, .. }) = node.as_variable().map(|v| &v.storage) {
                resolved.call_once(|| *placement);
            }
        }
        for plan in &layout.blocks {
            let members: Vec<NodeHandle> = plan
                .members
                .iter()
                .map(|&idx| remote[idx].0.clone())
                .collect();
            let block = Handle::from(Block::remote(
                self, plan.offset, plan.size, &members, timeout,
            ));
            for member in &members {
                if let Some(var) = member.as_variable() {
                    var.block.call_once(|| block.create_ref());
                }
            }
            blocks.push(block);
        }

        dev.blocks.call_once(|| blocks);
        Ok(())
    }

    /// Fail unless this node is a started device.
    pub(crate) fn started_device_or_err(&self) -> RegResult<&Device> {
        let dev = self.device_or_err()?;
        if dev.blocks.get().is_none() {
            return Err(RegError::NotAttached { path: self.path() });
        }
        Ok(dev)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dev(name: &str, enabled: bool) -> NodeHandle {
        Device::create(
            name,
            DeviceOptions {
                enabled,
                ..Default::default()
            },
        )
    }

    #[test]
    fn enable_is_suppressed_by_any_ancestor() {
        let a = dev("a", true);
        let b = dev("b", false);
        let c = dev("c", true);
        b.add(c.clone()).unwrap();
        a.add(b.clone()).unwrap();
        assert_eq!(a.enable_state(), EnableState::True);
        assert_eq!(b.enable_state(), EnableState::False);
        assert_eq!(c.enable_state(), EnableState::ParentSuppressed);
        b.set_enable(true);
        assert_eq!(c.enable_state(), EnableState::True);
        a.set_enable(false);
        assert_eq!(b.enable_state(), EnableState::ParentSuppressed);
        assert_eq!(c.enable_state(), EnableState::ParentSuppressed);
    }

    #[test]
    fn address_ors_parent_offset() {
        let top = Device::create(
            "top",
            DeviceOptions {
                offset: 0x1000_0000,
                ..Default::default()
            },
        );
        let sub = Device::create(
            "sub",
            DeviceOptions {
                offset: 0x2000,
                ..Default::default()
            },
        );
        top.add(sub.clone()).unwrap();
        assert_eq!(sub.address(), 0x1000_2000);
        assert_eq!(sub.node("enable").unwrap().address(), 0x1000_2000);
    }

    #[test]
    fn own_memory_base_makes_address_absolute() {
        let top = Device::create(
            "top",
            DeviceOptions {
                offset: 0x1000_0000,
                ..Default::default()
            },
        );
        let sub = Device::create(
            "sub",
            DeviceOptions {
                offset: 0x40,
                mem_base: Some(Arc::new(crate::MemoryEmulator::new(4, 64))),
                ..Default::default()
            },
        );
        top.add(sub.clone()).unwrap();
        assert_eq!(sub.address(), 0x40);
    }

    #[test]
    fn array_of_remote_variables() {
        let d = dev("d", true);
        d.add_remote_variables("ch", RemoteVariableOptions::at(0x10, 16), 4, 4)
            .unwrap();
        let group = d.array("ch").unwrap();
        assert_eq!(group.len(), 4);
        let third = group.index(2).unwrap();
        assert_eq!(third.name(), "ch[2]");
        assert_eq!(third.as_variable().unwrap().placement().unwrap().offset, 0x18);
    }
}
