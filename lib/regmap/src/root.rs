//! The top device of a tree and the one-time attachment of everything below it.

use crate::{
    device::{Device, DeviceOptions},
    error::{RegError, RegResult},
    node::{Node, NodeHandle},
    transport::Transport,
};
use log::info;
use std::sync::Arc;
use utils::impl_deref;

pub struct Root {
    inner: NodeHandle,
}
impl_deref!(Root, NodeHandle);

impl Root {
    /// A root device reaching the bus through `transport`. Without a transport, hardware access
    /// fails with [RegError::NoTransport] and local variables still work.
    pub fn new(name: &str, description: &str, transport: Option<Arc<dyn Transport>>) -> Root {
        Root {
            inner: Device::create(
                name,
                DeviceOptions {
                    description: description.into(),
                    mem_base: transport,
                    ..Default::default()
                },
            ),
        }
    }

    pub fn as_handle(&self) -> &NodeHandle {
        &self.inner
    }

    /// Attach the whole tree: negotiate access and build the blocks of every device,
    /// depth-first. After this the shape of the tree is frozen.
    pub fn start(&self) -> RegResult<()> {
        if self.inner.is_attached() {
            return Err(RegError::TreeAlreadyRooted {
                parent: self.inner.path(),
                name: self.inner.name().into(),
            });
        }
        self.inner.root_attached()?;
        info!("Started tree '{}'", self.inner.path());
        Ok(())
    }

    /// Write every bulk block of the tree regardless of staleness.
    pub fn write_all(&self) -> RegResult<()> {
        self.inner.started_device_or_err()?;
        self.inner.write_blocks(true, true, None)?;
        self.inner.check_blocks(true, None)
    }

    /// Read every bulk block of the tree.
    pub fn read_all(&self) -> RegResult<()> {
        self.inner.started_device_or_err()?;
        self.inner.read_blocks(true, None)?;
        self.inner.check_blocks(true, None)
    }

    /// Read back and compare every bulk block of the tree.
    pub fn verify_all(&self) -> RegResult<()> {
        self.inner.started_device_or_err()?;
        self.inner.verify_blocks(true, None)?;
        self.inner.check_blocks(true, None)
    }
}

impl Node {
    fn root_attached(&self) -> RegResult<()> {
        self.mark_attached();
        if self.is_device() {
            self.connect_hub()?;
            self.build_blocks()?;
        }
        for child in self.nodes() {
            child.root_attached()?;
        }
        Ok(())
    }
}
