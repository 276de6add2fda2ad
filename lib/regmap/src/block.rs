//! Memory blocks: the unit of bus access for the variables of a device.
//!
//! A remote block mirrors a contiguous, min-access aligned byte range of its device and hosts
//! one or more hardware-backed variables. A local block hosts a single software variable and
//! never reaches the bus; it only tracks staleness and listener notification.

use crate::{
    builder::Placement,
    chunker::Ticket,
    error::{RegError, RegResult},
    node::{Node, NodeHandle},
    transport::{SharedBuffer, TransactionKind, shared_buffer},
    value::Mode,
};
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use spin::Mutex;
use utils::{
    endian::{get_bits, mask, set_bits},
    handle::HandleRef,
};

struct Pending {
    kind: TransactionKind,
    ticket: Option<Ticket>,
    verify: Option<SharedBuffer>,
}

pub struct Block {
    offset: u64,
    size: u64,
    mode: Mode,
    bulk_enable: bool,
    remote: bool,
    data: SharedBuffer,
    stale: AtomicBool,
    timeout_us: AtomicU64,
    device: HandleRef<Node>,
    variables: Vec<HandleRef<Node>>,
    pending: Mutex<Option<Pending>>,
}

impl Block {
    /// A block covering `size` bytes at `offset` of `device`, hosting `members`.
    pub(crate) fn remote(
        device: &Node,
        offset: u64,
        size: u64,
        members: &[NodeHandle],
        timeout_us: u64,
    ) -> Block {
        let variables = members.iter().filter_map(|n| n.as_variable());
        let mode = variables
            .clone()
            .map(|v| v.mode())
            .reduce(Mode::combine)
            .unwrap_or_default();
        let bulk_enable = variables.clone().any(|v| v.is_bulk());
        Block {
            offset,
            size,
            mode,
            bulk_enable,
            remote: true,
            data: shared_buffer(vec![0; size as usize]),
            stale: AtomicBool::new(false),
            timeout_us: AtomicU64::new(timeout_us),
            device: device.create_ref(),
            variables: members.iter().map(|n| n.create_ref()).collect(),
            pending: Mutex::new(None),
        }
    }

    /// A dedicated block for the software variable `member`.
    pub(crate) fn local(device: &Node, member: &Node, timeout_us: u64) -> Block {
        let (mode, bulk_enable) = member
            .as_variable()
            .map_or((Mode::ReadWrite, false), |v| (v.mode(), v.is_bulk()));
        Block {
            offset: 0,
            size: 0,
            mode,
            bulk_enable,
            remote: false,
            data: shared_buffer(vec![]),
            stale: AtomicBool::new(false),
            timeout_us: AtomicU64::new(timeout_us),
            device: device.create_ref(),
            variables: vec![member.create_ref()],
            pending: Mutex::new(None),
        }
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_remote(&self) -> bool {
        self.remote
    }

    pub fn bulk_enable(&self) -> bool {
        self.bulk_enable
    }

    /// Content differs from the last confirmed hardware state.
    pub fn stale(&self) -> bool {
        self.stale.load(Ordering::Acquire)
    }

    pub(crate) fn mark_stale(&self) {
        self.stale.store(true, Ordering::Release);
    }

    pub fn timeout_us(&self) -> u64 {
        self.timeout_us.load(Ordering::Relaxed)
    }

    pub(crate) fn set_timeout_us(&self, micros: u64) {
        self.timeout_us.store(micros, Ordering::Relaxed);
    }

    /// Variables hosted by this block that are still alive.
    pub fn variables(&self) -> Vec<NodeHandle> {
        self.variables
            .iter()
            .filter_map(|v| v.get_handle())
            .collect()
    }

    /// Whether `node` is one of the variables hosted by this block.
    pub fn hosts(&self, node: &NodeHandle) -> bool {
        self.variables.iter().any(|v| v.refers_to(node))
    }

    /// Copy of the cached block content.
    pub fn bytes(&self) -> Vec<u8> {
        self.data.lock().clone()
    }

    fn bit_position(&self, placement: &Placement) -> usize {
        ((placement.offset - self.offset) * 8) as usize + placement.bit_offset as usize
    }

    pub(crate) fn get_bits(&self, placement: &Placement) -> u64 {
        get_bits(
            &self.data.lock(),
            self.bit_position(placement),
            placement.bit_size,
        )
    }

    pub(crate) fn set_bits(&self, placement: &Placement, value: u64) {
        set_bits(
            &mut self.data.lock(),
            self.bit_position(placement),
            placement.bit_size,
            value,
        );
        self.mark_stale();
    }

    fn device(&self) -> RegResult<NodeHandle> {
        self.device.get_handle().ok_or_else(|| RegError::NotAttached {
            path: String::from("<dropped device>"),
        })
    }

    fn allows(&self, kind: TransactionKind) -> bool {
        match kind {
            TransactionKind::Write => self.mode.writable(),
            TransactionKind::Read => self.mode.readable(),
            TransactionKind::Verify => self.mode == Mode::ReadWrite,
        }
    }

    /// Start a transaction of `kind` over the whole block without waiting for it.
    ///
    /// Kinds the block mode does not allow are skipped.
    pub fn background_transaction(&self, kind: TransactionKind) -> RegResult<()> {
        if !self.allows(kind) {
            return Ok(());
        }
        if !self.remote {
            *self.pending.lock() = Some(Pending {
                kind,
                ticket: None,
                verify: None,
            });
            return Ok(());
        }
        let device = self.device()?;
        let (buffer, verify) = match kind {
            TransactionKind::Verify => {
                let buffer = shared_buffer(vec![0; self.size as usize]);
                (buffer.clone(), Some(buffer))
            }
            _ => (self.data.clone(), None),
        };
        let ticket = device.submit(self.offset, &buffer, kind)?;
        *self.pending.lock() = Some(Pending {
            kind,
            ticket: Some(ticket),
            verify,
        });
        Ok(())
    }

    /// Complete the pending transaction, if any, and notify the hosted variables.
    ///
    /// A failed transaction is consumed without clearing the stale flag or notifying.
    pub fn check_transaction(&self) -> RegResult<()> {
        let Some(pending) = self.pending.lock().take() else {
            return Ok(());
        };
        if let Some(ticket) = &pending.ticket {
            let device = self.device()?;
            device.complete(ticket)?;
            if let Some(verify) = pending.verify {
                self.compare(&device, &verify.lock())?;
            }
        }
        if matches!(pending.kind, TransactionKind::Write | TransactionKind::Read) {
            self.stale.store(false, Ordering::Release);
        }
        for variable in self.variables() {
            variable.updated();
        }
        Ok(())
    }

    /// Compare read-back data against the cached content under the bits of writable and
    /// readable variables.
    fn compare(&self, device: &Node, readback: &[u8]) -> RegResult<()> {
        let mut care = vec![0u8; self.size as usize];
        for variable in self.variables() {
            let Some(var) = variable.as_variable() else {
                continue;
            };
            if var.mode() != Mode::ReadWrite {
                continue;
            }
            if let Some(placement) = var.placement() {
                set_bits(
                    &mut care,
                    self.bit_position(&placement),
                    placement.bit_size,
                    mask(placement.bit_size),
                );
            }
        }
        let data = self.data.lock();
        let mismatch = care
            .iter()
            .zip(data.iter().zip(readback))
            .position(|(m, (a, b))| (a ^ b) & m != 0);
        match mismatch {
            Some(pos) => Err(RegError::VerifyMismatch {
                path: device.path(),
                address: device.address() | (self.offset + pos as u64),
            }),
            None => Ok(()),
        }
    }
}
