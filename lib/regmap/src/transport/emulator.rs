use super::{SharedBuffer, TransactionId, TransactionKind, Transport};
use core::ops::Range;
use spin::Mutex;
use std::collections::BTreeMap;
use utils::range::RangeExt;

const PAGE_SIZE: usize = 4096;

/// One transaction seen by a [MemoryEmulator].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRecord {
    pub id: TransactionId,
    pub address: u64,
    pub size: usize,
    pub buffer_offset: usize,
    pub kind: TransactionKind,
}

/// Sparse in-memory transport.
///
/// Transactions complete synchronously at request time. Address ranges registered with
/// [MemoryEmulator::inject_fault] fail with the given code and leave memory untouched. The
/// code stays attached to the failed transaction only.
pub struct MemoryEmulator {
    min_access: u32,
    max_access: u32,
    state: Mutex<EmulatorState>,
}

#[derive(Default)]
struct EmulatorState {
    pages: BTreeMap<u64, Box<[u8; PAGE_SIZE]>>,
    faults: Vec<(Range<u64>, u32)>,
    log: Vec<TransactionRecord>,
    next_id: TransactionId,
    errors: BTreeMap<TransactionId, u32>,
    timeout_us: u64,
}

impl EmulatorState {
    fn read_byte(&self, address: u64) -> u8 {
        let page = address / PAGE_SIZE as u64;
        self.pages
            .get(&page)
            .map_or(0, |p| p[(address % PAGE_SIZE as u64) as usize])
    }

    fn write_byte(&mut self, address: u64, value: u8) {
        let page = address / PAGE_SIZE as u64;
        let data = self
            .pages
            .entry(page)
            .or_insert_with(|| Box::new([0; PAGE_SIZE]));
        data[(address % PAGE_SIZE as u64) as usize] = value;
    }

    fn fault_at(&self, range: &Range<u64>) -> Option<u32> {
        self.faults
            .iter()
            .find(|(fault, _)| fault.overlap(range))
            .map(|(_, code)| *code)
    }
}

impl MemoryEmulator {
    pub fn new(min_access: u32, max_access: u32) -> MemoryEmulator {
        MemoryEmulator {
            min_access,
            max_access,
            state: Mutex::new(EmulatorState::default()),
        }
    }

    /// Fail every transaction touching `range` with `code`.
    pub fn inject_fault(&self, range: Range<u64>, code: u32) {
        self.state.lock().faults.push((range, code));
    }

    pub fn clear_faults(&self) {
        self.state.lock().faults.clear();
    }

    /// All transactions requested so far, in request order.
    pub fn transactions(&self) -> Vec<TransactionRecord> {
        self.state.lock().log.clone()
    }

    pub fn clear_log(&self) {
        self.state.lock().log.clear();
    }

    /// Read memory content without issuing a transaction.
    pub fn peek(&self, address: u64, len: usize) -> Vec<u8> {
        let state = self.state.lock();
        (0..len as u64).map(|i| state.read_byte(address + i)).collect()
    }

    /// Write memory content without issuing a transaction.
    pub fn poke(&self, address: u64, data: &[u8]) {
        let mut state = self.state.lock();
        for (i, byte) in data.iter().enumerate() {
            state.write_byte(address + i as u64, *byte);
        }
    }

    /// Last timeout set through [Transport::set_timeout].
    pub fn timeout_us(&self) -> u64 {
        self.state.lock().timeout_us
    }
}

impl Transport for MemoryEmulator {
    fn request_transaction(
        &self,
        address: u64,
        buffer: &SharedBuffer,
        size: usize,
        buffer_offset: usize,
        kind: TransactionKind,
    ) -> TransactionId {
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id = state.next_id.wrapping_add(1);
        state.log.push(TransactionRecord {
            id,
            address,
            size,
            buffer_offset,
            kind,
        });

        state.errors.remove(&id);
        if let Some(code) = state.fault_at(&(address..address + size as u64)) {
            state.errors.insert(id, code);
            return id;
        }

        let mut data = buffer.lock();
        let end = (buffer_offset + size).min(data.len());
        let slice = &mut data[buffer_offset.min(end)..end];
        match kind {
            TransactionKind::Write => {
                for (i, byte) in slice.iter().enumerate() {
                    state.write_byte(address + i as u64, *byte);
                }
            }
            TransactionKind::Read | TransactionKind::Verify => {
                for (i, byte) in slice.iter_mut().enumerate() {
                    *byte = state.read_byte(address + i as u64);
                }
            }
        }
        id
    }

    fn wait_transaction(&self, _id: TransactionId) {}

    fn query_error(&self, id: TransactionId) -> u32 {
        self.state.lock().errors.get(&id).copied().unwrap_or(0)
    }

    fn query_min_access_size(&self) -> u32 {
        self.min_access
    }

    fn query_max_access_size(&self) -> u32 {
        self.max_access
    }

    fn set_timeout(&self, micros: u64) {
        self.state.lock().timeout_us = micros;
    }
}
