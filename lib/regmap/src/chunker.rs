//! Splitting of logical accesses into bus-sized transactions.
//!
//! Every logical access of a device (one block transaction or one raw access) holds the
//! device memory lock while its chunks are queued, and again while they are awaited and their
//! error state queried. The error state is kept per chunk, so accesses interleaved between the
//! submission and the completion of a block transaction cannot observe each other's faults.

use crate::{
    device::Hub,
    error::{RegError, RegResult},
    node::Node,
    transport::{SharedBuffer, TransactionId, TransactionKind, shared_buffer},
};
use utils::endian::{mask, read_le, write_le};

/// Byte stride of the `raw_*_word` helpers.
pub const DEFAULT_STRIDE: usize = config::DEFAULT_STRIDE as usize;
/// Word width of the `raw_*_word` helpers.
pub const DEFAULT_WORD_BITS: u32 = config::DEFAULT_WORD_BITS as u32;

/// One bus transaction of a logical access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    /// Device-local byte offset.
    pub offset: u64,
    /// Position of the chunk in the caller buffer.
    pub buffer_offset: usize,
    pub size: usize,
}

/// Partition `[offset, offset + len)` into consecutive chunks of at most `max_size` bytes.
pub fn plan_chunks(offset: u64, len: usize, max_size: usize) -> Vec<Chunk> {
    let max_size = max_size.max(1);
    (0..len)
        .step_by(max_size)
        .map(|buffer_offset| Chunk {
            offset: offset + buffer_offset as u64,
            buffer_offset,
            size: max_size.min(len - buffer_offset),
        })
        .collect()
}

/// Chunks queued for one logical access, each with its device-local offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Ticket {
    requests: Vec<(TransactionId, u64)>,
}

/// Data of a raw write.
#[derive(Debug, Clone, Copy)]
pub enum RawData<'a> {
    /// Already-formed byte buffer, sent unchanged.
    Bytes(&'a [u8]),
    /// Words packed one per stride.
    Words(&'a [u64]),
    Word(u64),
}

/// Result of a raw read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawValue {
    Word(u64),
    Words(Vec<u64>),
}

fn check_word(path: &str, stride: usize, word_bits: u32) -> RegResult<()> {
    if word_bits == 0 || word_bits > 64 || word_bits as usize > stride * 8 {
        return Err(RegError::InvalidWidth {
            path: path.into(),
            word_bits,
            stride,
        });
    }
    Ok(())
}

impl RawData<'_> {
    /// Flatten to the byte image written to the bus.
    pub fn flatten(&self, stride: usize, word_bits: u32) -> Vec<u8> {
        let pack = |words: &[u64]| {
            let mut out = vec![0u8; words.len() * stride];
            for (word, slot) in words.iter().zip(out.chunks_mut(stride)) {
                write_le(word & mask(word_bits), slot);
            }
            out
        };
        match self {
            RawData::Bytes(bytes) => bytes.to_vec(),
            RawData::Words(words) => pack(words),
            RawData::Word(word) => pack(&[*word]),
        }
    }
}

/// Unpack `data` into words of `word_bits` bits, one per `stride` bytes.
pub fn unpack(data: &[u8], stride: usize, word_bits: u32) -> RawValue {
    let mut words: Vec<u64> = data
        .chunks(stride)
        .map(|slot| read_le(slot) & mask(word_bits))
        .collect();
    if words.len() == 1 {
        RawValue::Word(words.remove(0))
    } else {
        RawValue::Words(words)
    }
}

impl Node {
    fn hub_or_err(&self) -> RegResult<&Hub> {
        let dev = self.device_or_err()?;
        dev.hub().ok_or_else(|| RegError::NotAttached { path: self.path() })
    }

    fn queue(
        &self,
        hub: &Hub,
        offset: u64,
        buffer: &SharedBuffer,
        kind: TransactionKind,
    ) -> RegResult<Ticket> {
        let transport = hub
            .transport()
            .ok_or_else(|| RegError::NoTransport { path: self.path() })?;
        let len = buffer.lock().len();
        let base = self.address();
        let requests = plan_chunks(offset, len, hub.max_access() as usize)
            .into_iter()
            .map(|chunk| {
                let id = transport.request_transaction(
                    base | chunk.offset,
                    buffer,
                    chunk.size,
                    chunk.buffer_offset,
                    kind,
                );
                (id, chunk.offset)
            })
            .collect();
        Ok(Ticket { requests })
    }

    fn finish(&self, hub: &Hub, ticket: &Ticket) -> RegResult<()> {
        let transport = hub
            .transport()
            .ok_or_else(|| RegError::NoTransport { path: self.path() })?;
        let Some(&(last, _)) = ticket.requests.last() else {
            return Ok(());
        };
        transport.wait_transaction(last);
        let fault = ticket
            .requests
            .iter()
            .find_map(|&(id, offset)| match transport.query_error(id) {
                0 => None,
                code => Some((offset, code)),
            });
        match fault {
            None => Ok(()),
            Some((offset, code)) => Err(RegError::MemoryAccess {
                path: self.path(),
                address: self.address() | offset,
                code,
            }),
        }
    }

    /// Queue the chunks of a transaction over `buffer` at device-local `offset`.
    pub(crate) fn submit(
        &self,
        offset: u64,
        buffer: &SharedBuffer,
        kind: TransactionKind,
    ) -> RegResult<Ticket> {
        let hub = self.hub_or_err()?;
        let _guard = self.device_or_err()?.mem_lock.lock();
        self.queue(hub, offset, buffer, kind)
    }

    /// Wait for the chunks of `ticket` and report the first faulting one.
    pub(crate) fn complete(&self, ticket: &Ticket) -> RegResult<()> {
        let hub = self.hub_or_err()?;
        let _guard = self.device_or_err()?.mem_lock.lock();
        self.finish(hub, ticket)
    }

    fn access(&self, offset: u64, buffer: &SharedBuffer, kind: TransactionKind) -> RegResult<()> {
        let hub = self.hub_or_err()?;
        let _guard = self.device_or_err()?.mem_lock.lock();
        let ticket = self.queue(hub, offset, buffer, kind)?;
        self.finish(hub, &ticket)
    }

    /// Write `data` at device-local `offset`, bypassing blocks.
    pub fn raw_write(
        &self,
        offset: u64,
        data: RawData,
        stride: usize,
        word_bits: u32,
    ) -> RegResult<()> {
        if !matches!(data, RawData::Bytes(_)) {
            check_word(&self.path(), stride, word_bits)?;
        }
        let buffer = shared_buffer(data.flatten(stride, word_bits));
        self.access(offset, &buffer, TransactionKind::Write)
    }

    /// Read `num_words` words at device-local `offset`, bypassing blocks.
    pub fn raw_read(
        &self,
        offset: u64,
        num_words: usize,
        stride: usize,
        word_bits: u32,
    ) -> RegResult<RawValue> {
        check_word(&self.path(), stride, word_bits)?;
        let buffer = shared_buffer(vec![0; num_words * stride]);
        self.access(offset, &buffer, TransactionKind::Read)?;
        let data = buffer.lock();
        Ok(unpack(&data, stride, word_bits))
    }

    /// Write one word of the default width at device-local `offset`.
    pub fn raw_write_word(&self, offset: u64, word: u64) -> RegResult<()> {
        self.raw_write(offset, RawData::Word(word), DEFAULT_STRIDE, DEFAULT_WORD_BITS)
    }

    /// Read one word of the default width at device-local `offset`.
    pub fn raw_read_word(&self, offset: u64) -> RegResult<u64> {
        match self.raw_read(offset, 1, DEFAULT_STRIDE, DEFAULT_WORD_BITS)? {
            RawValue::Word(word) => Ok(word),
            RawValue::Words(words) => Ok(words.first().copied().unwrap_or(0)),
        }
    }

    /// Read `len` bytes at device-local `offset`, bypassing blocks.
    pub fn raw_read_bytes(&self, offset: u64, len: usize) -> RegResult<Vec<u8>> {
        let buffer = shared_buffer(vec![0; len]);
        self.access(offset, &buffer, TransactionKind::Read)?;
        let data = buffer.lock().clone();
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ten_bytes_in_chunks_of_four() {
        let chunks = plan_chunks(0, 10, 4);
        assert_eq!(
            chunks
                .iter()
                .map(|c| (c.buffer_offset, c.size))
                .collect::<Vec<_>>(),
            vec![(0, 4), (4, 4), (8, 2)]
        );
    }

    #[test]
    fn chunks_cover_range_exactly() {
        for len in [0usize, 1, 7, 8, 9, 4096, 4097] {
            for max in [1usize, 3, 4, 4096] {
                let chunks = plan_chunks(0x100, len, max);
                let mut next = 0;
                for chunk in &chunks {
                    assert_eq!(chunk.buffer_offset, next);
                    assert_eq!(chunk.offset, 0x100 + next as u64);
                    assert!(chunk.size <= max && chunk.size > 0);
                    next += chunk.size;
                }
                assert_eq!(next, len);
            }
        }
    }

    #[test]
    fn words_are_masked_before_packing() {
        let data = RawData::Words(&[0x1ff, 0x02]).flatten(2, 8);
        assert_eq!(data, vec![0xff, 0, 0x02, 0]);
        assert_eq!(unpack(&data, 2, 8), RawValue::Words(vec![0xff, 0x02]));
        assert_eq!(unpack(&[0x34, 0x12], 2, 16), RawValue::Word(0x1234));
    }

    #[test]
    fn word_wider_than_stride_is_rejected() {
        assert!(check_word("dev", 2, 32).is_err());
        assert!(check_word("dev", 8, 64).is_ok());
        assert!(check_word("dev", 4, 0).is_err());
    }
}
