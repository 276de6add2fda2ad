//! Block construction for the hardware-backed variables of one device.
//!
//! Variables are first aligned down to the bus minimum access size. Placements whose start
//! falls inside the span of the previous placement (after sorting) are shifted down onto that
//! placement and the scan restarts, until no true overlap remains. Placements sharing a start
//! offset end up in the same block, sized to the widest of them.

use crate::debug_ex;
use core::ops::Range;
use log::warn;
use utils::{
    num::{AlignableTo, div_ceil},
    range::RangeExt,
};

/// Position of a hardware-backed variable inside its device's address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    /// Byte offset of the word holding the variable.
    pub offset: u64,
    /// Bit position of the variable, counted from `offset`.
    pub bit_offset: u32,
    /// Width of the variable in bits.
    pub bit_size: u32,
}

impl Placement {
    pub const fn new(offset: u64, bit_offset: u32, bit_size: u32) -> Placement {
        Placement {
            offset,
            bit_offset,
            bit_size,
        }
    }

    /// Bytes occupied from `offset`, rounded up to `min_access`. Never less than `min_access`.
    pub fn byte_span(&self, min_access: u64) -> u64 {
        let bytes = div_ceil((self.bit_offset + self.bit_size) as u64, 8);
        bytes.align_up(min_access).max(min_access)
    }

    pub fn span(&self, min_access: u64) -> Range<u64> {
        self.offset..self.offset + self.byte_span(min_access)
    }

    /// Move the start down by `amount` bytes while keeping the variable's bits in place.
    pub fn shift_down(&mut self, amount: u64) {
        self.offset -= amount;
        self.bit_offset += (amount * 8) as u32;
    }
}

/// A block to be created, covering `members` (indices into the input placements).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockPlan {
    pub offset: u64,
    pub size: u64,
    pub members: Vec<usize>,
}

/// Result of [build_layout].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    /// Final placements, in input order.
    pub placements: Vec<Placement>,
    /// Blocks in ascending offset order.
    pub blocks: Vec<BlockPlan>,
    /// Number of overlap shifts performed.
    pub shifts: usize,
}

/// Resolve overlaps among `placements` and group them into blocks.
///
/// `context` names the device in log messages.
///
/// # Panics
/// Panics if overlap resolution does not converge within one shift per placement.
pub fn build_layout(context: &str, placements: &[Placement], min_access: u64) -> Layout {
    let min_access = min_access.max(1);
    let mut placed: Vec<Placement> = placements.to_vec();
    for placement in placed.iter_mut() {
        let excess = placement.offset % min_access;
        if excess != 0 {
            placement.shift_down(excess);
        }
    }

    let mut order: Vec<usize> = (0..placed.len()).collect();
    let mut shifts = 0;
    loop {
        order.sort_by_key(|&idx| (placed[idx].offset, placed[idx].byte_span(min_access)));
        let overlap = (1..order.len()).find(|&k| {
            let cur = &placed[order[k]];
            let prev = &placed[order[k - 1]];
            cur.offset != prev.offset && prev.span(min_access).contains(&cur.offset)
        });
        let Some(k) = overlap else {
            break;
        };
        if shifts >= placed.len() {
            panic!(
                "Overlap resolution for '{}' did not converge after {} shifts.",
                context, shifts
            );
        }
        let prev = placed[order[k - 1]];
        let cur = &mut placed[order[k]];
        warn!(
            "Overlap detected in '{}': cur offset={:#x} prev offset={:#x} prev bytes={}",
            context,
            cur.offset,
            prev.offset,
            prev.byte_span(min_access)
        );
        let diff = cur.offset - prev.offset;
        cur.shift_down(diff.align_down(min_access));
        shifts += 1;
    }

    let mut blocks: Vec<BlockPlan> = vec![];
    for &idx in &order {
        let placement = &placed[idx];
        let span = placement.byte_span(min_access);
        match blocks.iter_mut().find(|b| b.offset == placement.offset) {
            Some(block) => {
                block.size = block.size.max(span);
                block.members.push(idx);
            }
            None => {
                debug_ex!(
                    "Adding new block to '{}' at offset {:#x}",
                    context,
                    placement.offset
                );
                blocks.push(BlockPlan {
                    offset: placement.offset,
                    size: span,
                    members: vec![idx],
                });
            }
        }
    }
    debug_assert!(blocks.iter().all(|block| {
        let range = block.offset..block.offset + block.size;
        block
            .members
            .iter()
            .all(|&idx| range.covers(&placed[idx].span(min_access)))
    }));
    debug_assert!(blocks.windows(2).all(|pair| {
        let a = pair[0].offset..pair[0].offset + pair[0].size;
        let b = pair[1].offset..pair[1].offset + pair[1].size;
        !a.overlap(&b)
    }));

    Layout {
        placements: placed,
        blocks,
        shifts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(offset: u64, bits: u32) -> Placement {
        Placement::new(offset, 0, bits)
    }

    #[test]
    fn disjoint_variables_get_one_block_each() {
        let layout = build_layout("dev", &[word(0, 32), word(4, 32), word(8, 16)], 4);
        assert_eq!(layout.shifts, 0);
        assert_eq!(layout.blocks.len(), 3);
        assert_eq!(
            layout.blocks.iter().map(|b| (b.offset, b.size)).collect::<Vec<_>>(),
            vec![(0, 4), (4, 4), (8, 4)]
        );
    }

    #[test]
    fn unaligned_variable_joins_the_word_below() {
        let layout = build_layout("dev", &[word(0, 32), word(2, 16)], 4);
        assert_eq!(layout.placements[1], Placement::new(0, 16, 16));
        assert_eq!(layout.blocks.len(), 1);
        assert_eq!(layout.blocks[0].size, 4);
        assert_eq!(layout.blocks[0].members, vec![0, 1]);
    }

    #[test]
    fn true_overlap_is_shifted_and_warned() {
        let layout = build_layout("dev", &[word(0, 64), word(4, 32)], 4);
        assert_eq!(layout.shifts, 1);
        assert_eq!(layout.placements[1], Placement::new(0, 32, 32));
        assert_eq!(layout.blocks.len(), 1);
        assert_eq!(layout.blocks[0].size, 8);
    }

    #[test]
    fn rebuilding_a_resolved_layout_is_idempotent() {
        let first = build_layout("dev", &[word(0, 96), word(4, 32), word(8, 8), word(16, 8)], 4);
        assert!(first.shifts > 0);
        let second = build_layout("dev", &first.placements, 4);
        assert_eq!(second.shifts, 0);
        assert_eq!(second.placements, first.placements);
        assert_eq!(second.blocks, first.blocks);
    }

    #[test]
    fn cascading_overlaps_converge() {
        // Shifting the second placement widens the first block, which then covers the third.
        let layout = build_layout("dev", &[word(0, 64), word(4, 64), word(8, 32)], 4);
        assert_eq!(layout.blocks.len(), 1);
        assert_eq!(layout.blocks[0].offset, 0);
        assert_eq!(layout.blocks[0].size, 12);
        assert_eq!(layout.shifts, 2);
    }

    #[test]
    fn empty_input_builds_nothing() {
        let layout = build_layout("dev", &[], 4);
        assert!(layout.blocks.is_empty());
        assert_eq!(layout.shifts, 0);
    }
}
