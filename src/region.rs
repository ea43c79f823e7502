use crate::block::Block;
use crate::list::{List, Node};
use std::mem;

/// Overhead of the [`Region`] header in bytes, including the [`Node`]
/// wrapper that threads it onto [`crate::pool::MmapPool`]'s region list.
pub(crate) const REGION_HEADER_SIZE: usize = mem::size_of::<Node<Region>>();

/// A single contiguous OS-mapped span of bytes (`spec.md` §3.1).
///
/// ```text
/// +-----------------------------------------------+      +-----------------------------------------------+
/// |        | +-------+    +-------+    +-------+  |      |        | +-------+    +-------+    +-------+  |
/// | Region | | Block | -> | Block | -> | Block |  | ---> | Region | | Block | -> | Block | -> | Block |  |
/// |        | +-------+    +-------+    +-------+  |      |        | +-------+    +-------+    +-------+  |
/// +-----------------------------------------------+      +-----------------------------------------------+
/// ```
///
/// A region's block list is address-ordered, non-empty, and packed without
/// gaps: every block's payload is immediately followed by the next block's
/// header (`spec.md` §3.2).
pub struct Region {
    /// Total mapped byte length, including this header.
    pub size: usize,
    /// Count of currently-allocated (non-free) blocks in this region. When
    /// this reaches zero the region is unmapped (`spec.md` §3.4).
    pub blocks_in_use: usize,
    /// Address-ordered list of blocks living in this region.
    pub blocks: List<Block>,
}

impl Region {
    pub(crate) fn new(size: usize) -> Self {
        Self { size, blocks_in_use: 0, blocks: List::new() }
    }
}
