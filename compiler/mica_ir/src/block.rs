//! Basic blocks.

use crate::ops::Op;

/// Index of a basic block within its function's `blocks` vector.
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct BlockId(u32);

impl BlockId {
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        BlockId(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Debug for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BlockId({})", self.0)
    }
}

/// Basic IR block.
///
/// Ends with a jump, branch, or return. While building IR, ops that raise
/// may appear mid-block with their error conditions unchecked; the
/// exception-splitting transform later adds explicit checks and splits
/// blocks so that a control op only ever appears last.
///
/// `error_handler` names the block to jump to when an error occurs; when
/// absent, errors propagate out of the function. It is a back reference by
/// id, never ownership, and is compiled away by the splitting transform.
#[derive(Clone, Debug, PartialEq)]
pub struct BasicBlock {
    /// Printable label filled in by numbering passes; `-1` until then.
    pub label: i64,
    pub ops: Vec<Op>,
    pub error_handler: Option<BlockId>,
}

impl BasicBlock {
    pub fn new() -> Self {
        BasicBlock {
            label: -1,
            ops: Vec::new(),
            error_handler: None,
        }
    }

    /// Does the block end in a control-flow op?
    pub fn terminated(&self) -> bool {
        self.ops.last().is_some_and(Op::is_control)
    }
}

impl Default for BasicBlock {
    fn default() -> Self {
        BasicBlock::new()
    }
}
