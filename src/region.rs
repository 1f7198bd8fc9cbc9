use crate::module::FuncId;
use crate::ops::{Opr, Val};
use slotmap::new_key_type;
use smallvec::SmallVec;

new_key_type! {
    pub struct RegionId;
    pub struct BlockId;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegionParent {
    Function(FuncId),
    Op(Opr),
}

#[derive(Clone, Debug)]
pub struct Region {
    pub blocks: Vec<BlockId>,
    pub parent: RegionParent,
}

impl Region {
    pub fn new(parent: RegionParent) -> Self {
        Self {
            blocks: Vec::new(),
            parent,
        }
    }

    pub fn entry_block(&self) -> Option<BlockId> {
        self.blocks.first().copied()
    }
}

#[derive(Clone, Debug)]
pub struct Block {
    pub args: SmallVec<[Val; 4]>,
    pub ops: Vec<Opr>,
    pub parent: RegionId,
}

impl Block {
    pub fn new(parent: RegionId) -> Self {
        Self {
            args: SmallVec::new(),
            ops: Vec::new(),
            parent,
        }
    }

    pub fn position(&self, op: Opr) -> Option<usize> {
        self.ops.iter().position(|&o| o == op)
    }

    pub fn terminator(&self) -> Option<Opr> {
        self.ops.last().copied()
    }
}
