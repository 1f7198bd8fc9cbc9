//! PTX special-register reads (`nvvm` dialect). Every op yields `!llvm.i32`.

use crate::ops::{OpDef, OpInfo};
use crate::Op;

#[derive(Op)]
#[operation(dialect = "nvvm", name = "read.ptx.sreg.tid.x", traits = "Pure", operands = 0, results = 1)]
pub struct ThreadIdXOp;

#[derive(Op)]
#[operation(dialect = "nvvm", name = "read.ptx.sreg.tid.y", traits = "Pure", operands = 0, results = 1)]
pub struct ThreadIdYOp;

#[derive(Op)]
#[operation(dialect = "nvvm", name = "read.ptx.sreg.tid.z", traits = "Pure", operands = 0, results = 1)]
pub struct ThreadIdZOp;

#[derive(Op)]
#[operation(dialect = "nvvm", name = "read.ptx.sreg.ctaid.x", traits = "Pure", operands = 0, results = 1)]
pub struct BlockIdXOp;

#[derive(Op)]
#[operation(dialect = "nvvm", name = "read.ptx.sreg.ctaid.y", traits = "Pure", operands = 0, results = 1)]
pub struct BlockIdYOp;

#[derive(Op)]
#[operation(dialect = "nvvm", name = "read.ptx.sreg.ctaid.z", traits = "Pure", operands = 0, results = 1)]
pub struct BlockIdZOp;

#[derive(Op)]
#[operation(dialect = "nvvm", name = "read.ptx.sreg.ntid.x", traits = "Pure", operands = 0, results = 1)]
pub struct BlockDimXOp;

#[derive(Op)]
#[operation(dialect = "nvvm", name = "read.ptx.sreg.ntid.y", traits = "Pure", operands = 0, results = 1)]
pub struct BlockDimYOp;

#[derive(Op)]
#[operation(dialect = "nvvm", name = "read.ptx.sreg.ntid.z", traits = "Pure", operands = 0, results = 1)]
pub struct BlockDimZOp;

#[derive(Op)]
#[operation(dialect = "nvvm", name = "read.ptx.sreg.nctaid.x", traits = "Pure", operands = 0, results = 1)]
pub struct GridDimXOp;

#[derive(Op)]
#[operation(dialect = "nvvm", name = "read.ptx.sreg.nctaid.y", traits = "Pure", operands = 0, results = 1)]
pub struct GridDimYOp;

#[derive(Op)]
#[operation(dialect = "nvvm", name = "read.ptx.sreg.nctaid.z", traits = "Pure", operands = 0, results = 1)]
pub struct GridDimZOp;

/// Which hardware index a `gpu` id op reads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpecialRegister {
    ThreadId,
    BlockId,
    BlockDim,
    GridDim,
}

/// Register read op for `register` along dimension `dim` (0 = x).
pub fn register_op(register: SpecialRegister, dim: usize) -> Option<&'static OpInfo> {
    let table: [fn() -> &'static OpInfo; 3] = match register {
        SpecialRegister::ThreadId => [ThreadIdXOp::info, ThreadIdYOp::info, ThreadIdZOp::info],
        SpecialRegister::BlockId => [BlockIdXOp::info, BlockIdYOp::info, BlockIdZOp::info],
        SpecialRegister::BlockDim => [BlockDimXOp::info, BlockDimYOp::info, BlockDimZOp::info],
        SpecialRegister::GridDim => [GridDimXOp::info, GridDimYOp::info, GridDimZOp::info],
    };
    table.get(dim).map(|info| info())
}
