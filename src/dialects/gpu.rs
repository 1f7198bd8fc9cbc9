//! Device launches and kernel-side intrinsics (`gpu` dialect).

use crate::attribute::Attribute;
use crate::ops::{OpDef, OpData, OperationState, Val};
use crate::types::TypeId;
use crate::Op;

/// Inline device launch.
///
/// Operands are the grid sizes of the block-parallel dimensions followed by
/// the sizes of the thread-parallel dimensions (`num_block_dims` and
/// `num_thread_dims` attributes). The body block receives the matching block
/// ids then thread ids as `index` arguments and may use any value of the
/// enclosing function.
#[derive(Op)]
#[operation(dialect = "gpu", name = "launch", results = 0, regions = 1)]
pub struct LaunchOp;

#[derive(Op)]
#[operation(dialect = "gpu", name = "terminator", traits = "Terminator", operands = 0, results = 0)]
pub struct TerminatorOp;

/// Launch of an outlined kernel: dimension sizes as for `gpu.launch`, then
/// the kernel arguments. `kernel` names the callee.
#[derive(Op)]
#[operation(dialect = "gpu", name = "launch_func", results = 0, regions = 0)]
pub struct LaunchFuncOp;

#[derive(Op)]
#[operation(dialect = "gpu", name = "thread_id", traits = "Pure", operands = 0, results = 1)]
pub struct ThreadIdOp;

#[derive(Op)]
#[operation(dialect = "gpu", name = "block_id", traits = "Pure", operands = 0, results = 1)]
pub struct BlockIdOp;

#[derive(Op)]
#[operation(dialect = "gpu", name = "block_dim", traits = "Pure", operands = 0, results = 1)]
pub struct BlockDimOp;

#[derive(Op)]
#[operation(dialect = "gpu", name = "grid_dim", traits = "Pure", operands = 0, results = 1)]
pub struct GridDimOp;

#[derive(Op)]
#[operation(dialect = "gpu", name = "return", traits = "Terminator", operands = 0, results = 0)]
pub struct ReturnOp;

pub const MAX_DIMS: usize = 3;

const DIMENSIONS: [&str; MAX_DIMS] = ["x", "y", "z"];

pub fn dimension_name(index: usize) -> Option<&'static str> {
    DIMENSIONS.get(index).copied()
}

pub fn dimension_index(name: &str) -> Option<usize> {
    DIMENSIONS.iter().position(|&d| d == name)
}

/// Block/thread dimension counts carried by `gpu.launch` and
/// `gpu.launch_func`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LaunchDims {
    pub num_block_dims: usize,
    pub num_thread_dims: usize,
}

impl LaunchDims {
    pub fn total(&self) -> usize {
        self.num_block_dims + self.num_thread_dims
    }

    pub fn of(op: &OpData) -> Option<Self> {
        if !LaunchOp::matches(op) && !LaunchFuncOp::matches(op) {
            return None;
        }
        Some(Self {
            num_block_dims: usize::try_from(op.int_attr("num_block_dims")?).ok()?,
            num_thread_dims: usize::try_from(op.int_attr("num_thread_dims")?).ok()?,
        })
    }
}

pub fn launch(dims: LaunchDims, block_sizes: &[Val], thread_sizes: &[Val]) -> OperationState {
    OperationState::new::<LaunchOp>()
        .operands(block_sizes.iter().copied())
        .operands(thread_sizes.iter().copied())
        .attr("num_block_dims", Attribute::Integer(dims.num_block_dims as i64))
        .attr("num_thread_dims", Attribute::Integer(dims.num_thread_dims as i64))
        .regions(1)
}

pub fn launch_func(kernel: &str, dims: LaunchDims, sizes: &[Val], args: &[Val]) -> OperationState {
    OperationState::new::<LaunchFuncOp>()
        .operands(sizes.iter().copied())
        .operands(args.iter().copied())
        .attr("kernel", Attribute::Symbol(kernel.to_string()))
        .attr("num_block_dims", Attribute::Integer(dims.num_block_dims as i64))
        .attr("num_thread_dims", Attribute::Integer(dims.num_thread_dims as i64))
}

/// Kernel arguments of a `gpu.launch_func` (operands after the sizes).
pub fn kernel_operands(op: &OpData) -> Option<&[Val]> {
    let dims = LaunchDims::of(op)?;
    op.operands.get(dims.total()..)
}

pub fn id_op<T: OpDef>(dimension: &str, index_ty: TypeId) -> OperationState {
    OperationState::new::<T>()
        .result(index_ty)
        .attr("dimension", Attribute::String(dimension.to_string()))
}

pub fn terminator() -> OperationState {
    OperationState::new::<TerminatorOp>()
}

pub fn ret() -> OperationState {
    OperationState::new::<ReturnOp>()
}
