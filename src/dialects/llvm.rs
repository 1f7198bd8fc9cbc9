//! Low-level target ops (`llvm` dialect). Lowered kernels consist only of
//! these and the `nvvm` intrinsics.

use crate::attribute::Attribute;
use crate::ops::{OpDef, OperationState, Val};
use crate::types::TypeId;
use crate::Op;

#[derive(Op)]
#[operation(dialect = "llvm", name = "mlir.constant", traits = "Pure", operands = 0, results = 1)]
pub struct ConstantOp;

#[derive(Op)]
#[operation(dialect = "llvm", name = "add", traits = "Pure, SameOperandsAndResultType", operands = 2, results = 1)]
pub struct AddOp;

#[derive(Op)]
#[operation(dialect = "llvm", name = "sub", traits = "Pure, SameOperandsAndResultType", operands = 2, results = 1)]
pub struct SubOp;

#[derive(Op)]
#[operation(dialect = "llvm", name = "mul", traits = "Pure, SameOperandsAndResultType", operands = 2, results = 1)]
pub struct MulOp;

#[derive(Op)]
#[operation(dialect = "llvm", name = "sdiv", traits = "Pure, SameOperandsAndResultType", operands = 2, results = 1)]
pub struct SDivOp;

#[derive(Op)]
#[operation(dialect = "llvm", name = "fadd", traits = "Pure, SameOperandsAndResultType", operands = 2, results = 1)]
pub struct FAddOp;

#[derive(Op)]
#[operation(dialect = "llvm", name = "fsub", traits = "Pure, SameOperandsAndResultType", operands = 2, results = 1)]
pub struct FSubOp;

#[derive(Op)]
#[operation(dialect = "llvm", name = "fmul", traits = "Pure, SameOperandsAndResultType", operands = 2, results = 1)]
pub struct FMulOp;

#[derive(Op)]
#[operation(dialect = "llvm", name = "fdiv", traits = "Pure, SameOperandsAndResultType", operands = 2, results = 1)]
pub struct FDivOp;

#[derive(Op)]
#[operation(dialect = "llvm", name = "and", traits = "Pure, SameOperandsAndResultType", operands = 2, results = 1)]
pub struct AndOp;

#[derive(Op)]
#[operation(dialect = "llvm", name = "icmp", traits = "Pure", operands = 2, results = 1)]
pub struct ICmpOp;

#[derive(Op)]
#[operation(dialect = "llvm", name = "fcmp", traits = "Pure", operands = 2, results = 1)]
pub struct FCmpOp;

#[derive(Op)]
#[operation(dialect = "llvm", name = "select", traits = "Pure", operands = 3, results = 1)]
pub struct SelectOp;

#[derive(Op)]
#[operation(dialect = "llvm", name = "sext", traits = "Pure", operands = 1, results = 1)]
pub struct SExtOp;

#[derive(Op)]
#[operation(dialect = "llvm", name = "trunc", traits = "Pure", operands = 1, results = 1)]
pub struct TruncOp;

/// `getelementptr %base[%offset]`
#[derive(Op)]
#[operation(dialect = "llvm", name = "getelementptr", traits = "Pure", operands = 2, results = 1)]
pub struct GepOp;

#[derive(Op)]
#[operation(dialect = "llvm", name = "load", operands = 1, results = 1)]
pub struct LoadOp;

/// `store %value, %ptr`
#[derive(Op)]
#[operation(dialect = "llvm", name = "store", operands = 2, results = 0)]
pub struct StoreOp;

#[derive(Op)]
#[operation(dialect = "llvm", name = "return", traits = "Terminator", results = 0)]
pub struct ReturnOp;

pub fn constant(ty: TypeId, value: Attribute) -> OperationState {
    OperationState::new::<ConstantOp>()
        .result(ty)
        .attr("value", value)
}

pub fn binary<T: OpDef>(lhs: Val, rhs: Val, ty: TypeId) -> OperationState {
    OperationState::new::<T>().operands([lhs, rhs]).result(ty)
}

pub fn cast<T: OpDef>(input: Val, ty: TypeId) -> OperationState {
    OperationState::new::<T>().operand(input).result(ty)
}

pub fn gep(base: Val, offset: Val, ptr_ty: TypeId) -> OperationState {
    OperationState::new::<GepOp>()
        .operands([base, offset])
        .result(ptr_ty)
}

pub fn load(ptr: Val, ty: TypeId) -> OperationState {
    OperationState::new::<LoadOp>().operand(ptr).result(ty)
}

pub fn store(value: Val, ptr: Val) -> OperationState {
    OperationState::new::<StoreOp>().operands([value, ptr])
}

pub fn ret(values: &[Val]) -> OperationState {
    OperationState::new::<ReturnOp>().operands(values.iter().copied())
}
