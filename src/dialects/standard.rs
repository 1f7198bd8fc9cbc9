//! Scalar arithmetic, memory access and control ops (`std` dialect).

use crate::attribute::Attribute;
use crate::ops::{OperationState, Val};
use crate::types::TypeId;
use crate::Op;

#[derive(Op)]
#[operation(dialect = "std", name = "constant", traits = "Pure", operands = 0, results = 1)]
pub struct ConstantOp;

#[derive(Op)]
#[operation(
    dialect = "std",
    name = "addi",
    traits = "Pure, SameOperandsAndResultType",
    operands = 2,
    results = 1
)]
pub struct AddIOp;

#[derive(Op)]
#[operation(
    dialect = "std",
    name = "subi",
    traits = "Pure, SameOperandsAndResultType",
    operands = 2,
    results = 1
)]
pub struct SubIOp;

#[derive(Op)]
#[operation(
    dialect = "std",
    name = "muli",
    traits = "Pure, SameOperandsAndResultType",
    operands = 2,
    results = 1
)]
pub struct MulIOp;

#[derive(Op)]
#[operation(
    dialect = "std",
    name = "divis",
    traits = "Pure, SameOperandsAndResultType",
    operands = 2,
    results = 1
)]
pub struct DivISOp;

#[derive(Op)]
#[operation(
    dialect = "std",
    name = "addf",
    traits = "Pure, SameOperandsAndResultType",
    operands = 2,
    results = 1
)]
pub struct AddFOp;

#[derive(Op)]
#[operation(
    dialect = "std",
    name = "subf",
    traits = "Pure, SameOperandsAndResultType",
    operands = 2,
    results = 1
)]
pub struct SubFOp;

#[derive(Op)]
#[operation(
    dialect = "std",
    name = "mulf",
    traits = "Pure, SameOperandsAndResultType",
    operands = 2,
    results = 1
)]
pub struct MulFOp;

#[derive(Op)]
#[operation(
    dialect = "std",
    name = "divf",
    traits = "Pure, SameOperandsAndResultType",
    operands = 2,
    results = 1
)]
pub struct DivFOp;

#[derive(Op)]
#[operation(
    dialect = "std",
    name = "and",
    traits = "Pure, SameOperandsAndResultType",
    operands = 2,
    results = 1
)]
pub struct AndOp;

/// Integer/index comparison; `predicate` is one of `eq ne slt sle sgt sge`.
#[derive(Op)]
#[operation(dialect = "std", name = "cmpi", traits = "Pure", operands = 2, results = 1)]
pub struct CmpIOp;

/// Ordered float comparison; `predicate` is one of `oeq one olt ole ogt oge`.
#[derive(Op)]
#[operation(dialect = "std", name = "cmpf", traits = "Pure", operands = 2, results = 1)]
pub struct CmpFOp;

#[derive(Op)]
#[operation(dialect = "std", name = "select", traits = "Pure", operands = 3, results = 1)]
pub struct SelectOp;

#[derive(Op)]
#[operation(dialect = "std", name = "index_cast", traits = "Pure", operands = 1, results = 1)]
pub struct IndexCastOp;

/// `load %memref[%i, %j, ...]`
#[derive(Op)]
#[operation(dialect = "std", name = "load", results = 1, regions = 0)]
pub struct LoadOp;

/// `store %value, %memref[%i, %j, ...]`
#[derive(Op)]
#[operation(dialect = "std", name = "store", results = 0, regions = 0)]
pub struct StoreOp;

#[derive(Op)]
#[operation(dialect = "std", name = "call", regions = 0)]
pub struct CallOp;

#[derive(Op)]
#[operation(dialect = "std", name = "return", traits = "Terminator", results = 0)]
pub struct ReturnOp;

pub fn constant(ty: TypeId, value: Attribute) -> OperationState {
    OperationState::new::<ConstantOp>()
        .result(ty)
        .attr("value", value)
}

pub fn constant_index(index_ty: TypeId, value: i64) -> OperationState {
    constant(index_ty, Attribute::Integer(value))
}

pub fn binary<T: crate::ops::OpDef>(lhs: Val, rhs: Val, ty: TypeId) -> OperationState {
    OperationState::new::<T>().operands([lhs, rhs]).result(ty)
}

pub fn cmpf(predicate: &str, lhs: Val, rhs: Val, i1: TypeId) -> OperationState {
    OperationState::new::<CmpFOp>()
        .operands([lhs, rhs])
        .result(i1)
        .attr("predicate", Attribute::String(predicate.to_string()))
}

pub fn cmpi(predicate: &str, lhs: Val, rhs: Val, i1: TypeId) -> OperationState {
    OperationState::new::<CmpIOp>()
        .operands([lhs, rhs])
        .result(i1)
        .attr("predicate", Attribute::String(predicate.to_string()))
}

pub fn select(cond: Val, on_true: Val, on_false: Val, ty: TypeId) -> OperationState {
    OperationState::new::<SelectOp>()
        .operands([cond, on_true, on_false])
        .result(ty)
}

pub fn load(memref: Val, indices: &[Val], element: TypeId) -> OperationState {
    OperationState::new::<LoadOp>()
        .operand(memref)
        .operands(indices.iter().copied())
        .result(element)
}

pub fn store(value: Val, memref: Val, indices: &[Val]) -> OperationState {
    OperationState::new::<StoreOp>()
        .operands([value, memref])
        .operands(indices.iter().copied())
}

pub fn ret(values: &[Val]) -> OperationState {
    OperationState::new::<ReturnOp>().operands(values.iter().copied())
}

pub fn call(callee: &str, args: &[Val], results: &[TypeId]) -> OperationState {
    OperationState::new::<CallOp>()
        .operands(args.iter().copied())
        .results(results.iter().copied())
        .attr("callee", Attribute::Symbol(callee.to_string()))
}
