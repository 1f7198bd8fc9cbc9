use crate::ops::{OpDef, OpData, OperationState, Val};
use crate::types::TypeId;
use crate::Op;

/// Bridges a value of one type to another while a conversion is in flight.
/// Never legal in a finished conversion.
#[derive(Op)]
#[operation(
    dialect = "builtin",
    name = "unrealized_conversion_cast",
    traits = "Pure",
    operands = 1,
    results = 1
)]
pub struct UnrealizedConversionCastOp;

pub fn cast(input: Val, to: TypeId) -> OperationState {
    OperationState::new::<UnrealizedConversionCastOp>()
        .operand(input)
        .result(to)
}

pub fn is_cast(op: &OpData) -> bool {
    UnrealizedConversionCastOp::matches(op)
}
