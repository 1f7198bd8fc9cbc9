//! Structured loops with compile-time bounds (`affine` dialect).

use crate::attribute::Attribute;
use crate::ops::{OpDef, OpData, OperationState};
use crate::Op;

/// `for %iv = lower_bound to upper_bound step step { ... }`
///
/// Bounds and step are integer attributes; the body region has a single block
/// whose only argument is the induction variable (`index`).
#[derive(Op)]
#[operation(dialect = "affine", name = "for", operands = 0, results = 0, regions = 1)]
pub struct ForOp;

#[derive(Op)]
#[operation(dialect = "affine", name = "terminator", traits = "Terminator", operands = 0, results = 0)]
pub struct TerminatorOp;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoopBounds {
    pub lower: i64,
    pub upper: i64,
    pub step: i64,
}

impl LoopBounds {
    pub fn trip_count(&self) -> i64 {
        if self.step <= 0 || self.upper <= self.lower {
            return 0;
        }
        (self.upper - self.lower + self.step - 1) / self.step
    }

    /// Bounds of an `affine.for`, if it is one and they are all present.
    pub fn of(op: &OpData) -> Option<Self> {
        if !ForOp::matches(op) {
            return None;
        }
        Some(Self {
            lower: op.int_attr("lower_bound")?,
            upper: op.int_attr("upper_bound")?,
            step: op.int_attr("step")?,
        })
    }
}

pub fn for_loop(lower: i64, upper: i64, step: i64) -> OperationState {
    OperationState::new::<ForOp>()
        .attr("lower_bound", Attribute::Integer(lower))
        .attr("upper_bound", Attribute::Integer(upper))
        .attr("step", Attribute::Integer(step))
        .regions(1)
}

pub fn terminator() -> OperationState {
    OperationState::new::<TerminatorOp>()
}
