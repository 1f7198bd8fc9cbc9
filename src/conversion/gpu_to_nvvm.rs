//! `gpu` → `nvvm`/`llvm` legalization patterns for kernel bodies.

use super::std_to_llvm::converted_result_types;
use crate::dialects::{gpu, llvm, nvvm};
use crate::error::{Error, Result};
use crate::ops::{OpDef, OperationState, Opr};
use crate::pass::{PatternRewriter, PatternSet, RewritePattern};
use crate::types::TypeKind;
use nvvm::SpecialRegister;

pub fn populate_gpu_to_nvvm_patterns(patterns: &mut PatternSet) {
    patterns.add(Box::new(IndexOpLowering::new::<gpu::ThreadIdOp>(SpecialRegister::ThreadId)));
    patterns.add(Box::new(IndexOpLowering::new::<gpu::BlockIdOp>(SpecialRegister::BlockId)));
    patterns.add(Box::new(IndexOpLowering::new::<gpu::BlockDimOp>(SpecialRegister::BlockDim)));
    patterns.add(Box::new(IndexOpLowering::new::<gpu::GridDimOp>(SpecialRegister::GridDim)));
    patterns.add(Box::new(ReturnLowering));
}

/// Reads the special register (32-bit) and widens it to the converted
/// `index` type.
struct IndexOpLowering {
    source: &'static str,
    register: SpecialRegister,
}

impl IndexOpLowering {
    fn new<T: OpDef>(register: SpecialRegister) -> Self {
        Self {
            source: T::NAME,
            register,
        }
    }
}

impl RewritePattern for IndexOpLowering {
    fn root(&self) -> Option<&'static str> {
        Some(self.source)
    }

    fn match_and_rewrite(&self, op: Opr, rewriter: &mut PatternRewriter) -> Result<bool> {
        let dimension = rewriter
            .module
            .op(op)
            .ok_or_else(|| Error::NotFound(format!("operation {:?}", op)))?
            .str_attr("dimension")
            .and_then(gpu::dimension_index);
        let Some(dimension) = dimension else {
            return Err(Error::VerificationError(format!(
                "'{}' needs a dimension attribute of x, y or z",
                self.source
            )));
        };
        let Some(read) = nvvm::register_op(self.register, dimension) else {
            return Ok(false);
        };
        let Some(result_types) = converted_result_types(rewriter, op)? else {
            return Ok(false);
        };
        let Some(&index_ty) = result_types.first() else {
            return Ok(false);
        };
        let index_width = match rewriter.ctx.get_type(index_ty) {
            Some(TypeKind::LlvmInteger { width }) => *width,
            _ => return Ok(false),
        };

        let i32_ty = rewriter.ctx.builtin_types().llvm_int(32);
        rewriter.set_insertion_point_before(op);
        let raw = rewriter.create_value(OperationState::from_info(read).result(i32_ty))?;
        let widened = match index_width {
            32 => raw,
            w if w > 32 => rewriter.create_value(llvm::cast::<llvm::SExtOp>(raw, index_ty))?,
            _ => rewriter.create_value(llvm::cast::<llvm::TruncOp>(raw, index_ty))?,
        };
        rewriter.replace_op(op, &[widened])?;
        Ok(true)
    }
}

struct ReturnLowering;

impl RewritePattern for ReturnLowering {
    fn root(&self) -> Option<&'static str> {
        Some(gpu::ReturnOp::NAME)
    }

    fn match_and_rewrite(&self, op: Opr, rewriter: &mut PatternRewriter) -> Result<bool> {
        rewriter.set_insertion_point_before(op);
        rewriter.create(llvm::ret(&[]))?;
        rewriter.replace_op(op, &[])?;
        Ok(true)
    }
}
