//! `std` → `llvm` legalization patterns.
//!
//! Memory accesses use the bare-pointer memref convention: a statically
//! shaped memref is a pointer to its first element and a multi-dimensional
//! access is linearized row-major.

use crate::attribute::Attribute;
use crate::dialects::{llvm, standard};
use crate::error::{Error, Result};
use crate::ops::{OpDef, OpInfo, OperationState, Opr, Val};
use crate::pass::{PatternRewriter, PatternSet, RewritePattern};
use crate::types::{TypeId, TypeKind};
use smallvec::SmallVec;

pub fn populate_std_to_llvm_patterns(patterns: &mut PatternSet) {
    patterns.add(Box::new(OneToOne::new::<standard::ConstantOp>(llvm::ConstantOp::info)));
    patterns.add(Box::new(OneToOne::new::<standard::AddIOp>(llvm::AddOp::info)));
    patterns.add(Box::new(OneToOne::new::<standard::SubIOp>(llvm::SubOp::info)));
    patterns.add(Box::new(OneToOne::new::<standard::MulIOp>(llvm::MulOp::info)));
    patterns.add(Box::new(OneToOne::new::<standard::DivISOp>(llvm::SDivOp::info)));
    patterns.add(Box::new(OneToOne::new::<standard::AddFOp>(llvm::FAddOp::info)));
    patterns.add(Box::new(OneToOne::new::<standard::SubFOp>(llvm::FSubOp::info)));
    patterns.add(Box::new(OneToOne::new::<standard::MulFOp>(llvm::FMulOp::info)));
    patterns.add(Box::new(OneToOne::new::<standard::DivFOp>(llvm::FDivOp::info)));
    patterns.add(Box::new(OneToOne::new::<standard::AndOp>(llvm::AndOp::info)));
    patterns.add(Box::new(OneToOne::new::<standard::CmpIOp>(llvm::ICmpOp::info)));
    patterns.add(Box::new(OneToOne::new::<standard::CmpFOp>(llvm::FCmpOp::info)));
    patterns.add(Box::new(OneToOne::new::<standard::SelectOp>(llvm::SelectOp::info)));
    patterns.add(Box::new(OneToOne::new::<standard::ReturnOp>(llvm::ReturnOp::info)));
    patterns.add(Box::new(IndexCastLowering));
    patterns.add(Box::new(LoadLowering));
    patterns.add(Box::new(StoreLowering));
}

/// Operands of `op` in converted form, or `None` if one is not converted yet.
pub(crate) fn converted_operands(
    rewriter: &mut PatternRewriter,
    op: Opr,
) -> Result<Option<SmallVec<[Val; 4]>>> {
    let operands = rewriter.remapped_operands(op)?;
    for &operand in &operands {
        let ty = rewriter.value_type(operand)?;
        if !rewriter.is_legal_type(ty) {
            return Ok(None);
        }
    }
    Ok(Some(operands))
}

/// Converted result types of `op`, or `None` if one has no conversion.
pub(crate) fn converted_result_types(
    rewriter: &mut PatternRewriter,
    op: Opr,
) -> Result<Option<SmallVec<[TypeId; 1]>>> {
    let results = rewriter
        .module
        .op(op)
        .ok_or_else(|| Error::NotFound(format!("operation {:?}", op)))?
        .results
        .clone();
    let mut types = SmallVec::new();
    for result in results {
        let ty = rewriter.value_type(result)?;
        match rewriter.convert_type(ty) {
            Some(converted) => types.push(converted),
            None => return Ok(None),
        }
    }
    Ok(Some(types))
}

fn llvm_int_width(rewriter: &PatternRewriter, ty: TypeId) -> Option<u32> {
    match rewriter.ctx.get_type(ty)? {
        TypeKind::LlvmInteger { width } => Some(*width),
        _ => None,
    }
}

/// Rewrites an op into a target op with the same operands and attributes.
struct OneToOne {
    source: &'static str,
    target: fn() -> &'static OpInfo,
}

impl OneToOne {
    fn new<S: OpDef>(target: fn() -> &'static OpInfo) -> Self {
        Self {
            source: S::NAME,
            target,
        }
    }
}

impl RewritePattern for OneToOne {
    fn root(&self) -> Option<&'static str> {
        Some(self.source)
    }

    fn debug_name(&self) -> &'static str {
        (self.target)().full_name
    }

    fn match_and_rewrite(&self, op: Opr, rewriter: &mut PatternRewriter) -> Result<bool> {
        let Some(operands) = converted_operands(rewriter, op)? else {
            return Ok(false);
        };
        let Some(result_types) = converted_result_types(rewriter, op)? else {
            return Ok(false);
        };
        let attributes = rewriter
            .module
            .op(op)
            .map(|data| data.attributes.clone())
            .unwrap_or_default();

        rewriter.set_insertion_point_before(op);
        let new_op = rewriter.create(
            OperationState::from_info((self.target)())
                .operands(operands)
                .results(result_types)
                .attrs(attributes),
        )?;
        let results: Vec<Val> = rewriter
            .module
            .op(new_op)
            .map(|data| data.results.to_vec())
            .unwrap_or_default();
        rewriter.replace_op(op, &results)?;
        Ok(true)
    }
}

/// `index_cast` becomes a sign extension, a truncation, or nothing.
struct IndexCastLowering;

impl RewritePattern for IndexCastLowering {
    fn root(&self) -> Option<&'static str> {
        Some(standard::IndexCastOp::NAME)
    }

    fn match_and_rewrite(&self, op: Opr, rewriter: &mut PatternRewriter) -> Result<bool> {
        let Some(operands) = converted_operands(rewriter, op)? else {
            return Ok(false);
        };
        let Some(result_types) = converted_result_types(rewriter, op)? else {
            return Ok(false);
        };
        let (Some(&input), Some(&target)) = (operands.first(), result_types.first()) else {
            return Ok(false);
        };
        let source = rewriter.value_type(input)?;
        let (Some(from), Some(to)) = (
            llvm_int_width(rewriter, source),
            llvm_int_width(rewriter, target),
        ) else {
            return Ok(false);
        };

        rewriter.set_insertion_point_before(op);
        let converted = if to > from {
            rewriter.create_value(llvm::cast::<llvm::SExtOp>(input, target))?
        } else if to < from {
            rewriter.create_value(llvm::cast::<llvm::TruncOp>(input, target))?
        } else {
            input
        };
        rewriter.replace_op(op, &[converted])?;
        Ok(true)
    }
}

/// Emits the element pointer for `memref[indices]`.
///
/// `memref_ty` is the type before conversion and supplies the static shape.
fn element_pointer(
    rewriter: &mut PatternRewriter,
    base: Val,
    memref_ty: TypeId,
    indices: &[Val],
) -> Result<Option<Val>> {
    let Some(shape) = rewriter.ctx.static_shape(memref_ty) else {
        return Ok(None);
    };
    if shape.len() != indices.len() {
        return Err(Error::VerificationError(format!(
            "memory access into {} uses {} indices",
            rewriter.ctx.type_name(memref_ty),
            indices.len()
        )));
    }
    let index_ty = rewriter.ctx.builtin_types().index();
    let Some(offset_ty) = rewriter.convert_type(index_ty) else {
        return Ok(None);
    };
    let ptr_ty = rewriter.value_type(base)?;

    let mut offset: Option<Val> = None;
    for (dim, &index) in indices.iter().enumerate() {
        let stride: u64 = shape[dim + 1..].iter().product();
        let term = if stride == 1 {
            index
        } else {
            let stride = rewriter.create_value(llvm::constant(
                offset_ty,
                Attribute::Integer(stride as i64),
            ))?;
            rewriter.create_value(llvm::binary::<llvm::MulOp>(index, stride, offset_ty))?
        };
        offset = Some(match offset {
            Some(acc) => rewriter.create_value(llvm::binary::<llvm::AddOp>(acc, term, offset_ty))?,
            None => term,
        });
    }
    let offset = match offset {
        Some(offset) => offset,
        None => rewriter.create_value(llvm::constant(offset_ty, Attribute::Integer(0)))?,
    };
    let pointer = rewriter.create_value(llvm::gep(base, offset, ptr_ty))?;
    Ok(Some(pointer))
}

fn original_operand_type(rewriter: &PatternRewriter, op: Opr, index: usize) -> Result<TypeId> {
    let operand = rewriter
        .module
        .op(op)
        .and_then(|data| data.operands.get(index).copied())
        .ok_or_else(|| Error::NotFound(format!("operand #{} of {:?}", index, op)))?;
    rewriter.value_type(operand)
}

/// `std.load %m[%i..]` → `llvm.getelementptr` + `llvm.load`.
struct LoadLowering;

impl RewritePattern for LoadLowering {
    fn root(&self) -> Option<&'static str> {
        Some(standard::LoadOp::NAME)
    }

    fn match_and_rewrite(&self, op: Opr, rewriter: &mut PatternRewriter) -> Result<bool> {
        let Some(operands) = converted_operands(rewriter, op)? else {
            return Ok(false);
        };
        let Some(result_types) = converted_result_types(rewriter, op)? else {
            return Ok(false);
        };
        let (Some((&base, indices)), Some(&element_ty)) =
            (operands.split_first(), result_types.first())
        else {
            return Ok(false);
        };
        let memref_ty = original_operand_type(rewriter, op, 0)?;

        rewriter.set_insertion_point_before(op);
        let Some(pointer) = element_pointer(rewriter, base, memref_ty, indices)? else {
            return Ok(false);
        };
        let loaded = rewriter.create_value(llvm::load(pointer, element_ty))?;
        rewriter.replace_op(op, &[loaded])?;
        Ok(true)
    }
}

/// `std.store %v, %m[%i..]` → `llvm.getelementptr` + `llvm.store`.
struct StoreLowering;

impl RewritePattern for StoreLowering {
    fn root(&self) -> Option<&'static str> {
        Some(standard::StoreOp::NAME)
    }

    fn match_and_rewrite(&self, op: Opr, rewriter: &mut PatternRewriter) -> Result<bool> {
        let Some(operands) = converted_operands(rewriter, op)? else {
            return Ok(false);
        };
        let [value, base, indices @ ..] = operands.as_slice() else {
            return Ok(false);
        };
        let (value, base, indices) = (*value, *base, indices.to_vec());
        let memref_ty = original_operand_type(rewriter, op, 1)?;

        rewriter.set_insertion_point_before(op);
        let Some(pointer) = element_pointer(rewriter, base, memref_ty, &indices)? else {
            return Ok(false);
        };
        rewriter.create(llvm::store(value, pointer))?;
        rewriter.replace_op(op, &[])?;
        Ok(true)
    }
}
