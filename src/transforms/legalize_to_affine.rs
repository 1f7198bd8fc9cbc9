//! Rewrites element-wise buffer ops into perfect `affine.for` nests that
//! load, compute and store one element per innermost iteration.

use crate::context::Context;
use crate::dialects::lhlo::{self, ElementKind};
use crate::dialects::{affine, standard};
use crate::error::{Error, Result};
use crate::module::{InsertPoint, Module};
use crate::ops::{traits, OpDef, Opr, Val};
use crate::pass::{apply_patterns_greedy, Pass, PassResult, PatternRewriter, PatternSet, RewritePattern};
use crate::types::TypeId;

pub struct LegalizeToAffinePass;

impl LegalizeToAffinePass {
    pub fn new() -> Self {
        Self
    }

    pub fn patterns() -> PatternSet {
        PatternSet::new()
            .with(ElementWiseToAffine::new::<lhlo::AddOp>())
            .with(ElementWiseToAffine::new::<lhlo::SubOp>())
            .with(ElementWiseToAffine::new::<lhlo::MulOp>())
            .with(ElementWiseToAffine::new::<lhlo::DivOp>())
            .with(ElementWiseToAffine::new::<lhlo::MaxOp>())
            .with(ElementWiseToAffine::new::<lhlo::MinOp>())
            .with(ElementWiseToAffine::new::<lhlo::AndOp>())
            .with(ElementWiseToAffine::new::<lhlo::CopyOp>())
    }
}

impl Default for LegalizeToAffinePass {
    fn default() -> Self {
        Self::new()
    }
}

fn element_wise_ops(module: &Module) -> Vec<Opr> {
    module
        .walk()
        .into_iter()
        .filter(|&op| {
            module
                .op(op)
                .is_some_and(|data| data.info.has_trait(traits::ELEMENT_WISE))
        })
        .collect()
}

impl Pass for LegalizeToAffinePass {
    fn name(&self) -> &str {
        "lhlo-legalize-to-affine"
    }

    fn run(&mut self, ctx: &mut Context, module: &mut Module) -> Result<PassResult> {
        let mut result = PassResult::new();
        let before = element_wise_ops(module).len();
        let patterns = Self::patterns();

        for func in module.function_ids() {
            if apply_patterns_greedy(ctx, module, func, &patterns)? {
                result.changed = true;
            }
        }

        // Anything left over had no static shape to build loops from
        if let Some(&leftover) = element_wise_ops(module).first() {
            let op = module.op(leftover).map_or("<unknown>", |d| d.name());
            let function = module
                .parent_function(leftover)
                .map(|f| module.function_name(f).to_string())
                .unwrap_or_default();
            return Err(Error::NoLegalizationPattern {
                op: op.to_string(),
                function,
            });
        }

        result.add_statistic("ops_legalized", before as u64);
        Ok(result)
    }
}

/// One element-wise op → loop nest over the output buffer's shape.
struct ElementWiseToAffine {
    root: &'static str,
}

impl ElementWiseToAffine {
    fn new<T: OpDef>() -> Self {
        Self { root: T::NAME }
    }
}

impl RewritePattern for ElementWiseToAffine {
    fn root(&self) -> Option<&'static str> {
        Some(self.root)
    }

    fn match_and_rewrite(&self, op: Opr, rewriter: &mut PatternRewriter) -> Result<bool> {
        let data = rewriter
            .module
            .op(op)
            .ok_or_else(|| Error::NotFound(format!("operation {:?}", op)))?;
        let Some(kind) = ElementKind::of(data) else {
            return Ok(false);
        };
        let operands = data.operands.clone();
        let Some((&out, inputs)) = operands.split_last() else {
            return Ok(false);
        };

        // Only statically shaped buffers can be turned into constant-bound loops
        let out_ty = rewriter.value_type(out)?;
        let Some(shape) = rewriter.ctx.static_shape(out_ty) else {
            return Ok(false);
        };
        let Some((_, element)) = rewriter.ctx.memref_parts(out_ty) else {
            return Ok(false);
        };
        for &input in inputs {
            let ty = rewriter.value_type(input)?;
            if rewriter.ctx.static_shape(ty).as_ref() != Some(&shape) {
                return Err(Error::VerificationError(format!(
                    "'{}' operands must share the shape of {}, found {}",
                    self.root,
                    rewriter.ctx.type_name(out_ty),
                    rewriter.ctx.type_name(ty)
                )));
            }
        }
        if kind == ElementKind::And && !rewriter.ctx.is_integer_like(element) {
            return Err(Error::TypeError(format!(
                "'{}' needs integer elements, found {}",
                self.root,
                rewriter.ctx.type_name(element)
            )));
        }

        rewriter.set_insertion_point_before(op);
        let ivs = build_loop_nest(rewriter, &shape)?;

        let mut loaded = Vec::with_capacity(inputs.len());
        for &input in inputs {
            loaded.push(rewriter.create_value(standard::load(input, &ivs, element))?);
        }
        let value = match loaded.as_slice() {
            [single] if !kind.is_binary() => *single,
            [lhs, rhs] => scalar_op(rewriter, kind, *lhs, *rhs, element)?,
            _ => return Err(Error::VerificationError(format!(
                "'{}' has {} input buffers",
                self.root,
                inputs.len()
            ))),
        };
        rewriter.create(standard::store(value, out, &ivs))?;

        rewriter.erase_op(op)?;
        Ok(true)
    }
}

/// Emits one `affine.for 0..dim` per dimension at the current insertion
/// point and leaves the insertion point inside the innermost body.
fn build_loop_nest(rewriter: &mut PatternRewriter, shape: &[u64]) -> Result<Vec<Val>> {
    let index_ty = rewriter.ctx.builtin_types().index();
    let mut ivs = Vec::with_capacity(shape.len());

    for &dim in shape {
        let for_op = rewriter.create(affine::for_loop(0, dim as i64, 1))?;
        let region = rewriter
            .module
            .op(for_op)
            .and_then(|d| d.regions.first().copied())
            .ok_or_else(|| Error::NotFound("affine.for body region".to_string()))?;
        let body = rewriter.module.add_block(region, &[index_ty]);
        ivs.extend(rewriter.module.block_args(body));

        rewriter.set_insertion_point(InsertPoint::BlockEnd(body));
        let terminator = rewriter.create(affine::terminator())?;
        rewriter.set_insertion_point_before(terminator);
    }
    Ok(ivs)
}

fn scalar_op(
    rewriter: &mut PatternRewriter,
    kind: ElementKind,
    lhs: Val,
    rhs: Val,
    element: TypeId,
) -> Result<Val> {
    let float = rewriter.ctx.is_float(element);
    let state = match (kind, float) {
        (ElementKind::Add, true) => standard::binary::<standard::AddFOp>(lhs, rhs, element),
        (ElementKind::Add, false) => standard::binary::<standard::AddIOp>(lhs, rhs, element),
        (ElementKind::Sub, true) => standard::binary::<standard::SubFOp>(lhs, rhs, element),
        (ElementKind::Sub, false) => standard::binary::<standard::SubIOp>(lhs, rhs, element),
        (ElementKind::Mul, true) => standard::binary::<standard::MulFOp>(lhs, rhs, element),
        (ElementKind::Mul, false) => standard::binary::<standard::MulIOp>(lhs, rhs, element),
        (ElementKind::Div, true) => standard::binary::<standard::DivFOp>(lhs, rhs, element),
        (ElementKind::Div, false) => standard::binary::<standard::DivISOp>(lhs, rhs, element),
        (ElementKind::And, _) => standard::binary::<standard::AndOp>(lhs, rhs, element),
        (ElementKind::Max | ElementKind::Min, _) => {
            // max/min pick an operand through compare + select
            let predicate = match (kind, float) {
                (ElementKind::Max, true) => "ogt",
                (ElementKind::Max, false) => "sgt",
                (_, true) => "olt",
                (_, false) => "slt",
            };
            let i1 = rewriter.ctx.builtin_types().i1();
            let cond = if float {
                rewriter.create_value(standard::cmpf(predicate, lhs, rhs, i1))?
            } else {
                rewriter.create_value(standard::cmpi(predicate, lhs, rhs, i1))?
            };
            standard::select(cond, lhs, rhs, element)
        }
        (ElementKind::Copy, _) => return Ok(lhs),
    };
    rewriter.create_value(state)
}
