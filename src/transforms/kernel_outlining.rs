//! Extracts `gpu.launch` bodies into standalone kernel functions.

use crate::attribute::Attribute;
use crate::context::Context;
use crate::dialects::gpu::{self, LaunchDims};
use crate::error::{Error, Result};
use crate::module::{FuncId, InsertPoint, Module, KERNEL_ATTR};
use crate::ops::{OpDef, Opr, Val};
use crate::pass::{Pass, PassResult};
use crate::region::BlockId;
use crate::types::TypeId;

pub struct KernelOutliningPass;

impl KernelOutliningPass {
    pub fn new() -> Self {
        Self
    }
}

impl Default for KernelOutliningPass {
    fn default() -> Self {
        Self::new()
    }
}

impl Pass for KernelOutliningPass {
    fn name(&self) -> &str {
        "gpu-kernel-outlining"
    }

    fn run(&mut self, ctx: &mut Context, module: &mut Module) -> Result<PassResult> {
        let mut result = PassResult::new();
        let mut outlined = 0;

        // Snapshot first: kernels created below must not be revisited
        for func in module.function_ids() {
            if module.function(func).is_some_and(|f| f.is_kernel()) {
                continue;
            }
            let launches: Vec<Opr> = module
                .walk_function(func)
                .into_iter()
                .filter(|&op| module.op(op).is_some_and(|d| d.is::<gpu::LaunchOp>()))
                .collect();

            let mut anchor = func;
            for launch in launches {
                let kernel = outline_launch(ctx, module, func, launch)?;
                module.move_function_after(kernel, anchor)?;
                anchor = kernel;
                outlined += 1;
            }
        }

        if outlined > 0 {
            result.changed = true;
        }
        result.add_statistic("kernels_outlined", outlined);
        Ok(result)
    }
}

/// Values used inside the launch body but defined outside it, in order of
/// first use.
pub fn captured_values(module: &Module, launch: Opr) -> Vec<Val> {
    let Some(region) = module.op(launch).and_then(|d| d.regions.first().copied()) else {
        return Vec::new();
    };
    let mut captured = Vec::new();
    for op in module.walk_region(region) {
        let Some(data) = module.op(op) else {
            continue;
        };
        for &operand in &data.operands {
            if !module.is_value_defined_within_region(operand, region)
                && !captured.contains(&operand)
            {
                captured.push(operand);
            }
        }
    }
    captured
}

fn outline_launch(
    ctx: &mut Context,
    module: &mut Module,
    func: FuncId,
    launch: Opr,
) -> Result<FuncId> {
    let data = module
        .op(launch)
        .ok_or_else(|| Error::NotFound(format!("operation {:?}", launch)))?;
    let dims = LaunchDims::of(data).ok_or_else(|| {
        Error::VerificationError("gpu.launch without dimension counts".to_string())
    })?;
    let sizes = data.operands.to_vec();
    let launch_body = data
        .regions
        .first()
        .and_then(|&r| module.region_entry_block(r))
        .ok_or_else(|| Error::VerificationError("gpu.launch without a body".to_string()))?;

    let captured = captured_values(module, launch);
    let mut param_types = Vec::with_capacity(captured.len());
    for &value in &captured {
        param_types.push(
            module
                .value_type(value)
                .ok_or_else(|| Error::NotFound(format!("value {:?}", value)))?,
        );
    }

    let name = module.unique_function_name(&format!("{}_kernel", module.function_name(func)));
    let kernel = module.add_function(&name, param_types, vec![]);
    module.set_function_attr(kernel, KERNEL_ATTR, Attribute::Unit)?;
    let entry = module
        .entry_block(kernel)
        .ok_or_else(|| Error::NotFound(format!("entry block of '{}'", name)))?;
    let params = module.block_args(entry);

    // Launch body arguments become explicit id reads
    let index_ty = ctx.builtin_types().index();
    let mut ids = Vec::with_capacity(dims.total());
    for dim in 0..dims.num_block_dims {
        ids.push(id_read::<gpu::BlockIdOp>(module, entry, dim, index_ty)?);
    }
    for dim in 0..dims.num_thread_dims {
        ids.push(id_read::<gpu::ThreadIdOp>(module, entry, dim, index_ty)?);
    }
    for (arg, id) in module.block_args(launch_body).into_iter().zip(ids) {
        module.replace_all_uses(arg, id)?;
    }

    module.splice_block(launch_body, entry)?;
    for op in module.block_ops(entry) {
        if module.op(op).is_some_and(|d| d.is::<gpu::TerminatorOp>()) {
            module.insert_op(gpu::ret(), InsertPoint::Before(op))?;
            module.erase_op(op)?;
        }
    }

    let kernel_body = module
        .function(kernel)
        .map(|f| f.body)
        .ok_or_else(|| Error::NotFound(format!("function '{}'", name)))?;
    for (&value, &param) in captured.iter().zip(&params) {
        module.replace_uses_in_region(value, param, kernel_body)?;
    }

    module.insert_op(
        gpu::launch_func(&name, dims, &sizes, &captured),
        InsertPoint::Before(launch),
    )?;
    module.erase_op(launch)?;

    log::debug!(
        "outlined kernel '{}' from '{}' with {} argument(s)",
        name,
        module.function_name(func),
        captured.len()
    );
    Ok(kernel)
}

fn id_read<T: OpDef>(module: &mut Module, block: BlockId, dim: usize, index_ty: TypeId) -> Result<Val> {
    let dimension = gpu::dimension_name(dim)
        .ok_or_else(|| Error::InvalidOperation(format!("no launch dimension #{}", dim)))?;
    let op = module.insert_op(gpu::id_op::<T>(dimension, index_ty), InsertPoint::BlockEnd(block))?;
    module
        .op(op)
        .and_then(|d| d.result(0))
        .ok_or_else(|| Error::NotFound("id result".to_string()))
}
