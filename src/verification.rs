use crate::context::Context;
use crate::dialects::{gpu, standard};
use crate::error::{Error, Result};
use crate::module::{FuncId, Module};
use crate::ops::{traits, OpData, Opr, Val, ValueDef};
use crate::region::{BlockId, RegionId, RegionParent};
use ahash::AHashSet;

/// Verify every function of the module: structure, per-op arity, trait
/// constraints, dominance and cross-function references.
pub fn verify_module(ctx: &Context, module: &Module) -> Result<()> {
    let mut names = AHashSet::new();
    for func in module.function_ids() {
        let name = module.function_name(func);
        if !names.insert(name.to_string()) {
            return Err(Error::VerificationError(format!(
                "function '{}' is defined more than once",
                name
            )));
        }
        verify_function(ctx, module, func)?;
    }
    Ok(())
}

pub fn verify_function(ctx: &Context, module: &Module, func: FuncId) -> Result<()> {
    let function = module
        .function(func)
        .ok_or_else(|| Error::NotFound(format!("function {:?}", func)))?;
    let region = module
        .region(function.body)
        .ok_or_else(|| verify_error(&function.name, "body region is missing"))?;
    if region.parent != RegionParent::Function(func) {
        return Err(verify_error(&function.name, "body region has the wrong parent"));
    }

    // Entry arguments mirror the signature
    let entry = region
        .entry_block()
        .ok_or_else(|| verify_error(&function.name, "body has no entry block"))?;
    let arg_types: Vec<_> = module
        .block_args(entry)
        .into_iter()
        .filter_map(|arg| module.value_type(arg))
        .collect();
    if arg_types != function.inputs {
        return Err(verify_error(
            &function.name,
            "entry block arguments do not match the function inputs",
        ));
    }

    verify_region(ctx, module, func, function.body)
}

fn verify_error(function: &str, message: &str) -> Error {
    Error::VerificationError(format!("function '{}': {}", function, message))
}

fn verify_region(ctx: &Context, module: &Module, func: FuncId, region: RegionId) -> Result<()> {
    let blocks = module
        .region(region)
        .map(|r| r.blocks.clone())
        .unwrap_or_default();
    for block in blocks {
        verify_block(ctx, module, func, region, block)?;
    }
    Ok(())
}

fn verify_block(
    ctx: &Context,
    module: &Module,
    func: FuncId,
    region: RegionId,
    block: BlockId,
) -> Result<()> {
    let fname = module.function_name(func);
    let block_data = module
        .block(block)
        .ok_or_else(|| verify_error(fname, "dangling block handle"))?;
    if block_data.parent != region {
        return Err(verify_error(fname, "block is not owned by its region"));
    }

    let ops = &block_data.ops;
    match ops.last().and_then(|&op| module.op(op)) {
        Some(last) if last.info.is_terminator() => {}
        _ => return Err(verify_error(fname, "block does not end with a terminator")),
    }

    for (position, &op) in ops.iter().enumerate() {
        let data = module
            .op(op)
            .ok_or_else(|| verify_error(fname, "dangling operation handle"))?;
        if data.parent != Some(block) {
            return Err(verify_error(
                fname,
                &format!("'{}' has a stale parent block", data.name()),
            ));
        }
        if data.info.is_terminator() && position + 1 != ops.len() {
            return Err(verify_error(
                fname,
                &format!("terminator '{}' is not the last op of its block", data.name()),
            ));
        }
        verify_operation(ctx, module, op)?;
        for &nested in &data.regions {
            verify_region(ctx, module, func, nested)?;
        }
    }
    Ok(())
}

/// Verify a single operation in place.
pub fn verify_operation(ctx: &Context, module: &Module, op: Opr) -> Result<()> {
    let data = module
        .op(op)
        .ok_or_else(|| Error::NotFound(format!("operation {:?}", op)))?;

    if !ctx.ops.contains(data.name()) {
        return Err(Error::VerificationError(format!(
            "'{}' is not a registered operation",
            data.name()
        )));
    }
    // Arity checks generated by #[derive(Op)]
    (data.info.verify)(data)?;

    for (index, &result) in data.results.iter().enumerate() {
        match module.value(result).map(|v| v.def) {
            Some(ValueDef::OpResult { op: owner, index: i }) if owner == op && i == index => {}
            _ => {
                return Err(Error::VerificationError(format!(
                    "result #{} of '{}' is not owned by it",
                    index,
                    data.name()
                )))
            }
        }
    }
    for &operand in &data.operands {
        verify_dominance(module, op, data, operand)?;
    }

    verify_traits(module, data)?;
    verify_op_specific(module, op, data)
}

fn verify_dominance(module: &Module, user: Opr, data: &OpData, operand: Val) -> Result<()> {
    let not_dominated = || {
        Error::VerificationError(format!(
            "operand {:?} of '{}' does not dominate its use",
            operand,
            data.name()
        ))
    };
    let value = module.value(operand).ok_or_else(|| {
        Error::VerificationError(format!(
            "'{}' uses an erased value {:?}",
            data.name(),
            operand
        ))
    })?;
    let user_block = data.parent.ok_or_else(not_dominated)?;

    match value.def {
        ValueDef::BlockArgument { block, .. } => {
            if module.block_is_within(user_block, block) {
                Ok(())
            } else {
                Err(not_dominated())
            }
        }
        ValueDef::OpResult { op: def, .. } => {
            let def_block = module
                .op(def)
                .and_then(|d| d.parent)
                .ok_or_else(not_dominated)?;
            let ancestor = module
                .ancestor_in_block(user, def_block)
                .ok_or_else(not_dominated)?;
            let block = module.block(def_block).ok_or_else(not_dominated)?;
            match (block.position(def), block.position(ancestor)) {
                (Some(d), Some(u)) if d < u => Ok(()),
                _ => Err(not_dominated()),
            }
        }
    }
}

/// Verify operation traits that need type information
fn verify_traits(module: &Module, data: &OpData) -> Result<()> {
    if data.info.has_trait(traits::SAME_OPERANDS_AND_RESULT_TYPE) {
        let types: Vec<_> = data
            .operands
            .iter()
            .chain(&data.results)
            .map(|&v| module.value_type(v))
            .collect();
        if let Some(first) = types.first() {
            if types.iter().any(|ty| ty != first || ty.is_none()) {
                return Err(Error::VerificationError(format!(
                    "'{}' requires operands and results of one type",
                    data.name()
                )));
            }
        }
    }
    Ok(())
}

fn verify_op_specific(module: &Module, op: Opr, data: &OpData) -> Result<()> {
    if data.is::<gpu::LaunchOp>() {
        let dims = gpu::LaunchDims::of(data).ok_or_else(|| {
            Error::VerificationError("gpu.launch needs num_block_dims and num_thread_dims".into())
        })?;
        let body_args = data
            .regions
            .first()
            .and_then(|&r| module.region_entry_block(r))
            .map(|b| module.block_args(b).len());
        if data.operands.len() != dims.total() || body_args != Some(dims.total()) {
            return Err(Error::VerificationError(format!(
                "gpu.launch with {} dimension(s) has {} size operand(s) and {:?} body argument(s)",
                dims.total(),
                data.operands.len(),
                body_args
            )));
        }
    } else if data.is::<gpu::LaunchFuncOp>() {
        verify_launch_func(module, data)?;
    } else if data.is::<standard::CallOp>() {
        let callee = data.str_attr("callee").unwrap_or_default();
        let func = module
            .lookup_function(callee)
            .and_then(|f| module.function(f))
            .ok_or_else(|| {
                Error::VerificationError(format!("std.call to unknown function '{}'", callee))
            })?;
        if func.inputs.len() != data.operands.len() || func.outputs.len() != data.results.len() {
            return Err(Error::VerificationError(format!(
                "std.call does not match the signature of '{}'",
                callee
            )));
        }
    } else if data.is::<standard::ReturnOp>() {
        // Only a return at function level carries the function's results
        let in_body = module.parent_op(op).is_none();
        let func = module.parent_function(op).and_then(|f| module.function(f));
        if let (true, Some(func)) = (in_body, func) {
            if func.outputs.len() != data.operands.len() {
                return Err(Error::VerificationError(format!(
                    "function '{}' returns {} value(s) but its signature has {}",
                    func.name,
                    data.operands.len(),
                    func.outputs.len()
                )));
            }
        }
    }
    Ok(())
}

fn verify_launch_func(module: &Module, data: &OpData) -> Result<()> {
    let kernel_name = data.str_attr("kernel").unwrap_or_default();
    let kernel = module
        .lookup_function(kernel_name)
        .and_then(|f| module.function(f))
        .ok_or_else(|| {
            Error::VerificationError(format!("gpu.launch_func of unknown kernel '{}'", kernel_name))
        })?;
    if !kernel.is_kernel() {
        return Err(Error::VerificationError(format!(
            "gpu.launch_func target '{}' is not a kernel",
            kernel_name
        )));
    }
    let args = gpu::kernel_operands(data).ok_or_else(|| {
        Error::VerificationError("gpu.launch_func has fewer operands than dimensions".into())
    })?;
    let arg_types: Vec<_> = args.iter().filter_map(|&v| module.value_type(v)).collect();
    if arg_types != kernel.inputs {
        return Err(Error::VerificationError(format!(
            "gpu.launch_func passes {} argument(s) that do not match the {} parameter(s) of '{}'",
            args.len(),
            kernel.inputs.len(),
            kernel_name
        )));
    }
    Ok(())
}
