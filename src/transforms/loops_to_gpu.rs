//! Maps the outer loops of top-level `affine.for` nests onto a `gpu.launch`.

use crate::context::Context;
use crate::dialects::affine::{self, LoopBounds};
use crate::dialects::{gpu, standard};
use crate::error::{Error, Result};
use crate::module::{FuncId, InsertPoint, Module};
use crate::ops::{Opr, Val};
use crate::pass::{Pass, PassResult};
use crate::region::BlockId;
use crate::types::TypeId;

/// How many loops of each nest become block and thread dimensions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoopsToGpuOptions {
    pub num_block_dims: usize,
    pub num_thread_dims: usize,
}

impl Default for LoopsToGpuOptions {
    fn default() -> Self {
        Self {
            num_block_dims: 0,
            num_thread_dims: 2,
        }
    }
}

impl LoopsToGpuOptions {
    pub fn with_block_dims(mut self, count: usize) -> Self {
        self.num_block_dims = count;
        self
    }

    pub fn with_thread_dims(mut self, count: usize) -> Self {
        self.num_thread_dims = count;
        self
    }

    pub fn launch_dims(&self) -> Result<gpu::LaunchDims> {
        if self.num_block_dims > gpu::MAX_DIMS || self.num_thread_dims > gpu::MAX_DIMS {
            return Err(Error::InvalidOperation(format!(
                "at most {} block and {} thread dimensions are supported, got {} and {}",
                gpu::MAX_DIMS,
                gpu::MAX_DIMS,
                self.num_block_dims,
                self.num_thread_dims
            )));
        }
        let dims = gpu::LaunchDims {
            num_block_dims: self.num_block_dims,
            num_thread_dims: self.num_thread_dims,
        };
        if dims.total() == 0 {
            return Err(Error::InvalidOperation(
                "a launch needs at least one block or thread dimension".to_string(),
            ));
        }
        Ok(dims)
    }
}

pub struct LoopsToGpuPass {
    options: LoopsToGpuOptions,
}

impl LoopsToGpuPass {
    pub fn new(options: LoopsToGpuOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> LoopsToGpuOptions {
        self.options
    }
}

impl Default for LoopsToGpuPass {
    fn default() -> Self {
        Self::new(LoopsToGpuOptions::default())
    }
}

impl Pass for LoopsToGpuPass {
    fn name(&self) -> &str {
        "convert-loops-to-gpu"
    }

    fn run(&mut self, ctx: &mut Context, module: &mut Module) -> Result<PassResult> {
        let dims = self.options.launch_dims()?;
        let mut result = PassResult::new();
        let mut mapped = 0;

        for func in module.function_ids() {
            if module.function(func).is_some_and(|f| f.is_kernel()) {
                continue;
            }
            for root in top_level_loops(module, func) {
                map_loop_nest(ctx, module, func, root, dims)?;
                mapped += 1;
            }
        }

        if mapped > 0 {
            result.changed = true;
        }
        result.add_statistic("loop_nests_mapped", mapped);
        Ok(result)
    }
}

fn top_level_loops(module: &Module, func: FuncId) -> Vec<Opr> {
    let Some(body) = module.function(func).map(|f| f.body) else {
        return Vec::new();
    };
    let blocks = module.region(body).map(|r| r.blocks.clone()).unwrap_or_default();
    blocks
        .into_iter()
        .flat_map(|block| module.block_ops(block))
        .filter(|&op| module.op(op).is_some_and(|d| d.is::<affine::ForOp>()))
        .collect()
}

struct MappedLoop {
    bounds: LoopBounds,
    body: BlockId,
}

/// The outermost `depth` loops of the nest rooted at `root`.
fn collect_perfect_nest(
    module: &Module,
    func: FuncId,
    root: Opr,
    depth: usize,
) -> Result<Vec<MappedLoop>> {
    let not_perfect = || {
        Error::InvalidOperation(format!(
            "loop nest in function '{}' is not a perfect nest of depth {}",
            module.function_name(func),
            depth
        ))
    };

    let mut nest = Vec::with_capacity(depth);
    let mut current = root;
    loop {
        let data = module
            .op(current)
            .ok_or_else(|| Error::NotFound(format!("operation {:?}", current)))?;
        let bounds = LoopBounds::of(data).ok_or_else(|| {
            Error::VerificationError("affine.for without constant bounds".to_string())
        })?;
        let body = data
            .regions
            .first()
            .and_then(|&r| module.region_entry_block(r))
            .ok_or_else(|| Error::VerificationError("affine.for without a body".to_string()))?;
        nest.push(MappedLoop { bounds, body });
        if nest.len() == depth {
            return Ok(nest);
        }

        // Perfect: the body holds exactly the next loop and the terminator.
        current = match module.block_ops(body).as_slice() {
            [inner, terminator]
                if module.op(*inner).is_some_and(|d| d.is::<affine::ForOp>())
                    && module
                        .op(*terminator)
                        .is_some_and(|d| d.is::<affine::TerminatorOp>()) =>
            {
                *inner
            }
            _ => return Err(not_perfect()),
        };
    }
}

fn map_loop_nest(
    ctx: &mut Context,
    module: &mut Module,
    func: FuncId,
    root: Opr,
    dims: gpu::LaunchDims,
) -> Result<()> {
    let nest = collect_perfect_nest(module, func, root, dims.total())?;
    let index_ty = ctx.builtin_types().index();

    // Trip counts become the launch sizes
    let mut sizes = Vec::with_capacity(nest.len());
    for mapped in &nest {
        let size = module.insert_op(
            standard::constant_index(index_ty, mapped.bounds.trip_count()),
            InsertPoint::Before(root),
        )?;
        sizes.push(result_of(module, size)?);
    }
    let (block_sizes, thread_sizes) = sizes.split_at(dims.num_block_dims);
    let launch = module.insert_op(
        gpu::launch(dims, block_sizes, thread_sizes),
        InsertPoint::Before(root),
    )?;
    let region = module
        .op(launch)
        .and_then(|d| d.regions.first().copied())
        .ok_or_else(|| Error::NotFound("gpu.launch body region".to_string()))?;
    let body = module.add_block(region, &vec![index_ty; nest.len()]);
    let terminator = module.insert_op(gpu::terminator(), InsertPoint::BlockEnd(body))?;

    // iv = lower + id * step
    let ids = module.block_args(body);
    for (mapped, &id) in nest.iter().zip(&ids) {
        let Some(&iv) = module.block_args(mapped.body).first() else {
            continue;
        };
        if !module.has_uses(iv) {
            continue;
        }
        let value = induction_value(module, index_ty, mapped.bounds, id, terminator)?;
        module.replace_all_uses(iv, value)?;
    }

    // Whatever the innermost mapped loop did now runs once per id
    let innermost = nest
        .last()
        .map(|mapped| mapped.body)
        .ok_or_else(|| Error::InvalidOperation("empty loop nest".to_string()))?;
    for op in module.block_ops(innermost) {
        if module.op(op).is_some_and(|d| d.is::<affine::TerminatorOp>()) {
            continue;
        }
        module.move_op(op, InsertPoint::Before(terminator))?;
    }

    module.erase_op(root)?;
    log::trace!(
        "mapped loop nest in '{}' onto a launch with {} block and {} thread dimension(s)",
        module.function_name(func),
        dims.num_block_dims,
        dims.num_thread_dims
    );
    Ok(())
}

fn induction_value(
    module: &mut Module,
    index_ty: TypeId,
    bounds: LoopBounds,
    id: Val,
    before: Opr,
) -> Result<Val> {
    let at = InsertPoint::Before(before);
    let mut value = id;
    if bounds.step != 1 {
        let step = module.insert_op(standard::constant_index(index_ty, bounds.step), at)?;
        let step = result_of(module, step)?;
        let scaled = module.insert_op(
            standard::binary::<standard::MulIOp>(value, step, index_ty),
            at,
        )?;
        value = result_of(module, scaled)?;
    }
    if bounds.lower != 0 {
        let lower = module.insert_op(standard::constant_index(index_ty, bounds.lower), at)?;
        let lower = result_of(module, lower)?;
        let shifted = module.insert_op(
            standard::binary::<standard::AddIOp>(value, lower, index_ty),
            at,
        )?;
        value = result_of(module, shifted)?;
    }
    Ok(value)
}

fn result_of(module: &Module, op: Opr) -> Result<Val> {
    module
        .op(op)
        .and_then(|d| d.result(0))
        .ok_or_else(|| Error::NotFound(format!("result of {:?}", op)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options_map_two_thread_dims() {
        let dims = LoopsToGpuOptions::default().launch_dims().unwrap();
        assert_eq!(dims.num_block_dims, 0);
        assert_eq!(dims.num_thread_dims, 2);
    }

    #[test]
    fn test_invalid_options_rejected() {
        let none = LoopsToGpuOptions::default().with_thread_dims(0);
        assert!(none.launch_dims().is_err());
        let too_many = LoopsToGpuOptions::default().with_block_dims(4);
        assert!(too_many.launch_dims().is_err());
    }
}
