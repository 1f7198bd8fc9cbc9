// Shared builders for the integration tests.
#![allow(dead_code)]

use lowir::dialects::{lhlo, standard};
use lowir::region::BlockId;
use lowir::{Context, FuncId, InsertPoint, Module, OpDef, Opr, TypeId, Val};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// `func @f(%lhs, %rhs, %out: memref<shape x f32>) { T(%lhs, %rhs, %out); return }`
pub fn elementwise_module<T: OpDef>(ctx: &mut Context, shape: &[u64]) -> (Module, FuncId) {
    let f32_ty = ctx.builtin_types().f32();
    buffer_module::<T>(ctx, shape, f32_ty)
}

pub fn buffer_module<T: OpDef>(
    ctx: &mut Context,
    shape: &[u64],
    element: TypeId,
) -> (Module, FuncId) {
    let buffer = ctx.builtin_types().memref(shape, element);
    let mut module = Module::new();
    let func = module.add_function("f", vec![buffer; 3], vec![]);
    let entry = module.entry_block(func).unwrap();
    let args = module.block_args(entry);
    let at = InsertPoint::BlockEnd(entry);
    module
        .insert_op(lhlo::binary::<T>(args[0], args[1], args[2]), at)
        .unwrap();
    module.insert_op(standard::ret(&[]), at).unwrap();
    (module, func)
}

/// A function holding nothing but a return.
pub fn trivial_module() -> Module {
    let mut module = Module::new();
    let func = module.add_function("main", vec![], vec![]);
    let entry = module.entry_block(func).unwrap();
    module
        .insert_op(standard::ret(&[]), InsertPoint::BlockEnd(entry))
        .unwrap();
    module
}

pub fn op_names(module: &Module, func: FuncId) -> Vec<&'static str> {
    module
        .walk_function(func)
        .into_iter()
        .map(|op| module.op(op).unwrap().name())
        .collect()
}

pub fn block_op_names(module: &Module, block: BlockId) -> Vec<&'static str> {
    module
        .block_ops(block)
        .into_iter()
        .map(|op| module.op(op).unwrap().name())
        .collect()
}

pub fn find_ops(module: &Module, name: &str) -> Vec<Opr> {
    module
        .walk()
        .into_iter()
        .filter(|&op| module.op(op).unwrap().name() == name)
        .collect()
}

pub fn result(module: &Module, op: Opr) -> Val {
    module.op(op).unwrap().result(0).unwrap()
}

/// Entry block of the single region of `op`.
pub fn body_of(module: &Module, op: Opr) -> BlockId {
    let region = module.op(op).unwrap().regions[0];
    module.region_entry_block(region).unwrap()
}

pub fn kernels(module: &Module) -> Vec<FuncId> {
    module
        .function_ids()
        .into_iter()
        .filter(|&f| module.function(f).unwrap().is_kernel())
        .collect()
}
