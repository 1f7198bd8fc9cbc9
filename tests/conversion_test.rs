// Tests for dialect conversion in lowir.
//
// Purpose: Validates the legality engine and full conversion:
// - ConversionTarget lookup order (illegal, dynamic, legal op, dialect)
// - Signature and entry-argument conversion through the LLVM type converter
// - Adapter casts bridging converted values, all removed at the end
// - Failures naming the offending op or type
// - All-or-nothing behaviour: a failed conversion leaves the module untouched

mod common;

use common::{init_logging, op_names, result};
use lowir::attribute::Attribute;
use lowir::conversion::gpu_to_nvvm::populate_gpu_to_nvvm_patterns;
use lowir::conversion::std_to_llvm::populate_std_to_llvm_patterns;
use lowir::dialects::{gpu, standard};
use lowir::module::KERNEL_ATTR;
use lowir::ops::Opr;
use lowir::{
    apply_full_conversion, print_module, AttributeMapExt, Context, ConversionTarget, Error, FuncId,
    InsertPoint, LlvmTypeConverter, Module, OpDef, PatternRewriter, PatternSet, Result,
    RewritePattern, TypeConverter,
};

fn llvm_target() -> ConversionTarget {
    let mut target = ConversionTarget::new();
    target.add_legal_dialect("llvm");
    target.add_legal_dialect("nvvm");
    target
}

fn lowering_patterns() -> PatternSet {
    let mut patterns = PatternSet::new();
    populate_std_to_llvm_patterns(&mut patterns);
    populate_gpu_to_nvvm_patterns(&mut patterns);
    patterns
}

/// Marks a call as traced and reports success without replacing it.
struct TagCall;

impl RewritePattern for TagCall {
    fn root(&self) -> Option<&'static str> {
        Some(standard::CallOp::NAME)
    }

    fn match_and_rewrite(&self, op: Opr, rewriter: &mut PatternRewriter) -> Result<bool> {
        let Some(data) = rewriter.module.op_mut(op) else {
            return Ok(false);
        };
        data.attributes.set("traced", Attribute::Unit);
        Ok(true)
    }
}

/// A kernel with a `std.call` right before its terminator.
fn kernel_with_call(ctx: &mut Context, module: &mut Module) -> FuncId {
    let kernel = add_kernel(ctx, module, "k");
    let entry = module.entry_block(kernel).unwrap();
    let ret = module.block_ops(entry).last().copied().unwrap();
    module
        .insert_op(standard::call("helper", &[], &[]), InsertPoint::Before(ret))
        .unwrap();
    kernel
}

/// `out[tid.x] = in[tid.x] + in[tid.x]` over `memref<4xf32>`
fn add_kernel(ctx: &mut Context, module: &mut Module, name: &str) -> FuncId {
    let f32_ty = ctx.builtin_types().f32();
    let index = ctx.builtin_types().index();
    let buffer = ctx.builtin_types().memref(&[4], f32_ty);
    let func = module.add_function(name, vec![buffer, buffer], vec![]);
    module
        .set_function_attr(func, KERNEL_ATTR, Attribute::Unit)
        .unwrap();
    let entry = module.entry_block(func).unwrap();
    let args = module.block_args(entry);
    let at = InsertPoint::BlockEnd(entry);

    let tid = module
        .insert_op(gpu::id_op::<gpu::ThreadIdOp>("x", index), at)
        .unwrap();
    let tid = result(module, tid);
    let loaded = module
        .insert_op(standard::load(args[0], &[tid], f32_ty), at)
        .unwrap();
    let loaded = result(module, loaded);
    let sum = module
        .insert_op(standard::binary::<standard::AddFOp>(loaded, loaded, f32_ty), at)
        .unwrap();
    let sum = result(module, sum);
    module
        .insert_op(standard::store(sum, args[1], &[tid]), at)
        .unwrap();
    module.insert_op(gpu::ret(), at).unwrap();
    func
}

#[test]
fn test_target_lookup_order() {
    let mut ctx = Context::new();
    let mut module = Module::new();
    let f32_ty = ctx.builtin_types().f32();
    let func = module.add_function("f", vec![f32_ty], vec![]);
    let entry = module.entry_block(func).unwrap();
    let arg = module.block_args(entry)[0];
    let at = InsertPoint::BlockEnd(entry);
    let add = module
        .insert_op(standard::binary::<standard::AddFOp>(arg, arg, f32_ty), at)
        .unwrap();
    let mul = module
        .insert_op(standard::binary::<standard::MulFOp>(arg, arg, f32_ty), at)
        .unwrap();
    let tagged = module
        .insert_op(
            standard::binary::<standard::SubFOp>(arg, arg, f32_ty).attr("keep", Attribute::Unit),
            at,
        )
        .unwrap();
    let untagged = module
        .insert_op(standard::binary::<standard::SubFOp>(arg, arg, f32_ty), at)
        .unwrap();
    let ret = module.insert_op(standard::ret(&[]), at).unwrap();

    let mut target = ConversionTarget::new();
    target.add_legal_dialect("std");
    target.add_illegal_op::<standard::AddFOp>();
    target.add_dynamically_legal_op::<standard::SubFOp>(|_, module, op| {
        module.op(op).is_some_and(|d| d.attr("keep").is_some())
    });

    assert!(!target.is_legal(&mut ctx, &module, add));
    assert!(target.is_legal(&mut ctx, &module, mul));
    assert!(target.is_legal(&mut ctx, &module, tagged));
    assert!(!target.is_legal(&mut ctx, &module, untagged));
    assert!(target.is_legal(&mut ctx, &module, ret));
    assert!(target.is_function_legal(&mut ctx, &module, func));
}

#[test]
fn test_kernel_converts_to_llvm() {
    init_logging();
    let mut ctx = Context::new();
    let mut module = Module::new();
    let kernel = add_kernel(&mut ctx, &mut module, "k");
    let converter = LlvmTypeConverter::new();

    apply_full_conversion(
        &mut ctx,
        &mut module,
        kernel,
        &llvm_target(),
        &lowering_patterns(),
        &converter,
    )
    .unwrap();

    assert_eq!(
        op_names(&module, kernel),
        vec![
            "nvvm.read.ptx.sreg.tid.x",
            "llvm.sext",
            "llvm.getelementptr",
            "llvm.load",
            "llvm.fadd",
            "llvm.getelementptr",
            "llvm.store",
            "llvm.return",
        ]
    );

    let function = module.function(kernel).unwrap();
    assert!(converter.is_signature_legal(&mut ctx, &function.inputs, &function.outputs));
    let param_types: Vec<String> = function.inputs.iter().map(|&t| ctx.type_name(t)).collect();
    assert_eq!(param_types, vec!["!llvm.ptr<float>", "!llvm.ptr<float>"]);

    // Entry arguments were retyped in place
    let entry = module.entry_block(kernel).unwrap();
    for arg in module.block_args(entry) {
        assert_eq!(ctx.type_name(module.value_type(arg).unwrap()), "!llvm.ptr<float>");
    }
}

#[test]
fn test_multi_dimensional_access_is_linearized() {
    let mut ctx = Context::new();
    let mut module = Module::new();
    let f32_ty = ctx.builtin_types().f32();
    let index = ctx.builtin_types().index();
    let buffer = ctx.builtin_types().memref(&[8, 16], f32_ty);
    let func = module.add_function("k", vec![buffer, index, index], vec![]);
    let entry = module.entry_block(func).unwrap();
    let args = module.block_args(entry);
    let at = InsertPoint::BlockEnd(entry);
    let loaded = module
        .insert_op(standard::load(args[0], &[args[1], args[2]], f32_ty), at)
        .unwrap();
    let loaded = result(&module, loaded);
    module
        .insert_op(standard::store(loaded, args[0], &[args[2], args[1]]), at)
        .unwrap();
    module.insert_op(standard::ret(&[]), at).unwrap();

    apply_full_conversion(
        &mut ctx,
        &mut module,
        func,
        &llvm_target(),
        &lowering_patterns(),
        &LlvmTypeConverter::new(),
    )
    .unwrap();

    assert_eq!(
        op_names(&module, func),
        vec![
            "llvm.mlir.constant",
            "llvm.mul",
            "llvm.add",
            "llvm.getelementptr",
            "llvm.load",
            "llvm.mlir.constant",
            "llvm.mul",
            "llvm.add",
            "llvm.getelementptr",
            "llvm.store",
            "llvm.return",
        ]
    );
    let stride = module.walk_function(func)[0];
    assert_eq!(module.op(stride).unwrap().int_attr("value"), Some(16));
}

#[test]
fn test_missing_pattern_fails_and_restores() {
    init_logging();
    let mut ctx = Context::new();
    let mut module = Module::new();
    let kernel = add_kernel(&mut ctx, &mut module, "k");
    let entry = module.entry_block(kernel).unwrap();
    let ret = module.block_ops(entry).last().copied().unwrap();
    module
        .insert_op(standard::call("helper", &[], &[]), InsertPoint::Before(ret))
        .unwrap();
    let before = print_module(&ctx, &module);

    let err = apply_full_conversion(
        &mut ctx,
        &mut module,
        kernel,
        &llvm_target(),
        &lowering_patterns(),
        &LlvmTypeConverter::new(),
    )
    .unwrap_err();

    match &err {
        Error::NoLegalizationPattern { op, function } => {
            assert_eq!(op, "std.call");
            assert_eq!(function, "k");
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(print_module(&ctx, &module), before);
}

#[test]
fn test_unconvertible_signature() {
    let mut ctx = Context::new();
    let mut module = Module::new();
    let f32_ty = ctx.builtin_types().f32();
    let dynamic = ctx.builtin_types().dynamic_memref(&[None], f32_ty);
    let func = module.add_function("k", vec![dynamic], vec![]);
    let entry = module.entry_block(func).unwrap();
    module
        .insert_op(standard::ret(&[]), InsertPoint::BlockEnd(entry))
        .unwrap();
    let before = print_module(&ctx, &module);

    let err = apply_full_conversion(
        &mut ctx,
        &mut module,
        func,
        &llvm_target(),
        &lowering_patterns(),
        &LlvmTypeConverter::new(),
    )
    .unwrap_err();

    match &err {
        Error::SignatureConversion { function, ty } => {
            assert_eq!(function, "k");
            assert_eq!(ty, "memref<?xf32>");
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(print_module(&ctx, &module), before);
}

#[test]
fn test_function_legality_predicate_is_checked() {
    let mut ctx = Context::new();
    let mut module = Module::new();
    let kernel = add_kernel(&mut ctx, &mut module, "k");
    let before = print_module(&ctx, &module);

    let mut target = llvm_target();
    target.set_dynamic_function_legality(|_, _, _| false);

    let result = apply_full_conversion(
        &mut ctx,
        &mut module,
        kernel,
        &target,
        &lowering_patterns(),
        &LlvmTypeConverter::new(),
    );
    assert!(matches!(result, Err(Error::InvalidOperation(_))));
    assert_eq!(print_module(&ctx, &module), before);
}

#[test]
fn test_converting_twice_is_a_no_op() {
    let mut ctx = Context::new();
    let mut module = Module::new();
    let kernel = add_kernel(&mut ctx, &mut module, "k");
    let target = llvm_target();
    let patterns = lowering_patterns();
    let converter = LlvmTypeConverter::new();

    apply_full_conversion(&mut ctx, &mut module, kernel, &target, &patterns, &converter).unwrap();
    let once = print_module(&ctx, &module);
    apply_full_conversion(&mut ctx, &mut module, kernel, &target, &patterns, &converter).unwrap();
    assert_eq!(print_module(&ctx, &module), once);
}

#[test]
fn test_in_place_update_must_legalize_the_op() {
    init_logging();
    let mut ctx = Context::new();
    let mut module = Module::new();
    let kernel = kernel_with_call(&mut ctx, &mut module);
    let before = print_module(&ctx, &module);

    let patterns = lowering_patterns().with(TagCall);
    let err = apply_full_conversion(
        &mut ctx,
        &mut module,
        kernel,
        &llvm_target(),
        &patterns,
        &LlvmTypeConverter::new(),
    )
    .unwrap_err();

    // The pattern claimed success but std.call is still illegal
    assert!(matches!(
        &err,
        Error::NoLegalizationPattern { op, function } if op == "std.call" && function == "k"
    ));
    assert_eq!(print_module(&ctx, &module), before);
}

#[test]
fn test_in_place_update_rechecked_against_target() {
    let mut ctx = Context::new();
    let mut module = Module::new();
    let kernel = kernel_with_call(&mut ctx, &mut module);

    let mut target = llvm_target();
    target.add_dynamically_legal_op::<standard::CallOp>(|_, module, op| {
        module
            .op(op)
            .is_some_and(|data| data.attributes.contains("traced"))
    });
    let patterns = lowering_patterns().with(TagCall);
    apply_full_conversion(
        &mut ctx,
        &mut module,
        kernel,
        &target,
        &patterns,
        &LlvmTypeConverter::new(),
    )
    .unwrap();

    let names = op_names(&module, kernel);
    assert_eq!(
        names[names.len() - 2..].to_vec(),
        vec!["std.call", "llvm.return"]
    );
    let call = module
        .walk_function(kernel)
        .into_iter()
        .find(|&op| module.op(op).unwrap().is::<standard::CallOp>())
        .unwrap();
    assert!(module.op(call).unwrap().attributes.contains("traced"));
}
