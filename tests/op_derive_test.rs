// Tests for the #[derive(Op)] macro in lowir.
//
// Purpose: Validates that op definitions outside the library:
// - Are collected into the registry of every new Context
// - Carry their dialect, name and traits in the generated OpInfo
// - Get an arity verifier for the declared operand/result/region counts
// - Leave undeclared counts unchecked (variadic)

use lowir::ops::{traits, OperationState};
use lowir::{Context, Error, InsertPoint, Module, Op, OpDef};

#[derive(Op)]
#[operation(dialect = "test", name = "pair", traits = "Pure", operands = 2, results = 1)]
struct PairOp;

#[derive(Op)]
#[operation(dialect = "test", name = "sink", regions = 0)]
struct SinkOp;

#[test]
fn test_derived_ops_are_registered() {
    let ctx = Context::new();
    assert!(ctx.ops.contains("test.pair"));
    assert!(ctx.ops.contains("test.sink"));
    // Built-in dialects come from the same collection
    assert!(ctx.ops.contains("lhlo.add"));
    assert!(ctx.ops.contains("nvvm.read.ptx.sreg.tid.x"));

    let names: Vec<&str> = ctx
        .ops
        .dialect_ops("test")
        .into_iter()
        .map(|info| info.full_name)
        .collect();
    assert_eq!(names, vec!["test.pair", "test.sink"]);
}

#[test]
fn test_generated_info() {
    let info = PairOp::info();
    assert_eq!(PairOp::NAME, "test.pair");
    assert_eq!(info.dialect, "test");
    assert_eq!(info.name, "pair");
    assert!(info.has_trait(traits::PURE));
    assert!(!info.is_terminator());
}

#[test]
fn test_arity_verification() {
    let mut ctx = Context::new();
    let mut module = Module::new();
    let i32_ty = ctx.builtin_types().i32();
    let func = module.add_function("f", vec![i32_ty], vec![]);
    let entry = module.entry_block(func).unwrap();
    let arg = module.block_args(entry)[0];
    let at = InsertPoint::BlockEnd(entry);

    let good = module
        .insert_op(
            OperationState::new::<PairOp>().operands([arg, arg]).result(i32_ty),
            at,
        )
        .unwrap();
    let bad = module
        .insert_op(OperationState::new::<PairOp>().operand(arg).result(i32_ty), at)
        .unwrap();

    let good = module.op(good).unwrap();
    assert!((good.info.verify)(good).is_ok());

    let bad = module.op(bad).unwrap();
    let err = (bad.info.verify)(bad).unwrap_err();
    assert!(matches!(err, Error::VerificationError(_)));
    assert!(err.to_string().contains("'test.pair' expects 2 operands, found 1"));
}

#[test]
fn test_variadic_operands() {
    let mut ctx = Context::new();
    let mut module = Module::new();
    let i32_ty = ctx.builtin_types().i32();
    let func = module.add_function("f", vec![i32_ty], vec![]);
    let entry = module.entry_block(func).unwrap();
    let arg = module.block_args(entry)[0];

    let sink = module
        .insert_op(
            OperationState::new::<SinkOp>().operands([arg, arg, arg]),
            InsertPoint::BlockEnd(entry),
        )
        .unwrap();
    let sink = module.op(sink).unwrap();
    assert!(sink.is::<SinkOp>());
    assert!((sink.info.verify)(sink).is_ok());
}
