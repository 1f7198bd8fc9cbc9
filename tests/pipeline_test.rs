// Tests for the lowering pipelines.
//
// Purpose: Validates both pipelines end to end:
// - Element-wise buffer ops down to outlined kernels and launch_func
// - Kernel bodies down to llvm/nvvm with the host left alone
// - Failures wrapped with the pipeline and pass that stopped
// - Modules with nothing to lower passing through unchanged

mod common;

use common::{block_op_names, elementwise_module, find_ops, init_logging, kernels, op_names};
use lowir::dialects::lhlo;
use lowir::pipeline::{
    build_kernel_lowering_pipeline, build_lhlo_to_gpu_pipeline, KERNEL_LOWERING_PIPELINE,
    LHLO_TO_GPU_PIPELINE,
};
use lowir::{
    lower_kernel_bodies_to_nvvm, lower_lhlo_to_gpu, print_module, verify_module, Context, Error,
    PipelineOptions,
};

#[test]
fn test_lhlo_to_gpu() {
    init_logging();
    let mut ctx = Context::new();
    let (mut module, func) = elementwise_module::<lhlo::AddOp>(&mut ctx, &[16, 32]);
    let entry = module.entry_block(func).unwrap();
    let host_args = module.block_args(entry);

    lower_lhlo_to_gpu(&mut ctx, &mut module, &PipelineOptions::default()).unwrap();

    assert_eq!(
        block_op_names(&module, entry),
        vec!["std.constant", "std.constant", "gpu.launch_func", "std.return"]
    );
    let launch_func = find_ops(&module, "gpu.launch_func")[0];
    let data = module.op(launch_func).unwrap();
    assert_eq!(data.str_attr("kernel"), Some("f_kernel"));
    // Two launch sizes, then lhs, rhs and out
    assert_eq!(data.operands[2..].to_vec(), host_args);

    let kernel = module.lookup_function("f_kernel").unwrap();
    assert_eq!(kernels(&module), vec![kernel]);
    assert_eq!(
        op_names(&module, kernel),
        vec![
            "gpu.thread_id",
            "gpu.thread_id",
            "std.load",
            "std.load",
            "std.addf",
            "std.store",
            "gpu.return",
        ]
    );
    verify_module(&ctx, &module).unwrap();
}

#[test]
fn test_full_lowering() {
    init_logging();
    let mut ctx = Context::new();
    let (mut module, func) = elementwise_module::<lhlo::AddOp>(&mut ctx, &[16, 32]);

    lower_lhlo_to_gpu(&mut ctx, &mut module, &PipelineOptions::default()).unwrap();
    let host_before = op_names(&module, func);
    lower_kernel_bodies_to_nvvm(&mut ctx, &mut module).unwrap();

    assert_eq!(op_names(&module, func), host_before);

    let kernel = module.lookup_function("f_kernel").unwrap();
    let names = op_names(&module, kernel);
    assert_eq!(
        names[..4].to_vec(),
        vec![
            "nvvm.read.ptx.sreg.tid.x",
            "llvm.sext",
            "nvvm.read.ptx.sreg.tid.y",
            "llvm.sext",
        ]
    );
    assert!(names
        .iter()
        .all(|name| name.starts_with("llvm.") || name.starts_with("nvvm.")));
    assert_eq!(names.iter().filter(|&&n| n == "llvm.load").count(), 2);
    assert_eq!(names.iter().filter(|&&n| n == "llvm.fadd").count(), 1);
    assert_eq!(names.iter().filter(|&&n| n == "llvm.store").count(), 1);
    assert_eq!(names.last(), Some(&"llvm.return"));
    // All three accesses share one `tid.x * 32 + tid.y` offset
    for op in ["llvm.mlir.constant", "llvm.mul", "llvm.add"] {
        assert_eq!(names.iter().filter(|&&n| n == op).count(), 1, "{}", op);
    }

    let params: Vec<String> = module
        .function(kernel)
        .unwrap()
        .inputs
        .iter()
        .map(|&t| ctx.type_name(t))
        .collect();
    assert_eq!(params, vec!["!llvm.ptr<float>"; 3]);

    // Launch sites still pass memrefs, so the module no longer verifies
    assert!(verify_module(&ctx, &module).is_err());
}

#[test]
fn test_block_dims_option() {
    let mut ctx = Context::new();
    let (mut module, _) = elementwise_module::<lhlo::MaxOp>(&mut ctx, &[8, 128]);
    let options = PipelineOptions::default()
        .with_block_dims(1)
        .with_thread_dims(1);

    lower_lhlo_to_gpu(&mut ctx, &mut module, &options).unwrap();

    let kernel = module.lookup_function("f_kernel").unwrap();
    let names = op_names(&module, kernel);
    assert_eq!(names[..2].to_vec(), vec!["gpu.block_id", "gpu.thread_id"]);
    let launch_func = find_ops(&module, "gpu.launch_func")[0];
    assert_eq!(
        module.op(launch_func).unwrap().int_attr("num_block_dims"),
        Some(1)
    );

    lower_kernel_bodies_to_nvvm(&mut ctx, &mut module).unwrap();
    let names = op_names(&module, kernel);
    assert_eq!(names[0], "nvvm.read.ptx.sreg.ctaid.x");
    assert!(names.contains(&"llvm.fcmp"));
    assert!(names.contains(&"llvm.select"));
}

#[test]
fn test_trivial_module_is_unchanged() {
    let mut ctx = Context::new();
    let mut module = common::trivial_module();
    let before = print_module(&ctx, &module);

    lower_lhlo_to_gpu(&mut ctx, &mut module, &PipelineOptions::default()).unwrap();
    assert_eq!(print_module(&ctx, &module), before);
    lower_kernel_bodies_to_nvvm(&mut ctx, &mut module).unwrap();
    assert_eq!(print_module(&ctx, &module), before);
}

#[test]
fn test_failure_names_pipeline_and_pass() {
    init_logging();
    let mut ctx = Context::new();
    let (mut module, _) = elementwise_module::<lhlo::AndOp>(&mut ctx, &[4, 4]);

    let err = lower_lhlo_to_gpu(&mut ctx, &mut module, &PipelineOptions::default()).unwrap_err();
    let Error::PipelineFailed { pipeline, source } = &err else {
        panic!("unexpected error: {}", err);
    };
    assert_eq!(pipeline, LHLO_TO_GPU_PIPELINE);
    assert!(matches!(
        source.as_ref(),
        Error::PassFailed { pass, .. } if pass == "lhlo-legalize-to-affine"
    ));
    assert!(matches!(err.root_cause(), Error::TypeError(_)));
    assert!(err.to_string().starts_with("Lowering to GPU kernels failed: pass 'lhlo-legalize-to-affine' failed"));
}

#[test]
fn test_unmapped_inner_loop_fails_kernel_lowering() {
    init_logging();
    let mut ctx = Context::new();
    let (mut module, _) = elementwise_module::<lhlo::AddOp>(&mut ctx, &[2, 3, 5]);

    lower_lhlo_to_gpu(&mut ctx, &mut module, &PipelineOptions::default()).unwrap();
    let kernel = module.lookup_function("f_kernel").unwrap();
    let before = op_names(&module, kernel);
    assert!(before.contains(&"affine.for"));

    let err = lower_kernel_bodies_to_nvvm(&mut ctx, &mut module).unwrap_err();
    match &err {
        Error::PipelineFailed { pipeline, source } => {
            assert_eq!(pipeline, KERNEL_LOWERING_PIPELINE);
            assert!(matches!(
                source.as_ref(),
                Error::PassFailed { pass, .. } if pass == "lower-kernel-bodies-to-nvvm"
            ));
        }
        other => panic!("unexpected error: {}", other),
    }
    let Error::KernelLowering(failures) = err.root_cause() else {
        panic!("unexpected root cause: {}", err.root_cause());
    };
    assert!(matches!(
        &failures[0],
        Error::NoLegalizationPattern { op, .. } if op == "affine.for"
    ));
    assert_eq!(op_names(&module, kernel), before);
}

#[test]
fn test_verifier_can_be_disabled() {
    let mut ctx = Context::new();
    let (mut module, _) = elementwise_module::<lhlo::DivOp>(&mut ctx, &[4, 4]);
    let options = PipelineOptions::default().with_verifier(false);
    let mut pm = build_lhlo_to_gpu_pipeline(&options);
    pm.run(&mut ctx, &mut module).unwrap();
    assert_eq!(kernels(&module).len(), 1);

    let mut pm = build_kernel_lowering_pipeline();
    pm.run(&mut ctx, &mut module).unwrap();
    let kernel = module.lookup_function("f_kernel").unwrap();
    assert!(op_names(&module, kernel).contains(&"llvm.fdiv"));
}
