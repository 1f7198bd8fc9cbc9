//! The two lowering pipelines: element-wise buffer ops down to outlined GPU
//! kernels, and kernel bodies down to `llvm`/`nvvm`.

use crate::context::Context;
use crate::error::{Error, Result};
use crate::module::Module;
use crate::pass::PassManager;
use crate::transforms::{
    CsePass, KernelOutliningPass, LegalizeToAffinePass, LoopsToGpuOptions, LoopsToGpuPass,
    LowerKernelBodiesPass,
};

pub const LHLO_TO_GPU_PIPELINE: &str = "Lowering to GPU kernels";
pub const KERNEL_LOWERING_PIPELINE: &str = "Lowering to NVVM IR";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PipelineOptions {
    pub num_block_dims: usize,
    pub num_thread_dims: usize,
    /// Verify the module after every pass of the GPU pipeline.
    pub verify_passes: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        let loops = LoopsToGpuOptions::default();
        Self {
            num_block_dims: loops.num_block_dims,
            num_thread_dims: loops.num_thread_dims,
            verify_passes: true,
        }
    }
}

impl PipelineOptions {
    pub fn with_block_dims(mut self, count: usize) -> Self {
        self.num_block_dims = count;
        self
    }

    pub fn with_thread_dims(mut self, count: usize) -> Self {
        self.num_thread_dims = count;
        self
    }

    pub fn with_verifier(mut self, enabled: bool) -> Self {
        self.verify_passes = enabled;
        self
    }

    pub fn loops_to_gpu(&self) -> LoopsToGpuOptions {
        LoopsToGpuOptions {
            num_block_dims: self.num_block_dims,
            num_thread_dims: self.num_thread_dims,
        }
    }
}

pub fn build_lhlo_to_gpu_pipeline(options: &PipelineOptions) -> PassManager {
    let mut pm = PassManager::new().enable_verifier(options.verify_passes);
    pm.add_pass(Box::new(LegalizeToAffinePass::new()));
    pm.add_pass(Box::new(LoopsToGpuPass::new(options.loops_to_gpu())));
    pm.add_pass(Box::new(KernelOutliningPass::new()));
    pm.add_pass(Box::new(CsePass::new()));
    pm
}

pub fn build_kernel_lowering_pipeline() -> PassManager {
    // Launch sites keep their memref operands while kernels take pointers
    let mut pm = PassManager::new().enable_verifier(false);
    pm.add_pass(Box::new(LowerKernelBodiesPass::new()));
    pm.add_pass(Box::new(CsePass::new()));
    pm
}

/// Element-wise `lhlo` ops → affine loops → `gpu.launch` → outlined kernels.
pub fn lower_lhlo_to_gpu(
    ctx: &mut Context,
    module: &mut Module,
    options: &PipelineOptions,
) -> Result<()> {
    run_pipeline(LHLO_TO_GPU_PIPELINE, build_lhlo_to_gpu_pipeline(options), ctx, module)
}

/// Kernel functions → `llvm`/`nvvm`; everything else is left alone.
pub fn lower_kernel_bodies_to_nvvm(ctx: &mut Context, module: &mut Module) -> Result<()> {
    run_pipeline(KERNEL_LOWERING_PIPELINE, build_kernel_lowering_pipeline(), ctx, module)
}

fn run_pipeline(
    pipeline: &str,
    mut pm: PassManager,
    ctx: &mut Context,
    module: &mut Module,
) -> Result<()> {
    log::info!("{}: {}", pipeline, pm.pass_names().join(", "));
    pm.run(ctx, module).map_err(|err| {
        log::error!("{} failed: {}", pipeline, err);
        Error::PipelineFailed {
            pipeline: pipeline.to_string(),
            source: Box::new(err),
        }
    })?;
    log::info!("{} finished", pipeline);
    Ok(())
}
