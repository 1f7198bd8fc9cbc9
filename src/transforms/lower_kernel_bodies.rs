//! Lowers every kernel function to the `llvm` and `nvvm` dialects.

use crate::context::Context;
use crate::conversion::gpu_to_nvvm::populate_gpu_to_nvvm_patterns;
use crate::conversion::std_to_llvm::populate_std_to_llvm_patterns;
use crate::conversion::{apply_full_conversion, ConversionTarget, LlvmTypeConverter, TypeConverter};
use crate::error::{Error, Result};
use crate::module::Module;
use crate::pass::{Pass, PassResult, PatternSet};

pub struct LowerKernelBodiesPass {
    converter: LlvmTypeConverter,
}

impl LowerKernelBodiesPass {
    pub fn new() -> Self {
        Self::with_converter(LlvmTypeConverter::new())
    }

    pub fn with_converter(converter: LlvmTypeConverter) -> Self {
        Self { converter }
    }

    pub fn patterns() -> PatternSet {
        let mut patterns = PatternSet::new();
        populate_std_to_llvm_patterns(&mut patterns);
        populate_gpu_to_nvvm_patterns(&mut patterns);
        patterns
    }

    /// Only `llvm`/`nvvm` ops are legal, and a kernel is done once its
    /// signature is.
    pub fn target(&self) -> ConversionTarget {
        let mut target = ConversionTarget::new();
        target.add_legal_dialect("llvm");
        target.add_legal_dialect("nvvm");
        let converter = self.converter;
        target.set_dynamic_function_legality(move |ctx, module, func| {
            module
                .function(func)
                .is_some_and(|f| converter.is_signature_legal(ctx, &f.inputs, &f.outputs))
        });
        target
    }
}

impl Default for LowerKernelBodiesPass {
    fn default() -> Self {
        Self::new()
    }
}

impl Pass for LowerKernelBodiesPass {
    fn name(&self) -> &str {
        "lower-kernel-bodies-to-nvvm"
    }

    fn run(&mut self, ctx: &mut Context, module: &mut Module) -> Result<PassResult> {
        let mut result = PassResult::new();
        let patterns = Self::patterns();
        let target = self.target();

        let kernels: Vec<_> = module
            .function_ids()
            .into_iter()
            .filter(|&f| module.function(f).is_some_and(|f| f.is_kernel()))
            .collect();

        // Every kernel is attempted; a failed one is left as it was
        let mut failures = Vec::new();
        let mut lowered = 0;
        for kernel in kernels {
            match apply_full_conversion(ctx, module, kernel, &target, &patterns, &self.converter) {
                Ok(()) => lowered += 1,
                Err(err) => {
                    log::warn!(
                        "failed to lower kernel '{}': {}",
                        module.function_name(kernel),
                        err
                    );
                    failures.push(err);
                }
            }
        }

        if !failures.is_empty() {
            return Err(Error::KernelLowering(failures));
        }
        if lowered > 0 {
            result.changed = true;
        }
        result.add_statistic("kernels_lowered", lowered);
        Ok(result)
    }

    // Kernel signatures no longer match the operands at their launch sites
    fn verify_after(&self) -> bool {
        false
    }
}
