//! The passes the lowering pipelines are assembled from.

pub mod cse;
pub mod kernel_outlining;
pub mod legalize_to_affine;
pub mod loops_to_gpu;
pub mod lower_kernel_bodies;

pub use cse::CsePass;
pub use kernel_outlining::KernelOutliningPass;
pub use legalize_to_affine::LegalizeToAffinePass;
pub use loops_to_gpu::{LoopsToGpuOptions, LoopsToGpuPass};
pub use lower_kernel_bodies::LowerKernelBodiesPass;
