// Lets `#[derive(Op)]` expansions refer to `lowir::...` from inside the crate.
extern crate self as lowir;

pub mod attribute;
pub mod context;
pub mod conversion;
pub mod dialects;
pub mod error;
pub mod module;
pub mod ops;
pub mod pass;
pub mod pipeline;
pub mod printer;
pub mod region;
pub mod transforms;
pub mod types;
pub mod verification;

// Re-export macros
pub use lowir_macros::Op;

// Re-export dependencies used in macros
pub use inventory;
pub use smallvec;

// Re-export commonly used items
pub use attribute::{Attribute, AttributeMap, AttributeMapExt};
pub use context::Context;
pub use conversion::{apply_full_conversion, ConversionTarget, LlvmTypeConverter, TypeConverter};
pub use error::{Error, Result};
pub use module::{FuncId, Function, InsertPoint, Module};
pub use ops::{OpData, OpDef, OpInfo, OperationState, Opr, Val, Value};
pub use pass::{apply_patterns_greedy, Pass, PassManager, PassResult, PatternRewriter, PatternSet, RewritePattern};
pub use pipeline::{lower_kernel_bodies_to_nvvm, lower_lhlo_to_gpu, PipelineOptions};
pub use printer::{print_module, Printer};
pub use region::{Block, BlockId, Region, RegionId};
pub use types::{FloatPrecision, TypeId, TypeKind};
pub use verification::verify_module;
