//! Op definitions for every abstraction level the pipeline passes through.
//!
//! `lhlo` is the input level, `affine`/`std`/`gpu` are intermediate, and
//! `llvm`/`nvvm` are what lowered kernels consist of.

pub mod affine;
pub mod builtin;
pub mod gpu;
pub mod lhlo;
pub mod llvm;
pub mod nvvm;
pub mod standard;
