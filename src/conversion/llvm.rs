use super::TypeConverter;
use crate::context::Context;
use crate::types::{TypeId, TypeKind};

/// Maps builtin types onto the `llvm` dialect.
///
/// Statically shaped memrefs become a bare pointer to their converted element
/// type; dynamic memrefs have no bare-pointer form and are rejected.
#[derive(Clone, Copy, Debug)]
pub struct LlvmTypeConverter {
    /// Width of the integer `index` lowers to.
    pub index_bitwidth: u32,
}

impl LlvmTypeConverter {
    pub fn new() -> Self {
        Self { index_bitwidth: 64 }
    }
}

impl Default for LlvmTypeConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeConverter for LlvmTypeConverter {
    fn convert_type(&self, ctx: &mut Context, ty: TypeId) -> Option<TypeId> {
        let kind = ctx.get_type(ty)?.clone();
        let converted = match kind {
            TypeKind::Index => ctx.builtin_types().llvm_int(self.index_bitwidth),
            TypeKind::Integer { width } => ctx.builtin_types().llvm_int(width),
            TypeKind::Float { precision } => ctx.builtin_types().llvm_float(precision),
            TypeKind::MemRef { shape, element } => {
                if shape.iter().any(Option::is_none) {
                    return None;
                }
                let element = self.convert_type(ctx, element)?;
                ctx.builtin_types().llvm_ptr(element)
            }
            TypeKind::LlvmInteger { .. }
            | TypeKind::LlvmFloat { .. }
            | TypeKind::LlvmPointer { .. }
            | TypeKind::LlvmVoid => ty,
            TypeKind::Function { .. } => return None,
        };
        Some(converted)
    }
}
