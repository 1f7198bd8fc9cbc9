use crate::ops::OpRegistry;
use crate::types::{FloatPrecision, TypeId, TypeInterner, TypeKind};

/// State shared by every module compiled in one session: interned types and
/// the registry of known ops.
pub struct Context {
    pub types: TypeInterner,
    pub ops: OpRegistry,
}

impl Context {
    pub fn new() -> Self {
        let mut ctx = Self {
            types: TypeInterner::new(),
            ops: OpRegistry::new(),
        };
        ctx.ops.register_collected_ops();
        ctx
    }

    pub fn intern_type(&mut self, kind: TypeKind) -> TypeId {
        self.types.intern(kind)
    }

    pub fn get_type(&self, id: TypeId) -> Option<&TypeKind> {
        self.types.get(id)
    }

    pub fn type_name(&self, id: TypeId) -> String {
        self.types.display(id)
    }

    pub fn is_float(&self, id: TypeId) -> bool {
        matches!(self.get_type(id), Some(TypeKind::Float { .. }))
    }

    pub fn is_integer_like(&self, id: TypeId) -> bool {
        matches!(
            self.get_type(id),
            Some(TypeKind::Integer { .. } | TypeKind::Index)
        )
    }

    /// Shape and element type of a memref.
    pub fn memref_parts(&self, id: TypeId) -> Option<(Vec<Option<u64>>, TypeId)> {
        match self.get_type(id)? {
            TypeKind::MemRef { shape, element } => Some((shape.clone(), *element)),
            _ => None,
        }
    }

    /// Shape of a memref whose every dimension is known.
    pub fn static_shape(&self, id: TypeId) -> Option<Vec<u64>> {
        let (shape, _) = self.memref_parts(id)?;
        shape.into_iter().collect()
    }

    pub fn builtin_types(&mut self) -> BuiltinTypes<'_> {
        BuiltinTypes { ctx: self }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

pub struct BuiltinTypes<'a> {
    ctx: &'a mut Context,
}

impl<'a> BuiltinTypes<'a> {
    pub fn index(&mut self) -> TypeId {
        self.ctx.intern_type(TypeKind::Index)
    }

    pub fn integer(&mut self, width: u32) -> TypeId {
        self.ctx.intern_type(TypeKind::Integer { width })
    }

    pub fn i1(&mut self) -> TypeId {
        self.integer(1)
    }

    pub fn i32(&mut self) -> TypeId {
        self.integer(32)
    }

    pub fn i64(&mut self) -> TypeId {
        self.integer(64)
    }

    pub fn f16(&mut self) -> TypeId {
        self.ctx.intern_type(TypeKind::Float { precision: FloatPrecision::Half })
    }

    pub fn f32(&mut self) -> TypeId {
        self.ctx.intern_type(TypeKind::Float { precision: FloatPrecision::Single })
    }

    pub fn f64(&mut self) -> TypeId {
        self.ctx.intern_type(TypeKind::Float { precision: FloatPrecision::Double })
    }

    pub fn memref(&mut self, shape: &[u64], element: TypeId) -> TypeId {
        self.ctx.intern_type(TypeKind::MemRef {
            shape: shape.iter().copied().map(Some).collect(),
            element,
        })
    }

    /// Memref with unknown (`None`) dimensions.
    pub fn dynamic_memref(&mut self, shape: &[Option<u64>], element: TypeId) -> TypeId {
        self.ctx.intern_type(TypeKind::MemRef {
            shape: shape.to_vec(),
            element,
        })
    }

    pub fn function(&mut self, inputs: Vec<TypeId>, outputs: Vec<TypeId>) -> TypeId {
        self.ctx.intern_type(TypeKind::Function { inputs, outputs })
    }

    pub fn llvm_int(&mut self, width: u32) -> TypeId {
        self.ctx.intern_type(TypeKind::LlvmInteger { width })
    }

    pub fn llvm_float(&mut self, precision: FloatPrecision) -> TypeId {
        self.ctx.intern_type(TypeKind::LlvmFloat { precision })
    }

    pub fn llvm_ptr(&mut self, pointee: TypeId) -> TypeId {
        self.ctx.intern_type(TypeKind::LlvmPointer { pointee })
    }

    pub fn llvm_void(&mut self) -> TypeId {
        self.ctx.intern_type(TypeKind::LlvmVoid)
    }
}
