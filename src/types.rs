use ahash::AHashMap;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct TypeId(u32);

impl TypeId {
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Index,
    Integer { width: u32 },
    Float { precision: FloatPrecision },
    /// `None` marks a dynamic dimension.
    MemRef { shape: Vec<Option<u64>>, element: TypeId },
    Function { inputs: Vec<TypeId>, outputs: Vec<TypeId> },
    LlvmInteger { width: u32 },
    LlvmFloat { precision: FloatPrecision },
    LlvmPointer { pointee: TypeId },
    LlvmVoid,
}

impl TypeKind {
    /// Dialect that owns this kind of type.
    pub fn dialect(&self) -> &'static str {
        match self {
            TypeKind::LlvmInteger { .. }
            | TypeKind::LlvmFloat { .. }
            | TypeKind::LlvmPointer { .. }
            | TypeKind::LlvmVoid => "llvm",
            _ => "builtin",
        }
    }

    pub fn is_llvm(&self) -> bool {
        self.dialect() == "llvm"
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FloatPrecision {
    Half,
    Single,
    Double,
}

impl FloatPrecision {
    pub fn width(self) -> u32 {
        match self {
            FloatPrecision::Half => 16,
            FloatPrecision::Single => 32,
            FloatPrecision::Double => 64,
        }
    }
}

pub struct TypeInterner {
    types: Vec<TypeKind>,
    lookup: AHashMap<TypeKind, TypeId>,
}

impl TypeInterner {
    pub fn new() -> Self {
        Self {
            types: Vec::new(),
            lookup: AHashMap::new(),
        }
    }

    pub fn intern(&mut self, kind: TypeKind) -> TypeId {
        if let Some(&id) = self.lookup.get(&kind) {
            return id;
        }

        let id = TypeId(self.types.len() as u32);
        self.types.push(kind.clone());
        self.lookup.insert(kind, id);
        id
    }

    pub fn get(&self, id: TypeId) -> Option<&TypeKind> {
        self.types.get(id.0 as usize)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Renders a type the way it appears in diagnostics and debug dumps.
    pub fn display(&self, id: TypeId) -> String {
        let Some(kind) = self.get(id) else {
            return format!("<unknown type {}>", id.0);
        };
        match kind {
            TypeKind::Index => "index".to_string(),
            TypeKind::Integer { width } => format!("i{}", width),
            TypeKind::Float { precision } => format!("f{}", precision.width()),
            TypeKind::MemRef { shape, element } => {
                let mut out = String::from("memref<");
                for dim in shape {
                    match dim {
                        Some(size) => out.push_str(&size.to_string()),
                        None => out.push('?'),
                    }
                    out.push('x');
                }
                out.push_str(&self.display(*element));
                out.push('>');
                out
            }
            TypeKind::Function { inputs, outputs } => {
                let inputs: Vec<String> = inputs.iter().map(|t| self.display(*t)).collect();
                let outputs: Vec<String> = outputs.iter().map(|t| self.display(*t)).collect();
                format!("({}) -> ({})", inputs.join(", "), outputs.join(", "))
            }
            TypeKind::LlvmInteger { width } => format!("!llvm.i{}", width),
            TypeKind::LlvmFloat { precision } => match precision {
                FloatPrecision::Half => "!llvm.half".to_string(),
                FloatPrecision::Single => "!llvm.float".to_string(),
                FloatPrecision::Double => "!llvm.double".to_string(),
            },
            TypeKind::LlvmPointer { pointee } => {
                let inner = self.display(*pointee);
                format!("!llvm.ptr<{}>", inner.trim_start_matches("!llvm."))
            }
            TypeKind::LlvmVoid => "!llvm.void".to_string(),
        }
    }
}

impl Default for TypeInterner {
    fn default() -> Self {
        Self::new()
    }
}
