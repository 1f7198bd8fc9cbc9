use crate::attribute::{Attribute, AttributeMap, AttributeMapExt};
use crate::error::Result;
use crate::region::{BlockId, RegionId};
use crate::types::TypeId;
use ahash::AHashMap;
use slotmap::new_key_type;
use smallvec::SmallVec;
use std::fmt;

// Every `#[derive(Op)]` submits its `OpInfo` here.
inventory::collect!(&'static OpInfo);

new_key_type! {
    pub struct Val;
    pub struct Opr;
}

/// Op-level traits understood by the engine.
pub mod traits {
    /// No side effects; a candidate for CSE.
    pub const PURE: &str = "Pure";
    /// Must be the last op of its block.
    pub const TERMINATOR: &str = "Terminator";
    /// High-level element-wise buffer op.
    pub const ELEMENT_WISE: &str = "ElementWise";
    pub const SAME_OPERANDS_AND_RESULT_TYPE: &str = "SameOperandsAndResultType";
}

pub struct OpInfo {
    pub dialect: &'static str,
    pub name: &'static str,
    /// `dialect.name`, the tag patterns dispatch on.
    pub full_name: &'static str,
    pub traits: &'static [&'static str],
    pub verify: fn(&OpData) -> Result<()>,
}

impl OpInfo {
    pub fn has_trait(&self, name: &str) -> bool {
        self.traits.iter().any(|t| *t == name)
    }

    pub fn is_pure(&self) -> bool {
        self.has_trait(traits::PURE)
    }

    pub fn is_terminator(&self) -> bool {
        self.has_trait(traits::TERMINATOR)
    }
}

impl PartialEq for OpInfo {
    fn eq(&self, other: &Self) -> bool {
        self.full_name == other.full_name
    }
}

impl fmt::Debug for OpInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.full_name)
    }
}

/// Implemented by `#[derive(Op)]` for every op definition.
pub trait OpDef: 'static {
    const NAME: &'static str;

    fn info() -> &'static OpInfo;

    fn matches(op: &OpData) -> bool {
        op.info.full_name == Self::NAME
    }
}

#[derive(Clone, Debug)]
pub struct OpData {
    pub info: &'static OpInfo,
    pub operands: SmallVec<[Val; 4]>,
    pub results: SmallVec<[Val; 1]>,
    pub attributes: AttributeMap,
    pub regions: SmallVec<[RegionId; 1]>,
    /// Block currently holding the op; `None` while detached.
    pub parent: Option<BlockId>,
}

impl OpData {
    pub fn name(&self) -> &'static str {
        self.info.full_name
    }

    pub fn is<T: OpDef>(&self) -> bool {
        T::matches(self)
    }

    pub fn attr(&self, key: &str) -> Option<&Attribute> {
        self.attributes.get(key)
    }

    pub fn int_attr(&self, key: &str) -> Option<i64> {
        self.attr(key).and_then(Attribute::as_integer)
    }

    pub fn str_attr(&self, key: &str) -> Option<&str> {
        self.attr(key).and_then(Attribute::as_str)
    }

    pub fn result(&self, index: usize) -> Option<Val> {
        self.results.get(index).copied()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueDef {
    BlockArgument { block: BlockId, index: usize },
    OpResult { op: Opr, index: usize },
}

#[derive(Clone, Debug)]
pub struct Value {
    pub ty: TypeId,
    pub def: ValueDef,
}

/// Everything needed to materialize a new op.
#[derive(Clone, Debug)]
pub struct OperationState {
    pub info: &'static OpInfo,
    pub operands: SmallVec<[Val; 4]>,
    pub result_types: SmallVec<[TypeId; 1]>,
    pub attributes: AttributeMap,
    pub num_regions: usize,
}

impl OperationState {
    pub fn new<T: OpDef>() -> Self {
        Self::from_info(T::info())
    }

    pub fn from_info(info: &'static OpInfo) -> Self {
        Self {
            info,
            operands: SmallVec::new(),
            result_types: SmallVec::new(),
            attributes: AttributeMap::new(),
            num_regions: 0,
        }
    }

    pub fn operand(mut self, val: Val) -> Self {
        self.operands.push(val);
        self
    }

    pub fn operands(mut self, vals: impl IntoIterator<Item = Val>) -> Self {
        self.operands.extend(vals);
        self
    }

    pub fn result(mut self, ty: TypeId) -> Self {
        self.result_types.push(ty);
        self
    }

    pub fn results(mut self, tys: impl IntoIterator<Item = TypeId>) -> Self {
        self.result_types.extend(tys);
        self
    }

    pub fn attr(mut self, key: &str, value: Attribute) -> Self {
        self.attributes.set(key, value);
        self
    }

    pub fn attrs(mut self, attrs: AttributeMap) -> Self {
        for (key, value) in attrs {
            self.attributes.set(&key, value);
        }
        self
    }

    pub fn regions(mut self, count: usize) -> Self {
        self.num_regions = count;
        self
    }
}

pub struct OpRegistry {
    ops: AHashMap<&'static str, &'static OpInfo>,
}

impl OpRegistry {
    pub fn new() -> Self {
        Self {
            ops: AHashMap::new(),
        }
    }

    pub fn register(&mut self, info: &'static OpInfo) {
        self.ops.insert(info.full_name, info);
    }

    pub fn get(&self, full_name: &str) -> Option<&'static OpInfo> {
        self.ops.get(full_name).copied()
    }

    pub fn contains(&self, full_name: &str) -> bool {
        self.ops.contains_key(full_name)
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Ops registered under a dialect, sorted by name.
    pub fn dialect_ops(&self, dialect: &str) -> Vec<&'static OpInfo> {
        let mut ops: Vec<_> = self
            .ops
            .values()
            .copied()
            .filter(|info| info.dialect == dialect)
            .collect();
        ops.sort_by_key(|info| info.full_name);
        ops
    }

    pub fn register_collected_ops(&mut self) {
        for info in inventory::iter::<&'static OpInfo> {
            self.register(*info);
        }
    }
}

impl Default for OpRegistry {
    fn default() -> Self {
        Self::new()
    }
}
