//! Arena that owns every IR entity of a compilation unit.
//!
//! Functions, regions, blocks, operations and values all live in slotmaps owned
//! by [`Module`]; everything else refers to them through copyable handles.

use crate::attribute::{Attribute, AttributeMap, AttributeMapExt};
use crate::error::{Error, Result};
use crate::ops::{OpData, OperationState, Opr, Val, Value, ValueDef};
use crate::region::{Block, BlockId, Region, RegionId, RegionParent};
use crate::types::TypeId;
use ahash::AHashSet;
use slotmap::{new_key_type, SlotMap};
use smallvec::SmallVec;

new_key_type! {
    pub struct FuncId;
}

/// Unit attribute marking a function that runs on the device.
pub const KERNEL_ATTR: &str = "gpu.kernel";

#[derive(Clone, Debug)]
pub struct Function {
    pub name: String,
    pub inputs: Vec<TypeId>,
    pub outputs: Vec<TypeId>,
    pub body: RegionId,
    pub attributes: AttributeMap,
}

impl Function {
    pub fn is_kernel(&self) -> bool {
        self.attributes.contains(KERNEL_ATTR)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InsertPoint {
    Before(Opr),
    After(Opr),
    BlockStart(BlockId),
    BlockEnd(BlockId),
}

#[derive(Clone, Default)]
pub struct Module {
    pub functions: SlotMap<FuncId, Function>,
    pub func_order: Vec<FuncId>,
    pub regions: SlotMap<RegionId, Region>,
    pub blocks: SlotMap<BlockId, Block>,
    pub operations: SlotMap<Opr, OpData>,
    pub values: SlotMap<Val, Value>,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- navigation ----

    pub fn function_ids(&self) -> Vec<FuncId> {
        self.func_order.clone()
    }

    pub fn function(&self, id: FuncId) -> Option<&Function> {
        self.functions.get(id)
    }

    pub fn function_mut(&mut self, id: FuncId) -> Option<&mut Function> {
        self.functions.get_mut(id)
    }

    pub fn lookup_function(&self, name: &str) -> Option<FuncId> {
        self.func_order
            .iter()
            .copied()
            .find(|&id| self.functions.get(id).is_some_and(|f| f.name == name))
    }

    pub fn function_name(&self, id: FuncId) -> &str {
        self.functions.get(id).map_or("<unknown>", |f| f.name.as_str())
    }

    pub fn region(&self, id: RegionId) -> Option<&Region> {
        self.regions.get(id)
    }

    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(id)
    }

    pub fn block_mut(&mut self, id: BlockId) -> Option<&mut Block> {
        self.blocks.get_mut(id)
    }

    pub fn op(&self, id: Opr) -> Option<&OpData> {
        self.operations.get(id)
    }

    pub fn op_mut(&mut self, id: Opr) -> Option<&mut OpData> {
        self.operations.get_mut(id)
    }

    pub fn value(&self, val: Val) -> Option<&Value> {
        self.values.get(val)
    }

    pub fn value_type(&self, val: Val) -> Option<TypeId> {
        self.values.get(val).map(|v| v.ty)
    }

    pub fn defining_op(&self, val: Val) -> Option<Opr> {
        match self.values.get(val)?.def {
            ValueDef::OpResult { op, .. } => Some(op),
            ValueDef::BlockArgument { .. } => None,
        }
    }

    /// Block in which `val` becomes available.
    pub fn defining_block(&self, val: Val) -> Option<BlockId> {
        match self.values.get(val)?.def {
            ValueDef::BlockArgument { block, .. } => Some(block),
            ValueDef::OpResult { op, .. } => self.operations.get(op)?.parent,
        }
    }

    pub fn entry_block(&self, func: FuncId) -> Option<BlockId> {
        let body = self.functions.get(func)?.body;
        self.regions.get(body)?.entry_block()
    }

    pub fn region_entry_block(&self, region: RegionId) -> Option<BlockId> {
        self.regions.get(region)?.entry_block()
    }

    pub fn block_ops(&self, block: BlockId) -> Vec<Opr> {
        self.blocks
            .get(block)
            .map(|b| b.ops.clone())
            .unwrap_or_default()
    }

    pub fn block_args(&self, block: BlockId) -> Vec<Val> {
        self.blocks
            .get(block)
            .map(|b| b.args.to_vec())
            .unwrap_or_default()
    }

    /// Op whose region (transitively through the block) holds `op`.
    pub fn parent_op(&self, op: Opr) -> Option<Opr> {
        let block = self.operations.get(op)?.parent?;
        self.block_parent_op(block)
    }

    pub fn block_parent_op(&self, block: BlockId) -> Option<Opr> {
        let region = self.blocks.get(block)?.parent;
        match self.regions.get(region)?.parent {
            RegionParent::Op(parent) => Some(parent),
            RegionParent::Function(_) => None,
        }
    }

    pub fn block_function(&self, block: BlockId) -> Option<FuncId> {
        let mut block = block;
        loop {
            let region = self.blocks.get(block)?.parent;
            match self.regions.get(region)?.parent {
                RegionParent::Function(func) => return Some(func),
                RegionParent::Op(op) => block = self.operations.get(op)?.parent?,
            }
        }
    }

    pub fn parent_function(&self, op: Opr) -> Option<FuncId> {
        let block = self.operations.get(op)?.parent?;
        self.block_function(block)
    }

    /// The op enclosing `op` (or `op` itself) that sits directly in `block`.
    pub fn ancestor_in_block(&self, op: Opr, block: BlockId) -> Option<Opr> {
        let mut current = op;
        loop {
            let parent = self.operations.get(current)?.parent?;
            if parent == block {
                return Some(current);
            }
            current = self.block_parent_op(parent)?;
        }
    }

    /// Whether `block` is `ancestor` or nested somewhere below it.
    pub fn block_is_within(&self, block: BlockId, ancestor: BlockId) -> bool {
        let mut current = block;
        loop {
            if current == ancestor {
                return true;
            }
            match self
                .block_parent_op(current)
                .and_then(|op| self.operations.get(op)?.parent)
            {
                Some(next) => current = next,
                None => return false,
            }
        }
    }

    /// Whether `op` lives somewhere inside `region`.
    pub fn is_op_within_region(&self, op: Opr, region: RegionId) -> bool {
        let mut current = op;
        loop {
            let Some(block) = self.operations.get(current).and_then(|o| o.parent) else {
                return false;
            };
            let Some(block_data) = self.blocks.get(block) else {
                return false;
            };
            if block_data.parent == region {
                return true;
            }
            match self.block_parent_op(block) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    pub fn is_value_defined_within_region(&self, val: Val, region: RegionId) -> bool {
        match self.values.get(val).map(|v| v.def) {
            Some(ValueDef::OpResult { op, .. }) => self.is_op_within_region(op, region),
            Some(ValueDef::BlockArgument { block, .. }) => {
                let Some(block_data) = self.blocks.get(block) else {
                    return false;
                };
                if block_data.parent == region {
                    return true;
                }
                self.block_parent_op(block)
                    .is_some_and(|op| self.is_op_within_region(op, region))
            }
            None => false,
        }
    }

    /// Every (user, operand index) pair that reads `val`.
    pub fn uses(&self, val: Val) -> Vec<(Opr, usize)> {
        let mut uses = Vec::new();
        for (opr, op) in self.operations.iter() {
            for (index, &operand) in op.operands.iter().enumerate() {
                if operand == val {
                    uses.push((opr, index));
                }
            }
        }
        uses
    }

    pub fn has_uses(&self, val: Val) -> bool {
        self.operations
            .values()
            .any(|op| op.operands.contains(&val))
    }

    /// Every value read by some op, collected in one pass over the arena.
    pub fn used_values(&self) -> AHashSet<Val> {
        self.operations
            .values()
            .flat_map(|op| op.operands.iter().copied())
            .collect()
    }

    /// The first of `vals` that some op reads.
    fn first_used(&self, vals: &[Val]) -> Option<Val> {
        self.operations
            .values()
            .flat_map(|op| op.operands.iter())
            .find(|operand| vals.contains(operand))
            .copied()
    }

    // ---- walks ----

    /// Pre-order snapshot of the ops in `region`: an op precedes the ops in
    /// its nested regions.
    pub fn walk_region(&self, region: RegionId) -> Vec<Opr> {
        let mut out = Vec::new();
        self.collect_region(region, &mut out);
        out
    }

    fn collect_region(&self, region: RegionId, out: &mut Vec<Opr>) {
        let Some(region) = self.regions.get(region) else {
            return;
        };
        for &block in &region.blocks {
            let Some(block) = self.blocks.get(block) else {
                continue;
            };
            for &opr in &block.ops {
                out.push(opr);
                if let Some(op) = self.operations.get(opr) {
                    for &nested in &op.regions {
                        self.collect_region(nested, out);
                    }
                }
            }
        }
    }

    pub fn walk_function(&self, func: FuncId) -> Vec<Opr> {
        match self.functions.get(func) {
            Some(f) => self.walk_region(f.body),
            None => Vec::new(),
        }
    }

    pub fn walk(&self) -> Vec<Opr> {
        self.func_order
            .iter()
            .flat_map(|&f| self.walk_function(f))
            .collect()
    }

    // ---- construction ----

    /// Appends a function whose entry block has one argument per input.
    pub fn add_function(&mut self, name: &str, inputs: Vec<TypeId>, outputs: Vec<TypeId>) -> FuncId {
        // The body is patched in once the region exists.
        let func = self.functions.insert(Function {
            name: name.to_string(),
            inputs: inputs.clone(),
            outputs,
            body: RegionId::default(),
            attributes: AttributeMap::new(),
        });
        let body = self.regions.insert(Region::new(RegionParent::Function(func)));
        if let Some(f) = self.functions.get_mut(func) {
            f.body = body;
        }
        self.add_block(body, &inputs);
        self.func_order.push(func);
        func
    }

    /// Moves `func` so that it directly follows `anchor` in the function list.
    pub fn move_function_after(&mut self, func: FuncId, anchor: FuncId) -> Result<()> {
        if !self.functions.contains_key(func) || !self.functions.contains_key(anchor) {
            return Err(Error::NotFound("function".to_string()));
        }
        self.func_order.retain(|&f| f != func);
        let pos = self
            .func_order
            .iter()
            .position(|&f| f == anchor)
            .ok_or_else(|| Error::NotFound("anchor function".to_string()))?;
        self.func_order.insert(pos + 1, func);
        Ok(())
    }

    pub fn set_function_attr(&mut self, func: FuncId, key: &str, value: Attribute) -> Result<()> {
        let f = self
            .functions
            .get_mut(func)
            .ok_or_else(|| Error::NotFound("function".to_string()))?;
        f.attributes.set(key, value);
        Ok(())
    }

    /// `base` if free, otherwise `base_1`, `base_2`, ...
    pub fn unique_function_name(&self, base: &str) -> String {
        if self.lookup_function(base).is_none() {
            return base.to_string();
        }
        (1..)
            .map(|n| format!("{}_{}", base, n))
            .find(|candidate| self.lookup_function(candidate).is_none())
            .unwrap_or_else(|| base.to_string())
    }

    pub fn add_block(&mut self, region: RegionId, arg_types: &[TypeId]) -> BlockId {
        let block = self.blocks.insert(Block::new(region));
        for &ty in arg_types {
            self.add_block_argument(block, ty);
        }
        if let Some(r) = self.regions.get_mut(region) {
            r.blocks.push(block);
        }
        block
    }

    pub fn add_block_argument(&mut self, block: BlockId, ty: TypeId) -> Val {
        let index = self.blocks.get(block).map_or(0, |b| b.args.len());
        let val = self.values.insert(Value {
            ty,
            def: ValueDef::BlockArgument { block, index },
        });
        if let Some(b) = self.blocks.get_mut(block) {
            b.args.push(val);
        }
        val
    }

    pub fn set_value_type(&mut self, val: Val, ty: TypeId) -> Result<()> {
        let value = self
            .values
            .get_mut(val)
            .ok_or_else(|| Error::NotFound(format!("value {:?}", val)))?;
        value.ty = ty;
        Ok(())
    }

    /// Creates a detached op. Its regions are created empty.
    pub fn create_op(&mut self, state: OperationState) -> Opr {
        let OperationState {
            info,
            operands,
            result_types,
            attributes,
            num_regions,
        } = state;

        let opr = self.operations.insert(OpData {
            info,
            operands,
            results: SmallVec::new(),
            attributes,
            regions: SmallVec::new(),
            parent: None,
        });

        let results: SmallVec<[Val; 1]> = result_types
            .iter()
            .enumerate()
            .map(|(index, &ty)| {
                self.values.insert(Value {
                    ty,
                    def: ValueDef::OpResult { op: opr, index },
                })
            })
            .collect();
        let regions: SmallVec<[RegionId; 1]> = (0..num_regions)
            .map(|_| self.regions.insert(Region::new(RegionParent::Op(opr))))
            .collect();

        if let Some(op) = self.operations.get_mut(opr) {
            op.results = results;
            op.regions = regions;
        }
        opr
    }

    pub fn insert_op(&mut self, state: OperationState, at: InsertPoint) -> Result<Opr> {
        let opr = self.create_op(state);
        self.place_op(opr, at)?;
        Ok(opr)
    }

    /// Puts a detached op at `at`.
    pub fn place_op(&mut self, opr: Opr, at: InsertPoint) -> Result<()> {
        match self.operations.get(opr) {
            Some(op) if op.parent.is_some() => {
                return Err(Error::InvalidOperation(format!(
                    "'{}' is already placed in a block",
                    op.name()
                )))
            }
            Some(_) => {}
            None => return Err(Error::NotFound(format!("operation {:?}", opr))),
        }

        let (block, index) = match at {
            InsertPoint::BlockStart(block) => (block, 0),
            InsertPoint::BlockEnd(block) => {
                let len = self
                    .blocks
                    .get(block)
                    .ok_or_else(|| Error::NotFound(format!("block {:?}", block)))?
                    .ops
                    .len();
                (block, len)
            }
            InsertPoint::Before(anchor) | InsertPoint::After(anchor) => {
                let block = self
                    .operations
                    .get(anchor)
                    .and_then(|a| a.parent)
                    .ok_or_else(|| Error::NotFound(format!("anchor {:?} is not placed", anchor)))?;
                let pos = self
                    .blocks
                    .get(block)
                    .and_then(|b| b.position(anchor))
                    .ok_or_else(|| Error::NotFound(format!("anchor {:?}", anchor)))?;
                let index = if matches!(at, InsertPoint::After(_)) { pos + 1 } else { pos };
                (block, index)
            }
        };

        let block_data = self
            .blocks
            .get_mut(block)
            .ok_or_else(|| Error::NotFound(format!("block {:?}", block)))?;
        block_data.ops.insert(index, opr);
        if let Some(op) = self.operations.get_mut(opr) {
            op.parent = Some(block);
        }
        Ok(())
    }

    /// Unlinks an op from its block without destroying it.
    pub fn detach_op(&mut self, opr: Opr) -> Result<()> {
        let op = self
            .operations
            .get_mut(opr)
            .ok_or_else(|| Error::NotFound(format!("operation {:?}", opr)))?;
        if let Some(block) = op.parent.take() {
            if let Some(b) = self.blocks.get_mut(block) {
                b.ops.retain(|&o| o != opr);
            }
        }
        Ok(())
    }

    pub fn move_op(&mut self, opr: Opr, at: InsertPoint) -> Result<()> {
        self.detach_op(opr)?;
        self.place_op(opr, at)
    }

    /// Erases an op and everything nested in it. Fails if any result is
    /// still used.
    pub fn erase_op(&mut self, opr: Opr) -> Result<()> {
        let op = self
            .operations
            .get(opr)
            .ok_or_else(|| Error::NotFound(format!("operation {:?}", opr)))?;
        if let Some(used) = self.first_used(&op.results) {
            return Err(Error::InvalidOperation(format!(
                "cannot erase '{}': result {:?} still has uses",
                op.name(),
                used
            )));
        }
        self.detach_op(opr)?;
        self.destroy_op(opr);
        Ok(())
    }

    fn destroy_op(&mut self, opr: Opr) {
        let Some(op) = self.operations.remove(opr) else {
            return;
        };
        for result in op.results {
            self.values.remove(result);
        }
        for region in op.regions {
            self.destroy_region(region);
        }
    }

    fn destroy_region(&mut self, region: RegionId) {
        let Some(region) = self.regions.remove(region) else {
            return;
        };
        for block in region.blocks {
            let Some(block) = self.blocks.remove(block) else {
                continue;
            };
            for opr in block.ops.into_iter().rev() {
                self.destroy_op(opr);
            }
            for arg in block.args {
                self.values.remove(arg);
            }
        }
    }

    /// Moves every op of `from` (in order) to the end of `to`.
    pub fn splice_block(&mut self, from: BlockId, to: BlockId) -> Result<()> {
        for opr in self.block_ops(from) {
            self.move_op(opr, InsertPoint::BlockEnd(to))?;
        }
        Ok(())
    }

    // ---- use rewiring ----

    pub fn replace_all_uses(&mut self, from: Val, to: Val) -> Result<()> {
        self.replace_uses_where(from, to, |_, _| true)
    }

    /// Rewires only users nested inside `region`.
    pub fn replace_uses_in_region(&mut self, from: Val, to: Val, region: RegionId) -> Result<()> {
        let users: Vec<Opr> = self
            .uses(from)
            .into_iter()
            .map(|(user, _)| user)
            .filter(|&user| self.is_op_within_region(user, region))
            .collect();
        self.replace_uses_where(from, to, |_, user| users.contains(&user))
    }

    pub fn replace_all_uses_except(&mut self, from: Val, to: Val, except: Opr) -> Result<()> {
        self.replace_uses_where(from, to, |_, user| user != except)
    }

    fn replace_uses_where(
        &mut self,
        from: Val,
        to: Val,
        keep: impl Fn(&OpData, Opr) -> bool,
    ) -> Result<()> {
        let from_ty = self
            .value_type(from)
            .ok_or_else(|| Error::NotFound(format!("value {:?}", from)))?;
        let to_ty = self
            .value_type(to)
            .ok_or_else(|| Error::NotFound(format!("value {:?}", to)))?;
        if from_ty != to_ty {
            return Err(Error::TypeError(format!(
                "cannot replace {:?} with {:?}: types differ",
                from, to
            )));
        }
        for (opr, op) in self.operations.iter_mut() {
            if !keep(op, opr) {
                continue;
            }
            for operand in op.operands.iter_mut() {
                if *operand == from {
                    *operand = to;
                }
            }
        }
        Ok(())
    }
}
