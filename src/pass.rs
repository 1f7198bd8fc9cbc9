use crate::context::Context;
use crate::conversion::TypeConverter;
use crate::dialects::builtin;
use crate::error::{Error, Result};
use crate::module::{FuncId, InsertPoint, Module};
use crate::ops::{OperationState, Opr, Val};
use crate::types::TypeId;
use crate::verification::verify_module;
use ahash::{AHashMap, AHashSet};
use smallvec::SmallVec;
use std::collections::{HashMap, VecDeque};

/// Upper bound on greedy sweeps before giving up on reaching a fixpoint.
pub const MAX_GREEDY_ITERATIONS: usize = 10;

// Pattern-based rewriting trait
pub trait RewritePattern: 'static {
    /// Op tag this pattern is rooted at; `None` means it is tried on any op.
    fn root(&self) -> Option<&'static str> {
        None
    }

    fn benefit(&self) -> usize {
        1
    }

    fn debug_name(&self) -> &'static str {
        self.root().unwrap_or("<any>")
    }

    /// Returns `Ok(false)` without touching the IR when the pattern does not
    /// apply.
    fn match_and_rewrite(&self, op: Opr, rewriter: &mut PatternRewriter) -> Result<bool>;
}

/// Patterns indexed by root tag, each bucket ordered by benefit.
#[derive(Default)]
pub struct PatternSet {
    patterns: Vec<Box<dyn RewritePattern>>,
    by_root: AHashMap<&'static str, Vec<usize>>,
    generic: Vec<usize>,
}

impl PatternSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, pattern: Box<dyn RewritePattern>) {
        let index = self.patterns.len();
        let bucket = match pattern.root() {
            Some(root) => self.by_root.entry(root).or_default(),
            None => &mut self.generic,
        };
        bucket.push(index);
        self.patterns.push(pattern);

        let patterns = &self.patterns;
        // Stable: equal benefits keep insertion order.
        bucket.sort_by_key(|&i| std::cmp::Reverse(patterns[i].benefit()));
    }

    pub fn with(mut self, pattern: impl RewritePattern) -> Self {
        self.add(Box::new(pattern));
        self
    }

    pub fn extend(&mut self, other: PatternSet) {
        for pattern in other.patterns {
            self.add(pattern);
        }
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Patterns to try on an op named `name`: rooted ones first, then generic.
    pub fn candidates(&self, name: &str) -> impl Iterator<Item = &dyn RewritePattern> + '_ {
        self.by_root
            .get(name)
            .into_iter()
            .flatten()
            .chain(self.generic.iter())
            .map(move |&i| self.patterns[i].as_ref())
    }
}

impl From<Vec<Box<dyn RewritePattern>>> for PatternSet {
    fn from(patterns: Vec<Box<dyn RewritePattern>>) -> Self {
        let mut set = PatternSet::new();
        for pattern in patterns {
            set.add(pattern);
        }
        set
    }
}

// Rewriter with operation tracking
pub struct PatternRewriter<'a> {
    pub ctx: &'a mut Context,
    pub module: &'a mut Module,
    worklist: VecDeque<Opr>,
    erased: AHashSet<Opr>,
    created: Vec<Opr>,
    insertion_point: Option<InsertPoint>,
    converter: Option<&'a dyn TypeConverter>,
}

impl<'a> PatternRewriter<'a> {
    pub fn new(ctx: &'a mut Context, module: &'a mut Module, ops: Vec<Opr>) -> Self {
        Self {
            ctx,
            module,
            worklist: ops.into(),
            erased: AHashSet::new(),
            created: Vec::new(),
            insertion_point: None,
            converter: None,
        }
    }

    /// Puts the rewriter in conversion mode: replacements may change value
    /// types, bridged by adapter casts.
    pub fn with_type_converter(mut self, converter: &'a dyn TypeConverter) -> Self {
        self.converter = Some(converter);
        self
    }

    // Get the next live operation from the worklist
    pub fn next_op(&mut self) -> Option<Opr> {
        while let Some(op) = self.worklist.pop_front() {
            if !self.erased.contains(&op) && self.module.operations.contains_key(op) {
                return Some(op);
            }
        }
        None
    }

    /// Ops created since the last call, in creation order.
    pub fn take_created(&mut self) -> Vec<Opr> {
        std::mem::take(&mut self.created)
    }

    pub fn push_back(&mut self, ops: impl IntoIterator<Item = Opr>) {
        self.worklist.extend(ops);
    }

    pub fn push_front(&mut self, ops: Vec<Opr>) {
        for op in ops.into_iter().rev() {
            self.worklist.push_front(op);
        }
    }

    pub fn erased_count(&self) -> usize {
        self.erased.len()
    }

    pub fn set_insertion_point(&mut self, at: InsertPoint) {
        self.insertion_point = Some(at);
    }

    pub fn set_insertion_point_before(&mut self, op: Opr) {
        self.insertion_point = Some(InsertPoint::Before(op));
    }

    pub fn insertion_point(&self) -> Option<InsertPoint> {
        self.insertion_point
    }

    /// Creates an op at the insertion point. Consecutive creations come out
    /// in program order.
    pub fn create(&mut self, state: OperationState) -> Result<Opr> {
        let at = self
            .insertion_point
            .ok_or_else(|| Error::InvalidOperation("rewriter has no insertion point".to_string()))?;
        let opr = self.module.insert_op(state, at)?;
        match at {
            InsertPoint::After(_) | InsertPoint::BlockStart(_) => {
                self.insertion_point = Some(InsertPoint::After(opr));
            }
            InsertPoint::Before(_) | InsertPoint::BlockEnd(_) => {}
        }
        self.created.push(opr);
        Ok(opr)
    }

    /// Creates an op and returns its single result.
    pub fn create_value(&mut self, state: OperationState) -> Result<Val> {
        let opr = self.create(state)?;
        self.result(opr, 0)
    }

    pub fn result(&self, op: Opr, index: usize) -> Result<Val> {
        self.module
            .op(op)
            .and_then(|o| o.result(index))
            .ok_or_else(|| Error::NotFound(format!("result #{} of {:?}", index, op)))
    }

    pub fn value_type(&self, val: Val) -> Result<TypeId> {
        self.module
            .value_type(val)
            .ok_or_else(|| Error::NotFound(format!("value {:?}", val)))
    }

    // Replace an operation's results with `new_values`, then erase it
    pub fn replace_op(&mut self, op: Opr, new_values: &[Val]) -> Result<()> {
        let results: SmallVec<[Val; 1]> = self
            .module
            .op(op)
            .ok_or_else(|| Error::NotFound(format!("operation {:?}", op)))?
            .results
            .clone();
        if results.len() != new_values.len() {
            return Err(Error::InvalidOperation(format!(
                "replacement provides {} values for {} results",
                new_values.len(),
                results.len()
            )));
        }

        for (&old, &new) in results.iter().zip(new_values) {
            let old_ty = self.value_type(old)?;
            let new_ty = self.value_type(new)?;
            if old_ty == new_ty {
                self.module.replace_all_uses(old, new)?;
            } else if self.converter.is_some() {
                let cast = self
                    .module
                    .insert_op(builtin::cast(new, old_ty), InsertPoint::Before(op))?;
                let bridged = self.result(cast, 0)?;
                self.module.replace_all_uses(old, bridged)?;
            } else {
                return Err(Error::TypeError(format!(
                    "cannot replace a value of type {} with one of type {}",
                    self.ctx.type_name(old_ty),
                    self.ctx.type_name(new_ty)
                )));
            }
        }

        self.erase_op(op)
    }

    // Erase an operation together with everything nested in it
    pub fn erase_op(&mut self, op: Opr) -> Result<()> {
        let nested: Vec<Opr> = match self.module.op(op) {
            Some(data) => data
                .regions
                .iter()
                .flat_map(|&r| self.module.walk_region(r))
                .collect(),
            None => return Err(Error::NotFound(format!("operation {:?}", op))),
        };
        self.module.erase_op(op)?;
        log::trace!("erased {:?} and {} nested op(s)", op, nested.len());
        self.erased.insert(op);
        self.erased.extend(nested);
        Ok(())
    }

    // Replace all uses of a value with another value
    pub fn replace_all_uses(&mut self, from: Val, to: Val) -> Result<()> {
        self.module.replace_all_uses(from, to)
    }

    /// The converted counterpart of `val`: looks through an adapter cast.
    pub fn remapped(&self, val: Val) -> Val {
        self.module
            .defining_op(val)
            .and_then(|d| self.module.op(d))
            .filter(|d| builtin::is_cast(d))
            .and_then(|d| d.operands.first().copied())
            .unwrap_or(val)
    }

    pub fn remapped_operands(&self, op: Opr) -> Result<SmallVec<[Val; 4]>> {
        let data = self
            .module
            .op(op)
            .ok_or_else(|| Error::NotFound(format!("operation {:?}", op)))?;
        Ok(data.operands.iter().map(|&v| self.remapped(v)).collect())
    }

    pub fn convert_type(&mut self, ty: TypeId) -> Option<TypeId> {
        let converter = self.converter?;
        converter.convert_type(self.ctx, ty)
    }

    /// Whether `ty` is already in its converted form (always true outside
    /// conversion mode).
    pub fn is_legal_type(&mut self, ty: TypeId) -> bool {
        match self.converter {
            Some(converter) => converter.is_legal(self.ctx, ty),
            None => true,
        }
    }
}

// Greedy pattern driver over one function, iterated to a fixpoint
pub fn apply_patterns_greedy(
    ctx: &mut Context,
    module: &mut Module,
    func: FuncId,
    patterns: &PatternSet,
) -> Result<bool> {
    let mut changed = false;

    for iteration in 0..MAX_GREEDY_ITERATIONS {
        let ops = module.walk_function(func);
        let mut local_changed = false;
        let mut rewriter = PatternRewriter::new(ctx, module, ops);

        while let Some(op) = rewriter.next_op() {
            let Some(name) = rewriter.module.op(op).map(|o| o.name()) else {
                continue;
            };
            for pattern in patterns.candidates(name) {
                if pattern.match_and_rewrite(op, &mut rewriter)? {
                    log::trace!("pattern {} rewrote '{}'", pattern.debug_name(), name);
                    local_changed = true;
                    let created = rewriter.take_created();
                    rewriter.push_back(created);
                    break;
                }
            }
        }

        if !local_changed {
            return Ok(changed);
        }
        log::trace!("greedy sweep {} changed the IR", iteration);
        changed = true;
    }

    Err(Error::InvalidOperation(format!(
        "greedy rewrite of function '{}' did not converge after {} sweeps",
        module.function_name(func),
        MAX_GREEDY_ITERATIONS
    )))
}

pub trait Pass {
    fn name(&self) -> &str;
    fn run(&mut self, ctx: &mut Context, module: &mut Module) -> Result<PassResult>;

    /// Whether the module must verify once this pass has run.
    fn verify_after(&self) -> bool {
        true
    }
}

#[derive(Debug, Default)]
pub struct PassResult {
    pub changed: bool,
    pub statistics: HashMap<String, u64>,
}

impl PassResult {
    pub fn new() -> Self {
        Self {
            changed: false,
            statistics: HashMap::new(),
        }
    }

    pub fn with_change(mut self) -> Self {
        self.changed = true;
        self
    }

    pub fn add_statistic(&mut self, name: &str, value: u64) {
        self.statistics.insert(name.to_string(), value);
    }

    pub fn statistic(&self, name: &str) -> u64 {
        self.statistics.get(name).copied().unwrap_or(0)
    }
}

/// Runs an explicit, caller-built list of passes in order, stopping at the
/// first failure.
pub struct PassManager {
    passes: Vec<Box<dyn Pass>>,
    verify_passes: bool,
}

impl PassManager {
    pub fn new() -> Self {
        Self {
            passes: Vec::new(),
            verify_passes: true,
        }
    }

    /// Whether the module is verified after every pass (on by default).
    pub fn enable_verifier(mut self, enabled: bool) -> Self {
        self.verify_passes = enabled;
        self
    }

    pub fn add_pass(&mut self, pass: Box<dyn Pass>) {
        self.passes.push(pass);
    }

    pub fn pass_names(&self) -> Vec<&str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    pub fn run(&mut self, ctx: &mut Context, module: &mut Module) -> Result<()> {
        for pass in &mut self.passes {
            let name = pass.name().to_string();
            log::debug!("running pass: {}", name);

            let result = pass.run(ctx, module).map_err(|err| Error::PassFailed {
                pass: name.clone(),
                source: Box::new(err),
            })?;

            if result.changed {
                log::debug!("  pass {} made changes", name);
            }
            for (stat_name, value) in &result.statistics {
                log::debug!("  {}: {}", stat_name, value);
            }

            if self.verify_passes && pass.verify_after() {
                verify_module(ctx, module).map_err(|err| Error::PassFailed {
                    pass: name.clone(),
                    source: Box::new(err),
                })?;
            }
        }

        Ok(())
    }
}

impl Default for PassManager {
    fn default() -> Self {
        Self::new()
    }
}
