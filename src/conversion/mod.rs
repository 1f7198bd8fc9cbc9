//! Dialect conversion: legalize every op of a function against a
//! [`ConversionTarget`], rewriting types through a [`TypeConverter`].
//!
//! [`apply_full_conversion`] is all-or-nothing per function. Adapter casts
//! (`builtin.unrealized_conversion_cast`) bridge converted and unconverted
//! values while the conversion is in flight and must all be gone at the end.

pub mod gpu_to_nvvm;
pub mod llvm;
pub mod std_to_llvm;

use crate::context::Context;
use crate::dialects::builtin;
use crate::error::{Error, Result};
use crate::module::{FuncId, InsertPoint, Module};
use crate::ops::{OpDef, Opr};
use crate::pass::{PatternRewriter, PatternSet};
use crate::types::TypeId;
use ahash::{AHashMap, AHashSet};

pub use self::llvm::LlvmTypeConverter;

pub trait TypeConverter {
    /// Target type for `ty`, or `None` if `ty` cannot be converted.
    fn convert_type(&self, ctx: &mut Context, ty: TypeId) -> Option<TypeId>;

    /// A type is legal when it converts to itself.
    fn is_legal(&self, ctx: &mut Context, ty: TypeId) -> bool {
        self.convert_type(ctx, ty) == Some(ty)
    }

    fn is_signature_legal(&self, ctx: &mut Context, inputs: &[TypeId], outputs: &[TypeId]) -> bool {
        inputs
            .iter()
            .chain(outputs)
            .all(|&ty| self.is_legal(ctx, ty))
    }
}

pub type DynamicOpLegality = Box<dyn Fn(&mut Context, &Module, Opr) -> bool>;
pub type DynamicFunctionLegality = Box<dyn Fn(&mut Context, &Module, FuncId) -> bool>;

/// Decides which ops (and functions) a conversion may leave in place.
///
/// Lookup order for an op: explicitly illegal, dynamic predicate, explicitly
/// legal, legal dialect. Anything else is illegal.
#[derive(Default)]
pub struct ConversionTarget {
    legal_dialects: AHashSet<String>,
    legal_ops: AHashSet<&'static str>,
    illegal_ops: AHashSet<&'static str>,
    dynamic_ops: AHashMap<&'static str, DynamicOpLegality>,
    function_legality: Option<DynamicFunctionLegality>,
}

impl ConversionTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_legal_dialect(&mut self, dialect: &str) {
        self.legal_dialects.insert(dialect.to_string());
    }

    pub fn add_legal_op<T: OpDef>(&mut self) {
        self.legal_ops.insert(T::NAME);
    }

    pub fn add_illegal_op<T: OpDef>(&mut self) {
        self.illegal_ops.insert(T::NAME);
    }

    pub fn add_dynamically_legal_op<T: OpDef>(
        &mut self,
        predicate: impl Fn(&mut Context, &Module, Opr) -> bool + 'static,
    ) {
        self.dynamic_ops.insert(T::NAME, Box::new(predicate));
    }

    /// Functions are legal only once `predicate` accepts them.
    pub fn set_dynamic_function_legality(
        &mut self,
        predicate: impl Fn(&mut Context, &Module, FuncId) -> bool + 'static,
    ) {
        self.function_legality = Some(Box::new(predicate));
    }

    pub fn is_legal(&self, ctx: &mut Context, module: &Module, op: Opr) -> bool {
        let Some(data) = module.op(op) else {
            return false;
        };
        let name = data.name();
        if self.illegal_ops.contains(name) {
            return false;
        }
        if let Some(predicate) = self.dynamic_ops.get(name) {
            return predicate(ctx, module, op);
        }
        self.legal_ops.contains(name) || self.legal_dialects.contains(data.info.dialect)
    }

    pub fn is_function_legal(&self, ctx: &mut Context, module: &Module, func: FuncId) -> bool {
        match &self.function_legality {
            Some(predicate) => predicate(ctx, module, func),
            None => true,
        }
    }
}

/// Converts `func` so that its signature and every op in it are legal.
///
/// On failure the module is restored to its state before the call and the
/// error names the offending type or op.
pub fn apply_full_conversion(
    ctx: &mut Context,
    module: &mut Module,
    func: FuncId,
    target: &ConversionTarget,
    patterns: &PatternSet,
    converter: &dyn TypeConverter,
) -> Result<()> {
    let snapshot = module.clone();
    match convert_function(ctx, module, func, target, patterns, converter) {
        Ok(()) => Ok(()),
        Err(err) => {
            *module = snapshot;
            Err(err)
        }
    }
}

fn convert_function(
    ctx: &mut Context,
    module: &mut Module,
    func: FuncId,
    target: &ConversionTarget,
    patterns: &PatternSet,
    converter: &dyn TypeConverter,
) -> Result<()> {
    let function = module
        .function(func)
        .ok_or_else(|| Error::NotFound(format!("function {:?}", func)))?;
    let name = function.name.clone();
    let inputs = function.inputs.clone();
    let outputs = function.outputs.clone();

    let convert_all = |ctx: &mut Context, types: &[TypeId]| -> Result<Vec<TypeId>> {
        types
            .iter()
            .map(|&ty| {
                converter
                    .convert_type(ctx, ty)
                    .ok_or_else(|| Error::SignatureConversion {
                        function: name.clone(),
                        ty: ctx.type_name(ty),
                    })
            })
            .collect()
    };
    let new_inputs = convert_all(ctx, &inputs)?;
    let new_outputs = convert_all(ctx, &outputs)?;

    convert_entry_arguments(module, func, &new_inputs)?;
    if let Some(f) = module.function_mut(func) {
        f.inputs = new_inputs;
        f.outputs = new_outputs;
    }

    let ops = module.walk_function(func);
    let mut rewriter = PatternRewriter::new(ctx, module, ops).with_type_converter(converter);
    // Roots a pattern rewrote in place; a second visit that finds them still
    // illegal is a failure rather than another attempt.
    let mut updated_in_place: AHashSet<Opr> = AHashSet::new();
    while let Some(op) = rewriter.next_op() {
        let Some(data) = rewriter.module.op(op) else {
            continue;
        };
        if builtin::is_cast(data) {
            continue;
        }
        let op_name = data.name();
        if target.is_legal(rewriter.ctx, rewriter.module, op) {
            continue;
        }
        if updated_in_place.contains(&op) {
            return Err(Error::NoLegalizationPattern {
                op: op_name.to_string(),
                function: name,
            });
        }

        let mut legalized = false;
        for pattern in patterns.candidates(op_name) {
            if pattern.match_and_rewrite(op, &mut rewriter)? {
                log::trace!("legalized '{}' with {}", op_name, pattern.debug_name());
                legalized = true;
                // Re-check what the pattern produced, and the root if it
                // survived, before moving on.
                let mut revisit = rewriter.take_created();
                if rewriter.module.op(op).is_some() {
                    updated_in_place.insert(op);
                    revisit.push(op);
                }
                rewriter.push_front(revisit);
                break;
            }
        }
        if !legalized {
            return Err(Error::NoLegalizationPattern {
                op: op_name.to_string(),
                function: name,
            });
        }
    }
    drop(rewriter);

    remove_dead_casts(module, func);
    if let Some(op) = first_illegal_op(ctx, module, func, target) {
        return Err(Error::NoLegalizationPattern {
            op: op.to_string(),
            function: name,
        });
    }
    if let Some(user) = first_live_cast_user(module, func) {
        return Err(Error::TypeError(format!(
            "function '{}': '{}' still consumes a value of unconverted type",
            name, user
        )));
    }

    if !target.is_function_legal(ctx, module, func) {
        return Err(Error::InvalidOperation(format!(
            "function '{}' is still illegal after conversion",
            name
        )));
    }
    Ok(())
}

/// Retypes the entry block arguments. Old-typed uses go through a cast.
fn convert_entry_arguments(module: &mut Module, func: FuncId, new_types: &[TypeId]) -> Result<()> {
    let entry = module
        .entry_block(func)
        .ok_or_else(|| Error::NotFound(format!("entry block of {:?}", func)))?;
    let args = module.block_args(entry);
    if args.len() != new_types.len() {
        return Err(Error::VerificationError(format!(
            "function '{}' has {} entry arguments but {} inputs",
            module.function_name(func),
            args.len(),
            new_types.len()
        )));
    }

    let mut cursor = InsertPoint::BlockStart(entry);
    for (&arg, &new_ty) in args.iter().zip(new_types) {
        let old_ty = module
            .value_type(arg)
            .ok_or_else(|| Error::NotFound(format!("value {:?}", arg)))?;
        if old_ty == new_ty {
            continue;
        }
        if module.has_uses(arg) {
            let cast = module.insert_op(builtin::cast(arg, old_ty), cursor)?;
            cursor = InsertPoint::After(cast);
            let bridged = module
                .op(cast)
                .and_then(|c| c.result(0))
                .ok_or_else(|| Error::NotFound("cast result".to_string()))?;
            module.replace_all_uses_except(arg, bridged, cast)?;
        }
        module.set_value_type(arg, new_ty)?;
    }
    Ok(())
}

/// Any non-cast op the target still rejects once the walk is over.
fn first_illegal_op(
    ctx: &mut Context,
    module: &Module,
    func: FuncId,
    target: &ConversionTarget,
) -> Option<&'static str> {
    module.walk_function(func).into_iter().find_map(|op| {
        let data = module.op(op)?;
        if builtin::is_cast(data) || target.is_legal(ctx, module, op) {
            return None;
        }
        Some(data.name())
    })
}

fn remove_dead_casts(module: &mut Module, func: FuncId) {
    loop {
        let used = module.used_values();
        let dead: Vec<Opr> = module
            .walk_function(func)
            .into_iter()
            .filter(|&op| {
                module.op(op).is_some_and(|data| {
                    builtin::is_cast(data) && data.results.iter().all(|r| !used.contains(r))
                })
            })
            .collect();
        if dead.is_empty() {
            return;
        }
        for op in dead {
            // Dead by construction, so erasing cannot fail.
            let _ = module.erase_op(op);
        }
    }
}

fn first_live_cast_user(module: &Module, func: FuncId) -> Option<&'static str> {
    module.walk_function(func).into_iter().find_map(|op| {
        let data = module.op(op)?;
        if !builtin::is_cast(data) {
            return None;
        }
        let result = data.result(0)?;
        let (user, _) = module.uses(result).into_iter().next()?;
        module.op(user).map(|u| u.name())
    })
}
