//! Block-local common-subexpression elimination over pure ops.

use crate::attribute::Attribute;
use crate::context::Context;
use crate::error::Result;
use crate::module::Module;
use crate::ops::Val;
use crate::pass::{Pass, PassResult};
use crate::region::{BlockId, RegionId};
use crate::types::TypeId;
use ahash::AHashMap;
use smallvec::SmallVec;

/// Everything that makes two pure ops interchangeable.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct OpKey {
    name: &'static str,
    operands: SmallVec<[Val; 4]>,
    attributes: Vec<(String, Attribute)>,
    result_types: SmallVec<[TypeId; 1]>,
}

pub struct CsePass;

impl CsePass {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CsePass {
    fn default() -> Self {
        Self::new()
    }
}

impl Pass for CsePass {
    fn name(&self) -> &str {
        "cse"
    }

    fn run(&mut self, _ctx: &mut Context, module: &mut Module) -> Result<PassResult> {
        let mut result = PassResult::new();
        let mut eliminated = 0;

        for func in module.function_ids() {
            let Some(body) = module.function(func).map(|f| f.body) else {
                continue;
            };
            eliminated += cse_region(module, body)?;
        }

        if eliminated > 0 {
            result.changed = true;
        }
        result.add_statistic("ops_eliminated", eliminated);
        Ok(result)
    }
}

fn cse_region(module: &mut Module, region: RegionId) -> Result<u64> {
    let blocks = module.region(region).map(|r| r.blocks.clone()).unwrap_or_default();
    let mut eliminated = 0;
    for block in blocks {
        eliminated += cse_block(module, block)?;
    }
    Ok(eliminated)
}

fn cse_block(module: &mut Module, block: BlockId) -> Result<u64> {
    let mut known: AHashMap<OpKey, SmallVec<[Val; 1]>> = AHashMap::new();
    let mut eliminated = 0;

    for op in module.block_ops(block) {
        let Some(data) = module.op(op) else {
            continue;
        };
        // Nested regions get their own scope
        let nested = data.regions.clone();
        let info = data.info;
        let results = data.results.clone();
        let key = OpKey {
            name: data.name(),
            operands: data.operands.clone(),
            attributes: {
                let mut attrs = data.attributes.to_vec();
                attrs.sort_by(|a, b| a.0.cmp(&b.0));
                attrs
            },
            result_types: results
                .iter()
                .filter_map(|&r| module.value_type(r))
                .collect(),
        };

        for region in nested.iter().copied() {
            eliminated += cse_region(module, region)?;
        }

        // Only pure, region-free ops enter the table, so side effects in
        // between never make an entry stale.
        if !info.is_pure() || !nested.is_empty() || results.is_empty() {
            continue;
        }

        match known.get(&key) {
            Some(existing) => {
                for (&old, &new) in results.iter().zip(existing.iter()) {
                    module.replace_all_uses(old, new)?;
                }
                module.erase_op(op)?;
                eliminated += 1;
            }
            None => {
                known.insert(key, results);
            }
        }
    }
    Ok(eliminated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::Attribute;
    use crate::dialects::standard;
    use crate::module::InsertPoint;

    #[test]
    fn test_constants_with_different_values_are_kept() {
        let mut ctx = Context::new();
        let mut module = Module::new();
        let index = ctx.builtin_types().index();
        let func = module.add_function("f", vec![], vec![]);
        let entry = module.entry_block(func).unwrap();
        let at = InsertPoint::BlockEnd(entry);
        module.insert_op(standard::constant(index, Attribute::Integer(1)), at).unwrap();
        module.insert_op(standard::constant(index, Attribute::Integer(2)), at).unwrap();
        module.insert_op(standard::constant(index, Attribute::Integer(1)), at).unwrap();
        module.insert_op(standard::ret(&[]), at).unwrap();

        let result = CsePass::new().run(&mut ctx, &mut module).unwrap();
        assert_eq!(result.statistic("ops_eliminated"), 1);
        assert_eq!(module.block_ops(entry).len(), 3);
    }
}
