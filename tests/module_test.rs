// Tests for the arena IR model in lowir.
//
// Purpose: Validates navigation and mutation of a Module:
// - Function, region, block and op construction
// - Pre-order snapshot walks through nested regions
// - Erasure rules (no remaining uses, nested regions freed)
// - Use replacement with type checking, optionally scoped to a region
// - Function naming and ordering helpers used by kernel outlining

mod common;

use common::{block_op_names, body_of, result};
use lowir::dialects::{affine, standard};
use lowir::{Context, Error, InsertPoint, Module};

#[test]
fn test_function_construction() {
    let mut ctx = Context::new();
    let mut module = Module::new();
    let i32_ty = ctx.builtin_types().i32();
    let f32_ty = ctx.builtin_types().f32();

    let func = module.add_function("f", vec![i32_ty, f32_ty], vec![i32_ty]);
    let entry = module.entry_block(func).unwrap();
    let args = module.block_args(entry);

    assert_eq!(args.len(), 2);
    assert_eq!(module.value_type(args[0]), Some(i32_ty));
    assert_eq!(module.value_type(args[1]), Some(f32_ty));
    assert_eq!(module.lookup_function("f"), Some(func));
    assert_eq!(module.defining_block(args[1]), Some(entry));
    assert_eq!(module.block_function(entry), Some(func));
}

#[test]
fn test_insert_points() {
    let mut ctx = Context::new();
    let mut module = Module::new();
    let index = ctx.builtin_types().index();
    let func = module.add_function("f", vec![], vec![]);
    let entry = module.entry_block(func).unwrap();

    let ret = module
        .insert_op(standard::ret(&[]), InsertPoint::BlockEnd(entry))
        .unwrap();
    let first = module
        .insert_op(standard::constant_index(index, 1), InsertPoint::BlockStart(entry))
        .unwrap();
    let third = module
        .insert_op(standard::constant_index(index, 3), InsertPoint::Before(ret))
        .unwrap();
    let second = module
        .insert_op(standard::constant_index(index, 2), InsertPoint::After(first))
        .unwrap();

    assert_eq!(module.block_ops(entry), vec![first, second, third, ret]);
    assert_eq!(module.op(second).unwrap().int_attr("value"), Some(2));
    assert_eq!(module.parent_function(third), Some(func));
}

#[test]
fn test_erase_op_with_uses_fails() {
    let mut ctx = Context::new();
    let mut module = Module::new();
    let index = ctx.builtin_types().index();
    let func = module.add_function("f", vec![], vec![]);
    let entry = module.entry_block(func).unwrap();
    let at = InsertPoint::BlockEnd(entry);

    let c = module.insert_op(standard::constant_index(index, 7), at).unwrap();
    let v = result(&module, c);
    let sum = module
        .insert_op(standard::binary::<standard::AddIOp>(v, v, index), at)
        .unwrap();
    module.insert_op(standard::ret(&[]), at).unwrap();

    assert!(matches!(
        module.erase_op(c),
        Err(Error::InvalidOperation(_))
    ));
    assert_eq!(module.uses(v).len(), 2);
    let sum_val = result(&module, sum);
    let used = module.used_values();
    assert!(used.contains(&v));
    assert!(!used.contains(&sum_val));

    module.erase_op(sum).unwrap();
    assert!(!module.has_uses(v));
    assert!(module.used_values().is_empty());
    module.erase_op(c).unwrap();
    assert_eq!(block_op_names(&module, entry), vec!["std.return"]);
    assert!(module.value(v).is_none());
}

#[test]
fn test_replace_all_uses_requires_same_type() {
    let mut ctx = Context::new();
    let mut module = Module::new();
    let i32_ty = ctx.builtin_types().i32();
    let i64_ty = ctx.builtin_types().i64();
    let func = module.add_function("f", vec![i32_ty, i32_ty, i64_ty], vec![]);
    let entry = module.entry_block(func).unwrap();
    let args = module.block_args(entry);
    let at = InsertPoint::BlockEnd(entry);

    let sum = module
        .insert_op(standard::binary::<standard::AddIOp>(args[0], args[0], i32_ty), at)
        .unwrap();

    assert!(matches!(
        module.replace_all_uses(args[0], args[2]),
        Err(Error::TypeError(_))
    ));
    module.replace_all_uses(args[0], args[1]).unwrap();
    assert_eq!(module.op(sum).unwrap().operands.to_vec(), vec![args[1], args[1]]);
}

#[test]
fn test_walk_is_pre_order() {
    let mut ctx = Context::new();
    let mut module = Module::new();
    let index = ctx.builtin_types().index();
    let func = module.add_function("f", vec![], vec![]);
    let entry = module.entry_block(func).unwrap();

    let for_op = module
        .insert_op(affine::for_loop(0, 8, 1), InsertPoint::BlockEnd(entry))
        .unwrap();
    let region = module.op(for_op).unwrap().regions[0];
    let body = module.add_block(region, &[index]);
    module
        .insert_op(standard::constant_index(index, 0), InsertPoint::BlockEnd(body))
        .unwrap();
    module
        .insert_op(affine::terminator(), InsertPoint::BlockEnd(body))
        .unwrap();
    module
        .insert_op(standard::ret(&[]), InsertPoint::BlockEnd(entry))
        .unwrap();

    assert_eq!(
        common::op_names(&module, func),
        vec!["affine.for", "std.constant", "affine.terminator", "std.return"]
    );
    assert_eq!(module.block_parent_op(body), Some(for_op));
    assert_eq!(module.block_function(body), Some(func));
}

#[test]
fn test_erase_frees_nested_regions() {
    let mut ctx = Context::new();
    let mut module = Module::new();
    let index = ctx.builtin_types().index();
    let func = module.add_function("f", vec![], vec![]);
    let entry = module.entry_block(func).unwrap();

    let for_op = module
        .insert_op(affine::for_loop(0, 8, 1), InsertPoint::BlockEnd(entry))
        .unwrap();
    let region = module.op(for_op).unwrap().regions[0];
    let body = module.add_block(region, &[index]);
    module
        .insert_op(standard::constant_index(index, 0), InsertPoint::BlockEnd(body))
        .unwrap();
    module
        .insert_op(affine::terminator(), InsertPoint::BlockEnd(body))
        .unwrap();
    module
        .insert_op(standard::ret(&[]), InsertPoint::BlockEnd(entry))
        .unwrap();

    module.erase_op(for_op).unwrap();

    assert_eq!(module.operations.len(), 1);
    assert_eq!(module.regions.len(), 1);
    assert_eq!(module.blocks.len(), 1);
    assert!(module.values.is_empty());
    assert!(module.block(body).is_none());
}

#[test]
fn test_replace_uses_in_region() {
    let mut ctx = Context::new();
    let mut module = Module::new();
    let index = ctx.builtin_types().index();
    let func = module.add_function("f", vec![], vec![]);
    let entry = module.entry_block(func).unwrap();
    let at = InsertPoint::BlockEnd(entry);

    let outer = module.insert_op(standard::constant_index(index, 1), at).unwrap();
    let outer_val = result(&module, outer);
    let for_op = module.insert_op(affine::for_loop(0, 4, 1), at).unwrap();
    let outside_user = module
        .insert_op(standard::binary::<standard::AddIOp>(outer_val, outer_val, index), at)
        .unwrap();
    module.insert_op(standard::ret(&[]), at).unwrap();

    let region = module.op(for_op).unwrap().regions[0];
    let body = module.add_block(region, &[index]);
    let inner = module
        .insert_op(standard::constant_index(index, 1), InsertPoint::BlockEnd(body))
        .unwrap();
    let inner_val = result(&module, inner);
    let inside_user = module
        .insert_op(
            standard::binary::<standard::AddIOp>(outer_val, outer_val, index),
            InsertPoint::BlockEnd(body),
        )
        .unwrap();
    module
        .insert_op(affine::terminator(), InsertPoint::BlockEnd(body))
        .unwrap();

    module.replace_uses_in_region(outer_val, inner_val, region).unwrap();

    assert_eq!(
        module.op(inside_user).unwrap().operands.to_vec(),
        vec![inner_val, inner_val]
    );
    assert_eq!(
        module.op(outside_user).unwrap().operands.to_vec(),
        vec![outer_val, outer_val]
    );
    assert!(module.is_value_defined_within_region(inner_val, region));
    assert!(!module.is_value_defined_within_region(outer_val, region));
    assert_eq!(body_of(&module, for_op), body);
}

#[test]
fn test_unique_function_name_and_order() {
    let mut module = Module::new();
    let f = module.add_function("f", vec![], vec![]);
    module.add_function("f_kernel", vec![], vec![]);
    let g = module.add_function("g", vec![], vec![]);

    assert_eq!(module.unique_function_name("g_kernel"), "g_kernel");
    assert_eq!(module.unique_function_name("f_kernel"), "f_kernel_1");

    module.move_function_after(g, f).unwrap();
    let names: Vec<&str> = module
        .function_ids()
        .into_iter()
        .map(|id| module.function_name(id))
        .collect();
    assert_eq!(names, vec!["f", "g", "f_kernel"]);
}

#[test]
fn test_move_op_between_blocks() {
    let mut ctx = Context::new();
    let mut module = Module::new();
    let index = ctx.builtin_types().index();
    let f = module.add_function("f", vec![], vec![]);
    let g = module.add_function("g", vec![], vec![]);
    let f_entry = module.entry_block(f).unwrap();
    let g_entry = module.entry_block(g).unwrap();

    let c = module
        .insert_op(standard::constant_index(index, 5), InsertPoint::BlockEnd(f_entry))
        .unwrap();
    module.move_op(c, InsertPoint::BlockEnd(g_entry)).unwrap();

    assert!(module.block_ops(f_entry).is_empty());
    assert_eq!(module.block_ops(g_entry), vec![c]);
    assert_eq!(module.parent_function(c), Some(g));
}
