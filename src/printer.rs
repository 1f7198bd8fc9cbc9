//! Generic textual dump of a module, used for debugging and for comparing IR
//! in tests. Values are numbered `%0, %1, ...` per function in the order
//! they are defined, so two structurally identical modules print the same.

use crate::attribute::Attribute;
use crate::context::Context;
use crate::module::{FuncId, Module};
use crate::ops::{Opr, Val};
use crate::region::{BlockId, RegionId};
use crate::types::TypeId;
use ahash::AHashMap;
use std::fmt::Write;

pub struct Printer {
    output: String,
    indent_level: usize,
    indent_str: String,
}

#[derive(Default)]
struct ValueNames {
    ids: AHashMap<Val, usize>,
    blocks: AHashMap<BlockId, usize>,
}

impl ValueNames {
    fn value(&mut self, val: Val) -> String {
        let next = self.ids.len();
        format!("%{}", self.ids.entry(val).or_insert(next))
    }

    fn block(&mut self, block: BlockId) -> String {
        let next = self.blocks.len();
        format!("^bb{}", self.blocks.entry(block).or_insert(next))
    }
}

impl Printer {
    pub fn new() -> Self {
        Self {
            output: String::new(),
            indent_level: 0,
            indent_str: "  ".to_string(),
        }
    }

    pub fn print(&mut self, s: &str) {
        self.output.push_str(s);
    }

    pub fn println(&mut self, s: &str) {
        self.output.push_str(s);
        self.output.push('\n');
    }

    pub fn print_indent(&mut self) {
        for _ in 0..self.indent_level {
            self.output.push_str(&self.indent_str);
        }
    }

    pub fn indent(&mut self) {
        self.indent_level += 1;
    }

    pub fn dedent(&mut self) {
        if self.indent_level > 0 {
            self.indent_level -= 1;
        }
    }

    pub fn get_output(self) -> String {
        self.output
    }

    pub fn clear(&mut self) {
        self.output.clear();
        self.indent_level = 0;
    }

    pub fn print_module(&mut self, ctx: &Context, module: &Module) {
        for func in module.function_ids() {
            self.print_function(ctx, module, func);
        }
    }

    pub fn print_function(&mut self, ctx: &Context, module: &Module, func: FuncId) {
        let Some(function) = module.function(func) else {
            return;
        };
        let mut names = ValueNames::default();

        let entry = module.entry_block(func);
        let params: Vec<String> = entry
            .map(|b| module.block_args(b))
            .unwrap_or_default()
            .into_iter()
            .map(|arg| self.typed_value(ctx, module, &mut names, arg))
            .collect();
        let outputs: Vec<String> = function.outputs.iter().map(|&t| ctx.type_name(t)).collect();

        self.print_indent();
        let mut header = format!("func @{}({})", function.name, params.join(", "));
        if !outputs.is_empty() {
            let _ = write!(header, " -> ({})", outputs.join(", "));
        }
        if !function.attributes.is_empty() {
            let _ = write!(header, " attributes {}", format_attributes(ctx, &function.attributes));
        }
        header.push_str(" {");
        self.println(&header);

        self.indent();
        self.print_region_blocks(ctx, module, &mut names, function.body, entry);
        self.dedent();
        self.print_indent();
        self.println("}");
    }

    /// Prints the blocks of `region`; `implicit_entry` is not given a label.
    fn print_region_blocks(
        &mut self,
        ctx: &Context,
        module: &Module,
        names: &mut ValueNames,
        region: RegionId,
        implicit_entry: Option<BlockId>,
    ) {
        let blocks = module
            .region(region)
            .map(|r| r.blocks.clone())
            .unwrap_or_default();
        for block in blocks {
            if Some(block) != implicit_entry {
                let label = names.block(block);
                let args: Vec<String> = module
                    .block_args(block)
                    .into_iter()
                    .map(|arg| self.typed_value(ctx, module, names, arg))
                    .collect();
                self.dedent();
                self.print_indent();
                self.println(&format!("{}({}):", label, args.join(", ")));
                self.indent();
            }
            for op in module.block_ops(block) {
                self.print_op(ctx, module, names, op);
            }
        }
    }

    fn print_op(&mut self, ctx: &Context, module: &Module, names: &mut ValueNames, op: Opr) {
        let Some(data) = module.op(op) else {
            return;
        };
        let operands: Vec<String> = data.operands.iter().map(|&v| names.value(v)).collect();
        let results: Vec<String> = data.results.iter().map(|&v| names.value(v)).collect();

        self.print_indent();
        let mut line = String::new();
        if !results.is_empty() {
            let _ = write!(line, "{} = ", results.join(", "));
        }
        let _ = write!(line, "\"{}\"({})", data.name(), operands.join(", "));

        if data.regions.is_empty() {
            self.print(&line);
        } else {
            line.push_str(" (");
            for (i, &region) in data.regions.iter().enumerate() {
                if i > 0 {
                    line.push_str(", ");
                }
                line.push('{');
                self.println(&line);
                line.clear();

                self.indent();
                self.indent();
                self.print_region_blocks(ctx, module, names, region, None);
                self.dedent();
                self.dedent();
                self.print_indent();
                line.push('}');
            }
            line.push(')');
            self.print(&line);
        }

        let mut tail = String::new();
        if !data.attributes.is_empty() {
            let _ = write!(tail, " {}", format_attributes(ctx, &data.attributes));
        }
        let operand_types = types_of(ctx, module, &data.operands);
        let result_types = types_of(ctx, module, &data.results);
        let _ = write!(tail, " : ({}) -> ({})", operand_types, result_types);
        self.println(&tail);
    }

    fn typed_value(
        &self,
        ctx: &Context,
        module: &Module,
        names: &mut ValueNames,
        val: Val,
    ) -> String {
        let ty = module
            .value_type(val)
            .map_or_else(|| "<erased>".to_string(), |t| ctx.type_name(t));
        format!("{}: {}", names.value(val), ty)
    }
}

impl Default for Printer {
    fn default() -> Self {
        Self::new()
    }
}

/// Renders the whole module.
pub fn print_module(ctx: &Context, module: &Module) -> String {
    let mut printer = Printer::new();
    printer.print_module(ctx, module);
    printer.get_output()
}

fn types_of(ctx: &Context, module: &Module, values: &[Val]) -> String {
    let types: Vec<String> = values
        .iter()
        .map(|&v| {
            module
                .value_type(v)
                .map_or_else(|| "<erased>".to_string(), |t: TypeId| ctx.type_name(t))
        })
        .collect();
    types.join(", ")
}

fn format_attributes(ctx: &Context, attributes: &[(String, Attribute)]) -> String {
    let entries: Vec<String> = attributes
        .iter()
        .map(|(key, value)| match value {
            Attribute::Unit => key.clone(),
            other => format!("{} = {}", key, format_attribute(ctx, other)),
        })
        .collect();
    format!("{{{}}}", entries.join(", "))
}

pub fn format_attribute(ctx: &Context, attr: &Attribute) -> String {
    match attr {
        Attribute::Unit => "unit".to_string(),
        Attribute::Bool(b) => b.to_string(),
        Attribute::Integer(i) => i.to_string(),
        Attribute::Float(f) => format!("{:?}", f),
        Attribute::String(s) => format!("{:?}", s),
        Attribute::Symbol(s) => format!("@{}", s),
        Attribute::Type(t) => ctx.type_name(*t),
        Attribute::Array(items) => {
            let items: Vec<String> = items.iter().map(|a| format_attribute(ctx, a)).collect();
            format!("[{}]", items.join(", "))
        }
    }
}
