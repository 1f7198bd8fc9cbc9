use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, LitInt, LitStr};

struct OperationAttr {
    dialect: String,
    name: String,
    traits: Vec<String>,
    operands: Option<usize>,
    results: Option<usize>,
    regions: Option<usize>,
}

pub fn derive_op(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let ident = &input.ident;

    if !matches!(input.data, Data::Struct(_)) {
        return syn::Error::new_spanned(ident, "Op can only be derived for structs")
            .to_compile_error()
            .into();
    }

    let Some(operation_attr) = input
        .attrs
        .iter()
        .find(|attr| attr.path().is_ident("operation"))
    else {
        return syn::Error::new_spanned(ident, "missing #[operation(dialect = .., name = ..)]")
            .to_compile_error()
            .into();
    };

    let attr = match parse_operation_attr(operation_attr) {
        Ok(attr) => attr,
        Err(err) => return err.to_compile_error().into(),
    };

    let dialect = LitStr::new(&attr.dialect, ident.span());
    let name = LitStr::new(&attr.name, ident.span());
    let full_name = LitStr::new(&format!("{}.{}", attr.dialect, attr.name), ident.span());
    let traits = attr.traits.iter().map(|t| LitStr::new(t, ident.span()));

    let operand_check = arity_check(&full_name, quote!(operands), "operands", attr.operands);
    let result_check = arity_check(&full_name, quote!(results), "results", attr.results);
    let region_check = arity_check(&full_name, quote!(regions), "regions", attr.regions);

    let expanded = quote! {
        const _: () = {
            static INFO: lowir::ops::OpInfo = lowir::ops::OpInfo {
                dialect: #dialect,
                name: #name,
                full_name: #full_name,
                traits: &[#(#traits),*],
                verify,
            };

            fn verify(op: &lowir::ops::OpData) -> lowir::error::Result<()> {
                let _ = op;
                #operand_check
                #result_check
                #region_check
                Ok(())
            }

            lowir::inventory::submit!(&INFO);

            impl lowir::ops::OpDef for #ident {
                const NAME: &'static str = #full_name;

                fn info() -> &'static lowir::ops::OpInfo {
                    &INFO
                }
            }
        };
    };

    TokenStream::from(expanded)
}

fn arity_check(
    full_name: &LitStr,
    field: TokenStream2,
    what: &str,
    expected: Option<usize>,
) -> TokenStream2 {
    match expected {
        Some(count) => quote! {
            if op.#field.len() != #count {
                return Err(lowir::error::Error::VerificationError(format!(
                    "'{}' expects {} {}, found {}",
                    #full_name,
                    #count,
                    #what,
                    op.#field.len()
                )));
            }
        },
        None => TokenStream2::new(),
    }
}

fn parse_operation_attr(attr: &syn::Attribute) -> syn::Result<OperationAttr> {
    let mut dialect = None;
    let mut name = None;
    let mut traits = Vec::new();
    let mut operands = None;
    let mut results = None;
    let mut regions = None;

    attr.parse_nested_meta(|meta| {
        if meta.path.is_ident("dialect") {
            let s: LitStr = meta.value()?.parse()?;
            dialect = Some(s.value());
        } else if meta.path.is_ident("name") {
            let s: LitStr = meta.value()?.parse()?;
            name = Some(s.value());
        } else if meta.path.is_ident("traits") {
            let s: LitStr = meta.value()?.parse()?;
            traits.extend(
                s.value()
                    .split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string),
            );
        } else if meta.path.is_ident("operands") {
            let n: LitInt = meta.value()?.parse()?;
            operands = Some(n.base10_parse()?);
        } else if meta.path.is_ident("results") {
            let n: LitInt = meta.value()?.parse()?;
            results = Some(n.base10_parse()?);
        } else if meta.path.is_ident("regions") {
            let n: LitInt = meta.value()?.parse()?;
            regions = Some(n.base10_parse()?);
        } else {
            return Err(meta.error("unknown key in #[operation]"));
        }
        Ok(())
    })?;

    let dialect = dialect.ok_or_else(|| syn::Error::new_spanned(attr, "missing `dialect`"))?;
    let name = name.ok_or_else(|| syn::Error::new_spanned(attr, "missing `name`"))?;

    Ok(OperationAttr {
        dialect,
        name,
        traits,
        operands,
        results,
        regions,
    })
}
