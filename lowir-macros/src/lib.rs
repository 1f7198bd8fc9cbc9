use proc_macro::TokenStream;

mod op_derive;

#[proc_macro_derive(Op, attributes(operation))]
pub fn derive_op(input: TokenStream) -> TokenStream {
    op_derive::derive_op(input)
}
