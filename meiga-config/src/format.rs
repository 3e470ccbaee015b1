use proc_macro2::TokenStream;
use quote::quote;

/// Format a sequence of items as Rust source
pub fn pretty_items(tokens: &TokenStream) -> syn::Result<String> {
    let file: syn::File = syn::parse2(tokens.clone())?;
    Ok(prettyplease::unparse(&file))
}

/// Format a config initializer expression the way it appears in the generated file
pub fn pretty_config_expr(expr: &TokenStream) -> syn::Result<String> {
    pretty_items(&quote! {
        pub static CONFIG: RobotConfig = #expr;
    })
}

/// Compare config expressions by their formatted source, showing a diff on mismatch
#[cfg(test)]
pub fn assert_tokens_eq(left: TokenStream, right: TokenStream) {
    let left = pretty_config_expr(&left).unwrap();
    let right = pretty_config_expr(&right).unwrap();
    similar_asserts::assert_eq!(left, right);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_expr() {
        let code = pretty_config_expr(&quote! { Cfg { a: 1u32, b: Inner { c: 2.5f32 } } }).unwrap();
        assert!(code.starts_with("pub static CONFIG: RobotConfig = Cfg {"), "{}", code);
        assert!(code.contains("c: 2.5f32"), "{}", code);
        assert!(code.ends_with("};\n"), "{}", code);
    }

    #[test]
    fn rejects_invalid_tokens() {
        assert!(pretty_items(&quote! { static X: u8 = ; }).is_err());
    }

    #[test]
    fn equal_despite_spacing() {
        assert_tokens_eq(quote! { A { x: 1u8, } }, quote! { A{x:1u8} });
    }
}
