//! Procedural macros shared by the netcore test suites.

use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::quote;
use syn::{
    parse::Parser, punctuated::Punctuated, ItemFn, Lit, Meta, NestedMeta, Token,
};

/// Run a test function with a `tracing` subscriber that writes to the test output.
///
/// The maximum level defaults to `DEBUG` and can be overridden with `level = "..."`
/// (one of `TRACE`, `DEBUG`, `INFO`, `WARN` or `ERROR`, in any case).
///
/// # Example
///
/// ```rust,ignore
/// use netcore_macros::test_traced;
///
/// #[test_traced(level = "INFO")]
/// fn test_allocation() {
///     tracing::info!("visible");
///     tracing::debug!("filtered");
/// }
/// ```
#[proc_macro_attribute]
pub fn test_traced(attr: TokenStream, item: TokenStream) -> TokenStream {
    expand_test_traced(attr.into(), item.into())
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

/// Resolves the `level = "..."` argument (if any) to a `tracing::Level` path.
fn parse_level(attr: TokenStream2) -> syn::Result<TokenStream2> {
    let args = Punctuated::<NestedMeta, Token![,]>::parse_terminated.parse2(attr)?;
    let mut level = String::from("DEBUG");
    for arg in args {
        match arg {
            NestedMeta::Meta(Meta::NameValue(pair)) if pair.path.is_ident("level") => {
                level = match pair.lit {
                    Lit::Str(value) => value.value().to_uppercase(),
                    other => {
                        return Err(syn::Error::new_spanned(
                            other,
                            "level must be a string literal",
                        ))
                    }
                };
            }
            other => {
                return Err(syn::Error::new_spanned(other, "expected `level = \"...\"`"));
            }
        }
    }
    match level.as_str() {
        "TRACE" => Ok(quote!(::tracing::Level::TRACE)),
        "DEBUG" => Ok(quote!(::tracing::Level::DEBUG)),
        "INFO" => Ok(quote!(::tracing::Level::INFO)),
        "WARN" => Ok(quote!(::tracing::Level::WARN)),
        "ERROR" => Ok(quote!(::tracing::Level::ERROR)),
        other => Err(syn::Error::new(
            Span::call_site(),
            format!("unknown level: {other}"),
        )),
    }
}

fn expand_test_traced(attr: TokenStream2, item: TokenStream2) -> syn::Result<TokenStream2> {
    let level = parse_level(attr)?;
    let input: ItemFn = syn::parse2(item)?;

    let attrs = input.attrs;
    let vis = input.vis;
    let sig = input.sig;
    let block = input.block;
    Ok(quote! {
        #[test]
        #(#attrs)*
        #vis #sig {
            let subscriber = ::tracing_subscriber::fmt()
                .with_test_writer()
                .with_max_level(#level)
                .with_line_number(true)
                .finish();
            let dispatcher = ::tracing::Dispatch::new(subscriber);
            ::tracing::dispatcher::with_default(&dispatcher, || #block)
        }
    })
}
