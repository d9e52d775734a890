//! Attribute macros backing `#[core_async::test]` and `#[core_async::main]`.
//!
//! Both expand an `async fn` into a synchronous entry point that drives the
//! body on a current-thread runtime built by `core_async::runtime`.
//! `test` additionally accepts `start_paused`, which freezes the runtime
//! clock so timer-driven code (poll backoff, burst schedules) advances
//! deterministically.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::parse::Parser;
use syn::punctuated::Punctuated;
use syn::{parse_macro_input, Ident, ItemFn, Token};

#[proc_macro_attribute]
pub fn test(attr: TokenStream, item: TokenStream) -> TokenStream {
    expand(attr, item, MacroKind::Test)
}

#[proc_macro_attribute]
pub fn main(attr: TokenStream, item: TokenStream) -> TokenStream {
    expand(attr, item, MacroKind::Main)
}

enum MacroKind {
    Test,
    Main,
}

#[derive(Default)]
struct Options {
    start_paused: bool,
}

fn parse_options(attr: TokenStream, kind: &MacroKind) -> syn::Result<Options> {
    let mut options = Options::default();
    if attr.is_empty() {
        return Ok(options);
    }

    let parser = Punctuated::<Ident, Token![,]>::parse_terminated;
    let idents = parser.parse2(TokenStream2::from(attr))?;

    for ident in idents {
        match (ident.to_string().as_str(), kind) {
            ("start_paused", MacroKind::Test) => options.start_paused = true,
            _ => {
                return Err(syn::Error::new_spanned(
                    ident,
                    "unsupported core_async argument (only `start_paused` on `test`)",
                ))
            }
        }
    }

    Ok(options)
}

fn expand(attr: TokenStream, item: TokenStream, kind: MacroKind) -> TokenStream {
    let options = match parse_options(attr, &kind) {
        Ok(options) => options,
        Err(err) => return err.to_compile_error().into(),
    };

    let input = parse_macro_input!(item as ItemFn);

    if input.sig.asyncness.is_none() {
        return syn::Error::new_spanned(
            input.sig.fn_token,
            "core_async attribute macros require `async fn`",
        )
        .to_compile_error()
        .into();
    }

    let mut sync_sig = input.sig.clone();
    sync_sig.asyncness = None;

    let attrs = input.attrs;
    let vis = input.vis;
    let block = input.block;

    let runner = if options.start_paused {
        quote!(core_async::runtime::block_on_paused)
    } else {
        quote!(core_async::runtime::block_on)
    };

    let expanded = match kind {
        MacroKind::Test => quote! {
            #(#attrs)*
            #[test]
            #vis #sync_sig {
                #runner(async move #block)
            }
        },
        MacroKind::Main => quote! {
            #(#attrs)*
            #vis #sync_sig {
                #runner(async move #block)
            }
        },
    };

    expanded.into()
}
