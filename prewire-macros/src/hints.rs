//! Parameter-level hints

use syn::parse::ParseStream;
use syn::{Expr, FnArg, ItemFn, LitStr};

const HINTS: [&str; 3] = ["default", "env", "inject"];

/// Check and remove the hints on every parameter of `function`
pub fn strip(function: &mut ItemFn) -> syn::Result<()> {
    for input in function.sig.inputs.iter_mut() {
        let FnArg::Typed(pat_type) = input else {
            continue;
        };
        for attr in &pat_type.attrs {
            if attr.path().is_ident("default") {
                attr.parse_args::<Expr>()?;
            } else if attr.path().is_ident("env") {
                let key: LitStr = attr.parse_args()?;
                if key.value().is_empty() {
                    return Err(syn::Error::new_spanned(key, "environment key is empty"));
                }
            } else if attr.path().is_ident("inject") {
                attr.parse_args_with(|input: ParseStream| {
                    if input.peek(LitStr) {
                        input.parse::<LitStr>().map(|_| ())
                    } else {
                        input.parse::<syn::Path>().map(|_| ())
                    }
                })?;
            }
        }
        pat_type
            .attrs
            .retain(|attr| !HINTS.iter().any(|hint| attr.path().is_ident(hint)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use quote::quote;

    #[test]
    fn test_hints_are_removed() {
        let mut function: ItemFn = syn::parse2(quote! {
            fn new(
                #[env("DSN")] dsn: String,
                #[default(3)] retries: i64,
                #[inject(Clock)] clock: Arc<dyn Clock>,
            ) -> Self {
                todo!()
            }
        })
        .unwrap();
        strip(&mut function).unwrap();

        let remaining: usize = function
            .sig
            .inputs
            .iter()
            .map(|input| match input {
                FnArg::Typed(pat_type) => pat_type.attrs.len(),
                FnArg::Receiver(_) => 0,
            })
            .sum();
        assert_eq!(remaining, 0);
    }

    #[test]
    fn test_malformed_hint_is_rejected() {
        let mut function: ItemFn = syn::parse2(quote! {
            fn new(#[env(DSN)] dsn: String) -> Self { todo!() }
        })
        .unwrap();
        assert!(strip(&mut function).is_err());
    }
}
