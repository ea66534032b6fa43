use crate::hints;
use proc_macro2::TokenStream;
use quote::ToTokens;
use syn::parse::Parser;
use syn::{Expr, ExprLit, ExprUnary, Item, ItemFn, Lit, LitStr, UnOp};

/// Items a type-level marker may be put on
fn type_item(item: TokenStream, marker: &str) -> syn::Result<TokenStream> {
    let item: Item = syn::parse2(item)?;
    match item {
        Item::Struct(_) | Item::Enum(_) => Ok(item.into_token_stream()),
        other => Err(syn::Error::new_spanned(
            other,
            format!("#[{}] can only be used on a struct or an enum", marker),
        )),
    }
}

fn method_item(item: TokenStream) -> syn::Result<TokenStream> {
    let mut function: ItemFn = syn::parse2(item)?;
    hints::strip(&mut function)?;
    Ok(function.into_token_stream())
}

fn integer(expr: &Expr) -> Option<i64> {
    match expr {
        Expr::Lit(ExprLit {
            lit: Lit::Int(int), ..
        }) => int.base10_parse().ok(),
        Expr::Unary(ExprUnary {
            op: UnOp::Neg(_),
            expr,
            ..
        }) => integer(expr).map(|value| -value),
        Expr::Group(group) => integer(&group.expr),
        Expr::Paren(paren) => integer(&paren.expr),
        _ => None,
    }
}

pub fn middleware(attr: TokenStream, item: TokenStream) -> syn::Result<TokenStream> {
    let parser = syn::meta::parser(|meta| {
        if meta.path.is_ident("priority") {
            let expr: Expr = meta.value()?.parse()?;
            let value = integer(&expr).ok_or_else(|| meta.error("priority must be an integer"))?;
            i32::try_from(value).map_err(|_| meta.error("priority out of range"))?;
            Ok(())
        } else {
            Err(meta.error("unknown middleware option, expected `priority`"))
        }
    });
    parser.parse2(attr)?;
    type_item(item, "middleware")
}

pub fn service(attr: TokenStream, item: TokenStream) -> syn::Result<TokenStream> {
    let mut seen = 0;
    let parser = syn::meta::parser(|meta| {
        if meta.path.is_ident("singleton") || meta.path.is_ident("transient") {
            seen += 1;
            Ok(())
        } else {
            Err(meta.error("expected `singleton` or `transient`"))
        }
    });
    parser.parse2(attr)?;
    if seen > 1 {
        return Err(syn::Error::new(
            proc_macro2::Span::call_site(),
            "`singleton` and `transient` are exclusive",
        ));
    }
    type_item(item, "service")
}

pub fn route_prefix(attr: TokenStream, item: TokenStream) -> syn::Result<TokenStream> {
    let prefix: LitStr = syn::parse2(attr)?;
    if !prefix.value().starts_with('/') {
        return Err(syn::Error::new(prefix.span(), "route prefix must start with '/'"));
    }
    type_item(item, "route_prefix")
}

pub fn listener(attr: TokenStream, item: TokenStream) -> syn::Result<TokenStream> {
    let parser = syn::meta::parser(|meta| {
        if meta.path.is_ident("event") {
            let event: LitStr = meta.value()?.parse()?;
            if event.value().is_empty() {
                return Err(meta.error("event type is empty"));
            }
        }
        Ok(())
    });
    parser.parse2(attr)?;

    let function: ItemFn = syn::parse2(item.clone())?;
    let typed_params = function
        .sig
        .inputs
        .iter()
        .filter(|input| matches!(input, syn::FnArg::Typed(_)))
        .count();
    if typed_params == 0 {
        return Err(syn::Error::new_spanned(
            &function.sig,
            "a listener takes the event as its first parameter",
        ));
    }
    method_item(item)
}

pub fn constructor(attr: TokenStream, item: TokenStream) -> syn::Result<TokenStream> {
    if !attr.is_empty() {
        return Err(syn::Error::new_spanned(attr, "#[constructor] takes no arguments"));
    }
    let function: ItemFn = syn::parse2(item.clone())?;
    if function.sig.receiver().is_some() {
        return Err(syn::Error::new_spanned(
            &function.sig,
            "a constructor is an associated function without `self`",
        ));
    }
    method_item(item)
}
