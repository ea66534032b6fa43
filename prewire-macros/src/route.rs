use crate::hints;
use proc_macro2::TokenStream;
use quote::ToTokens;
use syn::parse::{Parse, ParseStream};
use syn::{Ident, ItemFn, LitStr, Token};

const METHODS: [&str; 7] = ["GET", "HEAD", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"];

pub struct RouteArgs {
    pub method: String,
    pub path: LitStr,
    pub requirements: Vec<(Ident, LitStr)>,
    pub name: Option<LitStr>,
}

impl Parse for RouteArgs {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let (method, span) = if input.peek(LitStr) {
            let lit: LitStr = input.parse()?;
            (lit.value(), lit.span())
        } else {
            let ident: Ident = input.parse()?;
            (ident.to_string(), ident.span())
        };
        let method = method.to_ascii_uppercase();
        if !METHODS.contains(&method.as_str()) {
            return Err(syn::Error::new(
                span,
                format!("unknown HTTP method '{}', expected one of {}", method, METHODS.join(", ")),
            ));
        }
        input.parse::<Token![,]>()?;
        let path: LitStr = input.parse()?;

        let mut requirements = Vec::new();
        let mut name = None;
        while !input.is_empty() {
            input.parse::<Token![,]>()?;
            if input.is_empty() {
                break;
            }
            let key: Ident = input.parse()?;
            if key == "requirements" {
                let content;
                syn::parenthesized!(content in input);
                while !content.is_empty() {
                    let param: Ident = content.parse()?;
                    content.parse::<Token![=]>()?;
                    requirements.push((param, content.parse::<LitStr>()?));
                    if content.peek(Token![,]) {
                        content.parse::<Token![,]>()?;
                    }
                }
            } else if key == "name" {
                input.parse::<Token![=]>()?;
                name = Some(input.parse()?);
            } else {
                return Err(syn::Error::new(
                    key.span(),
                    format!("unknown route option '{}', expected 'requirements' or 'name'", key),
                ));
            }
        }

        Ok(Self {
            method,
            path,
            requirements,
            name,
        })
    }
}

/// Capture names of a path template
pub fn captures(path: &LitStr) -> syn::Result<Vec<String>> {
    let value = path.value();
    if !value.starts_with('/') {
        return Err(syn::Error::new(path.span(), "route path must start with '/'"));
    }
    let mut names = Vec::new();
    for segment in value.split('/').filter(|s| !s.is_empty()) {
        let is_brace = |c: char| c == '{' || c == '}';
        match segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            Some(name) => {
                if name.is_empty() || name.contains(is_brace) || names.iter().any(|n| n == name) {
                    return Err(syn::Error::new(
                        path.span(),
                        format!("invalid or duplicate parameter '{{{}}}'", name),
                    ));
                }
                names.push(name.to_string());
            }
            None if segment.contains(is_brace) => {
                return Err(syn::Error::new(
                    path.span(),
                    format!("malformed path segment '{}'", segment),
                ));
            }
            None => {}
        }
    }
    Ok(names)
}

pub fn expand(attr: TokenStream, item: TokenStream) -> syn::Result<TokenStream> {
    let args: RouteArgs = syn::parse2(attr)?;
    let names = captures(&args.path)?;
    for (param, _) in &args.requirements {
        if !names.iter().any(|n| param == n) {
            return Err(syn::Error::new(
                param.span(),
                format!("requirement for '{}' which is not a path parameter", param),
            ));
        }
    }
    if let Some(name) = &args.name {
        if name.value().is_empty() {
            return Err(syn::Error::new(name.span(), "route name is empty"));
        }
    }

    let mut function: ItemFn = syn::parse2(item)?;
    hints::strip(&mut function)?;
    Ok(function.into_token_stream())
}

#[cfg(test)]
mod tests {
    use super::*;
    use quote::quote;

    fn item() -> TokenStream {
        quote! { fn show(&self, id: i64) {} }
    }

    #[test]
    fn test_accepts_full_form() {
        let attr = quote! { GET, "/users/{id}", requirements(id = "\\d+"), name = "users.show" };
        assert!(expand(attr, item()).is_ok());
        assert!(expand(quote! { "post", "/users" }, item()).is_ok());
    }

    #[test]
    fn test_rejects_bad_routes() {
        assert!(expand(quote! { FETCH, "/users" }, item()).is_err());
        assert!(expand(quote! { GET, "users" }, item()).is_err());
        assert!(expand(quote! { GET, "/users/{id" }, item()).is_err());
        assert!(expand(quote! { GET, "/a/{x}/{x}" }, item()).is_err());
        assert!(expand(quote! { GET, "/users", requirements(id = "\\d+") }, item()).is_err());
        assert!(expand(quote! { GET, "/users", version = "2" }, item()).is_err());
    }
}
