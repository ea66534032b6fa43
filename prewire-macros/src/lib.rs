//! Marker attributes for prewire
//!
//! The attributes do not generate code. They check their arguments at
//! compile time, strip the parameter-level hints (`#[default(..)]`,
//! `#[env(..)]`, `#[inject(..)]`) that rustc would otherwise reject, and pass
//! the item through. The prewire source analyzer reads them from the source.
//!
//! ```rust,ignore
//! use prewire::{constructor, middleware, route, route_prefix};
//!
//! #[route_prefix("/users")]
//! pub struct UserController { repo: Arc<UserRepository> }
//!
//! impl UserController {
//!     #[constructor]
//!     pub fn new(repo: Arc<UserRepository>, #[env("PAGE_SIZE")] page: i64) -> Self { .. }
//!
//!     #[route(GET, "/{id}", requirements(id = "\\d+"), name = "users.show")]
//!     pub fn show(&self, id: i64) -> Response { .. }
//! }
//!
//! #[middleware(priority = 10)]
//! pub struct Authenticate;
//! ```

use proc_macro::TokenStream;

mod hints;
mod markers;
mod route;

fn expand(result: syn::Result<proc_macro2::TokenStream>) -> TokenStream {
    result.unwrap_or_else(|err| err.to_compile_error()).into()
}

/// Mark a method as an HTTP route target
///
/// `#[route(METHOD, "/path/{param}", requirements(param = "regex"), name = "route.name")]`
#[proc_macro_attribute]
pub fn route(attr: TokenStream, input: TokenStream) -> TokenStream {
    expand(route::expand(attr.into(), input.into()))
}

/// Prefix every route of a type: `#[route_prefix("/admin")]`
#[proc_macro_attribute]
pub fn route_prefix(attr: TokenStream, input: TokenStream) -> TokenStream {
    expand(markers::route_prefix(attr.into(), input.into()))
}

/// Mark a type as middleware: `#[middleware(priority = 10)]`
///
/// Higher priorities run first; the default priority is 0.
#[proc_macro_attribute]
pub fn middleware(attr: TokenStream, input: TokenStream) -> TokenStream {
    expand(markers::middleware(attr.into(), input.into()))
}

/// Mark a method as an event listener
///
/// The event type is the first parameter's type unless given explicitly:
/// `#[listener]`, `#[listener(UserCreated)]` or `#[listener(event = "UserCreated")]`.
#[proc_macro_attribute]
pub fn listener(attr: TokenStream, input: TokenStream) -> TokenStream {
    expand(markers::listener(attr.into(), input.into()))
}

/// Service options of a type: `#[service]`, `#[service(singleton)]` or `#[service(transient)]`
#[proc_macro_attribute]
pub fn service(attr: TokenStream, input: TokenStream) -> TokenStream {
    expand(markers::service(attr.into(), input.into()))
}

/// Mark the associated function that constructs the type
///
/// Needed when the constructor is not called `new` or when its parameters
/// carry hints.
#[proc_macro_attribute]
pub fn constructor(attr: TokenStream, input: TokenStream) -> TokenStream {
    expand(markers::constructor(attr.into(), input.into()))
}
