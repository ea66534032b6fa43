//! Runtime over compiled artifacts
//!
//! The runtime makes no wiring decisions. It loads the artifacts written by
//! the emitter, checks them against the manifest and serves the contract
//! operations: `get`/`has` on the [`Container`], `dispatch`/`match_route` on
//! the [`Router`], the ordered [`MiddlewareChain`] and the
//! [`EventDispatcher`]. Application code is reached through the function
//! pointers collected in the [`Registry`].

mod artifacts;
mod container;
mod events;
mod kernel;
mod middleware;
mod registry;
pub mod response;
mod router;
mod value;

pub use artifacts::LoadedArtifacts;
pub use container::Container;
pub use events::{Event, EventDispatcher};
pub use kernel::Kernel;
pub use middleware::{MiddlewareChain, Next};
pub use registry::{
    Callable, ConstantFn, ConstructorFn, HandlerFn, ListenerFn, MiddlewareFn, Registry,
    RegistryEntry,
};
pub use response::{Request, Response};
pub use router::Router;
pub use value::{Args, Closure, ClosureFn, Instance, Value};
