//! Functions behind the names in the compiled artifacts
//!
//! Artifacts refer to code by name: a class for constructors and middleware,
//! `Class::method` for factories, route handlers and listeners, and plain
//! names for constants and closure literals. The registry maps those names
//! to function pointers. Entries are collected at link time with
//! `inventory` or registered explicitly:
//!
//! ```rust,ignore
//! inventory::submit! {
//!     RegistryEntry::constructor("Mailer", |args| Ok(Arc::new(Mailer::new(args.str("dsn")?))))
//! }
//! ```

use super::events::Event;
use super::middleware::Next;
use super::response::{Request, Response};
use super::value::{Args, ClosureFn, Instance, Value};
use crate::error::RuntimeError;
use std::collections::HashMap;

/// Builds an instance from named arguments; used for constructors and factories
pub type ConstructorFn = fn(&Args) -> Result<Instance, RuntimeError>;

/// Route handler; `None` instance for static targets
pub type HandlerFn = fn(Option<&Instance>, &Request, &Args) -> Result<Response, RuntimeError>;

/// Event listener; `None` instance for static listeners
pub type ListenerFn = fn(Option<&Instance>, &mut dyn Event) -> Result<(), RuntimeError>;

pub type MiddlewareFn = fn(&Instance, Request, Next<'_>) -> Result<Response, RuntimeError>;

pub type ConstantFn = fn() -> Value;

#[derive(Clone, Copy)]
pub enum Callable {
    Constructor(ConstructorFn),
    Factory(ConstructorFn),
    Handler(HandlerFn),
    Listener(ListenerFn),
    Middleware(MiddlewareFn),
    Constant(ConstantFn),
    Closure(ClosureFn),
}

/// Inventory entry for a registry function
pub struct RegistryEntry {
    pub name: &'static str,
    pub callable: Callable,
}

impl RegistryEntry {
    pub const fn constructor(class: &'static str, construct: ConstructorFn) -> Self {
        Self {
            name: class,
            callable: Callable::Constructor(construct),
        }
    }

    pub const fn factory(target: &'static str, construct: ConstructorFn) -> Self {
        Self {
            name: target,
            callable: Callable::Factory(construct),
        }
    }

    pub const fn handler(target: &'static str, handle: HandlerFn) -> Self {
        Self {
            name: target,
            callable: Callable::Handler(handle),
        }
    }

    pub const fn listener(target: &'static str, listen: ListenerFn) -> Self {
        Self {
            name: target,
            callable: Callable::Listener(listen),
        }
    }

    pub const fn middleware(class: &'static str, handle: MiddlewareFn) -> Self {
        Self {
            name: class,
            callable: Callable::Middleware(handle),
        }
    }

    pub const fn constant(name: &'static str, value: ConstantFn) -> Self {
        Self {
            name,
            callable: Callable::Constant(value),
        }
    }

    pub const fn closure(source: &'static str, body: ClosureFn) -> Self {
        Self {
            name: source,
            callable: Callable::Closure(body),
        }
    }
}

inventory::collect!(RegistryEntry);

#[derive(Default, Clone)]
pub struct Registry {
    constructors: HashMap<String, ConstructorFn>,
    factories: HashMap<String, ConstructorFn>,
    handlers: HashMap<String, HandlerFn>,
    listeners: HashMap<String, ListenerFn>,
    middleware: HashMap<String, MiddlewareFn>,
    constants: HashMap<String, ConstantFn>,
    closures: HashMap<String, ClosureFn>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with every linked [`RegistryEntry`]
    pub fn from_inventory() -> Self {
        let mut registry = Self::new();
        for entry in inventory::iter::<RegistryEntry> {
            registry.register(entry.name, entry.callable);
        }
        tracing::debug!(
            constructors = registry.constructors.len(),
            handlers = registry.handlers.len(),
            "Registry collected"
        );
        registry
    }

    /// Register a function; a later registration under the same name wins
    pub fn register(&mut self, name: impl Into<String>, callable: Callable) -> &mut Self {
        let name = name.into();
        match callable {
            Callable::Constructor(f) => {
                self.constructors.insert(name, f);
            }
            Callable::Factory(f) => {
                self.factories.insert(name, f);
            }
            Callable::Handler(f) => {
                self.handlers.insert(name, f);
            }
            Callable::Listener(f) => {
                self.listeners.insert(name, f);
            }
            Callable::Middleware(f) => {
                self.middleware.insert(name, f);
            }
            Callable::Constant(f) => {
                self.constants.insert(name, f);
            }
            Callable::Closure(f) => {
                self.closures.insert(name, f);
            }
        }
        self
    }

    pub fn constructor(&self, class: &str) -> Result<ConstructorFn, RuntimeError> {
        self.constructors
            .get(class)
            .copied()
            .ok_or_else(|| RuntimeError::MissingConstructor {
                class: class.to_string(),
            })
    }

    pub fn factory(&self, target: &str) -> Result<ConstructorFn, RuntimeError> {
        self.factories
            .get(target)
            .copied()
            .ok_or_else(|| missing_callable(target))
    }

    pub fn handler(&self, target: &str) -> Result<HandlerFn, RuntimeError> {
        self.handlers
            .get(target)
            .copied()
            .ok_or_else(|| missing_callable(target))
    }

    pub fn listener(&self, target: &str) -> Result<ListenerFn, RuntimeError> {
        self.listeners
            .get(target)
            .copied()
            .ok_or_else(|| missing_callable(target))
    }

    pub fn middleware(&self, class: &str) -> Result<MiddlewareFn, RuntimeError> {
        self.middleware
            .get(class)
            .copied()
            .ok_or_else(|| missing_callable(class))
    }

    pub fn constant(&self, name: &str) -> Result<Value, RuntimeError> {
        self.constants
            .get(name)
            .map(|value| value())
            .ok_or_else(|| RuntimeError::MissingConstant {
                name: name.to_string(),
            })
    }

    pub fn closure(&self, source: &str) -> Result<ClosureFn, RuntimeError> {
        self.closures
            .get(source)
            .copied()
            .ok_or_else(|| missing_callable(source))
    }
}

fn missing_callable(target: &str) -> RuntimeError {
    RuntimeError::MissingCallable {
        target: target.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct Clock;

    inventory::submit! {
        RegistryEntry::constant("registry_tests::ANSWER", || Value::Int(42))
    }

    #[test]
    fn test_explicit_registration() {
        let mut registry = Registry::new();
        registry
            .register("Clock", Callable::Constructor(|_| Ok(Arc::new(Clock))))
            .register("Clock::MAX", Callable::Constant(|| Value::Int(60)));

        assert!(registry.constructor("Clock").is_ok());
        assert!(matches!(registry.constant("Clock::MAX"), Ok(Value::Int(60))));
        assert!(matches!(
            registry.constructor("Calendar"),
            Err(RuntimeError::MissingConstructor { class }) if class == "Calendar"
        ));
        assert!(matches!(
            registry.handler("Clock::now"),
            Err(RuntimeError::MissingCallable { .. })
        ));
    }

    #[test]
    fn test_inventory_entries_are_collected() {
        let registry = Registry::from_inventory();
        assert!(matches!(
            registry.constant("registry_tests::ANSWER"),
            Ok(Value::Int(42))
        ));
    }
}
