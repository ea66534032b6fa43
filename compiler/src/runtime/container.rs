//! Container served from a compiled [`ContainerPlan`]
//!
//! Every construction decision was made at compile time; at runtime the
//! container only evaluates arguments and calls the registered constructor
//! or factory. Singletons are memoised per identifier.
//!
//! ```rust,ignore
//! let container = Container::new(plan, config, registry);
//! let mailer: Arc<Mailer> = container.get_as("Mailer")?;
//! ```

use super::registry::Registry;
use super::value::{Args, Closure, Instance, Value};
use crate::config::{env_optional, CompilerConfig};
use crate::container::{Argument, ArrayKey, Builtin, ConstructionPlan, ContainerPlan, Origin};
use crate::error::RuntimeError;
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, Weak};

pub struct Container {
    plan: ContainerPlan,
    config: Arc<CompilerConfig>,
    registry: Arc<Registry>,
    singletons: RwLock<HashMap<String, Instance>>,
    this: Weak<Container>,
}

impl Container {
    pub fn new(plan: ContainerPlan, config: CompilerConfig, registry: Arc<Registry>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            plan,
            config: Arc::new(config),
            registry,
            singletons: RwLock::new(HashMap::new()),
            this: this.clone(),
        })
    }

    pub fn plan(&self) -> &ContainerPlan {
        &self.plan
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Whether `id` is a constructible identifier or an alias of one
    pub fn has(&self, id: &str) -> bool {
        self.plan.has(id)
    }

    /// Resolve an identifier
    ///
    /// Aliases share the singleton of their target.
    pub fn get(&self, id: &str) -> Result<Instance, RuntimeError> {
        let plan = self
            .plan
            .resolve(id)
            .ok_or_else(|| RuntimeError::ServiceNotFound { id: id.to_string() })?;

        // never memoised: a cached handle to itself would keep the container alive
        if plan.origin == Origin::Builtin(Builtin::Container) {
            return self.construct(plan);
        }

        if plan.singleton {
            if let Some(instance) = self.cached(&plan.id) {
                return Ok(instance);
            }
        }

        let instance = self.construct(plan)?;
        if plan.singleton {
            if let Ok(mut singletons) = self.singletons.write() {
                // a concurrent resolution may have won; keep the first instance
                let instance = singletons
                    .entry(plan.id.clone())
                    .or_insert(instance)
                    .clone();
                return Ok(instance);
            }
        }
        Ok(instance)
    }

    /// Resolve and downcast
    pub fn get_as<T: Any + Send + Sync>(&self, id: &str) -> Result<Arc<T>, RuntimeError> {
        self.get(id)?
            .downcast::<T>()
            .map_err(|_| RuntimeError::ArgumentType {
                name: id.to_string(),
                expected: std::any::type_name::<T>(),
            })
    }

    fn cached(&self, id: &str) -> Option<Instance> {
        self.singletons.read().ok()?.get(id).cloned()
    }

    fn construct(&self, plan: &ConstructionPlan) -> Result<Instance, RuntimeError> {
        match plan.origin {
            Origin::Builtin(Builtin::Container) => {
                let this: Arc<Container> = self
                    .this
                    .upgrade()
                    .ok_or_else(|| RuntimeError::ServiceNotFound {
                        id: plan.id.clone(),
                    })?;
                return Ok(this);
            }
            Origin::Builtin(Builtin::Config) => return Ok(self.config.clone()),
            Origin::Discovered | Origin::Manual => {}
        }

        let args = self.arguments(plan)?;
        let construct = match &plan.factory {
            Some(factory) => self
                .registry
                .factory(&format!("{}::{}", factory.class, factory.method))?,
            None => self.registry.constructor(&plan.class)?,
        };
        tracing::debug!(id = %plan.id, class = %plan.class, "Constructing service");
        construct(&args)
    }

    fn arguments(&self, plan: &ConstructionPlan) -> Result<Args, RuntimeError> {
        let mut args = Args::new();
        for arg in &plan.args {
            args.insert(arg.name.clone(), self.evaluate(&arg.value)?);
        }
        Ok(args)
    }

    /// Evaluate a compiled argument
    pub fn evaluate(&self, argument: &Argument) -> Result<Value, RuntimeError> {
        match argument {
            Argument::Literal { value } => Ok(Value::from(value)),
            Argument::Constant { reference } => self.registry.constant(reference),
            Argument::Env { key, fallback } => match env_optional::<String>(key) {
                Some(value) => Ok(Value::Str(value)),
                None => match fallback {
                    Some(fallback) => self.evaluate(fallback),
                    None => Err(RuntimeError::MissingEnv { key: key.clone() }),
                },
            },
            Argument::Service { id } => self.get(id).map(Value::Service),
            Argument::Array { entries } => {
                if entries.iter().all(|e| e.key.is_none()) {
                    let items = entries
                        .iter()
                        .map(|e| self.evaluate(&e.value))
                        .collect::<Result<Vec<_>, _>>()?;
                    return Ok(Value::List(items));
                }
                let mut map = Vec::with_capacity(entries.len());
                for (position, entry) in entries.iter().enumerate() {
                    let key = entry
                        .key
                        .clone()
                        .unwrap_or(ArrayKey::Index(position as i64));
                    map.push((key, self.evaluate(&entry.value)?));
                }
                Ok(Value::Map(map))
            }
            Argument::Closure { source, args } => {
                let body = self.registry.closure(source)?;
                let mut bound = Args::new();
                for arg in args {
                    bound.insert(arg.name.clone(), self.evaluate(&arg.value)?);
                }
                Ok(Value::Closure(Closure::new(body, bound)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{ArrayArgument, FactoryRef, NamedArgument};
    use crate::metadata::Literal;
    use crate::runtime::registry::Callable;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Mailer {
        dsn: String,
        retries: i64,
    }

    struct Newsletter {
        mailer: Arc<Mailer>,
        logger: Option<Arc<Mailer>>,
    }

    static BUILT: AtomicUsize = AtomicUsize::new(0);

    fn registry() -> Arc<Registry> {
        let mut registry = Registry::new();
        registry
            .register(
                "Mailer",
                Callable::Constructor(|args| {
                    BUILT.fetch_add(1, Ordering::SeqCst);
                    Ok(Arc::new(Mailer {
                        dsn: args.str("dsn")?.to_string(),
                        retries: args.int("retries")?,
                    }))
                }),
            )
            .register(
                "Newsletter::create",
                Callable::Factory(|args| {
                    Ok(Arc::new(Newsletter {
                        mailer: args.service("mailer")?,
                        logger: args.optional_service("logger")?,
                    }))
                }),
            )
            .register("Mailer::RETRIES", Callable::Constant(|| Value::Int(3)));
        Arc::new(registry)
    }

    fn plan(
        id: &str,
        class: &str,
        singleton: bool,
        args: Vec<(&str, Argument)>,
    ) -> ConstructionPlan {
        ConstructionPlan {
            id: id.into(),
            class: class.into(),
            factory: None,
            singleton,
            origin: Origin::Discovered,
            args: args
                .into_iter()
                .map(|(name, value)| NamedArgument {
                    name: name.into(),
                    value,
                })
                .collect(),
        }
    }

    fn container(singleton: bool) -> Arc<Container> {
        let mailer = plan(
            "Mailer",
            "Mailer",
            singleton,
            vec![
                (
                    "dsn",
                    Argument::Env {
                        key: "PREWIRE_TEST_UNSET_DSN".into(),
                        fallback: Some(Box::new(Argument::Literal {
                            value: Literal::Str("smtp://localhost".into()),
                        })),
                    },
                ),
                (
                    "retries",
                    Argument::Constant {
                        reference: "Mailer::RETRIES".into(),
                    },
                ),
            ],
        );
        let mut newsletter = plan(
            "Newsletter",
            "Newsletter",
            true,
            vec![(
                "mailer",
                Argument::Service {
                    id: "Mailer".into(),
                },
            )],
        );
        newsletter.factory = Some(FactoryRef {
            class: "Newsletter".into(),
            method: "create".into(),
        });
        let mut builtin = plan("prewire::Container", "prewire::Container", true, vec![]);
        builtin.origin = Origin::Builtin(Builtin::Container);
        let mut config = plan("prewire::Config", "prewire::Config", true, vec![]);
        config.origin = Origin::Builtin(Builtin::Config);

        Container::new(
            ContainerPlan {
                services: vec![mailer, newsletter, builtin, config],
                aliases: vec![("Transport".into(), "Mailer".into())],
            },
            CompilerConfig::default(),
            registry(),
        )
    }

    #[test]
    fn test_factory_with_skipped_parameter() {
        let container = container(true);
        let newsletter: Arc<Newsletter> = container.get_as("Newsletter").unwrap();

        assert_eq!(newsletter.mailer.dsn, "smtp://localhost");
        assert_eq!(newsletter.mailer.retries, 3);
        assert!(newsletter.logger.is_none());
    }

    #[test]
    fn test_singletons_are_shared_with_aliases() {
        let container = container(true);
        let a: Arc<Mailer> = container.get_as("Mailer").unwrap();
        let b: Arc<Mailer> = container.get_as("Transport").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_non_singletons_are_rebuilt() {
        let container = container(false);
        let before = BUILT.load(Ordering::SeqCst);
        let a: Arc<Mailer> = container.get_as("Mailer").unwrap();
        let b: Arc<Mailer> = container.get_as("Mailer").unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(BUILT.load(Ordering::SeqCst) >= before + 2);
    }

    #[test]
    fn test_builtins_and_missing_services() {
        let container = container(true);
        let this: Arc<Container> = container.get_as("prewire::Container").unwrap();
        assert!(Arc::ptr_eq(&this, &container));
        assert!(container.get_as::<CompilerConfig>("prewire::Config").is_ok());

        assert!(!container.has("Queue"));
        assert!(matches!(
            container.get("Queue"),
            Err(RuntimeError::ServiceNotFound { id }) if id == "Queue"
        ));
    }

    #[test]
    fn test_resolving_itself_does_not_keep_the_container_alive() {
        let container = container(true);
        let weak = Arc::downgrade(&container);

        let this = container.get("prewire::Container").unwrap();
        let again = container.get("prewire::Container").unwrap();
        drop(this);
        drop(again);
        drop(container);

        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_keyed_arrays() {
        let container = container(true);
        let value = container
            .evaluate(&Argument::Array {
                entries: vec![
                    ArrayArgument {
                        key: Some(ArrayKey::Name("host".into())),
                        value: Argument::Literal {
                            value: Literal::Str("db".into()),
                        },
                    },
                    ArrayArgument {
                        key: None,
                        value: Argument::Literal {
                            value: Literal::Int(5432),
                        },
                    },
                ],
            })
            .unwrap();

        match value {
            Value::Map(entries) => {
                assert_eq!(entries[0].0, ArrayKey::Name("host".into()));
                assert_eq!(entries[1].0, ArrayKey::Index(1));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
