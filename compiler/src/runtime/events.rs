use super::container::Container;
use super::registry::Registry;
use crate::error::RuntimeError;
use crate::events::ListenerTable;
use std::any::Any;
use std::sync::Arc;

/// An event passed to listeners
///
/// Events whose type carries the stoppable capability override
/// [`is_propagation_stopped`](Event::is_propagation_stopped); the dispatcher
/// checks it before every listener of such an event.
pub trait Event: Any {
    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn is_propagation_stopped(&self) -> bool {
        false
    }
}

/// Dispatches events through the compiled listener table
pub struct EventDispatcher {
    table: ListenerTable,
    container: Arc<Container>,
    registry: Arc<Registry>,
}

impl EventDispatcher {
    pub fn new(table: ListenerTable, container: Arc<Container>, registry: Arc<Registry>) -> Self {
        Self {
            table,
            container,
            registry,
        }
    }

    pub fn table(&self) -> &ListenerTable {
        &self.table
    }

    pub fn has_listeners(&self, event: &str) -> bool {
        self.table.group(event).is_some()
    }

    /// Invoke the listeners of `event_type` in order; returns how many ran
    pub fn dispatch(&self, event_type: &str, event: &mut dyn Event) -> Result<usize, RuntimeError> {
        let Some(group) = self.table.group(event_type) else {
            return Ok(0);
        };

        let mut invoked = 0;
        for listener in &group.listeners {
            if group.stoppable && event.is_propagation_stopped() {
                tracing::debug!(event = event_type, invoked, "Propagation stopped");
                break;
            }
            let call = self.registry.listener(&listener.target())?;
            if listener.is_static {
                call(None, event)?;
            } else {
                let instance = self.container.get(&listener.class)?;
                call(Some(&instance), event)?;
            }
            invoked += 1;
        }
        Ok(invoked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompilerConfig;
    use crate::container::{ConstructionPlan, ContainerPlan, Origin};
    use crate::events::{ListenerEntry, ListenerGroup};
    use crate::runtime::registry::Callable;

    struct OrderPlaced {
        stopped: bool,
        seen: Vec<&'static str>,
    }

    impl Event for OrderPlaced {
        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }

        fn is_propagation_stopped(&self) -> bool {
            self.stopped
        }
    }

    struct Audit;

    fn order(event: &mut dyn Event) -> &mut OrderPlaced {
        event
            .as_any_mut()
            .downcast_mut::<OrderPlaced>()
            .expect("OrderPlaced")
    }

    fn entry(class: &str, method: &str, is_static: bool) -> ListenerEntry {
        ListenerEntry {
            event: "OrderPlaced".into(),
            class: class.into(),
            method: method.into(),
            is_static,
        }
    }

    fn dispatcher(stoppable: bool) -> EventDispatcher {
        let mut registry = Registry::new();
        registry
            .register("Audit", Callable::Constructor(|_| Ok(Arc::new(Audit))))
            .register(
                "Audit::record",
                Callable::Listener(|instance, event| {
                    assert!(instance.is_some());
                    order(event).seen.push("audit");
                    Ok(())
                }),
            )
            .register(
                "Fraud::check",
                Callable::Listener(|instance, event| {
                    assert!(instance.is_none());
                    let order = order(event);
                    order.seen.push("fraud");
                    order.stopped = true;
                    Ok(())
                }),
            )
            .register(
                "Mail::send",
                Callable::Listener(|_, event| {
                    order(event).seen.push("mail");
                    Ok(())
                }),
            );
        let registry = Arc::new(registry);

        let container = Container::new(
            ContainerPlan {
                services: vec![ConstructionPlan {
                    id: "Audit".into(),
                    class: "Audit".into(),
                    factory: None,
                    singleton: true,
                    origin: Origin::Discovered,
                    args: Vec::new(),
                }],
                aliases: Vec::new(),
            },
            CompilerConfig::default(),
            registry.clone(),
        );

        let table = ListenerTable {
            groups: vec![ListenerGroup {
                event: "OrderPlaced".into(),
                stoppable,
                listeners: vec![
                    entry("Audit", "record", false),
                    entry("Fraud", "check", true),
                    entry("Mail", "send", true),
                ],
            }],
        };
        EventDispatcher::new(table, container, registry)
    }

    #[test]
    fn test_stoppable_event_short_circuits() {
        let mut event = OrderPlaced {
            stopped: false,
            seen: Vec::new(),
        };
        let invoked = dispatcher(true).dispatch("OrderPlaced", &mut event).unwrap();

        assert_eq!(invoked, 2);
        assert_eq!(event.seen, vec!["audit", "fraud"]);
    }

    #[test]
    fn test_stopped_before_first_listener_invokes_nothing() {
        let mut event = OrderPlaced {
            stopped: true,
            seen: Vec::new(),
        };
        let invoked = dispatcher(true).dispatch("OrderPlaced", &mut event).unwrap();

        assert_eq!(invoked, 0);
        assert!(event.seen.is_empty());
    }

    #[test]
    fn test_non_stoppable_event_runs_every_listener() {
        let mut event = OrderPlaced {
            stopped: false,
            seen: Vec::new(),
        };
        let invoked = dispatcher(false).dispatch("OrderPlaced", &mut event).unwrap();

        assert_eq!(invoked, 3);
        assert_eq!(event.seen, vec!["audit", "fraud", "mail"]);
    }

    #[test]
    fn test_unknown_event_is_a_no_op() {
        let mut event = OrderPlaced {
            stopped: false,
            seen: Vec::new(),
        };
        assert_eq!(dispatcher(true).dispatch("Shipped", &mut event).unwrap(), 0);
    }
}
