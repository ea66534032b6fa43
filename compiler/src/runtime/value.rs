use crate::container::ArrayKey;
use crate::error::RuntimeError;
use crate::metadata::Literal;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Type-erased service instance
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Registered closure body; receives the closure's bound arguments
pub type ClosureFn = fn(&Args) -> Result<Value, RuntimeError>;

/// A closure literal with its arguments already evaluated
#[derive(Clone)]
pub struct Closure {
    body: ClosureFn,
    args: Args,
}

impl Closure {
    pub fn new(body: ClosureFn, args: Args) -> Self {
        Self { body, args }
    }

    pub fn call(&self) -> Result<Value, RuntimeError> {
        (self.body)(&self.args)
    }
}

/// Runtime value of a constructor, factory or handler argument
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(Vec<(ArrayKey, Value)>),
    Service(Instance),
    Closure(Closure),
}

impl Value {
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Service(_) => "service",
            Value::Closure(_) => "closure",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<&Literal> for Value {
    fn from(literal: &Literal) -> Self {
        match literal {
            Literal::Null => Value::Null,
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Int(i) => Value::Int(*i),
            Literal::Float(f) => Value::Float(*f),
            Literal::Str(s) => Value::Str(s.clone()),
            Literal::List(items) => Value::List(items.iter().map(Value::from).collect()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => write!(f, "Bool({})", b),
            Value::Int(i) => write!(f, "Int({})", i),
            Value::Float(x) => write!(f, "Float({})", x),
            Value::Str(s) => write!(f, "Str({:?})", s),
            Value::List(items) => f.debug_tuple("List").field(items).finish(),
            Value::Map(entries) => f.debug_tuple("Map").field(entries).finish(),
            Value::Service(_) => f.write_str("Service(..)"),
            Value::Closure(_) => f.write_str("Closure(..)"),
        }
    }
}

/// Arguments addressed by parameter name
///
/// A parameter that was skipped at compile time is simply absent; the
/// `optional_*` accessors read it as `None`.
#[derive(Debug, Clone, Default)]
pub struct Args {
    values: Vec<(String, Value)>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.values.push((name.into(), value));
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(name, _)| name.as_str())
    }

    fn require(&self, name: &str) -> Result<&Value, RuntimeError> {
        self.get(name).ok_or_else(|| RuntimeError::MissingArgument {
            name: name.to_string(),
        })
    }

    fn mismatch(name: &str, expected: &'static str) -> RuntimeError {
        RuntimeError::ArgumentType {
            name: name.to_string(),
            expected,
        }
    }

    pub fn int(&self, name: &str) -> Result<i64, RuntimeError> {
        match self.require(name)? {
            Value::Int(i) => Ok(*i),
            _ => Err(Self::mismatch(name, "int")),
        }
    }

    pub fn float(&self, name: &str) -> Result<f64, RuntimeError> {
        match self.require(name)? {
            Value::Float(f) => Ok(*f),
            Value::Int(i) => Ok(*i as f64),
            _ => Err(Self::mismatch(name, "float")),
        }
    }

    pub fn bool(&self, name: &str) -> Result<bool, RuntimeError> {
        match self.require(name)? {
            Value::Bool(b) => Ok(*b),
            _ => Err(Self::mismatch(name, "bool")),
        }
    }

    pub fn str(&self, name: &str) -> Result<&str, RuntimeError> {
        match self.require(name)? {
            Value::Str(s) => Ok(s),
            _ => Err(Self::mismatch(name, "string")),
        }
    }

    pub fn optional_str(&self, name: &str) -> Result<Option<&str>, RuntimeError> {
        match self.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Str(s)) => Ok(Some(s)),
            Some(_) => Err(Self::mismatch(name, "string")),
        }
    }

    pub fn list(&self, name: &str) -> Result<&[Value], RuntimeError> {
        match self.require(name)? {
            Value::List(items) => Ok(items),
            _ => Err(Self::mismatch(name, "list")),
        }
    }

    pub fn closure(&self, name: &str) -> Result<&Closure, RuntimeError> {
        match self.require(name)? {
            Value::Closure(closure) => Ok(closure),
            _ => Err(Self::mismatch(name, "closure")),
        }
    }

    /// Downcast a service argument
    pub fn service<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>, RuntimeError> {
        self.optional_service(name)?
            .ok_or_else(|| RuntimeError::MissingArgument {
                name: name.to_string(),
            })
    }

    pub fn optional_service<T: Any + Send + Sync>(
        &self,
        name: &str,
    ) -> Result<Option<Arc<T>>, RuntimeError> {
        match self.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Service(instance)) => instance
                .clone()
                .downcast::<T>()
                .map(Some)
                .map_err(|_| Self::mismatch(name, std::any::type_name::<T>())),
            Some(_) => Err(Self::mismatch(name, std::any::type_name::<T>())),
        }
    }
}
