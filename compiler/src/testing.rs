//! Descriptor builders for tests
//!
//! Available to this crate's unit tests and, with the `testing` feature, to
//! downstream crates that want to drive the compiler with a
//! [`StaticAnalyzer`](crate::metadata::StaticAnalyzer).
//!
//! ```rust,ignore
//! let controller = ClassBuilder::concrete("UserController")
//!     .route(HttpMethod::Get, "/users/{id}", "show", |m| m.param(int("id")))
//!     .build();
//! ```

use crate::metadata::{
    Annotation, ClassDescriptor, ClassKind, DefaultValue, HttpMethod, Literal, MethodDescriptor,
    ParamType, Parameter, PrimitiveKind,
};

/// Fluent builder for [`ClassDescriptor`]
pub struct ClassBuilder {
    class: ClassDescriptor,
}

impl ClassBuilder {
    pub fn new(name: &str, kind: ClassKind) -> Self {
        Self {
            class: ClassDescriptor::new(name, kind),
        }
    }

    pub fn concrete(name: &str) -> Self {
        Self::new(name, ClassKind::Concrete)
    }

    pub fn implements(mut self, capability: &str) -> Self {
        self.class.capabilities.push(capability.to_string());
        self
    }

    pub fn parent(mut self, parent: &str) -> Self {
        self.class.parents.push(parent.to_string());
        self
    }

    pub fn annotate(mut self, annotation: Annotation) -> Self {
        self.class.annotations.push(annotation);
        self
    }

    /// Append a constructor parameter
    pub fn param(mut self, param: Parameter) -> Self {
        self.class.constructor.push(param);
        self
    }

    pub fn method(mut self, method: MethodDescriptor) -> Self {
        self.class.methods.push(method);
        self
    }

    /// Add an instance method carrying a route annotation
    pub fn route(
        self,
        method: HttpMethod,
        path: &str,
        name: &str,
        configure: impl FnOnce(MethodBuilder) -> MethodBuilder,
    ) -> Self {
        let built = configure(MethodBuilder::new(name).annotate(Annotation::Route {
            method,
            path: path.to_string(),
            requirements: Vec::new(),
            name: None,
        }));
        self.method(built.build())
    }

    pub fn build(self) -> ClassDescriptor {
        self.class
    }
}

/// Fluent builder for [`MethodDescriptor`]
pub struct MethodBuilder {
    method: MethodDescriptor,
}

impl MethodBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            method: MethodDescriptor::new(name),
        }
    }

    pub fn param(mut self, param: Parameter) -> Self {
        self.method.params.push(param);
        self
    }

    pub fn static_fn(mut self) -> Self {
        self.method.is_static = true;
        self
    }

    pub fn annotate(mut self, annotation: Annotation) -> Self {
        self.method.annotations.push(annotation);
        self
    }

    /// Add a requirement to the route annotation of this method
    pub fn requirement(mut self, param: &str, pattern: &str) -> Self {
        for annotation in &mut self.method.annotations {
            if let Annotation::Route { requirements, .. } = annotation {
                requirements.push((param.to_string(), pattern.to_string()));
            }
        }
        self
    }

    pub fn build(self) -> MethodDescriptor {
        self.method
    }
}

pub fn typed(name: &str, ty: &str) -> Parameter {
    Parameter::new(name, ParamType::Named(ty.to_string()))
}

pub fn nullable(name: &str, ty: &str) -> Parameter {
    let mut param = typed(name, ty);
    param.nullable = true;
    param
}

pub fn int(name: &str) -> Parameter {
    Parameter::new(name, ParamType::Primitive(PrimitiveKind::Int))
}

pub fn string(name: &str) -> Parameter {
    Parameter::new(name, ParamType::Primitive(PrimitiveKind::String))
}

pub fn untyped(name: &str) -> Parameter {
    Parameter::new(name, ParamType::Untyped)
}

pub fn with_default(mut param: Parameter, value: Literal) -> Parameter {
    param.default = Some(DefaultValue::Literal(value));
    param
}
