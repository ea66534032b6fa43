//! Rust source analyzer
//!
//! Walks the project's source directory, parses every `.rs` file with `syn`
//! and turns structs, traits and their impl blocks into [`ClassDescriptor`]s.
//!
//! The mapping onto the class model:
//! - a non-generic `struct` is a concrete class, a generic one is abstract
//! - a struct implementing `Error` (or deriving it) is a throwable type
//! - a `trait` is an interface; supertraits form its capability closure
//! - `impl Trait for S` adds `Trait` (and its supertraits) to `S`'s capabilities
//! - the associated fn marked `#[constructor]`, or else `new`, is the constructor
//! - `#[route]`, `#[route_prefix]`, `#[middleware]`, `#[listener]` and
//!   `#[service]` attributes become annotations
//! - `#[default(..)]`, `#[env(..)]` and `#[inject(..)]` on constructor
//!   parameters become defaults and wiring hints
//!
//! Identifiers are the final path segment of a type name.

use super::{
    parse_type, Analyzer, Annotation, ClassDescriptor, ClassKind, DefaultValue, HttpMethod,
    Literal, MethodDescriptor, ParamHint, Parameter,
};
use crate::error::CompileError;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use syn::parse::ParseStream;
use syn::{
    Attribute, Expr, FnArg, ImplItem, Item, ItemImpl, Lit, LitStr, Pat, ReturnType, Token, Type,
    UnOp,
};
use walkdir::WalkDir;

/// Analyzer over the Rust sources of a project
#[derive(Debug, Clone)]
pub struct SourceAnalyzer {
    source_dirs: Vec<PathBuf>,
}

impl SourceAnalyzer {
    /// Analyze `src/` under the project root
    pub fn new() -> Self {
        Self {
            source_dirs: vec![PathBuf::from("src")],
        }
    }

    /// Analyze the given directories (relative to the project root) instead
    pub fn with_source_dirs(dirs: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        Self {
            source_dirs: dirs.into_iter().map(Into::into).collect(),
        }
    }
}

impl Default for SourceAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl Analyzer for SourceAnalyzer {
    type Classes = ScannedClasses;

    fn used_classes(
        self,
        project_root: &Path,
        exclude: &[PathBuf],
    ) -> Result<Self::Classes, CompileError> {
        let mut files = Vec::new();
        for dir in &self.source_dirs {
            let dir = project_root.join(dir);
            if !dir.is_dir() {
                return Err(CompileError::source(&dir, "source directory not found"));
            }
            for entry in WalkDir::new(&dir) {
                let entry = entry.map_err(|e| CompileError::source(&dir, e.to_string()))?;
                let path = entry.path();
                if path.extension().map(|ext| ext == "rs").unwrap_or(false)
                    && !exclude.iter().any(|ex| path.ends_with(ex) || ex == path)
                {
                    files.push(path.to_path_buf());
                }
            }
        }
        // Directory iteration order is platform dependent.
        files.sort();

        let mut index = Index::default();
        for file in &files {
            let content = fs::read_to_string(file).map_err(|e| CompileError::io(file, e))?;
            let syntax = syn::parse_file(&content)
                .map_err(|e| CompileError::source(file, e.to_string()))?;
            index
                .collect_items(&syntax.items, file)
                .map_err(|e| CompileError::source(file, e.to_string()))?;
        }

        tracing::debug!(
            files = files.len(),
            types = index.order.len(),
            "Indexed project sources"
        );

        let order = std::mem::take(&mut index.order).into_iter();
        Ok(ScannedClasses { index, order })
    }
}

/// Lazy sequence of descriptors built from an indexed source tree
pub struct ScannedClasses {
    index: Index,
    order: std::vec::IntoIter<String>,
}

impl Iterator for ScannedClasses {
    type Item = Result<ClassDescriptor, CompileError>;

    fn next(&mut self) -> Option<Self::Item> {
        let name = self.order.next()?;
        Some(Ok(self.index.describe(&name)))
    }
}

struct TraitInfo {
    supertraits: Vec<String>,
    source: PathBuf,
}

struct StructInfo {
    generic: bool,
    throwable: bool,
    annotations: Vec<Annotation>,
    source: PathBuf,
}

#[derive(Default)]
struct ImplInfo {
    traits: Vec<String>,
    constructor: Option<Vec<Parameter>>,
    explicit_constructor: bool,
    methods: Vec<MethodDescriptor>,
}

#[derive(Default)]
struct Index {
    traits: HashMap<String, TraitInfo>,
    structs: HashMap<String, StructInfo>,
    impls: HashMap<String, ImplInfo>,
    order: Vec<String>,
    seen: HashSet<String>,
}

impl Index {
    fn collect_items(&mut self, items: &[Item], file: &Path) -> syn::Result<()> {
        for item in items {
            match item {
                Item::Struct(item) => {
                    let name = item.ident.to_string();
                    if !self.seen.insert(name.clone()) {
                        continue;
                    }
                    let annotations = type_annotations(&item.attrs)?;
                    self.structs.insert(
                        name.clone(),
                        StructInfo {
                            generic: !item.generics.params.is_empty(),
                            throwable: derives_error(&item.attrs),
                            annotations,
                            source: file.to_path_buf(),
                        },
                    );
                    self.order.push(name);
                }
                Item::Trait(item) => {
                    let name = item.ident.to_string();
                    if !self.seen.insert(name.clone()) {
                        continue;
                    }
                    let supertraits = item
                        .supertraits
                        .iter()
                        .filter_map(|bound| match bound {
                            syn::TypeParamBound::Trait(tr) => {
                                tr.path.segments.last().map(|s| s.ident.to_string())
                            }
                            _ => None,
                        })
                        .collect();
                    self.traits.insert(
                        name.clone(),
                        TraitInfo {
                            supertraits,
                            source: file.to_path_buf(),
                        },
                    );
                    self.order.push(name);
                }
                Item::Impl(item) => self.collect_impl(item)?,
                Item::Mod(module) => {
                    if let Some((_, items)) = &module.content {
                        self.collect_items(items, file)?;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn collect_impl(&mut self, item: &ItemImpl) -> syn::Result<()> {
        let Some(owner) = type_ident(&item.self_ty) else {
            return Ok(());
        };
        let info = self.impls.entry(owner.clone()).or_default();

        if let Some((_, path, _)) = &item.trait_ {
            if let Some(segment) = path.segments.last() {
                info.traits.push(segment.ident.to_string());
            }
            return Ok(());
        }

        for impl_item in &item.items {
            let ImplItem::Fn(function) = impl_item else {
                continue;
            };
            let name = function.sig.ident.to_string();
            let is_static = !matches!(function.sig.inputs.first(), Some(FnArg::Receiver(_)));
            let marked = has_attr(&function.attrs, "constructor");
            let params = parameters(&function.sig.inputs, &owner)?;

            if is_static && returns_self(&function.sig.output, &owner) {
                if marked || (name == "new" && !info.explicit_constructor) {
                    info.constructor = Some(params);
                    info.explicit_constructor |= marked;
                    continue;
                }
            }

            let mut annotations = Vec::new();
            for attr in &function.attrs {
                match attr_name(attr).as_str() {
                    "route" => annotations.push(parse_route(attr)?),
                    "listener" => {
                        let event = parse_listener(attr)?.or_else(|| {
                            params
                                .first()
                                .and_then(|p| p.ty.identifier().map(str::to_string))
                        });
                        let event = event.ok_or_else(|| {
                            syn::Error::new_spanned(attr, "listener needs an event type")
                        })?;
                        annotations.push(Annotation::Listener { event });
                    }
                    _ => {}
                }
            }

            info.methods.push(MethodDescriptor {
                name,
                params,
                is_static,
                annotations,
            });
        }
        Ok(())
    }

    fn describe(&self, name: &str) -> ClassDescriptor {
        let implementation = self.impls.get(name);
        let direct: Vec<String> = implementation
            .map(|i| i.traits.clone())
            .unwrap_or_default();

        if let Some(info) = self.traits.get(name) {
            let mut class = ClassDescriptor::new(name, ClassKind::Interface);
            class.capabilities = self.capability_closure(&info.supertraits);
            class.source = Some(info.source.clone());
            return class;
        }

        let Some(info) = self.structs.get(name) else {
            return ClassDescriptor::new(name, ClassKind::Anonymous);
        };

        let throwable = info.throwable || direct.iter().any(|t| t == "Error");
        let kind = if throwable {
            ClassKind::Throwable
        } else if info.generic {
            ClassKind::Abstract
        } else {
            ClassKind::Concrete
        };

        let mut class = ClassDescriptor::new(name, kind);
        class.capabilities = self.capability_closure(&direct);
        class.annotations = info.annotations.clone();
        class.source = Some(info.source.clone());
        if let Some(implementation) = implementation {
            class.constructor = implementation.constructor.clone().unwrap_or_default();
            class.methods = implementation.methods.clone();
        }
        class
    }

    /// Direct traits followed by their supertraits, breadth first, deduplicated
    fn capability_closure(&self, direct: &[String]) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut result = Vec::new();
        let mut queue: VecDeque<String> = direct.iter().cloned().collect();
        while let Some(name) = queue.pop_front() {
            if !seen.insert(name.clone()) {
                continue;
            }
            if let Some(info) = self.traits.get(&name) {
                queue.extend(info.supertraits.iter().cloned());
            }
            result.push(name);
        }
        result
    }
}

fn type_ident(ty: &Type) -> Option<String> {
    match ty {
        Type::Path(path) => path.path.segments.last().map(|s| s.ident.to_string()),
        _ => None,
    }
}

fn returns_self(output: &ReturnType, owner: &str) -> bool {
    match output {
        ReturnType::Type(_, ty) => match type_ident(ty) {
            Some(name) => name == "Self" || name == owner,
            None => false,
        },
        ReturnType::Default => false,
    }
}

fn attr_name(attr: &Attribute) -> String {
    attr.path()
        .segments
        .last()
        .map(|s| s.ident.to_string())
        .unwrap_or_default()
}

fn has_attr(attrs: &[Attribute], name: &str) -> bool {
    attrs.iter().any(|a| attr_name(a) == name)
}

fn derives_error(attrs: &[Attribute]) -> bool {
    attrs.iter().filter(|a| a.path().is_ident("derive")).any(|attr| {
        attr.parse_args_with(
            syn::punctuated::Punctuated::<syn::Path, Token![,]>::parse_terminated,
        )
        .map(|paths| {
            paths
                .iter()
                .any(|p| p.segments.last().map(|s| s.ident == "Error").unwrap_or(false))
        })
        .unwrap_or(false)
    })
}

fn type_annotations(attrs: &[Attribute]) -> syn::Result<Vec<Annotation>> {
    let mut annotations = Vec::new();
    for attr in attrs {
        let name = attr_name(attr);
        match name.as_str() {
            "route_prefix" => {
                let path: LitStr = attr.parse_args()?;
                annotations.push(Annotation::RoutePrefix { path: path.value() });
            }
            "middleware" => annotations.push(Annotation::Middleware {
                priority: parse_priority(attr)?,
            }),
            "service" => annotations.push(Annotation::Service {
                singleton: parse_singleton(attr)?,
            }),
            "derive" | "doc" | "allow" | "cfg" | "cfg_attr" | "repr" => {}
            _ => annotations.push(Annotation::Other { name }),
        }
    }
    Ok(annotations)
}

fn parse_route(attr: &Attribute) -> syn::Result<Annotation> {
    attr.parse_args_with(|input: ParseStream| {
        let method_name = if input.peek(LitStr) {
            input.parse::<LitStr>()?.value()
        } else {
            input.parse::<syn::Ident>()?.to_string()
        };
        let method = HttpMethod::parse(&method_name)
            .ok_or_else(|| input.error(format!("unknown HTTP method '{}'", method_name)))?;
        input.parse::<Token![,]>()?;
        let path = input.parse::<LitStr>()?.value();

        let mut requirements = Vec::new();
        let mut name = None;
        while !input.is_empty() {
            input.parse::<Token![,]>()?;
            if input.is_empty() {
                break;
            }
            let key: syn::Ident = input.parse()?;
            if key == "requirements" {
                let content;
                syn::parenthesized!(content in input);
                let pairs = content.parse_terminated(
                    |pair: ParseStream| {
                        let param: syn::Ident = pair.parse()?;
                        pair.parse::<Token![=]>()?;
                        let pattern: LitStr = pair.parse()?;
                        Ok((param.to_string(), pattern.value()))
                    },
                    Token![,],
                )?;
                requirements.extend(pairs);
            } else if key == "name" {
                input.parse::<Token![=]>()?;
                name = Some(input.parse::<LitStr>()?.value());
            } else {
                return Err(syn::Error::new(key.span(), "unknown route option"));
            }
        }

        Ok(Annotation::Route {
            method,
            path,
            requirements,
            name,
        })
    })
}

fn parse_priority(attr: &Attribute) -> syn::Result<i32> {
    if matches!(attr.meta, syn::Meta::Path(_)) {
        return Ok(0);
    }
    let mut priority = 0;
    attr.parse_nested_meta(|meta| {
        if meta.path.is_ident("priority") {
            let expr: Expr = meta.value()?.parse()?;
            priority = match literal_from_expr(&expr) {
                Some(Literal::Int(value)) => i32::try_from(value)
                    .map_err(|_| meta.error("priority out of range"))?,
                _ => return Err(meta.error("priority must be an integer")),
            };
            Ok(())
        } else {
            Err(meta.error("unknown middleware option"))
        }
    })?;
    Ok(priority)
}

fn parse_singleton(attr: &Attribute) -> syn::Result<bool> {
    if matches!(attr.meta, syn::Meta::Path(_)) {
        return Ok(true);
    }
    let mut singleton = true;
    attr.parse_nested_meta(|meta| {
        if meta.path.is_ident("singleton") {
            singleton = true;
            Ok(())
        } else if meta.path.is_ident("transient") {
            singleton = false;
            Ok(())
        } else {
            Err(meta.error("expected `singleton` or `transient`"))
        }
    })?;
    Ok(singleton)
}

fn parse_listener(attr: &Attribute) -> syn::Result<Option<String>> {
    if matches!(attr.meta, syn::Meta::Path(_)) {
        return Ok(None);
    }
    let mut event = None;
    attr.parse_nested_meta(|meta| {
        if meta.path.is_ident("event") {
            event = Some(meta.value()?.parse::<LitStr>()?.value());
        } else if let Some(segment) = meta.path.segments.last() {
            event = Some(segment.ident.to_string());
        }
        Ok(())
    })?;
    Ok(event)
}

fn parameters(
    inputs: &syn::punctuated::Punctuated<FnArg, Token![,]>,
    owner: &str,
) -> syn::Result<Vec<Parameter>> {
    let mut params = Vec::new();
    for input in inputs {
        let FnArg::Typed(pat_type) = input else {
            continue;
        };
        let name = match &*pat_type.pat {
            Pat::Ident(ident) => ident.ident.to_string(),
            _ => format!("arg{}", params.len()),
        };
        let (ty, nullable) = parse_type(&pat_type.ty);
        let mut param = Parameter::new(name, ty);
        param.nullable = nullable;

        for attr in &pat_type.attrs {
            match attr_name(attr).as_str() {
                "default" => {
                    let expr: Expr = attr.parse_args()?;
                    param.default = Some(default_from_expr(&expr, owner).ok_or_else(|| {
                        syn::Error::new_spanned(&expr, "default must be a literal or a constant")
                    })?);
                }
                "env" => {
                    let key: LitStr = attr.parse_args()?;
                    param.hints.push(ParamHint::Env(key.value()));
                }
                "inject" => {
                    let id = attr.parse_args_with(|input: ParseStream| {
                        if input.peek(LitStr) {
                            Ok(input.parse::<LitStr>()?.value())
                        } else {
                            let path: syn::Path = input.parse()?;
                            path.segments
                                .last()
                                .map(|s| s.ident.to_string())
                                .ok_or_else(|| input.error("expected a service identifier"))
                        }
                    })?;
                    param.hints.push(ParamHint::Inject(id));
                }
                _ => {}
            }
        }
        params.push(param);
    }
    Ok(params)
}

fn default_from_expr(expr: &Expr, owner: &str) -> Option<DefaultValue> {
    if let Expr::Path(path) = expr {
        let segments: Vec<String> = path
            .path
            .segments
            .iter()
            .map(|s| s.ident.to_string())
            .collect();
        if segments.len() > 1 {
            let reference = segments
                .iter()
                .map(|s| if s == "Self" { owner } else { s.as_str() })
                .collect::<Vec<_>>()
                .join("::");
            return Some(DefaultValue::Constant(reference));
        }
        if let Some(ident) = segments.first() {
            if ident != "None" && ident.chars().all(|c| c.is_ascii_uppercase() || c == '_') {
                return Some(DefaultValue::Constant(ident.clone()));
            }
        }
    }
    literal_from_expr(expr).map(DefaultValue::Literal)
}

fn literal_from_expr(expr: &Expr) -> Option<Literal> {
    match expr {
        Expr::Lit(lit) => match &lit.lit {
            Lit::Str(s) => Some(Literal::Str(s.value())),
            Lit::Char(c) => Some(Literal::Str(c.value().to_string())),
            Lit::Int(i) => i.base10_parse::<i64>().ok().map(Literal::Int),
            Lit::Float(f) => f.base10_parse::<f64>().ok().map(Literal::Float),
            Lit::Bool(b) => Some(Literal::Bool(b.value)),
            _ => None,
        },
        Expr::Unary(unary) if matches!(unary.op, UnOp::Neg(_)) => {
            match literal_from_expr(&unary.expr)? {
                Literal::Int(i) => Some(Literal::Int(-i)),
                Literal::Float(f) => Some(Literal::Float(-f)),
                _ => None,
            }
        }
        Expr::Path(path) if path.path.is_ident("None") => Some(Literal::Null),
        Expr::Array(array) => array
            .elems
            .iter()
            .map(literal_from_expr)
            .collect::<Option<Vec<_>>>()
            .map(Literal::List),
        Expr::Call(call) => match &*call.func {
            Expr::Path(func) if func.path.is_ident("Some") && call.args.len() == 1 => {
                call.args.first().and_then(literal_from_expr)
            }
            _ => None,
        },
        // "text".to_string() / "text".into()
        Expr::MethodCall(call) if call.args.is_empty() => literal_from_expr(&call.receiver),
        Expr::Paren(paren) => literal_from_expr(&paren.expr),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{ParamType, PrimitiveKind};
    use pretty_assertions::assert_eq;

    fn index_of(source: &str) -> Index {
        let file = syn::parse_file(source).unwrap();
        let mut index = Index::default();
        index.collect_items(&file.items, Path::new("src/lib.rs")).unwrap();
        index
    }

    #[test]
    fn test_struct_with_constructor_and_capabilities() {
        let index = index_of(
            r#"
            pub trait Store: Send {}
            pub trait CacheStore: Store {}
            pub struct RedisCache { pool: Arc<Pool> }
            impl CacheStore for RedisCache {}
            impl RedisCache {
                pub fn new(pool: Arc<Pool>, #[default(30)] ttl: u64, prefix: Option<String>) -> Self {
                    Self { pool }
                }
            }
            "#,
        );

        let class = index.describe("RedisCache");
        assert_eq!(class.kind, ClassKind::Concrete);
        assert_eq!(
            class.capabilities,
            vec!["CacheStore".to_string(), "Store".to_string(), "Send".to_string()]
        );
        assert_eq!(class.constructor.len(), 3);
        assert_eq!(class.constructor[0].ty, ParamType::Named("Pool".into()));
        assert_eq!(
            class.constructor[1].default,
            Some(DefaultValue::Literal(Literal::Int(30)))
        );
        assert!(class.constructor[2].nullable);
        assert_eq!(
            class.constructor[2].ty,
            ParamType::Primitive(PrimitiveKind::String)
        );

        let store = index.describe("CacheStore");
        assert_eq!(store.kind, ClassKind::Interface);
        assert_eq!(store.capabilities, vec!["Store".to_string(), "Send".to_string()]);
    }

    #[test]
    fn test_kinds_for_generic_and_error_types() {
        let index = index_of(
            r#"
            pub struct Repository<T> { inner: Vec<T> }
            #[derive(Debug, thiserror::Error)]
            pub enum Never {}
            #[derive(Debug, thiserror::Error)]
            pub struct LoadError;
            pub struct ParseError;
            impl std::error::Error for ParseError {}
            "#,
        );

        assert_eq!(index.describe("Repository").kind, ClassKind::Abstract);
        assert_eq!(index.describe("LoadError").kind, ClassKind::Throwable);
        assert_eq!(index.describe("ParseError").kind, ClassKind::Throwable);
    }

    #[test]
    fn test_route_and_listener_annotations() {
        let index = index_of(
            r#"
            #[route_prefix("/users")]
            pub struct UserController;
            impl UserController {
                #[route(get, "/{id}", requirements(id = "\\d+"), name = "users.show")]
                pub fn show(&self, id: i64, req: Request) -> Response { todo!() }

                #[listener]
                pub fn on_created(event: &UserCreated) {}
            }
            "#,
        );

        let class = index.describe("UserController");
        assert_eq!(class.route_prefix(), Some("/users"));
        let show = class.method("show").unwrap();
        assert!(!show.is_static);
        assert_eq!(
            show.annotations,
            vec![Annotation::Route {
                method: HttpMethod::Get,
                path: "/{id}".into(),
                requirements: vec![("id".into(), "\\d+".into())],
                name: Some("users.show".into()),
            }]
        );
        let listener = class.method("on_created").unwrap();
        assert!(listener.is_static);
        assert_eq!(
            listener.annotations,
            vec![Annotation::Listener {
                event: "UserCreated".into()
            }]
        );
    }

    #[test]
    fn test_middleware_and_service_annotations() {
        let index = index_of(
            r#"
            #[middleware(priority = -100)]
            #[service(transient)]
            pub struct Throttle;
            "#,
        );
        let class = index.describe("Throttle");
        assert_eq!(class.middleware_priority(), Some(-100));
        assert_eq!(class.singleton_hint(), Some(false));
    }

    #[test]
    fn test_parameter_hints_and_constant_defaults() {
        let index = index_of(
            r#"
            pub struct Mailer;
            impl Mailer {
                pub const RETRIES: u32 = 3;
                #[constructor]
                pub fn connect(
                    #[env("MAIL_DSN")] dsn: String,
                    #[default(Self::RETRIES)] retries: u32,
                    #[inject("mail.transport")] transport: Arc<dyn Transport>,
                    #[default(None)] fallback: Option<Arc<Mailer>>,
                ) -> Mailer { Mailer }
                pub fn new() -> Self { Mailer }
            }
            "#,
        );

        let class = index.describe("Mailer");
        let params = &class.constructor;
        assert_eq!(params.len(), 4);
        assert_eq!(params[0].env_hint(), Some("MAIL_DSN"));
        assert_eq!(
            params[1].default,
            Some(DefaultValue::Constant("Mailer::RETRIES".into()))
        );
        assert_eq!(params[2].inject_hint(), Some("mail.transport"));
        assert_eq!(params[3].default, Some(DefaultValue::Literal(Literal::Null)));
        // `new` is an ordinary method once a constructor is marked
        assert!(class.method("new").is_some());
    }

    #[test]
    fn test_used_classes_reads_files_in_path_order() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(src.join("b")).unwrap();
        fs::write(src.join("b/mod.rs"), "pub struct Second;").unwrap();
        fs::write(src.join("a.rs"), "pub struct First;").unwrap();
        fs::write(src.join("generated.rs"), "pub struct Generated;").unwrap();

        let names: Vec<String> = SourceAnalyzer::new()
            .used_classes(dir.path(), &[src.join("generated.rs")])
            .unwrap()
            .map(|c| c.unwrap().name)
            .collect();

        assert_eq!(names, vec!["First".to_string(), "Second".to_string()]);
    }

    #[test]
    fn test_missing_source_directory_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let result = SourceAnalyzer::new().used_classes(dir.path(), &[]);
        assert!(matches!(result, Err(CompileError::Source { .. })));
    }
}
