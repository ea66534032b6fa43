//! Mapping from Rust syntax types to parameter types

use super::{ParamType, PrimitiveKind};
use syn::{GenericArgument, PathArguments, Type, TypeParamBound};

/// Wrappers that only change ownership, never the identity of the service
const TRANSPARENT_WRAPPERS: &[&str] = &["Arc", "Rc", "Box", "Cow"];

/// Convert a parameter type into a [`ParamType`] plus its nullability
///
/// `Option<T>` is nullable; `Arc<T>`, `Box<T>` and references resolve to `T`;
/// trait objects resolve to their first trait bound.
pub fn parse_type(ty: &Type) -> (ParamType, bool) {
    match ty {
        Type::Reference(reference) => parse_type(&reference.elem),
        Type::Paren(paren) => parse_type(&paren.elem),
        Type::Group(group) => parse_type(&group.elem),
        Type::TraitObject(object) => (first_trait_bound(object.bounds.iter()), false),
        Type::Array(_) | Type::Slice(_) | Type::Tuple(_) => {
            (ParamType::Primitive(PrimitiveKind::Array), false)
        }
        Type::Path(type_path) => {
            let Some(segment) = type_path.path.segments.last() else {
                return (ParamType::Untyped, false);
            };
            let ident = segment.ident.to_string();

            if ident == "Option" {
                return match first_type_argument(&segment.arguments) {
                    Some(inner) => (parse_type(inner).0, true),
                    None => (ParamType::Untyped, true),
                };
            }
            if TRANSPARENT_WRAPPERS.contains(&ident.as_str()) {
                return match first_type_argument(&segment.arguments) {
                    Some(inner) => parse_type(inner),
                    None => (ParamType::Untyped, false),
                };
            }

            let ty = match ident.as_str() {
                "String" | "str" => ParamType::Primitive(PrimitiveKind::String),
                "i8" | "i16" | "i32" | "i64" | "i128" | "isize" | "u8" | "u16" | "u32"
                | "u64" | "u128" | "usize" => ParamType::Primitive(PrimitiveKind::Int),
                "f32" | "f64" => ParamType::Primitive(PrimitiveKind::Float),
                "bool" => ParamType::Primitive(PrimitiveKind::Bool),
                "Vec" | "VecDeque" | "HashMap" | "BTreeMap" | "HashSet" | "BTreeSet" => {
                    ParamType::Primitive(PrimitiveKind::Array)
                }
                _ => ParamType::Named(ident),
            };
            (ty, false)
        }
        _ => (ParamType::Untyped, false),
    }
}

fn first_type_argument(arguments: &PathArguments) -> Option<&Type> {
    match arguments {
        PathArguments::AngleBracketed(args) => args.args.iter().find_map(|arg| match arg {
            GenericArgument::Type(ty) => Some(ty),
            _ => None,
        }),
        _ => None,
    }
}

fn first_trait_bound<'a>(mut bounds: impl Iterator<Item = &'a TypeParamBound>) -> ParamType {
    bounds
        .find_map(|bound| match bound {
            TypeParamBound::Trait(tr) => tr
                .path
                .segments
                .last()
                .map(|s| ParamType::Named(s.ident.to_string())),
            _ => None,
        })
        .unwrap_or(ParamType::Untyped)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> (ParamType, bool) {
        let ty: Type = syn::parse_str(src).unwrap();
        parse_type(&ty)
    }

    #[test]
    fn test_primitives() {
        assert_eq!(parse("u32"), (ParamType::Primitive(PrimitiveKind::Int), false));
        assert_eq!(parse("&str"), (ParamType::Primitive(PrimitiveKind::String), false));
        assert_eq!(parse("f64"), (ParamType::Primitive(PrimitiveKind::Float), false));
        assert_eq!(
            parse("Vec<String>"),
            (ParamType::Primitive(PrimitiveKind::Array), false)
        );
    }

    #[test]
    fn test_wrappers_resolve_to_inner_identifier() {
        assert_eq!(parse("Arc<Database>"), (ParamType::Named("Database".into()), false));
        assert_eq!(parse("Arc<dyn Mailer>"), (ParamType::Named("Mailer".into()), false));
        assert_eq!(
            parse("&crate::db::Pool"),
            (ParamType::Named("Pool".into()), false)
        );
    }

    #[test]
    fn test_option_is_nullable() {
        assert_eq!(
            parse("Option<Arc<dyn Cache>>"),
            (ParamType::Named("Cache".into()), true)
        );
        assert_eq!(
            parse("Option<i64>"),
            (ParamType::Primitive(PrimitiveKind::Int), true)
        );
    }

    #[test]
    fn test_inferred_type_is_untyped() {
        assert_eq!(parse("_"), (ParamType::Untyped, false));
    }
}
