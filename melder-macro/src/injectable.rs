use darling::ast::{Data, Style};
use darling::{FromDeriveInput, FromField};
use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, DeriveInput, GenericArgument, Ident, PathArguments, Type};

#[derive(FromDeriveInput)]
#[darling(attributes(injectable), supports(struct_named, struct_unit))]
struct InjectableInput {
    ident: Ident,
    generics: syn::Generics,
    data: Data<(), InjectField>,
    #[darling(default)]
    dispose: bool,
}

#[derive(FromField)]
#[darling(attributes(inject))]
struct InjectField {
    ident: Option<Ident>,
    ty: Type,
    #[darling(default)]
    name: Option<String>,
    #[darling(default)]
    all: bool,
    #[darling(default)]
    default: bool,
}

/// How a field is filled from the resolved dependencies
enum Injection {
    Required(Type),
    Optional(Type),
    AllNamed(Type),
    Default,
}

pub fn derive_injectable(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match InjectableInput::from_derive_input(&input).and_then(|input| generate_injectable_impl(&input)) {
        Ok(expanded) => TokenStream::from(expanded),
        Err(e) => TokenStream::from(e.write_errors()),
    }
}

fn generate_injectable_impl(input: &InjectableInput) -> darling::Result<TokenStream2> {
    let struct_name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let fields = match &input.data {
        Data::Struct(fields) => fields,
        Data::Enum(_) => {
            return Err(darling::Error::custom("#[derive(Injectable)] can only be applied to structs")
                .with_span(struct_name))
        }
    };

    let mut errors = darling::Error::accumulator();
    let mut dependencies = Vec::new();
    let mut field_injections = Vec::new();

    for field in fields.iter() {
        let Some(injection) = errors.handle(classify(field)) else {
            continue;
        };
        let field_name = &field.ident;
        let name = field.name.as_deref();

        let (dependency, value) = match injection {
            Injection::Required(ty) => (
                Some(match name {
                    Some(name) => quote!(::melder::Dependency::named::<#ty>(#name)),
                    None => quote!(::melder::Dependency::on::<#ty>()),
                }),
                quote!(dependencies.take::<#ty>()?),
            ),
            Injection::Optional(ty) => (
                Some(match name {
                    Some(name) => quote!(::melder::Dependency::optional_named::<#ty>(#name)),
                    None => quote!(::melder::Dependency::optional::<#ty>()),
                }),
                quote!(dependencies.take_optional::<#ty>()?),
            ),
            Injection::AllNamed(ty) => (
                Some(quote!(::melder::Dependency::all_named::<#ty>())),
                quote!(dependencies.take_all::<#ty>()?),
            ),
            Injection::Default => (None, quote!(::std::default::Default::default())),
        };

        dependencies.extend(dependency);
        field_injections.push(quote!(#field_name: #value));
    }
    errors.finish()?;

    let construct = match fields.style {
        Style::Unit => quote!(Self),
        _ => quote!(Self { #(#field_injections),* }),
    };

    let disposer = input.dispose.then(|| {
        quote! {
            fn disposer(
                instance: &::std::sync::Arc<Self>
            ) -> ::std::option::Option<::std::sync::Arc<dyn ::melder::Dispose>> {
                ::std::option::Option::Some(
                    ::std::sync::Arc::clone(instance) as ::std::sync::Arc<dyn ::melder::Dispose>
                )
            }
        }
    });

    Ok(quote! {
        impl #impl_generics ::melder::Injectable for #struct_name #ty_generics #where_clause {
            fn dependencies() -> ::std::vec::Vec<::melder::Dependency> {
                ::std::vec![#(#dependencies),*]
            }

            #[allow(unused_variables)]
            fn inject(
                dependencies: &mut ::melder::Dependencies
            ) -> ::std::result::Result<Self, ::melder::BoxError> {
                ::std::result::Result::Ok(#construct)
            }

            #disposer
        }
    })
}

fn classify(field: &InjectField) -> darling::Result<Injection> {
    if field.default {
        if field.name.is_some() || field.all {
            return Err(darling::Error::custom("`default` cannot be combined with `name` or `all`").with_span(&field.ty));
        }
        return Ok(Injection::Default);
    }

    if let Some(inner) = generic_argument(&field.ty, "NamedMap") {
        if field.name.is_some() {
            return Err(darling::Error::custom("a NamedMap field collects every name; remove `name`").with_span(&field.ty));
        }
        return Ok(Injection::AllNamed(inner.clone()));
    }

    if field.all {
        if field.name.is_some() {
            return Err(darling::Error::custom("`all` collects every name; remove `name`").with_span(&field.ty));
        }
        let ty = &field.ty;
        return Ok(Injection::AllNamed(
            syn::parse_quote!(<#ty as ::melder::NamedCollection>::Interface),
        ));
    }

    if let Some(inner) = generic_argument(&field.ty, "Option") {
        if let Some(inner) = generic_argument(inner, "Arc") {
            return Ok(Injection::Optional(inner.clone()));
        }
    }

    if let Some(inner) = generic_argument(&field.ty, "Arc") {
        return Ok(Injection::Required(inner.clone()));
    }

    Err(darling::Error::custom(
        "injected fields must be Arc<T>, Option<Arc<T>> or NamedMap<T> (#[inject(all)] for an alias); use #[inject(default)] for other fields",
    )
    .with_span(&field.ty))
}

/// Extract `T` from `Wrapper<T>`, matching on the last path segment
fn generic_argument<'a>(ty: &'a Type, wrapper: &str) -> Option<&'a Type> {
    let Type::Path(type_path) = ty else {
        return None;
    };
    let segment = type_path.path.segments.last()?;
    if segment.ident != wrapper {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    match args.args.first()? {
        GenericArgument::Type(inner) => Some(inner),
        _ => None,
    }
}
