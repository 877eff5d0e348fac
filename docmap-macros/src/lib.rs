//! Procedural macros for the docmap project.
//!
//! - `#[derive(Persistent)]` builds the field descriptor table of a struct and marks it for
//!   document mapping.
//! - `#[derive(Entity)]` binds a persistent struct to a collection and an identifier policy.
//!
//! ```ignore
//! #[derive(Debug, Default, Persistent, Entity)]
//! #[entity(collection = "people")]
//! struct Person {
//!     #[bson(id)]
//!     id: Option<ObjectId>,
//!     #[bson(rename = "full_name")]
//!     name: String,
//!     tags: Vec<String>,
//!     #[bson(skip)]
//!     cached_score: u64,
//! }
//! ```
//!
//! Every named field is persisted unless marked `#[bson(skip)]`, so every accessor in the
//! generated table exists by construction.

#[allow(unused_extern_crates)]
extern crate self as docmap_macros;

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use std::collections::HashSet;
use syn::{Data, DeriveInput, Fields, Ident, LitInt, LitStr, Path, Type, parse_macro_input, spanned::Spanned};

const ID_FIELD: &str = "_id";

/// Derives `Mapped` and `Persistent`.
///
/// Field attributes:
///
/// - `#[bson(rename = "name")]` stores the field under another wire name.
/// - `#[bson(id)]` marks the identifier field, stored as `_id`.
/// - `#[bson(skip)]` leaves the field out of the document.
///
/// Container attribute `#[persistent(...)]`:
///
/// - `constructor = path::to::fn` sets the function used to create instances on decode. It
///   defaults to `Default::default`.
/// - `crate = path` names the crate exposing the runtime modules, `docmap_core` by default.
///   Crates that only depend on the `docmap` façade write `crate = docmap`.
#[proc_macro_derive(Persistent, attributes(bson, persistent))]
pub fn derive_persistent(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    expand_persistent(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

/// Derives `Entity`.
///
/// Container attribute `#[entity(...)]`:
///
/// - `collection = "name"` sets the collection. It defaults to the snake-cased type name.
/// - `sequential` allocates integer identifiers, starting at `seed = N` (default 1).
/// - `assigned` requires the caller to set identifiers.
/// - `crate = path` names the crate exposing the runtime modules, as for `Persistent`.
#[proc_macro_derive(Entity, attributes(entity))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    expand_entity(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

struct MappedField<'a> {
    ident: &'a Ident,
    ty: &'a Type,
    wire_name: String,
    is_id: bool,
}

fn expand_persistent(input: &DeriveInput) -> syn::Result<TokenStream2> {
    reject_generics(input)?;

    let name = &input.ident;
    let fields = named_fields(input)?;
    let PersistentOptions { constructor, krate } = parse_persistent_options(input)?;

    let mut mapped = Vec::new();
    let mut seen = HashSet::new();
    let mut has_id = false;

    for field in fields {
        let Some(ident) = field.ident.as_ref() else {
            continue;
        };

        let mut rename: Option<LitStr> = None;
        let mut is_id = false;
        let mut skip = false;

        for attr in field.attrs.iter().filter(|attr| attr.path().is_ident("bson")) {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("rename") {
                    rename = Some(meta.value()?.parse()?);
                    Ok(())
                } else if meta.path.is_ident("id") {
                    is_id = true;
                    Ok(())
                } else if meta.path.is_ident("skip") {
                    skip = true;
                    Ok(())
                } else {
                    Err(meta.error("expected `rename = \"...\"`, `id` or `skip`"))
                }
            })?;
        }

        if skip {
            if is_id || rename.is_some() {
                return Err(syn::Error::new(field.span(), "a skipped field cannot be renamed or be the identifier"));
            }
            continue;
        }

        if is_id {
            if let Some(rename) = &rename {
                return Err(syn::Error::new(rename.span(), "the identifier field is always stored as `_id`"));
            }
            if has_id {
                return Err(syn::Error::new(field.span(), "only one field can be marked `#[bson(id)]`"));
            }
            has_id = true;
        }

        let wire_name = match (&rename, is_id) {
            (_, true) => ID_FIELD.to_string(),
            (Some(rename), false) => rename.value(),
            (None, false) => ident.to_string().trim_start_matches("r#").to_string(),
        };

        if !seen.insert(wire_name.clone()) {
            return Err(syn::Error::new(
                field.span(),
                format!("wire field name `{wire_name}` is used more than once"),
            ));
        }

        mapped.push(MappedField {
            ident,
            ty: &field.ty,
            wire_name,
            is_id,
        });
    }

    let registrations = mapped.iter().map(|field| {
        let ident = field.ident;
        let ty = field.ty;
        let member = ident.to_string();
        let wire_name = &field.wire_name;

        let get = quote! { |this| &this.#ident };
        let set = quote! {
            |this, value, codecs| {
                this.#ident = <#ty as #krate::value::Mapped>::read(value, codecs)?;
                ::core::result::Result::Ok(())
            }
        };

        if field.is_id {
            quote! { .id::<#ty>(#member, #get, #set) }
        } else {
            quote! { .field::<#ty>(#wire_name, #member, #get, #set) }
        }
    });

    let constructor = match constructor {
        Some(path) => quote! { #path },
        None => quote! { <Self as ::core::default::Default>::default },
    };

    Ok(quote! {
        impl #krate::value::Mapped for #name {
            fn node(&self) -> #krate::value::Node<'_> {
                #krate::value::Node::Value(self)
            }

            fn runtime_type(&self) -> #krate::value::TypeKey {
                #krate::value::TypeKey::persistent::<Self>()
            }

            fn type_key() -> #krate::value::TypeKey {
                #krate::value::TypeKey::persistent::<Self>()
            }

            fn read(
                value: #krate::bson::Bson,
                codecs: &#krate::codec::CodecRegistry,
            ) -> #krate::error::DocumentStoreResult<Self> {
                codecs.decode_as::<Self>(value)
            }
        }

        impl #krate::descriptor::Persistent for #name {
            fn describe() -> #krate::descriptor::TypeDescriptor<Self> {
                #krate::descriptor::TypeDescriptor::<Self>::builder()
                    #(#registrations)*
                    .constructor(#constructor)
                    .build()
            }
        }
    })
}

fn expand_entity(input: &DeriveInput) -> syn::Result<TokenStream2> {
    reject_generics(input)?;

    let name = &input.ident;
    let mut collection: Option<LitStr> = None;
    let mut sequential = false;
    let mut assigned = false;
    let mut seed: Option<LitInt> = None;
    let mut krate: Option<Path> = None;

    for attr in input.attrs.iter().filter(|attr| attr.path().is_ident("entity")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("collection") {
                collection = Some(meta.value()?.parse()?);
                Ok(())
            } else if meta.path.is_ident("sequential") {
                sequential = true;
                Ok(())
            } else if meta.path.is_ident("assigned") {
                assigned = true;
                Ok(())
            } else if meta.path.is_ident("seed") {
                seed = Some(meta.value()?.parse()?);
                Ok(())
            } else if meta.path.is_ident("crate") {
                krate = Some(meta.value()?.parse()?);
                Ok(())
            } else {
                Err(meta.error("expected `collection = \"...\"`, `sequential`, `seed = N`, `assigned` or `crate = path`"))
            }
        })?;
    }

    if sequential && assigned {
        return Err(syn::Error::new(name.span(), "an entity cannot be both `sequential` and `assigned`"));
    }

    let krate = runtime_crate(krate);

    let policy = match (&seed, sequential, assigned) {
        (Some(seed), false, _) => {
            return Err(syn::Error::new(seed.span(), "`seed` requires `sequential`"));
        }
        (Some(seed), true, _) => {
            let seed: i32 = seed.base10_parse()?;
            quote! { #krate::entity::IdPolicy::Sequential { seed: #seed } }
        }
        (None, true, _) => quote! { #krate::entity::IdPolicy::sequential() },
        (None, false, true) => quote! { #krate::entity::IdPolicy::Assigned },
        (None, false, false) => quote! { #krate::entity::IdPolicy::Generated },
    };

    let collection = collection
        .map(|collection| collection.value())
        .unwrap_or_else(|| snake_case(&name.to_string()));

    Ok(quote! {
        impl #krate::entity::Entity for #name {
            fn collection_name() -> &'static str {
                #collection
            }

            fn id_policy() -> #krate::entity::IdPolicy {
                #policy
            }
        }
    })
}

fn named_fields(input: &DeriveInput) -> syn::Result<&syn::punctuated::Punctuated<syn::Field, syn::token::Comma>> {
    match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => Ok(&fields.named),
            _ => Err(syn::Error::new(input.ident.span(), "Persistent requires a struct with named fields")),
        },
        _ => Err(syn::Error::new(input.ident.span(), "Persistent can only be derived for structs")),
    }
}

struct PersistentOptions {
    constructor: Option<Path>,
    krate: TokenStream2,
}

fn parse_persistent_options(input: &DeriveInput) -> syn::Result<PersistentOptions> {
    let mut constructor = None;
    let mut krate = None;

    for attr in input.attrs.iter().filter(|attr| attr.path().is_ident("persistent")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("constructor") {
                constructor = Some(meta.value()?.parse::<Path>()?);
                Ok(())
            } else if meta.path.is_ident("crate") {
                krate = Some(meta.value()?.parse::<Path>()?);
                Ok(())
            } else {
                Err(meta.error("expected `constructor = path` or `crate = path`"))
            }
        })?;
    }

    Ok(PersistentOptions {
        constructor,
        krate: runtime_crate(krate),
    })
}

fn runtime_crate(path: Option<Path>) -> TokenStream2 {
    match path {
        Some(path) => quote! { #path },
        None => quote! { ::docmap_core },
    }
}

fn reject_generics(input: &DeriveInput) -> syn::Result<()> {
    if input.generics.params.is_empty() {
        Ok(())
    } else {
        Err(syn::Error::new(input.generics.span(), "generic types cannot be derived"))
    }
}

fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);

    for (position, ch) in name.char_indices() {
        if ch.is_uppercase() {
            if position > 0 {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }

    out
}
