use proc_macro2::TokenStream;
use quote::{format_ident, quote};
use syn::{Attribute, DeriveInput, Path};

/// Reads `#[tether(crate = "...")]`, defaulting to `::tether::framework`.
pub(crate) fn crate_path(attrs: &[Attribute]) -> syn::Result<Path> {
    let mut path: Option<Path> = None;

    for attr in attrs {
        if !attr.path().is_ident("tether") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("crate") {
                path = Some(meta.value()?.parse::<syn::LitStr>()?.parse()?);
                Ok(())
            } else {
                Err(meta.error("unsupported tether attribute"))
            }
        })?;
    }

    Ok(path.unwrap_or_else(|| syn::parse_quote!(::tether::framework)))
}

/// An empty impl of a marker trait from the framework crate.
pub(crate) fn derive_marker(input: &DeriveInput, trait_name: &str) -> syn::Result<TokenStream> {
    let krate = crate_path(&input.attrs)?;
    let name = &input.ident;
    let trait_ident = format_ident!("{}", trait_name);
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics #krate::#trait_ident for #name #ty_generics #where_clause {}
    })
}
