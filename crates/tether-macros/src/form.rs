use proc_macro2::TokenStream;
use quote::quote;
use syn::meta::ParseNestedMeta;
use syn::spanned::Spanned;
use syn::{Attribute, Data, DeriveInput, Fields, LitStr};

use crate::marker::crate_path;

pub(crate) fn derive_form_schema(input: &DeriveInput) -> syn::Result<TokenStream> {
    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => &named.named,
            Fields::Unit => {
                return generate(input, Vec::new());
            }
            Fields::Unnamed(_) => {
                return Err(syn::Error::new(
                    input.span(),
                    "FormSchema requires named fields",
                ));
            }
        },
        Data::Enum(_) | Data::Union(_) => {
            return Err(syn::Error::new(
                input.span(),
                "FormSchema can only be derived for structs",
            ));
        }
    };

    let rename_all = container_rename_all(&input.attrs)?;
    let mut required = Vec::new();

    for field in fields {
        let attrs = parse_field_attrs(&field.attrs)?;
        if !attrs.required {
            continue;
        }
        let Some(ident) = &field.ident else {
            continue;
        };
        let key = match attrs.rename {
            Some(key) => key,
            None => {
                let name = ident.to_string();
                let name = name.strip_prefix("r#").unwrap_or(&name).to_string();
                match &rename_all {
                    Some(rule) => apply_rename_rule(rule, &name, field.span())?,
                    None => name,
                }
            }
        };
        required.push(key);
    }

    generate(input, required)
}

fn generate(input: &DeriveInput, required: Vec<String>) -> syn::Result<TokenStream> {
    let krate = crate_path(&input.attrs)?;
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics #krate::FormSchema for #name #ty_generics #where_clause {
            const REQUIRED: &'static [&'static str] = &[#(#required),*];
        }
    })
}

// ============================================================================
// Attribute parsing
// ============================================================================

#[derive(Default)]
struct FieldAttrs {
    required: bool,
    rename: Option<String>,
}

fn parse_field_attrs(attrs: &[Attribute]) -> syn::Result<FieldAttrs> {
    let mut result = FieldAttrs::default();
    let mut serde_rename: Option<String> = None;

    for attr in attrs {
        if attr.path().is_ident("form") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("required") {
                    result.required = true;
                } else if meta.path.is_ident("rename") {
                    result.rename = Some(meta.value()?.parse::<LitStr>()?.value());
                } else {
                    return Err(meta.error("unsupported form attribute"));
                }
                Ok(())
            })?;
        } else if attr.path().is_ident("serde") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("rename") && meta.input.peek(syn::Token![=]) {
                    serde_rename = Some(meta.value()?.parse::<LitStr>()?.value());
                    Ok(())
                } else {
                    skip_meta(&meta)
                }
            })?;
        }
    }

    if result.rename.is_none() {
        result.rename = serde_rename;
    }
    Ok(result)
}

fn container_rename_all(attrs: &[Attribute]) -> syn::Result<Option<LitStr>> {
    let mut rule = None;

    for attr in attrs {
        if !attr.path().is_ident("serde") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename_all") && meta.input.peek(syn::Token![=]) {
                rule = Some(meta.value()?.parse::<LitStr>()?);
                Ok(())
            } else {
                skip_meta(&meta)
            }
        })?;
    }

    Ok(rule)
}

/// Consumes the value of a serde option we do not care about.
fn skip_meta(meta: &ParseNestedMeta<'_>) -> syn::Result<()> {
    if meta.input.peek(syn::Token![=]) {
        meta.value()?.parse::<syn::Expr>()?;
    } else if meta.input.peek(syn::token::Paren) {
        let _content;
        syn::parenthesized!(_content in meta.input);
    }
    Ok(())
}

fn apply_rename_rule(rule: &LitStr, field: &str, span: proc_macro2::Span) -> syn::Result<String> {
    let words: Vec<&str> = field.split('_').filter(|w| !w.is_empty()).collect();
    let capitalize = |w: &str| {
        let mut chars = w.chars();
        chars
            .next()
            .map(|c| c.to_uppercase().chain(chars).collect::<String>())
            .unwrap_or_default()
    };

    let renamed = match rule.value().as_str() {
        "lowercase" => field.to_lowercase(),
        "UPPERCASE" => field.to_uppercase(),
        "snake_case" => field.to_string(),
        "SCREAMING_SNAKE_CASE" => field.to_uppercase(),
        "kebab-case" => field.replace('_', "-"),
        "SCREAMING-KEBAB-CASE" => field.replace('_', "-").to_uppercase(),
        "PascalCase" => words.iter().map(|w| capitalize(w)).collect(),
        "camelCase" => words
            .iter()
            .enumerate()
            .map(|(i, w)| if i == 0 { w.to_string() } else { capitalize(w) })
            .collect(),
        other => {
            return Err(syn::Error::new(
                span,
                format!("unknown rename rule `{other}`"),
            ));
        }
    };
    Ok(renamed)
}
