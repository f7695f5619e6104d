//! Procedural macros for Tether.
//!
//! - `#[derive(FormSchema)]` - declares which form/query keys a struct requires
//! - `#[derive(Param)]` - marks a type as a handler parameter
//! - `#[derive(Reply)]` - marks a type as a handler return value
//!
//! Generated code refers to `::tether::framework` by default. Crates that
//! depend on `tether-framework` directly can point the macros elsewhere with
//! `#[tether(crate = "::tether_framework")]`.
//!
//! ```rust,ignore
//! use serde::Deserialize;
//! use tether::prelude::*;
//!
//! #[derive(Deserialize, FormSchema)]
//! struct Rename {
//!     #[form(required)]
//!     newname: String,
//!     #[serde(rename = "cat")]
//!     category: Option<String>,
//! }
//! ```

mod form;
mod marker;

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

/// Derives `FormSchema` for a struct with named fields.
///
/// # Attributes
///
/// - `#[form(required)]` on a field - the key must be present with a non-empty value
/// - `#[form(rename = "...")]` on a field - the key to check, if it differs from the field name
/// - `#[tether(crate = "...")]` on the struct - path to the framework crate
///
/// `#[serde(rename = "...")]` and `#[serde(rename_all = "...")]` are honoured
/// so the checked keys match the keys serde decodes.
#[proc_macro_derive(FormSchema, attributes(form, tether))]
pub fn derive_form_schema(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match form::derive_form_schema(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

/// Derives `Param`, so the type can be a handler parameter.
///
/// The type still needs an extractor, registered with `with_parameter_type`.
#[proc_macro_derive(Param, attributes(tether))]
pub fn derive_param(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match marker::derive_marker(&input, "Param") {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

/// Derives `Reply`, so the type can be a handler return value.
///
/// The type still needs a return handler, registered with `with_return_type`.
#[proc_macro_derive(Reply, attributes(tether))]
pub fn derive_reply(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match marker::derive_marker(&input, "Reply") {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}
