//! Derive macros for Shared Todos
//!
//! # Available Macros
//!
//! - `#[derive(Action)]` - Generates classification helpers for action enums
//!
//! # Example
//!
//! ```ignore
//! use shared_todos_macros::Action;
//!
//! #[derive(Action, Clone, Debug)]
//! enum ListAction {
//!     #[intent]
//!     ToggleAll,
//!
//!     #[feedback]
//!     SnapshotReceived { count: usize },
//! }
//!
//! assert!(ListAction::ToggleAll.is_intent());
//! assert!(ListAction::SnapshotReceived { count: 0 }.is_feedback());
//! assert_eq!(ListAction::ToggleAll.name(), "ToggleAll");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Attribute, Data, DeriveInput, Fields, Variant, parse_macro_input};

/// Derive macro for Action enums
///
/// Generates helper methods for action enums:
/// - `is_intent()` - Returns true if this variant is a user intent
/// - `is_feedback()` - Returns true if this variant is feedback from the
///   outside world (subscription statuses, mutation outcomes)
/// - `name()` - Returns the variant name, for logs and metrics labels
///
/// # Attributes
///
/// - `#[intent]` - Mark a variant as an intent
/// - `#[feedback]` - Mark a variant as feedback
///
/// Unmarked variants are neither.
///
/// # Errors
///
/// Produces a compile error if:
/// - Applied to a non-enum type
/// - A variant has both `#[intent]` and `#[feedback]` attributes
#[proc_macro_derive(Action, attributes(intent, feedback))]
pub fn derive_action(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;

    let Data::Enum(data_enum) = &input.data else {
        return syn::Error::new_spanned(input, "#[derive(Action)] can only be used on enums")
            .to_compile_error()
            .into();
    };

    let mut intent_arms = Vec::new();
    let mut feedback_arms = Vec::new();
    let mut name_arms = Vec::new();

    for variant in &data_enum.variants {
        let is_intent = has_attribute(&variant.attrs, "intent");
        let is_feedback = has_attribute(&variant.attrs, "feedback");

        if is_intent && is_feedback {
            return syn::Error::new_spanned(
                variant,
                "Variant cannot be both #[intent] and #[feedback]",
            )
            .to_compile_error()
            .into();
        }

        let pattern = variant_pattern(variant);
        if is_intent {
            intent_arms.push(quote! { #pattern => true, });
        }
        if is_feedback {
            feedback_arms.push(quote! { #pattern => true, });
        }

        let variant_name = variant.ident.to_string();
        name_arms.push(quote! { #pattern => #variant_name, });
    }

    let expanded = quote! {
        impl #name {
            /// Returns true if this action is a user intent
            #[must_use]
            #[allow(unreachable_patterns)]
            pub const fn is_intent(&self) -> bool {
                match self {
                    #(#intent_arms)*
                    _ => false,
                }
            }

            /// Returns true if this action reports something that happened outside the reducer
            #[must_use]
            #[allow(unreachable_patterns)]
            pub const fn is_feedback(&self) -> bool {
                match self {
                    #(#feedback_arms)*
                    _ => false,
                }
            }

            /// Returns the variant name
            #[must_use]
            pub const fn name(&self) -> &'static str {
                match self {
                    #(#name_arms)*
                }
            }
        }
    };

    TokenStream::from(expanded)
}

/// Pattern matching a variant regardless of its fields
fn variant_pattern(variant: &Variant) -> TokenStream2 {
    let ident = &variant.ident;
    match &variant.fields {
        Fields::Named(_) => quote! { Self::#ident { .. } },
        Fields::Unnamed(_) => quote! { Self::#ident(..) },
        Fields::Unit => quote! { Self::#ident },
    }
}

/// Helper function to check if an attribute list contains a specific attribute
fn has_attribute(attrs: &[Attribute], name: &str) -> bool {
    attrs.iter().any(|attr| attr.path().is_ident(name))
}
