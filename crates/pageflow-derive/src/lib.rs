//! Pageflow Derive Macros: declarative pages and components
//!
//! A page object is a newtype over `pageflow::Page` carrying the URL it
//! owns; a component object wraps `pageflow::Component` with its CSS
//! selector. The derives write the trait impls and the `Deref` so the
//! wrapper exposes every page action directly.
//!
//! # Available Macros
//!
//! - [`Page`] - implements `PageObject` from `#[page(url = "...")]`
//! - [`Component`] - implements `ComponentObject` from `#[component(selector = "...")]`
//! - [`pageflow_test`] - runs an async test on tokio under a timeout
//!
//! # Example
//!
//! ```ignore
//! use pageflow::prelude::*;
//!
//! #[derive(Page)]
//! #[page(url = "https://site.test/home")]
//! struct HomePage(Page);
//!
//! #[derive(Component)]
//! #[component(selector = "#modal-id")]
//! struct Modal(Component);
//!
//! #[pageflow_test(timeout_ms = 20000)]
//! async fn test_modal_opens() -> PageflowResult<()> {
//!     let home = session.open::<HomePage>().await?;
//!     let modal: Modal = home.click_and_open("a.open-modal", "#modal-id").await?.into_component()?;
//!     modal.assert_text_in_element("h2", "Welcome").await
//! }
//! ```

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, Attribute, Data, DeriveInput, Fields, Lit, Meta, ReturnType};

/// Default `pageflow_test` timeout (30 seconds)
const DEFAULT_TEST_TIMEOUT_MS: u64 = 30_000;

/// Derive macro for page objects.
///
/// The struct must have exactly one field, of type `pageflow::Page`.
///
/// # Attributes
///
/// - `#[page(url = "https://site.test/users/:id")]` - URL or URL pattern (required)
///
/// # Example
///
/// ```ignore
/// #[derive(Page)]
/// #[page(url = "https://site.test/login")]
/// struct LoginPage(Page);
///
/// registry.register_page::<LoginPage>();
/// ```
#[proc_macro_derive(Page, attributes(page))]
pub fn derive_page(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand_wrapper(&input, &WrapperKind::PAGE)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

/// Derive macro for component objects.
///
/// The struct must have exactly one field, of type `pageflow::Component`.
///
/// # Attributes
///
/// - `#[component(selector = "#modal-id")]` - CSS selector (required)
///
/// # Example
///
/// ```ignore
/// #[derive(Component)]
/// #[component(selector = "#search-results")]
/// struct Results(Component);
///
/// registry.register_component::<Results>();
/// ```
#[proc_macro_derive(Component, attributes(component))]
pub fn derive_component(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand_wrapper(&input, &WrapperKind::COMPONENT)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

/// Attribute macro running an async test body on a tokio runtime.
///
/// Logging is initialised first. The body may return `()` or a `Result`;
/// an `Err` or exceeding the timeout fails the test.
///
/// # Example
///
/// ```ignore
/// #[pageflow_test(timeout_ms = 5000)]
/// async fn test_login() -> PageflowResult<()> {
///     // Test implementation
///     Ok(())
/// }
/// ```
#[proc_macro_attribute]
pub fn pageflow_test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as syn::ItemFn);
    let timeout_ms = parse_timeout_attr(&attr.to_string()).unwrap_or(DEFAULT_TEST_TIMEOUT_MS);
    expand_test(&input, timeout_ms)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

// ============================================================================
// Expansion
// ============================================================================

/// What a derive wraps and which trait it implements
struct WrapperKind {
    attr: &'static str,
    key: &'static str,
    trait_path: &'static str,
    wrapped: &'static str,
    constant: &'static str,
    constructor: &'static str,
    accessor: &'static str,
}

impl WrapperKind {
    const PAGE: Self = Self {
        attr: "page",
        key: "url",
        trait_path: "PageObject",
        wrapped: "Page",
        constant: "URL",
        constructor: "from_page",
        accessor: "page",
    };

    const COMPONENT: Self = Self {
        attr: "component",
        key: "selector",
        trait_path: "ComponentObject",
        wrapped: "Component",
        constant: "SELECTOR",
        constructor: "from_component",
        accessor: "component",
    };
}

fn ident(name: &str) -> syn::Ident {
    syn::Ident::new(name, proc_macro2::Span::call_site())
}

fn expand_wrapper(input: &DeriveInput, kind: &WrapperKind) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let key = extract_str_attribute(&input.attrs, kind.attr, kind.key)?.ok_or_else(|| {
        syn::Error::new_spanned(
            name,
            format!("missing #[{}({} = \"...\")]", kind.attr, kind.key),
        )
    })?;
    if key.trim().is_empty() {
        return Err(syn::Error::new_spanned(
            name,
            format!("#[{}] {} must not be empty", kind.attr, kind.key),
        ));
    }

    let field = wrapped_field(input)?;
    let construct = match &field {
        WrappedField::Unnamed => quote! { Self(inner) },
        WrappedField::Named(field) => quote! { Self { #field: inner } },
    };
    let access = match &field {
        WrappedField::Unnamed => quote! { self.0 },
        WrappedField::Named(field) => quote! { self.#field },
    };

    let trait_name = ident(kind.trait_path);
    let wrapped = ident(kind.wrapped);
    let constant = ident(kind.constant);
    let constructor = ident(kind.constructor);
    let accessor = ident(kind.accessor);
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics ::pageflow::#trait_name for #name #ty_generics #where_clause {
            const #constant: &'static str = #key;

            fn #constructor(inner: ::pageflow::#wrapped) -> Self {
                #construct
            }

            fn #accessor(&self) -> &::pageflow::#wrapped {
                &#access
            }
        }

        impl #impl_generics ::core::ops::Deref for #name #ty_generics #where_clause {
            type Target = ::pageflow::#wrapped;

            fn deref(&self) -> &Self::Target {
                &#access
            }
        }
    })
}

fn expand_test(input: &syn::ItemFn, timeout_ms: u64) -> syn::Result<TokenStream2> {
    if input.sig.asyncness.is_none() {
        return Err(syn::Error::new_spanned(
            &input.sig.fn_token,
            "#[pageflow_test] expects an async fn",
        ));
    }

    let fn_name = &input.sig.ident;
    let fn_block = &input.block;
    let fn_vis = &input.vis;
    let fn_attrs = &input.attrs;
    let test_name = fn_name.to_string();

    let body = match &input.sig.output {
        ReturnType::Default => quote! {
            async move {
                #fn_block;
                ::core::result::Result::<(), ::std::convert::Infallible>::Ok(())
            }
        },
        ReturnType::Type(_, ty) => quote! { async move { let out: #ty = #fn_block; out } },
    };

    Ok(quote! {
        #(#fn_attrs)*
        #[test]
        #fn_vis fn #fn_name() {
            ::pageflow::logging::init();
            let rt = match ::tokio::runtime::Builder::new_multi_thread().enable_all().build() {
                Ok(rt) => rt,
                Err(e) => panic!("Test '{}' could not start a runtime: {}", #test_name, e),
            };
            let result = rt.block_on(async {
                let timeout = ::std::time::Duration::from_millis(#timeout_ms);
                ::tokio::time::timeout(timeout, #body).await
            });

            match result {
                Ok(Ok(())) => (),
                Ok(Err(e)) => panic!("Test '{}' failed: {}", #test_name, e),
                Err(_) => panic!("Test '{}' timed out after {}ms", #test_name, #timeout_ms),
            }
        }
    })
}

// ============================================================================
// Helper Functions
// ============================================================================

/// The single field of a wrapper struct
#[derive(Debug, PartialEq, Eq)]
enum WrappedField {
    Unnamed,
    Named(syn::Ident),
}

fn wrapped_field(input: &DeriveInput) -> syn::Result<WrappedField> {
    let fields = match &input.data {
        Data::Struct(data) => &data.fields,
        _ => {
            return Err(syn::Error::new_spanned(
                &input.ident,
                "only structs can be page or component objects",
            ))
        }
    };
    match fields {
        Fields::Unnamed(f) if f.unnamed.len() == 1 => Ok(WrappedField::Unnamed),
        Fields::Named(f) if f.named.len() == 1 => f
            .named
            .first()
            .and_then(|field| field.ident.clone())
            .map(WrappedField::Named)
            .ok_or_else(|| syn::Error::new_spanned(&input.ident, "unnamed field")),
        _ => Err(syn::Error::new_spanned(
            &input.ident,
            "expected a struct with exactly one field",
        )),
    }
}

/// Extract `value` from `#[attr(key = "value")]`
fn extract_str_attribute(attrs: &[Attribute], attr_name: &str, key: &str) -> syn::Result<Option<String>> {
    for attr in attrs {
        if !attr.path().is_ident(attr_name) {
            continue;
        }
        if let Meta::NameValue(nv) = attr.parse_args::<Meta>()? {
            if nv.path.is_ident(key) {
                if let syn::Expr::Lit(syn::ExprLit {
                    lit: Lit::Str(s), ..
                }) = &nv.value
                {
                    return Ok(Some(s.value()));
                }
                return Err(syn::Error::new_spanned(&nv.value, "expected a string literal"));
            }
        }
    }
    Ok(None)
}

/// Parse `timeout_ms = N` from attribute text
fn parse_timeout_attr(attr: &str) -> Option<u64> {
    let (key, value) = attr.split_once('=')?;
    if key.trim() != "timeout_ms" {
        return None;
    }
    value.trim().replace('_', "").parse().ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use syn::parse_quote;

    mod attribute_tests {
        use super::*;

        #[test]
        fn test_extract_url() {
            let input: DeriveInput = parse_quote! {
                #[page(url = "https://site.test/home")]
                struct HomePage(Page);
            };
            let url = extract_str_attribute(&input.attrs, "page", "url").unwrap();
            assert_eq!(url.as_deref(), Some("https://site.test/home"));
        }

        #[test]
        fn test_extract_ignores_other_attributes() {
            let input: DeriveInput = parse_quote! {
                #[derive(Debug)]
                #[component(selector = "#modal-id")]
                struct Modal(Component);
            };
            assert!(extract_str_attribute(&input.attrs, "page", "url").unwrap().is_none());
            assert_eq!(
                extract_str_attribute(&input.attrs, "component", "selector").unwrap().as_deref(),
                Some("#modal-id")
            );
        }

        #[test]
        fn test_non_string_value_is_error() {
            let input: DeriveInput = parse_quote! {
                #[page(url = 42)]
                struct Broken(Page);
            };
            assert!(extract_str_attribute(&input.attrs, "page", "url").is_err());
        }

        #[test]
        fn test_parse_timeout_attr() {
            assert_eq!(parse_timeout_attr("timeout_ms = 5000"), Some(5000));
            assert_eq!(parse_timeout_attr("timeout_ms = 20_000"), Some(20_000));
            assert_eq!(parse_timeout_attr(""), None);
            assert_eq!(parse_timeout_attr("retries = 3"), None);
        }
    }

    mod expansion_tests {
        use super::*;

        #[test]
        fn test_wrapped_field_shapes() {
            let tuple: DeriveInput = parse_quote! { struct A(Page); };
            assert_eq!(wrapped_field(&tuple).unwrap(), WrappedField::Unnamed);

            let named: DeriveInput = parse_quote! { struct B { inner: Page } };
            assert_eq!(
                wrapped_field(&named).unwrap(),
                WrappedField::Named(ident("inner"))
            );

            let two: DeriveInput = parse_quote! { struct C(Page, u8); };
            assert!(wrapped_field(&two).is_err());

            let unit: DeriveInput = parse_quote! { struct D; };
            assert!(wrapped_field(&unit).is_err());
        }

        #[test]
        fn test_page_expansion_implements_trait_and_deref() {
            let input: DeriveInput = parse_quote! {
                #[page(url = "https://site.test/home")]
                struct HomePage(Page);
            };
            let tokens = expand_wrapper(&input, &WrapperKind::PAGE).unwrap().to_string();
            assert!(tokens.contains(":: pageflow :: PageObject for HomePage"));
            assert!(tokens.contains("const URL"));
            assert!(tokens.contains("\"https://site.test/home\""));
            assert!(tokens.contains("Deref for HomePage"));
        }

        #[test]
        fn test_missing_selector_is_error() {
            let input: DeriveInput = parse_quote! { struct Modal(Component); };
            let err = expand_wrapper(&input, &WrapperKind::COMPONENT).unwrap_err();
            assert!(err.to_string().contains("component(selector"));
        }

        #[test]
        fn test_empty_url_is_error() {
            let input: DeriveInput = parse_quote! {
                #[page(url = "  ")]
                struct Blank(Page);
            };
            assert!(expand_wrapper(&input, &WrapperKind::PAGE).is_err());
        }

        #[test]
        fn test_sync_test_fn_is_rejected() {
            let item: syn::ItemFn = parse_quote! { fn not_async() {} };
            assert!(expand_test(&item, 100).is_err());
        }

        #[test]
        fn test_async_test_fn_expands_with_timeout() {
            let item: syn::ItemFn = parse_quote! {
                async fn opens() -> PageflowResult<()> { Ok(()) }
            };
            let tokens = expand_test(&item, 1234).unwrap().to_string();
            assert!(tokens.contains("# [test]"));
            assert!(tokens.contains("1234u64"));
        }
    }
}
