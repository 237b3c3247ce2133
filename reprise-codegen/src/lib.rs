use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::quote;
use quote::quote_spanned;
use std::path::Path;

/// Wrap a test in a recording session against the named script.
#[proc_macro_attribute]
pub fn reprise_record_test(attrs: TokenStream, item: TokenStream) -> TokenStream {
    reprise_test(attrs, item, quote! { ::reprise::RepriseMode::Record })
}

/// Wrap a test in a playback session against the named script.
#[proc_macro_attribute]
pub fn reprise_playback_test(attrs: TokenStream, item: TokenStream) -> TokenStream {
    reprise_test(attrs, item, quote! { ::reprise::RepriseMode::Playback })
}

fn reprise_test(
    attrs: TokenStream,
    item: TokenStream,
    enum_variant: proc_macro2::TokenStream,
) -> TokenStream {
    let input = syn::parse_macro_input!(item as syn::ItemFn);
    let args = syn::parse_macro_input!(attrs as syn::AttributeArgs);

    let signature = &input.sig;
    let block = &input.block;

    let markdown_name: String;

    if args.len() < 2 {
        return quote! {
            compile_error!("A markdown name and a configuration function should be passed to the macro");
        }
        .into();
    }

    if let syn::NestedMeta::Lit(syn::Lit::Str(parsed_markdown_name)) = &args[0] {
        markdown_name = parsed_markdown_name.value();
        if let Err(stream) = validate_markdown_path(&markdown_name, parsed_markdown_name.span()) {
            return stream.into();
        }
    } else {
        return quote! {
            compile_error!("The first argument should be a string literal!");
        }
        .into();
    }

    let configuration_function;
    if let syn::NestedMeta::Meta(syn::Meta::Path(function_path)) = &args[1] {
        configuration_function = function_path;
    } else {
        let error = quote! {
            compile_error!("The second argument should be a configuration function!");
        };

        return error.into();
    }

    let output = quote! {
        #[test]
        #signature {
            let mut __reprise_configuration =
                ::reprise::RepriseConfiguration::new(#enum_variant, #markdown_name);
            #configuration_function(&mut __reprise_configuration);
            if let Err(e) = ::reprise::Session::before_test(__reprise_configuration) {
                panic!("Reprise error: {}", e);
            }

            if let Err(e) = ::std::panic::catch_unwind(|| #block) {
                let _ = ::reprise::Session::after_test();
                ::std::panic::resume_unwind(e);
            }
            if let Err(e) = ::reprise::Session::after_test() {
                panic!("Reprise error: {}", e);
            }
        }
    };

    TokenStream::from(output)
}

fn validate_markdown_path<P: AsRef<Path>>(
    path: P,
    span: Span,
) -> Result<(), proc_macro2::TokenStream> {
    if !path.as_ref().to_string_lossy().ends_with(".md") {
        return Err(quote_spanned! {span=>
            compile_error!("The path should point to a .md file!");
        });
    }

    Ok(())
}
