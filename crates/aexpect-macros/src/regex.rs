//! `regex!` implementation.

use proc_macro2::TokenStream;
use quote::quote;
use syn::parse::{Parse, ParseStream};
use syn::{LitStr, Result};

/// The regex! macro input.
pub struct RegexInput {
    /// The regex pattern string.
    pub pattern: LitStr,
}

impl Parse for RegexInput {
    fn parse(input: ParseStream) -> Result<Self> {
        Ok(Self {
            pattern: input.parse()?,
        })
    }
}

/// Generate code for the regex! macro.
pub fn expand(input: RegexInput) -> TokenStream {
    if let Err(e) = regex::Regex::new(&input.pattern.value()) {
        return syn::Error::new(input.pattern.span(), format!("invalid regex: {e}"))
            .to_compile_error();
    }

    let lit = &input.pattern;
    quote! {
        {
            static REGEX: ::std::sync::LazyLock<::aexpect::__private::Regex> =
                ::std::sync::LazyLock::new(|| {
                    ::aexpect::__private::Regex::new(#lit)
                        .unwrap_or_else(|e| unreachable!("regex validated at compile time: {e}"))
                });
            &*REGEX
        }
    }
}

#[cfg(test)]
mod tests {
    use syn::parse_quote;

    use super::*;

    #[test]
    fn parse_simple_regex() {
        let input: RegexInput = parse_quote! {
            r"hello\s+world"
        };
        assert_eq!(input.pattern.value(), r"hello\s+world");
    }

    #[test]
    fn invalid_regex_is_a_compile_error() {
        let input: RegexInput = parse_quote! { "[oops" };
        assert!(expand(input).to_string().contains("compile_error"));
    }
}
