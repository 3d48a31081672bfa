//! `patterns!` implementation.
//!
//! Expands to an array of regex strings usable with the expect reads. Plain
//! string literals are regexes and are validated here; `literal("...")`
//! entries are escaped so they match verbatim.

use proc_macro2::TokenStream;
use quote::quote;
use syn::parse::{Parse, ParseStream};
use syn::punctuated::Punctuated;
use syn::{Ident, LitStr, Result, Token, braced};

/// One entry of the list.
pub enum PatternEntry {
    /// A regular expression.
    Regex(LitStr),
    /// Text matched verbatim.
    Literal(LitStr),
}

impl Parse for PatternEntry {
    fn parse(input: ParseStream) -> Result<Self> {
        if input.peek(Ident) {
            let kind: Ident = input.parse()?;
            let content;
            syn::parenthesized!(content in input);
            let lit: LitStr = content.parse()?;
            return match kind.to_string().as_str() {
                "literal" | "lit" => Ok(Self::Literal(lit)),
                "regex" | "re" => Ok(Self::Regex(lit)),
                _ => Err(syn::Error::new(
                    kind.span(),
                    format!("unknown pattern kind: {kind}"),
                )),
            };
        }
        Ok(Self::Regex(input.parse()?))
    }
}

/// The patterns! macro input.
pub struct PatternsInput {
    /// The entries, in match priority order.
    pub entries: Punctuated<PatternEntry, Token![,]>,
}

impl Parse for PatternsInput {
    fn parse(input: ParseStream) -> Result<Self> {
        let entries = if input.peek(syn::token::Brace) {
            let content;
            braced!(content in input);
            Punctuated::parse_terminated(&content)?
        } else {
            Punctuated::parse_terminated(input)?
        };
        Ok(Self { entries })
    }
}

/// Generate code for the patterns! macro.
pub fn expand(input: PatternsInput) -> TokenStream {
    let mut patterns = Vec::with_capacity(input.entries.len());
    for entry in input.entries {
        let lit = match entry {
            PatternEntry::Regex(lit) => {
                if let Err(e) = regex::Regex::new(&lit.value()) {
                    return syn::Error::new(lit.span(), format!("invalid regex: {e}"))
                        .to_compile_error();
                }
                lit
            }
            PatternEntry::Literal(lit) => LitStr::new(&regex::escape(&lit.value()), lit.span()),
        };
        patterns.push(lit);
    }

    quote! {
        [#(#patterns),*]
    }
}

#[cfg(test)]
mod tests {
    use syn::parse_quote;

    use super::*;

    #[test]
    fn parses_mixed_entries() {
        let input: PatternsInput = parse_quote! {
            r"\$\s*$", literal("a.b"), re("x+")
        };
        assert_eq!(input.entries.len(), 3);
        assert!(matches!(input.entries[1], PatternEntry::Literal(_)));
    }

    #[test]
    fn escapes_literals() {
        let input: PatternsInput = parse_quote! { literal("a.b") };
        let expanded = expand(input).to_string();
        assert!(expanded.contains(r#""a\\.b""#));
    }

    #[test]
    fn invalid_regex_is_a_compile_error() {
        let input: PatternsInput = parse_quote! { "(" };
        assert!(expand(input).to_string().contains("compile_error"));
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let parsed: Result<PatternsInput> = syn::parse_str(r#"glob("*")"#);
        assert!(parsed.is_err());
    }
}
