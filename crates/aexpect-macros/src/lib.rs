//! aexpect-macros: Procedural macros for aexpect
//!
//! - [`patterns!`] - A compile-time validated pattern list for expect reads
//! - [`regex!`] - A compile-time validated, lazily compiled regex
//!
//! # Example
//!
//! ```ignore
//! use aexpect::{patterns, PatternReader};
//!
//! let (index, _) = session
//!     .read_until_last_line_matches(&patterns![r"login:\s*$", literal("[y/N]")], options)
//!     .await?;
//! ```

// In proc-macro crates, passing parsed input by value is idiomatic
#![allow(clippy::needless_pass_by_value)]

use proc_macro::TokenStream;
use syn::parse_macro_input;

mod patterns;
mod regex;

/// A list of patterns for the expect reads, as `[&'static str; N]`.
///
/// String literals are regular expressions and fail to compile if invalid.
/// `literal("...")` matches the text verbatim.
///
/// ```ignore
/// let prompts = patterns![r"[\#\$]\s*$", literal("(yes/no)?")];
/// ```
#[proc_macro]
pub fn patterns(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as patterns::PatternsInput);
    patterns::expand(input).into()
}

/// Compile-time validated regex, evaluating to `&'static Regex`.
///
/// ```ignore
/// let prompt = aexpect::regex!(r"^\w+@\w+:\S+\$\s*$");
/// ```
#[proc_macro]
pub fn regex(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as regex::RegexInput);
    regex::expand(input).into()
}
