//! `dasm_errors` provides the basic features to declare human-understandable
//! errors, along with diagnostics.
//!
//! First off, `dasm_errors` provides the [`error!`] macro that helps to
//! declare types that implement [`std::error::Error`], and also derive
//! [`thiserror::Error`] and [`miette::Diagnostic`]. The macro helps to define
//! an error code, a message, a formatted message, and a help text. As an
//! example, see the [`Error`] type of this very crate, which is built with
//! the macro.
//!
//! The second feature is the diagnostics catalog. When an error has a code,
//! e.g. `E004`, the code can be used to further explain the error with
//! `dasm --explain E004`, à la `rustc`. The long-form explanations live in
//! `src/error_codes/*.md` and are compiled into the `DIAGNOSTICS` array
//! behind the `diagnostics` feature.

#![deny(unused)]
#![deny(warnings)]
#![deny(clippy::all)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]
#![deny(rustdoc::missing_crate_level_docs)]
#![deny(rustdoc::invalid_codeblock_attributes)]
#![deny(rustdoc::invalid_rust_codeblocks)]

mod error_codes;

#[cfg(doc)]
pub use error_codes::Diagnostics;
#[cfg(feature = "diagnostics")]
pub use error_codes::DIAGNOSTICS;
pub use miette::Result;

#[doc(hidden)]
#[macro_export]
macro_rules! as_item {
    ($item:item) => {
        $item
    };
}

/// Use this macro to declare a type that acts like a human-understandable
/// error, with diagnostics.
///
/// # Example
///
/// An example is better than a long text:
///
/// ```rust
/// use dasm_errors::error;
///
/// error! {
///     pub enum Error {
///         #[code = E000]
///         #[message = "The given error code is invalid."]
///         #[formatted_message("`{0}` is not a valid error code.")]
///         #[help = "Did you mistype the error code?"]
///         InvalidCode(String),
///     }
/// }
///
/// # fn main() {
/// let error = Error::InvalidCode("xyz".to_string());
///
/// // Get the error as a string.
/// assert_eq!(
///     error.to_string(),
///     "`xyz` is not a valid error code.".to_string()
/// );
///
/// // Get more information on the error, via `miette`.
///
/// use miette::Diagnostic;
///
/// assert_eq!(
///     error.code().map(|code| code.to_string()),
///     Some("E000".to_string())
/// );
/// assert_eq!(
///     error.help().map(|help| help.to_string()),
///     Some("Did you mistype the error code?".to_string())
/// );
/// # }
/// ```
///
/// This creates an `Error` enum type with an `InvalidCode` tuple variant,
/// implementing [`thiserror::Error`] and [`miette::Diagnostic`].
///
/// # Syntax
///
/// The macro supports an `enum` declaration with unit or tuple variants.
/// Each variant takes the following attributes:
///
/// * `#[code = E...]` to define the error code (optional),
/// * `#[message = "…"]` to define a literal string message; it is used as
///   documentation and as the [`std::fmt::Display`] implementation unless a
///   formatted message is given,
/// * `#[formatted_message("format {0}")]` to define a “dynamic” message
///   interpolating the variant fields, following the same rules as the
///   `#[error(…)]` attribute of [`thiserror`] (optional),
/// * `#[help = "…"]` to define a help, a hint, a tip, to drive the user
///   towards a solution; this one is mandatory.
#[macro_export]
macro_rules! error {
    // Error declaration with a dynamic message.
    (
        @variant
        [ $( $declaration:tt )* ]
        [ $( $accumulator:tt )* ]
        $( #[code = $error_code:ident] )?
        #[message = $error_message:expr]
        #[formatted_message( $error_message_format:literal )]
        #[help = $error_help:literal]
        $variant_name:ident $( ( $( $field_type:ty ),* $( , )? ) )? ,
        $( $tail:tt )*
    ) => {
        error! {
            @variant
            [ $( $declaration )* ]
            [
                $( $accumulator )*

                #[doc = $error_message]
                #[error($error_message_format)]
                #[diagnostic(
                    $( code($error_code), )?
                    help($error_help),
                )]
                $variant_name $( ( $( $field_type ),* ) )? ,
            ]
            $( $tail )*
        }
    };

    // Error declaration with a static literal message.
    (
        @variant
        [ $( $declaration:tt )* ]
        [ $( $accumulator:tt )* ]
        $( #[code = $error_code:ident] )?
        #[message = $error_message:expr]
        #[help = $error_help:literal]
        $variant_name:ident $( ( $( $field_type:ty ),* $( , )? ) )? ,
        $( $tail:tt )*
    ) => {
        error! {
            @variant
            [ $( $declaration )* ]
            [
                $( $accumulator )*

                #[doc = $error_message]
                #[error($error_message)]
                #[diagnostic(
                    $( code($error_code), )?
                    help($error_help),
                )]
                $variant_name $( ( $( $field_type ),* ) )? ,
            ]
            $( $tail )*
        }
    };

    // End point.
    (
        @variant
        [ $( $declaration:tt )* ]
        [ $( $accumulator:tt )* ]
    ) => {
        $crate::as_item! {
            $( $declaration )* {
                $( $accumulator )*
            }
        }
    };

    // Entry point.
    (
        $( #[doc = $documentation:expr ] )*
        $visibility:vis enum $error_name:ident {
            $( $variants:tt )*
        }
    ) => {
        error! {
            @variant
            [
                $( #[doc = $documentation ] )*
                #[derive(Debug, thiserror::Error, miette::Diagnostic)]
                $visibility enum $error_name
            ]
            []
            $( $variants )*
        }
    };
}

error! {
    #[doc = "Error type for this crate."]
    #[doc = "\n"]
    #[doc = "The major interest of this type is its `Self::explain` method, which"]
    #[doc = "fetches the diagnostic associated with a particular error code."]
    pub enum Error {
        #[code = E000]
        #[message = "The given error code is invalid."]
        #[formatted_message("`{0}` is not a valid error code.")]
        #[help = "Did you mistype the error code? The pattern is `E[0-9]{{3}}`, i.e. an `E` followed by 3 digits, such as `E000`."]
        InvalidCode(String),
    }
}

impl Error {
    /// Given a specific error code, this method returns the associated
    /// diagnostic, if the error exists.
    ///
    /// ```
    /// use dasm_errors::Error;
    ///
    /// # fn main() {
    /// // Explain a valid error.
    /// assert!(Error::explain("E000").is_ok());
    ///
    /// // Explain an invalid error.
    /// assert!(Error::explain("oops").is_err());
    /// # }
    /// ```
    #[cfg(feature = "diagnostics")]
    pub fn explain(error_code: &str) -> Result<&'static str, Self> {
        DIAGNOSTICS
            .iter()
            .find_map(
                |(current_error_code, diagnostic)| {
                    if *current_error_code == error_code {
                        Some(*diagnostic)
                    } else {
                        None
                    }
                },
            )
            .ok_or(Self::InvalidCode(error_code.to_owned()))
    }
}
