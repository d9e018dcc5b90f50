macro_rules! register_diagnostics {
    ( $( $error_code:ident ),* $(,)* ) => {
        /// An array of `(error_code, diagnostic)`.
        #[cfg(feature = "diagnostics")]
        pub static DIAGNOSTICS: &[(&str, &str)] = &[
            $(
                (
                    stringify!($error_code),
                    concat!(
                        "\n",
                        include_str!(concat!("./error_codes/", stringify!($error_code), ".md")),
                    ),
                )
            ),*
        ];

        #[cfg(doc)]
        /// This type exists only for documentation purposes. It doesn't exist in the code otherwise.
        ///
        /// This type has 2 goals:
        ///
        /// 1. To provide an idiomatic Rust documentation for all error codes,
        /// 2. To keep the error code diagnostics close to the code they document.
        pub enum Diagnostics {
            $(
                #[doc = include_str!(concat!("./error_codes/", stringify!($error_code), ".md"))]
                $error_code
            ),*
        }
    };
}

register_diagnostics!(E000, E001, E002, E003, E004, E005, E006, E007, E008);
