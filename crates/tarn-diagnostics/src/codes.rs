//! Registry of diagnostic codes.
//!
//! Every code the lowering phase can emit is declared here once, with a
//! short title and a category. The JSON reporter joins emitted codes
//! against this table for their metadata.

use std::collections::HashMap;

/// Compiler area a code belongs to.
#[derive(Debug, Clone, Copy)]
pub enum ErrorCategory {
    Lowering,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Lowering => write!(f, "Lowering"),
        }
    }
}

/// Static metadata for one code.
pub struct ErrorCodeInfo {
    pub code: &'static str,
    pub title: &'static str,
    pub category: ErrorCategory,
}

/// All known codes, keyed by their string form.
pub struct ErrorCodeRegistry {
    codes: HashMap<&'static str, ErrorCodeInfo>,
}

macro_rules! code_table {
    ($($code:literal: $cat:ident => $title:literal,)*) => {
        HashMap::from([$(
            (
                $code,
                ErrorCodeInfo {
                    code: $code,
                    title: $title,
                    category: ErrorCategory::$cat,
                },
            ),
        )*])
    };
}

impl Default for ErrorCodeRegistry {
    fn default() -> Self {
        ErrorCodeRegistry {
            // Machine lowering warnings occupy the W08xx block.
            codes: code_table! {
                "W0801": Lowering => "suspension inside try/finally",
                "W0802": Lowering => "suspension inside a for loop",
                "W0803": Lowering => "suspension inside an exception handler",
                "W0804": Lowering => "recursive binding in resumable code",
                "W0805": Lowering => "expansion arity mismatch",
                "W0806": Lowering => "non-constant resume target",
                "W0807": Lowering => "unexpanded expansion binding",
                "W0808": Lowering => "protected region without a resume slot",
            },
        }
    }
}

impl ErrorCodeRegistry {
    /// Look up a code string like "W0802".
    pub fn get(&self, code: &str) -> Option<&ErrorCodeInfo> {
        self.codes.get(code)
    }

    /// Iterate every registered code, in no particular order.
    pub fn all(&self) -> impl Iterator<Item = &ErrorCodeInfo> {
        self.codes.values()
    }
}
