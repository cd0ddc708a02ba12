// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Types as the lowering sees them.
//!
//! Just enough structure to recognize machine templates and by-reference
//! aliases; everything else rides through as [`Ty::Named`] or
//! [`Ty::Unknown`].

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Ty {
    Unit,
    Bool,
    Int,
    Str,
    /// Nominal type by name: machine templates, data types, awaitables.
    Named(String),
    /// By-reference alias to a value of the inner type.
    ByRef(Box<Ty>),
    Fn { params: Vec<Ty>, ret: Box<Ty> },
    Unknown,
}

impl Ty {
    pub fn named(name: &str) -> Ty {
        Ty::Named(name.to_string())
    }

    pub fn by_ref(inner: Ty) -> Ty {
        Ty::ByRef(Box::new(inner))
    }

    pub fn func(params: Vec<Ty>, ret: Ty) -> Ty {
        Ty::Fn {
            params,
            ret: Box::new(ret),
        }
    }

    /// The pointee when this is a by-reference type.
    pub fn by_ref_target(&self) -> Option<&Ty> {
        match self {
            Ty::ByRef(inner) => Some(inner),
            _ => None,
        }
    }
}
