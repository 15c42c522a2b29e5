//! Defines the [`Value`] enum, representing the data a template is filled
//! with.

mod from;
#[cfg(feature = "serde")]
mod ser;

pub use std::collections::BTreeMap as Map;
use std::mem;
pub use std::vec::Vec as List;

#[cfg(feature = "serde")]
pub use crate::value::ser::to_value;

/// Data a template is filled with, represented as a recursive enum.
#[derive(Debug, Clone)]
pub enum Value {
    None,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(List<Value>),
    Map(Map<String, Value>),
    Image(Image),
}

/// Binary image content to be inserted by an `{#image ...}` marker.
///
/// The image is added to the output package under `Pictures/<name>` and
/// referenced from the document body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    /// File name of the image inside the package, e.g. `photo.png`.
    pub name: String,
    /// Media type of the content, e.g. `image/png`.
    pub media_type: String,
    /// The raw image bytes.
    pub content: Vec<u8>,
}

impl Value {
    /// Whether the value counts as true in an `{#if ...}` condition.
    ///
    /// `None`, `false`, `0`, `0.0` and the empty string are false;
    /// everything else, including empty lists and maps, is true.
    pub(crate) fn is_truthy(&self) -> bool {
        match self {
            Self::None => false,
            Self::Bool(b) => *b,
            Self::Integer(n) => *n != 0,
            Self::Float(n) => *n != 0.0 && !n.is_nan(),
            Self::String(s) => !s.is_empty(),
            Self::List(_) | Self::Map(_) | Self::Image(_) => true,
        }
    }

    /// A human readable name for the type of the value.
    pub(crate) fn human(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Bool(_) => "bool",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::Image(_) => "image",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Bool(s), Self::Bool(o)) => s == o,
            (Self::Integer(s), Self::Integer(o)) => s == o,
            (Self::Float(s), Self::Float(o)) => s == o,
            (Self::Integer(s), Self::Float(o)) | (Self::Float(o), Self::Integer(s)) => {
                *s as f64 == *o
            }
            (Self::String(s), Self::String(o)) => s == o,
            (Self::List(s), Self::List(o)) => s == o,
            (Self::Map(s), Self::Map(o)) => s == o,
            (Self::Image(s), Self::Image(o)) => s == o,
            _ => mem::discriminant(self) == mem::discriminant(other),
        }
    }
}
