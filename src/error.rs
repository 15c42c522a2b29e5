use std::fmt;
use std::io;

/// A convenient type alias for results in this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// An error that can occur while filling a template.
#[derive(Clone)]
pub struct Error {
    kind: ErrorKind,
    msg: String,
}

/// The category of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A structural template error: unbalanced or mismatched block markers.
    Template,
    /// A malformed expression inside a marker.
    Expression,
    /// A value could not be rendered as text.
    Render,
    /// The ZIP container could not be read or written.
    Archive,
    /// The document XML could not be parsed or serialized.
    Xml,
    /// The package manifest is missing or invalid.
    Manifest,
    /// An internal invariant was violated; indicates a bug.
    Internal,
    /// Failed to convert data into a [`Value`][crate::Value].
    #[cfg(feature = "serde")]
    Data,
}

impl Error {
    pub(crate) fn new(kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self {
            kind,
            msg: msg.into(),
        }
    }

    pub(crate) fn template(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Template, msg)
    }

    pub(crate) fn expression(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Expression, msg)
    }

    pub(crate) fn render(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Render, msg)
    }

    pub(crate) fn archive(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Archive, msg)
    }

    pub(crate) fn manifest(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Manifest, msg)
    }

    pub(crate) fn internal(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, msg)
    }

    /// Returns the category of this error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.msg)
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Error")
            .field("kind", &self.kind)
            .field("msg", &self.msg)
            .finish()
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Template => "invalid template",
            Self::Expression => "invalid expression",
            Self::Render => "render error",
            Self::Archive => "archive error",
            Self::Xml => "xml error",
            Self::Manifest => "manifest error",
            Self::Internal => "internal error",
            #[cfg(feature = "serde")]
            Self::Data => "data error",
        };
        f.write_str(name)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::new(ErrorKind::Archive, err.to_string())
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        Self::new(ErrorKind::Archive, err.to_string())
    }
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        Self::new(ErrorKind::Xml, err.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for Error {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        Self::new(ErrorKind::Xml, err.to_string())
    }
}

#[cfg(feature = "serde")]
impl serde::ser::Error for Error {
    fn custom<T>(msg: T) -> Self
    where
        T: fmt::Display,
    {
        Self::new(ErrorKind::Data, msg.to_string())
    }
}
