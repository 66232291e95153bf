// SPDX-License-Identifier: Apache-2.0 OR MIT
use crate::ast::Span;
use thiserror::Error;

/// Unified error type for the template engine.
///
/// Errors carry the message, optional source error, and – when available – the
/// `Span` pointing to the offending location in the template. A lookup of a key
/// that is absent from the data is reported through the dedicated
/// [`Error::MissingKey`] variant so callers can react to it without inspecting
/// message text.
#[derive(Debug, Error)]
pub enum Error {
    #[error("parse error: {message}")]
    Parse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        span: Option<Span>,
    },
    #[error("render error: {message}")]
    Render {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        span: Option<Span>,
    },
    /// A field reference had no entry in the data while rendering with
    /// [`MissingKey::Error`](crate::MissingKey::Error).
    #[error("map has no entry for key \"{key}\"")]
    MissingKey { key: String, span: Option<Span> },
}

/// A missing-key policy name that is not one of `default`, `invalid`, `zero`
/// or `error`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown missing-key policy \"{0}\"")]
pub struct UnknownPolicy(pub String);

impl Error {
    pub fn parse(message: impl Into<String>, span: Option<Span>) -> Self {
        Error::Parse {
            message: message.into(),
            source: None,
            span,
        }
    }

    pub fn parse_with_span(message: impl Into<String>, span: Span) -> Self {
        Self::parse(message, Some(span))
    }

    pub fn render(message: impl Into<String>, span: Option<Span>) -> Self {
        Error::Render {
            message: message.into(),
            source: None,
            span,
        }
    }

    pub fn render_with_span(message: impl Into<String>, span: Span) -> Self {
        Self::render(message, Some(span))
    }

    pub fn missing_key(key: impl Into<String>) -> Self {
        Error::MissingKey {
            key: key.into(),
            span: None,
        }
    }

    /// Returns the unresolved reference path when this is a missing-key failure.
    pub fn missing_key_path(&self) -> Option<&str> {
        match self {
            Error::MissingKey { key, .. } => Some(key),
            _ => None,
        }
    }

    pub fn is_missing_key(&self) -> bool {
        matches!(self, Error::MissingKey { .. })
    }

    pub fn span(&self) -> Option<Span> {
        match self {
            Error::Parse { span, .. } | Error::Render { span, .. } | Error::MissingKey { span, .. } => {
                *span
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_exposes_path() {
        let err = Error::missing_key(".a.c");
        assert!(err.is_missing_key());
        assert_eq!(err.missing_key_path(), Some(".a.c"));
        assert_eq!(err.to_string(), "map has no entry for key \".a.c\"");
    }

    #[test]
    fn render_error_is_not_missing_key() {
        let err = Error::render_with_span("boom", Span::new(1, 3));
        assert!(!err.is_missing_key());
        assert_eq!(err.missing_key_path(), None);
        assert_eq!(err.span(), Some(Span::new(1, 3)));
    }
}
