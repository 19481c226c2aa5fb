//! Display text for reference occurrences and headings for defining directives.
//!
//! A reference that cannot be resolved never fails: it is rendered with its raw
//! text and the problem is returned as a [`Diagnostic`]. A definition that
//! cannot be resolved is an error, since the object it documents does not exist.

use std::fmt;

use tracing::warn;

use crate::backend::Backend;
use crate::error::{DomainError, Result};
use crate::reference::{ObjectReference, ObjectType, Title};
use crate::registry::{DuplicateDefinition, Link, Registry};
use crate::resolver::Resolver;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    MalformedReference,
    ReferenceNotFound,
    BackendUnavailable,
    DefinitionNotFound,
    DuplicateDefinition,
}

impl DiagnosticKind {
    /// Only broken definitions can fail a build.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DiagnosticKind::DefinitionNotFound)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub document: String,
    pub line: Option<usize>,
    pub kind: DiagnosticKind,
    pub message: String,
}

impl Diagnostic {
    pub fn new(document: &str, line: Option<usize>, kind: DiagnosticKind, message: String) -> Self {
        Self {
            document: document.to_string(),
            line,
            kind,
            message,
        }
    }
    pub fn duplicate(line: Option<usize>, duplicate: &DuplicateDefinition) -> Self {
        Self::new(
            &duplicate.document,
            line,
            DiagnosticKind::DuplicateDefinition,
            duplicate.to_string(),
        )
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{}:{}: {}", self.document, line, self.message),
            None => write!(f, "{}: {}", self.document, self.message),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedReference {
    pub title: Title,
    /// The identifier to link to, if the occurrence may carry a link at all.
    pub identifier: Option<String>,
    pub target: Option<Link>,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Definition {
    pub identifier: String,
    pub object_type: ObjectType,
    pub title: String,
    pub anchor: String,
    pub index_text: String,
    pub duplicate: Option<DuplicateDefinition>,
}

fn diagnostic_kind(error: &DomainError) -> DiagnosticKind {
    match error {
        DomainError::MalformedReference { .. } => DiagnosticKind::MalformedReference,
        DomainError::BackendUnavailable { .. } => DiagnosticKind::BackendUnavailable,
        _ => DiagnosticKind::ReferenceNotFound,
    }
}

/// Resolves and decorates one reference occurrence found in `document`.
pub fn reference_title<B: Backend>(
    resolver: &Resolver<B>,
    registry: &Registry,
    document: &str,
    line: Option<usize>,
    object_type: ObjectType,
    text: &str,
) -> ResolvedReference {
    let mut diagnostics = Vec::new();
    let reference = match ObjectReference::parse(object_type, text) {
        Ok(reference) => reference,
        Err(e) => {
            warn!(document, line, %object_type, target = text, "{}", e);
            diagnostics.push(Diagnostic::new(document, line, DiagnosticKind::MalformedReference, e.to_string()));
            return ResolvedReference {
                title: Title::Fallback(text.to_string()),
                identifier: None,
                target: None,
                diagnostics,
            };
        }
    };
    let identifier = reference.identifier();
    let resolved = match resolver.get_property(object_type, &identifier, reference.property_override()) {
        Ok(resolved) => resolved,
        Err(e) => {
            warn!(document, line, %object_type, target = text, cause = %e, "lookup failed");
            diagnostics.push(Diagnostic::new(document, line, diagnostic_kind(&e), e.to_string()));
            None
        }
    };
    let title = reference.render_title(resolved.as_deref());
    if title.is_fallback() && diagnostics.is_empty() {
        let e = DomainError::ReferenceNotFound {
            object_type,
            text: text.to_string(),
        };
        warn!(document, line, %object_type, target = text, "{}", e);
        diagnostics.push(Diagnostic::new(document, line, DiagnosticKind::ReferenceNotFound, e.to_string()));
    }
    // a negated reference is displayed without a link
    let identifier = (!reference.negate()).then_some(identifier);
    let mut resolved = ResolvedReference {
        title,
        identifier,
        target: None,
        diagnostics,
    };
    resolved.relink(registry, document);
    resolved
}

impl ResolvedReference {
    /// Looks the link target up again, once more documents have been defined.
    pub fn relink(&mut self, registry: &Registry, document: &str) {
        self.target = self
            .identifier
            .as_deref()
            .and_then(|identifier| registry.link(document, identifier));
    }
}

/// Resolves the heading of a defining directive and registers it in `registry`.
pub fn define<B: Backend>(
    resolver: &Resolver<B>,
    registry: &mut Registry,
    document: &str,
    line: Option<usize>,
    object_type: ObjectType,
    signature: &str,
) -> Result<Definition> {
    let reference = ObjectReference::plain(object_type, signature)?;
    let identifier = reference.identifier();
    let not_found = || DomainError::DefinitionNotFound {
        object_type,
        identifier: identifier.clone(),
    };
    let title = match resolver.get_property(object_type, &identifier, None) {
        Ok(Some(title)) if !title.is_empty() => title,
        Ok(_) => {
            warn!(document, line, %object_type, identifier = %identifier, "definition not found");
            return Err(not_found());
        }
        Err(e) => {
            warn!(document, line, %object_type, identifier = %identifier, cause = %e, "definition lookup failed");
            return Err(not_found());
        }
    };
    let duplicate = registry.define(&identifier, document, object_type);
    Ok(Definition {
        index_text: format!("{} ({})", title, identifier),
        anchor: identifier.clone(),
        identifier,
        object_type,
        title,
        duplicate,
    })
}
