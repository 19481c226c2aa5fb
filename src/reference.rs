//! Object references as they appear in document source.
//!
//! A reference names a backend object with a dotted path whose meaning depends
//! on the [`ObjectType`]:
//!
//! | type | text | components |
//! |---|---|---|
//! | `model`, `wizard` | `sale.sale` | `["sale.sale"]` |
//! | `field`, `button` | `sale.sale.description` | `["sale.sale", "description"]` |
//! | `option` | `sale.sale.state.draft` | `["sale.sale", "state", "draft"]` |
//! | `data`, `menu`, `view` | `sale.menu_sale` | `["sale", "menu_sale"]` |
//!
//! Reference occurrences may carry decorations: a leading `!` negates the
//! displayed sense, a following `~` keeps only the last component of the
//! resolved title, and a trailing `|property` asks for a non-default display
//! property. The decoration grammar lives in `reference.pest`.

use std::fmt;
use std::str::FromStr;

use pest::Parser;
use pest_derive::Parser;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, Result};

#[derive(Parser)]
#[grammar = "reference.pest"]
struct ReferenceParser;

// ------------- ObjectType -------------
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectType {
    Model,
    Field,
    Data,
    Menu,
    Option,
    Button,
    Wizard,
    View,
    Figure,
}

impl ObjectType {
    pub const ALL: [ObjectType; 9] = [
        ObjectType::Model,
        ObjectType::Field,
        ObjectType::Data,
        ObjectType::Menu,
        ObjectType::Option,
        ObjectType::Button,
        ObjectType::Wizard,
        ObjectType::View,
        ObjectType::Figure,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ObjectType::Model => "model",
            ObjectType::Field => "field",
            ObjectType::Data => "data",
            ObjectType::Menu => "menu",
            ObjectType::Option => "option",
            ObjectType::Button => "button",
            ObjectType::Wizard => "wizard",
            ObjectType::View => "view",
            ObjectType::Figure => "figure",
        }
    }

    /// The backend property displayed when a reference does not ask for another one.
    pub fn default_property(&self) -> Option<&'static str> {
        match self {
            ObjectType::Model => Some("name"),
            ObjectType::Field => Some("field_description"),
            ObjectType::Data => Some("name"),
            ObjectType::Menu => Some("complete_name"),
            ObjectType::Option => Some("name"),
            ObjectType::Button => Some("string"),
            ObjectType::Wizard => Some("name"),
            ObjectType::View | ObjectType::Figure => None,
        }
    }

    /// Splits a reference target into the components this type expects.
    pub fn split(&self, target: &str) -> Result<Vec<String>> {
        let malformed = |reason: &str| DomainError::MalformedReference {
            object_type: *self,
            text: target.to_string(),
            reason: reason.to_string(),
        };
        if target.is_empty() {
            return Err(malformed("empty target"));
        }
        let components: Vec<&str> = match self {
            ObjectType::Model | ObjectType::Wizard | ObjectType::Figure => vec![target],
            ObjectType::Field | ObjectType::Button => match target.rsplit_once('.') {
                Some((model, name)) => vec![model, name],
                None => return Err(malformed("expected <model>.<name>")),
            },
            ObjectType::Option => {
                let mut parts: Vec<&str> = target.rsplitn(3, '.').collect();
                if parts.len() != 3 {
                    return Err(malformed("expected <model>.<field>.<option>"));
                }
                parts.reverse();
                parts
            }
            ObjectType::Data | ObjectType::Menu | ObjectType::View => match target.split_once('.') {
                Some((module, local_id)) => vec![module, local_id],
                None => return Err(malformed("expected <module>.<id>")),
            },
        };
        if components.iter().any(|c| c.is_empty()) {
            return Err(malformed("empty component"));
        }
        Ok(components.into_iter().map(String::from).collect())
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for ObjectType {
    type Err = DomainError;
    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim().trim_start_matches("tryton:");
        ObjectType::ALL
            .iter()
            .find(|t| t.name() == name)
            .copied()
            .ok_or_else(|| DomainError::UnknownObjectType(s.to_string()))
    }
}

// ------------- ObjectReference -------------
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectReference {
    object_type: ObjectType,
    raw_target: String,
    components: Vec<String>,
    property_override: Option<String>,
    strip_prefix: bool,
    negate: bool,
}

impl ObjectReference {
    /// Parses a reference occurrence, decorations included.
    pub fn parse(object_type: ObjectType, text: &str) -> Result<Self> {
        let malformed = |reason: String| DomainError::MalformedReference {
            object_type,
            text: text.to_string(),
            reason,
        };
        let reference = ReferenceParser::parse(Rule::reference, text)
            .map_err(|e| malformed(e.variant.message().into_owned()))?
            .next()
            .ok_or_else(|| malformed("empty reference".to_string()))?;

        let mut negate = false;
        let mut strip_prefix = false;
        let mut target = String::new();
        let mut property_override = None;
        for pair in reference.into_inner() {
            match pair.as_rule() {
                Rule::negate => negate = true,
                Rule::strip => strip_prefix = true,
                Rule::target => target = pair.as_str().replace("\\|", "|"),
                Rule::property => {
                    let property = pair.as_str();
                    if !property.is_empty() {
                        property_override = Some(property.to_string());
                    }
                }
                _ => (),
            }
        }
        let components = object_type.split(&target)?;
        Ok(Self {
            object_type,
            raw_target: text.to_string(),
            components,
            property_override,
            strip_prefix,
            negate,
        })
    }

    /// Parses the signature of a defining directive, which takes no decorations.
    pub fn plain(object_type: ObjectType, text: &str) -> Result<Self> {
        let target = text.trim();
        let components = object_type.split(target)?;
        Ok(Self {
            object_type,
            raw_target: target.to_string(),
            components,
            property_override: None,
            strip_prefix: false,
            negate: false,
        })
    }

    pub fn object_type(&self) -> ObjectType {
        self.object_type
    }
    pub fn raw_target(&self) -> &str {
        &self.raw_target
    }
    pub fn components(&self) -> &[String] {
        &self.components
    }
    pub fn property_override(&self) -> Option<&str> {
        self.property_override.as_deref()
    }
    pub fn strip_prefix(&self) -> bool {
        self.strip_prefix
    }
    pub fn negate(&self) -> bool {
        self.negate
    }

    /// The canonical identifier: the undecorated target, also used as link anchor.
    pub fn identifier(&self) -> String {
        self.components.join(".")
    }

    /// Applies the decorations to a resolved display value.
    pub fn render_title(&self, resolved: Option<&str>) -> Title {
        let value = match resolved.filter(|v| !v.is_empty()) {
            Some(value) => value,
            None => return Title::Fallback(self.raw_target.clone()),
        };
        let mut title = if self.strip_prefix {
            if self.property_override.is_some() {
                value.trim_matches('.').to_string()
            } else {
                value.rsplit_once('.').map_or(value, |(_, last)| last).to_string()
            }
        } else {
            value.to_string()
        };
        if self.negate {
            title.insert(0, '!');
        }
        Title::Resolved(title)
    }
}

impl fmt::Display for ObjectReference {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.object_type, self.raw_target)
    }
}

// ------------- Title -------------
/// The display text of a reference occurrence. A fallback means nothing was resolved
/// and the raw text is shown instead.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Title {
    Resolved(String),
    Fallback(String),
}

impl Title {
    pub fn text(&self) -> &str {
        match self {
            Title::Resolved(text) | Title::Fallback(text) => text,
        }
    }
    pub fn is_fallback(&self) -> bool {
        matches!(self, Title::Fallback(_))
    }
    pub fn into_text(self) -> String {
        match self {
            Title::Resolved(text) | Title::Fallback(text) => text,
        }
    }
}

impl fmt::Display for Title {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.text())
    }
}
