//! tryton-xref – cross-references to Tryton business objects for documentation builds.
//!
//! Documentation of a Tryton application names the objects it describes
//! (models, fields, menus, wizards, buttons, selection options, model data)
//! by their technical identifiers. This crate turns those identifiers into the
//! display names a reader sees, by asking a live backend, and keeps track of
//! which document defines which object so references can link to it.
//!
//! ## Modules
//! * [`reference`] – Identifier grammar: [`reference::ObjectType`], parsing of
//!   decorated references (`!`, `~`, `|property`) into [`reference::ObjectReference`]
//!   and rendering of titles. Grammar details live in `reference.pest`.
//! * [`backend`] – The [`backend::Backend`] capability consumed by the resolver,
//!   an in-process [`backend::MemoryBackend`] and the configured [`backend::Connection`].
//! * [`persist`] – A SQLite record store implementing [`backend::Backend`].
//! * [`xmlrpc`] – A running Tryton server reached over XML-RPC.
//! * [`resolver`] – The memoizing [`resolver::Resolver`] mapping `(type, identifier, property)`
//!   to display values.
//! * [`registry`] – The build-scoped [`registry::Registry`] of defined objects
//!   (define, clear, merge, resolve, index entries).
//! * [`title`] – Display text for reference occurrences and headings for defining directives.
//! * [`interface`] – Build driver: sequential [`interface::BuildSession`],
//!   threaded [`interface::build_parallel`] and the configured
//!   [`interface::build_with_settings`].
//! * [`settings`] – Configuration read with the `config` crate.
//!
//! ## Failure policy
//! References never fail a build: an unresolvable reference shows its raw text
//! and yields a warning. A defining directive whose object cannot be resolved
//! is broken, and by default a build with broken definitions fails.
//!
//! ## Quick Start
//! ```
//! use tryton_xref::backend::MemoryBackend;
//! use tryton_xref::reference::ObjectType;
//! use tryton_xref::registry::Registry;
//! use tryton_xref::resolver::Resolver;
//! use tryton_xref::title::reference_title;
//!
//! let mut backend = MemoryBackend::new();
//! backend.add("ir.model", 1, vec![("model", "sale.sale".into()), ("name", "Sale".into())]);
//! backend.add(
//!     "ir.model.field",
//!     1,
//!     vec![("model", 1i64.into()), ("name", "state".into()), ("field_description", "State".into())],
//! );
//! let resolver = Resolver::new(backend);
//! let registry = Registry::new();
//! let full = reference_title(&resolver, &registry, "index", Some(1), ObjectType::Field, "sale.sale.state");
//! assert_eq!(full.title.text(), "Sale.State");
//! let short = reference_title(&resolver, &registry, "index", Some(2), ObjectType::Field, "~sale.sale.state");
//! assert_eq!(short.title.text(), "State");
//! ```

use seahash::SeaHasher;
use std::hash::BuildHasherDefault;

// maps and sets keyed by identifiers use a fast hash
pub type IdentifierHasher = BuildHasherDefault<SeaHasher>;

pub mod error;
pub mod reference;
pub mod backend;
pub mod persist;
pub mod xmlrpc;
pub mod resolver;
pub mod registry;
pub mod title;
pub mod interface;
pub mod settings;
