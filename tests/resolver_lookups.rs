use std::cell::Cell;
use std::path::Path;

use tryton_xref::backend::{read_fixture, Backend, Criterion, MemoryBackend, Record, Value};
use tryton_xref::error::{DomainError, Result};
use tryton_xref::reference::ObjectType;
use tryton_xref::resolver::{ModuleState, Resolver};

fn sale_backend() -> MemoryBackend {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/sale.json");
    MemoryBackend::from_fixture(&read_fixture(&path).expect("fixture")).expect("backend")
}

/// Answers one query, then fails every later one.
struct SingleQueryBackend {
    inner: MemoryBackend,
    queries: Cell<usize>,
}

impl SingleQueryBackend {
    fn new(inner: MemoryBackend) -> Self {
        Self { inner, queries: Cell::new(0) }
    }
    fn count(&self) -> Result<()> {
        self.queries.set(self.queries.get() + 1);
        if self.queries.get() > 1 {
            return Err(DomainError::BackendUnavailable {
                cause: "queried a second time".to_string(),
            });
        }
        Ok(())
    }
}

impl Backend for SingleQueryBackend {
    fn find_records(&self, model: &str, criteria: &[Criterion], limit: Option<usize>) -> Result<Vec<Record>> {
        self.count()?;
        self.inner.find_records(model, criteria, limit)
    }
    fn get_record_by_id(&self, model: &str, id: i64) -> Result<Option<Record>> {
        self.count()?;
        self.inner.get_record_by_id(model, id)
    }
}

/// Fails the first query only.
struct FlakyBackend {
    inner: MemoryBackend,
    failed: Cell<bool>,
}

impl Backend for FlakyBackend {
    fn find_records(&self, model: &str, criteria: &[Criterion], limit: Option<usize>) -> Result<Vec<Record>> {
        if !self.failed.replace(true) {
            return Err(DomainError::BackendUnavailable {
                cause: "connection reset".to_string(),
            });
        }
        self.inner.find_records(model, criteria, limit)
    }
    fn get_record_by_id(&self, model: &str, id: i64) -> Result<Option<Record>> {
        self.inner.get_record_by_id(model, id)
    }
}

/// Computes model names instead of storing them.
struct ComputedNames {
    inner: MemoryBackend,
}

impl Backend for ComputedNames {
    fn find_records(&self, model: &str, criteria: &[Criterion], limit: Option<usize>) -> Result<Vec<Record>> {
        self.inner.find_records(model, criteria, limit)
    }
    fn get_record_by_id(&self, model: &str, id: i64) -> Result<Option<Record>> {
        self.inner.get_record_by_id(model, id)
    }
    fn field_value(&self, record: &Record, property: &str) -> Option<Value> {
        if record.model() == "ir.model" && property == "name" {
            return Some(Value::Text("Computed Sale".to_string()));
        }
        record.get(property)
    }
}

#[test]
fn borrowed_backends_keep_their_field_values() {
    let backend = ComputedNames { inner: sale_backend() };
    let owned = Resolver::new(ComputedNames { inner: sale_backend() });
    let borrowed = Resolver::new(&backend);
    assert_eq!(
        owned.get_property(ObjectType::Model, "sale.sale", None).unwrap().as_deref(),
        Some("Computed Sale")
    );
    assert_eq!(
        borrowed.get_property(ObjectType::Model, "sale.sale", None).unwrap().as_deref(),
        Some("Computed Sale")
    );
    assert_eq!(
        borrowed.get_property(ObjectType::Field, "sale.sale.state", None).unwrap().as_deref(),
        Some("Computed Sale.State")
    );
}

#[test]
fn cache_hit_does_not_query_again() {
    let resolver = Resolver::new(SingleQueryBackend::new(sale_backend()));
    let first = resolver.get_property(ObjectType::Model, "sale.sale", None).unwrap();
    let second = resolver.get_property(ObjectType::Model, "sale.sale", None).unwrap();
    assert_eq!(first.as_deref(), Some("Sale"));
    assert_eq!(second, first);
    assert_eq!(resolver.backend().queries.get(), 1);
    assert_eq!(resolver.cache_len().unwrap(), 1);
}

#[test]
fn field_display_includes_model_display() {
    let resolver = Resolver::new(sale_backend());
    assert_eq!(
        resolver.get_property(ObjectType::Field, "sale.sale.description", None).unwrap().as_deref(),
        Some("Sale.Description")
    );
    // other properties are returned as they are
    assert_eq!(
        resolver.get_property(ObjectType::Field, "sale.sale.description", Some("help")).unwrap().as_deref(),
        Some("Short text")
    );
    // a model without display name falls back to its technical name
    assert_eq!(
        resolver.get_property(ObjectType::Field, "party.party.code", None).unwrap().as_deref(),
        Some("party.party.Code")
    );
    assert_eq!(resolver.get_property(ObjectType::Field, "sale.sale.nothing", None).unwrap(), None);
    assert_eq!(resolver.get_property(ObjectType::Field, "sale.nothing.state", None).unwrap(), None);
}

#[test]
fn option_raises_when_model_or_field_missing() {
    let resolver = Resolver::new(sale_backend());
    assert!(matches!(
        resolver.get_property(ObjectType::Option, "missing.model.field.key", None),
        Err(DomainError::ModelNotFound { .. })
    ));
    assert!(matches!(
        resolver.get_property(ObjectType::Option, "sale.sale.missing.draft", None),
        Err(DomainError::FieldNotFound { .. })
    ));
    // a field without selection cannot hold options either
    assert!(matches!(
        resolver.get_property(ObjectType::Option, "sale.sale.description.draft", None),
        Err(DomainError::FieldNotFound { .. })
    ));
}

#[test]
fn option_label_is_prefixed_by_field_label() {
    let resolver = Resolver::new(sale_backend());
    assert_eq!(
        resolver.get_property(ObjectType::Option, "sale.sale.state.confirmed", None).unwrap().as_deref(),
        Some("Sale.State.Confirmed")
    );
    assert_eq!(resolver.get_property(ObjectType::Option, "sale.sale.state.cancelled", None).unwrap(), None);
}

#[test]
fn model_data_and_menu_go_through_model_data() {
    let resolver = Resolver::new(sale_backend());
    assert_eq!(
        resolver.get_property(ObjectType::Menu, "sale.menu_sale", None).unwrap().as_deref(),
        Some("Sales / Sales")
    );
    assert_eq!(
        resolver.get_property(ObjectType::Menu, "sale.menu_sale", Some("name")).unwrap().as_deref(),
        Some("Sales")
    );
    assert_eq!(
        resolver.get_property(ObjectType::Data, "sale.act_return", None).unwrap().as_deref(),
        Some("Return Sale")
    );
    // model data of another model is not a menu
    assert_eq!(resolver.get_property(ObjectType::Menu, "sale.act_return", None).unwrap(), None);
    assert_eq!(resolver.get_property(ObjectType::Data, "sale.unknown", None).unwrap(), None);
}

#[test]
fn buttons_and_wizards() {
    let resolver = Resolver::new(sale_backend());
    assert_eq!(
        resolver.get_property(ObjectType::Button, "sale.sale.confirm", None).unwrap().as_deref(),
        Some("Confirm")
    );
    assert_eq!(resolver.get_property(ObjectType::Button, "sale.line.confirm", None).unwrap(), None);
    assert_eq!(
        resolver.get_property(ObjectType::Wizard, "sale.return_sale", None).unwrap().as_deref(),
        Some("Return Sale")
    );
}

#[test]
fn invalid_names_and_unsupported_types_are_errors() {
    let resolver = Resolver::new(sale_backend());
    assert!(matches!(
        resolver.get_property(ObjectType::Model, "sale sale", None),
        Err(DomainError::InvalidIdentifier { .. })
    ));
    assert!(matches!(
        resolver.get_property(ObjectType::Data, "sale-x.menu", None),
        Err(DomainError::InvalidIdentifier { .. })
    ));
    assert!(matches!(
        resolver.get_property(ObjectType::Field, "sale", None),
        Err(DomainError::MalformedReference { .. })
    ));
    assert!(matches!(
        resolver.get_property(ObjectType::View, "sale.sale_view_form", None),
        Err(DomainError::UnsupportedType(ObjectType::View))
    ));
}

#[test]
fn failed_lookups_are_not_cached() {
    let resolver = Resolver::new(FlakyBackend {
        inner: sale_backend(),
        failed: Cell::new(false),
    });
    let failed = resolver.get_property(ObjectType::Model, "sale.sale", None);
    assert!(matches!(failed, Err(DomainError::BackendUnavailable { .. })));
    assert_eq!(resolver.cache_len().unwrap(), 0);
    assert_eq!(
        resolver.get_property(ObjectType::Model, "sale.sale", None).unwrap().as_deref(),
        Some("Sale")
    );
}

#[test]
fn replacing_the_backend_drops_the_cache() {
    let mut resolver = Resolver::new(sale_backend());
    assert_eq!(
        resolver.get_property(ObjectType::Model, "sale.sale", None).unwrap().as_deref(),
        Some("Sale")
    );
    let mut renamed = MemoryBackend::new();
    renamed.add("ir.model", 1, vec![("model", "sale.sale".into()), ("name", "Sales Order".into())]);
    let previous = resolver.replace_backend(renamed).unwrap();
    assert!(!previous.is_empty());
    assert_eq!(resolver.cache_len().unwrap(), 0);
    assert_eq!(
        resolver.get_property(ObjectType::Model, "sale.sale", None).unwrap().as_deref(),
        Some("Sales Order")
    );
}

#[test]
fn menu_path_runs_from_the_top() {
    let resolver = Resolver::new(sale_backend());
    assert_eq!(resolver.main_menu_item_path("sale.menu_sale").unwrap(), vec![40, 41]);
    assert_eq!(resolver.main_menu_item_path("sale.menu_sale_root").unwrap(), vec![40]);
    assert!(matches!(
        resolver.main_menu_item_path("sale.missing"),
        Err(DomainError::ReferenceNotFound { .. })
    ));
}

#[test]
fn view_target_names_model_and_window() {
    let resolver = Resolver::new(sale_backend());
    let target = resolver.view_target("sale.sale_view_form").unwrap();
    assert_eq!(target.view_id, 50);
    assert_eq!(target.model, "sale.sale");
    assert_eq!(target.title.as_deref(), Some("Sales"));
}

#[test]
fn modules_in_dependency_order() {
    let resolver = Resolver::new(sale_backend());
    assert_eq!(
        resolver.module_order(ModuleState::Activated).unwrap(),
        vec!["ir", "res", "party", "company", "sale"]
    );
    assert_eq!(
        resolver.module_order(ModuleState::Installed).unwrap(),
        vec!["ir", "res", "party", "account", "company", "sale"]
    );
}

#[test]
fn module_cycle_is_reported() {
    let mut backend = MemoryBackend::new();
    backend.add("ir.module", 1, vec![("name", "ir".into()), ("parents", Value::Many(vec![]))]);
    backend.add("ir.module", 2, vec![("name", "res".into()), ("parents", Value::Many(vec![1]))]);
    backend.add("ir.module", 3, vec![("name", "a".into()), ("parents", Value::Many(vec![4]))]);
    backend.add("ir.module", 4, vec![("name", "b".into()), ("parents", Value::Many(vec![3]))]);
    let resolver = Resolver::new(backend);
    assert!(matches!(
        resolver.module_order(ModuleState::Installed),
        Err(DomainError::ModuleGraph(_))
    ));
    assert!(resolver.inherited_modules(ModuleState::Installed).is_empty());
}

#[test]
fn inherited_modules_follow_module_order() {
    let resolver = Resolver::new(sale_backend());
    assert_eq!(
        resolver.inherited_modules(ModuleState::Activated),
        vec!["ir", "res", "party", "company", "sale"]
    );
    let unavailable = Resolver::new(FlakyBackend {
        inner: sale_backend(),
        failed: Cell::new(false),
    });
    assert!(unavailable.inherited_modules(ModuleState::Activated).is_empty());
}
