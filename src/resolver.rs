//! Resolution of object identifiers to display properties against a live backend.
//!
//! A [`Resolver`] owns one backend connection together with the memo of every
//! property it has resolved through that connection. Entries are never evicted:
//! a build session only ever asks for the finite set of identifiers its
//! documents mention. Replacing the connection drops the memo.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, warn};

use crate::IdentifierHasher;
use crate::backend::{Backend, Criterion, Record};
use crate::error::{DomainError, Result};
use crate::reference::ObjectType;

lazy_static! {
    static ref TECHNICAL_NAME: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z0-9_]+)*$").unwrap();
    static ref MODULE_NAME: Regex = Regex::new(r"^[A-Za-z0-9_]+$").unwrap();
}

const MENU_MODEL: &str = "ir.ui.menu";

fn check_name(regex: &Regex, identifier: &str) -> Result<()> {
    if regex.is_match(identifier) {
        Ok(())
    } else {
        Err(DomainError::InvalidIdentifier {
            identifier: identifier.to_string(),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub object_type: ObjectType,
    pub identifier: String,
    pub property: Option<String>,
}

/// What a window of a given view needs to be opened with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ViewTarget {
    pub view_id: i64,
    pub model: String,
    pub title: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModuleState {
    Activated,
    Installed,
}

pub struct Resolver<B: Backend> {
    backend: B,
    cache: Mutex<HashMap<CacheKey, Option<String>, IdentifierHasher>>,
}

impl<B: Backend> Resolver<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            cache: Mutex::new(HashMap::default()),
        }
    }
    pub fn backend(&self) -> &B {
        &self.backend
    }
    /// Swaps in a new connection. Nothing resolved through the old one is kept.
    pub fn replace_backend(&mut self, backend: B) -> Result<B> {
        self.cache
            .get_mut()
            .map_err(|e| DomainError::Lock(e.to_string()))?
            .clear();
        Ok(std::mem::replace(&mut self.backend, backend))
    }
    pub fn into_backend(self) -> B {
        self.backend
    }
    pub fn cache_len(&self) -> Result<usize> {
        Ok(self.cache()?.len())
    }
    fn cache(&self) -> Result<MutexGuard<'_, HashMap<CacheKey, Option<String>, IdentifierHasher>>> {
        self.cache.lock().map_err(|e| DomainError::Lock(e.to_string()))
    }

    /// The display property of an object, `None` when the backend has no such object.
    ///
    /// Errors are reserved for identifiers that cannot name anything (malformed or
    /// syntactically invalid technical names), for an `option` whose model or field
    /// does not exist, and for backend failures. Only successful lookups are memoized.
    pub fn get_property(&self, object_type: ObjectType, identifier: &str, property: Option<&str>) -> Result<Option<String>> {
        let property = property.filter(|p| !p.is_empty());
        let key = CacheKey {
            object_type,
            identifier: identifier.to_string(),
            property: property.map(String::from),
        };
        if let Some(cached) = self.cache()?.get(&key) {
            debug!(%object_type, identifier, "property cache hit");
            return Ok(cached.clone());
        }
        debug!(%object_type, identifier, property, "property cache miss");
        let value = match object_type {
            ObjectType::Model => self.property_model(identifier, property)?,
            ObjectType::Field => self.property_field(identifier, property)?,
            ObjectType::Data => self.property_data(identifier, property)?,
            ObjectType::Menu => self.property_menu(identifier, property)?,
            ObjectType::Option => self.property_option(identifier)?,
            ObjectType::Button => self.property_button(identifier, property)?,
            ObjectType::Wizard => self.property_wizard(identifier, property)?,
            ObjectType::View | ObjectType::Figure => return Err(DomainError::UnsupportedType(object_type)),
        };
        self.cache()?.insert(key, value.clone());
        Ok(value)
    }

    fn text(&self, record: &Record, property: &str) -> Option<String> {
        self.backend.field_value(record, property).and_then(|v| v.as_text())
    }

    fn model_record(&self, model_name: &str) -> Result<Option<Record>> {
        check_name(&TECHNICAL_NAME, model_name)?;
        self.backend
            .find_record("ir.model", &[Criterion::equals("model", model_name)])
    }

    fn model_field_record(&self, model: &Record, field_name: &str) -> Result<Option<Record>> {
        self.backend.find_record(
            "ir.model.field",
            &[
                Criterion::equals("model", model.id()),
                Criterion::equals("name", field_name),
            ],
        )
    }

    /// The record behind a `module.fs_id` model data identifier.
    pub fn data_record(&self, xml_id: &str, criteria: &[Criterion]) -> Result<Option<Record>> {
        let components = ObjectType::Data.split(xml_id)?;
        check_name(&MODULE_NAME, &components[0])?;
        let mut data_criteria = vec![
            Criterion::equals("module", components[0].as_str()),
            Criterion::equals("fs_id", components[1].as_str()),
        ];
        data_criteria.extend_from_slice(criteria);
        let data = match self.backend.find_record("ir.model.data", &data_criteria)? {
            Some(data) => data,
            None => return Ok(None),
        };
        let model = self.text(&data, "model");
        let db_id = self.backend.field_value(&data, "db_id").and_then(|v| v.as_integer());
        match (model, db_id) {
            (Some(model), Some(db_id)) => {
                check_name(&TECHNICAL_NAME, &model)?;
                self.backend.get_record_by_id(&model, db_id)
            }
            _ => {
                warn!(xml_id, "model data without a model or database id");
                Ok(None)
            }
        }
    }

    fn property_model(&self, model_name: &str, property: Option<&str>) -> Result<Option<String>> {
        let model = self.model_record(model_name)?;
        Ok(model.and_then(|m| self.text(&m, property.unwrap_or("name"))))
    }

    fn property_field(&self, identifier: &str, property: Option<&str>) -> Result<Option<String>> {
        let components = ObjectType::Field.split(identifier)?;
        let (model_name, field_name) = (&components[0], &components[1]);
        let model = match self.model_record(model_name)? {
            Some(model) => model,
            None => return Ok(None),
        };
        let field = match self.model_field_record(&model, field_name)? {
            Some(field) => field,
            None => return Ok(None),
        };
        let property = property.unwrap_or("field_description");
        let field_str = self.text(&field, property);
        if property == "field_description" {
            // the owning model's display name, or its technical name when it has none
            let model_str = self
                .get_property(ObjectType::Model, model_name, None)?
                .unwrap_or_else(|| model_name.to_string());
            return Ok(field_str.map(|f| format!("{}.{}", model_str, f)));
        }
        Ok(field_str)
    }

    fn property_data(&self, xml_id: &str, property: Option<&str>) -> Result<Option<String>> {
        let data = self.data_record(xml_id, &[])?;
        Ok(data.and_then(|d| self.text(&d, property.unwrap_or("name"))))
    }

    fn property_menu(&self, xml_id: &str, property: Option<&str>) -> Result<Option<String>> {
        let menu = self.data_record(xml_id, &[Criterion::equals("model", MENU_MODEL)])?;
        Ok(menu.and_then(|m| self.text(&m, property.unwrap_or("complete_name"))))
    }

    // The selection label is the only displayable property of an option.
    fn property_option(&self, identifier: &str) -> Result<Option<String>> {
        let components = ObjectType::Option.split(identifier)?;
        let (model_name, field_name, option_key) = (&components[0], &components[1], &components[2]);
        let field_not_found = || DomainError::FieldNotFound {
            model: model_name.to_string(),
            field: field_name.to_string(),
        };
        let model = self
            .model_record(model_name)?
            .ok_or_else(|| DomainError::ModelNotFound {
                model: model_name.to_string(),
            })?;
        let field = self
            .model_field_record(&model, field_name)?
            .ok_or_else(field_not_found)?;
        let selection = self
            .backend
            .field_value(&field, "selection")
            .ok_or_else(field_not_found)?;
        let selection = selection.as_selection().ok_or_else(field_not_found)?;
        let field_label = self.get_property(ObjectType::Field, &format!("{}.{}", model_name, field_name), None)?;
        for (key, label) in selection {
            if key == option_key {
                return Ok(Some(match &field_label {
                    Some(field_label) => format!("{}.{}", field_label, label),
                    None => label.clone(),
                }));
            }
        }
        Ok(None)
    }

    fn property_button(&self, identifier: &str, property: Option<&str>) -> Result<Option<String>> {
        let components = ObjectType::Button.split(identifier)?;
        let (model_name, button_name) = (&components[0], &components[1]);
        let model = match self.model_record(model_name)? {
            Some(model) => model,
            None => return Ok(None),
        };
        let button = self.backend.find_record(
            "ir.model.button",
            &[
                Criterion::equals("model", model.id()),
                Criterion::equals("name", button_name.as_str()),
            ],
        )?;
        Ok(button.and_then(|b| self.text(&b, property.unwrap_or("string"))))
    }

    fn property_wizard(&self, wiz_name: &str, property: Option<&str>) -> Result<Option<String>> {
        check_name(&TECHNICAL_NAME, wiz_name)?;
        let wizard = self
            .backend
            .find_record("ir.action.wizard", &[Criterion::equals("wiz_name", wiz_name)])?;
        Ok(wizard.and_then(|w| self.text(&w, property.unwrap_or("name"))))
    }

    /// Menu ids from the top level menu down to the menu named by `xml_id`.
    pub fn main_menu_item_path(&self, xml_id: &str) -> Result<Vec<i64>> {
        let not_found = || DomainError::ReferenceNotFound {
            object_type: ObjectType::Menu,
            text: xml_id.to_string(),
        };
        let mut menu = self
            .data_record(xml_id, &[Criterion::equals("model", MENU_MODEL)])?
            .ok_or_else(not_found)?;
        let mut path = vec![menu.id()];
        while let Some(parent) = self.backend.field_value(&menu, "parent").and_then(|v| v.as_integer()) {
            if path.contains(&parent) {
                return Err(DomainError::Persistence(format!("menu {} has a cyclic parent chain", xml_id)));
            }
            menu = self.backend.get_record_by_id(MENU_MODEL, parent)?.ok_or_else(not_found)?;
            path.push(menu.id());
        }
        path.reverse();
        Ok(path)
    }

    pub fn view_target(&self, xml_id: &str) -> Result<ViewTarget> {
        let view = self
            .data_record(xml_id, &[])?
            .ok_or_else(|| DomainError::ReferenceNotFound {
                object_type: ObjectType::View,
                text: xml_id.to_string(),
            })?;
        let model = self
            .text(&view, "model")
            .ok_or_else(|| DomainError::Persistence(format!("view {} has no model", xml_id)))?;
        let action = self.backend.find_record(
            "ir.action.act_window",
            &[Criterion::equals("res_model", model.as_str())],
        )?;
        Ok(ViewTarget {
            view_id: view.id(),
            title: action.and_then(|a| self.text(&a, "name")),
            model,
        })
    }

    /// Like [`Resolver::module_order`], but a failed lookup or a broken module graph
    /// is logged and yields no modules, so a build can carry on without them.
    pub fn inherited_modules(&self, state: ModuleState) -> Vec<String> {
        match self.module_order(state) {
            Ok(modules) => modules,
            Err(e) => {
                warn!(?state, error = %e, "could not find tryton modules");
                Vec::new()
            }
        }
    }

    /// Module names in dependency order: `ir` and `res` first, then repeatedly every
    /// module whose parents are already listed, alphabetically. Cycles and missing
    /// modules are [`DomainError::ModuleGraph`] errors.
    pub fn module_order(&self, state: ModuleState) -> Result<Vec<String>> {
        let criteria = match state {
            ModuleState::Activated => vec![Criterion::equals("state", "activated")],
            ModuleState::Installed => Vec::new(),
        };
        let modules = self.backend.find_records("ir.module", &criteria, None)?;
        let mut names: HashMap<i64, String> = modules
            .iter()
            .filter_map(|m| self.text(m, "name").map(|name| (m.id(), name)))
            .collect();
        let mut graph: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for module in &modules {
            let name = match names.get(&module.id()) {
                Some(name) => name.clone(),
                None => continue,
            };
            let mut parents = BTreeSet::new();
            let parent_ids = self
                .backend
                .field_value(module, "parents")
                .and_then(|v| v.as_ids().map(|ids| ids.to_vec()))
                .unwrap_or_default();
            for parent_id in parent_ids {
                if !names.contains_key(&parent_id) {
                    let parent = self.backend.get_record_by_id("ir.module", parent_id)?;
                    if let Some(parent_name) = parent.and_then(|p| self.text(&p, "name")) {
                        names.insert(parent_id, parent_name);
                    }
                }
                match names.get(&parent_id) {
                    Some(parent_name) => {
                        parents.insert(parent_name.clone());
                    }
                    None => {
                        return Err(DomainError::ModuleGraph(format!(
                            "module '{}' depends on unknown module {}",
                            name, parent_id
                        )));
                    }
                }
            }
            graph.insert(name, parents);
        }

        let mut order = Vec::with_capacity(graph.len());
        let mut roots = vec!["ir".to_string(), "res".to_string()];
        while !roots.is_empty() {
            for root in &roots {
                if graph.remove(root).is_none() {
                    return Err(DomainError::ModuleGraph(format!("module '{}' is missing", root)));
                }
                for parents in graph.values_mut() {
                    parents.remove(root);
                }
                order.push(root.clone());
            }
            roots = graph
                .iter()
                .filter(|(_, parents)| parents.is_empty())
                .map(|(name, _)| name.clone())
                .collect();
        }
        if !graph.is_empty() {
            return Err(DomainError::ModuleGraph("module graph is disconnected".to_string()));
        }
        Ok(order)
    }
}
