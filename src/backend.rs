//! Record access to the business-object server.
//!
//! The resolver only needs three capabilities from a backend: finding records
//! by equality criteria, fetching a record by id and reading a property of a
//! record. Anything offering those, in process or over a wire, implements
//! [`Backend`].

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{DomainError, Result};
use crate::persist::SqliteBackend;
use crate::settings::{ConnectionType, Settings};
use crate::xmlrpc::XmlRpcBackend;

// ------------- Value -------------
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Many(Vec<i64>),
    Selection(Vec<(String, String)>),
    /// Anything else a record may carry (objects, mixed lists); never displayed.
    Other(serde_json::Value),
}

impl Value {
    /// The value as display text, if it has one.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Value::Text(text) => Some(text.clone()),
            Value::Integer(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Boolean(b) => Some(b.to_string()),
            _ => None,
        }
    }
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }
    pub fn as_ids(&self) -> Option<&[i64]> {
        match self {
            Value::Many(ids) => Some(ids),
            Value::Selection(pairs) if pairs.is_empty() => Some(&[]),
            _ => None,
        }
    }
    pub fn as_selection(&self) -> Option<&[(String, String)]> {
        match self {
            Value::Selection(pairs) => Some(pairs),
            // an empty JSON array cannot tell a selection from a relation
            Value::Many(ids) if ids.is_empty() => Some(&[]),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => write!(f, "{}", json),
            Err(_) => write!(f, "{:?}", self),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}
impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}
impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}
impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}
impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

// ------------- Record -------------
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    model: String,
    id: i64,
    properties: HashMap<String, Value>,
}

impl Record {
    pub fn new(model: &str, id: i64, properties: HashMap<String, Value>) -> Self {
        Self {
            model: model.to_string(),
            id,
            properties,
        }
    }
    pub fn model(&self) -> &str {
        &self.model
    }
    pub fn id(&self) -> i64 {
        self.id
    }
    pub fn properties(&self) -> &HashMap<String, Value> {
        &self.properties
    }
    pub fn get(&self, property: &str) -> Option<Value> {
        if property == "id" {
            return Some(Value::Integer(self.id));
        }
        self.properties.get(property).cloned()
    }
    /// The property as display text; null or missing properties have none.
    pub fn text(&self, property: &str) -> Option<String> {
        self.get(property).and_then(|v| v.as_text())
    }
    pub fn matches(&self, criteria: &[Criterion]) -> bool {
        criteria
            .iter()
            .all(|c| self.get(&c.property).as_ref() == Some(&c.value))
    }
}

// ------------- Criterion -------------
/// An equality test on one property, the only comparison the resolver needs.
#[derive(Clone, Debug, PartialEq)]
pub struct Criterion {
    pub property: String,
    pub value: Value,
}

impl Criterion {
    pub fn equals(property: &str, value: impl Into<Value>) -> Self {
        Self {
            property: property.to_string(),
            value: value.into(),
        }
    }
}

// ------------- Backend -------------
pub trait Backend {
    /// Records of `model` matching every criterion, in ascending id order.
    fn find_records(&self, model: &str, criteria: &[Criterion], limit: Option<usize>) -> Result<Vec<Record>>;
    fn get_record_by_id(&self, model: &str, id: i64) -> Result<Option<Record>>;

    fn find_record(&self, model: &str, criteria: &[Criterion]) -> Result<Option<Record>> {
        Ok(self.find_records(model, criteria, Some(1))?.into_iter().next())
    }
    fn field_value(&self, record: &Record, property: &str) -> Option<Value> {
        record.get(property)
    }
}

impl<B: Backend + ?Sized> Backend for &B {
    fn find_records(&self, model: &str, criteria: &[Criterion], limit: Option<usize>) -> Result<Vec<Record>> {
        (**self).find_records(model, criteria, limit)
    }
    fn get_record_by_id(&self, model: &str, id: i64) -> Result<Option<Record>> {
        (**self).get_record_by_id(model, id)
    }
    fn find_record(&self, model: &str, criteria: &[Criterion]) -> Result<Option<Record>> {
        (**self).find_record(model, criteria)
    }
    fn field_value(&self, record: &Record, property: &str) -> Option<Value> {
        (**self).field_value(record, property)
    }
}

// ------------- Fixtures -------------
/// The JSON shape fixtures are written in: model name to a list of property maps,
/// each of which must carry an integer `id`.
pub type Fixture = BTreeMap<String, Vec<serde_json::Map<String, serde_json::Value>>>;

pub fn read_fixture(path: &Path) -> Result<Fixture> {
    let contents = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

/// Splits one fixture row into its id and typed properties.
pub fn fixture_record(model: &str, row: &serde_json::Map<String, serde_json::Value>) -> Result<Record> {
    let id = row
        .get("id")
        .and_then(|id| id.as_i64())
        .ok_or_else(|| DomainError::Persistence(format!("fixture row of '{}' without an integer id", model)))?;
    let mut properties = HashMap::new();
    for (property, value) in row {
        if property != "id" {
            properties.insert(property.clone(), serde_json::from_value(value.clone())?);
        }
    }
    Ok(Record::new(model, id, properties))
}

// ------------- MemoryBackend -------------
/// An in-process record store.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    models: HashMap<String, BTreeMap<i64, Record>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn from_fixture(fixture: &Fixture) -> Result<Self> {
        let mut backend = Self::new();
        backend.load_fixture(fixture)?;
        Ok(backend)
    }
    pub fn load_fixture(&mut self, fixture: &Fixture) -> Result<()> {
        for (model, rows) in fixture {
            for row in rows {
                self.insert(fixture_record(model, row)?);
            }
        }
        Ok(())
    }
    pub fn insert(&mut self, record: Record) {
        self.models
            .entry(record.model().to_string())
            .or_default()
            .insert(record.id(), record);
    }
    /// Builds and inserts a record from `(property, value)` pairs.
    pub fn add(&mut self, model: &str, id: i64, properties: Vec<(&str, Value)>) {
        let properties = properties
            .into_iter()
            .map(|(p, v)| (p.to_string(), v))
            .collect();
        self.insert(Record::new(model, id, properties));
    }
    pub fn len(&self) -> usize {
        self.models.values().map(|records| records.len()).sum()
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Backend for MemoryBackend {
    fn find_records(&self, model: &str, criteria: &[Criterion], limit: Option<usize>) -> Result<Vec<Record>> {
        debug!(model, criteria = criteria.len(), "memory find");
        let records = match self.models.get(model) {
            Some(records) => records,
            None => return Ok(Vec::new()),
        };
        Ok(records
            .values()
            .filter(|r| r.matches(criteria))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }
    fn get_record_by_id(&self, model: &str, id: i64) -> Result<Option<Record>> {
        Ok(self.models.get(model).and_then(|records| records.get(&id)).cloned())
    }
}

// ------------- Connection -------------
/// The configured backend, picked by `connection_type`.
#[derive(Debug)]
pub enum Connection {
    Sqlite(SqliteBackend),
    Memory(MemoryBackend),
    XmlRpc(XmlRpcBackend),
}

impl Connection {
    pub fn open(settings: &Settings) -> Result<Self> {
        let fixture = match (&settings.fixtures, settings.connection_type) {
            (Some(_), ConnectionType::XmlRpc) => {
                warn!("fixtures are ignored by xmlrpc connections");
                None
            }
            (Some(path), _) => Some(read_fixture(path)?),
            (None, _) => None,
        };
        let connection = match settings.connection_type {
            ConnectionType::Sqlite => {
                let backend = SqliteBackend::open(&settings.database())?;
                if let Some(fixture) = &fixture {
                    backend.load_fixture(fixture)?;
                }
                Connection::Sqlite(backend)
            }
            ConnectionType::Memory => {
                let mut backend = MemoryBackend::new();
                if let Some(fixture) = &fixture {
                    backend.load_fixture(fixture)?;
                }
                Connection::Memory(backend)
            }
            ConnectionType::XmlRpc => Connection::XmlRpc(XmlRpcBackend::open(settings)?),
        };
        Ok(connection)
    }
    fn backend(&self) -> &dyn Backend {
        match self {
            Connection::Sqlite(backend) => backend,
            Connection::Memory(backend) => backend,
            Connection::XmlRpc(backend) => backend,
        }
    }
}

impl Backend for Connection {
    fn find_records(&self, model: &str, criteria: &[Criterion], limit: Option<usize>) -> Result<Vec<Record>> {
        self.backend().find_records(model, criteria, limit)
    }
    fn get_record_by_id(&self, model: &str, id: i64) -> Result<Option<Record>> {
        self.backend().get_record_by_id(model, id)
    }
    fn find_record(&self, model: &str, criteria: &[Criterion]) -> Result<Option<Record>> {
        self.backend().find_record(model, criteria)
    }
    fn field_value(&self, record: &Record, property: &str) -> Option<Value> {
        self.backend().field_value(record, property)
    }
}
