//! In-memory data service
//!
//! Records are JSON objects keyed by their stringified `id`. `find` filters
//! on `params.query` by field equality; query values given as strings also
//! match fields whose JSON rendering equals them, so URL query strings work.

use super::{id_to_string, Params, Service};
use crate::error::ServiceError;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct MemoryService {
    records: RwLock<BTreeMap<String, Value>>,
    next_id: AtomicU64,
}

impl MemoryService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with `records`; objects without an `id` get one assigned
    pub fn with_records(records: impl IntoIterator<Item = Value>) -> Self {
        let service = Self::new();
        {
            let mut store = service.records.write();
            for record in records {
                if let Value::Object(object) = record {
                    let (key, object) = service.assign_id(&store, object);
                    store.insert(key, Value::Object(object));
                }
            }
        }
        service
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    fn assign_id(&self, store: &BTreeMap<String, Value>, mut object: Map<String, Value>) -> (String, Map<String, Value>) {
        if let Some(id) = object.get("id").filter(|id| !id.is_null()) {
            return (id_to_string(id), object);
        }
        let key = loop {
            let candidate = self.next_id.fetch_add(1, Ordering::Relaxed).to_string();
            if !store.contains_key(&candidate) {
                break candidate;
            }
        };
        object.insert("id".into(), Value::String(key.clone()));
        (key, object)
    }

    fn missing(id: &str) -> ServiceError {
        ServiceError::not_found(format!("No record found for id '{}'", id))
    }

    fn create_one(&self, data: Value) -> Result<Value, ServiceError> {
        let object = match data {
            Value::Object(object) => object,
            _ => return Err(ServiceError::bad_request("Data must be an object")),
        };
        let mut store = self.records.write();
        let (key, object) = self.assign_id(&store, object);
        let record = Value::Object(object);
        store.insert(key, record.clone());
        Ok(record)
    }
}

fn matches_query(record: &Value, query: &Map<String, Value>) -> bool {
    query.iter().all(|(field, expected)| match record.get(field) {
        Some(actual) if actual == expected => true,
        Some(actual) => expected.as_str().map_or(false, |s| id_to_string(actual) == s),
        None => false,
    })
}

#[async_trait]
impl Service for MemoryService {
    async fn find(&self, params: Params) -> Result<Value, ServiceError> {
        let query = params.get("query").and_then(Value::as_object).cloned().unwrap_or_default();
        let records = self.records.read();
        Ok(Value::Array(
            records
                .values()
                .filter(|record| matches_query(record, &query))
                .cloned()
                .collect(),
        ))
    }

    async fn get(&self, id: Value, _params: Params) -> Result<Value, ServiceError> {
        let key = id_to_string(&id);
        self.records.read().get(&key).cloned().ok_or_else(|| Self::missing(&key))
    }

    async fn create(&self, data: Value, _params: Params) -> Result<Value, ServiceError> {
        match data {
            Value::Array(items) => items
                .into_iter()
                .map(|item| self.create_one(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            other => self.create_one(other),
        }
    }

    async fn update(&self, id: Value, data: Value, _params: Params) -> Result<Value, ServiceError> {
        let key = id_to_string(&id);
        let mut object = match data {
            Value::Object(object) => object,
            _ => return Err(ServiceError::bad_request("Data must be an object")),
        };
        let mut store = self.records.write();
        let existing = store.get(&key).ok_or_else(|| Self::missing(&key))?;
        let original_id = existing.get("id").cloned().unwrap_or_else(|| Value::String(key.clone()));
        object.insert("id".into(), original_id);
        let record = Value::Object(object);
        store.insert(key, record.clone());
        Ok(record)
    }

    async fn patch(&self, id: Value, data: Value, _params: Params) -> Result<Value, ServiceError> {
        let key = id_to_string(&id);
        let changes = match data {
            Value::Object(object) => object,
            _ => return Err(ServiceError::bad_request("Data must be an object")),
        };
        let mut store = self.records.write();
        let record = store.get_mut(&key).ok_or_else(|| Self::missing(&key))?;
        if let Some(fields) = record.as_object_mut() {
            for (field, value) in changes {
                if field != "id" {
                    fields.insert(field, value);
                }
            }
        }
        Ok(record.clone())
    }

    async fn remove(&self, id: Value, _params: Params) -> Result<Value, ServiceError> {
        let key = id_to_string(&id);
        self.records.write().remove(&key).ok_or_else(|| Self::missing(&key))
    }
}
