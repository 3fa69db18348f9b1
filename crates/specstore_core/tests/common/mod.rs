#![allow(dead_code)]

use serde::{Deserialize, Serialize};
use serde_json::Value;
use specstore_core::{open_session, Backend, Field, Fields, Model, Money, NativeSession, StoreConfig};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub balance: Money,
}

impl Model for User {
    const NAME: &'static str = "users";
    const FIELDS: &'static [Field] = &[
        Field::text("id"),
        Field::text("username"),
        Field::text("email"),
        Field::integer("balance"),
    ];

    fn id(&self) -> &str {
        &self.id
    }
}

pub fn user(id: &str, username: &str, balance: i64) -> User {
    User {
        id: id.to_string(),
        username: username.to_string(),
        email: format!("{username}@example.com"),
        balance: Money::from_minor(balance),
    }
}

pub fn fields(entries: &[(&str, Value)]) -> Fields {
    entries
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

/// Opens an in-memory session for `backend` with the `users` model ready.
pub fn open(backend: Backend) -> NativeSession {
    open_config(&StoreConfig::in_memory(backend))
}

pub fn open_config(config: &StoreConfig) -> NativeSession {
    let session = open_session(config).unwrap();
    session.ensure_model::<User>().unwrap();
    session
}

/// Every backend with its default configuration, plus a key-value session
/// that scans the namespace instead of narrowing keys.
pub fn store_configs() -> Vec<(String, StoreConfig)> {
    let mut configs: Vec<(String, StoreConfig)> = Backend::ALL
        .into_iter()
        .map(|backend| (backend.to_string(), StoreConfig::in_memory(backend)))
        .collect();
    let mut scanning = StoreConfig::in_memory(Backend::KeyValue);
    scanning.key_value.use_double_filter = false;
    configs.push(("key_value_scan".to_string(), scanning));
    configs
}

/// Runs `check` once per entry of [`store_configs`] on a fresh session.
pub fn for_each_backend(mut check: impl FnMut(&str, &NativeSession)) {
    for (label, config) in store_configs() {
        let session = open_config(&config);
        check(&label, &session);
    }
}

pub fn sorted_ids(users: &[User]) -> Vec<String> {
    let mut ids: Vec<String> = users.iter().map(|user| user.id.clone()).collect();
    ids.sort();
    ids
}
