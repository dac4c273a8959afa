use crate::{client::ClientConfig, error::ServerError, ServerResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use wgate_crypto::Key;

/// A user's clients keyed by public key.
///
/// Serializes as `{ "<hex public key>": ClientConfig, .. }`.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct UserConfig(BTreeMap<Key, ClientConfig>);

impl UserConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &Key) -> ServerResult<&ClientConfig> {
        self.0.get(key).ok_or(ServerError::ClientNotFound)
    }

    pub fn get_mut(&mut self, key: &Key) -> ServerResult<&mut ClientConfig> {
        self.0.get_mut(key).ok_or(ServerError::ClientNotFound)
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.0.contains_key(key)
    }

    /// Insert or replace the client stored under its public key.
    pub fn add(&mut self, client: ClientConfig) -> Option<ClientConfig> {
        self.0.insert(client.public_key, client)
    }

    pub fn remove(&mut self, key: &Key) -> ServerResult<ClientConfig> {
        self.0.remove(key).ok_or(ServerError::ClientNotFound)
    }

    pub fn count(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn list(&self) -> impl Iterator<Item = &ClientConfig> {
        self.0.values()
    }

    /// Keys only on `other`'s side are added; shared keys merge field by field.
    pub fn merge_with(&mut self, other: &UserConfig) {
        for (key, client) in other.0.iter() {
            match self.0.get_mut(key) {
                Some(existing) => existing.merge_with(client),
                None => {
                    self.0.insert(*key, client.clone());
                }
            }
        }
    }
}
