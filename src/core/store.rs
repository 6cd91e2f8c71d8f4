use std::collections::BTreeMap;
use std::sync::Mutex;

use anyhow::anyhow;
use serde::{de::DeserializeOwned, Serialize};

/// Byte-oriented key-value store the application persists into.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;

    fn set(&self, key: &str, value: &[u8]) -> anyhow::Result<()>;

    /// Removing a missing key is not an error.
    fn delete(&self, key: &str) -> anyhow::Result<()>;

    fn exists(&self, key: &str) -> anyhow::Result<bool>;

    /// Writes `value` only when `key` is vacant. Returns `false` if it was taken.
    fn insert_if_absent(&self, key: &str, value: &[u8]) -> anyhow::Result<bool>;

    /// All keys starting with `prefix`, in ascending order.
    fn keys_with_prefix(&self, prefix: &str) -> anyhow::Result<Vec<String>>;
}

/// JSON helpers layered over any [`KvStore`].
pub trait KvJson {
    fn get_json<T: DeserializeOwned>(&self, key: &str) -> anyhow::Result<Option<T>>;
    fn set_json<T: Serialize>(&self, key: &str, value: &T) -> anyhow::Result<()>;
    fn insert_json_if_absent<T: Serialize>(&self, key: &str, value: &T) -> anyhow::Result<bool>;
}

impl<S: KvStore + ?Sized> KvJson for S {
    fn get_json<T: DeserializeOwned>(&self, key: &str) -> anyhow::Result<Option<T>> {
        match self.get(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn set_json<T: Serialize>(&self, key: &str, value: &T) -> anyhow::Result<()> {
        self.set(key, &serde_json::to_vec(value)?)
    }

    fn insert_json_if_absent<T: Serialize>(&self, key: &str, value: &T) -> anyhow::Result<bool> {
        self.insert_if_absent(key, &serde_json::to_vec(value)?)
    }
}

/// Process-local store backing the native server and the tests.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> anyhow::Result<std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>>> {
        self.entries
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.entries()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        self.entries()?.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.entries()?.remove(key);
        Ok(())
    }

    fn exists(&self, key: &str) -> anyhow::Result<bool> {
        Ok(self.entries()?.contains_key(key))
    }

    fn insert_if_absent(&self, key: &str, value: &[u8]) -> anyhow::Result<bool> {
        let mut entries = self.entries()?;
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(key.to_string(), value.to_vec());
        Ok(true)
    }

    fn keys_with_prefix(&self, prefix: &str) -> anyhow::Result<Vec<String>> {
        Ok(self
            .entries()?
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }
}

/// Spin's default key-value store, opened per operation.
pub struct SpinStore;

impl SpinStore {
    fn open(&self) -> anyhow::Result<spin_sdk::key_value::Store> {
        Ok(spin_sdk::key_value::Store::open_default()?)
    }
}

impl KvStore for SpinStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.open()?.get(key)?)
    }

    fn set(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        Ok(self.open()?.set(key, value)?)
    }

    fn delete(&self, key: &str) -> anyhow::Result<()> {
        Ok(self.open()?.delete(key)?)
    }

    fn exists(&self, key: &str) -> anyhow::Result<bool> {
        Ok(self.open()?.exists(key)?)
    }

    // Spin key-value has no conditional write; a racing writer can slip
    // between the check and the set.
    fn insert_if_absent(&self, key: &str, value: &[u8]) -> anyhow::Result<bool> {
        let store = self.open()?;
        if store.exists(key)? {
            return Ok(false);
        }
        store.set(key, value)?;
        Ok(true)
    }

    fn keys_with_prefix(&self, prefix: &str) -> anyhow::Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .open()?
            .get_keys()?
            .into_iter()
            .filter(|k| k.starts_with(prefix))
            .collect();
        keys.sort();
        Ok(keys)
    }
}
