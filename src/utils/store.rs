//! 持久化键值存储 (Persistent Store)
//!
//! 以单个 JSON 对象文件保存 string -> string，并提供带前缀的读取与空值回退。

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::core::error::Result;
use crate::interfaces::KeyValueStore;

/// JSON 文件存储，首次写入时创建文件
pub struct JsonFileStore {
    path: PathBuf,
    entries: RwLock<IndexMap<String, String>>,
}

impl JsonFileStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let json = std::fs::read_to_string(&path)?;
            if json.trim().is_empty() {
                IndexMap::new()
            } else {
                serde_json::from_str(&json)?
            }
        } else {
            IndexMap::new()
        };
        debug!("加载存储 {} ({} 条记录)", path.display(), entries.len());

        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    fn persist(&self, entries: &IndexMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(entries)?)?;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.write();
        entries.insert(key.to_string(), value.to_string());
        self.persist(&entries)
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.entries.read().keys().cloned().collect())
    }
}

/// 带命名空间前缀的存储视图
pub struct PrefixedStore<'a> {
    inner: &'a dyn KeyValueStore,
    prefix: String,
}

impl<'a> PrefixedStore<'a> {
    pub fn new(inner: &'a dyn KeyValueStore, prefix: impl Into<String>) -> Self {
        Self {
            inner,
            prefix: prefix.into(),
        }
    }

    fn key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    /// 读取原始字符串，空值视为缺失
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.inner.read(&self.key(key))?.filter(|v| !is_empty_raw(v)))
    }

    /// 读取并解码 JSON；空对象、空数组、null 均视为缺失
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(raw) = self.get(key)? else {
            return Ok(None);
        };
        let value: Value = serde_json::from_str(&raw)?;
        if is_empty_value(&value) {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(value)?))
    }

    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        self.inner.write(&self.key(key), value)
    }

    /// 列出本命名空间下的键 (去除前缀)
    pub fn keys(&self) -> Result<Vec<String>> {
        Ok(self
            .inner
            .keys()?
            .into_iter()
            .filter_map(|k| k.strip_prefix(&self.prefix).map(str::to_string))
            .collect())
    }
}

fn is_empty_raw(raw: &str) -> bool {
    matches!(raw.trim(), "" | "null" | "undefined")
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

/// 内存存储，用于测试
#[cfg(test)]
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<IndexMap<String, String>>,
}

#[cfg(test)]
impl MemoryStore {
    pub fn with(pairs: &[(&str, &str)]) -> Self {
        Self {
            entries: RwLock::new(
                pairs
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
impl KeyValueStore for MemoryStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        self.entries.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.entries.read().keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn file_store_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");

        let store = JsonFileStore::open(&path).unwrap();
        assert_eq!(store.read("k").unwrap(), None);
        store.write("k", "v").unwrap();
        assert!(path.exists());

        let reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(reopened.read("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(JsonFileStore::open(&path).is_err());
    }

    #[test]
    fn prefixed_view_namespaces_keys() {
        let mem = MemoryStore::with(&[("p.a", "1"), ("other.b", "2")]);
        let store = PrefixedStore::new(&mem, "p.");

        assert_eq!(store.get("a").unwrap().as_deref(), Some("1"));
        assert_eq!(store.get("b").unwrap(), None);

        store.set("c", "3").unwrap();
        assert_eq!(mem.read("p.c").unwrap().as_deref(), Some("3"));
        assert_eq!(store.keys().unwrap(), ["a", "c"]);
    }

    #[test]
    fn empty_values_read_as_absent() {
        let mem = MemoryStore::with(&[
            ("p.blank", ""),
            ("p.null", "null"),
            ("p.obj", "{}"),
            ("p.arr", "[]"),
            ("p.full", r#"{"x":"y"}"#),
        ]);
        let store = PrefixedStore::new(&mem, "p.");

        assert_eq!(store.get("blank").unwrap(), None);
        assert_eq!(store.get_json::<HashMap<String, String>>("null").unwrap(), None);
        assert_eq!(store.get_json::<HashMap<String, String>>("obj").unwrap(), None);
        assert_eq!(store.get_json::<Vec<String>>("arr").unwrap(), None);

        let full = store.get_json::<HashMap<String, String>>("full").unwrap().unwrap();
        assert_eq!(full["x"], "y");
    }

    #[test]
    fn malformed_json_propagates() {
        let mem = MemoryStore::with(&[("p.bad", "{oops")]);
        let store = PrefixedStore::new(&mem, "p.");
        assert!(store.get_json::<HashMap<String, String>>("bad").is_err());
    }
}
