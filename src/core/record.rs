//! 云端记录模型
//!
//! 云端记录是一个动态类型的键值集合：顶层字段（size、fileType 等）
//! 加上嵌套的 attributes 子映射（localPath、relativePath 等）。
//! 所有读取都经过带类型的访问器，先校验存在性再校验类型。

use crate::db::DirtyState;
use crate::error::FieldError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============ 字段名 ============

pub const FILE_NAME: &str = "fileName";
pub const FILE_TYPE: &str = "fileType";
pub const FILE_SIZE: &str = "size";
pub const FILE_ALBUM_IDS: &str = "albumIds";
pub const FILE_ATTRIBUTES: &str = "attributes";

pub const ATTR_LOCAL_PATH: &str = "localPath";
pub const ATTR_RELATIVE_PATH: &str = "relativePath";
pub const ATTR_META_MODIFIED: &str = "metaModifiedTime";
pub const ATTR_EDITED_TIME: &str = "editedTime";
pub const ATTR_FILE_ID: &str = "fileId";

pub type FieldMap = BTreeMap<String, FieldValue>;

/// 字段值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    List(Vec<FieldValue>),
    Map(FieldMap),
}

impl FieldValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Bool(_) => "bool",
            FieldValue::Int(_) => "integer",
            FieldValue::Double(_) => "double",
            FieldValue::String(_) => "string",
            FieldValue::List(_) => "list",
            FieldValue::Map(_) => "map",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[FieldValue]> {
        match self {
            FieldValue::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&FieldMap> {
        match self {
            FieldValue::Map(m) => Some(m),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::String(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::String(s)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Int(v as i64)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<Vec<i64>> for FieldValue {
    fn from(v: Vec<i64>) -> Self {
        FieldValue::List(v.into_iter().map(FieldValue::Int).collect())
    }
}

/// 从映射中按类型取值
fn typed<'a, T>(
    map: &'a FieldMap,
    key: &str,
    expected: &'static str,
    pick: impl FnOnce(&'a FieldValue) -> Option<T>,
) -> Result<T, FieldError> {
    let value = map.get(key).ok_or_else(|| FieldError::Missing(key.to_string()))?;
    pick(value).ok_or_else(|| FieldError::WrongType {
        key: key.to_string(),
        expected,
    })
}

/// 一条拉取到的云端记录
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudRecord {
    pub record_id: String,
    /// 自上次同步以来该记录在云端的变化
    #[serde(default)]
    pub dirty: DirtyState,
    #[serde(default)]
    pub fields: FieldMap,
}

impl CloudRecord {
    pub fn new(record_id: impl Into<String>) -> Self {
        Self {
            record_id: record_id.into(),
            dirty: DirtyState::New,
            fields: FieldMap::new(),
        }
    }

    pub fn with_dirty(mut self, dirty: DirtyState) -> Self {
        self.dirty = dirty;
        self
    }

    pub fn with_field(mut self, key: &str, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn with_attribute(mut self, key: &str, value: impl Into<FieldValue>) -> Self {
        self.set_attribute(key, value);
        self
    }

    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    pub fn get_string(&self, key: &str) -> Result<&str, FieldError> {
        typed(&self.fields, key, "string", FieldValue::as_str)
    }

    pub fn get_int(&self, key: &str) -> Result<i64, FieldError> {
        typed(&self.fields, key, "integer", FieldValue::as_int)
    }

    pub fn get_bool(&self, key: &str) -> Result<bool, FieldError> {
        typed(&self.fields, key, "bool", FieldValue::as_bool)
    }

    pub fn attributes(&self) -> Result<&FieldMap, FieldError> {
        typed(&self.fields, FILE_ATTRIBUTES, "map", FieldValue::as_map)
    }

    pub fn attr_string(&self, key: &str) -> Result<&str, FieldError> {
        typed(self.attributes()?, key, "string", FieldValue::as_str)
    }

    pub fn attr_int(&self, key: &str) -> Result<i64, FieldError> {
        typed(self.attributes()?, key, "integer", FieldValue::as_int)
    }

    pub fn has_attribute(&self, key: &str) -> bool {
        self.attributes().map(|a| a.contains_key(key)).unwrap_or(false)
    }

    /// 写入 attributes 子映射（不存在或类型不对时重建）
    pub fn set_attribute(&mut self, key: &str, value: impl Into<FieldValue>) {
        let attrs = self
            .fields
            .entry(FILE_ATTRIBUTES.to_string())
            .or_insert_with(|| FieldValue::Map(FieldMap::new()));
        if !matches!(attrs, FieldValue::Map(_)) {
            *attrs = FieldValue::Map(FieldMap::new());
        }
        if let FieldValue::Map(map) = attrs {
            map.insert(key.to_string(), value.into());
        }
    }

    /// 相册 id 列表，字段缺失视为空列表
    pub fn album_ids(&self) -> Result<Vec<i64>, FieldError> {
        let Some(value) = self.fields.get(FILE_ALBUM_IDS) else {
            return Ok(Vec::new());
        };
        let wrong_type = || FieldError::WrongType {
            key: FILE_ALBUM_IDS.to_string(),
            expected: "list of integers",
        };
        value
            .as_list()
            .ok_or_else(wrong_type)?
            .iter()
            .map(|v| v.as_int().ok_or_else(wrong_type))
            .collect()
    }
}
