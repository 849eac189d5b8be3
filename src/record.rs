//! Record shape contract
//!
//! Every record handed to UI code carries the store-assigned id merged into
//! its own fields. [`Document`] is what the store delivers; [`Document::decode`]
//! produces the merged, typed record.

use crate::error::{ClientError, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};

/// Raw field map of a stored record.
pub type Fields = Map<String, Value>;

/// A record as delivered by the store: id and path kept apart from the fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub path: String,
    pub fields: Fields,
}

impl Document {
    pub fn new(id: impl Into<String>, path: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            fields,
        }
    }

    /// Fields with `id` merged in. The store id wins over any stored `id` field.
    pub fn merged(&self) -> Fields {
        let mut fields = self.fields.clone();
        fields.insert("id".to_string(), Value::String(self.id.clone()));
        fields
    }

    /// Decode the merged record into `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(Value::Object(self.merged())).map_err(|e| ClientError::Decode {
            path: self.path.clone(),
            message: e.to_string(),
        })
    }
}

/// Untyped record: the id plus whatever fields the store holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    #[serde(flatten)]
    pub fields: Fields,
}

impl Record {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }
}

/// Image reference used by profile avatars.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub hint: String,
}

/// The viewer's own profile record, stored under the identity id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub avatar: ImageRef,
    #[serde(default)]
    pub bio: String,
}
