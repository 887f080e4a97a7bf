//! Various response objects returned from amoCRM.

use crate::models::{Contact, CustomFieldDescriptor, Lead};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Envelope used by amoCRM for collections: `{"_embedded": {...}}`.
///
/// The client hands these back untouched; callers pick the collection they expect.
#[derive(Debug, Deserialize)]
pub struct Embedded<T> {
    #[serde(rename = "_embedded")]
    pub embedded: T,
}

impl<T> Embedded<T> {
    pub fn into_inner(self) -> T {
        self.embedded
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ContactList {
    #[serde(default)]
    pub contacts: Vec<Contact>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LeadList {
    #[serde(default)]
    pub leads: Vec<Lead>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CustomFieldList {
    #[serde(default)]
    pub custom_fields: Vec<CustomFieldDescriptor>,
}

/// Error body amoCRM sends with 4xx/5xx responses.
///
/// The OAuth endpoint fills `hint`, the REST API usually only `title` and `detail`.
/// Anything else (`type`, `status`, `validation-errors`, ...) is kept in `extra`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct CrmErrorPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CrmErrorPayload {
    /// Parse an error body. Returns `None` unless the body is a JSON object.
    pub fn from_body(body: &[u8]) -> Option<CrmErrorPayload> {
        match serde_json::from_slice::<Value>(body) {
            Ok(value @ Value::Object(_)) => serde_json::from_value(value).ok(),
            _ => None,
        }
    }

    /// Most specific human readable message in the payload.
    pub fn message(&self) -> String {
        self.hint
            .as_deref()
            .or(self.detail.as_deref())
            .or(self.title.as_deref())
            .map(String::from)
            .unwrap_or_else(|| {
                serde_json::to_string(self).unwrap_or_else(|_| String::from("unknown CRM error"))
            })
    }
}
