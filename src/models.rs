//! CRM entities and the payloads written back to amoCRM.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Custom field code amoCRM uses for phone numbers.
pub const PHONE_CODE: &str = "PHONE";
/// Custom field code amoCRM uses for e-mail addresses.
pub const EMAIL_CODE: &str = "EMAIL";

/// Natural-person identity received from the gateway caller.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct ContactIdentity {
    pub name: String,
    pub email: String,
    pub phone: String,
}

impl ContactIdentity {
    pub fn new(name: impl Into<String>, email: impl Into<String>, phone: impl Into<String>) -> Self {
        ContactIdentity {
            name: name.into(),
            email: email.into(),
            phone: phone.into(),
        }
    }

    /// Every non-name field, in the order they are sent as `query` parameters.
    pub fn lookup_terms(&self) -> [&str; 2] {
        [self.email.as_str(), self.phone.as_str()]
    }

    /// Value to write into the custom field with the given code, if this identity has one.
    pub fn value_for(&self, code: &str) -> Option<&str> {
        match code {
            PHONE_CODE => Some(self.phone.as_str()),
            EMAIL_CODE => Some(self.email.as_str()),
            _ => None,
        }
    }
}

/// Metadata describing a typed contact field configured in amoCRM.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct CustomFieldDescriptor {
    pub id: u64,
    /// `null` for fields created by users rather than by amoCRM itself.
    #[serde(default)]
    pub code: Option<String>,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct FieldValue {
    pub value: Value,

    /// `enum_id`, `enum_code` and the like.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct CustomFieldValue {
    pub field_id: u64,
    pub values: Vec<FieldValue>,

    /// `field_name`, `field_code` and `field_type` on records read back from the CRM.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CustomFieldValue {
    pub fn single(field_id: u64, value: &str) -> CustomFieldValue {
        CustomFieldValue {
            field_id,
            values: vec![FieldValue {
                value: Value::String(value.to_owned()),
                extra: Map::new(),
            }],
            extra: Map::new(),
        }
    }
}

/// Contact as returned by amoCRM.
///
/// Attributes this crate does not interpret are kept in `extra` so callers see the
/// record exactly as the CRM sent it.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Contact {
    pub id: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_fields_values: Option<Vec<CustomFieldValue>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Contact written with `POST` (no id) or `PATCH` (existing id).
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ContactPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub name: String,
    pub custom_fields_values: Vec<CustomFieldValue>,
}

/// Lead as returned by amoCRM.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Lead {
    pub id: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ContactRef {
    pub id: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LeadContacts {
    pub contacts: Vec<ContactRef>,
}

/// Lead written with `POST leads`, always bound to exactly one contact.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LeadPayload {
    pub name: String,
    #[serde(rename = "_embedded")]
    pub embedded: LeadContacts,
}

impl LeadPayload {
    pub fn for_contact(contact_id: u64) -> LeadPayload {
        LeadPayload {
            name: format!("{} lead", contact_id),
            embedded: LeadContacts {
                contacts: vec![ContactRef { id: contact_id }],
            },
        }
    }
}

/// Outcome of a reconciliation: the resolved contact and the lead attached to it.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Reconciliation {
    pub contact: Contact,
    pub lead: Lead,
}
