//! Contact reconciliation: find or create the contact for an identity, then attach a
//! new lead to it.
//!
//! Matching is best effort. Only the first hit of one search query is considered, and
//! concurrent reconciliations of the same identity may both create a contact. Every
//! reconciliation creates a fresh lead, even when the contact already has one.

use crate::client::Client;
use crate::client_error::CrmRequestError;
use crate::models::{
    Contact, ContactIdentity, ContactPayload, CustomFieldDescriptor, CustomFieldValue, Lead,
    LeadPayload, Reconciliation, EMAIL_CODE, PHONE_CODE,
};
use crate::response::{ContactList, CustomFieldList, Embedded, LeadList};
use serde_json::Value;
use tracing::{debug, info};

pub const CONTACTS_PATH: &str = "api/v4/contacts";
pub const CUSTOM_FIELDS_PATH: &str = "api/v4/contacts/custom_fields";
pub const LEADS_PATH: &str = "api/v4/leads";

#[derive(Clone)]
pub struct Reconciler {
    client: Client,
}

impl Reconciler {
    pub fn new(client: Client) -> Reconciler {
        Reconciler { client }
    }

    /// Lookup, field resolution, upsert and lead creation, strictly in that order.
    #[tracing::instrument(skip_all, fields(name = %identity.name))]
    pub async fn reconcile(
        &self,
        identity: &ContactIdentity,
    ) -> Result<Reconciliation, CrmRequestError> {
        let existing = self.find_contact(identity).await?;
        let fields = self.contact_fields().await?;
        let contact = self
            .upsert_contact(existing.map(|contact| contact.id), identity, &fields)
            .await?;
        let lead = self.add_lead(&contact).await?;

        info!(contact_id = contact.id, lead_id = lead.id, "contact reconciled");

        Ok(Reconciliation { contact, lead })
    }

    /// First contact matching any of the identity's non-name fields.
    pub async fn find_contact(
        &self,
        identity: &ContactIdentity,
    ) -> Result<Option<Contact>, CrmRequestError> {
        let query: Vec<(&str, &str)> = identity
            .lookup_terms()
            .iter()
            .map(|term| ("query", *term))
            .collect();

        let found = self
            .client
            .get_query_optional::<Embedded<ContactList>>(CONTACTS_PATH, &query)
            .await?
            .and_then(|list| list.into_inner().contacts.into_iter().next());

        debug!(contact_id = ?found.as_ref().map(|contact| contact.id), "contact lookup");
        Ok(found)
    }

    /// Descriptors of the phone and e-mail fields, whichever of them the CRM has.
    pub async fn contact_fields(&self) -> Result<Vec<CustomFieldDescriptor>, CrmRequestError> {
        let all = self
            .client
            .get_optional::<Embedded<CustomFieldList>>(CUSTOM_FIELDS_PATH)
            .await?
            .map(|list| list.into_inner().custom_fields)
            .unwrap_or_default();

        Ok(select_fields(all, &[PHONE_CODE, EMAIL_CODE]))
    }

    /// `PATCH` the contact with `id` when given, otherwise `POST` a new one.
    pub async fn upsert_contact(
        &self,
        id: Option<u64>,
        identity: &ContactIdentity,
        fields: &[CustomFieldDescriptor],
    ) -> Result<Contact, CrmRequestError> {
        let payload = [ContactPayload {
            id,
            name: identity.name.clone(),
            custom_fields_values: field_values(fields, identity),
        }];

        let response: Embedded<ContactList> = match id {
            Some(_) => self.client.patch(CONTACTS_PATH, &payload).await?,
            None => self.client.post(CONTACTS_PATH, &payload).await?,
        };

        response
            .into_inner()
            .contacts
            .into_iter()
            .next()
            .ok_or(CrmRequestError::MissingEmbedded("contacts"))
    }

    /// Create a new lead named `"<contact id> lead"` bound to `contact`.
    pub async fn add_lead(&self, contact: &Contact) -> Result<Lead, CrmRequestError> {
        let payload = [LeadPayload::for_contact(contact.id)];
        let response: Embedded<LeadList> = self.client.post(LEADS_PATH, &payload).await?;

        response
            .into_inner()
            .leads
            .into_iter()
            .next()
            .ok_or(CrmRequestError::MissingEmbedded("leads"))
    }
}

/// Descriptors whose code is one of `codes`, first match per code, in `codes` order.
fn select_fields(all: Vec<CustomFieldDescriptor>, codes: &[&str]) -> Vec<CustomFieldDescriptor> {
    codes
        .iter()
        .filter_map(|code| {
            all.iter()
                .find(|field| field.code.as_deref() == Some(*code))
                .cloned()
        })
        .collect()
}

fn field_values(fields: &[CustomFieldDescriptor], identity: &ContactIdentity) -> Vec<CustomFieldValue> {
    fields
        .iter()
        .filter_map(|field| {
            let value = identity.value_for(field.code.as_deref()?)?;
            Some(CustomFieldValue::single(field.id, value))
        })
        .collect()
}

/// Plain pass-through reads. Payloads are returned exactly as the CRM sent them.
#[derive(Clone)]
pub struct Records {
    client: Client,
}

impl Records {
    pub fn new(client: Client) -> Records {
        Records { client }
    }

    pub async fn contacts(&self) -> Result<Value, CrmRequestError> {
        self.read(&format!("{}?with=leads", CONTACTS_PATH)).await
    }

    pub async fn contact(&self, id: u64) -> Result<Value, CrmRequestError> {
        self.read(&format!("{}/{}?with=leads", CONTACTS_PATH, id)).await
    }

    pub async fn leads(&self) -> Result<Value, CrmRequestError> {
        self.read(&format!("{}?with=contacts", LEADS_PATH)).await
    }

    pub async fn lead(&self, id: u64) -> Result<Value, CrmRequestError> {
        self.read(&format!("{}/{}?with=contacts", LEADS_PATH, id)).await
    }

    // amoCRM answers empty collections with 204.
    async fn read(&self, path: &str) -> Result<Value, CrmRequestError> {
        Ok(self
            .client
            .get_optional(path)
            .await?
            .unwrap_or_else(|| Value::Object(Default::default())))
    }
}
