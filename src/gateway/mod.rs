//! Inbound HTTP surface.
//!
//! `GET /` reconciles a contact and attaches a lead; the `/contacts` and `/leads`
//! routes forward reads to the CRM unchanged.

mod error;

pub use error::{ErrorBody, GatewayError, ValidationError};

use crate::models::ContactIdentity;
use crate::reconcile::{Reconciler, Records};
use actix_web::{get, web, HttpResponse};
use serde::Deserialize;
use tracing::debug;

/// Services shared by all handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub reconciler: Reconciler,
    pub records: Records,
}

/// Register every gateway route.
///
/// A query string that cannot be decoded at all is answered like a missing parameter.
pub fn configure(cfg: &mut web::ServiceConfig) {
    let query = web::QueryConfig::default().error_handler(|error, _req| {
        debug!(error = %error, "undecodable query string");
        GatewayError::Validation(ValidationError::MissingParameters).into()
    });

    cfg.app_data(query)
        .service(reconcile)
        .service(list_contacts)
        .service(get_contact)
        .service(list_leads)
        .service(get_lead);
}

#[derive(Debug, Default, Deserialize)]
pub struct ReconcileQuery {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl TryFrom<ReconcileQuery> for ContactIdentity {
    type Error = ValidationError;

    fn try_from(query: ReconcileQuery) -> Result<Self, Self::Error> {
        match (present(query.name), present(query.email), present(query.phone)) {
            (Some(name), Some(email), Some(phone)) => Ok(ContactIdentity { name, email, phone }),
            _ => Err(ValidationError::MissingParameters),
        }
    }
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.is_empty())
}

/// Parse a path id, accepting positive integers only.
pub fn parse_id(raw: &str, invalid: ValidationError) -> Result<u64, ValidationError> {
    match raw.parse::<u64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(invalid),
    }
}

#[get("/")]
pub async fn reconcile(
    state: web::Data<GatewayState>,
    query: web::Query<ReconcileQuery>,
) -> Result<HttpResponse, GatewayError> {
    let identity = ContactIdentity::try_from(query.into_inner())?;
    let outcome = state.reconciler.reconcile(&identity).await?;

    Ok(HttpResponse::Ok().json(outcome))
}

#[get("/contacts")]
pub async fn list_contacts(state: web::Data<GatewayState>) -> Result<HttpResponse, GatewayError> {
    Ok(HttpResponse::Ok().json(state.records.contacts().await?))
}

#[get("/contacts/{id}")]
pub async fn get_contact(
    state: web::Data<GatewayState>,
    id: web::Path<String>,
) -> Result<HttpResponse, GatewayError> {
    let id = parse_id(&id, ValidationError::WrongContactId)?;

    Ok(HttpResponse::Ok().json(state.records.contact(id).await?))
}

#[get("/leads")]
pub async fn list_leads(state: web::Data<GatewayState>) -> Result<HttpResponse, GatewayError> {
    Ok(HttpResponse::Ok().json(state.records.leads().await?))
}

#[get("/leads/{id}")]
pub async fn get_lead(
    state: web::Data<GatewayState>,
    id: web::Path<String>,
) -> Result<HttpResponse, GatewayError> {
    let id = parse_id(&id, ValidationError::WrongLeadId)?;

    Ok(HttpResponse::Ok().json(state.records.lead(id).await?))
}
