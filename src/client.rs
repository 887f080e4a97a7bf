use crate::client_error::CrmRequestError;
use crate::credentials::CredentialCell;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};
use url::Url;

/// Thin transport over the amoCRM REST API.
///
/// Every call carries the credential currently held by the [`CredentialCell`] and
/// translates failures into [`CrmRequestError`]. Response bodies are decoded as-is;
/// unwrapping `_embedded` collections is left to the caller.
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: Url,
    credentials: CredentialCell,
}

impl Client {
    /// Create a new client bound to `base_url`, e.g. `https://example.amocrm.ru`.
    pub fn new(base_url: Url, credentials: CredentialCell) -> Client {
        Client {
            http: reqwest::Client::new(),
            base_url: normalize_base(base_url),
            credentials,
        }
    }
}

impl Client {
    /// Get the credential slot this client reads from.
    pub fn credentials(&self) -> &CredentialCell {
        &self.credentials
    }

    fn url(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, CrmRequestError> {
        let mut url = self
            .base_url
            .join(path)
            .map_err(|source| CrmRequestError::Path {
                path: path.to_string(),
                source,
            })?;

        if !query.is_empty() {
            let encoded = serde_urlencoded::to_string(query)?;
            let merged = match url.query() {
                Some(existing) if !existing.is_empty() => format!("{}&{}", existing, encoded),
                _ => encoded,
            };
            url.set_query(Some(&merged));
        }

        Ok(url)
    }
}

impl Client {
    /// Make a GET request to the CRM.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, CrmRequestError> {
        self.get_query(path, &[]).await
    }

    /// Make a GET request, treating an empty response (`204 No Content`) as `None`.
    pub async fn get_optional<T: DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<Option<T>, CrmRequestError> {
        self.get_query_optional(path, &[]).await
    }

    /// Make a GET request with extra query parameters. Keys may repeat.
    pub async fn get_query<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, CrmRequestError> {
        self.get_query_optional(path, query)
            .await?
            .ok_or(CrmRequestError::EmptyBody)
    }

    pub async fn get_query_optional<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Option<T>, CrmRequestError> {
        let url = self.url(path, query)?;
        self.send::<(), T>(Method::GET, url, None, true).await
    }

    /// Make a POST request to the CRM.
    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, CrmRequestError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(path, &[])?;
        self.send(Method::POST, url, Some(body), true)
            .await?
            .ok_or(CrmRequestError::EmptyBody)
    }

    /// Make a PATCH request to the CRM.
    pub async fn patch<B, T>(&self, path: &str, body: &B) -> Result<T, CrmRequestError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(path, &[])?;
        self.send(Method::PATCH, url, Some(body), true)
            .await?
            .ok_or(CrmRequestError::EmptyBody)
    }

    /// POST without an `Authorization` header. Only the token endpoint is called this way.
    pub(crate) async fn post_anonymous<B, T>(&self, path: &str, body: &B) -> Result<T, CrmRequestError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(path, &[])?;
        self.send(Method::POST, url, Some(body), false)
            .await?
            .ok_or(CrmRequestError::EmptyBody)
    }

    async fn send<B, T>(
        &self,
        method: Method,
        url: Url,
        body: Option<&B>,
        authorize: bool,
    ) -> Result<Option<T>, CrmRequestError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        debug!(%method, path = url.path(), "CRM request");

        let mut request = self
            .http
            .request(method.clone(), url.clone())
            .header(ACCEPT, "application/json");

        if authorize {
            let authorization = self.credentials.authorization().await?;
            request = request.header(AUTHORIZATION, authorization);
        }

        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let raw = response.bytes().await?;

        if !status.is_client_error() && !status.is_server_error() {
            if status == StatusCode::NO_CONTENT || raw.is_empty() {
                return Ok(None);
            }

            return Ok(Some(serde_json::from_slice(&raw)?));
        }

        let error = CrmRequestError::from_response(status, &raw);
        warn!(%method, path = url.path(), %status, error = %error, "CRM request failed");

        Err(error)
    }
}

/// Make sure relative paths are joined under the base path instead of replacing its
/// last segment.
fn normalize_base(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }

    url
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token_record::TokenRecord;
    use mockito::{Matcher, Server};
    use serde_json::{json, Value};

    fn authenticated(server: &Server, access_token: &str) -> Client {
        let cell = CredentialCell::new();
        cell.install(&TokenRecord {
            access_token: access_token.to_string(),
            refresh_token: String::from("refresh"),
            token_type: String::from("Bearer"),
            expires_in: 86400,
        });

        Client::new(Url::parse(&server.url()).unwrap(), cell)
    }

    #[test]
    fn base_path_keeps_its_last_segment() {
        let client = Client::new(
            Url::parse("https://example.amocrm.ru/proxy").unwrap(),
            CredentialCell::new(),
        );

        let url = client.url("api/v4/leads?with=contacts", &[]).unwrap();
        assert_eq!(url.as_str(), "https://example.amocrm.ru/proxy/api/v4/leads?with=contacts");
    }

    #[test]
    fn repeated_query_parameters_are_appended() {
        let client = Client::new(
            Url::parse("https://example.amocrm.ru").unwrap(),
            CredentialCell::new(),
        );

        let url = client
            .url("api/v4/contacts?with=leads", &[("query", "j@x.com"), ("query", "555")])
            .unwrap();
        assert_eq!(url.query(), Some("with=leads&query=j%40x.com&query=555"));
    }

    #[tokio::test]
    async fn get_sends_current_bearer_header() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v4/leads/7")
            .match_query(Matcher::UrlEncoded("with".into(), "contacts".into()))
            .match_header("authorization", "Bearer abc")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":7,"name":"7 lead"}"#)
            .create_async()
            .await;
        let client = authenticated(&server, "abc");

        let lead: Value = client.get("api/v4/leads/7?with=contacts").await.unwrap();

        mock.assert_async().await;
        assert_eq!(lead, json!({ "id": 7, "name": "7 lead" }));
    }

    #[tokio::test]
    async fn no_content_is_none_for_optional_gets() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v4/contacts")
            .match_query(Matcher::Any)
            .with_status(204)
            .expect(2)
            .create_async()
            .await;
        let client = authenticated(&server, "abc");

        let found: Option<Value> = client
            .get_query_optional("api/v4/contacts", &[("query", "nobody")])
            .await
            .unwrap();
        let required = client.get::<Value>("api/v4/contacts").await;

        mock.assert_async().await;
        assert!(found.is_none());
        assert!(matches!(required, Err(CrmRequestError::EmptyBody)));
    }

    #[tokio::test]
    async fn error_payload_hint_is_the_message() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/v4/leads")
            .with_status(401)
            .with_header("content-type", "application/json")
            .with_body(r#"{"hint":"invalid token","title":"Unauthorized","status":401}"#)
            .create_async()
            .await;
        let client = authenticated(&server, "abc");

        let error = client
            .post::<_, Value>("api/v4/leads", &json!([{ "name": "x" }]))
            .await
            .unwrap_err();

        assert_eq!(error.to_string(), "invalid token");
        assert_eq!(error.status(), Some(StatusCode::UNAUTHORIZED));
        assert!(error.is_auth());
    }

    #[tokio::test]
    async fn patch_sends_json_body() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("PATCH", "/api/v4/contacts")
            .match_body(Matcher::Json(json!([{ "id": 42, "name": "Jane" }])))
            .with_status(200)
            .with_body(r#"{"_embedded":{"contacts":[{"id":42}]}}"#)
            .create_async()
            .await;
        let client = authenticated(&server, "abc");

        let response: Value = client
            .patch("api/v4/contacts", &json!([{ "id": 42, "name": "Jane" }]))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(response["_embedded"]["contacts"][0]["id"], 42);
    }

    #[tokio::test]
    async fn unauthenticated_client_makes_no_request() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", Matcher::Any)
            .expect(0)
            .create_async()
            .await;
        let client = Client::new(Url::parse(&server.url()).unwrap(), CredentialCell::new());

        let result = client.get::<Value>("api/v4/contacts").await;

        mock.assert_async().await;
        assert!(matches!(result, Err(CrmRequestError::NotAuthenticated)));
    }

    #[tokio::test]
    async fn transport_errors_are_reported() {
        let client = Client::new(
            Url::parse("http://127.0.0.1:9").unwrap(),
            CredentialCell::new(),
        );

        let result = client
            .post_anonymous::<_, Value>("oauth2/access_token", &json!({}))
            .await;

        assert!(matches!(result, Err(CrmRequestError::Transport(_))));
    }
}
