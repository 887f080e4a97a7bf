//! Process configuration, read from flags or the environment.

use crate::token_manager::OAuthSettings;
use clap::Parser;
use std::fmt;
use std::net::IpAddr;
use url::Url;

#[derive(Clone, Parser)]
#[command(
    name = "amocrm-gateway",
    about = "Reconcile contacts and leads in amoCRM over a small HTTP API",
    version
)]
pub struct GatewayConfig {
    /// amoCRM account URL, e.g. `https://example.amocrm.ru`.
    #[arg(long = "amo-url", env = "AMO_URL", value_name = "url")]
    pub amo_url: Url,

    /// OAuth2 integration id.
    #[arg(long = "client-id", env = "CLIENT_ID")]
    pub client_id: String,

    /// OAuth2 integration secret.
    #[arg(long = "client-secret", env = "CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: String,

    /// Redirect URI registered for the integration.
    #[arg(long = "redirect-url", env = "REDIRECT_URL", value_name = "url")]
    pub redirect_url: String,

    #[arg(long = "host", env = "APP_HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    #[arg(long = "port", env = "APP_PORT", default_value_t = 3000)]
    pub port: u16,

    /// One-time authorization code. Exchanged once at startup and never stored.
    #[arg(value_name = "AUTHORIZATION_CODE")]
    pub authorization_code: String,
}

impl GatewayConfig {
    pub fn oauth(&self) -> OAuthSettings {
        OAuthSettings {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            redirect_uri: self.redirect_url.clone(),
        }
    }

    pub fn bind_addr(&self) -> (IpAddr, u16) {
        (self.host, self.port)
    }
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("amo_url", &self.amo_url.as_str())
            .field("client_id", &self.client_id)
            .field("redirect_url", &self.redirect_url)
            .field("host", &self.host)
            .field("port", &self.port)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<GatewayConfig, clap::Error> {
        GatewayConfig::try_parse_from(std::iter::once("amocrm-gateway").chain(args.iter().copied()))
    }

    #[test]
    fn flags_and_code_are_read() {
        let config = parse(&[
            "--amo-url",
            "https://example.amocrm.ru",
            "--client-id",
            "id",
            "--client-secret",
            "secret",
            "--redirect-url",
            "https://example.com/cb",
            "--port",
            "8080",
            "def50200",
        ])
        .unwrap();

        assert_eq!(config.authorization_code, "def50200");
        assert_eq!(config.bind_addr().1, 8080);
        assert_eq!(config.oauth().redirect_uri, "https://example.com/cb");
    }

    #[test]
    fn debug_output_hides_secrets() {
        let config = parse(&[
            "--amo-url",
            "https://example.amocrm.ru",
            "--client-id",
            "id",
            "--client-secret",
            "very-secret",
            "--redirect-url",
            "cb",
            "def50200",
        ])
        .unwrap();

        let output = format!("{:?}", config);
        assert!(!output.contains("very-secret"));
        assert!(!output.contains("def50200"));
    }

    #[test]
    fn invalid_url_is_rejected() {
        let result = parse(&[
            "--amo-url",
            "not a url",
            "--client-id",
            "id",
            "--client-secret",
            "secret",
            "--redirect-url",
            "cb",
            "code",
        ]);

        assert!(result.is_err());
    }
}
