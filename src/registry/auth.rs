//! Authentication module for Docker registry access
//!
//! Pull access is negotiated in two steps: an unauthenticated probe of `/v2/` yields a
//! `WWW-Authenticate` challenge, then the challenge's token endpoint is asked for a
//! token scoped to `repository:<repo>:pull`, either anonymously or with basic auth.

use crate::config::{AuthConfig, DEFAULT_AUTH_SERVICE, DEFAULT_AUTH_URL};
use crate::error::handlers::{HttpErrorHandler, NetworkErrorHandler};
use crate::error::{RegistryError, Result};
use crate::logging::Logger;
use crate::registry::client::RegistryClient;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, WWW_AUTHENTICATE};
use serde::Deserialize;
use std::collections::HashMap;

/// Parsed `Bearer` challenge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChallenge {
    pub realm: String,
    pub service: String,
    pub scope: Option<String>,
}

impl AuthChallenge {
    /// Parse a `Bearer realm="..",service="..",scope=".."` header.
    ///
    /// Returns `None` for other schemes or when no parameter could be read.
    /// Quoted values may contain commas and backslash escapes.
    pub fn parse(header: &str) -> Option<Self> {
        let header = header.trim();
        let (scheme, params) = header.split_once(char::is_whitespace)?;
        if !scheme.eq_ignore_ascii_case("bearer") {
            return None;
        }

        let params = parse_params(params);
        if params.is_empty() {
            return None;
        }

        Some(Self {
            realm: params.get("realm").cloned().unwrap_or_default(),
            service: params.get("service").cloned().unwrap_or_default(),
            scope: params.get("scope").cloned(),
        })
    }

    /// Parse `header`, filling absent or empty fields from the fallbacks
    pub fn parse_or_default(
        header: Option<&str>,
        fallback_realm: &str,
        fallback_service: &str,
    ) -> Self {
        let mut challenge = header.and_then(Self::parse).unwrap_or(Self {
            realm: String::new(),
            service: String::new(),
            scope: None,
        });
        if challenge.realm.is_empty() {
            challenge.realm = fallback_realm.to_string();
        }
        if challenge.service.is_empty() {
            challenge.service = fallback_service.to_string();
        }
        challenge
    }

    /// Token endpoint URL for pulling `repository`
    pub fn token_url(&self, repository: &str) -> Result<url::Url> {
        let mut url = url::Url::parse(&self.realm)
            .map_err(|e| RegistryError::Auth(format!("Invalid token realm {}: {}", self.realm, e)))?;
        {
            let mut query = url.query_pairs_mut();
            if !self.service.is_empty() {
                query.append_pair("service", &self.service);
            }
            query.append_pair("scope", &pull_scope(repository));
        }
        Ok(url)
    }
}

impl Default for AuthChallenge {
    fn default() -> Self {
        Self {
            realm: DEFAULT_AUTH_URL.to_string(),
            service: DEFAULT_AUTH_SERVICE.to_string(),
            scope: None,
        }
    }
}

pub fn pull_scope(repository: &str) -> String {
    format!("repository:{}:pull", repository)
}

fn parse_params(input: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let mut chars = input.chars().peekable();

    loop {
        while matches!(chars.peek(), Some(c) if c.is_whitespace() || *c == ',') {
            chars.next();
        }

        let mut key = String::new();
        while let Some(&c) = chars.peek() {
            if c == '=' || c == ',' {
                break;
            }
            key.push(c);
            chars.next();
        }
        let key = key.trim().to_ascii_lowercase();

        if chars.next_if_eq(&'=').is_none() {
            if chars.peek().is_none() {
                break;
            }
            continue;
        }

        while chars.next_if(|c| c.is_whitespace()).is_some() {}

        let mut value = String::new();
        if chars.next_if_eq(&'"').is_some() {
            while let Some(c) = chars.next() {
                match c {
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    '"' => break,
                    _ => value.push(c),
                }
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c == ',' {
                    break;
                }
                value.push(c);
                chars.next();
            }
            value = value.trim().to_string();
        }

        if !key.is_empty() {
            params.insert(key, value);
        }
    }

    params
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: Option<String>,
    access_token: Option<String>,
    expires_in: Option<u64>,
}

impl TokenResponse {
    /// Basic-auth exchanges answer with `token`; anonymous ones with `access_token`.
    fn into_token(self, authenticated: bool) -> Option<String> {
        let (first, second) = if authenticated {
            (self.token, self.access_token)
        } else {
            (self.access_token, self.token)
        };
        first
            .filter(|t| !t.is_empty())
            .or(second.filter(|t| !t.is_empty()))
    }
}

/// Bearer credential for one run; empty when the registry does not require auth
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthToken(Option<String>);

impl AuthToken {
    pub fn anonymous() -> Self {
        Self(None)
    }

    pub fn bearer(token: String) -> Self {
        Self(Some(token))
    }

    pub fn as_str(&self) -> Option<&str> {
        self.0.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    /// Header set carrying `Authorization: Bearer <token>` when a token exists
    pub fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(token) = self.as_str() {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| RegistryError::Auth(format!("Token is not a valid header: {}", e)))?;
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }
}

#[derive(Debug, Clone)]
pub struct Auth {
    client: RegistryClient,
    fallback_realm: String,
    fallback_service: String,
    output: Logger,
}

impl Auth {
    pub fn new(client: RegistryClient, output: Logger) -> Self {
        Self {
            client,
            fallback_realm: DEFAULT_AUTH_URL.to_string(),
            fallback_service: DEFAULT_AUTH_SERVICE.to_string(),
            output,
        }
    }

    pub fn with_fallback(mut self, realm: String, service: String) -> Self {
        self.fallback_realm = realm;
        self.fallback_service = service;
        self
    }

    /// Obtain a pull token for `repository`
    pub async fn authenticate(
        &self,
        repository: &str,
        credentials: Option<&AuthConfig>,
    ) -> Result<AuthToken> {
        self.output.step("Authenticating");
        let challenge = match self.get_challenge().await? {
            Some(challenge) => challenge,
            None => {
                self.output
                    .info("Registry did not ask for credentials, continuing without a token");
                return Ok(AuthToken::anonymous());
            }
        };

        self.output.detail(&format!(
            "Auth challenge: realm={}, service={}",
            challenge.realm, challenge.service
        ));

        let token = self.request_token(&challenge, repository, credentials).await?;
        self.output
            .success(&format!("Obtained pull token for {}", repository));
        Ok(token)
    }

    /// `None` when the probe succeeded without a challenge
    async fn get_challenge(&self) -> Result<Option<AuthChallenge>> {
        let response = self.client.probe().await?;
        let status = response.status();
        let header = response
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        self.output
            .detail(&format!("Registry probe answered HTTP {}", status.as_u16()));

        if status.is_success() && header.is_none() {
            return Ok(None);
        }

        if status != StatusCode::UNAUTHORIZED {
            self.output.warning(&format!(
                "Unexpected probe status {}, trying the token endpoint anyway",
                status.as_u16()
            ));
        }
        if header.as_deref().and_then(AuthChallenge::parse).is_none() {
            self.output
                .detail("Auth challenge missing or malformed, using the default token service");
        }

        Ok(Some(AuthChallenge::parse_or_default(
            header.as_deref(),
            &self.fallback_realm,
            &self.fallback_service,
        )))
    }

    async fn request_token(
        &self,
        challenge: &AuthChallenge,
        repository: &str,
        credentials: Option<&AuthConfig>,
    ) -> Result<AuthToken> {
        let url = challenge.token_url(repository)?;
        self.output.detail(&format!("Requesting token from {}", url));

        let mut request = self.client.http().get(url);
        if let Some(auth) = credentials {
            self.output
                .detail(&format!("Using basic auth for user {}", auth.username));
            request = request.basic_auth(&auth.username, Some(&auth.password));
        }

        let response = request
            .send()
            .await
            .map_err(|e| NetworkErrorHandler::handle_network_error(&e, "token request"))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(HttpErrorHandler::handle_auth_error(status, &text));
        }

        let body = response
            .text()
            .await
            .map_err(|e| RegistryError::Auth(format!("Failed to read token response: {}", e)))?;
        let parsed: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| RegistryError::Auth(format!("Failed to decode token response: {}", e)))?;

        if let Some(expires_in) = parsed.expires_in {
            self.output
                .detail(&format!("Token valid for {}s", expires_in));
        }

        parsed
            .into_token(credentials.is_some())
            .map(AuthToken::bearer)
            .ok_or_else(|| RegistryError::Auth("Token response carried no token".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_docker_hub_challenge() {
        let challenge = AuthChallenge::parse(
            r#"Bearer realm="https://auth.docker.io/token",service="registry.docker.io",scope="repository:library/nginx:pull""#,
        )
        .unwrap();
        assert_eq!(challenge.realm, "https://auth.docker.io/token");
        assert_eq!(challenge.service, "registry.docker.io");
        assert_eq!(
            challenge.scope.as_deref(),
            Some("repository:library/nginx:pull")
        );
    }

    #[test]
    fn quoted_values_keep_commas() {
        let challenge = AuthChallenge::parse(
            r#"bearer service="svc", scope="repository:a/b:pull,push", realm="https://r/token""#,
        )
        .unwrap();
        assert_eq!(challenge.realm, "https://r/token");
        assert_eq!(challenge.service, "svc");
        assert_eq!(challenge.scope.as_deref(), Some("repository:a/b:pull,push"));
    }

    #[test]
    fn unquoted_values_are_accepted() {
        let challenge = AuthChallenge::parse("Bearer realm=https://r/token,service=svc").unwrap();
        assert_eq!(challenge.realm, "https://r/token");
        assert_eq!(challenge.service, "svc");
    }

    #[test]
    fn other_schemes_are_not_bearer_challenges() {
        assert!(AuthChallenge::parse(r#"Basic realm="registry""#).is_none());
        assert!(AuthChallenge::parse("Bearer").is_none());
        assert!(AuthChallenge::parse("").is_none());
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let challenge = AuthChallenge::parse_or_default(
            Some(r#"Bearer realm="https://r/token""#),
            DEFAULT_AUTH_URL,
            DEFAULT_AUTH_SERVICE,
        );
        assert_eq!(challenge.realm, "https://r/token");
        assert_eq!(challenge.service, DEFAULT_AUTH_SERVICE);

        let challenge =
            AuthChallenge::parse_or_default(Some("garbage"), DEFAULT_AUTH_URL, DEFAULT_AUTH_SERVICE);
        assert_eq!(challenge, AuthChallenge::default());

        let challenge = AuthChallenge::parse_or_default(None, DEFAULT_AUTH_URL, DEFAULT_AUTH_SERVICE);
        assert_eq!(challenge, AuthChallenge::default());
    }

    #[test]
    fn token_url_carries_service_and_pull_scope() {
        let url = AuthChallenge::default().token_url("library/nginx").unwrap();
        let pairs: HashMap<String, String> = url.query_pairs().into_owned().collect();
        assert_eq!(url.host_str(), Some("auth.docker.io"));
        assert_eq!(pairs["service"], "registry.docker.io");
        assert_eq!(pairs["scope"], "repository:library/nginx:pull");
    }

    #[test]
    fn token_field_precedence_depends_on_exchange() {
        let both = || TokenResponse {
            token: Some("from-token".to_string()),
            access_token: Some("from-access".to_string()),
            expires_in: None,
        };
        assert_eq!(both().into_token(true).as_deref(), Some("from-token"));
        assert_eq!(both().into_token(false).as_deref(), Some("from-access"));

        let only_token = TokenResponse {
            token: Some("t".to_string()),
            access_token: None,
            expires_in: None,
        };
        assert_eq!(only_token.into_token(false).as_deref(), Some("t"));

        let empty = TokenResponse {
            token: Some(String::new()),
            access_token: None,
            expires_in: Some(300),
        };
        assert_eq!(empty.into_token(true), None);
    }

    #[test]
    fn token_headers() {
        assert!(AuthToken::anonymous().headers().unwrap().is_empty());
        let headers = AuthToken::bearer("abc".to_string()).headers().unwrap();
        assert_eq!(headers[AUTHORIZATION], "Bearer abc");
    }
}
