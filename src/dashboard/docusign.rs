//! DocuSign e-signature adapter.
//!
//! Authentication uses the JWT bearer grant: an RS256 assertion signed with
//! the integration's private key is exchanged for an access token, then
//! `/oauth/userinfo` yields the account and REST base URI. The first grant
//! for a user needs interactive consent; until then the auth server answers
//! `consent_required` and callers get a `ReauthRequired` pointing at the
//! consent URL.

use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};

use super::db::DbHandle;
use super::models::{OAuthToken, Provider};
use super::oauth::{TokenGrant, TokenManager, TokenSource};
use crate::config::DocuSignSection;
use crate::errors::DashboardError;

const SERVICE: &str = "DocuSign";
const JWT_SCOPE: &str = "signature impersonation";
const JWT_LIFETIME_SECS: i64 = 3600;
const DEFAULT_LOOKBACK_DAYS: i64 = 30;

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct JwtClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
    pub scope: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    #[serde(default)]
    accounts: Vec<UserAccount>,
}

#[derive(Debug, Deserialize)]
struct UserAccount {
    account_id: String,
    #[serde(default)]
    is_default: bool,
    base_uri: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signer {
    #[serde(default)]
    pub recipient_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub signed_date_time: Option<String>,
    #[serde(default)]
    pub routing_order: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipients {
    #[serde(default)]
    pub signers: Vec<Signer>,
    #[serde(default)]
    pub carbon_copies: Vec<Signer>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub envelope_id: String,
    pub status: String,
    #[serde(default)]
    pub email_subject: Option<String>,
    #[serde(default)]
    pub sent_date_time: Option<String>,
    #[serde(default)]
    pub completed_date_time: Option<String>,
    #[serde(default)]
    pub status_changed_date_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipients: Option<Recipients>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnvelopeList {
    #[serde(default)]
    envelopes: Vec<Envelope>,
}

/// Filters for the envelope list.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EnvelopeQuery {
    pub from_date: Option<String>,
    pub status: Option<String>,
}

impl EnvelopeQuery {
    /// Query parameters, defaulting `from_date` to `DEFAULT_LOOKBACK_DAYS` ago.
    fn params(&self, now: DateTime<Utc>) -> Vec<(&'static str, String)> {
        let from_date = self
            .from_date
            .clone()
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| {
                (now - Duration::days(DEFAULT_LOOKBACK_DAYS))
                    .format("%Y-%m-%d")
                    .to_string()
            });
        let mut params = vec![("from_date", from_date)];
        if let Some(status) = self.status.as_ref().filter(|s| !s.trim().is_empty()) {
            params.push(("status", status.clone()));
        }
        params
    }
}

/// Outcome of a REST call against the account base.
#[derive(Debug)]
enum RestError {
    /// DocuSign answered 401 for the access token.
    Unauthorized,
    Failed(DashboardError),
}

impl From<RestError> for DashboardError {
    fn from(err: RestError) -> Self {
        match err {
            RestError::Unauthorized => DashboardError::upstream(SERVICE, "HTTP 401 Unauthorized"),
            RestError::Failed(e) => e,
        }
    }
}

pub struct DocuSignClient {
    http: reqwest::Client,
    integration_key: String,
    user_id: String,
    private_key: EncodingKey,
    /// Scheme and host of the auth server, e.g. `https://account-d.docusign.com`.
    auth_base: String,
    /// Bare host, used as the JWT audience.
    audience: String,
    consent_redirect_uri: Option<String>,
}

/// Split a configured auth server into its base URL and bare host. A value
/// without a scheme is an HTTPS host.
fn auth_endpoints(auth_server: &str) -> (String, String) {
    let trimmed = auth_server.trim().trim_end_matches('/');
    match trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
    {
        Some(host) => (trimmed.to_string(), host.to_string()),
        None => (format!("https://{}", trimmed), trimmed.to_string()),
    }
}

/// Envelope ids are GUIDs; anything else never reaches the REST path.
fn validate_envelope_id(envelope_id: &str) -> Result<(), DashboardError> {
    uuid::Uuid::parse_str(envelope_id)
        .map(|_| ())
        .map_err(|_| DashboardError::BadRequest(format!("Invalid envelope id: {}", envelope_id)))
}

impl DocuSignClient {
    /// Build a client when the integration key, user id and key path are
    /// configured. Fails if the key file cannot be read or parsed.
    pub fn from_config(config: &DocuSignSection) -> anyhow::Result<Option<Self>> {
        let (Some(integration_key), Some(user_id), Some(key_path)) = (
            config.integration_key.clone(),
            config.user_id.clone(),
            config.private_key_path.as_deref(),
        ) else {
            return Ok(None);
        };
        let private_key = load_private_key(key_path)?;
        let (auth_base, audience) = auth_endpoints(&config.auth_server);
        Ok(Some(Self {
            http: reqwest::Client::new(),
            integration_key,
            user_id,
            private_key,
            auth_base,
            audience,
            consent_redirect_uri: config.consent_redirect_uri.clone(),
        }))
    }

    pub fn claims(&self, now: DateTime<Utc>) -> JwtClaims {
        JwtClaims {
            iss: self.integration_key.clone(),
            sub: self.user_id.clone(),
            aud: self.audience.clone(),
            iat: now.timestamp(),
            exp: now.timestamp() + JWT_LIFETIME_SECS,
            scope: JWT_SCOPE.to_string(),
        }
    }

    pub fn assertion(&self, now: DateTime<Utc>) -> Result<String, DashboardError> {
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::RS256),
            &self.claims(now),
            &self.private_key,
        )
        .context("Failed to sign DocuSign JWT assertion")?;
        Ok(token)
    }

    /// URL where the impersonated user grants consent to the integration.
    pub fn consent_url(&self) -> String {
        let redirect = self
            .consent_redirect_uri
            .as_deref()
            .unwrap_or("https://www.docusign.com");
        let base = format!("{}/oauth/auth", self.auth_base);
        reqwest::Url::parse_with_params(
            &base,
            &[
                ("response_type", "code"),
                ("scope", JWT_SCOPE),
                ("client_id", self.integration_key.as_str()),
                ("redirect_uri", redirect),
            ],
        )
        .map(|u| u.to_string())
        .unwrap_or(base)
    }

    fn consent_required(&self) -> DashboardError {
        DashboardError::ReauthRequired {
            provider: Provider::DocuSign,
            authorize_url: self.consent_url(),
        }
    }

    async fn request_token(&self) -> Result<TokenResponse, DashboardError> {
        let assertion = self.assertion(Utc::now())?;
        let resp = self
            .http
            .post(format!("{}/oauth/token", self.auth_base))
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .map_err(|e| DashboardError::upstream(SERVICE, e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            return match resp.json::<ErrorResponse>().await {
                Ok(err) if err.error == "consent_required" => Err(self.consent_required()),
                Ok(err) => Err(DashboardError::upstream(
                    SERVICE,
                    format!("{}: {}", err.error, err.error_description.unwrap_or_default()),
                )),
                Err(_) => Err(DashboardError::upstream(SERVICE, format!("HTTP {}", status))),
            };
        }

        resp.json::<TokenResponse>()
            .await
            .map_err(|e| DashboardError::upstream(SERVICE, format!("Invalid token response: {}", e)))
    }

    /// Resolve the REST base for the user's default account.
    async fn account_base(&self, access_token: &str) -> Result<String, DashboardError> {
        let info: UserInfo = self
            .http
            .get(format!("{}/oauth/userinfo", self.auth_base))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| DashboardError::upstream(SERVICE, e))?
            .error_for_status()
            .map_err(|e| DashboardError::upstream(SERVICE, e))?
            .json()
            .await
            .map_err(|e| DashboardError::upstream(SERVICE, format!("Invalid userinfo response: {}", e)))?;
        default_account_base(&info)
            .ok_or_else(|| DashboardError::upstream(SERVICE, "User has no DocuSign account"))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        token: &OAuthToken,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, RestError> {
        let base = token.instance_url.as_deref().ok_or_else(|| {
            RestError::Failed(DashboardError::upstream(SERVICE, "Token has no account base URI"))
        })?;
        let resp = self
            .http
            .get(format!("{}{}", base, path))
            .bearer_auth(&token.access_token)
            .query(params)
            .send()
            .await
            .map_err(|e| RestError::Failed(DashboardError::upstream(SERVICE, e)))?;
        if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(RestError::Unauthorized);
        }
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(RestError::Failed(DashboardError::upstream(
                SERVICE,
                format!("HTTP {}: {}", status, body),
            )));
        }
        resp.json::<T>().await.map_err(|e| {
            RestError::Failed(DashboardError::upstream(
                SERVICE,
                format!("Invalid response: {}", e),
            ))
        })
    }

    /// GET `path` under the account base. A rejected token is dropped and
    /// the call is retried once with a new grant.
    async fn get_authorized<T: serde::de::DeserializeOwned>(
        &self,
        db: &DbHandle,
        tokens: &TokenManager,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, DashboardError> {
        let token = tokens.access_token(db, self).await?;
        match self.get_json(&token, path, params).await {
            Err(RestError::Unauthorized) => {
                tracing::warn!("DocuSign rejected the access token, requesting a new grant");
                let token = tokens.force_refresh(db, self).await?;
                Ok(self.get_json(&token, path, params).await?)
            }
            result => Ok(result?),
        }
    }

    pub async fn list_envelopes(
        &self,
        db: &DbHandle,
        tokens: &TokenManager,
        query: &EnvelopeQuery,
    ) -> Result<Vec<Envelope>, DashboardError> {
        let list: EnvelopeList = self
            .get_authorized(db, tokens, "/envelopes", &query.params(Utc::now()))
            .await?;
        Ok(list.envelopes)
    }

    pub async fn get_envelope(
        &self,
        db: &DbHandle,
        tokens: &TokenManager,
        envelope_id: &str,
    ) -> Result<Envelope, DashboardError> {
        validate_envelope_id(envelope_id)?;
        self.get_authorized(
            db,
            tokens,
            &format!("/envelopes/{}", envelope_id),
            &[("include", "recipients".to_string())],
        )
        .await
    }
}

#[async_trait]
impl TokenSource for DocuSignClient {
    async fn refresh(&self, _refresh_token: Option<&str>) -> Result<TokenGrant, DashboardError> {
        let response = self.request_token().await?;
        let instance_url = self.account_base(&response.access_token).await?;
        Ok(TokenGrant {
            access_token: response.access_token,
            refresh_token: None,
            instance_url: Some(instance_url),
            expires_at: Utc::now()
                + Duration::seconds(response.expires_in.unwrap_or(JWT_LIFETIME_SECS)),
        })
    }
}

fn load_private_key(path: &Path) -> anyhow::Result<EncodingKey> {
    let pem = std::fs::read(path)
        .with_context(|| format!("Failed to read DocuSign private key {}", path.display()))?;
    EncodingKey::from_rsa_pem(&pem)
        .with_context(|| format!("Invalid RSA private key in {}", path.display()))
}

fn default_account_base(info: &UserInfo) -> Option<String> {
    let account = info
        .accounts
        .iter()
        .find(|a| a.is_default)
        .or_else(|| info.accounts.first())?;
    Some(format!(
        "{}/restapi/v2.1/accounts/{}",
        account.base_uri.trim_end_matches('/'),
        account.account_id
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{DecodingKey, Validation};
    use std::path::PathBuf;

    fn fixture(name: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests/fixtures")
            .join(name)
    }

    fn client() -> DocuSignClient {
        let config = DocuSignSection {
            integration_key: Some("ik-123".into()),
            user_id: Some("user-456".into()),
            private_key_path: Some(fixture("docusign_test_key.pem")),
            ..Default::default()
        };
        DocuSignClient::from_config(&config).unwrap().unwrap()
    }

    #[test]
    fn not_configured_without_all_fields() {
        let config = DocuSignSection {
            integration_key: Some("ik".into()),
            ..Default::default()
        };
        assert!(DocuSignClient::from_config(&config).unwrap().is_none());
    }

    #[test]
    fn unreadable_key_is_an_error() {
        let config = DocuSignSection {
            integration_key: Some("ik".into()),
            user_id: Some("user".into()),
            private_key_path: Some(PathBuf::from("/nonexistent/key.pem")),
            ..Default::default()
        };
        assert!(DocuSignClient::from_config(&config).is_err());
    }

    #[test]
    fn assertion_is_rs256_with_expected_claims() {
        let client = client();
        let now = Utc::now();
        let jwt = client.assertion(now).unwrap();

        let header = jsonwebtoken::decode_header(&jwt).unwrap();
        assert_eq!(header.alg, Algorithm::RS256);

        let public = std::fs::read(fixture("docusign_test_key.pub.pem")).unwrap();
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&["account-d.docusign.com"]);
        validation.set_issuer(&["ik-123"]);
        let decoded = jsonwebtoken::decode::<JwtClaims>(
            &jwt,
            &DecodingKey::from_rsa_pem(&public).unwrap(),
            &validation,
        )
        .unwrap();

        assert_eq!(decoded.claims, client.claims(now));
        assert_eq!(decoded.claims.sub, "user-456");
        assert_eq!(decoded.claims.scope, "signature impersonation");
        assert_eq!(decoded.claims.exp - decoded.claims.iat, 3600);
    }

    #[test]
    fn consent_url_points_at_auth_server() {
        let url = client().consent_url();
        assert!(url.starts_with("https://account-d.docusign.com/oauth/auth?"));
        assert!(url.contains("client_id=ik-123"));
        assert!(url.contains("scope=signature+impersonation"));
    }

    #[test]
    fn default_account_is_preferred() {
        let info: UserInfo = serde_json::from_str(
            r#"{"sub": "user-456", "accounts": [
                {"account_id": "a1", "is_default": false, "base_uri": "https://demo.docusign.net"},
                {"account_id": "a2", "is_default": true, "base_uri": "https://na2.docusign.net/"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(
            default_account_base(&info).as_deref(),
            Some("https://na2.docusign.net/restapi/v2.1/accounts/a2")
        );
        assert!(default_account_base(&UserInfo { accounts: vec![] }).is_none());
    }

    #[test]
    fn envelope_query_defaults_to_last_thirty_days() {
        let now = DateTime::parse_from_rfc3339("2025-03-31T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let params = EnvelopeQuery::default().params(now);
        assert_eq!(params, vec![("from_date", "2025-03-01".to_string())]);

        let explicit = EnvelopeQuery {
            from_date: Some("2025-01-01".into()),
            status: Some("completed".into()),
        }
        .params(now);
        assert_eq!(explicit[0].1, "2025-01-01");
        assert_eq!(explicit[1], ("status", "completed".to_string()));
    }

    #[test]
    fn envelope_with_recipients_deserializes() {
        let envelope: Envelope = serde_json::from_str(
            r#"{
                "envelopeId": "env-1",
                "status": "sent",
                "emailSubject": "Please sign: Acme MSA",
                "sentDateTime": "2025-02-20T10:00:00Z",
                "recipients": {
                    "signers": [
                        {"recipientId": "1", "name": "Ana", "email": "ana@acme.com", "status": "completed"}
                    ]
                }
            }"#,
        )
        .unwrap();
        let recipients = envelope.recipients.unwrap();
        assert_eq!(recipients.signers.len(), 1);
        assert_eq!(recipients.signers[0].status.as_deref(), Some("completed"));
        assert!(recipients.carbon_copies.is_empty());
    }

    #[test]
    fn auth_server_accepts_host_or_base_url() {
        assert_eq!(
            auth_endpoints("account-d.docusign.com"),
            (
                "https://account-d.docusign.com".to_string(),
                "account-d.docusign.com".to_string()
            )
        );
        assert_eq!(
            auth_endpoints("http://127.0.0.1:8080/"),
            ("http://127.0.0.1:8080".to_string(), "127.0.0.1:8080".to_string())
        );
    }

    mod against_mock_server {
        use super::*;
        use crate::dashboard::db::DashboardDb;
        use wiremock::{Mock, MockServer, ResponseTemplate, matchers};

        fn client_for(server: &MockServer) -> DocuSignClient {
            let config = DocuSignSection {
                integration_key: Some("ik-123".into()),
                user_id: Some("user-456".into()),
                private_key_path: Some(fixture("docusign_test_key.pem")),
                auth_server: server.uri(),
                ..Default::default()
            };
            DocuSignClient::from_config(&config).unwrap().unwrap()
        }

        fn handle() -> DbHandle {
            DbHandle::new(DashboardDb::new_in_memory().unwrap())
        }

        #[tokio::test]
        async fn consent_required_becomes_reauth_with_consent_url() {
            let server = MockServer::start().await;
            Mock::given(matchers::method("POST"))
                .and(matchers::path("/oauth/token"))
                .respond_with(
                    ResponseTemplate::new(400)
                        .set_body_json(serde_json::json!({"error": "consent_required"})),
                )
                .expect(1)
                .mount(&server)
                .await;

            let client = client_for(&server);
            let tokens = TokenManager::new(Provider::DocuSign);
            let err = client
                .list_envelopes(&handle(), &tokens, &EnvelopeQuery::default())
                .await
                .unwrap_err();
            match err {
                DashboardError::ReauthRequired {
                    provider,
                    authorize_url,
                } => {
                    assert_eq!(provider, Provider::DocuSign);
                    assert!(authorize_url.starts_with(&format!("{}/oauth/auth?", server.uri())));
                    assert!(authorize_url.contains("client_id=ik-123"));
                }
                other => panic!("Expected ReauthRequired, got {:?}", other),
            }
        }

        #[tokio::test]
        async fn rejected_token_is_replaced_and_request_retried_once() {
            let server = MockServer::start().await;
            let account_base = format!("{}/restapi/v2.1/accounts/acc-1", server.uri());
            let db = handle();
            db.lock_sync()
                .unwrap()
                .upsert_token(&OAuthToken {
                    provider: Provider::DocuSign,
                    access_token: "stale".into(),
                    refresh_token: None,
                    instance_url: Some(account_base.clone()),
                    expires_at: Some(Utc::now() + Duration::hours(1)),
                })
                .unwrap();

            Mock::given(matchers::method("GET"))
                .and(matchers::path("/restapi/v2.1/accounts/acc-1/envelopes"))
                .and(matchers::header("authorization", "Bearer stale"))
                .respond_with(ResponseTemplate::new(401))
                .expect(1)
                .mount(&server)
                .await;
            Mock::given(matchers::method("POST"))
                .and(matchers::path("/oauth/token"))
                .and(matchers::body_string_contains("jwt-bearer"))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "access_token": "fresh",
                    "expires_in": 3600
                })))
                .expect(1)
                .mount(&server)
                .await;
            Mock::given(matchers::method("GET"))
                .and(matchers::path("/oauth/userinfo"))
                .and(matchers::header("authorization", "Bearer fresh"))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "accounts": [
                        {"account_id": "acc-1", "is_default": true, "base_uri": server.uri()}
                    ]
                })))
                .expect(1)
                .mount(&server)
                .await;
            Mock::given(matchers::method("GET"))
                .and(matchers::path("/restapi/v2.1/accounts/acc-1/envelopes"))
                .and(matchers::header("authorization", "Bearer fresh"))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "envelopes": [{"envelopeId": "env-1", "status": "sent"}]
                })))
                .expect(1)
                .mount(&server)
                .await;

            let client = client_for(&server);
            let tokens = TokenManager::new(Provider::DocuSign);
            let envelopes = client
                .list_envelopes(&db, &tokens, &EnvelopeQuery::default())
                .await
                .unwrap();
            assert_eq!(envelopes.len(), 1);
            assert_eq!(envelopes[0].envelope_id, "env-1");

            let stored = db
                .lock_sync()
                .unwrap()
                .get_token(Provider::DocuSign)
                .unwrap()
                .unwrap();
            assert_eq!(stored.access_token, "fresh");
            assert_eq!(stored.instance_url.as_deref(), Some(account_base.as_str()));
        }

        #[tokio::test]
        async fn envelope_id_must_be_a_guid() {
            let server = MockServer::start().await;
            let client = client_for(&server);
            let tokens = TokenManager::new(Provider::DocuSign);
            let err = client
                .get_envelope(&handle(), &tokens, "../../users")
                .await
                .unwrap_err();
            assert!(matches!(err, DashboardError::BadRequest(_)));
            assert!(server.received_requests().await.unwrap().is_empty());
        }
    }
}
