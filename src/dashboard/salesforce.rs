//! Salesforce CRM adapter: OAuth web-server flow with PKCE, token refresh,
//! and the opportunity query that feeds the contract list.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::Deserialize;

use super::db::DbHandle;
use super::models::{CrmContract, OAuthToken, Provider};
use super::oauth::{TokenGrant, TokenManager, TokenSource};
use super::stage_map::map_salesforce_stage;
use crate::config::SalesforceSection;
use crate::errors::DashboardError;

pub const AUTHORIZE_ROUTE: &str = "/api/salesforce/authorize";

const SERVICE: &str = "Salesforce";

/// Opportunities that back the contract list. The two date fields are
/// custom fields on the opportunity object.
pub const OPPORTUNITY_SOQL: &str = "SELECT Id, Name, Amount, StageName, CloseDate, \
     Award_Date__c, Contract_Date__c FROM Opportunity ORDER BY CloseDate ASC";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    instance_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OAuthErrorResponse {
    error: String,
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    records: Vec<OpportunityRecord>,
    #[serde(default)]
    next_records_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct OpportunityRecord {
    id: String,
    name: String,
    #[serde(default)]
    amount: Option<f64>,
    #[serde(default)]
    stage_name: Option<String>,
    #[serde(default)]
    close_date: Option<NaiveDate>,
    #[serde(rename = "Award_Date__c", default)]
    award_date: Option<NaiveDate>,
    #[serde(rename = "Contract_Date__c", default)]
    contract_date: Option<NaiveDate>,
}

impl OpportunityRecord {
    fn into_contract(self) -> CrmContract {
        let sales_stage = self.stage_name.unwrap_or_default();
        CrmContract {
            status: map_salesforce_stage(&sales_stage),
            id: self.id,
            name: self.name,
            value: self.amount.unwrap_or(0.0),
            sales_stage,
            close_date: self.close_date,
            award_date: self.award_date,
            contract_date: self.contract_date,
        }
    }
}

/// Outcome of a single query attempt.
#[derive(Debug)]
enum QueryError {
    /// Salesforce answered 401; the access token is no longer valid.
    SessionExpired,
    Failed(DashboardError),
}

impl From<QueryError> for DashboardError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::SessionExpired => reauth_required(),
            QueryError::Failed(e) => e,
        }
    }
}

fn reauth_required() -> DashboardError {
    DashboardError::ReauthRequired {
        provider: Provider::Salesforce,
        authorize_url: AUTHORIZE_ROUTE.to_string(),
    }
}

pub struct SalesforceClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: Option<String>,
    login_url: String,
    redirect_uri: String,
    api_version: String,
    token_lifetime_secs: i64,
}

impl SalesforceClient {
    /// Build a client when the client id and redirect URI are configured.
    pub fn from_config(config: &SalesforceSection) -> Option<Self> {
        Some(Self {
            http: reqwest::Client::new(),
            client_id: config.client_id.clone()?,
            client_secret: config.client_secret.clone(),
            login_url: config.login_url.trim_end_matches('/').to_string(),
            redirect_uri: config.redirect_uri.clone()?,
            api_version: config.api_version.clone(),
            token_lifetime_secs: config.token_lifetime_secs,
        })
    }

    /// The login-server URL the browser is redirected to.
    pub fn authorize_url(&self, state: &str, code_challenge: &str) -> Result<String, DashboardError> {
        let url = reqwest::Url::parse_with_params(
            &format!("{}/services/oauth2/authorize", self.login_url),
            &[
                ("response_type", "code"),
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("state", state),
                ("code_challenge", code_challenge),
                ("code_challenge_method", "S256"),
            ],
        )
        .context("Invalid Salesforce login URL")?;
        Ok(url.to_string())
    }

    fn token_url(&self) -> String {
        format!("{}/services/oauth2/token", self.login_url)
    }

    fn grant_from(&self, response: TokenResponse) -> TokenGrant {
        TokenGrant {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            instance_url: response.instance_url,
            expires_at: Utc::now() + chrono::Duration::seconds(self.token_lifetime_secs),
        }
    }

    async fn post_token<'a>(
        &'a self,
        mut form: Vec<(&'a str, &'a str)>,
    ) -> Result<TokenResponse, DashboardError> {
        if let Some(secret) = self.client_secret.as_deref() {
            form.push(("client_secret", secret));
        }
        let resp = self
            .http
            .post(self.token_url())
            .header("Accept", "application/json")
            .form(&form)
            .send()
            .await
            .map_err(|e| DashboardError::upstream(SERVICE, e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let message = match resp.json::<OAuthErrorResponse>().await {
                Ok(err) => format!(
                    "{}: {}",
                    err.error,
                    err.error_description.unwrap_or_default()
                ),
                Err(_) => format!("HTTP {}", status),
            };
            return Err(DashboardError::upstream(SERVICE, message));
        }

        resp.json::<TokenResponse>()
            .await
            .map_err(|e| DashboardError::upstream(SERVICE, format!("Invalid token response: {}", e)))
    }

    /// Exchange an authorization code (plus the PKCE verifier) for tokens.
    pub async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<TokenGrant, DashboardError> {
        let response = self
            .post_token(vec![
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("code_verifier", code_verifier),
            ])
            .await?;
        Ok(self.grant_from(response))
    }

    async fn query_page(
        &self,
        token: &OAuthToken,
        url: &str,
        soql: Option<&str>,
    ) -> Result<QueryResponse, QueryError> {
        let mut request = self.http.get(url).bearer_auth(&token.access_token);
        if let Some(soql) = soql {
            request = request.query(&[("q", soql)]);
        }
        let resp = request
            .send()
            .await
            .map_err(|e| QueryError::Failed(DashboardError::upstream(SERVICE, e)))?;

        if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(QueryError::SessionExpired);
        }
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(QueryError::Failed(DashboardError::upstream(
                SERVICE,
                format!("HTTP {}: {}", status, body),
            )));
        }
        resp.json::<QueryResponse>().await.map_err(|e| {
            QueryError::Failed(DashboardError::upstream(
                SERVICE,
                format!("Invalid query response: {}", e),
            ))
        })
    }

    /// Run the opportunity query, following `nextRecordsUrl` until done.
    async fn query_contracts(&self, token: &OAuthToken) -> Result<Vec<CrmContract>, QueryError> {
        let instance = token
            .instance_url
            .as_deref()
            .map(|u| u.trim_end_matches('/').to_string())
            .ok_or_else(|| {
                QueryError::Failed(DashboardError::upstream(SERVICE, "Token has no instance URL"))
            })?;

        let mut url = format!("{}/services/data/{}/query", instance, self.api_version);
        let mut soql = Some(OPPORTUNITY_SOQL);
        let mut contracts = Vec::new();
        loop {
            // Continuation URLs already encode the query cursor.
            let page = self.query_page(token, &url, soql.take()).await?;
            contracts.extend(page.records.into_iter().map(OpportunityRecord::into_contract));
            match page.next_records_url {
                Some(next) => url = format!("{}{}", instance, next),
                None => break,
            }
        }
        Ok(contracts)
    }

    /// Fetch all opportunities as CRM contracts. A rejected session is
    /// retried once with a newly refreshed token.
    pub async fn fetch_contracts(
        &self,
        db: &DbHandle,
        tokens: &TokenManager,
    ) -> Result<Vec<CrmContract>, DashboardError> {
        let token = tokens.access_token(db, self).await?;
        match self.query_contracts(&token).await {
            Err(QueryError::SessionExpired) => {
                tracing::warn!("Salesforce rejected the access token, refreshing and retrying");
                let token = tokens.force_refresh(db, self).await?;
                let contracts = self.query_contracts(&token).await?;
                Ok(contracts)
            }
            result => {
                let contracts = result?;
                tracing::debug!(count = contracts.len(), "Fetched Salesforce opportunities");
                Ok(contracts)
            }
        }
    }
}

#[async_trait]
impl TokenSource for SalesforceClient {
    async fn refresh(&self, refresh_token: Option<&str>) -> Result<TokenGrant, DashboardError> {
        let refresh_token = refresh_token.ok_or_else(reauth_required)?;
        match self
            .post_token(vec![
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", self.client_id.as_str()),
            ])
            .await
        {
            Ok(response) => Ok(self.grant_from(response)),
            Err(e) => {
                tracing::warn!(error = %e, "Salesforce refresh token rejected");
                Err(reauth_required())
            }
        }
    }
}
