use crate::error::{ApiError, AuthError};
use crate::http::{decode_json, send_authorized, token_request};
use crate::oauth::{OAuthManager, TokenExchange};
use crate::token_store::Credential;
use reqwest::{Client, Url};
use serde::Deserialize;
use std::sync::Arc;
use stet_core::clock::format_date;
use time::format_description::well_known::Rfc3339;
use time::{Date, OffsetDateTime};
use tracing::debug;

pub const AUTH_URL: &str = "https://cloud.ouraring.com/oauth/authorize";
pub const TOKEN_URL: &str = "https://api.ouraring.com/oauth/token";
pub const API_BASE: &str = "https://api.ouraring.com/v2";
const SCOPES: &str = "daily heartrate";

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct Contributors {
    #[serde(default)]
    pub activity_balance: Option<i64>,
    #[serde(default)]
    pub body_temperature: Option<i64>,
    #[serde(default)]
    pub hrv_balance: Option<i64>,
    #[serde(default)]
    pub previous_day_activity: Option<i64>,
    #[serde(default)]
    pub previous_night: Option<i64>,
    #[serde(default)]
    pub recovery_index: Option<i64>,
    #[serde(default)]
    pub resting_heart_rate: Option<i64>,
    #[serde(default)]
    pub sleep_balance: Option<i64>,
}

impl Contributors {
    /// Display label and score, in the order the page lists them.
    pub fn entries(&self) -> [(&'static str, Option<i64>); 8] {
        [
            ("Activity Balance", self.activity_balance),
            ("Body Temperature", self.body_temperature),
            ("HRV Balance", self.hrv_balance),
            ("Previous Day Activity", self.previous_day_activity),
            ("Previous Night", self.previous_night),
            ("Recovery Index", self.recovery_index),
            ("Resting Heart Rate", self.resting_heart_rate),
            ("Sleep Balance", self.sleep_balance),
        ]
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct DailyReadiness {
    pub id: String,
    pub day: String,
    #[serde(default)]
    pub score: Option<i64>,
    #[serde(default)]
    pub temperature_deviation: Option<f64>,
    #[serde(default)]
    pub temperature_trend_deviation: Option<f64>,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub contributors: Contributors,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct HeartRatePoint {
    pub bpm: u32,
    #[serde(default)]
    pub source: String,
    pub timestamp: String,
}

#[derive(Deserialize)]
struct Collection<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
    expires_in: i64,
}

impl TokenResponse {
    fn into_credential(self, previous_refresh: Option<&str>) -> Credential {
        Credential {
            access_token: self.access_token,
            refresh_token: self
                .refresh_token
                .or_else(|| previous_refresh.map(str::to_string))
                .unwrap_or_default(),
            token_type: self.token_type.unwrap_or_else(|| "Bearer".to_string()),
            expires_at: OffsetDateTime::now_utc() + time::Duration::seconds(self.expires_in),
        }
    }
}

/// Standard authorization-code grant against the Oura token endpoint.
#[derive(Clone, Debug)]
pub struct OuraExchange {
    client_id: Option<String>,
    client_secret: Option<String>,
    auth_url: String,
    token_url: String,
}

impl OuraExchange {
    pub fn new(client_id: Option<String>, client_secret: Option<String>) -> Self {
        Self {
            client_id,
            client_secret,
            auth_url: AUTH_URL.to_string(),
            token_url: TOKEN_URL.to_string(),
        }
    }

    pub fn with_endpoints(
        mut self,
        auth_url: impl Into<String>,
        token_url: impl Into<String>,
    ) -> Self {
        self.auth_url = auth_url.into();
        self.token_url = token_url.into();
        self
    }

    fn client_pair(&self) -> Result<(&str, &str), AuthError> {
        match (self.client_id.as_deref(), self.client_secret.as_deref()) {
            (Some(id), Some(secret)) => Ok((id, secret)),
            _ => Err(AuthError::MissingCredentials("OURA_CLIENT_ID / OURA_CLIENT_SECRET")),
        }
    }
}

impl TokenExchange for OuraExchange {
    fn service(&self) -> &'static str {
        "Oura"
    }

    fn has_credentials(&self) -> bool {
        self.client_pair().is_ok()
    }

    fn authorize_url(&self, redirect_uri: &str, state: &str) -> Option<String> {
        let client_id = self.client_id.as_deref()?;
        Url::parse_with_params(
            &self.auth_url,
            &[
                ("client_id", client_id),
                ("redirect_uri", redirect_uri),
                ("response_type", "code"),
                ("scope", SCOPES),
                ("state", state),
            ],
        )
        .ok()
        .map(String::from)
    }

    async fn exchange_code(
        &self,
        http: &Client,
        code: &str,
        redirect_uri: &str,
    ) -> Result<Credential, AuthError> {
        let (client_id, client_secret) = self.client_pair()?;
        let request = http.post(&self.token_url).form(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("redirect_uri", redirect_uri),
        ]);
        let response: TokenResponse = token_request(request).await?;
        Ok(response.into_credential(None))
    }

    async fn refresh(&self, http: &Client, refresh_token: &str) -> Result<Credential, AuthError> {
        let (client_id, client_secret) = self.client_pair()?;
        let request = http.post(&self.token_url).form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", client_id),
            ("client_secret", client_secret),
        ]);
        let response: TokenResponse = token_request(request).await?;
        Ok(response.into_credential(Some(refresh_token)))
    }
}

/// Read-only client for readiness and heart-rate data.
#[derive(Clone)]
pub struct OuraClient {
    auth: Arc<OAuthManager<OuraExchange>>,
    base_url: String,
}

impl OuraClient {
    pub fn new(auth: OAuthManager<OuraExchange>) -> Self {
        Self {
            auth: Arc::new(auth),
            base_url: API_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn auth(&self) -> &Arc<OAuthManager<OuraExchange>> {
        &self.auth
    }

    /// Latest readiness record for `day`; `None` until Oura has scored it.
    pub async fn readiness(&self, day: Date) -> Result<Option<DailyReadiness>, ApiError> {
        let day = format_date(day);
        let url = self.endpoint(
            "/usercollection/daily_readiness",
            &[("start_date", &day), ("end_date", &day)],
        )?;
        let response = send_authorized(&self.auth, |http, bearer| {
            http.get(url.clone()).header("authorization", bearer)
        })
        .await?;
        let mut collection: Collection<DailyReadiness> = decode_json(response).await?;
        debug!(day = %day, records = collection.data.len(), "Fetched Oura readiness");
        Ok(collection.data.pop())
    }

    /// Heart-rate samples between `from` and `to`, oldest first as delivered.
    pub async fn heart_rate(
        &self,
        from: OffsetDateTime,
        to: OffsetDateTime,
    ) -> Result<Vec<HeartRatePoint>, ApiError> {
        let from = from
            .format(&Rfc3339)
            .map_err(|err| ApiError::Decode(err.to_string()))?;
        let to = to
            .format(&Rfc3339)
            .map_err(|err| ApiError::Decode(err.to_string()))?;
        let url = self.endpoint(
            "/usercollection/heartrate",
            &[("start_datetime", &from), ("end_datetime", &to)],
        )?;
        let response = send_authorized(&self.auth, |http, bearer| {
            http.get(url.clone()).header("authorization", bearer)
        })
        .await?;
        let collection: Collection<HeartRatePoint> = decode_json(response).await?;
        debug!(samples = collection.data.len(), "Fetched Oura heart rate");
        Ok(collection.data)
    }

    fn endpoint(&self, path: &str, params: &[(&str, &String)]) -> Result<Url, ApiError> {
        Url::parse_with_params(&format!("{}{path}", self.base_url), params)
            .map_err(|err| ApiError::Transport(format!("invalid Oura URL: {err}")))
    }
}
