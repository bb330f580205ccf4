use crate::error::{ApiError, AuthError};
use crate::http::{decode_json, send_authorized, token_request};
use crate::oauth::{OAuthManager, TokenExchange};
use crate::token_store::Credential;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::json;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;
use stet_core::clock::parse_date;
use time::format_description::well_known::Rfc3339;
use time::{Date, OffsetDateTime};
use tracing::{debug, info};

pub const AUTH_URL: &str = "https://public.planta-api.com/v1/auth/authorize";
pub const REFRESH_URL: &str = "https://public.planta-api.com/v1/auth/refreshToken";
pub const API_BASE: &str = "https://public.planta-api.com/v1";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ActionType {
    Watering,
    Fertilizing,
    Misting,
    Cleaning,
    Repotting,
    ProgressUpdate,
}

impl ActionType {
    pub fn api_name(self) -> &'static str {
        match self {
            ActionType::Watering => "watering",
            ActionType::Fertilizing => "fertilizing",
            ActionType::Misting => "misting",
            ActionType::Cleaning => "cleaning",
            ActionType::Repotting => "repotting",
            ActionType::ProgressUpdate => "progressUpdate",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ActionType::Watering => "Watering",
            ActionType::Fertilizing => "Fertilizing",
            ActionType::Misting => "Misting",
            ActionType::Cleaning => "Cleaning",
            ActionType::Repotting => "Repotting",
            ActionType::ProgressUpdate => "Progress update",
        }
    }

    /// Repotting and progress updates need the phone app.
    pub fn completable(self) -> bool {
        matches!(
            self,
            ActionType::Watering
                | ActionType::Fertilizing
                | ActionType::Misting
                | ActionType::Cleaning
        )
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.api_name())
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ActionDate {
    #[serde(default)]
    pub date: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ActionSchedule {
    #[serde(default)]
    pub next: Option<ActionDate>,
    #[serde(default)]
    pub completed: Option<ActionDate>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlantNames {
    #[serde(default)]
    pub localized_name: String,
    #[serde(default)]
    pub variety: Option<String>,
    #[serde(default)]
    pub custom: Option<String>,
    #[serde(default)]
    pub scientific: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlantActions {
    #[serde(default)]
    pub watering: Option<ActionSchedule>,
    #[serde(default)]
    pub fertilizing: Option<ActionSchedule>,
    #[serde(default)]
    pub misting: Option<ActionSchedule>,
    #[serde(default)]
    pub cleaning: Option<ActionSchedule>,
    #[serde(default)]
    pub repotting: Option<ActionSchedule>,
    #[serde(default)]
    pub progress_update: Option<ActionSchedule>,
}

impl PlantActions {
    fn schedules(&self) -> [(ActionType, Option<&ActionSchedule>); 6] {
        [
            (ActionType::Watering, self.watering.as_ref()),
            (ActionType::Fertilizing, self.fertilizing.as_ref()),
            (ActionType::Misting, self.misting.as_ref()),
            (ActionType::Cleaning, self.cleaning.as_ref()),
            (ActionType::Repotting, self.repotting.as_ref()),
            (ActionType::ProgressUpdate, self.progress_update.as_ref()),
        ]
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Plant {
    pub id: String,
    #[serde(default)]
    pub names: PlantNames,
    #[serde(default)]
    pub actions: PlantActions,
}

impl Plant {
    /// The user's nickname when set, otherwise the localized species name.
    pub fn display_name(&self) -> &str {
        match self.names.custom.as_deref() {
            Some(custom) if !custom.is_empty() => custom,
            _ => &self.names.localized_name,
        }
    }
}

/// One due or upcoming care action, flattened for display.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlantTask {
    pub plant_id: String,
    pub plant_name: String,
    pub action: ActionType,
    pub due: Date,
    pub overdue: bool,
    pub today: bool,
}

impl PlantTask {
    pub fn completable(&self) -> bool {
        self.action.completable()
    }
}

#[derive(Deserialize)]
struct PlantsPage {
    #[serde(default)]
    data: Vec<Plant>,
    #[serde(default)]
    pagination: Pagination,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Pagination {
    #[serde(default)]
    next_page: Option<String>,
}

#[derive(Deserialize)]
struct AuthEnvelope {
    data: AuthData,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthData {
    access_token: String,
    #[serde(default)]
    refresh_token: String,
    #[serde(default)]
    token_type: String,
    #[serde(default)]
    expires_at: String,
}

impl AuthData {
    fn into_credential(self) -> Credential {
        let expires_at = OffsetDateTime::parse(&self.expires_at, &Rfc3339)
            .unwrap_or_else(|_| OffsetDateTime::now_utc() + time::Duration::hours(1));
        Credential {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            token_type: if self.token_type.is_empty() {
                "Bearer".to_string()
            } else {
                self.token_type
            },
            expires_at,
        }
    }
}

/// Planta issues tokens for an app code copied from the phone app; there is
/// no browser step.
#[derive(Clone, Debug)]
pub struct PlantaExchange {
    app_code: Option<String>,
    auth_url: String,
    refresh_url: String,
}

impl PlantaExchange {
    pub fn new(app_code: Option<String>) -> Self {
        Self {
            app_code,
            auth_url: AUTH_URL.to_string(),
            refresh_url: REFRESH_URL.to_string(),
        }
    }

    pub fn with_endpoints(
        mut self,
        auth_url: impl Into<String>,
        refresh_url: impl Into<String>,
    ) -> Self {
        self.auth_url = auth_url.into();
        self.refresh_url = refresh_url.into();
        self
    }

    pub fn app_code(&self) -> Option<&str> {
        self.app_code.as_deref()
    }
}

impl TokenExchange for PlantaExchange {
    fn service(&self) -> &'static str {
        "Planta"
    }

    fn has_credentials(&self) -> bool {
        self.app_code.is_some()
    }

    fn authorize_url(&self, _redirect_uri: &str, _state: &str) -> Option<String> {
        None
    }

    async fn exchange_code(
        &self,
        http: &Client,
        code: &str,
        _redirect_uri: &str,
    ) -> Result<Credential, AuthError> {
        let request = http.post(&self.auth_url).json(&json!({ "code": code }));
        let envelope: AuthEnvelope = token_request(request).await?;
        Ok(envelope.data.into_credential())
    }

    async fn refresh(&self, http: &Client, refresh_token: &str) -> Result<Credential, AuthError> {
        let request = http
            .post(&self.refresh_url)
            .json(&json!({ "refreshToken": refresh_token }));
        let envelope: AuthEnvelope = token_request(request).await?;
        Ok(envelope.data.into_credential())
    }
}

#[derive(Clone)]
pub struct PlantaClient {
    auth: Arc<OAuthManager<PlantaExchange>>,
    app_code: Option<String>,
    base_url: String,
}

impl PlantaClient {
    pub fn new(auth: OAuthManager<PlantaExchange>, app_code: Option<String>) -> Self {
        Self {
            auth: Arc::new(auth),
            app_code,
            base_url: API_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn auth(&self) -> &Arc<OAuthManager<PlantaExchange>> {
        &self.auth
    }

    pub fn has_app_code(&self) -> bool {
        self.app_code.is_some()
    }

    /// Exchanges the app code when there is no usable token.
    pub async fn ensure_authenticated(&self) -> Result<(), ApiError> {
        if self.auth.get_valid_token().await?.is_some() {
            return Ok(());
        }
        let code = self
            .app_code
            .as_deref()
            .ok_or(AuthError::MissingCredentials("PLANTA_APP_CODE"))?;
        self.auth.exchange_code(code).await?;
        info!("Planta app code exchanged for token");
        Ok(())
    }

    /// Every added plant, following the pagination cursor to the end.
    pub async fn all_plants(&self) -> Result<Vec<Plant>, ApiError> {
        let mut plants = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut url = self.endpoint("/addedPlants")?;
            if let Some(cursor) = cursor.as_deref() {
                url.query_pairs_mut().append_pair("cursor", cursor);
            }
            let response = send_authorized(&self.auth, |http, bearer| {
                http.get(url.clone()).header("authorization", bearer)
            })
            .await?;
            let page: PlantsPage = decode_json(response).await?;
            plants.extend(page.data);
            match page.pagination.next_page {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }
        debug!(plants = plants.len(), "Fetched Planta plants");
        Ok(plants)
    }

    pub async fn due_tasks(
        &self,
        within_days: i64,
        today: Date,
    ) -> Result<Vec<PlantTask>, ApiError> {
        let plants = self.all_plants().await?;
        Ok(collect_due_tasks(&plants, within_days, today))
    }

    pub async fn complete_action(
        &self,
        plant_id: &str,
        action: ActionType,
    ) -> Result<(), ApiError> {
        if !action.completable() {
            return Err(ApiError::NotCompletable(action.api_name().to_string()));
        }
        let url = self.endpoint(&format!("/addedPlants/{plant_id}/actions/complete"))?;
        let body = json!({ "actionType": action.api_name() });
        send_authorized(&self.auth, |http, bearer| {
            http.post(url.clone()).header("authorization", bearer).json(&body)
        })
        .await?;
        info!(plant_id, action = %action, "Planta action completed");
        Ok(())
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        Url::parse(&format!("{}{path}", self.base_url))
            .map_err(|err| ApiError::Transport(format!("invalid Planta URL: {err}")))
    }
}

/// Actions whose next date falls on or before `today + within_days`,
/// ordered by due date and then plant name.
pub fn collect_due_tasks(plants: &[Plant], within_days: i64, today: Date) -> Vec<PlantTask> {
    let cutoff = today + time::Duration::days(within_days);
    let mut tasks = Vec::new();
    for plant in plants {
        for (action, schedule) in plant.actions.schedules() {
            let Some(next) = schedule.and_then(|schedule| schedule.next.as_ref()) else {
                continue;
            };
            let Some(due) = parse_due_date(&next.date) else {
                continue;
            };
            if due > cutoff {
                continue;
            }
            tasks.push(PlantTask {
                plant_id: plant.id.clone(),
                plant_name: plant.display_name().to_string(),
                action,
                due,
                overdue: due < today,
                today: due == today,
            });
        }
    }
    tasks.sort_by(|a, b| match a.due.cmp(&b.due) {
        Ordering::Equal => a.plant_name.cmp(&b.plant_name),
        other => other,
    });
    tasks
}

fn parse_due_date(raw: &str) -> Option<Date> {
    match OffsetDateTime::parse(raw, &Rfc3339) {
        Ok(at) => Some(at.date()),
        Err(_) => parse_date(raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token_store::TokenStore;
    use tempfile::TempDir;
    use time::macros::date;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn plant(id: &str, name: &str, custom: Option<&str>, watering: Option<&str>) -> Plant {
        Plant {
            id: id.to_string(),
            names: PlantNames {
                localized_name: name.to_string(),
                custom: custom.map(str::to_string),
                ..PlantNames::default()
            },
            actions: PlantActions {
                watering: watering.map(|date| ActionSchedule {
                    next: Some(ActionDate {
                        date: date.to_string(),
                    }),
                    completed: None,
                }),
                ..PlantActions::default()
            },
        }
    }

    fn client(server: &MockServer, tmp: &TempDir, app_code: Option<&str>) -> PlantaClient {
        let exchange = PlantaExchange::new(app_code.map(str::to_string)).with_endpoints(
            format!("{}/v1/auth/authorize", server.uri()),
            format!("{}/v1/auth/refreshToken", server.uri()),
        );
        let store = TokenStore::new(tmp.path().join("planta_tokens.json"));
        let auth = OAuthManager::new(exchange, store, Client::new());
        PlantaClient::new(auth, app_code.map(str::to_string))
            .with_base_url(format!("{}/v1", server.uri()))
    }

    fn token_body(access: &str) -> serde_json::Value {
        json!({
            "status": 200,
            "data": {
                "accessToken": access,
                "refreshToken": "planta-refresh",
                "tokenType": "Bearer",
                "expiresAt": "2099-01-01T00:00:00Z"
            }
        })
    }

    #[test]
    fn custom_name_wins_unless_empty() {
        assert_eq!(plant("1", "Monstera", Some("Monty"), None).display_name(), "Monty");
        assert_eq!(plant("1", "Monstera", Some(""), None).display_name(), "Monstera");
        assert_eq!(plant("1", "Monstera", None, None).display_name(), "Monstera");
    }

    #[test]
    fn due_window_flags_and_ordering() {
        let today = date!(2025 - 12 - 19);
        let plants = vec![
            plant("a", "Zamioculcas", None, Some("2025-12-19T00:00:00.000000000Z")),
            plant("b", "Aloe", None, Some("2025-12-19T00:00:00Z")),
            plant("c", "Ficus", None, Some("2025-12-17")),
            plant("d", "Pothos", None, Some("2025-12-22")),
            plant("e", "Cactus", None, Some("2025-12-23")),
            plant("f", "Fern", None, Some("not a date")),
        ];
        let tasks = collect_due_tasks(&plants, 3, today);
        let names: Vec<_> = tasks.iter().map(|task| task.plant_name.as_str()).collect();
        assert_eq!(names, ["Ficus", "Aloe", "Zamioculcas", "Pothos"]);
        assert!(tasks[0].overdue && !tasks[0].today);
        assert!(tasks[1].today && !tasks[1].overdue);
        assert!(!tasks[3].overdue && !tasks[3].today);
    }

    #[test]
    fn only_four_actions_are_completable() {
        assert!(ActionType::Watering.completable());
        assert!(ActionType::Cleaning.completable());
        assert!(!ActionType::Repotting.completable());
        assert!(!ActionType::ProgressUpdate.completable());
    }

    #[tokio::test]
    async fn ensure_authenticated_exchanges_app_code() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/auth/authorize"))
            .and(body_json(json!({ "code": "APP123" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("first")))
            .expect(1)
            .mount(&server)
            .await;

        let tmp = TempDir::new().unwrap();
        let client = client(&server, &tmp, Some("APP123"));
        client.ensure_authenticated().await.unwrap();
        // A stored valid token is reused.
        client.ensure_authenticated().await.unwrap();
        let token = client.auth().get_valid_token().await.unwrap().unwrap();
        assert_eq!(token.access_token, "first");
    }

    #[tokio::test]
    async fn missing_app_code_requires_auth() {
        let server = MockServer::start().await;
        let tmp = TempDir::new().unwrap();
        let err = client(&server, &tmp, None)
            .ensure_authenticated()
            .await
            .unwrap_err();
        assert!(err.requires_auth());
    }

    #[tokio::test]
    async fn unparsable_expiry_falls_back_to_an_hour() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/auth/refreshToken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"accessToken": "x", "refreshToken": "y", "expiresAt": "soon"}
            })))
            .mount(&server)
            .await;
        let exchange = PlantaExchange::new(Some("c".to_string())).with_endpoints(
            format!("{}/v1/auth/authorize", server.uri()),
            format!("{}/v1/auth/refreshToken", server.uri()),
        );
        let credential = exchange.refresh(&Client::new(), "y").await.unwrap();
        let remaining = credential.expires_at - OffsetDateTime::now_utc();
        assert!(remaining > time::Duration::minutes(55));
        assert!(remaining <= time::Duration::hours(1));
        assert_eq!(credential.token_type, "Bearer");
    }

    #[tokio::test]
    async fn plants_follow_pagination_cursor() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/auth/authorize"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("tok")))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/addedPlants"))
            .and(query_param("cursor", "page2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"id": "p2", "names": {"localizedName": "Aloe"}, "actions": {}}],
                "pagination": {"nextPage": null}
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/addedPlants"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"id": "p1", "names": {"localizedName": "Ficus", "custom": "Fred"}, "actions": {}}],
                "pagination": {"nextPage": "page2"}
            })))
            .mount(&server)
            .await;

        let tmp = TempDir::new().unwrap();
        let client = client(&server, &tmp, Some("APP"));
        client.ensure_authenticated().await.unwrap();
        let plants = client.all_plants().await.unwrap();
        let names: Vec<_> = plants.iter().map(Plant::display_name).collect();
        assert_eq!(names, ["Fred", "Aloe"]);
    }

    #[tokio::test]
    async fn complete_posts_action_and_accepts_no_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/auth/authorize"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("tok")))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/addedPlants/p1/actions/complete"))
            .and(body_json(json!({ "actionType": "misting" })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let tmp = TempDir::new().unwrap();
        let client = client(&server, &tmp, Some("APP"));
        client.ensure_authenticated().await.unwrap();
        client.complete_action("p1", ActionType::Misting).await.unwrap();
    }

    #[tokio::test]
    async fn repotting_is_rejected_before_any_request() {
        let server = MockServer::start().await;
        let tmp = TempDir::new().unwrap();
        let err = client(&server, &tmp, Some("APP"))
            .complete_action("p1", ActionType::Repotting)
            .await
            .unwrap_err();
        assert_eq!(err, ApiError::NotCompletable("repotting".to_string()));
    }
}
