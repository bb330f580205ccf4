use crate::callback::{CallbackListener, CallbackOutcome};
use crate::error::AuthError;
use crate::token_store::{Credential, TokenStore};
use reqwest::Client;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use stet_core::config::{CALLBACK_PATH, CALLBACK_SHUTDOWN_GRACE, TOKEN_SKEW, callback_addr};
use time::OffsetDateTime;
use tracing::{debug, info, warn};

/// Provider-specific half of the OAuth lifecycle: how codes and refresh
/// tokens are turned into credentials.
pub trait TokenExchange: Send + Sync + 'static {
    fn service(&self) -> &'static str;

    fn has_credentials(&self) -> bool;

    /// Browser URL for the interactive flow, `None` when the provider has
    /// no interactive flow.
    fn authorize_url(&self, redirect_uri: &str, state: &str) -> Option<String>;

    fn exchange_code(
        &self,
        http: &Client,
        code: &str,
        redirect_uri: &str,
    ) -> impl Future<Output = Result<Credential, AuthError>> + Send;

    fn refresh(
        &self,
        http: &Client,
        refresh_token: &str,
    ) -> impl Future<Output = Result<Credential, AuthError>> + Send;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthState {
    NoCredentials,
    Unauthenticated,
    Authenticated,
    PendingAuthorization,
}

#[derive(Clone, Debug)]
pub struct CallbackConfig {
    pub addr: SocketAddr,
    pub path: String,
    pub shutdown_grace: Duration,
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            addr: callback_addr(),
            path: CALLBACK_PATH.to_string(),
            shutdown_grace: CALLBACK_SHUTDOWN_GRACE,
        }
    }
}

pub type BrowserOpener = Arc<dyn Fn(&str) -> Result<(), String> + Send + Sync>;

pub fn system_browser() -> BrowserOpener {
    Arc::new(|url: &str| webbrowser::open(url).map_err(|err| err.to_string()))
}

/// Owns one integration's token file and its authorization flow.
pub struct OAuthManager<E> {
    exchange: E,
    store: TokenStore,
    http: Client,
    callback: CallbackConfig,
    skew: Duration,
    pending: Arc<AtomicBool>,
    refresh_lock: tokio::sync::Mutex<()>,
    opener: BrowserOpener,
}

/// Clears the pending flag however the flow ends.
struct PendingGuard(Arc<AtomicBool>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl<E: TokenExchange> OAuthManager<E> {
    pub fn new(exchange: E, store: TokenStore, http: Client) -> Self {
        Self {
            exchange,
            store,
            http,
            callback: CallbackConfig::default(),
            skew: TOKEN_SKEW,
            pending: Arc::new(AtomicBool::new(false)),
            refresh_lock: tokio::sync::Mutex::new(()),
            opener: system_browser(),
        }
    }

    pub fn with_callback(mut self, callback: CallbackConfig) -> Self {
        self.callback = callback;
        self
    }

    pub fn with_browser(mut self, opener: BrowserOpener) -> Self {
        self.opener = opener;
        self
    }

    pub fn service(&self) -> &'static str {
        self.exchange.service()
    }

    pub fn has_credentials(&self) -> bool {
        self.exchange.has_credentials()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn http(&self) -> &Client {
        &self.http
    }

    pub fn auth_state(&self) -> AuthState {
        if self.is_pending() {
            return AuthState::PendingAuthorization;
        }
        if !self.has_credentials() {
            return AuthState::NoCredentials;
        }
        match self.store.load() {
            Ok(Some(_)) => AuthState::Authenticated,
            Ok(None) => AuthState::Unauthenticated,
            Err(err) => {
                warn!(service = self.service(), error = %err, "Unreadable token file");
                AuthState::Unauthenticated
            }
        }
    }

    /// Stored credential, refreshed first when it is inside the skew window.
    /// `Ok(None)` means the user has to authorize again; a failed refresh is
    /// reported that way rather than as an error.
    pub async fn get_valid_token(&self) -> Result<Option<Credential>, AuthError> {
        let Some(stored) = self.store.load()? else {
            return Ok(None);
        };
        if stored.is_usable_at(OffsetDateTime::now_utc(), self.skew) {
            return Ok(Some(stored));
        }

        let _guard = self.refresh_lock.lock().await;
        // Another caller may have refreshed while this one waited.
        let Some(stored) = self.store.load()? else {
            return Ok(None);
        };
        if stored.is_usable_at(OffsetDateTime::now_utc(), self.skew) {
            return Ok(Some(stored));
        }
        match self.refresh_from(&stored).await {
            Ok(fresh) => Ok(Some(fresh)),
            Err(err) => {
                warn!(service = self.service(), error = %err, "Token refresh failed");
                Ok(None)
            }
        }
    }

    /// Refreshes regardless of the stored expiry, after the API rejected the
    /// current access token.
    pub async fn force_refresh(&self) -> Result<Credential, AuthError> {
        let _guard = self.refresh_lock.lock().await;
        let stored = self
            .store
            .load()?
            .ok_or(AuthError::MissingCredentials("stored token"))?;
        self.refresh_from(&stored).await
    }

    async fn refresh_from(&self, stored: &Credential) -> Result<Credential, AuthError> {
        debug!(service = self.service(), "Refreshing token");
        let fresh = self.exchange.refresh(&self.http, &stored.refresh_token).await?;
        self.store.save(&fresh)?;
        info!(service = self.service(), expires_at = %fresh.expires_at, "Token refreshed");
        Ok(fresh)
    }

    /// Exchanges a code obtained out of band (or from the callback) and
    /// persists the result.
    pub async fn exchange_code(&self, code: &str) -> Result<Credential, AuthError> {
        let redirect_uri = self.redirect_uri(self.callback.addr.port());
        self.exchange_with_redirect(code, &redirect_uri).await
    }

    async fn exchange_with_redirect(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<Credential, AuthError> {
        let credential = self
            .exchange
            .exchange_code(&self.http, code, redirect_uri)
            .await?;
        self.store.save(&credential)?;
        info!(service = self.service(), "Authorization code exchanged");
        Ok(credential)
    }

    /// Runs the interactive browser flow. The callback, a provider error and
    /// the timeout race; the first to resolve decides the outcome and the
    /// listener is stopped either way.
    pub async fn authorize(&self, timeout: Duration) -> Result<Credential, AuthError> {
        if !self.has_credentials() {
            return Err(AuthError::MissingCredentials("client credentials"));
        }
        if self
            .pending
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(AuthError::AlreadyPending);
        }
        let _pending = PendingGuard(self.pending.clone());

        let expected_state = uuid::Uuid::new_v4().simple().to_string();
        let (listener, outcome_rx) =
            CallbackListener::start(self.callback.addr, &self.callback.path)?;
        let redirect_uri = self.redirect_uri(listener.port());
        let Some(url) = self.exchange.authorize_url(&redirect_uri, &expected_state) else {
            self.stop_listener(listener).await;
            return Err(AuthError::InteractiveUnsupported);
        };

        info!(service = self.service(), "Opening browser for authorization");
        if let Err(err) = (self.opener)(&url) {
            self.stop_listener(listener).await;
            return Err(AuthError::Browser(err));
        }

        let outcome = tokio::select! {
            received = outcome_rx => received
                .map_err(|_| AuthError::Listener("listener closed without a callback".to_string())),
            _ = tokio::time::sleep(timeout) => Err(AuthError::TimedOut),
        };
        self.stop_listener(listener).await;

        match outcome? {
            CallbackOutcome::Code { code, state } => {
                if state.as_deref() != Some(expected_state.as_str()) {
                    return Err(AuthError::StateMismatch);
                }
                self.exchange_with_redirect(&code, &redirect_uri).await
            }
            CallbackOutcome::Denied { error, description } => {
                if description.is_empty() {
                    Err(AuthError::Denied(error))
                } else {
                    Err(AuthError::Denied(format!("{error} - {description}")))
                }
            }
            CallbackOutcome::MissingCode => Err(AuthError::MissingCode),
        }
    }

    async fn stop_listener(&self, listener: CallbackListener) {
        let grace = self.callback.shutdown_grace;
        let joined = tokio::task::spawn_blocking(move || listener.shutdown(grace)).await;
        if let Err(err) = joined {
            warn!(error = %err, "Callback listener shutdown task failed");
        }
    }

    fn redirect_uri(&self, port: u16) -> String {
        format!("http://localhost:{port}{}", self.callback.path)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Exchange that mints credentials locally and counts calls.
    #[derive(Default)]
    pub(crate) struct FakeExchange {
        pub(crate) lifetime_secs: i64,
        pub(crate) fail_refresh: bool,
        pub(crate) refreshes: Mutex<u32>,
        pub(crate) codes: Mutex<Vec<String>>,
    }

    impl TokenExchange for FakeExchange {
        fn service(&self) -> &'static str {
            "fake"
        }

        fn has_credentials(&self) -> bool {
            true
        }

        fn authorize_url(&self, redirect_uri: &str, state: &str) -> Option<String> {
            reqwest::Url::parse_with_params(
                "https://auth.example.test/authorize",
                &[("redirect_uri", redirect_uri), ("state", state)],
            )
            .ok()
            .map(String::from)
        }

        async fn exchange_code(
            &self,
            _http: &Client,
            code: &str,
            _redirect_uri: &str,
        ) -> Result<Credential, AuthError> {
            self.codes.lock().unwrap().push(code.to_string());
            Ok(self.mint(&format!("access-{code}")))
        }

        async fn refresh(
            &self,
            _http: &Client,
            _refresh_token: &str,
        ) -> Result<Credential, AuthError> {
            if self.fail_refresh {
                return Err(AuthError::TokenRequest("status 400".to_string()));
            }
            let mut count = self.refreshes.lock().unwrap();
            *count += 1;
            Ok(self.mint(&format!("refreshed-{count}")))
        }
    }

    impl FakeExchange {
        fn mint(&self, access: &str) -> Credential {
            Credential {
                access_token: access.to_string(),
                refresh_token: "refresh".to_string(),
                token_type: "Bearer".to_string(),
                expires_at: OffsetDateTime::now_utc()
                    + time::Duration::seconds(self.lifetime_secs.max(3600)),
            }
        }
    }

    /// Follows the authorization URL back to the redirect URI like a browser
    /// would after the user approved.
    pub(crate) fn simulated_browser(code: &'static str) -> BrowserOpener {
        Arc::new(move |url: &str| {
            let url = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
            let params: std::collections::HashMap<String, String> =
                url.query_pairs().into_owned().collect();
            let redirect = params
                .get("redirect_uri")
                .ok_or("missing redirect_uri")?
                .replace("localhost", "127.0.0.1");
            let state = params.get("state").cloned().unwrap_or_default();
            let callback = format!("{redirect}?code={code}&state={state}");
            tokio::spawn(async move {
                let _ = reqwest::get(&callback).await;
            });
            Ok(())
        })
    }

    fn ephemeral_callback() -> CallbackConfig {
        CallbackConfig {
            addr: "127.0.0.1:0".parse().unwrap(),
            path: "/callback".to_string(),
            shutdown_grace: Duration::from_secs(2),
        }
    }

    fn manager(tmp: &TempDir, exchange: FakeExchange) -> OAuthManager<FakeExchange> {
        OAuthManager::new(
            exchange,
            TokenStore::new(tmp.path().join("tokens.json")),
            Client::new(),
        )
        .with_callback(ephemeral_callback())
    }

    fn stored(expires_in: time::Duration) -> Credential {
        Credential {
            access_token: "stale".to_string(),
            refresh_token: "refresh".to_string(),
            token_type: "Bearer".to_string(),
            expires_at: OffsetDateTime::now_utc() + expires_in,
        }
    }

    #[tokio::test]
    async fn no_token_then_flow_yields_future_expiry() {
        let tmp = TempDir::new().unwrap();
        let manager =
            manager(&tmp, FakeExchange::default()).with_browser(simulated_browser("granted"));
        assert_eq!(manager.auth_state(), AuthState::Unauthenticated);
        assert_eq!(manager.get_valid_token().await.unwrap(), None);

        manager.authorize(Duration::from_secs(10)).await.unwrap();

        let token = manager.get_valid_token().await.unwrap().unwrap();
        assert_eq!(token.access_token, "access-granted");
        assert!(token.expires_at > OffsetDateTime::now_utc());
        assert_eq!(manager.auth_state(), AuthState::Authenticated);
        assert!(!manager.is_pending());
    }

    #[tokio::test]
    async fn token_inside_skew_is_refreshed_and_persisted() {
        let tmp = TempDir::new().unwrap();
        let manager = manager(&tmp, FakeExchange::default());
        manager
            .store
            .save(&stored(time::Duration::minutes(4)))
            .unwrap();

        let token = manager.get_valid_token().await.unwrap().unwrap();
        assert_eq!(token.access_token, "refreshed-1");
        assert_eq!(manager.store.load().unwrap(), Some(token));
    }

    #[tokio::test]
    async fn valid_token_is_returned_without_refresh() {
        let tmp = TempDir::new().unwrap();
        let manager = manager(&tmp, FakeExchange::default());
        manager.store.save(&stored(time::Duration::hours(1))).unwrap();

        let token = manager.get_valid_token().await.unwrap().unwrap();
        assert_eq!(token.access_token, "stale");
        assert_eq!(*manager.exchange.refreshes.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn failed_refresh_reads_as_no_token() {
        let tmp = TempDir::new().unwrap();
        let exchange = FakeExchange {
            fail_refresh: true,
            ..FakeExchange::default()
        };
        let manager = manager(&tmp, exchange);
        manager
            .store
            .save(&stored(time::Duration::minutes(-1)))
            .unwrap();
        assert_eq!(manager.get_valid_token().await.unwrap(), None);
    }

    #[tokio::test]
    async fn second_flow_is_rejected_while_pending() {
        let tmp = TempDir::new().unwrap();
        let manager = Arc::new(
            manager(&tmp, FakeExchange::default()).with_browser(Arc::new(|_: &str| Ok(()))),
        );
        let first = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.authorize(Duration::from_millis(300)).await })
        };
        while !manager.is_pending() {
            tokio::task::yield_now().await;
        }
        assert_eq!(
            manager.authorize(Duration::from_secs(1)).await,
            Err(AuthError::AlreadyPending)
        );
        assert_eq!(first.await.unwrap(), Err(AuthError::TimedOut));
        assert!(!manager.is_pending());
    }

    #[tokio::test]
    async fn browser_failure_clears_pending() {
        let tmp = TempDir::new().unwrap();
        let manager = manager(&tmp, FakeExchange::default())
            .with_browser(Arc::new(|_: &str| Err("no display".to_string())));
        assert_eq!(
            manager.authorize(Duration::from_secs(1)).await,
            Err(AuthError::Browser("no display".to_string()))
        );
        assert!(!manager.is_pending());
    }
}
