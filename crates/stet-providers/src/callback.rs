use crate::error::AuthError;
use reqwest::Url;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use tiny_http::{Header, Request, Response, Server};
use tokio::sync::oneshot;
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// What the browser redirect delivered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum CallbackOutcome {
    Code { code: String, state: Option<String> },
    Denied { error: String, description: String },
    MissingCode,
}

/// Short-lived listener that hands exactly one callback to the waiting flow.
pub(crate) struct CallbackListener {
    port: u16,
    server: Arc<Server>,
    shutdown: Arc<AtomicBool>,
    finished: Option<mpsc::Receiver<()>>,
}

impl CallbackListener {
    pub(crate) fn start(
        addr: SocketAddr,
        path: &str,
    ) -> Result<(Self, oneshot::Receiver<CallbackOutcome>), AuthError> {
        let server = Server::http(addr).map_err(|err| AuthError::Listener(err.to_string()))?;
        let port = server
            .server_addr()
            .to_ip()
            .map(|addr| addr.port())
            .ok_or_else(|| AuthError::Listener("failed to determine listener port".to_string()))?;
        let server = Arc::new(server);
        let shutdown = Arc::new(AtomicBool::new(false));
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let (finished_tx, finished_rx) = mpsc::channel();

        let loop_server = server.clone();
        let loop_shutdown = shutdown.clone();
        let path = path.to_string();
        thread::spawn(move || {
            serve_one(&loop_server, &loop_shutdown, &path, outcome_tx);
            let _ = finished_tx.send(());
        });
        debug!(port, "Callback listener started");

        Ok((
            Self {
                port,
                server,
                shutdown,
                finished: Some(finished_rx),
            },
            outcome_rx,
        ))
    }

    pub(crate) fn port(&self) -> u16 {
        self.port
    }

    /// Stops the listener, waiting at most `grace` for its thread to exit.
    pub(crate) fn shutdown(mut self, grace: Duration) {
        self.stop(grace);
    }

    fn stop(&mut self, grace: Duration) {
        let Some(finished) = self.finished.take() else {
            return;
        };
        self.shutdown.store(true, Ordering::SeqCst);
        self.server.unblock();
        if finished.recv_timeout(grace).is_err() {
            warn!(port = self.port, "Callback listener did not stop within grace period");
        } else {
            debug!(port = self.port, "Callback listener stopped");
        }
    }
}

impl Drop for CallbackListener {
    fn drop(&mut self) {
        self.stop(Duration::ZERO);
    }
}

fn serve_one(
    server: &Server,
    shutdown: &AtomicBool,
    path: &str,
    outcome_tx: oneshot::Sender<CallbackOutcome>,
) {
    while !shutdown.load(Ordering::SeqCst) {
        let request = match server.recv_timeout(POLL_INTERVAL) {
            Ok(Some(request)) => request,
            Ok(None) => continue,
            Err(err) => {
                if !shutdown.load(Ordering::SeqCst) {
                    warn!(error = %err, "Callback listener receive failed");
                }
                return;
            }
        };
        let Some(outcome) = parse_callback(request.url(), path) else {
            respond(request, 404, "Not found");
            continue;
        };
        match &outcome {
            CallbackOutcome::Code { .. } => respond(
                request,
                200,
                "<h1>Authorization successful</h1><p>You can close this window and return to stet.</p>",
            ),
            CallbackOutcome::Denied { error, description } => respond(
                request,
                400,
                &format!(
                    "<h1>Authorization failed</h1><p>{}</p>",
                    escape(&format!("{error}: {description}"))
                ),
            ),
            CallbackOutcome::MissingCode => {
                respond(request, 400, "<h1>No authorization code received</h1>")
            }
        }
        let _ = outcome_tx.send(outcome);
        return;
    }
}

fn parse_callback(raw: &str, path: &str) -> Option<CallbackOutcome> {
    let url = Url::parse(&format!("http://localhost{raw}")).ok()?;
    if url.path() != path {
        return None;
    }
    let mut code = None;
    let mut state = None;
    let mut error = None;
    let mut description = String::new();
    for (name, value) in url.query_pairs() {
        match name.as_ref() {
            "code" if !value.is_empty() => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" if !value.is_empty() => error = Some(value.into_owned()),
            "error_description" => description = value.into_owned(),
            _ => {}
        }
    }
    Some(match (error, code) {
        (Some(error), _) => CallbackOutcome::Denied { error, description },
        (None, Some(code)) => CallbackOutcome::Code { code, state },
        (None, None) => CallbackOutcome::MissingCode,
    })
}

fn respond(request: Request, status: u16, body: &str) {
    let mut response = Response::from_string(format!("<html><body>{body}</body></html>"))
        .with_status_code(tiny_http::StatusCode(status));
    if let Ok(header) = Header::from_bytes(&b"Content-Type"[..], &b"text/html; charset=utf-8"[..]) {
        response.add_header(header);
    }
    let _ = request.respond(response);
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
