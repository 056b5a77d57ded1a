use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tiny_http::Response;
use tiny_http::Server;

use crate::error::OAuthErr;
use crate::html::escape_html;
use crate::pkce::PkceCodes;
use crate::pkce::generate_pkce;
use crate::pkce::generate_state;

const DEFAULT_PORT: u16 = 1455;
const DEFAULT_CALLBACK_PATH: &str = "/callback";
const DEFAULT_CANCEL_PATH: &str = "/cancel";

/// Caller-supplied shape of the authorize URL this server hands back. The
/// server only knows the generic PKCE/state query parameters; provider
/// specifics (issuer, extra flags) are the caller's concern.
#[derive(Debug, Clone)]
pub struct CallbackOptions {
    pub port: u16,
    pub callback_path: String,
    pub cancel_path: String,
    pub authorize_endpoint: String,
    pub client_id: String,
    pub scopes: Vec<String>,
    pub extra_authorize_params: Vec<(String, String)>,
    pub force_state: Option<String>,
    pub timeout: Option<Duration>,
}

impl CallbackOptions {
    pub fn new(authorize_endpoint: String, client_id: String) -> Self {
        Self {
            port: DEFAULT_PORT,
            callback_path: DEFAULT_CALLBACK_PATH.to_string(),
            cancel_path: DEFAULT_CANCEL_PATH.to_string(),
            authorize_endpoint,
            client_id,
            scopes: Vec::new(),
            extra_authorize_params: Vec::new(),
            force_state: None,
            timeout: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    Timeout,
    Cancelled,
}

/// A single-shot listener awaiting exactly one callback request. `T` is
/// whatever `on_code` resolves to.
pub struct PendingLogin<T> {
    actual_port: u16,
    code_verifier: String,
    server_handle: thread::JoinHandle<Result<T, OAuthErr>>,
    shutdown_flag: Arc<AtomicBool>,
    server: Arc<Server>,
}

impl<T: Send + 'static> PendingLogin<T> {
    pub fn actual_port(&self) -> u16 {
        self.actual_port
    }

    pub fn code_verifier(&self) -> &str {
        &self.code_verifier
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle { shutdown_flag: self.shutdown_flag.clone(), server: self.server.clone() }
    }

    /// Blocks (on a dedicated thread) until a request resolves the flow, the
    /// timeout elapses, or the flow is cancelled.
    pub async fn wait_for_result(self) -> Result<T, OAuthErr> {
        tokio::task::spawn_blocking(move || {
            self.server_handle.join().unwrap_or_else(|panic| {
                Err(OAuthErr::CallbackFailed(format!("callback server thread panicked: {panic:?}")))
            })
        })
        .await
        .unwrap_or_else(|panic| {
            Err(OAuthErr::CallbackFailed(format!("callback server task panicked: {panic:?}")))
        })
    }
}

#[derive(Clone)]
pub struct CancelHandle {
    shutdown_flag: Arc<AtomicBool>,
    server: Arc<Server>,
}

impl CancelHandle {
    /// Equivalent to the contract's explicit `stop()`: rejects the pending
    /// flow with `"oauth cancelled"` if it hasn't already resolved.
    pub fn cancel(&self) {
        self.shutdown_flag.store(true, Ordering::SeqCst);
        self.server.unblock();
    }
}

pub struct OAuthCallbackServer;

impl OAuthCallbackServer {
    /// Starts the listener and returns the authorize URL to send the user to,
    /// along with a handle for awaiting the callback result.
    ///
    /// `on_code` runs on the server's request-handling thread once a valid
    /// `code`/`state` pair arrives; it receives the code and the PKCE
    /// verifier generated for this flow (needed by callers that perform the
    /// token exchange themselves, since the contract's `on_code(code)` alone
    /// cannot carry it). Its `Ok` becomes the resolved value of
    /// `wait_for_result`; its `Err` is surfaced verbatim as the rejection
    /// message and produces a 500 response.
    pub fn start<T, F>(
        opts: CallbackOptions,
        on_code: F,
        success_html: String,
        error_html: impl Fn(&str) -> String + Send + Sync + 'static,
    ) -> io::Result<(String, PendingLogin<T>)>
    where
        T: Send + 'static,
        F: Fn(&str, &str) -> Result<T, String> + Send + 'static,
    {
        let pkce = generate_pkce();
        let state = opts.force_state.clone().unwrap_or_else(generate_state);

        let server = Server::http(format!("127.0.0.1:{}", opts.port)).map_err(io::Error::other)?;
        let actual_port = match server.server_addr().to_ip() {
            Some(addr) => addr.port(),
            None => {
                return Err(io::Error::new(io::ErrorKind::AddrInUse, "unable to determine the server port"));
            }
        };
        let server = Arc::new(server);

        let redirect_uri = format!("http://localhost:{actual_port}{}", opts.callback_path);
        let auth_url = build_authorize_url(&opts, &redirect_uri, &pkce, &state);

        let shutdown_flag = Arc::new(AtomicBool::new(false));
        let stop_reason: Arc<StdMutex<Option<StopReason>>> = Arc::new(StdMutex::new(None));
        let (done_tx, done_rx) = mpsc::channel::<()>();

        if let Some(timeout) = opts.timeout {
            spawn_timeout_watcher(done_rx, timeout, shutdown_flag.clone(), stop_reason.clone(), server.clone());
        }

        let server_for_thread = server.clone();
        let shutdown_flag_for_thread = shutdown_flag.clone();
        let cancel_path = opts.cancel_path.clone();
        let callback_path = opts.callback_path.clone();
        let code_verifier = pkce.code_verifier.clone();
        let server_handle = thread::spawn(move || -> Result<T, OAuthErr> {
            let mut outcome: Option<Result<T, OAuthErr>> = None;

            while !shutdown_flag_for_thread.load(Ordering::SeqCst) {
                let req = match server_for_thread.recv() {
                    Ok(r) => r,
                    Err(_) => break,
                };

                match route(&req, &callback_path, &cancel_path, &state, &code_verifier, &on_code) {
                    RouteOutcome::NotTerminal(response) => {
                        let _ = req.respond(response);
                    }
                    RouteOutcome::Terminal(result, status) => {
                        let body = match &result {
                            Ok(_) => success_html.clone(),
                            Err(err) => error_html(&escape_html(&err.to_string())),
                        };
                        let _ = req.respond(Response::from_string(body).with_status_code(status));
                        shutdown_flag_for_thread.store(true, Ordering::SeqCst);
                        outcome = Some(result);
                        break;
                    }
                }
            }

            let _ = done_tx.send(());

            outcome.unwrap_or_else(|| match *stop_reason.lock().unwrap_or_else(|p| p.into_inner()) {
                Some(StopReason::Timeout) => Err(OAuthErr::Timeout),
                _ => Err(OAuthErr::Cancelled),
            })
        });

        Ok((
            auth_url,
            PendingLogin { actual_port, code_verifier: pkce.code_verifier, server_handle, shutdown_flag, server },
        ))
    }
}

enum RouteOutcome<T> {
    NotTerminal(Response<std::io::Cursor<Vec<u8>>>),
    Terminal(Result<T, OAuthErr>, u16),
}

#[allow(clippy::too_many_arguments)]
fn route<T>(
    req: &tiny_http::Request,
    callback_path: &str,
    cancel_path: &str,
    expected_state: &str,
    code_verifier: &str,
    on_code: &(dyn Fn(&str, &str) -> Result<T, String> + Send),
) -> RouteOutcome<T> {
    let url_raw = req.url().to_string();
    let parsed_url = match url::Url::parse(&format!("http://localhost{url_raw}")) {
        Ok(u) => u,
        Err(_) => {
            return RouteOutcome::NotTerminal(Response::from_string("Bad Request").with_status_code(400));
        }
    };
    let path = parsed_url.path().to_string();

    if path == cancel_path {
        return RouteOutcome::Terminal(Err(OAuthErr::Cancelled), 200);
    }

    if path != callback_path {
        return RouteOutcome::NotTerminal(Response::from_string("Not Found").with_status_code(404));
    }

    let params: HashMap<String, String> = parsed_url.query_pairs().into_owned().collect();

    if let Some(error) = params.get("error") {
        let message = params.get("error_description").cloned().unwrap_or_else(|| error.clone());
        return RouteOutcome::Terminal(Err(OAuthErr::Upstream(message)), 400);
    }

    if params.get("state").map(String::as_str) != Some(expected_state) {
        return RouteOutcome::Terminal(Err(OAuthErr::StateMismatch), 400);
    }

    let code = match params.get("code") {
        Some(c) if !c.is_empty() => c.clone(),
        _ => return RouteOutcome::Terminal(Err(OAuthErr::MissingCode), 400),
    };

    match on_code(&code, code_verifier) {
        Ok(value) => RouteOutcome::Terminal(Ok(value), 200),
        Err(message) => RouteOutcome::Terminal(Err(OAuthErr::CallbackFailed(message)), 500),
    }
}

/// Spawns a detached thread that waits for either a completion signal on
/// `done_rx` or `timeout` to elapse, unblocking the server on timeout.
fn spawn_timeout_watcher(
    done_rx: mpsc::Receiver<()>,
    timeout: Duration,
    shutdown_flag: Arc<AtomicBool>,
    stop_reason: Arc<StdMutex<Option<StopReason>>>,
    server: Arc<Server>,
) {
    thread::spawn(move || {
        if done_rx.recv_timeout(timeout).is_err()
            && shutdown_flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_ok()
        {
            if let Ok(mut reason) = stop_reason.lock() {
                *reason = Some(StopReason::Timeout);
            }
            server.unblock();
        }
    });
}

fn build_authorize_url(opts: &CallbackOptions, redirect_uri: &str, pkce: &PkceCodes, state: &str) -> String {
    let scope = opts.scopes.join(" ");
    let mut query = vec![
        ("response_type".to_string(), "code".to_string()),
        ("client_id".to_string(), opts.client_id.clone()),
        ("redirect_uri".to_string(), redirect_uri.to_string()),
        ("scope".to_string(), scope),
        ("code_challenge".to_string(), pkce.code_challenge.clone()),
        ("code_challenge_method".to_string(), "S256".to_string()),
        ("state".to_string(), state.to_string()),
    ];
    query.extend(opts.extra_authorize_params.iter().cloned());

    let qs = query
        .into_iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(&v)))
        .collect::<Vec<_>>()
        .join("&");
    format!("{}?{qs}", opts.authorize_endpoint)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use std::io::Read;
    use std::io::Write;
    use std::net::TcpStream;

    use super::*;

    fn escape_wrapped_error_html(msg: &str) -> String {
        format!("<html><body>failed: {msg}</body></html>")
    }

    fn get(port: u16, path_and_query: &str) -> (u16, String) {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).expect("connect");
        let request = format!("GET {path_and_query} HTTP/1.1\r\nHost: 127.0.0.1\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).expect("write request");
        let mut raw = String::new();
        stream.read_to_string(&mut raw).expect("read response");
        let status_line = raw.lines().next().unwrap_or("");
        let status: u16 = status_line.split_whitespace().nth(1).and_then(|s| s.parse().ok()).unwrap_or(0);
        (status, raw)
    }

    fn base_opts() -> CallbackOptions {
        let opts = CallbackOptions::new("https://provider.example/authorize".to_string(), "client-123".to_string());
        CallbackOptions { port: 0, force_state: Some("fixed-state".to_string()), ..opts }
    }

    #[test]
    fn authorize_url_carries_pkce_and_client_params() {
        let (auth_url, pending) = OAuthCallbackServer::start(
            base_opts(),
            |code: &str, _verifier: &str| Ok::<String, String>(code.to_string()),
            "ok".to_string(),
            escape_wrapped_error_html,
        )
        .expect("server starts");

        assert!(auth_url.contains("client_id=client-123"));
        assert!(auth_url.contains("code_challenge_method=S256"));
        assert!(auth_url.contains("state=fixed-state"));
        pending.cancel_handle().cancel();
    }

    #[tokio::test]
    async fn successful_callback_resolves_with_on_code_value() {
        let (_auth_url, pending) = OAuthCallbackServer::start(
            base_opts(),
            |code: &str, verifier: &str| Ok::<String, String>(format!("{code}:{verifier}")),
            "<html>ok</html>".to_string(),
            escape_wrapped_error_html,
        )
        .expect("server starts");

        let port = pending.actual_port();
        let verifier = pending.code_verifier().to_string();
        let (status, _body) = tokio::task::spawn_blocking(move || get(port, "/callback?code=abc123&state=fixed-state"))
            .await
            .expect("join");
        assert_eq!(status, 200);

        let result = pending.wait_for_result().await.expect("resolves");
        assert_eq!(result, format!("abc123:{verifier}"));
    }

    #[tokio::test]
    async fn state_mismatch_rejects_with_400() {
        let (_auth_url, pending) = OAuthCallbackServer::start(
            base_opts(),
            |code: &str, _verifier: &str| Ok::<String, String>(code.to_string()),
            "ok".to_string(),
            escape_wrapped_error_html,
        )
        .expect("server starts");

        let port = pending.actual_port();
        let (status, _) = tokio::task::spawn_blocking(move || get(port, "/callback?code=abc&state=wrong"))
            .await
            .expect("join");
        assert_eq!(status, 400);

        let err = pending.wait_for_result().await.expect_err("should reject");
        assert!(matches!(err, OAuthErr::StateMismatch));
    }

    #[tokio::test]
    async fn missing_code_rejects_with_400() {
        let (_auth_url, pending) = OAuthCallbackServer::start(
            base_opts(),
            |code: &str, _verifier: &str| Ok::<String, String>(code.to_string()),
            "ok".to_string(),
            escape_wrapped_error_html,
        )
        .expect("server starts");

        let port = pending.actual_port();
        let (status, _) = tokio::task::spawn_blocking(move || get(port, "/callback?state=fixed-state"))
            .await
            .expect("join");
        assert_eq!(status, 400);

        let err = pending.wait_for_result().await.expect_err("should reject");
        assert!(matches!(err, OAuthErr::MissingCode));
    }

    #[tokio::test]
    async fn upstream_error_param_rejects_with_error_description() {
        let (_auth_url, pending) = OAuthCallbackServer::start(
            base_opts(),
            |code: &str, _verifier: &str| Ok::<String, String>(code.to_string()),
            "ok".to_string(),
            escape_wrapped_error_html,
        )
        .expect("server starts");

        let port = pending.actual_port();
        let (status, _) = tokio::task::spawn_blocking(move || {
            get(port, "/callback?error=access_denied&error_description=user+said+no&state=fixed-state")
        })
        .await
        .expect("join");
        assert_eq!(status, 400);

        let err = pending.wait_for_result().await.expect_err("should reject");
        match err {
            OAuthErr::Upstream(msg) => assert_eq!(msg, "user said no"),
            other => panic!("expected Upstream, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn on_code_failure_rejects_with_500() {
        let (_auth_url, pending) = OAuthCallbackServer::start(
            base_opts(),
            |_code: &str, _verifier: &str| Err::<String, String>("exchange failed".to_string()),
            "ok".to_string(),
            escape_wrapped_error_html,
        )
        .expect("server starts");

        let port = pending.actual_port();
        let (status, _) = tokio::task::spawn_blocking(move || get(port, "/callback?code=abc&state=fixed-state"))
            .await
            .expect("join");
        assert_eq!(status, 500);

        let err = pending.wait_for_result().await.expect_err("should reject");
        assert!(matches!(err, OAuthErr::CallbackFailed(ref m) if m == "exchange failed"));
    }

    #[tokio::test]
    async fn cancel_handle_rejects_pending_flow() {
        let (_auth_url, pending) = OAuthCallbackServer::start(
            base_opts(),
            |code: &str, _verifier: &str| Ok::<String, String>(code.to_string()),
            "ok".to_string(),
            escape_wrapped_error_html,
        )
        .expect("server starts");

        pending.cancel_handle().cancel();
        let err = pending.wait_for_result().await.expect_err("should reject");
        assert!(matches!(err, OAuthErr::Cancelled));
    }

    #[tokio::test]
    async fn timeout_rejects_pending_flow() {
        let mut opts = base_opts();
        opts.timeout = Some(Duration::from_millis(50));
        let (_auth_url, pending) = OAuthCallbackServer::start(
            opts,
            |code: &str, _verifier: &str| Ok::<String, String>(code.to_string()),
            "ok".to_string(),
            escape_wrapped_error_html,
        )
        .expect("server starts");

        let err = pending.wait_for_result().await.expect_err("should reject");
        assert!(matches!(err, OAuthErr::Timeout));
    }

    #[tokio::test]
    async fn unknown_path_returns_404_without_resolving_flow() {
        let (_auth_url, pending) = OAuthCallbackServer::start(
            base_opts(),
            |code: &str, _verifier: &str| Ok::<String, String>(code.to_string()),
            "ok".to_string(),
            escape_wrapped_error_html,
        )
        .expect("server starts");

        let port = pending.actual_port();
        let (status, _) = tokio::task::spawn_blocking(move || get(port, "/unknown")).await.expect("join");
        assert_eq!(status, 404);

        pending.cancel_handle().cancel();
        let err = pending.wait_for_result().await.expect_err("should reject");
        assert!(matches!(err, OAuthErr::Cancelled));
    }
}
