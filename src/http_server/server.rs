//! # HTTP Server
//!
//! Shared application state and the combined router for every gateway
//! surface.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::config::HttpServerConfig;
use super::edge_routes::edge_routes;
use super::governance_routes::governance_routes;
use super::health_routes::health_routes;
use super::ssh_routes::ssh_routes;
use super::tools_routes::tools_routes;
use crate::audit::{AuditSink, FileAuditSink, MemoryAuditSink};
use crate::config::{ConfigError, EdgeConfig, GatewayConfig, SshConfig};
use crate::edge::{EdgeRegistry, InMemoryEdgeRepository};
use crate::gateway::{CommandGateway, MockTransport, SessionStore, TemplateCatalog};
use crate::governance::{GovernanceStore, InMemoryGovernanceStore};
use crate::jobs::{
    AgentSettings, InMemoryJobRepository, JobDispatcher, JobExecutor, MockExecutor,
};
use crate::policy::{InMemoryPolicyStore, PolicyStore};
use crate::principal::{JwtTokenVerifier, TokenVerifier};
use crate::replay::{InMemoryNonceStore, NonceStore};
use crate::signing::{JobSigner, JobVerifier};

/// Everything a handler can reach
pub struct AppState {
    pub token_verifier: Arc<dyn TokenVerifier>,
    pub edges: Arc<EdgeRegistry>,
    pub dispatcher: Arc<JobDispatcher>,
    pub job_verifier: JobVerifier,
    pub nonces: Arc<dyn NonceStore>,
    pub executor: Arc<dyn JobExecutor>,
    pub agent_settings: AgentSettings,
    pub poll_limit: usize,
    pub gateway: Arc<CommandGateway>,
    pub policies: Arc<dyn PolicyStore>,
    pub governance: Arc<dyn GovernanceStore>,
    pub audit: Arc<dyn AuditSink>,
}

impl AppState {
    /// Wire in-memory stores around the given keys, verifier and audit sink
    pub fn new(
        signer: JobSigner,
        job_verifier: JobVerifier,
        token_verifier: Arc<dyn TokenVerifier>,
        audit: Arc<dyn AuditSink>,
        edge: &EdgeConfig,
        ssh: &SshConfig,
    ) -> Self {
        let policies: Arc<dyn PolicyStore> = Arc::new(InMemoryPolicyStore::new());
        let governance: Arc<dyn GovernanceStore> = Arc::new(InMemoryGovernanceStore::new());

        let edges = Arc::new(
            EdgeRegistry::new(Arc::new(InMemoryEdgeRepository::new()))
                .with_default_ttl(edge.pairing_ttl_minutes),
        );

        let dispatcher = Arc::new(
            JobDispatcher::new(
                Arc::new(InMemoryJobRepository::new()),
                edges.clone(),
                governance.clone(),
                audit.clone(),
                signer,
                job_verifier.clone(),
            )
            .with_default_ttl(edge.job_ttl_seconds),
        );

        let gateway = Arc::new(CommandGateway::new(
            policies.clone(),
            governance.clone(),
            audit.clone(),
            Arc::new(TemplateCatalog::builtin()),
            Arc::new(SessionStore::new(ssh.default_idle_timeout_secs)),
            Arc::new(MockTransport),
        ));

        Self {
            token_verifier,
            edges,
            dispatcher,
            job_verifier,
            nonces: Arc::new(InMemoryNonceStore::new()),
            executor: Arc::new(MockExecutor),
            agent_settings: edge.agent_settings(),
            poll_limit: edge.poll_limit,
            gateway,
            policies,
            governance,
            audit,
        }
    }

    /// Build state from a validated configuration file
    pub fn from_config(config: &GatewayConfig) -> Result<Self, ConfigError> {
        let (signer, verifier) = config.load_signing_keys()?;

        let audit: Arc<dyn AuditSink> = match &config.audit_log_path {
            Some(path) => Arc::new(FileAuditSink::open(path).map_err(|e| ConfigError::Read {
                path: path.clone(),
                message: e.to_string(),
            })?),
            None => {
                tracing::warn!("audit_log_path not set; audit records are kept in memory only");
                Arc::new(MemoryAuditSink::new())
            }
        };

        let token_verifier = Arc::new(JwtTokenVerifier::new(config.auth.verifier_config()));

        Ok(Self::new(
            signer,
            verifier,
            token_verifier,
            audit,
            &config.edge,
            &config.ssh,
        ))
    }
}

/// Periodic nonce cleanup, stale pairing-code purge and idle SSH session purge
pub fn spawn_maintenance(state: Arc<AppState>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;

            match state.nonces.cleanup() {
                Ok(0) => {}
                Ok(removed) => tracing::debug!(removed, "expired nonces removed"),
                Err(e) => tracing::warn!(error = %e, "nonce cleanup failed"),
            }

            match state.edges.purge_expired_codes() {
                Ok(0) => {}
                Ok(removed) => tracing::debug!(removed, "expired pairing codes removed"),
                Err(e) => tracing::warn!(error = %e, "pairing code purge failed"),
            }

            match state.gateway.sessions().purge_idle() {
                Ok(0) => {}
                Ok(closed) => tracing::info!(closed, "idle ssh sessions closed"),
                Err(e) => tracing::warn!(error = %e, "idle session purge failed"),
            }
        }
    })
}

/// HTTP server for the gateway API
pub struct HttpServer {
    config: HttpServerConfig,
    router: Router,
}

impl HttpServer {
    pub fn new(config: HttpServerConfig, state: Arc<AppState>) -> Self {
        let router = Self::build_router(&config, state);
        Self { config, router }
    }

    /// Build the combined router with all endpoints
    fn build_router(config: &HttpServerConfig, state: Arc<AppState>) -> Router {
        let cors = if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|s| s.parse().ok())
                .collect();

            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any)
        };

        Router::new()
            .merge(health_routes())
            .nest("/edge", edge_routes(state.clone()))
            .nest("/ssh", ssh_routes(state.clone()))
            .nest("/tools", tools_routes(state.clone()))
            .nest("/governance", governance_routes(state))
            .layer(TraceLayer::new_for_http())
            .layer(cors)
    }

    pub fn socket_addr(&self) -> String {
        self.config.socket_addr()
    }

    /// Get the router (for testing)
    pub fn router(self) -> Router {
        self.router
    }

    pub async fn start(self) -> Result<(), std::io::Error> {
        let addr: SocketAddr = self
            .config
            .socket_addr()
            .parse()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

        let listener = TcpListener::bind(addr).await?;
        tracing::info!(%addr, "netops-gate listening");
        axum::serve(listener, self.router).await?;

        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::policy::{Environment, NewPolicy};
    use crate::principal::{JwtVerifierConfig, Role};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    const PRIVATE_PEM: &str = include_str!("../../tests/fixtures/job_signing_private.pem");
    const PUBLIC_PEM: &str = include_str!("../../tests/fixtures/job_signing_public.pem");

    pub struct TestApp {
        pub state: Arc<AppState>,
        pub audit: MemoryAuditSink,
        tokens: JwtTokenVerifier,
    }

    impl TestApp {
        pub fn new() -> Self {
            let tokens = JwtTokenVerifier::new(JwtVerifierConfig {
                secret: "route-test-secret".to_string(),
                ..Default::default()
            });
            let audit = MemoryAuditSink::new();
            let state = AppState::new(
                JobSigner::from_pem(PRIVATE_PEM.as_bytes()).unwrap(),
                JobVerifier::from_pem(PUBLIC_PEM.as_bytes()).unwrap(),
                Arc::new(tokens.clone()),
                Arc::new(audit.clone()),
                &EdgeConfig::default(),
                &SshConfig::default(),
            );
            Self {
                state: Arc::new(state),
                audit,
                tokens,
            }
        }

        pub fn router(&self) -> Router {
            HttpServer::new(HttpServerConfig::default(), self.state.clone()).router()
        }

        /// Install a policy for `env` with the given allow-list
        pub fn allow(&self, env: Environment, allow: &[&str], require_approval: bool) {
            self.state
                .policies
                .create(NewPolicy {
                    name: format!("{env} test policy"),
                    environment: env,
                    allow_list: allow.iter().map(|s| s.to_string()).collect(),
                    deny_list: vec!["erase".to_string()],
                    dangerous_list: vec!["reload".to_string(), "disable".to_string()],
                    require_approval,
                })
                .unwrap();
        }

        pub fn bearer(&self, user: &str, role: Role) -> String {
            let token = self.tokens.issue(user, role, chrono::Duration::minutes(5)).unwrap();
            format!("Bearer {token}")
        }

        /// Send one request; returns status and parsed JSON body (Null if empty)
        pub async fn send(
            &self,
            method: &str,
            uri: &str,
            headers: &[(&str, &str)],
            body: Option<Value>,
        ) -> (StatusCode, Value) {
            let mut builder = Request::builder().method(method).uri(uri);
            for (name, value) in headers {
                builder = builder.header(*name, *value);
            }
            let request = match body {
                Some(json) => builder
                    .header("content-type", "application/json")
                    .body(Body::from(json.to_string()))
                    .unwrap(),
                None => builder.body(Body::empty()).unwrap(),
            };

            let response = self.router().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let value = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes)
                    .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
            };
            (status, value)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::TestApp;
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_server_with_custom_port() {
        let app = TestApp::new();
        let server = HttpServer::new(HttpServerConfig::with_port(9090), app.state.clone());
        assert_eq!(server.socket_addr(), "0.0.0.0:9090");
    }

    #[tokio::test]
    async fn test_health() {
        let app = TestApp::new();
        let (status, body) = app.send("GET", "/health", &[], None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_maintenance_purges_stale_pairing_codes() {
        let app = TestApp::new();
        let long_ago = chrono::Utc::now() - chrono::Duration::days(3);
        app.state
            .edges
            .issue_pairing_code("tenant-1", "STALE001", None, long_ago)
            .unwrap();

        let handle = spawn_maintenance(app.state.clone(), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.abort();

        let repo = app.state.edges.repository();
        assert!(repo.find_pairing_code("STALE001").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let app = TestApp::new();
        let (status, _) = app.send("GET", "/nope", &[], None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
