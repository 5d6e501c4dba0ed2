use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::config::{ClientConfig, ClientMode, ConfigError};

pub const CLIENT_MODE_HEADER: &str = "x-datahub-client-mode";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("invalid header value for {name}")]
    InvalidHeader { name: &'static str },
    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),
    #[error("request to DataHub failed: {0}")]
    Request(#[source] reqwest::Error),
    #[error("DataHub returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("GraphQL errors: {0}")]
    GraphQl(String),
    #[error("GraphQL response has no data")]
    MissingData,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

/// Shared handle to a DataHub GMS instance.
#[derive(Debug, Clone)]
pub struct DataHubClient {
    inner: Arc<ClientInner>,
}

#[derive(Debug)]
struct ClientInner {
    http: reqwest::Client,
    config: ClientConfig,
    graphql_url: Url,
}

impl DataHubClient {
    pub fn from_env(
        client_mode: ClientMode,
        component: impl Into<String>,
    ) -> Result<Self, ClientError> {
        Self::new(ClientConfig::from_env(client_mode, component)?)
    }

    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            CLIENT_MODE_HEADER,
            HeaderValue::from_static(config.client_mode.as_str()),
        );

        let user_agent = HeaderValue::from_str(&config.component).map_err(|_| {
            ClientError::InvalidHeader {
                name: "User-Agent",
            }
        })?;

        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(ClientError::Build)?;

        let graphql_url = config.graphql_endpoint();
        tracing::debug!(server = %config.server, component = %config.component, "created DataHub client");

        Ok(Self {
            inner: Arc::new(ClientInner {
                http,
                config,
                graphql_url,
            }),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub async fn graphql(&self, query: &str, variables: Value) -> Result<Value, ClientError> {
        let mut request = self
            .inner
            .http
            .post(self.inner.graphql_url.clone())
            .json(&serde_json::json!({ "query": query, "variables": variables }));
        if let Some(token) = self.inner.config.token.as_deref() {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(ClientError::Request)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.map_err(ClientError::Request)?;
            return Err(ClientError::Status {
                status,
                body: body.trim().to_string(),
            });
        }

        let decoded: GraphQlResponse = response.json().await.map_err(ClientError::Request)?;
        if !decoded.errors.is_empty() {
            let messages: Vec<String> = decoded
                .errors
                .into_iter()
                .map(|error| error.message)
                .collect();
            return Err(ClientError::GraphQl(messages.join("; ")));
        }

        match decoded.data {
            Some(Value::Null) | None => Err(ClientError::MissingData),
            Some(data) => Ok(data),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::Router;
    use axum::http::HeaderMap as AxumHeaderMap;
    use axum::response::{IntoResponse, Response};
    use axum::routing::post;

    pub(crate) async fn start_server(router: Router) -> (String, tokio::task::JoinHandle<()>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        (format!("http://{addr}"), task)
    }

    fn client_for(server: &str, token: Option<&str>) -> DataHubClient {
        let config = ClientConfig::from_lookup(
            |name| match name {
                "DATAHUB_GMS_URL" => Some(server.to_string()),
                "DATAHUB_GMS_TOKEN" => token.map(str::to_string),
                _ => None,
            },
            None,
            ClientMode::Sdk,
            "mcp-server-datahub/test",
        )
        .expect("config");
        DataHubClient::new(config).expect("client")
    }

    fn header(headers: &AxumHeaderMap, name: &str) -> String {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string()
    }

    #[tokio::test]
    async fn graphql_sends_identity_headers_and_returns_data() {
        async fn handler(
            headers: AxumHeaderMap,
            axum::Json(body): axum::Json<Value>,
        ) -> axum::Json<Value> {
            axum::Json(serde_json::json!({
                "data": {
                    "authorization": header(&headers, "authorization"),
                    "userAgent": header(&headers, "user-agent"),
                    "mode": header(&headers, "x-datahub-client-mode"),
                    "urn": body["variables"]["urn"],
                }
            }))
        }

        let router = Router::new().route("/api/graphql", post(handler));
        let (url, server_task) = start_server(router).await;

        let client = client_for(&url, Some("secret"));
        let data = client
            .graphql("query { me }", serde_json::json!({ "urn": "urn:li:corpuser:datahub" }))
            .await
            .expect("graphql should succeed");

        assert_eq!(data["authorization"], "Bearer secret");
        assert_eq!(data["userAgent"], "mcp-server-datahub/test");
        assert_eq!(data["mode"], "SDK");
        assert_eq!(data["urn"], "urn:li:corpuser:datahub");

        server_task.abort();
    }

    #[tokio::test]
    async fn graphql_errors_are_joined() {
        async fn handler() -> axum::Json<Value> {
            axum::Json(serde_json::json!({
                "data": null,
                "errors": [{ "message": "first" }, { "message": "second" }]
            }))
        }

        let router = Router::new().route("/api/graphql", post(handler));
        let (url, server_task) = start_server(router).await;

        let err = client_for(&url, None)
            .graphql("query { me }", Value::Null)
            .await
            .expect_err("errors should fail");
        assert!(matches!(err, ClientError::GraphQl(ref message) if message == "first; second"));

        server_task.abort();
    }

    #[tokio::test]
    async fn non_success_status_is_reported() {
        async fn handler() -> Response {
            (StatusCode::UNAUTHORIZED, "token expired\n").into_response()
        }

        let router = Router::new().route("/api/graphql", post(handler));
        let (url, server_task) = start_server(router).await;

        let err = client_for(&url, None)
            .graphql("query { me }", Value::Null)
            .await
            .expect_err("401 should fail");
        assert!(matches!(
            err,
            ClientError::Status {
                status: StatusCode::UNAUTHORIZED,
                ..
            }
        ));
        assert!(err.to_string().contains("token expired"));

        server_task.abort();
    }

    #[tokio::test]
    async fn missing_data_is_an_error() {
        async fn handler() -> axum::Json<Value> {
            axum::Json(serde_json::json!({}))
        }

        let router = Router::new().route("/api/graphql", post(handler));
        let (url, server_task) = start_server(router).await;

        let err = client_for(&url, None)
            .graphql("query { me }", Value::Null)
            .await
            .expect_err("empty body should fail");
        assert!(matches!(err, ClientError::MissingData));

        server_task.abort();
    }
}
