use rmcp::ErrorData as McpError;
use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, Content, Implementation, ServerCapabilities, ServerInfo};
use rmcp::{ServerHandler, tool, tool_handler, tool_router};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

use crate::client::{ClientError, DataHubClient};

pub const SERVER_NAME: &str = "mcp-server-datahub";
pub const DEFAULT_SEARCH_RESULTS: u32 = 10;
pub const MAX_SEARCH_RESULTS: u32 = 50;
pub const MAX_LINEAGE_HOPS: u32 = 3;

const SEARCH_QUERY: &str = r#"
query search($input: SearchAcrossEntitiesInput!) {
  searchAcrossEntities(input: $input) {
    start
    count
    total
    searchResults {
      entity {
        urn
        type
        ...EntityPreview
      }
    }
  }
}
"#;

const ENTITY_QUERY: &str = r#"
query getEntity($urn: String!) {
  entity(urn: $urn) {
    urn
    type
    ...EntityPreview
  }
}
"#;

const LINEAGE_QUERY: &str = r#"
query getLineage($input: SearchAcrossLineageInput!) {
  searchAcrossLineage(input: $input) {
    start
    count
    total
    searchResults {
      degree
      entity {
        urn
        type
        ...EntityPreview
      }
    }
  }
}
"#;

const ENTITY_PREVIEW_FRAGMENT: &str = r#"
fragment EntityPreview on Entity {
  ... on Dataset {
    name
    platform { name }
    properties { name description }
  }
  ... on Dashboard {
    properties { name description }
  }
  ... on Chart {
    properties { name description }
  }
  ... on DataJob {
    properties { name description }
  }
}
"#;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SearchInput {
    /// Free-text query. Use `*` to match every entity.
    pub query: String,
    /// Restrict results to these entity types, e.g. `DATASET` or `DASHBOARD`.
    #[serde(default)]
    pub entity_types: Option<Vec<String>>,
    /// Number of results to return (1-50, default 10).
    #[serde(default)]
    pub num_results: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GetEntityInput {
    /// Entity URN, e.g. `urn:li:dataset:(urn:li:dataPlatform:snowflake,db.table,PROD)`.
    pub urn: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GetLineageInput {
    pub urn: String,
    /// Walk upstream when true, downstream otherwise.
    pub upstream: bool,
    /// Number of hops to follow (1-3, default 1).
    #[serde(default)]
    pub max_hops: Option<u32>,
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Client(#[from] ClientError),
}

#[derive(Clone)]
pub struct DataHubServer {
    client: DataHubClient,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl DataHubServer {
    pub fn new(client: DataHubClient) -> Self {
        Self {
            client,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(
        name = "search",
        description = "Search DataHub for datasets, dashboards, charts and other entities by keyword."
    )]
    async fn search(
        &self,
        Parameters(input): Parameters<SearchInput>,
    ) -> Result<CallToolResult, McpError> {
        Ok(into_tool_result(self.search_impl(input).await))
    }

    #[tool(
        name = "get_entity",
        description = "Fetch metadata for a single DataHub entity by URN."
    )]
    async fn get_entity(
        &self,
        Parameters(input): Parameters<GetEntityInput>,
    ) -> Result<CallToolResult, McpError> {
        Ok(into_tool_result(self.get_entity_impl(input).await))
    }

    #[tool(
        name = "get_lineage",
        description = "List upstream or downstream lineage of a DataHub entity."
    )]
    async fn get_lineage(
        &self,
        Parameters(input): Parameters<GetLineageInput>,
    ) -> Result<CallToolResult, McpError> {
        Ok(into_tool_result(self.get_lineage_impl(input).await))
    }
}

impl DataHubServer {
    async fn search_impl(&self, input: SearchInput) -> Result<Value, ToolError> {
        let variables = search_variables(input)?;
        let data = self
            .client
            .graphql(&with_fragment(SEARCH_QUERY), variables)
            .await?;
        Ok(data["searchAcrossEntities"].clone())
    }

    async fn get_entity_impl(&self, input: GetEntityInput) -> Result<Value, ToolError> {
        let urn = non_empty("urn", &input.urn)?;
        let data = self
            .client
            .graphql(&with_fragment(ENTITY_QUERY), json!({ "urn": urn }))
            .await?;
        match &data["entity"] {
            Value::Null => Err(ToolError::InvalidInput(format!("entity not found: {urn}"))),
            entity => Ok(entity.clone()),
        }
    }

    async fn get_lineage_impl(&self, input: GetLineageInput) -> Result<Value, ToolError> {
        let urn = non_empty("urn", &input.urn)?;
        let direction = if input.upstream {
            "UPSTREAM"
        } else {
            "DOWNSTREAM"
        };
        let variables = json!({
            "input": {
                "urn": urn,
                "direction": direction,
                "query": "*",
                "start": 0,
                "count": MAX_SEARCH_RESULTS,
                "orFilters": [{
                    "and": [{
                        "field": "degree",
                        "condition": "EQUAL",
                        "values": degree_values(input.max_hops),
                    }]
                }],
            }
        });

        let data = self
            .client
            .graphql(&with_fragment(LINEAGE_QUERY), variables)
            .await?;
        Ok(data["searchAcrossLineage"].clone())
    }
}

#[tool_handler]
impl ServerHandler for DataHubServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: SERVER_NAME.to_string(),
                title: Some("DataHub MCP Server".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                description: Some(
                    "Search and explore DataHub metadata: entities, schemas and lineage."
                        .to_string(),
                ),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Use search to find entities, then get_entity and get_lineage with the returned URNs."
                    .to_string(),
            ),
            ..Default::default()
        }
    }
}

fn into_tool_result(result: Result<Value, ToolError>) -> CallToolResult {
    match result {
        Ok(value) => {
            let text = serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string());
            CallToolResult::success(vec![Content::text(text)])
        }
        Err(error) => {
            tracing::warn!(error = %error, "tool call failed");
            CallToolResult::error(vec![Content::text(error.to_string())])
        }
    }
}

fn search_variables(input: SearchInput) -> Result<Value, ToolError> {
    let query = non_empty("query", &input.query)?;
    let mut search = json!({
        "query": query,
        "start": 0,
        "count": clamp_results(input.num_results),
    });
    if let Some(types) = input.entity_types.filter(|types| !types.is_empty()) {
        search["types"] = json!(types);
    }
    Ok(json!({ "input": search }))
}

fn with_fragment(query: &str) -> String {
    format!("{query}{ENTITY_PREVIEW_FRAGMENT}")
}

fn non_empty<'a>(field: &str, value: &'a str) -> Result<&'a str, ToolError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ToolError::InvalidInput(format!("{field} must not be empty")));
    }
    Ok(trimmed)
}

fn clamp_results(requested: Option<u32>) -> u32 {
    requested
        .unwrap_or(DEFAULT_SEARCH_RESULTS)
        .clamp(1, MAX_SEARCH_RESULTS)
}

/// GMS buckets lineage distance as `1`, `2` and `3+`.
fn degree_values(max_hops: Option<u32>) -> Vec<&'static str> {
    let hops = max_hops.unwrap_or(1).clamp(1, MAX_LINEAGE_HOPS);
    ["1", "2", "3+"].into_iter().take(hops as usize).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_count_is_clamped() {
        assert_eq!(clamp_results(None), DEFAULT_SEARCH_RESULTS);
        assert_eq!(clamp_results(Some(0)), 1);
        assert_eq!(clamp_results(Some(25)), 25);
        assert_eq!(clamp_results(Some(500)), MAX_SEARCH_RESULTS);
    }

    #[test]
    fn entity_types_become_the_types_variable() {
        let input: SearchInput = serde_json::from_value(json!({
            "query": " orders ",
            "entity_types": ["DATASET", "DASHBOARD"],
            "num_results": 80,
        }))
        .expect("search input");
        let variables = search_variables(input).expect("variables");

        assert_eq!(variables["input"]["query"], "orders");
        assert_eq!(variables["input"]["types"], json!(["DATASET", "DASHBOARD"]));
        assert_eq!(variables["input"]["count"], MAX_SEARCH_RESULTS);
    }

    #[test]
    fn empty_entity_types_are_omitted() {
        let input: SearchInput =
            serde_json::from_value(json!({ "query": "*", "entity_types": [] }))
                .expect("search input");
        let variables = search_variables(input).expect("variables");

        assert!(variables["input"].get("types").is_none());
        assert_eq!(variables["input"]["count"], DEFAULT_SEARCH_RESULTS);
    }

    #[test]
    fn lineage_degrees_follow_hop_count() {
        assert_eq!(degree_values(None), vec!["1"]);
        assert_eq!(degree_values(Some(2)), vec!["1", "2"]);
        assert_eq!(degree_values(Some(9)), vec!["1", "2", "3+"]);
        assert_eq!(degree_values(Some(0)), vec!["1"]);
    }

    #[test]
    fn blank_inputs_are_rejected() {
        let err = non_empty("urn", "   ").expect_err("blank urn");
        assert_eq!(err.to_string(), "invalid input: urn must not be empty");
        assert_eq!(non_empty("query", " orders ").expect("query"), "orders");
    }

    #[test]
    fn failures_become_error_results() {
        let result = into_tool_result(Err(ToolError::InvalidInput("nope".to_string())));
        assert_eq!(result.is_error, Some(true));

        let result = into_tool_result(Ok(json!({ "urn": "urn:li:corpuser:datahub" })));
        assert_eq!(result.is_error, Some(false));
    }

    #[test]
    fn queries_carry_the_preview_fragment() {
        let query = with_fragment(SEARCH_QUERY);
        assert!(query.contains("searchAcrossEntities"));
        assert!(query.contains("fragment EntityPreview on Entity"));
    }
}
