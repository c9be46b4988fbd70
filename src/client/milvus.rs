//! Milvus RESTful API v2 Client
//!
//! This module implements [`AdminClient`] over the Milvus HTTP API.
//!
//! # Wire Format
//! - Every call is `POST {uri}/v2/vectordb/{resource}/{action}` with a JSON body
//! - Responses are `{"code": 0, "data": ...}` on success
//! - A non-zero `code` is a server-side rejection and carries a `message`
//!
//! # Implementation Notes
//! - Uses `reqwest` (async, rustls)
//! - Authentication is a bearer header: the token, or `user:password`
//! - The session database is sent as `dbName` on every database-scoped call
//! - `use_database` only switches the session database; the API itself is stateless
//! - Property values are strings on the way out; scalars are stringified on the way in

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

use crate::client::{
    AdminClient, CollectionInfo, ConnectionDescriptor, Connector, CreateCollectionRequest,
    DatabaseInfo, Properties, SchemaSource,
};
use crate::error::{MilvusError, Result};

const API_PREFIX: &str = "v2/vectordb";

/// Server-side deadline in seconds, honoured by the Milvus proxy
const REQUEST_TIMEOUT: &str = "request-timeout";

/// Opens REST sessions against a Milvus server
#[derive(Debug, Clone, Default)]
pub struct MilvusConnector {
    timeout: Option<Duration>,
}

impl MilvusConnector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a per-request timeout, enforced by the HTTP transport
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl Connector for MilvusConnector {
    type Client = MilvusClient;

    async fn connect(&self, descriptor: &ConnectionDescriptor) -> Result<MilvusClient> {
        let client = MilvusClient::build(descriptor, self.timeout)?;

        // Handshake: the client is only handed out once the server accepted a call
        client.list_databases().await.map_err(MilvusError::authentication_caused_by)?;

        debug!(uri = %client.base_url, database = %client.database, "Connected to Milvus");
        Ok(client)
    }
}

/// REST session with a Milvus server
#[derive(Debug)]
pub struct MilvusClient {
    http: Client,
    base_url: String,
    database: String,
}

impl MilvusClient {
    fn build(descriptor: &ConnectionDescriptor, timeout: Option<Duration>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(bearer) = descriptor.bearer()? {
            let mut value = HeaderValue::from_str(&format!("Bearer {bearer}"))
                .map_err(MilvusError::authentication_caused_by)?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        if let Some(timeout) = timeout {
            headers.insert(REQUEST_TIMEOUT, HeaderValue::from(timeout.as_secs().max(1)));
        }

        let mut builder = Client::builder().default_headers(headers);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(MilvusError::authentication_caused_by)?;

        Ok(Self {
            http,
            base_url: descriptor.uri.trim_end_matches('/').to_string(),
            database: descriptor.database().to_string(),
        })
    }

    fn target<'a>(&'a self, db_name: Option<&'a str>) -> &'a str {
        db_name.unwrap_or(&self.database)
    }

    /// Issue one API call and unwrap the response envelope
    async fn call<T: DeserializeOwned>(
        &self,
        operation: &str,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<Option<T>> {
        let url = format!("{}/{API_PREFIX}/{path}", self.base_url);

        let response = self.http.post(&url).json(body).send().await.map_err(|e| {
            let kind = if e.is_timeout() {
                "timeout"
            } else if e.is_connect() {
                "connection"
            } else {
                "request"
            };
            MilvusError::transport(operation, format!("{kind} failure: {e}"))
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| MilvusError::transport(operation, format!("failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(MilvusError::rejected(operation, i64::from(status.as_u16()), text));
        }

        parse_envelope(operation, &text)
    }

    /// Call that must return a `data` payload
    async fn fetch<T: DeserializeOwned>(
        &self,
        operation: &str,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T> {
        self.call(operation, path, body)
            .await?
            .ok_or_else(|| MilvusError::transport(operation, "malformed response: missing data"))
    }

    /// Call whose `data` payload is ignored
    async fn execute(&self, operation: &str, path: &str, body: &serde_json::Value) -> Result<()> {
        self.call::<serde_json::Value>(operation, path, body).await.map(|_| ())
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    code: i64,
    message: Option<String>,
    data: Option<T>,
}

/// Decode the `{code, message, data}` envelope
fn parse_envelope<T: DeserializeOwned>(operation: &str, text: &str) -> Result<Option<T>> {
    let envelope: ApiResponse<T> = serde_json::from_str(text)
        .map_err(|e| MilvusError::transport(operation, format!("malformed response: {e}")))?;

    if envelope.code != 0 {
        let message = envelope.message.unwrap_or_else(|| "request rejected".to_string());
        return Err(MilvusError::rejected(operation, envelope.code, message));
    }

    Ok(envelope.data)
}

/// Properties arrive as `[{"key": .., "value": ..}]` or as a plain object
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireProperties {
    List(Vec<WireProperty>),
    Map(BTreeMap<String, serde_json::Value>),
}

#[derive(Debug, Deserialize)]
struct WireProperty {
    key: String,
    value: serde_json::Value,
}

impl Default for WireProperties {
    fn default() -> Self {
        Self::Map(BTreeMap::new())
    }
}

impl From<WireProperties> for Properties {
    fn from(wire: WireProperties) -> Self {
        match wire {
            WireProperties::List(list) => {
                list.into_iter().map(|p| (p.key, scalar_text(p.value))).collect()
            }
            WireProperties::Map(map) => map.into_iter().map(|(k, v)| (k, scalar_text(v))).collect(),
        }
    }
}

fn scalar_text(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescribeDatabaseData {
    db_name: String,
    #[serde(default)]
    properties: WireProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescribeCollectionData {
    collection_name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    fields: Vec<serde_json::Value>,
    #[serde(default)]
    shards_num: Option<u32>,
    #[serde(default)]
    partitions_num: Option<u32>,
    #[serde(default)]
    consistency_level: Option<String>,
    #[serde(default)]
    enable_dynamic_field: Option<bool>,
    #[serde(default)]
    auto_id: Option<bool>,
    #[serde(default)]
    properties: WireProperties,
}

impl From<DescribeCollectionData> for CollectionInfo {
    fn from(data: DescribeCollectionData) -> Self {
        Self {
            collection_name: data.collection_name,
            description: data.description,
            fields: data.fields,
            num_shards: data.shards_num,
            num_partitions: data.partitions_num,
            consistency_level: data.consistency_level,
            enable_dynamic_field: data.enable_dynamic_field,
            auto_id: data.auto_id,
            properties: data.properties.into(),
        }
    }
}

/// Body of `collections/create`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateCollectionBody<'a> {
    db_name: &'a str,
    collection_name: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    description: &'a str,
    metric_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimension: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    id_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    auto_id: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    primary_field_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    vector_field_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    schema: Option<&'a serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    index_params: Option<&'a [serde_json::Value]>,
    params: serde_json::Map<String, serde_json::Value>,
}

fn create_collection_body<'a>(
    db_name: &'a str,
    request: &'a CreateCollectionRequest,
) -> CreateCollectionBody<'a> {
    // Rendered request fields take precedence over same-named user properties
    let mut params: serde_json::Map<String, serde_json::Value> =
        request.properties.iter().map(|(key, value)| (key.clone(), json!(value))).collect();
    params.insert("enableDynamicField".to_string(), json!(request.enable_dynamic_field));
    params.insert("shardsNum".to_string(), json!(request.num_shards));
    if let Some(partitions) = request.num_partitions {
        params.insert("partitionsNum".to_string(), json!(partitions));
    }
    if let Some(level) = request.consistency_level {
        params.insert("consistencyLevel".to_string(), json!(level.as_str()));
    }

    let mut body = CreateCollectionBody {
        db_name,
        collection_name: &request.collection_name,
        description: &request.description,
        metric_type: request.metric_type.as_str(),
        dimension: None,
        id_type: None,
        auto_id: None,
        primary_field_name: None,
        vector_field_name: None,
        schema: None,
        index_params: None,
        params,
    };

    match &request.schema {
        SchemaSource::Default(schema) => {
            body.dimension = Some(schema.dimension);
            body.id_type = Some(schema.id_type.as_str());
            body.auto_id = Some(schema.auto_id);
            body.primary_field_name = Some(schema.primary_field_name.as_str());
            body.vector_field_name = Some(schema.vector_field_name.as_str());
            body.params.insert("max_length".to_string(), json!(schema.max_length));
        }
        SchemaSource::Custom { schema, index_params } => {
            body.schema = Some(schema);
            if !index_params.is_empty() {
                body.index_params = Some(index_params.as_slice());
            }
        }
    }

    body
}

impl AdminClient for MilvusClient {
    fn current_database(&self) -> &str {
        &self.database
    }

    async fn create_database(&self, name: &str, properties: &Properties) -> Result<()> {
        let body = json!({ "dbName": name, "properties": properties });
        self.execute("create_database", "databases/create", &body).await
    }

    async fn describe_database(&self, name: &str) -> Result<DatabaseInfo> {
        let body = json!({ "dbName": name });
        let data: DescribeDatabaseData =
            self.fetch("describe_database", "databases/describe", &body).await?;
        Ok(DatabaseInfo { name: data.db_name, properties: data.properties.into() })
    }

    async fn list_databases(&self) -> Result<Vec<String>> {
        self.fetch("list_databases", "databases/list", &json!({})).await
    }

    async fn drop_database(&self, name: &str) -> Result<()> {
        let body = json!({ "dbName": name });
        self.execute("drop_database", "databases/drop", &body).await
    }

    async fn alter_database_properties(&self, name: &str, properties: &Properties) -> Result<()> {
        let body = json!({ "dbName": name, "properties": properties });
        self.execute("alter_database_properties", "databases/alter", &body).await
    }

    async fn drop_database_properties(&self, name: &str, keys: &[String]) -> Result<()> {
        let body = json!({ "dbName": name, "propertyKeys": keys });
        self.execute("drop_database_properties", "databases/drop_properties", &body).await
    }

    async fn use_database(&mut self, name: &str) -> Result<()> {
        debug!(from = %self.database, to = %name, "Switching session database");
        self.database = name.to_string();
        Ok(())
    }

    async fn create_collection(
        &self,
        db_name: Option<&str>,
        request: &CreateCollectionRequest,
    ) -> Result<()> {
        let body = serde_json::to_value(create_collection_body(self.target(db_name), request))
            .map_err(|e| MilvusError::transport("create_collection", e.to_string()))?;
        self.execute("create_collection", "collections/create", &body).await
    }

    async fn describe_collection(&self, db_name: Option<&str>, name: &str) -> Result<CollectionInfo> {
        let body = json!({ "dbName": self.target(db_name), "collectionName": name });
        let data: DescribeCollectionData =
            self.fetch("describe_collection", "collections/describe", &body).await?;
        Ok(data.into())
    }

    async fn list_collections(&self, db_name: Option<&str>) -> Result<Vec<String>> {
        let body = json!({ "dbName": self.target(db_name) });
        self.fetch("list_collections", "collections/list", &body).await
    }

    async fn drop_collection(&self, db_name: Option<&str>, name: &str) -> Result<()> {
        let body = json!({ "dbName": self.target(db_name), "collectionName": name });
        self.execute("drop_collection", "collections/drop", &body).await
    }

    async fn alter_collection_properties(
        &self,
        db_name: Option<&str>,
        name: &str,
        properties: &Properties,
    ) -> Result<()> {
        let body = json!({
            "dbName": self.target(db_name),
            "collectionName": name,
            "properties": properties,
        });
        self.execute("alter_collection_properties", "collections/alter_properties", &body).await
    }

    async fn drop_collection_properties(
        &self,
        db_name: Option<&str>,
        name: &str,
        keys: &[String],
    ) -> Result<()> {
        let body = json!({
            "dbName": self.target(db_name),
            "collectionName": name,
            "propertyKeys": keys,
        });
        self.execute("drop_collection_properties", "collections/drop_properties", &body).await
    }

    async fn close(self) {
        // Dropping the reqwest client releases its connection pool
        debug!(uri = %self.base_url, "Closing Milvus session");
    }
}
