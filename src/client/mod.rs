//! Administrative Client Traits and Core Types
//!
//! This module defines the seam between the operation executor and a Milvus server.
//! A [`Connector`] turns a [`ConnectionDescriptor`] into a live [`AdminClient`] handle;
//! the handle exposes one method per administrative call.
//!
//! # Handle Lifecycle
//! Handles are created per operation invocation and closed by the executor on every
//! exit path. Nothing is cached between invocations; the server is the sole source
//! of truth for database and collection state.
//!
//! # Backends
//! - [`milvus`] - Milvus RESTful API v2 over HTTP (feature `rest`)
//! - [`memory`] - In-process server with the same semantics, used for tests

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;

use crate::error::{MilvusError, Result};
use crate::render::{render_opt, render_required, renderable_enum, Property, RenderContext};

#[cfg(feature = "rest")]
pub mod milvus;

pub mod memory;

/// Number of replicas for the database
pub const DATABASE_REPLICA_NUMBER: &str = "database.replica.number";
/// Resource groups dedicated to the database
pub const DATABASE_RESOURCE_GROUPS: &str = "database.resource_groups";
/// Disk quota allocated to the database in megabytes
pub const DATABASE_DISK_QUOTA_MB: &str = "database.diskQuota.mb";
/// Maximum number of collections allowed in the database
pub const DATABASE_MAX_COLLECTIONS: &str = "database.max.collections";
/// Whether to deny all write operations in the database
pub const DATABASE_FORCE_DENY_WRITING: &str = "database.force.deny.writing";
/// Whether to deny all read operations in the database
pub const DATABASE_FORCE_DENY_READING: &str = "database.force.deny.reading";

/// Database property keys documented by Milvus; other keys pass through untouched
pub const DATABASE_PROPERTY_KEYS: [&str; 6] = [
    DATABASE_REPLICA_NUMBER,
    DATABASE_RESOURCE_GROUPS,
    DATABASE_DISK_QUOTA_MB,
    DATABASE_MAX_COLLECTIONS,
    DATABASE_FORCE_DENY_WRITING,
    DATABASE_FORCE_DENY_READING,
];

/// Database the server uses when none is selected
pub const DEFAULT_DATABASE: &str = "default";

/// String-keyed, string-valued property set attached to a database or collection
pub type Properties = BTreeMap<String, String>;

/// Raw connection parameters, possibly templated
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionParams {
    /// Endpoint URI, e.g. `http://localhost:19530`
    pub uri: Property<String>,

    /// Access token (`user:password` or an API key)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<Property<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<Property<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<Property<String>>,

    /// Database selected for the session
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_name: Option<Property<String>>,
}

impl ConnectionParams {
    /// Create parameters for an anonymous connection to `uri`
    pub fn new(uri: impl Into<Property<String>>) -> Self {
        Self { uri: uri.into(), ..Default::default() }
    }

    /// Attach a token
    #[must_use]
    pub fn with_token(mut self, token: impl Into<Property<String>>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Attach basic credentials
    #[must_use]
    pub fn with_credentials(
        mut self,
        username: impl Into<Property<String>>,
        password: impl Into<Property<String>>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Select a database for the session
    #[must_use]
    pub fn with_db_name(mut self, db_name: impl Into<Property<String>>) -> Self {
        self.db_name = Some(db_name.into());
        self
    }

    /// Render into a concrete descriptor
    ///
    /// Only `uri` is required. Optional fields that render blank are dropped, so
    /// callers never need empty placeholders.
    pub fn render(&self, ctx: &RenderContext) -> Result<ConnectionDescriptor> {
        Ok(ConnectionDescriptor {
            uri: render_required(&self.uri, ctx, "uri")?,
            token: render_opt(self.token.as_ref(), ctx, "token")?,
            username: render_opt(self.username.as_ref(), ctx, "username")?,
            password: render_opt(self.password.as_ref(), ctx, "password")?,
            db_name: render_opt(self.db_name.as_ref(), ctx, "dbName")?,
        })
    }
}

/// Validated, fully rendered connection parameters
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    pub uri: String,
    pub token: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub db_name: Option<String>,
}

impl ConnectionDescriptor {
    /// Create an anonymous descriptor
    pub fn anonymous(uri: impl Into<String>) -> Self {
        Self { uri: uri.into(), token: None, username: None, password: None, db_name: None }
    }

    /// Resolve the bearer credential for this descriptor
    ///
    /// A token wins over basic credentials. Username and password must be supplied
    /// together; a lone half is an authentication failure, never an anonymous session.
    pub fn bearer(&self) -> Result<Option<String>> {
        let basic = match (&self.username, &self.password) {
            (Some(user), Some(password)) => Some(format!("{user}:{password}")),
            (None, None) => None,
            _ => {
                return Err(MilvusError::authentication_caused_by(
                    "username and password must be supplied together",
                ))
            }
        };

        Ok(self.token.clone().or(basic))
    }

    /// Database the session starts in
    #[must_use]
    pub fn database(&self) -> &str {
        self.db_name.as_deref().unwrap_or(DEFAULT_DATABASE)
    }
}

// Secrets never reach logs through Debug
impl std::fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("uri", &self.uri)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("db_name", &self.db_name)
            .finish()
    }
}

/// Similarity function of a collection's vector field
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricType {
    L2,
    #[default]
    IP,
    COSINE,
}

impl MetricType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::L2 => "L2",
            Self::IP => "IP",
            Self::COSINE => "COSINE",
        }
    }
}

impl std::str::FromStr for MetricType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "L2" => Ok(Self::L2),
            "IP" | "INNER_PRODUCT" => Ok(Self::IP),
            "COSINE" => Ok(Self::COSINE),
            other => Err(format!("unknown metric type '{other}', expected one of L2, IP, COSINE")),
        }
    }
}

/// Data type of the primary field in a default-schema collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    #[default]
    Int64,
    VarChar,
}

impl DataType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Int64 => "Int64",
            Self::VarChar => "VarChar",
        }
    }
}

impl std::str::FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "int64" => Ok(Self::Int64),
            "varchar" => Ok(Self::VarChar),
            other => Err(format!("unknown primary field type '{other}', expected Int64 or VarChar")),
        }
    }
}

/// Consistency level applied to searches and queries lacking their own
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsistencyLevel {
    Strong,
    Session,
    Bounded,
    Eventually,
}

impl ConsistencyLevel {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Strong => "Strong",
            Self::Session => "Session",
            Self::Bounded => "Bounded",
            Self::Eventually => "Eventually",
        }
    }
}

impl std::str::FromStr for ConsistencyLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "strong" => Ok(Self::Strong),
            "session" => Ok(Self::Session),
            "bounded" => Ok(Self::Bounded),
            "eventually" => Ok(Self::Eventually),
            other => Err(format!(
                "unknown consistency level '{other}', expected Strong, Session, Bounded or Eventually"
            )),
        }
    }
}

renderable_enum!(MetricType, DataType, ConsistencyLevel);

/// Authoritative database state as reported by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseInfo {
    pub name: String,
    pub properties: Properties,
}

/// Convenience fields for a collection created without a custom schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultSchema {
    pub dimension: u32,
    pub primary_field_name: String,
    pub id_type: DataType,
    pub max_length: u32,
    pub vector_field_name: String,
    pub auto_id: bool,
}

/// How a collection's fields are defined
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaSource {
    /// Primary field plus one float vector field, built by the server
    Default(DefaultSchema),
    /// Caller-supplied schema object and optional index parameters, passed through opaquely
    Custom { schema: serde_json::Value, index_params: Vec<serde_json::Value> },
}

/// Fully rendered collection creation request
#[derive(Debug, Clone, PartialEq)]
pub struct CreateCollectionRequest {
    pub collection_name: String,
    pub description: String,
    pub schema: SchemaSource,
    pub metric_type: MetricType,
    pub enable_dynamic_field: bool,
    pub num_shards: u32,
    pub num_partitions: Option<u32>,
    pub consistency_level: Option<ConsistencyLevel>,
    pub properties: Properties,
}

/// Authoritative collection state as reported by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionInfo {
    pub collection_name: String,

    #[serde(default)]
    pub description: String,

    /// Field definitions as reported by the server
    #[serde(default)]
    pub fields: Vec<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_shards: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_partitions: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consistency_level: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_dynamic_field: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_id: Option<bool>,

    #[serde(default)]
    pub properties: Properties,
}

/// A live session with a Milvus server
///
/// Every call either succeeds or fails with `MilvusError::Transport`. Collection calls
/// take an optional database override; `None` targets the session's current database.
pub trait AdminClient: Send + Sync {
    /// Database the session currently targets
    fn current_database(&self) -> &str;

    fn create_database(
        &self,
        name: &str,
        properties: &Properties,
    ) -> impl Future<Output = Result<()>> + Send;

    fn describe_database(&self, name: &str) -> impl Future<Output = Result<DatabaseInfo>> + Send;

    fn list_databases(&self) -> impl Future<Output = Result<Vec<String>>> + Send;

    fn drop_database(&self, name: &str) -> impl Future<Output = Result<()>> + Send;

    /// Set the listed keys; keys not in `properties` are left untouched
    fn alter_database_properties(
        &self,
        name: &str,
        properties: &Properties,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Reset the listed keys to server defaults
    fn drop_database_properties(
        &self,
        name: &str,
        keys: &[String],
    ) -> impl Future<Output = Result<()>> + Send;

    /// Switch the session to another database
    fn use_database(&mut self, name: &str) -> impl Future<Output = Result<()>> + Send;

    fn create_collection(
        &self,
        db_name: Option<&str>,
        request: &CreateCollectionRequest,
    ) -> impl Future<Output = Result<()>> + Send;

    fn describe_collection(
        &self,
        db_name: Option<&str>,
        name: &str,
    ) -> impl Future<Output = Result<CollectionInfo>> + Send;

    fn list_collections(
        &self,
        db_name: Option<&str>,
    ) -> impl Future<Output = Result<Vec<String>>> + Send;

    fn drop_collection(
        &self,
        db_name: Option<&str>,
        name: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    fn alter_collection_properties(
        &self,
        db_name: Option<&str>,
        name: &str,
        properties: &Properties,
    ) -> impl Future<Output = Result<()>> + Send;

    fn drop_collection_properties(
        &self,
        db_name: Option<&str>,
        name: &str,
        keys: &[String],
    ) -> impl Future<Output = Result<()>> + Send;

    /// Release the session
    fn close(self) -> impl Future<Output = ()> + Send;
}

/// Opens [`AdminClient`] sessions
pub trait Connector: Send + Sync {
    type Client: AdminClient;

    /// Establish a session
    ///
    /// Every failure, whatever its cause, is reported as `MilvusError::Authentication`.
    fn connect(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> impl Future<Output = Result<Self::Client>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_anonymous_connection() {
        let params = ConnectionParams::new("http://localhost:19530");
        let descriptor = params.render(&RenderContext::new()).unwrap();

        assert_eq!(descriptor.uri, "http://localhost:19530");
        assert_eq!(descriptor.bearer().unwrap(), None);
        assert_eq!(descriptor.database(), DEFAULT_DATABASE);
    }

    #[test]
    fn test_blank_uri_is_validation_error() {
        let params = ConnectionParams::new("  ");
        let err = params.render(&RenderContext::new()).unwrap_err();
        assert!(matches!(err, MilvusError::Validation { ref field, .. } if field == "uri"));
    }

    #[test]
    fn test_blank_optional_fields_are_dropped() {
        let ctx = RenderContext::new().var("token", "");
        let params = ConnectionParams::new("http://localhost:19530")
            .with_token(Property::<String>::template("{{ token }}"));
        let descriptor = params.render(&ctx).unwrap();
        assert!(descriptor.token.is_none());
    }

    #[test]
    fn test_token_wins_over_credentials() {
        let mut descriptor = ConnectionDescriptor::anonymous("http://localhost:19530");
        descriptor.token = Some("api-key".to_string());
        descriptor.username = Some("root".to_string());
        descriptor.password = Some("Milvus".to_string());
        assert_eq!(descriptor.bearer().unwrap().as_deref(), Some("api-key"));
    }

    #[test]
    fn test_basic_credentials_become_bearer_pair() {
        let mut descriptor = ConnectionDescriptor::anonymous("http://localhost:19530");
        descriptor.username = Some("root".to_string());
        descriptor.password = Some("Milvus".to_string());
        assert_eq!(descriptor.bearer().unwrap().as_deref(), Some("root:Milvus"));
    }

    #[test]
    fn test_partial_credentials_fail_authentication() {
        let mut descriptor = ConnectionDescriptor::anonymous("http://localhost:19530");
        descriptor.username = Some("root".to_string());
        let err = descriptor.bearer().unwrap_err();
        assert_eq!(err.error_code(), "AUTHENTICATION_ERROR");

        let mut descriptor = ConnectionDescriptor::anonymous("http://localhost:19530");
        descriptor.password = Some("Milvus".to_string());
        assert!(matches!(descriptor.bearer(), Err(MilvusError::Authentication { .. })));
    }

    #[test]
    fn test_token_does_not_mask_partial_credentials() {
        let mut descriptor = ConnectionDescriptor::anonymous("http://localhost:19530");
        descriptor.token = Some("api-key".to_string());
        descriptor.password = Some("Milvus".to_string());
        assert!(matches!(descriptor.bearer(), Err(MilvusError::Authentication { .. })));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut descriptor = ConnectionDescriptor::anonymous("http://localhost:19530");
        descriptor.token = Some("super-secret".to_string());
        descriptor.username = Some("root".to_string());
        descriptor.password = Some("hunter2".to_string());

        let debug = format!("{descriptor:?}");
        assert!(!debug.contains("super-secret"));
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("root"));
    }

    #[test]
    fn test_enum_parsing() {
        assert_eq!("cosine".parse::<MetricType>().unwrap(), MetricType::COSINE);
        assert_eq!("ip".parse::<MetricType>().unwrap(), MetricType::IP);
        assert!("hamming".parse::<MetricType>().is_err());

        assert_eq!("VARCHAR".parse::<DataType>().unwrap(), DataType::VarChar);
        assert_eq!("bounded".parse::<ConsistencyLevel>().unwrap(), ConsistencyLevel::Bounded);
    }

    #[test]
    fn test_enum_defaults() {
        assert_eq!(MetricType::default(), MetricType::IP);
        assert_eq!(DataType::default(), DataType::Int64);
    }
}
