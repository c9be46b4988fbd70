//! In-Memory Milvus Server
//!
//! An in-process [`Connector`] with the administrative semantics of a Milvus server:
//! a `default` database that cannot be dropped, name uniqueness, property merge and
//! reset, and "database not empty" protection on drop.
//!
//! It also records how many handles were opened and explicitly closed, and accepts
//! one-shot [`Fault`]s so failure paths can be exercised without a live server.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::json;
use tracing::debug;

use crate::client::{
    AdminClient, CollectionInfo, ConnectionDescriptor, Connector, CreateCollectionRequest,
    DataType, DatabaseInfo, Properties, SchemaSource, DEFAULT_DATABASE,
};
use crate::error::{MilvusError, Result};

const DATABASE_NOT_FOUND: i64 = 800;
const COLLECTION_NOT_FOUND: i64 = 100;
const ILLEGAL_ARGUMENT: i64 = 1100;
const INJECTED_FAILURE: i64 = 65535;

/// An administrative call, used to target injected faults
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    CreateDatabase,
    DescribeDatabase,
    ListDatabases,
    DropDatabase,
    AlterDatabaseProperties,
    DropDatabaseProperties,
    UseDatabase,
    CreateCollection,
    DescribeCollection,
    ListCollections,
    DropCollection,
    AlterCollectionProperties,
    DropCollectionProperties,
}

/// One-shot misbehaviour applied to the next matching call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The call fails with a transport error
    Fail(Call),
    /// The call reports success without changing any state
    Ignore(Call),
}

#[derive(Debug, Default)]
struct DatabaseState {
    properties: Properties,
    collections: BTreeMap<String, CollectionInfo>,
}

#[derive(Debug)]
struct ServerState {
    databases: BTreeMap<String, DatabaseState>,
    faults: Vec<Fault>,
}

#[derive(Debug, Default)]
struct HandleStats {
    opened: AtomicUsize,
    closed: AtomicUsize,
}

/// Shared in-memory server; clones observe the same state
#[derive(Debug, Clone)]
pub struct MemoryServer {
    state: Arc<Mutex<ServerState>>,
    stats: Arc<HandleStats>,
    required_bearer: Option<String>,
    reachable: bool,
}

impl Default for MemoryServer {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryServer {
    /// Create a server holding only the `default` database, open to anonymous sessions
    #[must_use]
    pub fn new() -> Self {
        let mut databases = BTreeMap::new();
        databases.insert(DEFAULT_DATABASE.to_string(), DatabaseState::default());

        Self {
            state: Arc::new(Mutex::new(ServerState { databases, faults: Vec::new() })),
            stats: Arc::new(HandleStats::default()),
            required_bearer: None,
            reachable: true,
        }
    }

    /// Require every session to present this bearer credential (`token` or `user:password`)
    #[must_use]
    pub fn with_required_bearer(mut self, bearer: impl Into<String>) -> Self {
        self.required_bearer = Some(bearer.into());
        self
    }

    /// Make every connection attempt fail as if the host were down
    #[must_use]
    pub fn unreachable(mut self) -> Self {
        self.reachable = false;
        self
    }

    /// Queue a one-shot fault
    pub fn inject(&self, fault: Fault) {
        self.lock().faults.push(fault);
    }

    /// Number of sessions opened so far
    #[must_use]
    pub fn opened_handles(&self) -> usize {
        self.stats.opened.load(Ordering::SeqCst)
    }

    /// Number of sessions explicitly closed so far
    #[must_use]
    pub fn closed_handles(&self) -> usize {
        self.stats.closed.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Connector for MemoryServer {
    type Client = MemoryClient;

    async fn connect(&self, descriptor: &ConnectionDescriptor) -> Result<MemoryClient> {
        let bearer = descriptor.bearer()?;

        if !self.reachable {
            return Err(MilvusError::authentication_caused_by(format!(
                "connection refused: {}",
                descriptor.uri
            )));
        }

        if let Some(required) = &self.required_bearer {
            if bearer.as_deref() != Some(required.as_str()) {
                return Err(MilvusError::authentication_caused_by("invalid credentials"));
            }
        }

        let database = descriptor.database().to_string();
        if !self.lock().databases.contains_key(&database) {
            return Err(MilvusError::authentication_caused_by(format!(
                "database not found[database={database}]"
            )));
        }

        self.stats.opened.fetch_add(1, Ordering::SeqCst);
        debug!(database = %database, "Opened in-memory session");

        Ok(MemoryClient { server: self.clone(), database })
    }
}

/// Session against a [`MemoryServer`]
#[derive(Debug)]
pub struct MemoryClient {
    server: MemoryServer,
    database: String,
}

impl MemoryClient {
    /// Consume a pending fault for `call`; `Ok(true)` means the call must be ignored
    fn intercept(&self, call: Call, operation: &str) -> Result<bool> {
        let mut state = self.server.lock();
        let Some(position) = state.faults.iter().position(|fault| match fault {
            Fault::Fail(target) | Fault::Ignore(target) => *target == call,
        }) else {
            return Ok(false);
        };

        match state.faults.remove(position) {
            Fault::Fail(_) => {
                Err(MilvusError::rejected(operation, INJECTED_FAILURE, "injected failure"))
            }
            Fault::Ignore(_) => Ok(true),
        }
    }

    fn target<'a>(&'a self, db_name: Option<&'a str>) -> &'a str {
        db_name.unwrap_or(&self.database)
    }
}

fn database_not_found(operation: &str, name: &str) -> MilvusError {
    MilvusError::rejected(operation, DATABASE_NOT_FOUND, format!("database not found[database={name}]"))
}

fn collection_not_found(operation: &str, database: &str, name: &str) -> MilvusError {
    MilvusError::rejected(
        operation,
        COLLECTION_NOT_FOUND,
        format!("collection not found[database={database}][collection={name}]"),
    )
}

fn illegal(operation: &str, message: impl Into<String>) -> MilvusError {
    MilvusError::rejected(operation, ILLEGAL_ARGUMENT, message)
}

fn database_mut<'a>(
    state: &'a mut ServerState,
    operation: &str,
    name: &str,
) -> Result<&'a mut DatabaseState> {
    state.databases.get_mut(name).ok_or_else(|| database_not_found(operation, name))
}

fn collection_mut<'a>(
    state: &'a mut ServerState,
    operation: &str,
    database: &str,
    name: &str,
) -> Result<&'a mut CollectionInfo> {
    database_mut(state, operation, database)?
        .collections
        .get_mut(name)
        .ok_or_else(|| collection_not_found(operation, database, name))
}

/// Build what a server would report for a freshly created collection
fn describe_new_collection(request: &CreateCollectionRequest) -> CollectionInfo {
    let (fields, auto_id) = match &request.schema {
        SchemaSource::Default(schema) => {
            let mut primary = json!({
                "name": schema.primary_field_name,
                "type": schema.id_type.as_str(),
                "primaryKey": true,
                "autoId": schema.auto_id,
            });
            if schema.id_type == DataType::VarChar {
                primary["params"] = json!({ "max_length": schema.max_length });
            }
            let vector = json!({
                "name": schema.vector_field_name,
                "type": "FloatVector",
                "params": { "dim": schema.dimension },
            });
            (vec![primary, vector], schema.auto_id)
        }
        SchemaSource::Custom { schema, .. } => {
            let fields = schema.get("fields").and_then(|f| f.as_array()).cloned().unwrap_or_default();
            let auto_id = schema
                .get("autoId")
                .or_else(|| schema.get("autoID"))
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(false);
            (fields, auto_id)
        }
    };

    CollectionInfo {
        collection_name: request.collection_name.clone(),
        description: request.description.clone(),
        fields,
        num_shards: Some(request.num_shards),
        num_partitions: request.num_partitions,
        consistency_level: Some(
            request.consistency_level.map_or("Bounded", |level| level.as_str()).to_string(),
        ),
        enable_dynamic_field: Some(request.enable_dynamic_field),
        auto_id: Some(auto_id),
        properties: request.properties.clone(),
    }
}

impl AdminClient for MemoryClient {
    fn current_database(&self) -> &str {
        &self.database
    }

    async fn create_database(&self, name: &str, properties: &Properties) -> Result<()> {
        const OP: &str = "create_database";
        if self.intercept(Call::CreateDatabase, OP)? {
            return Ok(());
        }

        let mut state = self.server.lock();
        if state.databases.contains_key(name) {
            return Err(illegal(OP, format!("database already exist: {name}")));
        }
        state.databases.insert(
            name.to_string(),
            DatabaseState { properties: properties.clone(), collections: BTreeMap::new() },
        );
        Ok(())
    }

    async fn describe_database(&self, name: &str) -> Result<DatabaseInfo> {
        const OP: &str = "describe_database";
        self.intercept(Call::DescribeDatabase, OP)?;

        let state = self.server.lock();
        let database = state.databases.get(name).ok_or_else(|| database_not_found(OP, name))?;
        Ok(DatabaseInfo { name: name.to_string(), properties: database.properties.clone() })
    }

    async fn list_databases(&self) -> Result<Vec<String>> {
        self.intercept(Call::ListDatabases, "list_databases")?;
        Ok(self.server.lock().databases.keys().cloned().collect())
    }

    async fn drop_database(&self, name: &str) -> Result<()> {
        const OP: &str = "drop_database";
        if self.intercept(Call::DropDatabase, OP)? {
            return Ok(());
        }

        if name == DEFAULT_DATABASE {
            return Err(illegal(OP, "can not drop default database"));
        }

        let mut state = self.server.lock();
        let database = state.databases.get(name).ok_or_else(|| database_not_found(OP, name))?;
        if !database.collections.is_empty() {
            return Err(illegal(
                OP,
                format!("{name} not empty, must drop all collections before drop database"),
            ));
        }
        state.databases.remove(name);
        Ok(())
    }

    async fn alter_database_properties(&self, name: &str, properties: &Properties) -> Result<()> {
        const OP: &str = "alter_database_properties";
        if self.intercept(Call::AlterDatabaseProperties, OP)? {
            return Ok(());
        }

        let mut state = self.server.lock();
        let database = database_mut(&mut state, OP, name)?;
        database.properties.extend(properties.clone());
        Ok(())
    }

    async fn drop_database_properties(&self, name: &str, keys: &[String]) -> Result<()> {
        const OP: &str = "drop_database_properties";
        if self.intercept(Call::DropDatabaseProperties, OP)? {
            return Ok(());
        }

        let mut state = self.server.lock();
        let database = database_mut(&mut state, OP, name)?;
        for key in keys {
            database.properties.remove(key);
        }
        Ok(())
    }

    async fn use_database(&mut self, name: &str) -> Result<()> {
        const OP: &str = "use_database";
        if self.intercept(Call::UseDatabase, OP)? {
            return Ok(());
        }

        if !self.server.lock().databases.contains_key(name) {
            return Err(database_not_found(OP, name));
        }
        self.database = name.to_string();
        Ok(())
    }

    async fn create_collection(
        &self,
        db_name: Option<&str>,
        request: &CreateCollectionRequest,
    ) -> Result<()> {
        const OP: &str = "create_collection";
        if self.intercept(Call::CreateCollection, OP)? {
            return Ok(());
        }

        let target = self.target(db_name);
        let mut state = self.server.lock();
        let database = database_mut(&mut state, OP, target)?;
        if database.collections.contains_key(&request.collection_name) {
            return Err(illegal(
                OP,
                format!("collection already exists: {}", request.collection_name),
            ));
        }
        database
            .collections
            .insert(request.collection_name.clone(), describe_new_collection(request));
        Ok(())
    }

    async fn describe_collection(&self, db_name: Option<&str>, name: &str) -> Result<CollectionInfo> {
        const OP: &str = "describe_collection";
        self.intercept(Call::DescribeCollection, OP)?;

        let target = self.target(db_name);
        let mut state = self.server.lock();
        Ok(collection_mut(&mut state, OP, target, name)?.clone())
    }

    async fn list_collections(&self, db_name: Option<&str>) -> Result<Vec<String>> {
        const OP: &str = "list_collections";
        self.intercept(Call::ListCollections, OP)?;

        let target = self.target(db_name);
        let mut state = self.server.lock();
        Ok(database_mut(&mut state, OP, target)?.collections.keys().cloned().collect())
    }

    async fn drop_collection(&self, db_name: Option<&str>, name: &str) -> Result<()> {
        const OP: &str = "drop_collection";
        if self.intercept(Call::DropCollection, OP)? {
            return Ok(());
        }

        let target = self.target(db_name);
        let mut state = self.server.lock();
        database_mut(&mut state, OP, target)?
            .collections
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| collection_not_found(OP, target, name))
    }

    async fn alter_collection_properties(
        &self,
        db_name: Option<&str>,
        name: &str,
        properties: &Properties,
    ) -> Result<()> {
        const OP: &str = "alter_collection_properties";
        if self.intercept(Call::AlterCollectionProperties, OP)? {
            return Ok(());
        }

        let target = self.target(db_name);
        let mut state = self.server.lock();
        collection_mut(&mut state, OP, target, name)?.properties.extend(properties.clone());
        Ok(())
    }

    async fn drop_collection_properties(
        &self,
        db_name: Option<&str>,
        name: &str,
        keys: &[String],
    ) -> Result<()> {
        const OP: &str = "drop_collection_properties";
        if self.intercept(Call::DropCollectionProperties, OP)? {
            return Ok(());
        }

        let target = self.target(db_name);
        let mut state = self.server.lock();
        let collection = collection_mut(&mut state, OP, target, name)?;
        for key in keys {
            collection.properties.remove(key);
        }
        Ok(())
    }

    async fn close(self) {
        self.server.stats.closed.fetch_add(1, Ordering::SeqCst);
        debug!(database = %self.database, "Closed in-memory session");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{DefaultSchema, MetricType};

    fn descriptor() -> ConnectionDescriptor {
        ConnectionDescriptor::anonymous("memory://local")
    }

    fn default_collection(name: &str) -> CreateCollectionRequest {
        CreateCollectionRequest {
            collection_name: name.to_string(),
            description: String::new(),
            schema: SchemaSource::Default(DefaultSchema {
                dimension: 4,
                primary_field_name: "id".to_string(),
                id_type: DataType::Int64,
                max_length: 65535,
                vector_field_name: "vector".to_string(),
                auto_id: false,
            }),
            metric_type: MetricType::IP,
            enable_dynamic_field: true,
            num_shards: 1,
            num_partitions: None,
            consistency_level: None,
            properties: Properties::new(),
        }
    }

    #[tokio::test]
    async fn test_default_database_exists_and_cannot_be_dropped() {
        let server = MemoryServer::new();
        let client = server.connect(&descriptor()).await.unwrap();

        assert_eq!(client.list_databases().await.unwrap(), vec![DEFAULT_DATABASE.to_string()]);
        assert!(client.drop_database(DEFAULT_DATABASE).await.is_err());
    }

    #[tokio::test]
    async fn test_duplicate_database_is_rejected() {
        let server = MemoryServer::new();
        let client = server.connect(&descriptor()).await.unwrap();

        client.create_database("db", &Properties::new()).await.unwrap();
        let err = client.create_database("db", &Properties::new()).await.unwrap_err();
        assert_eq!(err.error_code(), "TRANSPORT_ERROR");
    }

    #[tokio::test]
    async fn test_non_empty_database_cannot_be_dropped() {
        let server = MemoryServer::new();
        let client = server.connect(&descriptor()).await.unwrap();

        client.create_database("db", &Properties::new()).await.unwrap();
        client.create_collection(Some("db"), &default_collection("c")).await.unwrap();
        assert!(client.drop_database("db").await.is_err());

        client.drop_collection(Some("db"), "c").await.unwrap();
        client.drop_database("db").await.unwrap();
    }

    #[tokio::test]
    async fn test_default_schema_fields_are_reported() {
        let server = MemoryServer::new();
        let client = server.connect(&descriptor()).await.unwrap();

        client.create_collection(None, &default_collection("c")).await.unwrap();
        let info = client.describe_collection(None, "c").await.unwrap();

        assert_eq!(info.fields.len(), 2);
        assert_eq!(info.fields[1]["params"]["dim"], 4);
        assert_eq!(info.consistency_level.as_deref(), Some("Bounded"));
    }

    #[tokio::test]
    async fn test_faults_are_one_shot() {
        let server = MemoryServer::new();
        let client = server.connect(&descriptor()).await.unwrap();

        server.inject(Fault::Fail(Call::ListDatabases));
        assert!(client.list_databases().await.is_err());
        assert!(client.list_databases().await.is_ok());
    }

    #[tokio::test]
    async fn test_handle_accounting() {
        let server = MemoryServer::new();
        let client = server.connect(&descriptor()).await.unwrap();
        assert_eq!(server.opened_handles(), 1);
        assert_eq!(server.closed_handles(), 0);

        client.close().await;
        assert_eq!(server.closed_handles(), 1);
    }

    #[tokio::test]
    async fn test_unknown_session_database_fails_to_connect() {
        let server = MemoryServer::new();
        let mut descriptor = descriptor();
        descriptor.db_name = Some("nope".to_string());

        let err = server.connect(&descriptor).await.unwrap_err();
        assert_eq!(err.error_code(), "AUTHENTICATION_ERROR");
        assert_eq!(server.opened_handles(), 0);
    }
}
