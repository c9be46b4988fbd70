//! Database Operations
//!
//! Create, describe, list, drop, alter, drop-properties and use for Milvus databases.
//! Mutations are confirmed by reading the server state back; see [`verify`].

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::client::{AdminClient, ConnectionParams, Properties};
use crate::error::Result;
use crate::executor::{verify, Operation};
use crate::render::{render_or_empty, render_required, Property, RenderContext};

/// Rendered target of a single-database call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseTarget {
    pub name: String,
}

/// Rendered database name plus a property map
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabasePropertiesRequest {
    pub name: String,
    pub properties: Properties,
}

/// Rendered database name plus property keys to reset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseKeysRequest {
    pub name: String,
    pub property_keys: Vec<String>,
}

// ============================================================================
// Outputs
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDatabaseOutput {
    pub success: bool,
    pub database_name: String,
    pub properties: Properties,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescribeDatabaseOutput {
    pub database_name: String,
    pub properties: Properties,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListDatabasesOutput {
    pub db_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropDatabaseOutput {
    pub success: bool,
}

/// Output of alter-properties and drop-properties: the re-described property set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabasePropertiesOutput {
    pub success: bool,
    pub properties: Properties,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UseDatabaseOutput {
    pub success: bool,
    pub database_name: String,
}

// ============================================================================
// Operations
// ============================================================================

/// Create a database with optional properties
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDatabase {
    #[serde(default)]
    pub connection: ConnectionParams,
    pub name: Property<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Property<Properties>>,
}

impl CreateDatabase {
    pub fn new(connection: ConnectionParams, name: impl Into<Property<String>>) -> Self {
        Self { connection, name: name.into(), properties: None }
    }

    #[must_use]
    pub fn with_properties(mut self, properties: Property<Properties>) -> Self {
        self.properties = Some(properties);
        self
    }
}

impl Operation for CreateDatabase {
    type Request = DatabasePropertiesRequest;
    type Output = CreateDatabaseOutput;
    const NAME: &'static str = "create_database";

    fn connection(&self) -> &ConnectionParams {
        &self.connection
    }

    fn render(&self, ctx: &RenderContext) -> Result<Self::Request> {
        Ok(DatabasePropertiesRequest {
            name: render_required(&self.name, ctx, "name")?,
            properties: render_or_empty(self.properties.as_ref(), ctx, "properties")?,
        })
    }

    async fn run<C: AdminClient>(request: &Self::Request, client: &mut C) -> Result<Self::Output> {
        info!(database = %request.name, "Creating database");

        let verified = verify(
            Self::NAME,
            client.create_database(&request.name, &request.properties),
            client.describe_database(&request.name),
            |described| described.name == request.name,
        )
        .await?;

        if verified.confirmed {
            info!(database = %request.name, "Database created");
        }

        Ok(CreateDatabaseOutput {
            success: verified.confirmed,
            database_name: verified.state.name,
            properties: verified.state.properties,
        })
    }
}

/// Read a database's name and properties
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescribeDatabase {
    #[serde(default)]
    pub connection: ConnectionParams,
    pub name: Property<String>,
}

impl DescribeDatabase {
    pub fn new(connection: ConnectionParams, name: impl Into<Property<String>>) -> Self {
        Self { connection, name: name.into() }
    }
}

impl Operation for DescribeDatabase {
    type Request = DatabaseTarget;
    type Output = DescribeDatabaseOutput;
    const NAME: &'static str = "describe_database";

    fn connection(&self) -> &ConnectionParams {
        &self.connection
    }

    fn render(&self, ctx: &RenderContext) -> Result<Self::Request> {
        Ok(DatabaseTarget { name: render_required(&self.name, ctx, "name")? })
    }

    async fn run<C: AdminClient>(request: &Self::Request, client: &mut C) -> Result<Self::Output> {
        let described = client.describe_database(&request.name).await?;
        info!(database = %described.name, properties = described.properties.len(), "Database described");

        Ok(DescribeDatabaseOutput { database_name: described.name, properties: described.properties })
    }
}

/// List every database visible to the session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListDatabases {
    #[serde(default)]
    pub connection: ConnectionParams,
}

impl ListDatabases {
    pub const fn new(connection: ConnectionParams) -> Self {
        Self { connection }
    }
}

impl Operation for ListDatabases {
    type Request = ();
    type Output = ListDatabasesOutput;
    const NAME: &'static str = "list_databases";

    fn connection(&self) -> &ConnectionParams {
        &self.connection
    }

    fn render(&self, _ctx: &RenderContext) -> Result<Self::Request> {
        Ok(())
    }

    async fn run<C: AdminClient>(_request: &Self::Request, client: &mut C) -> Result<Self::Output> {
        let db_names = client.list_databases().await?;
        info!(count = db_names.len(), "Databases listed");
        Ok(ListDatabasesOutput { db_names })
    }
}

/// Drop a database and confirm it is gone
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropDatabase {
    #[serde(default)]
    pub connection: ConnectionParams,
    pub name: Property<String>,
}

impl DropDatabase {
    pub fn new(connection: ConnectionParams, name: impl Into<Property<String>>) -> Self {
        Self { connection, name: name.into() }
    }
}

impl Operation for DropDatabase {
    type Request = DatabaseTarget;
    type Output = DropDatabaseOutput;
    const NAME: &'static str = "drop_database";

    fn connection(&self) -> &ConnectionParams {
        &self.connection
    }

    fn render(&self, ctx: &RenderContext) -> Result<Self::Request> {
        Ok(DatabaseTarget { name: render_required(&self.name, ctx, "name")? })
    }

    async fn run<C: AdminClient>(request: &Self::Request, client: &mut C) -> Result<Self::Output> {
        // Pre-drop read doubles as an existence check
        let described = client.describe_database(&request.name).await?;
        info!(database = %described.name, "Dropping database");

        let verified = verify(
            Self::NAME,
            client.drop_database(&request.name),
            client.list_databases(),
            |names| described.name == request.name && !names.contains(&request.name),
        )
        .await?;

        if verified.confirmed {
            info!(database = %request.name, "Database dropped");
        }

        Ok(DropDatabaseOutput { success: verified.confirmed })
    }
}

/// Set or overwrite database properties; keys not named are left untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlterDatabaseProperties {
    #[serde(default)]
    pub connection: ConnectionParams,
    pub name: Property<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Property<Properties>>,
}

impl AlterDatabaseProperties {
    pub fn new(
        connection: ConnectionParams,
        name: impl Into<Property<String>>,
        properties: Property<Properties>,
    ) -> Self {
        Self { connection, name: name.into(), properties: Some(properties) }
    }
}

impl Operation for AlterDatabaseProperties {
    type Request = DatabasePropertiesRequest;
    type Output = DatabasePropertiesOutput;
    const NAME: &'static str = "alter_database_properties";

    fn connection(&self) -> &ConnectionParams {
        &self.connection
    }

    fn render(&self, ctx: &RenderContext) -> Result<Self::Request> {
        Ok(DatabasePropertiesRequest {
            name: render_required(&self.name, ctx, "name")?,
            properties: render_or_empty(self.properties.as_ref(), ctx, "properties")?,
        })
    }

    async fn run<C: AdminClient>(request: &Self::Request, client: &mut C) -> Result<Self::Output> {
        info!(database = %request.name, keys = request.properties.len(), "Altering database properties");

        let verified = verify(
            Self::NAME,
            client.alter_database_properties(&request.name, &request.properties),
            client.describe_database(&request.name),
            |_| true,
        )
        .await?;

        Ok(DatabasePropertiesOutput { success: verified.confirmed, properties: verified.state.properties })
    }
}

/// Reset the named database properties to server defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropDatabaseProperties {
    #[serde(default)]
    pub connection: ConnectionParams,
    pub name: Property<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property_keys: Option<Property<Vec<String>>>,
}

impl DropDatabaseProperties {
    pub fn new(
        connection: ConnectionParams,
        name: impl Into<Property<String>>,
        property_keys: Property<Vec<String>>,
    ) -> Self {
        Self { connection, name: name.into(), property_keys: Some(property_keys) }
    }
}

impl Operation for DropDatabaseProperties {
    type Request = DatabaseKeysRequest;
    type Output = DatabasePropertiesOutput;
    const NAME: &'static str = "drop_database_properties";

    fn connection(&self) -> &ConnectionParams {
        &self.connection
    }

    fn render(&self, ctx: &RenderContext) -> Result<Self::Request> {
        Ok(DatabaseKeysRequest {
            name: render_required(&self.name, ctx, "name")?,
            property_keys: render_or_empty(self.property_keys.as_ref(), ctx, "propertyKeys")?,
        })
    }

    async fn run<C: AdminClient>(request: &Self::Request, client: &mut C) -> Result<Self::Output> {
        info!(database = %request.name, keys = ?request.property_keys, "Dropping database properties");

        let verified = verify(
            Self::NAME,
            client.drop_database_properties(&request.name, &request.property_keys),
            client.describe_database(&request.name),
            |_| true,
        )
        .await?;

        Ok(DatabasePropertiesOutput { success: verified.confirmed, properties: verified.state.properties })
    }
}

/// Switch the session to an existing database
///
/// The switch only lives as long as the handle, which the executor closes when
/// the operation returns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UseDatabase {
    #[serde(default)]
    pub connection: ConnectionParams,
    pub name: Property<String>,
}

impl UseDatabase {
    pub fn new(connection: ConnectionParams, name: impl Into<Property<String>>) -> Self {
        Self { connection, name: name.into() }
    }
}

impl Operation for UseDatabase {
    type Request = DatabaseTarget;
    type Output = UseDatabaseOutput;
    const NAME: &'static str = "use_database";

    fn connection(&self) -> &ConnectionParams {
        &self.connection
    }

    fn render(&self, ctx: &RenderContext) -> Result<Self::Request> {
        Ok(DatabaseTarget { name: render_required(&self.name, ctx, "name")? })
    }

    async fn run<C: AdminClient>(request: &Self::Request, client: &mut C) -> Result<Self::Output> {
        let described = client.describe_database(&request.name).await?;
        client.use_database(&described.name).await?;
        info!(database = %described.name, "Using database");

        Ok(UseDatabaseOutput { success: true, database_name: described.name })
    }
}
