//! Collection Operations
//!
//! Collections live inside a database. Every operation here targets the session's
//! current database unless `db_name` overrides it for that call.
//!
//! # Schema Paths
//! A collection is created either from convenience fields (primary key plus one
//! float vector field, built server-side) or from a caller-supplied schema object
//! with optional index parameters. The two paths are exclusive: supplying a custom
//! schema together with any convenience field is a validation error.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::client::{
    AdminClient, CollectionInfo, ConnectionParams, ConsistencyLevel, CreateCollectionRequest, DataType,
    DefaultSchema, MetricType, Properties, SchemaSource,
};
use crate::error::{MilvusError, Result};
use crate::executor::{verify, Operation};
use crate::render::{render_opt, render_or, render_or_empty, render_required, Property, RenderContext};

/// Dimension used when a default-schema collection names none
pub const DEFAULT_DIMENSION: u32 = 2;
/// Primary field name of a default-schema collection
pub const DEFAULT_PRIMARY_FIELD: &str = "id";
/// Vector field name of a default-schema collection
pub const DEFAULT_VECTOR_FIELD: &str = "vector";
/// Maximum length of a `VarChar` primary key
pub const DEFAULT_MAX_LENGTH: u32 = 65535;
/// Shard count when none is given
pub const DEFAULT_SHARDS: u32 = 1;

/// Rendered target of a single-collection call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionTarget {
    pub db_name: Option<String>,
    pub collection_name: String,
}

impl CollectionTarget {
    fn db(&self) -> Option<&str> {
        self.db_name.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionPropertiesRequest {
    pub target: CollectionTarget,
    pub properties: Properties,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionKeysRequest {
    pub target: CollectionTarget,
    pub property_keys: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateCollectionPlan {
    pub db_name: Option<String>,
    pub request: CreateCollectionRequest,
}

// ============================================================================
// Outputs
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCollectionOutput {
    pub success: bool,
    pub collection_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListCollectionsOutput {
    pub collection_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropCollectionOutput {
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionPropertiesOutput {
    pub success: bool,
    pub properties: Properties,
}

// ============================================================================
// Create
// ============================================================================

/// Create a collection from convenience fields or a custom schema
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCollection {
    #[serde(default)]
    pub connection: ConnectionParams,
    pub collection_name: Property<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_name: Option<Property<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<Property<String>>,

    // Default-schema path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension: Option<Property<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_field_name: Option<Property<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_type: Option<Property<DataType>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<Property<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_field_name: Option<Property<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_id: Option<Property<bool>>,

    // Custom-schema path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Property<serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_params: Option<Property<serde_json::Value>>,

    // Shared
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric_type: Option<Property<MetricType>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_dynamic_field: Option<Property<bool>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_shards: Option<Property<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_partitions: Option<Property<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consistency_level: Option<Property<ConsistencyLevel>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Property<Properties>>,
}

impl CreateCollection {
    pub fn new(connection: ConnectionParams, collection_name: impl Into<Property<String>>) -> Self {
        Self { connection, collection_name: collection_name.into(), ..Self::default() }
    }

    #[must_use]
    pub fn with_dimension(mut self, dimension: Property<u32>) -> Self {
        self.dimension = Some(dimension);
        self
    }

    #[must_use]
    pub fn with_schema(mut self, schema: Property<serde_json::Value>) -> Self {
        self.schema = Some(schema);
        self
    }

    #[must_use]
    pub fn with_db_name(mut self, db_name: impl Into<Property<String>>) -> Self {
        self.db_name = Some(db_name.into());
        self
    }

    fn render_default_schema(&self, ctx: &RenderContext) -> Result<DefaultSchema> {
        let dimension = render_or(self.dimension.as_ref(), ctx, "dimension", DEFAULT_DIMENSION)?;
        if dimension <= 1 {
            return Err(MilvusError::validation("dimension", "must be greater than 1"));
        }

        let max_length = render_or(self.max_length.as_ref(), ctx, "maxLength", DEFAULT_MAX_LENGTH)?;
        if max_length == 0 {
            return Err(MilvusError::validation("maxLength", "must be greater than 0"));
        }

        Ok(DefaultSchema {
            dimension,
            primary_field_name: render_or(
                self.primary_field_name.as_ref(),
                ctx,
                "primaryFieldName",
                DEFAULT_PRIMARY_FIELD.to_string(),
            )?,
            id_type: render_or_empty(self.id_type.as_ref(), ctx, "idType")?,
            max_length,
            vector_field_name: render_or(
                self.vector_field_name.as_ref(),
                ctx,
                "vectorFieldName",
                DEFAULT_VECTOR_FIELD.to_string(),
            )?,
            auto_id: render_or(self.auto_id.as_ref(), ctx, "autoId", false)?,
        })
    }

    fn render_custom_schema(&self, schema: serde_json::Value, ctx: &RenderContext) -> Result<SchemaSource> {
        let convenience = [
            ("dimension", self.dimension.is_some()),
            ("primaryFieldName", self.primary_field_name.is_some()),
            ("idType", self.id_type.is_some()),
            ("maxLength", self.max_length.is_some()),
            ("vectorFieldName", self.vector_field_name.is_some()),
            ("autoId", self.auto_id.is_some()),
        ];
        let supplied: Vec<&str> =
            convenience.iter().filter(|(_, present)| *present).map(|(name, _)| *name).collect();
        if !supplied.is_empty() {
            return Err(MilvusError::validation(
                "schema",
                format!("a custom schema cannot be combined with {}", supplied.join(", ")),
            ));
        }

        let schema = json_document(schema, "schema")?;
        if !schema.is_object() {
            return Err(MilvusError::validation("schema", "must be a JSON object"));
        }

        let index_params = match render_opt(self.index_params.as_ref(), ctx, "indexParams")? {
            None => Vec::new(),
            Some(value) => match json_document(value, "indexParams")? {
                serde_json::Value::Array(items) => items,
                _ => return Err(MilvusError::validation("indexParams", "must be a JSON array")),
            },
        };

        Ok(SchemaSource::Custom { schema, index_params })
    }
}

/// A JSON parameter given as a string holds the document as text
fn json_document(value: serde_json::Value, field: &str) -> Result<serde_json::Value> {
    match value {
        serde_json::Value::String(text) => serde_json::from_str(&text)
            .map_err(|e| MilvusError::validation(field, format!("expected a JSON document: {e}"))),
        other => Ok(other),
    }
}

fn render_db_name(db_name: Option<&Property<String>>, ctx: &RenderContext) -> Result<Option<String>> {
    render_opt(db_name, ctx, "dbName")
}

impl Operation for CreateCollection {
    type Request = CreateCollectionPlan;
    type Output = CreateCollectionOutput;
    const NAME: &'static str = "create_collection";

    fn connection(&self) -> &ConnectionParams {
        &self.connection
    }

    fn render(&self, ctx: &RenderContext) -> Result<Self::Request> {
        let collection_name = render_required(&self.collection_name, ctx, "collectionName")?;

        let schema = match render_opt(self.schema.as_ref(), ctx, "schema")? {
            Some(schema) => self.render_custom_schema(schema, ctx)?,
            None => {
                if self.index_params.is_some() {
                    return Err(MilvusError::validation("indexParams", "requires a custom schema"));
                }
                SchemaSource::Default(self.render_default_schema(ctx)?)
            }
        };

        let num_shards = render_or(self.num_shards.as_ref(), ctx, "numShards", DEFAULT_SHARDS)?;
        if num_shards == 0 {
            return Err(MilvusError::validation("numShards", "must be at least 1"));
        }

        Ok(CreateCollectionPlan {
            db_name: render_db_name(self.db_name.as_ref(), ctx)?,
            request: CreateCollectionRequest {
                collection_name,
                description: render_or_empty(self.description.as_ref(), ctx, "description")?,
                schema,
                metric_type: render_or_empty(self.metric_type.as_ref(), ctx, "metricType")?,
                enable_dynamic_field: render_or(
                    self.enable_dynamic_field.as_ref(),
                    ctx,
                    "enableDynamicField",
                    true,
                )?,
                num_shards,
                num_partitions: render_opt(self.num_partitions.as_ref(), ctx, "numPartitions")?,
                consistency_level: render_opt(self.consistency_level.as_ref(), ctx, "consistencyLevel")?,
                properties: render_or_empty(self.properties.as_ref(), ctx, "properties")?,
            },
        })
    }

    async fn run<C: AdminClient>(plan: &Self::Request, client: &mut C) -> Result<Self::Output> {
        let name = &plan.request.collection_name;
        let database = plan.db_name.as_deref().unwrap_or(client.current_database()).to_string();
        info!(%database, collection = %name, "Creating collection");

        let verified = verify(
            Self::NAME,
            client.create_collection(plan.db_name.as_deref(), &plan.request),
            client.describe_collection(plan.db_name.as_deref(), name),
            |described| &described.collection_name == name,
        )
        .await?;

        if verified.confirmed {
            info!(%database, collection = %name, "Collection created");
        }

        Ok(CreateCollectionOutput { success: verified.confirmed, collection_name: verified.state.collection_name })
    }
}

// ============================================================================
// Describe / List
// ============================================================================

/// Read a collection's schema summary and properties
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescribeCollection {
    #[serde(default)]
    pub connection: ConnectionParams,
    pub collection_name: Property<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_name: Option<Property<String>>,
}

impl DescribeCollection {
    pub fn new(connection: ConnectionParams, collection_name: impl Into<Property<String>>) -> Self {
        Self { connection, collection_name: collection_name.into(), db_name: None }
    }
}

impl Operation for DescribeCollection {
    type Request = CollectionTarget;
    type Output = CollectionInfo;
    const NAME: &'static str = "describe_collection";

    fn connection(&self) -> &ConnectionParams {
        &self.connection
    }

    fn render(&self, ctx: &RenderContext) -> Result<Self::Request> {
        Ok(CollectionTarget {
            db_name: render_db_name(self.db_name.as_ref(), ctx)?,
            collection_name: render_required(&self.collection_name, ctx, "collectionName")?,
        })
    }

    async fn run<C: AdminClient>(target: &Self::Request, client: &mut C) -> Result<Self::Output> {
        let described = client.describe_collection(target.db(), &target.collection_name).await?;
        info!(collection = %described.collection_name, fields = described.fields.len(), "Collection described");
        Ok(described)
    }
}

/// List the collections of a database
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListCollections {
    #[serde(default)]
    pub connection: ConnectionParams,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_name: Option<Property<String>>,
}

impl ListCollections {
    pub const fn new(connection: ConnectionParams) -> Self {
        Self { connection, db_name: None }
    }

    #[must_use]
    pub fn with_db_name(mut self, db_name: impl Into<Property<String>>) -> Self {
        self.db_name = Some(db_name.into());
        self
    }
}

impl Operation for ListCollections {
    type Request = Option<String>;
    type Output = ListCollectionsOutput;
    const NAME: &'static str = "list_collections";

    fn connection(&self) -> &ConnectionParams {
        &self.connection
    }

    fn render(&self, ctx: &RenderContext) -> Result<Self::Request> {
        render_db_name(self.db_name.as_ref(), ctx)
    }

    async fn run<C: AdminClient>(db_name: &Self::Request, client: &mut C) -> Result<Self::Output> {
        let collection_names = client.list_collections(db_name.as_deref()).await?;
        info!(count = collection_names.len(), "Collections listed");
        Ok(ListCollectionsOutput { collection_names })
    }
}

// ============================================================================
// Drop
// ============================================================================

/// Drop a collection and confirm it is gone
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropCollection {
    #[serde(default)]
    pub connection: ConnectionParams,
    pub collection_name: Property<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_name: Option<Property<String>>,
}

impl DropCollection {
    pub fn new(connection: ConnectionParams, collection_name: impl Into<Property<String>>) -> Self {
        Self { connection, collection_name: collection_name.into(), db_name: None }
    }
}

impl Operation for DropCollection {
    type Request = CollectionTarget;
    type Output = DropCollectionOutput;
    const NAME: &'static str = "drop_collection";

    fn connection(&self) -> &ConnectionParams {
        &self.connection
    }

    fn render(&self, ctx: &RenderContext) -> Result<Self::Request> {
        Ok(CollectionTarget {
            db_name: render_db_name(self.db_name.as_ref(), ctx)?,
            collection_name: render_required(&self.collection_name, ctx, "collectionName")?,
        })
    }

    async fn run<C: AdminClient>(target: &Self::Request, client: &mut C) -> Result<Self::Output> {
        let name = &target.collection_name;
        let described = client.describe_collection(target.db(), name).await?;
        info!(collection = %described.collection_name, "Dropping collection");

        let verified = verify(
            Self::NAME,
            client.drop_collection(target.db(), name),
            client.list_collections(target.db()),
            |names| &described.collection_name == name && !names.contains(name),
        )
        .await?;

        if verified.confirmed {
            info!(collection = %name, "Collection dropped");
        }

        Ok(DropCollectionOutput { success: verified.confirmed })
    }
}

// ============================================================================
// Properties
// ============================================================================

/// Set or overwrite collection properties such as `collection.ttl.seconds`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlterCollectionProperties {
    #[serde(default)]
    pub connection: ConnectionParams,
    pub collection_name: Property<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_name: Option<Property<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Property<Properties>>,
}

impl AlterCollectionProperties {
    pub fn new(
        connection: ConnectionParams,
        collection_name: impl Into<Property<String>>,
        properties: Property<Properties>,
    ) -> Self {
        Self { connection, collection_name: collection_name.into(), db_name: None, properties: Some(properties) }
    }
}

impl Operation for AlterCollectionProperties {
    type Request = CollectionPropertiesRequest;
    type Output = CollectionPropertiesOutput;
    const NAME: &'static str = "alter_collection_properties";

    fn connection(&self) -> &ConnectionParams {
        &self.connection
    }

    fn render(&self, ctx: &RenderContext) -> Result<Self::Request> {
        Ok(CollectionPropertiesRequest {
            target: CollectionTarget {
                db_name: render_db_name(self.db_name.as_ref(), ctx)?,
                collection_name: render_required(&self.collection_name, ctx, "collectionName")?,
            },
            properties: render_or_empty(self.properties.as_ref(), ctx, "properties")?,
        })
    }

    async fn run<C: AdminClient>(request: &Self::Request, client: &mut C) -> Result<Self::Output> {
        let target = &request.target;
        info!(collection = %target.collection_name, keys = request.properties.len(), "Altering collection properties");

        let verified = verify(
            Self::NAME,
            client.alter_collection_properties(target.db(), &target.collection_name, &request.properties),
            client.describe_collection(target.db(), &target.collection_name),
            |_| true,
        )
        .await?;

        Ok(CollectionPropertiesOutput { success: verified.confirmed, properties: verified.state.properties })
    }
}

/// Remove the named collection properties
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropCollectionProperties {
    #[serde(default)]
    pub connection: ConnectionParams,
    pub collection_name: Property<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_name: Option<Property<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property_keys: Option<Property<Vec<String>>>,
}

impl DropCollectionProperties {
    pub fn new(
        connection: ConnectionParams,
        collection_name: impl Into<Property<String>>,
        property_keys: Property<Vec<String>>,
    ) -> Self {
        Self {
            connection,
            collection_name: collection_name.into(),
            db_name: None,
            property_keys: Some(property_keys),
        }
    }
}

impl Operation for DropCollectionProperties {
    type Request = CollectionKeysRequest;
    type Output = CollectionPropertiesOutput;
    const NAME: &'static str = "drop_collection_properties";

    fn connection(&self) -> &ConnectionParams {
        &self.connection
    }

    fn render(&self, ctx: &RenderContext) -> Result<Self::Request> {
        Ok(CollectionKeysRequest {
            target: CollectionTarget {
                db_name: render_db_name(self.db_name.as_ref(), ctx)?,
                collection_name: render_required(&self.collection_name, ctx, "collectionName")?,
            },
            property_keys: render_or_empty(self.property_keys.as_ref(), ctx, "propertyKeys")?,
        })
    }

    async fn run<C: AdminClient>(request: &Self::Request, client: &mut C) -> Result<Self::Output> {
        let target = &request.target;
        info!(collection = %target.collection_name, keys = ?request.property_keys, "Dropping collection properties");

        let verified = verify(
            Self::NAME,
            client.drop_collection_properties(target.db(), &target.collection_name, &request.property_keys),
            client.describe_collection(target.db(), &target.collection_name),
            |_| true,
        )
        .await?;

        Ok(CollectionPropertiesOutput { success: verified.confirmed, properties: verified.state.properties })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn op() -> CreateCollection {
        CreateCollection::new(ConnectionParams::new("memory://local"), "c1")
    }

    #[test]
    fn test_default_schema_defaults() {
        let plan = op().render(&RenderContext::new()).unwrap();
        let request = plan.request;

        assert_eq!(plan.db_name, None);
        assert_eq!(request.metric_type, MetricType::IP);
        assert_eq!(request.num_shards, 1);
        assert!(request.enable_dynamic_field);
        assert_eq!(request.description, "");
        assert_eq!(
            request.schema,
            SchemaSource::Default(DefaultSchema {
                dimension: 2,
                primary_field_name: "id".to_string(),
                id_type: DataType::Int64,
                max_length: 65535,
                vector_field_name: "vector".to_string(),
                auto_id: false,
            })
        );
    }

    #[test]
    fn test_templated_numeric_fields() {
        let mut op = op().with_dimension(Property::template("{{ inputs.dim }}"));
        op.metric_type = Some(Property::template("cosine"));
        op.num_shards = Some(Property::template("{{ shards }}"));

        let ctx = RenderContext::new().var("dim", "768").var("shards", "4");
        let request = op.render(&ctx).unwrap().request;

        assert_eq!(request.metric_type, MetricType::COSINE);
        assert_eq!(request.num_shards, 4);
        assert!(matches!(request.schema, SchemaSource::Default(DefaultSchema { dimension: 768, .. })));
    }

    #[test]
    fn test_bad_integer_names_field() {
        let op = op().with_dimension(Property::template("abc"));
        let err = op.render(&RenderContext::new()).unwrap_err();
        assert!(matches!(err, MilvusError::Validation { ref field, .. } if field == "dimension"));
    }

    #[test]
    fn test_dimension_must_exceed_one() {
        let op = op().with_dimension(Property::Value(1));
        let err = op.render(&RenderContext::new()).unwrap_err();
        assert!(err.message().contains("greater than 1"));
    }

    #[test]
    fn test_custom_schema_path() {
        let schema = json!({"fields": [{"fieldName": "pk", "dataType": "Int64", "isPrimary": true}]});
        let mut op = op().with_schema(Property::Value(schema.clone()));
        op.index_params = Some(Property::template(r#"[{"fieldName": "vec", "metricType": "L2"}]"#));

        let request = op.render(&RenderContext::new()).unwrap().request;
        match request.schema {
            SchemaSource::Custom { schema: rendered, index_params } => {
                assert_eq!(rendered, schema);
                assert_eq!(index_params.len(), 1);
            }
            other => panic!("unexpected schema source: {other:?}"),
        }
    }

    #[test]
    fn test_custom_schema_as_text() {
        let op = op().with_schema(Property::Value(json!(r#"{"fields": []}"#)));
        let request = op.render(&RenderContext::new()).unwrap().request;
        assert!(matches!(request.schema, SchemaSource::Custom { .. }));
    }

    #[test]
    fn test_custom_schema_conflicts_with_convenience_fields() {
        let mut op = op().with_schema(Property::Value(json!({"fields": []}))).with_dimension(Property::Value(8));
        op.vector_field_name = Some(Property::value("embedding"));

        let err = op.render(&RenderContext::new()).unwrap_err();
        match err {
            MilvusError::Validation { field, message } => {
                assert_eq!(field, "schema");
                assert!(message.contains("dimension"));
                assert!(message.contains("vectorFieldName"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_index_params_must_be_array() {
        let mut op = op().with_schema(Property::Value(json!({"fields": []})));
        op.index_params = Some(Property::Value(json!({"fieldName": "vec"})));
        let err = op.render(&RenderContext::new()).unwrap_err();
        assert!(err.message().contains("JSON array"));
    }

    #[test]
    fn test_index_params_without_schema_rejected() {
        let mut op = op();
        op.index_params = Some(Property::Value(json!([])));
        let err = op.render(&RenderContext::new()).unwrap_err();
        assert!(matches!(err, MilvusError::Validation { ref field, .. } if field == "indexParams"));
    }

    #[test]
    fn test_db_name_override() {
        let plan = op().with_db_name("analytics").render(&RenderContext::new()).unwrap();
        assert_eq!(plan.db_name.as_deref(), Some("analytics"));
    }
}
