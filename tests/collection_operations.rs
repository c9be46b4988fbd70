//! Collection Operation Tests
//!
//! Runs every collection operation end to end against the in-memory server.
//!
//! Covers:
//! - Default-schema and custom-schema creation
//! - Session database vs explicit database override
//! - Drop confirmation and property management
//! - Validation rejected before any connection is opened

use milvusctl::{
    execute, AlterCollectionProperties, Call, ConnectionParams, CreateCollection, CreateDatabase,
    DescribeCollection, DropCollection, DropCollectionProperties, DropDatabase, Fault, ListCollections,
    MemoryServer, Properties, Property, RenderContext,
};
use pretty_assertions::assert_eq;
use serde_json::json;

// ============================================================================
// Test Helpers
// ============================================================================

fn connection() -> ConnectionParams {
    ConnectionParams::new("http://localhost:19530")
}

fn ctx() -> RenderContext {
    RenderContext::new()
}

async fn create_default(server: &MemoryServer, name: &str) {
    let output = execute(&CreateCollection::new(connection(), name), server, &ctx()).await.unwrap();
    assert!(output.success);
}

async fn names(server: &MemoryServer, db: Option<&str>) -> Vec<String> {
    let mut op = ListCollections::new(connection());
    if let Some(db) = db {
        op = op.with_db_name(db);
    }
    execute(&op, server, &ctx()).await.unwrap().collection_names
}

// ============================================================================
// Create
// ============================================================================

#[tokio::test]
async fn test_create_collection_with_dimension() {
    let server = MemoryServer::new();

    let output = execute(
        &CreateCollection::new(connection(), "c1").with_dimension(Property::Value(2)),
        &server,
        &ctx(),
    )
    .await
    .unwrap();
    assert!(output.success);
    assert_eq!(output.collection_name, "c1");

    let described = execute(&DescribeCollection::new(connection(), "c1"), &server, &ctx()).await.unwrap();
    assert_eq!(described.collection_name, "c1");
}

#[tokio::test]
async fn test_default_schema_fields() {
    let server = MemoryServer::new();
    create_default(&server, "c1").await;

    let described = execute(&DescribeCollection::new(connection(), "c1"), &server, &ctx()).await.unwrap();
    assert_eq!(described.fields.len(), 2);
    assert_eq!(described.fields[0]["name"], "id");
    assert_eq!(described.fields[0]["type"], "Int64");
    assert_eq!(described.fields[1]["name"], "vector");
    assert_eq!(described.fields[1]["params"]["dim"], 2);
    assert_eq!(described.num_shards, Some(1));
    assert_eq!(described.enable_dynamic_field, Some(true));
    assert_eq!(described.auto_id, Some(false));
}

#[tokio::test]
async fn test_templated_convenience_fields() {
    let server = MemoryServer::new();
    let mut op = CreateCollection::new(connection(), Property::<String>::template("{{ inputs.name }}"))
        .with_dimension(Property::template("{{ inputs.dim }}"));
    op.primary_field_name = Some(Property::value("pk"));
    op.id_type = Some(Property::template("varchar"));
    op.max_length = Some(Property::Value(64));
    op.metric_type = Some(Property::template("L2"));

    let ctx = RenderContext::new().var("name", "docs").var("dim", "384");
    let output = execute(&op, &server, &ctx).await.unwrap();
    assert_eq!(output.collection_name, "docs");

    let described = execute(&DescribeCollection::new(connection(), "docs"), &server, &ctx).await.unwrap();
    assert_eq!(described.fields[0]["name"], "pk");
    assert_eq!(described.fields[0]["type"], "VarChar");
    assert_eq!(described.fields[0]["params"]["max_length"], 64);
    assert_eq!(described.fields[1]["params"]["dim"], 384);
}

#[tokio::test]
async fn test_blank_templated_fields_fall_back_to_defaults() {
    let server = MemoryServer::new();
    let op: CreateCollection = serde_json::from_value(json!({
        "connection": {"uri": "http://localhost:19530"},
        "collectionName": "docs",
        "dbName": "{{ inputs.db }}",
        "primaryFieldName": "{{ inputs.pk }}",
        "vectorFieldName": "{{ inputs.vf }}"
    }))
    .unwrap();

    let ctx = RenderContext::new().var("db", "").var("pk", "").var("vf", " ");
    assert!(execute(&op, &server, &ctx).await.unwrap().success);

    let described = execute(&DescribeCollection::new(connection(), "docs"), &server, &ctx).await.unwrap();
    assert_eq!(described.fields[0]["name"], "id");
    assert_eq!(described.fields[1]["name"], "vector");
    assert_eq!(names(&server, None).await, vec!["docs".to_string()]);
}

#[tokio::test]
async fn test_create_with_custom_schema() {
    let server = MemoryServer::new();
    let schema = json!({
        "autoId": true,
        "fields": [
            {"fieldName": "pk", "dataType": "Int64", "isPrimary": true},
            {"fieldName": "embedding", "dataType": "FloatVector", "elementTypeParams": {"dim": "8"}}
        ]
    });
    let mut op = CreateCollection::new(connection(), "custom").with_schema(Property::Value(schema));
    op.index_params = Some(Property::Value(json!([{"fieldName": "embedding", "metricType": "COSINE"}])));

    let output = execute(&op, &server, &ctx()).await.unwrap();
    assert!(output.success);

    let described = execute(&DescribeCollection::new(connection(), "custom"), &server, &ctx()).await.unwrap();
    assert_eq!(described.fields.len(), 2);
    assert_eq!(described.auto_id, Some(true));
}

#[tokio::test]
async fn test_custom_schema_with_convenience_field_never_connects() {
    let server = MemoryServer::new();
    let op = CreateCollection::new(connection(), "c1")
        .with_schema(Property::Value(json!({"fields": []})))
        .with_dimension(Property::Value(4));

    let err = execute(&op, &server, &ctx()).await.unwrap_err();
    assert_eq!(err.error_code(), "VALIDATION_ERROR");
    assert_eq!(server.opened_handles(), 0);
}

#[tokio::test]
async fn test_create_duplicate_collection_fails() {
    let server = MemoryServer::new();
    create_default(&server, "c1").await;

    let err = execute(&CreateCollection::new(connection(), "c1"), &server, &ctx()).await.unwrap_err();
    assert_eq!(err.error_code(), "TRANSPORT_ERROR");
}

// ============================================================================
// Database Scoping
// ============================================================================

#[tokio::test]
async fn test_db_name_override_targets_other_database() {
    let server = MemoryServer::new();
    execute(&CreateDatabase::new(connection(), "analytics"), &server, &ctx()).await.unwrap();

    let op = CreateCollection::new(connection(), "events").with_db_name("analytics");
    assert!(execute(&op, &server, &ctx()).await.unwrap().success);

    assert_eq!(names(&server, Some("analytics")).await, vec!["events".to_string()]);
    assert!(names(&server, None).await.is_empty());
}

#[tokio::test]
async fn test_session_database_from_connection() {
    let server = MemoryServer::new();
    execute(&CreateDatabase::new(connection(), "analytics"), &server, &ctx()).await.unwrap();

    let scoped = connection().with_db_name("analytics");
    execute(&CreateCollection::new(scoped.clone(), "events"), &server, &ctx()).await.unwrap();

    let listed = execute(&ListCollections::new(scoped), &server, &ctx()).await.unwrap();
    assert_eq!(listed.collection_names, vec!["events".to_string()]);
}

#[tokio::test]
async fn test_database_with_collections_cannot_be_dropped() {
    let server = MemoryServer::new();
    execute(&CreateDatabase::new(connection(), "analytics"), &server, &ctx()).await.unwrap();
    execute(&CreateCollection::new(connection(), "events").with_db_name("analytics"), &server, &ctx())
        .await
        .unwrap();

    let err = execute(&DropDatabase::new(connection(), "analytics"), &server, &ctx()).await.unwrap_err();
    assert!(err.message().contains("not empty"));
}

// ============================================================================
// Drop
// ============================================================================

#[tokio::test]
async fn test_drop_collection() {
    let server = MemoryServer::new();
    create_default(&server, "c1").await;
    create_default(&server, "c2").await;

    let output = execute(&DropCollection::new(connection(), "c1"), &server, &ctx()).await.unwrap();
    assert!(output.success);
    assert_eq!(names(&server, None).await, vec!["c2".to_string()]);
}

#[tokio::test]
async fn test_drop_ignored_collection_reports_unconfirmed() {
    let server = MemoryServer::new();
    create_default(&server, "c1").await;
    server.inject(Fault::Ignore(Call::DropCollection));

    let output = execute(&DropCollection::new(connection(), "c1"), &server, &ctx()).await.unwrap();
    assert!(!output.success);
}

#[tokio::test]
async fn test_drop_missing_collection_fails() {
    let server = MemoryServer::new();
    let err = execute(&DropCollection::new(connection(), "ghost"), &server, &ctx()).await.unwrap_err();
    assert_eq!(err.error_code(), "TRANSPORT_ERROR");
    assert_eq!(server.opened_handles(), server.closed_handles());
}

// ============================================================================
// Properties
// ============================================================================

#[tokio::test]
async fn test_alter_and_drop_collection_properties() {
    let server = MemoryServer::new();
    create_default(&server, "c1").await;

    let ttl: Properties = [("collection.ttl.seconds".to_string(), "60".to_string())].into();
    let altered = execute(
        &AlterCollectionProperties::new(connection(), "c1", Property::Value(ttl.clone())),
        &server,
        &ctx(),
    )
    .await
    .unwrap();
    assert!(altered.success);
    assert_eq!(altered.properties, ttl);

    let dropped = execute(
        &DropCollectionProperties::new(
            connection(),
            "c1",
            Property::template(r#"["collection.ttl.seconds"]"#),
        ),
        &server,
        &ctx(),
    )
    .await
    .unwrap();
    assert!(dropped.success);
    assert_eq!(dropped.properties, Properties::new());
}

#[tokio::test]
async fn test_alter_properties_from_json_template() {
    let server = MemoryServer::new();
    create_default(&server, "c1").await;

    let output = execute(
        &AlterCollectionProperties::new(
            connection(),
            "c1",
            Property::template(r#"{"mmap.enabled": true, "collection.ttl.seconds": {{ inputs.ttl }}}"#),
        ),
        &server,
        &RenderContext::new().var("ttl", "3600"),
    )
    .await
    .unwrap();

    assert_eq!(output.properties.get("mmap.enabled").map(String::as_str), Some("true"));
    assert_eq!(output.properties.get("collection.ttl.seconds").map(String::as_str), Some("3600"));
}
