//! milvusctl - Administrative Control Plane for Milvus
//!
//! milvusctl creates, inspects, reconfigures and removes Milvus databases and
//! collections. Every call is a self-contained invocation: parameters are rendered,
//! a connection is opened, the call runs, and the connection is closed.
//!
//! # Core Principles
//! - The server is the only source of truth (nothing is cached between invocations)
//! - Mutations are confirmed by reading the state back
//! - A confirmation mismatch is reported as `success: false`, never as an error
//! - Errors fall into a small, stable taxonomy with machine-readable codes
//!
//! # Module Organization
//! - [`error`] - Error types and handling
//! - [`render`] - Templated parameters and typed coercion
//! - [`client`] - Connection descriptors and the administrative client seam
//! - [`executor`] - Operation lifecycle and the verification pipeline
//! - [`output`] - JSON output envelope types
//! - [`config`] - Connection profile management

pub mod client;
pub mod config;
pub mod error;
pub mod executor;
pub mod output;
pub mod render;

pub use client::memory::{Call, Fault, MemoryClient, MemoryServer};
#[cfg(feature = "rest")]
pub use client::milvus::{MilvusClient, MilvusConnector};
pub use client::{
    AdminClient, CollectionInfo, ConnectionDescriptor, ConnectionParams, Connector, ConsistencyLevel,
    CreateCollectionRequest, DataType, DatabaseInfo, DefaultSchema, MetricType, Properties, SchemaSource,
    DEFAULT_DATABASE,
};
pub use config::{
    list_profiles, load_with_precedence, resolve_profile, save_profile, ConfigLocation, ProfileRegistry,
    StoredProfile,
};
pub use error::{MilvusError, Result, AUTHENTICATION_MESSAGE};
pub use executor::collection::{
    AlterCollectionProperties, CollectionPropertiesOutput, CreateCollection, CreateCollectionOutput,
    DescribeCollection, DropCollection, DropCollectionOutput, DropCollectionProperties, ListCollections,
    ListCollectionsOutput,
};
pub use executor::database::{
    AlterDatabaseProperties, CreateDatabase, CreateDatabaseOutput, DatabasePropertiesOutput,
    DescribeDatabase, DescribeDatabaseOutput, DropDatabase, DropDatabaseOutput, DropDatabaseProperties,
    ListDatabases, ListDatabasesOutput, UseDatabase, UseDatabaseOutput,
};
pub use executor::{execute, verify, Operation, Verified};
pub use output::{execute_reported, Envelope, ErrorEnvelope, ErrorInfo, Metadata, SuccessEnvelope};
pub use render::{Property, RenderContext};
