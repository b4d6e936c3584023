//! SCIM 2.0 filter and PATCH engine.
//!
//! Parses RFC 7644 filter expressions, resolves attribute paths against a
//! [`SchemaRegistry`], translates filters into a backend-neutral
//! [`Predicate`], evaluates them directly against in-memory resources, and
//! applies PATCH operations.
//!
//! ## RFC References
//!
//! - RFC 7643: SCIM Core Schema
//! - RFC 7644: SCIM Protocol
//!
//! ## Module Structure
//!
//! - [`schema`]: attribute metadata, built-in schemas and the registry
//! - [`filter`]: filter expression parser and AST
//! - [`path`]: attribute path resolution
//! - [`context`]: per-call evaluation settings
//! - [`resource`]: resources split into schema sections
//! - [`predicate`]: filter translation into a backend predicate
//! - [`matcher`]: in-memory filter evaluation
//! - [`patch`]: PATCH request model and path parsing
//! - [`patch_engine`]: PATCH execution
//! - [`error`]: SCIM error responses per RFC 7644
//!
//! ## Example
//!
//! ```
//! use scim_engine::scim::{FilterContext, SchemaRegistry, parse_filter, translate};
//!
//! let registry = SchemaRegistry::with_defaults();
//! let ctx = FilterContext::new(&registry, "User");
//! let filter = parse_filter(r#"emails[type eq "work" and value ew "@example.com"]"#).unwrap();
//! let predicate = translate(&filter, &ctx).unwrap();
//! assert!(matches!(predicate, scim_engine::scim::Predicate::Any { .. }));
//! ```

mod compare;
pub mod context;
pub mod error;
pub mod filter;
pub mod matcher;
pub mod patch;
pub mod patch_engine;
pub mod path;
pub mod predicate;
pub mod resource;
pub mod schema;

pub use context::{BackendDialect, FilterContext, UnknownAttributePolicy};
pub use error::{ScimErrorResponse, ScimErrorType, ScimResult};
pub use filter::{
    AttrPath, CompareOp, Filter, FilterLimits, FilterParseError, FilterValue, parse_filter,
    parse_filter_with,
};
pub use matcher::{matches, matches_element, try_matches, try_matches_element};
pub use patch::{PatchError, PatchOp, PatchPath, PatchRequest, parse_path, parse_path_with};
pub use patch_engine::PatchEngine;
pub use path::{ResolvedPath, UnknownAttribute, resolve};
pub use predicate::{AttrRef, Operand, Predicate, TypedValue, translate};
pub use resource::{ResourceError, ResourceTree, SchemaSection};
pub use schema::{
    AttributeMeta, AttributeType, Mutability, RegistryError, ResourceType, Schema, SchemaRegistry,
};
