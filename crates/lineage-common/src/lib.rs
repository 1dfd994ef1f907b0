//! Lineage Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the lineage workspace.
//!
//! # Overview
//!
//! - **Types**: entity records and the child references that drive crawling
//! - **Error Handling**: shared error and result types
//! - **Logging**: tracing subscriber setup shared by every binary
//!
//! # Example
//!
//! ```
//! use lineage_common::types::{ChildReference, EntityKind, EntityRecord, ParserKind};
//!
//! let table = EntityRecord::new("t-1", EntityKind::Table)
//!     .with_name("orders")
//!     .with_child(ChildReference::new(
//!         "t-1",
//!         "/api/atlas/v2/entity/guid",
//!         ParserKind::TableDetail,
//!     ));
//!
//! assert!(table.has_guid());
//! assert_eq!(table.child_references.len(), 1);
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{LineageError, Result};
