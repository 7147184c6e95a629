#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
pub mod constants;
pub mod context;
pub mod role_hierarchy;
pub mod subject;

pub use context::{SecurityContext, SubjectProvider, SubjectProviderRef};
pub use role_hierarchy::RoleHierarchy;
pub use subject::Subject;
