/// Errors raised by the ACL manager, the permission store and the query filter.
#[derive(thiserror::Error, Debug)]
pub enum AclError {
    /// The identity input matched no accepted shape, or normalized to nothing usable.
    #[error("invalid identity: {0}")]
    InvalidIdentity(String),

    #[error("unknown permission name: {0}")]
    UnknownPermissionName(String),

    /// The filter was given a statement that is not a read query.
    #[error("unsupported query type: {0}")]
    UnsupportedQueryType(&'static str),

    #[error("ACL already exists for {0}")]
    AclAlreadyExists(String),

    #[error("ACL not found for {0}")]
    AclNotFound(String),

    /// A permission operation was attempted before `load_acl`.
    #[error("no ACL loaded")]
    AclNotLoaded,

    #[error("no authenticated subject available")]
    NoAuthenticatedSubject,

    /// The rewriter cannot resolve the table behind a query alias.
    #[error("unable to retrieve table name for alias '{0}'")]
    TableMetadataUnavailable(String),

    #[error("ACE index {index} is out of bounds (collection holds {len})")]
    AceIndexOutOfBounds { index: usize, len: usize },

    #[error("mask {0} does not fit the permission store")]
    MaskOutOfRange(i64),

    /// Extra criteria referenced a placeholder that was never allocated.
    #[error("unbound criteria parameter: {0}")]
    UnboundParameter(String),

    #[error("invalid ACL configuration: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("database error: {0}")]
    Db(#[from] sea_orm::DbErr),
}
