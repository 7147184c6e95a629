//! Value types of the permission model.

mod acl;

use std::fmt;
use std::hash::{Hash, Hasher};

use modkit_security::{SecurityContext, Subject};

use crate::error::AclError;

pub use acl::{AceScope, Acl, Entry};

/// A persisted domain object that can own an ACL.
pub trait DomainObject {
    /// Type name shared by every instance, stored as the ACL class.
    fn acl_type(&self) -> &str;

    /// Identifier unique within the type, usually the primary key rendered as text.
    fn acl_identifier(&self) -> String;
}

/// `(type, identifier)` pair naming one domain object in the permission store.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectIdentity {
    kind: String,
    identifier: String,
}

impl ObjectIdentity {
    /// # Errors
    /// Returns `AclError::InvalidIdentity` when either part is blank.
    pub fn new(kind: impl Into<String>, identifier: impl Into<String>) -> Result<Self, AclError> {
        let kind = kind.into();
        let identifier = identifier.into();
        if kind.trim().is_empty() {
            return Err(AclError::InvalidIdentity(
                "object identity type must not be empty".to_owned(),
            ));
        }
        if identifier.trim().is_empty() {
            return Err(AclError::InvalidIdentity(format!(
                "object identity of type '{kind}' has an empty identifier"
            )));
        }
        Ok(Self { kind, identifier })
    }

    /// # Errors
    /// Returns `AclError::InvalidIdentity` when the object reports a blank type or identifier.
    pub fn from_domain_object<D: DomainObject + ?Sized>(object: &D) -> Result<Self, AclError> {
        Self::new(object.acl_type(), object.acl_identifier())
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    #[inline]
    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }
}

impl fmt::Display for ObjectIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectIdentity({}, {})", self.identifier, self.kind)
    }
}

/// Who an ACE applies to.
///
/// Two identities are equal when their canonical identifiers are equal, which is
/// also the value stored in `acl_security_identities.identifier` and the token the
/// query rewriter matches against.
#[derive(Clone, Debug)]
pub enum SecurityIdentity {
    User { class: String, username: String },
    Role(String),
}

impl SecurityIdentity {
    /// The class must not contain `-`, which separates it from the username in the
    /// stored identifier. Usernames may contain it.
    ///
    /// # Errors
    /// Returns `AclError::InvalidIdentity` when the class or username is blank, or the
    /// class contains `-`.
    pub fn user(class: impl Into<String>, username: impl Into<String>) -> Result<Self, AclError> {
        let class = class.into();
        let username = username.into();
        if class.trim().is_empty() || username.trim().is_empty() {
            return Err(AclError::InvalidIdentity(
                "user security identity needs a class and a username".to_owned(),
            ));
        }
        if class.contains('-') {
            return Err(AclError::InvalidIdentity(format!(
                "user class '{class}' must not contain '-'"
            )));
        }
        Ok(Self::User { class, username })
    }

    /// # Errors
    /// Returns `AclError::InvalidIdentity` when the role name is blank.
    pub fn role(name: impl Into<String>) -> Result<Self, AclError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(AclError::InvalidIdentity(
                "role security identity needs a name".to_owned(),
            ));
        }
        Ok(Self::Role(name))
    }

    /// Rebuild an identity from its stored form.
    ///
    /// # Errors
    /// Returns `AclError::InvalidIdentity` when a user identifier has no `-` separator.
    pub fn from_stored(identifier: &str, username: bool) -> Result<Self, AclError> {
        if !username {
            return Self::role(identifier);
        }
        let (class, name) = identifier.split_once('-').ok_or_else(|| {
            AclError::InvalidIdentity(format!("malformed user identifier '{identifier}'"))
        })?;
        Self::user(class, name)
    }

    /// Canonical token: `Class-username` for users, the role name for roles.
    #[must_use]
    pub fn identifier(&self) -> String {
        match self {
            Self::User { class, username } => format!("{class}-{username}"),
            Self::Role(role) => role.clone(),
        }
    }

    #[must_use]
    pub fn is_user(&self) -> bool {
        matches!(self, Self::User { .. })
    }
}

impl PartialEq for SecurityIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.identifier() == other.identifier()
    }
}

impl Eq for SecurityIdentity {}

impl Hash for SecurityIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identifier().hash(state);
    }
}

impl fmt::Display for SecurityIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User { .. } => write!(f, "UserSecurityIdentity({})", self.identifier()),
            Self::Role(role) => write!(f, "RoleSecurityIdentity({role})"),
        }
    }
}

/// Whose permissions an operation is about: an account, a bare role name, or a
/// whole security context (the subject if authenticated, otherwise its roles).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Principal {
    Subject(Subject),
    Role(String),
    Token(SecurityContext),
}

impl From<Subject> for Principal {
    fn from(subject: Subject) -> Self {
        Self::Subject(subject)
    }
}

impl From<&Subject> for Principal {
    fn from(subject: &Subject) -> Self {
        Self::Subject(subject.clone())
    }
}

impl From<SecurityContext> for Principal {
    fn from(ctx: SecurityContext) -> Self {
        Self::Token(ctx)
    }
}

impl From<&str> for Principal {
    fn from(role: &str) -> Self {
        Self::Role(role.to_owned())
    }
}

impl From<String> for Principal {
    fn from(role: String) -> Self {
        Self::Role(role)
    }
}

impl TryFrom<&Principal> for SecurityIdentity {
    type Error = AclError;

    fn try_from(principal: &Principal) -> Result<Self, Self::Error> {
        match principal {
            Principal::Subject(subject) => Self::user(subject.kind(), subject.username()),
            Principal::Role(role) => Self::role(role.as_str()),
            Principal::Token(ctx) => {
                let subject = ctx.subject().ok_or_else(|| {
                    AclError::InvalidIdentity(
                        "security context carries no authenticated subject".to_owned(),
                    )
                })?;
                Self::user(subject.kind(), subject.username())
            }
        }
    }
}
