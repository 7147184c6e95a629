use crate::constants::IS_AUTHENTICATED_ANONYMOUSLY;
use crate::subject::Subject;

/// Type alias for a reference-counted subject provider
pub type SubjectProviderRef = std::sync::Arc<dyn SubjectProvider>;

/// Source of the currently authenticated subject (the "token storage" of a request).
pub trait SubjectProvider: Send + Sync {
    fn current_subject(&self) -> Option<Subject>;
}

/// `SecurityContext` encapsulates the authentication state of a request or operation
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SecurityContext {
    subject: Option<Subject>,
    roles: Vec<String>,
}

impl SecurityContext {
    /// Create a new `SecurityContext` builder
    #[must_use]
    pub fn builder() -> SecurityContextBuilder {
        SecurityContextBuilder::default()
    }

    /// Create an anonymous `SecurityContext`: no subject, only the anonymous role
    #[must_use]
    pub fn anonymous() -> Self {
        SecurityContextBuilder::default().build()
    }

    /// Create a `SecurityContext` authenticated as `subject`
    #[must_use]
    pub fn authenticated(subject: Subject) -> Self {
        SecurityContextBuilder::default().subject(subject).build()
    }

    /// Get the authenticated subject, if any
    #[must_use]
    pub fn subject(&self) -> Option<&Subject> {
        self.subject.as_ref()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.subject.is_some()
    }

    /// Roles granted to this context: the subject's roles plus any roles
    /// attached to the context itself.
    #[must_use]
    pub fn roles(&self) -> Vec<String> {
        let mut roles: Vec<String> = self
            .subject
            .as_ref()
            .map(|s| s.roles().to_vec())
            .unwrap_or_default();
        for role in &self.roles {
            if !roles.contains(role) {
                roles.push(role.clone());
            }
        }
        roles
    }
}

impl SubjectProvider for SecurityContext {
    fn current_subject(&self) -> Option<Subject> {
        self.subject.clone()
    }
}

#[derive(Default)]
pub struct SecurityContextBuilder {
    subject: Option<Subject>,
    roles: Vec<String>,
}

impl SecurityContextBuilder {
    #[must_use]
    pub fn subject(mut self, subject: Subject) -> Self {
        self.subject = Some(subject);
        self
    }

    #[must_use]
    pub fn add_role(mut self, role: &str) -> Self {
        self.roles.push(role.to_owned());
        self
    }

    #[must_use]
    pub fn build(self) -> SecurityContext {
        let mut roles = self.roles;
        if self.subject.is_none() && !roles.iter().any(|r| r == IS_AUTHENTICATED_ANONYMOUSLY) {
            roles.push(IS_AUTHENTICATED_ANONYMOUSLY.to_owned());
        }
        SecurityContext {
            subject: self.subject,
            roles,
        }
    }
}
