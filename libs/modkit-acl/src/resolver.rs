use std::collections::HashSet;

use modkit_security::{RoleHierarchy, Subject};

use crate::domain::{Principal, SecurityIdentity};
use crate::error::AclError;

/// Expands a principal into the identity tokens stored in `acl_security_identities`.
#[derive(Clone, Debug, Default)]
pub struct IdentityResolver {
    hierarchy: RoleHierarchy,
}

impl IdentityResolver {
    #[must_use]
    pub fn new(hierarchy: RoleHierarchy) -> Self {
        Self { hierarchy }
    }

    #[must_use]
    pub fn hierarchy(&self) -> &RoleHierarchy {
        &self.hierarchy
    }

    /// Tokens for `principal`, or for `current` when no principal is given.
    ///
    /// A subject yields its own token followed by its roles; a role name yields the
    /// role alone. Every role is followed by its transitive ancestors. The output has
    /// no duplicates and keeps first-seen order.
    ///
    /// # Errors
    /// Returns `AclError::NoAuthenticatedSubject` when neither a principal nor a current
    /// subject is available, and `AclError::InvalidIdentity` for blank names.
    pub fn resolve(
        &self,
        principal: Option<&Principal>,
        current: Option<&Subject>,
    ) -> Result<Vec<String>, AclError> {
        let mut tokens = Tokens::default();

        match principal {
            Some(Principal::Subject(subject)) => self.subject_tokens(subject, &mut tokens)?,
            Some(Principal::Role(role)) => {
                let sid = SecurityIdentity::role(role.as_str())?;
                self.role_tokens(&sid.identifier(), &mut tokens);
            }
            Some(Principal::Token(ctx)) => {
                if let Some(subject) = ctx.subject() {
                    self.subject_tokens(subject, &mut tokens)?;
                }
                for role in ctx.roles() {
                    self.role_tokens(&role, &mut tokens);
                }
            }
            None => {
                let subject = current.ok_or(AclError::NoAuthenticatedSubject)?;
                self.subject_tokens(subject, &mut tokens)?;
            }
        }

        tracing::trace!(count = tokens.ordered.len(), "resolved ACL identity tokens");
        Ok(tokens.ordered)
    }

    fn subject_tokens(&self, subject: &Subject, tokens: &mut Tokens) -> Result<(), AclError> {
        let sid = SecurityIdentity::user(subject.kind(), subject.username())?;
        tokens.push(sid.identifier());
        for role in subject.roles() {
            self.role_tokens(role, tokens);
        }
        Ok(())
    }

    fn role_tokens(&self, role: &str, tokens: &mut Tokens) {
        let mut pending = vec![role.to_owned()];
        while let Some(role) = pending.pop() {
            if !tokens.push(role.clone()) {
                continue;
            }
            // reversed so the first declared parent is expanded first
            pending.extend(self.hierarchy.parents(&role).iter().rev().cloned());
        }
    }
}

#[derive(Default)]
struct Tokens {
    seen: HashSet<String>,
    ordered: Vec<String>,
}

impl Tokens {
    /// Returns `false` when the token was already present.
    fn push(&mut self, token: String) -> bool {
        if self.seen.contains(&token) {
            return false;
        }
        self.seen.insert(token.clone());
        self.ordered.push(token);
        true
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use modkit_security::SecurityContext;
    use modkit_security::constants::IS_AUTHENTICATED_ANONYMOUSLY;

    fn resolver() -> IdentityResolver {
        IdentityResolver::new(
            RoleHierarchy::builder()
                .role("ROLE_SUPER_ADMIN", ["ROLE_ADMIN"])
                .role("ROLE_ADMIN", ["ROLE_USER", "ROLE_AUDITOR"])
                .role("ROLE_EDITOR", ["ROLE_USER"])
                .build(),
        )
    }

    #[test]
    fn test_subject_with_transitive_roles() {
        let alice = Subject::new("app::User", "alice").with_roles(["ROLE_SUPER_ADMIN", "ROLE_EDITOR"]);
        let tokens = resolver()
            .resolve(Some(&Principal::from(&alice)), None)
            .unwrap();

        assert_eq!(
            tokens,
            [
                "app::User-alice",
                "ROLE_SUPER_ADMIN",
                "ROLE_ADMIN",
                "ROLE_USER",
                "ROLE_AUDITOR",
                "ROLE_EDITOR",
            ]
        );
    }

    #[test]
    fn test_role_name_has_no_subject_token() {
        let tokens = resolver()
            .resolve(Some(&Principal::from("ROLE_EDITOR")), None)
            .unwrap();
        assert_eq!(tokens, ["ROLE_EDITOR", "ROLE_USER"]);
    }

    #[test]
    fn test_defaults_to_current_subject() {
        let bob = Subject::new("app::User", "bob").with_role("ROLE_USER");
        let tokens = resolver().resolve(None, Some(&bob)).unwrap();
        assert_eq!(tokens, ["app::User-bob", "ROLE_USER"]);
    }

    #[test]
    fn test_no_subject_at_all() {
        let err = resolver().resolve(None, None).unwrap_err();
        assert!(matches!(err, AclError::NoAuthenticatedSubject));
    }

    #[test]
    fn test_anonymous_token_resolves_to_anonymous_role() {
        let tokens = resolver()
            .resolve(Some(&Principal::from(SecurityContext::anonymous())), None)
            .unwrap();
        assert_eq!(tokens, [IS_AUTHENTICATED_ANONYMOUSLY]);
    }

    #[test]
    fn test_cyclic_hierarchy_terminates() {
        let resolver = IdentityResolver::new(
            RoleHierarchy::builder()
                .role("ROLE_A", ["ROLE_B"])
                .role("ROLE_B", ["ROLE_C"])
                .role("ROLE_C", ["ROLE_A"])
                .build(),
        );
        let tokens = resolver.resolve(Some(&Principal::from("ROLE_B")), None).unwrap();
        assert_eq!(tokens, ["ROLE_B", "ROLE_C", "ROLE_A"]);
    }

    #[test]
    fn test_blank_role_is_invalid() {
        let err = resolver()
            .resolve(Some(&Principal::from("")), None)
            .unwrap_err();
        assert!(matches!(err, AclError::InvalidIdentity(_)));
    }
}
