//! Configuration for the ACL manager and the query rewriter.

use std::path::Path;

use figment::Figment;
use figment::providers::{Env, Format, Yaml};
use modkit_security::RoleHierarchy;
use modkit_security::constants::{
    IS_AUTHENTICATED_ANONYMOUSLY, ROLE_ADMIN, ROLE_SUPER_ADMIN, ROLE_USER,
};
use serde::Deserialize;

use crate::error::AclError;

/// Key under which the ACL section lives in a larger configuration tree.
pub const CONFIG_KEY: &str = "acl";

/// How the rewriter compares a stored ACE mask with the requested mask.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskComparison {
    /// `e.mask >= :mask`. Correct only while higher privileges have larger values.
    #[default]
    AtLeast,
    /// `(e.mask & :mask) = :mask`, every requested bit must be present.
    AllBits,
}

/// Roles that receive the baseline class-scoped grants.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DefaultAccessConfig {
    /// Receives `IDDQD`.
    pub super_admin_role: String,
    /// Receives `MASTER`.
    pub admin_role: String,
    /// Receives `VIEW`.
    pub anonymous_role: String,
    /// Receives `CREATE | VIEW`.
    pub user_role: String,
}

impl Default for DefaultAccessConfig {
    fn default() -> Self {
        Self {
            super_admin_role: ROLE_SUPER_ADMIN.to_owned(),
            admin_role: ROLE_ADMIN.to_owned(),
            anonymous_role: IS_AUTHENTICATED_ANONYMOUSLY.to_owned(),
            user_role: ROLE_USER.to_owned(),
        }
    }
}

/// ACL configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AclConfig {
    /// Role inheritance used when resolving identity tokens.
    pub role_hierarchy: RoleHierarchy,

    pub mask_comparison: MaskComparison,

    pub default_access: DefaultAccessConfig,
}

impl AclConfig {
    /// Extract the `acl` section of `figment`. A missing section yields the defaults.
    ///
    /// # Errors
    /// Returns `AclError::Config` when the section is present but malformed.
    pub fn from_figment(figment: &Figment) -> Result<Self, AclError> {
        if !figment.contains(CONFIG_KEY) {
            return Ok(Self::default());
        }
        figment
            .extract_inner::<Self>(CONFIG_KEY)
            .map_err(|e| AclError::Config(Box::new(e)))
    }

    /// Load from a YAML file, overridden by `APP__ACL__...` style environment variables.
    ///
    /// # Errors
    /// Returns `AclError::Config` when the merged configuration is malformed.
    pub fn load(path: &Path) -> Result<Self, AclError> {
        let figment = Figment::new()
            .merge(Yaml::file(path))
            .merge(Env::prefixed("APP__").split("__"));
        Self::from_figment(&figment)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn test_missing_section_yields_defaults() {
        let figment = Figment::from(Yaml::string("server:\n  port: 8080\n"));
        let cfg = AclConfig::from_figment(&figment).unwrap();

        assert_eq!(cfg, AclConfig::default());
        assert_eq!(cfg.mask_comparison, MaskComparison::AtLeast);
        assert_eq!(cfg.default_access.anonymous_role, IS_AUTHENTICATED_ANONYMOUSLY);
    }

    #[test]
    fn test_full_section() {
        let yaml = r"
acl:
  mask_comparison: all_bits
  role_hierarchy:
    ROLE_ADMIN: [ROLE_USER]
  default_access:
    user_role: ROLE_MEMBER
";
        let cfg = AclConfig::from_figment(&Figment::from(Yaml::string(yaml))).unwrap();

        assert_eq!(cfg.mask_comparison, MaskComparison::AllBits);
        assert_eq!(cfg.role_hierarchy.parents("ROLE_ADMIN"), &["ROLE_USER"]);
        assert_eq!(cfg.default_access.user_role, "ROLE_MEMBER");
        assert_eq!(cfg.default_access.admin_role, ROLE_ADMIN);
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let yaml = "acl:\n  mask_compare: at_least\n";
        let err = AclConfig::from_figment(&Figment::from(Yaml::string(yaml))).unwrap_err();
        assert!(matches!(err, AclError::Config(_)));
    }

    #[test]
    fn test_load_without_file_yields_defaults() {
        let cfg = AclConfig::load(Path::new("/nonexistent/acl.yaml")).unwrap();
        assert_eq!(cfg.default_access, DefaultAccessConfig::default());
    }
}
