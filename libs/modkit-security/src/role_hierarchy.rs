use std::collections::BTreeMap;

/// Immutable role hierarchy: every role maps to the roles it inherits from.
///
/// Deserializes from a plain map, which is how it appears in configuration:
///
/// ```yaml
/// role_hierarchy:
///   ROLE_ADMIN: [ROLE_USER]
///   ROLE_SUPER_ADMIN: [ROLE_ADMIN, ROLE_ALLOWED_TO_SWITCH]
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct RoleHierarchy {
    parents: BTreeMap<String, Vec<String>>,
}

impl RoleHierarchy {
    #[must_use]
    pub fn builder() -> RoleHierarchyBuilder {
        RoleHierarchyBuilder::default()
    }

    /// Direct parents of `role`, in declaration order. Unknown roles have none.
    #[must_use]
    pub fn parents(&self, role: &str) -> &[String] {
        self.parents.get(role).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }
}

impl<K, I> FromIterator<(K, I)> for RoleHierarchy
where
    K: Into<String>,
    I: IntoIterator,
    I::Item: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, I)>>(iter: T) -> Self {
        iter.into_iter()
            .fold(RoleHierarchyBuilder::default(), |b, (role, parents)| {
                b.role(role, parents)
            })
            .build()
    }
}

#[derive(Default)]
pub struct RoleHierarchyBuilder {
    parents: BTreeMap<String, Vec<String>>,
}

impl RoleHierarchyBuilder {
    /// Declare `parents` for `role`; repeated declarations extend the list.
    #[must_use]
    pub fn role<R, P, I>(mut self, role: R, parents: I) -> Self
    where
        R: Into<String>,
        P: Into<String>,
        I: IntoIterator<Item = P>,
    {
        let entry = self.parents.entry(role.into()).or_default();
        for parent in parents {
            let parent = parent.into();
            if !entry.contains(&parent) {
                entry.push(parent);
            }
        }
        self
    }

    #[must_use]
    pub fn build(self) -> RoleHierarchy {
        RoleHierarchy {
            parents: self.parents,
        }
    }
}
