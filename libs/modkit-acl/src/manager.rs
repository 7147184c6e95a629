use tracing::{debug, info};

use crate::config::{AclConfig, DefaultAccessConfig};
use crate::domain::{AceScope, Acl, DomainObject, ObjectIdentity, Principal, SecurityIdentity};
use crate::error::AclError;
use crate::mask::{MaskBuilder, Permission};
use crate::store::MutableAclProvider;

/// Administrative API over a [`MutableAclProvider`].
///
/// The manager remembers one loaded ACL and one security identity; the permission
/// setters apply to that pair.
///
/// ```rust,ignore
/// let mut manager = AclManager::new(DbAclProvider::new(db));
/// manager
///     .load_acl(&post)
///     .await?
///     .create_security_identity(&alice)?
///     .set_object_permission(Permission::Owner.bits(), true)
///     .await?;
/// ```
pub struct AclManager<P> {
    provider: P,
    default_access: DefaultAccessConfig,
    mask_builder: MaskBuilder,
    acl: Option<Acl>,
    sid: Option<SecurityIdentity>,
}

impl<P: MutableAclProvider> AclManager<P> {
    #[must_use]
    pub fn new(provider: P) -> Self {
        Self::with_config(provider, &AclConfig::default())
    }

    #[must_use]
    pub fn with_config(provider: P, config: &AclConfig) -> Self {
        Self {
            provider,
            default_access: config.default_access.clone(),
            mask_builder: MaskBuilder::new(),
            acl: None,
            sid: None,
        }
    }

    #[must_use]
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Load the ACL of `entity`, creating it when absent, and make it the current ACL.
    ///
    /// # Errors
    /// Returns `AclError::InvalidIdentity` when the entity has no usable identity, or the
    /// store's error.
    pub async fn load_acl<D>(&mut self, entity: &D) -> Result<&mut Self, AclError>
    where
        D: DomainObject + ?Sized,
    {
        let oid = ObjectIdentity::from_domain_object(entity)?;
        self.acl = Some(self.load_or_create(&oid).await?);
        Ok(self)
    }

    async fn load_or_create(&self, oid: &ObjectIdentity) -> Result<Acl, AclError> {
        match self.provider.create_acl(oid).await {
            Err(AclError::AclAlreadyExists(_)) => {
                debug!(object = %oid, "ACL already exists, loading");
                self.provider.find_acl(oid).await
            }
            other => other,
        }
    }

    /// Make the identity of a subject, role name or security context the current one.
    ///
    /// # Errors
    /// Returns `AclError::InvalidIdentity` for blank names and for a context without an
    /// authenticated subject.
    pub fn create_security_identity(
        &mut self,
        identity: impl Into<Principal>,
    ) -> Result<&mut Self, AclError> {
        self.sid = Some(SecurityIdentity::try_from(&identity.into())?);
        Ok(self)
    }

    /// Grant the configured baseline roles class-wide access to the type of `entity`:
    /// everything to the super admin, `MASTER` to the admin, `VIEW` to anonymous
    /// visitors and `CREATE | VIEW` to authenticated users. Re-running is a no-op.
    ///
    /// # Errors
    /// Returns `AclError::InvalidIdentity` for a blank configured role or entity identity,
    /// or the store's error.
    pub async fn install_default_access<D>(&mut self, entity: &D) -> Result<bool, AclError>
    where
        D: DomainObject + ?Sized,
    {
        let oid = ObjectIdentity::from_domain_object(entity)?;
        self.load_or_create(&oid).await?;

        let builder = &mut self.mask_builder;
        let mut grants = Vec::with_capacity(4);
        for (parts, role) in [
            (&[Permission::Iddqd][..], &self.default_access.super_admin_role),
            (&[Permission::Master][..], &self.default_access.admin_role),
            (&[Permission::View][..], &self.default_access.anonymous_role),
            (
                &[Permission::Create, Permission::View][..],
                &self.default_access.user_role,
            ),
        ] {
            builder.reset();
            for &p in parts {
                builder.add(p)?;
            }
            grants.push((SecurityIdentity::role(role.as_str())?, builder.get()));
        }
        builder.reset();

        let updated = self
            .provider
            .update_acl_with(
                &oid,
                Box::new(move |acl: &mut Acl| {
                    for (sid, mask) in &grants {
                        upsert_ace(acl, AceScope::Class, sid, *mask, true, 0)?;
                    }
                    Ok(())
                }),
            )
            .await?;

        // the current ACL shares the class entries just written
        let stale = self
            .acl
            .as_ref()
            .map(Acl::object_identity)
            .filter(|current| current.kind() == oid.kind())
            .cloned();
        if let Some(current) = stale {
            self.acl = Some(if current == oid {
                updated
            } else {
                self.provider.find_acl(&current).await?
            });
        }

        info!(class = oid.kind(), "installed default ACL access");
        Ok(true)
    }

    /// Upsert an object-scoped entry for the current identity on the current ACL.
    ///
    /// # Errors
    /// Returns `AclError::AclNotLoaded` before `load_acl`, `AclError::InvalidIdentity`
    /// before `create_security_identity`, or the store's error.
    pub async fn set_object_permission(
        &mut self,
        mask: u32,
        granting: bool,
    ) -> Result<&mut Self, AclError> {
        self.set_permission(AceScope::Object, mask, granting).await
    }

    /// Upsert a class-scoped entry for the current identity on the current ACL.
    ///
    /// # Errors
    /// Returns `AclError::AclNotLoaded` before `load_acl`, `AclError::InvalidIdentity`
    /// before `create_security_identity`, or the store's error.
    pub async fn set_class_permission(
        &mut self,
        mask: u32,
        granting: bool,
    ) -> Result<&mut Self, AclError> {
        self.set_permission(AceScope::Class, mask, granting).await
    }

    /// Remove the current identity's object-scoped entries with the given granting flag.
    ///
    /// # Errors
    /// Same as [`Self::set_object_permission`].
    pub async fn unset_object_permission(&mut self, granting: bool) -> Result<&mut Self, AclError> {
        self.unset_permission(AceScope::Object, granting).await
    }

    /// Remove the current identity's class-scoped entries with the given granting flag.
    ///
    /// # Errors
    /// Same as [`Self::set_class_permission`].
    pub async fn unset_class_permission(&mut self, granting: bool) -> Result<&mut Self, AclError> {
        self.unset_permission(AceScope::Class, granting).await
    }

    /// Delete the ACL of `entity`, forgetting it if it is the current one.
    ///
    /// # Errors
    /// Returns `AclError::InvalidIdentity` when the entity has no usable identity, or the
    /// store's error.
    pub async fn delete_acl<D>(&mut self, entity: &D) -> Result<&mut Self, AclError>
    where
        D: DomainObject + ?Sized,
    {
        let oid = ObjectIdentity::from_domain_object(entity)?;
        self.provider.delete_acl(&oid).await?;
        if self
            .acl
            .as_ref()
            .is_some_and(|acl| acl.object_identity() == &oid)
        {
            self.acl = None;
        }
        Ok(self)
    }

    #[must_use]
    pub fn acl(&self) -> Option<&Acl> {
        self.acl.as_ref()
    }

    #[must_use]
    pub fn security_identity(&self) -> Option<&SecurityIdentity> {
        self.sid.as_ref()
    }

    /// The manager's mask builder, reset.
    pub fn mask_builder(&mut self) -> &mut MaskBuilder {
        self.mask_builder.reset()
    }

    fn target(&self) -> Result<(ObjectIdentity, SecurityIdentity), AclError> {
        let acl = self.acl.as_ref().ok_or(AclError::AclNotLoaded)?;
        let sid = self.sid.clone().ok_or_else(|| {
            AclError::InvalidIdentity("no security identity has been created".to_owned())
        })?;
        Ok((acl.object_identity().clone(), sid))
    }

    async fn set_permission(
        &mut self,
        scope: AceScope,
        mask: u32,
        granting: bool,
    ) -> Result<&mut Self, AclError> {
        let (oid, sid) = self.target()?;
        debug!(object = %oid, sid = %sid, ?scope, mask, granting, "setting ACL permission");

        let acl = self
            .provider
            .update_acl_with(
                &oid,
                Box::new(move |acl: &mut Acl| {
                    upsert_ace(acl, scope, &sid, mask, granting, 0).map(|_| ())
                }),
            )
            .await?;
        self.acl = Some(acl);
        Ok(self)
    }

    async fn unset_permission(
        &mut self,
        scope: AceScope,
        granting: bool,
    ) -> Result<&mut Self, AclError> {
        let (oid, sid) = self.target()?;
        debug!(object = %oid, sid = %sid, ?scope, granting, "removing ACL permission");

        let acl = self
            .provider
            .update_acl_with(
                &oid,
                Box::new(move |acl: &mut Acl| {
                    remove_aces(acl, scope, &sid, granting).map(|_| ())
                }),
            )
            .await?;
        self.acl = Some(acl);
        Ok(self)
    }
}

/// Set `mask` on every entry of `scope` matching `(sid, granting)`, scanning from the
/// end; insert a new entry at `index` when none matched. Returns whether one was inserted.
///
/// # Errors
/// Returns `AclError::AceIndexOutOfBounds` when an insert at `index` is impossible.
pub fn upsert_ace(
    acl: &mut Acl,
    scope: AceScope,
    sid: &SecurityIdentity,
    mask: u32,
    granting: bool,
    index: usize,
) -> Result<bool, AclError> {
    let matches: Vec<usize> = acl
        .aces(scope)
        .iter()
        .enumerate()
        .rev()
        .filter(|(_, ace)| ace.security_identity() == sid && ace.is_granting() == granting)
        .map(|(i, _)| i)
        .collect();

    if matches.is_empty() {
        acl.insert_ace(scope, index, sid.clone(), mask, granting)?;
        return Ok(true);
    }
    for i in matches {
        acl.update_ace(scope, i, mask)?;
    }
    Ok(false)
}

/// Delete every entry of `scope` matching `(sid, granting)`, scanning from the end so
/// pending indices stay valid. Returns the number removed.
///
/// # Errors
/// Returns `AclError::AceIndexOutOfBounds` only if the collection changes underneath.
pub fn remove_aces(
    acl: &mut Acl,
    scope: AceScope,
    sid: &SecurityIdentity,
    granting: bool,
) -> Result<usize, AclError> {
    let mut removed = 0;
    for i in (0..acl.aces(scope).len()).rev() {
        let ace = &acl.aces(scope)[i];
        if ace.security_identity() == sid && ace.is_granting() == granting {
            acl.delete_ace(scope, i)?;
            removed += 1;
        }
    }
    Ok(removed)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn role(name: &str) -> SecurityIdentity {
        SecurityIdentity::role(name).unwrap()
    }

    fn acl_with(entries: &[(&str, u32, bool)]) -> Acl {
        let mut acl = Acl::new(ObjectIdentity::new("app::Post", "1").unwrap());
        for (i, (sid, mask, granting)) in entries.iter().enumerate() {
            acl.insert_ace(AceScope::Object, i, role(sid), *mask, *granting)
                .unwrap();
        }
        acl
    }

    fn snapshot(acl: &Acl, scope: AceScope) -> Vec<(String, u32, bool)> {
        acl.aces(scope)
            .iter()
            .map(|e| (e.security_identity().identifier(), e.mask(), e.is_granting()))
            .collect()
    }

    #[test]
    fn test_reverse_scan_updates_only_matching_granting_flag() {
        let mut acl = acl_with(&[("A", 1, true), ("B", 1, true), ("A", 1, false)]);

        let inserted = upsert_ace(&mut acl, AceScope::Object, &role("A"), 5, false, 0).unwrap();

        assert!(!inserted);
        assert_eq!(
            snapshot(&acl, AceScope::Object),
            [
                ("A".to_owned(), 1, true),
                ("B".to_owned(), 1, true),
                ("A".to_owned(), 5, false),
            ]
        );
    }

    #[test]
    fn test_repeated_upserts_leave_one_entry_with_last_mask() {
        let mut acl = acl_with(&[]);
        for mask in [1, 3, 7, 2] {
            upsert_ace(&mut acl, AceScope::Class, &role("ROLE_USER"), mask, true, 0).unwrap();
        }

        assert_eq!(
            snapshot(&acl, AceScope::Class),
            [("ROLE_USER".to_owned(), 2, true)]
        );
        assert!(acl.aces(AceScope::Object).is_empty());
    }

    #[test]
    fn test_upsert_inserts_at_requested_index() {
        let mut acl = acl_with(&[("A", 1, true), ("B", 1, true)]);

        assert!(upsert_ace(&mut acl, AceScope::Object, &role("C"), 2, true, 1).unwrap());
        assert_eq!(acl.aces(AceScope::Object)[1].security_identity(), &role("C"));

        let err = upsert_ace(&mut acl, AceScope::Object, &role("D"), 2, true, 9).unwrap_err();
        assert!(matches!(err, AclError::AceIndexOutOfBounds { index: 9, len: 3 }));
    }

    #[test]
    fn test_remove_only_touches_matching_pair() {
        let mut acl = acl_with(&[("A", 1, true), ("B", 2, true), ("A", 4, false), ("A", 8, true)]);

        let removed = remove_aces(&mut acl, AceScope::Object, &role("A"), true).unwrap();

        assert_eq!(removed, 2);
        assert_eq!(
            snapshot(&acl, AceScope::Object),
            [("B".to_owned(), 2, true), ("A".to_owned(), 4, false)]
        );
    }
}
