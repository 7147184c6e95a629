use super::{ObjectIdentity, SecurityIdentity};
use crate::error::AclError;

/// Which of an ACL's two ordered ACE collections an operation targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AceScope {
    /// Entries shared by every object of the ACL's class.
    Class,
    /// Entries for this object only.
    Object,
}

/// One access control entry. Its position in the owning collection is its order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    sid: SecurityIdentity,
    mask: u32,
    granting: bool,
}

impl Entry {
    #[must_use]
    pub fn new(sid: SecurityIdentity, mask: u32, granting: bool) -> Self {
        Self {
            sid,
            mask,
            granting,
        }
    }

    #[inline]
    #[must_use]
    pub fn security_identity(&self) -> &SecurityIdentity {
        &self.sid
    }

    #[inline]
    #[must_use]
    pub fn mask(&self) -> u32 {
        self.mask
    }

    #[inline]
    #[must_use]
    pub fn is_granting(&self) -> bool {
        self.granting
    }

    fn covers(&self, required: u32) -> bool {
        self.mask & required == required
    }
}

/// The permission record of one object: its own ACEs plus the class-wide ACEs of its type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Acl {
    oid: ObjectIdentity,
    class_aces: Vec<Entry>,
    object_aces: Vec<Entry>,
}

impl Acl {
    #[must_use]
    pub fn new(oid: ObjectIdentity) -> Self {
        Self {
            oid,
            class_aces: Vec::new(),
            object_aces: Vec::new(),
        }
    }

    pub(crate) fn with_aces(
        oid: ObjectIdentity,
        class_aces: Vec<Entry>,
        object_aces: Vec<Entry>,
    ) -> Self {
        Self {
            oid,
            class_aces,
            object_aces,
        }
    }

    #[must_use]
    pub fn object_identity(&self) -> &ObjectIdentity {
        &self.oid
    }

    #[must_use]
    pub fn aces(&self, scope: AceScope) -> &[Entry] {
        match scope {
            AceScope::Class => &self.class_aces,
            AceScope::Object => &self.object_aces,
        }
    }

    fn aces_mut(&mut self, scope: AceScope) -> &mut Vec<Entry> {
        match scope {
            AceScope::Class => &mut self.class_aces,
            AceScope::Object => &mut self.object_aces,
        }
    }

    /// Insert an entry at `index`; later entries shift down by one.
    ///
    /// # Errors
    /// Returns `AclError::AceIndexOutOfBounds` when `index` is past the end of the collection.
    pub fn insert_ace(
        &mut self,
        scope: AceScope,
        index: usize,
        sid: SecurityIdentity,
        mask: u32,
        granting: bool,
    ) -> Result<(), AclError> {
        let aces = self.aces_mut(scope);
        if index > aces.len() {
            return Err(AclError::AceIndexOutOfBounds {
                index,
                len: aces.len(),
            });
        }
        aces.insert(index, Entry::new(sid, mask, granting));
        Ok(())
    }

    /// # Errors
    /// Returns `AclError::AceIndexOutOfBounds` when no entry sits at `index`.
    pub fn update_ace(&mut self, scope: AceScope, index: usize, mask: u32) -> Result<(), AclError> {
        let aces = self.aces_mut(scope);
        let len = aces.len();
        let entry = aces
            .get_mut(index)
            .ok_or(AclError::AceIndexOutOfBounds { index, len })?;
        entry.mask = mask;
        Ok(())
    }

    /// Remove the entry at `index`; later entries move up by one.
    ///
    /// # Errors
    /// Returns `AclError::AceIndexOutOfBounds` when no entry sits at `index`.
    pub fn delete_ace(&mut self, scope: AceScope, index: usize) -> Result<Entry, AclError> {
        let aces = self.aces_mut(scope);
        if index >= aces.len() {
            return Err(AclError::AceIndexOutOfBounds {
                index,
                len: aces.len(),
            });
        }
        Ok(aces.remove(index))
    }

    /// Decide access for any of `sids` holding all bits of any mask in `masks`.
    ///
    /// Object entries are consulted before class entries. Within one collection the
    /// first entry matching an identity and covering a mask decides for that mask: a
    /// grant wins immediately, a denial is remembered. `None` means no entry applied.
    #[must_use]
    pub fn is_granted(&self, masks: &[u32], sids: &[SecurityIdentity]) -> Option<bool> {
        decide(&self.object_aces, masks, sids).or_else(|| decide(&self.class_aces, masks, sids))
    }
}

fn decide(aces: &[Entry], masks: &[u32], sids: &[SecurityIdentity]) -> Option<bool> {
    if aces.is_empty() {
        return None;
    }

    let mut denied = false;
    'masks: for &required in masks {
        for sid in sids {
            for ace in aces {
                if ace.sid == *sid && ace.covers(required) {
                    if ace.granting {
                        return Some(true);
                    }
                    denied = true;
                    continue 'masks;
                }
            }
        }
    }

    denied.then_some(false)
}
