use std::fmt;
use std::str::FromStr;

use crate::error::AclError;

/// Named permission bits. Values are bit-compatible with the common ACL mask scheme,
/// so masks written by other ACL implementations read back unchanged.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Permission {
    View = 1,
    Create = 1 << 1,
    Edit = 1 << 2,
    Delete = 1 << 3,
    Undelete = 1 << 4,
    Operator = 1 << 5,
    Master = 1 << 6,
    Owner = 1 << 7,
    /// Every bit the store can hold.
    Iddqd = (1 << 30) - 1,
}

impl Permission {
    /// Single-bit permissions, lowest bit first.
    pub const SINGLE_BITS: [Self; 8] = [
        Self::View,
        Self::Create,
        Self::Edit,
        Self::Delete,
        Self::Undelete,
        Self::Operator,
        Self::Master,
        Self::Owner,
    ];

    #[inline]
    #[must_use]
    pub const fn bits(self) -> u32 {
        self as u32
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::View => "VIEW",
            Self::Create => "CREATE",
            Self::Edit => "EDIT",
            Self::Delete => "DELETE",
            Self::Undelete => "UNDELETE",
            Self::Operator => "OPERATOR",
            Self::Master => "MASTER",
            Self::Owner => "OWNER",
            Self::Iddqd => "IDDQD",
        }
    }

    const fn code(self) -> char {
        match self {
            Self::View => 'V',
            Self::Create => 'C',
            Self::Edit => 'E',
            Self::Delete => 'D',
            Self::Undelete => 'U',
            Self::Operator => 'O',
            Self::Master => 'M',
            Self::Owner => 'N',
            Self::Iddqd => '*',
        }
    }

    /// Single-bit permissions set in `mask`, lowest bit first. Unnamed bits are ignored.
    #[must_use]
    pub fn decompose(mask: u32) -> Vec<Self> {
        Self::SINGLE_BITS
            .into_iter()
            .filter(|p| mask & p.bits() != 0)
            .collect()
    }
}

impl FromStr for Permission {
    type Err = AclError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::SINGLE_BITS
            .into_iter()
            .chain([Self::Iddqd])
            .find(|p| p.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| AclError::UnknownPermissionName(s.to_owned()))
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<Permission> for u32 {
    fn from(p: Permission) -> Self {
        p.bits()
    }
}

/// Anything that can be ORed into a [`MaskBuilder`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MaskPart<'a> {
    Name(&'a str),
    Permission(Permission),
    Bits(u32),
}

impl<'a> From<&'a str> for MaskPart<'a> {
    fn from(name: &'a str) -> Self {
        MaskPart::Name(name)
    }
}

impl<'a> From<&'a String> for MaskPart<'a> {
    fn from(name: &'a String) -> Self {
        MaskPart::Name(name.as_str())
    }
}

impl From<Permission> for MaskPart<'_> {
    fn from(p: Permission) -> Self {
        MaskPart::Permission(p)
    }
}

impl From<u32> for MaskPart<'_> {
    fn from(bits: u32) -> Self {
        MaskPart::Bits(bits)
    }
}

impl MaskPart<'_> {
    fn bits(&self) -> Result<u32, AclError> {
        match self {
            MaskPart::Name(name) => Ok(name.parse::<Permission>()?.bits()),
            MaskPart::Permission(p) => Ok(p.bits()),
            MaskPart::Bits(bits) => Ok(*bits),
        }
    }
}

/// Accumulates permissions into a single bitmask.
///
/// ```
/// use modkit_acl::{MaskBuilder, Permission};
///
/// let mut builder = MaskBuilder::new();
/// builder.add("view").unwrap().add(Permission::Create).unwrap();
/// assert_eq!(builder.get(), 3);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MaskBuilder {
    mask: u32,
}

impl MaskBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_mask(mask: u32) -> Self {
        Self { mask }
    }

    /// OR a permission name, [`Permission`] or raw bit pattern into the mask.
    ///
    /// # Errors
    /// Returns `AclError::UnknownPermissionName` when a name is not a known permission;
    /// the mask is left unchanged.
    pub fn add<'a>(&mut self, part: impl Into<MaskPart<'a>>) -> Result<&mut Self, AclError> {
        self.mask |= part.into().bits()?;
        Ok(self)
    }

    /// Clear the bits of a permission name, [`Permission`] or raw bit pattern.
    ///
    /// # Errors
    /// Returns `AclError::UnknownPermissionName` when a name is not a known permission.
    pub fn remove<'a>(&mut self, part: impl Into<MaskPart<'a>>) -> Result<&mut Self, AclError> {
        self.mask &= !part.into().bits()?;
        Ok(self)
    }

    pub fn reset(&mut self) -> &mut Self {
        self.mask = 0;
        self
    }

    #[must_use]
    pub fn get(&self) -> u32 {
        self.mask
    }

    /// Human-readable form: one character per bit, highest bit first, `.` for unset
    /// bits and `*` for set bits that carry no name.
    #[must_use]
    pub fn pattern(&self) -> String {
        (0..u32::BITS)
            .rev()
            .map(|bit| {
                let flag = 1u32 << bit;
                if self.mask & flag == 0 {
                    '.'
                } else {
                    Permission::SINGLE_BITS
                        .into_iter()
                        .find(|p| p.bits() == flag)
                        .map_or('*', Permission::code)
                }
            })
            .collect()
    }

    /// Combined mask of a list of permission names.
    ///
    /// # Errors
    /// Returns `AclError::UnknownPermissionName` for the first unknown name.
    pub fn from_names<I, S>(names: I) -> Result<u32, AclError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut builder = Self::new();
        for name in names {
            builder.add(name.as_ref())?;
        }
        Ok(builder.get())
    }
}
