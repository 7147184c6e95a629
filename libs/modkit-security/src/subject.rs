/// An authenticated account.
///
/// `kind` is the fully-qualified type name of the account (for example
/// `App\Entity\User` or `app::users::User`) and, together with `username`,
/// uniquely names the subject across account types.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Subject {
    pub(crate) kind: String,
    pub(crate) username: String,
    #[serde(default)]
    pub(crate) roles: Vec<String>,
}

impl Subject {
    #[must_use]
    pub fn new(kind: &str, username: &str) -> Self {
        Self {
            kind: kind.to_owned(),
            username: username.to_owned(),
            roles: vec![],
        }
    }

    #[must_use]
    pub fn with_role(mut self, role: &str) -> Self {
        if !self.has_role(role) {
            self.roles.push(role.to_owned());
        }
        self
    }

    #[must_use]
    pub fn with_roles<I, S>(self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        roles
            .into_iter()
            .fold(self, |subject, role| subject.with_role(role.as_ref()))
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    #[inline]
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Roles held directly by the subject, in grant order.
    #[inline]
    #[must_use]
    pub fn roles(&self) -> &[String] {
        &self.roles
    }

    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}
