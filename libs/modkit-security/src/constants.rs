/// Well-known role names used by the default class access layout.
pub const ROLE_SUPER_ADMIN: &str = "ROLE_SUPER_ADMIN";
pub const ROLE_ADMIN: &str = "ROLE_ADMIN";
pub const ROLE_USER: &str = "ROLE_USER";

/// Role carried by every unauthenticated (anonymous) security context.
pub const IS_AUTHENTICATED_ANONYMOUSLY: &str = "IS_AUTHENTICATED_ANONYMOUSLY";
