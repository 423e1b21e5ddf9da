//! Static role→permission tables.
//!
//! Permissions are `resource:action` strings against a closed role set.
//! `Admin` is granted universal access and is special-cased in [`role_allows`]
//! rather than enumerated, so new resources never silently lock admins out.

use masthead_core::Role;

/// Allow-list for department administrators: full control over publications,
/// plus read access to the surrounding reference and reporting surfaces.
const DEPARTMENT_ADMIN_PERMISSIONS: &[&str] = &[
    "publications:create",
    "publications:read",
    "publications:update",
    "publications:delete",
    "journals:read",
    "users:read",
    "departments:read",
    "statistics:read",
    "reports:read",
    "reports:generate",
];

/// Allow-list for regular users: submit and maintain publications, read
/// everything needed to do so.
const USER_PERMISSIONS: &[&str] = &[
    "publications:create",
    "publications:read",
    "publications:update",
    "journals:read",
    "statistics:read",
    "reports:read",
];

/// The fixed allow-list for a role.
///
/// `Admin` returns an empty slice; it is wildcard-allowed in [`role_allows`]
/// and callers that enumerate permissions must special-case it.
pub fn role_permissions(role: Role) -> &'static [&'static str] {
    match role {
        Role::Admin => &[],
        Role::DepartmentAdmin => DEPARTMENT_ADMIN_PERMISSIONS,
        Role::User => USER_PERMISSIONS,
    }
}

/// Membership test: may `role` perform `action` on `resource`?
pub fn role_allows(role: Role, resource: &str, action: &str) -> bool {
    if role == Role::Admin {
        return true;
    }

    role_permissions(role)
        .iter()
        .any(|perm| match perm.split_once(':') {
            Some((r, a)) => r == resource && a == action,
            None => false,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_is_universal() {
        assert!(role_allows(Role::Admin, "users", "create"));
        assert!(role_allows(Role::Admin, "anything", "whatsoever"));
    }

    #[test]
    fn user_cannot_manage_accounts() {
        assert!(!role_allows(Role::User, "users", "create"));
        assert!(!role_allows(Role::User, "users", "read"));
        assert!(role_allows(Role::User, "publications", "read"));
    }

    #[test]
    fn department_admin_can_delete_publications_but_not_users() {
        assert!(role_allows(Role::DepartmentAdmin, "publications", "delete"));
        assert!(role_allows(Role::DepartmentAdmin, "users", "read"));
        assert!(!role_allows(Role::DepartmentAdmin, "users", "create"));
    }

    #[test]
    fn tables_are_well_formed() {
        for role in [Role::DepartmentAdmin, Role::User] {
            for perm in role_permissions(role) {
                assert!(
                    perm.split_once(':').is_some(),
                    "permission '{perm}' is not resource:action"
                );
            }
        }
    }
}
