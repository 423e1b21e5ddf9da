//! Memoized RBAC checks, scoped to the auth state machine that owns them.
//!
//! A stale permission cache is a security bug, not a cosmetic one: the memo
//! is owned by the state machine instance and cleared on every transition
//! that changes the user (local or cross-context), never attached to any
//! ambient global.

use std::collections::HashMap;

use masthead_auth::role_allows;
use masthead_core::{Role, UserRecord};

type PermissionKey = (Role, String);

pub struct PermissionEvaluator {
    user: Option<UserRecord>,
    memo: HashMap<PermissionKey, bool>,
}

impl PermissionEvaluator {
    pub fn new(user: Option<UserRecord>) -> Self {
        Self {
            user,
            memo: HashMap::new(),
        }
    }

    pub fn user(&self) -> Option<&UserRecord> {
        self.user.as_ref()
    }

    /// Replace the user this evaluator answers for. A change of identity or
    /// role drops the memo.
    pub fn set_user(&mut self, user: Option<UserRecord>) {
        let changed = match (&self.user, &user) {
            (Some(a), Some(b)) => a.id != b.id || a.role != b.role,
            (None, None) => false,
            _ => true,
        };
        if changed {
            self.memo.clear();
        }
        self.user = user;
    }

    /// May the current user perform `action` on `resource`?
    pub fn has_permission(&mut self, resource: &str, action: &str) -> bool {
        let Some(user) = &self.user else {
            return false;
        };
        let role = user.role;
        if role == Role::Admin {
            return true;
        }

        let key = (role, format!("{resource}:{action}"));
        if let Some(allowed) = self.memo.get(&key) {
            return *allowed;
        }
        let allowed = role_allows(role, resource, action);
        self.memo.insert(key, allowed);
        allowed
    }

    /// Exact role membership test.
    pub fn has_role(&self, roles: &[Role]) -> bool {
        self.user
            .as_ref()
            .is_some_and(|user| roles.contains(&user.role))
    }

    pub fn invalidate(&mut self) {
        self.memo.clear();
    }

    #[cfg(test)]
    pub(crate) fn memo_len(&self) -> usize {
        self.memo.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_with(role: Role) -> UserRecord {
        UserRecord::new("someone", role)
    }

    #[test]
    fn no_user_means_no_permissions() {
        let mut eval = PermissionEvaluator::new(None);
        assert!(!eval.has_permission("publications", "read"));
        assert!(!eval.has_role(&[Role::User]));
    }

    #[test]
    fn admin_bypasses_the_memo_entirely() {
        let mut eval = PermissionEvaluator::new(Some(user_with(Role::Admin)));
        assert!(eval.has_permission("users", "create"));
        assert_eq!(eval.memo_len(), 0);
    }

    #[test]
    fn results_are_memoized_per_role_resource_action() {
        let mut eval = PermissionEvaluator::new(Some(user_with(Role::User)));
        assert!(eval.has_permission("publications", "read"));
        assert!(!eval.has_permission("users", "create"));
        assert_eq!(eval.memo_len(), 2);
        // Second ask answers from the memo.
        assert!(eval.has_permission("publications", "read"));
        assert_eq!(eval.memo_len(), 2);
    }

    #[test]
    fn role_change_drops_the_memo_and_changes_answers() {
        let mut user = user_with(Role::User);
        let mut eval = PermissionEvaluator::new(Some(user.clone()));
        assert!(!eval.has_permission("publications", "delete"));
        assert!(eval.memo_len() > 0);

        user.role = Role::DepartmentAdmin;
        eval.set_user(Some(user));
        assert_eq!(eval.memo_len(), 0);
        // The very next call reflects the new role.
        assert!(eval.has_permission("publications", "delete"));
    }

    #[test]
    fn clearing_the_user_clears_the_memo() {
        let mut eval = PermissionEvaluator::new(Some(user_with(Role::User)));
        eval.has_permission("publications", "read");
        eval.set_user(None);
        assert_eq!(eval.memo_len(), 0);
        assert!(!eval.has_permission("publications", "read"));
    }

    #[test]
    fn has_role_is_exact_match() {
        let eval = PermissionEvaluator::new(Some(user_with(Role::DepartmentAdmin)));
        assert!(eval.has_role(&[Role::DepartmentAdmin]));
        assert!(eval.has_role(&[Role::Admin, Role::DepartmentAdmin]));
        assert!(!eval.has_role(&[Role::Admin]));
    }
}
