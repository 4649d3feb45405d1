// SPDX-License-Identifier: MIT OR Apache-2.0
use crate::builtin::builtin_roles;
use crate::role::{Permission, Role, UserAssignment};
use aegis_error::{AegisError, ErrorCode};
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use tracing::{debug, info};

/// Result of a permission check.
#[derive(Debug, Clone)]
pub struct Decision {
    /// Whether access is granted.
    pub granted: bool,
    /// Human-readable explanation.
    pub reason: String,
    /// The permission that matched, if `granted` is true.
    pub matched_resource: Option<String>,
}

impl Decision {
    fn deny(reason: impl Into<String>) -> Self {
        Self {
            granted: false,
            reason: reason.into(),
            matched_resource: None,
        }
    }

    fn allow(resource: &Permission) -> Self {
        Self {
            granted: true,
            reason: "permission matched".into(),
            matched_resource: Some(resource.resource.clone()),
        }
    }
}

/// A single check, as submitted to [`Rbac::check_permission`].
#[derive(Debug, Clone)]
pub struct CheckRequest<'a> {
    /// Resource being accessed.
    pub resource: &'a str,
    /// Action being performed.
    pub action: &'a str,
    /// Extra fields for condition evaluation.
    pub context: Option<serde_json::Map<String, Value>>,
}

const CACHE_CAPACITY: usize = 1000;

#[derive(Default)]
struct DenialCache {
    order: VecDeque<(String, String, String)>,
    entries: HashMap<(String, String, String), bool>,
}

impl DenialCache {
    fn get(&self, key: &(String, String, String)) -> Option<bool> {
        self.entries.get(key).copied()
    }

    fn insert(&mut self, key: (String, String, String), value: bool) {
        if !self.entries.contains_key(&key) {
            if self.order.len() >= CACHE_CAPACITY {
                if let Some(oldest) = self.order.pop_front() {
                    self.entries.remove(&oldest);
                }
            }
            self.order.push_back(key.clone());
        }
        self.entries.insert(key, value);
    }

    fn clear(&mut self) {
        self.order.clear();
        self.entries.clear();
    }
}

/// The role-based access control engine: role registry, user assignments,
/// and the permission-check algorithm (direct grants first, then
/// depth-first inherited roles, default deny).
pub struct Rbac {
    roles: Mutex<HashMap<String, Role>>,
    assignments: Mutex<HashMap<String, UserAssignment>>,
    cache: Mutex<DenialCache>,
}

impl Default for Rbac {
    fn default() -> Self {
        Self::new()
    }
}

impl Rbac {
    /// Construct an engine seeded with every built-in role.
    #[must_use]
    pub fn new() -> Self {
        let mut roles = HashMap::new();
        for role in builtin_roles() {
            roles.insert(role.id.clone(), role);
        }
        Self {
            roles: Mutex::new(roles),
            assignments: Mutex::new(HashMap::new()),
            cache: Mutex::new(DenialCache::default()),
        }
    }

    /// Define or replace a custom role.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::Forbidden`] if `role.id` names a built-in role.
    pub fn define_role(&self, role: Role) -> Result<(), AegisError> {
        let mut roles = self.roles.lock().expect("rbac lock poisoned");
        if let Some(existing) = roles.get(&role.id) {
            if existing.immutable {
                return Err(AegisError::new(
                    ErrorCode::Forbidden,
                    "built-in roles cannot be redefined",
                )
                .with_context("role_id", role.id.clone()));
            }
        }
        roles.insert(role.id.clone(), role);
        drop(roles);
        self.cache.lock().expect("rbac lock poisoned").clear();
        Ok(())
    }

    /// Remove a custom role.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::Forbidden`] if the role is built-in, or
    /// [`ErrorCode::NotFound`] if it does not exist.
    pub fn remove_role(&self, role_id: &str) -> Result<(), AegisError> {
        let mut roles = self.roles.lock().expect("rbac lock poisoned");
        match roles.get(role_id) {
            Some(r) if r.immutable => {
                return Err(AegisError::new(
                    ErrorCode::Forbidden,
                    "built-in roles cannot be removed",
                )
                .with_context("role_id", role_id));
            }
            None => {
                return Err(AegisError::new(ErrorCode::NotFound, "role not found")
                    .with_context("role_id", role_id));
            }
            Some(_) => {}
        }
        roles.remove(role_id);
        drop(roles);
        self.cache.lock().expect("rbac lock poisoned").clear();
        Ok(())
    }

    /// Look up a role by id.
    #[must_use]
    pub fn get_role(&self, role_id: &str) -> Option<Role> {
        self.roles.lock().expect("rbac lock poisoned").get(role_id).cloned()
    }

    /// List every defined role, built-in and custom.
    #[must_use]
    pub fn list_roles(&self) -> Vec<Role> {
        self.roles.lock().expect("rbac lock poisoned").values().cloned().collect()
    }

    /// Assign a role to a user, replacing any existing active assignment.
    pub fn assign_user_role(&self, user_id: &str, role_id: &str, assigned_by: &str, now_ms: u64) {
        let mut assignments = self.assignments.lock().expect("rbac lock poisoned");
        assignments.insert(
            user_id.to_string(),
            UserAssignment {
                user_id: user_id.to_string(),
                role_id: role_id.to_string(),
                assigned_by: assigned_by.to_string(),
                assigned_at: now_ms,
                revoked_at: None,
            },
        );
    }

    /// Revoke a user's active assignment, if any.
    pub fn revoke_user_role(&self, user_id: &str, now_ms: u64) {
        let mut assignments = self.assignments.lock().expect("rbac lock poisoned");
        if let Some(a) = assignments.get_mut(user_id) {
            a.revoked_at = Some(now_ms);
        }
    }

    /// List every assignment ever made (active and revoked).
    #[must_use]
    pub fn list_user_assignments(&self) -> Vec<UserAssignment> {
        self.assignments
            .lock()
            .expect("rbac lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    /// Check whether `role_id` grants `request`, walking inherited roles
    /// depth-first with cycle detection. Results are cached unless the
    /// request carries a context (context-dependent results are not safe
    /// to cache under the same key).
    #[must_use]
    pub fn check_permission(&self, role_id: &str, request: &CheckRequest<'_>) -> Decision {
        if request.context.is_none() {
            let key = (
                role_id.to_string(),
                request.resource.to_string(),
                request.action.to_string(),
            );
            if let Some(cached) = self.cache.lock().expect("rbac lock poisoned").get(&key) {
                return if cached {
                    Decision {
                        granted: true,
                        reason: "permission matched (cached)".into(),
                        matched_resource: None,
                    }
                } else {
                    Decision::deny("no matching permission (cached)")
                };
            }
        }

        let decision = self.resolve(role_id, request);

        if request.context.is_none() {
            let key = (
                role_id.to_string(),
                request.resource.to_string(),
                request.action.to_string(),
            );
            self.cache
                .lock()
                .expect("rbac lock poisoned")
                .insert(key, decision.granted);
        }

        if decision.granted {
            debug!(role = role_id, resource = request.resource, action = request.action, "permission granted");
        } else {
            info!(role = role_id, resource = request.resource, action = request.action, reason = %decision.reason, "permission denied");
        }
        decision
    }

    /// Like [`Self::check_permission`] but returns an [`AegisError`] with
    /// [`ErrorCode::Forbidden`] on denial.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::Forbidden`] if the role does not grant the
    /// requested resource/action.
    pub fn require_permission(
        &self,
        role_id: &str,
        request: &CheckRequest<'_>,
    ) -> Result<(), AegisError> {
        let decision = self.check_permission(role_id, request);
        if decision.granted {
            Ok(())
        } else {
            Err(AegisError::new(ErrorCode::Forbidden, decision.reason)
                .with_context("role", role_id)
                .with_context("resource", request.resource)
                .with_context("action", request.action))
        }
    }

    fn resolve(&self, role_id: &str, request: &CheckRequest<'_>) -> Decision {
        let roles = self.roles.lock().expect("rbac lock poisoned");
        let mut visited = HashSet::new();
        match Self::resolve_recursive(&roles, role_id, request, &mut visited) {
            Resolution::Matched(perm) => Decision::allow(&perm),
            Resolution::Cycle => Decision::deny("circular inheritance"),
            Resolution::NoMatch => Decision::deny("no matching permission"),
        }
    }

    fn resolve_recursive(
        roles: &HashMap<String, Role>,
        role_id: &str,
        request: &CheckRequest<'_>,
        visited: &mut HashSet<String>,
    ) -> Resolution {
        if !visited.insert(role_id.to_string()) {
            // Cycle: the rest of the graph may still resolve the request
            // through a different, non-cyclic branch.
            return Resolution::Cycle;
        }
        let Some(role) = roles.get(role_id) else {
            return Resolution::NoMatch;
        };
        for perm in &role.permissions {
            if perm.matches(request.resource, request.action, request.context.as_ref()) {
                return Resolution::Matched(perm.clone());
            }
        }
        let mut saw_cycle = false;
        for parent in &role.inherit_from {
            match Self::resolve_recursive(roles, parent, request, visited) {
                Resolution::Matched(perm) => return Resolution::Matched(perm),
                Resolution::Cycle => saw_cycle = true,
                Resolution::NoMatch => {}
            }
        }
        if saw_cycle {
            Resolution::Cycle
        } else {
            Resolution::NoMatch
        }
    }
}

/// Outcome of walking a role's inheritance graph for a single permission
/// check: a matching permission, no match anywhere in the graph, or a cycle
/// that left the question unresolved on every branch that hit it.
enum Resolution {
    Matched(Permission),
    Cycle,
    NoMatch,
}
