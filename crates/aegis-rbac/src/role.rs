// SPDX-License-Identifier: MIT OR Apache-2.0
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Comparison operator for a [`Condition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    /// Field equals value.
    Eq,
    /// Field does not equal value.
    Neq,
    /// Field is a member of the value array.
    In,
    /// Field is not a member of the value array.
    Nin,
    /// Field is numerically greater than value.
    Gt,
    /// Field is numerically greater than or equal to value.
    Gte,
    /// Field is numerically less than value.
    Lt,
    /// Field is numerically less than or equal to value.
    Lte,
}

/// A constraint evaluated against the caller-supplied context of a
/// permission check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    /// Dot-free key looked up in the check context.
    pub field: String,
    /// Comparison to perform.
    pub operator: ConditionOperator,
    /// Value to compare against.
    pub value: Value,
}

impl Condition {
    /// Evaluate this condition against a context map. A field absent from
    /// `context` fails the condition (default deny).
    #[must_use]
    pub fn evaluate(&self, context: &serde_json::Map<String, Value>) -> bool {
        let Some(actual) = context.get(&self.field) else {
            return false;
        };
        match self.operator {
            ConditionOperator::Eq => actual == &self.value,
            ConditionOperator::Neq => actual != &self.value,
            ConditionOperator::In => self
                .value
                .as_array()
                .is_some_and(|arr| arr.contains(actual)),
            ConditionOperator::Nin => self
                .value
                .as_array()
                .is_some_and(|arr| !arr.contains(actual)),
            ConditionOperator::Gt | ConditionOperator::Gte | ConditionOperator::Lt | ConditionOperator::Lte => {
                match (actual.as_f64(), self.value.as_f64()) {
                    (Some(a), Some(b)) => match self.operator {
                        ConditionOperator::Gt => a > b,
                        ConditionOperator::Gte => a >= b,
                        ConditionOperator::Lt => a < b,
                        ConditionOperator::Lte => a <= b,
                        _ => unreachable!(),
                    },
                    _ => false,
                }
            }
        }
    }
}

/// A single resource/action grant, optionally narrowed by [`Condition`]s.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Permission {
    /// `"*"`, a literal resource name, or a `prefix*` glob.
    pub resource: String,
    /// Actions granted on `resource`; may include `"*"`.
    pub actions: Vec<String>,
    /// Extra constraints the check context must satisfy. Conditions whose
    /// value the caller didn't supply are skipped (treated as absent).
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl Permission {
    /// Construct a permission with no conditions.
    #[must_use]
    pub fn new(resource: impl Into<String>, actions: Vec<String>) -> Self {
        Self {
            resource: resource.into(),
            actions,
            conditions: Vec::new(),
        }
    }

    fn resource_matches(&self, resource: &str) -> bool {
        if self.resource == "*" || self.resource == resource {
            return true;
        }
        if let Some(prefix) = self.resource.strip_suffix('*') {
            return resource.starts_with(prefix);
        }
        false
    }

    fn action_matches(&self, action: &str) -> bool {
        self.actions.iter().any(|a| a == "*" || a == action)
    }

    fn conditions_match(&self, context: Option<&serde_json::Map<String, Value>>) -> bool {
        if self.conditions.is_empty() {
            return true;
        }
        let Some(context) = context else {
            // Conditions present but no context supplied: conditions whose
            // value the caller can't satisfy default to denied, matching
            // the engine's default-deny stance.
            return false;
        };
        self.conditions.iter().all(|c| c.evaluate(context))
    }

    /// Whether this permission grants `action` on `resource` given an
    /// optional context map for condition evaluation.
    #[must_use]
    pub fn matches(
        &self,
        resource: &str,
        action: &str,
        context: Option<&serde_json::Map<String, Value>>,
    ) -> bool {
        self.resource_matches(resource) && self.action_matches(action) && self.conditions_match(context)
    }
}

/// A named collection of [`Permission`]s, optionally inheriting from other
/// roles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    /// Stable identifier, conventionally `role_<slug>`.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Permissions granted directly by this role.
    #[serde(default)]
    pub permissions: Vec<Permission>,
    /// Role ids this role inherits permissions from.
    #[serde(default)]
    pub inherit_from: Vec<String>,
    /// Built-in roles cannot be redefined or removed.
    #[serde(default)]
    pub immutable: bool,
}

impl Role {
    /// Construct a mutable role with no inheritance.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            permissions: Vec::new(),
            inherit_from: Vec::new(),
            immutable: false,
        }
    }

    /// Builder-style permission addition.
    #[must_use]
    pub fn with_permission(mut self, permission: Permission) -> Self {
        self.permissions.push(permission);
        self
    }

    /// Builder-style inheritance declaration.
    #[must_use]
    pub fn inheriting(mut self, role_id: impl Into<String>) -> Self {
        self.inherit_from.push(role_id.into());
        self
    }
}

/// A user's active role binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAssignment {
    /// The user this assignment applies to.
    pub user_id: String,
    /// Role granted to the user.
    pub role_id: String,
    /// Who made this assignment.
    pub assigned_by: String,
    /// When the assignment was made (ms since epoch).
    pub assigned_at: u64,
    /// When the assignment was revoked, if it has been.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<u64>,
}

impl UserAssignment {
    /// `true` if this assignment has not been revoked.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.revoked_at.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wildcard_resource_matches_anything() {
        let perm = Permission::new("*", vec!["read".into()]);
        assert!(perm.matches("tasks", "read", None));
        assert!(perm.matches("billing", "read", None));
    }

    #[test]
    fn prefix_glob_matches_prefix_only() {
        let perm = Permission::new("tasks:*", vec!["read".into()]);
        assert!(perm.matches("tasks:abc", "read", None));
        assert!(!perm.matches("billing:abc", "read", None));
    }

    #[test]
    fn action_wildcard_matches_any_action() {
        let perm = Permission::new("tasks", vec!["*".into()]);
        assert!(perm.matches("tasks", "cancel", None));
    }

    #[test]
    fn condition_requires_context() {
        let perm = Permission {
            resource: "billing".into(),
            actions: vec!["read".into()],
            conditions: vec![Condition {
                field: "region".into(),
                operator: ConditionOperator::Eq,
                value: json!("us"),
            }],
        };
        assert!(!perm.matches("billing", "read", None));
        let mut ctx = serde_json::Map::new();
        ctx.insert("region".into(), json!("us"));
        assert!(perm.matches("billing", "read", Some(&ctx)));
        ctx.insert("region".into(), json!("eu"));
        assert!(!perm.matches("billing", "read", Some(&ctx)));
    }

    #[test]
    fn numeric_condition_operators() {
        let gt = Condition {
            field: "amount".into(),
            operator: ConditionOperator::Gte,
            value: json!(100),
        };
        let mut ctx = serde_json::Map::new();
        ctx.insert("amount".into(), json!(150));
        assert!(gt.evaluate(&ctx));
        ctx.insert("amount".into(), json!(50));
        assert!(!gt.evaluate(&ctx));
    }

    #[test]
    fn in_and_nin_operators() {
        let cond = Condition {
            field: "env".into(),
            operator: ConditionOperator::In,
            value: json!(["staging", "dev"]),
        };
        let mut ctx = serde_json::Map::new();
        ctx.insert("env".into(), json!("dev"));
        assert!(cond.evaluate(&ctx));
        ctx.insert("env".into(), json!("prod"));
        assert!(!cond.evaluate(&ctx));
    }
}
