// SPDX-License-Identifier: MIT OR Apache-2.0
use crate::role::{Permission, Role};

/// Return every built-in, immutable role the engine seeds on construction.
#[must_use]
pub fn builtin_roles() -> Vec<Role> {
    vec![
        Role {
            id: "role_admin".into(),
            name: "Administrator".into(),
            description: "Unrestricted access to every resource and action.".into(),
            permissions: vec![Permission::new("*", vec!["*".into()])],
            inherit_from: Vec::new(),
            immutable: true,
        },
        Role {
            id: "role_operator".into(),
            name: "Operator".into(),
            description: "Creates, reads, and cancels tasks; read-only elsewhere.".into(),
            permissions: vec![
                Permission::new("tasks", vec!["create".into(), "read".into(), "cancel".into()]),
                Permission::new("metrics", vec!["read".into()]),
            ],
            inherit_from: Vec::new(),
            immutable: true,
        },
        Role {
            id: "role_auditor".into(),
            name: "Auditor".into(),
            description: "Read-only access to audit and permission decisions.".into(),
            permissions: vec![
                Permission::new("audit", vec!["read".into(), "verify".into()]),
                Permission::new("metrics", vec!["read".into()]),
            ],
            inherit_from: Vec::new(),
            immutable: true,
        },
        Role {
            id: "role_viewer".into(),
            name: "Viewer".into(),
            description: "Read-only access to tasks and metrics.".into(),
            permissions: vec![
                Permission::new("tasks", vec!["read".into()]),
                Permission::new("metrics", vec!["read".into()]),
            ],
            inherit_from: Vec::new(),
            immutable: true,
        },
        Role {
            id: "role_capture_operator".into(),
            name: "Capture Operator".into(),
            description: "Inherits operator access, scoped to capture tasks.".into(),
            permissions: vec![Permission::new(
                "tasks:capture*",
                vec!["create".into(), "read".into(), "cancel".into()],
            )],
            inherit_from: vec!["role_operator".into()],
            immutable: true,
        },
        Role {
            id: "role_security_auditor".into(),
            name: "Security Auditor".into(),
            description: "Inherits auditor access plus RBAC role inspection.".into(),
            permissions: vec![Permission::new("roles", vec!["read".into()])],
            inherit_from: vec!["role_auditor".into()],
            immutable: true,
        },
        Role {
            id: "role_voice_operator".into(),
            name: "Voice Operator".into(),
            description: "Inherits operator access, scoped to voice tasks.".into(),
            permissions: vec![Permission::new(
                "tasks:voice*",
                vec!["create".into(), "read".into(), "cancel".into()],
            )],
            inherit_from: vec!["role_operator".into()],
            immutable: true,
        },
    ]
}
