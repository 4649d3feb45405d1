// SPDX-License-Identifier: MIT OR Apache-2.0
//! Role-based access control: wildcard resource matching, role inheritance,
//! conditional permissions, and a bounded denial cache.
//!
//! Every check defaults to deny. Built-in roles (`role_admin`,
//! `role_operator`, `role_auditor`, `role_viewer`, and three domain roles)
//! are immutable — attempts to redefine or remove them fail with
//! [`aegis_error::ErrorCode::Forbidden`].

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod builtin;
mod engine;
mod role;

pub use builtin::builtin_roles;
pub use engine::{CheckRequest, Decision, Rbac};
pub use role::{Condition, ConditionOperator, Permission, Role, UserAssignment};
