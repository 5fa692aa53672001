//! Membership administration
//!
//! Adding, re-roling and removing base members. Guarded at the HTTP layer
//! by `can_manage_members`; the rules here protect the base itself: no
//! self-service role changes, a per-base member quota, and the last
//! managerial member cannot be removed.

use serde::Serialize;
use tracing::info;

use super::error::{EngineError, Result};
use super::store::{Membership, MembershipStore, RoleStore};

/// Default per-base member quota when the organization sets none.
pub const DEFAULT_MEMBER_LIMIT: usize = 50;

/// Resolve and validate a role reference for a base.
fn role_in_base(
    roles: &dyn RoleStore,
    base_id: &str,
    role_id: &str,
) -> Result<super::policy::role::RolePolicy> {
    match roles.find_by_id(role_id) {
        Some(role) if role.base_id == base_id => Ok(role),
        _ => Err(EngineError::InvalidRole),
    }
}

pub fn add_member(
    members: &dyn MembershipStore,
    roles: &dyn RoleStore,
    base_id: &str,
    user_id: &str,
    role_id: &str,
    member_limit: usize,
) -> Result<Membership> {
    role_in_base(roles, base_id, role_id)?;

    if members.find(base_id, user_id).is_some() {
        return Err(EngineError::AlreadyMember);
    }
    if members.count(base_id) >= member_limit {
        return Err(EngineError::MemberLimitReached);
    }

    let membership = Membership::new(base_id, user_id, role_id);
    members.insert(membership.clone());
    info!(base = %base_id, user = %user_id, role = %role_id, "member added");
    Ok(membership)
}

pub fn change_role(
    members: &dyn MembershipStore,
    roles: &dyn RoleStore,
    base_id: &str,
    caller_id: &str,
    target_user_id: &str,
    new_role_id: &str,
) -> Result<Membership> {
    if caller_id == target_user_id {
        return Err(EngineError::CannotChangeOwnRole);
    }
    if members.find(base_id, target_user_id).is_none() {
        return Err(EngineError::MemberNotFound);
    }
    role_in_base(roles, base_id, new_role_id)?;

    members.set_role(base_id, target_user_id, new_role_id);
    info!(base = %base_id, user = %target_user_id, role = %new_role_id, "member role changed");
    members
        .find(base_id, target_user_id)
        .ok_or(EngineError::MemberNotFound)
}

pub fn remove_member(
    members: &dyn MembershipStore,
    roles: &dyn RoleStore,
    base_id: &str,
    user_id: &str,
) -> Result<()> {
    let membership = members
        .find(base_id, user_id)
        .ok_or(EngineError::MemberNotFound)?;

    let target_role = roles.find_by_id(&membership.role_id);
    if target_role.as_ref().map(|r| r.is_managerial()).unwrap_or(false) {
        let remaining_managers = members
            .list(base_id)
            .iter()
            .filter(|m| m.user_id != user_id)
            .filter_map(|m| roles.find_by_id(&m.role_id))
            .filter(|r| r.is_managerial())
            .count();
        if remaining_managers == 0 {
            return Err(EngineError::CannotRemoveLastManager);
        }
    }

    members.remove(base_id, user_id);
    info!(base = %base_id, user = %user_id, "member removed");
    Ok(())
}

/// The caller's own standing in a base, for the `me` endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipView {
    pub is_member: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_name: Option<String>,
    pub can_manage_base: bool,
}

pub fn my_membership(
    members: &dyn MembershipStore,
    roles: &dyn RoleStore,
    base_id: &str,
    user_id: &str,
) -> MembershipView {
    match members.find(base_id, user_id) {
        Some(membership) => {
            let role = roles.find_by_id(&membership.role_id);
            MembershipView {
                is_member: true,
                role_name: role.as_ref().map(|r| r.name.clone()),
                can_manage_base: role.map(|r| r.is_managerial()).unwrap_or(false),
                role_id: Some(membership.role_id),
            }
        }
        None => MembershipView {
            is_member: false,
            role_id: None,
            role_name: None,
            can_manage_base: false,
        },
    }
}
