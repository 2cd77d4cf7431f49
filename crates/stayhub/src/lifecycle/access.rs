use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::domain::UserId;
use super::error::CoordinatorError;

/// Platform role carried by the authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Tenant,
    Owner,
    Admin,
}

impl FromStr for Role {
    type Err = CoordinatorError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "tenant" => Ok(Self::Tenant),
            "owner" => Ok(Self::Owner),
            "admin" => Ok(Self::Admin),
            _ => Err(CoordinatorError::InvalidArgument("Invalid role".to_string())),
        }
    }
}

/// Already-authenticated caller handed to every coordinator operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: impl Into<UserId>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }

    pub fn tenant(user_id: &str) -> Self {
        Self::new(UserId::from(user_id), Role::Tenant)
    }

    pub fn owner(user_id: &str) -> Self {
        Self::new(UserId::from(user_id), Role::Owner)
    }

    pub fn admin(user_id: &str) -> Self {
        Self::new(UserId::from(user_id), Role::Admin)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// How the caller relates to the record they are acting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Tenant,
    Owner,
    Admin,
}

impl Relation {
    pub fn label(&self) -> &'static str {
        match self {
            Relation::Tenant => "tenant",
            Relation::Owner => "owner",
            Relation::Admin => "admin",
        }
    }
}

/// Who holds a stake in the record an operation targets.
#[derive(Debug, Clone, Copy)]
pub enum Stake<'a> {
    /// Either side of a tenancy, or an admin.
    Parties {
        tenant: &'a UserId,
        owner: &'a UserId,
    },
    /// The tenant (or visitor, or payer) only.
    Tenant(&'a UserId),
    /// The owner (or receiver) only.
    Owner(&'a UserId),
    OwnerOrAdmin(&'a UserId),
    AdminOnly,
}

/// Single capability check shared by every coordinator.
pub fn authorize(actor: &Actor, stake: Stake<'_>) -> Result<Relation, CoordinatorError> {
    let relation = match stake {
        Stake::Parties { tenant, owner } => {
            if &actor.user_id == tenant {
                Some(Relation::Tenant)
            } else if &actor.user_id == owner {
                Some(Relation::Owner)
            } else if actor.is_admin() {
                Some(Relation::Admin)
            } else {
                None
            }
        }
        Stake::Tenant(tenant) => (&actor.user_id == tenant).then_some(Relation::Tenant),
        Stake::Owner(owner) => (&actor.user_id == owner).then_some(Relation::Owner),
        Stake::OwnerOrAdmin(owner) => {
            if &actor.user_id == owner {
                Some(Relation::Owner)
            } else if actor.is_admin() {
                Some(Relation::Admin)
            } else {
                None
            }
        }
        Stake::AdminOnly => actor.is_admin().then_some(Relation::Admin),
    };

    relation.ok_or(CoordinatorError::Forbidden)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_parse_regardless_of_casing() {
        assert_eq!("Admin".parse::<Role>().expect("parses"), Role::Admin);
        assert_eq!(" OWNER ".parse::<Role>().expect("parses"), Role::Owner);
        assert!("superuser".parse::<Role>().is_err());
    }

    #[test]
    fn parties_resolve_to_relation() {
        let tenant = UserId::from("t-1");
        let owner = UserId::from("o-1");
        let stake = Stake::Parties {
            tenant: &tenant,
            owner: &owner,
        };
        assert_eq!(
            authorize(&Actor::tenant("t-1"), stake).expect("tenant allowed"),
            Relation::Tenant
        );
        assert_eq!(
            authorize(&Actor::owner("o-1"), stake).expect("owner allowed"),
            Relation::Owner
        );
        assert_eq!(
            authorize(&Actor::admin("root"), stake).expect("admin allowed"),
            Relation::Admin
        );
        assert_eq!(
            authorize(&Actor::tenant("t-2"), stake),
            Err(CoordinatorError::Forbidden)
        );
    }

    #[test]
    fn admin_does_not_pass_tenant_only_checks() {
        let tenant = UserId::from("t-1");
        assert_eq!(
            authorize(&Actor::admin("root"), Stake::Tenant(&tenant)),
            Err(CoordinatorError::Forbidden)
        );
        assert!(authorize(&Actor::admin("root"), Stake::AdminOnly).is_ok());
        assert!(authorize(&Actor::owner("o-1"), Stake::AdminOnly).is_err());
    }
}
