use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{dispatch::DispatchError, middleware::auth::AuthUser};

/// Closed set of caller roles. Stored as lowercase strings in the users
/// table and in JWT claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Merchant,
    Rider,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Merchant => "merchant",
            Role::Rider => "rider",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(Role::Customer),
            "merchant" => Ok(Role::Merchant),
            "rider" => Ok(Role::Rider),
            "admin" => Ok(Role::Admin),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operations guarded by role. Each maps to exactly one permitted role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    CreateOrder,
    CustomerHistory,
    ListAvailableOrders,
    GrabOrder,
    RiderCancelOrder,
    RiderAdvanceStatus,
    RiderHistory,
    RiderEarnings,
    MerchantUpdateOrder,
    MerchantOrders,
}

impl Operation {
    pub fn required_role(self) -> Role {
        match self {
            Operation::CreateOrder | Operation::CustomerHistory => Role::Customer,
            Operation::ListAvailableOrders
            | Operation::GrabOrder
            | Operation::RiderCancelOrder
            | Operation::RiderAdvanceStatus
            | Operation::RiderHistory
            | Operation::RiderEarnings => Role::Rider,
            Operation::MerchantUpdateOrder | Operation::MerchantOrders => Role::Merchant,
        }
    }
}

/// Check that the caller's role may invoke `operation`. Denials carry the
/// human-readable reason and are surfaced as business failures, never as
/// transport errors. No side effects.
pub fn authorize(user: &AuthUser, operation: Operation) -> Result<(), DispatchError> {
    let required = operation.required_role();
    if user.role == required {
        Ok(())
    } else {
        Err(DispatchError::PermissionDenied(denied_message(required)))
    }
}

fn denied_message(required: Role) -> String {
    let msg = match required {
        Role::Rider => "无权限访问，仅骑手可操作",
        Role::Merchant => "无权限访问，仅商家可操作",
        Role::Customer => "无权限访问，仅用户可操作",
        Role::Admin => "无权限访问，仅管理员可操作",
    };
    msg.to_string()
}
