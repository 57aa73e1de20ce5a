// 🩺 Doctor Entity - identity + subscription
//
// A doctor owns hospitals (finance ledgers) and surgery records.
// The subscription is the only value that changes after registration:
// payment confirmation upgrades it, cancellation downgrades it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::LedgerError;

// ============================================================================
// SUBSCRIPTION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Free,
    Premium,
}

impl Plan {
    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Free => "free",
            Plan::Premium => "premium",
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Plan {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "free" => Ok(Plan::Free),
            "premium" => Ok(Plan::Premium),
            other => Err(LedgerError::InvalidInput(format!("unknown plan: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Cancelled,
    PastDue,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Cancelled => "cancelled",
            SubscriptionStatus::PastDue => "past_due",
        }
    }
}

impl FromStr for SubscriptionStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "active" => Ok(SubscriptionStatus::Active),
            "cancelled" | "canceled" => Ok(SubscriptionStatus::Cancelled),
            "past_due" => Ok(SubscriptionStatus::PastDue),
            other => Err(LedgerError::InvalidInput(format!(
                "unknown subscription status: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub plan: Plan,
    pub status: SubscriptionStatus,
}

impl Subscription {
    pub fn free() -> Self {
        Subscription {
            plan: Plan::Free,
            status: SubscriptionStatus::Active,
        }
    }

    /// Subscription after a confirmed premium payment
    pub fn premium() -> Self {
        Subscription {
            plan: Plan::Premium,
            status: SubscriptionStatus::Active,
        }
    }

    /// Subscription after the doctor cancels premium
    pub fn cancelled() -> Self {
        Subscription {
            plan: Plan::Free,
            status: SubscriptionStatus::Cancelled,
        }
    }

    pub fn is_premium(&self) -> bool {
        self.plan == Plan::Premium
    }
}

impl Default for Subscription {
    fn default() -> Self {
        Self::free()
    }
}

// ============================================================================
// DOCTOR ENTITY
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Doctor {
    /// Stable identity (UUID)
    pub id: String,
    pub name: String,
    pub email: String,
    pub subscription: Subscription,
    pub created_at: DateTime<Utc>,
}

impl Doctor {
    /// Register a new doctor on the free plan
    pub fn new(name: String, email: String) -> Self {
        Doctor {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            email,
            subscription: Subscription::free(),
            created_at: Utc::now(),
        }
    }

    pub fn plan(&self) -> Plan {
        self.subscription.plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_doctor_starts_free() {
        let doctor = Doctor::new("Dr. Perera".to_string(), "perera@example.com".to_string());

        assert_eq!(doctor.plan(), Plan::Free);
        assert_eq!(doctor.subscription.status, SubscriptionStatus::Active);
        assert_eq!(doctor.id.len(), 36);
    }

    #[test]
    fn test_plan_parsing() {
        assert_eq!("premium".parse::<Plan>().unwrap(), Plan::Premium);
        assert_eq!(" FREE ".parse::<Plan>().unwrap(), Plan::Free);
        assert!("gold".parse::<Plan>().is_err());
    }

    #[test]
    fn test_cancellation_downgrades_plan() {
        let sub = Subscription::cancelled();
        assert!(!sub.is_premium());
        assert_eq!(sub.status.as_str(), "cancelled");
    }

    #[test]
    fn test_subscription_serializes_lowercase() {
        let json = serde_json::to_value(Subscription::premium()).unwrap();
        assert_eq!(json["plan"], "premium");
        assert_eq!(json["status"], "active");
    }
}
