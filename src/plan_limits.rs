// 🚦 Plan Limit Guard - subscription quotas for free-tier doctors
//
// Premium doctors are never limited. Free doctors get three quotas:
//   - surgery records per doctor        (default 4)
//   - progress entries per record       (default 3)
//   - hospitals (finance ledgers)       (default 1)
//
// check_plan_limit is a pre-condition read: it counts and compares, the
// caller mutates afterwards. Two concurrent callers can both pass before
// either inserts. FinanceService closes that window by running the check
// and the insert inside one IMMEDIATE transaction.

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::db;
use crate::entities::Plan;
use crate::error::{LedgerError, LedgerResult};

// ============================================================================
// ACTIONS & DECISIONS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanAction {
    /// Create a new surgery record
    CreateRecord,

    /// Add a progress entry to an existing surgery record
    AddEntry { record_id: String },

    /// Add a hospital finance ledger
    AddHospital,

    /// Any action without a quota
    Other(String),
}

impl PlanAction {
    /// Map a wire action name (plus optional record id) to an action
    pub fn from_name(name: &str, context: Option<&str>) -> Self {
        match (name, context) {
            ("create_record", _) => PlanAction::CreateRecord,
            ("add_entry", Some(record_id)) => PlanAction::AddEntry {
                record_id: record_id.to_string(),
            },
            ("add_hospital", _) => PlanAction::AddHospital,
            (other, _) => PlanAction::Other(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            PlanAction::CreateRecord => "create_record",
            PlanAction::AddEntry { .. } => "add_entry",
            PlanAction::AddHospital => "add_hospital",
            PlanAction::Other(name) => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "lowercase")]
pub enum PlanDecision {
    Allow,
    Deny {
        message: String,
        upgrade_required: bool,
    },
}

impl PlanDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, PlanDecision::Allow)
    }

    /// Turn a denial into a QuotaExceeded error for `?` propagation
    pub fn into_result(self) -> LedgerResult<()> {
        match self {
            PlanDecision::Allow => Ok(()),
            PlanDecision::Deny {
                message,
                upgrade_required,
            } => Err(LedgerError::QuotaExceeded {
                message,
                upgrade_required,
            }),
        }
    }
}

// ============================================================================
// QUOTAS
// ============================================================================

/// Current usage relevant to an action
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub surgery_records: usize,
    pub hospitals: usize,
    pub entries_in_record: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanLimits {
    pub max_surgery_records: usize,
    pub max_entries_per_record: usize,
    pub max_hospitals: usize,
}

impl Default for PlanLimits {
    fn default() -> Self {
        PlanLimits {
            max_surgery_records: 4,
            max_entries_per_record: 3,
            max_hospitals: 1,
        }
    }
}

impl PlanLimits {
    /// Business rules only, no store access
    pub fn evaluate(&self, plan: Plan, action: &PlanAction, usage: &Usage) -> PlanDecision {
        if plan == Plan::Premium {
            return PlanDecision::Allow;
        }

        match action {
            PlanAction::CreateRecord if usage.surgery_records >= self.max_surgery_records => {
                deny(format!(
                    "Free plan limit reached: you can create up to {} surgery records. Upgrade to Premium for unlimited records.",
                    self.max_surgery_records
                ))
            }
            PlanAction::AddEntry { .. } if usage.entries_in_record >= self.max_entries_per_record => {
                deny(format!(
                    "Free plan limit reached: each surgery record can hold up to {} entries. Upgrade to Premium to add more.",
                    self.max_entries_per_record
                ))
            }
            PlanAction::AddHospital if usage.hospitals >= self.max_hospitals => deny(format!(
                "Free plan limit reached: you can track up to {} hospital. Upgrade to Premium to add more hospitals.",
                self.max_hospitals
            )),
            _ => PlanDecision::Allow,
        }
    }
}

fn deny(message: String) -> PlanDecision {
    PlanDecision::Deny {
        message,
        upgrade_required: true,
    }
}

// ============================================================================
// STORE-BACKED CHECK
// ============================================================================

/// Read the doctor's plan and the usage the action needs, then evaluate.
///
/// Fails only when the doctor (or, for AddEntry, the doctor's surgery
/// record) does not exist, or the store errors. A quota denial is an
/// Ok(PlanDecision::Deny).
pub fn check_plan_limit(
    conn: &Connection,
    doctor_id: &str,
    action: &PlanAction,
    limits: &PlanLimits,
) -> LedgerResult<PlanDecision> {
    let doctor = db::get_doctor(conn, doctor_id)?;

    if doctor.subscription.is_premium() {
        return Ok(PlanDecision::Allow);
    }

    let mut usage = Usage::default();
    match action {
        PlanAction::CreateRecord => {
            usage.surgery_records = db::count_surgery_records(conn, doctor_id)?;
        }
        PlanAction::AddEntry { record_id } => {
            usage.entries_in_record = db::count_progress_entries(conn, doctor_id, record_id)?;
        }
        PlanAction::AddHospital => {
            usage.hospitals = db::count_hospitals(conn, doctor_id)?;
        }
        PlanAction::Other(_) => {}
    }

    let decision = limits.evaluate(doctor.plan(), action, &usage);
    if !decision.is_allowed() {
        tracing::info!(doctor_id, action = action.name(), ?usage, "plan limit reached");
    }
    Ok(decision)
}
