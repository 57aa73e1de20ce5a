// Care Ledger - Core Library
// Doctor income ledger, surgery records and free-plan quotas.
// Shared by the CLI, the API server and the tests.

pub mod config;
pub mod db;
pub mod entities;
pub mod error;
pub mod finance;
pub mod import;
pub mod plan_limits;
pub mod service;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use config::{init_tracing, AppConfig};
pub use db::{setup_database, Event};
pub use entities::{
    Doctor, Hospital, IncomeRecord, LedgerEntry, NewIncomeRecord, NewProgressEntry,
    NewSurgeryRecord, Plan, ProgressEntry, RecordId, RecordLedger, Subscription,
    SubscriptionStatus, SurgeryRecord,
};
pub use error::{LedgerError, LedgerResult};
pub use finance::{summarize_hospital, HospitalOverview, HospitalSummary, WHT_RATE};
pub use import::{load_csv, ImportReport};
pub use plan_limits::{check_plan_limit, PlanAction, PlanDecision, PlanLimits, Usage};
pub use service::{DashboardStats, FinanceService};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
