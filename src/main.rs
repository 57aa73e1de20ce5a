// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use std::path::PathBuf;

use care_ledger::{
    import::load_csv, init_tracing, setup_database, AppConfig, FinanceService, NewIncomeRecord,
    Plan, Subscription, SubscriptionStatus,
};

#[derive(Parser)]
#[command(name = "care-ledger", version, about = "Doctor income ledger and surgery records")]
struct Cli {
    /// SQLite database file
    #[arg(long, env = "CARE_LEDGER_DB", global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the database schema
    Init,
    /// Register a doctor on the free plan
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
    },
    /// Add a hospital to a doctor's finance ledger
    AddHospital {
        #[arg(long)]
        doctor: String,
        #[arg(long)]
        name: String,
        /// Apply 5% withholding tax
        #[arg(long)]
        wht: bool,
    },
    /// Add one income record to a hospital
    AddRecord {
        #[arg(long)]
        doctor: String,
        #[arg(long)]
        hospital: String,
        /// channeling | surgical
        #[arg(long)]
        kind: String,
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        patients: Option<u32>,
        #[arg(long)]
        income: Option<f64>,
        #[arg(long)]
        bht: Option<String>,
        #[arg(long)]
        amount: Option<f64>,
    },
    /// Import income records from CSV (kind,date,patient_count,income,bht,amount)
    Import {
        #[arg(long)]
        doctor: String,
        #[arg(long)]
        hospital: String,
        csv: PathBuf,
    },
    /// Print the per-hospital finance summary
    Summary {
        #[arg(long)]
        doctor: String,
    },
    /// Change a doctor's subscription
    Subscription {
        #[arg(long)]
        doctor: String,
        /// free | premium
        #[arg(long)]
        plan: Plan,
        /// active | cancelled | past_due
        #[arg(long, default_value = "active")]
        status: SubscriptionStatus,
    },
    /// Terminal dashboard
    Ui {
        #[arg(long)]
        doctor: String,
    },
}

fn main() -> Result<()> {
    init_tracing("care_ledger=warn");

    let cli = Cli::parse();
    let mut config = AppConfig::from_env()?;
    if let Some(db) = cli.db {
        config.db_path = db;
    }

    let conn = Connection::open(&config.db_path)
        .with_context(|| format!("Failed to open database at {:?}", config.db_path))?;
    setup_database(&conn)?;
    let service = FinanceService::new(&conn, config.limits);

    match cli.command {
        Command::Init => {
            println!("✓ Database initialized at {:?}", config.db_path);
        }
        Command::Register { name, email } => {
            let doctor = service.register_doctor(&name, &email)?;
            println!("✓ Registered {} ({})", doctor.name, doctor.plan());
            println!("  id: {}", doctor.id);
        }
        Command::AddHospital { doctor, name, wht } => {
            let hospital = service.add_hospital(&doctor, &name, wht)?;
            println!("✓ Added hospital {}", hospital.name);
            println!("  id: {}", hospital.id);
        }
        Command::AddRecord {
            doctor,
            hospital,
            kind,
            date,
            patients,
            income,
            bht,
            amount,
        } => {
            let record = NewIncomeRecord {
                kind,
                date,
                patient_count: patients,
                income,
                bht,
                amount,
            };
            let hospital = service.add_record(&doctor, &hospital, record)?;
            println!(
                "✓ {} now has {} income record(s)",
                hospital.name,
                hospital.records.len()
            );
        }
        Command::Import {
            doctor,
            hospital,
            csv,
        } => {
            println!("📂 Loading {:?}...", csv);
            let rows = load_csv(&csv).with_context(|| format!("Failed to read {:?}", csv))?;
            println!("✓ Loaded {} rows", rows.len());

            let report = service.import_records(&doctor, &hospital, rows)?;
            println!("✓ Inserted:   {}", report.inserted);
            println!("✓ Duplicates: {}", report.duplicates);
            if report.rejected > 0 {
                println!("⚠️  Rejected:   {}", report.rejected);
            }
        }
        Command::Summary { doctor } => print_summary(&service, &doctor)?,
        Command::Subscription {
            doctor,
            plan,
            status,
        } => {
            let doctor = service.set_subscription(&doctor, Subscription { plan, status })?;
            println!(
                "✓ {} is now on the {} plan ({})",
                doctor.name,
                doctor.plan(),
                doctor.subscription.status.as_str()
            );
        }
        Command::Ui { doctor } => run_ui_mode(&service, &doctor)?,
    }

    Ok(())
}

fn print_summary(service: &FinanceService, doctor_id: &str) -> Result<()> {
    let doctor = service.doctor(doctor_id)?;
    let rows = service.finance_overview(doctor_id)?;
    let stats = service.dashboard_stats(doctor_id)?;

    println!("💰 {} ({} plan)", doctor.name, doctor.plan());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!(
        "{:<28} {:>4} {:>12} {:>12} {:>12}",
        "Hospital", "WHT", "Channeling", "Surgical", "Payable"
    );
    for row in &rows {
        println!(
            "{:<28} {:>4} {:>12.2} {:>12.2} {:>12.2}",
            row.name,
            if row.wht_enabled { "5%" } else { "-" },
            row.channeling_income,
            row.surgical_income,
            row.total_payable
        );
    }
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Total payable: {:.0}", stats.income);
    println!("Surgery records: {}", stats.records);

    Ok(())
}

#[cfg(feature = "tui")]
fn run_ui_mode(service: &FinanceService, doctor_id: &str) -> Result<()> {
    let doctor = service.doctor(doctor_id)?;
    let hospitals = service.hospitals(doctor_id)?;
    let surgeries = service.surgery_records(doctor_id)?;
    let stats = service.dashboard_stats(doctor_id)?;

    let mut app = ui::App::new(doctor, hospitals, surgeries, stats);
    ui::run_ui(&mut app)?;

    println!("\n✅ UI closed");
    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_service: &FinanceService, _doctor_id: &str) -> Result<()> {
    anyhow::bail!("TUI mode not available, rebuild with: cargo build --features tui")
}
