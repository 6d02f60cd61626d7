//! Operator commands, meant to be run from cron or by hand.
//!
//! ```bash
//! hireport-cli trial-reminders
//! hireport-cli listing-reminders --days 7
//! hireport-cli seed-templates
//! ```

use clap::{Parser, Subcommand};

use hireport_common::config::AppConfig;
use hireport_common::db;
use hireport_engine::fallback::FallbackTemplates;
use hireport_engine::templates::{PgTemplateStore, UpsertTemplateParams};
use hireport_notifier::reminders::{self, FanOutSummary};
use hireport_notifier::setup;

#[derive(Parser)]
#[command(name = "hireport-cli", about = "Hireport notification operations")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Email users whose trial ends soon
    TrialReminders {
        /// Days ahead to look (defaults to REMINDER_LEAD_DAYS)
        #[arg(long)]
        days: Option<i64>,
    },
    /// Email companies whose listings expire soon
    ListingReminders {
        /// Days ahead to look (defaults to REMINDER_LEAD_DAYS)
        #[arg(long)]
        days: Option<i64>,
    },
    /// Store every built-in template in the database
    SeedTemplates,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hireport_notifier=info,hireport_engine=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;

    let pool = db::create_pool(&config.database_url, config.db_max_connections).await?;
    db::migrate(&pool).await?;

    match cli.command {
        Command::TrialReminders { days } => {
            let days = days.unwrap_or(config.reminder_lead_days);
            let recipients =
                reminders::trial_reminder_recipients(&pool, days, &config.app_base_url).await?;
            let dispatcher = setup::email_dispatcher(pool, &config)?;
            let summary =
                reminders::fan_out(&dispatcher, reminders::TRIAL_TEMPLATE, &recipients).await;
            report("trial-reminders", summary);
        }
        Command::ListingReminders { days } => {
            let days = days.unwrap_or(config.reminder_lead_days);
            let recipients =
                reminders::listing_reminder_recipients(&pool, days, &config.app_base_url).await?;
            let dispatcher = setup::email_dispatcher(pool, &config)?;
            let summary =
                reminders::fan_out(&dispatcher, reminders::LISTING_TEMPLATE, &recipients).await;
            report("listing-reminders", summary);
        }
        Command::SeedTemplates => {
            let store = PgTemplateStore::new(pool);
            for definition in FallbackTemplates::definitions() {
                let params = UpsertTemplateParams {
                    subject: definition.subject.to_string(),
                    body: definition.body.to_string(),
                    variables: definition.variables.iter().map(|v| v.to_string()).collect(),
                };
                store.upsert(definition.name, &params).await?;
            }
            println!("Seeded {} templates", FallbackTemplates::definitions().len());
        }
    }

    Ok(())
}

fn report(command: &str, summary: FanOutSummary) {
    println!(
        "{}: sent={} skipped={} failed={}",
        command, summary.sent, summary.skipped, summary.failed
    );
}
