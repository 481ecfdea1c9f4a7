use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::application::PlatformService;
use crate::config::{MAX_SESSION_DAYS, ServerConfig};
use crate::domain::{
    BankInfoInput, PayoutMethod, PayoutRequest, PayoutStatus, Role, format_cents, parse_cents,
};
use crate::logging::init_tracing;

/// Creator Ledger - earnings and payouts for a creator subscription platform
#[derive(Parser)]
#[command(name = "creator-ledger")]
#[command(about = "Subscriptions, creator earnings and payout requests on a transactional ledger")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(
        short,
        long,
        env = "CREATOR_LEDGER_DATABASE",
        default_value = "creator-ledger.db",
        global = true
    )]
    pub database: String,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Run the HTTP API
    Serve {
        #[command(flatten)]
        config: ServerConfig,
    },

    /// User management commands
    #[command(subcommand)]
    User(UserCommands),

    /// Login session commands
    #[command(subcommand)]
    Session(SessionCommands),

    /// Subscription tier commands
    #[command(subcommand)]
    Tier(TierCommands),

    /// Subscribe a user to a tier, paying the first period
    Subscribe {
        /// Subscriber username
        username: String,

        /// Tier ID
        tier_id: String,

        /// Do not renew when the period ends
        #[arg(long)]
        no_auto_renew: bool,
    },

    /// List a user's subscriptions
    Subscriptions {
        /// Subscriber username
        username: String,
    },

    /// Settle all expired subscriptions
    Renew {
        /// Treat this date as now (YYYY-MM-DD, defaults to now)
        #[arg(long)]
        at: Option<String>,
    },

    /// Payout request commands
    #[command(subcommand)]
    Payout(PayoutCommands),

    /// Bank details commands
    #[command(subcommand)]
    Bank(BankCommands),

    /// Show a creator's earnings summary
    Earnings {
        /// Creator username
        username: String,
    },

    /// Write every user's balances to CSV or JSON
    Snapshot {
        /// Output format: csv, json
        #[arg(long, default_value = "csv")]
        format: String,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Purge expired sessions and compact the database
    Vacuum,

    /// Import users and their subscription tiers from CSV or JSON
    Import {
        /// Input file (stdin if omitted)
        #[arg(short, long)]
        input: Option<String>,

        /// Input format: csv, json
        #[arg(long, default_value = "csv")]
        format: String,

        /// Preview without importing
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Subcommand)]
pub enum UserCommands {
    /// Create a new user
    Create {
        /// Username (3-30 letters, digits or underscores)
        username: String,

        /// Email address
        #[arg(long)]
        email: String,

        /// Display name (defaults to the username)
        #[arg(long)]
        display_name: Option<String>,

        /// Grant the admin role
        #[arg(long)]
        admin: bool,
    },

    /// List all users
    List,

    /// Show user details and balances
    Show {
        /// Username
        username: String,
    },

    /// Mark a user's identity as verified
    Verify {
        /// Username
        username: String,

        /// Revoke verification instead
        #[arg(long)]
        revoke: bool,
    },

    /// Add funds to a user's balance
    Deposit {
        /// Username
        username: String,

        /// Amount (e.g., "50.00" or "50")
        amount: String,
    },
}

#[derive(Subcommand)]
pub enum SessionCommands {
    /// Issue a session token for a user
    Issue {
        /// Username
        username: String,

        /// Session lifetime in days
        #[arg(
            long,
            default_value_t = 30,
            value_parser = clap::value_parser!(i64).range(1..=MAX_SESSION_DAYS)
        )]
        days: i64,
    },

    /// Revoke a session token
    Revoke {
        /// Session token
        token: String,
    },
}

#[derive(Subcommand)]
pub enum TierCommands {
    /// Create a subscription tier for a creator
    Create {
        /// Creator username
        creator: String,

        /// Tier name
        name: String,

        /// Price per period (e.g., "9.99")
        price: String,

        /// Tier description
        #[arg(long)]
        description: Option<String>,
    },

    /// List a creator's tiers
    List {
        /// Creator username
        creator: String,
    },
}

#[derive(Subcommand)]
pub enum PayoutCommands {
    /// Request a payout from a user's earnings balance
    Request {
        /// Username
        username: String,

        /// Amount (e.g., "150.00")
        amount: String,

        /// Payout method: bank, eth
        #[arg(long, default_value = "bank")]
        method: String,

        /// Destination address for eth payouts
        #[arg(long)]
        eth_address: Option<String>,
    },

    /// List payout requests
    List {
        /// Filter by status: pending, approved, rejected, completed
        #[arg(long)]
        status: Option<String>,

        /// Only this user's requests
        #[arg(long)]
        user: Option<String>,
    },

    /// Approve a pending payout
    Approve {
        /// Payout ID
        id: String,

        /// Note recorded on the request
        #[arg(long)]
        note: Option<String>,
    },

    /// Reject a pending payout and refund the earnings balance
    Reject {
        /// Payout ID
        id: String,

        /// Note recorded on the request
        #[arg(long)]
        note: Option<String>,
    },

    /// Mark an approved payout as completed
    Complete {
        /// Payout ID
        id: String,

        /// Note recorded on the request
        #[arg(long)]
        note: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum BankCommands {
    /// Save bank details for a user
    Set {
        /// Username
        username: String,

        #[arg(long)]
        account_holder: String,

        #[arg(long)]
        bank_name: String,

        #[arg(long)]
        account_number: String,

        #[arg(long)]
        routing_number: String,

        #[arg(long)]
        swift_code: Option<String>,

        #[arg(long)]
        country: String,
    },

    /// Show a user's bank details
    Show {
        /// Username
        username: String,
    },

    /// Remove a user's bank details
    Remove {
        /// Username
        username: String,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        init_tracing(self.verbose);

        match self.command {
            Commands::Init => {
                PlatformService::init(&self.database).await?;
                println!("Database initialized: {}", self.database);
            }

            Commands::Serve { config } => {
                let service = PlatformService::connect(&self.database)
                    .await
                    .with_context(|| format!("Failed to open database {}", self.database))?
                    .with_session_lifetime(config.session_lifetime());
                crate::http::serve(service, &config).await?;
            }

            Commands::User(cmd) => {
                let service = PlatformService::connect(&self.database).await?;
                run_user_command(&service, cmd).await?;
            }

            Commands::Session(cmd) => {
                let service = PlatformService::connect(&self.database).await?;
                run_session_command(service, cmd).await?;
            }

            Commands::Tier(cmd) => {
                let service = PlatformService::connect(&self.database).await?;
                run_tier_command(&service, cmd).await?;
            }

            Commands::Subscribe {
                username,
                tier_id,
                no_auto_renew,
            } => {
                let service = PlatformService::connect(&self.database).await?;
                let user = service.get_user(&username).await?;
                let tier_id = parse_id(&tier_id, "tier")?;

                let subscription = service.subscribe(&user, tier_id, !no_auto_renew).await?;
                println!(
                    "Subscribed {} ({}), expires {}",
                    user.username,
                    subscription.id,
                    subscription.expires_at.format("%Y-%m-%d")
                );
            }

            Commands::Subscriptions { username } => {
                let service = PlatformService::connect(&self.database).await?;
                let user = service.get_user(&username).await?;
                let subscriptions = service.list_subscriptions(&user).await?;

                if subscriptions.is_empty() {
                    println!("No subscriptions found.");
                } else {
                    println!(
                        "{:<38} {:<20} {:>10} {:<12} {:<6}",
                        "ID", "TIER", "PRICE", "EXPIRES", "RENEW"
                    );
                    println!("{}", "-".repeat(90));
                    for info in subscriptions {
                        println!(
                            "{:<38} {:<20} {:>10} {:<12} {:<6}",
                            info.subscription.id,
                            truncate(&info.tier_name, 20),
                            format_cents(info.price_cents),
                            info.subscription.expires_at.format("%Y-%m-%d"),
                            if info.subscription.auto_renew { "yes" } else { "no" }
                        );
                    }
                }
            }

            Commands::Renew { at } => {
                let service = PlatformService::connect(&self.database).await?;
                let now = match at {
                    Some(date_str) => parse_date(&date_str).with_context(|| {
                        format!("Invalid date format '{}'. Use YYYY-MM-DD", date_str)
                    })?,
                    None => Utc::now(),
                };

                let report = service.renew_expired_subscriptions(now).await?;
                println!("Expired subscriptions: {}", report.examined);
                println!("  Renewed:             {}", report.renewed);
                println!("  Auto-renew disabled: {}", report.auto_renew_disabled);
                println!("  Removed:             {}", report.removed);
                if report.skipped > 0 {
                    println!("  Skipped:             {}", report.skipped);
                }
                if report.failed > 0 {
                    println!("  Failed:              {}", report.failed);
                }
            }

            Commands::Payout(cmd) => {
                let service = PlatformService::connect(&self.database).await?;
                run_payout_command(&service, cmd).await?;
            }

            Commands::Bank(cmd) => {
                let service = PlatformService::connect(&self.database).await?;
                run_bank_command(&service, cmd).await?;
            }

            Commands::Earnings { username } => {
                let service = PlatformService::connect(&self.database).await?;
                run_earnings_command(&service, &username).await?;
            }

            Commands::Snapshot { format, output } => {
                let service = PlatformService::connect(&self.database).await?;
                run_snapshot_command(&service, &format, output.as_deref()).await?;
            }

            Commands::Vacuum => {
                let service = PlatformService::connect(&self.database).await?;
                let purged = service.purge_expired_sessions().await?;
                service.vacuum().await?;
                println!("Purged {} expired session(s); database compacted.", purged);
            }

            Commands::Import {
                input,
                format,
                dry_run,
            } => {
                let service = PlatformService::connect(&self.database).await?;
                run_import_command(&service, input.as_deref(), &format, dry_run).await?;
            }
        }

        Ok(())
    }
}

async fn run_user_command(service: &PlatformService, cmd: UserCommands) -> Result<()> {
    match cmd {
        UserCommands::Create {
            username,
            email,
            display_name,
            admin,
        } => {
            let role = if admin { Role::Admin } else { Role::User };
            let user = service
                .create_user(username, display_name, email, role)
                .await?;
            println!("Created user: {} ({}) [{}]", user.username, user.id, user.role);
        }

        UserCommands::List => {
            let users = service.list_users().await?;
            if users.is_empty() {
                println!("No users found.");
            } else {
                println!(
                    "{:<20} {:<6} {:<9} {:>12} {:>12}",
                    "USERNAME", "ROLE", "VERIFIED", "BALANCE", "EARNINGS"
                );
                println!("{}", "-".repeat(63));
                for user in users {
                    println!(
                        "{:<20} {:<6} {:<9} {:>12} {:>12}",
                        truncate(&user.username, 20),
                        user.role,
                        if user.is_verified { "yes" } else { "no" },
                        format_cents(user.balance),
                        format_cents(user.earnings_balance)
                    );
                }
            }
        }

        UserCommands::Show { username } => {
            let user = service.get_user(&username).await?;

            println!("User: {}", user.username);
            println!("  ID:               {}", user.id);
            println!("  Display name:     {}", user.display_name);
            println!("  Email:            {}", user.email);
            println!("  Role:             {}", user.role);
            println!(
                "  Verified:         {}",
                if user.is_verified { "yes" } else { "no" }
            );
            println!(
                "  Created:          {}",
                user.created_at.format("%Y-%m-%d %H:%M:%S")
            );
            println!();
            println!("  Balance:          {}", format_cents(user.balance));
            println!("  Earnings balance: {}", format_cents(user.earnings_balance));
        }

        UserCommands::Verify { username, revoke } => {
            let user = service.set_verified(&username, !revoke).await?;
            if user.is_verified {
                println!("Verified user: {}", user.username);
            } else {
                println!("Revoked verification: {}", user.username);
            }
        }

        UserCommands::Deposit { username, amount } => {
            let amount_cents =
                parse_cents(&amount).context("Invalid amount format. Use '50.00' or '50'")?;
            let user = service.deposit(&username, amount_cents).await?;
            println!(
                "Deposited {} to {}; balance now {}",
                format_cents(amount_cents),
                user.username,
                format_cents(user.balance)
            );
        }
    }
    Ok(())
}

async fn run_session_command(service: PlatformService, cmd: SessionCommands) -> Result<()> {
    match cmd {
        SessionCommands::Issue { username, days } => {
            let service = service.with_session_lifetime(Duration::days(days));
            let session = service.issue_session(&username).await?;
            println!("{}", session.token);
            eprintln!(
                "Session for {} expires {}",
                username,
                session.expires_at.format("%Y-%m-%d %H:%M:%S")
            );
        }

        SessionCommands::Revoke { token } => {
            if service.revoke_session(&token).await? {
                println!("Session revoked.");
            } else {
                println!("No such session.");
            }
        }
    }
    Ok(())
}

async fn run_tier_command(service: &PlatformService, cmd: TierCommands) -> Result<()> {
    match cmd {
        TierCommands::Create {
            creator,
            name,
            price,
            description,
        } => {
            let creator = service.get_user(&creator).await?;
            let price_cents =
                parse_cents(&price).context("Invalid price format. Use '9.99' or '10'")?;

            let tier = service
                .create_tier(&creator, name, description, price_cents)
                .await?;
            println!(
                "Created tier: {} at {} ({})",
                tier.name,
                format_cents(tier.price_cents),
                tier.id
            );
        }

        TierCommands::List { creator } => {
            let tiers = service.list_tiers(&creator).await?;
            if tiers.is_empty() {
                println!("No tiers found.");
            } else {
                println!("{:<38} {:<20} {:>10} {:<30}", "ID", "NAME", "PRICE", "DESCRIPTION");
                println!("{}", "-".repeat(100));
                for tier in tiers {
                    println!(
                        "{:<38} {:<20} {:>10} {:<30}",
                        tier.id,
                        truncate(&tier.name, 20),
                        format_cents(tier.price_cents),
                        truncate(tier.description.as_deref().unwrap_or(""), 30)
                    );
                }
            }
        }
    }
    Ok(())
}

async fn run_payout_command(service: &PlatformService, cmd: PayoutCommands) -> Result<()> {
    match cmd {
        PayoutCommands::Request {
            username,
            amount,
            method,
            eth_address,
        } => {
            let user = service.get_user(&username).await?;
            let amount_cents =
                parse_cents(&amount).context("Invalid amount format. Use '150.00' or '150'")?;
            let method = PayoutMethod::from_str(&method).ok_or_else(|| {
                anyhow::anyhow!("Invalid payout method '{}'. Valid methods: bank, eth", method)
            })?;

            let request = service
                .request_payout(&user, amount_cents, method, eth_address)
                .await?;
            println!(
                "Requested payout: {} via {} ({})",
                format_cents(request.amount_cents),
                request.method,
                request.id
            );
        }

        PayoutCommands::List { status, user } => {
            let status = status
                .map(|s| {
                    PayoutStatus::from_str(&s).ok_or_else(|| {
                        anyhow::anyhow!(
                            "Invalid status '{}'. Valid statuses: pending, approved, rejected, completed",
                            s
                        )
                    })
                })
                .transpose()?;

            let payouts = match user {
                Some(username) => {
                    let user = service.get_user(&username).await?;
                    service
                        .list_user_payouts(&user)
                        .await?
                        .into_iter()
                        .filter(|p| status.is_none_or(|s| p.status == s))
                        .collect()
                }
                None => service.list_payouts(status).await?,
            };

            print_payouts(&payouts);
        }

        PayoutCommands::Approve { id, note } => {
            let request = service.approve_payout(parse_id(&id, "payout")?, note).await?;
            println!("Approved payout {} ({})", request.id, format_cents(request.amount_cents));
        }

        PayoutCommands::Reject { id, note } => {
            let request = service.reject_payout(parse_id(&id, "payout")?, note).await?;
            println!(
                "Rejected payout {}; {} returned to earnings",
                request.id,
                format_cents(request.amount_cents)
            );
        }

        PayoutCommands::Complete { id, note } => {
            let request = service.complete_payout(parse_id(&id, "payout")?, note).await?;
            println!("Completed payout {} ({})", request.id, format_cents(request.amount_cents));
        }
    }
    Ok(())
}

fn print_payouts(payouts: &[PayoutRequest]) {
    if payouts.is_empty() {
        println!("No payout requests found.");
        return;
    }

    println!(
        "{:<38} {:<12} {:>12} {:<5} {:<10} {:<30}",
        "ID", "DATE", "AMOUNT", "VIA", "STATUS", "NOTE"
    );
    println!("{}", "-".repeat(112));
    for payout in payouts {
        println!(
            "{:<38} {:<12} {:>12} {:<5} {:<10} {:<30}",
            payout.id,
            payout.created_at.format("%Y-%m-%d"),
            format_cents(payout.amount_cents),
            payout.method,
            payout.status,
            truncate(payout.admin_note.as_deref().unwrap_or(""), 30)
        );
    }
}

async fn run_bank_command(service: &PlatformService, cmd: BankCommands) -> Result<()> {
    match cmd {
        BankCommands::Set {
            username,
            account_holder,
            bank_name,
            account_number,
            routing_number,
            swift_code,
            country,
        } => {
            let user = service.get_user(&username).await?;
            let input = BankInfoInput {
                account_holder,
                bank_name,
                account_number,
                routing_number,
                swift_code,
                country,
            };
            let info = service.save_bank_info(&user, input).await?;
            println!(
                "Saved bank details for {}: {} {}",
                user.username,
                info.bank_name,
                info.masked_account_number()
            );
        }

        BankCommands::Show { username } => {
            let user = service.get_user(&username).await?;
            let info = service.get_bank_info(&user).await?;

            println!("Bank details: {}", user.username);
            println!("  Account holder: {}", info.account_holder);
            println!("  Bank:           {}", info.bank_name);
            println!("  Account:        {}", info.masked_account_number());
            println!("  Routing:        {}", info.routing_number);
            if let Some(swift) = &info.swift_code {
                println!("  SWIFT:          {}", swift);
            }
            println!("  Country:        {}", info.country);
            println!(
                "  Updated:        {}",
                info.updated_at.format("%Y-%m-%d %H:%M:%S")
            );
        }

        BankCommands::Remove { username } => {
            let user = service.get_user(&username).await?;
            service.delete_bank_info(&user).await?;
            println!("Removed bank details for {}", user.username);
        }
    }
    Ok(())
}

async fn run_earnings_command(service: &PlatformService, username: &str) -> Result<()> {
    let user = service.get_user(username).await?;
    let summary = service.earnings_summary(&user).await?;

    println!("Earnings: {}", user.username);
    println!("  Available:      {}", format_cents(summary.earnings_balance));
    if summary.pending_payout > 0 {
        println!("  Pending payout: {}", format_cents(summary.pending_payout));
    }
    println!();
    println!("  Lifetime gross: {}", format_cents(summary.lifetime_gross));
    println!("  Platform fees:  {}", format_cents(summary.lifetime_fees));
    println!("  Lifetime net:   {}", format_cents(summary.lifetime_net));
    println!("  Payments:       {}", summary.earnings_count);

    if !summary.recent.is_empty() {
        println!();
        println!("{:<20} {:>10} {:>10} {:>10}", "DATE", "GROSS", "FEE", "NET");
        println!("{}", "-".repeat(53));
        for earning in summary.recent {
            println!(
                "{:<20} {:>10} {:>10} {:>10}",
                earning.created_at.format("%Y-%m-%d %H:%M"),
                format_cents(earning.gross_cents),
                format_cents(earning.fee_cents),
                format_cents(earning.net_cents)
            );
        }
    }
    Ok(())
}

async fn run_snapshot_command(
    service: &PlatformService,
    format: &str,
    output: Option<&str>,
) -> Result<()> {
    use crate::io::SnapshotExporter;
    use std::fs::File;
    use std::io::{Write, stdout};

    let exporter = SnapshotExporter::new(service);

    let writer: Box<dyn Write> = match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path))?;
            Box::new(file)
        }
        None => Box::new(stdout()),
    };

    let count = match format {
        "csv" => exporter.export_csv(writer).await?,
        "json" => exporter.export_json(writer).await?,
        _ => {
            anyhow::bail!("Invalid format '{}'. Valid formats: csv, json", format);
        }
    };

    if output.is_some() {
        eprintln!("Exported balances for {} user(s)", count);
    }
    Ok(())
}

async fn run_import_command(
    service: &PlatformService,
    input: Option<&str>,
    format: &str,
    dry_run: bool,
) -> Result<()> {
    use crate::io::{ImportOptions, Importer};
    use std::fs::File;
    use std::io::{Read, stdin};

    let importer = Importer::new(service);

    let reader: Box<dyn Read> = match input {
        Some(path) => {
            let file =
                File::open(path).with_context(|| format!("Failed to open input file: {}", path))?;
            Box::new(file)
        }
        None => Box::new(stdin()),
    };

    let options = ImportOptions { dry_run };
    let result = match format {
        "csv" => importer.import_csv(reader, options).await?,
        "json" => importer.import_json(reader, options).await?,
        _ => {
            anyhow::bail!("Invalid format '{}'. Valid formats: csv, json", format);
        }
    };

    if dry_run {
        println!("Dry run, nothing written");
    } else {
        println!("Import complete");
    }
    println!("  Users created: {}", result.users_created);
    println!("  Users skipped: {}", result.users_skipped);
    println!("  Tiers created: {}", result.tiers_created);
    println!("  Tiers skipped: {}", result.tiers_skipped);
    println!("  Errors:        {}", result.errors.len());

    if !result.errors.is_empty() {
        println!("\nErrors:");
        for error in result.errors.iter().take(10) {
            println!(
                "  Line {}: {}",
                error.line,
                error
                    .field
                    .as_ref()
                    .map(|f| format!("{}: ", f))
                    .unwrap_or_default()
                    + &error.error
            );
        }
        if result.errors.len() > 10 {
            println!("  ... and {} more errors", result.errors.len() - 10);
        }
    }

    Ok(())
}

fn parse_id(id: &str, what: &str) -> Result<Uuid> {
    Uuid::parse_str(id).with_context(|| format!("Invalid {} ID: {}", what, id))
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{}...", head)
    }
}

fn parse_date(date_str: &str) -> Result<DateTime<Utc>> {
    use chrono::NaiveDate;

    let naive_date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .context("Date must be in YYYY-MM-DD format")?;

    let naive_datetime = naive_date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| anyhow::anyhow!("Invalid date"))?;

    Ok(DateTime::from_naive_utc_and_offset(naive_datetime, Utc))
}
