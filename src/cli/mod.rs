use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::application::{ExpenseQuery, NewExpense, SplitMode, SplitService};
use crate::config::Config;
use crate::domain::{Activity, Balance, Cents, UserId, format_amount, parse_cents};

/// Celery - split shared expenses and settle up
#[derive(Parser)]
#[command(name = "celery")]
#[command(about = "A local-first ledger for splitting expenses between friends")]
#[command(version)]
pub struct Cli {
    /// Database file path (overrides CELERY_DATABASE)
    #[arg(long, global = true)]
    pub database: Option<String>,

    /// Act as this user (overrides CELERY_USER)
    #[arg(short = 'u', long = "as", global = true)]
    pub acting_as: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// User management commands
    #[command(subcommand)]
    User(UserCommands),

    /// Group management commands
    #[command(subcommand)]
    Group(GroupCommands),

    /// Expense commands
    #[command(subcommand)]
    Expense(ExpenseCommands),

    /// Show your balance overall, with one user, or inside a group
    Balance {
        /// Only debts with this user
        #[arg(long)]
        with: Option<String>,

        /// Only debts recorded in this group
        #[arg(long)]
        group: Option<String>,
    },

    /// Show your balance with every user you share open debts with
    Friends,

    /// Settle all open debts between you and another user
    Settle {
        /// The other user
        user: String,
    },

    /// Show recent activity
    Activity {
        /// Maximum number of entries to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Export data to CSV or JSON
    Export {
        /// What to export: debts, balances, activity, full
        export_type: String,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum UserCommands {
    /// Add a user
    Add {
        /// User name (must be unique)
        name: String,

        /// Avatar reference (URL or file name)
        #[arg(long)]
        avatar: Option<String>,
    },

    /// List all users
    List,
}

#[derive(Subcommand)]
pub enum GroupCommands {
    /// Create a group; you become a member automatically
    Create {
        /// Group name (must be unique)
        name: String,

        /// Members to add (comma separated)
        #[arg(short, long, value_delimiter = ',')]
        members: Vec<String>,
    },

    /// Add a member to a group
    AddMember {
        /// Group name
        group: String,

        /// User name
        user: String,
    },

    /// List all groups
    List,

    /// Show a group with each member's balance
    Show {
        /// Group name
        name: String,
    },
}

#[derive(Subcommand)]
pub enum ExpenseCommands {
    /// Record an expense and split it
    Add {
        /// Total amount (e.g., "45.00" or "45")
        amount: String,

        /// What the expense was for
        #[arg(short, long)]
        description: String,

        /// Who paid (defaults to you)
        #[arg(long)]
        paid_by: Option<String>,

        /// Split evenly between these users (comma separated, may include the payer)
        #[arg(long, value_delimiter = ',', conflicts_with = "shares")]
        split: Vec<String>,

        /// Exact share as NAME=AMOUNT (repeatable)
        #[arg(long = "share")]
        shares: Vec<String>,

        /// Group the expense belongs to
        #[arg(short, long)]
        group: Option<String>,

        /// Category (e.g., "food", "rent")
        #[arg(short, long)]
        category: Option<String>,

        /// Date of the expense (YYYY-MM-DD, defaults to now)
        #[arg(long)]
        date: Option<String>,
    },

    /// List expenses
    List {
        /// Only expenses in this group
        #[arg(long)]
        group: Option<String>,

        /// Only expenses you paid or owe on
        #[arg(long)]
        mine: bool,

        /// Maximum number of expenses to show
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show an expense and its debts
    Show {
        /// Expense ID
        id: String,
    },

    /// Delete an expense and its debts
    Delete {
        /// Expense ID
        id: String,
    },
}

/// Parse a YYYY-MM-DD date as midnight UTC.
fn parse_date(input: &str) -> Result<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .with_context(|| format!("Invalid date format '{}'. Use YYYY-MM-DD", input))?;
    Ok(date
        .and_hms_opt(0, 0, 0)
        .context("Invalid time of day")?
        .and_utc())
}

/// Parse "NAME=AMOUNT" into a name and cents.
fn parse_share(input: &str) -> Result<(String, Cents)> {
    let (name, amount) = input
        .split_once('=')
        .with_context(|| format!("Invalid share '{}'. Use NAME=AMOUNT", input))?;
    let cents = parse_cents(amount).with_context(|| format!("Invalid amount in '{}'", input))?;
    Ok((name.trim().to_string(), cents))
}

fn parse_expense_id(input: &str) -> Result<Uuid> {
    Uuid::parse_str(input).context("Invalid expense ID format (expected UUID)")
}

fn describe_balance(balance: &Balance, currency: &str) -> String {
    match balance.total {
        0 if balance.is_settled() => "settled up".to_string(),
        0 => format!(
            "even (owed {}, owe {})",
            format_amount(balance.owed, currency),
            format_amount(balance.owe, currency)
        ),
        total if total > 0 => format!("you are owed {}", format_amount(total, currency)),
        total => format!("you owe {}", format_amount(-total, currency)),
    }
}

fn describe_activity(activity: &Activity, names: &HashMap<UserId, String>) -> String {
    let name = |id: UserId| names.get(&id).cloned().unwrap_or_else(|| id.to_string());
    let related = activity
        .related_user
        .map(|id| format!(" (with {})", name(id)))
        .unwrap_or_default();
    format!(
        "{}  {} {} {} {}{}",
        activity.timestamp.format("%Y-%m-%d %H:%M"),
        name(activity.actor),
        activity.action,
        activity.activity_type,
        activity.reference,
        related
    )
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let config = Config::from_env().with_overrides(self.database, self.acting_as);

        if let Commands::Init = self.command {
            SplitService::init(&config.database).await?;
            println!("Database initialized: {}", config.database);
            return Ok(());
        }

        let mut service = SplitService::connect(&config.database).await?;
        // User management works without an identity, so the acting user can be created first.
        if let (Some(name), false) = (&config.user, matches!(self.command, Commands::User(_))) {
            service = service.act_as(name).await?;
        }
        run_command(&service, &config, self.command).await
    }
}

async fn run_command(service: &SplitService, config: &Config, command: Commands) -> Result<()> {
    match command {
        Commands::Init => println!("Database already initialized: {}", config.database),
        Commands::User(cmd) => run_user_command(service, cmd).await?,
        Commands::Group(cmd) => run_group_command(service, config, cmd).await?,
        Commands::Expense(cmd) => run_expense_command(service, config, cmd).await?,
        Commands::Balance { with, group } => {
            let (scope, balance) = match (with, group) {
                (Some(user), _) => (format!("with {}", user), service.balance_with(&user).await?),
                (None, Some(group)) => (format!("in {}", group), service.group_balance(&group).await?),
                (None, None) => ("overall".to_string(), service.balance().await?),
            };
            println!("Balance {}: {}", scope, describe_balance(&balance, &config.currency));
        }
        Commands::Friends => {
            let friends = service.friend_balances().await?;
            if friends.is_empty() {
                println!("You are all settled up.");
            }
            for friend in friends {
                println!(
                    "{:<20} {}",
                    friend.user.name,
                    describe_balance(&friend.balance, &config.currency)
                );
            }
        }
        Commands::Settle { user } => {
            let result = service.settle_with(&user).await?;
            if result.settlement.is_empty() {
                println!("Nothing to settle with {}.", result.counterparty.name);
                return Ok(());
            }

            println!(
                "Settled with {}: {} debt(s), {} expense(s) closed",
                result.counterparty.name,
                result.settlement.debts.len(),
                result.settlement.expenses.len()
            );
            let net = result.net_before;
            if net > 0 {
                println!(
                    "  {} paid you {}",
                    result.counterparty.name,
                    format_amount(net, &config.currency)
                );
            } else if net < 0 {
                println!(
                    "  You paid {} {}",
                    result.counterparty.name,
                    format_amount(-net, &config.currency)
                );
            }
        }
        Commands::Activity { limit } => {
            let activities = service.list_activities(Some(limit)).await?;
            let names = service.user_names().await?;
            if activities.is_empty() {
                println!("No activity yet.");
            }
            for activity in &activities {
                println!("{}", describe_activity(activity, &names));
            }
        }
        Commands::Export {
            export_type,
            output,
        } => run_export_command(service, &export_type, output.as_deref()).await?,
    }

    Ok(())
}

async fn run_user_command(service: &SplitService, cmd: UserCommands) -> Result<()> {
    match cmd {
        UserCommands::Add { name, avatar } => {
            let user = service.create_user(name, avatar).await?;
            println!("Added user: {} ({})", user.name, user.id);
        }
        UserCommands::List => {
            let users = service.list_users().await?;
            if users.is_empty() {
                println!("No users found.");
            }
            for user in users {
                println!("{:<20} {}", user.name, user.id);
            }
        }
    }
    Ok(())
}

async fn run_group_command(
    service: &SplitService,
    config: &Config,
    cmd: GroupCommands,
) -> Result<()> {
    match cmd {
        GroupCommands::Create { name, members } => {
            let group = service.create_group(name, &members).await?;
            println!(
                "Created group: {} ({} members)",
                group.name,
                group.members.len()
            );
        }
        GroupCommands::AddMember { group, user } => {
            let group = service.add_group_member(&group, &user).await?;
            println!("{} is now a member of {}", user, group.name);
        }
        GroupCommands::List => {
            let groups = service.list_groups().await?;
            if groups.is_empty() {
                println!("No groups found.");
            }
            for group in groups {
                println!("{:<20} {} members", group.name, group.members.len());
            }
        }
        GroupCommands::Show { name } => {
            let balances = service.group_member_balances(&name).await?;
            println!("Group: {}", name);
            for member in balances {
                println!(
                    "  {:<20} {}",
                    member.user.name,
                    format_amount(member.balance.total, &config.currency)
                );
            }
        }
    }
    Ok(())
}

async fn run_expense_command(
    service: &SplitService,
    config: &Config,
    cmd: ExpenseCommands,
) -> Result<()> {
    match cmd {
        ExpenseCommands::Add {
            amount,
            description,
            paid_by,
            split,
            shares,
            group,
            category,
            date,
        } => {
            let amount_cents =
                parse_cents(&amount).context("Invalid amount format. Use '45.00' or '45'")?;
            let date = match date {
                Some(date) => parse_date(&date)?,
                None => Utc::now(),
            };
            let split = if shares.is_empty() {
                SplitMode::Even(split)
            } else {
                SplitMode::Exact(
                    shares
                        .iter()
                        .map(|share| parse_share(share))
                        .collect::<Result<Vec<_>>>()?,
                )
            };

            let info = service
                .add_expense(NewExpense {
                    description,
                    amount_cents,
                    payer: paid_by,
                    split,
                    group,
                    category,
                    date,
                })
                .await?;

            println!(
                "Recorded expense: {} {} ({})",
                info.expense.description,
                format_amount(info.expense.amount_cents, &config.currency),
                info.expense.id
            );
            let names = service.user_names().await?;
            for debt in &info.debts {
                println!(
                    "  {} owes {} {}",
                    names.get(&debt.debtor).map(String::as_str).unwrap_or("?"),
                    names.get(&debt.creditor).map(String::as_str).unwrap_or("?"),
                    format_amount(debt.amount_cents, &config.currency)
                );
            }
        }
        ExpenseCommands::List { group, mine, limit } => {
            let expenses = service
                .list_expenses(ExpenseQuery {
                    group,
                    involving_me: mine,
                    limit,
                })
                .await?;
            let names = service.user_names().await?;

            if expenses.is_empty() {
                println!("No expenses found.");
            } else {
                println!(
                    "{:<10} {:<24} {:>14} {:<12} {:<6} ID",
                    "DATE", "DESCRIPTION", "AMOUNT", "PAID BY", "PAID"
                );
                println!("{}", "-".repeat(108));
                for expense in expenses {
                    println!(
                        "{:<10} {:<24} {:>14} {:<12} {:<6} {}",
                        expense.date.format("%Y-%m-%d"),
                        expense.description,
                        format_amount(expense.amount_cents, &config.currency),
                        names.get(&expense.payer).map(String::as_str).unwrap_or("?"),
                        if expense.paid { "yes" } else { "no" },
                        expense.id
                    );
                }
            }
        }
        ExpenseCommands::Show { id } => {
            let info = service.get_expense_info(parse_expense_id(&id)?).await?;
            let names = service.user_names().await?;
            let expense = &info.expense;

            println!("Expense: {}", expense.description);
            println!("  ID:       {}", expense.id);
            println!(
                "  Amount:   {}",
                format_amount(expense.amount_cents, &config.currency)
            );
            println!(
                "  Paid by:  {}",
                names.get(&expense.payer).map(String::as_str).unwrap_or("?")
            );
            if let Some(category) = &expense.category {
                println!("  Category: {}", category);
            }
            println!("  Date:     {}", expense.date.format("%Y-%m-%d"));
            println!("  Settled:  {}", if expense.paid { "yes" } else { "no" });
            for debt in &info.debts {
                println!(
                    "  - {} owes {} {}{}",
                    names.get(&debt.debtor).map(String::as_str).unwrap_or("?"),
                    names.get(&debt.creditor).map(String::as_str).unwrap_or("?"),
                    format_amount(debt.amount_cents, &config.currency),
                    if debt.paid { " (paid)" } else { "" }
                );
            }
        }
        ExpenseCommands::Delete { id } => {
            let deleted = service.delete_expense(parse_expense_id(&id)?).await?;
            println!(
                "Deleted expense: {} ({} debt(s) removed)",
                deleted.expense.description, deleted.removed_debts
            );
        }
    }
    Ok(())
}

async fn run_export_command(
    service: &SplitService,
    export_type: &str,
    output: Option<&str>,
) -> Result<()> {
    use crate::io::Exporter;
    use std::fs::File;
    use std::io::{Write, stdout};

    let exporter = Exporter::new(service);

    let writer: Box<dyn Write> = match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path))?;
            Box::new(file)
        }
        None => Box::new(stdout()),
    };

    match export_type {
        "debts" => {
            let count = exporter.export_debts_csv(writer).await?;
            if output.is_some() {
                eprintln!("Exported {} debts", count);
            }
        }
        "balances" => {
            let count = exporter.export_balances_csv(writer).await?;
            if output.is_some() {
                eprintln!("Exported {} balances", count);
            }
        }
        "activity" => {
            let count = exporter.export_activities_csv(writer).await?;
            if output.is_some() {
                eprintln!("Exported {} activities", count);
            }
        }
        "full" => {
            let snapshot = exporter.export_full_json(writer).await?;
            if output.is_some() {
                eprintln!(
                    "Exported full database: {} users, {} groups, {} expenses, {} debts, {} activities",
                    snapshot.users.len(),
                    snapshot.groups.len(),
                    snapshot.expenses.len(),
                    snapshot.debts.len(),
                    snapshot.activities.len()
                );
            }
        }
        _ => {
            anyhow::bail!(
                "Invalid export type '{}'. Valid types: debts, balances, activity, full",
                export_type
            );
        }
    }

    Ok(())
}
