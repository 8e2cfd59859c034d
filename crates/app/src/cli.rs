use std::{collections::BTreeMap, error::Error};

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use engine::{CreateExpenseCmd, Engine, MoneyCents, SettleBalanceCmd, SplitPolicy};
use serde::Serialize;
use serde_json::Value;

#[derive(Parser, Debug)]
#[command(name = "splitledger")]
#[command(about = "Shared-expense ledger: groups, expenses, balances and settlements")]
pub struct Cli {
    /// Settings file (defaults to `splitledger.*` in the working directory).
    #[arg(long)]
    pub config: Option<String>,

    /// `memory` or a sqlite file path; overrides the settings.
    #[arg(long, env = "SPLITLEDGER_DATABASE")]
    pub database: Option<String>,

    /// Log level; overrides the settings.
    #[arg(long)]
    pub level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(subcommand)]
    User(UserCommand),
    #[command(subcommand)]
    Group(GroupCommand),
    #[command(subcommand)]
    Expense(ExpenseCommand),
    /// Per-member balances of a group.
    Balances(GroupArgs),
    /// Debts of a group: settlement plan, pairwise view or cached plan.
    Debts(DebtsArgs),
    #[command(subcommand)]
    Settle(SettleCommand),
}

#[derive(Subcommand, Debug)]
pub enum UserCommand {
    Create {
        #[arg(long)]
        username: String,
        #[arg(long)]
        display_name: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum GroupCommand {
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        admin: String,
    },
    Invite {
        #[arg(long)]
        group: String,
        #[arg(long)]
        username: String,
        #[arg(long)]
        caller: String,
    },
    Accept {
        #[arg(long)]
        group: String,
        #[arg(long)]
        caller: String,
    },
    Show(GroupArgs),
    List {
        #[arg(long)]
        caller: String,
    },
}

#[derive(Args, Debug)]
pub struct GroupArgs {
    #[arg(long)]
    pub group: String,
    #[arg(long)]
    pub caller: String,
}

#[derive(Subcommand, Debug)]
pub enum ExpenseCommand {
    Add(ExpenseAddArgs),
    Show {
        #[arg(long)]
        expense: String,
        #[arg(long)]
        caller: String,
    },
    List {
        #[command(flatten)]
        group: GroupArgs,
        #[arg(long)]
        include_settlements: bool,
    },
}

#[derive(Args, Debug)]
pub struct ExpenseAddArgs {
    #[command(flatten)]
    pub group: GroupArgs,
    /// Defaults to the caller.
    #[arg(long)]
    pub payer: Option<String>,
    /// Decimal amount, e.g. `12.50`.
    #[arg(long)]
    pub amount: MoneyCents,
    #[arg(long)]
    pub description: String,
    #[arg(long, value_delimiter = ',', required = true)]
    pub participants: Vec<String>,
    /// Explicit share `user=amount`; repeat for every participant to split
    /// unequally.
    #[arg(long = "share", value_parser = parse_share)]
    pub shares: Vec<(String, MoneyCents)>,
    #[arg(long)]
    pub category: Option<String>,
    /// RFC 3339 timestamp; defaults to now.
    #[arg(long)]
    pub at: Option<DateTime<Utc>>,
}

#[derive(Args, Debug)]
pub struct DebtsArgs {
    #[command(flatten)]
    pub group: GroupArgs,
    #[arg(long, conflicts_with = "cached")]
    pub pairwise: bool,
    #[arg(long)]
    pub cached: bool,
}

#[derive(Subcommand, Debug)]
pub enum SettleCommand {
    /// Mark one split as settled.
    Split {
        #[arg(long)]
        expense: String,
        #[arg(long)]
        user: String,
        #[arg(long)]
        caller: String,
    },
    /// Record a partial payment towards a split.
    Pay {
        #[arg(long)]
        expense: String,
        #[arg(long)]
        user: String,
        #[arg(long)]
        amount: MoneyCents,
        #[arg(long)]
        caller: String,
    },
    /// `from` pays `to` inside a group.
    Balance {
        #[command(flatten)]
        group: GroupArgs,
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        amount: MoneyCents,
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
}

fn parse_share(raw: &str) -> Result<(String, MoneyCents), String> {
    let (user, amount) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected user=amount, got {raw}"))?;
    let amount = amount.parse::<MoneyCents>().map_err(|err| err.to_string())?;
    Ok((user.trim().to_string(), amount))
}

fn render<T: Serialize>(value: &T) -> Result<Value, Box<dyn Error + Send + Sync>> {
    Ok(serde_json::to_value(value)?)
}

/// Runs one command and returns its JSON rendering.
pub async fn run(engine: &Engine, command: Command) -> Result<Value, Box<dyn Error + Send + Sync>> {
    match command {
        Command::User(UserCommand::Create {
            username,
            display_name,
        }) => {
            engine
                .create_user(&username, display_name.as_deref())
                .await?;
            render(&serde_json::json!({ "username": username.trim() }))
        }
        Command::Group(command) => match command {
            GroupCommand::Create { name, admin } => {
                render(&engine.create_group(&name, &admin).await?)
            }
            GroupCommand::Invite {
                group,
                username,
                caller,
            } => render(&engine.invite_member(&group, &username, &caller).await?),
            GroupCommand::Accept { group, caller } => {
                render(&engine.accept_invitation(&group, &caller).await?)
            }
            GroupCommand::Show(args) => render(&engine.group(&args.group, &args.caller).await?),
            GroupCommand::List { caller } => {
                let groups = engine.list_groups(&caller).await?;
                let rows: Vec<Value> = groups
                    .into_iter()
                    .map(|(group, status)| {
                        serde_json::json!({
                            "id": group.id,
                            "name": group.name,
                            "admin_id": group.admin_id,
                            "status": status.as_str(),
                        })
                    })
                    .collect();
                Ok(Value::Array(rows))
            }
        },
        Command::Expense(command) => match command {
            ExpenseCommand::Add(args) => {
                let policy = if args.shares.is_empty() {
                    SplitPolicy::Equal
                } else {
                    SplitPolicy::Unequal(args.shares.into_iter().collect::<BTreeMap<_, _>>())
                };
                let mut cmd = CreateExpenseCmd::new(
                    args.group.group,
                    args.group.caller,
                    args.amount,
                    args.description,
                    args.at.unwrap_or_else(Utc::now),
                )
                .participants(args.participants)
                .policy(policy);
                if let Some(payer) = args.payer {
                    cmd = cmd.paid_by(payer);
                }
                if let Some(category) = args.category {
                    cmd = cmd.category(category);
                }
                render(&engine.create_expense(cmd).await?)
            }
            ExpenseCommand::Show { expense, caller } => {
                render(&engine.expense(&expense, &caller).await?)
            }
            ExpenseCommand::List {
                group,
                include_settlements,
            } => render(
                &engine
                    .list_expenses(&group.group, &group.caller, include_settlements)
                    .await?,
            ),
        },
        Command::Balances(args) => render(&engine.get_balances(&args.group, &args.caller).await?),
        Command::Debts(args) => {
            let GroupArgs { group, caller } = args.group;
            if args.pairwise {
                render(&engine.get_pairwise_debts(&group, &caller).await?)
            } else if args.cached {
                render(&engine.cached_simplified_debts(&group, &caller).await?)
            } else {
                render(&engine.get_simplified_debts(&group, &caller).await?)
            }
        }
        Command::Settle(command) => match command {
            SettleCommand::Split {
                expense,
                user,
                caller,
            } => {
                let changed = engine.settle_split(&expense, &user, &caller).await?;
                render(&serde_json::json!({ "changed": changed }))
            }
            SettleCommand::Pay {
                expense,
                user,
                amount,
                caller,
            } => render(
                &engine
                    .record_split_payment(&expense, &user, amount, &caller)
                    .await?,
            ),
            SettleCommand::Balance {
                group,
                from,
                to,
                amount,
                at,
            } => {
                let cmd = SettleBalanceCmd::new(
                    group.group,
                    from,
                    to,
                    amount,
                    group.caller,
                    at.unwrap_or_else(Utc::now),
                );
                render(&engine.settle_balance(cmd).await?)
            }
        },
    }
}
