//! Shared-expense ledger engine.
//!
//! Users form groups, record expenses and split them among members. The
//! engine derives balances, pairwise debts and a simplified settlement plan
//! from the expense/split ledger, and records settlements transactionally.
//!
//! The pure building blocks ([`compute_splits`], [`compute_group_balances`],
//! [`simplify_debts`]) work on in-memory values; [`Engine`] wires them to the
//! database.

pub use balances::{Balance, GroupBalances, PairwiseDebt, compute_group_balances};
pub use commands::{CreateExpenseCmd, SettleBalanceCmd};
pub use error::{EngineError, ErrorKind};
pub use expenses::{Expense, ExpenseKind};
pub use group_members::{Member, MemberRole, MemberStatus};
pub use groups::Group;
pub use money::MoneyCents;
pub use ops::{CacheRefresh, Engine, EngineBuilder, SettlementOutcome};
pub use simplify::{SettlementInstruction, simplify_debts};
pub use split_calculator::{SplitPolicy, compute_splits};
pub use splits::Split;

mod balances;
mod commands;
mod error;
mod expenses;
mod group_members;
mod groups;
mod money;
mod ops;
mod simplify;
mod split_calculator;
mod splits;
mod users;
mod util;

type ResultEngine<T> = Result<T, EngineError>;
