use sea_orm::DatabaseConnection;

use crate::ResultEngine;

mod access;
mod balances;
mod expenses;
mod groups;
mod settlements;

pub use settlements::SettlementOutcome;

/// Run a block inside a DB transaction, committing on success and rolling back on error.
macro_rules! with_tx {
    ($self:expr, |$tx:ident| $body:expr) => {{
        let $tx = $self.database.begin().await?;
        let result: crate::ResultEngine<_> = $body;
        match result {
            Ok(value) => {
                $tx.commit().await?;
                Ok(value)
            }
            Err(err) => Err(err),
        }
    }};
}

pub(crate) use with_tx;

/// When the `simplified_debts` cache is rebuilt after a ledger mutation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CacheRefresh {
    /// Before the mutating call returns.
    #[default]
    Inline,
    /// On a spawned tokio task; the mutating call does not wait for it.
    Background,
}

#[derive(Clone, Debug)]
pub struct Engine {
    database: DatabaseConnection,
    cache_refresh: CacheRefresh,
}

impl Engine {
    /// Return a builder for `Engine`. Help to build the struct.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }
}

/// The builder for `Engine`
#[derive(Default)]
pub struct EngineBuilder {
    database: DatabaseConnection,
    cache_refresh: CacheRefresh,
}

impl EngineBuilder {
    /// Pass the required database
    pub fn database(mut self, db: DatabaseConnection) -> EngineBuilder {
        self.database = db;
        self
    }

    pub fn cache_refresh(mut self, mode: CacheRefresh) -> EngineBuilder {
        self.cache_refresh = mode;
        self
    }

    /// Construct `Engine`
    pub async fn build(self) -> ResultEngine<Engine> {
        Ok(Engine {
            database: self.database,
            cache_refresh: self.cache_refresh,
        })
    }
}
