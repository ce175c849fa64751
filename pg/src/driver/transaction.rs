//! Transaction control and savepoints.

use quarry_core::dialect::escape_identifier;
use tracing::warn;

use super::connection::Connection;
use super::{PgError, PgResult};

impl Connection {
    /// Issue `BEGIN`. Fails if this connection already started a transaction.
    pub async fn transaction_start(&mut self) -> PgResult<()> {
        if self.transaction_active {
            return Err(PgError::TransactionActive);
        }
        self.execute("BEGIN").await?;
        self.transaction_active = true;
        Ok(())
    }

    /// Commit the active transaction.
    ///
    /// If the commit fails a rollback is attempted and
    /// [`PgError::TransactionAborted`] is returned. The transaction is
    /// inactive afterwards whatever the outcome.
    pub async fn transaction_end(&mut self) -> PgResult<()> {
        if !self.transaction_active {
            return Err(PgError::TransactionInactive);
        }
        let committed = self.execute("COMMIT").await;
        self.transaction_active = false;

        match committed {
            // The server answers COMMIT in a failed block with a ROLLBACK tag.
            Ok(result) if result.command_tag() == Some("ROLLBACK") => Err(PgError::TransactionAborted(
                "Transaction was rolled back by the server".to_string(),
            )),
            Ok(_) => Ok(()),
            Err(e) => {
                if let Err(rollback) = self.execute("ROLLBACK").await {
                    warn!(error = %rollback, "rollback after failed commit failed");
                }
                Err(PgError::TransactionAborted(e.message()))
            }
        }
    }

    /// Issue `ROLLBACK` and mark the transaction inactive.
    pub async fn transaction_rollback(&mut self) -> PgResult<()> {
        self.transaction_active = false;
        self.execute("ROLLBACK").await?;
        Ok(())
    }

    pub async fn savepoint(&mut self, name: &str) -> PgResult<()> {
        self.execute(format!("SAVEPOINT {}", savepoint_name(name))).await?;
        Ok(())
    }

    pub async fn rollback_to_savepoint(&mut self, name: &str) -> PgResult<()> {
        self.execute(format!("ROLLBACK TO SAVEPOINT {}", savepoint_name(name)))
            .await?;
        Ok(())
    }

    pub async fn release_savepoint(&mut self, name: &str) -> PgResult<()> {
        self.execute(format!("RELEASE SAVEPOINT {}", savepoint_name(name)))
            .await?;
        Ok(())
    }
}

/// Savepoint names are single identifiers, so a dot is part of the name.
fn savepoint_name(name: &str) -> String {
    if name.contains('.') {
        format!("\"{}\"", name.replace('"', "\"\""))
    } else {
        escape_identifier(name)
    }
}
