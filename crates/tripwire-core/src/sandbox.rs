//! # SQL Sandbox
//!
//! A per-event, single-use in-memory relational engine.
//!
//! Rule authors express detection logic as free-form SQL over a fixed
//! `events` table whose only row is the event under evaluation. The engine
//! is embedded SQLite (via `rusqlite`) with its JSON1 functions available
//! for payload extraction (`json_extract`, `json_array_length`, `->`/`->>`).
//!
//! Lifecycle: a sandbox is created at the top of each evaluator iteration
//! and destroyed at the end. It is never shared between workers or across
//! iterations. The connection is released on [`Sandbox::close`] or drop, so
//! the release path runs on every exit.

use rusqlite::Connection;
use tracing::debug;

use crate::{Event, Rule};

// ============================================================================
// Error Types
// ============================================================================

/// Errors raised by sandbox operations
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("sandbox initialization failed: {message}")]
    Init { message: String },

    #[error("rule SQL is empty")]
    EmptySql,

    #[error("sql execution failed: {message}")]
    Execution { message: String },
}

// ============================================================================
// Sandbox
// ============================================================================

/// A controlled environment for evaluating rule SQL against one event.
///
/// The sandbox does not sanitize SQL — rule authors are trusted. A rule is
/// considered to have matched iff [`Sandbox::execute_rule`] returns a count
/// strictly greater than zero.
pub struct Sandbox {
    conn: Connection,
}

impl Sandbox {
    /// Open an in-memory engine and create the `events` table
    pub fn open() -> Result<Self, SandboxError> {
        let conn = Connection::open_in_memory().map_err(|e| SandboxError::Init {
            message: e.to_string(),
        })?;

        conn.execute_batch(
            "CREATE TABLE events (
                id          UUID UNIQUE NOT NULL PRIMARY KEY,
                webhook_id  UUID,
                source      TEXT,
                event_type  TEXT,
                action      TEXT,
                raw_payload JSON,
                dedup_hash  TEXT,
                received_at TIMESTAMP
            );",
        )
        .map_err(|e| SandboxError::Init {
            message: e.to_string(),
        })?;

        Ok(Self { conn })
    }

    /// Insert the event under evaluation as the table's single row
    pub fn add_event(&self, event: &Event) -> Result<(), SandboxError> {
        let payload = event.raw_payload.to_string();

        self.conn
            .execute(
                "INSERT INTO events (
                    id, webhook_id, source, event_type, action,
                    raw_payload, dedup_hash, received_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    event.id.to_string(),
                    event.webhook_id.to_string(),
                    event.source.as_str(),
                    event.event_type,
                    event.action,
                    payload,
                    event.dedup_hash,
                    event.received_at.to_rfc3339(),
                ],
            )
            .map_err(|e| SandboxError::Execution {
                message: e.to_string(),
            })?;

        Ok(())
    }

    /// Run the rule SQL, drain the result set, and return the row count.
    ///
    /// # Errors
    ///
    /// [`SandboxError::EmptySql`] when the rule text is blank.
    /// [`SandboxError::Execution`] on any engine error, preserving the
    /// engine's message.
    pub fn execute_rule(&self, rule: &Rule) -> Result<usize, SandboxError> {
        if rule.sql.trim().is_empty() {
            return Err(SandboxError::EmptySql);
        }

        debug!(rule_id = %rule.id, "Executing rule SQL");

        let mut stmt = self
            .conn
            .prepare(&rule.sql)
            .map_err(|e| SandboxError::Execution {
                message: e.to_string(),
            })?;

        let mut rows = stmt.query([]).map_err(|e| SandboxError::Execution {
            message: e.to_string(),
        })?;

        let mut count = 0;
        loop {
            match rows.next() {
                Ok(Some(_)) => count += 1,
                Ok(None) => break,
                Err(e) => {
                    return Err(SandboxError::Execution {
                        message: e.to_string(),
                    })
                }
            }
        }

        Ok(count)
    }

    /// Release the engine.
    ///
    /// Dropping the sandbox has the same effect; `close` only surfaces the
    /// engine's shutdown error instead of discarding it.
    pub fn close(self) -> Result<(), SandboxError> {
        self.conn.close().map_err(|(_, e)| SandboxError::Execution {
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
#[path = "sandbox_tests.rs"]
mod tests;
