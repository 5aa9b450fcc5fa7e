/// Position store: the ordering columns of `roadmap_steps`
///
/// Query-by-roadmap and batch-write primitives shared by the normalization pass and the
/// reorder handler. Writes here are not published to the commit hook: a normalization
/// pass only ever produces a state that needs no further pass.

use crate::roadmap::{
    database::begin_write,
    ordering::{self, PositionChange, StepSlot},
};
use anyhow::Result;
use sqlx::{sqlite::SqlitePool, Row, SqliteConnection};

#[derive(Debug, Clone)]
pub struct PositionStore {
    pool: SqlitePool,
}

/// Outcome of one normalization pass against the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassOutcome {
    /// Steps in the roadmap when the pass read it
    pub steps: usize,
    /// Positions actually rewritten
    pub changes: Vec<PositionChange>,
}

impl PositionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Read one roadmap's slots on an open connection/transaction, in current order
    pub async fn load_slots(conn: &mut SqliteConnection, roadmap_id: &str) -> sqlx::Result<Vec<StepSlot>> {
        let rows = sqlx::query(
            "SELECT id, seq, position FROM roadmap_steps WHERE roadmap_id = ? ORDER BY position ASC, seq ASC",
        )
        .bind(roadmap_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| StepSlot {
                step_id: row.get("id"),
                seq: row.get("seq"),
                position: row.get("position"),
            })
            .collect())
    }

    /// Write position changes on an open connection/transaction
    pub async fn write_changes(conn: &mut SqliteConnection, changes: &[PositionChange]) -> sqlx::Result<()> {
        for change in changes {
            sqlx::query("UPDATE roadmap_steps SET position = ? WHERE id = ?")
                .bind(change.to)
                .bind(&change.step_id)
                .execute(&mut *conn)
                .await?;
        }
        Ok(())
    }

    /// Renumber one roadmap to 1..N inside a single transaction.
    ///
    /// Either every planned change commits or none does. Callers are expected to hold
    /// the roadmap's lease while this runs.
    pub async fn normalize_roadmap(&self, roadmap_id: &str) -> Result<PassOutcome> {
        let mut tx = begin_write(&self.pool).await?;

        let slots = Self::load_slots(&mut tx, roadmap_id).await?;
        let changes = ordering::plan_normalization(&slots);

        if changes.is_empty() {
            tx.rollback().await?;
        } else {
            Self::write_changes(&mut tx, &changes).await?;
            tx.commit().await?;
        }

        Ok(PassOutcome {
            steps: slots.len(),
            changes,
        })
    }

    /// Current slots of a roadmap, in current order
    pub async fn slots(&self, roadmap_id: &str) -> Result<Vec<StepSlot>> {
        let mut conn = self.pool.acquire().await?;
        Ok(Self::load_slots(&mut conn, roadmap_id).await?)
    }

    /// All roadmap ids, used by the periodic sweep
    pub async fn roadmap_ids(&self) -> Result<Vec<String>> {
        let ids = sqlx::query_scalar("SELECT id FROM roadmaps ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }
}
