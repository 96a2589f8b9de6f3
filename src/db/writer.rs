use sqlx::sqlite::SqlitePoolOptions;
use tracing::info;

use crate::db::models::SegmentStatsRow;
use crate::error::Result;
use crate::segment::SegmentRecord;

/// SQLite mirror of the segment aggregate table.
#[derive(Clone)]
pub struct SegmentStore {
    pool: sqlx::SqlitePool,
}

impl SegmentStore {
    /// Open (creating if needed) the database at `db_path` and apply migrations.
    pub async fn connect(db_path: &str) -> Result<Self> {
        let pool = sqlx::SqlitePool::connect(&format!("sqlite:{db_path}?mode=rwc")).await?;
        Self::from_pool(pool).await
    }

    /// Single-connection in-memory database; every connection to
    /// `sqlite::memory:` is a separate database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::from_pool(pool).await
    }

    async fn from_pool(pool: sqlx::SqlitePool) -> Result<Self> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    /// Replace every stored segment in one transaction.
    pub async fn replace_all(&self, records: &[SegmentRecord], computed_at: i64) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM segment_stats")
            .execute(&mut *tx)
            .await?;

        for r in records {
            sqlx::query(
                r#"
                INSERT INTO segment_stats (
                    agency_id, naics, value_band, opportunity_count,
                    protest_rate, sustain_rate, median_resolution_days, computed_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(r.agency_id.as_deref())
            .bind(r.naics.as_deref())
            .bind(r.value_band.as_deref())
            .bind(r.opportunity_count as i64)
            .bind(r.protest_rate)
            .bind(r.sustain_rate)
            .bind(r.median_resolution_days)
            .bind(computed_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        info!(segments = records.len(), "Segment mirror replaced");
        Ok(())
    }

    /// Stored segments in insertion order.
    pub async fn all(&self) -> Result<Vec<SegmentRecord>> {
        let rows = sqlx::query_as::<_, SegmentStatsRow>(
            r#"
            SELECT id, agency_id, naics, value_band, opportunity_count,
                   protest_rate, sustain_rate, median_resolution_days, computed_at
            FROM segment_stats
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(SegmentRecord::from).collect())
    }

    /// `computed_at` of the current mirror, `None` when it is empty.
    pub async fn computed_at(&self) -> Result<Option<i64>> {
        let at: Option<i64> = sqlx::query_scalar("SELECT MAX(computed_at) FROM segment_stats")
            .fetch_one(&self.pool)
            .await?;
        Ok(at)
    }
}
