//! SQLite segment store
//!
//! Reconciliation plans are applied inside a single transaction, which
//! both gives the all-or-nothing guarantee and serializes writes per
//! project.

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};

use async_trait::async_trait;

use narrata_core::{Segment, SegmentStatus, Variant};

use crate::reconciler::{ReconcilePlan, SegmentOp};
use crate::store::SegmentStore;
use crate::PersistenceError;

const SEGMENT_COLUMNS: &str = "id, project_id, position, text, sanitized_text, service, status, \
     audio_path, duration_seconds, error_message, selected_variant_id, voice_sample_id, \
     magpie_voice, original_text, created_at, updated_at";

/// SQLite-backed segment store
#[derive(Clone)]
pub struct SqliteSegmentStore {
    pool: SqlitePool,
}

impl SqliteSegmentStore {
    /// Connect and bootstrap the schema.
    pub async fn connect(url: &str) -> Result<Self, PersistenceError> {
        // A single connection keeps in-memory databases coherent and is
        // plenty for the per-project write serialization we need.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(url)
            .await?;

        let store = Self { pool };
        store.ensure_schema().await?;
        tracing::info!(url, "segment store ready");
        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<(), PersistenceError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS segments (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                position INTEGER NOT NULL,
                text TEXT NOT NULL,
                sanitized_text TEXT NOT NULL,
                service TEXT NOT NULL,
                status TEXT NOT NULL,
                audio_path TEXT,
                duration_seconds REAL,
                error_message TEXT,
                selected_variant_id TEXT,
                voice_sample_id TEXT,
                magpie_voice TEXT,
                original_text TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_segments_project
             ON segments(project_id, position)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS variants (
                id TEXT PRIMARY KEY,
                segment_id TEXT NOT NULL,
                audio_path TEXT,
                duration_seconds REAL,
                created_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_variants_segment ON variants(segment_id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn row_to_segment(row: &SqliteRow) -> Result<Segment, PersistenceError> {
    let status_raw: String = row.try_get("status")?;
    let status = SegmentStatus::parse(&status_raw)
        .ok_or_else(|| PersistenceError::InvalidData(format!("unknown status '{status_raw}'")))?;

    Ok(Segment {
        id: row.try_get("id")?,
        project_id: row.try_get("project_id")?,
        position: row.try_get("position")?,
        text: row.try_get("text")?,
        sanitized_text: row.try_get("sanitized_text")?,
        service: row.try_get("service")?,
        status,
        audio_path: row.try_get("audio_path")?,
        duration_seconds: row.try_get("duration_seconds")?,
        error_message: row.try_get("error_message")?,
        selected_variant_id: row.try_get("selected_variant_id")?,
        voice_sample_id: row.try_get("voice_sample_id")?,
        magpie_voice: row.try_get("magpie_voice")?,
        original_text: row.try_get("original_text")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}

fn missing_segment(id: &str) -> PersistenceError {
    PersistenceError::InvalidData(format!("plan references unknown segment {id}"))
}

fn row_to_variant(row: &SqliteRow) -> Result<Variant, PersistenceError> {
    Ok(Variant {
        id: row.try_get("id")?,
        segment_id: row.try_get("segment_id")?,
        audio_path: row.try_get("audio_path")?,
        duration_seconds: row.try_get("duration_seconds")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}

#[async_trait]
impl SegmentStore for SqliteSegmentStore {
    async fn list(&self, project_id: &str) -> Result<Vec<Segment>, PersistenceError> {
        let rows = sqlx::query(&format!(
            "SELECT {SEGMENT_COLUMNS} FROM segments WHERE project_id = ? ORDER BY position"
        ))
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_segment).collect()
    }

    async fn list_with_variants(
        &self,
        project_id: &str,
    ) -> Result<Vec<(Segment, Vec<Variant>)>, PersistenceError> {
        let segments = self.list(project_id).await?;

        let mut out = Vec::with_capacity(segments.len());
        for segment in segments {
            let rows = sqlx::query(
                "SELECT id, segment_id, audio_path, duration_seconds, created_at
                 FROM variants WHERE segment_id = ? ORDER BY created_at",
            )
            .bind(&segment.id)
            .fetch_all(&self.pool)
            .await?;
            let variants = rows
                .iter()
                .map(row_to_variant)
                .collect::<Result<Vec<_>, _>>()?;
            out.push((segment, variants));
        }

        Ok(out)
    }

    async fn apply(
        &self,
        project_id: &str,
        plan: &ReconcilePlan,
    ) -> Result<Vec<Segment>, PersistenceError> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        // A plan op that touches zero rows was computed from a stale
        // snapshot; the whole transaction rolls back rather than
        // reporting a commit that changed nothing.

        for op in &plan.ops {
            match op {
                SegmentOp::Reposition { id, position } => {
                    let result =
                        sqlx::query("UPDATE segments SET position = ?, updated_at = ? WHERE id = ?")
                            .bind(position)
                            .bind(now)
                            .bind(id)
                            .execute(&mut *tx)
                            .await?;
                    if result.rows_affected() == 0 {
                        return Err(missing_segment(id));
                    }
                }
                SegmentOp::Rewrite { id, position, text, sanitized_text } => {
                    sqlx::query("DELETE FROM variants WHERE segment_id = ?")
                        .bind(id)
                        .execute(&mut *tx)
                        .await?;
                    let result = sqlx::query(
                        "UPDATE segments SET
                            position = ?, text = ?, sanitized_text = ?,
                            status = 'pending', audio_path = NULL,
                            duration_seconds = NULL, error_message = NULL,
                            selected_variant_id = NULL, updated_at = ?
                         WHERE id = ?",
                    )
                    .bind(position)
                    .bind(text)
                    .bind(sanitized_text)
                    .bind(now)
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
                    if result.rows_affected() == 0 {
                        return Err(missing_segment(id));
                    }
                }
                SegmentOp::Create { position, text, sanitized_text } => {
                    let segment =
                        Segment::new(project_id, *position, text, sanitized_text, &plan.service);
                    sqlx::query(&format!(
                        "INSERT INTO segments ({SEGMENT_COLUMNS})
                         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
                    ))
                    .bind(&segment.id)
                    .bind(&segment.project_id)
                    .bind(segment.position)
                    .bind(&segment.text)
                    .bind(&segment.sanitized_text)
                    .bind(&segment.service)
                    .bind(segment.status.as_str())
                    .bind(&segment.audio_path)
                    .bind(segment.duration_seconds)
                    .bind(&segment.error_message)
                    .bind(&segment.selected_variant_id)
                    .bind(&segment.voice_sample_id)
                    .bind(&segment.magpie_voice)
                    .bind(&segment.original_text)
                    .bind(segment.created_at)
                    .bind(segment.updated_at)
                    .execute(&mut *tx)
                    .await?;
                }
                SegmentOp::Delete { id } => {
                    sqlx::query("DELETE FROM variants WHERE segment_id = ?")
                        .bind(id)
                        .execute(&mut *tx)
                        .await?;
                    let result = sqlx::query("DELETE FROM segments WHERE id = ?")
                        .bind(id)
                        .execute(&mut *tx)
                        .await?;
                    if result.rows_affected() == 0 {
                        return Err(missing_segment(id));
                    }
                }
            }
        }

        // Reload within the same transaction so the returned list is the
        // exact committed state.
        let rows = sqlx::query(&format!(
            "SELECT {SEGMENT_COLUMNS} FROM segments WHERE project_id = ? ORDER BY position"
        ))
        .bind(project_id)
        .fetch_all(&mut *tx)
        .await?;
        let segments = rows
            .iter()
            .map(row_to_segment)
            .collect::<Result<Vec<_>, _>>()?;

        tx.commit().await?;
        Ok(segments)
    }

    async fn put(&self, segment: &Segment) -> Result<(), PersistenceError> {
        sqlx::query(&format!(
            "INSERT OR REPLACE INTO segments ({SEGMENT_COLUMNS})
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&segment.id)
        .bind(&segment.project_id)
        .bind(segment.position)
        .bind(&segment.text)
        .bind(&segment.sanitized_text)
        .bind(&segment.service)
        .bind(segment.status.as_str())
        .bind(&segment.audio_path)
        .bind(segment.duration_seconds)
        .bind(&segment.error_message)
        .bind(&segment.selected_variant_id)
        .bind(&segment.voice_sample_id)
        .bind(&segment.magpie_voice)
        .bind(&segment.original_text)
        .bind(segment.created_at)
        .bind(segment.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn put_variant(&self, variant: &Variant) -> Result<(), PersistenceError> {
        sqlx::query(
            "INSERT OR REPLACE INTO variants (id, segment_id, audio_path, duration_seconds, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&variant.id)
        .bind(&variant.segment_id)
        .bind(&variant.audio_path)
        .bind(variant.duration_seconds)
        .bind(variant.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_project(&self, project_id: &str) -> Result<(), PersistenceError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "DELETE FROM variants WHERE segment_id IN
                (SELECT id FROM segments WHERE project_id = ?)",
        )
        .bind(project_id)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM segments WHERE project_id = ?")
            .bind(project_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconciler::{plan_reconcile, Reconciler};
    use std::sync::Arc;

    async fn memory_store() -> SqliteSegmentStore {
        SqliteSegmentStore::connect("sqlite::memory:").await.unwrap()
    }

    fn lines(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_put_and_list_round_trip() {
        let store = memory_store().await;
        let segment = Segment::new("p1", 1, "Hello.", "Hello.", "magpie");
        store.put(&segment).await.unwrap();

        let listed = store.list("p1").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, segment.id);
        assert_eq!(listed[0].text, "Hello.");
        assert_eq!(listed[0].status, SegmentStatus::Pending);
    }

    #[tokio::test]
    async fn test_reconcile_against_sqlite() {
        let store = Arc::new(memory_store().await);

        let mut b = Segment::new("p1", 2, "B.", "B.", "magpie");
        b.status = SegmentStatus::Done;
        b.audio_path = Some("b.wav".to_string());
        let a = Segment::new("p1", 1, "A.", "A.", "magpie");
        let c = Segment::new("p1", 3, "C.", "C.", "magpie");
        for segment in [&a, &b, &c] {
            store.put(segment).await.unwrap();
        }
        store
            .put_variant(&Variant::new(&b.id, Some("b-alt.wav".to_string()), Some(1.2)))
            .await
            .unwrap();

        let reconciler = Reconciler::new(store.clone());
        let outcome = reconciler
            .reconcile("p1", &lines(&["A.", "B2."]), "magpie")
            .await
            .unwrap();

        assert_eq!(outcome.changed, 1);
        assert_eq!(outcome.removed, 1);
        assert_eq!(outcome.audio_paths_to_delete, vec!["b.wav", "b-alt.wav"]);

        let segments = store.list("p1").await.unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[1].text, "B2.");
        assert_eq!(segments[1].status, SegmentStatus::Pending);
        assert!(segments[1].audio_path.is_none());

        let variants = store.list_with_variants("p1").await.unwrap();
        assert!(variants.iter().all(|(_, v)| v.is_empty()));
    }

    #[tokio::test]
    async fn test_stale_plan_is_rejected() {
        let store = memory_store().await;
        let a = Segment::new("p1", 1, "A.", "A.", "magpie");
        let b = Segment::new("p1", 2, "B.", "B.", "magpie");
        store.put(&a).await.unwrap();
        store.put(&b).await.unwrap();

        let snapshot = store.list_with_variants("p1").await.unwrap();
        let stale = plan_reconcile(&snapshot, &lines(&["A2.", "B."]), "magpie");

        // A competing sync wipes the project before the stale plan lands.
        let wipe = plan_reconcile(&snapshot, &[], "magpie");
        store.apply("p1", &wipe).await.unwrap();

        let err = store.apply("p1", &stale).await.unwrap_err();
        assert!(matches!(err, PersistenceError::InvalidData(_)));
        assert!(store.list("p1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_reconciles_serialize_per_project() {
        let store = Arc::new(memory_store().await);
        for (i, text) in ["A.", "B."].iter().enumerate() {
            let segment = Segment::new("p1", (i + 1) as i64, text, text, "magpie");
            store.put(&segment).await.unwrap();
        }
        let reconciler = Arc::new(Reconciler::new(store.clone()));

        let first = {
            let r = reconciler.clone();
            tokio::spawn(async move {
                r.reconcile("p1", &lines(&["A2.", "B.", "C."]), "magpie").await
            })
        };
        let second = {
            let r = reconciler.clone();
            tokio::spawn(async move { r.reconcile("p1", &lines(&["X."]), "magpie").await })
        };
        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();

        let segments = store.list("p1").await.unwrap();
        let texts: Vec<&str> = segments.iter().map(|s| s.text.as_str()).collect();
        assert!(
            texts == ["A2.", "B.", "C."] || texts == ["X."],
            "final state mixes both scripts: {texts:?}"
        );
        let positions: Vec<i64> = segments.iter().map(|s| s.position).collect();
        assert_eq!(positions, (1..=segments.len() as i64).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_delete_project_cascades() {
        let store = memory_store().await;
        let segment = Segment::new("p1", 1, "One.", "One.", "magpie");
        store.put(&segment).await.unwrap();
        store
            .put_variant(&Variant::new(&segment.id, Some("v.wav".to_string()), None))
            .await
            .unwrap();

        store.delete_project("p1").await.unwrap();
        assert!(store.list("p1").await.unwrap().is_empty());
        assert!(store.list_with_variants("p1").await.unwrap().is_empty());
    }
}
