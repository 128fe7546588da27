use anyhow::{Context, Result};
use chrono::SecondsFormat;
use rusqlite::{params, Row};

use crate::db::{connection::Database, helpers::parse_datetime, models::CognitiveSample};

/// Newest-first row cap for the manager's per-employee history view.
pub const RECENT_SAMPLES_LIMIT: usize = 500;

fn row_to_sample(row: &Row) -> Result<CognitiveSample> {
    let timestamp: String = row.get("timestamp")?;

    Ok(CognitiveSample {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        timestamp: parse_datetime(&timestamp, "timestamp")?,
        stress: row.get("stress")?,
        fatigue: row.get("fatigue")?,
        attention: row.get("attention")?,
        face_label: row.get("face")?,
        voice_label: row.get("voice")?,
    })
}

impl Database {
    /// Append one sample. The insert runs in its own transaction, so a failure leaves
    /// the connection clean for the next attempt.
    pub async fn insert_sample(&self, sample: &CognitiveSample) -> Result<i64> {
        let record = sample.clone();
        self.write(move |tx| {
            tx.execute(
                "INSERT INTO states (user_id, timestamp, stress, fatigue, attention, face, voice)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.user_id,
                    record
                        .timestamp
                        .to_rfc3339_opts(SecondsFormat::Micros, true),
                    record.stress,
                    record.fatigue,
                    record.attention,
                    record.face_label,
                    record.voice_label,
                ],
            )
            .with_context(|| format!("failed to insert sample for user {}", record.user_id))?;
            Ok(tx.last_insert_rowid())
        })
        .await
    }

    pub async fn latest_sample(&self, user_id: i64) -> Result<Option<CognitiveSample>> {
        let mut samples = self
            .query_samples(user_id, "DESC", Some(1))
            .await?;
        Ok(samples.pop())
    }

    /// Full history, oldest first.
    pub async fn sample_history(&self, user_id: i64) -> Result<Vec<CognitiveSample>> {
        self.query_samples(user_id, "ASC", None).await
    }

    /// Most recent `limit` samples, newest first.
    pub async fn recent_samples(&self, user_id: i64, limit: usize) -> Result<Vec<CognitiveSample>> {
        self.query_samples(user_id, "DESC", Some(limit)).await
    }

    async fn query_samples(
        &self,
        user_id: i64,
        order: &'static str,
        limit: Option<usize>,
    ) -> Result<Vec<CognitiveSample>> {
        self.execute(move |conn| {
            let limit = limit.map(|value| value as i64).unwrap_or(-1);
            let query = format!(
                "SELECT id, user_id, timestamp, stress, fatigue, attention, face, voice
                 FROM states
                 WHERE user_id = ?1
                 ORDER BY timestamp {order}, id {order}
                 LIMIT ?2"
            );
            let mut stmt = conn.prepare_cached(&query)?;

            let mut rows = stmt.query(params![user_id, limit])?;
            let mut samples = Vec::new();
            while let Some(row) = rows.next()? {
                samples.push(row_to_sample(row)?);
            }

            Ok(samples)
        })
        .await
    }
}
