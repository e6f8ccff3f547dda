//! ABOUTME: Alarm repository for the av_alarm table
//! ABOUTME: Provides runtime-checked queries for alarm record persistence and lookup

use ag_core::{time::now_like_sql, Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use std::path::Path;
use tracing::warn;

/// Persisted alarm record, matching the av_alarm schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Alarm {
    pub alarm_id: String,
    pub video_path: String,
    pub video_absolute_path: Option<String>,
    pub image_path: Option<String>,
    pub desc: String,
    pub state: i64,
    pub create_time: String,
}

/// Request to create a new alarm record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAlarmRequest {
    pub alarm_id: String,
    pub video_path: String,
    pub video_absolute_path: Option<String>,
    pub image_path: Option<String>,
    pub desc: String,
}

pub struct AlarmRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> AlarmRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a new alarm record. A duplicate `alarm_id` is logged and
    /// ignored rather than surfaced as an error, matching the Clip-writer's
    /// at-least-once persistence contract (§4.8: "duplicate inserts are
    /// logged and ignored").
    pub async fn insert(&self, request: CreateAlarmRequest) -> Result<Alarm> {
        let now = now_like_sql();

        let inserted = sqlx::query_as::<_, Alarm>(
            r#"
            INSERT INTO av_alarm (alarm_id, video_path, video_absolute_path, image_path, "desc", state, create_time)
            VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)
            ON CONFLICT(alarm_id) DO NOTHING
            RETURNING alarm_id, video_path, video_absolute_path, image_path, "desc", state, create_time
            "#,
        )
        .bind(&request.alarm_id)
        .bind(&request.video_path)
        .bind(&request.video_absolute_path)
        .bind(&request.image_path)
        .bind(&request.desc)
        .bind(&now)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to insert alarm: {}", e)))?;

        match inserted {
            Some(alarm) => Ok(alarm),
            None => {
                warn!(alarm_id = %request.alarm_id, "duplicate alarm_id, ignoring insert");
                self.find_by_alarm_id(&request.alarm_id)
                    .await?
                    .ok_or_else(|| {
                        Error::Database(format!(
                            "alarm_id {} conflicted but could not be re-read",
                            request.alarm_id
                        ))
                    })
            }
        }
    }

    pub async fn find_by_alarm_id(&self, alarm_id: &str) -> Result<Option<Alarm>> {
        let alarm = sqlx::query_as::<_, Alarm>(
            r#"
            SELECT alarm_id, video_path, video_absolute_path, image_path, "desc", state, create_time
            FROM av_alarm WHERE alarm_id = ?1
            "#,
        )
        .bind(alarm_id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to find alarm: {}", e)))?;

        Ok(alarm)
    }

    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Alarm>> {
        let alarms = sqlx::query_as::<_, Alarm>(
            r#"
            SELECT alarm_id, video_path, video_absolute_path, image_path, "desc", state, create_time
            FROM av_alarm ORDER BY create_time DESC LIMIT ?1 OFFSET ?2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to list alarms: {}", e)))?;

        Ok(alarms)
    }

    /// Mark a batch of alarm ids as read. Used only by the admin tier.
    pub async fn mark_read(&self, alarm_ids: &[String]) -> Result<u64> {
        let mut affected = 0u64;
        for id in alarm_ids {
            let result = sqlx::query(r#"UPDATE av_alarm SET state = 1 WHERE alarm_id = ?1"#)
                .bind(id)
                .execute(self.pool)
                .await
                .map_err(|e| Error::Database(format!("Failed to mark alarm read: {}", e)))?;
            affected += result.rows_affected();
        }
        Ok(affected)
    }

    /// Remove a batch of alarm rows. Used only by the admin tier; callers
    /// are responsible for deleting the referenced video/image files before
    /// or after this call, since row deletion alone never touches disk.
    pub async fn delete(&self, alarm_ids: &[String]) -> Result<u64> {
        let mut affected = 0u64;
        for id in alarm_ids {
            let result = sqlx::query(r#"DELETE FROM av_alarm WHERE alarm_id = ?1"#)
                .bind(id)
                .execute(self.pool)
                .await
                .map_err(|e| Error::Database(format!("Failed to delete alarm: {}", e)))?;
            affected += result.rows_affected();
        }
        Ok(affected)
    }

    /// Delete a batch of alarms along with the files they reference: the
    /// absolute video file, then the image file (resolved against
    /// `video_root`) if one was recorded, then the row itself. Missing
    /// files are logged and otherwise ignored; a file-deletion failure
    /// never blocks the row delete.
    pub async fn delete_with_files(&self, alarm_ids: &[String], video_root: &Path) -> Result<u64> {
        for id in alarm_ids {
            if let Some(alarm) = self.find_by_alarm_id(id).await? {
                if let Some(video_path) = &alarm.video_absolute_path {
                    if let Err(e) = tokio::fs::remove_file(video_path).await {
                        if e.kind() != std::io::ErrorKind::NotFound {
                            warn!(alarm_id = %id, path = %video_path, error = %e, "failed to delete alarm video file");
                        }
                    }
                }
                if let Some(image_path) = &alarm.image_path {
                    let full = video_root.join(image_path);
                    if let Err(e) = tokio::fs::remove_file(&full).await {
                        if e.kind() != std::io::ErrorKind::NotFound {
                            warn!(alarm_id = %id, path = %full.display(), error = %e, "failed to delete alarm image file");
                        }
                    }
                }
            }
        }
        self.delete(alarm_ids).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Db;
    use ag_core::Id;

    async fn test_db() -> Db {
        let path = format!("test_alarms_{}.db", Id::new());
        Db::new(&path).await.expect("db init")
    }

    fn request(alarm_id: &str) -> CreateAlarmRequest {
        CreateAlarmRequest {
            alarm_id: alarm_id.to_string(),
            video_path: format!("alarm_videos/{}.mp4", alarm_id),
            video_absolute_path: Some(format!("/data/alarm_videos/{}.mp4", alarm_id)),
            image_path: None,
            desc: "test alarm".to_string(),
        }
    }

    #[tokio::test]
    async fn insert_and_find_round_trip() {
        let db = test_db().await;
        let repo = AlarmRepository::new(db.pool());

        let alarm = repo.insert(request("camA_20260101_120000")).await.unwrap();
        assert_eq!(alarm.alarm_id, "camA_20260101_120000");
        assert_eq!(alarm.state, 0);

        let found = repo
            .find_by_alarm_id("camA_20260101_120000")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.alarm_id, alarm.alarm_id);
    }

    #[tokio::test]
    async fn duplicate_alarm_id_is_ignored_not_errored() {
        let db = test_db().await;
        let repo = AlarmRepository::new(db.pool());

        repo.insert(request("camB_1")).await.unwrap();
        let second = repo.insert(request("camB_1")).await;
        assert!(second.is_ok());

        let all = repo.list(100, 0).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn mark_read_and_delete_round_trip() {
        let db = test_db().await;
        let repo = AlarmRepository::new(db.pool());

        repo.insert(request("camC_1")).await.unwrap();

        let marked = repo.mark_read(&["camC_1".to_string()]).await.unwrap();
        assert_eq!(marked, 1);
        let alarm = repo.find_by_alarm_id("camC_1").await.unwrap().unwrap();
        assert_eq!(alarm.state, 1);

        let deleted = repo.delete(&["camC_1".to_string()]).await.unwrap();
        assert_eq!(deleted, 1);
        assert!(repo.find_by_alarm_id("camC_1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_with_files_removes_video_and_row() {
        let db = test_db().await;
        let repo = AlarmRepository::new(db.pool());

        let dir = std::env::temp_dir().join(format!("ag_db_test_{}", ag_core::Id::new()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let video_path = dir.join("camD_1.mp4");
        tokio::fs::write(&video_path, b"fake mp4").await.unwrap();

        repo.insert(CreateAlarmRequest {
            alarm_id: "camD_1".to_string(),
            video_path: "alarm_videos/camD_1.mp4".to_string(),
            video_absolute_path: Some(video_path.to_string_lossy().to_string()),
            image_path: None,
            desc: "test alarm".to_string(),
        })
        .await
        .unwrap();

        let deleted = repo
            .delete_with_files(&["camD_1".to_string()], &dir)
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert!(!video_path.exists());
        assert!(repo.find_by_alarm_id("camD_1").await.unwrap().is_none());

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn delete_with_files_tolerates_missing_file() {
        let db = test_db().await;
        let repo = AlarmRepository::new(db.pool());

        repo.insert(CreateAlarmRequest {
            alarm_id: "camE_1".to_string(),
            video_path: "alarm_videos/camE_1.mp4".to_string(),
            video_absolute_path: Some("/nonexistent/camE_1.mp4".to_string()),
            image_path: None,
            desc: "test alarm".to_string(),
        })
        .await
        .unwrap();

        let deleted = repo
            .delete_with_files(&["camE_1".to_string()], Path::new("/nonexistent"))
            .await
            .unwrap();
        assert_eq!(deleted, 1);
    }
}
