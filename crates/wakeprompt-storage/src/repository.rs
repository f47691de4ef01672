//! SQLite-backed alarm records.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension;
use uuid::Uuid;

use wakeprompt_core::error::WakepromptError;
use wakeprompt_core::ports::AlarmRepository;
use wakeprompt_core::types::{Alarm, AlarmMode, AlarmState, GenerationArtifacts, Voice};

use crate::db::Database;

const ALARM_COLUMNS: &str = "id, fire_time, voice, prompt, enabled, state, generated_text, \
     audio_filename, audio_duration_secs, last_generated_at, fired_mode, failure_reason, created_at, \
     updated_at";

/// Repository for alarm records.
pub struct SqliteAlarmRepository {
    db: Arc<Database>,
}

impl SqliteAlarmRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Number of stored alarms.
    pub fn count(&self) -> Result<u64, WakepromptError> {
        self.db.with_conn(|conn| {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM alarms", [], |row| row.get(0))
                .map_err(|e| WakepromptError::Persistence(e.to_string()))?;
            Ok(count as u64)
        })
    }
}

impl AlarmRepository for SqliteAlarmRepository {
    fn save(&self, alarm: &Alarm) -> Result<(), WakepromptError> {
        self.db.with_conn(|conn| {
            conn.execute(
                &format!(
                    "INSERT OR REPLACE INTO alarms ({})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                    ALARM_COLUMNS
                ),
                rusqlite::params![
                    alarm.id.to_string(),
                    alarm.fire_time.timestamp_millis(),
                    alarm.voice.as_str(),
                    alarm.prompt,
                    alarm.enabled as i32,
                    alarm.state.to_string(),
                    alarm.artifacts.text(),
                    alarm.artifacts.audio_filename(),
                    alarm.artifacts.audio_duration_secs(),
                    alarm
                        .artifacts
                        .last_generated_at()
                        .map(|t| t.timestamp_millis()),
                    alarm.fired_mode.map(|m| m.to_string()),
                    alarm.failure_reason,
                    alarm.created_at.timestamp_millis(),
                    alarm.updated_at.timestamp_millis(),
                ],
            )
            .map_err(|e| WakepromptError::Persistence(format!("Failed to save alarm: {}", e)))?;
            Ok(())
        })
    }

    fn get(&self, id: Uuid) -> Result<Option<Alarm>, WakepromptError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!("SELECT {} FROM alarms WHERE id = ?1", ALARM_COLUMNS))
                .map_err(|e| WakepromptError::Persistence(e.to_string()))?;

            let result = stmt
                .query_row(rusqlite::params![id.to_string()], |row| Ok(row_to_alarm(row)))
                .optional()
                .map_err(|e| WakepromptError::Persistence(e.to_string()))?;

            match result {
                Some(alarm) => Ok(Some(alarm?)),
                None => Ok(None),
            }
        })
    }

    fn list(&self) -> Result<Vec<Alarm>, WakepromptError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM alarms ORDER BY created_at DESC, id",
                    ALARM_COLUMNS
                ))
                .map_err(|e| WakepromptError::Persistence(e.to_string()))?;

            let rows = stmt
                .query_map([], |row| Ok(row_to_alarm(row)))
                .map_err(|e| WakepromptError::Persistence(e.to_string()))?;

            let mut alarms = Vec::new();
            for row in rows {
                let alarm = row.map_err(|e| WakepromptError::Persistence(e.to_string()))??;
                alarms.push(alarm);
            }
            Ok(alarms)
        })
    }

    fn delete(&self, id: Uuid) -> Result<bool, WakepromptError> {
        self.db.with_conn(|conn| {
            let affected = conn
                .execute(
                    "DELETE FROM alarms WHERE id = ?1",
                    rusqlite::params![id.to_string()],
                )
                .map_err(|e| {
                    WakepromptError::Persistence(format!("Failed to delete alarm: {}", e))
                })?;
            Ok(affected > 0)
        })
    }
}

// =============================================================================
// Row mapping
// =============================================================================

fn column<T: rusqlite::types::FromSql>(
    row: &rusqlite::Row<'_>,
    index: usize,
) -> Result<T, WakepromptError> {
    row.get(index)
        .map_err(|e| WakepromptError::Persistence(e.to_string()))
}

fn millis_to_datetime(millis: i64) -> Result<DateTime<Utc>, WakepromptError> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| WakepromptError::Persistence(format!("Invalid timestamp: {}", millis)))
}

fn row_to_alarm(row: &rusqlite::Row<'_>) -> Result<Alarm, WakepromptError> {
    let id_str: String = column(row, 0)?;
    let fire_time: i64 = column(row, 1)?;
    let voice: String = column(row, 2)?;
    let prompt: Option<String> = column(row, 3)?;
    let enabled: i32 = column(row, 4)?;
    let state: String = column(row, 5)?;
    let text: Option<String> = column(row, 6)?;
    let audio_filename: Option<String> = column(row, 7)?;
    let audio_duration_secs: Option<f64> = column(row, 8)?;
    let last_generated_at: Option<i64> = column(row, 9)?;
    let fired_mode: Option<String> = column(row, 10)?;
    let failure_reason: Option<String> = column(row, 11)?;
    let created_at: i64 = column(row, 12)?;
    let updated_at: i64 = column(row, 13)?;

    Ok(Alarm {
        id: Uuid::parse_str(&id_str)
            .map_err(|e| WakepromptError::Persistence(format!("Invalid UUID: {}", e)))?,
        fire_time: millis_to_datetime(fire_time)?,
        voice: voice
            .parse::<Voice>()
            .map_err(WakepromptError::Persistence)?,
        prompt,
        enabled: enabled != 0,
        state: state
            .parse::<AlarmState>()
            .map_err(WakepromptError::Persistence)?,
        artifacts: GenerationArtifacts::restore(
            text,
            audio_filename,
            audio_duration_secs,
            last_generated_at.map(millis_to_datetime).transpose()?,
        ),
        fired_mode: fired_mode
            .map(|m| m.parse::<AlarmMode>())
            .transpose()
            .map_err(WakepromptError::Persistence)?,
        failure_reason,
        created_at: millis_to_datetime(created_at)?,
        updated_at: millis_to_datetime(updated_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn setup() -> SqliteAlarmRepository {
        let db = Arc::new(Database::in_memory().unwrap());
        SqliteAlarmRepository::new(db)
    }

    fn make_alarm(created_offset_secs: i64) -> Alarm {
        let mut alarm = Alarm::new(
            Utc.with_ymd_and_hms(2026, 11, 2, 7, 0, 0).unwrap(),
            Voice::Nova,
            Some("mention the marathon".to_string()),
        );
        alarm.created_at =
            Utc.with_ymd_and_hms(2026, 10, 1, 12, 0, 0).unwrap() + Duration::seconds(created_offset_secs);
        alarm.updated_at = alarm.created_at;
        alarm
    }

    #[test]
    fn test_save_and_get_draft() {
        let repo = setup();
        let alarm = make_alarm(0);
        repo.save(&alarm).unwrap();

        let found = repo.get(alarm.id).unwrap().unwrap();
        assert_eq!(found, alarm);
        assert_eq!(found.state, AlarmState::Draft);
        assert!(found.artifacts.audio_filename().is_none());
    }

    #[test]
    fn test_save_and_get_armed_with_artifacts() {
        let repo = setup();
        let mut alarm = make_alarm(0);
        let generated_at = Utc.with_ymd_and_hms(2026, 10, 1, 12, 0, 5).unwrap();
        alarm.artifacts.record_text("Rise and shine.".to_string());
        alarm
            .artifacts
            .record_audio(alarm.audio_filename(), Some(12.5), generated_at);
        alarm.state = AlarmState::Armed;
        alarm.fired_mode = Some(AlarmMode::Primary);
        repo.save(&alarm).unwrap();

        let found = repo.get(alarm.id).unwrap().unwrap();
        assert_eq!(found.artifacts.text(), Some("Rise and shine."));
        assert_eq!(
            found.artifacts.audio_filename(),
            Some(alarm.audio_filename().as_str())
        );
        assert_eq!(found.artifacts.audio_duration_secs(), Some(12.5));
        assert_eq!(found.artifacts.last_generated_at(), Some(generated_at));
        assert_eq!(found.fired_mode, Some(AlarmMode::Primary));
        assert_eq!(found, alarm);
    }

    #[test]
    fn test_save_replaces_existing() {
        let repo = setup();
        let mut alarm = make_alarm(0);
        repo.save(&alarm).unwrap();

        alarm.state = AlarmState::ErrorBlocked;
        alarm.failure_reason = Some("Alarm permission denied".to_string());
        alarm.updated_at = alarm.created_at + Duration::seconds(90);
        repo.save(&alarm).unwrap();

        assert_eq!(repo.count().unwrap(), 1);
        let found = repo.get(alarm.id).unwrap().unwrap();
        assert_eq!(found.updated_at, alarm.updated_at);
        assert_eq!(found.created_at, alarm.created_at);
        assert_eq!(found.state, AlarmState::ErrorBlocked);
        assert_eq!(found.failure_reason.as_deref(), Some("Alarm permission denied"));
    }

    #[test]
    fn test_get_nonexistent() {
        let repo = setup();
        assert!(repo.get(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn test_list_newest_first() {
        let repo = setup();
        let older = make_alarm(0);
        let newer = make_alarm(60);
        repo.save(&older).unwrap();
        repo.save(&newer).unwrap();

        let ids: Vec<Uuid> = repo.list().unwrap().into_iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![newer.id, older.id]);
    }

    #[test]
    fn test_delete() {
        let repo = setup();
        let alarm = make_alarm(0);
        repo.save(&alarm).unwrap();

        assert!(repo.delete(alarm.id).unwrap());
        assert!(!repo.delete(alarm.id).unwrap());
        assert!(repo.get(alarm.id).unwrap().is_none());
        assert_eq!(repo.count().unwrap(), 0);
    }

    #[test]
    fn test_records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alarms.db");
        let alarm = make_alarm(0);
        {
            let repo = SqliteAlarmRepository::new(Arc::new(Database::new(&path).unwrap()));
            repo.save(&alarm).unwrap();
        }
        let repo = SqliteAlarmRepository::new(Arc::new(Database::new(&path).unwrap()));
        assert_eq!(repo.get(alarm.id).unwrap(), Some(alarm));
    }
}
