//! Application repository — CRUD operations for the `applications` table.

use chrono::Utc;
use rusqlite::{params, Row};
use serde_json::Map;

use super::{parse_timestamp, Database, DatabaseError};
use crate::application::{Application, EvalStatus};
use crate::scoring::EvaluationResult;

/// A raw application row from the database. JSON columns stay as text
/// until `into_application` decodes them.
#[derive(Debug, Clone)]
pub struct ApplicationRow {
    pub id: String,
    pub answers: String,
    pub registration: Option<String>,
    pub stage: Option<String>,
    pub startup_stage: Option<String>,
    pub eval_status: String,
    pub overall_score: Option<f64>,
    pub evaluation: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl ApplicationRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            answers: row.get("answers")?,
            registration: row.get("registration")?,
            stage: row.get("stage")?,
            startup_stage: row.get("startup_stage")?,
            eval_status: row.get("eval_status")?,
            overall_score: row.get("overall_score")?,
            evaluation: row.get("evaluation")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    /// Decodes the JSON columns into a typed `Application`.
    pub fn into_application(self) -> Result<Application, DatabaseError> {
        let answers: Map<String, serde_json::Value> = serde_json::from_str(&self.answers)
            .map_err(|e| DatabaseError::CorruptPayload {
                column: "answers",
                source: e,
            })?;

        let registration = match &self.registration {
            Some(raw) => Some(serde_json::from_str(raw).map_err(|e| {
                DatabaseError::CorruptPayload {
                    column: "registration",
                    source: e,
                }
            })?),
            None => None,
        };

        let evaluation: Option<EvaluationResult> = match &self.evaluation {
            Some(raw) => Some(serde_json::from_str(raw).map_err(|e| {
                DatabaseError::CorruptPayload {
                    column: "evaluation",
                    source: e,
                }
            })?),
            None => None,
        };

        let eval_status = EvalStatus::parse(&self.eval_status, &self.id);

        Ok(Application {
            id: self.id,
            answers,
            registration,
            stage: self.stage,
            startup_stage: self.startup_stage,
            eval_status,
            overall_score: self.overall_score,
            evaluation,
            created_at: parse_timestamp(&self.created_at),
            updated_at: parse_timestamp(&self.updated_at),
        })
    }
}

/// Inserts a new application.
pub fn insert(db: &Database, app: &Application) -> Result<(), DatabaseError> {
    let answers = serde_json::to_string(&app.answers).map_err(|e| {
        DatabaseError::CorruptPayload {
            column: "answers",
            source: e,
        }
    })?;
    let registration = match &app.registration {
        Some(r) => Some(
            serde_json::to_string(r).map_err(|e| DatabaseError::CorruptPayload {
                column: "registration",
                source: e,
            })?,
        ),
        None => None,
    };

    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO applications (id, answers, registration, stage, startup_stage,
             eval_status, overall_score, evaluation, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                app.id,
                answers,
                registration,
                app.stage,
                app.startup_stage,
                app.eval_status.as_str(),
                app.overall_score,
                Option::<String>::None,
                app.created_at.to_rfc3339(),
                app.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    })
}

/// Finds an application by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<Application>, DatabaseError> {
    let row = db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM applications WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], ApplicationRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })?;

    row.map(ApplicationRow::into_application).transpose()
}

/// Updates only the evaluation status.
pub fn update_eval_status(
    db: &Database,
    id: &str,
    status: EvalStatus,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE applications SET eval_status = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, status.as_str(), Utc::now().to_rfc3339()],
        )?;
        Ok(())
    })
}

/// Stores a completed evaluation: result payload, overall score, and
/// status in one statement so readers never see a partial write.
pub fn store_result(
    db: &Database,
    id: &str,
    result: &EvaluationResult,
) -> Result<(), DatabaseError> {
    let payload = serde_json::to_string(result).map_err(|e| DatabaseError::CorruptPayload {
        column: "evaluation",
        source: e,
    })?;

    db.with_conn(|conn| {
        conn.execute(
            "UPDATE applications
             SET evaluation = ?2, overall_score = ?3, eval_status = ?4, updated_at = ?5
             WHERE id = ?1",
            params![
                id,
                payload,
                result.average,
                EvalStatus::Completed.as_str(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::{EvalMetadata, QuestionScoreRecord, EVALUATOR_VERSION};
    use chrono::DateTime;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    fn sample_app(id: &str) -> Application {
        let mut answers = Map::new();
        answers.insert("startup_stage".to_string(), json!("MVP"));
        answers.insert("problem".to_string(), json!("Invoices get lost"));
        Application::new(id, answers)
    }

    #[test]
    fn test_insert_and_find() {
        let db = test_db();
        insert(&db, &sample_app("app-1")).unwrap();

        let found = find_by_id(&db, "app-1").unwrap().unwrap();
        assert_eq!(found.id, "app-1");
        assert_eq!(found.eval_status, EvalStatus::Pending);
        assert_eq!(found.answers.get("startup_stage"), Some(&json!("MVP")));
        assert!(found.evaluation.is_none());
    }

    #[test]
    fn test_find_nonexistent() {
        let db = test_db();
        assert!(find_by_id(&db, "missing").unwrap().is_none());
    }

    #[test]
    fn test_update_eval_status() {
        let db = test_db();
        insert(&db, &sample_app("app-2")).unwrap();

        update_eval_status(&db, "app-2", EvalStatus::Processing).unwrap();

        let found = find_by_id(&db, "app-2").unwrap().unwrap();
        assert_eq!(found.eval_status, EvalStatus::Processing);
    }

    #[test]
    fn test_store_result_sets_score_and_status() {
        let db = test_db();
        insert(&db, &sample_app("app-3")).unwrap();

        let mut scores = BTreeMap::new();
        scores.insert(
            "mvp_problem".to_string(),
            QuestionScoreRecord {
                score: 8.0,
                strengths: vec!["clear niche".to_string()],
                improvements: vec!["add data".to_string()],
                raw_response: "SCORE: 8".to_string(),
                oracle_responded: true,
            },
        );
        let result = EvaluationResult {
            scores,
            average: 8.0,
            completed_at: Utc::now(),
            metadata: EvalMetadata {
                model: "test-model".to_string(),
                evaluator_version: EVALUATOR_VERSION.to_string(),
                questions_scored: 1,
                questions_total: 4,
                stage: Some("mvp_stage".to_string()),
                warnings: vec![],
            },
        };

        store_result(&db, "app-3", &result).unwrap();

        let found = find_by_id(&db, "app-3").unwrap().unwrap();
        assert_eq!(found.eval_status, EvalStatus::Completed);
        assert_eq!(found.overall_score, Some(8.0));
        let stored = found.evaluation.unwrap();
        assert_eq!(stored.average, 8.0);
        assert_eq!(stored.scores.len(), 1);
    }

    #[test]
    fn test_timestamp_parse_tolerates_bare_dates() {
        let dt = parse_timestamp("2026-03-15");
        assert_eq!(dt.to_rfc3339(), "2026-03-15T00:00:00+00:00");
    }

    #[test]
    fn test_timestamp_parse_garbage_falls_back() {
        assert_eq!(parse_timestamp("not a date"), DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn test_corrupt_answers_payload_is_reported() {
        let db = test_db();
        db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO applications (id, answers, eval_status, created_at, updated_at)
                 VALUES ('bad', 'not-json', 'pending', '2026-01-01', '2026-01-01')",
                [],
            )?;
            Ok(())
        })
        .unwrap();

        let err = find_by_id(&db, "bad").unwrap_err();
        assert!(matches!(
            err,
            DatabaseError::CorruptPayload { column: "answers", .. }
        ));
    }
}
