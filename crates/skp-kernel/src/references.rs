use anyhow::Result;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use skp_core::model::{AchievementReference, AchievementStatus, ReferenceRecord, StudentProfile};
use skp_core::query::{ReferenceFilter, RoleScope};
use skp_core::store::StatusChange;

use crate::{apply_busy_timeout, now_ts, opt_ts_col, opt_uuid_col, open_db, ts_col, uuid_col};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
  id TEXT PRIMARY KEY,
  username TEXT NOT NULL UNIQUE,
  full_name TEXT NOT NULL,
  email TEXT,
  role TEXT NOT NULL,
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS lecturers (
  id TEXT PRIMARY KEY,
  user_id TEXT NOT NULL UNIQUE REFERENCES users(id),
  lecturer_code TEXT NOT NULL UNIQUE,
  department TEXT,
  created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS students (
  id TEXT PRIMARY KEY,
  user_id TEXT NOT NULL UNIQUE REFERENCES users(id),
  nim TEXT NOT NULL UNIQUE,
  program_study TEXT,
  academic_year TEXT,
  advisor_id TEXT REFERENCES lecturers(id),
  created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_students_advisor ON students(advisor_id);

-- One row per achievement; external_document_id points into documents.sqlite
CREATE TABLE IF NOT EXISTS achievement_references (
  id TEXT PRIMARY KEY,
  student_id TEXT NOT NULL REFERENCES students(id),
  external_document_id TEXT NOT NULL UNIQUE,
  status TEXT NOT NULL,
  submitted_at TEXT,
  verified_at TEXT,
  rejected_at TEXT,
  verified_by TEXT REFERENCES users(id),
  rejection_note TEXT,
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_refs_student ON achievement_references(student_id);
CREATE INDEX IF NOT EXISTS idx_refs_status ON achievement_references(status);
"#;

const RECORD_SELECT: &str = "SELECT ar.id, ar.student_id, ar.external_document_id, ar.status, \
     ar.submitted_at, ar.verified_at, ar.rejected_at, ar.verified_by, ar.rejection_note, \
     ar.created_at, ar.updated_at, s.user_id, u.full_name, v.full_name \
     FROM achievement_references ar \
     JOIN students s ON s.id = ar.student_id \
     JOIN users u ON u.id = s.user_id \
     LEFT JOIN users v ON v.id = ar.verified_by";

/// Account row seeded from the directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: Uuid,
    pub username: String,
    pub full_name: String,
    #[serde(default)]
    pub email: Option<String>,
    pub role: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LecturerRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub lecturer_code: String,
    #[serde(default)]
    pub department: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub nim: String,
    #[serde(default)]
    pub program_study: Option<String>,
    #[serde(default)]
    pub academic_year: Option<String>,
    #[serde(default)]
    pub advisor_id: Option<Uuid>,
}

#[derive(Clone)]
pub struct ReferenceDb {
    db_path: PathBuf,
}

fn map_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<ReferenceRecord> {
    let status_raw: String = row.get(3)?;
    let status = AchievementStatus::parse(&status_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("unknown status {status_raw:?}").into(),
        )
    })?;
    Ok(ReferenceRecord {
        reference: AchievementReference {
            id: uuid_col(row, 0)?,
            student_id: uuid_col(row, 1)?,
            external_document_id: row.get(2)?,
            status,
            submitted_at: opt_ts_col(row, 4)?,
            verified_at: opt_ts_col(row, 5)?,
            rejected_at: opt_ts_col(row, 6)?,
            verified_by: opt_uuid_col(row, 7)?,
            rejection_note: row.get(8)?,
            created_at: ts_col(row, 9)?,
            updated_at: ts_col(row, 10)?,
        },
        student_user_id: uuid_col(row, 11)?,
        student_name: row.get(12)?,
        verifier_name: row.get(13)?,
    })
}

fn map_student(row: &rusqlite::Row<'_>) -> rusqlite::Result<StudentProfile> {
    Ok(StudentProfile {
        id: uuid_col(row, 0)?,
        user_id: uuid_col(row, 1)?,
        full_name: row.get(2)?,
        nim: row.get(3)?,
        advisor_id: opt_uuid_col(row, 4)?,
    })
}

/// Appends the scope and id restrictions shared by count and page queries.
fn push_filter(sql: &mut String, args: &mut Vec<Value>, filter: &ReferenceFilter) -> Result<()> {
    sql.push_str(" WHERE ar.status != 'deleted'");
    match filter.scope {
        RoleScope::Owner(user_id) => {
            sql.push_str(" AND ar.student_id = (SELECT id FROM students WHERE user_id = ?)");
            args.push(Value::from(user_id.to_string()));
        }
        RoleScope::Advisor(user_id) => {
            sql.push_str(
                " AND ar.student_id IN (SELECT st.id FROM students st \
                 JOIN lecturers l ON st.advisor_id = l.id WHERE l.user_id = ?) \
                 AND ar.status != 'draft'",
            );
            args.push(Value::from(user_id.to_string()));
        }
        RoleScope::AllSubmitted => sql.push_str(" AND ar.status != 'draft'"),
        RoleScope::Student(student_id) => {
            sql.push_str(" AND ar.student_id = ?");
            args.push(Value::from(student_id.to_string()));
        }
    }
    if let Some(ids) = &filter.document_ids {
        if ids.is_empty() {
            sql.push_str(" AND 0");
        } else {
            // One JSON parameter keeps large search hits under the bind-variable cap.
            sql.push_str(" AND ar.external_document_id IN (SELECT value FROM json_each(?))");
            args.push(Value::from(serde_json::to_string(ids)?));
        }
    }
    Ok(())
}

impl ReferenceDb {
    pub fn open(path: &Path) -> Result<Self> {
        open_db(path, SCHEMA)?;
        Ok(Self {
            db_path: path.to_path_buf(),
        })
    }

    fn conn(&self) -> Result<Connection> {
        let conn = Connection::open(&self.db_path)?;
        apply_busy_timeout(&conn)?;
        Ok(conn)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    // ---------------- Directory seeding ----------------

    pub fn upsert_user(&self, user: &UserRecord) -> Result<()> {
        let conn = self.conn()?;
        let now = now_ts();
        conn.execute(
            "INSERT INTO users(id,username,full_name,email,role,created_at,updated_at) VALUES(?,?,?,?,?,?,?) \
             ON CONFLICT(id) DO UPDATE SET username=excluded.username, full_name=excluded.full_name, \
             email=excluded.email, role=excluded.role, updated_at=excluded.updated_at",
            params![
                user.id.to_string(),
                user.username,
                user.full_name,
                user.email,
                user.role,
                now,
                now
            ],
        )?;
        Ok(())
    }

    pub fn upsert_lecturer(&self, lecturer: &LecturerRecord) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO lecturers(id,user_id,lecturer_code,department,created_at) VALUES(?,?,?,?,?) \
             ON CONFLICT(id) DO UPDATE SET user_id=excluded.user_id, \
             lecturer_code=excluded.lecturer_code, department=excluded.department",
            params![
                lecturer.id.to_string(),
                lecturer.user_id.to_string(),
                lecturer.lecturer_code,
                lecturer.department,
                now_ts()
            ],
        )?;
        Ok(())
    }

    pub fn upsert_student(&self, student: &StudentRecord) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO students(id,user_id,nim,program_study,academic_year,advisor_id,created_at) VALUES(?,?,?,?,?,?,?) \
             ON CONFLICT(id) DO UPDATE SET user_id=excluded.user_id, nim=excluded.nim, \
             program_study=excluded.program_study, academic_year=excluded.academic_year, \
             advisor_id=excluded.advisor_id",
            params![
                student.id.to_string(),
                student.user_id.to_string(),
                student.nim,
                student.program_study,
                student.academic_year,
                student.advisor_id.map(|a| a.to_string()),
                now_ts()
            ],
        )?;
        Ok(())
    }

    pub fn student_by_user(&self, user_id: Uuid) -> Result<Option<StudentProfile>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT s.id, s.user_id, u.full_name, s.nim, s.advisor_id \
             FROM students s JOIN users u ON u.id = s.user_id WHERE s.user_id = ? LIMIT 1",
        )?;
        Ok(stmt
            .query_row([user_id.to_string()], map_student)
            .optional()?)
    }

    pub fn student(&self, id: Uuid) -> Result<Option<StudentProfile>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT s.id, s.user_id, u.full_name, s.nim, s.advisor_id \
             FROM students s JOIN users u ON u.id = s.user_id WHERE s.id = ? LIMIT 1",
        )?;
        Ok(stmt.query_row([id.to_string()], map_student).optional()?)
    }

    // ---------------- Achievement references ----------------

    pub fn create(&self, student_id: Uuid, external_document_id: &str) -> Result<AchievementReference> {
        let conn = self.conn()?;
        let id = Uuid::new_v4();
        let now = now_ts();
        conn.execute(
            "INSERT INTO achievement_references(id,student_id,external_document_id,status,created_at,updated_at) \
             VALUES(?,?,?,?,?,?)",
            params![
                id.to_string(),
                student_id.to_string(),
                external_document_id,
                AchievementStatus::Draft.as_str(),
                now,
                now
            ],
        )?;
        let created = chrono::DateTime::parse_from_rfc3339(&now)?.with_timezone(&chrono::Utc);
        Ok(AchievementReference {
            id,
            student_id,
            external_document_id: external_document_id.to_string(),
            status: AchievementStatus::Draft,
            submitted_at: None,
            verified_at: None,
            rejected_at: None,
            verified_by: None,
            rejection_note: None,
            created_at: created,
            updated_at: created,
        })
    }

    /// Reference plus joined display names, ignoring soft-deleted rows.
    pub fn find_active(&self, id: Uuid) -> Result<Option<ReferenceRecord>> {
        let conn = self.conn()?;
        let sql = format!("{RECORD_SELECT} WHERE ar.id = ? AND ar.status != 'deleted' LIMIT 1");
        let mut stmt = conn.prepare(&sql)?;
        Ok(stmt.query_row([id.to_string()], map_record).optional()?)
    }

    pub fn list_active(&self, filter: &ReferenceFilter) -> Result<(Vec<ReferenceRecord>, u64)> {
        let conn = self.conn()?;

        let mut count_sql = String::from("SELECT COUNT(*) FROM achievement_references ar");
        let mut count_args = Vec::new();
        push_filter(&mut count_sql, &mut count_args, filter)?;
        let total: i64 =
            conn.query_row(&count_sql, params_from_iter(count_args), |row| row.get(0))?;

        let mut sql = String::from(RECORD_SELECT);
        let mut args = Vec::new();
        push_filter(&mut sql, &mut args, filter)?;
        // Column and direction come from closed enums, never from caller text.
        let dir = filter.order.as_sql();
        sql.push_str(&format!(
            " ORDER BY ar.{} {dir}, ar.id {dir} LIMIT ? OFFSET ?",
            filter.sort_by.as_str()
        ));
        args.push(Value::from(filter.limit as i64));
        args.push(Value::from(filter.offset.min(i64::MAX as u64) as i64));

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args), map_record)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok((out, total.max(0) as u64))
    }

    /// Guarded status write; returns rows affected.
    pub fn set_status(&self, id: Uuid, expected: AchievementStatus, change: &StatusChange) -> Result<u64> {
        let conn = self.conn()?;
        let now = now_ts();
        let target = change.target().as_str();
        let n = match change {
            StatusChange::Submitted => conn.execute(
                "UPDATE achievement_references SET status=?, submitted_at=?, updated_at=? \
                 WHERE id=? AND status=?",
                params![target, now, now, id.to_string(), expected.as_str()],
            )?,
            StatusChange::Verified { verifier } => conn.execute(
                "UPDATE achievement_references SET status=?, verified_at=?, verified_by=?, \
                 rejected_at=NULL, rejection_note=NULL, updated_at=? WHERE id=? AND status=?",
                params![
                    target,
                    now,
                    verifier.to_string(),
                    now,
                    id.to_string(),
                    expected.as_str()
                ],
            )?,
            StatusChange::Rejected { verifier, note } => conn.execute(
                "UPDATE achievement_references SET status=?, rejected_at=?, verified_by=?, \
                 rejection_note=?, verified_at=NULL, updated_at=? WHERE id=? AND status=?",
                params![
                    target,
                    now,
                    verifier.to_string(),
                    note,
                    now,
                    id.to_string(),
                    expected.as_str()
                ],
            )?,
            StatusChange::Reopened => conn.execute(
                "UPDATE achievement_references SET status=?, verified_at=NULL, verified_by=NULL, \
                 rejected_at=NULL, rejection_note=NULL, updated_at=? WHERE id=? AND status=?",
                params![target, now, id.to_string(), expected.as_str()],
            )?,
            StatusChange::Edited | StatusChange::Deleted => conn.execute(
                "UPDATE achievement_references SET status=?, updated_at=? WHERE id=? AND status=?",
                params![target, now, id.to_string(), expected.as_str()],
            )?,
        };
        Ok(n as u64)
    }

    pub fn soft_delete(&self, id: Uuid) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE achievement_references SET status='deleted', updated_at=? WHERE id=? AND status != 'deleted'",
            params![now_ts(), id.to_string()],
        )?;
        Ok(())
    }

    pub fn owner_user_id(&self, id: Uuid) -> Result<Option<Uuid>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT s.user_id FROM achievement_references ar JOIN students s ON s.id = ar.student_id \
             WHERE ar.id = ? AND ar.status != 'deleted' LIMIT 1",
        )?;
        Ok(stmt.query_row([id.to_string()], |row| uuid_col(row, 0)).optional()?)
    }

    pub fn is_advisor_of(&self, lecturer_user_id: Uuid, id: Uuid) -> Result<bool> {
        let conn = self.conn()?;
        let found: i64 = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM achievement_references ar \
             JOIN students s ON s.id = ar.student_id \
             JOIN lecturers l ON l.id = s.advisor_id \
             WHERE ar.id = ? AND l.user_id = ?)",
            params![id.to_string(), lecturer_user_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(found != 0)
    }
}
