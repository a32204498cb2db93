use anyhow::Result;
use regex::{Regex, RegexBuilder};
use rusqlite::functions::FunctionFlags;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use skp_core::model::{AchievementDocument, AchievementType, Attachment, NewDocument};
use skp_core::request::{DocumentPatch, Patch, DATE_FORMAT};

use crate::{apply_busy_timeout, json_col, now_ts, open_db, ts_col};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS achievements (
  id TEXT PRIMARY KEY,
  student_id TEXT NOT NULL,
  achievement_type TEXT NOT NULL,
  title TEXT NOT NULL,
  description TEXT NOT NULL DEFAULT '',
  details TEXT,                              -- JSON, tagged by kind
  event_date TEXT,                           -- YYYY-MM-DD
  tags TEXT NOT NULL DEFAULT '[]',           -- JSON array
  attachments TEXT NOT NULL DEFAULT '[]',    -- JSON array
  points INTEGER NOT NULL DEFAULT 0,
  created_at TEXT NOT NULL,
  updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_achievements_student ON achievements(student_id);
"#;

const DOC_SELECT: &str = "SELECT id, student_id, achievement_type, title, description, details, \
     event_date, tags, attachments, points, created_at, updated_at FROM achievements";

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Case-insensitive title pattern. Input that is not a valid regex is
/// matched literally.
fn title_pattern(raw: &str) -> std::result::Result<Regex, regex::Error> {
    RegexBuilder::new(raw)
        .case_insensitive(true)
        .size_limit(1 << 20)
        .build()
        .or_else(|_| {
            RegexBuilder::new(&regex::escape(raw))
                .case_insensitive(true)
                .build()
        })
}

/// Registers `regexp(pattern, text)` so `title REGEXP ?` works.
fn register_regexp(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "regexp",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let re: Arc<Regex> = ctx.get_or_create_aux(0, |vr| -> std::result::Result<_, BoxError> {
                Ok(title_pattern(vr.as_str()?)?)
            })?;
            let text = ctx
                .get_raw(1)
                .as_str()
                .map_err(|e| rusqlite::Error::UserFunctionError(e.into()))?;
            Ok(re.is_match(text))
        },
    )
}

fn map_doc(row: &rusqlite::Row<'_>) -> rusqlite::Result<AchievementDocument> {
    let kind_raw: String = row.get(2)?;
    let achievement_type = AchievementType::parse(&kind_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            format!("unknown achievement type {kind_raw:?}").into(),
        )
    })?;
    let details = match row.get::<_, Option<String>>(5)? {
        Some(_) => Some(json_col(row, 5)?),
        None => None,
    };
    let event_date = match row.get::<_, Option<String>>(6)? {
        Some(raw) => Some(
            chrono::NaiveDate::parse_from_str(&raw, DATE_FORMAT).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
            })?,
        ),
        None => None,
    };
    Ok(AchievementDocument {
        id: row.get(0)?,
        student_id: row.get(1)?,
        achievement_type,
        title: row.get(3)?,
        description: row.get(4)?,
        details,
        event_date,
        tags: json_col(row, 7)?,
        attachments: json_col(row, 8)?,
        points: row.get(9)?,
        created_at: ts_col(row, 10)?,
        updated_at: ts_col(row, 11)?,
    })
}

#[derive(Clone)]
pub struct DocumentDb {
    db_path: PathBuf,
}

impl DocumentDb {
    pub fn open(path: &Path) -> Result<Self> {
        open_db(path, SCHEMA)?;
        Ok(Self {
            db_path: path.to_path_buf(),
        })
    }

    fn conn(&self) -> Result<Connection> {
        let conn = Connection::open(&self.db_path)?;
        apply_busy_timeout(&conn)?;
        register_regexp(&conn)?;
        Ok(conn)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn insert(&self, doc: &NewDocument) -> Result<String> {
        let conn = self.conn()?;
        let id = Uuid::new_v4().simple().to_string();
        let now = now_ts();
        let details = doc.details.as_ref().map(serde_json::to_string).transpose()?;
        conn.execute(
            "INSERT INTO achievements(id,student_id,achievement_type,title,description,details,event_date,tags,attachments,points,created_at,updated_at) \
             VALUES(?,?,?,?,?,?,?,?,'[]',0,?,?)",
            params![
                id,
                doc.student_id,
                doc.achievement_type.as_str(),
                doc.title,
                doc.description,
                details,
                doc.event_date.map(|d| d.format(DATE_FORMAT).to_string()),
                serde_json::to_string(&doc.tags)?,
                now,
                now
            ],
        )?;
        Ok(id)
    }

    pub fn find_by_id(&self, id: &str) -> Result<Option<AchievementDocument>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("{DOC_SELECT} WHERE id = ? LIMIT 1"))?;
        Ok(stmt.query_row([id], map_doc).optional()?)
    }

    pub fn find_many(&self, ids: &[String]) -> Result<Vec<AchievementDocument>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn()?;
        let marks = vec!["?"; ids.len()].join(",");
        let mut stmt = conn.prepare(&format!("{DOC_SELECT} WHERE id IN ({marks})"))?;
        let rows = stmt.query_map(params_from_iter(ids.iter()), map_doc)?;
        let mut out = Vec::with_capacity(ids.len());
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    /// Merge-patch: only fields present in `patch` are written. Returns
    /// false when no document has `id`.
    pub fn update_fields(&self, id: &str, patch: &DocumentPatch) -> Result<bool> {
        let conn = self.conn()?;
        let mut set_parts: Vec<&str> = Vec::new();
        let mut params_vec: Vec<Value> = Vec::new();
        if let Some(title) = &patch.title {
            set_parts.push("title=?");
            params_vec.push(Value::from(title.clone()));
        }
        if let Some(kind) = patch.achievement_type {
            set_parts.push("achievement_type=?");
            params_vec.push(Value::from(kind.as_str().to_string()));
        }
        if let Some(description) = &patch.description {
            set_parts.push("description=?");
            params_vec.push(Value::from(description.clone()));
        }
        match &patch.details {
            Patch::Absent => {}
            Patch::Clear => {
                set_parts.push("details=?");
                params_vec.push(Value::Null);
            }
            Patch::Set(details) => {
                set_parts.push("details=?");
                params_vec.push(Value::from(serde_json::to_string(details)?));
            }
        }
        match &patch.event_date {
            Patch::Absent => {}
            Patch::Clear => {
                set_parts.push("event_date=?");
                params_vec.push(Value::Null);
            }
            Patch::Set(date) => {
                set_parts.push("event_date=?");
                params_vec.push(Value::from(date.format(DATE_FORMAT).to_string()));
            }
        }
        if let Some(tags) = &patch.tags {
            set_parts.push("tags=?");
            params_vec.push(Value::from(serde_json::to_string(tags)?));
        }
        set_parts.push("updated_at=?");
        params_vec.push(Value::from(now_ts()));
        params_vec.push(Value::from(id.to_string()));
        let sql = format!("UPDATE achievements SET {} WHERE id=?", set_parts.join(","));
        let n = conn.execute(&sql, params_from_iter(params_vec))?;
        Ok(n > 0)
    }

    pub fn append_attachment(&self, id: &str, attachment: &Attachment) -> Result<bool> {
        let conn = self.conn()?;
        let n = conn.execute(
            "UPDATE achievements SET attachments = json_insert(attachments, '$[#]', json(?)), updated_at=? WHERE id=?",
            params![serde_json::to_string(attachment)?, now_ts(), id],
        )?;
        Ok(n > 0)
    }

    pub fn set_points(&self, id: &str, points: i64) -> Result<bool> {
        let conn = self.conn()?;
        let n = conn.execute(
            "UPDATE achievements SET points=?, updated_at=? WHERE id=?",
            params![points, now_ts(), id],
        )?;
        Ok(n > 0)
    }

    pub fn search_titles(&self, pattern: &str) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id FROM achievements WHERE title REGEXP ?")?;
        let rows = stmt.query_map([pattern], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    pub fn delete(&self, id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let n = conn.execute("DELETE FROM achievements WHERE id=?", [id])?;
        Ok(n > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use skp_core::model::{AchievementDetails, CompetitionDetails};

    fn open() -> (tempfile::TempDir, DocumentDb) {
        let dir = tempfile::tempdir().unwrap();
        let db = DocumentDb::open(&dir.path().join("documents.sqlite")).unwrap();
        (dir, db)
    }

    fn new_doc(title: &str) -> NewDocument {
        NewDocument {
            student_id: "stu-1".into(),
            achievement_type: AchievementType::Competition,
            title: title.into(),
            description: "regional round".into(),
            details: Some(AchievementDetails::Competition(CompetitionDetails {
                competition_name: "Gemastik".into(),
                competition_level: Some("national".into()),
                rank: Some(2),
                medal_type: None,
            })),
            event_date: NaiveDate::from_ymd_opt(2024, 8, 17),
            tags: vec!["coding".into()],
        }
    }

    #[test]
    fn insert_then_read_back() {
        let (_dir, db) = open();
        let id = db.insert(&new_doc("Gemastik finalist")).unwrap();
        let doc = db.find_by_id(&id).unwrap().unwrap();
        assert_eq!(doc.title, "Gemastik finalist");
        assert_eq!(doc.points, 0);
        assert!(doc.attachments.is_empty());
        assert_eq!(doc.event_date, NaiveDate::from_ymd_opt(2024, 8, 17));
        assert_eq!(doc.details, new_doc("x").details);
        assert!(db.find_by_id("nope").unwrap().is_none());
    }

    #[test]
    fn merge_patch_keeps_absent_fields() {
        let (_dir, db) = open();
        let id = db.insert(&new_doc("Old title")).unwrap();
        let patch = DocumentPatch {
            title: Some("New title".into()),
            event_date: Patch::Clear,
            ..DocumentPatch::default()
        };
        assert!(db.update_fields(&id, &patch).unwrap());
        let doc = db.find_by_id(&id).unwrap().unwrap();
        assert_eq!(doc.title, "New title");
        assert_eq!(doc.description, "regional round");
        assert_eq!(doc.tags, vec!["coding"]);
        assert!(doc.details.is_some());
        assert!(doc.event_date.is_none());
        assert!(!db.update_fields("missing", &patch).unwrap());
    }

    #[test]
    fn attachments_append_in_order() {
        let (_dir, db) = open();
        let id = db.insert(&new_doc("With files")).unwrap();
        for name in ["a.pdf", "b.pdf"] {
            let att = Attachment {
                filename: name.into(),
                url: format!("/uploads/{name}"),
                file_type: "pdf".into(),
                uploaded_at: chrono::Utc::now(),
            };
            assert!(db.append_attachment(&id, &att).unwrap());
        }
        let doc = db.find_by_id(&id).unwrap().unwrap();
        let names: Vec<_> = doc.attachments.iter().map(|a| a.filename.as_str()).collect();
        assert_eq!(names, vec!["a.pdf", "b.pdf"]);
    }

    #[test]
    fn title_search_is_case_insensitive() {
        let (_dir, db) = open();
        let a = db.insert(&new_doc("Gemastik Finalist")).unwrap();
        let _b = db.insert(&new_doc("Dean's list")).unwrap();
        assert_eq!(db.search_titles("gemastik").unwrap(), vec![a.clone()]);
        assert_eq!(db.search_titles("^gem.*ist$").unwrap(), vec![a]);
        // Broken regex falls back to a literal match.
        assert!(db.search_titles("dean's (").unwrap().is_empty());
        assert_eq!(db.search_titles("(").unwrap().len(), 0);
    }

    #[test]
    fn points_and_delete() {
        let (_dir, db) = open();
        let id = db.insert(&new_doc("Scored")).unwrap();
        assert!(db.set_points(&id, 50).unwrap());
        assert_eq!(db.find_by_id(&id).unwrap().unwrap().points, 50);
        assert!(db.delete(&id).unwrap());
        assert!(db.find_by_id(&id).unwrap().is_none());
        assert!(db.find_many(&[id]).unwrap().is_empty());
    }
}
