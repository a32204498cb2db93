//! Account directory file: users with token fingerprints, plus the student
//! and lecturer rows the reference store joins against.
//!
//! ```toml
//! [[users]]
//! id = "6f2c..."
//! username = "alice"
//! full_name = "Alice Putri"
//! role = "student"
//! token_sha256 = ["<hex sha256 of the bearer token>"]
//!
//! [[students]]
//! id = "..."
//! user_id = "6f2c..."
//! nim = "2201001"
//! advisor_id = "<lecturer id>"
//! ```

use std::path::Path;

use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use skp_core::Role;
use skp_kernel::{Kernel, LecturerRecord, StudentRecord, UserRecord};

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("failed to read directory file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse directory file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to seed directory: {0}")]
    Seed(#[from] anyhow::Error),
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct DirectoryFile {
    #[serde(default)]
    pub users: Vec<DirectoryUser>,
    #[serde(default)]
    pub lecturers: Vec<LecturerRecord>,
    #[serde(default)]
    pub students: Vec<StudentRecord>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct DirectoryUser {
    pub id: Uuid,
    pub username: String,
    pub full_name: String,
    #[serde(default)]
    pub email: Option<String>,
    pub role: String,
    /// Defaults to the role's permission set when omitted.
    #[serde(default)]
    pub permissions: Option<Vec<String>>,
    #[serde(default)]
    pub token_sha256: Vec<String>,
    #[serde(default)]
    pub disabled: bool,
}

impl DirectoryUser {
    fn record(&self) -> UserRecord {
        UserRecord {
            id: self.id,
            username: self.username.clone(),
            full_name: self.full_name.clone(),
            email: self.email.clone(),
            role: Role::parse(&self.role)
                .map(|r| r.as_str().to_string())
                .unwrap_or_else(|| self.role.trim().to_ascii_lowercase()),
        }
    }
}

pub fn load(path: &Path) -> Result<DirectoryFile, DirectoryError> {
    let raw = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&raw)?)
}

/// Upserts every user, lecturer and student row. Lecturers go before students
/// so advisor references resolve.
pub async fn seed(kernel: &Kernel, file: &DirectoryFile) -> Result<(), DirectoryError> {
    let db = kernel.references.clone();
    let file = file.clone();
    tokio::task::spawn_blocking(move || -> anyhow::Result<(usize, usize, usize)> {
        for user in &file.users {
            db.upsert_user(&user.record())?;
        }
        for lecturer in &file.lecturers {
            db.upsert_lecturer(lecturer)?;
        }
        for student in &file.students {
            db.upsert_student(student)?;
        }
        Ok((file.users.len(), file.lecturers.len(), file.students.len()))
    })
    .await
    .map_err(|e| anyhow::anyhow!("join error: {}", e))?
    .map(|(users, lecturers, students)| {
        info!(
            target: "skp::http",
            users,
            lecturers,
            students,
            "directory seeded"
        );
    })
    .map_err(DirectoryError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [[users]]
        id = "00000000-0000-0000-0000-0000000000a1"
        username = "alice"
        full_name = "Alice"
        role = "Mahasiswa"
        token_sha256 = ["aa"]

        [[users]]
        id = "00000000-0000-0000-0000-0000000000b1"
        username = "budi"
        full_name = "Dr. Budi"
        role = "dosen_wali"

        [[lecturers]]
        id = "00000000-0000-0000-0000-0000000000b2"
        user_id = "00000000-0000-0000-0000-0000000000b1"
        lecturer_code = "L-01"

        [[students]]
        id = "00000000-0000-0000-0000-0000000000a2"
        user_id = "00000000-0000-0000-0000-0000000000a1"
        nim = "2201001"
        advisor_id = "00000000-0000-0000-0000-0000000000b2"
    "#;

    #[test]
    fn parses_all_sections() {
        let file: DirectoryFile = toml::from_str(SAMPLE).unwrap();
        assert_eq!(file.users.len(), 2);
        assert_eq!(file.users[0].record().role, "student");
        assert!(file.users[1].token_sha256.is_empty());
        assert_eq!(file.lecturers[0].lecturer_code, "L-01");
        assert_eq!(file.students[0].advisor_id, Some(file.lecturers[0].id));
    }

    #[test]
    fn shipped_dev_directory_parses() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../configs/directory.dev.toml");
        let file = load(&path).unwrap();
        assert_eq!(file.users.len(), 3);
        assert!(file
            .users
            .iter()
            .all(|u| Role::parse(&u.role).is_some() && u.token_sha256.len() == 1));
    }

    #[tokio::test]
    async fn seeding_makes_students_resolvable() {
        let dir = tempfile::tempdir().unwrap();
        let kernel = Kernel::open(dir.path()).unwrap();
        let file: DirectoryFile = toml::from_str(SAMPLE).unwrap();
        seed(&kernel, &file).await.unwrap();
        // Idempotent.
        seed(&kernel, &file).await.unwrap();
        let profile = kernel
            .references
            .student_by_user(file.users[0].id)
            .unwrap()
            .expect("student profile");
        assert_eq!(profile.nim, "2201001");
        assert_eq!(profile.advisor_id, Some(file.lecturers[0].id));
    }
}
