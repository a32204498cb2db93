use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;
use uuid::Uuid;

/// Lifecycle state of an achievement as recorded on its reference row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AchievementStatus {
    Draft,
    Submitted,
    Verified,
    Rejected,
    Deleted,
}

impl AchievementStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AchievementStatus::Draft => "draft",
            AchievementStatus::Submitted => "submitted",
            AchievementStatus::Verified => "verified",
            AchievementStatus::Rejected => "rejected",
            AchievementStatus::Deleted => "deleted",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "draft" => Some(AchievementStatus::Draft),
            "submitted" => Some(AchievementStatus::Submitted),
            "verified" => Some(AchievementStatus::Verified),
            "rejected" => Some(AchievementStatus::Rejected),
            "deleted" => Some(AchievementStatus::Deleted),
            _ => None,
        }
    }
}

impl std::fmt::Display for AchievementStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AchievementType {
    Academic,
    Competition,
    Organization,
    Publication,
    Certification,
    Other,
}

impl AchievementType {
    pub fn as_str(self) -> &'static str {
        match self {
            AchievementType::Academic => "academic",
            AchievementType::Competition => "competition",
            AchievementType::Organization => "organization",
            AchievementType::Publication => "publication",
            AchievementType::Certification => "certification",
            AchievementType::Other => "other",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "academic" => Some(AchievementType::Academic),
            "competition" => Some(AchievementType::Competition),
            "organization" => Some(AchievementType::Organization),
            "publication" => Some(AchievementType::Publication),
            "certification" => Some(AchievementType::Certification),
            "other" => Some(AchievementType::Other),
            _ => None,
        }
    }
}

impl std::fmt::Display for AchievementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relational row tracking ownership, lifecycle and audit data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AchievementReference {
    pub id: Uuid,
    pub student_id: Uuid,
    pub external_document_id: String,
    pub status: AchievementStatus,
    pub submitted_at: Option<DateTime<Utc>>,
    pub verified_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub verified_by: Option<Uuid>,
    pub rejection_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A reference row together with the display data resolved by joins.
#[derive(Clone, Debug, PartialEq)]
pub struct ReferenceRecord {
    pub reference: AchievementReference,
    pub student_user_id: Uuid,
    pub student_name: String,
    pub verifier_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CompetitionDetails {
    pub competition_name: String,
    #[serde(default)]
    pub competition_level: Option<String>,
    #[serde(default)]
    pub rank: Option<i64>,
    #[serde(default)]
    pub medal_type: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PublicationDetails {
    pub publication_title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub publisher: Option<String>,
    #[serde(default)]
    pub issn: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Period {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct OrganizationDetails {
    pub organization_name: String,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub period: Option<Period>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CertificationDetails {
    pub certification_name: String,
    #[serde(default)]
    pub issued_by: Option<String>,
    #[serde(default)]
    pub certification_number: Option<String>,
    #[serde(default)]
    pub valid_until: Option<NaiveDate>,
}

/// Type-specific details, keyed by the achievement type they belong to.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AchievementDetails {
    Competition(CompetitionDetails),
    Publication(PublicationDetails),
    Organization(OrganizationDetails),
    Certification(CertificationDetails),
    FreeForm {
        #[schema(value_type = Object)]
        fields: Map<String, Value>,
    },
}

impl AchievementDetails {
    /// Whether this block is the right shape for `kind`.
    pub fn fits(&self, kind: AchievementType) -> bool {
        matches!(
            (self, kind),
            (AchievementDetails::Competition(_), AchievementType::Competition)
                | (AchievementDetails::Publication(_), AchievementType::Publication)
                | (AchievementDetails::Organization(_), AchievementType::Organization)
                | (AchievementDetails::Certification(_), AchievementType::Certification)
                | (
                    AchievementDetails::FreeForm { .. },
                    AchievementType::Academic | AchievementType::Other
                )
        )
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Attachment {
    pub filename: String,
    pub url: String,
    #[serde(rename = "type")]
    pub file_type: String,
    pub uploaded_at: DateTime<Utc>,
}

/// Content record held by the document store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AchievementDocument {
    pub id: String,
    pub student_id: String,
    pub achievement_type: AchievementType,
    pub title: String,
    pub description: String,
    pub details: Option<AchievementDetails>,
    pub event_date: Option<NaiveDate>,
    pub tags: Vec<String>,
    pub attachments: Vec<Attachment>,
    pub points: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payload for a fresh document insert. Points and attachments always start empty.
#[derive(Clone, Debug, PartialEq)]
pub struct NewDocument {
    pub student_id: String,
    pub achievement_type: AchievementType,
    pub title: String,
    pub description: String,
    pub details: Option<AchievementDetails>,
    pub event_date: Option<NaiveDate>,
    pub tags: Vec<String>,
}

/// Student profile as seen by the workflow.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct StudentProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub full_name: String,
    pub nim: String,
    pub advisor_id: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_roundtrips_through_str() {
        for status in [
            AchievementStatus::Draft,
            AchievementStatus::Submitted,
            AchievementStatus::Verified,
            AchievementStatus::Rejected,
            AchievementStatus::Deleted,
        ] {
            assert_eq!(AchievementStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(AchievementStatus::parse(" Draft "), Some(AchievementStatus::Draft));
        assert!(AchievementStatus::parse("archived").is_none());
    }

    #[test]
    fn details_fit_only_their_type() {
        let competition = AchievementDetails::Competition(CompetitionDetails {
            competition_name: "ICPC".into(),
            competition_level: Some("international".into()),
            rank: Some(1),
            medal_type: Some("gold".into()),
        });
        assert!(competition.fits(AchievementType::Competition));
        assert!(!competition.fits(AchievementType::Publication));

        let free = AchievementDetails::FreeForm { fields: Map::new() };
        assert!(free.fits(AchievementType::Academic));
        assert!(free.fits(AchievementType::Other));
        assert!(!free.fits(AchievementType::Organization));
    }

    #[test]
    fn details_serialize_with_kind_tag() {
        let details = AchievementDetails::Organization(OrganizationDetails {
            organization_name: "BEM".into(),
            position: Some("chair".into()),
            period: None,
        });
        let value = serde_json::to_value(&details).unwrap();
        assert_eq!(value["kind"], "organization");
        assert_eq!(value["organization_name"], "BEM");
    }
}
