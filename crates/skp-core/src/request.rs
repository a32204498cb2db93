//! Typed request payloads and their validation into store-level values.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use utoipa::ToSchema;

use crate::error::WorkflowError;
use crate::model::{
    AchievementDetails, AchievementType, CertificationDetails, CompetitionDetails, NewDocument,
    OrganizationDetails, Period, PublicationDetails,
};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Field of a merge-patch: absent keeps the stored value, `null` clears it,
/// anything else replaces it.
#[derive(Clone, Debug, PartialEq)]
pub enum Patch<T> {
    Absent,
    Clear,
    Set(T),
}

impl<T> Default for Patch<T> {
    fn default() -> Self {
        Patch::Absent
    }
}

impl<T> Patch<T> {
    pub fn is_absent(&self) -> bool {
        matches!(self, Patch::Absent)
    }

    /// Resolves the patch against the currently stored value.
    pub fn apply_to(self, current: Option<T>) -> Option<T> {
        match self {
            Patch::Absent => current,
            Patch::Clear => None,
            Patch::Set(v) => Some(v),
        }
    }
}

// Only reached when the key is present; `#[serde(default)]` covers absence.
impl<'de, T: Deserialize<'de>> Deserialize<'de> for Patch<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Option::<T>::deserialize(deserializer)? {
            Some(v) => Patch::Set(v),
            None => Patch::Clear,
        })
    }
}

#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
pub struct CompetitionInput {
    #[serde(default)]
    pub competition_name: String,
    #[serde(default)]
    pub competition_level: Option<String>,
    #[serde(default)]
    pub rank: Option<i64>,
    #[serde(default)]
    pub medal_type: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
pub struct PublicationInput {
    #[serde(default)]
    pub publication_title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub publisher: Option<String>,
    #[serde(default)]
    pub issn: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
pub struct OrganizationInput {
    #[serde(default)]
    pub organization_name: String,
    #[serde(default)]
    pub position: Option<String>,
    /// `YYYY-MM-DD`
    #[serde(default)]
    pub start_date: Option<String>,
    /// `YYYY-MM-DD`
    #[serde(default)]
    pub end_date: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
pub struct CertificationInput {
    #[serde(default)]
    pub certification_name: String,
    #[serde(default)]
    pub issued_by: Option<String>,
    #[serde(default)]
    pub certification_number: Option<String>,
    /// `YYYY-MM-DD`
    #[serde(default)]
    pub valid_until: Option<String>,
}

fn required(field: &str, raw: String) -> Result<String, WorkflowError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(WorkflowError::validation(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

fn optional_text(raw: Option<String>) -> Option<String> {
    raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

pub fn parse_date(field: &str, raw: &str) -> Result<NaiveDate, WorkflowError> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT).map_err(|_| {
        WorkflowError::validation(format!("{field} must be a date formatted YYYY-MM-DD"))
    })
}

fn optional_date(field: &str, raw: Option<String>) -> Result<Option<NaiveDate>, WorkflowError> {
    match optional_text(raw) {
        Some(s) => parse_date(field, &s).map(Some),
        None => Ok(None),
    }
}

fn clean_tags(tags: Vec<String>) -> Vec<String> {
    tags.into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

impl CompetitionInput {
    fn build(self) -> Result<AchievementDetails, WorkflowError> {
        if let Some(rank) = self.rank {
            if rank < 1 {
                return Err(WorkflowError::validation(
                    "competition_details.rank must be at least 1",
                ));
            }
        }
        Ok(AchievementDetails::Competition(CompetitionDetails {
            competition_name: required("competition_details.competition_name", self.competition_name)?,
            competition_level: optional_text(self.competition_level),
            rank: self.rank,
            medal_type: optional_text(self.medal_type),
        }))
    }
}

impl PublicationInput {
    fn build(self) -> Result<AchievementDetails, WorkflowError> {
        Ok(AchievementDetails::Publication(PublicationDetails {
            publication_title: required(
                "publication_details.publication_title",
                self.publication_title,
            )?,
            authors: clean_tags(self.authors),
            publisher: optional_text(self.publisher),
            issn: optional_text(self.issn),
        }))
    }
}

impl OrganizationInput {
    fn build(self) -> Result<AchievementDetails, WorkflowError> {
        let start = optional_date("organization_details.start_date", self.start_date)?;
        let end = optional_date("organization_details.end_date", self.end_date)?;
        // Only parseability is checked, not start <= end.
        let period = match (start, end) {
            (Some(start), Some(end)) => Some(Period { start, end }),
            (None, None) => None,
            _ => {
                return Err(WorkflowError::validation(
                    "organization_details needs both start_date and end_date",
                ))
            }
        };
        Ok(AchievementDetails::Organization(OrganizationDetails {
            organization_name: required(
                "organization_details.organization_name",
                self.organization_name,
            )?,
            position: optional_text(self.position),
            period,
        }))
    }
}

impl CertificationInput {
    fn build(self) -> Result<AchievementDetails, WorkflowError> {
        Ok(AchievementDetails::Certification(CertificationDetails {
            certification_name: required(
                "certification_details.certification_name",
                self.certification_name,
            )?,
            issued_by: optional_text(self.issued_by),
            certification_number: optional_text(self.certification_number),
            valid_until: optional_date("certification_details.valid_until", self.valid_until)?,
        }))
    }
}

pub fn block_name(details: &AchievementDetails) -> &'static str {
    match details {
        AchievementDetails::Competition(_) => "competition_details",
        AchievementDetails::Publication(_) => "publication_details",
        AchievementDetails::Organization(_) => "organization_details",
        AchievementDetails::Certification(_) => "certification_details",
        AchievementDetails::FreeForm { .. } => "details",
    }
}

pub fn ensure_fits(details: &AchievementDetails, kind: AchievementType) -> Result<(), WorkflowError> {
    if details.fits(kind) {
        Ok(())
    } else {
        Err(WorkflowError::validation(format!(
            "{} does not match achievement_type {}",
            block_name(details),
            kind
        )))
    }
}

fn single_block(
    mut blocks: Vec<AchievementDetails>,
) -> Result<Option<AchievementDetails>, WorkflowError> {
    if blocks.len() > 1 {
        return Err(WorkflowError::validation(
            "only one detail block may be supplied",
        ));
    }
    Ok(blocks.pop())
}

fn parse_type(raw: &str) -> Result<AchievementType, WorkflowError> {
    AchievementType::parse(raw).ok_or_else(|| {
        WorkflowError::validation(
            "achievement_type must be one of academic, competition, organization, publication, certification, other",
        )
    })
}

#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
pub struct CreateAchievementRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub achievement_type: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub competition_details: Option<CompetitionInput>,
    #[serde(default)]
    pub publication_details: Option<PublicationInput>,
    #[serde(default)]
    pub organization_details: Option<OrganizationInput>,
    #[serde(default)]
    pub certification_details: Option<CertificationInput>,
    /// Free-form details for `academic` and `other` achievements.
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub details: Option<Map<String, Value>>,
    /// `YYYY-MM-DD`
    #[serde(default)]
    pub event_date: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

impl CreateAchievementRequest {
    pub fn into_document(self, student_id: String) -> Result<NewDocument, WorkflowError> {
        let title = required("title", self.title)?;
        let achievement_type = parse_type(&self.achievement_type)?;

        let mut blocks = Vec::new();
        if let Some(b) = self.competition_details {
            blocks.push(b.build()?);
        }
        if let Some(b) = self.publication_details {
            blocks.push(b.build()?);
        }
        if let Some(b) = self.organization_details {
            blocks.push(b.build()?);
        }
        if let Some(b) = self.certification_details {
            blocks.push(b.build()?);
        }
        if let Some(fields) = self.details {
            blocks.push(AchievementDetails::FreeForm { fields });
        }
        let details = single_block(blocks)?;
        if let Some(d) = &details {
            ensure_fits(d, achievement_type)?;
        }

        Ok(NewDocument {
            student_id,
            achievement_type,
            title,
            description: self.description.unwrap_or_default().trim().to_string(),
            details,
            event_date: optional_date("event_date", self.event_date)?,
            tags: clean_tags(self.tags.unwrap_or_default()),
        })
    }
}

/// Merge-patch body for `PUT /achievements/{id}`.
#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
pub struct UpdateAchievementRequest {
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub title: Patch<String>,
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub achievement_type: Patch<String>,
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub description: Patch<String>,
    #[serde(default)]
    #[schema(value_type = Option<CompetitionInput>)]
    pub competition_details: Patch<CompetitionInput>,
    #[serde(default)]
    #[schema(value_type = Option<PublicationInput>)]
    pub publication_details: Patch<PublicationInput>,
    #[serde(default)]
    #[schema(value_type = Option<OrganizationInput>)]
    pub organization_details: Patch<OrganizationInput>,
    #[serde(default)]
    #[schema(value_type = Option<CertificationInput>)]
    pub certification_details: Patch<CertificationInput>,
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub details: Patch<Map<String, Value>>,
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub event_date: Patch<String>,
    #[serde(default)]
    #[schema(value_type = Option<Vec<String>>)]
    pub tags: Patch<Vec<String>>,
}

/// Validated merge-patch for a stored document.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DocumentPatch {
    pub title: Option<String>,
    pub achievement_type: Option<AchievementType>,
    pub description: Option<String>,
    pub details: Patch<AchievementDetails>,
    pub event_date: Patch<NaiveDate>,
    pub tags: Option<Vec<String>>,
}

impl DocumentPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.achievement_type.is_none()
            && self.description.is_none()
            && self.details.is_absent()
            && self.event_date.is_absent()
            && self.tags.is_none()
    }
}

impl UpdateAchievementRequest {
    pub fn into_patch(self) -> Result<DocumentPatch, WorkflowError> {
        let title = match self.title {
            Patch::Absent => None,
            Patch::Clear => return Err(WorkflowError::validation("title cannot be cleared")),
            Patch::Set(t) => Some(required("title", t)?),
        };
        let achievement_type = match self.achievement_type {
            Patch::Absent => None,
            Patch::Clear => {
                return Err(WorkflowError::validation(
                    "achievement_type cannot be cleared",
                ))
            }
            Patch::Set(t) => Some(parse_type(&t)?),
        };
        let description = match self.description {
            Patch::Absent => None,
            Patch::Clear => Some(String::new()),
            Patch::Set(d) => Some(d.trim().to_string()),
        };

        let mut blocks = Vec::new();
        let mut cleared = false;
        macro_rules! collect {
            ($patch:expr, $build:expr) => {
                match $patch {
                    Patch::Absent => {}
                    Patch::Clear => cleared = true,
                    Patch::Set(input) => blocks.push($build(input)?),
                }
            };
        }
        collect!(self.competition_details, CompetitionInput::build);
        collect!(self.publication_details, PublicationInput::build);
        collect!(self.organization_details, OrganizationInput::build);
        collect!(self.certification_details, CertificationInput::build);
        collect!(self.details, |fields| Ok::<_, WorkflowError>(
            AchievementDetails::FreeForm { fields }
        ));
        let details = match single_block(blocks)? {
            Some(d) => Patch::Set(d),
            None if cleared => Patch::Clear,
            None => Patch::Absent,
        };

        let event_date = match self.event_date {
            Patch::Absent => Patch::Absent,
            Patch::Clear => Patch::Clear,
            Patch::Set(raw) if raw.trim().is_empty() => Patch::Clear,
            Patch::Set(raw) => Patch::Set(parse_date("event_date", &raw)?),
        };
        let tags = match self.tags {
            Patch::Absent => None,
            Patch::Clear => Some(Vec::new()),
            Patch::Set(t) => Some(clean_tags(t)),
        };

        Ok(DocumentPatch {
            title,
            achievement_type,
            description,
            details,
            event_date,
            tags,
        })
    }
}

#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
pub struct VerifyRequest {
    #[serde(default)]
    pub points: i64,
}

#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
pub struct RejectRequest {
    #[serde(default)]
    pub rejection_note: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn create(body: serde_json::Value) -> Result<NewDocument, WorkflowError> {
        serde_json::from_value::<CreateAchievementRequest>(body)
            .unwrap()
            .into_document("stu-1".into())
    }

    fn update(body: serde_json::Value) -> Result<DocumentPatch, WorkflowError> {
        serde_json::from_value::<UpdateAchievementRequest>(body)
            .unwrap()
            .into_patch()
    }

    #[test]
    fn patch_distinguishes_absent_null_and_value() {
        let req: UpdateAchievementRequest =
            serde_json::from_value(json!({"description": null, "title": "New"})).unwrap();
        assert_eq!(req.description, Patch::Clear);
        assert_eq!(req.title, Patch::Set("New".to_string()));
        assert_eq!(req.tags, Patch::Absent);
    }

    #[test]
    fn competition_create_builds_document() {
        let doc = create(json!({
            "title": "  National Programming Contest ",
            "achievement_type": "competition",
            "competition_details": {"competition_name": "NPC", "rank": 1, "medal_type": "gold"},
            "event_date": "2024-05-01",
            "tags": ["coding", " ", "team"]
        }))
        .unwrap();
        assert_eq!(doc.title, "National Programming Contest");
        assert_eq!(doc.achievement_type, AchievementType::Competition);
        assert_eq!(doc.tags, vec!["coding", "team"]);
        assert_eq!(doc.event_date, NaiveDate::from_ymd_opt(2024, 5, 1));
        assert!(matches!(
            doc.details,
            Some(AchievementDetails::Competition(ref c)) if c.rank == Some(1)
        ));
    }

    #[test]
    fn missing_title_or_bad_type_rejected() {
        assert!(matches!(
            create(json!({"achievement_type": "academic"})),
            Err(WorkflowError::Validation(_))
        ));
        assert!(matches!(
            create(json!({"title": "x", "achievement_type": "sports"})),
            Err(WorkflowError::Validation(_))
        ));
    }

    #[test]
    fn organization_dates_must_parse() {
        let err = create(json!({
            "title": "BEM",
            "achievement_type": "organization",
            "organization_details": {"organization_name": "BEM", "start_date": "2024-13-01", "end_date": "2024-12-01"}
        }))
        .unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(ref m) if m.contains("start_date")));

        // End before start is accepted.
        let doc = create(json!({
            "title": "BEM",
            "achievement_type": "organization",
            "organization_details": {"organization_name": "BEM", "start_date": "2024-06-01", "end_date": "2024-01-01"}
        }))
        .unwrap();
        assert!(matches!(
            doc.details,
            Some(AchievementDetails::Organization(OrganizationDetails { period: Some(_), .. }))
        ));
    }

    #[test]
    fn block_must_match_type_and_be_single() {
        let err = create(json!({
            "title": "x",
            "achievement_type": "publication",
            "competition_details": {"competition_name": "NPC"}
        }))
        .unwrap_err();
        assert!(err.to_string().contains("competition_details"));

        let err = create(json!({
            "title": "x",
            "achievement_type": "competition",
            "competition_details": {"competition_name": "NPC"},
            "publication_details": {"publication_title": "Paper"}
        }))
        .unwrap_err();
        assert!(err.to_string().contains("only one"));
    }

    #[test]
    fn free_form_details_for_academic() {
        let doc = create(json!({
            "title": "Dean's list",
            "achievement_type": "academic",
            "details": {"gpa": 3.9}
        }))
        .unwrap();
        assert!(matches!(doc.details, Some(AchievementDetails::FreeForm { ref fields }) if fields["gpa"] == json!(3.9)));
    }

    #[test]
    fn update_patch_semantics() {
        let patch = update(json!({"title": "Renamed", "tags": null, "event_date": ""})).unwrap();
        assert_eq!(patch.title.as_deref(), Some("Renamed"));
        assert_eq!(patch.tags, Some(vec![]));
        assert_eq!(patch.event_date, Patch::Clear);
        assert!(patch.description.is_none());
        assert!(patch.details.is_absent());

        assert!(update(json!({"title": null})).is_err());
        assert!(update(json!({"title": "   "})).is_err());
        assert!(update(json!({})).unwrap().is_empty());
    }

    #[test]
    fn update_clearing_a_block_clears_details() {
        let patch = update(json!({"competition_details": null})).unwrap();
        assert_eq!(patch.details, Patch::Clear);
    }
}
