use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::config::ListingConfig;
use crate::identity::{Identity, Role};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    CreatedAt,
    UpdatedAt,
    Status,
}

impl SortField {
    /// `date` is accepted as an alias for `created_at`; anything else is rejected.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "created_at" | "date" => Some(SortField::CreatedAt),
            "updated_at" => Some(SortField::UpdatedAt),
            "status" => Some(SortField::Status),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SortField::CreatedAt => "created_at",
            SortField::UpdatedAt => "updated_at",
            SortField::Status => "status",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "asc" => Some(SortOrder::Asc),
            "desc" => Some(SortOrder::Desc),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Which reference rows a listing may see.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoleScope {
    /// Achievements owned by the student profile of this user, drafts included.
    Owner(Uuid),
    /// Non-draft achievements of students advised by this lecturer user.
    Advisor(Uuid),
    /// Every non-draft achievement.
    AllSubmitted,
    /// One student's achievements, drafts included (administrative view).
    Student(Uuid),
}

impl RoleScope {
    pub fn for_identity(identity: &Identity) -> Self {
        match identity.role {
            Role::Student => RoleScope::Owner(identity.user_id),
            Role::Advisor => RoleScope::Advisor(identity.user_id),
            Role::Admin => RoleScope::AllSubmitted,
        }
    }
}

/// Raw listing parameters as they arrive on the query string.
///
/// Kept as strings so malformed numbers fall back to defaults instead of
/// rejecting the request.
#[derive(Clone, Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListParams {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub search: Option<String>,
    #[serde(rename = "sortBy")]
    pub sort_by: Option<String>,
    pub order: Option<String>,
}

/// Normalized listing request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListQuery {
    pub page: u32,
    pub limit: u32,
    pub search: Option<String>,
    pub sort_by: SortField,
    pub order: SortOrder,
}

impl ListQuery {
    pub fn from_params(params: &ListParams, cfg: &ListingConfig) -> Self {
        let page = params
            .page
            .as_deref()
            .and_then(|s| s.trim().parse::<i64>().ok())
            .filter(|p| *p >= 1)
            .map(|p| p.min(u32::MAX as i64) as u32)
            .unwrap_or(1);
        let limit = params
            .limit
            .as_deref()
            .and_then(|s| s.trim().parse::<i64>().ok())
            .filter(|l| *l >= 1)
            .map(|l| l.min(cfg.max_limit as i64) as u32)
            .unwrap_or(cfg.default_limit);
        let search = params
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        // An unknown column resets both column and direction.
        let (sort_by, order) = match params.sort_by.as_deref() {
            None => (
                SortField::CreatedAt,
                params
                    .order
                    .as_deref()
                    .and_then(SortOrder::parse)
                    .unwrap_or(SortOrder::Desc),
            ),
            Some(raw) => match SortField::parse(raw) {
                Some(field) => (
                    field,
                    params
                        .order
                        .as_deref()
                        .and_then(SortOrder::parse)
                        .unwrap_or(SortOrder::Desc),
                ),
                None => (SortField::CreatedAt, SortOrder::Desc),
            },
        };
        Self {
            page,
            limit,
            search,
            sort_by,
            order,
        }
    }

    pub fn offset(&self) -> u64 {
        (self.page as u64 - 1) * self.limit as u64
    }
}

/// What the reference store needs to run one page of a listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReferenceFilter {
    pub scope: RoleScope,
    /// Restrict to these document ids (already resolved from a title search).
    pub document_ids: Option<Vec<String>>,
    pub sort_by: SortField,
    pub order: SortOrder,
    pub limit: u32,
    pub offset: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct ListMeta {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub pages: u64,
    #[serde(rename = "sortBy")]
    pub sort_by: String,
    pub order: String,
    pub search: String,
}

impl ListMeta {
    pub fn new(query: &ListQuery, total: u64) -> Self {
        let limit = query.limit.max(1) as u64;
        Self {
            page: query.page,
            limit: query.limit,
            total,
            pages: total.div_ceil(limit),
            sort_by: query.sort_by.as_str().to_string(),
            order: query.order.as_str().to_string(),
            search: query.search.clone().unwrap_or_default(),
        }
    }
}

#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub meta: ListMeta,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> ListParams {
        let mut p = ListParams::default();
        for (k, v) in pairs {
            let v = Some(v.to_string());
            match *k {
                "page" => p.page = v,
                "limit" => p.limit = v,
                "search" => p.search = v,
                "sortBy" => p.sort_by = v,
                "order" => p.order = v,
                _ => unreachable!(),
            }
        }
        p
    }

    #[test]
    fn defaults_apply() {
        let q = ListQuery::from_params(&ListParams::default(), &ListingConfig::default());
        assert_eq!(q.page, 1);
        assert_eq!(q.limit, 10);
        assert_eq!(q.sort_by, SortField::CreatedAt);
        assert_eq!(q.order, SortOrder::Desc);
        assert!(q.search.is_none());
        assert_eq!(q.offset(), 0);
    }

    #[test]
    fn bad_numbers_fall_back_and_limit_is_clamped() {
        let cfg = ListingConfig::default();
        let q = ListQuery::from_params(&params(&[("page", "zero"), ("limit", "-3")]), &cfg);
        assert_eq!((q.page, q.limit), (1, 10));
        let q = ListQuery::from_params(&params(&[("page", "3"), ("limit", "5000")]), &cfg);
        assert_eq!((q.page, q.limit), (3, cfg.max_limit));
        assert_eq!(q.offset(), 2 * cfg.max_limit as u64);
    }

    #[test]
    fn date_aliases_created_at() {
        let q = ListQuery::from_params(
            &params(&[("sortBy", "date"), ("order", "ASC")]),
            &ListingConfig::default(),
        );
        assert_eq!(q.sort_by, SortField::CreatedAt);
        assert_eq!(q.order, SortOrder::Asc);
    }

    #[test]
    fn unknown_sort_resets_to_created_desc() {
        let q = ListQuery::from_params(
            &params(&[("sortBy", "title; DROP TABLE users"), ("order", "asc")]),
            &ListingConfig::default(),
        );
        assert_eq!(q.sort_by, SortField::CreatedAt);
        assert_eq!(q.order, SortOrder::Desc);
    }

    #[test]
    fn unknown_order_defaults_desc() {
        let q = ListQuery::from_params(
            &params(&[("sortBy", "status"), ("order", "sideways")]),
            &ListingConfig::default(),
        );
        assert_eq!(q.sort_by, SortField::Status);
        assert_eq!(q.order, SortOrder::Desc);
    }

    #[test]
    fn blank_search_is_dropped() {
        let q = ListQuery::from_params(&params(&[("search", "   ")]), &ListingConfig::default());
        assert!(q.search.is_none());
    }

    #[test]
    fn meta_rounds_pages_up() {
        let q = ListQuery::from_params(&params(&[("limit", "4")]), &ListingConfig::default());
        let meta = ListMeta::new(&q, 9);
        assert_eq!(meta.pages, 3);
        assert_eq!(meta.sort_by, "created_at");
        assert_eq!(ListMeta::new(&q, 0).pages, 0);
    }

    #[test]
    fn scope_follows_role() {
        let uid = Uuid::new_v4();
        let student = Identity::new(uid, Role::Student, Vec::<String>::new());
        let advisor = Identity::new(uid, Role::Advisor, Vec::<String>::new());
        let admin = Identity::new(uid, Role::Admin, Vec::<String>::new());
        assert_eq!(RoleScope::for_identity(&student), RoleScope::Owner(uid));
        assert_eq!(RoleScope::for_identity(&advisor), RoleScope::Advisor(uid));
        assert_eq!(RoleScope::for_identity(&admin), RoleScope::AllSubmitted);
    }
}
