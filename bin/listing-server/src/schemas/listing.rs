use chrono::NaiveDateTime;
use listing_core::{validate_availability_window, DATETIME_FORMAT};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::{Validate, ValidationError};

use crate::entities::{ListingFilter, ListingPatch, ListingRecord, ListingSort};

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const DEFAULT_SORT: &str = "startDate";

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ListingLinks {
    #[serde(rename = "self")]
    pub self_: String,
    pub images: String,
    pub availability: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ListingResponse {
    pub id: i64,
    pub landlord_email: String,
    pub name: String,
    pub address: String,
    #[schema(example = "2025-12-15T10:00:00")]
    pub start_date: String,
    pub end_date: Option<String>,
    pub description: Option<String>,
    pub picture_url: Option<String>,
    pub image_urls: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
    pub links: ListingLinks,
}

impl ListingRecord {
    pub fn to_response(&self) -> ListingResponse {
        let base = format!("/listing/{}", self.id);
        ListingResponse {
            id: self.id,
            landlord_email: self.landlord_email.clone(),
            name: self.name.clone(),
            address: self.address.clone(),
            start_date: self.start_date.format(DATETIME_FORMAT).to_string(),
            end_date: self.end_date.map(|d| d.format(DATETIME_FORMAT).to_string()),
            description: self.description.clone(),
            picture_url: self.picture_url.clone(),
            image_urls: self.image_urls.clone(),
            created_at: self.created_at.to_rfc3339(),
            updated_at: self.updated_at.to_rfc3339(),
            links: ListingLinks {
                images: format!("{base}/images"),
                availability: format!("{base}/availability"),
                self_: base,
            },
        }
    }

    /// Strong entity tag; changes whenever the row is written.
    pub fn etag(&self) -> String {
        format!("\"{}-{}\"", self.id, self.updated_at.format("%Y%m%d%H%M%S%f"))
    }
}

#[derive(Debug, Default, Deserialize, Validate, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListingSearchQuery {
    /// Full or partial address, matched case-insensitively.
    pub address: Option<String>,
    #[serde(rename = "landlordEmail")]
    pub landlord_email: Option<String>,
    /// Earliest `start_date`, inclusive.
    #[serde(rename = "startFrom")]
    #[param(value_type = Option<String>)]
    pub start_from: Option<NaiveDateTime>,
    /// Latest `start_date`, inclusive.
    #[serde(rename = "startTo")]
    #[param(value_type = Option<String>)]
    pub start_to: Option<NaiveDateTime>,
    /// 1-based page number.
    #[validate(range(min = 1))]
    pub page: Option<u32>,
    #[serde(rename = "pageSize")]
    #[validate(range(min = 1, max = 100))]
    pub page_size: Option<u32>,
    /// `name`, `startDate`, `endDate` or `createdAt`; prefix with `-` to
    /// sort descending.
    pub sort: Option<String>,
}

impl ListingSearchQuery {
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1)
    }

    pub fn page_size(&self) -> u32 {
        self.page_size.unwrap_or(DEFAULT_PAGE_SIZE)
    }

    pub fn to_filter(&self) -> ListingFilter {
        let limit = i64::from(self.page_size());
        ListingFilter {
            address: self.address.clone().filter(|a| !a.is_empty()),
            landlord_email: self.landlord_email.clone(),
            start_from: self.start_from,
            start_to: self.start_to,
            sort: ListingSort::parse(self.sort.as_deref().unwrap_or(DEFAULT_SORT)),
            limit,
            offset: (i64::from(self.page()) - 1) * limit,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ListingPage {
    pub total: i64,
    pub page: u32,
    #[serde(rename = "pageSize")]
    pub page_size: u32,
    pub items: Vec<ListingResponse>,
}

/// Body of `PUT /listing/{id}`. Omitted fields keep their stored value.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateListingRequest {
    #[validate(email)]
    pub landlord_email: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 512))]
    pub address: Option<String>,
    #[schema(value_type = Option<String>)]
    pub start_date: Option<NaiveDateTime>,
    #[schema(value_type = Option<String>)]
    pub end_date: Option<NaiveDateTime>,
    #[validate(length(max = 4000))]
    pub description: Option<String>,
    #[validate(url)]
    pub picture_url: Option<String>,
}

impl From<UpdateListingRequest> for ListingPatch {
    fn from(req: UpdateListingRequest) -> Self {
        ListingPatch {
            landlord_email: req.landlord_email,
            name: req.name,
            address: req.address,
            start_date: req.start_date,
            end_date: req.end_date,
            description: req.description,
            picture_url: req.picture_url,
        }
    }
}

/// Body of `PATCH /listing/{id}/availability`.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct AvailabilityPatch {
    #[schema(value_type = Option<String>, example = "2025-12-15T10:00:00")]
    pub start_date: Option<NaiveDateTime>,
    #[schema(value_type = Option<String>)]
    pub end_date: Option<NaiveDateTime>,
}

impl From<AvailabilityPatch> for ListingPatch {
    fn from(p: AvailabilityPatch) -> Self {
        ListingPatch { start_date: p.start_date, end_date: p.end_date, ..Default::default() }
    }
}

/// Whether `record` would still hold a valid availability window.
pub fn check_window(record: &ListingRecord) -> Result<(), ValidationError> {
    validate_availability_window(record.start_date, record.end_date)
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

/// Multipart form of `POST /listing/{id}/images`; documentation only.
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct ImageUpload {
    /// One or more image files.
    #[schema(value_type = Vec<String>, format = Binary)]
    pub files: Vec<Vec<u8>>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UploadedImages {
    pub uploaded: Vec<String>,
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::entities::ListingSortField;
    use chrono::{DateTime, Utc};

    fn record() -> ListingRecord {
        let at: DateTime<Utc> = "2025-01-02T03:04:05.123456Z".parse().unwrap();
        ListingRecord {
            id: 7,
            landlord_email: "owner@example.com".into(),
            name: "Loft".into(),
            address: "1 Main St".into(),
            start_date: "2025-12-15T10:00:00".parse().unwrap(),
            end_date: None,
            description: None,
            picture_url: None,
            image_urls: vec![],
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn response_carries_links_and_wire_dates() {
        let resp = record().to_response();
        assert_eq!(resp.start_date, "2025-12-15T10:00:00");
        assert_eq!(resp.links.self_, "/listing/7");
        assert_eq!(resp.links.images, "/listing/7/images");
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["links"]["self"], "/listing/7");
        assert_eq!(json["links"]["availability"], "/listing/7/availability");
    }

    #[test]
    fn etag_tracks_updated_at() {
        let a = record();
        let mut b = record();
        b.updated_at = b.updated_at + chrono::Duration::microseconds(1);
        assert_ne!(a.etag(), b.etag());
        assert!(a.etag().starts_with("\"7-"));
    }

    #[test]
    fn search_defaults() {
        let filter = ListingSearchQuery::default().to_filter();
        assert_eq!(filter.limit, 20);
        assert_eq!(filter.offset, 0);
        assert_eq!(filter.sort.field, ListingSortField::StartDate);
        assert!(!filter.sort.descending);
    }

    #[test]
    fn search_paging_and_sort() {
        let q = ListingSearchQuery {
            page: Some(3),
            page_size: Some(10),
            sort: Some("-name".into()),
            ..Default::default()
        };
        let filter = q.to_filter();
        assert_eq!(filter.offset, 20);
        assert_eq!(filter.sort.field, ListingSortField::Name);
        assert!(filter.sort.descending);
    }

    #[test]
    fn search_rejects_out_of_range_paging() {
        let q = ListingSearchQuery { page_size: Some(101), ..Default::default() };
        assert!(q.validate().is_err());
        let q = ListingSearchQuery { page: Some(0), ..Default::default() };
        assert!(q.validate().is_err());
    }
}
