//! Listing creation payloads shared by the single and bulk create paths.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

/// Textual form used for listing date-times on the wire and in storage.
pub const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Upper bound on listings accepted in one bulk request.
pub const BULK_LIMIT: u64 = 1000;

/// Payload for creating one listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate, ToSchema)]
#[validate(schema(function = "validate_new_listing_window"))]
pub struct NewListing {
    /// Email of the landlord who owns the listing.
    #[validate(email)]
    pub landlord_email: String,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(min = 1, max = 512))]
    pub address: String,
    /// Start of availability, e.g. `"2025-12-15T10:00:00"`.
    #[schema(value_type = String, example = "2025-12-15T10:00:00")]
    pub start_date: NaiveDateTime,
    /// End of availability; open-ended when absent.
    #[schema(value_type = Option<String>, example = "2026-06-15T10:00:00")]
    pub end_date: Option<NaiveDateTime>,
    #[validate(length(max = 4000))]
    pub description: Option<String>,
    #[validate(url)]
    pub picture_url: Option<String>,
}

/// Request body of `POST /listing/bulk-create`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct BulkListingCreate {
    #[validate(length(max = BULK_LIMIT), nested)]
    pub listings: Vec<NewListing>,
}

/// Rejects windows whose end precedes their start.
pub fn validate_availability_window(
    start: NaiveDateTime,
    end: Option<NaiveDateTime>,
) -> Result<(), ValidationError> {
    match end {
        Some(end) if end < start => {
            let mut err = ValidationError::new("availability_window");
            err.message = Some("end_date must not be earlier than start_date".into());
            Err(err)
        }
        _ => Ok(()),
    }
}

fn validate_new_listing_window(listing: &NewListing) -> Result<(), ValidationError> {
    validate_availability_window(listing.start_date, listing.end_date)
}
