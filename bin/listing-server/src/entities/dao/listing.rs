use chrono::{DateTime, NaiveDateTime, Utc};

/// A row in the `listings` table together with its image URLs.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingRecord {
    pub id: i64,
    pub landlord_email: String,
    pub name: String,
    pub address: String,
    pub start_date: NaiveDateTime,
    pub end_date: Option<NaiveDateTime>,
    pub description: Option<String>,
    pub picture_url: Option<String>,
    /// Uploaded image URLs in upload order.
    pub image_urls: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Field-level changes for an existing listing; `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingPatch {
    pub landlord_email: Option<String>,
    pub name: Option<String>,
    pub address: Option<String>,
    pub start_date: Option<NaiveDateTime>,
    pub end_date: Option<NaiveDateTime>,
    pub description: Option<String>,
    pub picture_url: Option<String>,
}

impl ListingPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Merge onto `record`, returning the would-be stored row.
    pub fn merged(self, record: &ListingRecord) -> ListingRecord {
        ListingRecord {
            landlord_email: self.landlord_email.unwrap_or_else(|| record.landlord_email.clone()),
            name: self.name.unwrap_or_else(|| record.name.clone()),
            address: self.address.unwrap_or_else(|| record.address.clone()),
            start_date: self.start_date.unwrap_or(record.start_date),
            end_date: self.end_date.or(record.end_date),
            description: self.description.or_else(|| record.description.clone()),
            picture_url: self.picture_url.or_else(|| record.picture_url.clone()),
            ..record.clone()
        }
    }
}

/// Sortable listing columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingSortField {
    Id,
    Name,
    StartDate,
    EndDate,
    CreatedAt,
}

impl ListingSortField {
    pub fn column(self) -> &'static str {
        match self {
            ListingSortField::Id => "id",
            ListingSortField::Name => "name",
            ListingSortField::StartDate => "start_date",
            ListingSortField::EndDate => "end_date",
            ListingSortField::CreatedAt => "created_at",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListingSort {
    pub field: ListingSortField,
    pub descending: bool,
}

impl ListingSort {
    /// Parse `name`, `startDate`, `endDate`, `createdAt`, optionally prefixed
    /// with `-` for descending order. Unknown fields sort by id.
    pub fn parse(raw: &str) -> Self {
        let (descending, field) = match raw.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        let field = match field {
            "name" => ListingSortField::Name,
            "startDate" => ListingSortField::StartDate,
            "endDate" => ListingSortField::EndDate,
            "createdAt" => ListingSortField::CreatedAt,
            _ => return Self { field: ListingSortField::Id, descending: false },
        };
        Self { field, descending }
    }
}

/// Translated search query.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingFilter {
    /// Case-insensitive substring of the address.
    pub address: Option<String>,
    pub landlord_email: Option<String>,
    /// Inclusive bounds on `start_date`.
    pub start_from: Option<NaiveDateTime>,
    pub start_to: Option<NaiveDateTime>,
    pub sort: ListingSort,
    pub limit: i64,
    pub offset: i64,
}
