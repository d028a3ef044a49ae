pub mod listing;

pub use listing::{ListingFilter, ListingPatch, ListingRecord, ListingSort, ListingSortField};
