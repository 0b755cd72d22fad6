use chrono::{DateTime, Utc};
use serde::Deserialize;

/// One row of the upstream listing query. Only the fields the synchronizer
/// selects; everything else about a listing is out of scope here.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct ListingRow {
    pub listing_key: String,
    pub modification_timestamp: DateTime<Utc>,
    #[serde(default)]
    pub media_change_timestamp: Option<DateTime<Utc>>,
}

/// One media descriptor of a listing, in upstream order.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct MediaDescriptor {
    #[serde(rename = "MediaURL")]
    pub url: Option<String>,
    #[serde(rename = "PreferredPhotoYN", default)]
    pub preferred: Option<bool>,
}

impl MediaDescriptor {
    pub fn is_preferred(&self) -> bool {
        self.preferred.unwrap_or(false)
    }
}

/// Envelope of every upstream query response.
#[derive(Debug, Deserialize)]
pub struct ODataPage<T> {
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
}
