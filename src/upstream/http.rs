use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use crate::config::UpstreamSettings;

use super::error::UpstreamError;
use super::models::{ListingRow, MediaDescriptor, ODataPage};
use super::source::ListingSource;

const LISTING_SELECT: &str = "ListingKey,ModificationTimestamp,MediaChangeTimestamp";
const MEDIA_SELECT: &str = "MediaURL,PreferredPhotoYN";

/// Media rows the upstream marks inactive or non-large are of no use here;
/// filtering server-side keeps the descriptor payloads small.
const MEDIA_FILTER: &str = "ImageSizeDescription eq 'Large' and MediaStatus eq 'Active'";

/// `ListingSource` backed by the real upstream HTTP endpoint.
pub struct HttpListingSource {
    client: reqwest::Client,
    base_url: String,
    bearer_token: String,
}

impl HttpListingSource {
    pub fn new(settings: &UpstreamSettings) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(settings.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            bearer_token: settings.bearer_token.clone(),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, UpstreamError> {
        let response = self
            .client
            .get(url)
            .header(AUTHORIZATION, self.bearer_token.as_str())
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(classify_status(status, message));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| UpstreamError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl ListingSource for HttpListingSource {
    async fn query_listings(
        &self,
        filter: &str,
        orderby: &str,
        top: usize,
    ) -> Result<Vec<ListingRow>, UpstreamError> {
        let url = format!(
            "{}/Property?$filter={}&$select={}&$top={}&$orderby={}",
            self.base_url,
            urlencoding::encode(filter),
            LISTING_SELECT,
            top,
            urlencoding::encode(orderby),
        );
        let page: ODataPage<ListingRow> = self.get_json(&url).await?;
        Ok(page.value)
    }

    async fn media_for_listing(&self, key: &str) -> Result<Vec<MediaDescriptor>, UpstreamError> {
        let filter = format!(
            "ResourceRecordKey eq {} and {}",
            super::filter::quote(key),
            MEDIA_FILTER
        );
        let url = format!(
            "{}/Media?$select={}&$filter={}",
            self.base_url,
            MEDIA_SELECT,
            urlencoding::encode(&filter),
        );
        let page: ODataPage<MediaDescriptor> = self.get_json(&url).await?;
        Ok(page.value)
    }

    async fn fetch_media(&self, url: &str) -> Result<Vec<u8>, UpstreamError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status, String::new()));
        }

        let bytes = response.bytes().await.map_err(classify_transport_error)?;
        Ok(bytes.to_vec())
    }
}

fn classify_transport_error(e: reqwest::Error) -> UpstreamError {
    // Everything at the transport level (timeouts, resets, DNS hiccups) is
    // worth another attempt; decoding problems are not.
    if e.is_decode() {
        UpstreamError::Malformed(e.to_string())
    } else {
        UpstreamError::Transient(e.to_string())
    }
}

fn classify_status(status: StatusCode, message: String) -> UpstreamError {
    if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
    {
        UpstreamError::Transient(format!("status {}: {}", status.as_u16(), message))
    } else {
        UpstreamError::Rejected {
            status: status.as_u16(),
            message,
        }
    }
}
