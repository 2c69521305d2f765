use crate::config::HttpSettings;
use reqwest::Client;
use reqwest::header::{CONTENT_TYPE, COOKIE, HeaderMap, HeaderValue};
use std::time::Duration;
use tracing::warn;

pub fn build_client(settings: &HttpSettings) -> Client {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Some(cookie) = settings.cookie.as_deref() {
        match HeaderValue::from_str(cookie) {
            Ok(value) => {
                headers.insert(COOKIE, value);
            }
            Err(err) => {
                warn!(target = "deep_discount.http", error = %err, "cookie_header_rejected");
            }
        }
    }
    Client::builder()
        .timeout(Duration::from_secs(settings.timeout_secs))
        .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
        .default_headers(headers)
        .build()
        .unwrap_or_else(|_| Client::new())
}
