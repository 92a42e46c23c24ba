use reqwest::header::{CONTENT_TYPE, HeaderMap, SET_COOKIE};
use std::time::Duration;
use url::Url;

/// A successfully fetched page, after redirects were followed
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub requested_url: String,
    pub final_url: Url,
    pub status_code: u16,
    pub headers: HeaderMap,
    pub body: String,
    pub response_time: Duration,
}

impl FetchedPage {
    pub fn new(requested_url: String, final_url: Url) -> Self {
        Self {
            requested_url,
            final_url,
            status_code: 0,
            headers: HeaderMap::new(),
            body: String::new(),
            response_time: Duration::from_secs(0),
        }
    }

    pub fn content_type(&self) -> Option<String> {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.headers.contains_key(name)
    }

    /// Raw `Set-Cookie` header values, one per cookie
    pub fn set_cookie_headers(&self) -> Vec<String> {
        self.headers
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(|s| s.to_string())
            .collect()
    }

    pub fn response_time_ms(&self) -> u64 {
        self.response_time.as_millis() as u64
    }
}
