use std::time::Duration;

use reqwest::header;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::config::ApiSection;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid username/password")]
    InvalidCredentials,
    #[error("failed to fetch course info (status {status})")]
    CourseUnavailable { status: u16 },
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("invalid api url: {0}")]
    Url(#[from] url::ParseError),
}

pub type ApiResult<T> = Result<T, ApiError>;

/// One recorded lecture as listed by the capture platform.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lecture {
    pub ttid: u64,
    pub seq_no: u32,
    pub topic: String,
    pub start_time: String,
    pub subject_name: String,
    pub session_name: String,
}

#[derive(Debug, Deserialize)]
struct SigninResponse {
    token: String,
}

/// Authenticated client for the capture platform's JSON API.
///
/// API calls carry the token in an Authorization header; key fetches use a
/// separate cookie channel and belong to the playlist layer, not here.
pub struct ApiClient {
    base: Url,
    client: Client,
}

impl ApiClient {
    pub fn new(config: &ApiSection) -> ApiResult<Self> {
        let base = Url::parse(&config.base_url)?;
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self { base, client })
    }

    pub async fn login(&self, username: &str, password: &str) -> ApiResult<String> {
        let url = self.base.join("api/auth/signin")?;
        let response = self
            .client
            .post(url)
            .form(&[("username", username), ("password", password)])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ApiError::InvalidCredentials);
        }
        let body: SigninResponse = response.json().await?;
        Ok(body.token)
    }

    pub async fn lectures(
        &self,
        token: &str,
        subject_id: u64,
        session_id: u64,
    ) -> ApiResult<Vec<Lecture>> {
        let url = self
            .base
            .join(&format!("api/subjects/{subject_id}/lectures/{session_id}"))?;
        let response = self
            .client
            .get(url)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::CourseUnavailable {
                status: status.as_u16(),
            });
        }
        Ok(response.json().await?)
    }

    /// Master-playlist URL for one recording. The token rides in the query
    /// string; this is the stream endpoint's own auth channel.
    pub fn stream_url(&self, ttid: u64, token: &str) -> ApiResult<String> {
        let url = self
            .base
            .join(&format!("api/fetchvideo?ttid={ttid}&token={token}&type=index.m3u8"))?;
        Ok(url.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section() -> ApiSection {
        ApiSection {
            base_url: "http://172.16.3.20/".to_string(),
            connect_timeout_seconds: 5,
            request_timeout_seconds: 30,
        }
    }

    #[test]
    fn stream_url_formatting() {
        let client = ApiClient::new(&section()).unwrap();
        let url = client.stream_url(4217893, "tok-123").unwrap();
        assert_eq!(
            url,
            "http://172.16.3.20/api/fetchvideo?ttid=4217893&token=tok-123&type=index.m3u8"
        );
    }

    #[test]
    fn lecture_deserializes_platform_json() {
        let raw = r#"{
            "ttid": 4217893,
            "seqNo": 12,
            "topic": "Graph algorithms",
            "startTime": "2026-02-12 09:00:00",
            "subjectName": "CS F211",
            "sessionName": "SEM II"
        }"#;
        let lecture: Lecture = serde_json::from_str(raw).unwrap();
        assert_eq!(lecture.seq_no, 12);
        assert_eq!(lecture.subject_name, "CS F211");
        assert_eq!(&lecture.start_time[..10], "2026-02-12");
    }
}
