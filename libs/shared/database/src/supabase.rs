use anyhow::{Result, anyhow};
use reqwest::{
    Client,
    header::{HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION},
    Method,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error};
use uuid::Uuid;

use shared_config::AppConfig;

pub struct SupabaseClient {
    client: Client,
    base_url: String,
    anon_key: String,
    service_role_key: String,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.supabase_url.clone(),
            anon_key: config.supabase_anon_key.clone(),
            service_role_key: config.supabase_service_role_key.clone(),
        }
    }

    /// Token used for requests that do not act on behalf of a signed-in user
    /// (public booking page, background calendar sync, funnel analytics).
    pub fn service_token(&self) -> &str {
        &self.service_role_key
    }

    fn get_headers(&self, auth_token: Option<&str>) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();

        headers.insert("apikey", HeaderValue::from_str(&self.anon_key)?);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(token) = auth_token {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", token))?,
            );
        }

        Ok(headers)
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        auth_token: Option<&str>,
        body: Option<Value>,
        extra_headers: Option<HeaderMap>,
    ) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making {} request to {}", method, url);

        let mut headers = self.get_headers(auth_token)?;
        if let Some(extra) = extra_headers {
            headers.extend(extra);
        }

        let mut req = self.client.request(method, &url)
            .headers(headers);

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            error!("API error ({}): {}", status, error_text);

            return Err(match status.as_u16() {
                401 | 403 => anyhow!("Authentication error: {}", error_text),
                404 => anyhow!("Resource not found: {}", error_text),
                409 => anyhow!("Conflict: {}", error_text),
                _ => anyhow!("API error ({}): {}", status, error_text),
            });
        }

        Ok(response)
    }

    pub async fn request<T>(&self, method: Method, path: &str,
                            auth_token: Option<&str>, body: Option<Value>)
                            -> Result<T>
    where T: DeserializeOwned {
        self.request_with_headers(method, path, auth_token, body, None).await
    }

    pub async fn request_with_headers<T>(&self, method: Method, path: &str,
                                         auth_token: Option<&str>, body: Option<Value>,
                                         headers: Option<HeaderMap>)
                                         -> Result<T>
    where T: DeserializeOwned {
        let response = self.send(method, path, auth_token, body, headers).await?;
        let data = response.json::<T>().await?;
        Ok(data)
    }

    /// Runs a request whose response body is irrelevant (`return=minimal`
    /// writes and deletes).
    pub async fn execute(&self, method: Method, path: &str,
                         auth_token: Option<&str>, body: Option<Value>) -> Result<()> {
        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=minimal"));
        self.send(method, path, auth_token, body, Some(headers)).await?;
        Ok(())
    }

    /// Exact row count for a filtered table path, read from `Content-Range`.
    pub async fn count(&self, path: &str, auth_token: Option<&str>) -> Result<i64> {
        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("count=exact"));
        headers.insert("Range", HeaderValue::from_static("0-0"));

        let response = self.send(Method::GET, path, auth_token, None, Some(headers)).await?;

        let content_range = response
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| anyhow!("Missing Content-Range header on count response"))?;

        parse_content_range_total(content_range)
    }

    /// Clinic the signed-in staff member works for: the clinic they own, or
    /// the clinic they are a secretary of.
    pub async fn get_staff_clinic_id(&self, user_id: &str, auth_token: &str) -> Result<Option<Uuid>> {
        let owned: Vec<Value> = self.request(
            Method::GET,
            &format!("/rest/v1/clinics?owner_id=eq.{}&select=id&limit=1", user_id),
            Some(auth_token),
            None,
        ).await?;

        if let Some(id) = owned.first().and_then(|row| row["id"].as_str()) {
            return Ok(Uuid::parse_str(id).ok());
        }

        let memberships: Vec<Value> = self.request(
            Method::GET,
            &format!("/rest/v1/secretaries?user_id=eq.{}&select=clinic_id&limit=1", user_id),
            Some(auth_token),
            None,
        ).await?;

        Ok(memberships
            .first()
            .and_then(|row| row["clinic_id"].as_str())
            .and_then(|id| Uuid::parse_str(id).ok()))
    }

    pub fn get_base_url(&self) -> &str {
        &self.base_url
    }
}

fn parse_content_range_total(content_range: &str) -> Result<i64> {
    let total = content_range
        .rsplit('/')
        .next()
        .ok_or_else(|| anyhow!("Malformed Content-Range: {}", content_range))?;

    total
        .parse::<i64>()
        .map_err(|_| anyhow!("Content-Range carries no exact total: {}", content_range))
}

#[cfg(test)]
mod tests {
    use super::parse_content_range_total;

    #[test]
    fn content_range_total_is_parsed() {
        assert_eq!(parse_content_range_total("0-0/5").unwrap(), 5);
        assert_eq!(parse_content_range_total("*/0").unwrap(), 0);
        assert!(parse_content_range_total("0-0/*").is_err());
    }
}
