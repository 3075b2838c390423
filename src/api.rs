use crate::cache::ItemSource;
use crate::config::Config;
use crate::date_util::to_date_str;
use crate::error::{ColendarError, Result, check_response, check_response_no_body};
use crate::models::{Event, EventId, EventPatch, Item, ItemId, ItemPatch, NewEvent, NewItem};
use crate::{log_request, log_response};
use chrono::NaiveDate;
use reqwest::header::COOKIE;
use reqwest::{Client, Method};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Client for the calendar backend's JSON API
pub struct ApiClient {
    client: Client,
    base_url: String,
    csrf_token: Option<String>,
    session_cookie: Option<String>,
    max_retries: u32,
    backoff: Duration,
}

impl ApiClient {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder().timeout(config.request_timeout()).build()?;
        Ok(Self {
            client,
            base_url: config.base_url().to_string(),
            csrf_token: config.csrf_token.clone(),
            session_cookie: config.session_cookie.clone(),
            max_retries: config.max_retries,
            backoff: config.retry_backoff(),
        })
    }

    pub async fn list_events(&self) -> Result<Vec<Event>> {
        self.get_json("/events").await
    }

    pub async fn create_event(&self, event: &NewEvent) -> Result<Event> {
        self.send_json(Method::POST, "/events", event).await
    }

    pub async fn update_event(&self, id: EventId, patch: &EventPatch) -> Result<Event> {
        self.send_json(Method::PATCH, &format!("/events/{}", id), patch).await
    }

    pub async fn delete_event(&self, id: EventId) -> Result<()> {
        self.call(Method::DELETE, &format!("/events/{}", id), None).await?;
        Ok(())
    }

    pub async fn create_item(&self, item: &NewItem) -> Result<Item> {
        self.send_json(Method::POST, "/items", item).await
    }

    pub async fn update_item(&self, id: ItemId, patch: &ItemPatch) -> Result<Item> {
        self.send_json(Method::PATCH, &format!("/items/{}", id), patch).await
    }

    pub async fn delete_item(&self, id: ItemId) -> Result<()> {
        self.call(Method::DELETE, &format!("/items/{}", id), None).await?;
        Ok(())
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let body = self.call(Method::GET, path, None).await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn send_json<B: Serialize, T: DeserializeOwned>(&self, method: Method, path: &str, body: &B) -> Result<T> {
        let body = serde_json::to_value(body)?;
        let text = self.call(method, path, Some(&body)).await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Send a request, retrying idempotent methods on transient failures.
    /// POST is never retried since the backend may already have applied it.
    async fn call(&self, method: Method, path: &str, body: Option<&serde_json::Value>) -> Result<String> {
        let retries = if method == Method::POST { 0 } else { self.max_retries };
        let mut attempt = 0;
        loop {
            match self.call_once(&method, path, body).await {
                Err(e) if attempt < retries && e.is_transient() => {
                    attempt += 1;
                    tracing::warn!(%method, path, attempt, error = %e, "retrying request");
                    tokio::time::sleep(self.backoff * attempt).await;
                }
                result => return result,
            }
        }
    }

    async fn call_once(&self, method: &Method, path: &str, body: Option<&serde_json::Value>) -> Result<String> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.request(method.clone(), &url);

        if *method != Method::GET
            && let Some(token) = &self.csrf_token
        {
            request = request.header("X-CSRFToken", token);
        }
        if let Some(cookie) = self.cookie_header() {
            request = request.header(COOKIE, cookie);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        log_request(method.as_str(), &url);
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ColendarError::Timeout
            } else {
                ColendarError::Network(e)
            }
        })?;
        log_response(response.status().as_u16(), &url);

        let context = format!("{} {}", method, path);
        if *method == Method::DELETE {
            check_response_no_body(response, &context).await?;
            Ok(String::new())
        } else {
            check_response(response, &context).await
        }
    }

    fn cookie_header(&self) -> Option<String> {
        let mut parts = Vec::new();
        if let Some(session) = &self.session_cookie {
            parts.push(format!("sessionid={}", session));
        }
        if let Some(token) = &self.csrf_token {
            parts.push(format!("csrftoken={}", token));
        }
        (!parts.is_empty()).then(|| parts.join("; "))
    }
}

impl ItemSource for ApiClient {
    async fn items_for_date(&self, date: NaiveDate) -> Result<Vec<Item>> {
        self.get_json(&format!("/items?date={}", urlencoding::encode(&to_date_str(date))))
            .await
    }

    async fn items_for_event(&self, event_id: EventId) -> Result<Vec<Item>> {
        self.get_json(&format!("/items?event_id={}", event_id)).await
    }
}
