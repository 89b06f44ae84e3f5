use crate::domain::models::{BulkDayResult, DayFact, DayRecord};
use crate::infrastructure::config::CalendarConfig;
use crate::infrastructure::error::CalendarError;
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::de::DeserializeOwned;
use url::Url;

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayRangeQuery {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub weekends_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BulkBlockResponse {
    pub results: Vec<BulkDayResult>,
}

/// Backend owning day facts. Only the three operations the availability
/// engine needs are modelled.
#[async_trait]
pub trait DayFactSource: Send + Sync {
    /// Inclusive range query. Results may come back in any order.
    async fn list_days(&self, query: DayRangeQuery) -> Result<Vec<DayFact>, CalendarError>;

    async fn block_days_bulk(
        &self,
        dates: &[NaiveDate],
        blocked: bool,
    ) -> Result<BulkBlockResponse, CalendarError>;

    /// Idempotent: the same date always resolves to the same record.
    async fn get_or_create_day(&self, date: NaiveDate) -> Result<DayRecord, CalendarError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestDayFactSource {
    client: Client,
    base_url: Url,
    bearer_token: Option<String>,
}

impl ReqwestDayFactSource {
    pub fn new(base_url: Url) -> Self {
        Self {
            client: Client::new(),
            base_url,
            bearer_token: None,
        }
    }

    pub fn from_config(config: &CalendarConfig) -> Result<Self, CalendarError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|error| CalendarError::Http(format!("failed building http client: {error}")))?;
        Ok(Self {
            client,
            base_url: config.api_base_url.clone(),
            bearer_token: None,
        })
    }

    /// Session token supplied by the host's authentication layer.
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        let token = token.trim();
        self.bearer_token = (!token.is_empty()).then(|| token.to_string());
        self
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, CalendarError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                CalendarError::InvalidConfig("day fact api base URL cannot be a base".to_string())
            })?;
            path.pop_if_empty();
            path.extend(segments);
        }
        Ok(url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.bearer_token.as_deref() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn read_json<T: DeserializeOwned>(
        response: reqwest::Response,
        operation: &str,
    ) -> Result<T, CalendarError> {
        let status = response.status();
        let body = response.text().await.map_err(|error| {
            CalendarError::Http(format!("failed reading {operation} response: {error}"))
        })?;

        if !status.is_success() {
            return Err(CalendarError::Api {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|error| {
            CalendarError::InvalidResponse(format!("invalid {operation} payload: {error}; body={body}"))
        })
    }
}

#[derive(Debug, serde::Serialize)]
struct BulkBlockRequest<'a> {
    dates: &'a [NaiveDate],
    blocked: bool,
}

#[derive(Debug, serde::Serialize)]
struct GetOrCreateDayRequest {
    date: NaiveDate,
}

#[async_trait]
impl DayFactSource for ReqwestDayFactSource {
    async fn list_days(&self, query: DayRangeQuery) -> Result<Vec<DayFact>, CalendarError> {
        if query.to < query.from {
            return Err(CalendarError::InvalidDate(format!(
                "range end {} is before start {}",
                query.to, query.from
            )));
        }

        let endpoint = self.endpoint(&["days"])?;
        let mut request = self.client.get(endpoint).query(&[
            ("from", query.from.format(DATE_FORMAT).to_string()),
            ("to", query.to.format(DATE_FORMAT).to_string()),
        ]);
        if query.weekends_only {
            request = request.query(&[("weekends_only", "true")]);
        }

        let response = self.authorize(request).send().await.map_err(|error| {
            CalendarError::Http(format!("network error while listing days: {error}"))
        })?;
        let days: Vec<DayFact> = Self::read_json(response, "day list").await?;

        for day in &days {
            day.validate().map_err(CalendarError::InvalidResponse)?;
        }
        Ok(days)
    }

    async fn block_days_bulk(
        &self,
        dates: &[NaiveDate],
        blocked: bool,
    ) -> Result<BulkBlockResponse, CalendarError> {
        let endpoint = self.endpoint(&["days", "block-bulk"])?;
        let request = self
            .client
            .post(endpoint)
            .json(&BulkBlockRequest { dates, blocked });

        let response = self.authorize(request).send().await.map_err(|error| {
            CalendarError::Http(format!("network error while bulk blocking days: {error}"))
        })?;
        Self::read_json(response, "bulk block").await
    }

    async fn get_or_create_day(&self, date: NaiveDate) -> Result<DayRecord, CalendarError> {
        let endpoint = self.endpoint(&["days", "get-or-create"])?;
        let request = self
            .client
            .post(endpoint)
            .json(&GetOrCreateDayRequest { date });

        let response = self.authorize(request).send().await.map_err(|error| {
            CalendarError::Http(format!("network error while resolving day: {error}"))
        })?;
        let record: DayRecord = Self::read_json(response, "day resolution").await?;

        if record.id.trim().is_empty() {
            return Err(CalendarError::InvalidResponse(
                "day resolution response did not include id".to_string(),
            ));
        }
        if record.date != date {
            return Err(CalendarError::InvalidResponse(format!(
                "day resolution for {date} returned {}",
                record.date
            )));
        }
        Ok(record)
    }
}
