//! Case-management API client.
//!
//! One client serves as the order source, the detail resolver and the appeal
//! submitter, since all three talk to the same API with the same credentials.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use refund_contest_engine::{
    AppealRecord, AppealSubmitter, DateRange, DetailError, FetchError, OrderDetail,
    OrderDetailResolver, OrderSource, SubmissionError,
};
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};

/// Upper bound on pages fetched per run.
const MAX_PAGES: u32 = 500;

/// One page of orders with a pending refund.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingRefundsPage {
    #[serde(default)]
    pub orders: Vec<PendingRefund>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingRefund {
    pub order_id: String,
}

/// Order details as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderDetailsResponse {
    pub order_id: String,

    #[serde(default)]
    pub refund: Option<RefundInfo>,

    #[serde(default)]
    pub items: Vec<OrderItem>,
}

/// Refund claim attached to an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundInfo {
    #[serde(default)]
    pub reason: Option<String>,

    /// Present once the case can be contested.
    #[serde(default)]
    pub appeal_id: Option<String>,

    #[serde(default)]
    pub evidence_images: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub name: String,

    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

fn default_quantity() -> u32 {
    1
}

impl OrderDetailsResponse {
    /// Reduce the API payload to the fields the engine needs.
    pub fn into_detail(self) -> OrderDetail {
        let items = if self.items.is_empty() {
            None
        } else {
            Some(
                self.items
                    .iter()
                    .map(|item| format!("{}x {}", item.quantity, item.name))
                    .collect::<Vec<_>>()
                    .join("; "),
            )
        };

        let (reason, appeal_handle, image_ref) = match self.refund {
            Some(refund) => (
                refund.reason,
                refund.appeal_id,
                refund.evidence_images.into_iter().next(),
            ),
            None => (None, None, None),
        };

        OrderDetail {
            appeal_handle,
            reason,
            items,
            image_ref,
        }
    }
}

/// Appeal payload posted to the API.
#[derive(Debug, Serialize)]
struct AppealRequest<'a> {
    order_id: &'a str,
    appeal_id: &'a str,
    message: &'a str,
}

/// HTTP client for the case-management API.
#[derive(Clone)]
pub struct CaseApiClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    page_size: u32,
}

impl CaseApiClient {
    /// Create a new case API client.
    pub fn new(base_url: &str, token: Option<&str>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.map(str::to_string),
            page_size: 50,
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Join path segments onto the base URL, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, String> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| format!("Invalid base URL '{}': {}", self.base_url, e))?;
        url.path_segments_mut()
            .map_err(|_| format!("Base URL '{}' cannot carry a path", self.base_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn get(&self, url: Url) -> reqwest::RequestBuilder {
        self.authorize(self.client.get(url))
    }

    fn post(&self, url: Url) -> reqwest::RequestBuilder {
        self.authorize(self.client.post(url))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn fetch_page(
        &self,
        range: &DateRange,
        page: u32,
    ) -> Result<PendingRefundsPage, FetchError> {
        let url = self
            .endpoint(&["api", "refunds", "pending"])
            .map_err(FetchError::Http)?;
        let response = self
            .get(url)
            .query(&[
                ("start_date", range.start_param()),
                ("end_date", range.end_param()),
                ("page", page.to_string()),
                ("page_size", self.page_size.to_string()),
            ])
            .send()
            .await
            .map_err(|e| FetchError::Http(e.to_string()))?;

        match response.status() {
            status if status.is_success() => response
                .json::<PendingRefundsPage>()
                .await
                .map_err(|e| FetchError::Parse(e.to_string())),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                let body = response.text().await.unwrap_or_default();
                Err(FetchError::Auth(body))
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(FetchError::Status {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }
}

#[async_trait]
impl OrderSource for CaseApiClient {
    /// Walk every page until a short or empty one, keeping first occurrences.
    async fn fetch(&self, range: &DateRange) -> Result<Vec<String>, FetchError> {
        let mut order_ids = Vec::new();
        let mut seen = HashSet::new();

        for page in 1..=MAX_PAGES {
            let batch = self.fetch_page(range, page).await?;
            let count = batch.orders.len();
            tracing::debug!(page, count, "Fetched pending refunds page");

            for order in batch.orders {
                if seen.insert(order.order_id.clone()) {
                    order_ids.push(order.order_id);
                }
            }

            if count < self.page_size as usize {
                return Ok(order_ids);
            }
        }

        tracing::warn!(max_pages = MAX_PAGES, "Page limit reached while listing orders");
        Ok(order_ids)
    }
}

#[async_trait]
impl OrderDetailResolver for CaseApiClient {
    async fn resolve(&self, order_id: &str) -> Result<OrderDetail, DetailError> {
        let url = self
            .endpoint(&["api", "orders", order_id])
            .map_err(DetailError::Http)?;
        let response = self
            .get(url)
            .send()
            .await
            .map_err(|e| DetailError::Http(e.to_string()))?;

        match response.status() {
            status if status.is_success() => {
                let details: OrderDetailsResponse = response
                    .json()
                    .await
                    .map_err(|e| DetailError::Parse(e.to_string()))?;
                Ok(details.into_detail())
            }
            StatusCode::NOT_FOUND => Err(DetailError::NotFound(order_id.to_string())),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(DetailError::Status {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }
}

#[async_trait]
impl AppealSubmitter for CaseApiClient {
    async fn submit(&self, appeal: &AppealRecord) -> Result<(), SubmissionError> {
        let request = AppealRequest {
            order_id: &appeal.order_id,
            appeal_id: &appeal.appeal_handle,
            message: &appeal.defense,
        };

        let url = self
            .endpoint(&["api", "appeals"])
            .map_err(SubmissionError::Http)?;
        let response = self
            .post(url)
            .json(&request)
            .send()
            .await
            .map_err(|e| SubmissionError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(SubmissionError::Rejected { status, body });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn range() -> DateRange {
        let day = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        DateRange::last_days(1, day).unwrap()
    }

    fn client(server: &MockServer) -> CaseApiClient {
        CaseApiClient::new(&server.uri(), Some("secret"), Duration::from_secs(5))
    }

    fn page(ids: &[&str]) -> serde_json::Value {
        serde_json::json!({
            "orders": ids.iter().map(|id| serde_json::json!({"order_id": id})).collect::<Vec<_>>()
        })
    }

    #[test]
    fn test_client_creation() {
        let client = CaseApiClient::new("http://localhost:8080/", None, Duration::from_secs(1));
        assert_eq!(client.base_url, "http://localhost:8080");
        assert_eq!(client.page_size, 50);
        assert_eq!(client.with_page_size(0).page_size, 1);
    }

    #[test]
    fn test_details_mapping() {
        let json = serde_json::json!({
            "order_id": "ORD-1",
            "refund": {
                "reason": "arrived broken",
                "appeal_id": "AP-9",
                "evidence_images": ["https://img/1.jpg", "https://img/2.jpg"]
            },
            "items": [
                {"name": "Desk Lamp", "quantity": 2},
                {"name": "Bulb"}
            ]
        });

        let details: OrderDetailsResponse = serde_json::from_value(json).unwrap();
        let detail = details.into_detail();

        assert_eq!(detail.appeal_handle.as_deref(), Some("AP-9"));
        assert_eq!(detail.reason.as_deref(), Some("arrived broken"));
        assert_eq!(detail.items.as_deref(), Some("2x Desk Lamp; 1x Bulb"));
        assert_eq!(detail.image_ref.as_deref(), Some("https://img/1.jpg"));
    }

    #[test]
    fn test_details_without_refund_or_items() {
        let json = serde_json::json!({"order_id": "ORD-2"});
        let details: OrderDetailsResponse = serde_json::from_value(json).unwrap();
        assert_eq!(details.into_detail(), OrderDetail::default());
    }

    #[tokio::test]
    async fn test_fetch_walks_pages_and_dedups() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/refunds/pending"))
            .and(query_param("page", "1"))
            .and(query_param("start_date", "2024-03-04"))
            .and(query_param("end_date", "2024-03-05"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(&["A", "B"])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/refunds/pending"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(&["B"])))
            .mount(&server)
            .await;

        let ids = client(&server)
            .with_page_size(2)
            .fetch(&range())
            .await
            .unwrap();
        assert_eq!(ids, vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_fetch_auth_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/refunds/pending"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad token"))
            .mount(&server)
            .await;

        let err = client(&server).fetch(&range()).await.unwrap_err();
        assert!(matches!(err, FetchError::Auth(body) if body == "bad token"));
    }

    #[tokio::test]
    async fn test_fetch_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/refunds/pending"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = client(&server).fetch(&range()).await.unwrap_err();
        assert!(matches!(err, FetchError::Parse(_)));
    }

    #[tokio::test]
    async fn test_resolve_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/orders/ORD-404"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = client(&server).resolve("ORD-404").await.unwrap_err();
        assert!(matches!(err, DetailError::NotFound(id) if id == "ORD-404"));
    }

    #[tokio::test]
    async fn test_resolve_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/orders/ORD-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "order_id": "ORD-1",
                "refund": {"reason": "never arrived", "appeal_id": "AP-1"},
                "items": [{"name": "Mug", "quantity": 1}]
            })))
            .mount(&server)
            .await;

        let detail = client(&server).resolve("ORD-1").await.unwrap();
        assert_eq!(detail.appeal_handle.as_deref(), Some("AP-1"));
        assert_eq!(detail.items.as_deref(), Some("1x Mug"));
        assert!(detail.image_ref.is_none());
    }

    #[tokio::test]
    async fn test_resolve_escapes_order_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/orders/ORD"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "order_id": "ORD",
                "refund": {"reason": "other order", "appeal_id": "H-OTHER"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/orders/ORD%232%2Fx%3Fy"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "order_id": "ORD#2/x?y",
                "refund": {"reason": "late", "appeal_id": "H-2"}
            })))
            .mount(&server)
            .await;

        let detail = client(&server).resolve("ORD#2/x?y").await.unwrap();
        assert_eq!(detail.appeal_handle.as_deref(), Some("H-2"));
        assert_eq!(detail.reason.as_deref(), Some("late"));
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let client = CaseApiClient::new("http://cases.local/v2/", None, Duration::from_secs(1));
        let url = client.endpoint(&["api", "orders", "A/B"]).unwrap();
        assert_eq!(url.as_str(), "http://cases.local/v2/api/orders/A%2FB");
    }

    #[tokio::test]
    async fn test_submit_posts_appeal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/appeals"))
            .and(body_json(serde_json::json!({
                "order_id": "ORD-1",
                "appeal_id": "AP-1",
                "message": "Tracking shows delivery."
            })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let appeal = AppealRecord {
            order_id: "ORD-1".to_string(),
            appeal_handle: "AP-1".to_string(),
            defense: "Tracking shows delivery.".to_string(),
        };
        client(&server).submit(&appeal).await.unwrap();
    }

    #[tokio::test]
    async fn test_submit_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/appeals"))
            .respond_with(ResponseTemplate::new(409).set_body_string("case closed"))
            .mount(&server)
            .await;

        let appeal = AppealRecord {
            order_id: "ORD-1".to_string(),
            appeal_handle: "AP-1".to_string(),
            defense: "text".to_string(),
        };
        let err = client(&server).submit(&appeal).await.unwrap_err();
        assert!(matches!(
            err,
            SubmissionError::Rejected { status: 409, ref body } if body == "case closed"
        ));
    }
}
