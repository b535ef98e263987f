//! Inventory clients used by saga steps and order placement.

use std::time::Duration;

use async_trait::async_trait;
use common::{CorrelationId, OrderId, ProductId};
use event_bus::EventBus;
use inventory::{
    InventoryService, Product, ReservationEngine, ReservationResult, ReserveRequest,
    UnavailableProduct,
};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;

use crate::ClientError;

/// Header carrying the saga's correlation id on remote calls.
pub const CORRELATION_HEADER: &str = "x-correlation-id";

/// Default per-request timeout of the HTTP client.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Access to the reservation surface of the inventory service.
#[async_trait]
pub trait InventoryClient: Send + Sync {
    /// Reserves stock for an order.
    async fn reserve(
        &self,
        request: &ReserveRequest,
        correlation_id: Option<CorrelationId>,
    ) -> Result<ReservationResult, ClientError>;

    /// Releases an order's reservations; a no-op if nothing is reserved.
    async fn release(
        &self,
        order_id: OrderId,
        correlation_id: Option<CorrelationId>,
    ) -> Result<(), ClientError>;

    /// Looks up a product, used for pricing.
    async fn product(&self, product_id: ProductId) -> Result<Product, ClientError>;
}

#[async_trait]
impl<C: InventoryClient + ?Sized> InventoryClient for std::sync::Arc<C> {
    async fn reserve(
        &self,
        request: &ReserveRequest,
        correlation_id: Option<CorrelationId>,
    ) -> Result<ReservationResult, ClientError> {
        (**self).reserve(request, correlation_id).await
    }

    async fn release(
        &self,
        order_id: OrderId,
        correlation_id: Option<CorrelationId>,
    ) -> Result<(), ClientError> {
        (**self).release(order_id, correlation_id).await
    }

    async fn product(&self, product_id: ProductId) -> Result<Product, ClientError> {
        (**self).product(product_id).await
    }
}

/// Calls an [`InventoryService`] in the same process.
pub struct LocalInventoryClient<E: ReservationEngine, B: EventBus> {
    service: InventoryService<E, B>,
}

impl<E: ReservationEngine, B: EventBus> LocalInventoryClient<E, B> {
    pub fn new(service: InventoryService<E, B>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<E, B> InventoryClient for LocalInventoryClient<E, B>
where
    E: ReservationEngine + 'static,
    B: EventBus + 'static,
{
    async fn reserve(
        &self,
        request: &ReserveRequest,
        correlation_id: Option<CorrelationId>,
    ) -> Result<ReservationResult, ClientError> {
        Ok(self.service.reserve(request, correlation_id).await?)
    }

    async fn release(
        &self,
        order_id: OrderId,
        _correlation_id: Option<CorrelationId>,
    ) -> Result<(), ClientError> {
        self.service.release(order_id).await?;
        Ok(())
    }

    async fn product(&self, product_id: ProductId) -> Result<Product, ClientError> {
        Ok(self.service.product(product_id).await?)
    }
}

/// Error body returned by the inventory HTTP surface.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RejectionBody {
    message: String,
    #[serde(default)]
    unavailable_products: Vec<UnavailableProduct>,
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct ReleaseBody {
    order_id: OrderId,
}

/// Calls a remote inventory service over HTTP.
#[derive(Clone)]
pub struct HttpInventoryClient {
    client: Client,
    base_url: String,
}

impl HttpInventoryClient {
    /// Creates a client for `base_url` with the default timeout.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        Self::with_timeout(base_url, DEFAULT_HTTP_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn with_correlation(
        request: RequestBuilder,
        correlation_id: Option<CorrelationId>,
    ) -> RequestBuilder {
        match correlation_id {
            Some(id) => request.header(CORRELATION_HEADER, id.to_string()),
            None => request,
        }
    }

    /// Maps a non-success response to a client error.
    async fn into_error(response: Response) -> ClientError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let rejection = serde_json::from_str::<RejectionBody>(&body).ok();

        match (status, rejection) {
            (StatusCode::BAD_REQUEST, Some(r)) if !r.unavailable_products.is_empty() => {
                ClientError::Rejected {
                    message: r.message,
                    unavailable_products: r.unavailable_products,
                }
            }
            (s, Some(r)) if s.is_client_error() => ClientError::Validation(r.message),
            (s, None) if s.is_client_error() => {
                ClientError::Validation(format!("HTTP {}: {}", s, body))
            }
            (s, _) => ClientError::Unavailable(format!("HTTP {}: {}", s, body)),
        }
    }
}

#[async_trait]
impl InventoryClient for HttpInventoryClient {
    #[tracing::instrument(skip(self, request), fields(order_id = %request.order_id))]
    async fn reserve(
        &self,
        request: &ReserveRequest,
        correlation_id: Option<CorrelationId>,
    ) -> Result<ReservationResult, ClientError> {
        let response = Self::with_correlation(
            self.client.post(self.url("/inventory/reserve")).json(request),
            correlation_id,
        )
        .send()
        .await?;

        if !response.status().is_success() {
            return Err(Self::into_error(response).await);
        }
        Ok(response.json().await?)
    }

    #[tracing::instrument(skip(self))]
    async fn release(
        &self,
        order_id: OrderId,
        correlation_id: Option<CorrelationId>,
    ) -> Result<(), ClientError> {
        let response = Self::with_correlation(
            self.client
                .post(self.url("/inventory/release"))
                .json(&ReleaseBody { order_id }),
            correlation_id,
        )
        .send()
        .await?;

        if !response.status().is_success() {
            return Err(Self::into_error(response).await);
        }
        Ok(())
    }

    async fn product(&self, product_id: ProductId) -> Result<Product, ClientError> {
        let response = self
            .client
            .get(self.url(&format!("/inventory/products/{product_id}")))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(ClientError::ProductNotFound(product_id));
        }
        if !response.status().is_success() {
            return Err(Self::into_error(response).await);
        }
        Ok(response.json().await?)
    }
}
