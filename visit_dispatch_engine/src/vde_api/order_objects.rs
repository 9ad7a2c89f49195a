use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vdp_common::Tenge;

use crate::{
    db_types::{NewOrder, OrderStatusType},
    traits::OrderFlowError,
};

/// The payload a client submits to place an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrderRequest {
    pub service_type: String,
    pub city: String,
    pub district: String,
    pub address: String,
    pub scheduled_at: DateTime<Utc>,
    #[serde(default)]
    pub price: Option<Tenge>,
    #[serde(default)]
    pub comment: Option<String>,
}

impl NewOrderRequest {
    /// Validates the request and turns it into a [`NewOrder`] with a fresh server-assigned id.
    pub fn into_new_order(self, client_id: i64) -> Result<NewOrder, OrderFlowError> {
        for (field, value) in [
            ("service_type", &self.service_type),
            ("city", &self.city),
            ("district", &self.district),
            ("address", &self.address),
        ] {
            if value.trim().is_empty() {
                return Err(OrderFlowError::ValidationError(format!("{field} must not be empty")));
            }
        }
        if let Some(price) = self.price {
            if price.is_negative() {
                return Err(OrderFlowError::ValidationError(format!("price must not be negative, got {price}")));
            }
        }
        let mut order = NewOrder::new(client_id, &self.service_type, &self.city, &self.district, &self.address)
            .scheduled_at(self.scheduled_at);
        order.price = self.price;
        order.comment = self.comment;
        Ok(order)
    }
}

/// Search criteria for the order read projections. Empty filter means "everything".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderQueryFilter {
    pub client_id: Option<i64>,
    pub medic_id: Option<i64>,
    pub city: Option<String>,
    pub district: Option<String>,
    pub status: Option<Vec<OrderStatusType>>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl OrderQueryFilter {
    pub fn is_empty(&self) -> bool {
        self.client_id.is_none()
            && self.medic_id.is_none()
            && self.city.is_none()
            && self.district.is_none()
            && self.status.as_ref().map(|s| s.is_empty()).unwrap_or(true)
            && self.since.is_none()
            && self.until.is_none()
    }

    pub fn with_client_id(mut self, client_id: i64) -> Self {
        self.client_id = Some(client_id);
        self
    }

    pub fn with_medic_id(mut self, medic_id: i64) -> Self {
        self.medic_id = Some(medic_id);
        self
    }

    pub fn with_status(mut self, status: OrderStatusType) -> Self {
        self.status.get_or_insert_with(Vec::new).push(status);
        self
    }
}
