use serde::Deserialize;
use serde_json::{json, Value};

use stockroom_core::{DomainError, OrderId, ProductId, UserId};
use stockroom_infra::{OrderFilter, OrderPage, OrderSort, PageRequest};
use stockroom_orders::{Order, OrderStatus, PlaceOrder, RequestedItem, ShippingAddress};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    #[serde(default)]
    pub items: Vec<OrderItemRequest>,
    pub shipping_address: Option<ShippingAddress>,
    /// Smallest currency unit.
    pub total_amount: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct OrderItemRequest {
    #[serde(default)]
    pub product: String,
    #[serde(default)]
    pub quantity: i64,
    #[serde(default)]
    pub size: String,
}

impl CreateOrderRequest {
    pub fn into_command(self, owner: UserId) -> Result<PlaceOrder, DomainError> {
        let items = self
            .items
            .into_iter()
            .map(|item| {
                let product = item.product.trim();
                if product.is_empty() {
                    return Err(DomainError::validation(
                        "product ID is required for each item",
                    ));
                }
                let product_id: ProductId = product.parse().map_err(|_| {
                    DomainError::validation(format!("invalid product ID: {product}"))
                })?;
                let quantity = u32::try_from(item.quantity)
                    .ok()
                    .filter(|q| *q >= 1)
                    .ok_or_else(|| DomainError::validation("quantity must be at least 1"))?;
                Ok(RequestedItem {
                    product_id,
                    size: item.size.trim().to_string(),
                    quantity,
                })
            })
            .collect::<Result<Vec<_>, DomainError>>()?;

        Ok(PlaceOrder {
            owner,
            items,
            shipping_address: self.shipping_address,
            total_amount: self.total_amount,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelOrderRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: Option<String>,
}

impl UpdateStatusRequest {
    pub fn target(&self) -> Result<OrderStatus, DomainError> {
        match self.status.as_deref().map(str::trim) {
            None | Some("") => Err(DomainError::validation("status is required")),
            Some(raw) => raw.parse(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListOrdersQuery {
    /// A status name, or `all` for no filter.
    pub status: Option<String>,
    /// `newest` (default), `oldest`, `highest` or `lowest`.
    pub sort: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

impl ListOrdersQuery {
    pub fn into_filter(self) -> Result<OrderFilter, DomainError> {
        let mut filter = OrderFilter::default();
        match self.status.as_deref().map(str::trim) {
            None | Some("") => {}
            Some(raw) if raw.eq_ignore_ascii_case("all") => {}
            Some(raw) => filter = filter.with_status(raw.parse()?),
        }
        if let Some(sort) = self.sort.as_deref().filter(|s| !s.trim().is_empty()) {
            filter = filter.sorted_by(sort.parse::<OrderSort>()?);
        }
        let page = parse_positive("page", self.page.as_deref())?.unwrap_or(1);
        let limit = parse_positive("limit", self.limit.as_deref())?
            .unwrap_or(PageRequest::DEFAULT_LIMIT);
        Ok(filter.paged(PageRequest::new(page, limit)?))
    }
}

fn parse_positive(name: &str, raw: Option<&str>) -> Result<Option<u32>, DomainError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => raw
            .parse::<u32>()
            .map(Some)
            .map_err(|_| DomainError::validation(format!("{name} must be a positive integer"))),
    }
}

pub fn parse_order_id(raw: &str) -> Result<OrderId, DomainError> {
    raw.trim()
        .parse()
        .map_err(|_| DomainError::validation(format!("invalid order ID: {raw}")))
}

// -------------------------
// Response mapping
// -------------------------

pub fn order_to_json(order: &Order) -> Value {
    json!({
        "id": order.id_typed().to_string(),
        "user": order.owner().to_string(),
        "items": order.items().iter().map(|item| json!({
            "product": item.product_id.to_string(),
            "size": item.size,
            "quantity": item.quantity,
            "unitPriceAtPurchase": item.unit_price,
        })).collect::<Vec<_>>(),
        "shippingAddress": order.shipping_address(),
        "totalAmount": order.total_amount(),
        "status": order.status().label(),
        "cancellationReason": order.cancellation_reason(),
        "createdAt": order.created_at().to_rfc3339(),
        "updatedAt": order.updated_at().to_rfc3339(),
    })
}

pub fn orders_to_json(orders: &[Order]) -> Value {
    Value::Array(orders.iter().map(order_to_json).collect())
}

pub fn order_page_to_json(page: &OrderPage) -> Value {
    json!({
        "success": true,
        "count": page.orders.len(),
        "totalOrders": page.total,
        "totalPages": page.total_pages(),
        "currentPage": page.page.map_or(1, |p| p.page()),
        "orders": orders_to_json(&page.orders),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(raw: &str) -> CreateOrderRequest {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn items_are_converted_with_typed_ids() {
        let product = ProductId::new();
        let req = body(&format!(
            r#"{{"items":[{{"product":"{product}","quantity":2,"size":" 42 "}}],"totalAmount":100}}"#
        ));
        let cmd = req.into_command(UserId::new()).unwrap();
        assert_eq!(cmd.items[0].product_id, product);
        assert_eq!(cmd.items[0].quantity, 2);
        assert_eq!(cmd.items[0].size, "42");
        assert_eq!(cmd.total_amount, Some(100));
        assert!(cmd.shipping_address.is_none());
    }

    #[test]
    fn bad_items_are_validation_errors() {
        let product = ProductId::new();
        for raw in [
            r#"{"items":[{"quantity":1,"size":"M"}]}"#.to_string(),
            r#"{"items":[{"product":"not-a-uuid","quantity":1,"size":"M"}]}"#.to_string(),
            format!(r#"{{"items":[{{"product":"{product}","quantity":0,"size":"M"}}]}}"#),
            format!(r#"{{"items":[{{"product":"{product}","quantity":-3,"size":"M"}}]}}"#),
        ] {
            let err = body(&raw).into_command(UserId::new()).unwrap_err();
            assert!(matches!(err, DomainError::Validation(_)), "{raw}");
        }
    }

    #[test]
    fn status_request_requires_a_known_status() {
        let ok = UpdateStatusRequest {
            status: Some("Shipped".into()),
        };
        assert_eq!(ok.target().unwrap(), OrderStatus::Shipped);
        assert!(UpdateStatusRequest { status: None }.target().is_err());
        assert!(
            UpdateStatusRequest {
                status: Some("Lost".into())
            }
            .target()
            .is_err()
        );
    }

    fn listing(status: &str, sort: &str, page: &str, limit: &str) -> ListOrdersQuery {
        let field = |v: &str| (!v.is_empty()).then(|| v.to_string());
        ListOrdersQuery {
            status: field(status),
            sort: field(sort),
            page: field(page),
            limit: field(limit),
        }
    }

    #[test]
    fn listing_defaults_to_newest_first_page_of_ten() {
        let filter = ListOrdersQuery::default().into_filter().unwrap();
        assert_eq!(filter.status, None);
        assert_eq!(filter.sort, OrderSort::Newest);
        assert_eq!(filter.page, Some(PageRequest::new(1, 10).unwrap()));
    }

    #[test]
    fn status_all_means_no_status_filter() {
        let filter = listing("all", "", "", "").into_filter().unwrap();
        assert_eq!(filter.status, None);

        let filter = listing("Shipped", "lowest", "3", "25").into_filter().unwrap();
        assert_eq!(filter.status, Some(OrderStatus::Shipped));
        assert_eq!(filter.sort, OrderSort::Lowest);
        assert_eq!(filter.page, Some(PageRequest::new(3, 25).unwrap()));
    }

    #[test]
    fn bad_listing_parameters_are_validation_errors() {
        for query in [
            listing("lost", "", "", ""),
            listing("", "cheapest", "", ""),
            listing("", "", "0", ""),
            listing("", "", "two", ""),
            listing("", "", "", "-5"),
            listing("", "", "", "1000"),
        ] {
            let err = query.into_filter().unwrap_err();
            assert!(matches!(err, DomainError::Validation(_)));
        }
    }
}
