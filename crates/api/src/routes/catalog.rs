//! Product and stock endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Extension, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use catalog::{NewProduct, ProductFilter, ProductKind, ProductPatch, ProductView, SortField};
use common::{Deadline, Money, OrderLine};
use futures_util::TryStreamExt;
use serde::Deserialize;

use super::{authorization, json_body, ndjson, query};
use crate::Catalog;
use crate::error::ApiError;

/// Listing parameters. List-valued ones are comma separated, e.g.
/// `?type=road,hybrid&brand=Trek`.
#[derive(Debug, Default, Deserialize)]
pub struct ProductQuery {
    #[serde(rename = "type")]
    pub kinds: Option<String>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    pub brand: Option<String>,
    pub size: Option<String>,
    #[serde(default)]
    pub only_active: bool,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    pub limit: Option<usize>,
    pub q: Option<String>,
}

impl ProductQuery {
    pub fn to_filter(&self) -> Result<ProductFilter, ApiError> {
        let kinds = split(self.kinds.as_deref())
            .map(|kind| {
                ProductKind::parse(&kind)
                    .ok_or_else(|| ApiError::BadRequest(format!("unknown product type: {kind}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let sort_by = match self.sort_by.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(field) => Some(
                SortField::parse(field)
                    .ok_or_else(|| ApiError::BadRequest(format!("unknown sort field: {field}")))?,
            ),
        };
        let descending = match self.sort_order.as_deref().map(str::trim) {
            None | Some("") | Some("asc") => false,
            Some("desc") => true,
            Some(other) => {
                return Err(ApiError::BadRequest(format!("unknown sort order: {other}")));
            }
        };

        Ok(ProductFilter {
            kinds,
            min_price: self.min_price.map(Money::from_cents),
            max_price: self.max_price.map(Money::from_cents),
            brands: split(self.brand.as_deref()).collect(),
            sizes: split(self.size.as_deref()).collect(),
            only_active: self.only_active,
            sort_by,
            descending,
            limit: self.limit,
        })
    }
}

fn split(list: Option<&str>) -> impl Iterator<Item = String> + '_ {
    list.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
}

#[derive(Debug, Deserialize)]
pub struct StockChangeRequest {
    pub delta: i64,
    #[serde(default)]
    pub order_id: Option<String>,
    /// Line within the order; changes are applied once per line.
    #[serde(default)]
    pub line: Option<u32>,
}

impl StockChangeRequest {
    fn origin(&self) -> Option<OrderLine> {
        self.order_id.as_ref().map(|order_id| OrderLine {
            order_id: order_id.clone(),
            line: self.line,
        })
    }
}

/// POST /catalog/products (admin)
pub async fn create(
    State(catalog): State<Arc<Catalog>>,
    Extension(deadline): Extension<Deadline>,
    headers: HeaderMap,
    payload: Result<Json<NewProduct>, JsonRejection>,
) -> Result<(StatusCode, Json<ProductView>), ApiError> {
    let product = json_body(payload)?;
    let product = catalog
        .create_product(authorization(&headers), deadline, product)
        .await?;
    Ok((StatusCode::CREATED, Json(product.view())))
}

/// PATCH /catalog/products/{id} (admin)
pub async fn update(
    State(catalog): State<Arc<Catalog>>,
    Extension(deadline): Extension<Deadline>,
    Path(id): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<ProductPatch>, JsonRejection>,
) -> Result<Json<ProductView>, ApiError> {
    let patch = json_body(payload)?;
    let product = catalog
        .update_product(authorization(&headers), deadline, &id, patch)
        .await?;
    Ok(Json(product.view()))
}

/// DELETE /catalog/products/{id} (admin)
pub async fn delete(
    State(catalog): State<Arc<Catalog>>,
    Extension(deadline): Extension<Deadline>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    catalog
        .delete_product(authorization(&headers), deadline, &id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /catalog/products/{id}/stock
pub async fn change_stock(
    State(catalog): State<Arc<Catalog>>,
    Path(id): Path<String>,
    payload: Result<Json<StockChangeRequest>, JsonRejection>,
) -> Result<Json<ProductView>, ApiError> {
    let request = json_body(payload)?;
    let product = catalog
        .change_stock(&id, request.delta, request.origin().as_ref())
        .await?;
    Ok(Json(product.view()))
}

/// GET /catalog/products/{id}
pub async fn get(
    State(catalog): State<Arc<Catalog>>,
    Path(id): Path<String>,
) -> Result<Json<ProductView>, ApiError> {
    Ok(Json(catalog.get_product(&id).await?.view()))
}

/// GET /catalog/products: NDJSON stream of matching products.
pub async fn list(
    State(catalog): State<Arc<Catalog>>,
    params: Result<Query<ProductQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let filter = query(params)?.to_filter()?;
    let products = catalog.list_products(&filter).await?;
    Ok(ndjson(products.map_ok(|product| product.view())))
}

/// GET /catalog/products/search?q=: NDJSON stream of matching products.
pub async fn search(
    State(catalog): State<Arc<Catalog>>,
    params: Result<Query<ProductQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let params = query(params)?;
    let filter = params.to_filter()?;
    let products = catalog
        .search_products(params.q.as_deref().unwrap_or_default(), &filter)
        .await?;
    Ok(ndjson(products.map_ok(|product| product.view())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comma_separated_lists_become_filters() {
        let params = ProductQuery {
            kinds: Some("road, hybrid".to_string()),
            brand: Some("Trek,,Giant".to_string()),
            min_price: Some(10_000),
            sort_by: Some("price".to_string()),
            sort_order: Some("desc".to_string()),
            ..ProductQuery::default()
        };
        let filter = params.to_filter().unwrap();
        assert_eq!(filter.kinds, vec![ProductKind::Road, ProductKind::Hybrid]);
        assert_eq!(filter.brands, vec!["Trek", "Giant"]);
        assert_eq!(filter.min_price, Some(Money::from_cents(10_000)));
        assert_eq!(filter.sort_by, Some(SortField::Price));
        assert!(filter.descending);
    }

    #[test]
    fn unknown_values_are_rejected() {
        let unknown_kind = ProductQuery {
            kinds: Some("unicycle".to_string()),
            ..ProductQuery::default()
        };
        assert!(matches!(unknown_kind.to_filter(), Err(ApiError::BadRequest(_))));

        let unknown_order = ProductQuery {
            sort_order: Some("sideways".to_string()),
            ..ProductQuery::default()
        };
        assert!(matches!(unknown_order.to_filter(), Err(ApiError::BadRequest(_))));
    }
}
