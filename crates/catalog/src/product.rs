//! Product records, inputs, and listing filters.

use chrono::{DateTime, Utc};
use common::{Money, ProductId};
use doc_store::{Document, Filter, FindOptions, SortOrder, Update};
use serde::{Deserialize, Serialize};

use crate::{CatalogError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProductKind {
    #[default]
    Road,
    Mountain,
    Hybrid,
    Electric,
}

impl ProductKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductKind::Road => "road",
            ProductKind::Mountain => "mountain",
            ProductKind::Hybrid => "hybrid",
            ProductKind::Electric => "electric",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "road" => Some(ProductKind::Road),
            "mountain" => Some(ProductKind::Mountain),
            "hybrid" => Some(ProductKind::Hybrid),
            "electric" => Some(ProductKind::Electric),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feature {
    pub name: String,
    pub value: String,
}

/// A stocked product. `quantity` is a signed counter: approvals may drive
/// it below zero and nothing clamps it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: Money,
    pub quantity: i64,
    #[serde(rename = "type")]
    pub kind: ProductKind,
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub size: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub weight: f64,
    #[serde(default)]
    pub rating: f64,
    pub is_active: bool,
    #[serde(default)]
    pub features: Vec<Feature>,
    /// Markers (`<order_id>` or `<order_id>#<line>`) of stock changes
    /// already applied here.
    #[serde(default)]
    pub applied_orders: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document for Product {
    const COLLECTION: &'static str = "products";

    fn id(&self) -> String {
        self.id.to_string()
    }
}

impl Product {
    /// Whether the stock change keyed by `marker` was already applied.
    pub fn has_applied(&self, marker: &str) -> bool {
        self.applied_orders.iter().any(|applied| applied == marker)
    }

    pub fn view(&self) -> ProductView {
        ProductView::from(self)
    }
}

/// Product as returned to clients, without bookkeeping fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductView {
    pub id: String,
    pub name: String,
    pub description: String,
    pub price: Money,
    pub quantity: i64,
    #[serde(rename = "type")]
    pub kind: ProductKind,
    pub brand: String,
    pub size: String,
    pub color: String,
    pub weight: f64,
    pub rating: f64,
    pub is_active: bool,
    pub features: Vec<Feature>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Product> for ProductView {
    fn from(p: &Product) -> Self {
        Self {
            id: p.id.to_string(),
            name: p.name.clone(),
            description: p.description.clone(),
            price: p.price,
            quantity: p.quantity,
            kind: p.kind,
            brand: p.brand.clone(),
            size: p.size.clone(),
            color: p.color.clone(),
            weight: p.weight,
            rating: p.rating,
            is_active: p.is_active,
            features: p.features.clone(),
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

/// Input for creating a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: Money,
    #[serde(default)]
    pub quantity: i64,
    #[serde(rename = "type", default)]
    pub kind: ProductKind,
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub size: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub weight: f64,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub features: Vec<Feature>,
}

impl NewProduct {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(invalid("product name is required"));
        }
        check_price(self.price)?;
        if self.quantity < 0 {
            return Err(invalid("quantity must not be negative"));
        }
        check_weight(self.weight)?;
        check_rating(self.rating)?;
        Ok(())
    }

    pub(crate) fn into_product(self, now: DateTime<Utc>) -> Product {
        Product {
            id: ProductId::new(),
            name: self.name.trim().to_string(),
            description: self.description,
            price: self.price,
            quantity: self.quantity,
            kind: self.kind,
            brand: self.brand,
            size: self.size,
            color: self.color,
            weight: self.weight,
            rating: self.rating,
            is_active: true,
            features: self.features,
            applied_orders: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update. Absent fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Money>,
    pub quantity: Option<i64>,
    #[serde(rename = "type")]
    pub kind: Option<ProductKind>,
    pub brand: Option<String>,
    pub size: Option<String>,
    pub color: Option<String>,
    pub weight: Option<f64>,
    pub rating: Option<f64>,
    pub is_active: Option<bool>,
    pub features: Option<Vec<Feature>>,
}

impl ProductPatch {
    /// Validates the patch and turns it into a store update.
    pub fn to_update(&self, now: DateTime<Utc>) -> Result<Update> {
        let mut update = Update::new();

        if let Some(name) = &self.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(invalid("product name must not be empty"));
            }
            update = update.set("name", name);
        }
        if let Some(description) = &self.description {
            update = update.set("description", description.as_str());
        }
        if let Some(price) = self.price {
            check_price(price)?;
            update = update.set("price", price.cents());
        }
        if let Some(quantity) = self.quantity {
            update = update.set("quantity", quantity);
        }
        if let Some(kind) = self.kind {
            update = update.set("type", kind.as_str());
        }
        if let Some(brand) = &self.brand {
            update = update.set("brand", brand.as_str());
        }
        if let Some(size) = &self.size {
            update = update.set("size", size.as_str());
        }
        if let Some(color) = &self.color {
            update = update.set("color", color.as_str());
        }
        if let Some(weight) = self.weight {
            check_weight(weight)?;
            update = update.set("weight", weight);
        }
        if let Some(rating) = self.rating {
            check_rating(rating)?;
            update = update.set("rating", rating);
        }
        if let Some(is_active) = self.is_active {
            update = update.set("is_active", is_active);
        }
        if let Some(features) = &self.features {
            update = update.set("features", serde_json::to_value(features)?);
        }

        if update.is_empty() {
            return Err(invalid("no fields to update"));
        }
        Ok(update.set("updated_at", now.to_rfc3339()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    Price,
    Rating,
    Name,
    Newest,
}

impl SortField {
    fn field(&self) -> &'static str {
        match self {
            SortField::Price => "price",
            SortField::Rating => "rating",
            SortField::Name => "name",
            SortField::Newest => "created_at",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "price" => Some(SortField::Price),
            "rating" => Some(SortField::Rating),
            "name" => Some(SortField::Name),
            "newest" | "created_at" => Some(SortField::Newest),
            _ => None,
        }
    }
}

/// Listing criteria. Empty lists and `None` bounds do not constrain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductFilter {
    #[serde(default)]
    pub kinds: Vec<ProductKind>,
    pub min_price: Option<Money>,
    pub max_price: Option<Money>,
    #[serde(default)]
    pub brands: Vec<String>,
    #[serde(default)]
    pub sizes: Vec<String>,
    #[serde(default)]
    pub only_active: bool,
    pub sort_by: Option<SortField>,
    #[serde(default)]
    pub descending: bool,
    pub limit: Option<usize>,
}

impl ProductFilter {
    pub fn to_filter(&self) -> Filter {
        let mut filter = Filter::new();
        if !self.kinds.is_empty() {
            filter = filter.is_in("type", self.kinds.iter().map(|k| k.as_str()));
        }
        if let Some(min) = self.min_price {
            filter = filter.gte("price", min.cents());
        }
        if let Some(max) = self.max_price {
            filter = filter.lte("price", max.cents());
        }
        if !self.brands.is_empty() {
            filter = filter.is_in("brand", self.brands.iter().map(String::as_str));
        }
        if !self.sizes.is_empty() {
            filter = filter.is_in("size", self.sizes.iter().map(String::as_str));
        }
        if self.only_active {
            filter = filter.eq("is_active", true);
        }
        filter
    }

    pub fn find_options(&self) -> FindOptions {
        let mut options = FindOptions::new();
        if let Some(field) = self.sort_by {
            let order = if self.descending {
                SortOrder::Descending
            } else {
                SortOrder::Ascending
            };
            options = options.sort_by(field.field(), order);
        }
        if let Some(limit) = self.limit {
            options = options.limit(limit);
        }
        options
    }
}

fn invalid(msg: &str) -> CatalogError {
    CatalogError::InvalidArgument(msg.to_string())
}

fn check_price(price: Money) -> Result<()> {
    if price.is_negative() {
        return Err(invalid("price must not be negative"));
    }
    Ok(())
}

fn check_weight(weight: f64) -> Result<()> {
    if !weight.is_finite() || weight < 0.0 {
        return Err(invalid("weight must be a non-negative number"));
    }
    Ok(())
}

fn check_rating(rating: f64) -> Result<()> {
    if !(0.0..=5.0).contains(&rating) {
        return Err(invalid("rating must be between 0 and 5"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use doc_store::UpdateOp;
    use serde_json::json;

    use super::*;

    fn bike() -> NewProduct {
        NewProduct {
            name: "Roadster".to_string(),
            description: "Light road bike".to_string(),
            price: Money::from_cents(129_900),
            quantity: 5,
            kind: ProductKind::Road,
            brand: "Velo".to_string(),
            size: "M".to_string(),
            color: "red".to_string(),
            weight: 8.2,
            rating: 4.5,
            features: vec![Feature {
                name: "gears".to_string(),
                value: "22".to_string(),
            }],
        }
    }

    #[test]
    fn valid_product_passes() {
        assert!(bike().validate().is_ok());
    }

    #[test]
    fn invalid_products_are_rejected() {
        let mut p = bike();
        p.name = "  ".to_string();
        assert!(p.validate().is_err());

        let mut p = bike();
        p.price = Money::from_cents(-1);
        assert!(p.validate().is_err());

        let mut p = bike();
        p.quantity = -3;
        assert!(p.validate().is_err());

        let mut p = bike();
        p.rating = 7.0;
        assert!(p.validate().is_err());

        let mut p = bike();
        p.weight = f64::NAN;
        assert!(p.validate().is_err());
    }

    #[test]
    fn kind_is_stored_as_type() {
        let product = bike().into_product(Utc::now());
        let value = serde_json::to_value(&product).unwrap();
        assert_eq!(value["type"], json!("road"));
        assert_eq!(value["price"], json!(129_900));
        assert!(value["applied_orders"].as_array().unwrap().is_empty());
    }

    #[test]
    fn view_hides_applied_orders() {
        let mut product = bike().into_product(Utc::now());
        product.applied_orders.push("order-1".to_string());
        let json = serde_json::to_string(&product.view()).unwrap();
        assert!(!json.contains("order-1"));
    }

    #[test]
    fn empty_patch_is_rejected() {
        assert!(matches!(
            ProductPatch::default().to_update(Utc::now()),
            Err(CatalogError::InvalidArgument(_))
        ));
    }

    #[test]
    fn patch_sets_only_present_fields() {
        let patch = ProductPatch {
            price: Some(Money::from_cents(99_00)),
            kind: Some(ProductKind::Electric),
            ..Default::default()
        };
        let update = patch.to_update(Utc::now()).unwrap();
        let fields: Vec<&str> = update
            .ops()
            .iter()
            .map(|op| match op {
                UpdateOp::Set(field, _) | UpdateOp::Inc(field, _) | UpdateOp::Push(field, _) => {
                    field.as_str()
                }
            })
            .collect();
        assert_eq!(fields, vec!["price", "type", "updated_at"]);
    }

    #[test]
    fn patch_validates_values() {
        let patch = ProductPatch {
            rating: Some(-1.0),
            ..Default::default()
        };
        assert!(patch.to_update(Utc::now()).is_err());
    }

    #[test]
    fn filter_matches_price_range_and_kind() {
        let product = serde_json::to_value(bike().into_product(Utc::now())).unwrap();

        let filter = ProductFilter {
            kinds: vec![ProductKind::Road, ProductKind::Hybrid],
            min_price: Some(Money::from_cents(100_000)),
            max_price: Some(Money::from_cents(150_000)),
            only_active: true,
            ..Default::default()
        };
        assert!(filter.to_filter().matches(&product));

        let filter = ProductFilter {
            brands: vec!["Other".to_string()],
            ..Default::default()
        };
        assert!(!filter.to_filter().matches(&product));
    }

    #[test]
    fn sort_fields_parse() {
        assert_eq!(SortField::parse("Newest"), Some(SortField::Newest));
        assert_eq!(SortField::parse("created_at"), Some(SortField::Newest));
        assert_eq!(SortField::parse("weight"), None);
        assert_eq!(ProductKind::parse(" MOUNTAIN "), Some(ProductKind::Mountain));
    }
}
