//! Product catalog operations.

use chrono::Utc;
use common::{Deadline, OrderLine, RoleResolver};
use doc_store::{Collection, DocumentStore, Filter, TypedStream, Update};
use event_bus::{EventBus, EventBusExt, ProcessedEvent, topics};

use crate::{
    AuthorizationDelegate, CatalogError, NewProduct, Product, ProductFilter, ProductPatch, Result,
};

/// A stream of products read lazily from the store.
pub type ProductStream = TypedStream<Product>;

const SEARCH_FIELDS: &[&str] = &["name", "description"];

/// Catalog service. Mutations of product definitions are admin only; stock
/// changes are trusted internal calls.
#[derive(Clone)]
pub struct CatalogService<S, R, B> {
    products: Collection<S, Product>,
    authz: AuthorizationDelegate<R>,
    bus: B,
}

impl<S, R, B> CatalogService<S, R, B>
where
    S: DocumentStore,
    R: RoleResolver,
    B: EventBus,
{
    pub fn new(store: S, resolver: R, bus: B) -> Self {
        Self {
            products: Collection::new(store),
            authz: AuthorizationDelegate::admin_only(resolver),
            bus,
        }
    }

    pub fn products(&self) -> &Collection<S, Product> {
        &self.products
    }

    #[tracing::instrument(skip_all, fields(name = %product.name))]
    pub async fn create_product(
        &self,
        bearer: Option<&str>,
        deadline: Deadline,
        product: NewProduct,
    ) -> Result<Product> {
        self.authorize(bearer, deadline).await?;
        product.validate()?;

        let product = product.into_product(Utc::now());
        self.products.insert(&product).await?;

        metrics::counter!("products_created_total").increment(1);
        tracing::info!(product_id = %product.id, "product created");
        Ok(product)
    }

    #[tracing::instrument(skip(self, bearer, deadline, patch))]
    pub async fn update_product(
        &self,
        bearer: Option<&str>,
        deadline: Deadline,
        id: &str,
        patch: ProductPatch,
    ) -> Result<Product> {
        self.authorize(bearer, deadline).await?;
        let id = required_id(id)?;
        let update = patch.to_update(Utc::now())?;

        let product = self
            .products
            .find_one_and_update(&Filter::by_id(id), &update)
            .await?
            .ok_or_else(CatalogError::product_not_found)?;

        tracing::info!("product updated");
        Ok(product)
    }

    #[tracing::instrument(skip(self, bearer, deadline))]
    pub async fn delete_product(
        &self,
        bearer: Option<&str>,
        deadline: Deadline,
        id: &str,
    ) -> Result<()> {
        self.authorize(bearer, deadline).await?;
        let id = required_id(id)?;

        if !self.products.delete_one(&Filter::by_id(id)).await? {
            return Err(CatalogError::product_not_found());
        }
        tracing::info!("product deleted");
        Ok(())
    }

    /// Adds `delta` to the product's stock counter in one atomic update.
    ///
    /// With an `origin` the change is applied at most once per order line:
    /// a repeat returns the product unchanged and publishes nothing.
    #[tracing::instrument(skip(self))]
    pub async fn change_stock(
        &self,
        product_id: &str,
        delta: i64,
        origin: Option<&OrderLine>,
    ) -> Result<Product> {
        let product_id = required_id(product_id)?;
        if delta == 0 {
            return Err(CatalogError::InvalidArgument(
                "quantity change must not be zero".to_string(),
            ));
        }
        let origin = origin.filter(|origin| !origin.order_id.trim().is_empty());
        let marker = origin.map(OrderLine::marker);

        let mut filter = Filter::by_id(product_id);
        let mut update = Update::new()
            .inc("quantity", delta)
            .set("updated_at", Utc::now().to_rfc3339());
        if let Some(marker) = &marker {
            filter = filter.not_contains("applied_orders", marker.as_str());
            update = update.push("applied_orders", marker.as_str());
        }

        let Some(product) = self.products.find_one_and_update(&filter, &update).await? else {
            return match (&marker, self.products.get(product_id).await?) {
                (Some(marker), Some(existing)) if existing.has_applied(marker) => {
                    tracing::debug!(%marker, "stock adjustment already applied");
                    Ok(existing)
                }
                _ => Err(CatalogError::product_not_found()),
            };
        };

        metrics::counter!("stock_changes_total").increment(1);
        tracing::info!(quantity = product.quantity, "stock changed");

        if let Some(origin) = origin {
            let order_id = origin.order_id.trim();
            let notice = ProcessedEvent::processed(order_id, "Order processed and stock updated");
            if let Err(e) = self.bus.publish_json(topics::ORDER_PROCESSED, &notice).await {
                tracing::warn!(order_id, error = %e, "failed to publish order.processed");
            }
        }

        Ok(product)
    }

    pub async fn get_product(&self, id: &str) -> Result<Product> {
        let id = required_id(id)?;
        self.products
            .get(id)
            .await?
            .ok_or_else(CatalogError::product_not_found)
    }

    pub async fn list_products(&self, filter: &ProductFilter) -> Result<ProductStream> {
        Ok(self
            .products
            .find(filter.to_filter(), filter.find_options())
            .await?)
    }

    /// Case-insensitive substring search over name and description, narrowed
    /// by `filter`. An empty query lists everything the filter admits.
    pub async fn search_products(
        &self,
        query: &str,
        filter: &ProductFilter,
    ) -> Result<ProductStream> {
        let query = query.trim();
        let mut store_filter = filter.to_filter();
        if !query.is_empty() {
            store_filter = store_filter.text(SEARCH_FIELDS, query);
        }
        Ok(self
            .products
            .find(store_filter, filter.find_options())
            .await?)
    }

    async fn authorize(&self, bearer: Option<&str>, deadline: Deadline) -> Result<()> {
        let principal = self
            .authz
            .authorize(bearer, deadline)
            .await
            .map_err(CatalogError::Denied)?;
        tracing::debug!(user_id = %principal.user_id, "admin authorized");
        Ok(())
    }
}

fn required_id(id: &str) -> Result<&str> {
    let id = id.trim();
    if id.is_empty() {
        return Err(CatalogError::InvalidArgument(
            "product id is required".to_string(),
        ));
    }
    Ok(id)
}

#[cfg(test)]
mod tests {
    use common::{Code, Money, Role, StaticRoleResolver, Status};
    use doc_store::InMemoryDocumentStore;
    use event_bus::InMemoryEventBus;
    use futures_util::TryStreamExt;

    use super::*;
    use crate::{ProductKind, SortField};

    type Service = CatalogService<InMemoryDocumentStore, StaticRoleResolver, InMemoryEventBus>;

    const ADMIN: Option<&str> = Some("Bearer admin-token");

    fn service() -> (Service, InMemoryEventBus) {
        let resolver = StaticRoleResolver::new()
            .with_token("admin-token", "admin-1", Role::Admin)
            .with_token("customer-token", "cust-1", Role::Customer);
        let bus = InMemoryEventBus::new();
        (
            CatalogService::new(InMemoryDocumentStore::new(), resolver, bus.clone()),
            bus,
        )
    }

    fn bike(name: &str, cents: i64, kind: ProductKind) -> NewProduct {
        NewProduct {
            name: name.to_string(),
            description: format!("{name} bicycle"),
            price: Money::from_cents(cents),
            quantity: 10,
            kind,
            brand: "Velo".to_string(),
            size: "M".to_string(),
            color: "blue".to_string(),
            weight: 9.0,
            rating: 4.0,
            features: Vec::new(),
        }
    }

    async fn seeded(service: &Service) -> Product {
        service
            .create_product(ADMIN, Deadline::none(), bike("Roadster", 100_00, ProductKind::Road))
            .await
            .unwrap()
    }

    fn status(err: CatalogError) -> Status {
        err.into()
    }

    #[tokio::test]
    async fn admin_creates_and_reads_back() {
        let (service, _) = service();
        let product = seeded(&service).await;
        assert!(product.is_active);
        assert_eq!(service.get_product(&product.id.to_string()).await.unwrap(), product);
    }

    #[tokio::test]
    async fn mutations_require_admin() {
        let (service, _) = service();
        let err = service
            .create_product(Some("customer-token"), Deadline::none(), bike("x", 1, ProductKind::Road))
            .await
            .unwrap_err();
        assert_eq!(status(err).code, Code::PermissionDenied);

        let err = service
            .create_product(None, Deadline::none(), bike("x", 1, ProductKind::Road))
            .await
            .unwrap_err();
        assert_eq!(status(err).code, Code::Unauthenticated);

        let product = seeded(&service).await;
        let err = service
            .delete_product(Some("customer-token"), Deadline::none(), &product.id.to_string())
            .await
            .unwrap_err();
        assert_eq!(status(err).code, Code::PermissionDenied);
        assert!(service.get_product(&product.id.to_string()).await.is_ok());
    }

    #[tokio::test]
    async fn update_and_delete() {
        let (service, _) = service();
        let product = seeded(&service).await;
        let id = product.id.to_string();

        let patch = ProductPatch {
            price: Some(Money::from_cents(90_00)),
            color: Some("green".to_string()),
            ..Default::default()
        };
        let updated = service
            .update_product(ADMIN, Deadline::none(), &id, patch)
            .await
            .unwrap();
        assert_eq!(updated.price, Money::from_cents(90_00));
        assert_eq!(updated.color, "green");
        assert_eq!(updated.name, product.name);

        service.delete_product(ADMIN, Deadline::none(), &id).await.unwrap();
        let err = service.get_product(&id).await.unwrap_err();
        assert_eq!(status(err).code, Code::NotFound);
        let err = service.delete_product(ADMIN, Deadline::none(), &id).await.unwrap_err();
        assert_eq!(status(err).code, Code::NotFound);
    }

    #[tokio::test]
    async fn update_unknown_product_is_not_found() {
        let (service, _) = service();
        let patch = ProductPatch {
            name: Some("New".to_string()),
            ..Default::default()
        };
        let err = service
            .update_product(ADMIN, Deadline::none(), "missing", patch)
            .await
            .unwrap_err();
        assert_eq!(status(err).code, Code::NotFound);
    }

    #[tokio::test]
    async fn change_stock_validates_input() {
        let (service, _) = service();
        let product = seeded(&service).await;

        let err = service.change_stock("", -1, None).await.unwrap_err();
        assert_eq!(status(err).code, Code::InvalidArgument);
        let err = service
            .change_stock(&product.id.to_string(), 0, None)
            .await
            .unwrap_err();
        assert_eq!(status(err).code, Code::InvalidArgument);
        let err = service.change_stock("missing", -1, Some(&OrderLine::order("o1"))).await.unwrap_err();
        assert_eq!(status(err).code, Code::NotFound);
    }

    #[tokio::test]
    async fn change_stock_is_idempotent_per_order() {
        let (service, bus) = service();
        let product = seeded(&service).await;
        let id = product.id.to_string();

        let order_1 = OrderLine::order("order-1");
        let after = service.change_stock(&id, -3, Some(&order_1)).await.unwrap();
        assert_eq!(after.quantity, 7);
        let again = service.change_stock(&id, -3, Some(&order_1)).await.unwrap();
        assert_eq!(again.quantity, 7);

        let other = service
            .change_stock(&id, -2, Some(&OrderLine::order("order-2")))
            .await
            .unwrap();
        assert_eq!(other.quantity, 5);

        let notices = bus.published(topics::ORDER_PROCESSED).await;
        assert_eq!(notices.len(), 2);
        let first: ProcessedEvent = notices[0].decode().unwrap();
        assert_eq!(first.order_id, "order-1");
        assert_eq!(first.message, "Order processed and stock updated");
    }

    #[tokio::test]
    async fn lines_of_one_order_apply_separately() {
        let (service, bus) = service();
        let product = seeded(&service).await;
        let id = product.id.to_string();

        let first = OrderLine::item("order-1", 0);
        let second = OrderLine::item("order-1", 2);
        service.change_stock(&id, -2, Some(&first)).await.unwrap();
        service.change_stock(&id, -1, Some(&second)).await.unwrap();
        let repeat = service.change_stock(&id, -2, Some(&first)).await.unwrap();
        assert_eq!(repeat.quantity, 7);
        assert!(repeat.has_applied("order-1#0"));
        assert!(repeat.has_applied("order-1#2"));

        let notices = bus.published(topics::ORDER_PROCESSED).await;
        assert_eq!(notices.len(), 2);
        for notice in notices {
            let notice: ProcessedEvent = notice.decode().unwrap();
            assert_eq!(notice.order_id, "order-1");
        }
    }

    #[tokio::test]
    async fn stock_may_go_negative() {
        let (service, _) = service();
        let product = seeded(&service).await;
        let after = service
            .change_stock(&product.id.to_string(), -15, None)
            .await
            .unwrap();
        assert_eq!(after.quantity, -5);
    }

    #[tokio::test]
    async fn concurrent_decrements_are_not_lost() {
        let (service, _) = service();
        let product = seeded(&service).await;
        let id = product.id.to_string();

        let mut handles = Vec::new();
        for i in 0..10 {
            let service = service.clone();
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                service
                    .change_stock(&id, -1, Some(&OrderLine::order(format!("order-{i}"))))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(service.get_product(&id).await.unwrap().quantity, 0);
    }

    #[tokio::test]
    async fn publish_failure_does_not_fail_stock_change() {
        let (service, bus) = service();
        let product = seeded(&service).await;
        bus.set_fail_on_publish(true);

        let after = service
            .change_stock(&product.id.to_string(), 4, Some(&OrderLine::order("order-9")))
            .await
            .unwrap();
        assert_eq!(after.quantity, 14);
    }

    #[tokio::test]
    async fn list_filters_and_sorts() {
        let (service, _) = service();
        for (name, cents, kind) in [
            ("Climber", 300_00, ProductKind::Mountain),
            ("Commuter", 150_00, ProductKind::Hybrid),
            ("Sprinter", 200_00, ProductKind::Road),
        ] {
            service
                .create_product(ADMIN, Deadline::none(), bike(name, cents, kind))
                .await
                .unwrap();
        }

        let filter = ProductFilter {
            max_price: Some(Money::from_cents(250_00)),
            sort_by: Some(SortField::Price),
            descending: true,
            ..Default::default()
        };
        let names: Vec<String> = service
            .list_products(&filter)
            .await
            .unwrap()
            .map_ok(|p| p.name)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(names, vec!["Sprinter", "Commuter"]);

        let filter = ProductFilter {
            kinds: vec![ProductKind::Mountain],
            ..Default::default()
        };
        let found: Vec<Product> = service
            .list_products(&filter)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Climber");
    }

    #[tokio::test]
    async fn search_matches_name_or_description() {
        let (service, _) = service();
        seeded(&service).await;
        let mut trail = bike("Trail King", 250_00, ProductKind::Mountain);
        trail.description = "Full suspension for ROCKY descents".to_string();
        service.create_product(ADMIN, Deadline::none(), trail).await.unwrap();

        let hits: Vec<Product> = service
            .search_products("rocky", &ProductFilter::default())
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "Trail King");

        let all: Vec<Product> = service
            .search_products("  ", &ProductFilter::default())
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
    }
}
