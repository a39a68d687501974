//! Integration tests for the placement and checkout sagas.
//!
//! The first half wires the sagas to in-process services sharing one store.
//! The second half runs them against small axum servers standing in for the
//! remote stock and orders services, exercising the HTTP clients.

use std::collections::HashMap;

use axum::extract::Query;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use common::{
    OrderCreatedResponse, OrderId, PlaceOrderRequest, ProductId, QuantityPayload, StockInfo, UserId,
};
use domain::{CartStore, Inventory, OrderLedger};
use kv_store::InMemoryKvStore;
use saga::{
    Checkout, ErrorKind, HttpOrdersService, HttpStockService, InjectedFailure, LocalOrdersService,
    LocalStockService, OrderPlacement, OrdersService, SagaError, StockService, http_client,
};

type LocalPlacement = OrderPlacement<InMemoryKvStore, LocalStockService<InMemoryKvStore>>;

struct TestHarness {
    store: InMemoryKvStore,
    placement: LocalPlacement,
    user: UserId,
}

impl TestHarness {
    fn new() -> Self {
        let store = InMemoryKvStore::new();
        let stock = LocalStockService::new(Inventory::new(store.clone()));
        let placement = OrderPlacement::new(OrderLedger::new(store.clone()), stock);
        Self {
            store,
            placement,
            user: UserId::new("user-1"),
        }
    }

    fn inventory(&self) -> Inventory<InMemoryKvStore> {
        Inventory::new(self.store.clone())
    }

    async fn stock(&self, product: &ProductId, quantity: i64) {
        self.inventory().put_stock(product, quantity).await.unwrap();
    }

    async fn quantity(&self, product: &ProductId) -> i64 {
        self.inventory().query_quantity(product).await.unwrap()
    }

    async fn orders(&self) -> usize {
        OrderLedger::new(self.store.clone())
            .list(&self.user)
            .await
            .unwrap()
            .len()
    }
}

mod placement {
    use super::*;

    #[tokio::test]
    async fn exact_stock_is_fully_consumed() {
        let h = TestHarness::new();
        let product = ProductId::new("P");
        h.stock(&product, 5).await;

        let order = h.placement.place(&h.user, &product, 5).await.unwrap();

        assert!(!order.id.as_str().is_empty());
        assert_eq!(h.quantity(&product).await, 0);
        assert_eq!(h.orders().await, 1);
    }

    #[tokio::test]
    async fn short_stock_leaves_no_trace() {
        let h = TestHarness::new();
        let product = ProductId::new("P");
        h.stock(&product, 3).await;

        let err = h.placement.place(&h.user, &product, 5).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InsufficientStock);
        assert_eq!(h.orders().await, 0);
        assert_eq!(h.quantity(&product).await, 3);
    }

    #[tokio::test]
    async fn transient_stock_failure_is_compensated() {
        let h = TestHarness::new();
        let product = ProductId::new("P");
        h.stock(&product, 5).await;
        h.placement
            .stock()
            .fail_next_drop(InjectedFailure::Unavailable);

        let err = h.placement.place(&h.user, &product, 1).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ServiceInternal);
        assert_eq!(h.orders().await, 0);
        assert_eq!(h.quantity(&product).await, 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_orders_never_oversell() {
        let h = TestHarness::new();
        let product = ProductId::new("P");
        h.stock(&product, 10).await;
        let placement = h.placement.clone();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let placement = placement.clone();
                let product = product.clone();
                let user = h.user.clone();
                tokio::spawn(async move { placement.place(&user, &product, 3).await })
            })
            .collect();

        let mut placed = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => placed += 1,
                Err(e) => assert_eq!(e.kind(), ErrorKind::InsufficientStock),
            }
        }

        // An order exists exactly when its stock was deducted.
        assert_eq!(placed, 3);
        assert_eq!(h.orders().await, 3);
        assert_eq!(h.quantity(&product).await, 1);
    }

    #[tokio::test]
    async fn cancel_is_not_repeatable() {
        let h = TestHarness::new();
        let product = ProductId::new("P");
        h.stock(&product, 4).await;
        let order = h.placement.place(&h.user, &product, 4).await.unwrap();

        h.placement.cancel(&h.user, &order.id).await.unwrap();
        assert_eq!(h.quantity(&product).await, 4);

        let err = h.placement.cancel(&h.user, &order.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(h.quantity(&product).await, 4);
    }
}

mod checkout {
    use super::*;

    #[tokio::test]
    async fn second_line_short_keeps_first_order_and_whole_cart() {
        let h = TestHarness::new();
        let cart = CartStore::new(h.store.clone());
        let checkout = Checkout::new(cart.clone(), LocalOrdersService::new(h.placement.clone()));
        let (first, second) = (ProductId::new("P1"), ProductId::new("P2"));
        h.stock(&first, 5).await;
        h.stock(&second, 1).await;
        cart.add(&h.user, &first, 2).await.unwrap();
        cart.add(&h.user, &second, 2).await.unwrap();

        let err = checkout.checkout(&h.user).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InsufficientStock);
        assert_eq!(h.orders().await, 1);
        assert_eq!(h.quantity(&first).await, 3);
        assert_eq!(h.quantity(&second).await, 1);
        let lines = cart.lines(&h.user).await.unwrap();
        assert!(lines.iter().any(|line| line.product_id == first));
        assert_eq!(lines.len(), 2);
    }

    #[tokio::test]
    async fn order_ids_follow_cart_order() {
        let h = TestHarness::new();
        let cart = CartStore::new(h.store.clone());
        let checkout = Checkout::new(cart.clone(), LocalOrdersService::new(h.placement.clone()));
        let products = [ProductId::new("B"), ProductId::new("A"), ProductId::new("C")];
        for product in &products {
            h.stock(product, 1).await;
            cart.add(&h.user, product, 1).await.unwrap();
        }

        let ids = checkout.checkout(&h.user).await.unwrap();

        let orders = OrderLedger::new(h.store.clone()).list(&h.user).await.unwrap();
        let by_id: HashMap<_, _> = orders.into_iter().map(|o| (o.id.clone(), o)).collect();
        let ordered: Vec<_> = ids.iter().map(|id| by_id[id].product_id.clone()).collect();
        assert_eq!(ordered, products.to_vec());
        assert!(cart.lines(&h.user).await.unwrap().is_empty());
    }
}

mod http_clients {
    use super::*;

    const AVAILABLE: i64 = 5;

    async fn spawn(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn product_of(params: &HashMap<String, String>) -> &str {
        params.get("product_id").map(String::as_str).unwrap_or("")
    }

    async fn fake_stock() -> String {
        async fn query(
            Query(params): Query<HashMap<String, String>>,
        ) -> Result<Json<StockInfo>, StatusCode> {
            match product_of(&params) {
                "ghost" => Err(StatusCode::NOT_FOUND),
                "broken" => Err(StatusCode::INTERNAL_SERVER_ERROR),
                id => Ok(Json(StockInfo {
                    product_id: ProductId::new(id),
                    quantity: AVAILABLE,
                })),
            }
        }

        async fn drop_units(
            Query(params): Query<HashMap<String, String>>,
            Json(payload): Json<QuantityPayload>,
        ) -> StatusCode {
            match product_of(&params) {
                "flaky" => StatusCode::INTERNAL_SERVER_ERROR,
                _ if payload.quantity <= 0 => StatusCode::BAD_REQUEST,
                _ if payload.quantity > AVAILABLE => StatusCode::NOT_ACCEPTABLE,
                _ => StatusCode::OK,
            }
        }

        async fn put(Json(payload): Json<QuantityPayload>) -> StatusCode {
            if payload.quantity <= 0 {
                StatusCode::BAD_REQUEST
            } else {
                StatusCode::OK
            }
        }

        spawn(
            Router::new()
                .route("/", get(query))
                .route("/drop", get(drop_units))
                .route("/put", get(put)),
        )
        .await
    }

    async fn fake_orders() -> String {
        async fn place(
            Json(body): Json<PlaceOrderRequest>,
        ) -> Result<(StatusCode, Json<OrderCreatedResponse>), StatusCode> {
            match body.product_id.as_str() {
                "ghost" => Err(StatusCode::BAD_REQUEST),
                "short" => Err(StatusCode::NOT_ACCEPTABLE),
                "broken" => Err(StatusCode::INTERNAL_SERVER_ERROR),
                id => Ok((
                    StatusCode::CREATED,
                    Json(OrderCreatedResponse {
                        order_id: OrderId::new(format!("order-{id}")),
                    }),
                )),
            }
        }

        spawn(Router::new().route("/", post(place))).await
    }

    fn stock_client(base_url: String) -> HttpStockService {
        HttpStockService::new(
            http_client(std::time::Duration::from_secs(5)).unwrap(),
            base_url,
        )
    }

    #[tokio::test]
    async fn stock_client_maps_statuses() {
        let stock = stock_client(fake_stock().await);

        assert_eq!(stock.query(&ProductId::new("P1")).await.unwrap(), AVAILABLE);
        assert!(matches!(
            stock.query(&ProductId::new("ghost")).await,
            Err(SagaError::ProductNotFound(_))
        ));
        assert!(matches!(
            stock.query(&ProductId::new("broken")).await,
            Err(SagaError::StockService(_))
        ));

        stock.drop_stock(&ProductId::new("P1"), 2).await.unwrap();
        assert!(matches!(
            stock.drop_stock(&ProductId::new("P1"), 9).await,
            Err(SagaError::InsufficientStock { requested: 9, .. })
        ));
        stock.put_stock(&ProductId::new("P1"), 2).await.unwrap();
    }

    #[tokio::test]
    async fn unreachable_stock_service_is_internal() {
        // Nothing listens on the discard port.
        let stock = stock_client("http://127.0.0.1:9".to_string());
        let err = stock.query(&ProductId::new("P1")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ServiceInternal);
    }

    #[tokio::test]
    async fn placement_over_http_compensates_on_remote_failure() {
        let store = InMemoryKvStore::new();
        let placement = OrderPlacement::new(
            OrderLedger::new(store.clone()),
            stock_client(fake_stock().await),
        );
        let user = UserId::new("user-1");

        let err = placement
            .place(&user, &ProductId::new("flaky"), 1)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ServiceInternal);
        assert!(placement.list(&user).await.unwrap().is_empty());

        let err = placement
            .place(&user, &ProductId::new("ghost"), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, SagaError::UnknownProduct(_)));

        placement
            .place(&user, &ProductId::new("P1"), 2)
            .await
            .unwrap();
        assert_eq!(placement.list(&user).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn orders_client_maps_statuses() {
        let orders = HttpOrdersService::new(
            http_client(std::time::Duration::from_secs(5)).unwrap(),
            fake_orders().await,
        );
        let user = UserId::new("user-1");

        let id = orders.place(&user, &ProductId::new("P1"), 1).await.unwrap();
        assert_eq!(id.as_str(), "order-P1");
        assert!(matches!(
            orders.place(&user, &ProductId::new("ghost"), 1).await,
            Err(SagaError::UnknownProduct(_))
        ));
        assert!(matches!(
            orders.place(&user, &ProductId::new("short"), 1).await,
            Err(SagaError::InsufficientStock { .. })
        ));
        assert!(matches!(
            orders.place(&user, &ProductId::new("broken"), 1).await,
            Err(SagaError::OrdersService(_))
        ));
    }
}

mod store_failures {
    use super::*;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use kv_store::{Entry, KvStore, KvStoreError, SetOptions, Version};

    /// In-memory store whose set removals fail for keys under an armed prefix.
    #[derive(Clone, Default)]
    struct FailingStore {
        inner: InMemoryKvStore,
        fail_set_remove: Arc<Mutex<Option<String>>>,
    }

    impl FailingStore {
        fn fail_set_remove_under(&self, prefix: &str) {
            *self.fail_set_remove.lock().unwrap() = Some(prefix.to_string());
        }
    }

    #[async_trait]
    impl KvStore for FailingStore {
        async fn get(&self, key: &str) -> kv_store::Result<Option<Entry>> {
            self.inner.get(key).await
        }

        async fn set(
            &self,
            key: &str,
            value: String,
            options: SetOptions,
        ) -> kv_store::Result<Version> {
            self.inner.set(key, value, options).await
        }

        async fn delete(&self, key: &str) -> kv_store::Result<bool> {
            self.inner.delete(key).await
        }

        async fn delete_at(&self, key: &str, expected: Version) -> kv_store::Result<bool> {
            self.inner.delete_at(key, expected).await
        }

        async fn set_add(&self, key: &str, member: &str) -> kv_store::Result<bool> {
            self.inner.set_add(key, member).await
        }

        async fn set_remove(&self, key: &str, members: &[String]) -> kv_store::Result<usize> {
            let armed = self.fail_set_remove.lock().unwrap().clone();
            if armed.is_some_and(|prefix| key.starts_with(&prefix)) {
                return Err(KvStoreError::Corrupt {
                    key: key.to_string(),
                    reason: "write refused".to_string(),
                });
            }
            self.inner.set_remove(key, members).await
        }

        async fn set_members(&self, key: &str) -> kv_store::Result<Vec<String>> {
            self.inner.set_members(key).await
        }

        async fn sorted_add(&self, key: &str, score: i64, member: &str) -> kv_store::Result<()> {
            self.inner.sorted_add(key, score, member).await
        }

        async fn sorted_remove(&self, key: &str, member: &str) -> kv_store::Result<bool> {
            self.inner.sorted_remove(key, member).await
        }

        async fn sorted_range_desc(
            &self,
            key: &str,
            max: Option<i64>,
            limit: usize,
        ) -> kv_store::Result<Vec<(String, i64)>> {
            self.inner.sorted_range_desc(key, max, limit).await
        }

        async fn ping(&self) -> kv_store::Result<()> {
            self.inner.ping().await
        }
    }

    type FailingPlacement = OrderPlacement<FailingStore, LocalStockService<FailingStore>>;

    fn placement(store: &FailingStore) -> FailingPlacement {
        let stock = LocalStockService::new(Inventory::new(store.clone()));
        OrderPlacement::new(OrderLedger::new(store.clone()), stock)
    }

    #[tokio::test]
    async fn failed_order_removal_keeps_order_and_fails_internally() {
        let store = FailingStore::default();
        let placement = placement(&store);
        let (user, product) = (UserId::new("user-1"), ProductId::new("P"));
        Inventory::new(store.clone())
            .put_stock(&product, 5)
            .await
            .unwrap();
        store.fail_set_remove_under("orders:");
        placement
            .stock()
            .fail_next_drop(InjectedFailure::Unavailable);

        let err = placement.place(&user, &product, 2).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ServiceInternal);
        assert!(matches!(
            err,
            SagaError::CompensationFailed { ref step, .. } if step == "delete_order"
        ));
        // The order could not be removed and no stock was deducted for it.
        let orders = placement.list(&user).await.unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].quantity, 2);
        assert_eq!(
            Inventory::new(store.clone())
                .query_quantity(&product)
                .await
                .unwrap(),
            5
        );
    }

    #[tokio::test]
    async fn failed_cart_clear_still_returns_orders() {
        let store = FailingStore::default();
        let cart = CartStore::new(store.clone());
        let checkout = Checkout::new(cart.clone(), LocalOrdersService::new(placement(&store)));
        let (user, product) = (UserId::new("user-1"), ProductId::new("P"));
        Inventory::new(store.clone())
            .put_stock(&product, 5)
            .await
            .unwrap();
        cart.add(&user, &product, 2).await.unwrap();
        store.fail_set_remove_under("cart:");

        let ids = checkout.checkout(&user).await.unwrap();

        assert_eq!(ids.len(), 1);
        assert_eq!(
            Inventory::new(store.clone())
                .query_quantity(&product)
                .await
                .unwrap(),
            3
        );
        // The lines that were ordered are left behind in the cart.
        let lines = cart.lines(&user).await.unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].quantity, 2);
    }
}
