//! Integration tests for the API server.

use std::sync::OnceLock;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use domain::CheckoutPolicy;
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use store::MemoryStore;
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

fn setup() -> axum::Router {
    let state = api::create_default_state(MemoryStore::new(), CheckoutPolicy::default());
    api::create_app(state, get_metrics_handle())
}

enum Caller<'a> {
    Anonymous,
    Customer(&'a str),
    Staff,
}

async fn send(
    app: &axum::Router,
    method: &str,
    uri: &str,
    caller: Caller<'_>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    match caller {
        Caller::Anonymous => {}
        Caller::Customer(user) => {
            builder = builder
                .header("x-user-id", user)
                .header("x-user-email", format!("{user}@example.com"));
        }
        Caller::Staff => {
            builder = builder
                .header("x-user-id", "admin")
                .header("x-user-role", "staff");
        }
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

async fn create_variant(app: &axum::Router, sku: &str, price: &str, stock: i64) -> String {
    let (status, json) = send(
        app,
        "POST",
        "/variants",
        Caller::Staff,
        Some(json!({"sku": sku, "price": price, "stock": stock})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{json}");
    json["id"].as_str().unwrap().to_string()
}

async fn create_promotion(app: &axum::Router, code: &str, rule_type: &str, value: &str) {
    let (status, rule) = send(
        app,
        "POST",
        "/pricing-rules",
        Caller::Staff,
        Some(json!({"name": code, "rule_type": rule_type, "value": value})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{rule}");

    let (status, promotion) = send(
        app,
        "POST",
        "/promotions",
        Caller::Staff,
        Some(json!({"code": code, "name": code, "rule_id": rule["id"]})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{promotion}");
}

async fn add_item(app: &axum::Router, user: &str, variant_id: &str, qty: i64) -> (StatusCode, Value) {
    send(
        app,
        "POST",
        "/carts/me/items",
        Caller::Customer(user),
        Some(json!({"variant_id": variant_id, "qty": qty})),
    )
    .await
}

async fn variant_stock(app: &axum::Router, variant_id: &str) -> i64 {
    let (status, json) = send(
        app,
        "GET",
        &format!("/variants/{variant_id}"),
        Caller::Staff,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    json["stock"].as_i64().unwrap()
}

fn checkout_body() -> Value {
    json!({"shipping_address": {"line1": "1 Main St", "city": "Springfield"}})
}

mod system {
    use super::*;

    #[tokio::test]
    async fn test_health_check() {
        let app = setup();
        let (status, json) = send(&app, "GET", "/health", Caller::Anonymous, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let app = setup();
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers()["content-type"].to_str().unwrap();
        assert!(content_type.starts_with("text/plain"));
    }

    #[tokio::test]
    async fn test_missing_principal_is_unauthorized() {
        let app = setup();
        let (status, json) = send(&app, "GET", "/carts/me", Caller::Anonymous, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(json["error"].as_str().is_some());
    }

    #[tokio::test]
    async fn test_invalid_id_is_bad_request() {
        let app = setup();
        let (status, json) = send(&app, "GET", "/orders/not-a-uuid", Caller::Staff, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("Invalid ID"));
    }
}

mod carts {
    use super::*;

    #[tokio::test]
    async fn test_get_cart_creates_open_cart() {
        let app = setup();
        let (status, first) = send(&app, "GET", "/carts/me", Caller::Customer("alice"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["status"], "open");
        assert_eq!(first["items"], json!([]));
        assert_eq!(first["total"], "0.00");

        let (_, second) = send(&app, "GET", "/carts/me", Caller::Customer("alice"), None).await;
        assert_eq!(first["id"], second["id"]);
    }

    #[tokio::test]
    async fn test_sequential_adds_merge_into_one_line() {
        let app = setup();
        let variant = create_variant(&app, "A", "10.00", 10).await;

        let (status, _) = add_item(&app, "alice", &variant, 2).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, item) = add_item(&app, "alice", &variant, 3).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(item["qty"], 5);

        let (_, cart) = send(&app, "GET", "/carts/me", Caller::Customer("alice"), None).await;
        assert_eq!(cart["items"].as_array().unwrap().len(), 1);
        assert_eq!(cart["items"][0]["line_total"], "50.00");
        assert_eq!(cart["total"], "50.00");
    }

    #[tokio::test]
    async fn test_add_beyond_stock_is_rejected() {
        let app = setup();
        let variant = create_variant(&app, "A", "10.00", 5).await;

        let (status, _) = add_item(&app, "alice", &variant, 3).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, json) = add_item(&app, "alice", &variant, 3).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().is_some());

        let (_, cart) = send(&app, "GET", "/carts/me", Caller::Customer("alice"), None).await;
        assert_eq!(cart["items"][0]["qty"], 3);
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request_with_json_error() {
        let app = setup();
        let variant = create_variant(&app, "A", "10.00", 5).await;

        let (status, json) = send(
            &app,
            "POST",
            "/carts/me/items",
            Caller::Customer("alice"),
            Some(json!({ "variant_id": variant })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("qty"));

        let (status, json) = send(
            &app,
            "POST",
            "/carts/me/items",
            Caller::Customer("alice"),
            Some(json!({ "variant_id": variant, "qty": "two" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].is_string());

        let (status, json) = send(
            &app,
            "POST",
            "/carts/me/checkout",
            Caller::Customer("alice"),
            Some(json!("express")),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].is_string());
    }

    #[tokio::test]
    async fn test_unknown_variant_is_not_found() {
        let app = setup();
        let (status, _) = add_item(&app, "alice", &uuid::Uuid::new_v4().to_string(), 1).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_update_and_remove_item() {
        let app = setup();
        let variant = create_variant(&app, "A", "10.00", 5).await;
        let (_, item) = add_item(&app, "alice", &variant, 1).await;
        let uri = format!("/carts/me/items/{}", item["id"].as_str().unwrap());

        let (status, updated) = send(
            &app,
            "PATCH",
            &uri,
            Caller::Customer("alice"),
            Some(json!({"qty": 4})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["qty"], 4);

        let (status, _) = send(
            &app,
            "PATCH",
            &uri,
            Caller::Customer("alice"),
            Some(json!({"qty": 6})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            "PATCH",
            &uri,
            Caller::Customer("alice"),
            Some(json!({"qty": 0})),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = send(&app, "DELETE", &uri, Caller::Customer("alice"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_preview_promotion_does_not_mutate() {
        let app = setup();
        let variant = create_variant(&app, "A", "25.00", 10).await;
        create_promotion(&app, "SAVE10", "percentage", "10").await;
        add_item(&app, "alice", &variant, 4).await;

        let (status, quote) = send(
            &app,
            "POST",
            "/carts/me/apply-promotion",
            Caller::Customer("alice"),
            Some(json!({"code": "save10"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(quote["subtotal"], "100.00");
        assert_eq!(quote["discount"], "10.00");
        assert_eq!(quote["grand_total"], "90.00");

        let (status, quote) = send(
            &app,
            "POST",
            "/carts/me/apply-promotion",
            Caller::Customer("alice"),
            Some(json!({"code": "NOPE"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(quote["discount"], "0.00");
        assert!(!quote["rejection"].is_null());

        assert_eq!(variant_stock(&app, &variant).await, 10);
    }
}

mod checkout {
    use super::*;

    #[tokio::test]
    async fn test_checkout_creates_order() {
        let app = setup();
        let variant = create_variant(&app, "A", "10.00", 5).await;
        add_item(&app, "alice", &variant, 3).await;

        let (status, order) = send(
            &app,
            "POST",
            "/carts/me/checkout",
            Caller::Customer("alice"),
            Some(checkout_body()),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{order}");
        assert_eq!(order["status"], "pending");
        assert_eq!(order["subtotal"], "30.00");
        assert_eq!(order["grand_total"], "30.00");
        assert_eq!(order["billing_address"], checkout_body()["shipping_address"]);
        assert!(order["order_number"].as_str().unwrap().starts_with("ORD-"));
        assert_eq!(order["items"][0]["sku"], "A");
        assert_eq!(variant_stock(&app, &variant).await, 2);

        let (status, movements) = send(
            &app,
            "GET",
            &format!("/variants/{variant}/movements"),
            Caller::Staff,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(movements[0]["change"], -3);
        assert_eq!(movements[0]["reason"], "sale");
    }

    #[tokio::test]
    async fn test_second_checkout_conflicts() {
        let app = setup();
        let variant = create_variant(&app, "A", "10.00", 5).await;
        add_item(&app, "alice", &variant, 1).await;

        let (status, _) = send(
            &app,
            "POST",
            "/carts/me/checkout",
            Caller::Customer("alice"),
            Some(checkout_body()),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, _) = send(
            &app,
            "POST",
            "/carts/me/checkout",
            Caller::Customer("alice"),
            Some(checkout_body()),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(variant_stock(&app, &variant).await, 4);
    }

    #[tokio::test]
    async fn test_empty_cart_is_bad_request() {
        let app = setup();
        send(&app, "GET", "/carts/me", Caller::Customer("alice"), None).await;
        let (status, _) = send(
            &app,
            "POST",
            "/carts/me/checkout",
            Caller::Customer("alice"),
            Some(checkout_body()),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_checkout_with_fixed_promotion_and_extras() {
        let app = setup();
        let variant = create_variant(&app, "A", "15.00", 5).await;
        create_promotion(&app, "FLAT20", "fixed", "20").await;
        add_item(&app, "alice", &variant, 1).await;

        let mut body = checkout_body();
        body["promotion_code"] = json!("FLAT20");
        body["shipping_total"] = json!("4.99");
        body["tax_total"] = json!("1.20");
        let (status, order) = send(
            &app,
            "POST",
            "/carts/me/checkout",
            Caller::Customer("alice"),
            Some(body),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{order}");
        assert_eq!(order["discount_total"], "15.00");
        assert_eq!(order["grand_total"], "6.19");
        assert_eq!(order["promotion_code"], "FLAT20");
    }

    #[tokio::test]
    async fn test_unknown_promotion_fails_checkout() {
        let app = setup();
        let variant = create_variant(&app, "A", "15.00", 5).await;
        add_item(&app, "alice", &variant, 1).await;

        let mut body = checkout_body();
        body["promotion_code"] = json!("NOPE");
        let (status, _) = send(
            &app,
            "POST",
            "/carts/me/checkout",
            Caller::Customer("alice"),
            Some(body),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(variant_stock(&app, &variant).await, 5);
    }

    #[tokio::test]
    async fn test_missing_shipping_address_is_bad_request() {
        let app = setup();
        let variant = create_variant(&app, "A", "15.00", 5).await;
        add_item(&app, "alice", &variant, 1).await;

        let (status, _) = send(
            &app,
            "POST",
            "/carts/me/checkout",
            Caller::Customer("alice"),
            Some(json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}

mod orders {
    use super::*;

    async fn place_order(app: &axum::Router, user: &str, variant: &str) -> String {
        add_item(app, user, variant, 2).await;
        let (status, order) = send(
            app,
            "POST",
            "/carts/me/checkout",
            Caller::Customer(user),
            Some(checkout_body()),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        order["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_order_visibility() {
        let app = setup();
        let variant = create_variant(&app, "A", "10.00", 10).await;
        let order_id = place_order(&app, "alice", &variant).await;
        let uri = format!("/orders/{order_id}");

        let (status, mine) = send(&app, "GET", "/orders/me", Caller::Customer("alice"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(mine.as_array().unwrap().len(), 1);

        let (status, _) = send(&app, "GET", &uri, Caller::Customer("alice"), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&app, "GET", &uri, Caller::Customer("bob"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app, "GET", &uri, Caller::Staff, None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(&app, "GET", "/orders", Caller::Customer("alice"), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, all) = send(&app, "GET", "/orders", Caller::Staff, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(all.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_restocks() {
        let app = setup();
        let variant = create_variant(&app, "A", "10.00", 10).await;
        let order_id = place_order(&app, "alice", &variant).await;
        assert_eq!(variant_stock(&app, &variant).await, 8);
        let uri = format!("/orders/{order_id}/status");

        let (status, _) = send(
            &app,
            "PATCH",
            &uri,
            Caller::Customer("alice"),
            Some(json!({"status": "cancelled"})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, order) = send(
            &app,
            "PATCH",
            &uri,
            Caller::Staff,
            Some(json!({"status": "cancelled"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(order["status"], "cancelled");
        assert_eq!(variant_stock(&app, &variant).await, 10);

        let (status, _) = send(
            &app,
            "PATCH",
            &uri,
            Caller::Staff,
            Some(json!({"status": "paid"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, report) = send(
            &app,
            "GET",
            &format!("/variants/{variant}/reconciliation"),
            Caller::Staff,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["consistent"], true);
        assert_eq!(report["ledger_total"], 10);
    }
}

mod admin {
    use super::*;

    #[tokio::test]
    async fn test_catalog_requires_staff() {
        let app = setup();
        let (status, _) = send(
            &app,
            "POST",
            "/variants",
            Caller::Customer("alice"),
            Some(json!({"sku": "A", "price": "1.00"})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_duplicate_sku_conflicts() {
        let app = setup();
        create_variant(&app, "A", "1.00", 0).await;
        let (status, _) = send(
            &app,
            "POST",
            "/variants",
            Caller::Staff,
            Some(json!({"sku": "A", "price": "2.00"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_out_of_range_amounts_are_bad_requests() {
        let app = setup();
        let (status, json) = send(
            &app,
            "POST",
            "/variants",
            Caller::Staff,
            Some(json!({"sku": "HUGE", "price": "1000000000000000000000000000"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].is_string());

        let variant = create_variant(&app, "A", "1.00", 10).await;
        let (status, _) = send(
            &app,
            "POST",
            "/inventory/movements",
            Caller::Staff,
            Some(json!({"variant_id": variant, "change": i64::MAX, "reason": "restock"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(variant_stock(&app, &variant).await, 10);
    }

    #[tokio::test]
    async fn test_manual_movement_and_delete() {
        let app = setup();
        let variant = create_variant(&app, "A", "1.00", 2).await;

        let (status, movement) = send(
            &app,
            "POST",
            "/inventory/movements",
            Caller::Staff,
            Some(json!({
                "variant_id": variant,
                "change": 5,
                "reason": "restock",
                "metadata": {"po": "PO-1"}
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{movement}");
        assert_eq!(movement["metadata"]["po"], "PO-1");
        assert_eq!(variant_stock(&app, &variant).await, 7);

        let uri = format!("/variants/{variant}");
        let (status, _) = send(&app, "DELETE", &uri, Caller::Staff, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, "GET", &uri, Caller::Staff, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_apply_promotion_summary() {
        let app = setup();
        create_promotion(&app, "SAVE10", "percentage", "10").await;

        let (status, summary) = send(
            &app,
            "POST",
            "/promotions/apply",
            Caller::Customer("alice"),
            Some(json!({"code": "save10"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(summary["code"], "SAVE10");
        assert_eq!(summary["available"], true);

        let (status, _) = send(
            &app,
            "POST",
            "/promotions/apply",
            Caller::Customer("alice"),
            Some(json!({"code": "NOPE"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_customer_profile_and_delete() {
        let app = setup();
        let (status, me) = send(&app, "GET", "/customers/me", Caller::Customer("alice"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["email"], "alice@example.com");
        let uri = format!("/customers/{}", me["id"].as_str().unwrap());

        let (status, _) = send(&app, "DELETE", &uri, Caller::Customer("alice"), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = send(&app, "DELETE", &uri, Caller::Staff, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, "DELETE", &uri, Caller::Staff, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
