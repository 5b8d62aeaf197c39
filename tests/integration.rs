use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use trip_planner::api::rest::router;
use trip_planner::models::user::{NewUser, Role, User};
use trip_planner::state::AppState;
use trip_planner::store::{EntityStore, StoreTx};

struct TestApp {
    app: Router,
    admin: Uuid,
    planner: Uuid,
    creator: Uuid,
    viewer: Uuid,
}

fn seed_user(state: &AppState, email: &str, role: Role) -> Uuid {
    let user = User::new(NewUser {
        email: email.to_string(),
        full_name: email.to_string(),
        role,
    })
    .unwrap();

    let mut tx = state.store.begin().unwrap();
    tx.insert_user(user.clone()).unwrap();
    tx.commit().unwrap();
    user.id
}

fn setup() -> TestApp {
    let state = AppState::new(1024);
    let admin = seed_user(&state, "admin@example.com", Role::Admin);
    let planner = seed_user(&state, "planner@example.com", Role::TripPlanner);
    let creator = seed_user(&state, "creator@example.com", Role::DeliveryCreator);
    let viewer = seed_user(&state, "viewer@example.com", Role::Viewer);

    TestApp {
        app: router(Arc::new(state)),
        admin,
        planner,
        creator,
        viewer,
    }
}

fn request(method: &str, uri: &str, user: Option<Uuid>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header("x-user-id", user.to_string());
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

impl TestApp {
    async fn call(
        &self,
        method: &str,
        uri: &str,
        user: Uuid,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let response = self
            .app
            .clone()
            .oneshot(request(method, uri, Some(user), body))
            .await
            .unwrap();
        let status = response.status();
        (status, body_json(response).await)
    }

    async fn create_vehicle(&self, plate: &str, weight: f64, volume: f64) -> String {
        let (status, body) = self
            .call(
                "POST",
                "/vehicles",
                self.admin,
                Some(json!({
                    "name": "Van",
                    "license_plate": plate,
                    "capacity_weight": weight,
                    "capacity_volume": volume
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        body["id"].as_str().unwrap().to_string()
    }

    async fn create_delivery(&self, weight: f64, volume: f64) -> String {
        let (status, body) = self
            .call(
                "POST",
                "/deliveries",
                self.creator,
                Some(json!({
                    "customer_name": "Ada",
                    "address": "1 Main St",
                    "location": { "lat": 52.52, "lng": 13.405 },
                    "scheduled_at": "2030-01-01T10:00:00Z",
                    "weight": weight,
                    "volume": volume
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        body["id"].as_str().unwrap().to_string()
    }

    async fn delivery_status(&self, id: &str) -> Value {
        let (_, body) = self
            .call("GET", &format!("/deliveries/{id}"), self.viewer, None)
            .await;
        body["status"].clone()
    }

    async fn vehicle_status(&self, id: &str) -> Value {
        let (_, body) = self
            .call("GET", &format!("/vehicles/{id}"), self.viewer, None)
            .await;
        body["status"].clone()
    }
}

fn trip_body<S: AsRef<str>>(vehicle: &str, deliveries: &[S]) -> Value {
    let specs: Vec<Value> = deliveries
        .iter()
        .enumerate()
        .map(|(index, id)| json!({ "delivery_id": id.as_ref(), "sequence_order": index + 1 }))
        .collect();
    json!({
        "name": "Morning run",
        "vehicle_id": vehicle,
        "planned_start": "2030-01-01T08:00:00Z",
        "deliveries": specs
    })
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn health_returns_counts() {
    let t = setup();
    let response = t
        .app
        .oneshot(request("GET", "/health", None, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["users"], 4);
    assert_eq!(body["deliveries"], 0);
    assert_eq!(body["vehicles"], 0);
    assert_eq!(body["trips"], 0);
    assert_eq!(body["assignments"], 0);
}

#[tokio::test]
async fn metrics_returns_prometheus_format() {
    let t = setup();
    let response = t
        .app
        .oneshot(request("GET", "/metrics", None, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.contains("text/plain"));

    let body = body_string(response).await;
    assert!(body.contains("active_trips"));
}

#[tokio::test]
async fn missing_or_unknown_user_is_unauthorized() {
    let t = setup();

    let response = t
        .app
        .clone()
        .oneshot(request("GET", "/trips", None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let (status, _) = t.call("GET", "/trips", Uuid::new_v4(), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let response = t
        .app
        .oneshot(
            Request::builder()
                .uri("/trips")
                .header("x-user-id", "not-a-uuid")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn roles_gate_each_action() {
    let t = setup();

    let (status, _) = t
        .call(
            "POST",
            "/vehicles",
            t.planner,
            Some(json!({
                "name": "Van",
                "license_plate": "AB-123",
                "capacity_weight": 100.0,
                "capacity_volume": 10.0
            })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let vehicle = t.create_vehicle("AB-123", 100.0, 10.0).await;
    let delivery = t.create_delivery(10.0, 1.0).await;

    let (status, body) = t
        .call(
            "POST",
            "/trips",
            t.creator,
            Some(trip_body(&vehicle, &[&delivery])),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body["error"].as_str().unwrap().contains("delivery_creator"));

    let (status, _) = t.call("GET", "/users", t.planner, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = t.call("GET", "/deliveries", t.viewer, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, _) = t
        .call(
            "DELETE",
            &format!("/deliveries/{delivery}"),
            t.viewer,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn delivery_crud() {
    let t = setup();
    let id = t.create_delivery(12.5, 0.4).await;

    let (status, body) = t
        .call("GET", &format!("/deliveries/{id}"), t.viewer, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "pending");
    assert_eq!(body["weight"], 12.5);
    assert_eq!(body["created_by"], t.creator.to_string());

    let (status, body) = t
        .call(
            "PUT",
            &format!("/deliveries/{id}"),
            t.creator,
            Some(json!({ "notes": "leave at door" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["notes"], "leave at door");

    let (status, _) = t
        .call(
            "PUT",
            &format!("/deliveries/{id}"),
            t.creator,
            Some(json!({ "weight": -1.0 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = t
        .call("DELETE", &format!("/deliveries/{id}"), t.creator, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], true);

    let (status, _) = t
        .call("GET", &format!("/deliveries/{id}"), t.viewer, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn create_delivery_with_blank_customer_returns_400() {
    let t = setup();
    let (status, body) = t
        .call(
            "POST",
            "/deliveries",
            t.creator,
            Some(json!({
                "customer_name": "  ",
                "address": "1 Main St",
                "scheduled_at": "2030-01-01T10:00:00Z",
                "weight": 1.0,
                "volume": 1.0
            })),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn duplicate_license_plate_conflicts() {
    let t = setup();
    t.create_vehicle("XY-999", 100.0, 10.0).await;

    let (status, _) = t
        .call(
            "POST",
            "/vehicles",
            t.admin,
            Some(json!({
                "name": "Other van",
                "license_plate": "xy-999",
                "capacity_weight": 50.0,
                "capacity_volume": 5.0
            })),
        )
        .await;

    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn trip_create_replace_delete_flow() {
    let t = setup();
    let vehicle = t.create_vehicle("TR-001", 100.0, 10.0).await;
    let d1 = t.create_delivery(20.0, 1.0).await;
    let d2 = t.create_delivery(30.0, 1.0).await;
    let d3 = t.create_delivery(10.0, 1.0).await;

    let (status, trip) = t
        .call("POST", "/trips", t.planner, Some(trip_body(&vehicle, &[&d1, &d2])))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(trip["status"], "planned");
    assert_eq!(trip["total_weight"], 50.0);
    let trip_id = trip["id"].as_str().unwrap().to_string();

    assert_eq!(t.delivery_status(&d1).await, "assigned");
    assert_eq!(t.vehicle_status(&vehicle).await, "in_use");

    let (status, replaced) = t
        .call(
            "PUT",
            &format!("/trips/{trip_id}/deliveries"),
            t.planner,
            Some(json!({ "delivery_ids": [d3, d1] })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(replaced["trip"]["total_weight"], 30.0);
    assert_eq!(replaced["assignments"][0]["delivery_id"], d3.as_str());
    assert_eq!(replaced["assignments"][0]["sequence_order"], 1);
    assert_eq!(replaced["assignments"][1]["delivery_id"], d1.as_str());
    assert_eq!(replaced["assignments"][1]["sequence_order"], 2);
    assert_eq!(t.delivery_status(&d2).await, "pending");

    let (status, detail) = t
        .call("GET", &format!("/trips/{trip_id}"), t.viewer, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["stops"].as_array().unwrap().len(), 2);
    assert_eq!(detail["stops"][0]["delivery"]["id"], d3.as_str());
    assert_eq!(detail["route"]["unlocated_stops"], 0);

    let (status, list) = t.call("GET", "/trips", t.viewer, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list[0]["delivery_count"], 2);
    assert_eq!(list[0]["license_plate"], "TR-001");

    let (status, body) = t
        .call("DELETE", &format!("/trips/{trip_id}"), t.planner, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], true);

    assert_eq!(t.delivery_status(&d1).await, "pending");
    assert_eq!(t.delivery_status(&d3).await, "pending");
    assert_eq!(t.vehicle_status(&vehicle).await, "available");

    let (status, _) = t
        .call("DELETE", &format!("/trips/{trip_id}"), t.planner, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn over_capacity_trip_returns_400_with_details() {
    let t = setup();
    let vehicle = t.create_vehicle("CAP-01", 50.0, 10.0).await;
    let d1 = t.create_delivery(30.0, 1.0).await;
    let d2 = t.create_delivery(30.0, 1.0).await;

    let (status, body) = t
        .call("POST", "/trips", t.planner, Some(trip_body(&vehicle, &[&d1, &d2])))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "weight");
    assert_eq!(body["total"], 60.0);
    assert_eq!(body["capacity"], 50.0);

    let (_, trips) = t.call("GET", "/trips", t.viewer, None).await;
    assert!(trips.as_array().unwrap().is_empty());
    assert_eq!(t.delivery_status(&d1).await, "pending");
}

#[tokio::test]
async fn trip_with_unknown_vehicle_returns_404() {
    let t = setup();
    let d1 = t.create_delivery(1.0, 1.0).await;
    let ghost = Uuid::new_v4().to_string();

    let (status, _) = t
        .call("POST", "/trips", t.planner, Some(trip_body(&ghost, &[&d1])))
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn preview_reports_totals_without_writing() {
    let t = setup();
    let vehicle = t.create_vehicle("PRE-01", 50.0, 10.0).await;
    let d1 = t.create_delivery(25.0, 2.0).await;
    let d2 = t.create_delivery(25.0, 2.0).await;

    let (status, body) = t
        .call(
            "POST",
            "/trips/preview",
            t.planner,
            Some(json!({ "vehicle_id": vehicle, "delivery_ids": [d1, d2] })),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["total_weight"], 50.0);
    assert_eq!(t.delivery_status(&d1).await, "pending");
}

#[tokio::test]
async fn trip_status_and_delivery_events() {
    let t = setup();
    let vehicle = t.create_vehicle("RUN-01", 100.0, 10.0).await;
    let d1 = t.create_delivery(10.0, 1.0).await;
    let (_, trip) = t
        .call("POST", "/trips", t.planner, Some(trip_body(&vehicle, &[&d1])))
        .await;
    let trip_id = trip["id"].as_str().unwrap().to_string();

    let (status, _) = t
        .call(
            "PATCH",
            &format!("/trips/{trip_id}/status"),
            t.planner,
            Some(json!({ "status": "completed" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = t
        .call(
            "PATCH",
            &format!("/trips/{trip_id}/status"),
            t.planner,
            Some(json!({ "status": "in_progress" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "in_progress");

    let (status, body) = t
        .call(
            "PATCH",
            &format!("/deliveries/{d1}/status"),
            t.planner,
            Some(json!({ "status": "in_transit" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "in_transit");

    let (status, _) = t
        .call(
            "PUT",
            &format!("/deliveries/{d1}"),
            t.creator,
            Some(json!({ "weight": 99.0 })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = t
        .call(
            "PATCH",
            &format!("/deliveries/{d1}/status"),
            t.planner,
            Some(json!({ "status": "pending" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = t
        .call(
            "PATCH",
            &format!("/trips/{trip_id}/status"),
            t.planner,
            Some(json!({ "status": "completed" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");
    assert_eq!(t.vehicle_status(&vehicle).await, "available");
}

#[tokio::test]
async fn vehicle_in_use_cannot_be_deleted_or_freed() {
    let t = setup();
    let vehicle = t.create_vehicle("BUSY-1", 100.0, 10.0).await;
    let d1 = t.create_delivery(10.0, 1.0).await;
    t.call("POST", "/trips", t.planner, Some(trip_body(&vehicle, &[&d1])))
        .await;

    let (status, _) = t
        .call(
            "PATCH",
            &format!("/vehicles/{vehicle}/status"),
            t.planner,
            Some(json!({ "status": "available" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = t
        .call("DELETE", &format!("/vehicles/{vehicle}"), t.admin, None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = t
        .call(
            "PATCH",
            &format!("/vehicles/{vehicle}/status"),
            t.planner,
            Some(json!({ "status": "maintenance" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "maintenance");
}

#[tokio::test]
async fn admin_manages_users() {
    let t = setup();

    let (status, user) = t
        .call(
            "POST",
            "/users",
            t.admin,
            Some(json!({ "email": "New.Driver@Example.com", "full_name": "New Driver" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(user["email"], "new.driver@example.com");
    assert_eq!(user["role"], "viewer");
    let user_id = user["id"].as_str().unwrap().to_string();

    let (status, _) = t
        .call(
            "POST",
            "/users",
            t.admin,
            Some(json!({ "email": "new.driver@example.com", "full_name": "Dup" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = t
        .call(
            "PATCH",
            &format!("/users/{user_id}/role"),
            t.admin,
            Some(json!({ "role": "trip_planner" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], "trip_planner");

    let (status, _) = t
        .call(
            "PATCH",
            &format!("/users/{user_id}/active"),
            t.admin,
            Some(json!({ "is_active": false })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let deactivated = Uuid::parse_str(&user_id).unwrap();
    let (status, _) = t.call("GET", "/trips", deactivated, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = t
        .call(
            "PATCH",
            &format!("/users/{}/active", t.admin),
            t.admin,
            Some(json!({ "is_active": false })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, users) = t.call("GET", "/users", t.admin, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(users.as_array().unwrap().len(), 5);
}

async fn metrics_body(t: &TestApp) -> String {
    let response = t
        .app
        .clone()
        .oneshot(request("GET", "/metrics", None, None))
        .await
        .unwrap();
    body_string(response).await
}

#[tokio::test]
async fn utilization_tracks_active_trips_of_a_vehicle() {
    let t = setup();
    let vehicle = t.create_vehicle("UTIL-1", 100.0, 10.0).await;
    let d1 = t.create_delivery(20.0, 1.0).await;
    let d2 = t.create_delivery(30.0, 1.0).await;

    let (_, first) = t
        .call("POST", "/trips", t.planner, Some(trip_body(&vehicle, &[&d1])))
        .await;
    let (_, second) = t
        .call("POST", "/trips", t.planner, Some(trip_body(&vehicle, &[&d2])))
        .await;

    let series = format!("vehicle_weight_utilization{{vehicle_id=\"{vehicle}\"}}");
    let body = metrics_body(&t).await;
    assert!(body.contains(&format!("{series} 0.5")));

    let first_id = first["id"].as_str().unwrap().to_string();
    t.call(
        "PATCH",
        &format!("/trips/{first_id}/status"),
        t.planner,
        Some(json!({ "status": "cancelled" })),
    )
    .await;
    let body = metrics_body(&t).await;
    assert!(body.contains(&format!("{series} 0.3")));

    let second_id = second["id"].as_str().unwrap().to_string();
    let (status, _) = t
        .call("DELETE", &format!("/trips/{second_id}"), t.planner, None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let body = metrics_body(&t).await;
    assert!(!body.contains(&series));
    assert_eq!(t.vehicle_status(&vehicle).await, "available");
}

#[tokio::test]
async fn single_record_reads_do_not_wait_on_writers() {
    let state = Arc::new(AppState::new(16));
    let viewer = seed_user(&state, "reader@example.com", Role::Viewer);
    let app = router(state.clone());

    let delivery = trip_planner::models::delivery::Delivery::new(
        trip_planner::models::delivery::NewDelivery {
            customer_name: "Ada".to_string(),
            customer_phone: None,
            address: "1 Main St".to_string(),
            location: None,
            scheduled_at: chrono::Utc::now(),
            weight: 1.0,
            volume: 1.0,
            notes: None,
        },
        viewer,
    )
    .unwrap();
    let mut tx = state.store.begin().unwrap();
    tx.insert_delivery(delivery.clone()).unwrap();
    tx.commit().unwrap();

    // A writer holds the store open while the read is served.
    let open = state.store.begin().unwrap();
    let response = app
        .oneshot(request(
            "GET",
            &format!("/deliveries/{}", delivery.id),
            Some(viewer),
            None,
        ))
        .await
        .unwrap();
    drop(open);

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "pending");
}
