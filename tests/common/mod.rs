//! Shared fixtures: a petstore document and an in-process backend for it

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use mcp_capabilities::capability::{
    BuildReport, CapabilityFactory, HttpExecutor, OpenApiDocument,
};
use mcp_capabilities::registry::CapabilityRegistry;
use parking_lot::Mutex;
use serde_json::{Value, json};

pub const PETSTORE: &str = r##"
openapi: 3.1.0
info:
  title: Petstore
  version: "1.0"
servers:
  - url: https://petstore.example.com
paths:
  /pets:
    get:
      operationId: listPets
      summary: List all pets
      parameters:
        - name: limit
          in: query
          schema: {type: integer, default: 20}
      responses:
        200: {description: A paged array of pets}
  /pets/{petId}:
    get:
      operationId: showPetById
      summary: Info for a specific pet
      parameters:
        - name: petId
          in: path
          required: true
          schema: {type: integer}
      responses:
        200: {description: Expected response to a valid request}
  /items/:
    post:
      operationId: create_item
      summary: Create an item
      requestBody:
        required: true
        content:
          application/json:
            schema: {$ref: "#/components/schemas/Item"}
      responses:
        201: {description: Created}
  /broken/{id}:
    get:
      operationId: broken
      summary: Declares no path parameter
components:
  schemas:
    Item:
      type: object
      required: [name, price]
      properties:
        name: {type: string}
        price: {type: number}
        is_offer: {type: [boolean, "null"]}
"##;

/// Requests seen by the backend: (method, path and query, body)
pub type Seen = Arc<Mutex<Vec<(String, String, Option<Value>)>>>;

pub fn backend(seen: &Seen) -> Router {
    let list_seen = Arc::clone(seen);
    let show_seen = Arc::clone(seen);
    let items_seen = Arc::clone(seen);

    Router::new()
        .route(
            "/pets",
            get(move |Query(query): Query<HashMap<String, String>>| {
                let seen = Arc::clone(&list_seen);
                async move {
                    let uri = match query.get("limit") {
                        Some(limit) => format!("/pets?limit={limit}"),
                        None => "/pets".to_string(),
                    };
                    seen.lock().push(("GET".into(), uri, None));
                    Json(json!([{"id": 1, "name": "Rex"}, {"id": 2, "name": "Tom"}]))
                }
            }),
        )
        .route(
            "/pets/{pet_id}",
            get(move |Path(pet_id): Path<u64>| {
                let seen = Arc::clone(&show_seen);
                async move {
                    seen.lock()
                        .push(("GET".into(), format!("/pets/{pet_id}"), None));
                    if pet_id == 999 {
                        return Err((StatusCode::NOT_FOUND, "pet not found"));
                    }
                    Ok(Json(json!({"id": pet_id, "name": "Rex"})))
                }
            }),
        )
        .route(
            "/items/",
            post(move |Json(body): Json<Value>| {
                let seen = Arc::clone(&items_seen);
                async move {
                    seen.lock()
                        .push(("POST".into(), "/items/".into(), Some(body.clone())));
                    (StatusCode::CREATED, Json(json!({"id": 7, "item": body})))
                }
            }),
        )
}

/// Registry populated from [`PETSTORE`] against the in-process backend
pub fn petstore_registry(name: &str, seen: &Seen) -> (CapabilityRegistry, BuildReport) {
    let executor = HttpExecutor::in_process(backend(seen)).unwrap();
    let factory = CapabilityFactory::new(Arc::new(executor));
    let registry = CapabilityRegistry::new(name);
    let report = factory.populate(OpenApiDocument::parse(PETSTORE).unwrap(), &registry);
    (registry, report)
}
