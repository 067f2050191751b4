//! End-to-end tests of the OpenAPI bridge against an in-process backend

mod common;

use std::sync::Arc;

use common::{Seen, petstore_registry};
use mcp_capabilities::Error;
use mcp_capabilities::capability::CapabilityKind;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

#[tokio::test]
async fn template_read_extracts_and_coerces_path_parameter() {
    // GIVEN: the petstore registry
    let seen: Seen = Arc::default();
    let (registry, _) = petstore_registry("pets", &seen);

    // WHEN: reading a concrete URI of the showPetById template
    let resolution = registry.resolve("resource://openapi/showPetById/42").unwrap();
    let contents = registry
        .read_resource("resource://openapi/showPetById/42")
        .await
        .unwrap();

    // THEN: petId coerced to integer, one GET to /pets/42
    assert_eq!(resolution.arguments["petId"], json!(42));
    assert_eq!(
        resolution.capability.key(),
        "resource://openapi/showPetById/{petId}"
    );
    let body: Value = serde_json::from_str(contents.as_text().unwrap()).unwrap();
    assert_eq!(body, json!({"id": 42, "name": "Rex"}));
    assert_eq!(
        *seen.lock(),
        vec![("GET".to_string(), "/pets/42".to_string(), None)]
    );
}

#[tokio::test]
async fn uncoercible_placeholder_is_coercion_error_and_sends_nothing() {
    let seen: Seen = Arc::default();
    let (registry, _) = petstore_registry("pets", &seen);

    let err = registry
        .read_resource("resource://openapi/showPetById/rex")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Coercion { ref parameter, ref value, .. } if parameter == "petId" && value == "rex"
    ));
    assert!(seen.lock().is_empty());
}

#[tokio::test]
async fn unknown_uri_is_not_found() {
    let seen: Seen = Arc::default();
    let (registry, _) = petstore_registry("pets", &seen);

    let err = registry
        .read_resource("resource://openapi/nothing")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ResourceNotFound(_)));
}

#[tokio::test]
async fn backend_error_status_is_propagated() {
    let seen: Seen = Arc::default();
    let (registry, _) = petstore_registry("pets", &seen);

    let err = registry
        .read_resource("resource://openapi/showPetById/999")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Backend { status: Some(404), body: Some(ref b), .. } if b == "pet not found"
    ));
    // registry untouched by the failure
    assert_eq!(registry.list_resource_templates().len(), 1);
}

#[tokio::test]
async fn post_sends_only_supplied_body_fields() {
    // GIVEN
    let seen: Seen = Arc::default();
    let (registry, _) = petstore_registry("pets", &seen);

    // WHEN: calling the action without the optional is_offer
    let content = registry
        .call_tool("create_item", json!({"name": "MCP Special", "price": 99.99}))
        .await
        .unwrap();

    // THEN: exactly one POST /items/ with exactly the supplied fields
    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    let (method, path, body) = &seen[0];
    assert_eq!(method, "POST");
    assert_eq!(path, "/items/");
    let body = body.as_ref().unwrap();
    assert_eq!(body, &json!({"name": "MCP Special", "price": 99.99}));
    assert!(body.get("is_offer").is_none());

    let result: Value = serde_json::from_str(content[0].as_text().unwrap()).unwrap();
    assert_eq!(result["id"], 7);
}

#[tokio::test]
async fn missing_required_argument_is_rejected_before_sending() {
    let seen: Seen = Arc::default();
    let (registry, _) = petstore_registry("pets", &seen);

    let err = registry
        .call_tool("create_item", json!({"name": "No price"}))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArguments(ref m) if m.contains("price")));
    assert!(seen.lock().is_empty());
}

#[tokio::test]
async fn static_resource_omits_absent_query_parameter() {
    let seen: Seen = Arc::default();
    let (registry, _) = petstore_registry("pets", &seen);

    let contents = registry
        .read_resource("resource://openapi/listPets")
        .await
        .unwrap();

    let pets: Value = serde_json::from_str(contents.as_text().unwrap()).unwrap();
    assert_eq!(pets.as_array().unwrap().len(), 2);
    assert_eq!(seen.lock()[0].1, "/pets");
}

#[test]
fn tool_listing_exposes_synthesized_schema() {
    let seen: Seen = Arc::default();
    let (registry, _) = petstore_registry("pets", &seen);

    let tools = registry.list_tools();
    assert_eq!(tools.len(), 1);
    let tool = &tools[0];
    assert_eq!(tool.name, "create_item");
    assert_eq!(tool.description.as_deref(), Some("Create an item"));
    let properties: Vec<&String> = tool.input_schema["properties"]
        .as_object()
        .unwrap()
        .keys()
        .collect();
    assert_eq!(properties, ["name", "price", "is_offer"]);
    assert_eq!(tool.input_schema["required"], json!(["name", "price"]));

    let resources = registry.list_resources();
    assert_eq!(resources[0].uri, "resource://openapi/listPets");
    assert_eq!(resources[0].mime_type.as_deref(), Some("application/json"));
}

#[test]
fn broken_operation_is_reported_without_blocking_the_rest() {
    let seen: Seen = Arc::default();
    let (registry, report) = petstore_registry("pets", &seen);

    assert_eq!(
        report.registered,
        [
            "resource://openapi/listPets",
            "resource://openapi/showPetById/{petId}",
            "create_item"
        ]
    );
    assert_eq!(report.errors.len(), 1);
    assert!(matches!(report.errors[0], Error::TemplateDefinition { .. }));

    let kinds: Vec<CapabilityKind> = registry.snapshot().all().map(|c| c.kind()).collect();
    assert_eq!(
        kinds,
        [
            CapabilityKind::Action,
            CapabilityKind::StaticResource,
            CapabilityKind::ResourceTemplate
        ]
    );
}
