//! The `items` resource: a full CRUD controller over [`ItemStore`].

use std::sync::Arc;

use async_trait::async_trait;

use routekit_core::{
    ConfigurationError, Field, FieldKind, ObjectSchema, Page, Typed, ValidationError,
};
use routekit_observability::Logger;

use super::store::{Attachment, Item, ItemPatch, ItemStore, NewItem, SortField};
use crate::controller::Controller;
use crate::error::ApiError;
use crate::orchestrator::{ComponentHealth, HealthCheckable, Initializable, RouteRegistrar, RouteTable};
use crate::route::{HttpMethod, RouteDescriptor};
use crate::routing::{ListQuery, RouteBuilder};

pub const ITEMS_BASE_PATH: &str = "/items";

const SORT_FIELDS: &str = "name, quantity, createdAt";

fn item_input_schema() -> ObjectSchema {
    ObjectSchema::new()
        .title("ItemInput")
        .field(Field::string("name").min_len(1).max_len(120))
        .field(Field::string("description").max_len(2000).optional())
        .field(Field::integer("quantity").min(0.0).optional())
        .field(Field::array("tags", FieldKind::string()).optional())
}

fn attachment_schema() -> ObjectSchema {
    ObjectSchema::new()
        .title("Attachment")
        .field(Field::string("fileName"))
        .field(Field::string("contentType").optional())
        .field(Field::integer("size"))
}

fn item_schema() -> ObjectSchema {
    ObjectSchema::new()
        .title("Item")
        .field(Field::uuid("id"))
        .field(Field::string("name"))
        .field(Field::string("description").optional())
        .field(Field::integer("quantity"))
        .field(Field::array("tags", FieldKind::string()))
        .field(Field::array("attachments", FieldKind::Object(attachment_schema())))
        .field(Field::uuid("owner").optional())
        .field(Field::string("createdAt"))
        .field(Field::string("updatedAt"))
}

fn sort_field(query: &ListQuery) -> Result<Option<(SortField, bool)>, ApiError> {
    match query.sort_key() {
        None => Ok(None),
        Some((name, descending)) => name
            .parse::<SortField>()
            .map(|field| Some((field, descending)))
            .map_err(|()| {
                ApiError::from(ValidationError::single(
                    "sort",
                    format!("Unsupported sort field; use one of {SORT_FIELDS}"),
                ))
            }),
    }
}

pub struct ItemsController {
    store: Arc<ItemStore>,
}

impl ItemsController {
    pub fn new(store: Arc<ItemStore>) -> Self {
        Self { store }
    }
}

impl Controller for ItemsController {
    fn base_path(&self) -> &str {
        ITEMS_BASE_PATH
    }

    fn init_routes(&self, routes: &mut RouteBuilder) -> Result<(), ConfigurationError> {
        let input = item_input_schema();

        let store = Arc::clone(&self.store);
        routes.list(
            "/",
            RouteDescriptor::new(&item_schema())
                .summary("List items")
                .description("Paginated items. `search` matches names and tags; `sort` takes a field, `-` for descending."),
            move |_ctx, query: ListQuery| {
                let store = Arc::clone(&store);
                async move {
                    let sort = sort_field(&query)?;
                    let all = store.query(query.search.as_deref(), sort)?;
                    Ok::<_, ApiError>(Page::from_slice(&all, &query.pagination))
                }
            },
        )?;

        let store = Arc::clone(&self.store);
        routes.get_by_id(
            "/:id",
            RouteDescriptor::new(&item_schema()).summary("Get an item"),
            move |_ctx, id| {
                let store = Arc::clone(&store);
                async move { store.get(id)?.ok_or_else(|| ApiError::not_found("Item")) }
            },
        )?;

        let store = Arc::clone(&self.store);
        routes.create(
            "/",
            RouteDescriptor::new(&item_schema())
                .request(Typed::<NewItem>::new(input.clone()))
                .secured()
                .summary("Create an item"),
            move |ctx, new: NewItem| {
                let store = Arc::clone(&store);
                async move {
                    let owner = ctx.require_user()?.id();
                    Ok::<Item, ApiError>(store.insert(new, Some(owner))?)
                }
            },
        )?;

        let store = Arc::clone(&self.store);
        routes.update(
            "/:id",
            RouteDescriptor::new(&item_schema())
                .request(Typed::<ItemPatch>::new(input.partial().title("ItemPatch")))
                .secured()
                .summary("Update an item")
                .description("Partial update; omitted fields keep their value."),
            move |_ctx, id, patch: ItemPatch| {
                let store = Arc::clone(&store);
                async move { store.update(id, patch)?.ok_or_else(|| ApiError::not_found("Item")) }
            },
        )?;

        let store = Arc::clone(&self.store);
        routes.delete(
            "/:id",
            RouteDescriptor::empty()
                .secured()
                .summary("Delete an item")
                .description("Requires the `admin` role. `deleted` is false when the item did not exist."),
            move |ctx, id| {
                let store = Arc::clone(&store);
                async move {
                    ctx.require_role(&["admin"])?;
                    Ok::<_, ApiError>(store.remove(id)?)
                }
            },
        )?;

        let store = Arc::clone(&self.store);
        routes.action_by_id(
            HttpMethod::Post,
            "/:id/attachments",
            RouteDescriptor::new(&item_schema())
                .request(ObjectSchema::new().title("AttachmentUpload").field(Field::string("note").optional()))
                .secured()
                .multipart()
                .summary("Attach files to an item"),
            move |ctx, id, _fields| {
                let store = Arc::clone(&store);
                async move {
                    if ctx.files.is_empty() {
                        return Err(ApiError::BadRequest("No file uploaded".to_string()));
                    }
                    let attachments = ctx
                        .files
                        .iter()
                        .map(|file| Attachment {
                            file_name: file.file_name.clone().unwrap_or_else(|| file.field.clone()),
                            content_type: file.content_type.clone(),
                            size: file.bytes.len() as u64,
                        })
                        .collect();
                    store.attach(id, attachments)?.ok_or_else(|| ApiError::not_found("Item"))
                }
            },
        )?;

        Ok(())
    }
}

/// Mounts [`ItemsController`]; the store itself is registered as a service.
pub struct ItemsModule {
    store: Arc<ItemStore>,
    logger: Arc<dyn Logger>,
}

impl ItemsModule {
    pub fn new(store: Arc<ItemStore>, logger: Arc<dyn Logger>) -> Self {
        Self { store, logger }
    }
}

#[async_trait]
impl Initializable for ItemsModule {
    async fn initialize(&self) -> anyhow::Result<()> {
        self.logger
            .info("items", &format!("items ready ({} stored)", self.store.len()));
        Ok(())
    }
}

#[async_trait]
impl HealthCheckable for ItemsModule {
    async fn health(&self) -> Option<ComponentHealth> {
        None
    }
}

impl RouteRegistrar for ItemsModule {
    fn register_routes(&self, routes: &mut RouteTable) -> Result<(), ConfigurationError> {
        routes.mount_controller(&ItemsController::new(Arc::clone(&self.store)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use chrono::{Duration, Utc};
    use routekit_auth::{Role, Session, SessionUser};
    use routekit_core::ResourceId;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use crate::context::AuthUser;
    use crate::routing::RouteSettings;

    fn router(store: Arc<ItemStore>) -> Router {
        let mut table = RouteTable::new(RouteSettings::default());
        table.mount_controller(&ItemsController::new(store)).unwrap();
        table.into_parts().0
    }

    fn as_user(mut req: Request<Body>, roles: &[&'static str]) -> Request<Body> {
        let mut user = SessionUser::new("ada@example.com");
        for role in roles {
            user = user.with_role(Role::new(*role));
        }
        let now = Utc::now();
        req.extensions_mut().insert(AuthUser::new(Session {
            user,
            issued_at: now,
            expires_at: now + Duration::hours(1),
        }));
        req
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn call(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn seeded(names: &[&str]) -> Arc<ItemStore> {
        let store = Arc::new(ItemStore::new());
        for (i, name) in names.iter().enumerate() {
            store
                .insert(
                    NewItem {
                        name: name.to_string(),
                        description: None,
                        quantity: i as i64,
                        tags: vec![],
                    },
                    None,
                )
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn create_records_owner_and_returns_201() {
        let store = Arc::new(ItemStore::new());
        let app = router(Arc::clone(&store));

        let req = as_user(json_request("POST", "/items", json!({"name": "bolt", "quantity": 4})), &[]);
        let (status, body) = call(&app, req).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["name"], "bolt");
        assert_eq!(body["data"]["quantity"], 4);
        assert!(body["data"]["owner"].is_string());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn create_rejects_negative_quantity() {
        let app = router(Arc::new(ItemStore::new()));
        let req = as_user(json_request("POST", "/items", json!({"name": "bolt", "quantity": -1})), &[]);
        let (status, body) = call(&app, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["details"][0]["path"], "quantity");
    }

    #[tokio::test]
    async fn list_searches_and_sorts() {
        let app = router(seeded(&["washer", "bolt", "nut", "bolt cutter"]));

        let (_, body) = call(&app, Request::get("/items?search=bolt&sort=-name").body(Body::empty()).unwrap()).await;
        let names: Vec<&str> = body["data"]["items"]
            .as_array()
            .unwrap()
            .iter()
            .map(|i| i["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, ["bolt cutter", "bolt"]);
        assert_eq!(body["data"]["pagination"]["total"], 2);
    }

    #[tokio::test]
    async fn list_rejects_unknown_sort_field() {
        let app = router(seeded(&["bolt"]));
        let (status, body) = call(&app, Request::get("/items?sort=price").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["details"][0]["path"], "sort");
    }

    #[tokio::test]
    async fn partial_update_keeps_other_fields() {
        let store = seeded(&["bolt"]);
        let id = store.query(None, None).unwrap()[0].id;
        let app = router(store);

        let req = as_user(json_request("PUT", &format!("/items/{id}"), json!({"quantity": 12})), &[]);
        let (status, body) = call(&app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["quantity"], 12);
        assert_eq!(body["data"]["name"], "bolt");
    }

    #[tokio::test]
    async fn delete_needs_admin() {
        let store = seeded(&["bolt"]);
        let id = store.query(None, None).unwrap()[0].id;
        let app = router(Arc::clone(&store));
        let uri = format!("/items/{id}");

        let (status, _) = call(&app, as_user(Request::delete(uri.as_str()).body(Body::empty()).unwrap(), &[])).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let req = as_user(Request::delete(uri.as_str()).body(Body::empty()).unwrap(), &["admin"]);
        let (status, body) = call(&app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["deleted"], true);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn missing_item_is_404() {
        let app = router(Arc::new(ItemStore::new()));
        let uri = format!("/items/{}", ResourceId::new());
        let (status, body) = call(&app, Request::get(uri.as_str()).body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"success": false, "error": "Item not found"}));
    }

    #[tokio::test]
    async fn attachments_require_a_file() {
        let store = seeded(&["bolt"]);
        let id = store.query(None, None).unwrap()[0].id;
        let app = router(Arc::clone(&store));
        let boundary = "X-BOUNDARY";
        let uri = format!("/items/{id}/attachments");

        let multipart = |parts: &str| {
            Request::post(uri.as_str())
                .header("content-type", format!("multipart/form-data; boundary={boundary}"))
                .body(Body::from(format!("{parts}--{boundary}--\r\n")))
                .unwrap()
        };

        let note = format!("--{boundary}\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\ndatasheet\r\n");
        let (status, body) = call(&app, as_user(multipart(&note), &[])).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No file uploaded");

        let file = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"sheet.txt\"\r\nContent-Type: text/plain\r\n\r\nhello\r\n"
        );
        let (status, body) = call(&app, as_user(multipart(&file), &[])).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["attachments"][0]["fileName"], "sheet.txt");
        assert_eq!(body["data"]["attachments"][0]["size"], 5);
    }

    #[tokio::test]
    async fn attachments_to_a_missing_item_are_404() {
        let app = router(Arc::new(ItemStore::new()));
        let boundary = "X-BOUNDARY";
        let file = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"a.txt\"\r\n\r\nhi\r\n--{boundary}--\r\n"
        );
        let req = Request::post(format!("/items/{}/attachments", ResourceId::new()))
            .header("content-type", format!("multipart/form-data; boundary={boundary}"))
            .body(Body::from(file))
            .unwrap();
        let (status, body) = call(&app, as_user(req, &[])).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"success": false, "error": "Item not found"}));

        let req = Request::post("/items/nope/attachments")
            .header("content-type", format!("multipart/form-data; boundary={boundary}"))
            .body(Body::from(format!("--{boundary}--\r\n")))
            .unwrap();
        let (status, body) = call(&app, as_user(req, &[])).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["details"][0]["path"], "id");
    }
}
