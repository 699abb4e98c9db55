//! OpenAPI 3.1 document generated from registered route contracts.
//!
//! The document is assembled with the typed `utoipa::openapi` builders. Route
//! contracts carry plain JSON Schema fragments, which [`schema`] lifts into
//! utoipa schemas.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;
use utoipa::openapi::content::ContentBuilder;
use utoipa::openapi::path::{
    HttpMethod as OpenApiMethod, Operation, OperationBuilder, ParameterBuilder, ParameterIn, PathItemBuilder,
    PathsBuilder,
};
use utoipa::openapi::request_body::RequestBodyBuilder;
use utoipa::openapi::response::ResponseBuilder;
use utoipa::openapi::schema::{
    AdditionalProperties, AnyOfBuilder, ArrayBuilder, ObjectBuilder, Schema, SchemaFormat, SchemaType, Type,
};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityRequirement, SecurityScheme};
use utoipa::openapi::tag::TagBuilder;
use utoipa::openapi::{ComponentsBuilder, InfoBuilder, OpenApi, OpenApiBuilder, RefOr, Required};

use crate::route::{HttpMethod, ParamLocation, RouteContract};

pub const BEARER_SCHEME: &str = "bearerAuth";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiInfo {
    pub title: String,
    pub version: String,
    pub description: Option<String>,
}

impl ApiInfo {
    pub fn new(title: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            version: version.into(),
            description: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// `/items/:id` becomes `/items/{id}`.
pub fn openapi_path(path: &str) -> String {
    path.split('/')
        .map(|seg| match seg.strip_prefix(':') {
            Some(name) => format!("{{{name}}}"),
            None => seg.to_string(),
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn operation_id(contract: &RouteContract) -> String {
    let mut id = contract.method.as_str().to_lowercase();
    for seg in contract.path.split('/').filter(|s| !s.is_empty()) {
        id.push('_');
        id.push_str(&seg.trim_start_matches(':').replace('-', "_"));
    }
    id
}

/// Typed form of a JSON Schema fragment. Keywords the contracts never emit
/// are dropped; `const` becomes a one-value `enum`.
pub fn schema(value: &Value) -> RefOr<Schema> {
    let Some(obj) = value.as_object() else {
        return any_value();
    };

    if let Some(variants) = obj.get("anyOf").and_then(Value::as_array) {
        let any_of = variants
            .iter()
            .fold(AnyOfBuilder::new(), |builder, variant| builder.item(schema(variant)));
        return RefOr::T(Schema::AnyOf(any_of.build()));
    }

    let str_of = |key: &str| obj.get(key).and_then(Value::as_str);
    let usize_of = |key: &str| obj.get(key).and_then(Value::as_u64).and_then(|n| usize::try_from(n).ok());

    let schema_type = match str_of("type") {
        Some("array") => {
            let items = obj.get("items").map_or_else(any_value, schema);
            return RefOr::T(Schema::Array(ArrayBuilder::new().items(items).build()));
        }
        Some("object") => SchemaType::Type(Type::Object),
        Some("string") => SchemaType::Type(Type::String),
        Some("integer") => SchemaType::Type(Type::Integer),
        Some("number") => SchemaType::Type(Type::Number),
        Some("boolean") => SchemaType::Type(Type::Boolean),
        Some("null") => SchemaType::Type(Type::Null),
        _ => SchemaType::AnyValue,
    };

    let enum_values = obj
        .get("enum")
        .and_then(Value::as_array)
        .cloned()
        .or_else(|| obj.get("const").map(|c| vec![c.clone()]));

    let mut builder = ObjectBuilder::new()
        .schema_type(schema_type)
        .title(str_of("title"))
        .description(str_of("description"))
        .format(str_of("format").map(|f| SchemaFormat::Custom(f.to_string())))
        .pattern(str_of("pattern"))
        .min_length(usize_of("minLength"))
        .max_length(usize_of("maxLength"))
        .minimum(obj.get("minimum").and_then(Value::as_f64))
        .maximum(obj.get("maximum").and_then(Value::as_f64))
        .default(obj.get("default").cloned())
        .enum_values(enum_values);

    if let Some(properties) = obj.get("properties").and_then(Value::as_object) {
        for (name, property) in properties {
            builder = builder.property(name, schema(property));
        }
    }
    let required = obj.get("required").and_then(Value::as_array);
    for name in required.into_iter().flatten().filter_map(Value::as_str) {
        builder = builder.required(name);
    }
    if let Some(Value::Bool(allowed)) = obj.get("additionalProperties") {
        builder = builder.additional_properties(Some(AdditionalProperties::FreeForm(*allowed)));
    }

    RefOr::T(Schema::Object(builder.build()))
}

fn any_value() -> RefOr<Schema> {
    RefOr::T(Schema::Object(ObjectBuilder::new().schema_type(SchemaType::AnyValue).build()))
}

fn method(method: HttpMethod) -> OpenApiMethod {
    match method {
        HttpMethod::Get => OpenApiMethod::Get,
        HttpMethod::Post => OpenApiMethod::Post,
        HttpMethod::Put => OpenApiMethod::Put,
        HttpMethod::Patch => OpenApiMethod::Patch,
        HttpMethod::Delete => OpenApiMethod::Delete,
    }
}

fn operation(contract: &RouteContract) -> Operation {
    let mut op = OperationBuilder::new()
        .tag(contract.tag.as_str())
        .summary(Some(contract.summary.as_str()))
        .description(Some(contract.description.as_str()))
        .operation_id(Some(operation_id(contract)));

    for param in &contract.params {
        let location = match param.location {
            ParamLocation::Path => ParameterIn::Path,
            ParamLocation::Query => ParameterIn::Query,
        };
        op = op.parameter(
            ParameterBuilder::new()
                .name(param.name.as_str())
                .parameter_in(location)
                .required(if param.required { Required::True } else { Required::False })
                .description(Some(param.description.as_str()))
                .schema(Some(schema(&param.schema)))
                .build(),
        );
    }

    // Path segments the contract does not describe still need an entry.
    for name in contract.path.split('/').filter_map(|s| s.strip_prefix(':')) {
        let declared = contract
            .params
            .iter()
            .any(|p| p.location == ParamLocation::Path && p.name == name);
        if !declared {
            op = op.parameter(
                ParameterBuilder::new()
                    .name(name)
                    .parameter_in(ParameterIn::Path)
                    .required(Required::True)
                    .schema(Some(schema(&serde_json::json!({ "type": "string" }))))
                    .build(),
            );
        }
    }

    if let Some(request) = &contract.request_schema {
        let media = if contract.is_multipart {
            "multipart/form-data"
        } else {
            "application/json"
        };
        op = op.request_body(Some(
            RequestBodyBuilder::new()
                .required(Some(Required::True))
                .content(media, ContentBuilder::new().schema(Some(schema(request))).build())
                .build(),
        ));
    }

    for response in &contract.responses {
        op = op.response(
            response.status.to_string(),
            ResponseBuilder::new()
                .description(response.description.as_str())
                .content(
                    "application/json",
                    ContentBuilder::new().schema(Some(schema(&response.schema))).build(),
                )
                .build(),
        );
    }

    if contract.requires_auth {
        op = op.security(SecurityRequirement::new(BEARER_SCHEME, Vec::<String>::new()));
    }
    op.build()
}

/// Build the full document. Contracts are expected to carry their mounted
/// (absolute) paths.
pub fn build_document(info: &ApiInfo, contracts: &[RouteContract]) -> OpenApi {
    let mut items: BTreeMap<String, PathItemBuilder> = BTreeMap::new();
    for contract in contracts {
        let path = openapi_path(&contract.path);
        let item = items.remove(&path).unwrap_or_default();
        items.insert(path, item.operation(method(contract.method), operation(contract)));
    }
    let paths = items
        .into_iter()
        .fold(PathsBuilder::new(), |paths, (path, item)| paths.path(path, item.build()));

    let tags: BTreeSet<&str> = contracts.iter().map(|c| c.tag.as_str()).collect();
    let bearer = HttpBuilder::new()
        .scheme(HttpAuthScheme::Bearer)
        .bearer_format("JWT")
        .build();

    OpenApiBuilder::new()
        .info(
            InfoBuilder::new()
                .title(info.title.as_str())
                .version(info.version.as_str())
                .description(info.description.as_deref())
                .build(),
        )
        .paths(paths.build())
        .components(Some(
            ComponentsBuilder::new()
                .security_scheme(BEARER_SCHEME, SecurityScheme::Http(bearer))
                .build(),
        ))
        .tags(Some(tags.into_iter().map(|name| TagBuilder::new().name(name).build())))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use routekit_core::{Field, ObjectSchema, Page, Schema as _};
    use serde_json::json;

    use crate::route::{HttpMethod, RouteDescriptor};
    use crate::routing::{ListQuery, RouteBuilder, RouteSettings};

    fn contracts() -> Vec<RouteContract> {
        let schema = ObjectSchema::new().field(Field::string("name"));
        let mut routes = RouteBuilder::new("Items", RouteSettings::default());
        routes
            .list("/items", RouteDescriptor::new(&schema), |_ctx, _q: ListQuery| async move {
                Ok(Page::<u8> { items: vec![], total: 0 })
            })
            .unwrap()
            .update(
                "/items/:id",
                RouteDescriptor::new(&schema).request(schema.clone()).secured(),
                |_ctx, _id, body: serde_json::Value| async move { Ok(body) },
            )
            .unwrap()
            .action_with_body(
                HttpMethod::Post,
                "/items/:id/photos/:slot",
                RouteDescriptor::new(&schema).request(schema.clone()).multipart(),
                |_ctx, body: serde_json::Value| async move { Ok(body) },
            )
            .unwrap();
        routes.into_parts().1
    }

    fn document() -> Value {
        serde_json::to_value(build_document(&ApiInfo::new("Demo", "1.0.0"), &contracts())).unwrap()
    }

    #[test]
    fn converts_path_params() {
        assert_eq!(openapi_path("/items/:id/photos/:slot"), "/items/{id}/photos/{slot}");
        assert_eq!(openapi_path("/"), "/");
    }

    #[test]
    fn document_lists_operations_by_path() {
        let doc = document();
        assert_eq!(doc["openapi"], "3.1.0");
        assert_eq!(doc["info"]["title"], "Demo");
        assert_eq!(doc["tags"], json!([{ "name": "Items" }]));

        let list = &doc["paths"]["/items"]["get"];
        assert_eq!(list["operationId"], "get_items");
        assert_eq!(list["parameters"].as_array().unwrap().len(), 4);
        assert!(list.get("security").is_none());
        assert!(list["responses"]["200"].is_object());
    }

    #[test]
    fn secured_update_carries_security_and_404() {
        let doc = document();
        let update = &doc["paths"]["/items/{id}"]["put"];
        assert_eq!(update["security"], json!([{ "bearerAuth": [] }]));
        assert!(update["responses"]["401"].is_object());
        assert!(update["responses"]["404"].is_object());
        assert!(update["requestBody"]["content"]["application/json"]["schema"].is_object());
    }

    #[test]
    fn multipart_action_declares_form_body_and_extra_params() {
        let doc = document();
        let upload = &doc["paths"]["/items/{id}/photos/{slot}"]["post"];
        assert!(upload["requestBody"]["content"]["multipart/form-data"].is_object());
        let names: Vec<&str> = upload["parameters"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["id", "slot"]);
        assert_eq!(upload["operationId"], "post_items_id_photos_slot");
    }

    #[test]
    fn schemas_keep_their_constraints() {
        let rendered = ObjectSchema::new()
            .title("Item")
            .field(Field::string("name").min_len(1))
            .field(Field::uuid("owner").nullable())
            .field(Field::one_of("status", ["active", "archived"]).optional())
            .strict()
            .json_schema();
        let typed = serde_json::to_value(schema(&rendered)).unwrap();

        assert_eq!(typed["type"], "object");
        assert_eq!(typed["title"], "Item");
        assert_eq!(typed["additionalProperties"], false);
        assert_eq!(typed["properties"]["name"]["minLength"], 1);
        assert_eq!(typed["properties"]["status"]["enum"], json!(["active", "archived"]));
        assert_eq!(typed["properties"]["owner"]["anyOf"][1]["type"], "null");
        assert_eq!(typed["properties"]["owner"]["anyOf"][0]["format"], "uuid");
        assert_eq!(typed["required"], json!(["name", "owner"]));
    }

    #[test]
    fn error_responses_pin_success_false() {
        let doc = document();
        let bad_request = &doc["paths"]["/items"]["get"]["responses"]["400"]["content"]["application/json"]["schema"];
        assert_eq!(bad_request["properties"]["success"]["enum"], json!([false]));
    }
}
