//! Integration tests for request resolution.

use openapi_conform::{PathError, PathFinder, Request, Spec};
use serde_json::{json, Value};

fn spec(document: Value) -> Spec {
    Spec::from_document(&document).unwrap()
}

fn get(path_item_extra: Value) -> Value {
    let mut item = json!({ "get": { "responses": { "200": { "description": "ok" } } } });
    if let (Some(item), Some(extra)) = (item.as_object_mut(), path_item_extra.as_object()) {
        for (key, value) in extra {
            item.insert(key.clone(), value.clone());
        }
    }
    item
}

fn find(spec: &Spec, method: &str, url: &str) -> Result<(String, Vec<(String, String)>), PathError> {
    let request = Request::from_url(method, url).unwrap();
    PathFinder::new(spec).find(&request).map(|resolved| {
        (
            resolved.path.template.clone(),
            resolved
                .path_result
                .variables
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    })
}

// === Path Matching Tests ===

mod path_matching {
    use super::*;

    #[test]
    fn literal_path_matched_before_template() {
        let spec = spec(json!({
            "servers": [{ "url": "http://x.test" }],
            "paths": {
                "/pets": get(json!({})),
                "/{resource}": get(json!({}))
            }
        }));

        let (template, variables) = find(&spec, "GET", "http://x.test/pets").unwrap();
        assert_eq!(template, "/pets");
        assert!(variables.is_empty());

        let (template, variables) = find(&spec, "GET", "http://x.test/owners").unwrap();
        assert_eq!(template, "/{resource}");
        assert_eq!(variables, vec![("resource".to_string(), "owners".to_string())]);
    }

    #[test]
    fn ambiguous_paths_follow_document_order() {
        let spec = spec(json!({
            "servers": [{ "url": "http://x.test" }],
            "paths": {
                "/{resource}": get(json!({})),
                "/pets": get(json!({}))
            }
        }));

        let (template, _) = find(&spec, "GET", "http://x.test/pets").unwrap();
        assert_eq!(template, "/{resource}");
    }

    #[test]
    fn binds_path_variables() {
        let spec = spec(json!({
            "servers": [{ "url": "http://x.test" }],
            "paths": { "/a/{id}": get(json!({})) }
        }));

        let (template, variables) = find(&spec, "GET", "http://x.test/a/42").unwrap();
        assert_eq!(template, "/a/{id}");
        assert_eq!(variables, vec![("id".to_string(), "42".to_string())]);
    }

    #[test]
    fn binds_multiple_variables() {
        let spec = spec(json!({
            "servers": [{ "url": "http://x.test" }],
            "paths": { "/owners/{owner}/pets/{pet}": get(json!({})) }
        }));

        let (_, variables) = find(&spec, "GET", "http://x.test/owners/ann/pets/7").unwrap();
        assert_eq!(
            variables,
            vec![
                ("owner".to_string(), "ann".to_string()),
                ("pet".to_string(), "7".to_string())
            ]
        );
    }

    #[test]
    fn bindings_are_percent_decoded() {
        let spec = spec(json!({
            "servers": [{ "url": "http://x.test" }],
            "paths": { "/pets/{name}": get(json!({})) }
        }));
        let finder = PathFinder::new(&spec);

        let request = Request::from_url("GET", "http://x.test/pets/a%20b").unwrap();
        let resolved = finder.find(&request).unwrap();
        assert_eq!(resolved.path_result.variables["name"], "a b");
        assert_eq!(resolved.path_result.resolved, "/pets/a%20b");

        // An escaped slash stays inside its segment
        let request = Request::from_url("GET", "http://x.test/pets/a%2Fb").unwrap();
        let resolved = finder.find(&request).unwrap();
        assert_eq!(resolved.path_result.variables["name"], "a/b");
    }

    #[test]
    fn query_string_is_ignored() {
        let spec = spec(json!({
            "servers": [{ "url": "http://x.test" }],
            "paths": { "/a/{id}": get(json!({})) }
        }));

        let (_, variables) = find(&spec, "GET", "http://x.test/a/42?verbose=true").unwrap();
        assert_eq!(variables, vec![("id".to_string(), "42".to_string())]);
    }

    #[test]
    fn find_is_deterministic() {
        let spec = spec(json!({
            "servers": [{ "url": "http://x.test" }, { "url": "http://{host}.test" }],
            "paths": {
                "/{a}/{b}": get(json!({})),
                "/pets/{id}": get(json!({}))
            }
        }));
        let request = Request::from_url("GET", "http://x.test/pets/1").unwrap();
        let finder = PathFinder::new(&spec);

        let first = finder.find(&request).unwrap();
        for _ in 0..5 {
            assert_eq!(finder.find(&request).unwrap(), first);
        }
    }
}

// === Error Tests ===

mod not_found {
    use super::*;

    fn fixture() -> Spec {
        spec(json!({
            "servers": [{ "url": "http://x.test" }],
            "paths": { "/a/{id}": get(json!({})) }
        }))
    }

    #[test]
    fn path_not_found() {
        let err = find(&fixture(), "GET", "http://x.test/b").unwrap_err();
        assert_eq!(
            err,
            PathError::PathNotFound {
                url: "http://x.test/b".into()
            }
        );
    }

    #[test]
    fn operation_not_found() {
        let err = find(&fixture(), "PUT", "http://x.test/a/1").unwrap_err();
        assert_eq!(
            err,
            PathError::OperationNotFound {
                url: "http://x.test/a/1".into(),
                method: "put".into()
            }
        );
    }

    #[test]
    fn server_not_found() {
        let err = find(&fixture(), "GET", "http://y.test/a/1").unwrap_err();
        assert_eq!(
            err,
            PathError::ServerNotFound {
                url: "http://y.test/a/1".into()
            }
        );
    }

    #[test]
    fn empty_spec_has_no_paths() {
        let spec = spec(json!({ "openapi": "3.0.3" }));
        let err = find(&spec, "GET", "http://x.test/").unwrap_err();
        assert!(matches!(err, PathError::PathNotFound { .. }));
    }
}

// === Server Resolution Tests ===

mod servers {
    use super::*;

    #[test]
    fn later_path_wins_when_first_has_no_matching_server() {
        let spec = spec(json!({
            "servers": [{ "url": "http://x.test" }],
            "paths": {
                "/items/{id}": get(json!({ "servers": [{ "url": "http://internal.test" }] })),
                "/{kind}/{id}": get(json!({}))
            }
        }));

        let (template, variables) = find(&spec, "GET", "http://x.test/items/1").unwrap();
        assert_eq!(template, "/{kind}/{id}");
        assert_eq!(variables[0], ("kind".to_string(), "items".to_string()));

        let (template, _) = find(&spec, "GET", "http://internal.test/items/1").unwrap();
        assert_eq!(template, "/items/{id}");
    }

    #[test]
    fn operation_servers_override_path_and_spec() {
        let spec = spec(json!({
            "servers": [{ "url": "http://spec.test" }],
            "paths": {
                "/a": {
                    "servers": [{ "url": "http://path.test" }],
                    "get": {
                        "servers": [{ "url": "http://op.test" }],
                        "responses": {}
                    },
                    "post": { "responses": {} }
                }
            }
        }));

        assert!(find(&spec, "GET", "http://op.test/a").is_ok());
        assert!(matches!(
            find(&spec, "GET", "http://path.test/a"),
            Err(PathError::ServerNotFound { .. })
        ));
        assert!(find(&spec, "POST", "http://path.test/a").is_ok());
        assert!(matches!(
            find(&spec, "POST", "http://spec.test/a"),
            Err(PathError::ServerNotFound { .. })
        ));
    }

    #[test]
    fn server_with_base_path() {
        let spec = spec(json!({
            "servers": [{ "url": "http://x.test/api/v1/" }],
            "paths": { "/pets": get(json!({})) }
        }));

        assert!(find(&spec, "GET", "http://x.test/api/v1/pets").is_ok());
        assert!(matches!(
            find(&spec, "GET", "http://x.test/api/v2/pets"),
            Err(PathError::ServerNotFound { .. })
        ));
    }

    #[test]
    fn templated_server_binds_variables() {
        let spec = spec(json!({
            "servers": [{
                "url": "http://{region}.api.test/v1",
                "variables": { "region": { "default": "us", "enum": ["us", "eu"] } }
            }],
            "paths": { "/pets": get(json!({})) }
        }));
        let finder = PathFinder::new(&spec);

        let request = Request::from_url("GET", "http://eu.api.test/v1/pets").unwrap();
        let resolved = finder.find(&request).unwrap();
        assert_eq!(resolved.server.url, "http://{region}.api.test/v1");
        assert_eq!(resolved.server_result.variables["region"], "eu");

        let request = Request::from_url("GET", "http://ap.api.test/v1/pets").unwrap();
        assert!(matches!(
            finder.find(&request),
            Err(PathError::ServerNotFound { .. })
        ));
    }

    #[test]
    fn first_matching_server_in_list_wins() {
        let spec = spec(json!({
            "servers": [
                { "url": "http://other.test" },
                { "url": "http://{host}.test" },
                { "url": "http://x.test" }
            ],
            "paths": { "/pets": get(json!({})) }
        }));

        let request = Request::from_url("GET", "http://x.test/pets").unwrap();
        let resolved = PathFinder::new(&spec).find(&request).unwrap();
        assert_eq!(resolved.server.url, "http://{host}.test");
        assert_eq!(resolved.server_result.variables["host"], "x");
    }

    #[test]
    fn default_server_matches_any_host() {
        let spec = spec(json!({ "paths": { "/pets": get(json!({})) } }));

        let request = Request::from_url("GET", "https://anything.test/pets").unwrap();
        let resolved = PathFinder::new(&spec).find(&request).unwrap();
        assert_eq!(resolved.server.url, "/");
    }

    #[test]
    fn relative_server_matches_path_prefix() {
        let spec = spec(json!({
            "servers": [{ "url": "/v1" }],
            "paths": { "/pets": get(json!({})) }
        }));

        assert!(find(&spec, "GET", "http://a.test/v1/pets").is_ok());
        assert!(find(&spec, "GET", "http://b.test/v1/pets").is_ok());
        assert!(matches!(
            find(&spec, "GET", "http://a.test/v2/pets"),
            Err(PathError::ServerNotFound { .. })
        ));
    }

    #[test]
    fn base_url_anchors_relative_servers() {
        let spec = spec(json!({
            "servers": [{ "url": "/v1" }],
            "paths": { "/pets": get(json!({})) }
        }));
        let finder = PathFinder::new(&spec).with_base_url(Some("http://gateway.test/"));

        let request = Request::from_url("GET", "http://gateway.test/v1/pets").unwrap();
        assert!(finder.find(&request).is_ok());

        let request = Request::from_url("GET", "http://other.test/v1/pets").unwrap();
        assert!(matches!(
            finder.find(&request),
            Err(PathError::ServerNotFound { .. })
        ));
    }

    #[test]
    fn find_url_accepts_lowercase_method() {
        let spec = spec(json!({
            "servers": [{ "url": "http://x.test" }],
            "paths": { "/a/{id}": get(json!({})) }
        }));

        let resolved = PathFinder::new(&spec)
            .find_url("get", "http://x.test/a/9")
            .unwrap();
        assert_eq!(resolved.operation.method, "get");
        assert_eq!(resolved.path_result.resolved, "/a/9");
    }
}
