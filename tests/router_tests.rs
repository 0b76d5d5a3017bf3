//! Integration tests for path patterns, mounting and merging

use http::Method;
use strata::router::PathPattern;
use strata::{Request, Response, Router};

mod common;
use common::dispatch::{body, run};

fn reply(text: &'static str) -> impl Fn(&mut Request, &mut Response) + Send + Sync {
    move |_: &mut Request, res: &mut Response| res.send(text)
}

#[test]
fn test_param_extraction_is_exact() {
    let p = PathPattern::compile("/user/:id");
    let params = p.matches("/user/42").unwrap();
    assert_eq!(params.len(), 1);
    assert_eq!(params[0].0.as_ref(), "id");
    assert_eq!(params[0].1, "42");
    assert!(p.matches("/user/42/extra").is_none());
    assert!(p.matches("/user").is_none());
}

#[test]
fn test_wildcard_consumes_one_segment() {
    let p = PathPattern::compile("/files/*/meta");
    assert!(p.matches("/files/report.pdf/meta").is_some());
    assert!(p.matches("/files/a/b/meta").is_none());
    assert!(p.matches("/files//meta").is_some());
    assert!(p.matches("/other/a/meta").is_none());
}

#[test]
fn test_mounted_router_dispatch() {
    let mut users = Router::new();
    users.get("/", reply("list")).get("/:id", |req: &mut Request, res: &mut Response| {
        let id = req.param("id").unwrap_or_default().to_string();
        res.send(format!("user {id}"));
    });

    let mut app = Router::new();
    app.get("/", reply("home"));
    app.mount("/users", users);
    let (handler, _) = app.into_parts();

    assert_eq!(body(&run(&handler, Method::GET, "/").1), "home");
    assert_eq!(body(&run(&handler, Method::GET, "/users").1), "list");
    assert_eq!(body(&run(&handler, Method::GET, "/users/7").1), "user 7");
    assert!(!run(&handler, Method::GET, "/7").1.is_closed());
}

#[test]
fn test_mounted_middleware_is_scoped() {
    let mut api = Router::new();
    api.use_middleware(|_: &mut Request, res: &mut Response| {
        res.set_header("X-Api", "1");
    });
    api.get("/ping", reply("pong"));

    let mut app = Router::new();
    app.get("/site", reply("site"));
    app.mount("/api", api);
    let (handler, _) = app.into_parts();

    let (_, res, _) = run(&handler, Method::GET, "/api/ping");
    assert_eq!(res.header("x-api"), Some("1"));
    assert_eq!(body(&res), "pong");

    let (_, res, _) = run(&handler, Method::GET, "/site");
    assert_eq!(res.header("x-api"), None);
}

#[test]
fn test_nested_mounts_compose() {
    let mut v1 = Router::new();
    v1.get("/status", reply("v1 ok"));
    let mut api = Router::new();
    api.mount("/v1", v1);
    let mut app = Router::new();
    app.mount("/api", api);
    let (handler, _) = app.into_parts();

    assert_eq!(body(&run(&handler, Method::GET, "/api/v1/status").1), "v1 ok");
    assert!(!run(&handler, Method::GET, "/v1/status").1.is_closed());
}

#[test]
fn test_merge_keeps_paths() {
    let mut a = Router::new();
    a.get("/a", reply("a"));
    let mut b = Router::new();
    b.get("/b", reply("b"));
    a.merge(b);
    let (handler, _) = a.into_parts();
    assert_eq!(body(&run(&handler, Method::GET, "/b").1), "b");
}

#[test]
fn test_method_specific_routes() {
    let mut router = Router::new();
    router
        .get("/item", reply("get"))
        .post("/item", reply("post"))
        .delete("/item", reply("delete"))
        .all_at("/item", reply("fallback"));
    let (handler, _) = router.into_parts();

    assert_eq!(body(&run(&handler, Method::GET, "/item").1), "get");
    assert_eq!(body(&run(&handler, Method::POST, "/item").1), "post");
    assert_eq!(body(&run(&handler, Method::DELETE, "/item").1), "delete");
    assert_eq!(body(&run(&handler, Method::PUT, "/item").1), "fallback");
}

#[test]
fn test_encoded_params_decoded() {
    let mut router = Router::new();
    router.get("/tags/:tag", |req: &mut Request, res: &mut Response| {
        let tag = req.param("tag").unwrap_or_default().to_string();
        res.send(tag);
    });
    let (handler, _) = router.into_parts();
    assert_eq!(body(&run(&handler, Method::GET, "/tags/rust%20lang").1), "rust lang");
}
