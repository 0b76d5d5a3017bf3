use super::{MethodFilter, PathPattern, Router};
use crate::dispatcher::{Request, Response};
use http::Method;

fn noop(_: &mut Request, _: &mut Response) {}

#[test]
fn test_root_path() {
    let p = PathPattern::compile("/");
    assert!(p.matches("/").is_some());
    assert!(p.matches("/x").is_none());
    assert_eq!(p.param_names().count(), 0);
}

#[test]
fn test_parameterized_path() {
    let p = PathPattern::compile("/items/:id");
    assert!(p.matches("/items/123").is_some());
    assert_eq!(p.param_names().collect::<Vec<_>>(), vec!["id"]);
}

#[test]
fn test_nested_path() {
    let p = PathPattern::compile("/a/:b/c");
    assert!(p.matches("/a/1/c").is_some());
    assert!(p.matches("/a/1/d").is_none());
    assert_eq!(p.param_names().collect::<Vec<_>>(), vec!["b"]);
}

#[test]
fn test_registration_layers() {
    let mut router = Router::new();
    router
        .use_middleware(noop)
        .get("/a", noop)
        .use_at("/b", noop)
        .post("/b", noop);
    assert_eq!(router.middleware_count(), 2);
    assert_eq!(router.route_count(), 2);

    // middleware first regardless of registration interleaving
    let order: Vec<String> = router
        .entries()
        .map(|e| format!("{} {}", e.method(), e.pattern()))
        .collect();
    assert_eq!(order, vec!["* *", "* /b", "GET /a", "POST /b"]);
}

#[test]
fn test_mount_rewrites_roots_once() {
    let mut users = Router::new();
    users.get("/", noop).get("/:id", noop).use_middleware(noop);

    let mut api = Router::new();
    api.mount("/users", users);
    assert_eq!(api.route_count(), 2);

    let patterns: Vec<&str> = api.entries().map(|e| e.pattern().as_str()).collect();
    assert_eq!(patterns, vec!["/users/*", "/users", "/users/:id"]);
    assert!(api.entries().all(|e| e.root() == "/users"));
}

#[test]
fn test_nested_mount_composes() {
    let mut inner = Router::new();
    inner.get("/ping", noop);
    let mut mid = Router::new();
    mid.mount("/v1", inner);
    let mut outer = Router::new();
    outer.mount("/api", mid);

    let entry = outer.entries().next().unwrap();
    assert_eq!(entry.pattern().as_str(), "/api/v1/ping");
    assert_eq!(entry.method(), &MethodFilter::Exact(Method::GET));
}

#[test]
fn test_merge_keeps_order() {
    let mut a = Router::new();
    a.get("/one", noop);
    let mut b = Router::new();
    b.get("/two", noop).get("/three", noop);
    a.merge(b);

    let patterns: Vec<&str> = a.entries().map(|e| e.pattern().as_str()).collect();
    assert_eq!(patterns, vec!["/one", "/two", "/three"]);
}

#[test]
fn test_into_parts_builds_two_layers() {
    let mut router = Router::new();
    router.use_middleware(noop).get("/", noop).get("/x", noop);
    let (handler, workers) = router.into_parts();
    assert_eq!(handler.layer_count(), 2);
    assert_eq!(handler.layer(0).map(|l| l.len()), Some(1));
    assert_eq!(handler.layer(1).map(|l| l.len()), Some(2));
    assert!(workers.is_empty());
}
