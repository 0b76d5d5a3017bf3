use criterion::{criterion_group, criterion_main, Criterion};
use http::Method;
use std::hint::black_box;
use std::io::Cursor;
use strata::multipart::MultipartDecoder;
use strata::router::PathPattern;
use strata::{Request, Response, Router};

const PATTERNS: &[&str] = &[
    "/",
    "/zoo/animals",
    "/zoo/animals/:id",
    "/zoo/animals/:id/toys/:toy_id",
    "/zoo/:category/animals/:id/habitats/:habitat_id/sections/:section_id",
    "/inventory/:warehouse_id/feeds/:feed_id/items/:item_id/batches/:batch_id",
    "/complex/:a/:b/:c/:d/:e/:f/:g/:h/:i",
];

const PATHS: &[(Method, &str)] = &[
    (Method::GET, "/zoo/animals/123"),
    (Method::GET, "/zoo/animals/123/toys/456"),
    (Method::GET, "/zoo/cats/animals/123/habitats/88/sections/5"),
    (Method::POST, "/inventory/1/feeds/2/items/3/batches/4"),
    (Method::GET, "/complex/1/2/3/4/5/6/7/8/9"),
];

fn ok(_: &mut Request, res: &mut Response) {
    res.end();
}

fn bench_pattern_match(c: &mut Criterion) {
    let compiled: Vec<PathPattern> = PATTERNS.iter().map(|p| PathPattern::compile(p)).collect();
    c.bench_function("pattern_match", |b| {
        b.iter(|| {
            for (_, path) in PATHS {
                for pattern in &compiled {
                    black_box(pattern.matches(path));
                }
            }
        })
    });
}

fn bench_dispatch(c: &mut Criterion) {
    let mut router = Router::new();
    router.use_middleware(|_: &mut Request, res: &mut Response| {
        res.set_header("X-Bench", "1");
    });
    for pattern in PATTERNS {
        router.get(pattern, ok).post(pattern, ok);
    }
    let (handler, _) = router.into_parts();

    c.bench_function("dispatch", |b| {
        b.iter(|| {
            for (method, path) in PATHS {
                let mut req = Request::new(method.clone(), path);
                let mut res = Response::new();
                black_box(handler.handle(&mut req, &mut res).is_ok());
                black_box(res.status());
            }
        })
    });
}

fn bench_multipart(c: &mut Criterion) {
    let mut body = Vec::new();
    for i in 0..16 {
        body.extend_from_slice(
            format!("--BOUNDARY\r\nContent-Disposition: form-data; name=\"f{i}\"\r\n\r\n").as_bytes(),
        );
        body.resize(body.len() + 4096, b'a');
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(b"--BOUNDARY--\r\n");

    c.bench_function("multipart_decode_64k", |b| {
        b.iter(|| {
            let parts = MultipartDecoder::new(Cursor::new(body.as_slice()), "BOUNDARY", None)
                .and_then(|mut d| d.read_all());
            black_box(parts.map(|p| p.len()).unwrap_or_default());
        })
    });
}

criterion_group!(benches, bench_pattern_match, bench_dispatch, bench_multipart);
criterion_main!(benches);
