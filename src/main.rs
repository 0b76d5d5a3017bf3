use anyhow::Context;
use clap::Parser;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use strata::config::AppConfig;
use strata::logging::{init_logging, LogConfig};
use strata::middleware::{Cors, FormParser, RequestLogger, RequestMetrics, StaticFiles};
use strata::multipart::{MultipartParser, MULTIPART};
use strata::session::{CookieSession, SESSION};
use strata::{App, Request, Response, Router};

/// Demo server showing the middleware stack, sessions, uploads and a mounted API
#[derive(Parser, Debug)]
#[command(name = "strata", version, about = "Strata demo server", long_about = None)]
struct Cli {
    /// TOML config file; `STRATA_*` variables override it
    #[arg(short, long, env = "STRATA_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind, overriding the config
    #[arg(short, long)]
    bind: Option<String>,

    /// Directory served under /static
    #[arg(long)]
    static_dir: Option<PathBuf>,

    /// Debug-level logging with request headers
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

fn api_router() -> Router {
    let mut users = Router::new();
    users
        .get("/", |_: &mut Request, res: &mut Response| {
            res.json(&json!([{ "id": "1", "name": "ada" }, { "id": "2", "name": "linus" }]));
        })
        .get("/:id", |req: &mut Request, res: &mut Response| {
            let id = req.param("id").unwrap_or_default().to_string();
            res.json(&json!({ "id": id }));
        });

    let mut api = Router::new();
    api.use_middleware(|_: &mut Request, res: &mut Response| {
        res.set_header("X-Api-Version", "1");
    });
    api.mount("/users", users);
    api
}

fn build_app(config: AppConfig, cli: &Cli, metrics: Arc<RequestMetrics>) -> App {
    let session = Arc::new(CookieSession::from_config(&config.session));
    let max_part_size = config.multipart.max_part_size;
    let max_form_size = config.max_body_size;

    let mut app = App::with_config(config);
    app.use_middleware(RequestLogger::new().verbose(cli.verbose));
    app.with_metrics(Arc::clone(&metrics));
    app.use_middleware(Cors::permissive());
    app.use_worker(session);
    app.use_at("/upload", MultipartParser::new(Some(max_part_size)));
    app.use_middleware(FormParser::new(max_form_size));
    if let Some(dir) = &cli.static_dir {
        let mut assets = Router::new();
        assets.use_middleware(StaticFiles::new(dir).max_age(300));
        app.mount("/static", assets);
    }

    app.param("id", |req: &mut Request, _: &mut Response| {
        info!(id = ?req.param("id"), "Resolving id parameter");
    });

    app.get("/", |_: &mut Request, res: &mut Response| {
        res.send("strata is running\n");
    })
    .get("/old-home", |req: &mut Request, _: &mut Response| {
        req.redirect("/");
    })
    .get("/visits", |req: &mut Request, res: &mut Response| {
        let visits = req
            .extension(&SESSION)
            .map(|s| {
                s.update(|data| {
                    let n = data.get("visits").and_then(|v| v.as_u64()).unwrap_or(0) + 1;
                    if !data.is_object() {
                        *data = json!({});
                    }
                    data["visits"] = json!(n);
                    n
                })
            })
            .unwrap_or(0);
        res.json(&json!({ "visits": visits }));
    })
    .post("/echo-form", |req: &mut Request, res: &mut Response| {
        let fields: serde_json::Map<_, _> = req
            .form_queries()
            .iter()
            .map(|(k, v)| (k.to_string(), json!(v)))
            .collect();
        res.json(&fields);
    })
    .get("/whoami", |req: &mut Request, res: &mut Response| {
        match req.authorization() {
            Some(auth) => {
                let user = auth.basic_credentials().map(|(user, _)| user);
                res.json(&json!({ "scheme": auth.kind(), "user": user }));
            }
            None => {
                res.set_status(401);
                res.set_header("WWW-Authenticate", "Basic realm=\"strata\"");
                res.json(&json!({ "error": "Unauthorized" }));
            }
        }
    })
    .post("/upload", |req: &mut Request, res: &mut Response| {
        let Some(form) = req.extension(&MULTIPART) else {
            res.set_status(400);
            res.json(&json!({ "error": "expected multipart/form-data" }));
            return;
        };
        let parts: Vec<_> = form
            .iter()
            .map(|p| {
                json!({
                    "name": p.name(),
                    "filename": p.filename(),
                    "size": p.bytes().len(),
                    "status": format!("{:?}", p.status()),
                })
            })
            .collect();
        res.json(&json!({ "parts": parts }));
    })
    .get("/metrics", move |_: &mut Request, res: &mut Response| {
        res.set_content_type("text/plain; version=0.0.4");
        res.send(metrics.render());
    });

    app.mount("/api", api_router());
    app
}

fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => AppConfig::from_env().context("reading STRATA_* environment")?,
    };
    if let Some(bind) = &cli.bind {
        config.bind_address = bind.clone();
    }
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut log_config = LogConfig::from_env();
    if cli.verbose {
        log_config = log_config.with_level("debug");
    }
    let _log_guard = init_logging(&log_config)?;

    let config = load_config(&cli)?;
    info!(?config, "Configuration loaded");

    let metrics = Arc::new(RequestMetrics::new());
    let app = build_app(config, &cli, metrics);
    let server = app.listen().context("starting server")?;
    server.wait_ready().context("waiting for listener")?;

    #[cfg(unix)]
    {
        use signal_hook::consts::{SIGINT, SIGTERM};
        use signal_hook::iterator::Signals;

        let mut signals = Signals::new([SIGINT, SIGTERM]).context("installing signal handlers")?;
        let trigger = server.shutdown_trigger();
        std::thread::Builder::new()
            .name("strata-signals".into())
            .spawn(move || {
                if let Some(signal) = signals.forever().next() {
                    info!(signal, "Shutdown signal received");
                    trigger.trigger();
                }
            })
            .context("spawning signal thread")?;
    }

    server
        .join()
        .map_err(|_| anyhow::anyhow!("a server thread panicked"))?;
    Ok(())
}
