//! Native HTTP server: actix-web in front of the same router the Spin
//! component uses.

use actix_web::{http::StatusCode, middleware, web, App, HttpRequest, HttpResponse, HttpServer};
use clap::Parser;
use spin_sdk::http::{Method, Request, Response};

use crate::core::errors::error_body;
use crate::core::store::MemoryStore;
use crate::translate::MicrosoftTranslator;
use crate::{handlers, AppState};

#[derive(Debug, Clone, Parser)]
#[command(name = "murmur")]
#[command(about = "Murmur microblog server", long_about = None)]
pub struct ServerConfig {
    /// Server bind address
    #[arg(long, env = "MURMUR_BIND", default_value = "0.0.0.0:3000")]
    pub bind_address: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,

    /// Create the demo accounts on startup
    #[arg(long, env = "MURMUR_SEED", default_value_t = false)]
    pub seed: bool,

    /// Microsoft Translator subscription key; translation is off without it
    #[arg(long, env = "MS_TRANSLATOR_KEY")]
    pub translator_key: Option<String>,

    /// Microsoft Translator resource region
    #[arg(long, env = "MS_TRANSLATOR_REGION", default_value = "global")]
    pub translator_region: String,
}

/// Owned copy of an incoming request, so it can cross into the blocking pool.
struct Incoming {
    method: Method,
    uri: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Incoming {
    fn from_actix(req: &HttpRequest, body: web::Bytes) -> Self {
        let method = match req.method().as_str() {
            "GET" => Method::Get,
            "POST" => Method::Post,
            "PUT" => Method::Put,
            "DELETE" => Method::Delete,
            "HEAD" => Method::Head,
            "OPTIONS" => Method::Options,
            "PATCH" => Method::Patch,
            _ => Method::Get,
        };
        let headers = req
            .headers()
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
            .collect();
        Incoming { method, uri: req.uri().to_string(), headers, body: body.to_vec() }
    }

    fn into_spin(self) -> Request {
        let mut builder = Request::builder();
        let mut with_headers = builder.method(self.method).uri(self.uri);
        for (name, value) in self.headers {
            with_headers = with_headers.header(name, value);
        }
        with_headers.body(self.body).build()
    }
}

struct Outgoing {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Outgoing {
    fn from_spin(resp: Response) -> Self {
        let headers = resp
            .headers()
            .filter_map(|(name, value)| value.as_str().map(|v| (name.to_string(), v.to_string())))
            .collect();
        Outgoing { status: *resp.status(), headers, body: resp.body().to_vec() }
    }

    fn into_actix(self) -> HttpResponse {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut builder = HttpResponse::build(status);
        for (name, value) in self.headers {
            builder.append_header((name, value));
        }
        builder.body(self.body)
    }
}

async fn dispatch(state: web::Data<AppState>, req: HttpRequest, body: web::Bytes) -> HttpResponse {
    let incoming = Incoming::from_actix(&req, body);
    // Handlers block on the store and the translator.
    let result = web::block(move || Outgoing::from_spin(handlers::route(&state, incoming.into_spin()))).await;
    match result {
        Ok(outgoing) => outgoing.into_actix(),
        Err(e) => {
            log::error!("handler panicked or was cancelled: {}", e);
            let status = StatusCode::INTERNAL_SERVER_ERROR;
            HttpResponse::build(status).json(error_body(status, None))
        }
    }
}

/// Routes every request to the shared router. `AppState` must be registered as app data.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.default_service(web::route().to(dispatch));
}

/// In-memory state configured from `config`.
pub fn build_state(config: &ServerConfig) -> anyhow::Result<AppState> {
    let state = AppState::new(MemoryStore::new());
    match &config.translator_key {
        Some(key) if !key.is_empty() => {
            log::info!("translation enabled (region {})", config.translator_region);
            Ok(state.with_translator(MicrosoftTranslator::new(key.clone(), config.translator_region.clone())?))
        }
        _ => {
            log::info!("MS_TRANSLATOR_KEY not set; translation disabled");
            Ok(state)
        }
    }
}

pub async fn run(bind_address: &str, state: AppState) -> std::io::Result<()> {
    let data = web::Data::new(state);
    log::info!("Server listening on http://{}", bind_address);

    HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .wrap(middleware::Logger::default())
            .configure(configure)
    })
    .bind(bind_address)?
    .run()
    .await
}
