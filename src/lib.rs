pub mod api;
pub mod auth;
pub mod config;
pub mod feed;
pub mod follow;
pub mod handlers;
pub mod posts;
pub mod session;
pub mod templates;
pub mod translate;
pub mod users;
pub mod views;

pub mod core {
    pub mod db;
    pub mod errors;
    pub mod helpers;
    pub mod pagination;
    pub mod query_params;
    pub mod static_server;
    pub mod store;
}

pub mod models {
    pub mod models;
}

#[cfg(not(target_arch = "wasm32"))]
pub mod server;

#[cfg(test)]
mod testing;

use crate::core::store::KvStore;
use crate::translate::{LanguageDetector, Translator, Unconfigured, WhatlangDetector};

/// Everything a handler needs besides the request itself.
pub struct AppState {
    pub store: Box<dyn KvStore>,
    pub translator: Box<dyn Translator>,
    pub detector: Box<dyn LanguageDetector>,
}

impl AppState {
    /// State over `store` with language detection on and translation off.
    pub fn new(store: impl KvStore + 'static) -> Self {
        AppState {
            store: Box::new(store),
            translator: Box::new(Unconfigured),
            detector: Box::new(WhatlangDetector),
        }
    }

    pub fn with_translator(mut self, translator: impl Translator + 'static) -> Self {
        self.translator = Box::new(translator);
        self
    }
}

#[cfg(target_arch = "wasm32")]
use spin_sdk::{
    http::{IntoResponse, Request},
    http_component,
};

#[cfg(target_arch = "wasm32")]
#[http_component]
fn handle(req: Request) -> anyhow::Result<impl IntoResponse> {
    let app = AppState::new(crate::core::store::SpinStore);
    Ok(handlers::route(&app, req))
}
