use mime_guess::from_path;
use rust_embed::RustEmbed;
use spin_sdk::http::Response;

use crate::core::errors::ApiError;

#[derive(RustEmbed)]
#[folder = "static"]
struct Assets;

/// Serves a file embedded from `static/`, e.g. `style.css` for `/static/style.css`.
pub fn serve_static(file: &str) -> Response {
    let file = file.trim_start_matches('/');
    match Assets::get(file) {
        Some(asset) => {
            let mime = from_path(file).first_or_octet_stream();
            Response::builder()
                .status(200)
                .header("Content-Type", mime.as_ref())
                .header("Cache-Control", "public, max-age=3600")
                .body(asset.data.to_vec())
                .build()
        }
        None => ApiError::NotFound(format!("no static file {}", file)).into(),
    }
}
