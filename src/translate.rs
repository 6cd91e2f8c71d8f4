use spin_sdk::http::{Request, Response};

use crate::core::errors::ApiError;
use crate::core::helpers::{json_body, json_response};
use crate::session::WebContext;
use crate::AppState;

/// Machine translation backend.
pub trait Translator: Send + Sync {
    fn translate(&self, text: &str, source_language: &str, dest_language: &str) -> Result<String, ApiError>;
}

/// Language identification backend.
pub trait LanguageDetector: Send + Sync {
    /// ISO 639-1 code where one exists, `None` when the text is not identifiable.
    fn detect(&self, text: &str) -> Option<String>;
}

/// Detects the language of a post body. Failure degrades to an empty code.
pub fn detect_language(detector: &dyn LanguageDetector, text: &str) -> String {
    match detector.detect(text) {
        Some(code) => code,
        None => {
            log::debug!("language detection gave up on {} chars", text.chars().count());
            String::new()
        }
    }
}

pub struct WhatlangDetector;

impl LanguageDetector for WhatlangDetector {
    fn detect(&self, text: &str) -> Option<String> {
        let info = whatlang::detect(text)?;
        let code = info.lang().code();
        Some(iso_639_1(code).unwrap_or(code).to_string())
    }
}

fn iso_639_1(code: &str) -> Option<&'static str> {
    let short = match code {
        "eng" => "en",
        "spa" => "es",
        "fra" => "fr",
        "deu" => "de",
        "ita" => "it",
        "por" => "pt",
        "nld" => "nl",
        "ron" => "ro",
        "pol" => "pl",
        "ces" => "cs",
        "swe" => "sv",
        "dan" => "da",
        "nob" => "nb",
        "fin" => "fi",
        "hun" => "hu",
        "tur" => "tr",
        "rus" => "ru",
        "ukr" => "uk",
        "ell" => "el",
        "heb" => "he",
        "ara" => "ar",
        "hin" => "hi",
        "jpn" => "ja",
        "kor" => "ko",
        "cmn" => "zh",
        "vie" => "vi",
        "ind" => "id",
        _ => return None,
    };
    Some(short)
}

/// Used when no translator credentials are configured.
pub struct Unconfigured;

impl Translator for Unconfigured {
    fn translate(&self, _text: &str, _source: &str, _dest: &str) -> Result<String, ApiError> {
        Err(ApiError::Unavailable("the translation service is not configured".to_string()))
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub use microsoft::MicrosoftTranslator;

#[cfg(not(target_arch = "wasm32"))]
mod microsoft {
    use std::time::Duration;

    use serde::Deserialize;

    use super::Translator;
    use crate::core::errors::ApiError;

    const ENDPOINT: &str = "https://api.cognitive.microsofttranslator.com/translate";

    #[derive(Deserialize)]
    struct TranslationResult {
        translations: Vec<Translation>,
    }

    #[derive(Deserialize)]
    struct Translation {
        text: String,
    }

    /// Azure AI Translator, v3 REST API.
    pub struct MicrosoftTranslator {
        client: reqwest::blocking::Client,
        key: String,
        region: String,
    }

    impl MicrosoftTranslator {
        pub fn new(key: String, region: String) -> anyhow::Result<Self> {
            let client = reqwest::blocking::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()?;
            Ok(Self { client, key, region })
        }
    }

    fn failed() -> ApiError {
        ApiError::Upstream("the translation service failed".to_string())
    }

    impl Translator for MicrosoftTranslator {
        fn translate(&self, text: &str, source_language: &str, dest_language: &str) -> Result<String, ApiError> {
            let resp = self
                .client
                .post(ENDPOINT)
                .query(&[("api-version", "3.0"), ("from", source_language), ("to", dest_language)])
                .header("Ocp-Apim-Subscription-Key", &self.key)
                .header("Ocp-Apim-Subscription-Region", &self.region)
                .json(&serde_json::json!([{ "Text": text }]))
                .send()
                .map_err(|e| {
                    log::warn!("translator request failed: {}", e);
                    failed()
                })?;

            if !resp.status().is_success() {
                log::warn!("translator answered {}", resp.status());
                return Err(failed());
            }

            let results: Vec<TranslationResult> = resp.json().map_err(|e| {
                log::warn!("translator sent an unreadable body: {}", e);
                failed()
            })?;

            results
                .into_iter()
                .next()
                .and_then(|r| r.translations.into_iter().next())
                .map(|t| t.text)
                .ok_or_else(failed)
        }
    }
}

/// POST /translate
pub fn translate_text(app: &AppState, req: &Request) -> anyhow::Result<Response> {
    let ctx = WebContext::load(app, req)?;
    if ctx.user.is_none() {
        return Ok(ApiError::Unauthorized.into());
    }

    let data = match json_body(req) {
        Ok(v) => v,
        Err(e) => return Ok(e.into()),
    };
    let field = |name: &str| data[name].as_str().map(str::to_string);
    let (text, source, dest) = match (field("text"), field("source_language"), field("dest_language")) {
        (Some(t), Some(s), Some(d)) => (t, s, d),
        _ => {
            return Ok(ApiError::BadRequest(
                "must include text, source_language and dest_language fields".to_string(),
            )
            .into())
        }
    };

    match app.translator.translate(&text, &source, &dest) {
        Ok(translated) => Ok(json_response(200, &serde_json::json!({ "text": translated }))),
        Err(e) => Ok(e.into()),
    }
}
