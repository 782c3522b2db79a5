//! HTTP request handlers
//!
//! [`GaugeApi`] holds references to the shared distance cell and to the
//! settings store, and turns requests into [`ApiResponse`]s without touching
//! the network. The firmware's TCP workers feed it raw request bytes via
//! [`GaugeApi::respond`].
//!
//! # Routes
//! - `GET /getDistance`: latest filtered distance as plain text
//! - `POST /salvar`: persist settings from a JSON or form body
//! - `GET /recuperar`: all settings as JSON
//! - `POST /resetar`: restore the factory defaults

pub mod form;
pub mod http;

use core::fmt::Write;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::mutex::Mutex;
use embassy_sync::signal::Signal;

use crate::system::config::{SettingKey, Settings, ZoneThresholds, MAX_VALUE_LEN};
use crate::system::measurement::SharedDistance;
use crate::system::storage::SettingsStore;

use form::BodyError;
use http::{HttpError, Method, Status};

/// Largest `"key":"value",` entry: a 13 byte key, six punctuation bytes and
/// a value where every byte escapes to `\u00XX`
const MAX_JSON_ENTRY: usize = 13 + 6 + MAX_VALUE_LEN * 6;

/// Largest response body, the settings JSON with every value fully escaped
pub const MAX_BODY_SIZE: usize = SettingKey::TEXT.len() * MAX_JSON_ENTRY + 2;

pub type ResponseBody = heapless::String<MAX_BODY_SIZE>;

pub const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
pub const APPLICATION_JSON: &str = "application/json";

const SAVED: &str = r#"{"message":"Configurações salvas com sucesso!"}"#;
const RESET_DONE: &str = "Configurações resetadas para os valores padrão com sucesso!";
const INVALID_JSON: &str = r#"{"error":"JSON inválido"}"#;
const INVALID_FORM: &str = r#"{"error":"Parâmetros inválidos"}"#;
const VALUE_TOO_LONG: &str = r#"{"error":"Valor muito longo"}"#;
const STORAGE_FAILED: &str = r#"{"error":"Falha ao acessar a memória"}"#;
const REQUEST_TOO_LARGE: &str = r#"{"error":"Requisição muito grande"}"#;
const BAD_REQUEST: &str = r#"{"error":"Requisição inválida"}"#;

/// A response ready to be framed by [`http::write_head`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: Status,
    pub content_type: &'static str,
    pub body: ResponseBody,
}

impl ApiResponse {
    pub fn new(status: Status, content_type: &'static str, body: &str) -> Self {
        let mut buf = ResponseBody::new();
        // all fixed messages fit comfortably
        let _ = buf.push_str(body);
        Self {
            status,
            content_type,
            body: buf,
        }
    }

    pub fn text(status: Status, body: &str) -> Self {
        Self::new(status, TEXT_PLAIN, body)
    }

    pub fn json(status: Status, body: &str) -> Self {
        Self::new(status, APPLICATION_JSON, body)
    }

    pub fn empty(status: Status) -> Self {
        Self::new(status, TEXT_PLAIN, "")
    }
}

/// Request handlers bound to the shared distance cell and settings store
pub struct GaugeApi<'a, M: RawMutex, S> {
    distance: &'a SharedDistance<M>,
    settings: &'a Mutex<M, S>,
    /// Receives the zone bounds after every save and reset
    zone_updates: Option<&'a Signal<M, ZoneThresholds>>,
}

impl<M: RawMutex, S> Clone for GaugeApi<'_, M, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M: RawMutex, S> Copy for GaugeApi<'_, M, S> {}

impl<'a, M, S> GaugeApi<'a, M, S>
where
    M: RawMutex,
    S: SettingsStore,
{
    pub fn new(distance: &'a SharedDistance<M>, settings: &'a Mutex<M, S>) -> Self {
        Self {
            distance,
            settings,
            zone_updates: None,
        }
    }

    /// Publish the zone bounds on `signal` whenever the settings change
    pub fn with_zone_updates(mut self, signal: &'a Signal<M, ZoneThresholds>) -> Self {
        self.zone_updates = Some(signal);
        self
    }

    fn publish_zones(&self, settings: &Settings) {
        if let Some(signal) = self.zone_updates {
            signal.signal(settings.zones());
        }
    }

    /// Frame and dispatch one complete raw request
    pub async fn respond(&self, request: &[u8]) -> ApiResponse {
        let head = match http::parse_head(request) {
            Ok(Some(head)) => head,
            Ok(None) => return ApiResponse::json(Status::BadRequest, BAD_REQUEST),
            Err(HttpError::TooLarge) => {
                return ApiResponse::json(Status::PayloadTooLarge, REQUEST_TOO_LARGE)
            }
            Err(err) => {
                warn!("rejecting request: {}", err);
                return ApiResponse::json(Status::BadRequest, BAD_REQUEST);
            }
        };

        let Some(body) = request.get(head.header_len..head.total_len()) else {
            warn!("truncated request body");
            return ApiResponse::json(Status::BadRequest, BAD_REQUEST);
        };

        self.handle(head.method, head.path, body).await
    }

    /// Route a parsed request
    pub async fn handle(&self, method: Method, path: &str, body: &[u8]) -> ApiResponse {
        debug!("{:?} {}", method, path);

        if method == Method::Options {
            return ApiResponse::empty(Status::NoContent);
        }

        match (method, path) {
            (Method::Get, "/getDistance") => self.distance(),
            (Method::Post, "/salvar") => self.save(body).await,
            (Method::Get, "/recuperar") => self.load().await,
            (Method::Post, "/resetar") => self.reset().await,
            (_, "/getDistance" | "/salvar" | "/recuperar" | "/resetar") => {
                ApiResponse::text(Status::MethodNotAllowed, "Method Not Allowed")
            }
            _ => ApiResponse::text(Status::NotFound, "Not Found"),
        }
    }

    /// `GET /getDistance`
    pub fn distance(&self) -> ApiResponse {
        let mut response = ApiResponse::empty(Status::Ok);
        // a u16 always fits
        let _ = write!(response.body, "{}", self.distance.read());
        response
    }

    /// `POST /salvar`
    pub async fn save(&self, body: &[u8]) -> ApiResponse {
        let settings = match form::parse_settings(body) {
            Ok(settings) => settings,
            Err(err) => {
                warn!("rejecting settings body: {}", err);
                let message = match err {
                    BodyError::InvalidJson => INVALID_JSON,
                    BodyError::InvalidForm => INVALID_FORM,
                    BodyError::ValueTooLong => VALUE_TOO_LONG,
                };
                return ApiResponse::json(Status::BadRequest, message);
            }
        };

        let mut store = self.settings.lock().await;
        match settings.save(&mut *store).await {
            Ok(()) => {
                self.publish_zones(&settings);
                ApiResponse::json(Status::Ok, SAVED)
            }
            Err(err) => {
                error!("saving settings failed: {}", err);
                ApiResponse::json(Status::InternalServerError, STORAGE_FAILED)
            }
        }
    }

    /// `GET /recuperar`
    pub async fn load(&self) -> ApiResponse {
        let loaded = {
            let mut store = self.settings.lock().await;
            Settings::load(&mut *store).await
        };

        let settings = match loaded {
            Ok(settings) => settings,
            Err(err) => {
                error!("loading settings failed: {}", err);
                return ApiResponse::json(Status::InternalServerError, STORAGE_FAILED);
            }
        };

        match serde_json_core::to_string::<_, MAX_BODY_SIZE>(&settings) {
            Ok(body) => ApiResponse {
                status: Status::Ok,
                content_type: APPLICATION_JSON,
                body,
            },
            Err(_) => {
                error!("settings do not fit the response buffer");
                ApiResponse::json(Status::InternalServerError, STORAGE_FAILED)
            }
        }
    }

    /// `POST /resetar`
    pub async fn reset(&self) -> ApiResponse {
        let mut store = self.settings.lock().await;
        match Settings::restore_defaults(&mut *store).await {
            Ok(defaults) => {
                info!("settings reset to defaults");
                self.publish_zones(&defaults);
                ApiResponse::text(Status::Ok, RESET_DONE)
            }
            Err(err) => {
                error!("resetting settings failed: {}", err);
                ApiResponse::json(Status::InternalServerError, STORAGE_FAILED)
            }
        }
    }
}
