//! Administrative settings surface.
//!
//! Framework-free handlers for the two admin routes. A host wires these into
//! its HTTP layer; the CLI calls them directly as a local operator.
//!
//! | Method | Path | Capability | Success |
//! |---|---|---|---|
//! | `GET` | `/settings` | [`SETTINGS_READ`] | `200 {"data": settings}` |
//! | `PUT` | `/settings` | [`SETTINGS_READ`] | `200 {"data": settings}` |
//!
//! Both routes require an authenticated caller holding the capability; any
//! other caller gets `403`. A `PUT` body that fails validation gets `400`
//! with one entry per offending field and nothing is written.

use crate::settings::{FieldError, SettingsError, SettingsService};
use serde_json::{Value, json};
use std::collections::BTreeSet;
use tracing::{error, info};

/// Capability guarding both settings routes.
pub const SETTINGS_READ: &str = "plugin::img-convert.settings.read";

/// Methods the admin surface routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Put,
}

/// One admin route and the capability it requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub method: Method,
    pub path: &'static str,
    pub capability: &'static str,
}

pub const ROUTES: [Route; 2] = [
    Route {
        method: Method::Get,
        path: "/settings",
        capability: SETTINGS_READ,
    },
    Route {
        method: Method::Put,
        path: "/settings",
        capability: SETTINGS_READ,
    },
];

/// Who is calling, as established by the host's auth layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Caller {
    pub authenticated: bool,
    pub grants: BTreeSet<String>,
}

impl Caller {
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// An authenticated caller holding `grants`.
    pub fn with_grants<I, S>(grants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            authenticated: true,
            grants: grants.into_iter().map(Into::into).collect(),
        }
    }

    /// The local operator running the CLI.
    pub fn operator() -> Self {
        Self::with_grants([SETTINGS_READ])
    }

    pub fn can(&self, capability: &str) -> bool {
        self.authenticated && self.grants.contains(capability)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AdminResponse {
    Ok(Value),
    BadRequest(Vec<FieldError>),
    Forbidden,
    NotFound,
    Internal(String),
}

impl AdminResponse {
    pub fn status(&self) -> u16 {
        match self {
            AdminResponse::Ok(_) => 200,
            AdminResponse::BadRequest(_) => 400,
            AdminResponse::Forbidden => 403,
            AdminResponse::NotFound => 404,
            AdminResponse::Internal(_) => 500,
        }
    }

    /// JSON body as sent to the client.
    pub fn body(&self) -> Value {
        let error = |name: &str, message: &str| {
            json!({
                "data": null,
                "error": { "status": self.status(), "name": name, "message": message }
            })
        };
        match self {
            AdminResponse::Ok(data) => json!({ "data": data }),
            AdminResponse::BadRequest(errors) => {
                let mut body = error("ValidationError", "Invalid settings");
                body["error"]["details"] = json!({ "errors": errors });
                body
            }
            AdminResponse::Forbidden => error("ForbiddenError", "Forbidden"),
            AdminResponse::NotFound => error("NotFoundError", "Not Found"),
            AdminResponse::Internal(message) => error("ApplicationError", message),
        }
    }
}

/// Handlers for the settings routes.
pub struct SettingsController {
    settings: SettingsService,
}

impl SettingsController {
    pub fn new(settings: SettingsService) -> Self {
        Self { settings }
    }

    /// Dispatch a request to its route.
    pub fn handle(
        &self,
        method: Method,
        path: &str,
        caller: &Caller,
        body: Option<&Value>,
    ) -> AdminResponse {
        let path = path.trim_end_matches('/');
        let Some(route) = ROUTES
            .iter()
            .find(|r| r.method == method && r.path == path)
        else {
            return AdminResponse::NotFound;
        };
        if !caller.can(route.capability) {
            return AdminResponse::Forbidden;
        }
        match method {
            Method::Get => self.get_settings(caller),
            Method::Put => self.update_settings(caller, body),
        }
    }

    pub fn get_settings(&self, caller: &Caller) -> AdminResponse {
        if !caller.can(SETTINGS_READ) {
            return AdminResponse::Forbidden;
        }
        match serde_json::to_value(self.settings.settings()) {
            Ok(data) => AdminResponse::Ok(data),
            Err(e) => AdminResponse::Internal(e.to_string()),
        }
    }

    pub fn update_settings(&self, caller: &Caller, body: Option<&Value>) -> AdminResponse {
        if !caller.can(SETTINGS_READ) {
            return AdminResponse::Forbidden;
        }
        let Some(body) = body else {
            return AdminResponse::BadRequest(vec![FieldError {
                field: String::new(),
                message: "request body is required".to_string(),
            }]);
        };
        match self.settings.update_from(body) {
            Ok(saved) => {
                info!("Settings updated");
                match serde_json::to_value(saved) {
                    Ok(data) => AdminResponse::Ok(data),
                    Err(e) => AdminResponse::Internal(e.to_string()),
                }
            }
            Err(SettingsError::Validation(errors)) => AdminResponse::BadRequest(errors),
            Err(e) => {
                error!("Could not save settings: {e}");
                AdminResponse::Internal(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    fn controller() -> SettingsController {
        SettingsController::new(SettingsService::new(Arc::new(MemoryStore::new())))
    }

    #[test]
    fn get_returns_defaults_wrapped_in_data() {
        let response = controller().handle(Method::Get, "/settings", &Caller::operator(), None);
        assert_eq!(response.status(), 200);
        let body = response.body();
        assert_eq!(body["data"]["convertTo"], json!("webp"));
        assert_eq!(body["data"]["convertFromJPEG"], json!(true));
    }

    #[test]
    fn put_validates_persists_and_echoes() {
        let c = controller();
        let body = json!({"convertTo": "avif", "responsiveDimensions": true, "extra": 1});
        let response = c.handle(Method::Put, "/settings", &Caller::operator(), Some(&body));
        assert_eq!(response.status(), 200);
        assert_eq!(response.body()["data"]["convertTo"], json!("avif"));
        assert!(response.body()["data"].get("extra").is_none());

        let read = c.handle(Method::Get, "/settings", &Caller::operator(), None);
        assert_eq!(read.body()["data"]["responsiveDimensions"], json!(true));
    }

    #[test]
    fn put_rejects_invalid_fields_without_writing() {
        let c = controller();
        let body = json!({"convertTo": "bmp", "formatOptions": {"webp": {"quality": 0}}});
        let response = c.handle(Method::Put, "/settings", &Caller::operator(), Some(&body));

        assert_eq!(response.status(), 400);
        let errors = &response.body()["error"]["details"]["errors"];
        assert_eq!(errors.as_array().unwrap().len(), 2);
        assert_eq!(errors[1]["field"], json!("formatOptions.webp.quality"));

        let AdminResponse::Ok(data) = c.get_settings(&Caller::operator()) else {
            panic!("expected settings");
        };
        assert_eq!(data, serde_json::to_value(Settings::default()).unwrap());
    }

    #[test]
    fn put_without_body_is_bad_request() {
        let response = controller().handle(Method::Put, "/settings", &Caller::operator(), None);
        assert_eq!(response.status(), 400);
    }

    #[test]
    fn anonymous_and_ungranted_callers_are_forbidden() {
        let c = controller();
        let authenticated_without_grant = Caller::with_grants(["plugin::upload.read"]);
        let unauthenticated_with_grant = Caller {
            authenticated: false,
            ..Caller::operator()
        };
        for caller in [
            Caller::anonymous(),
            authenticated_without_grant,
            unauthenticated_with_grant,
        ] {
            for method in [Method::Get, Method::Put] {
                let response = c.handle(method, "/settings", &caller, Some(&json!({})));
                assert_eq!(response.status(), 403, "{method:?} {caller:?}");
                assert_eq!(response.body()["error"]["name"], json!("ForbiddenError"));
            }
        }
    }

    #[test]
    fn unknown_routes_are_not_found() {
        let c = controller();
        assert_eq!(
            c.handle(Method::Put, "/settings/extra", &Caller::operator(), Some(&json!({}))),
            AdminResponse::NotFound
        );
        assert_eq!(
            c.handle(Method::Get, "/other", &Caller::operator(), None),
            AdminResponse::NotFound
        );
        assert_eq!(
            c.handle(Method::Get, "/settings/", &Caller::operator(), None)
                .status(),
            200
        );
    }
}
