use anyhow::{bail, Result};
use lambda_http::http::{response::Builder, HeaderValue, Method};

pub const ALLOW_METHODS: &str = "GET, POST, PUT, DELETE, OPTIONS";
pub const ALLOW_HEADERS: &str =
    "Content-Type, Authorization, X-Amz-Date, X-Api-Key, X-Amz-Security-Token";
pub const MAX_AGE_SECS: &str = "300";

/// CORS headers attached to every response of a single request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorsHeaders {
    allow_origin: String,
}

impl CorsHeaders {
    pub fn allow_origin(&self) -> &str {
        &self.allow_origin
    }

    pub fn apply(&self, builder: Builder) -> Builder {
        builder
            .header("Access-Control-Allow-Origin", self.allow_origin.as_str())
            .header("Access-Control-Allow-Methods", ALLOW_METHODS)
            .header("Access-Control-Allow-Headers", ALLOW_HEADERS)
            .header("Access-Control-Allow-Credentials", "true")
            .header("Access-Control-Max-Age", MAX_AGE_SECS)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Admission {
    /// Origin is not allow-listed; answer 403.
    Rejected(CorsHeaders),
    /// CORS preflight; answer 204 without touching the pipeline.
    Preflight(CorsHeaders),
    Proceed(CorsHeaders),
}

/// Origin allow-list check performed before any work is done for a request.
#[derive(Debug, Clone)]
pub struct Gatekeeper {
    allowed_origins: Vec<String>,
    default_origin: String,
}

impl Gatekeeper {
    pub fn new(allowed_origins: Vec<String>) -> Result<Self> {
        let Some(default_origin) = allowed_origins.first().cloned() else {
            bail!("CORS allow-list must contain at least one origin");
        };
        Ok(Self {
            allowed_origins,
            default_origin,
        })
    }

    /// An `Origin` that is present but not visible ASCII can never match the
    /// allow-list and is rejected like any other foreign origin.
    pub fn admit(&self, method: &Method, origin: Option<&HeaderValue>) -> Admission {
        let allow_origin = match origin.filter(|o| !o.is_empty()) {
            Some(origin) => match origin.to_str() {
                Ok(origin) if self.is_allowed(origin) => origin.to_string(),
                _ => {
                    return Admission::Rejected(CorsHeaders {
                        allow_origin: self.default_origin.clone(),
                    })
                }
            },
            // Non-browser callers send no Origin
            None => self.default_origin.clone(),
        };

        let headers = CorsHeaders { allow_origin };
        if *method == Method::OPTIONS {
            Admission::Preflight(headers)
        } else {
            Admission::Proceed(headers)
        }
    }

    fn is_allowed(&self, origin: &str) -> bool {
        self.allowed_origins.iter().any(|o| o == origin)
    }
}
