// Request gateway module
// Every backend call goes through RequestGateway

mod classify;
mod client;
mod request;
mod resolver;

pub use classify::{classify, is_login_endpoint, Classification, FailureMessage};
pub use client::RequestGateway;
pub use request::{MultipartForm, Payload, RequestBody, RequestOptions};
pub use resolver::{
    BaseUrlResolver, EnvironmentProvider, NamedEnvironment, PageLocation, FALLBACK_BASE_URL,
    PRODUCTION_DOMAIN, PRODUCTION_ORIGIN,
};
