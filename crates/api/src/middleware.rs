//! Request context middleware.
//!
//! Session/role resolution happens upstream (out of scope here); the gateway
//! injects the authenticated tenant and user as headers, and this middleware
//! turns them into typed request extensions. Requests without a valid pair
//! never reach a domain route.

use axum::extract::Request;
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::Response;

use depot_core::{TenantId, UserId};

use crate::app::errors;
use crate::context::{ActorContext, TenantContext};

pub const TENANT_HEADER: &str = "x-depot-tenant";
pub const USER_HEADER: &str = "x-depot-user";

pub async fn context_middleware(mut request: Request, next: Next) -> Response {
    let (tenant, actor) = match extract_contexts(request.headers()) {
        Ok(pair) => pair,
        Err(response) => return response,
    };

    request.extensions_mut().insert(tenant);
    request.extensions_mut().insert(actor);
    next.run(request).await
}

fn extract_contexts(headers: &HeaderMap) -> Result<(TenantContext, ActorContext), Response> {
    let tenant_id = parse_header::<TenantId>(headers, TENANT_HEADER)?;
    let user_id = parse_header::<UserId>(headers, USER_HEADER)?;
    Ok((TenantContext::new(tenant_id), ActorContext::new(user_id)))
}

fn parse_header<T: core::str::FromStr>(headers: &HeaderMap, name: &str) -> Result<T, Response> {
    let value = headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            errors::json_error(
                StatusCode::UNAUTHORIZED,
                "missing_context",
                format!("missing {name} header"),
            )
        })?;

    value.parse::<T>().map_err(|_| {
        errors::json_error(
            StatusCode::BAD_REQUEST,
            "invalid_context",
            format!("invalid {name} header"),
        )
    })
}
