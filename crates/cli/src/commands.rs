//! Command handlers
//!
//! Each handler returns the JSON document to print; failures surface as the
//! normalized [`ClientError`].

use clinicdesk_core::RequestOptions;
use clinicdesk_domain::ClientError;
use serde_json::{json, Value};
use tracing::instrument;

use crate::cli::Command;
use crate::context::AppContext;

/// Run one command against the context's client
#[instrument(skip(ctx))]
pub async fn execute(ctx: &AppContext, command: Command) -> Result<Value, ClientError> {
    match command {
        Command::Get { path, query, no_cache } => {
            let mut options =
                query.into_iter().fold(RequestOptions::new(), |options, (key, value)| {
                    options.query(key, value)
                });
            if no_cache {
                options = options.skip_cache();
            }
            Ok(ctx.client.get(&path, options).await?.data)
        }
        Command::Page { path, page, size } => {
            let page = ctx
                .client
                .get_paginated::<Value>(&path, RequestOptions::new().page(page, size))
                .await?;
            Ok(json!({
                "content": page.content,
                "number": page.number,
                "size": page.size,
                "totalElements": page.total_elements,
                "totalPages": page.total_pages,
                "last": page.is_last(),
            }))
        }
        Command::Config => Ok(serde_json::to_value(&ctx.config).unwrap_or(Value::Null)),
    }
}

/// JSON shape printed to stderr when a command fails
pub fn error_report(error: &ClientError) -> Value {
    match error.as_api_error() {
        Some(api) => json!({
            "code": error.code(),
            "status": api.status(),
            "message": api.message,
            "path": api.path,
            "details": api.details,
        }),
        None => json!({ "code": error.code(), "message": error.to_string() }),
    }
}
