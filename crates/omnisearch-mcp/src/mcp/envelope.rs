use omnisearch_core::{ErrorKind, ProviderError};
use serde::Serialize;

fn hint(e: &ProviderError) -> String {
    let p = &e.provider;
    match e.kind {
        ErrorKind::InvalidInput => {
            "Fix the arguments and retry. Call omnisearch_meta to list the configured providers and modes."
                .to_string()
        }
        ErrorKind::ApiError => format!(
            "{p} rejected the request. Check that its API key is valid and has access to this endpoint."
        ),
        ErrorKind::RateLimit => format!(
            "{p} is rate-limiting (HTTP 429). Retry after details.reset_epoch_s if present, or use a different provider."
        ),
        ErrorKind::ProviderError => {
            format!("{p} failed upstream. Retry later or use a different provider/mode.")
        }
    }
}

pub(crate) fn error_obj(e: &ProviderError) -> serde_json::Value {
    #[derive(Serialize)]
    struct ErrorObject<'a> {
        kind: &'static str,
        provider: &'a str,
        message: &'a str,
        details: Option<&'a serde_json::Value>,
        retryable: bool,
        hint: String,
    }

    let obj = ErrorObject {
        kind: e.kind.as_str(),
        provider: &e.provider,
        message: &e.message,
        details: e.details.as_ref(),
        retryable: e.is_retryable(),
        hint: hint(e),
    };
    serde_json::to_value(obj).unwrap_or_else(|_| {
        serde_json::json!({
            "kind": e.kind.as_str(),
            "provider": e.provider,
            "message": e.message,
            "retryable": e.is_retryable(),
        })
    })
}

/// `{schema_version, kind, ok, elapsed_ms, request, result | error}`.
pub(crate) fn envelope<T: Serialize>(
    kind: &str,
    request: serde_json::Value,
    outcome: Result<T, ProviderError>,
    elapsed_ms: u128,
) -> serde_json::Value {
    let mut payload = match outcome.and_then(|r| {
        serde_json::to_value(r).map_err(|e| ProviderError::provider(e.to_string(), kind))
    }) {
        Ok(result) => serde_json::json!({ "ok": true, "result": result }),
        Err(e) => serde_json::json!({ "ok": false, "error": error_obj(&e) }),
    };
    add_envelope_fields(&mut payload, kind, request, elapsed_ms);
    payload
}

pub(crate) fn add_envelope_fields(
    payload: &mut serde_json::Value,
    kind: &str,
    request: serde_json::Value,
    elapsed_ms: u128,
) {
    payload["schema_version"] = serde_json::json!(super::SCHEMA_VERSION);
    payload["kind"] = serde_json::json!(kind);
    payload["elapsed_ms"] = serde_json::json!(elapsed_ms);
    payload["request"] = request;
}
