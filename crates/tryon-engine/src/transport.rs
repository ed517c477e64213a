use reqwest::Response;
use serde_json::Value;

use crate::error::{StudioError, StudioResult};

pub(crate) const ERROR_BODY_MAX_CHARS: usize = 512;

pub(crate) fn transport_error(provider: &str, source: reqwest::Error) -> StudioError {
    StudioError::Transport {
        provider: provider.to_string(),
        source,
    }
}

/// Reads the body, turning non-2xx replies into `Upstream` with the
/// (truncated) body text kept for diagnostics.
pub(crate) async fn response_json_or_error(provider: &str, response: Response) -> StudioResult<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .await
        .map_err(|err| transport_error(provider, err))?;
    if !status.is_success() {
        return Err(StudioError::upstream(
            provider,
            code,
            truncate_text(&body, ERROR_BODY_MAX_CHARS),
        ));
    }
    serde_json::from_str(&body)
        .map_err(|err| StudioError::decode(provider, format!("invalid JSON payload: {err}")))
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
