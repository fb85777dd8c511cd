//! Forwarding endpoints for the legacy API-key API.
//!
//! Each handler checks its required query parameters, forwards a GET to the
//! configured upstream and relays the upstream status and JSON body unchanged.

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
    Json,
};
use reqwest::Url;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info};

use super::error::ApiError;
use crate::AppState;

/// Upstream listing limit when the caller does not pass one
const DEFAULT_CAMPAIGN_LIMIT: &str = "10000";

const UPSTREAM_FAILURE: &str = "Internal server error";

type Params = HashMap<String, String>;

fn required<'a>(params: &'a Params, name: &str) -> Option<&'a str> {
    params
        .get(name)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

/// `GET /api/getCampaigns?api_key&from[&limit]`
pub async fn get_campaigns(
    State(state): State<Arc<AppState>>,
    Query(params): Query<Params>,
) -> Result<Response, ApiError> {
    let (Some(api_key), Some(from)) = (required(&params, "api_key"), required(&params, "from"))
    else {
        return Err(ApiError::bad_request("Missing api_key or from parameter"));
    };
    let limit = required(&params, "limit").unwrap_or(DEFAULT_CAMPAIGN_LIMIT);

    forward(
        &state,
        "getCampaigns",
        &[
            ("format", "json"),
            ("api_key", api_key),
            ("from", from),
            ("limit", limit),
        ],
        true,
    )
    .await
}

/// `GET /api/getCampaignCommonStats?api_key&campaign_id`
pub async fn get_campaign_common_stats(
    State(state): State<Arc<AppState>>,
    Query(params): Query<Params>,
) -> Result<Response, ApiError> {
    let (Some(api_key), Some(campaign_id)) = (
        required(&params, "api_key"),
        required(&params, "campaign_id"),
    ) else {
        return Err(ApiError::bad_request(
            "Missing api_key or campaign_id parameter",
        ));
    };

    forward(
        &state,
        "getCampaignCommonStats",
        &[
            ("format", "json"),
            ("api_key", api_key),
            ("campaign_id", campaign_id),
        ],
        false,
    )
    .await
}

pub async fn method_not_allowed() -> ApiError {
    ApiError::method_not_allowed()
}

/// GET `<legacy base>/<method>` and relay the answer.
///
/// With `annotate`, the redacted upstream URL is added to the relayed body and
/// to error bodies as `upstream_request_url`.
async fn forward(
    state: &AppState,
    method: &str,
    params: &[(&str, &str)],
    annotate: bool,
) -> Result<Response, ApiError> {
    let base = state.config.vendor.legacy_api_base_url.trim_end_matches('/');
    let url = Url::parse_with_params(&format!("{}/{}", base, method), params).map_err(|e| {
        error!(error = %e, "Invalid upstream URL");
        ApiError::internal(UPSTREAM_FAILURE)
    })?;
    let shown = redact_api_key(&url);
    let annotation = annotate.then(|| shown.clone());
    info!(upstream = %shown, "Forwarding to legacy API");

    let upstream = state.http.get(url).send().await.map_err(|e| {
        error!(upstream = %shown, error = %e, "Upstream request failed");
        ApiError::internal(UPSTREAM_FAILURE).with_upstream_url(annotation.clone())
    })?;

    let status = upstream.status();
    let mut body: Value = upstream.json().await.map_err(|e| {
        error!(upstream = %shown, error = %e, "Upstream returned invalid JSON");
        ApiError::internal(UPSTREAM_FAILURE).with_upstream_url(annotation.clone())
    })?;
    debug!(upstream = %shown, status = %status, "Upstream responded");

    if let (Some(url), Value::Object(map)) = (annotation, &mut body) {
        map.insert("upstream_request_url".to_string(), Value::String(url));
    }

    Ok((status, Json(body)).into_response())
}

fn redact_api_key(url: &Url) -> String {
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let v = if k == "api_key" {
                "***".to_string()
            } else {
                v.into_owned()
            };
            (k.into_owned(), v)
        })
        .collect();

    let mut shown = url.clone();
    shown.query_pairs_mut().clear().extend_pairs(pairs);
    shown.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_api_key() {
        let url = Url::parse_with_params(
            "https://legacy.example.com/api/getCampaigns",
            &[("format", "json"), ("api_key", "s3cr3t"), ("from", "2015-01-01 00:00:00")],
        )
        .unwrap();
        let shown = redact_api_key(&url);
        assert!(!shown.contains("s3cr3t"));
        assert!(shown.contains("api_key=***"));
        assert!(shown.contains("from=2015-01-01+00%3A00%3A00"));
    }

    #[test]
    fn test_required_rejects_blank() {
        let mut params = Params::new();
        params.insert("api_key".to_string(), "  ".to_string());
        params.insert("from".to_string(), "2015-01-01".to_string());
        assert_eq!(required(&params, "api_key"), None);
        assert_eq!(required(&params, "from"), Some("2015-01-01"));
        assert_eq!(required(&params, "limit"), None);
    }
}
