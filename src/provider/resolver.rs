//! URL/method resolution and query building for rewrite-mode calls.

use std::collections::HashMap;

use tracing::error;
use url::form_urlencoded;

use crate::constants::DEFAULT_HTTP_METHOD;
use crate::constants::DEFAULT_METHOD_CONF_KEY;
use crate::constants::HTTP_METHOD_ATTACHMENT;
use crate::constants::HTTP_REQUEST_METHOD_KEY;
use crate::constants::URL_CONF_KEY;
use crate::constants::URL_FORMAT_KEY;
use crate::errors::Result;
use crate::rpc::Argument;
use crate::rpc::RpcRequest;
use crate::rpc::Url;
use crate::ProviderError;

/// Expanded `http-service` lookup: conf-id -> motan method -> options.
pub(crate) type SrvUrlMap = HashMap<String, HashMap<String, HashMap<String, String>>>;

/// Resolves `(http_url, http_method)` for a call by layered lookup: provider
/// URL parameters, then the matching `http-service` conf (per-method first,
/// fallback key second), then the per-request method attachment. The URL
/// template substitutes the motan method into its single `%s` placeholder;
/// more than one placeholder is a configuration error.
pub(crate) fn resolve_request_target(
    request: &RpcRequest,
    provider_url: &Url,
    srv_url_map: &SrvUrlMap,
) -> Result<(String, String)> {
    let mut url_format = provider_url.param_or(URL_FORMAT_KEY, "");
    let mut http_method = provider_url.param_or(HTTP_REQUEST_METHOD_KEY, DEFAULT_HTTP_METHOD);

    if let Some(conf) = srv_url_map.get(&provider_url.param_or(URL_CONF_KEY, "")) {
        let specific = conf
            .get(&request.method)
            .or_else(|| conf.get(DEFAULT_METHOD_CONF_KEY));
        if let Some(options) = specific {
            if let Some(format) = options.get(URL_FORMAT_KEY) {
                url_format = format.clone();
            }
            if let Some(method) = options.get(HTTP_REQUEST_METHOD_KEY) {
                http_method = method.clone();
            }
        }
    }

    if let Some(method) = request.attachment(HTTP_METHOD_ATTACHMENT) {
        http_method = method;
    }

    let http_url = match url_format.matches("%s").count() {
        0 => url_format,
        1 => url_format.replacen("%s", &request.method, 1),
        _ => {
            error!("Get err URL_FORMAT: {}", url_format);
            return Err(ProviderError::UrlFormat(url_format).into());
        }
    };
    Ok((http_url, http_method))
}

/// Serializes the request into the outbound query string.
///
/// Always starts with `requestIdFromClient=<id>`. A leading map argument
/// contributes `&key=value` pairs with form-urlencoded values, after
/// promoting any absent mix-var keys from the attachments. A leading string
/// argument is appended url-escaped, without a key.
pub(crate) fn build_query(
    request: &RpcRequest,
    mix_vars: &[String],
) -> String {
    let mut query = format!("requestIdFromClient={}", request.request_id);
    match request.arguments.first() {
        Some(Argument::Map(params)) => {
            let mut params = params.clone();
            for key in mix_vars {
                if !params.contains_key(key) {
                    if let Some(value) = request.attachment(key) {
                        params.insert(key.clone(), value);
                    }
                }
            }
            for (key, value) in &params {
                query.push('&');
                query.push_str(key);
                query.push('=');
                query.extend(form_urlencoded::byte_serialize(value.as_bytes()));
            }
        }
        Some(Argument::Str(value)) => {
            query.extend(form_urlencoded::byte_serialize(value.as_bytes()));
        }
        _ => {}
    }
    query
}
