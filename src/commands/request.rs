use reqwest::Method;
use serde_json::Value;

use crate::api::ApiRequest;
use crate::cli::RequestArgs;
use crate::context::AppContext;
use crate::error::{AppError, AppResult};

pub async fn run(ctx: &AppContext, args: RequestArgs) -> AppResult<()> {
    let request = build_request(args)?;
    let response: Value = ctx.client.request_json(&request).await?;

    let text = match &response {
        Value::Null => format!("{} {}: ok (empty body)", request.method, request.path),
        other => serde_json::to_string_pretty(other)?,
    };
    ctx.output.emit(&text, &response)
}

fn build_request(args: RequestArgs) -> AppResult<ApiRequest> {
    let method = parse_method(&args.method)?;
    let path = args.path.trim();
    if !path.starts_with('/') {
        return Err(AppError::InvalidInput(format!(
            "path must start with `/`, got `{path}`"
        )));
    }

    let mut request = ApiRequest::new(method, path);
    request.query = args.query;

    if let Some(raw) = args.body.as_deref() {
        let body = serde_json::from_str(raw)
            .map_err(|err| AppError::InvalidInput(format!("--body is not valid JSON: {err}")))?;
        request = request.with_body(body);
    }

    Ok(request)
}

fn parse_method(raw: &str) -> AppResult<Method> {
    let upper = raw.trim().to_ascii_uppercase();
    match upper.as_str() {
        "GET" | "POST" | "PUT" | "PATCH" | "DELETE" => Method::from_bytes(upper.as_bytes())
            .map_err(|err| AppError::InvalidInput(format!("invalid method `{raw}`: {err}"))),
        _ => Err(AppError::InvalidInput(format!(
            "unsupported method `{raw}`; use GET, POST, PUT, PATCH or DELETE"
        ))),
    }
}
