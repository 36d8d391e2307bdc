//! Request routing: virtual-hosted and path-style addressing, subresource
//! dispatch, authentication gating, and the anonymous-read bypasses.

use crate::auth;
use crate::error::{S3Error, S3Result};
use crate::handlers::{bucket, multipart, object, service, ReqCtx};
use crate::state::AppState;
use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{header, Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use objvault_auth::Identity;
use objvault_common::types::validate_bucket_name;
use objvault_common::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Query keys that select a subresource handler before the method default.
const SUBRESOURCES: [&str; 24] = [
    "uploads",
    "uploadId",
    "delete",
    "policy",
    "versioning",
    "tagging",
    "legal-hold",
    "retention",
    "versions",
    "object-lock",
    "cors",
    "website",
    "lifecycle",
    "notification",
    "encryption",
    "publicAccessBlock",
    "logging",
    "restore",
    "select",
    "attributes",
    "quota",
    "location",
    "acl",
    "lambda",
];

/// Build the S3 router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .fallback(dispatch)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn dispatch(State(state): State<Arc<AppState>>, req: Request<Body>) -> Response {
    match route(state, req).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}

async fn route(state: Arc<AppState>, req: Request<Body>) -> S3Result<Response> {
    let method = req.method().clone();
    let source_ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip());

    let (bucket_name, key) = resolve_target(&req, &state.config.base_domain);
    let query = parse_query(req.uri().query().unwrap_or(""));
    let subresource = query
        .iter()
        .find_map(|(k, _)| SUBRESOURCES.iter().find(|s| **s == k.as_str()))
        .copied();

    if let Some(name) = &bucket_name {
        validate_bucket_name(name).map_err(|e| S3Error(Error::InvalidBucketName(e)))?;
    }

    // Authentication. The two anonymous bypasses admit plain reads without
    // credentials; everything else carries a verified identity.
    let identity: Option<Identity> = match &state.verifier {
        None => Some(Identity::Admin),
        Some(verifier) => {
            let read_only = matches!(method, Method::GET | Method::HEAD);
            let bypass = match (&bucket_name, read_only) {
                (Some(bucket), true) => {
                    let rtx = state.read()?;
                    (key.is_some() && auth::public_read_bypass(&rtx, bucket)?)
                        || (subresource.is_none() && auth::website_bypass(&rtx, bucket)?)
                }
                _ => false,
            };
            if bypass {
                None
            } else {
                Some(verifier.verify(&req, source_ip).map_err(S3Error::from)?)
            }
        }
    };

    if let Some(identity) = &identity {
        let action = auth::s3_action(&method, key.is_some(), subresource);
        let resource = auth::resource_arn(bucket_name.as_deref(), key.as_deref());
        auth::authorize(identity, action, &resource)?;
    }

    // Service-level requests.
    let Some(bucket_name) = bucket_name else {
        return if method == Method::GET {
            let ctx = ReqCtx {
                state,
                identity,
                method,
                bucket: String::new(),
                key: None,
                query,
                headers: req.headers().clone(),
                body: bytes::Bytes::new(),
            };
            service::list_buckets(&ctx).await
        } else {
            Err(S3Error(Error::MethodNotAllowed(method.to_string())))
        };
    };

    let headers = req.headers().clone();
    let body = collect_body(&state, req).await?;
    let ctx = ReqCtx {
        state,
        identity,
        method: method.clone(),
        bucket: bucket_name,
        key,
        query,
        headers,
        body,
    };

    match (&ctx.key, subresource) {
        (Some(_), sub) => route_object(&ctx, &method, sub).await,
        (None, sub) => route_bucket(&ctx, &method, sub).await,
    }
}

async fn route_object(ctx: &ReqCtx, method: &Method, sub: Option<&str>) -> S3Result<Response> {
    match sub {
        Some("uploads") if *method == Method::POST => multipart::initiate(ctx).await,
        Some("uploadId") => {
            let upload_id = ctx
                .query_value("uploadId")
                .unwrap_or_default()
                .to_string();
            match *method {
                Method::PUT => multipart::upload_part(ctx, &upload_id).await,
                Method::POST => multipart::complete(ctx).await,
                Method::DELETE => multipart::abort(ctx, &upload_id).await,
                Method::GET => multipart::list_parts(ctx, &upload_id).await,
                _ => Err(method_not_allowed(method)),
            }
        }
        Some("tagging") => match *method {
            Method::GET => object::get_object_tagging(ctx).await,
            Method::PUT => object::put_object_tagging(ctx).await,
            Method::DELETE => object::delete_object_tagging(ctx).await,
            _ => Err(method_not_allowed(method)),
        },
        Some("legal-hold") => match *method {
            Method::GET => object::get_legal_hold(ctx).await,
            Method::PUT => object::put_legal_hold(ctx).await,
            _ => Err(method_not_allowed(method)),
        },
        Some("retention") => match *method {
            Method::GET => object::get_retention(ctx).await,
            Method::PUT => object::put_retention(ctx).await,
            _ => Err(method_not_allowed(method)),
        },
        Some("attributes") if *method == Method::GET => object::get_object_attributes(ctx).await,
        Some("acl") => canned_acl(ctx, method),
        Some("restore") if *method == Method::POST => Ok(StatusCode::ACCEPTED.into_response()),
        Some("select") => Err(S3Error(Error::InvalidArgument(
            "S3 Select is not supported".into(),
        ))),
        _ => match *method {
            Method::GET => object::get_object(ctx, false).await,
            Method::HEAD => object::get_object(ctx, true).await,
            Method::PUT => object::put_object(ctx).await,
            Method::DELETE => object::delete_object(ctx).await,
            _ => Err(method_not_allowed(method)),
        },
    }
}

async fn route_bucket(ctx: &ReqCtx, method: &Method, sub: Option<&str>) -> S3Result<Response> {
    if let Some(kind) = sub.and_then(bucket::config_kind) {
        return match *method {
            Method::PUT => bucket::put_config(ctx, &kind).await,
            Method::GET => bucket::get_config(ctx, &kind).await,
            Method::DELETE => bucket::delete_config(ctx, &kind).await,
            _ => Err(method_not_allowed(method)),
        };
    }

    match sub {
        Some("policy") => match *method {
            Method::PUT => bucket::put_policy(ctx).await,
            Method::GET => bucket::get_policy(ctx).await,
            Method::DELETE => bucket::delete_policy(ctx).await,
            _ => Err(method_not_allowed(method)),
        },
        Some("versioning") => match *method {
            Method::PUT => bucket::put_versioning(ctx).await,
            Method::GET => bucket::get_versioning(ctx).await,
            _ => Err(method_not_allowed(method)),
        },
        Some("tagging") => match *method {
            Method::PUT => bucket::put_tagging(ctx).await,
            Method::GET => bucket::get_tagging(ctx).await,
            Method::DELETE => bucket::delete_tagging(ctx).await,
            _ => Err(method_not_allowed(method)),
        },
        Some("quota") => match *method {
            Method::PUT => bucket::put_quota(ctx).await,
            Method::GET => bucket::get_quota(ctx).await,
            _ => Err(method_not_allowed(method)),
        },
        Some("lambda") => match *method {
            Method::PUT => bucket::put_lambda_trigger(ctx).await,
            Method::GET => bucket::get_lambda_trigger(ctx).await,
            Method::DELETE => bucket::delete_lambda_trigger(ctx).await,
            _ => Err(method_not_allowed(method)),
        },
        Some("object-lock") => match *method {
            Method::PUT => bucket::put_object_lock_config(ctx).await,
            Method::GET => bucket::get_object_lock_config(ctx).await,
            _ => Err(method_not_allowed(method)),
        },
        Some("acl") => canned_acl(ctx, method),
        Some("location") if *method == Method::GET => bucket::get_location(ctx).await,
        Some("uploads") if *method == Method::GET => multipart::list_uploads(ctx).await,
        Some("versions") if *method == Method::GET => bucket::list_versions(ctx).await,
        Some("delete") if *method == Method::POST => object::delete_objects(ctx).await,
        _ => match *method {
            Method::GET => bucket::list_objects(ctx).await,
            Method::HEAD => bucket::head_bucket(ctx).await,
            Method::PUT => bucket::create_bucket(ctx).await,
            Method::DELETE => bucket::delete_bucket(ctx).await,
            _ => Err(method_not_allowed(method)),
        },
    }
}

fn method_not_allowed(method: &Method) -> S3Error {
    S3Error(Error::MethodNotAllowed(method.to_string()))
}

/// ACLs are not a real permission surface here (IAM policies are); reads
/// get a fixed full-control document and writes are accepted and ignored.
fn canned_acl(ctx: &ReqCtx, method: &Method) -> S3Result<Response> {
    ctx.require_bucket()?;
    match *method {
        Method::GET => {
            let body = format!(
                "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
                 <AccessControlPolicy xmlns=\"{}\">\
                 <Owner><ID>objvault</ID><DisplayName>objvault</DisplayName></Owner>\
                 <AccessControlList><Grant>\
                 <Grantee xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\" xsi:type=\"CanonicalUser\">\
                 <ID>objvault</ID></Grantee>\
                 <Permission>FULL_CONTROL</Permission>\
                 </Grant></AccessControlList></AccessControlPolicy>",
                crate::xml::S3_XMLNS
            );
            Ok((
                [(header::CONTENT_TYPE, "application/xml")],
                body,
            )
                .into_response())
        }
        Method::PUT => Ok(StatusCode::OK.into_response()),
        _ => Err(method_not_allowed(method)),
    }
}

/// Resolve `(bucket, key)` from the Host header (virtual-hosted style when
/// a base domain is configured) or the path.
fn resolve_target<B>(req: &Request<B>, base_domain: &str) -> (Option<String>, Option<String>) {
    let path = req.uri().path();

    if !base_domain.is_empty() {
        let host = req
            .headers()
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .map(|h| h.split(':').next().unwrap_or(h))
            .unwrap_or_default();
        let suffix = format!(".{base_domain}");
        if let Some(bucket) = host.strip_suffix(suffix.as_str()) {
            if !bucket.is_empty() {
                let key = path.trim_start_matches('/');
                let key = if key.is_empty() {
                    None
                } else {
                    Some(decode_component(key))
                };
                return (Some(bucket.to_string()), key);
            }
        }
    }

    let trimmed = path.trim_start_matches('/');
    if trimmed.is_empty() {
        return (None, None);
    }
    match trimmed.split_once('/') {
        Some((bucket, rest)) if !rest.is_empty() => {
            (Some(decode_component(bucket)), Some(decode_component(rest)))
        }
        Some((bucket, _)) => (Some(decode_component(bucket)), None),
        None => (Some(decode_component(trimmed)), None),
    }
}

fn decode_component(s: &str) -> String {
    urlencoding::decode(s)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| s.to_string())
}

/// Decoded query pairs, original order. Bare keys get empty values.
fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|p| !p.is_empty())
        .map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            (decode_component(k), decode_component(v))
        })
        .collect()
}

async fn collect_body(state: &AppState, req: Request<Body>) -> S3Result<bytes::Bytes> {
    let max = state.config.limits.max_object_size;
    // One byte of slack distinguishes "too large" from "exactly at the cap".
    let limit = usize::try_from(max).unwrap_or(usize::MAX).saturating_add(1);
    axum::body::to_bytes(req.into_body(), limit)
        .await
        .map_err(|_| S3Error(Error::EntityTooLarge { max_size: max }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(uri: &str, host: Option<&str>) -> Request<()> {
        let mut builder = Request::builder().uri(uri);
        if let Some(host) = host {
            builder = builder.header("host", host);
        }
        builder.body(()).unwrap()
    }

    #[test]
    fn test_path_style() {
        let req = request("/my-bucket/path/to/key.txt", None);
        let (bucket, key) = resolve_target(&req, "");
        assert_eq!(bucket.as_deref(), Some("my-bucket"));
        assert_eq!(key.as_deref(), Some("path/to/key.txt"));

        let req = request("/my-bucket", None);
        let (bucket, key) = resolve_target(&req, "");
        assert_eq!(bucket.as_deref(), Some("my-bucket"));
        assert_eq!(key, None);

        let req = request("/my-bucket/", None);
        let (bucket, key) = resolve_target(&req, "");
        assert_eq!(bucket.as_deref(), Some("my-bucket"));
        assert_eq!(key, None);

        let req = request("/", None);
        assert_eq!(resolve_target(&req, ""), (None, None));
    }

    #[test]
    fn test_virtual_hosted_style() {
        let req = request("/path/key", Some("photos.s3.example.com:9000"));
        let (bucket, key) = resolve_target(&req, "s3.example.com");
        assert_eq!(bucket.as_deref(), Some("photos"));
        assert_eq!(key.as_deref(), Some("path/key"));

        // Host not under the base domain falls back to path style.
        let req = request("/b/k", Some("other.example.org"));
        let (bucket, key) = resolve_target(&req, "s3.example.com");
        assert_eq!(bucket.as_deref(), Some("b"));
        assert_eq!(key.as_deref(), Some("k"));
    }

    #[test]
    fn test_key_percent_decoding() {
        let req = request("/b/a%20file%2Bplus", None);
        let (_, key) = resolve_target(&req, "");
        // '+' in a path is literal; only percent escapes decode.
        assert_eq!(key.as_deref(), Some("a file+plus"));
    }

    #[test]
    fn test_subresource_detection() {
        let query = parse_query("versioning");
        assert_eq!(query, vec![("versioning".to_string(), String::new())]);
        let sub = query
            .iter()
            .find_map(|(k, _)| SUBRESOURCES.iter().find(|s| **s == k.as_str()))
            .copied();
        assert_eq!(sub, Some("versioning"));

        let query = parse_query("uploadId=abc&partNumber=2");
        let sub = query
            .iter()
            .find_map(|(k, _)| SUBRESOURCES.iter().find(|s| **s == k.as_str()))
            .copied();
        assert_eq!(sub, Some("uploadId"));
    }
}
