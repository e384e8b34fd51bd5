//! HTTP surface of the admission webhook.

use super::validators::{AdmissionCheck, Validators};
use crate::error::ControllerError;
use crate::metrics::ControllerMetrics;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_server::Handle;
use axum_server::tls_rustls::RustlsConfig;
use crds::{
    AddressPool, BFDProfile, BGPAdvertisement, BGPPeer, Community, IPAddressPool,
    L2Advertisement,
};
use kube::Resource;
use kube::api::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview};
use serde::de::DeserializeOwned;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

const TLS_CERT_FILE: &str = "tls.crt";
const TLS_KEY_FILE: &str = "tls.key";
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

pub struct WebhookState {
    pub validators: Validators,
    pub metrics: Arc<ControllerMetrics>,
}

/// `/validate-<group with dashes>-<version>-<kind>` for `K`.
pub fn validation_path<K: Resource<DynamicType = ()>>() -> String {
    format!(
        "/validate-{}-{}-{}",
        K::group(&()).replace('.', "-"),
        K::version(&()),
        K::kind(&()).to_lowercase()
    )
}

pub fn router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route(&validation_path::<IPAddressPool>(), post(validate::<IPAddressPool>))
        .route(&validation_path::<AddressPool>(), post(validate::<AddressPool>))
        .route(&validation_path::<BGPPeer>(), post(validate::<BGPPeer>))
        .route(&validation_path::<BGPAdvertisement>(), post(validate::<BGPAdvertisement>))
        .route(&validation_path::<L2Advertisement>(), post(validate::<L2Advertisement>))
        .route(&validation_path::<Community>(), post(validate::<Community>))
        .route(&validation_path::<BFDProfile>(), post(validate::<BFDProfile>))
        .route("/healthz", get(healthz))
        .route("/readyz", get(healthz))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn metrics(State(state): State<Arc<WebhookState>>) -> impl IntoResponse {
    match state.metrics.gather_text() {
        Ok(text) => (StatusCode::OK, text),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

fn typed<K: DeserializeOwned>(object: Option<&DynamicObject>) -> Result<Option<K>, serde_json::Error> {
    object
        .map(|o| serde_json::to_value(o).and_then(serde_json::from_value))
        .transpose()
}

async fn validate<K>(
    State(state): State<Arc<WebhookState>>,
    Json(review): Json<AdmissionReview<DynamicObject>>,
) -> Json<AdmissionReview<DynamicObject>>
where
    K: Resource<DynamicType = ()> + DeserializeOwned + Send + Sync + 'static,
    Validators: AdmissionCheck<K>,
{
    let kind = K::kind(&()).to_string();
    let request: AdmissionRequest<DynamicObject> = match review.try_into() {
        Ok(request) => request,
        Err(e) => {
            warn!("Malformed {} admission review: {}", kind, e);
            return Json(AdmissionResponse::invalid(e.to_string()).into_review());
        }
    };

    let (object, old) = match (typed::<K>(request.object.as_ref()), typed::<K>(request.old_object.as_ref())) {
        (Ok(object), Ok(old)) => (object, old),
        (Err(e), _) | (_, Err(e)) => {
            warn!("Failed to decode {} {}: {}", kind, request.name, e);
            return Json(AdmissionResponse::invalid(format!("failed to decode {kind}: {e}")).into_review());
        }
    };

    let verdict = state
        .validators
        .admit(&request.operation, object.as_ref(), old.as_ref())
        .await;
    let allowed = verdict.is_ok();
    state
        .metrics
        .admission_total
        .with_label_values(&[kind.as_str(), if allowed { "true" } else { "false" }])
        .inc();

    let response = match verdict {
        Ok(()) => {
            debug!("Admitted {:?} of {} {}", request.operation, kind, request.name);
            AdmissionResponse::from(&request)
        }
        Err(reason) => {
            info!("Denied {:?} of {} {}: {}", request.operation, kind, request.name, reason);
            AdmissionResponse::from(&request).deny(reason)
        }
    };
    Json(response.into_review())
}

fn tls_files(cert_dir: Option<&Path>) -> Option<(PathBuf, PathBuf)> {
    let dir = cert_dir?;
    let cert = dir.join(TLS_CERT_FILE);
    let key = dir.join(TLS_KEY_FILE);
    (cert.is_file() && key.is_file()).then_some((cert, key))
}

/// Serves the webhook until `cancel` fires. TLS is used when `cert_dir`
/// holds a certificate and key, plain HTTP otherwise.
pub async fn serve(
    state: Arc<WebhookState>,
    port: u16,
    cert_dir: Option<&Path>,
    cancel: CancellationToken,
) -> Result<(), ControllerError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = router(state);

    match tls_files(cert_dir) {
        Some((cert, key)) => {
            let tls = RustlsConfig::from_pem_file(&cert, &key)
                .await
                .map_err(|e| ControllerError::Webhook(format!("loading {}: {e}", cert.display())))?;
            let handle = Handle::new();
            let shutdown = handle.clone();
            tokio::spawn(async move {
                cancel.cancelled().await;
                shutdown.graceful_shutdown(Some(SHUTDOWN_GRACE));
            });

            info!("Webhook listening on https://{}", addr);
            axum_server::bind_rustls(addr, tls)
                .handle(handle)
                .serve(app.into_make_service())
                .await
                .map_err(|e| ControllerError::Webhook(e.to_string()))
        }
        None => {
            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .map_err(|e| ControllerError::Webhook(format!("binding {addr}: {e}")))?;
            warn!("No TLS material found, webhook listening on plain http://{}", addr);
            axum::serve(listener, app)
                .with_graceful_shutdown(cancel.cancelled_owned())
                .await
                .map_err(|e| ControllerError::Webhook(e.to_string()))
        }
    }
}
