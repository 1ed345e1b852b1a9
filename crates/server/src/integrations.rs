use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use sha2::Sha256;
use tracing::{debug, warn};

use atende_core::config::{NotificationsConfig, PaymentConfig};
use atende_core::errors::ApplicationError;
use atende_core::integrations::{PaymentCollaborator, PixCharge, PixRequest};
use atende_core::notify::{Notification, NotificationSink};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Atende-Signature";

/// `sha256=<hex hmac of body>`, or `None` without a usable secret.
pub fn sign(secret: &SecretString, body: &[u8]) -> Option<String> {
    let key = secret.expose_secret();
    if key.is_empty() {
        return None;
    }
    let mut mac = HmacSha256::new_from_slice(key.as_bytes()).ok()?;
    mac.update(body);
    Some(format!("sha256={}", encode_hex(mac.finalize().into_bytes().as_slice())))
}

fn encode_hex(bytes: &[u8]) -> String {
    let mut output = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        output.push_str(&format!("{byte:02x}"));
    }
    output
}

/// Posts every notification as signed JSON to one webhook. Delivery runs on a spawned task;
/// failures are logged and dropped.
#[derive(Clone)]
pub struct WebhookNotificationSink {
    client: Client,
    url: String,
    secret: Option<SecretString>,
}

impl WebhookNotificationSink {
    pub fn new(url: impl Into<String>, secret: Option<SecretString>, timeout: Duration) -> Self {
        let client = Client::builder().timeout(timeout).build().unwrap_or_default();
        Self { client, url: url.into(), secret }
    }

    pub fn from_config(config: &NotificationsConfig) -> Option<Self> {
        let url = config.webhook_url.as_deref()?.trim();
        if url.is_empty() {
            return None;
        }
        Some(Self::new(
            url,
            config.signing_secret.clone(),
            Duration::from_secs(config.timeout_secs),
        ))
    }

    async fn post(&self, notification: Notification) {
        let body = match serde_json::to_vec(&notification) {
            Ok(body) => body,
            Err(error) => {
                warn!(
                    event_name = "notify.webhook_encode_failed",
                    event_id = %notification.event_id,
                    error = %error,
                    "could not encode notification"
                );
                return;
            }
        };

        let mut request = self
            .client
            .post(&self.url)
            .header("content-type", "application/json")
            .body(body.clone());
        if let Some(signature) = self.secret.as_ref().and_then(|secret| sign(secret, &body)) {
            request = request.header(SIGNATURE_HEADER, signature);
        }

        match request.send().await {
            Ok(response) if response.status().is_success() => debug!(
                event_name = "notify.webhook_delivered",
                event_id = %notification.event_id,
                kind = notification.kind.as_str(),
                "notification delivered"
            ),
            Ok(response) => warn!(
                event_name = "notify.webhook_rejected",
                event_id = %notification.event_id,
                kind = notification.kind.as_str(),
                status = response.status().as_u16(),
                "notification webhook rejected delivery"
            ),
            Err(error) => warn!(
                event_name = "notify.webhook_failed",
                event_id = %notification.event_id,
                kind = notification.kind.as_str(),
                error = %error,
                "notification webhook unreachable"
            ),
        }
    }
}

impl NotificationSink for WebhookNotificationSink {
    fn notify(&self, notification: Notification) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(
                event_name = "notify.webhook_no_runtime",
                event_id = %notification.event_id,
                "notification dropped outside a runtime"
            );
            return;
        };
        let sink = self.clone();
        runtime.spawn(async move { sink.post(notification).await });
    }
}

/// PIX charges through an HTTP payment provider: `POST {endpoint}/pix`.
pub struct HttpPaymentCollaborator {
    client: Client,
    endpoint: String,
    api_key: Option<SecretString>,
}

#[derive(Serialize)]
struct PixChargeRequest<'a> {
    tenant_id: &'a str,
    user_id: &'a str,
    item_id: &'a str,
    amount: Decimal,
    pix_key: Option<&'a str>,
    merchant_name: Option<&'a str>,
}

impl HttpPaymentCollaborator {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub fn from_config(config: &PaymentConfig) -> Result<Option<Self>, reqwest::Error> {
        match config.endpoint.as_deref().map(str::trim).filter(|endpoint| !endpoint.is_empty()) {
            Some(endpoint) => Ok(Some(Self::new(
                endpoint,
                config.api_key.clone(),
                Duration::from_secs(config.timeout_secs),
            )?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl PaymentCollaborator for HttpPaymentCollaborator {
    async fn generate_pix(&self, request: PixRequest) -> Result<PixCharge, ApplicationError> {
        let payload = PixChargeRequest {
            tenant_id: &request.tenant_id.0,
            user_id: &request.user_id.0,
            item_id: &request.item_id,
            amount: request.amount,
            pix_key: request.settings.pix_key.as_deref(),
            merchant_name: request.settings.merchant_name.as_deref(),
        };
        let mut call = self.client.post(format!("{}/pix", self.endpoint)).json(&payload);
        if let Some(key) = &self.api_key {
            call = call.bearer_auth(key.expose_secret());
        }

        let integration = |error: reqwest::Error| ApplicationError::Integration(error.to_string());
        let response = call.send().await.map_err(integration)?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApplicationError::Integration(format!(
                "payment provider returned {}",
                status.as_u16()
            )));
        }
        response.json::<PixCharge>().await.map_err(integration)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use rust_decimal::Decimal;
    use secrecy::SecretString;
    use serde_json::{json, Value};
    use tokio::sync::{mpsc, Mutex};

    use atende_core::domain::session::UserId;
    use atende_core::domain::tenant::{PaymentSettings, TenantId};
    use atende_core::errors::ApplicationError;
    use atende_core::integrations::{PaymentCollaborator, PixRequest};
    use atende_core::notify::{Notification, NotificationKind, NotificationSink};

    use super::{sign, HttpPaymentCollaborator, WebhookNotificationSink, SIGNATURE_HEADER};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let address = listener.local_addr().expect("address");
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        format!("http://{address}")
    }

    #[test]
    fn signatures_are_stable_hex_hmacs() {
        let secret = SecretString::from("segredo".to_string());
        let first = sign(&secret, b"{\"a\":1}").expect("signature");
        assert!(first.starts_with("sha256="));
        assert_eq!(first.len(), "sha256=".len() + 64);
        assert_eq!(sign(&secret, b"{\"a\":1}"), Some(first.clone()));
        assert_ne!(sign(&secret, b"{\"a\":2}"), Some(first));
        assert_eq!(sign(&SecretString::from(String::new()), b"x"), None);
    }

    #[tokio::test]
    async fn webhook_sink_posts_signed_notifications_in_the_background() {
        let (seen, mut received) = mpsc::unbounded_channel::<(Option<String>, Vec<u8>)>();
        let router = Router::new()
            .route(
                "/hooks",
                post(
                    |State(seen): State<mpsc::UnboundedSender<(Option<String>, Vec<u8>)>>,
                     headers: HeaderMap,
                     body: axum::body::Bytes| async move {
                        let signature = headers
                            .get(SIGNATURE_HEADER)
                            .and_then(|value| value.to_str().ok())
                            .map(str::to_owned);
                        let _ = seen.send((signature, body.to_vec()));
                        StatusCode::NO_CONTENT
                    },
                ),
            )
            .with_state(seen);
        let base = serve(router).await;
        let secret = SecretString::from("segredo".to_string());
        let sink = WebhookNotificationSink::new(
            format!("{base}/hooks"),
            Some(secret.clone()),
            Duration::from_secs(5),
        );

        sink.notify(
            Notification::new(
                TenantId("escola".to_string()),
                Some(UserId("5511900000001".to_string())),
                NotificationKind::HumanTransferRequested,
            )
            .with_field("reason", "menu"),
        );

        let (signature, body) = tokio::time::timeout(Duration::from_secs(5), received.recv())
            .await
            .expect("delivered in time")
            .expect("one delivery");
        assert_eq!(signature, sign(&secret, &body));
        let payload: Value = serde_json::from_slice(&body).expect("json body");
        assert_eq!(payload["kind"], "human_transfer_requested");
        assert_eq!(payload["tenant_id"], "escola");
        assert_eq!(payload["payload"]["reason"], "menu");
    }

    #[tokio::test]
    async fn payment_collaborator_posts_charge_requests() {
        let requests = Arc::new(Mutex::new(Vec::<Value>::new()));
        let router = Router::new()
            .route(
                "/v1/pix",
                post(|State(requests): State<Arc<Mutex<Vec<Value>>>>, Json(body): Json<Value>| {
                    async move {
                        requests.lock().await.push(body);
                        Json(json!({
                            "success": true,
                            "order_id": "ord-1",
                            "copy_paste": "00020126pix"
                        }))
                    }
                }),
            )
            .route("/broken/pix", post(|| async { StatusCode::BAD_GATEWAY }))
            .with_state(Arc::clone(&requests));
        let base = serve(router).await;
        let request = PixRequest {
            tenant_id: TenantId("escola".to_string()),
            user_id: UserId("5511900000001".to_string()),
            item_id: "ingles".to_string(),
            amount: Decimal::new(35000, 2),
            settings: PaymentSettings {
                enabled: true,
                pix_key: Some("escola@pix".to_string()),
                merchant_name: None,
            },
        };

        let payments =
            HttpPaymentCollaborator::new(format!("{base}/v1/"), None, Duration::from_secs(5))
                .expect("client");
        let charge = payments.generate_pix(request.clone()).await.expect("charge");
        assert!(charge.success);
        assert_eq!(charge.order_id, "ord-1");
        assert_eq!(charge.qr_code, None);
        let sent = requests.lock().await;
        assert_eq!(sent[0]["item_id"], "ingles");
        assert_eq!(sent[0]["pix_key"], "escola@pix");

        let broken =
            HttpPaymentCollaborator::new(format!("{base}/broken"), None, Duration::from_secs(5))
                .expect("client");
        let error = broken.generate_pix(request).await.expect_err("provider failure");
        assert!(matches!(error, ApplicationError::Integration(message) if message.contains("502")));
    }
}
