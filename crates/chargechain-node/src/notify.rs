//! Outbound SMS notifications for recorded charges.

use crate::constants::SMS_TIMEOUT_SECS;
use chargechain_core::Transaction;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub(crate) enum NotificationError {
    #[error("SMS request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("SMS provider rejected the message with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

pub(crate) fn charge_message(tx: &Transaction) -> String {
    format!(
        "Blockchain charge: ${:.2} from {} to {}",
        tx.amount_usd, tx.from_number, tx.to_number
    )
}

/// Client for the Twilio Messages resource.
#[derive(Clone, Debug)]
pub(crate) struct TwilioNotifier {
    client: reqwest::Client,
    api_base: String,
    account_sid: String,
    auth_token: String,
    sender: Option<String>,
}

impl TwilioNotifier {
    pub(crate) fn new(
        api_base: &str,
        account_sid: String,
        auth_token: String,
        sender: Option<String>,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(SMS_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            account_sid,
            auth_token,
            sender,
        })
    }

    fn messages_url(&self) -> String {
        format!("{}/Accounts/{}/Messages.json", self.api_base, self.account_sid)
    }

    async fn send(&self, from: &str, to: &str, body: &str) -> Result<(), NotificationError> {
        let res = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("To", to), ("From", from), ("Body", body)])
            .send()
            .await?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(NotificationError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub(crate) enum Notifier {
    Twilio(TwilioNotifier),
    Disabled,
}

impl Notifier {
    /// Twilio when both credentials are present, disabled otherwise.
    pub(crate) fn from_credentials(
        api_base: &str,
        account_sid: Option<String>,
        auth_token: Option<String>,
        sender: Option<String>,
    ) -> anyhow::Result<Self> {
        match (account_sid, auth_token) {
            (Some(sid), Some(token)) if !sid.is_empty() && !token.is_empty() => Ok(
                Notifier::Twilio(TwilioNotifier::new(api_base, sid, token, sender)?),
            ),
            _ => Ok(Notifier::Disabled),
        }
    }

    pub(crate) fn is_enabled(&self) -> bool {
        matches!(self, Notifier::Twilio(_))
    }

    /// Texts the recipient about `tx`. The sender is the configured number, or
    /// the payer's number when none is configured.
    pub(crate) async fn notify_charge(&self, tx: &Transaction) -> Result<(), NotificationError> {
        let body = charge_message(tx);
        match self {
            Notifier::Twilio(twilio) => {
                let from = twilio.sender.as_deref().unwrap_or(tx.from_number.as_str());
                twilio.send(from, &tx.to_number, &body).await?;
                info!(to = %tx.to_number, "SMS sent");
            }
            Notifier::Disabled => debug!(%body, "notifications disabled; not sending"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::{Path, State},
        http::{header::AUTHORIZATION, HeaderMap, StatusCode},
        routing::post,
        Form, Router,
    };
    use serde::Deserialize;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    #[derive(Debug, Deserialize)]
    struct SmsForm {
        #[serde(rename = "To")]
        to: String,
        #[serde(rename = "From")]
        from: String,
        #[serde(rename = "Body")]
        body: String,
    }

    #[derive(Debug)]
    struct SeenRequest {
        sid: String,
        authorization: Option<String>,
        form: SmsForm,
    }

    type Seen = Arc<Mutex<Vec<SeenRequest>>>;

    async fn fake_messages(
        State((seen, status)): State<(Seen, StatusCode)>,
        Path(sid): Path<String>,
        headers: HeaderMap,
        Form(form): Form<SmsForm>,
    ) -> (StatusCode, &'static str) {
        let authorization = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        seen.lock().await.push(SeenRequest {
            sid,
            authorization,
            form,
        });
        (status, "{}")
    }

    async fn spawn_provider(status: StatusCode) -> (String, Seen) {
        let seen: Seen = Arc::default();
        let app = Router::new()
            .route("/Accounts/{sid}/Messages.json", post(fake_messages))
            .with_state((seen.clone(), status));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), seen)
    }

    fn tx() -> Transaction {
        Transaction {
            from_number: "+1000".to_string(),
            to_number: "+2000".to_string(),
            amount_usd: 9.5,
            bytes: None,
            timestamp: 1,
        }
    }

    #[test]
    fn charge_message_example() {
        assert_eq!(
            charge_message(&tx()),
            "Blockchain charge: $9.50 from +1000 to +2000"
        );
    }

    #[test]
    fn missing_credentials_disable_notifier() -> anyhow::Result<()> {
        let base = "http://localhost";
        assert!(!Notifier::from_credentials(base, None, None, None)?.is_enabled());
        assert!(!Notifier::from_credentials(base, Some("AC1".into()), None, None)?.is_enabled());
        assert!(
            !Notifier::from_credentials(base, Some("".into()), Some("t".into()), None)?.is_enabled()
        );
        assert!(
            Notifier::from_credentials(base, Some("AC1".into()), Some("t".into()), None)?
                .is_enabled()
        );
        Ok(())
    }

    #[test]
    fn messages_url_example() -> anyhow::Result<()> {
        let twilio = TwilioNotifier::new(
            "https://api.twilio.com/2010-04-01/",
            "AC123".into(),
            "secret".into(),
            None,
        )?;
        assert_eq!(
            twilio.messages_url(),
            "https://api.twilio.com/2010-04-01/Accounts/AC123/Messages.json"
        );
        Ok(())
    }

    #[tokio::test]
    async fn disabled_notifier_succeeds_without_sending() {
        assert!(Notifier::Disabled.notify_charge(&tx()).await.is_ok());
    }

    #[tokio::test]
    async fn twilio_notifier_posts_form_with_basic_auth() -> anyhow::Result<()> {
        let (base, seen) = spawn_provider(StatusCode::CREATED).await;
        let notifier =
            Notifier::from_credentials(&base, Some("AC123".into()), Some("secret".into()), None)?;

        notifier.notify_charge(&tx()).await?;

        let seen = seen.lock().await;
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].sid, "AC123");
        assert_eq!(
            seen[0].authorization.as_deref(),
            Some("Basic QUMxMjM6c2VjcmV0")
        );
        assert_eq!(seen[0].form.to, "+2000");
        assert_eq!(seen[0].form.from, "+1000");
        assert_eq!(
            seen[0].form.body,
            "Blockchain charge: $9.50 from +1000 to +2000"
        );
        Ok(())
    }

    #[tokio::test]
    async fn twilio_notifier_uses_configured_sender() -> anyhow::Result<()> {
        let (base, seen) = spawn_provider(StatusCode::CREATED).await;
        let notifier = Notifier::from_credentials(
            &base,
            Some("AC123".into()),
            Some("secret".into()),
            Some("+15550001111".into()),
        )?;
        notifier.notify_charge(&tx()).await?;
        assert_eq!(seen.lock().await[0].form.from, "+15550001111");
        Ok(())
    }

    #[tokio::test]
    async fn twilio_rejection_is_reported() -> anyhow::Result<()> {
        let (base, _seen) = spawn_provider(StatusCode::BAD_REQUEST).await;
        let notifier =
            Notifier::from_credentials(&base, Some("AC123".into()), Some("secret".into()), None)?;
        let err = notifier.notify_charge(&tx()).await.unwrap_err();
        assert!(matches!(err, NotificationError::Rejected { status: 400, .. }));
        Ok(())
    }

    #[tokio::test]
    async fn unreachable_provider_is_reported() -> anyhow::Result<()> {
        let notifier = Notifier::from_credentials(
            "http://127.0.0.1:1",
            Some("AC123".into()),
            Some("secret".into()),
            None,
        )?;
        let err = notifier.notify_charge(&tx()).await.unwrap_err();
        assert!(matches!(err, NotificationError::Http(_)));
        Ok(())
    }
}
