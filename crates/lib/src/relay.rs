//! Reply and compose: outbound mail restricted to an allow-list.
//!
//! The policy is an immutable value built once from config. Allowed sends are handed to
//! `notify::dispatch` and acknowledged immediately; refused sends never reach the notifier.

use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::notify::{self, Notifier, OutboundEmail};
use crate::pipeline::extract_email;
use crate::store::{MessageStore, StoreError};

const REPLY_PREFIX: &str = "Re: ";
const NO_SUBJECT: &str = "(no subject)";

/// Recipient allow-list and listing bounds.
#[derive(Debug, Clone)]
pub struct RelayPolicy {
    allow_list: Vec<String>,
    list_limit: usize,
    max_list_limit: usize,
}

impl RelayPolicy {
    pub fn new(allow_list: Vec<String>, list_limit: usize, max_list_limit: usize) -> Self {
        let allow_list = allow_list
            .iter()
            .map(|a| extract_email(a).to_lowercase())
            .filter(|a| !a.is_empty())
            .collect();
        let max_list_limit = max_list_limit.max(1);
        Self {
            allow_list,
            list_limit: list_limit.clamp(1, max_list_limit),
            max_list_limit,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.relay.allow_list.clone(),
            config.relay.list_limit,
            config.relay.max_list_limit,
        )
    }

    /// Case-insensitive match on the bare address.
    pub fn is_allowed(&self, address: &str) -> bool {
        let address = extract_email(address).to_lowercase();
        !address.is_empty() && self.allow_list.iter().any(|a| *a == address)
    }

    /// Requested listing size clamped to 1..=max; default when absent.
    pub fn list_limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.list_limit)
            .clamp(1, self.max_list_limit)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("missing {0}")]
    MissingField(&'static str),
    #[error("message not found: {0}")]
    NotFound(String),
    #[error("recipient not allowed: {0}")]
    NotAllowed(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A send handed to the notifier. `delivery` completes when the attempt has been logged.
pub struct Queued {
    pub to: String,
    pub delivery: JoinHandle<()>,
}

/// Subject for a reply: `Re: <subject>` without stacking prefixes.
pub fn reply_subject(original: &str) -> String {
    let original = original.trim();
    if original.is_empty() {
        return format!("{}{}", REPLY_PREFIX, NO_SUBJECT);
    }
    if original
        .get(..REPLY_PREFIX.len())
        .map_or(false, |p| p.eq_ignore_ascii_case(REPLY_PREFIX))
    {
        original.to_string()
    } else {
        format!("{}{}", REPLY_PREFIX, original)
    }
}

pub struct Relay {
    policy: RelayPolicy,
    store: Arc<dyn MessageStore>,
    notifier: Arc<dyn Notifier>,
}

impl Relay {
    pub fn new(
        policy: RelayPolicy,
        store: Arc<dyn MessageStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            policy,
            store,
            notifier,
        }
    }

    pub fn policy(&self) -> &RelayPolicy {
        &self.policy
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    /// Reply to a stored message's sender.
    pub async fn reply(&self, message_id: &str, body: &str) -> Result<Queued, RelayError> {
        let message_id = message_id.trim();
        if message_id.is_empty() {
            return Err(RelayError::MissingField("messageId"));
        }
        if body.trim().is_empty() {
            return Err(RelayError::MissingField("body"));
        }
        let message = self
            .store
            .get(message_id)
            .await?
            .ok_or_else(|| RelayError::NotFound(message_id.to_string()))?;
        self.send(&message.from_email, &reply_subject(&message.subject), body)
    }

    /// New message with no stored counterpart.
    pub fn compose(&self, to: &str, subject: &str, body: &str) -> Result<Queued, RelayError> {
        if to.trim().is_empty() {
            return Err(RelayError::MissingField("to"));
        }
        if body.trim().is_empty() {
            return Err(RelayError::MissingField("body"));
        }
        self.send(to, subject.trim(), body)
    }

    fn send(&self, to: &str, subject: &str, body: &str) -> Result<Queued, RelayError> {
        if !self.policy.is_allowed(to) {
            log::warn!("refusing to send to {}: not on allow-list", to);
            return Err(RelayError::NotAllowed(to.to_string()));
        }
        let to = extract_email(to);
        let delivery = notify::dispatch(
            self.notifier.clone(),
            OutboundEmail {
                to: to.clone(),
                subject: subject.to_string(),
                body: body.to_string(),
            },
        );
        Ok(Queued { to, delivery })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::build_fallback;
    use crate::message::{Envelope, Message};
    use crate::notify::{DeliveryStatus, NotifyError};
    use crate::store::MemoryMessageStore;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<OutboundEmail>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        fn name(&self) -> &str {
            "recording"
        }

        async fn send(&self, to: &str, subject: &str, body: &str)
            -> Result<DeliveryStatus, NotifyError> {
            self.sent.lock().unwrap().push(OutboundEmail {
                to: to.to_string(),
                subject: subject.to_string(),
                body: body.to_string(),
            });
            Ok(DeliveryStatus::Logged)
        }
    }

    fn policy() -> RelayPolicy {
        RelayPolicy::new(vec!["Jane@X.com".to_string()], 200, 500)
    }

    async fn setup() -> (Relay, Arc<RecordingNotifier>, Message, Message) {
        let store = Arc::new(MemoryMessageStore::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let from_jane = Message::new(
            Envelope {
                from_raw: "Jane <jane@x.com>".to_string(),
                from_email: "jane@x.com".to_string(),
                subject: "Pickup".to_string(),
                raw_text: "Can you get him at 5?".to_string(),
            },
            build_fallback("", "", "x", "ai_error"),
        );
        let from_stranger = Message::new(
            Envelope {
                from_raw: "spam@evil.test".to_string(),
                from_email: "spam@evil.test".to_string(),
                subject: "Hi".to_string(),
                raw_text: "buy".to_string(),
            },
            build_fallback("", "", "x", "ai_error"),
        );
        store.insert(&from_jane).await.unwrap();
        store.insert(&from_stranger).await.unwrap();
        let relay = Relay::new(policy(), store, notifier.clone());
        (relay, notifier, from_jane, from_stranger)
    }

    #[test]
    fn allow_list_is_case_insensitive_on_bare_address() {
        let p = policy();
        assert!(p.is_allowed("jane@x.com"));
        assert!(p.is_allowed("Jane Doe <JANE@x.com>"));
        assert!(!p.is_allowed("john@x.com"));
        assert!(!p.is_allowed(""));
    }

    #[test]
    fn list_limit_is_bounded() {
        let p = policy();
        assert_eq!(p.list_limit(None), 200);
        assert_eq!(p.list_limit(Some(0)), 1);
        assert_eq!(p.list_limit(Some(10_000)), 500);
        assert_eq!(p.list_limit(Some(25)), 25);
    }

    #[test]
    fn reply_subject_prefixes_once() {
        assert_eq!(reply_subject("Pickup"), "Re: Pickup");
        assert_eq!(reply_subject("RE: Pickup"), "RE: Pickup");
        assert_eq!(reply_subject(""), "Re: (no subject)");
    }

    #[tokio::test]
    async fn reply_sends_to_stored_sender() {
        let (relay, notifier, jane, _) = setup().await;
        let queued = relay.reply(&jane.id, "Yes, 5pm works.").await.unwrap();
        assert_eq!(queued.to, "jane@x.com");
        queued.delivery.await.unwrap();
        let sent = notifier.sent.lock().unwrap().clone();
        assert_eq!(
            sent,
            vec![OutboundEmail {
                to: "jane@x.com".to_string(),
                subject: "Re: Pickup".to_string(),
                body: "Yes, 5pm works.".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn reply_to_unlisted_sender_is_refused_without_send() {
        let (relay, notifier, _, stranger) = setup().await;
        let err = relay.reply(&stranger.id, "no").await.err().unwrap();
        assert!(matches!(err, RelayError::NotAllowed(_)));
        tokio::task::yield_now().await;
        assert!(notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn reply_validation() {
        let (relay, _, jane, _) = setup().await;
        assert!(matches!(
            relay.reply("", "hi").await.err().unwrap(),
            RelayError::MissingField("messageId")
        ));
        assert!(matches!(
            relay.reply(&jane.id, " ").await.err().unwrap(),
            RelayError::MissingField("body")
        ));
        assert!(matches!(
            relay.reply("nope", "hi").await.err().unwrap(),
            RelayError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn compose_respects_allow_list() {
        let (relay, notifier, _, _) = setup().await;
        assert!(matches!(
            relay.compose("john@x.com", "Hi", "hello").err().unwrap(),
            RelayError::NotAllowed(_)
        ));
        let queued = relay.compose("Jane <jane@x.com>", " Swap weekend ", "Can we swap?").unwrap();
        queued.delivery.await.unwrap();
        let sent = notifier.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "jane@x.com");
        assert_eq!(sent[0].subject, "Swap weekend");
    }
}
