use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;

use crate::{ChainCommunicationError, ChainResult, MessageKey, TxResponse};

/// Final outcome of one delivery attempt, as reported by a provider.
#[derive(Debug)]
pub struct DeliveryOutcome {
    /// Message the outcome is about
    pub key: MessageKey,
    /// Chain the message was delivered to
    pub dst: String,
    /// Transaction response, or the error that ended the attempt
    pub result: ChainResult<TxResponse>,
}

/// Move-only completion handle handed to [`crate::ChainProvider::route`].
///
/// `complete` consumes the handle, so an outcome can be reported at most
/// once. A handle dropped without completing reports
/// [`ChainCommunicationError::CallbackDropped`], so the relay always observes
/// exactly one outcome per attempt.
#[derive(Debug)]
pub struct RouteCallback {
    key: MessageKey,
    dst: String,
    sender: Option<UnboundedSender<DeliveryOutcome>>,
}

impl RouteCallback {
    /// Create a handle reporting into `sender`
    pub fn new(key: MessageKey, dst: String, sender: UnboundedSender<DeliveryOutcome>) -> Self {
        Self {
            key,
            dst,
            sender: Some(sender),
        }
    }

    /// Message this handle belongs to
    pub fn key(&self) -> &MessageKey {
        &self.key
    }

    /// Report the final outcome of the delivery
    pub fn complete(mut self, result: ChainResult<TxResponse>) {
        self.send(result);
    }

    fn send(&mut self, result: ChainResult<TxResponse>) {
        let Some(sender) = self.sender.take() else {
            return;
        };
        let outcome = DeliveryOutcome {
            key: self.key.clone(),
            dst: self.dst.clone(),
            result,
        };
        if sender.send(outcome).is_err() {
            warn!(key = %self.key, "Delivery outcome receiver is gone, dropping outcome");
        }
    }
}

impl Drop for RouteCallback {
    fn drop(&mut self) {
        if self.sender.is_some() {
            let err = ChainCommunicationError::CallbackDropped(self.key.clone());
            self.send(Err(err));
        }
    }
}

#[cfg(test)]
mod test {
    use tokio::sync::mpsc;

    use super::*;

    #[test]
    fn completes_exactly_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let key = MessageKey::new("mock-1".into(), 1);
        RouteCallback::new(key.clone(), "mock-2".into(), tx)
            .complete(Ok(TxResponse::success(20, "0xabc")));

        let outcome = rx.try_recv().unwrap();
        assert_eq!(outcome.key, key);
        assert_eq!(outcome.dst, "mock-2");
        assert!(outcome.result.unwrap().is_success());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn dropped_callback_reports_failure() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let key = MessageKey::new("mock-1".into(), 2);
        drop(RouteCallback::new(key.clone(), "mock-2".into(), tx));

        let outcome = rx.try_recv().unwrap();
        assert!(matches!(
            outcome.result,
            Err(ChainCommunicationError::CallbackDropped(k)) if k == key
        ));
        assert!(rx.try_recv().is_err());
    }
}
