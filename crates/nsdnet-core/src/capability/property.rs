use nsdnet_api::FrameBody;
use serde::Serialize;
use tokio::sync::watch;
use tracing::debug;

use super::{HandleFrame, Handled};

/// The last property answer a device received.
///
/// There is no request id on the wire: the key is whatever the server
/// echoed, and two outstanding requests for the same key are
/// indistinguishable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PropertyValue {
    pub key: String,
    pub value: String,
}

/// Caches `propval` answers, last write wins.
#[derive(Debug)]
pub struct PropertyCell {
    latest: watch::Sender<Option<PropertyValue>>,
}

impl PropertyCell {
    pub(crate) fn new() -> (Self, watch::Receiver<Option<PropertyValue>>) {
        let (latest, rx) = watch::channel(None);
        (Self { latest }, rx)
    }
}

impl HandleFrame for PropertyCell {
    fn handle_frame(&self, body: FrameBody) -> Handled {
        match body {
            FrameBody::PropertyValue { key, value } => {
                debug!(key = %key, "property value cached");
                self.latest.send_replace(Some(PropertyValue { key, value }));
                Handled::Applied
            }
            other => Handled::Declined(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answer(key: &str, value: &str) -> FrameBody {
        FrameBody::PropertyValue {
            key: key.into(),
            value: value.into(),
        }
    }

    #[test]
    fn last_write_wins() {
        let (cell, rx) = PropertyCell::new();
        assert!(rx.borrow().is_none());

        for value in ["1", "2", "3"] {
            cell.handle_frame(answer("self.index", value));
        }
        assert_eq!(
            *rx.borrow(),
            Some(PropertyValue {
                key: "self.index".into(),
                value: "3".into(),
            })
        );
    }

    #[test]
    fn a_different_key_still_overwrites() {
        let (cell, rx) = PropertyCell::new();
        cell.handle_frame(answer("self.id", "client-42"));
        cell.handle_frame(answer("self.index", "0"));
        assert_eq!(rx.borrow().as_ref().map(|p| p.key.as_str()), Some("self.index"));
    }
}
