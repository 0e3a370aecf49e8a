use std::sync::Arc;

use nsdnet_api::FrameBody;
use serde::Serialize;
use tokio::sync::watch;
use tracing::debug;

use super::{HandleFrame, Handled};

/// Snapshot of the peers connected to the server.
///
/// Cheap to clone. Each response replaces the whole list; iterating the
/// same snapshot twice yields the same ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ClientList(Arc<Vec<String>>);

impl ClientList {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.0.iter().any(|c| c == id)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl<'a> IntoIterator for &'a ClientList {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl From<Vec<String>> for ClientList {
    fn from(ids: Vec<String>) -> Self {
        Self(Arc::new(ids))
    }
}

/// Caches `listclients` answers, replacing the list wholesale.
///
/// `None` until the first answer, so an empty directory is distinguishable
/// from no answer at all.
#[derive(Debug)]
pub struct DirectoryCell {
    clients: watch::Sender<Option<ClientList>>,
}

impl DirectoryCell {
    pub(crate) fn new() -> (Self, watch::Receiver<Option<ClientList>>) {
        let (clients, rx) = watch::channel(None);
        (Self { clients }, rx)
    }
}

impl HandleFrame for DirectoryCell {
    fn handle_frame(&self, body: FrameBody) -> Handled {
        match body {
            FrameBody::ClientList(ids) => {
                debug!(count = ids.len(), "client list replaced");
                self.clients.send_replace(Some(ClientList::from(ids)));
                Handled::Applied
            }
            other => Handled::Declined(other),
        }
    }
}
