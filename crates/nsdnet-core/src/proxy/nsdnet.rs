use std::sync::Arc;

use bytes::Bytes;
use nsdnet_api::{DeviceAddress, RequestBody, ServerError, kind};
use tokio::sync::watch;

use super::{DeviceProxy, ProxyHandle};
use crate::capability::{
    Capability, ClientList, DirectoryCell, Message, MessageQueue, MessageQueueCell, PropertyCell,
    PropertyValue,
};
use crate::config::QueuePolicy;
use crate::error::CoreError;

/// Proxy for the messaging device: properties, the client directory, and
/// a queue of messages from other peers.
///
/// Requests are fire-and-forget. Answers show up in the caches only after
/// the owning connection's `read()` has drained them.
#[derive(Debug, Clone)]
pub struct NsdNetProxy {
    handle: ProxyHandle,
    property: watch::Receiver<Option<PropertyValue>>,
    clients: watch::Receiver<Option<ClientList>>,
    queue: Arc<MessageQueue>,
}

impl DeviceProxy for NsdNetProxy {
    const KIND: u16 = kind::NSDNET;

    fn attach(handle: ProxyHandle, queue: &QueuePolicy) -> (Vec<Capability>, Self) {
        let (property_cell, property) = PropertyCell::new();
        let (directory_cell, clients) = DirectoryCell::new();
        let queue = Arc::new(MessageQueue::new(*queue));

        let capabilities = vec![
            Capability::Property(property_cell),
            Capability::Directory(directory_cell),
            Capability::MessageQueue(MessageQueueCell::new(Arc::clone(&queue))),
        ];
        let proxy = Self {
            handle,
            property,
            clients,
            queue,
        };
        (capabilities, proxy)
    }

    fn handle(&self) -> &ProxyHandle {
        &self.handle
    }
}

impl NsdNetProxy {
    pub fn address(&self) -> DeviceAddress {
        self.handle.address()
    }

    // ── Properties ───────────────────────────────────────────────────

    /// Ask the server for a named property, e.g. `self.id`.
    pub fn request_property(&self, key: &str) -> Result<(), CoreError> {
        self.handle.request(RequestBody::GetProperty {
            key: key.to_owned(),
        })
    }

    /// The most recently received property answer.
    pub fn property(&self) -> Option<PropertyValue> {
        self.property.borrow().clone()
    }

    pub fn set_property(&self, key: &str, value: &str) -> Result<(), CoreError> {
        self.handle.request(RequestBody::SetProperty {
            key: key.to_owned(),
            value: value.to_owned(),
        })
    }

    // ── Client directory ─────────────────────────────────────────────

    pub fn request_client_list(&self) -> Result<(), CoreError> {
        self.handle.request(RequestBody::ListClients)
    }

    /// Snapshot of the last client list. Empty before the first answer.
    pub fn client_list(&self) -> ClientList {
        self.clients.borrow().clone().unwrap_or_default()
    }

    /// The last client list, or `None` if the server has not answered yet.
    /// Unlike [`client_list`](Self::client_list), an empty directory shows
    /// up as `Some` of an empty list.
    pub fn client_list_answer(&self) -> Option<ClientList> {
        self.clients.borrow().clone()
    }

    // ── Messages ─────────────────────────────────────────────────────

    /// Broadcast a payload to every peer.
    pub fn send_message(&self, payload: impl Into<Bytes>) -> Result<(), CoreError> {
        self.handle.request(RequestBody::Send {
            target: None,
            payload: payload.into(),
        })
    }

    /// Send a payload to one peer by client id.
    pub fn send_message_to(&self, target: &str, payload: impl Into<Bytes>) -> Result<(), CoreError> {
        self.handle.request(RequestBody::Send {
            target: Some(target.to_owned()),
            payload: payload.into(),
        })
    }

    pub fn receive_message_count(&self) -> usize {
        self.queue.len()
    }

    /// Pop the oldest queued message.
    pub fn receive_message(&self) -> Option<Message> {
        self.queue.pop()
    }

    /// Messages lost to queue overflow since registration.
    pub fn dropped_message_count(&self) -> u64 {
        self.queue.dropped()
    }

    pub fn last_error(&self) -> Option<ServerError> {
        self.handle.last_error()
    }
}
