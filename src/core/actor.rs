//! Message loop and outbound controller
//!
//! An [`Actor`] owns a message loop running on the tokio runtime. Inbound
//! messages arrive on an unbounded channel. Outbound messages leave through an
//! [`ActorController`] wrapping a bounded channel. Once the actor starts
//! shutting down, outbound sends blocked on a full channel give up.

use crate::core::message::Message;
use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Trait for handling messages in the Actor system.
#[async_trait]
pub trait MessageHandler<T: Send + 'static>: Send + 'static {
    /// Handle an incoming message.
    async fn on_message(&mut self, message: Message<T>, controller: &ActorController<T>);

    /// Called once when the message loop stops, before the handler is dropped.
    async fn on_shutdown(&mut self, _controller: &ActorController<T>) {}
}

/// Error type for Actor message sending operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ActorSendError {
    #[error("Actor channel is closed")]
    ChannelClosed,

    #[error("Send was cancelled")]
    Cancelled,
}

/// Controller for sending messages out of the Actor system.
pub struct ActorController<T> {
    sender: mpsc::Sender<Message<T>>,
    /// Cancelled when the owning actor shuts down; shared by all clones
    closing: CancellationToken,
}

impl<T: Send + 'static> ActorController<T> {
    /// Create a new ActorController with the given sender.
    pub fn new(sender: mpsc::Sender<Message<T>>) -> Self {
        Self {
            sender,
            closing: CancellationToken::new(),
        }
    }

    /// Token cancelled once the owning actor begins shutting down.
    pub fn closing(&self) -> &CancellationToken {
        &self.closing
    }

    /// Send a message to external recipients, waiting for channel capacity.
    ///
    /// Gives up with [`ActorSendError::Cancelled`] once the actor is
    /// shutting down.
    pub async fn send_message(
        &self,
        method: impl Into<String>,
        payload: T,
    ) -> Result<(), ActorSendError> {
        let message = Message::new(method, payload);
        tokio::select! {
            biased;
            _ = self.closing.cancelled() => Err(ActorSendError::Cancelled),
            result = self.sender.send(message) => result.map_err(|_| ActorSendError::ChannelClosed),
        }
    }

    /// Send a message unless `token` is cancelled first.
    ///
    /// A cancelled send never reaches the channel, which is what lets a
    /// superseded session stop delivering even while blocked on a full channel.
    pub async fn send_until_cancelled(
        &self,
        message: Message<T>,
        token: &CancellationToken,
    ) -> Result<(), ActorSendError> {
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(ActorSendError::Cancelled),
            _ = self.closing.cancelled() => Err(ActorSendError::Cancelled),
            result = self.sender.send(message) => result.map_err(|_| ActorSendError::ChannelClosed),
        }
    }

    /// Whether the receiving side has gone away.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl<T> Clone for ActorController<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            closing: self.closing.clone(),
        }
    }
}

/// A lightweight actor driving a [`MessageHandler`] on a tokio task.
pub struct Actor<T: Send + 'static> {
    /// Inbound channel, used by [`Actor::send_message`]
    inbox: mpsc::UnboundedSender<Message<T>>,
    /// Channel for sending shutdown signal
    shutdown_sender: Option<oneshot::Sender<()>>,
    /// Unblocks outbound sends when shutting down
    closing: CancellationToken,
    /// Handle to the message processing task
    task: Option<JoinHandle<()>>,
}

impl<T: Send + 'static> Actor<T> {
    /// Create a new Actor and start its message loop.
    ///
    /// # Arguments
    /// * `receiver` - Channel for receiving external messages
    /// * `inbox` - Sending half of `receiver`, kept so callers can post through the actor
    /// * `controller` - Outbound side handed to the handler
    /// * `handler` - Message handler implementation
    pub fn new<H: MessageHandler<T>>(
        receiver: mpsc::UnboundedReceiver<Message<T>>,
        inbox: mpsc::UnboundedSender<Message<T>>,
        controller: ActorController<T>,
        handler: H,
    ) -> Self {
        let (shutdown_sender, shutdown_receiver) = oneshot::channel();
        let closing = controller.closing().clone();
        let task = tokio::spawn(Self::run_message_loop(
            receiver,
            controller,
            handler,
            shutdown_receiver,
        ));

        Self {
            inbox,
            shutdown_sender: Some(shutdown_sender),
            closing,
            task: Some(task),
        }
    }

    /// Post a message to this actor's own message loop.
    pub fn send_message(&self, method: impl Into<String>, payload: T) -> Result<(), ActorSendError> {
        self.inbox
            .send(Message::new(method, payload))
            .map_err(|_| ActorSendError::ChannelClosed)
    }

    /// Main message processing loop.
    async fn run_message_loop<H: MessageHandler<T>>(
        mut receiver: mpsc::UnboundedReceiver<Message<T>>,
        controller: ActorController<T>,
        mut handler: H,
        mut shutdown_receiver: oneshot::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown_receiver => {
                    log::debug!("Received shutdown signal, stopping message loop");
                    break;
                }
                message = receiver.recv() => {
                    match message {
                        Some(message) => {
                            log::trace!("Received message: method={}", message.method);
                            handler.on_message(message, &controller).await;
                        }
                        None => {
                            log::debug!("Receiver channel closed");
                            break;
                        }
                    }
                }
            }
        }

        handler.on_shutdown(&controller).await;
    }

    /// Stop the message loop and wait for the handler to finish its shutdown.
    pub async fn shutdown(&mut self) {
        self.closing.cancel();
        if let Some(shutdown_sender) = self.shutdown_sender.take() {
            log::debug!("Sending shutdown signal");
            let _ = shutdown_sender.send(());
        }

        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                log::warn!("Actor task ended abnormally: {}", e);
            }
        }
    }
}

impl<T: Send + 'static> Drop for Actor<T> {
    fn drop(&mut self) {
        // The loop notices the signal on its next poll; on_shutdown still runs.
        self.closing.cancel();
        if let Some(shutdown_sender) = self.shutdown_sender.take() {
            log::debug!("Actor dropped without explicit shutdown");
            let _ = shutdown_sender.send(());
        }
    }
}
