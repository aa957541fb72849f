//! Completion handles for asynchronous collaborators.
//!
//! A component hands a [`Reply`] to a collaborator and later drains its
//! [`ReplyQueue`] on tick. Completions are therefore never delivered from
//! inside the collaborator's call stack.

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// Sending half given to a collaborator. Cloneable for progress reporting.
#[derive(Debug)]
pub struct Reply<T> {
    token: u64,
    tx: UnboundedSender<(u64, T)>,
}

impl<T> Clone for Reply<T> {
    fn clone(&self) -> Self {
        Self {
            token: self.token,
            tx: self.tx.clone(),
        }
    }
}

impl<T> Reply<T> {
    /// Routing token chosen by the component that issued the request.
    pub fn token(&self) -> u64 {
        self.token
    }

    /// Post a completion. Returns false if the owning component is gone.
    pub fn send(&self, value: T) -> bool {
        self.tx.send((self.token, value)).is_ok()
    }
}

/// Receiving half owned by a component.
#[derive(Debug)]
pub struct ReplyQueue<T> {
    tx: UnboundedSender<(u64, T)>,
    rx: UnboundedReceiver<(u64, T)>,
    next_token: u64,
}

impl<T> ReplyQueue<T> {
    pub fn new() -> Self {
        let (tx, rx) = unbounded_channel();
        Self { tx, rx, next_token: 1 }
    }

    /// A reply handle routed by `token`.
    pub fn reply(&self, token: u64) -> Reply<T> {
        Reply {
            token,
            tx: self.tx.clone(),
        }
    }

    /// A reply handle with a fresh token.
    pub fn fresh(&mut self) -> Reply<T> {
        let token = self.next_token;
        self.next_token += 1;
        self.reply(token)
    }

    /// Every completion posted so far, in arrival order.
    pub fn drain(&mut self) -> Vec<(u64, T)> {
        let mut out = Vec::new();
        while let Ok(item) = self.rx.try_recv() {
            out.push(item);
        }
        out
    }
}

impl<T> Default for ReplyQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
