//! Token-keyed pub/sub channels
//!
//! Every widget exposes explicit dataflow channels:
//! `ValueChanged(member, value)`, `DataSourceChanged(old, new)` and a
//! logical-parent channel. Handlers are revoked by an explicit token,
//! not by closure identity, so reverse two-way handlers can be removed
//! precisely. Emission is synchronous, in registration order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;

/// Subscription handle; the only way to revoke a handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token(u64);

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

impl Token {
    fn next() -> Token {
        Token(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed))
    }
}

/// A member-value change notification
#[derive(Debug, Clone)]
pub struct ValueChange {
    pub member: String,
    pub value: Value,
}

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Ordered handler list for one channel
pub struct Subscribers<T> {
    subs: Mutex<Vec<(Token, Callback<T>)>>,
}

impl<T> Default for Subscribers<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Subscribers<T> {
    pub fn new() -> Self {
        Self {
            subs: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe(&self, cb: Callback<T>) -> Token {
        let token = Token::next();
        self.subs.lock().unwrap().push((token, cb));
        token
    }

    pub fn subscribe_fn(&self, cb: impl Fn(&T) + Send + Sync + 'static) -> Token {
        self.subscribe(Arc::new(cb))
    }

    pub fn unsubscribe(&self, token: Token) -> bool {
        let mut subs = self.subs.lock().unwrap();
        let before = subs.len();
        subs.retain(|(t, _)| *t != token);
        subs.len() != before
    }

    /// Fire all handlers synchronously, in registration order.
    ///
    /// The handler list is snapshotted before the calls so handlers
    /// may subscribe/unsubscribe (or re-enter) without deadlocking.
    pub fn emit(&self, event: &T) {
        let snapshot: Vec<Callback<T>> = self
            .subs
            .lock()
            .unwrap()
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for cb in snapshot {
            cb(event);
        }
    }

    pub fn len(&self) -> usize {
        self.subs.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn handlers_fire_in_registration_order() {
        let channel: Subscribers<ValueChange> = Subscribers::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let seen = Arc::clone(&seen);
            channel.subscribe_fn(move |_| seen.lock().unwrap().push(tag));
        }

        channel.emit(&ValueChange {
            member: "Text".into(),
            value: Value::Null,
        });
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn unsubscribe_by_token_is_precise() {
        let channel: Subscribers<()> = Subscribers::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c1 = Arc::clone(&count);
        let keep = channel.subscribe_fn(move |_| {
            c1.fetch_add(1, Ordering::Relaxed);
        });
        let c2 = Arc::clone(&count);
        let drop_me = channel.subscribe_fn(move |_| {
            c2.fetch_add(100, Ordering::Relaxed);
        });

        assert!(channel.unsubscribe(drop_me));
        assert!(!channel.unsubscribe(drop_me));
        channel.emit(&());
        assert_eq!(count.load(Ordering::Relaxed), 1);

        assert!(channel.unsubscribe(keep));
        channel.emit(&());
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn reentrant_emit_does_not_deadlock() {
        let channel: Arc<Subscribers<u32>> = Arc::new(Subscribers::new());
        let inner = Arc::clone(&channel);
        let fired = Arc::new(AtomicUsize::new(0));
        let f = Arc::clone(&fired);

        channel.subscribe_fn(move |depth| {
            f.fetch_add(1, Ordering::Relaxed);
            if *depth == 0 {
                inner.emit(&1);
            }
        });

        channel.emit(&0);
        assert_eq!(fired.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn tokens_are_unique() {
        let channel: Subscribers<()> = Subscribers::new();
        let a = channel.subscribe_fn(|_| {});
        let b = channel.subscribe_fn(|_| {});
        assert_ne!(a, b);
    }
}
