//! Topic subscriptions and pattern matching.
//!
//! Entries are kept in registration order and are unique by pattern string;
//! re-registering a pattern replaces its callback in place. Dispatch walks
//! the whole list under the lock so registration changes cannot interleave
//! with a delivery in progress.

use std::sync::{Arc, Mutex};

use amp_codec::{Field, Message};
use regex::Regex;

use crate::dispatch::SubscriptionCallback;
use crate::error::SockError;
use crate::lock;

struct SubEntry {
    pattern: String,
    regex: Regex,
    callback: Arc<SubscriptionCallback>,
}

/// The ordered list of `(pattern, callback)` subscriptions.
#[derive(Default)]
pub(crate) struct SubscriptionList {
    entries: Mutex<Vec<SubEntry>>,
}

impl SubscriptionList {
    /// Register `callback` under `pattern`, replacing a previous callback
    /// for the same pattern string.
    pub(crate) fn subscribe(
        &self,
        pattern: &str,
        callback: Arc<SubscriptionCallback>,
    ) -> Result<(), SockError> {
        let regex = Regex::new(pattern)?;
        let mut entries = lock(&self.entries);
        if let Some(entry) = entries.iter_mut().find(|e| e.pattern == pattern) {
            entry.regex = regex;
            entry.callback = callback;
            return Ok(());
        }
        entries.push(SubEntry {
            pattern: pattern.to_owned(),
            regex,
            callback,
        });
        Ok(())
    }

    /// Remove the entry for `pattern`. Removing an absent pattern is a no-op.
    pub(crate) fn unsubscribe(&self, pattern: &str) {
        lock(&self.entries).retain(|e| e.pattern != pattern);
    }

    /// Deliver `message` to every matching subscription.
    ///
    /// When the list is non-empty and the first field is a string, that field
    /// is the topic: it is stripped from the message, and every entry whose
    /// pattern matches it is invoked in registration order with the topic and
    /// the remaining fields.
    pub(crate) fn dispatch(&self, message: &mut Message) {
        let entries = lock(&self.entries);
        if entries.is_empty() {
            return;
        }
        if !matches!(message.first(), Some(Field::String(_))) {
            return;
        }
        let Some(Field::String(topic)) = message.shift_field() else {
            return;
        };
        for entry in entries.iter() {
            if entry.regex.is_match(&topic) {
                (entry.callback)(&topic, message);
            }
        }
    }
}
