// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::Notify;

/// Cooperative per-patient cancellation, grounded on the notify-based
/// token pattern used for task cancellation elsewhere in the pack —
/// simplified to a flat (non-hierarchical) token since stop/resume here is
/// always scoped to one patient (§4.9, C9).
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

struct Inner {
    cancelled: RwLock<bool>,
    notify: Notify,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: RwLock::new(false),
                notify: Notify::new(),
            }),
        }
    }

    pub fn cancel(&self) {
        *self.inner.cancelled.write().unwrap() = true;
        self.inner.notify.notify_waiters();
    }

    /// Clears a prior cancellation so the patient's pipeline can resume
    /// (§6 `POST /patients/{id}/resume`).
    pub fn reset(&self) {
        *self.inner.cancelled.write().unwrap() = false;
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.cancelled.read().unwrap()
    }

    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        let notified = self.inner.notify.notified();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry of one [`CancelToken`] per patient, created lazily on first
/// access so stop/resume work even before a patient has any scheduled work.
#[derive(Clone, Default)]
pub struct CancellationRegistry {
    tokens: Arc<RwLock<HashMap<String, CancelToken>>>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token_for(&self, patient_id: &str) -> CancelToken {
        if let Some(token) = self.tokens.read().unwrap().get(patient_id) {
            return token.clone();
        }
        let mut tokens = self.tokens.write().unwrap();
        tokens.entry(patient_id.to_string()).or_insert_with(CancelToken::new).clone()
    }

    pub fn stop(&self, patient_id: &str) {
        self.token_for(patient_id).cancel();
    }

    pub fn resume(&self, patient_id: &str) {
        self.token_for(patient_id).reset();
    }

    pub fn is_stopped(&self, patient_id: &str) -> bool {
        self.token_for(patient_id).is_cancelled()
    }
}
