use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use planwright_core::SecretRef;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::executor::{Event, EventSink, NoOpEventSink};
use crate::secrets::{KeySource, SecretError, SecretValue, VaultCipher};

/// Run-scoped secret provider.
///
/// Each [`SecretRef`] is decrypted at most once per run unless
/// [`RunSecrets::decrypt_fresh`] is asked for a new decryption (retries).
/// Concurrent callers for the same ref share one in-flight decryption.
/// Never shared between runs.
pub struct RunSecrets {
    run_id: Uuid,
    keys: Arc<dyn KeySource>,
    cipher: Arc<dyn VaultCipher>,
    event_sink: Arc<dyn EventSink>,
    single_flight: bool,
    decryptions: AtomicUsize,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    cache: HashMap<SecretRef, SecretValue>,
    inflight: HashMap<SecretRef, Arc<Notify>>,
}

impl RunSecrets {
    pub fn new(run_id: Uuid, keys: Arc<dyn KeySource>, cipher: Arc<dyn VaultCipher>) -> Self {
        Self {
            run_id,
            keys,
            cipher,
            event_sink: Arc::new(NoOpEventSink),
            single_flight: true,
            decryptions: AtomicUsize::new(0),
            state: Mutex::new(State::default()),
        }
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    pub fn with_single_flight(mut self, enabled: bool) -> Self {
        self.single_flight = enabled;
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Number of successful decryptions performed so far in this run.
    pub fn decryptions(&self) -> usize {
        self.decryptions.load(Ordering::SeqCst)
    }

    /// Every plaintext decrypted so far in this run, for masking error text.
    pub fn known_plaintexts(&self) -> Vec<SecretValue> {
        self.lock().cache.values().cloned().collect()
    }

    pub async fn decrypt(&self, secret: &SecretRef) -> Result<SecretValue, SecretError> {
        if !self.single_flight {
            let cached = self.lock().cache.get(secret).cloned();
            if let Some(v) = cached {
                return Ok(v);
            }
            let fetched = self.decrypt_uncached(secret).await?;
            self.lock().cache.insert(secret.clone(), fetched.clone());
            return Ok(fetched);
        }

        loop {
            let waiting = {
                let mut s = self.lock();
                if let Some(v) = s.cache.get(secret) {
                    return Ok(v.clone());
                }
                let Some(n) = s.inflight.get(secret).cloned() else {
                    s.inflight.insert(secret.clone(), Arc::new(Notify::new()));
                    break;
                };
                n
            };

            // Another task is decrypting this ref: wait, then look again.
            let notified = waiting.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            // The leader may have finished before this waiter registered.
            let pending = self
                .lock()
                .inflight
                .get(secret)
                .is_some_and(|n| Arc::ptr_eq(n, &waiting));
            if pending {
                notified.await;
            }
        }

        let leader = Inflight {
            secrets: self,
            secret,
        };
        let fetched = self.decrypt_uncached(secret).await;
        if let Ok(value) = &fetched {
            self.lock().cache.insert(secret.clone(), value.clone());
        }
        drop(leader);
        fetched
    }

    /// Decrypts again regardless of the cache and replaces the cached value.
    pub async fn decrypt_fresh(&self, secret: &SecretRef) -> Result<SecretValue, SecretError> {
        let fetched = self.decrypt_uncached(secret).await?;
        self.lock().cache.insert(secret.clone(), fetched.clone());
        Ok(fetched)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn decrypt_uncached(&self, secret: &SecretRef) -> Result<SecretValue, SecretError> {
        let password = self.keys.key(&secret.key_id).await?;
        let plaintext = self.cipher.open(secret, &password)?;

        self.decryptions.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(run_id = %self.run_id, key_id = %secret.key_id, "secret decrypted");
        self.event_sink
            .emit(Event::SecretDecrypted {
                run_id: self.run_id,
                key_id: secret.key_id.clone(),
            })
            .await;
        Ok(plaintext)
    }
}

/// Held by the task decrypting a ref on behalf of other callers. Dropping it on
/// any exit path, unwinding included, clears the in-flight entry and wakes the
/// waiters so one of them can take over.
struct Inflight<'a> {
    secrets: &'a RunSecrets,
    secret: &'a SecretRef,
}

impl Drop for Inflight<'_> {
    fn drop(&mut self) {
        let notify = self.secrets.lock().inflight.remove(self.secret);
        if let Some(n) = notify {
            n.notify_waiters();
        }
    }
}
