use std::collections::{HashMap, HashSet};
use std::ops::Deref;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::{errors::KeyCacheError, mailbox, Fingerprint, Key, KeyGroup, KeyId, KeyUsage, Protocol};

/// Read-only lookup service over all known certificates and groups.
///
/// Lookups never fail: a miss is reported as `None`.
pub trait CertificateStore {
    /// Finds a key by primary fingerprint, subkey fingerprint or key id.
    fn find_by_key_id_or_fingerprint(&self, identifier: &str) -> Option<Key>;

    /// Finds the best key for a mailbox, protocol and usage.
    ///
    /// `mailbox` may be given in any form accepted by
    /// [`mailbox::addr_spec_from_string`]. A `protocol` of `Unknown` accepts every protocol.
    fn find_best_by_mailbox(&self, mailbox: &str, protocol: Protocol, usage: KeyUsage)
        -> Option<Key>;

    /// Finds the first group with the given name whose members all match
    /// the protocol and usage filters.
    fn find_group(&self, name: &str, protocol: Protocol, usage: KeyUsage) -> Option<KeyGroup>;
}

impl<T: CertificateStore + ?Sized> CertificateStore for &T {
    fn find_by_key_id_or_fingerprint(&self, identifier: &str) -> Option<Key> {
        T::find_by_key_id_or_fingerprint(self, identifier)
    }

    fn find_best_by_mailbox(
        &self,
        mailbox: &str,
        protocol: Protocol,
        usage: KeyUsage,
    ) -> Option<Key> {
        T::find_best_by_mailbox(self, mailbox, protocol, usage)
    }

    fn find_group(&self, name: &str, protocol: Protocol, usage: KeyUsage) -> Option<KeyGroup> {
        T::find_group(self, name, protocol, usage)
    }
}

impl<T: CertificateStore + ?Sized> CertificateStore for Arc<T> {
    fn find_by_key_id_or_fingerprint(&self, identifier: &str) -> Option<Key> {
        self.deref().find_by_key_id_or_fingerprint(identifier)
    }

    fn find_best_by_mailbox(
        &self,
        mailbox: &str,
        protocol: Protocol,
        usage: KeyUsage,
    ) -> Option<Key> {
        self.deref().find_best_by_mailbox(mailbox, protocol, usage)
    }

    fn find_group(&self, name: &str, protocol: Protocol, usage: KeyUsage) -> Option<KeyGroup> {
        self.deref().find_group(name, protocol, usage)
    }
}

/// The backend a [`KeyCache`] populates itself from.
pub trait KeySource: Send + Sync {
    /// Lists all certificates.
    fn list_keys(&self) -> Result<Vec<Key>, KeyCacheError>;

    /// Lists all certificate groups.
    fn list_groups(&self) -> Result<Vec<KeyGroup>, KeyCacheError>;
}

/// A key source backed by fixed lists.
#[derive(Debug, Clone, Default)]
pub struct StaticKeySource {
    pub keys: Vec<Key>,
    pub groups: Vec<KeyGroup>,
}

impl StaticKeySource {
    pub fn new(keys: Vec<Key>, groups: Vec<KeyGroup>) -> Self {
        Self { keys, groups }
    }
}

impl KeySource for StaticKeySource {
    fn list_keys(&self) -> Result<Vec<Key>, KeyCacheError> {
        Ok(self.keys.clone())
    }

    fn list_groups(&self) -> Result<Vec<KeyGroup>, KeyCacheError> {
        Ok(self.groups.clone())
    }
}

/// An immutable, indexed snapshot of a key listing.
#[derive(Debug, Default)]
pub struct KeyIndex {
    keys: Vec<Key>,
    groups: Vec<KeyGroup>,
    by_fingerprint: HashMap<Fingerprint, usize>,
    by_key_id: HashMap<KeyId, usize>,
    by_mailbox: HashMap<String, Vec<usize>>,
}

impl KeyIndex {
    /// Builds the index.
    ///
    /// Keys with a malformed fingerprint are left out. If the listing repeats
    /// a primary fingerprint only one copy is kept, the one with a secret key
    /// if there is one.
    pub fn build(listed: Vec<Key>, groups: Vec<KeyGroup>) -> Self {
        let mut keys: Vec<Key> = Vec::with_capacity(listed.len());
        let mut by_fingerprint: HashMap<Fingerprint, usize> = HashMap::with_capacity(listed.len());
        for key in listed {
            if !key.fingerprint().is_valid() {
                tracing::warn!(
                    "skipping key with malformed fingerprint {:?}",
                    key.fingerprint().as_str()
                );
                continue;
            }
            match by_fingerprint.get(key.fingerprint()) {
                Some(&idx) => {
                    tracing::warn!("key {} is listed more than once", key.fingerprint());
                    if key.has_secret() && !keys[idx].has_secret() {
                        keys[idx] = key;
                    }
                }
                None => {
                    by_fingerprint.insert(key.fingerprint().clone(), keys.len());
                    keys.push(key);
                }
            }
        }

        let mut by_key_id = HashMap::with_capacity(keys.len());
        let mut by_mailbox: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, key) in keys.iter().enumerate() {
            for subkey in key.subkeys() {
                if !subkey.fingerprint.is_valid() {
                    tracing::warn!(
                        "skipping subkey with malformed fingerprint {:?} of key {}",
                        subkey.fingerprint.as_str(),
                        key.fingerprint()
                    );
                    continue;
                }
                by_fingerprint.entry(subkey.fingerprint.clone()).or_insert(idx);
                by_key_id.entry(subkey.fingerprint.key_id()).or_insert(idx);
            }
            by_key_id.insert(key.key_id(), idx);

            let mailboxes: HashSet<String> =
                key.user_ids().iter().filter_map(|uid| uid.addr_spec()).collect();
            for mailbox in mailboxes {
                by_mailbox.entry(mailbox).or_default().push(idx);
            }
        }

        Self {
            keys,
            groups,
            by_fingerprint,
            by_key_id,
            by_mailbox,
        }
    }

    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    pub fn groups(&self) -> &[KeyGroup] {
        &self.groups
    }

    /// Returns all keys with a user id for the normalized mailbox.
    pub fn find_by_mailbox(&self, mailbox: &str) -> Vec<Key> {
        self.by_mailbox
            .get(mailbox)
            .map(|indices| indices.iter().map(|idx| self.keys[*idx].clone()).collect())
            .unwrap_or_default()
    }

    fn is_candidate(key: &Key, mailbox: &str, protocol: Protocol, usage: KeyUsage) -> bool {
        if !protocol.accepts(key.protocol()) || key.is_bad() || !key.has_mailbox(mailbox) {
            return false;
        }
        if usage == KeyUsage::Sign && !key.has_secret() {
            return false;
        }
        key.can_use(usage)
    }
}

impl CertificateStore for KeyIndex {
    fn find_by_key_id_or_fingerprint(&self, identifier: &str) -> Option<Key> {
        let id = Fingerprint::new(identifier);
        if !id.is_valid() {
            return None;
        }
        self.by_fingerprint
            .get(&id)
            .or_else(|| self.by_key_id.get(&KeyId::new(id.as_str())))
            .map(|idx| self.keys[*idx].clone())
    }

    fn find_best_by_mailbox(
        &self,
        mailbox: &str,
        protocol: Protocol,
        usage: KeyUsage,
    ) -> Option<Key> {
        let mailbox = mailbox::normalize(mailbox)?;
        let indices = self.by_mailbox.get(&mailbox)?;
        indices
            .iter()
            .map(|idx| &self.keys[*idx])
            .filter(|key| Self::is_candidate(key, &mailbox, protocol, usage))
            .max_by(|a, b| {
                a.validity_for_mailbox(&mailbox)
                    .cmp(&b.validity_for_mailbox(&mailbox))
                    .then_with(|| a.creation_time().cmp(&b.creation_time()))
                    // Lower fingerprint wins among otherwise equal keys.
                    .then_with(|| b.fingerprint().cmp(a.fingerprint()))
            })
            .cloned()
    }

    fn find_group(&self, name: &str, protocol: Protocol, usage: KeyUsage) -> Option<KeyGroup> {
        self.groups
            .iter()
            .find(|group| {
                group.name == name && group.has_protocol(protocol) && group.can_use(usage)
            })
            .cloned()
    }
}

/// The shared certificate cache.
///
/// The index is built from the [`KeySource`] on first use; that first lookup
/// blocks until the listing completed. Callers that run several lookups which
/// must agree with each other should work on a [`KeyCache::snapshot`].
pub struct KeyCache {
    source: Box<dyn KeySource>,
    index: RwLock<Option<Arc<KeyIndex>>>,
}

impl std::fmt::Debug for KeyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyCache")
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}

impl KeyCache {
    /// Creates an empty cache that loads from `source` on first use.
    pub fn new(source: impl KeySource + 'static) -> Self {
        Self {
            source: Box::new(source),
            index: RwLock::new(None),
        }
    }

    /// Creates a cache over fixed lists of keys and groups.
    pub fn from_keys(keys: Vec<Key>, groups: Vec<KeyGroup>) -> Self {
        Self::new(StaticKeySource::new(keys, groups))
    }

    /// Indicates if the index has been loaded.
    pub fn is_initialized(&self) -> bool {
        self.index.read().is_some()
    }

    /// Returns the current index, loading it first if necessary.
    ///
    /// A failed load is logged and results in an empty index, so that lookups
    /// degrade to "not found".
    pub fn snapshot(&self) -> Arc<KeyIndex> {
        if let Some(index) = self.index.read().as_ref() {
            return Arc::clone(index);
        }
        let mut guard = self.index.write();
        // Another thread may have finished loading while we waited for the lock.
        if let Some(index) = guard.as_ref() {
            return Arc::clone(index);
        }
        let index = Arc::new(self.load().unwrap_or_else(|err| {
            tracing::warn!("failed to load the key cache: {err}");
            KeyIndex::default()
        }));
        *guard = Some(Arc::clone(&index));
        index
    }

    /// Reloads the index from the source.
    ///
    /// On failure the previous index is kept.
    pub fn refresh(&self) -> Result<(), KeyCacheError> {
        let index = Arc::new(self.load()?);
        *self.index.write() = Some(index);
        Ok(())
    }

    /// Drops the index. The next lookup reloads it.
    pub fn invalidate(&self) {
        *self.index.write() = None;
    }

    fn load(&self) -> Result<KeyIndex, KeyCacheError> {
        let keys = self.source.list_keys()?;
        let groups = self.source.list_groups()?;
        tracing::debug!(keys = keys.len(), groups = groups.len(), "key cache loaded");
        Ok(KeyIndex::build(keys, groups))
    }
}

impl CertificateStore for KeyCache {
    fn find_by_key_id_or_fingerprint(&self, identifier: &str) -> Option<Key> {
        self.snapshot().find_by_key_id_or_fingerprint(identifier)
    }

    fn find_best_by_mailbox(
        &self,
        mailbox: &str,
        protocol: Protocol,
        usage: KeyUsage,
    ) -> Option<Key> {
        self.snapshot().find_best_by_mailbox(mailbox, protocol, usage)
    }

    fn find_group(&self, name: &str, protocol: Protocol, usage: KeyUsage) -> Option<KeyGroup> {
        self.snapshot().find_group(name, protocol, usage)
    }
}
