//! Content-addressed cache of extraction results. Byte-identical photo sets
//! skip the vision call entirely; invalidation is explicit.

use dashmap::DashMap;
use sha2::{Digest, Sha256};

use crate::extraction::types::ExtractedInvoice;

/// sha256 over all page bytes in order, hex-encoded.
pub fn content_hash(pages: &[impl AsRef<[u8]>]) -> String {
    let mut hasher = Sha256::new();
    for page in pages {
        hasher.update(page.as_ref());
    }
    hex::encode(hasher.finalize())
}

#[derive(Default)]
pub struct ExtractionCache {
    entries: DashMap<String, ExtractedInvoice>,
}

impl ExtractionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, hash: &str) -> Option<ExtractedInvoice> {
        self.entries.get(hash).map(|e| e.clone())
    }

    pub fn put(&self, hash: String, result: ExtractedInvoice) {
        self.entries.insert(hash, result);
    }

    pub fn invalidate(&self, hash: &str) {
        self.entries.remove(hash);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_order_sensitive_and_stable() {
        let a = content_hash(&[b"page1".as_slice(), b"page2".as_slice()]);
        let b = content_hash(&[b"page1".as_slice(), b"page2".as_slice()]);
        let c = content_hash(&[b"page2".as_slice(), b"page1".as_slice()]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn put_get_invalidate() {
        let cache = ExtractionCache::new();
        let hash = content_hash(&[b"bytes".as_slice()]);

        assert!(cache.get(&hash).is_none());
        cache.put(hash.clone(), ExtractedInvoice::default());
        assert!(cache.get(&hash).is_some());

        cache.invalidate(&hash);
        assert!(cache.get(&hash).is_none());
    }
}
