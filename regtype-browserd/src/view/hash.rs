use serde::Serialize;
use sha2::{Digest, Sha256};
use shared::types::RegTypeEntry;

/// Only identity and count matter; the publish time changes on every update
#[derive(Serialize)]
struct HashView<'a> {
    label: &'a str,
    domain: &'a str,
    live_count: i64,
}

/// Computes a SHA-256 hash of the published list.
/// Order is part of the list, so entries are hashed as given.
pub fn compute_hash(entries: &[RegTypeEntry]) -> anyhow::Result<String> {
    let views: Vec<HashView<'_>> = entries
        .iter()
        .map(|e| HashView {
            label: &e.label,
            domain: &e.domain,
            live_count: e.live_count,
        })
        .collect();

    let json = serde_json::to_string(&views)?;
    Ok(hex::encode(Sha256::digest(json.as_bytes())))
}
