//! Bulk data transforms.
//!
//! A transform is an injected function value with a fixed signature: it
//! receives the transactional overlay (the data shape as it exists at that
//! point in the sequence, schema access included) and performs bulk reads
//! and writes. Forward is mandatory; reverse is optional, and rollback
//! through a transform without one fails rather than silently skipping.

use super::error::OperationError;
use crate::schema::Value;
use crate::store::StoreTxn;
use rand::Rng;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Signature shared by forward and reverse transform callbacks.
pub type TransformFn = Arc<dyn Fn(&mut StoreTxn<'_>) -> Result<(), OperationError> + Send + Sync>;

/// A named forward/reverse transform pair.
#[derive(Clone)]
pub struct DataTransform {
    name: String,
    forward: TransformFn,
    reverse: Option<TransformFn>,
}

impl DataTransform {
    /// Create a forward-only (irreversible) transform.
    pub fn new(
        name: impl Into<String>,
        forward: impl Fn(&mut StoreTxn<'_>) -> Result<(), OperationError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            forward: Arc::new(forward),
            reverse: None,
        }
    }

    /// Attach a reverse callback (builder style).
    pub fn with_reverse(
        mut self,
        reverse: impl Fn(&mut StoreTxn<'_>) -> Result<(), OperationError> + Send + Sync + 'static,
    ) -> Self {
        self.reverse = Some(Arc::new(reverse));
        self
    }

    /// Transform name, used in logs and error messages.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether a reverse callback was declared.
    pub fn is_reversible(&self) -> bool {
        self.reverse.is_some()
    }

    pub(crate) fn run_forward(&self, txn: &mut StoreTxn<'_>) -> Result<(), OperationError> {
        (self.forward)(txn)
    }

    pub(crate) fn run_reverse(&self, txn: &mut StoreTxn<'_>) -> Result<(), OperationError> {
        match &self.reverse {
            Some(reverse) => reverse(txn),
            None => Err(OperationError::Irreversible {
                transform: self.name.clone(),
            }),
        }
    }
}

impl std::fmt::Debug for DataTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataTransform")
            .field("name", &self.name)
            .field("reversible", &self.reverse.is_some())
            .finish()
    }
}

/// Parameters for unique-token generation.
#[derive(Debug, Clone)]
pub struct TokenSpec {
    /// Characters tokens are drawn from. Must be non-empty ASCII.
    pub alphabet: String,
    /// Token length.
    pub length: usize,
    /// Retry budget per row before giving up with `CollisionExhausted`.
    pub max_attempts: usize,
}

impl Default for TokenSpec {
    /// The production policy: uppercase letters plus digits, length 10
    /// (~3.7e15 combinations).
    fn default() -> Self {
        Self {
            alphabet: "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789".to_string(),
            length: 10,
            max_attempts: 32,
        }
    }
}

impl TokenSpec {
    /// Generate one candidate token.
    pub fn generate(&self, rng: &mut impl Rng) -> String {
        let alphabet = self.alphabet.as_bytes();
        (0..self.length)
            .map(|_| alphabet[rng.gen_range(0..alphabet.len())] as char)
            .collect()
    }

    fn generate_unique(
        &self,
        rng: &mut impl Rng,
        taken: &HashSet<String>,
        entity: &str,
        field: &str,
    ) -> Result<String, OperationError> {
        for _ in 0..self.max_attempts {
            let candidate = self.generate(rng);
            if !taken.contains(&candidate) {
                return Ok(candidate);
            }
        }
        Err(OperationError::CollisionExhausted {
            entity: entity.to_string(),
            field: field.to_string(),
            attempts: self.max_attempts,
        })
    }
}

/// Backfill a field with a declared default.
///
/// Forward: for every row matching the optional `(field, value)` predicate
/// where the target field is unset, set it to `default`. Rows that already
/// carry a value are left untouched. Reverse: clear the field for all rows
/// (lossy; previously-set values are not distinguishable from backfilled
/// ones).
pub fn backfill_with_default(
    entity: impl Into<String>,
    field: impl Into<String>,
    default: impl Into<Value>,
    only_where: Option<(String, Value)>,
) -> DataTransform {
    let entity = entity.into();
    let field = field.into();
    let default = default.into();
    let name = format!("backfill_{}_{}", entity, field);

    let fwd_entity = entity.clone();
    let fwd_field = field.clone();
    let rev_entity = entity;
    let rev_field = field;

    DataTransform::new(name, move |txn| {
        let mut updated = 0usize;
        for (id, mut row) in txn.scan(&fwd_entity)? {
            if let Some((pred_field, pred_value)) = &only_where {
                if row.get(pred_field) != Some(pred_value) {
                    continue;
                }
            }
            let unset = row.get(&fwd_field).map(Value::is_unset).unwrap_or(true);
            if unset {
                row.set(fwd_field.clone(), default.clone());
                txn.update_row(&fwd_entity, id, row);
                updated += 1;
            }
        }
        debug!(entity = %fwd_entity, field = %fwd_field, updated, "backfilled default");
        Ok(())
    })
    .with_reverse(move |txn| {
        for (id, mut row) in txn.scan(&rev_entity)? {
            if row.remove(&rev_field).is_some() {
                txn.update_row(&rev_entity, id, row);
            }
        }
        Ok(())
    })
}

/// Fill empty token fields with fresh unique tokens.
///
/// Every row whose field is unset gets a random token from the spec's
/// alphabet. Candidates are collision-checked against all existing values
/// of the field, including tokens generated earlier in the same run, and
/// retried within the spec's budget. Irreversible: the values the tokens
/// replaced are unrecoverable.
pub fn regenerate_tokens(
    entity: impl Into<String>,
    field: impl Into<String>,
    spec: TokenSpec,
) -> DataTransform {
    let entity = entity.into();
    let field = field.into();
    let name = format!("regenerate_{}_{}", entity, field);

    DataTransform::new(name.clone(), move |txn| {
        if spec.alphabet.is_empty() || spec.length == 0 {
            return Err(OperationError::TransformFailed {
                transform: name.clone(),
                message: "token spec needs a non-empty alphabet and length".to_string(),
            });
        }

        let rows = txn.scan(&entity)?;
        let mut taken: HashSet<String> = rows
            .iter()
            .filter_map(|(_, row)| row.get(&field))
            .filter(|v| !v.is_unset())
            .filter_map(|v| v.as_text().map(|s| s.to_string()))
            .collect();

        let mut rng = rand::thread_rng();
        let mut generated = 0usize;
        for (id, mut row) in rows {
            let unset = row.get(&field).map(Value::is_unset).unwrap_or(true);
            if !unset {
                continue;
            }
            let token = spec.generate_unique(&mut rng, &taken, &entity, &field)?;
            taken.insert(token.clone());
            row.set(field.clone(), token);
            txn.update_row(&entity, id, row);
            generated += 1;
        }
        debug!(entity = %entity, field = %field, generated, "regenerated unique tokens");
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Row, Store};

    fn open_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path()).unwrap();
        let store = Store::open(&db).unwrap();
        (dir, store)
    }

    #[test]
    fn test_token_spec_alphabet_and_length() {
        let spec = TokenSpec::default();
        let mut rng = rand::thread_rng();
        let token = spec.generate(&mut rng);

        assert_eq!(token.len(), 10);
        assert!(token.chars().all(|c| spec.alphabet.contains(c)));
    }

    #[test]
    fn test_regenerate_tokens_unique_and_preserving() {
        let (_dir, store) = open_store();
        store
            .put_row("item", 1, &Row::new().with("share_token", "KEEPME0000"))
            .unwrap();
        for id in 2..=20u64 {
            store
                .put_row("item", id, &Row::new().with("share_token", ""))
                .unwrap();
        }

        let transform = regenerate_tokens("item", "share_token", TokenSpec::default());
        let mut txn = store.begin();
        transform.run_forward(&mut txn).unwrap();
        txn.commit().unwrap();

        let rows = store.scan_rows("item").unwrap();
        let tokens: Vec<String> = rows
            .iter()
            .map(|(_, row)| row.get("share_token").unwrap().as_text().unwrap().to_string())
            .collect();

        // Pre-existing token untouched.
        assert_eq!(tokens[0], "KEEPME0000");
        // All tokens non-empty and pairwise distinct.
        assert!(tokens.iter().all(|t| !t.is_empty()));
        let distinct: HashSet<&String> = tokens.iter().collect();
        assert_eq!(distinct.len(), tokens.len());
        // Generated tokens respect the alphabet and length.
        let spec = TokenSpec::default();
        for token in &tokens[1..] {
            assert_eq!(token.len(), spec.length);
            assert!(token.chars().all(|c| spec.alphabet.contains(c)));
        }
    }

    #[test]
    fn test_regenerate_tokens_collision_exhaustion() {
        let (_dir, store) = open_store();
        // One-character alphabet, length one: a single token exists, so the
        // second empty row must exhaust the retry budget.
        store.put_row("item", 1, &Row::new().with("code", "")).unwrap();
        store.put_row("item", 2, &Row::new().with("code", "")).unwrap();

        let spec = TokenSpec {
            alphabet: "A".to_string(),
            length: 1,
            max_attempts: 5,
        };
        let transform = regenerate_tokens("item", "code", spec);

        let mut txn = store.begin();
        match transform.run_forward(&mut txn) {
            Err(OperationError::CollisionExhausted { attempts, .. }) => assert_eq!(attempts, 5),
            other => panic!("expected exhaustion, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_regenerate_tokens_is_irreversible() {
        let (_dir, store) = open_store();
        let transform = regenerate_tokens("item", "share_token", TokenSpec::default());
        assert!(!transform.is_reversible());

        let mut txn = store.begin();
        assert!(matches!(
            transform.run_reverse(&mut txn),
            Err(OperationError::Irreversible { .. })
        ));
    }

    #[test]
    fn test_backfill_respects_predicate_and_existing_values() {
        let (_dir, store) = open_store();
        store
            .put_row("group", 1, &Row::new().with("status", "active"))
            .unwrap();
        store
            .put_row(
                "group",
                2,
                &Row::new().with("status", "active").with("settings", "custom"),
            )
            .unwrap();
        store
            .put_row("group", 3, &Row::new().with("status", "archived"))
            .unwrap();

        let transform = backfill_with_default(
            "group",
            "settings",
            "defaults",
            Some(("status".to_string(), Value::Text("active".into()))),
        );
        let mut txn = store.begin();
        transform.run_forward(&mut txn).unwrap();
        txn.commit().unwrap();

        // Unset + matching predicate: backfilled.
        assert_eq!(
            store.row("group", 1).unwrap().unwrap().get("settings"),
            Some(&Value::Text("defaults".into()))
        );
        // Already set: untouched.
        assert_eq!(
            store.row("group", 2).unwrap().unwrap().get("settings"),
            Some(&Value::Text("custom".into()))
        );
        // Predicate mismatch: untouched.
        assert!(store.row("group", 3).unwrap().unwrap().get("settings").is_none());
    }

    #[test]
    fn test_backfill_reverse_clears_all_rows() {
        let (_dir, store) = open_store();
        store
            .put_row("group", 1, &Row::new().with("settings", "defaults"))
            .unwrap();
        store
            .put_row("group", 2, &Row::new().with("settings", "custom"))
            .unwrap();

        let transform = backfill_with_default("group", "settings", "defaults", None);
        let mut txn = store.begin();
        transform.run_reverse(&mut txn).unwrap();
        txn.commit().unwrap();

        // Reverse is lossy: both backfilled and custom values are cleared.
        assert!(store.row("group", 1).unwrap().unwrap().get("settings").is_none());
        assert!(store.row("group", 2).unwrap().unwrap().get("settings").is_none());
    }
}
