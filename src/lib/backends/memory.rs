//! In-memory store backend for testing and development.
//!
//! Mirrors the store semantics the processor relies on: hashes holding
//! string values, sorted sets, plain sets, rename, and batches that are applied
//! all-or-nothing under a single write lock. All data is lost when the
//! process stops.

use async_trait::async_trait;
use std::{
    collections::{HashMap, HashSet},
    sync::atomic::{AtomicUsize, Ordering},
};
use tokio::sync::RwLock;

use crate::{
    error::{StoreError, StoreResult},
    store::{StoreClient, StoreHealth},
    types::{Batch, Command, FinalizeGuard},
};

/// Version reported by [`MemoryStore::server_version`].
pub const MEMORY_STORE_VERSION: &str = "7.2.0";

#[derive(Debug)]
enum Entry {
    Hash(HashMap<String, String>),
    SortedSet(HashMap<String, i64>),
    Set(HashSet<String>),
}

impl Entry {
    fn kind(&self) -> &'static str {
        match self {
            Entry::Hash(_) => "hash",
            Entry::SortedSet(_) => "zset",
            Entry::Set(_) => "set",
        }
    }
}

type Keyspace = HashMap<String, Entry>;

/// In-memory implementation of [`StoreClient`].
pub struct MemoryStore {
    keyspace: RwLock<Keyspace>,
    last_operation_timestamp: RwLock<Option<u64>>,
    failing_reads: AtomicUsize,
    failing_executes: AtomicUsize,
}

impl MemoryStore {
    /// Create a new, empty MemoryStore
    pub fn new() -> Self {
        Self {
            keyspace: RwLock::new(HashMap::new()),
            last_operation_timestamp: RwLock::new(None),
            failing_reads: AtomicUsize::new(0),
            failing_executes: AtomicUsize::new(0),
        }
    }

    /// Make the next `count` reads fail with a backend error.
    pub fn fail_next_reads(&self, count: usize) {
        self.failing_reads.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` batch executions fail before applying anything.
    pub fn fail_next_executes(&self, count: usize) {
        self.failing_executes.store(count, Ordering::SeqCst);
    }

    /// Value of a single hash field.
    pub async fn hget(&self, key: &str, field: &str) -> Option<String> {
        match self.keyspace.read().await.get(key) {
            Some(Entry::Hash(hash)) => hash.get(field).cloned(),
            _ => None,
        }
    }

    /// Members of a set, sorted.
    pub async fn set_members(&self, key: &str) -> Vec<String> {
        match self.keyspace.read().await.get(key) {
            Some(Entry::Set(set)) => {
                let mut members: Vec<String> = set.iter().cloned().collect();
                members.sort();
                members
            }
            _ => Vec::new(),
        }
    }

    /// Members of a sorted set with their scores, lowest score first.
    pub async fn sorted_set(&self, key: &str) -> Vec<(String, i64)> {
        match self.keyspace.read().await.get(key) {
            Some(Entry::SortedSet(zset)) => {
                let mut members: Vec<(String, i64)> =
                    zset.iter().map(|(m, s)| (m.clone(), *s)).collect();
                members.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
                members
            }
            _ => Vec::new(),
        }
    }

    /// All keys currently present, sorted.
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.keyspace.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    fn take_fault(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    async fn update_last_operation_timestamp(&self) {
        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        *self.last_operation_timestamp.write().await = Some(timestamp);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn wrong_type(key: &str, entry: &Entry, wanted: &str) -> StoreError {
    StoreError::InvalidData(format!(
        "WRONGTYPE {} holds a {}, expected {}",
        key,
        entry.kind(),
        wanted
    ))
}

/// How to reverse one applied mutation.
enum Undo {
    /// Restore a hash field, dropping the hash when the step created it
    HashField {
        key: String,
        field: String,
        previous: Option<String>,
        created: bool,
    },
    SortedSetMember {
        key: String,
        member: String,
        previous: Option<i64>,
        created: bool,
    },
    SetMember {
        key: String,
        member: String,
        inserted: bool,
        created: bool,
    },
    /// Move `to` back to `from` and put back what the rename replaced
    Rename {
        from: String,
        to: String,
        displaced: Option<Entry>,
    },
}

/// Whether `key` exists, failing when it holds another type.
fn existing(keyspace: &Keyspace, key: &str, wanted: &str) -> StoreResult<bool> {
    match keyspace.get(key) {
        None => Ok(false),
        Some(entry) if entry.kind() == wanted => Ok(true),
        Some(other) => Err(wrong_type(key, other, wanted)),
    }
}

fn hash_field(keyspace: &Keyspace, key: &str, field: &str) -> StoreResult<(bool, Option<String>)> {
    match keyspace.get(key) {
        None => Ok((false, None)),
        Some(Entry::Hash(hash)) => Ok((true, hash.get(field).cloned())),
        Some(other) => Err(wrong_type(key, other, "hash")),
    }
}

/// Caller has already checked `key` is a hash or absent.
fn set_hash_field(keyspace: &mut Keyspace, key: &str, field: String, value: String) {
    if let Entry::Hash(hash) = keyspace
        .entry(key.to_string())
        .or_insert_with(|| Entry::Hash(HashMap::new()))
    {
        hash.insert(field, value);
    }
}

fn check_guard(keyspace: &Keyspace, guard: &FinalizeGuard) -> StoreResult<()> {
    match hash_field(keyspace, &guard.key, &guard.field)? {
        (_, Some(_)) => Err(StoreError::GuardTripped {
            key: guard.key.clone(),
            field: guard.field.clone(),
        }),
        (_, None) => Ok(()),
    }
}

/// Apply one command in place. Every check runs before the keyspace is
/// touched, so an error leaves this command unapplied.
fn apply(keyspace: &mut Keyspace, command: Command) -> StoreResult<Option<Undo>> {
    match command {
        Command::HashIncrByFloat { key, field, delta } => {
            let (existed, previous) = hash_field(keyspace, &key, &field)?;
            let current = match &previous {
                Some(raw) => raw.parse::<f64>().map_err(|_| {
                    StoreError::InvalidData(format!("{} {} is not a valid float", key, field))
                })?,
                None => 0.0,
            };
            let next = current + delta;
            if !next.is_finite() {
                return Err(StoreError::InvalidData(format!(
                    "increment would produce NaN or Infinity on {} {}",
                    key, field
                )));
            }
            set_hash_field(keyspace, &key, field.clone(), next.to_string());
            Ok(Some(Undo::HashField {
                key,
                field,
                previous,
                created: !existed,
            }))
        }
        Command::HashIncrBy { key, field, delta } => {
            let (existed, previous) = hash_field(keyspace, &key, &field)?;
            let current = match &previous {
                Some(raw) => raw.parse::<i64>().map_err(|_| {
                    StoreError::InvalidData(format!("{} {} is not an integer", key, field))
                })?,
                None => 0,
            };
            let next = current.checked_add(delta).ok_or_else(|| {
                StoreError::InvalidData(format!("increment overflow on {} {}", key, field))
            })?;
            set_hash_field(keyspace, &key, field.clone(), next.to_string());
            Ok(Some(Undo::HashField {
                key,
                field,
                previous,
                created: !existed,
            }))
        }
        Command::SortedSetAdd { key, score, member } => {
            let created = !existing(keyspace, &key, "zset")?;
            let previous = match keyspace
                .entry(key.clone())
                .or_insert_with(|| Entry::SortedSet(HashMap::new()))
            {
                Entry::SortedSet(zset) => zset.insert(member.clone(), score),
                _ => None,
            };
            Ok(Some(Undo::SortedSetMember {
                key,
                member,
                previous,
                created,
            }))
        }
        Command::SetAdd { key, member } => {
            let created = !existing(keyspace, &key, "set")?;
            let inserted = match keyspace
                .entry(key.clone())
                .or_insert_with(|| Entry::Set(HashSet::new()))
            {
                Entry::Set(set) => set.insert(member.clone()),
                _ => false,
            };
            Ok(Some(Undo::SetMember {
                key,
                member,
                inserted,
                created,
            }))
        }
        Command::Rename { from, to, required } => match keyspace.remove(&from) {
            Some(entry) => {
                let displaced = keyspace.insert(to.clone(), entry);
                Ok(Some(Undo::Rename {
                    from,
                    to,
                    displaced,
                }))
            }
            None if required => Err(StoreError::NoSuchKey(from)),
            None => Ok(None),
        },
    }
}

fn apply_all(
    keyspace: &mut Keyspace,
    commands: Vec<Command>,
    guard: Option<FinalizeGuard>,
    undo: &mut Vec<Undo>,
) -> StoreResult<()> {
    for command in commands {
        if let Some(step) = apply(keyspace, command)? {
            undo.push(step);
        }
    }
    // Set last, so the marker only exists once every command has applied
    if let Some(guard) = guard {
        let (existed, previous) = hash_field(keyspace, &guard.key, &guard.field)?;
        set_hash_field(keyspace, &guard.key, guard.field.clone(), guard.value);
        undo.push(Undo::HashField {
            key: guard.key,
            field: guard.field,
            previous,
            created: !existed,
        });
    }
    Ok(())
}

/// Reverse applied steps, newest first.
fn revert(keyspace: &mut Keyspace, undo: Vec<Undo>) {
    for step in undo.into_iter().rev() {
        match step {
            Undo::HashField {
                key,
                field,
                previous,
                created,
            } => {
                if created {
                    keyspace.remove(&key);
                } else if let Some(Entry::Hash(hash)) = keyspace.get_mut(&key) {
                    match previous {
                        Some(value) => hash.insert(field, value),
                        None => hash.remove(&field),
                    };
                }
            }
            Undo::SortedSetMember {
                key,
                member,
                previous,
                created,
            } => {
                if created {
                    keyspace.remove(&key);
                } else if let Some(Entry::SortedSet(zset)) = keyspace.get_mut(&key) {
                    match previous {
                        Some(score) => zset.insert(member, score),
                        None => zset.remove(&member),
                    };
                }
            }
            Undo::SetMember {
                key,
                member,
                inserted,
                created,
            } => {
                if created {
                    keyspace.remove(&key);
                } else if inserted {
                    if let Some(Entry::Set(set)) = keyspace.get_mut(&key) {
                        set.remove(&member);
                    }
                }
            }
            Undo::Rename {
                from,
                to,
                displaced,
            } => {
                if let Some(entry) = keyspace.remove(&to) {
                    keyspace.insert(from, entry);
                }
                if let Some(displaced) = displaced {
                    keyspace.insert(to, displaced);
                }
            }
        }
    }
}

#[async_trait]
impl StoreClient for MemoryStore {
    async fn hgetall(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        if Self::take_fault(&self.failing_reads) {
            return Err(StoreError::BackendError("injected read failure".to_string()));
        }
        match self.keyspace.read().await.get(key) {
            None => Ok(HashMap::new()),
            Some(Entry::Hash(hash)) => Ok(hash.clone()),
            Some(other) => Err(wrong_type(key, other, "hash")),
        }
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        if Self::take_fault(&self.failing_reads) {
            return Err(StoreError::BackendError("injected read failure".to_string()));
        }
        Ok(self.keyspace.read().await.contains_key(key))
    }

    async fn execute(&self, batch: Batch) -> StoreResult<()> {
        if Self::take_fault(&self.failing_executes) {
            return Err(StoreError::BackendError(
                "injected execute failure".to_string(),
            ));
        }
        self.update_last_operation_timestamp().await;

        let (commands, guard) = batch.into_parts();
        let mut keyspace = self.keyspace.write().await;
        if let Some(guard) = &guard {
            check_guard(&keyspace, guard)?;
        }

        // Applied in place; a failing command rolls back the steps before it.
        let mut undo = Vec::with_capacity(commands.len() + 1);
        if let Err(e) = apply_all(&mut keyspace, commands, guard, &mut undo) {
            revert(&mut keyspace, undo);
            return Err(e);
        }
        Ok(())
    }

    async fn server_version(&self) -> StoreResult<Option<String>> {
        Ok(Some(MEMORY_STORE_VERSION.to_string()))
    }

    async fn health_check(&self) -> StoreResult<StoreHealth> {
        let last_operation = *self.last_operation_timestamp.read().await;

        Ok(StoreHealth {
            is_healthy: true,
            backend_type: "memory".to_string(),
            connection_status: "connected".to_string(),
            last_operation_timestamp: last_operation,
            error_message: None,
        })
    }
}
