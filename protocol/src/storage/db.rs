//! # HarborDB — Persistent Storage Engine
//!
//! Built on sled's embedded key-value store.
//!
//! ## Tree Layout
//!
//! | Tree           | Key                 | Value                         |
//! |----------------|---------------------|-------------------------------|
//! | `snapshots`    | `latest` (UTF-8)    | `bincode(engine snapshot)`    |
//! | `round_prices` | `round` (2B BE)     | `price` (16B BE)              |
//! | `metadata`     | key (UTF-8)         | value (bytes)                 |
//!
//! Rounds are stored as big-endian u16 so that sled's lexicographic
//! ordering matches numeric ordering.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{ConflictableTransactionError, TransactionError, Transactional};
use sled::{CompareAndSwapError, Db, Tree};

use crate::config::PROTOCOL_VERSION;

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("round {round} already closed at {stored}, refusing {attempted}")]
    PriceConflict {
        round: u16,
        stored: u128,
        attempted: u128,
    },

    #[error("snapshot written by protocol {found}, expected {expected}")]
    VersionMismatch { found: String, expected: String },
}

pub type DbResult<T> = Result<T, DbError>;

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

const SNAPSHOT_LATEST: &[u8] = b"latest";
const META_PROTOCOL_VERSION: &[u8] = b"protocol_version";
const META_COMMITS: &[u8] = b"commits";

// ---------------------------------------------------------------------------
// HarborDB
// ---------------------------------------------------------------------------

/// Persistent storage for engine snapshots and the round-price history.
///
/// Cheap to clone; sled handles are reference counted and safe to share
/// across threads.
#[derive(Debug, Clone)]
pub struct HarborDB {
    db: Db,
    snapshots: Tree,
    round_prices: Tree,
    metadata: Tree,
}

impl HarborDB {
    /// Open or create a database at the given filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Create a temporary database that is removed when dropped.
    pub fn open_temporary() -> DbResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> DbResult<Self> {
        let snapshots = db.open_tree("snapshots")?;
        let round_prices = db.open_tree("round_prices")?;
        let metadata = db.open_tree("metadata")?;
        Ok(Self {
            db,
            snapshots,
            round_prices,
            metadata,
        })
    }

    // -- Snapshots ----------------------------------------------------------

    /// Replaces the stored snapshot and bumps the commit counter.
    ///
    /// Flushed before returning, so a successful call survives a crash.
    pub fn put_snapshot<T: Serialize>(&self, snapshot: &T) -> DbResult<()> {
        self.put_snapshot_with_price(snapshot, None)
    }

    /// Replaces the stored snapshot and, if given, records a closed round's
    /// price, in one sled transaction across all three trees.
    ///
    /// A price conflicting with the stored one aborts the whole write.
    pub fn put_snapshot_with_price<T: Serialize>(
        &self,
        snapshot: &T,
        closed: Option<(u16, u128)>,
    ) -> DbResult<()> {
        let bytes =
            bincode::serialize(snapshot).map_err(|e| DbError::Serialization(e.to_string()))?;

        (&self.snapshots, &self.round_prices, &self.metadata)
            .transaction(|(snapshots, prices, metadata)| {
                if let Some((round, price)) = closed {
                    let key = round.to_be_bytes();
                    match prices.get(&key[..])? {
                        Some(stored) => {
                            let stored =
                                decode_price(&stored).map_err(ConflictableTransactionError::Abort)?;
                            if stored != price {
                                return Err(ConflictableTransactionError::Abort(
                                    DbError::PriceConflict {
                                        round,
                                        stored,
                                        attempted: price,
                                    },
                                ));
                            }
                        }
                        None => {
                            prices.insert(&key[..], &price.to_be_bytes()[..])?;
                        }
                    }
                }

                let commits = match metadata.get(META_COMMITS)? {
                    Some(raw) => decode_counter(&raw).map_err(ConflictableTransactionError::Abort)?,
                    None => 0,
                };
                snapshots.insert(SNAPSHOT_LATEST, bytes.as_slice())?;
                metadata.insert(META_PROTOCOL_VERSION, PROTOCOL_VERSION.as_bytes())?;
                metadata.insert(META_COMMITS, &commits.saturating_add(1).to_be_bytes()[..])?;
                Ok(())
            })
            .map_err(|e| match e {
                TransactionError::Abort(err) => err,
                TransactionError::Storage(err) => DbError::Sled(err),
            })?;

        self.db.flush()?;
        Ok(())
    }

    /// The stored snapshot, or `None` for a fresh database.
    ///
    /// Refuses snapshots written by a different protocol version.
    pub fn get_snapshot<T: DeserializeOwned>(&self) -> DbResult<Option<T>> {
        let Some(bytes) = self.snapshots.get(SNAPSHOT_LATEST)? else {
            return Ok(None);
        };
        if let Some(found) = self.metadata.get(META_PROTOCOL_VERSION)? {
            let found = String::from_utf8_lossy(&found).into_owned();
            if found != PROTOCOL_VERSION {
                return Err(DbError::VersionMismatch {
                    found,
                    expected: PROTOCOL_VERSION.to_string(),
                });
            }
        }
        let snapshot =
            bincode::deserialize(&bytes).map_err(|e| DbError::Serialization(e.to_string()))?;
        Ok(Some(snapshot))
    }

    /// Number of snapshots written over the database's lifetime.
    pub fn commit_count(&self) -> DbResult<u64> {
        match self.metadata.get(META_COMMITS)? {
            Some(bytes) => decode_counter(&bytes),
            None => Ok(0),
        }
    }

    // -- Round prices -------------------------------------------------------

    /// Records the closing price of `round`.
    ///
    /// Rewriting the stored value is a no-op; a different value is a
    /// [`DbError::PriceConflict`].
    pub fn put_round_price(&self, round: u16, price: u128) -> DbResult<()> {
        let swapped = self.round_prices.compare_and_swap(
            round.to_be_bytes(),
            None as Option<&[u8]>,
            Some(&price.to_be_bytes()[..]),
        )?;
        match swapped {
            Ok(()) => Ok(()),
            Err(CompareAndSwapError { current, .. }) => {
                let Some(current) = current else {
                    return Ok(());
                };
                let stored = decode_price(&current)?;
                if stored == price {
                    Ok(())
                } else {
                    Err(DbError::PriceConflict {
                        round,
                        stored,
                        attempted: price,
                    })
                }
            }
        }
    }

    pub fn get_round_price(&self, round: u16) -> DbResult<Option<u128>> {
        match self.round_prices.get(round.to_be_bytes())? {
            Some(bytes) => Ok(Some(decode_price(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Every recorded price in ascending round order.
    pub fn round_prices(&self) -> DbResult<Vec<(u16, u128)>> {
        let mut prices = Vec::with_capacity(self.round_prices.len());
        for entry in self.round_prices.iter() {
            let (key, value) = entry?;
            let raw: [u8; 2] = key
                .as_ref()
                .try_into()
                .map_err(|_| DbError::Serialization("invalid round key".to_string()))?;
            prices.push((u16::from_be_bytes(raw), decode_price(&value)?));
        }
        Ok(prices)
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> DbResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

fn decode_counter(bytes: &[u8]) -> DbResult<u64> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| DbError::Serialization("invalid commit counter".to_string()))?;
    Ok(u64::from_be_bytes(raw))
}

fn decode_price(bytes: &[u8]) -> DbResult<u128> {
    let raw: [u8; 16] = bytes
        .try_into()
        .map_err(|_| DbError::Serialization("invalid price bytes".to_string()))?;
    Ok(u128::from_be_bytes(raw))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
