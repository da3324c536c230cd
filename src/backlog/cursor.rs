//! Where each device has read up to, per context.

use async_trait::async_trait;
use chrono::FixedOffset;

use crate::db::{Database, DbError};

/// Persistence for per-device read positions within one session.
#[async_trait]
pub trait CursorStore: Send + Sync {
    /// Record that `device` has attached. Returns `true` the first time.
    async fn register_device(&self, device: &str) -> Result<bool, DbError>;

    async fn position(&self, device: &str, context: &str) -> Result<Option<u64>, DbError>;

    async fn set_position(&self, device: &str, context: &str, position: u64) -> Result<(), DbError>;

    /// Offset for plain-text timestamps; `None` means local time.
    async fn utc_offset(&self, device: &str) -> Result<Option<FixedOffset>, DbError>;

    async fn set_utc_offset(&self, device: &str, offset: Option<FixedOffset>) -> Result<(), DbError>;
}

/// Cursors kept in the `backlog_positions` table for one network user.
pub struct DbCursorStore {
    db: Database,
    network_user_id: i64,
}

impl DbCursorStore {
    pub fn new(db: Database, network_user_id: i64) -> Self {
        Self { db, network_user_id }
    }
}

#[async_trait]
impl CursorStore for DbCursorStore {
    async fn register_device(&self, device: &str) -> Result<bool, DbError> {
        self.db
            .cursors()
            .register_device(self.network_user_id, device)
            .await
    }

    async fn position(&self, device: &str, context: &str) -> Result<Option<u64>, DbError> {
        self.db
            .cursors()
            .position(self.network_user_id, device, context)
            .await
    }

    async fn set_position(&self, device: &str, context: &str, position: u64) -> Result<(), DbError> {
        self.db
            .cursors()
            .set_position(self.network_user_id, device, context, position)
            .await
    }

    async fn utc_offset(&self, device: &str) -> Result<Option<FixedOffset>, DbError> {
        let secs = self
            .db
            .cursors()
            .utc_offset(self.network_user_id, device)
            .await?;
        Ok(secs.and_then(FixedOffset::east_opt))
    }

    async fn set_utc_offset(&self, device: &str, offset: Option<FixedOffset>) -> Result<(), DbError> {
        self.db
            .cursors()
            .set_utc_offset(
                self.network_user_id,
                device,
                offset.map(|o| o.local_minus_utc()),
            )
            .await
    }
}

#[cfg(test)]
pub(crate) mod memory {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::{HashMap, HashSet};

    /// In-memory cursors for backlog tests.
    #[derive(Default)]
    pub struct MemoryCursorStore {
        devices: Mutex<HashSet<String>>,
        positions: Mutex<HashMap<(String, String), u64>>,
        offsets: Mutex<HashMap<String, FixedOffset>>,
    }

    #[async_trait]
    impl CursorStore for MemoryCursorStore {
        async fn register_device(&self, device: &str) -> Result<bool, DbError> {
            Ok(self.devices.lock().insert(device.to_owned()))
        }

        async fn position(&self, device: &str, context: &str) -> Result<Option<u64>, DbError> {
            Ok(self
                .positions
                .lock()
                .get(&(device.to_owned(), context.to_owned()))
                .copied())
        }

        async fn set_position(
            &self,
            device: &str,
            context: &str,
            position: u64,
        ) -> Result<(), DbError> {
            self.positions
                .lock()
                .insert((device.to_owned(), context.to_owned()), position);
            Ok(())
        }

        async fn utc_offset(&self, device: &str) -> Result<Option<FixedOffset>, DbError> {
            Ok(self.offsets.lock().get(device).copied())
        }

        async fn set_utc_offset(
            &self,
            device: &str,
            offset: Option<FixedOffset>,
        ) -> Result<(), DbError> {
            let mut offsets = self.offsets.lock();
            match offset {
                Some(offset) => offsets.insert(device.to_owned(), offset),
                None => offsets.remove(device),
            };
            Ok(())
        }
    }
}
