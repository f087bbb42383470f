//! Durable broker on SQLite.
//!
//! Messages live in one table; the queue column says which queue holds a
//! row and the state column whether it is ready, handed out, or dead.
//! A handed-out row is leased to its consumer; once the lease runs out
//! without an ack or nack any consumer may claim it again, so delivery is
//! at-least-once across crashes and several workers can share one file.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tokio::sync::Notify;

use rollcall_core::{Clock, SystemClock};

use crate::broker::Broker;
use crate::error::{DeliveryError, Result};
use crate::messages::{DeadLetter, Delivery, DeliveryTag, Topology};

/// How often an idle consumer re-checks the table for rows written by
/// other processes.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// How long a claimed message stays with its consumer before others may
/// take it. Twice the worker's default delivery timeout.
pub const DEFAULT_LEASE: Duration = Duration::from_secs(60);

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS queue_messages (
    tag INTEGER PRIMARY KEY AUTOINCREMENT,
    queue TEXT NOT NULL,
    payload BLOB NOT NULL,
    state TEXT NOT NULL DEFAULT 'ready',
    deliveries INTEGER NOT NULL DEFAULT 0,
    reason TEXT,
    enqueued_at INTEGER NOT NULL,
    claimed_at INTEGER,
    dead_lettered_at INTEGER
);

CREATE INDEX IF NOT EXISTS idx_queue_messages_ready
    ON queue_messages(queue, state, tag);
"#;

/// SQLite-backed broker.
pub struct SqliteBroker {
    conn: Arc<Mutex<Connection>>,
    topology: Topology,
    published: Notify,
    poll_interval: Duration,
    lease: Duration,
}

impl SqliteBroker {
    /// Open the queue database at `path`, creating it if needed.
    ///
    /// Messages left unsettled by a previous process are claimable again
    /// once their lease has run out.
    pub fn open(path: impl AsRef<Path>, topology: Topology) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn, topology)
    }

    /// Open a queue in an in-memory database. Useful for testing.
    pub fn open_memory(topology: Topology) -> Result<Self> {
        Self::init(Connection::open_in_memory()?, topology)
    }

    fn init(conn: Connection, topology: Topology) -> Result<Self> {
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            topology,
            published: Notify::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            lease: DEFAULT_LEASE,
        })
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the claim lease. Keep it above the worker's delivery timeout.
    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| DeliveryError::LockPoisoned(e.to_string()))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| DeliveryError::Task(e.to_string()))?
    }

    async fn try_claim(&self) -> Result<Option<Delivery>> {
        let queue = self.topology.queue.clone();
        let now = SystemClock.now_millis();
        let expired_before = now - self.lease.as_millis() as i64;
        let claimed = self
            .run(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let next: Option<(i64, Vec<u8>, i64, String)> = tx
                    .query_row(
                        "SELECT tag, payload, deliveries, state FROM queue_messages
                         WHERE queue = ?1
                           AND (state = 'ready'
                                OR (state = 'unacked' AND COALESCE(claimed_at, 0) <= ?2))
                         ORDER BY tag LIMIT 1",
                        params![queue, expired_before],
                        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
                    )
                    .optional()?;

                let Some((tag, payload, deliveries, state)) = next else {
                    return Ok(None);
                };
                tx.execute(
                    "UPDATE queue_messages
                     SET state = 'unacked', deliveries = deliveries + 1, claimed_at = ?2
                     WHERE tag = ?1",
                    params![tag, now],
                )?;
                tx.commit()?;

                Ok(Some((
                    Delivery {
                        tag: DeliveryTag(tag as u64),
                        payload,
                        redelivered: deliveries > 0,
                    },
                    state == "unacked",
                )))
            })
            .await?;

        Ok(claimed.map(|(delivery, reclaimed)| {
            if reclaimed {
                tracing::warn!(
                    queue = %self.topology.queue,
                    tag = delivery.tag.0,
                    "reclaimed message after lease expiry"
                );
            }
            delivery
        }))
    }
}

#[async_trait]
impl Broker for SqliteBroker {
    fn topology(&self) -> &Topology {
        &self.topology
    }

    async fn publish_raw(&self, payload: Vec<u8>) -> Result<()> {
        let queue = self.topology.queue.clone();
        let now = SystemClock.now_millis();
        let tag = self
            .run(move |conn| {
                conn.execute(
                    "INSERT INTO queue_messages (queue, payload, enqueued_at) VALUES (?1, ?2, ?3)",
                    params![queue, payload, now],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        tracing::trace!(queue = %self.topology.queue, tag, "published");
        self.published.notify_one();
        Ok(())
    }

    async fn receive(&self) -> Result<Delivery> {
        loop {
            if let Some(delivery) = self.try_claim().await? {
                return Ok(delivery);
            }
            let _ = tokio::time::timeout(self.poll_interval, self.published.notified()).await;
        }
    }

    async fn try_receive(&self) -> Result<Option<Delivery>> {
        self.try_claim().await
    }

    async fn ack(&self, tag: DeliveryTag) -> Result<()> {
        let removed = self
            .run(move |conn| {
                Ok(conn.execute(
                    "DELETE FROM queue_messages WHERE tag = ?1 AND state = 'unacked'",
                    params![tag.0 as i64],
                )?)
            })
            .await?;
        if removed == 0 {
            return Err(DeliveryError::UnknownDelivery(tag.0));
        }
        Ok(())
    }

    async fn nack(&self, tag: DeliveryTag, reason: &str) -> Result<()> {
        let dead_letter_queue = self.topology.dead_letter_queue.clone();
        let reason = reason.to_string();
        let now = SystemClock.now_millis();
        let moved = self
            .run(move |conn| {
                Ok(conn.execute(
                    "UPDATE queue_messages
                     SET queue = ?2, state = 'dead', reason = ?3, dead_lettered_at = ?4
                     WHERE tag = ?1 AND state = 'unacked'",
                    params![tag.0 as i64, dead_letter_queue, reason, now],
                )?)
            })
            .await?;
        if moved == 0 {
            return Err(DeliveryError::UnknownDelivery(tag.0));
        }
        tracing::debug!(
            exchange = %self.topology.dead_letter_exchange,
            routing_key = %self.topology.dead_letter_routing_key,
            tag = tag.0,
            "dead-lettered"
        );
        Ok(())
    }

    async fn ready_len(&self) -> Result<usize> {
        let queue = self.topology.queue.clone();
        let expired_before = SystemClock.now_millis() - self.lease.as_millis() as i64;
        self.run(move |conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM queue_messages
                 WHERE queue = ?1
                   AND (state = 'ready'
                        OR (state = 'unacked' AND COALESCE(claimed_at, 0) <= ?2))",
                params![queue, expired_before],
                |row| row.get(0),
            )?;
            Ok(n as usize)
        })
        .await
    }

    async fn dead_letters(&self) -> Result<Vec<DeadLetter>> {
        let queue = self.topology.dead_letter_queue.clone();
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT payload, reason, dead_lettered_at FROM queue_messages
                 WHERE queue = ?1 AND state = 'dead'
                 ORDER BY dead_lettered_at, tag",
            )?;
            let rows = stmt.query_map(params![queue], |row| {
                Ok(DeadLetter {
                    payload: row.get(0)?,
                    reason: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                    dead_lettered_at: row.get::<_, Option<i64>>(2)?.unwrap_or(0),
                })
            })?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
    }
}
