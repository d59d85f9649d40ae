//! Console session registry (§4.F): atomic bidirectional set membership
//! between servers and the connections subscribed to their output.
//!
//! Implemented with Redis `SADD`/`SREM` rather than read-modify-write, so
//! concurrent (dis)connects never race each other into a lost update (§4.F
//! invariant: membership is never read-modify-written outside tests).

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use uuid::Uuid;

use crate::cache::redis::RedisCache;
use crate::metrics;
use crate::types::{GridkeepError, Result};

pub struct SessionRegistry {
    cache: RedisCache,
}

impl SessionRegistry {
    pub fn new(cache: RedisCache) -> Self {
        Self { cache }
    }

    fn server_subscribers_key(&self, server_id: Uuid) -> String {
        self.cache.key(&["console", "subscribers", &server_id.to_string()])
    }

    fn connection_subscriptions_key(&self, connection_id: Uuid) -> String {
        self.cache.key(&["console", "subscriptions", &connection_id.to_string()])
    }

    fn metadata_key(&self, connection_id: Uuid, server_id: Uuid) -> String {
        self.cache.key(&["console", "metadata", &connection_id.to_string(), &server_id.to_string()])
    }

    /// Join a connection to a server's output. Updates both sides of the
    /// membership atomically enough that a reader never observes one side
    /// updated without the other for longer than a single round trip, and
    /// records the session's operator and connected-at time (§3 Console
    /// Session, §4.F) in a parallel `metadata:{connId}:{serverId}` key.
    pub async fn subscribe(&self, connection_id: Uuid, server_id: Uuid, operator_id: Uuid, ttl_secs: u64) -> Result<()> {
        let mut conn: ConnectionManager = self.cache.connection();
        let subs_key = self.server_subscribers_key(server_id);
        let conn_key = self.connection_subscriptions_key(connection_id);
        let meta_key = self.metadata_key(connection_id, server_id);
        let connected_at = chrono::Utc::now().to_rfc3339();

        let _: () = redis::pipe()
            .atomic()
            .sadd(&subs_key, connection_id.to_string())
            .expire(&subs_key, ttl_secs as i64)
            .sadd(&conn_key, server_id.to_string())
            .expire(&conn_key, ttl_secs as i64)
            .hset(&meta_key, "operatorId", operator_id.to_string())
            .hset(&meta_key, "connectedAt", connected_at)
            .expire(&meta_key, ttl_secs as i64)
            .query_async(&mut conn)
            .await
            .map_err(|e| GridkeepError::Cache(format!("subscribe failed: {e}")))?;

        metrics::record_session_registry_event("subscribe");
        Ok(())
    }

    pub async fn unsubscribe(&self, connection_id: Uuid, server_id: Uuid) -> Result<()> {
        let mut conn: ConnectionManager = self.cache.connection();
        let subs_key = self.server_subscribers_key(server_id);
        let conn_key = self.connection_subscriptions_key(connection_id);
        let meta_key = self.metadata_key(connection_id, server_id);

        let _: () = redis::pipe()
            .atomic()
            .srem(&subs_key, connection_id.to_string())
            .srem(&conn_key, server_id.to_string())
            .del(&meta_key)
            .query_async(&mut conn)
            .await
            .map_err(|e| GridkeepError::Cache(format!("unsubscribe failed: {e}")))?;

        metrics::record_session_registry_event("unsubscribe");
        Ok(())
    }

    /// Drop all of a connection's subscriptions at once (socket closed).
    pub async fn disconnect(&self, connection_id: Uuid) -> Result<()> {
        let mut conn: ConnectionManager = self.cache.connection();
        let conn_key = self.connection_subscriptions_key(connection_id);
        let server_ids: Vec<String> = conn
            .smembers(&conn_key)
            .await
            .map_err(|e| GridkeepError::Cache(format!("smembers failed: {e}")))?;

        for server_id in &server_ids {
            let subs_key = self.cache.key(&["console", "subscribers", server_id]);
            let meta_key = self.cache.key(&["console", "metadata", &connection_id.to_string(), server_id]);
            let _: () = conn
                .srem(&subs_key, connection_id.to_string())
                .await
                .map_err(|e| GridkeepError::Cache(format!("srem failed: {e}")))?;
            let _: () = conn
                .del(&meta_key)
                .await
                .map_err(|e| GridkeepError::Cache(format!("del failed: {e}")))?;
        }
        let _: () = conn
            .del(&conn_key)
            .await
            .map_err(|e| GridkeepError::Cache(format!("del failed: {e}")))?;

        metrics::record_session_registry_event("disconnect");
        Ok(())
    }

    pub async fn subscribers_of(&self, server_id: Uuid) -> Result<Vec<Uuid>> {
        let mut conn: ConnectionManager = self.cache.connection();
        let subs_key = self.server_subscribers_key(server_id);
        let raw: Vec<String> = conn
            .smembers(&subs_key)
            .await
            .map_err(|e| GridkeepError::Cache(format!("smembers failed: {e}")))?;
        Ok(raw.iter().filter_map(|s| Uuid::parse_str(s).ok()).collect())
    }
}
