//! Distributed lock (§4.G): SET-if-not-exists + expiry to acquire, a
//! compare-and-delete Lua script to release — the classic single-instance
//! Redlock pattern, sufficient here because gridkeep's Redis is one
//! instance/cluster, not a multi-master quorum.

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use uuid::Uuid;

use crate::types::{GridkeepError, Result};

/// Release only succeeds if the stored token still matches the holder's
/// token — prevents a lock acquired after our TTL expired from being
/// released out from under its new owner.
const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

pub struct DistributedLock {
    conn: ConnectionManager,
    key: String,
    token: String,
}

impl DistributedLock {
    /// Try to acquire `key` for `ttl`. Returns `None` if already held.
    pub async fn try_acquire(mut conn: ConnectionManager, key: &str, ttl: std::time::Duration) -> Result<Option<Self>> {
        let token = Uuid::new_v4().to_string();
        let acquired: bool = conn
            .set_nx(key, token.as_str())
            .await
            .map_err(|e| GridkeepError::Cache(format!("lock SETNX failed: {e}")))?;

        if !acquired {
            return Ok(None);
        }

        let _: () = conn
            .expire(key, ttl.as_secs() as i64)
            .await
            .map_err(|e| GridkeepError::Cache(format!("lock EXPIRE failed: {e}")))?;

        Ok(Some(Self {
            conn,
            key: key.to_string(),
            token,
        }))
    }

    pub async fn release(mut self) -> Result<()> {
        let script = Script::new(RELEASE_SCRIPT);
        let _: i64 = script
            .key(&self.key)
            .arg(&self.token)
            .invoke_async(&mut self.conn)
            .await
            .map_err(|e| GridkeepError::Cache(format!("lock release failed: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_script_is_a_compare_and_delete() {
        assert!(RELEASE_SCRIPT.contains("redis.call(\"GET\""));
        assert!(RELEASE_SCRIPT.contains("redis.call(\"DEL\""));
    }
}
