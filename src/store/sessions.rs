use super::{Session, Store, StoreResult};
use rusqlite::{params, OptionalExtension};

/// Persisted record of live token ids. Deleting a row is the only way to
/// revoke a token before its claims expire.
pub trait SessionStore: Send + Sync {
    fn insert_session(&self, session: &Session) -> StoreResult<()>;

    fn find_session(&self, token_id: &str) -> StoreResult<Option<Session>>;

    /// Returns true if a row was removed.
    fn delete_session(&self, token_id: &str) -> StoreResult<bool>;

    /// Removes rows whose `expires_at` is at or before `now_ms`.
    fn delete_expired_sessions(&self, now_ms: i64) -> StoreResult<usize>;
}

impl SessionStore for Store {
    fn insert_session(&self, session: &Session) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sessions (jti, user_id, expires_at, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                session.token_id,
                session.user_id,
                session.expires_at,
                session.created_at
            ],
        )?;
        Ok(())
    }

    fn find_session(&self, token_id: &str) -> StoreResult<Option<Session>> {
        let conn = self.conn()?;
        let session = conn
            .query_row(
                "SELECT jti, user_id, expires_at, created_at FROM sessions WHERE jti = ?1",
                params![token_id],
                |row| {
                    Ok(Session {
                        token_id: row.get(0)?,
                        user_id: row.get(1)?,
                        expires_at: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(session)
    }

    fn delete_session(&self, token_id: &str) -> StoreResult<bool> {
        let conn = self.conn()?;
        let n = conn.execute("DELETE FROM sessions WHERE jti = ?1", params![token_id])?;
        Ok(n > 0)
    }

    fn delete_expired_sessions(&self, now_ms: i64) -> StoreResult<usize> {
        let conn = self.conn()?;
        let n = conn.execute(
            "DELETE FROM sessions WHERE expires_at <= ?1",
            params![now_ms],
        )?;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::User;

    fn store() -> Store {
        let store = Store::in_memory().unwrap();
        store
            .insert_user(&User {
                id: "u1".into(),
                username: "alice".into(),
                password_hash: "h".into(),
                created_at: 0,
            })
            .unwrap();
        store
    }

    fn session(jti: &str, expires_at: i64) -> Session {
        Session {
            token_id: jti.to_string(),
            user_id: "u1".to_string(),
            expires_at,
            created_at: 0,
        }
    }

    #[test]
    fn test_insert_find_delete() {
        let store = store();
        store.insert_session(&session("j1", 1_000)).unwrap();

        let found = store.find_session("j1").unwrap().unwrap();
        assert_eq!(found.user_id, "u1");
        assert_eq!(found.expires_at, 1_000);

        assert!(store.delete_session("j1").unwrap());
        assert!(store.find_session("j1").unwrap().is_none());
        assert!(!store.delete_session("j1").unwrap());
    }

    #[test]
    fn test_delete_expired_keeps_live_rows() {
        let store = store();
        store.insert_session(&session("old", 100)).unwrap();
        store.insert_session(&session("edge", 200)).unwrap();
        store.insert_session(&session("live", 300)).unwrap();

        assert_eq!(store.delete_expired_sessions(200).unwrap(), 2);
        assert!(store.find_session("old").unwrap().is_none());
        assert!(store.find_session("edge").unwrap().is_none());
        assert!(store.find_session("live").unwrap().is_some());
    }

    #[test]
    fn test_session_requires_existing_user() {
        let store = store();
        let mut s = session("j2", 1_000);
        s.user_id = "ghost".into();
        assert!(store.insert_session(&s).unwrap_err().is_constraint_violation());
    }
}
