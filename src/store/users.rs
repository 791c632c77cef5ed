use super::{Store, StoreResult, User};
use rusqlite::{params, OptionalExtension, Row};

fn map_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        created_at: row.get(3)?,
    })
}

impl Store {
    /// Inserts a user. Fails with a constraint violation on a duplicate username.
    pub fn insert_user(&self, user: &User) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO users (id, username, password_hash, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![user.id, user.username, user.password_hash, user.created_at],
        )?;
        Ok(())
    }

    pub fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let conn = self.conn()?;
        let user = conn
            .query_row(
                "SELECT id, username, password_hash, created_at FROM users WHERE username = ?1",
                params![username],
                map_user,
            )
            .optional()?;
        Ok(user)
    }

    pub fn find_user_by_id(&self, id: &str) -> StoreResult<Option<User>> {
        let conn = self.conn()?;
        let user = conn
            .query_row(
                "SELECT id, username, password_hash, created_at FROM users WHERE id = ?1",
                params![id],
                map_user,
            )
            .optional()?;
        Ok(user)
    }
}
