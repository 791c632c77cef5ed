use super::{Board, BoardAccess, MemberRecord, Role, Store, StoreError, StoreResult};
use rusqlite::{params, OptionalExtension};

fn parse_role(raw: String) -> StoreResult<Role> {
    Role::from_db(&raw).ok_or_else(|| StoreError::Corrupt(format!("unknown role '{}'", raw)))
}

impl Store {
    /// Inserts a board together with the owner's OWNER membership, atomically.
    pub fn insert_board(&self, board: &Board) -> StoreResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO boards (id, name, owner_id, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![board.id, board.name, board.owner_id, board.created_at],
        )?;
        tx.execute(
            "INSERT OR IGNORE INTO board_members (board_id, user_id, role, created_at)
             VALUES (?1, ?2, 'OWNER', ?3)",
            params![board.id, board.owner_id, board.created_at],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn find_board(&self, board_id: &str) -> StoreResult<Option<Board>> {
        let conn = self.conn()?;
        let board = conn
            .query_row(
                "SELECT id, name, owner_id, created_at FROM boards WHERE id = ?1",
                params![board_id],
                |row| {
                    Ok(Board {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        owner_id: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(board)
    }

    /// Boards the user owns or belongs to, oldest first.
    pub fn list_boards_for_user(&self, user_id: &str) -> StoreResult<Vec<BoardAccess>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT b.id, b.name, b.owner_id, b.created_at,
                    CASE WHEN b.owner_id = ?1 THEN 'OWNER' ELSE m.role END AS role
             FROM boards b
             LEFT JOIN board_members m ON m.board_id = b.id AND m.user_id = ?1
             WHERE b.owner_id = ?1 OR m.user_id IS NOT NULL
             ORDER BY b.created_at ASC, b.id ASC",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok((
                Board {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    owner_id: row.get(2)?,
                    created_at: row.get(3)?,
                },
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (board, role) = row?;
            out.push(BoardAccess {
                board,
                role: parse_role(role)?,
            });
        }
        Ok(out)
    }

    /// Inserts a membership. Fails with a constraint violation if it already exists.
    pub fn insert_member(
        &self,
        board_id: &str,
        user_id: &str,
        role: Role,
        created_at: i64,
    ) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO board_members (board_id, user_id, role, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![board_id, user_id, role.as_str(), created_at],
        )?;
        Ok(())
    }

    pub fn member_role(&self, board_id: &str, user_id: &str) -> StoreResult<Option<Role>> {
        let conn = self.conn()?;
        let role: Option<String> = conn
            .query_row(
                "SELECT role FROM board_members WHERE board_id = ?1 AND user_id = ?2",
                params![board_id, user_id],
                |row| row.get(0),
            )
            .optional()?;
        role.map(parse_role).transpose()
    }

    pub fn list_members(&self, board_id: &str) -> StoreResult<Vec<MemberRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT m.user_id, u.username, m.role, m.created_at
             FROM board_members m JOIN users u ON u.id = m.user_id
             WHERE m.board_id = ?1
             ORDER BY m.created_at ASC, u.username ASC",
        )?;
        let rows = stmt.query_map(params![board_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (user_id, username, role, created_at) = row?;
            out.push(MemberRecord {
                user_id,
                username,
                role: parse_role(role)?,
                created_at,
            });
        }
        Ok(out)
    }
}
