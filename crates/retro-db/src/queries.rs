use crate::Database;
use crate::models::{BoardRow, ComponentRow, UserRow};
use anyhow::Result;
use rusqlite::Connection;

impl Database {
    // -- Users --

    pub fn create_user(&self, id: &str, nickname: &str, login: &str, password_hash: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, nickname, login, password) VALUES (?1, ?2, ?3, ?4)",
                (id, nickname, login, password_hash),
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_login(&self, login: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "login", login))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    pub fn user_exists(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row("SELECT 1 FROM users WHERE id = ?1", [id], |row| row.get(0))
                .optional()?;
            Ok(found.is_some())
        })
    }

    // -- Boards: materializer writes --

    /// Insert-or-overwrite by id. Replaying the same CREATE envelope lands on
    /// the same row.
    pub fn upsert_board(&self, board: &BoardRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO boards (id, title, author_id, is_progress, created_at, ended_at, invite_edit_token)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(id) DO UPDATE SET
                    title = excluded.title,
                    author_id = excluded.author_id,
                    is_progress = excluded.is_progress,
                    created_at = excluded.created_at,
                    ended_at = excluded.ended_at,
                    invite_edit_token = excluded.invite_edit_token",
                rusqlite::params![
                    board.id,
                    board.title,
                    board.author_id,
                    board.is_progress,
                    board.created_at,
                    board.ended_at,
                    board.invite_edit_token,
                ],
            )?;
            Ok(())
        })
    }

    /// Returns false when no row with that id exists; the caller decides what
    /// an update of a missing board means.
    pub fn update_board(
        &self,
        id: &str,
        title: &str,
        is_progress: bool,
        ended_at: Option<&str>,
        invite_edit_token: &str,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE boards SET title = ?2, is_progress = ?3, ended_at = ?4, invite_edit_token = ?5
                 WHERE id = ?1",
                rusqlite::params![id, title, is_progress, ended_at, invite_edit_token],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn delete_board(&self, id: &str) -> Result<usize> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM boards WHERE id = ?1", [id])?))
    }

    /// Replace the editor membership set from an id list. Ids that do not
    /// resolve to a user row are dropped; duplicates collapse to one row.
    pub fn replace_board_editors(&self, board_id: &str, editor_ids: &[String]) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM board_editors WHERE board_id = ?1", [board_id])?;
            for user_id in editor_ids {
                conn.execute(
                    "INSERT OR IGNORE INTO board_editors (board_id, user_id)
                     SELECT ?1, ?2 WHERE EXISTS (SELECT 1 FROM users WHERE id = ?2)",
                    (board_id, user_id),
                )?;
            }
            Ok(())
        })
    }

    // -- Boards: reads --

    pub fn get_board(&self, id: &str) -> Result<Option<BoardRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, title, author_id, is_progress, created_at, ended_at, invite_edit_token
                 FROM boards WHERE id = ?1",
            )?;
            let row = stmt.query_row([id], board_from_row).optional()?;
            Ok(row)
        })
    }

    pub fn get_boards_by_author(&self, author_id: &str) -> Result<Vec<BoardRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, title, author_id, is_progress, created_at, ended_at, invite_edit_token
                 FROM boards WHERE author_id = ?1 ORDER BY created_at DESC",
            )?;
            let rows = stmt
                .query_map([author_id], board_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_board_editor_ids(&self, board_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT user_id FROM board_editors WHERE board_id = ?1")?;
            let ids = stmt
                .query_map([board_id], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(ids)
        })
    }

    pub fn is_board_editor(&self, board_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM board_editors WHERE board_id = ?1 AND user_id = ?2",
                    (board_id, user_id),
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    // -- Components --

    pub fn upsert_component(&self, component: &ComponentRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO components
                    (id, title, description, type, x, y, board_id, author_id,
                     is_anonymous_author, is_anonymous_votes)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT(id) DO UPDATE SET
                    title = excluded.title,
                    description = excluded.description,
                    type = excluded.type,
                    x = excluded.x,
                    y = excluded.y,
                    board_id = excluded.board_id,
                    author_id = excluded.author_id,
                    is_anonymous_author = excluded.is_anonymous_author,
                    is_anonymous_votes = excluded.is_anonymous_votes",
                rusqlite::params![
                    component.id,
                    component.title,
                    component.description,
                    component.kind,
                    component.x,
                    component.y,
                    component.board_id,
                    component.author_id,
                    component.is_anonymous_author,
                    component.is_anonymous_votes,
                ],
            )?;
            Ok(())
        })
    }

    pub fn update_component(
        &self,
        id: &str,
        title: &str,
        description: Option<&str>,
        x: f32,
        y: f32,
        is_anonymous_author: bool,
        is_anonymous_votes: bool,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE components SET title = ?2, description = ?3, x = ?4, y = ?5,
                    is_anonymous_author = ?6, is_anonymous_votes = ?7
                 WHERE id = ?1",
                rusqlite::params![id, title, description, x, y, is_anonymous_author, is_anonymous_votes],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn delete_component(&self, id: &str) -> Result<usize> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM components WHERE id = ?1", [id])?))
    }

    pub fn component_exists(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row("SELECT 1 FROM components WHERE id = ?1", [id], |row| row.get(0))
                .optional()?;
            Ok(found.is_some())
        })
    }

    pub fn get_component(&self, id: &str) -> Result<Option<ComponentRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("{COMPONENT_SELECT} WHERE c.id = ?1"))?;
            let row = stmt.query_row([id], component_from_row).optional()?;
            Ok(row)
        })
    }

    pub fn get_components_by_board(&self, board_id: &str) -> Result<Vec<ComponentRow>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("{COMPONENT_SELECT} WHERE c.board_id = ?1"))?;
            let rows = stmt
                .query_map([board_id], component_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Votes --

    /// At most one vote per (component, user); a replayed insert is absorbed.
    /// Returns true when a new row was written.
    pub fn insert_vote(&self, component_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO votes (component_id, user_id) VALUES (?1, ?2)",
                (component_id, user_id),
            )?;
            Ok(inserted > 0)
        })
    }

    pub fn delete_vote(&self, component_id: &str, user_id: &str) -> Result<usize> {
        self.with_conn(|conn| {
            Ok(conn.execute(
                "DELETE FROM votes WHERE component_id = ?1 AND user_id = ?2",
                (component_id, user_id),
            )?)
        })
    }

    pub fn has_vote(&self, component_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM votes WHERE component_id = ?1 AND user_id = ?2",
                    (component_id, user_id),
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    pub fn count_votes(&self, component_id: &str) -> Result<i64> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM votes WHERE component_id = ?1",
                [component_id],
                |row| row.get(0),
            )?)
        })
    }
}

const COMPONENT_SELECT: &str =
    "SELECT c.id, c.title, c.description, c.type, c.x, c.y, c.board_id, c.author_id,
            c.is_anonymous_author, c.is_anonymous_votes,
            (SELECT COUNT(*) FROM votes v WHERE v.component_id = c.id) AS count_votes
     FROM components c";

fn board_from_row(row: &rusqlite::Row) -> rusqlite::Result<BoardRow> {
    Ok(BoardRow {
        id: row.get(0)?,
        title: row.get(1)?,
        author_id: row.get(2)?,
        is_progress: row.get(3)?,
        created_at: row.get(4)?,
        ended_at: row.get(5)?,
        invite_edit_token: row.get(6)?,
    })
}

fn component_from_row(row: &rusqlite::Row) -> rusqlite::Result<ComponentRow> {
    Ok(ComponentRow {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        kind: row.get(3)?,
        x: row.get(4)?,
        y: row.get(5)?,
        board_id: row.get(6)?,
        author_id: row.get(7)?,
        is_anonymous_author: row.get(8)?,
        is_anonymous_votes: row.get(9)?,
        count_votes: row.get(10)?,
    })
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id, nickname, login, password, created_at FROM users WHERE {column} = ?1"
    ))?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                nickname: row.get(1)?,
                login: row.get(2)?,
                password: row.get(3)?,
                created_at: row.get(4)?,
            })
        })
        .optional()?;

    Ok(row)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db_with_user(user_id: &str) -> Database {
        let db = Database::open_in_memory().unwrap();
        db.create_user(user_id, "alice", &format!("alice-{user_id}"), "hash")
            .unwrap();
        db
    }

    fn board(id: &str, author_id: &str) -> BoardRow {
        BoardRow {
            id: id.into(),
            title: "Sprint Retro".into(),
            author_id: author_id.into(),
            is_progress: true,
            created_at: "2026-08-01T10:00:00Z".into(),
            ended_at: None,
            invite_edit_token: "tok-1".into(),
        }
    }

    #[test]
    fn upsert_board_twice_keeps_one_row() {
        let db = db_with_user("u1");
        let mut b = board("b1", "u1");
        db.upsert_board(&b).unwrap();
        b.title = "Renamed".into();
        db.upsert_board(&b).unwrap();

        let boards = db.get_boards_by_author("u1").unwrap();
        assert_eq!(boards.len(), 1);
        assert_eq!(boards[0].title, "Renamed");
    }

    #[test]
    fn update_missing_board_reports_absent() {
        let db = db_with_user("u1");
        let changed = db.update_board("nope", "t", true, None, "tok").unwrap();
        assert!(!changed);
    }

    #[test]
    fn delete_absent_board_is_noop() {
        let db = db_with_user("u1");
        assert_eq!(db.delete_board("nope").unwrap(), 0);
    }

    #[test]
    fn editor_replacement_is_set_semantics() {
        let db = db_with_user("u1");
        db.create_user("u2", "bob", "bob", "hash").unwrap();
        db.upsert_board(&board("b1", "u1")).unwrap();

        // Duplicate id in the list, plus an id with no user row behind it.
        let ids = vec!["u2".to_string(), "u2".to_string(), "ghost".to_string()];
        db.replace_board_editors("b1", &ids).unwrap();

        assert_eq!(db.get_board_editor_ids("b1").unwrap(), vec!["u2".to_string()]);
        assert!(db.is_board_editor("b1", "u2").unwrap());
        assert!(!db.is_board_editor("b1", "ghost").unwrap());
    }

    #[test]
    fn vote_is_unique_per_component_and_user() {
        let db = db_with_user("u1");
        db.upsert_board(&board("b1", "u1")).unwrap();
        db.upsert_component(&component("c1", "b1", "u1")).unwrap();

        assert!(db.insert_vote("c1", "u1").unwrap());
        assert!(!db.insert_vote("c1", "u1").unwrap());
        assert_eq!(db.count_votes("c1").unwrap(), 1);

        assert_eq!(db.delete_vote("c1", "u1").unwrap(), 1);
        assert_eq!(db.delete_vote("c1", "u1").unwrap(), 0);
        assert_eq!(db.count_votes("c1").unwrap(), 0);
    }

    #[test]
    fn component_query_carries_vote_count() {
        let db = db_with_user("u1");
        db.create_user("u2", "bob", "bob", "hash").unwrap();
        db.upsert_board(&board("b1", "u1")).unwrap();
        db.upsert_component(&component("c1", "b1", "u1")).unwrap();
        db.insert_vote("c1", "u1").unwrap();
        db.insert_vote("c1", "u2").unwrap();

        let row = db.get_component("c1").unwrap().unwrap();
        assert_eq!(row.count_votes, 2);

        let all = db.get_components_by_board("b1").unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].count_votes, 2);
    }

    fn component(id: &str, board_id: &str, author_id: &str) -> ComponentRow {
        ComponentRow {
            id: id.into(),
            title: "went well".into(),
            description: None,
            kind: "NOTE".into(),
            x: 0.5,
            y: 0.5,
            board_id: board_id.into(),
            author_id: author_id.into(),
            is_anonymous_author: false,
            is_anonymous_votes: false,
            count_votes: 0,
        }
    }
}
