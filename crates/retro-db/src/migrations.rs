use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            nickname    TEXT NOT NULL,
            login       TEXT NOT NULL UNIQUE,
            password    TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS boards (
            id                  TEXT PRIMARY KEY,
            title               TEXT NOT NULL,
            author_id           TEXT NOT NULL REFERENCES users(id),
            is_progress         INTEGER NOT NULL,
            created_at          TEXT NOT NULL,
            ended_at            TEXT,
            invite_edit_token   TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS board_editors (
            board_id    TEXT NOT NULL REFERENCES boards(id) ON DELETE CASCADE,
            user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            UNIQUE(board_id, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_board_editors_board
            ON board_editors(board_id);

        CREATE TABLE IF NOT EXISTS components (
            id                  TEXT PRIMARY KEY,
            title               TEXT NOT NULL,
            description         TEXT,
            type                TEXT NOT NULL,
            x                   REAL NOT NULL,
            y                   REAL NOT NULL,
            board_id            TEXT NOT NULL REFERENCES boards(id) ON DELETE CASCADE,
            author_id           TEXT NOT NULL REFERENCES users(id),
            is_anonymous_author INTEGER NOT NULL,
            is_anonymous_votes  INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_components_board
            ON components(board_id);

        CREATE TABLE IF NOT EXISTS votes (
            component_id    TEXT NOT NULL REFERENCES components(id) ON DELETE CASCADE,
            user_id         TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            UNIQUE(component_id, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_votes_component
            ON votes(component_id);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
