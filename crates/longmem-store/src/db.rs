use rusqlite::{Connection, Result};

/// Initialise the `memories` table. Safe to call on every startup
/// (idempotent), matching the schema of §6 exactly.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS memories (
            id               TEXT PRIMARY KEY,
            timeStamp        TEXT NOT NULL,
            floatTimeStamp   REAL NOT NULL,
            weekday          TEXT,
            category         TEXT,
            subcategory      TEXT,
            memoryClass      TEXT,
            memory           TEXT NOT NULL,
            originalMemory   TEXT,
            compressedMemory TEXT,
            topicId          INTEGER,
            topicSummary     TEXT,
            speakerId        TEXT,
            speakerName      TEXT,
            hitTime          INTEGER DEFAULT 0,
            updateQueue      TEXT,
            embedding        BLOB,
            createdAt        TEXT DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_memories_float_ts
            ON memories(floatTimeStamp);
        CREATE INDEX IF NOT EXISTS idx_memories_speaker
            ON memories(speakerId);
        CREATE INDEX IF NOT EXISTS idx_memories_category
            ON memories(category);",
    )
}
