//! SQL for every persisted operation, keyed by role.

/// Schema (`init` role).
pub const INIT: &str = r#"
CREATE TABLE IF NOT EXISTS session (
    client TEXT PRIMARY KEY NOT NULL,
    expire_on INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS item (
    client TEXT NOT NULL,
    key TEXT NOT NULL,
    string_value TEXT,
    json_value TEXT,
    blob_value BLOB,
    PRIMARY KEY (client, key),
    CHECK (
        (string_value IS NOT NULL) + (json_value IS NOT NULL) + (blob_value IS NOT NULL) = 1
    )
);
"#;

/// `count-items`, also used as the startup schema probe.
pub const COUNT_ITEMS: &str = "SELECT COUNT(key) FROM item";

pub const QUERY_SESSION: &str = "SELECT client, expire_on FROM session WHERE client = ?";

pub const PUT_SESSION: &str = "INSERT INTO session (client, expire_on) VALUES (?, ?)";

pub const PURGE_SESSION: &str = "DELETE FROM session WHERE client = ?";

pub const GET_ITEM: &str =
    "SELECT string_value, json_value, blob_value FROM item WHERE client = ? AND key = ?";

pub const POST_ITEM: &str = "INSERT INTO item (client, key, string_value, json_value, blob_value) \
     VALUES (?, ?, ?, ?, ?)";

pub const PUT_ITEM: &str = "INSERT INTO item (client, key, string_value, json_value, blob_value) \
     VALUES (?, ?, ?, ?, ?) \
     ON CONFLICT (client, key) DO UPDATE SET \
     string_value = excluded.string_value, \
     json_value = excluded.json_value, \
     blob_value = excluded.blob_value";

pub const DELETE_ITEM: &str = "DELETE FROM item WHERE client = ? AND key = ?";
