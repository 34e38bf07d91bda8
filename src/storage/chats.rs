use rusqlite::{params, Connection, OptionalExtension};

use crate::core::error::AppResult;
use crate::storage::actors::ActorId;

/// Mark a group chat as approved; members seen there become accepted
pub fn approve_chat(conn: &Connection, chat_id: i64, approved_by: ActorId) -> AppResult<()> {
    conn.execute(
        "INSERT INTO tg_chats (id, approved, approved_by) VALUES (?1, 1, ?2)
         ON CONFLICT(id) DO UPDATE SET
             approved = 1,
             approved_by = excluded.approved_by,
             updated_at = CURRENT_TIMESTAMP",
        params![chat_id, approved_by],
    )?;
    Ok(())
}

pub fn is_chat_approved(conn: &Connection, chat_id: i64) -> AppResult<bool> {
    let approved: Option<bool> = conn
        .query_row("SELECT approved FROM tg_chats WHERE id = ?1", params![chat_id], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(approved.unwrap_or(false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::actors::{upsert_tg_user, TgUserInfo};
    use crate::storage::db::{create_pool, get_connection};

    #[test]
    fn approve_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_pool(dir.path().join("auth.sqlite").to_str().unwrap()).unwrap();
        let mut conn = get_connection(&pool).unwrap();
        let admin = upsert_tg_user(
            &mut conn,
            &TgUserInfo {
                id: 1,
                username: Some("admin".to_string()),
                first_name: "Admin".to_string(),
                last_name: None,
            },
        )
        .unwrap();

        assert!(!is_chat_approved(&conn, -42).unwrap());
        approve_chat(&conn, -42, admin).unwrap();
        approve_chat(&conn, -42, admin).unwrap();
        assert!(is_chat_approved(&conn, -42).unwrap());
    }
}
