//! Actors and the Telegram identities, chat sightings, verifications and bans attached to them.

use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use crate::core::error::AppResult;
use crate::storage::accounts::{list_accounts_for_actor, MinecraftAccount};

pub type ActorId = i64;

/// A Telegram user as seen in an incoming update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TgUserInfo {
    pub id: u64,
    pub username: Option<String>,
    pub first_name: String,
    pub last_name: Option<String>,
}

impl TgUserInfo {
    /// "First Last (@username)"
    pub fn display_name(&self) -> String {
        let mut name = self.first_name.clone();
        if let Some(last) = self.last_name.as_deref().filter(|s| !s.is_empty()) {
            name.push(' ');
            name.push_str(last);
        }
        if let Some(username) = &self.username {
            name.push_str(&format!(" (@{})", username));
        }
        name
    }
}

/// Snapshot of an actor together with the facts its permissions are computed from
#[derive(Debug, Clone, PartialEq)]
pub struct Actor {
    pub id: ActorId,
    pub nickname: String,
    pub description: String,
    pub is_admin: bool,
    pub accepted: bool,
    pub custom_login_limit: Option<i64>,
    pub tg_users: Vec<TgUserInfo>,
    pub minecraft_accounts: Vec<MinecraftAccount>,
    /// Verified by at least one actor that is currently an admin
    pub verified_by_admin: bool,
    /// Seen in at least one approved group chat
    pub seen_in_approved_chat: bool,
    /// Has a ban that has not expired
    pub banned: bool,
}

impl Actor {
    pub fn tg_usernames(&self) -> impl Iterator<Item = &str> {
        self.tg_users.iter().filter_map(|u| u.username.as_deref())
    }

    pub fn display_name(&self) -> String {
        if !self.nickname.is_empty() {
            return self.nickname.clone();
        }
        match self.tg_users.first() {
            Some(user) => user.display_name(),
            None => format!("#{}", self.id),
        }
    }

    pub fn owns_login(&self, login: &str) -> bool {
        self.minecraft_accounts
            .iter()
            .any(|account| account.login.eq_ignore_ascii_case(login))
    }
}

/// Insert or refresh a Telegram user, creating a fresh actor for users seen for the first time.
///
/// Runs in an IMMEDIATE transaction so two first-time updates from the same user
/// never create two actors.
pub fn upsert_tg_user(conn: &mut Connection, user: &TgUserInfo) -> AppResult<ActorId> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let existing: Option<ActorId> = tx
        .query_row(
            "SELECT actor_id FROM tg_users WHERE id = ?1",
            params![user.id as i64],
            |row| row.get(0),
        )
        .optional()?;

    let actor_id = match existing {
        Some(actor_id) => {
            tx.execute(
                "UPDATE tg_users
                 SET username = ?2, first_name = ?3, last_name = ?4, updated_at = CURRENT_TIMESTAMP
                 WHERE id = ?1",
                params![user.id as i64, user.username, user.first_name, user.last_name],
            )?;
            actor_id
        }
        None => {
            tx.execute(
                "INSERT INTO actors (description) VALUES (?1)",
                params![format!("created from telegram user {}", user.display_name())],
            )?;
            let actor_id = tx.last_insert_rowid();
            tx.execute(
                "INSERT INTO tg_users (id, actor_id, username, first_name, last_name)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![user.id as i64, actor_id, user.username, user.first_name, user.last_name],
            )?;
            log::info!("Created actor {} for telegram user {}", actor_id, user.id);
            actor_id
        }
    };

    tx.commit()?;
    Ok(actor_id)
}

pub fn get_actor(conn: &Connection, actor_id: ActorId) -> AppResult<Option<Actor>> {
    let actor = conn
        .query_row(
            "SELECT a.id, a.nickname, a.description, a.is_admin, a.accepted, a.custom_login_limit,
                    EXISTS(SELECT 1 FROM actor_verifications v
                           JOIN actors adm ON adm.id = v.admin_id
                           WHERE v.actor_id = a.id AND adm.is_admin = 1),
                    EXISTS(SELECT 1 FROM actor_seen_in_chats s
                           JOIN tg_chats c ON c.id = s.chat_id
                           WHERE s.actor_id = a.id AND c.approved = 1),
                    EXISTS(SELECT 1 FROM bans b
                           WHERE b.actor_id = a.id
                             AND (b.expires_at IS NULL OR b.expires_at > CURRENT_TIMESTAMP))
             FROM actors a
             WHERE a.id = ?1",
            params![actor_id],
            |row| {
                Ok(Actor {
                    id: row.get(0)?,
                    nickname: row.get(1)?,
                    description: row.get(2)?,
                    is_admin: row.get(3)?,
                    accepted: row.get(4)?,
                    custom_login_limit: row.get(5)?,
                    tg_users: Vec::new(),
                    minecraft_accounts: Vec::new(),
                    verified_by_admin: row.get(6)?,
                    seen_in_approved_chat: row.get(7)?,
                    banned: row.get(8)?,
                })
            },
        )
        .optional()?;

    let Some(mut actor) = actor else {
        return Ok(None);
    };
    actor.tg_users = list_tg_users(conn, actor_id)?;
    actor.minecraft_accounts = list_accounts_for_actor(conn, actor_id)?;
    Ok(Some(actor))
}

fn list_tg_users(conn: &Connection, actor_id: ActorId) -> AppResult<Vec<TgUserInfo>> {
    let mut stmt = conn.prepare(
        "SELECT id, username, first_name, last_name FROM tg_users
         WHERE actor_id = ?1 ORDER BY created_at, id",
    )?;
    let rows = stmt.query_map(params![actor_id], |row| {
        Ok(TgUserInfo {
            id: row.get::<_, i64>(0)? as u64,
            username: row.get(1)?,
            first_name: row.get(2)?,
            last_name: row.get(3)?,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub fn find_actor_id_by_tg_user(conn: &Connection, tg_user_id: u64) -> AppResult<Option<ActorId>> {
    Ok(conn
        .query_row(
            "SELECT actor_id FROM tg_users WHERE id = ?1",
            params![tg_user_id as i64],
            |row| row.get(0),
        )
        .optional()?)
}

/// Usernames are compared case-insensitively, the leading `@` is not stored
pub fn find_actor_id_by_tg_username(conn: &Connection, username: &str) -> AppResult<Option<ActorId>> {
    Ok(conn
        .query_row(
            "SELECT actor_id FROM tg_users WHERE username = ?1 COLLATE NOCASE
             ORDER BY updated_at DESC LIMIT 1",
            params![username],
            |row| row.get(0),
        )
        .optional()?)
}

pub fn list_actor_ids(conn: &Connection) -> AppResult<Vec<ActorId>> {
    let mut stmt = conn.prepare("SELECT id FROM actors ORDER BY id")?;
    let rows = stmt.query_map([], |row| row.get(0))?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

pub fn set_accepted(conn: &Connection, actor_id: ActorId, accepted: bool) -> AppResult<()> {
    conn.execute(
        "UPDATE actors SET accepted = ?2, updated_at = CURRENT_TIMESTAMP WHERE id = ?1",
        params![actor_id, accepted],
    )?;
    Ok(())
}

pub fn set_admin(conn: &Connection, actor_id: ActorId, is_admin: bool) -> AppResult<()> {
    conn.execute(
        "UPDATE actors SET is_admin = ?2, updated_at = CURRENT_TIMESTAMP WHERE id = ?1",
        params![actor_id, is_admin],
    )?;
    Ok(())
}

pub fn set_custom_login_limit(conn: &Connection, actor_id: ActorId, limit: Option<i64>) -> AppResult<()> {
    conn.execute(
        "UPDATE actors SET custom_login_limit = ?2, updated_at = CURRENT_TIMESTAMP WHERE id = ?1",
        params![actor_id, limit],
    )?;
    Ok(())
}

/// Record that the actor posted in a group chat, registering the chat if it is new
pub fn mark_seen_in_chat(conn: &Connection, actor_id: ActorId, chat_id: i64) -> AppResult<()> {
    conn.execute("INSERT OR IGNORE INTO tg_chats (id) VALUES (?1)", params![chat_id])?;
    conn.execute(
        "INSERT INTO actor_seen_in_chats (actor_id, chat_id) VALUES (?1, ?2)
         ON CONFLICT(actor_id, chat_id) DO UPDATE SET last_seen_at = CURRENT_TIMESTAMP",
        params![actor_id, chat_id],
    )?;
    Ok(())
}

pub fn add_verification(conn: &Connection, actor_id: ActorId, admin_id: ActorId) -> AppResult<()> {
    conn.execute(
        "INSERT OR IGNORE INTO actor_verifications (actor_id, admin_id) VALUES (?1, ?2)",
        params![actor_id, admin_id],
    )?;
    Ok(())
}

pub fn remove_verifications(conn: &Connection, actor_id: ActorId) -> AppResult<usize> {
    Ok(conn.execute("DELETE FROM actor_verifications WHERE actor_id = ?1", params![actor_id])?)
}

/// `expires_at` uses SQLite's `YYYY-MM-DD HH:MM:SS` format; `None` bans permanently
pub fn add_ban(
    conn: &Connection,
    actor_id: ActorId,
    issued_by: ActorId,
    reason: &str,
    expires_at: Option<&str>,
) -> AppResult<()> {
    conn.execute(
        "INSERT INTO bans (actor_id, issued_by, reason, expires_at) VALUES (?1, ?2, ?3, ?4)",
        params![actor_id, issued_by, reason, expires_at],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::chats::approve_chat;
    use crate::storage::db::{create_pool, get_connection, DbPool};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn test_pool() -> (TempDir, DbPool) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.sqlite");
        let pool = create_pool(path.to_str().unwrap()).unwrap();
        (dir, pool)
    }

    fn tg_user(id: u64, username: Option<&str>) -> TgUserInfo {
        TgUserInfo {
            id,
            username: username.map(str::to_string),
            first_name: "Alex".to_string(),
            last_name: None,
        }
    }

    #[test]
    fn upsert_creates_actor_once() {
        let (_dir, pool) = test_pool();
        let mut conn = get_connection(&pool).unwrap();

        let first = upsert_tg_user(&mut conn, &tg_user(42, Some("alex"))).unwrap();
        let second = upsert_tg_user(&mut conn, &tg_user(42, Some("alex_renamed"))).unwrap();
        assert_eq!(first, second);

        let actor = get_actor(&conn, first).unwrap().unwrap();
        assert_eq!(actor.tg_users.len(), 1);
        assert_eq!(actor.tg_users[0].username.as_deref(), Some("alex_renamed"));
        assert_eq!(list_actor_ids(&conn).unwrap(), vec![first]);
    }

    #[test]
    fn username_lookup_is_case_insensitive() {
        let (_dir, pool) = test_pool();
        let mut conn = get_connection(&pool).unwrap();
        let id = upsert_tg_user(&mut conn, &tg_user(7, Some("Notch"))).unwrap();

        assert_eq!(find_actor_id_by_tg_username(&conn, "notch").unwrap(), Some(id));
        assert_eq!(find_actor_id_by_tg_username(&conn, "jeb").unwrap(), None);
        assert_eq!(find_actor_id_by_tg_user(&conn, 7).unwrap(), Some(id));
    }

    #[test]
    fn computed_facts_follow_related_rows() {
        let (_dir, pool) = test_pool();
        let mut conn = get_connection(&pool).unwrap();
        let admin = upsert_tg_user(&mut conn, &tg_user(1, Some("admin"))).unwrap();
        let member = upsert_tg_user(&mut conn, &tg_user(2, Some("member"))).unwrap();

        let actor = get_actor(&conn, member).unwrap().unwrap();
        assert!(!actor.verified_by_admin);
        assert!(!actor.seen_in_approved_chat);
        assert!(!actor.banned);

        // A verification only counts while the verifier is an admin
        add_verification(&conn, member, admin).unwrap();
        assert!(!get_actor(&conn, member).unwrap().unwrap().verified_by_admin);
        set_admin(&conn, admin, true).unwrap();
        assert!(get_actor(&conn, member).unwrap().unwrap().verified_by_admin);

        mark_seen_in_chat(&conn, member, -100).unwrap();
        assert!(!get_actor(&conn, member).unwrap().unwrap().seen_in_approved_chat);
        approve_chat(&conn, -100, admin).unwrap();
        assert!(get_actor(&conn, member).unwrap().unwrap().seen_in_approved_chat);

        add_ban(&conn, member, admin, "expired", Some("2000-01-01 00:00:00")).unwrap();
        assert!(!get_actor(&conn, member).unwrap().unwrap().banned);
        add_ban(&conn, member, admin, "griefing", None).unwrap();
        assert!(get_actor(&conn, member).unwrap().unwrap().banned);
    }

    #[test]
    fn missing_actor_is_none() {
        let (_dir, pool) = test_pool();
        let conn = get_connection(&pool).unwrap();
        assert_eq!(get_actor(&conn, 999).unwrap(), None);
    }

    #[test]
    fn display_name_prefers_nickname() {
        let user = TgUserInfo {
            id: 1,
            username: Some("steve".to_string()),
            first_name: "Steve".to_string(),
            last_name: Some("Miner".to_string()),
        };
        assert_eq!(user.display_name(), "Steve Miner (@steve)");
    }
}
