//! Minecraft accounts registered through the bot.

use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};

use crate::core::error::AppResult;
use crate::storage::actors::ActorId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinecraftAccount {
    pub login: String,
    /// `None` once the owner removed the account
    pub actor_id: Option<ActorId>,
    /// Licensed (Mojang) account as opposed to an offline one
    pub is_online: bool,
    pub player_id: Option<String>,
}

/// Outcome of an atomic account assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOutcome {
    Assigned,
    /// The login belongs to another actor
    Taken { owner: ActorId },
    /// The actor already holds `current` accounts and the limit does not allow more
    LimitReached { current: usize },
}

fn account_from_row(row: &Row<'_>) -> rusqlite::Result<MinecraftAccount> {
    Ok(MinecraftAccount {
        login: row.get(0)?,
        actor_id: row.get(1)?,
        is_online: row.get(2)?,
        player_id: row.get(3)?,
    })
}

/// Look up an account by login (case-insensitive)
pub fn get_account(conn: &Connection, login: &str) -> AppResult<Option<MinecraftAccount>> {
    Ok(conn
        .query_row(
            "SELECT login, actor_id, is_online, player_id FROM minecraft_accounts WHERE login = ?1",
            params![login],
            account_from_row,
        )
        .optional()?)
}

pub fn list_accounts_for_actor(conn: &Connection, actor_id: ActorId) -> AppResult<Vec<MinecraftAccount>> {
    let mut stmt = conn.prepare(
        "SELECT login, actor_id, is_online, player_id FROM minecraft_accounts
         WHERE actor_id = ?1 ORDER BY created_at, login",
    )?;
    let rows = stmt.query_map(params![actor_id], account_from_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Assign `login` to `actor_id`, re-using a revoked row when there is one.
///
/// The ownership and limit checks run in the same IMMEDIATE transaction as the
/// write. `limit` of `None` means unlimited. Re-assigning a login the actor
/// already owns only refreshes its online flag and player id.
pub fn assign_account(
    conn: &mut Connection,
    actor_id: ActorId,
    login: &str,
    is_online: bool,
    player_id: &str,
    limit: Option<usize>,
) -> AppResult<AssignOutcome> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let owner: Option<Option<ActorId>> = tx
        .query_row(
            "SELECT actor_id FROM minecraft_accounts WHERE login = ?1",
            params![login],
            |row| row.get(0),
        )
        .optional()?;

    match owner.flatten() {
        Some(owner) if owner != actor_id => return Ok(AssignOutcome::Taken { owner }),
        Some(_) => {}
        None => {
            let current: i64 = tx.query_row(
                "SELECT COUNT(*) FROM minecraft_accounts WHERE actor_id = ?1",
                params![actor_id],
                |row| row.get(0),
            )?;
            let current = current as usize;
            if limit.is_some_and(|limit| current >= limit) {
                return Ok(AssignOutcome::LimitReached { current });
            }
        }
    }

    tx.execute(
        "INSERT INTO minecraft_accounts (login, actor_id, is_online, player_id) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(login) DO UPDATE SET
             actor_id = excluded.actor_id,
             is_online = excluded.is_online,
             player_id = excluded.player_id,
             updated_at = CURRENT_TIMESTAMP",
        params![login, actor_id, is_online, player_id],
    )?;
    tx.commit()?;

    Ok(AssignOutcome::Assigned)
}

/// Detach `login` from `actor_id`; returns false when the actor does not own it
pub fn revoke_account(conn: &Connection, actor_id: ActorId, login: &str) -> AppResult<bool> {
    let changed = conn.execute(
        "UPDATE minecraft_accounts SET actor_id = NULL, updated_at = CURRENT_TIMESTAMP
         WHERE login = ?1 AND actor_id = ?2",
        params![login, actor_id],
    )?;
    Ok(changed > 0)
}
