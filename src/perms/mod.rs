//! Permission rules for actors: acceptance, admin rights, Minecraft login ownership
//!
//! The engine owns the database pool and is the only place where permission
//! facts are turned into decisions. All methods are synchronous and hold a
//! pooled connection only for their own duration.

mod password;

pub use password::{generate_password, is_valid_password};

use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::core::config;
use crate::core::error::{AppError, AppResult};
use crate::minecraft::MinecraftLogin;
use crate::storage::accounts::{self, AssignOutcome, MinecraftAccount};
use crate::storage::actors::{self, Actor, ActorId, TgUserInfo};
use crate::storage::chats;
use crate::storage::db::{get_connection, DbConnection, DbPool};

/// Expected refusals are separate variants so handlers can answer them; storage
/// failures are carried in `Storage`.
#[derive(Error, Debug)]
pub enum PermsError {
    #[error("actor {0} is not accepted")]
    NotAccepted(ActorId),

    #[error("exceeded max minecraft logins, current: {current}, max: {max}")]
    ExceededMaxLogins { current: usize, max: usize },

    #[error("actor {actor_id} does not own login {login}")]
    NotYourLogin { actor_id: ActorId, login: String },

    #[error("login {0} is already taken")]
    LoginTaken(String),

    #[error("admin permission denied: {0}")]
    AdminPermissionDenied(String),

    #[error("invalid password format")]
    InvalidPasswordFormat,

    #[error(transparent)]
    Storage(#[from] AppError),
}

#[derive(Debug, Clone)]
pub struct PermsConfig {
    /// Negative means unlimited
    pub default_login_limit: i64,
    /// Telegram usernames (without `@`) that make their actor an admin
    pub admin_tags: Vec<String>,
}

impl PermsConfig {
    pub fn from_env() -> Self {
        Self {
            default_login_limit: *config::perms::DEFAULT_LOGIN_LIMIT,
            admin_tags: config::perms::ADMIN_TAGS.clone(),
        }
    }
}

pub struct PermsEngine {
    pool: Arc<DbPool>,
    config: PermsConfig,
}

impl PermsEngine {
    pub fn new(pool: Arc<DbPool>, config: PermsConfig) -> Self {
        Self { pool, config }
    }

    fn conn(&self) -> AppResult<DbConnection> {
        get_connection(&self.pool)
    }

    fn load(conn: &DbConnection, actor_id: ActorId) -> AppResult<Actor> {
        actors::get_actor(conn, actor_id)?.ok_or_else(|| AppError::NotFound(format!("actor {}", actor_id)))
    }

    /// Actor behind a Telegram user, created on first sight
    pub fn resolve_or_create(&self, user: &TgUserInfo) -> AppResult<Actor> {
        let mut conn = self.conn()?;
        let actor_id = actors::upsert_tg_user(&mut conn, user)?;
        Self::load(&conn, actor_id)
    }

    pub fn get_actor(&self, actor_id: ActorId) -> AppResult<Actor> {
        Self::load(&self.conn()?, actor_id)
    }

    pub fn find_actor_by_tg_user(&self, tg_user_id: u64) -> AppResult<Option<Actor>> {
        let conn = self.conn()?;
        match actors::find_actor_id_by_tg_user(&conn, tg_user_id)? {
            Some(id) => actors::get_actor(&conn, id),
            None => Ok(None),
        }
    }

    pub fn find_actor_by_tg_username(&self, username: &str) -> AppResult<Option<Actor>> {
        let conn = self.conn()?;
        match actors::find_actor_id_by_tg_username(&conn, username.trim_start_matches('@'))? {
            Some(id) => actors::get_actor(&conn, id),
            None => Ok(None),
        }
    }

    pub fn list_actors(&self) -> AppResult<Vec<Actor>> {
        let conn = self.conn()?;
        actors::list_actor_ids(&conn)?
            .into_iter()
            .map(|id| Self::load(&conn, id))
            .collect()
    }

    pub fn find_account(&self, login: &MinecraftLogin) -> AppResult<Option<MinecraftAccount>> {
        let conn = self.conn()?;
        accounts::get_account(&conn, login.as_str())
    }

    pub fn mark_seen(&self, actor_id: ActorId, chat_id: i64) -> AppResult<()> {
        let conn = self.conn()?;
        actors::mark_seen_in_chat(&conn, actor_id, chat_id)
    }

    pub fn is_admin_tag(&self, actor: &Actor) -> bool {
        actor
            .tg_usernames()
            .any(|username| self.config.admin_tags.iter().any(|tag| tag.eq_ignore_ascii_case(username)))
    }

    fn compute_accepted(is_admin: bool, actor: &Actor) -> bool {
        !actor.banned && (is_admin || actor.verified_by_admin || actor.seen_in_approved_chat)
    }

    /// Recompute the stored admin and accepted flags from the current facts.
    ///
    /// Acceptance is only taken away when `allow_revoke` is set; admin rights
    /// always follow the configured admin tags. Returns the refreshed actor.
    pub fn refresh_computed_flags(&self, actor_id: ActorId, allow_revoke: bool) -> AppResult<Actor> {
        let conn = self.conn()?;
        let actor = Self::load(&conn, actor_id)?;

        let is_admin = self.is_admin_tag(&actor);
        if is_admin != actor.is_admin {
            log::info!("Actor {} admin flag {} -> {}", actor_id, actor.is_admin, is_admin);
            actors::set_admin(&conn, actor_id, is_admin)?;
        }

        let accepted = Self::compute_accepted(is_admin, &actor);
        if accepted != actor.accepted && (accepted || allow_revoke) {
            log::info!("Actor {} accepted flag {} -> {}", actor_id, actor.accepted, accepted);
            actors::set_accepted(&conn, actor_id, accepted)?;
        }

        if is_admin != actor.is_admin || accepted != actor.accepted {
            Self::load(&conn, actor_id)
        } else {
            Ok(actor)
        }
    }

    /// `None` means unlimited
    pub fn login_limit(&self, actor: &Actor) -> Option<usize> {
        let limit = actor.custom_login_limit.unwrap_or(self.config.default_login_limit);
        usize::try_from(limit).ok()
    }

    pub fn check_add_login(&self, actor: &Actor) -> Result<(), PermsError> {
        if !actor.accepted {
            return Err(PermsError::NotAccepted(actor.id));
        }
        match self.login_limit(actor) {
            Some(max) if actor.minecraft_accounts.len() >= max => Err(PermsError::ExceededMaxLogins {
                current: actor.minecraft_accounts.len(),
                max,
            }),
            _ => Ok(()),
        }
    }

    /// Atomically bind `login` to the actor after the acceptance and limit checks
    pub fn assign_login(
        &self,
        actor: &Actor,
        login: &MinecraftLogin,
        is_online: bool,
        player_id: Uuid,
    ) -> Result<(), PermsError> {
        if !actor.accepted {
            return Err(PermsError::NotAccepted(actor.id));
        }
        let limit = self.login_limit(actor);
        let mut conn = self.conn()?;
        let outcome = accounts::assign_account(
            &mut conn,
            actor.id,
            login.as_str(),
            is_online,
            &player_id.to_string(),
            limit,
        )?;

        match outcome {
            AssignOutcome::Assigned => {
                log::info!("Actor {} registered {} (online: {})", actor.id, login, is_online);
                Ok(())
            }
            AssignOutcome::Taken { .. } => Err(PermsError::LoginTaken(login.to_string())),
            AssignOutcome::LimitReached { current } => Err(PermsError::ExceededMaxLogins {
                current,
                max: limit.unwrap_or(current),
            }),
        }
    }

    pub fn revoke_login(&self, actor_id: ActorId, login: &MinecraftLogin) -> Result<(), PermsError> {
        let conn = self.conn()?;
        if accounts::revoke_account(&conn, actor_id, login.as_str())? {
            log::info!("Actor {} removed {}", actor_id, login);
            Ok(())
        } else {
            Err(PermsError::NotYourLogin {
                actor_id,
                login: login.to_string(),
            })
        }
    }

    pub fn check_set_password(&self, actor: &Actor, login: &MinecraftLogin, password: &str) -> Result<(), PermsError> {
        if !actor.owns_login(login.as_str()) {
            return Err(PermsError::NotYourLogin {
                actor_id: actor.id,
                login: login.to_string(),
            });
        }
        if !is_valid_password(password) {
            return Err(PermsError::InvalidPasswordFormat);
        }
        Ok(())
    }

    fn require_admin(requestor: &Actor, action: &str) -> Result<(), PermsError> {
        if requestor.is_admin {
            Ok(())
        } else {
            Err(PermsError::AdminPermissionDenied(format!(
                "actor {} is not allowed to {}",
                requestor.id, action
            )))
        }
    }

    pub fn approve_chat(&self, requestor: &Actor, chat_id: i64) -> Result<(), PermsError> {
        Self::require_admin(requestor, "approve chats")?;
        let conn = self.conn()?;
        chats::approve_chat(&conn, chat_id, requestor.id)?;
        log::info!("Chat {} approved by actor {}", chat_id, requestor.id);
        Ok(())
    }

    pub fn admin_verify(&self, requestor: &Actor, target_id: ActorId) -> Result<Actor, PermsError> {
        Self::require_admin(requestor, "verify users")?;
        {
            let conn = self.conn()?;
            actors::add_verification(&conn, target_id, requestor.id)?;
        }
        log::info!("Actor {} verified by admin {}", target_id, requestor.id);
        Ok(self.refresh_computed_flags(target_id, false)?)
    }

    pub fn admin_reject(&self, requestor: &Actor, target_id: ActorId) -> Result<Actor, PermsError> {
        Self::require_admin(requestor, "reject users")?;
        let removed = {
            let conn = self.conn()?;
            actors::remove_verifications(&conn, target_id)?
        };
        log::info!(
            "Actor {} rejected by admin {} ({} verifications removed)",
            target_id,
            requestor.id,
            removed
        );
        Ok(self.refresh_computed_flags(target_id, true)?)
    }

    pub fn admin_ban(&self, requestor: &Actor, target_id: ActorId, reason: &str) -> Result<Actor, PermsError> {
        Self::require_admin(requestor, "ban users")?;
        let target = self.get_actor(target_id)?;
        if target.is_admin {
            return Err(PermsError::AdminPermissionDenied(format!("actor {} is an admin", target_id)));
        }
        {
            let conn = self.conn()?;
            actors::add_ban(&conn, target_id, requestor.id, reason, None)?;
        }
        log::warn!("Actor {} banned by admin {}: {}", target_id, requestor.id, reason);
        Ok(self.refresh_computed_flags(target_id, true)?)
    }

    pub fn generate_password(&self) -> String {
        generate_password(config::perms::GENERATED_PASSWORD_LEN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::db::create_pool;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn engine(default_login_limit: i64) -> (TempDir, PermsEngine) {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_pool(dir.path().join("auth.sqlite").to_str().unwrap()).unwrap();
        let config = PermsConfig {
            default_login_limit,
            admin_tags: vec!["boss".to_string()],
        };
        (dir, PermsEngine::new(Arc::new(pool), config))
    }

    fn user(id: u64, username: &str) -> TgUserInfo {
        TgUserInfo {
            id,
            username: Some(username.to_string()),
            first_name: username.to_string(),
            last_name: None,
        }
    }

    fn login(name: &str) -> MinecraftLogin {
        MinecraftLogin::parse(name).unwrap()
    }

    #[test]
    fn admin_tag_makes_admin_and_accepted() {
        let (_dir, perms) = engine(2);
        let actor = perms.resolve_or_create(&user(1, "Boss")).unwrap();
        assert!(!actor.is_admin);

        let actor = perms.refresh_computed_flags(actor.id, false).unwrap();
        assert!(actor.is_admin);
        assert!(actor.accepted);
    }

    #[test]
    fn newcomer_is_not_accepted() {
        let (_dir, perms) = engine(2);
        let actor = perms.resolve_or_create(&user(2, "newbie")).unwrap();
        let actor = perms.refresh_computed_flags(actor.id, false).unwrap();
        assert!(!actor.accepted);
        assert!(matches!(perms.check_add_login(&actor), Err(PermsError::NotAccepted(_))));
    }

    #[test]
    fn seen_in_approved_chat_accepts() {
        let (_dir, perms) = engine(2);
        let admin = perms.resolve_or_create(&user(1, "boss")).unwrap();
        let admin = perms.refresh_computed_flags(admin.id, false).unwrap();
        let member = perms.resolve_or_create(&user(2, "member")).unwrap();

        perms.mark_seen(member.id, -500).unwrap();
        assert!(!perms.refresh_computed_flags(member.id, false).unwrap().accepted);

        perms.approve_chat(&admin, -500).unwrap();
        assert!(perms.refresh_computed_flags(member.id, false).unwrap().accepted);
    }

    #[test]
    fn acceptance_is_only_revoked_when_allowed() {
        let (_dir, perms) = engine(2);
        let admin = perms.resolve_or_create(&user(1, "boss")).unwrap();
        let admin = perms.refresh_computed_flags(admin.id, false).unwrap();
        let member = perms.resolve_or_create(&user(2, "member")).unwrap();

        assert!(perms.admin_verify(&admin, member.id).unwrap().accepted);

        perms.admin_reject(&admin, member.id).unwrap();
        let member = perms.get_actor(member.id).unwrap();
        assert!(!member.accepted);
        assert!(!member.verified_by_admin);
    }

    #[test]
    fn non_admin_cannot_approve_or_ban() {
        let (_dir, perms) = engine(2);
        let member = perms.resolve_or_create(&user(2, "member")).unwrap();
        let other = perms.resolve_or_create(&user(3, "other")).unwrap();

        assert!(matches!(
            perms.approve_chat(&member, -1),
            Err(PermsError::AdminPermissionDenied(_))
        ));
        assert!(matches!(
            perms.admin_ban(&member, other.id, "spam"),
            Err(PermsError::AdminPermissionDenied(_))
        ));
    }

    #[test]
    fn ban_removes_acceptance() {
        let (_dir, perms) = engine(2);
        let admin = perms.resolve_or_create(&user(1, "boss")).unwrap();
        let admin = perms.refresh_computed_flags(admin.id, false).unwrap();
        let member = perms.resolve_or_create(&user(2, "member")).unwrap();
        perms.admin_verify(&admin, member.id).unwrap();

        let member = perms.admin_ban(&admin, member.id, "griefing").unwrap();
        assert!(member.banned);
        assert!(!member.accepted);
        assert!(matches!(
            perms.admin_ban(&admin, admin.id, "oops"),
            Err(PermsError::AdminPermissionDenied(_))
        ));
    }

    #[test]
    fn login_limit_rules() {
        let (_dir, perms) = engine(1);
        let admin = perms.resolve_or_create(&user(1, "boss")).unwrap();
        let admin = perms.refresh_computed_flags(admin.id, false).unwrap();
        assert_eq!(perms.login_limit(&admin), Some(1));

        perms.assign_login(&admin, &login("first"), false, Uuid::nil()).unwrap();
        let admin = perms.get_actor(admin.id).unwrap();
        assert!(matches!(
            perms.check_add_login(&admin),
            Err(PermsError::ExceededMaxLogins { current: 1, max: 1 })
        ));
        assert!(matches!(
            perms.assign_login(&admin, &login("second"), false, Uuid::nil()),
            Err(PermsError::ExceededMaxLogins { current: 1, max: 1 })
        ));

        let conn = perms.conn().unwrap();
        actors::set_custom_login_limit(&conn, admin.id, Some(-1)).unwrap();
        let admin = perms.get_actor(admin.id).unwrap();
        assert_eq!(perms.login_limit(&admin), None);
        perms.assign_login(&admin, &login("second"), false, Uuid::nil()).unwrap();
    }

    #[test]
    fn taken_and_foreign_logins() {
        let (_dir, perms) = engine(2);
        let admin = perms.resolve_or_create(&user(1, "boss")).unwrap();
        let admin = perms.refresh_computed_flags(admin.id, false).unwrap();
        let member = perms.resolve_or_create(&user(2, "member")).unwrap();
        let member = perms.admin_verify(&admin, member.id).unwrap();

        perms.assign_login(&admin, &login("Steve"), false, Uuid::nil()).unwrap();
        assert!(matches!(
            perms.assign_login(&member, &login("steve"), false, Uuid::nil()),
            Err(PermsError::LoginTaken(_))
        ));
        assert!(matches!(
            perms.revoke_login(member.id, &login("Steve")),
            Err(PermsError::NotYourLogin { .. })
        ));
        perms.revoke_login(admin.id, &login("Steve")).unwrap();
    }

    #[test]
    fn set_password_checks() {
        let (_dir, perms) = engine(2);
        let admin = perms.resolve_or_create(&user(1, "boss")).unwrap();
        let admin = perms.refresh_computed_flags(admin.id, false).unwrap();
        perms.assign_login(&admin, &login("Steve"), false, Uuid::nil()).unwrap();
        let admin = perms.get_actor(admin.id).unwrap();

        let password = perms.generate_password();
        perms.check_set_password(&admin, &login("steve"), &password).unwrap();
        assert!(matches!(
            perms.check_set_password(&admin, &login("Steve"), "short"),
            Err(PermsError::InvalidPasswordFormat)
        ));
        assert!(matches!(
            perms.check_set_password(&admin, &login("Alex"), &password),
            Err(PermsError::NotYourLogin { .. })
        ));
    }

    #[test]
    fn username_lookup_strips_at() {
        let (_dir, perms) = engine(2);
        let actor = perms.resolve_or_create(&user(9, "Someone")).unwrap();
        assert_eq!(perms.find_actor_by_tg_username("@someone").unwrap().map(|a| a.id), Some(actor.id));
        assert_eq!(perms.find_actor_by_tg_user(9).unwrap().map(|a| a.id), Some(actor.id));
        assert!(perms.find_actor_by_tg_user(10).unwrap().is_none());
    }
}
