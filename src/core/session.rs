use redis::ConnectionLike;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{model::user::User, settings::Config};

/// Session entry stored in redis under the access token.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionData {
    pub user_id: String,
    pub refresh_token: String,
}

fn user_sessions_key(user_id: &Uuid) -> String {
    format!("user_sessions:{}", user_id)
}

pub fn add_session<C: ConnectionLike>(
    redis_conn: &mut C,
    user: &User,
    config: &Config,
    token: String,
    refresh_token: String,
) -> anyhow::Result<()> {
    let session_data = SessionData {
        user_id: user.id.to_string(),
        refresh_token,
    };
    let session_json = serde_json::to_string(&session_data)?;
    redis::Cmd::set_ex(&token, session_json, config.session_ttl()).exec(redis_conn)?;
    // index by user so deactivation can end every session
    let key = user_sessions_key(&user.id);
    redis::cmd("sadd").arg(&key).arg(&token).exec(redis_conn)?;
    redis::cmd("expire")
        .arg(&key)
        .arg(config.jwt_refresh_exp as u64 * 60)
        .exec(redis_conn)?;
    Ok(())
}

pub fn get_session<C: ConnectionLike>(
    redis_conn: &mut C,
    token: String,
) -> anyhow::Result<Option<SessionData>> {
    let res: Option<String> = redis::cmd("get").arg(token).query(redis_conn)?;
    match res {
        Some(res) => Ok(Some(serde_json::from_str(res.as_str())?)),
        None => Ok(None),
    }
}

pub fn remove_session<C: ConnectionLike>(
    redis_conn: &mut C,
    token: String,
) -> anyhow::Result<bool> {
    let session = match get_session(redis_conn, token.clone())? {
        Some(val) => val,
        None => return Ok(false),
    };
    redis::cmd("del").arg(&session.refresh_token).exec(redis_conn)?;
    redis::cmd("del").arg(&token).exec(redis_conn)?;
    if let Ok(user_id) = Uuid::parse_str(&session.user_id) {
        redis::cmd("srem")
            .arg(user_sessions_key(&user_id))
            .arg(&token)
            .exec(redis_conn)?;
    }
    Ok(true)
}

/// Drop every session of a user. Returns how many were removed.
pub fn remove_user_sessions<C: ConnectionLike>(
    redis_conn: &mut C,
    user_id: &Uuid,
) -> anyhow::Result<usize> {
    let key = user_sessions_key(user_id);
    let tokens: Vec<String> = redis::cmd("smembers").arg(&key).query(redis_conn)?;
    let mut removed = 0;
    for token in tokens {
        if remove_session(redis_conn, token)? {
            removed += 1;
        }
    }
    redis::cmd("del").arg(&key).exec(redis_conn)?;
    Ok(removed)
}
