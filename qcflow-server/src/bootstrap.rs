//! First-run administrator account

use qcflow_common::password::generate_password;
use qcflow_common::{Result, Role};
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::config::ServerSettings;
use crate::db;
use crate::models::NewUser;

/// Length of a generated administrator password
const GENERATED_PASSWORD_LEN: usize = 20;

/// Create an administrator when the user table is empty
///
/// Uses the configured password, or generates one and logs it once. Returns
/// the username when an account was created.
pub async fn ensure_admin_account(
    pool: &SqlitePool,
    settings: &ServerSettings,
) -> Result<Option<String>> {
    if db::users::count_users(pool).await? > 0 {
        return Ok(None);
    }

    let (password, generated) = match &settings.admin_password {
        Some(password) => (password.clone(), false),
        None => (generate_password(GENERATED_PASSWORD_LEN), true),
    };

    let admin = db::users::create_user(
        pool,
        &NewUser {
            username: settings.admin_username.clone(),
            email: String::new(),
            role: Role::Administrator,
            department: "Administration".to_string(),
            password: password.clone(),
        },
    )
    .await?;

    if generated {
        warn!(
            "Created administrator '{}' with generated password: {}  (change it after first login)",
            admin.username, password
        );
    } else {
        info!("Created administrator '{}' from configuration", admin.username);
    }

    Ok(Some(admin.username))
}
