/// Session lifecycle
///
/// - [`refresh`]: refresh token issuance, validation, rotation and revocation
/// - [`manager`]: login / refresh / logout orchestration
///
/// # Example
///
/// ```no_run
/// use keyward_shared::clock::SystemClock;
/// use keyward_shared::config::AuthConfig;
/// use keyward_shared::session::manager::{LoginRequest, RequestContext, SessionManager};
/// use keyward_shared::store::{MemoryAccountStore, MemorySessionStore};
/// use std::sync::Arc;
/// use uuid::Uuid;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = AuthConfig::from_env()?;
/// let manager = SessionManager::new(
///     Arc::new(MemoryAccountStore::new()),
///     Arc::new(MemorySessionStore::new()),
///     &config,
///     Arc::new(SystemClock),
/// );
///
/// let ctx = RequestContext::new().with_client_ip("203.0.113.7");
/// let pair = manager
///     .login(
///         LoginRequest {
///             tenant_id: Uuid::new_v4(),
///             identifier: "alice".to_string(),
///             secret: "correct horse battery staple".to_string(),
///         },
///         &ctx,
///     )
///     .await?;
///
/// let rotated = manager.refresh(&pair.refresh_token, &ctx).await?;
/// manager.logout(Some(&rotated.refresh_token), None, &ctx).await?;
/// # Ok(())
/// # }
/// ```

pub mod manager;
pub mod refresh;
