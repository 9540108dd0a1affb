use anyhow::Result;
use secrecy::ExposeSecret;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::api;
use crate::api::handlers::GateState;
use crate::cli::actions::Action;
use crate::lockout::{AutoUnlockScheduler, LockoutEngine};
use crate::principal::{
    MemoryPrincipalStore, Principal, PrincipalClass, PrincipalStore, Sha256Verifier,
};
use crate::store::{MemoryTtlStore, TtlStore};

const REAPER_INTERVAL: Duration = Duration::from_secs(60);

/// Handle the server action
pub async fn handle(action: Action) -> Result<()> {
    match action {
        Action::Server {
            port,
            crypto,
            lockout,
            bootstrap_admin,
        } => {
            let store = Arc::new(MemoryTtlStore::new());
            store.spawn_reaper(REAPER_INTERVAL);

            let principals = Arc::new(MemoryPrincipalStore::new());
            if let Some(admin) = bootstrap_admin {
                principals.insert(Principal::new(
                    &admin.username,
                    &Sha256Verifier::hash(admin.password.expose_secret()),
                    "admin",
                    PrincipalClass::Privileged,
                ))?;
                info!(username = %admin.username, "seeded bootstrap admin");
            }

            let sweep_engine = Arc::new(LockoutEngine::new(
                Arc::<MemoryTtlStore>::clone(&store) as Arc<dyn TtlStore>,
                Arc::<MemoryPrincipalStore>::clone(&principals) as Arc<dyn PrincipalStore>,
                lockout.clone(),
            ));
            AutoUnlockScheduler::new(
                sweep_engine,
                Duration::from_secs(lockout.auto_unlock_interval_seconds()),
            )
            .spawn();

            let state = Arc::new(GateState::build(
                crypto,
                lockout,
                store,
                principals,
                Arc::new(Sha256Verifier),
            ));

            api::new(port, state).await?;
        }
    }

    Ok(())
}
