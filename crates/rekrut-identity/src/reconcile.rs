//! Reconciliation engine
//!
//! Syncs a verified directory profile into the identity table. Every
//! directory login is authoritative for role assignment: membership in the
//! admin group is recomputed on each call, so revoking it demotes the user
//! on their next login without any local action.

use chrono::Utc;
use rekrut_core::types::{DirectoryProfile, Identity, NewIdentity, Role};
use rekrut_core::{Error, Result};
use tracing::{debug, info, warn};

use crate::store::IdentityStore;

pub struct Reconciler<'a> {
    store: &'a IdentityStore,
    /// Test seam: a competing row inserted between the lookup and the
    /// create, forcing the loser's side of the first-login race.
    #[cfg(test)]
    race_seed: std::sync::Mutex<Option<NewIdentity>>,
}

impl<'a> Reconciler<'a> {
    pub fn new(store: &'a IdentityStore) -> Self {
        Self {
            store,
            #[cfg(test)]
            race_seed: std::sync::Mutex::new(None),
        }
    }

    #[cfg(test)]
    fn seed_race(&self, row: NewIdentity) {
        *self.race_seed.lock().unwrap() = Some(row);
    }

    #[cfg(test)]
    async fn lose_race_if_seeded(&self) {
        let seed = self.race_seed.lock().unwrap().take();
        if let Some(row) = seed {
            let _ = self.store.create(row).await;
        }
    }

    /// Find-or-create the identity row for a directory profile and sync its
    /// mutable fields.
    ///
    /// The lookup+create pair is not atomic; two concurrent first logins can
    /// both reach `create`. The loser hits the store's uniqueness constraint
    /// and retries as an update. That conflict-retry is the designed
    /// resolution, so a second conflict is a genuine store bug.
    pub async fn reconcile(
        &self,
        profile: &DirectoryProfile,
        is_admin_group_member: bool,
    ) -> Result<Identity> {
        let role = Role::from_group_membership(is_admin_group_member);

        match self.sync(profile, role).await {
            Ok(identity) => Ok(identity),
            Err(Error::Conflict(email)) => {
                warn!(%email, "create lost a concurrent race, retrying as update");
                match self.sync(profile, role).await {
                    Ok(identity) => Ok(identity),
                    Err(Error::Conflict(_)) => Err(Error::ReconciliationFailed),
                    Err(other) => Err(other),
                }
            }
            Err(other) => Err(other),
        }
    }

    async fn sync(&self, profile: &DirectoryProfile, role: Role) -> Result<Identity> {
        let existing = self
            .store
            .find_by_email_or_directory_id(&profile.email, Some(&profile.directory_id))
            .await?;

        match existing {
            Some(identity) => {
                debug!(id = %identity.id, "updating identity from directory profile");
                self.store
                    .update_profile_fields(
                        identity.id,
                        &profile.directory_id,
                        &profile.given_name,
                        &profile.surname,
                        role,
                        Utc::now(),
                    )
                    .await
            }
            None => {
                info!(email = %profile.email, "first directory login, creating identity");
                #[cfg(test)]
                self.lose_race_if_seeded().await;
                self.store
                    .create(NewIdentity {
                        email: profile.email.clone(),
                        directory_id: Some(profile.directory_id.clone()),
                        local_credential_hash: None,
                        role,
                        first_name: profile.given_name.clone(),
                        last_name: profile.surname.clone(),
                        last_directory_sync_at: Some(Utc::now()),
                    })
                    .await
            }
        }
    }
}
