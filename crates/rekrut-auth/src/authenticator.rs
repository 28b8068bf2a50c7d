//! Login orchestration
//!
//! One login attempt walks Start -> {TryDirectory | TryLocal} ->
//! {Success | Failure}. The entry state comes from the caller's preferred
//! method; fallback from the directory path to the local path happens only
//! on transport failure, never on rejected credentials, so the enumeration
//! protection and the audit trail stay intact.

use std::sync::Arc;

use rekrut_core::config::{AuthConfig, LdapSettings, VerifyingPath};
use rekrut_core::types::{names_from_email, AuditEntry, Identity, NewIdentity, Role};
use rekrut_core::{Error, Result};
use rekrut_directory::DirectoryService;
use rekrut_identity::{IdentityStore, Reconciler};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Which credential path the caller asked for first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoginMethod {
    Ldap,
    Local,
}

impl LoginMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoginMethod::Ldap => "ldap",
            LoginMethod::Local => "local",
        }
    }
}

/// One login attempt, as received from the HTTP layer.
#[derive(Debug, Clone)]
pub struct LoginAttempt {
    pub email: String,
    pub secret: String,
    pub method: LoginMethod,
    /// Caller IP for the audit trail
    pub peer: String,
}

pub struct Authenticator {
    directory: Arc<dyn DirectoryService>,
    store: Arc<IdentityStore>,
    auth: AuthConfig,
    admin_group: String,
}

impl Authenticator {
    pub fn new(
        directory: Arc<dyn DirectoryService>,
        store: Arc<IdentityStore>,
        auth: AuthConfig,
        ldap: &LdapSettings,
    ) -> Self {
        Self {
            directory,
            store,
            auth,
            admin_group: ldap.admin_group.clone(),
        }
    }

    /// Run one login attempt to a terminal state. Every outcome, success or
    /// failure, is audited before this returns.
    pub async fn login(&self, attempt: LoginAttempt) -> Result<Identity> {
        let email = attempt.email.trim().to_lowercase();

        if email.is_empty() || attempt.secret.is_empty() {
            let err = Error::Validation("email and password are required".into());
            self.audit(&email, attempt.method.as_str(), err.code(), &attempt.peer);
            return Err(err);
        }

        // Cheap pre-filter, applied before any directory or store call
        if !self.auth.domain_allowed(&email) {
            self.audit(&email, attempt.method.as_str(), "DomainNotAllowed", &attempt.peer);
            return Err(Error::DomainNotAllowed);
        }

        let outcome = match attempt.method {
            LoginMethod::Ldap => {
                let direct = self.directory_login(&email, &attempt.secret).await;
                match direct {
                    Err(Error::DirectoryUnavailable(reason)) if self.auth.fallback_to_local => {
                        warn!(%email, %reason, "directory unreachable, falling back to local path");
                        self.local_login(&email, &attempt.secret).await
                    }
                    other => other,
                }
            }
            LoginMethod::Local => self.local_login(&email, &attempt.secret).await,
        };

        match &outcome {
            Ok(identity) => {
                info!(%email, method = attempt.method.as_str(), role = %identity.role, "login succeeded");
                self.audit(&email, attempt.method.as_str(), "success", &attempt.peer);
            }
            Err(err) => {
                debug!(%email, method = attempt.method.as_str(), code = err.code(), "login failed");
                self.audit(&email, attempt.method.as_str(), err.code(), &attempt.peer);
            }
        }

        outcome
    }

    /// Directory path: find, verify as the user, fetch the profile, then
    /// reconcile into the local store. "No such user" and "wrong password"
    /// collapse into the same failure on purpose.
    async fn directory_login(&self, email: &str, secret: &str) -> Result<Identity> {
        let identifier = match self.directory.find_identifier_by_email(email).await {
            Ok(identifier) => identifier,
            Err(Error::NotFound(_)) => return Err(Error::InvalidCredentials),
            Err(other) => return Err(other),
        };

        if !self.directory.verify_credential(&identifier, secret).await? {
            return Err(Error::InvalidCredentials);
        }

        let profile = match self.directory.fetch_profile(&identifier).await {
            Ok(profile) => profile,
            // Entry vanished between find and fetch
            Err(Error::NotFound(_)) => return Err(Error::InvalidCredentials),
            Err(other) => return Err(other),
        };

        let is_admin = match self
            .directory
            .is_group_member(&identifier, &self.admin_group)
            .await
        {
            Ok(is_admin) => is_admin,
            // Same vanished-entry race as above
            Err(Error::NotFound(_)) => return Err(Error::InvalidCredentials),
            Err(other) => return Err(other),
        };

        Reconciler::new(&self.store).reconcile(&profile, is_admin).await
    }

    /// Local path: a missing row or a null hash means local login was never
    /// enabled, which is safe to say out loud. A wrong password is not.
    async fn local_login(&self, email: &str, secret: &str) -> Result<Identity> {
        let identity = self
            .store
            .find_by_email(email)
            .await?
            .ok_or(Error::LocalLoginUnavailable)?;

        let hash = identity
            .local_credential_hash
            .as_deref()
            .ok_or(Error::LocalLoginUnavailable)?;

        if !crate::password::verify(secret, hash) {
            return Err(Error::InvalidCredentials);
        }

        Ok(identity)
    }

    /// Local-path account creation. Missing names default to a split of the
    /// email local part.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        first_name: Option<&str>,
        last_name: Option<&str>,
        peer: &str,
    ) -> Result<Identity> {
        if !self.auth.registration_enabled {
            return Err(Error::Forbidden);
        }

        let email = email.trim().to_lowercase();
        if !self.auth.domain_allowed(&email) {
            return Err(Error::DomainNotAllowed);
        }
        self.check_password_policy(password)?;

        let (default_first, default_last) = names_from_email(&email);
        let identity = self
            .store
            .create(NewIdentity {
                email: email.clone(),
                directory_id: None,
                local_credential_hash: Some(crate::password::hash(password)?),
                role: Role::Standard,
                first_name: first_name
                    .filter(|s| !s.trim().is_empty())
                    .map(str::to_string)
                    .unwrap_or(default_first),
                last_name: last_name
                    .filter(|s| !s.trim().is_empty())
                    .map(str::to_string)
                    .unwrap_or(default_last),
                last_directory_sync_at: None,
            })
            .await?;

        self.audit(&email, "register", "success", peer);
        Ok(identity)
    }

    /// Set or replace the local credential after verifying the current one
    /// through the configured authoritative path.
    pub async fn set_local_password(
        &self,
        email: &str,
        current: &str,
        new_password: &str,
        peer: &str,
    ) -> Result<Identity> {
        let email = email.trim().to_lowercase();
        if !self.auth.domain_allowed(&email) {
            return Err(Error::DomainNotAllowed);
        }
        self.check_password_policy(new_password)?;

        let identity = match self.auth.password_change_verifier {
            VerifyingPath::Directory => self.directory_login(&email, current).await?,
            VerifyingPath::Local => self.local_login(&email, current).await?,
        };

        self.store
            .set_local_credential(identity.id, &crate::password::hash(new_password)?)
            .await?;

        self.audit(&email, "set-local-password", "success", peer);

        self.store
            .find_by_id(identity.id)
            .await?
            .ok_or_else(|| Error::NotFound(identity.id.to_string()))
    }

    fn check_password_policy(&self, password: &str) -> Result<()> {
        if password.len() < self.auth.min_password_length {
            return Err(Error::Validation(format!(
                "password must be at least {} characters",
                self.auth.min_password_length
            )));
        }
        Ok(())
    }

    /// Fire-and-forget: the audit write never blocks or changes the
    /// authentication outcome.
    fn audit(&self, email: &str, method: &str, outcome: &str, peer: &str) {
        let store = Arc::clone(&self.store);
        let entry = AuditEntry::login(email, method, outcome, peer);
        tokio::spawn(async move {
            if let Err(err) = store.record_audit(&entry).await {
                warn!(error = %err, "audit write failed");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rekrut_core::types::DirectoryProfile;
    use std::collections::HashMap;

    /// In-memory directory fake: identifiers are "dn:<email>".
    struct FakeDirectory {
        reachable: bool,
        /// Entry disappears between the profile read and the group read
        vanish_on_group_read: bool,
        users: HashMap<String, (String, DirectoryProfile)>,
    }

    impl FakeDirectory {
        fn unreachable() -> Self {
            Self {
                reachable: false,
                vanish_on_group_read: false,
                users: HashMap::new(),
            }
        }

        fn with_user(email: &str, password: &str, groups: &[&str]) -> Self {
            let mut users = HashMap::new();
            users.insert(
                email.to_string(),
                (
                    password.to_string(),
                    DirectoryProfile {
                        directory_id: format!("uid-{}", email),
                        email: email.to_string(),
                        given_name: "Jane".to_string(),
                        surname: "Doe".to_string(),
                        groups: groups.iter().map(|g| g.to_string()).collect(),
                    },
                ),
            );
            Self {
                reachable: true,
                vanish_on_group_read: false,
                users,
            }
        }

        fn lookup(&self, identifier: &str) -> Option<&(String, DirectoryProfile)> {
            identifier
                .strip_prefix("dn:")
                .and_then(|email| self.users.get(email))
        }
    }

    #[async_trait]
    impl DirectoryService for FakeDirectory {
        async fn find_identifier_by_email(&self, email: &str) -> Result<String> {
            if !self.reachable {
                return Err(Error::DirectoryUnavailable("connection refused".into()));
            }
            if self.users.contains_key(email) {
                Ok(format!("dn:{}", email))
            } else {
                Err(Error::NotFound(email.to_string()))
            }
        }

        async fn verify_credential(&self, identifier: &str, secret: &str) -> Result<bool> {
            if !self.reachable {
                return Err(Error::DirectoryUnavailable("connection refused".into()));
            }
            Ok(self
                .lookup(identifier)
                .map(|(password, _)| password == secret)
                .unwrap_or(false))
        }

        async fn fetch_profile(&self, identifier: &str) -> Result<DirectoryProfile> {
            if !self.reachable {
                return Err(Error::DirectoryUnavailable("connection refused".into()));
            }
            self.lookup(identifier)
                .map(|(_, profile)| profile.clone())
                .ok_or_else(|| Error::NotFound(identifier.to_string()))
        }

        async fn is_group_member(&self, identifier: &str, group: &str) -> Result<bool> {
            if self.vanish_on_group_read {
                return Err(Error::NotFound(identifier.to_string()));
            }
            let profile = self.fetch_profile(identifier).await?;
            Ok(profile.groups.iter().any(|g| g == group))
        }

        async fn is_service_reachable(&self) -> bool {
            self.reachable
        }
    }

    async fn authenticator(directory: FakeDirectory, auth: AuthConfig) -> Authenticator {
        let store = Arc::new(IdentityStore::new("sqlite::memory:").await.unwrap());
        Authenticator::new(
            Arc::new(directory),
            store,
            auth,
            &LdapSettings::default(),
        )
    }

    fn attempt(email: &str, secret: &str, method: LoginMethod) -> LoginAttempt {
        LoginAttempt {
            email: email.to_string(),
            secret: secret.to_string(),
            method,
            peer: "10.0.0.9".to_string(),
        }
    }

    #[tokio::test]
    async fn test_directory_login_creates_admin_identity() {
        let directory = FakeDirectory::with_user("jane@sunrise.net", "pw", &["recruiting-admins"]);
        let auth = authenticator(directory, AuthConfig::default()).await;

        let identity = auth
            .login(attempt("Jane@sunrise.net", "pw", LoginMethod::Ldap))
            .await
            .unwrap();

        assert_eq!(identity.email, "jane@sunrise.net");
        assert_eq!(identity.role, Role::Administrator);
        assert!(identity.local_credential_hash.is_none());
    }

    #[tokio::test]
    async fn test_wrong_password_and_unknown_user_look_identical() {
        let directory = FakeDirectory::with_user("jane@sunrise.net", "pw", &[]);
        let auth = authenticator(directory, AuthConfig::default()).await;

        let wrong_pw = auth
            .login(attempt("jane@sunrise.net", "bad", LoginMethod::Ldap))
            .await
            .unwrap_err();
        let no_user = auth
            .login(attempt("ghost@sunrise.net", "pw", LoginMethod::Ldap))
            .await
            .unwrap_err();

        assert!(matches!(wrong_pw, Error::InvalidCredentials));
        assert!(matches!(no_user, Error::InvalidCredentials));
        assert_eq!(wrong_pw.to_string(), no_user.to_string());
    }

    #[tokio::test]
    async fn test_entry_vanishing_mid_login_looks_like_bad_credentials() {
        // Valid credentials, but the entry disappears before the group
        // read. The caller must see the uninformative rejection, not a
        // NotFound that names the internal identifier.
        let mut directory = FakeDirectory::with_user("jane@sunrise.net", "pw", &[]);
        directory.vanish_on_group_read = true;
        let auth = authenticator(directory, AuthConfig::default()).await;

        let err = auth
            .login(attempt("jane@sunrise.net", "pw", LoginMethod::Ldap))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_domain_prefilter_rejects_before_directory() {
        // Directory is unreachable; the domain filter must reject first
        let auth = authenticator(FakeDirectory::unreachable(), AuthConfig::default()).await;

        let err = auth
            .login(attempt("jane@elsewhere.org", "pw", LoginMethod::Ldap))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DomainNotAllowed));
    }

    #[tokio::test]
    async fn test_local_login_without_hash_is_unavailable() {
        let directory = FakeDirectory::with_user("jane@sunrise.net", "pw", &[]);
        let auth = authenticator(directory, AuthConfig::default()).await;

        // Directory login creates the row with a null hash
        auth.login(attempt("jane@sunrise.net", "pw", LoginMethod::Ldap))
            .await
            .unwrap();

        let err = auth
            .login(attempt("jane@sunrise.net", "pw", LoginMethod::Local))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::LocalLoginUnavailable));

        // Unknown account reports the same, not InvalidCredentials
        let err = auth
            .login(attempt("ghost@sunrise.net", "pw", LoginMethod::Local))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::LocalLoginUnavailable));
    }

    #[tokio::test]
    async fn test_local_login_with_credential() {
        let auth = authenticator(
            FakeDirectory::unreachable(),
            AuthConfig {
                registration_enabled: true,
                ..Default::default()
            },
        )
        .await;

        auth.register("jane@sunrise.net", "long-enough", None, None, "10.0.0.9")
            .await
            .unwrap();

        let identity = auth
            .login(attempt("jane@sunrise.net", "long-enough", LoginMethod::Local))
            .await
            .unwrap();
        assert_eq!(identity.role, Role::Standard);
        assert_eq!(identity.first_name, "Jane");

        let err = auth
            .login(attempt("jane@sunrise.net", "wrong", LoginMethod::Local))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_unreachable_directory_without_fallback() {
        let auth = authenticator(FakeDirectory::unreachable(), AuthConfig::default()).await;

        let err = auth
            .login(attempt("jane@sunrise.net", "pw", LoginMethod::Ldap))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DirectoryUnavailable(_)));
    }

    #[tokio::test]
    async fn test_fallback_only_on_transport_failure() {
        let auth = authenticator(
            FakeDirectory::unreachable(),
            AuthConfig {
                fallback_to_local: true,
                registration_enabled: true,
                ..Default::default()
            },
        )
        .await;

        auth.register("jane@sunrise.net", "long-enough", None, None, "10.0.0.9")
            .await
            .unwrap();

        // Directory is down: the attempt falls through to the local path
        let identity = auth
            .login(attempt("jane@sunrise.net", "long-enough", LoginMethod::Ldap))
            .await
            .unwrap();
        assert_eq!(identity.email, "jane@sunrise.net");
    }

    #[tokio::test]
    async fn test_no_fallback_on_bad_directory_credentials() {
        let directory = FakeDirectory::with_user("jane@sunrise.net", "dir-pw", &[]);
        let auth = authenticator(
            directory,
            AuthConfig {
                fallback_to_local: true,
                registration_enabled: true,
                ..Default::default()
            },
        )
        .await;

        // A local credential exists and would match, but a rejected
        // directory password must never silently retry against it.
        auth.set_local_password_unchecked("jane@sunrise.net", "local-pw").await;

        let err = auth
            .login(attempt("jane@sunrise.net", "local-pw", LoginMethod::Ldap))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_register_duplicate_is_conflict() {
        let auth = authenticator(
            FakeDirectory::unreachable(),
            AuthConfig {
                registration_enabled: true,
                ..Default::default()
            },
        )
        .await;

        auth.register("jane@sunrise.net", "long-enough", None, None, "p")
            .await
            .unwrap();
        let err = auth
            .register("jane@sunrise.net", "long-enough", None, None, "p")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn test_register_password_policy() {
        let auth = authenticator(
            FakeDirectory::unreachable(),
            AuthConfig {
                registration_enabled: true,
                ..Default::default()
            },
        )
        .await;

        let err = auth
            .register("jane@sunrise.net", "short", None, None, "p")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_set_local_password_via_directory() {
        let directory = FakeDirectory::with_user("jane@sunrise.net", "dir-pw", &[]);
        let auth = authenticator(directory, AuthConfig::default()).await;

        // Verifies the current directory credential, reconciles the row,
        // then enables the local path.
        let identity = auth
            .set_local_password("jane@sunrise.net", "dir-pw", "new-local-pw", "10.0.0.9")
            .await
            .unwrap();
        assert!(identity.local_credential_hash.is_some());

        let logged_in = auth
            .login(attempt("jane@sunrise.net", "new-local-pw", LoginMethod::Local))
            .await
            .unwrap();
        assert_eq!(logged_in.id, identity.id);

        let err = auth
            .set_local_password("jane@sunrise.net", "wrong", "another-pw", "10.0.0.9")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidCredentials));
    }

    impl Authenticator {
        /// Test helper: seed a local credential without the verification
        /// dance.
        async fn set_local_password_unchecked(&self, email: &str, password: &str) {
            let identity = self
                .store
                .create(NewIdentity {
                    email: email.to_string(),
                    directory_id: None,
                    local_credential_hash: Some(crate::password::hash(password).unwrap()),
                    role: Role::Standard,
                    first_name: String::new(),
                    last_name: String::new(),
                    last_directory_sync_at: None,
                })
                .await;
            // Row may already exist from an earlier directory login
            if let Err(Error::Conflict(_)) = identity {
                let existing = self.store.find_by_email(email).await.unwrap().unwrap();
                self.store
                    .set_local_credential(existing.id, &crate::password::hash(password).unwrap())
                    .await
                    .unwrap();
            }
        }
    }
}
