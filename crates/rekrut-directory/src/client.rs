//! LDAP implementation of the directory service
//!
//! Connection discipline: one connection per operation, service bind for
//! searches, a separate user bind for credential verification, unbind on
//! every path before returning.

use std::time::Duration;

use async_trait::async_trait;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, Scope, SearchEntry};
use rekrut_core::config::{GroupMatch, LdapSettings};
use rekrut_core::types::DirectoryProfile;
use rekrut_core::{Error, Result};
use tracing::{debug, warn};

// LDAP result codes we care about
const RC_SUCCESS: u32 = 0;
const RC_INVALID_CREDENTIALS: u32 = 49;

pub struct LdapDirectory {
    settings: LdapSettings,
}

impl LdapDirectory {
    pub fn new(settings: LdapSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self { settings })
    }

    pub fn settings(&self) -> &LdapSettings {
        &self.settings
    }

    async fn connect(&self, timeout: Duration) -> Result<Ldap> {
        let settings = LdapConnSettings::new()
            .set_conn_timeout(timeout)
            .set_starttls(self.settings.start_tls);

        debug!(server = %self.settings.server_url, "connecting to directory");

        let (conn, ldap) = LdapConnAsync::with_settings(settings, &self.settings.server_url)
            .await
            .map_err(|e| Error::DirectoryUnavailable(e.to_string()))?;

        ldap3::drive!(conn);
        Ok(ldap)
    }

    /// Open a connection and bind with the service account.
    async fn service_session(&self) -> Result<Ldap> {
        let mut ldap = self
            .connect(Duration::from_secs(self.settings.timeout_secs))
            .await?;

        let result = ldap
            .simple_bind(&self.settings.bind_dn, &self.settings.bind_password)
            .await
            .map_err(|e| Error::DirectoryUnavailable(format!("service bind failed: {}", e)))?;

        if result.rc != RC_SUCCESS {
            let _ = ldap.unbind().await;
            return Err(Error::DirectoryUnavailable(format!(
                "service bind rejected with code {}",
                result.rc
            )));
        }

        Ok(ldap)
    }

    /// Base-scope read of a single entry by DN.
    async fn read_entry(
        &self,
        ldap: &mut Ldap,
        dn: &str,
        attrs: Vec<&str>,
    ) -> Result<Option<SearchEntry>> {
        let (rs, _res) = ldap
            .search(dn, Scope::Base, "(objectClass=*)", attrs)
            .await
            .map_err(|e| Error::DirectoryUnavailable(format!("entry read failed: {}", e)))?
            .success()
            .map_err(|e| match e {
                // The entry vanished between find and fetch
                ldap3::LdapError::LdapResult { result } if result.rc == 32 => {
                    Error::NotFound(dn.to_string())
                }
                other => Error::DirectoryUnavailable(format!("entry read error: {}", other)),
            })?;

        Ok(rs.into_iter().next().map(SearchEntry::construct))
    }

    fn profile_from_entry(&self, entry: SearchEntry) -> DirectoryProfile {
        let attrs = &self.settings.attributes;
        DirectoryProfile {
            directory_id: first_attr(&entry, &attrs.uid).unwrap_or_else(|| entry.dn.clone()),
            email: first_attr(&entry, &attrs.email).unwrap_or_default(),
            given_name: first_attr(&entry, &attrs.given_name).unwrap_or_default(),
            surname: first_attr(&entry, &attrs.surname).unwrap_or_default(),
            groups: entry
                .attrs
                .get(&attrs.member_of)
                .cloned()
                .unwrap_or_default(),
        }
    }
}

#[async_trait]
impl crate::DirectoryService for LdapDirectory {
    async fn find_identifier_by_email(&self, email: &str) -> Result<String> {
        let mut ldap = self.service_session().await?;

        let filter = self.settings.build_user_filter(email);
        debug!(%filter, "searching directory for user");

        let search = ldap
            .search(
                &self.settings.user_base_dn,
                Scope::Subtree,
                &filter,
                vec![self.settings.attributes.uid.as_str()],
            )
            .await;

        let outcome = match search {
            Ok(res) => res
                .success()
                .map_err(|e| Error::DirectoryUnavailable(format!("user search error: {}", e))),
            Err(e) => Err(Error::DirectoryUnavailable(format!("user search failed: {}", e))),
        };

        let _ = ldap.unbind().await;

        let (rs, _res) = outcome?;
        match rs.into_iter().next() {
            Some(entry) => Ok(SearchEntry::construct(entry).dn),
            None => Err(Error::NotFound(email.to_string())),
        }
    }

    async fn verify_credential(&self, identifier: &str, secret: &str) -> Result<bool> {
        // An empty password is an anonymous bind, which "succeeds" on most
        // servers. It must never count as a verified credential.
        if secret.is_empty() {
            return Ok(false);
        }

        let mut ldap = self
            .connect(Duration::from_secs(self.settings.timeout_secs))
            .await?;

        let bind = ldap
            .simple_bind(identifier, secret)
            .await
            .map_err(|e| Error::DirectoryUnavailable(format!("user bind failed: {}", e)));

        let _ = ldap.unbind().await;

        match bind?.rc {
            RC_SUCCESS => Ok(true),
            RC_INVALID_CREDENTIALS => Ok(false),
            rc => {
                // Disabled or locked accounts also land here. They are not
                // transport failures, so the caller sees a plain rejection.
                debug!(rc, "user bind rejected");
                Ok(false)
            }
        }
    }

    async fn fetch_profile(&self, identifier: &str) -> Result<DirectoryProfile> {
        let mut ldap = self.service_session().await?;

        let attrs = &self.settings.attributes;
        let wanted = vec![
            attrs.uid.as_str(),
            attrs.email.as_str(),
            attrs.given_name.as_str(),
            attrs.surname.as_str(),
            attrs.member_of.as_str(),
        ];

        let entry = self.read_entry(&mut ldap, identifier, wanted).await;
        let _ = ldap.unbind().await;

        match entry? {
            Some(entry) => Ok(self.profile_from_entry(entry)),
            None => Err(Error::NotFound(identifier.to_string())),
        }
    }

    async fn is_group_member(&self, identifier: &str, group: &str) -> Result<bool> {
        let profile = self.fetch_profile(identifier).await?;
        Ok(profile
            .groups
            .iter()
            .any(|value| group_value_matches(value, group, self.settings.group_match)))
    }

    async fn is_service_reachable(&self) -> bool {
        let probe = Duration::from_secs(self.settings.probe_timeout_secs);

        let attempt = tokio::time::timeout(probe, async {
            let mut ldap = self.connect(probe).await?;
            let result = ldap
                .simple_bind(&self.settings.bind_dn, &self.settings.bind_password)
                .await
                .map_err(|e| Error::DirectoryUnavailable(e.to_string()));
            let _ = ldap.unbind().await;
            result
        })
        .await;

        match attempt {
            Ok(Ok(result)) => result.rc == RC_SUCCESS,
            Ok(Err(e)) => {
                warn!(error = %e, "directory probe failed");
                false
            }
            Err(_) => {
                warn!("directory probe timed out");
                false
            }
        }
    }
}

fn first_attr(entry: &SearchEntry, attr: &str) -> Option<String> {
    entry.attrs.get(attr).and_then(|v| v.first().cloned())
}

/// Match a directory group value against a configured group name.
///
/// Exact mode also accepts a DN whose first RDN value equals the name, so
/// `cn=recruiting-admins,ou=groups,...` matches `recruiting-admins`.
pub fn group_value_matches(value: &str, group: &str, policy: GroupMatch) -> bool {
    match policy {
        GroupMatch::Exact => {
            if value.eq_ignore_ascii_case(group) {
                return true;
            }
            value
                .split(',')
                .next()
                .and_then(|rdn| rdn.split_once('='))
                .map(|(_, v)| v.trim().eq_ignore_ascii_case(group))
                .unwrap_or(false)
        }
        GroupMatch::Substring => value.to_ascii_lowercase().contains(&group.to_ascii_lowercase()),
    }
}
