//! Configuration for rekrut

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RekrutConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub ldap: LdapSettings,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl RekrutConfig {
    pub fn from_file(path: &str) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Internal(format!("Failed to read config: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| crate::Error::Internal(format!("Failed to parse config: {}", e)))
    }

    /// Environment overrides applied on top of the current values.
    pub fn apply_env(&mut self) {
        if let Ok(addr) = std::env::var("REKRUT_BIND_ADDRESS") {
            self.server.bind_address = addr;
        }
        if let Ok(port) = std::env::var("REKRUT_PORT") {
            if let Ok(p) = port.parse() {
                self.server.port = p;
            }
        }
        if let Ok(url) = std::env::var("REKRUT_DATABASE_URL") {
            self.database.url = url;
        }
        if let Ok(secret) = std::env::var("REKRUT_SESSION_SECRET") {
            self.session.secret = secret;
        }
        if let Ok(domain) = std::env::var("REKRUT_ALLOWED_EMAIL_DOMAIN") {
            self.auth.allowed_email_domain = domain;
        }
        if let Ok(url) = std::env::var("REKRUT_LDAP_URL") {
            self.ldap.enabled = true;
            self.ldap.server_url = url;
        }
        if let Ok(dn) = std::env::var("REKRUT_LDAP_BIND_DN") {
            self.ldap.bind_dn = dn;
        }
        if let Ok(pw) = std::env::var("REKRUT_LDAP_BIND_PASSWORD") {
            self.ldap.bind_password = pw;
        }
        if let Ok(level) = std::env::var("REKRUT_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.session.secret.is_empty() {
            return Err(crate::Error::Validation(
                "session.secret must be set".into(),
            ));
        }
        if self.session.secret.len() < 32 {
            return Err(crate::Error::Validation(
                "session.secret must be at least 32 bytes".into(),
            ));
        }
        if self.auth.min_password_length < 4 {
            return Err(crate::Error::Validation(
                "auth.min_password_length is too small".into(),
            ));
        }
        if self.ldap.enabled {
            self.ldap.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8700,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:///data/rekrut/rekrut.db?mode=rwc".to_string(),
            max_connections: 20,
            min_connections: 1,
        }
    }
}

/// Which credential path verifies the current password during a password
/// change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VerifyingPath {
    #[default]
    Directory,
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Email domain suffix accepted for any login attempt.
    /// A cheap pre-filter, not a security boundary.
    pub allowed_email_domain: String,

    /// Retry the local path when the directory path fails with a transport
    /// error. Never applies to credential failures.
    #[serde(default)]
    pub fallback_to_local: bool,

    /// Allow self-service local-account registration
    #[serde(default)]
    pub registration_enabled: bool,

    #[serde(default = "default_min_password_length")]
    pub min_password_length: usize,

    /// Path that verifies the current credential on password change
    #[serde(default)]
    pub password_change_verifier: VerifyingPath,
}

fn default_min_password_length() -> usize {
    crate::DEFAULT_MIN_PASSWORD_LENGTH
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            allowed_email_domain: "sunrise.net".to_string(),
            fallback_to_local: false,
            registration_enabled: false,
            min_password_length: default_min_password_length(),
            password_change_verifier: VerifyingPath::default(),
        }
    }
}

impl AuthConfig {
    /// Case-insensitive suffix match on the part after '@'.
    pub fn domain_allowed(&self, email: &str) -> bool {
        if self.allowed_email_domain.is_empty() {
            return true;
        }
        match email.rsplit_once('@') {
            Some((local, domain)) => {
                !local.is_empty()
                    && domain.eq_ignore_ascii_case(&self.allowed_email_domain)
            }
            None => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// HMAC secret for token signing. Required, min 32 bytes.
    pub secret: String,

    /// Uniform token lifetime in seconds
    #[serde(default = "default_session_ttl")]
    pub ttl_secs: u64,

    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    /// Set the Secure attribute on the session cookie. On in production.
    #[serde(default)]
    pub cookie_secure: bool,
}

fn default_session_ttl() -> u64 {
    crate::SESSION_TTL_SECS
}

fn default_cookie_name() -> String {
    "rekrut_session".to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            ttl_secs: default_session_ttl(),
            cookie_name: default_cookie_name(),
            cookie_secure: false,
        }
    }
}

/// Group-name matching policy, directory-schema dependent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GroupMatch {
    /// Group attribute equals the configured name
    #[default]
    Exact,
    /// Configured name appears inside the group value (DN-style schemas)
    Substring,
}

/// LDAP directory settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LdapSettings {
    /// Enable the directory path
    #[serde(default)]
    pub enabled: bool,

    /// LDAP server URL (ldap:// or ldaps://)
    #[serde(default = "default_ldap_url")]
    pub server_url: String,

    /// Use STARTTLS for connection upgrade
    #[serde(default)]
    pub start_tls: bool,

    /// Service account DN used for searches, never for user verification
    #[serde(default)]
    pub bind_dn: String,

    /// Service account password
    #[serde(default)]
    pub bind_password: String,

    /// Base DN for user searches
    #[serde(default)]
    pub user_base_dn: String,

    /// User search filter; {email} placeholder is substituted
    #[serde(default = "default_user_filter")]
    pub user_filter: String,

    /// Group whose members get the administrator role
    #[serde(default = "default_admin_group")]
    pub admin_group: String,

    /// How group names are matched against directory values
    #[serde(default)]
    pub group_match: GroupMatch,

    #[serde(default)]
    pub attributes: DirectoryAttributes,

    /// Connection timeout in seconds
    #[serde(default = "default_ldap_timeout")]
    pub timeout_secs: u64,

    /// Timeout for the reachability probe in seconds
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
}

fn default_ldap_url() -> String {
    "ldap://localhost:389".to_string()
}

fn default_user_filter() -> String {
    "(mail={email})".to_string()
}

fn default_admin_group() -> String {
    "recruiting-admins".to_string()
}

fn default_ldap_timeout() -> u64 {
    5
}

fn default_probe_timeout() -> u64 {
    crate::DIRECTORY_PROBE_TIMEOUT_SECS
}

impl Default for LdapSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            server_url: default_ldap_url(),
            start_tls: false,
            bind_dn: String::new(),
            bind_password: String::new(),
            user_base_dn: String::new(),
            user_filter: default_user_filter(),
            admin_group: default_admin_group(),
            group_match: GroupMatch::default(),
            attributes: DirectoryAttributes::default(),
            timeout_secs: default_ldap_timeout(),
            probe_timeout_secs: default_probe_timeout(),
        }
    }
}

impl LdapSettings {
    pub fn build_user_filter(&self, email: &str) -> String {
        self.user_filter.replace("{email}", &escape_filter_value(email))
    }

    pub fn validate(&self) -> crate::Result<()> {
        if !self.enabled {
            return Ok(());
        }
        if self.server_url.is_empty() {
            return Err(crate::Error::Validation("ldap.server_url is required".into()));
        }
        if !self.server_url.starts_with("ldap://") && !self.server_url.starts_with("ldaps://") {
            return Err(crate::Error::Validation(
                "ldap.server_url must start with ldap:// or ldaps://".into(),
            ));
        }
        if self.bind_dn.is_empty() {
            return Err(crate::Error::Validation("ldap.bind_dn is required".into()));
        }
        if self.user_base_dn.is_empty() {
            return Err(crate::Error::Validation("ldap.user_base_dn is required".into()));
        }
        if !self.user_filter.contains("{email}") {
            return Err(crate::Error::Validation(
                "ldap.user_filter must contain the {email} placeholder".into(),
            ));
        }
        Ok(())
    }
}

/// RFC 4515 filter escaping for user-supplied values.
pub fn escape_filter_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '*' => out.push_str("\\2a"),
            '(' => out.push_str("\\28"),
            ')' => out.push_str("\\29"),
            '\\' => out.push_str("\\5c"),
            '\0' => out.push_str("\\00"),
            other => out.push(other),
        }
    }
    out
}

/// LDAP attribute names for profile fields
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryAttributes {
    #[serde(default = "default_uid_attr")]
    pub uid: String,

    #[serde(default = "default_email_attr")]
    pub email: String,

    #[serde(default = "default_given_name_attr")]
    pub given_name: String,

    #[serde(default = "default_surname_attr")]
    pub surname: String,

    #[serde(default = "default_member_of_attr")]
    pub member_of: String,
}

fn default_uid_attr() -> String {
    "uid".to_string()
}

fn default_email_attr() -> String {
    "mail".to_string()
}

fn default_given_name_attr() -> String {
    "givenName".to_string()
}

fn default_surname_attr() -> String {
    "sn".to_string()
}

fn default_member_of_attr() -> String {
    "memberOf".to_string()
}

impl Default for DirectoryAttributes {
    fn default() -> Self {
        Self {
            uid: default_uid_attr(),
            email: default_email_attr(),
            given_name: default_given_name_attr(),
            surname: default_surname_attr(),
            member_of: default_member_of_attr(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_allowed() {
        let auth = AuthConfig::default();
        assert!(auth.domain_allowed("a@sunrise.net"));
        assert!(auth.domain_allowed("a@SUNRISE.NET"));
        assert!(!auth.domain_allowed("a@elsewhere.org"));
        assert!(!auth.domain_allowed("not-an-email"));
        assert!(!auth.domain_allowed("@sunrise.net"));
    }

    #[test]
    fn test_user_filter_building() {
        let ldap = LdapSettings {
            user_filter: "(mail={email})".to_string(),
            ..Default::default()
        };
        assert_eq!(ldap.build_user_filter("a@sunrise.net"), "(mail=a@sunrise.net)");
        // Filter metacharacters in the email must not alter the filter.
        assert_eq!(
            ldap.build_user_filter("a*)(mail=*"),
            "(mail=a\\2a\\29\\28mail=\\2a)"
        );
    }

    #[test]
    fn test_ldap_validation() {
        let mut ldap = LdapSettings::default();
        ldap.enabled = true;
        ldap.server_url = String::new();
        assert!(ldap.validate().is_err());

        ldap.server_url = "ldap://directory.sunrise.net:389".to_string();
        ldap.bind_dn = "cn=service,dc=sunrise,dc=net".to_string();
        ldap.user_base_dn = "ou=people,dc=sunrise,dc=net".to_string();
        assert!(ldap.validate().is_ok());

        ldap.user_filter = "(mail=fixed)".to_string();
        assert!(ldap.validate().is_err());
    }

    #[test]
    fn test_config_validation_requires_secret() {
        let mut config = RekrutConfig::default();
        assert!(config.validate().is_err());

        config.session.secret = "0123456789abcdef0123456789abcdef".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_round_trip() {
        let toml = r#"
            [server]
            bind_address = "127.0.0.1"
            port = 9100
            request_timeout_secs = 10

            [session]
            secret = "0123456789abcdef0123456789abcdef"

            [ldap]
            enabled = true
            server_url = "ldaps://directory.sunrise.net:636"
            bind_dn = "cn=service,dc=sunrise,dc=net"
            bind_password = "secret"
            user_base_dn = "ou=people,dc=sunrise,dc=net"
            admin_group = "hr-admins"
            group_match = "substring"
        "#;

        let config: RekrutConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.ldap.admin_group, "hr-admins");
        assert_eq!(config.ldap.group_match, GroupMatch::Substring);
        assert_eq!(config.session.ttl_secs, crate::SESSION_TTL_SECS);
        assert!(config.validate().is_ok());
    }
}
