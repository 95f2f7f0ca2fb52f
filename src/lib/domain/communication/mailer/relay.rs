//! Relay connection settings shared by every send in a dispatch

use std::{fmt, str::FromStr, time::Duration};

use thiserror::Error;

use crate::domain::communication::email_addresses::EmailAddress;

/// Port on which relays expect TLS from the first byte
pub const IMPLICIT_TLS_PORT: u16 = 465;

/// Default relay host
pub const DEFAULT_HOST: &str = "smtp.gmail.com";

/// Default submission port
pub const DEFAULT_PORT: u16 = 587;

/// Default per-attempt timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// What to do when a relay on a non-implicit-TLS port cannot be upgraded with STARTTLS
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TlsPolicy {
    /// Upgrade when the relay offers STARTTLS, otherwise continue in plaintext
    Opportunistic,

    /// Fail the send unless the session is encrypted
    #[default]
    Required,
}

/// Unrecognised TLS policy name
#[derive(Debug, Error)]
#[error("unknown TLS policy \"{0}\", expected \"opportunistic\" or \"required\"")]
pub struct ParseTlsPolicyError(String);

impl FromStr for TlsPolicy {
    type Err = ParseTlsPolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "opportunistic" => Ok(Self::Opportunistic),
            "required" => Ok(Self::Required),
            other => Err(ParseTlsPolicyError(other.to_string())),
        }
    }
}

impl fmt::Display for TlsPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Opportunistic => write!(f, "opportunistic"),
            Self::Required => write!(f, "required"),
        }
    }
}

/// The sender's relay password. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wrap a secret
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// The secret itself
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

/// Transport tuning that is not part of the sender's identity
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelayOptions {
    /// STARTTLS downgrade policy
    pub tls: TlsPolicy,

    /// Upper bound for a single connect-authenticate-send attempt
    pub timeout: Duration,

    /// Verify the relay's certificate
    pub verify_certificates: bool,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            tls: TlsPolicy::default(),
            timeout: DEFAULT_TIMEOUT,
            verify_certificates: true,
        }
    }
}

/// Everything needed to open an authenticated session with the relay.
///
/// Built once per dispatch and shared read-only by every send.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelayConfig {
    host: String,
    port: u16,
    sender: EmailAddress,
    credential: Credential,
    options: RelayOptions,
}

impl RelayConfig {
    /// Create relay settings
    pub fn new(
        host: impl Into<String>,
        port: u16,
        sender: EmailAddress,
        credential: Credential,
        options: RelayOptions,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            sender,
            credential,
            options,
        }
    }

    /// Relay host name
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Relay port
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Sender address, also used as the login name
    pub fn sender(&self) -> &EmailAddress {
        &self.sender
    }

    /// Sender password
    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    /// Transport tuning
    pub fn options(&self) -> &RelayOptions {
        &self.options
    }

    /// Whether the connection is encrypted from the start rather than upgraded
    pub fn implicit_tls(&self) -> bool {
        self.port == IMPLICIT_TLS_PORT
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    #[test]
    fn test_credential_display_obfuscates() {
        let credential = Credential::new("app-password");

        assert_eq!(format!("{}", credential), "********");
        assert_eq!(format!("{:?}", credential), "********");
        assert_eq!(credential.expose(), "app-password");
    }

    #[test]
    fn test_relay_config_debug_hides_credential() -> TestResult {
        let relay = RelayConfig::new(
            "smtp.example.com",
            587,
            EmailAddress::new("sender@example.com")?,
            Credential::new("hunter2"),
            RelayOptions::default(),
        );

        assert!(!format!("{:?}", relay).contains("hunter2"));

        Ok(())
    }

    #[test]
    fn test_implicit_tls_only_on_465() -> TestResult {
        let sender = EmailAddress::new("sender@example.com")?;
        let relay = |port| {
            RelayConfig::new(
                "smtp.example.com",
                port,
                sender.clone(),
                Credential::new("secret"),
                RelayOptions::default(),
            )
        };

        assert!(relay(465).implicit_tls());
        assert!(!relay(587).implicit_tls());
        assert!(!relay(25).implicit_tls());

        Ok(())
    }

    #[test]
    fn test_tls_policy_from_str() -> TestResult {
        assert_eq!("required".parse::<TlsPolicy>()?, TlsPolicy::Required);
        assert_eq!(" Opportunistic ".parse::<TlsPolicy>()?, TlsPolicy::Opportunistic);
        assert!("sometimes".parse::<TlsPolicy>().is_err());
        assert_eq!(TlsPolicy::default().to_string(), "required");

        Ok(())
    }
}
