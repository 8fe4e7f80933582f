//! SMTP authentication mechanisms

use hmac::{Hmac, Mac};
use md5::Md5;

use super::{ServerInfo, SmtpError};

type HmacMd5 = Hmac<Md5>;

/// An SMTP authentication mechanism.
///
/// `start` picks the mechanism and optional initial response; `next` answers
/// each server challenge. `more` is true while the server expects another
/// response. Returning `None` from `next` ends the exchange.
pub trait Auth: Send + Sync {
    fn start(&self, server: &ServerInfo) -> Result<(String, Option<Vec<u8>>), SmtpError>;

    fn next(&self, from_server: &[u8], more: bool) -> Result<Option<Vec<u8>>, SmtpError>;
}

/// PLAIN authentication (RFC 4616)
#[derive(Debug, Clone)]
pub struct PlainAuth {
    identity: String,
    username: String,
    password: String,
    host: String,
}

/// PLAIN mechanism bound to `host`.
///
/// Credentials are only sent over TLS or to a localhost server, and only when
/// the server name matches `host`.
pub fn plain_auth(identity: &str, username: &str, password: &str, host: &str) -> PlainAuth {
    PlainAuth {
        identity: identity.to_string(),
        username: username.to_string(),
        password: password.to_string(),
        host: host.to_string(),
    }
}

fn is_localhost(name: &str) -> bool {
    matches!(name, "localhost" | "127.0.0.1" | "::1")
}

impl Auth for PlainAuth {
    fn start(&self, server: &ServerInfo) -> Result<(String, Option<Vec<u8>>), SmtpError> {
        if !server.tls && !is_localhost(&server.name) {
            return Err(SmtpError::UnencryptedConnection);
        }
        if server.name != self.host {
            return Err(SmtpError::WrongHost);
        }
        let resp = format!("{}\0{}\0{}", self.identity, self.username, self.password);
        Ok(("PLAIN".to_string(), Some(resp.into_bytes())))
    }

    fn next(&self, _from_server: &[u8], more: bool) -> Result<Option<Vec<u8>>, SmtpError> {
        if more {
            return Err(SmtpError::UnexpectedChallenge);
        }
        Ok(None)
    }
}

/// CRAM-MD5 authentication (RFC 2195)
#[derive(Debug, Clone)]
pub struct CramMd5Auth {
    username: String,
    secret: String,
}

pub fn cram_md5_auth(username: &str, secret: &str) -> CramMd5Auth {
    CramMd5Auth {
        username: username.to_string(),
        secret: secret.to_string(),
    }
}

impl Auth for CramMd5Auth {
    fn start(&self, _server: &ServerInfo) -> Result<(String, Option<Vec<u8>>), SmtpError> {
        Ok(("CRAM-MD5".to_string(), None))
    }

    fn next(&self, from_server: &[u8], more: bool) -> Result<Option<Vec<u8>>, SmtpError> {
        if !more {
            return Ok(None);
        }
        let mut mac = HmacMd5::new_from_slice(self.secret.as_bytes())
            .map_err(|e| SmtpError::External(e.to_string().into()))?;
        mac.update(from_server);
        let digest = hex::encode(mac.finalize().into_bytes());
        Ok(Some(format!("{} {}", self.username, digest).into_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(name: &str, tls: bool) -> ServerInfo {
        ServerInfo {
            name: name.to_string(),
            tls,
            auth: vec!["PLAIN".to_string()],
        }
    }

    #[test]
    fn test_plain_auth_over_tls() {
        let auth = plain_auth("", "foo", "bar", "servername");
        let (mech, resp) = auth.start(&server("servername", true)).unwrap();
        assert_eq!(mech, "PLAIN");
        assert_eq!(resp, Some(b"\0foo\0bar".to_vec()));
        assert_eq!(auth.next(b"", false).unwrap(), None);
        assert!(matches!(
            auth.next(b"", true),
            Err(SmtpError::UnexpectedChallenge)
        ));
    }

    #[test]
    fn test_plain_auth_refuses_unencrypted() {
        let auth = plain_auth("", "foo", "bar", "servername");
        assert!(matches!(
            auth.start(&server("servername", false)),
            Err(SmtpError::UnencryptedConnection)
        ));
    }

    #[test]
    fn test_plain_auth_localhost() {
        let auth = plain_auth("", "foo", "bar", "localhost");
        assert!(auth.start(&server("localhost", false)).is_ok());
    }

    #[test]
    fn test_plain_auth_wrong_host() {
        let auth = plain_auth("", "foo", "bar", "servername");
        let err = auth.start(&server("attacker", true)).unwrap_err();
        assert!(matches!(err, SmtpError::WrongHost));
        assert_eq!(err.to_string(), "wrong host name");
    }

    #[test]
    fn test_cram_md5_rfc2195() {
        let auth = cram_md5_auth("tim", "tanstaaftanstaaf");
        let (mech, resp) = auth.start(&ServerInfo::default()).unwrap();
        assert_eq!(mech, "CRAM-MD5");
        assert_eq!(resp, None);

        let reply = auth
            .next(b"<1896.697170952@postoffice.reston.mci.net>", true)
            .unwrap();
        assert_eq!(
            reply,
            Some(b"tim b913a602c7eda7a495b4e6e7334d3890".to_vec())
        );
        assert_eq!(auth.next(b"", false).unwrap(), None);
    }
}
