//! SMTP client session

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;

use super::{Auth, ServerInfo, SmtpError};

/// Any bidirectional byte stream a client can run over
pub trait Conn: Read + Write + Send {}

impl<T: Read + Write + Send> Conn for T {}

/// An SMTP client session over one connection.
///
/// Commands that need the server's extensions send EHLO (falling back to
/// HELO) on first use.
pub struct Client {
    /// `None` once the session is closed
    conn: Option<BufReader<Box<dyn Conn>>>,
    server_name: String,
    local_name: String,
    tls: bool,
    ext: Option<HashMap<String, String>>,
    auth: Vec<String>,
    did_hello: bool,
}

impl Client {
    /// Start a session on an established connection.
    ///
    /// Reads the server greeting; `host` is the server name used for
    /// authentication checks.
    pub fn new(conn: impl Conn + 'static, host: &str) -> Result<Self, SmtpError> {
        let mut client = Self {
            conn: Some(BufReader::new(Box::new(conn))),
            server_name: host.to_string(),
            local_name: "localhost".to_string(),
            tls: false,
            ext: None,
            auth: Vec::new(),
            did_hello: false,
        };
        client.read_response(220)?;
        Ok(client)
    }

    /// Server name given at construction
    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// Send EHLO/HELO with `local_name` instead of `localhost`.
    ///
    /// Only valid before any other command.
    pub fn hello(&mut self, local_name: &str) -> Result<(), SmtpError> {
        validate_line(local_name)?;
        if self.did_hello {
            return Err(SmtpError::HelloAfterCommands);
        }
        self.local_name = local_name.to_string();
        self.ensure_hello()
    }

    /// Whether the server advertises `ext`, with its parameters
    pub fn extension(&mut self, ext: &str) -> Result<Option<String>, SmtpError> {
        self.ensure_hello()?;
        let ext = ext.to_ascii_uppercase();
        Ok(self
            .ext
            .as_ref()
            .and_then(|map| map.get(&ext))
            .cloned())
    }

    /// Authenticate with `mechanism`.
    ///
    /// A failed exchange cancels the AUTH command and closes the session.
    pub fn auth(&mut self, mechanism: &dyn Auth) -> Result<(), SmtpError> {
        self.ensure_hello()?;
        let info = ServerInfo {
            name: self.server_name.clone(),
            tls: self.tls,
            auth: self.auth.clone(),
        };
        let (mech, resp) = match mechanism.start(&info) {
            Ok(started) => started,
            Err(e) => {
                let _ = self.quit();
                return Err(e);
            }
        };
        let resp64 = resp.map(|r| B64.encode(r)).unwrap_or_default();
        let command = format!("AUTH {} {}", mech, resp64);
        let mut reply = self.cmd(0, command.trim());

        loop {
            let (code, msg64) = reply?;
            let step = match code {
                334 => B64.decode(msg64.as_bytes()).map_err(SmtpError::from),
                235 => Ok(msg64.into_bytes()),
                _ => Err(SmtpError::Protocol {
                    code,
                    message: msg64,
                }),
            }
            .and_then(|challenge| mechanism.next(&challenge, code == 334));

            match step {
                Ok(None) => return Ok(()),
                Ok(Some(resp)) => reply = self.cmd(0, &B64.encode(resp)),
                Err(e) => {
                    tracing::debug!(server = %self.server_name, mech = %mech, error = %e, "auth failed");
                    let _ = self.cmd(501, "*");
                    let _ = self.quit();
                    return Err(e);
                }
            }
        }
    }

    /// Start a mail transaction from `from`
    pub fn mail(&mut self, from: &str) -> Result<(), SmtpError> {
        validate_line(from)?;
        self.ensure_hello()?;
        let mut command = format!("MAIL FROM:<{}>", from);
        if self
            .ext
            .as_ref()
            .is_some_and(|ext| ext.contains_key("8BITMIME"))
        {
            command.push_str(" BODY=8BITMIME");
        }
        self.cmd(250, &command)?;
        Ok(())
    }

    /// Add a recipient
    pub fn rcpt(&mut self, to: &str) -> Result<(), SmtpError> {
        validate_line(to)?;
        self.cmd(25, &format!("RCPT TO:<{}>", to))?;
        Ok(())
    }

    /// Send the message body.
    ///
    /// Line endings are normalised to CRLF and leading dots are doubled.
    pub fn data(&mut self, body: &[u8]) -> Result<(), SmtpError> {
        self.cmd(354, "DATA")?;
        let encoded = dot_encode(body);
        let stream = self.stream()?;
        stream.write_all(&encoded)?;
        stream.write_all(b".\r\n")?;
        stream.flush()?;
        self.read_response(250)?;
        Ok(())
    }

    /// Abort the current mail transaction
    pub fn reset(&mut self) -> Result<(), SmtpError> {
        self.ensure_hello()?;
        self.cmd(250, "RSET")?;
        Ok(())
    }

    pub fn noop(&mut self) -> Result<(), SmtpError> {
        self.ensure_hello()?;
        self.cmd(250, "NOOP")?;
        Ok(())
    }

    /// Check the validity of an address on the server
    pub fn verify(&mut self, addr: &str) -> Result<(), SmtpError> {
        validate_line(addr)?;
        self.ensure_hello()?;
        self.cmd(250, &format!("VRFY {}", addr))?;
        Ok(())
    }

    /// Send QUIT and close the session
    pub fn quit(&mut self) -> Result<(), SmtpError> {
        self.ensure_hello()?;
        self.cmd(221, "QUIT")?;
        self.close()
    }

    /// Close the session without QUIT, dropping the connection
    pub fn close(&mut self) -> Result<(), SmtpError> {
        match self.conn.take() {
            Some(mut conn) => Ok(conn.get_mut().flush()?),
            None => Ok(()),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.conn.is_none()
    }

    fn ensure_hello(&mut self) -> Result<(), SmtpError> {
        if self.did_hello {
            return Ok(());
        }
        if let Err(e) = self.ehlo() {
            tracing::debug!(server = %self.server_name, error = %e, "EHLO refused, trying HELO");
            self.helo()?;
        }
        self.did_hello = true;
        Ok(())
    }

    fn ehlo(&mut self) -> Result<(), SmtpError> {
        let (_, msg) = self.cmd(250, &format!("EHLO {}", self.local_name))?;
        let mut ext = HashMap::new();
        for line in msg.lines().skip(1) {
            let (key, params) = line.split_once(' ').unwrap_or((line, ""));
            ext.insert(key.to_string(), params.to_string());
        }
        if let Some(mechs) = ext.get("AUTH") {
            self.auth = mechs.split(' ').map(str::to_string).collect();
        }
        self.ext = Some(ext);
        Ok(())
    }

    fn helo(&mut self) -> Result<(), SmtpError> {
        self.ext = None;
        self.cmd(250, &format!("HELO {}", self.local_name))?;
        Ok(())
    }

    fn reader(&mut self) -> Result<&mut BufReader<Box<dyn Conn>>, SmtpError> {
        self.conn
            .as_mut()
            .ok_or_else(|| SmtpError::Io(std::io::ErrorKind::NotConnected.into()))
    }

    fn stream(&mut self) -> Result<&mut Box<dyn Conn>, SmtpError> {
        Ok(self.reader()?.get_mut())
    }

    /// Send one command line and read the reply
    fn cmd(&mut self, expect: u16, line: &str) -> Result<(u16, String), SmtpError> {
        tracing::trace!(server = %self.server_name, command = line, "smtp >");
        let stream = self.stream()?;
        stream.write_all(line.as_bytes())?;
        stream.write_all(b"\r\n")?;
        stream.flush()?;
        self.read_response(expect)
    }

    /// Read a possibly multi-line reply and check its code against `expect`.
    ///
    /// `expect` of 0 accepts any code; one or two digits match a code prefix.
    fn read_response(&mut self, expect: u16) -> Result<(u16, String), SmtpError> {
        let mut message = String::new();
        loop {
            let mut line = String::new();
            if self.reader()?.read_line(&mut line)? == 0 {
                return Err(SmtpError::Io(std::io::ErrorKind::UnexpectedEof.into()));
            }
            let line = line.trim_end_matches(['\r', '\n']);
            let (code, more, text) = parse_reply_line(line)?;
            if !message.is_empty() {
                message.push('\n');
            }
            message.push_str(text);
            if !more {
                tracing::trace!(server = %self.server_name, code, "smtp <");
                return if code_matches(code, expect) {
                    Ok((code, message))
                } else {
                    Err(SmtpError::Protocol { code, message })
                };
            }
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("server_name", &self.server_name)
            .field("tls", &self.tls)
            .field("auth", &self.auth)
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn parse_reply_line(line: &str) -> Result<(u16, bool, &str), SmtpError> {
    let malformed = || SmtpError::MalformedReply(line.to_string());
    let digits = line.get(..3).ok_or_else(malformed)?;
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed());
    }
    let code: u16 = digits.parse().map_err(|_| malformed())?;
    match line.as_bytes().get(3) {
        None => Ok((code, false, "")),
        Some(b' ') => Ok((code, false, &line[4..])),
        Some(b'-') => Ok((code, true, &line[4..])),
        Some(_) => Err(malformed()),
    }
}

fn code_matches(code: u16, expect: u16) -> bool {
    match expect {
        0 => true,
        1..=9 => code / 100 == expect,
        10..=99 => code / 10 == expect,
        _ => code == expect,
    }
}

fn validate_line(line: &str) -> Result<(), SmtpError> {
    if line.contains(['\r', '\n']) {
        return Err(SmtpError::InvalidLine);
    }
    Ok(())
}

fn dot_encode(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + 8);
    if body.is_empty() {
        return out;
    }
    let body = body.strip_suffix(b"\n").unwrap_or(body);
    for line in body.split(|&b| b == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.first() == Some(&b'.') {
            out.push(b'.');
        }
        out.extend_from_slice(line);
        out.extend_from_slice(b"\r\n");
    }
    out
}

/// Connect to the SMTP server at `addr` (`host:port`)
pub fn dial(addr: &str) -> Result<Client, SmtpError> {
    let stream = TcpStream::connect(addr)?;
    let host = addr
        .rsplit_once(':')
        .map_or(addr, |(host, _)| host)
        .trim_start_matches('[')
        .trim_end_matches(']');
    tracing::debug!(addr, "smtp connected");
    Client::new(stream, host)
}

/// Connect to `addr`, authenticate if `auth` is given, and send one message
pub fn send_mail(
    addr: &str,
    auth: Option<&dyn Auth>,
    from: &str,
    to: &[String],
    msg: &[u8],
) -> Result<(), SmtpError> {
    validate_line(from)?;
    for recipient in to {
        validate_line(recipient)?;
    }
    let mut client = dial(addr)?;
    deliver(&mut client, auth, from, to, msg)
}

/// Run one delivery on an open session, ending it with QUIT
pub(crate) fn deliver(
    client: &mut Client,
    auth: Option<&dyn Auth>,
    from: &str,
    to: &[String],
    msg: &[u8],
) -> Result<(), SmtpError> {
    client.ensure_hello()?;
    if let Some(mechanism) = auth {
        if client.ext.is_some() {
            if client.extension("AUTH")?.is_none() {
                return Err(SmtpError::NoAuth);
            }
            client.auth(mechanism)?;
        }
    }
    client.mail(from)?;
    for recipient in to {
        client.rcpt(recipient)?;
    }
    client.data(msg)?;
    client.quit()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mail::{cram_md5_auth, plain_auth};
    use parking_lot::Mutex;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    /// Connection replaying canned server replies and recording client output
    struct Scripted {
        replies: Cursor<Vec<u8>>,
        sent: Arc<Mutex<Vec<u8>>>,
    }

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.replies.read(buf)
        }
    }

    impl Write for Scripted {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.sent.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn scripted(replies: &str) -> (Scripted, Arc<Mutex<Vec<u8>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let conn = Scripted {
            replies: Cursor::new(replies.replace('\n', "\r\n").into_bytes()),
            sent: Arc::clone(&sent),
        };
        (conn, sent)
    }

    fn sent_text(sent: &Arc<Mutex<Vec<u8>>>) -> String {
        String::from_utf8_lossy(&sent.lock()).into_owned()
    }

    const GREETING_EHLO: &str = "220 mx.example.com ESMTP\n\
250-mx.example.com\n\
250-8BITMIME\n\
250-AUTH PLAIN CRAM-MD5\n\
250 SIZE 1024\n";

    #[test]
    fn test_ehlo_extensions() {
        let (conn, sent) = scripted(GREETING_EHLO);
        let mut client = Client::new(conn, "mx.example.com").unwrap();

        assert_eq!(client.extension("auth").unwrap(), Some("PLAIN CRAM-MD5".to_string()));
        assert_eq!(client.extension("SIZE").unwrap(), Some("1024".to_string()));
        assert_eq!(client.extension("STARTTLS").unwrap(), None);
        assert_eq!(sent_text(&sent), "EHLO localhost\r\n");
    }

    #[test]
    fn test_helo_fallback() {
        let (conn, sent) = scripted("220 old.example.com\n500 what\n250 hi\n");
        let mut client = Client::new(conn, "old.example.com").unwrap();
        assert_eq!(client.extension("AUTH").unwrap(), None);
        assert_eq!(sent_text(&sent), "EHLO localhost\r\nHELO localhost\r\n");
    }

    #[test]
    fn test_hello_after_commands() {
        let (conn, _) = scripted(GREETING_EHLO);
        let mut client = Client::new(conn, "mx.example.com").unwrap();
        client.extension("AUTH").unwrap();
        assert!(matches!(
            client.hello("client.example.com"),
            Err(SmtpError::HelloAfterCommands)
        ));
    }

    #[test]
    fn test_cram_md5_exchange() {
        let script = format!(
            "{}334 {}\n235 2.7.0 Authentication successful\n",
            GREETING_EHLO,
            B64.encode("<1896.697170952@postoffice.reston.mci.net>")
        );
        let (conn, sent) = scripted(&script);
        let mut client = Client::new(conn, "mx.example.com").unwrap();
        client.auth(&cram_md5_auth("tim", "tanstaaftanstaaf")).unwrap();

        let expected = format!(
            "EHLO localhost\r\nAUTH CRAM-MD5\r\n{}\r\n",
            B64.encode("tim b913a602c7eda7a495b4e6e7334d3890")
        );
        assert_eq!(sent_text(&sent), expected);
    }

    #[test]
    fn test_auth_failure_cancels_and_quits() {
        let script = format!(
            "{}535 5.7.8 bad credentials\n501 cancelled\n221 bye\n",
            GREETING_EHLO
        );
        let (conn, sent) = scripted(&script);
        let mut client = Client::new(conn, "localhost").unwrap();
        let err = client.auth(&plain_auth("", "u", "p", "localhost")).unwrap_err();

        match err {
            SmtpError::Protocol { code, message } => {
                assert_eq!(code, 535);
                assert_eq!(message, "5.7.8 bad credentials");
            }
            other => panic!("expected protocol error, got {:?}", other),
        }
        let text = sent_text(&sent);
        assert!(text.ends_with("*\r\nQUIT\r\n"));
        assert!(client.is_closed());
    }

    #[test]
    fn test_full_delivery() {
        let script = format!(
            "{}250 ok\n250 ok\n250 ok\n354 go ahead\n250 queued\n221 bye\n",
            GREETING_EHLO
        );
        let (conn, sent) = scripted(&script);
        let mut client = Client::new(conn, "mx.example.com").unwrap();
        deliver(
            &mut client,
            None,
            "alice@example.com",
            &["bob@example.com".to_string(), "carol@example.com".to_string()],
            b"Subject: hi\n\n.hidden\nbye\n",
        )
        .unwrap();

        let text = sent_text(&sent);
        assert!(text.contains("MAIL FROM:<alice@example.com> BODY=8BITMIME\r\n"));
        assert!(text.contains("RCPT TO:<bob@example.com>\r\nRCPT TO:<carol@example.com>\r\n"));
        assert!(text.contains("DATA\r\nSubject: hi\r\n\r\n..hidden\r\nbye\r\n.\r\nQUIT\r\n"));
        assert!(client.is_closed());
    }

    #[test]
    fn test_rejected_recipient() {
        let script = format!("{}250 ok\n550 no such user\n", GREETING_EHLO);
        let (conn, _) = scripted(&script);
        let mut client = Client::new(conn, "mx.example.com").unwrap();
        client.mail("alice@example.com").unwrap();
        let err = client.rcpt("nobody@example.com").unwrap_err();
        assert_eq!(err.to_string(), "550 no such user");
    }

    #[test]
    fn test_invalid_lines_rejected() {
        let (conn, sent) = scripted(GREETING_EHLO);
        let mut client = Client::new(conn, "mx.example.com").unwrap();
        assert!(matches!(
            client.mail("alice@example.com\r\nRCPT TO:<x>"),
            Err(SmtpError::InvalidLine)
        ));
        assert!(sent_text(&sent).is_empty());
    }

    #[test]
    fn test_bad_greeting() {
        let (conn, _) = scripted("554 go away\n");
        assert!(matches!(
            Client::new(conn, "mx.example.com"),
            Err(SmtpError::Protocol { code: 554, .. })
        ));
        let (conn, _) = scripted("hello\n");
        assert!(matches!(
            Client::new(conn, "mx.example.com"),
            Err(SmtpError::MalformedReply(_))
        ));
    }

    #[test]
    fn test_closed_session() {
        let (conn, _) = scripted(GREETING_EHLO);
        let mut client = Client::new(conn, "mx.example.com").unwrap();
        client.close().unwrap();
        assert!(matches!(client.noop(), Err(SmtpError::Io(_))));
        client.close().unwrap();
    }

    /// Connection that records when it is dropped
    struct Tracked {
        inner: Scripted,
        dropped: Arc<AtomicBool>,
    }

    impl Read for Tracked {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.inner.read(buf)
        }
    }

    impl Write for Tracked {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.inner.write(buf)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.inner.flush()
        }
    }

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_close_drops_connection() {
        let (inner, _) = scripted(GREETING_EHLO);
        let dropped = Arc::new(AtomicBool::new(false));
        let conn = Tracked {
            inner,
            dropped: Arc::clone(&dropped),
        };
        let mut client = Client::new(conn, "mx.example.com").unwrap();
        assert!(!dropped.load(Ordering::SeqCst));

        client.close().unwrap();
        assert!(dropped.load(Ordering::SeqCst));
        assert!(client.is_closed());
    }

    #[test]
    fn test_code_matching() {
        assert!(code_matches(251, 25));
        assert!(code_matches(334, 0));
        assert!(code_matches(220, 2));
        assert!(!code_matches(550, 25));
        assert!(!code_matches(251, 250));
    }

    #[test]
    fn test_dot_encode() {
        assert_eq!(dot_encode(b"a\n.b\r\nc"), b"a\r\n..b\r\nc\r\n".to_vec());
        assert_eq!(dot_encode(b""), Vec::<u8>::new());
    }
}
