//! Gmail IMAP client for checking mail sent by the site under test.
//!
//! The transport sits behind [`ImapConnector`] so the login dance can be
//! tested without a server; the `email` feature adds [`TlsImapConnector`].
//! Calls are blocking. From async tests run them inside
//! `tokio::task::spawn_blocking`.
//!
//! ## Example
//!
//! ```ignore
//! let connector = Arc::new(TlsImapConnector);
//! let mut gmail = GmailImapClient::connect(connector, "testing+566b@domain.com", "secret")?;
//! let messages = retry(5, |e: &PageflowError| e.is_transient(), || {
//!     gmail.gmail_search("from:info@site.test is:unread")
//! })?;
//! ```

use crate::config::PageflowConfig;
use crate::result::{PageflowError, PageflowResult};
use chrono::{DateTime, Duration, Utc};
use mailparse::{MailHeaderMap, ParsedMail};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Mailbox selected after every login
pub const INBOX: &str = "INBOX";

// ============================================================================
// Transport seam
// ============================================================================

/// Opens connections to an IMAP server
pub trait ImapConnector: Send + Sync + fmt::Debug {
    /// Connect over TLS to `host:port`
    fn connect(&self, host: &str, port: u16) -> PageflowResult<Box<dyn ImapConnection>>;
}

/// A connection that has not logged in yet
pub trait ImapConnection: Send {
    /// Authenticate, consuming the connection
    fn login(self: Box<Self>, user: &str, password: &str) -> PageflowResult<Box<dyn ImapSession>>;
}

/// An authenticated IMAP session using UIDs
pub trait ImapSession: Send {
    /// Select a mailbox
    fn select(&mut self, mailbox: &str) -> PageflowResult<()>;

    /// Standard IMAP search
    fn search(&mut self, criteria: &str) -> PageflowResult<Vec<u32>>;

    /// Search with Gmail query syntax (`X-GM-RAW`)
    fn gmail_search(&mut self, query: &str) -> PageflowResult<Vec<u32>>;

    /// Raw RFC822 bytes of each message
    fn fetch_rfc822(&mut self, uids: &[u32]) -> PageflowResult<Vec<Vec<u8>>>;

    /// Flag messages as deleted
    fn delete(&mut self, uids: &[u32]) -> PageflowResult<()>;

    /// Remove deleted messages
    fn expunge(&mut self) -> PageflowResult<()>;

    /// End the session
    fn logout(&mut self) -> PageflowResult<()>;
}

// ============================================================================
// Messages
// ============================================================================

/// A fetched message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    subject: Option<String>,
    from: Option<String>,
    to: Option<String>,
    body: String,
    parts: Vec<String>,
}

impl EmailMessage {
    /// Parse raw RFC822 bytes
    pub fn parse(raw: &[u8]) -> PageflowResult<Self> {
        let mail = mailparse::parse_mail(raw).map_err(|e| PageflowError::email(e.to_string()))?;
        let mut parts = Vec::new();
        collect_parts(&mail, &mut parts)?;
        let body = if mail.subparts.is_empty() {
            mail.get_body().map_err(|e| PageflowError::email(e.to_string()))?
        } else {
            first_text_part(&mail)?.unwrap_or_default()
        };
        Ok(Self {
            subject: mail.headers.get_first_value("Subject"),
            from: mail.headers.get_first_value("From"),
            to: mail.headers.get_first_value("To"),
            body,
            parts,
        })
    }

    /// `Subject` header
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    /// `From` header
    #[must_use]
    pub fn from(&self) -> Option<&str> {
        self.from.as_deref()
    }

    /// `To` header
    #[must_use]
    pub fn to(&self) -> Option<&str> {
        self.to.as_deref()
    }

    /// Text body, the first `text/plain` part for multipart mail
    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Bodies of every MIME part below the root, depth first
    #[must_use]
    pub fn parts(&self) -> &[String] {
        &self.parts
    }
}

fn collect_parts(mail: &ParsedMail<'_>, out: &mut Vec<String>) -> PageflowResult<()> {
    for part in &mail.subparts {
        out.push(part.get_body().map_err(|e| PageflowError::email(e.to_string()))?);
        collect_parts(part, out)?;
    }
    Ok(())
}

fn first_text_part(mail: &ParsedMail<'_>) -> PageflowResult<Option<String>> {
    for part in &mail.subparts {
        if part.subparts.is_empty() && part.ctype.mimetype.eq_ignore_ascii_case("text/plain") {
            return part
                .get_body()
                .map(Some)
                .map_err(|e| PageflowError::email(e.to_string()));
        }
        if let Some(body) = first_text_part(part)? {
            return Ok(Some(body));
        }
    }
    Ok(None)
}

/// Bodies of every part of every message, excluding each root
#[must_use]
pub fn email_bodies(emails: &[EmailMessage]) -> Vec<String> {
    emails.iter().flat_map(|m| m.parts.iter().cloned()).collect()
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// IMAP search criteria for a sender, recipient, subject and start date
#[must_use]
pub fn search_criteria(from: &str, to: &str, subject: &str, since: DateTime<Utc>) -> String {
    format!(
        "FROM {} TO {} SUBJECT {} SINCE {}",
        quote(from),
        quote(to),
        quote(subject),
        since.format("%d-%b-%Y")
    )
}

// ============================================================================
// Gmail client
// ============================================================================

/// IMAP client with the reconnects Gmail needs
pub struct GmailImapClient {
    connector: Arc<dyn ImapConnector>,
    host: String,
    port: u16,
    email_address: String,
    password: String,
    session: Box<dyn ImapSession>,
    messages_for_this_session: Vec<u32>,
}

impl fmt::Debug for GmailImapClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GmailImapClient")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("email_address", &self.email_address)
            .field("messages_for_this_session", &self.messages_for_this_session)
            .finish_non_exhaustive()
    }
}

impl GmailImapClient {
    /// Log in to `imap.gmail.com:993` and select the inbox
    pub fn connect(
        connector: Arc<dyn ImapConnector>,
        email_address: &str,
        password: &str,
    ) -> PageflowResult<Self> {
        Self::connect_with(connector, &PageflowConfig::default(), email_address, password)
    }

    /// Log in to the server named by `config` and select the inbox
    pub fn connect_with(
        connector: Arc<dyn ImapConnector>,
        config: &PageflowConfig,
        email_address: &str,
        password: &str,
    ) -> PageflowResult<Self> {
        let session = open_session(
            connector.as_ref(),
            &config.imap_host,
            config.imap_port,
            email_address,
            password,
        )?;
        info!(host = %config.imap_host, user = email_address, "imap session opened");
        Ok(Self {
            connector,
            host: config.imap_host.clone(),
            port: config.imap_port,
            email_address: email_address.to_string(),
            password: password.to_string(),
            session,
            messages_for_this_session: Vec::new(),
        })
    }

    /// UIDs returned by Gmail searches so far
    #[must_use]
    pub fn messages_for_this_session(&self) -> &[u32] {
        &self.messages_for_this_session
    }

    /// Messages matching sender, recipient and subject
    ///
    /// `since` defaults to one minute ago.
    pub fn search(
        &mut self,
        from: &str,
        to: &str,
        subject: &str,
        since: Option<DateTime<Utc>>,
    ) -> PageflowResult<Vec<EmailMessage>> {
        let since = since.unwrap_or_else(|| Utc::now() - Duration::minutes(1));
        let criteria = search_criteria(from, to, subject, since);
        let uids = self.session.search(&criteria)?;
        debug!(%criteria, found = uids.len(), "imap search");
        self.emails_from_messages(&uids)
    }

    /// Messages matching a Gmail query such as `from:a@b.c is:unread`
    ///
    /// Gmail caches search results per connection, so the search runs on a
    /// fresh connection and the fetch on another.
    pub fn gmail_search(&mut self, query: &str) -> PageflowResult<Vec<EmailMessage>> {
        self.reconnect()?;
        let uids = self.session.gmail_search(query)?;
        debug!(query, found = uids.len(), "gmail search");
        self.messages_for_this_session.extend(&uids);
        self.reconnect()?;
        self.emails_from_messages(&uids)
    }

    /// Delete every message found by [`Self::gmail_search`]
    pub fn delete_seen_messages(&mut self) -> PageflowResult<()> {
        if !self.messages_for_this_session.is_empty() {
            self.session.delete(&self.messages_for_this_session)?;
        }
        self.session.expunge()?;
        info!(count = self.messages_for_this_session.len(), "deleted seen messages");
        self.messages_for_this_session.clear();
        Ok(())
    }

    /// Log out of the current session
    pub fn logout(mut self) -> PageflowResult<()> {
        self.session.logout()
    }

    /// Swap in a fresh session; the old one stays live if that fails
    fn reconnect(&mut self) -> PageflowResult<()> {
        debug!(host = %self.host, "reconnecting to imap");
        let fresh = open_session(
            self.connector.as_ref(),
            &self.host,
            self.port,
            &self.email_address,
            &self.password,
        )?;
        let mut old = std::mem::replace(&mut self.session, fresh);
        if let Err(e) = old.logout() {
            warn!(host = %self.host, error = %e, "previous imap session did not log out");
        }
        Ok(())
    }

    fn emails_from_messages(&mut self, uids: &[u32]) -> PageflowResult<Vec<EmailMessage>> {
        if uids.is_empty() {
            return Ok(Vec::new());
        }
        self.session
            .fetch_rfc822(uids)?
            .iter()
            .map(|raw| EmailMessage::parse(raw))
            .collect()
    }
}

fn open_session(
    connector: &dyn ImapConnector,
    host: &str,
    port: u16,
    user: &str,
    password: &str,
) -> PageflowResult<Box<dyn ImapSession>> {
    let mut session = connector.connect(host, port)?.login(user, password)?;
    session.select(INBOX)?;
    Ok(session)
}

// ============================================================================
// Mock transport
// ============================================================================

#[derive(Debug, Default)]
struct MockMailbox {
    calls: Vec<String>,
    messages: BTreeMap<u32, Vec<u8>>,
    search_results: Vec<u32>,
    gmail_results: Vec<u32>,
    failing_connects: u32,
}

/// In-memory IMAP server recording every call
#[derive(Debug, Clone, Default)]
pub struct MockImapConnector {
    mailbox: Arc<Mutex<MockMailbox>>,
}

impl MockImapConnector {
    /// Create an empty mailbox
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockMailbox> {
        self.mailbox.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a raw message under `uid`
    pub fn add_message(&self, uid: u32, raw: impl Into<Vec<u8>>) {
        let _ = self.lock().messages.insert(uid, raw.into());
    }

    /// UIDs every standard search returns
    pub fn set_search_results(&self, uids: Vec<u32>) {
        self.lock().search_results = uids;
    }

    /// UIDs every Gmail search returns
    pub fn set_gmail_results(&self, uids: Vec<u32>) {
        self.lock().gmail_results = uids;
    }

    /// Make the next `n` connects fail
    pub fn fail_next_connects(&self, n: u32) {
        self.lock().failing_connects = n;
    }

    /// Calls made so far, e.g. `login:user`, `select:INBOX`, `logout`
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Number of calls starting with `prefix`
    #[must_use]
    pub fn count(&self, prefix: &str) -> usize {
        self.lock().calls.iter().filter(|c| c.starts_with(prefix)).count()
    }

    /// UIDs still in the mailbox
    #[must_use]
    pub fn remaining(&self) -> Vec<u32> {
        self.lock().messages.keys().copied().collect()
    }

    fn record(&self, call: String) {
        self.lock().calls.push(call);
    }
}

impl ImapConnector for MockImapConnector {
    fn connect(&self, host: &str, port: u16) -> PageflowResult<Box<dyn ImapConnection>> {
        let mut mailbox = self.lock();
        mailbox.calls.push(format!("connect:{host}:{port}"));
        if mailbox.failing_connects > 0 {
            mailbox.failing_connects -= 1;
            return Err(PageflowError::email("connection reset by peer"));
        }
        Ok(Box::new(MockSession {
            server: self.clone(),
            deleted: Vec::new(),
            logged_out: false,
        }))
    }
}

#[derive(Debug)]
struct MockSession {
    server: MockImapConnector,
    deleted: Vec<u32>,
    logged_out: bool,
}

fn uid_list(uids: &[u32]) -> String {
    uids.iter().map(u32::to_string).collect::<Vec<_>>().join(",")
}

impl ImapConnection for MockSession {
    fn login(self: Box<Self>, user: &str, _password: &str) -> PageflowResult<Box<dyn ImapSession>> {
        self.server.record(format!("login:{user}"));
        Ok(self)
    }
}

impl ImapSession for MockSession {
    fn select(&mut self, mailbox: &str) -> PageflowResult<()> {
        self.server.record(format!("select:{mailbox}"));
        Ok(())
    }

    fn search(&mut self, criteria: &str) -> PageflowResult<Vec<u32>> {
        self.server.record(format!("search:{criteria}"));
        Ok(self.server.lock().search_results.clone())
    }

    fn gmail_search(&mut self, query: &str) -> PageflowResult<Vec<u32>> {
        self.server.record(format!("gmail_search:{query}"));
        Ok(self.server.lock().gmail_results.clone())
    }

    fn fetch_rfc822(&mut self, uids: &[u32]) -> PageflowResult<Vec<Vec<u8>>> {
        self.server.record(format!("fetch:{}", uid_list(uids)));
        let mailbox = self.server.lock();
        Ok(uids
            .iter()
            .filter_map(|uid| mailbox.messages.get(uid).cloned())
            .collect())
    }

    fn delete(&mut self, uids: &[u32]) -> PageflowResult<()> {
        self.server.record(format!("delete:{}", uid_list(uids)));
        self.deleted.extend(uids);
        Ok(())
    }

    fn expunge(&mut self) -> PageflowResult<()> {
        self.server.record("expunge".to_string());
        let mut mailbox = self.server.lock();
        for uid in self.deleted.drain(..) {
            let _ = mailbox.messages.remove(&uid);
        }
        Ok(())
    }

    fn logout(&mut self) -> PageflowResult<()> {
        self.server.record("logout".to_string());
        if self.logged_out {
            return Err(PageflowError::email("broken pipe"));
        }
        self.logged_out = true;
        Ok(())
    }
}

// ============================================================================
// TLS transport
// ============================================================================

#[cfg(feature = "email")]
pub use tls::TlsImapConnector;

#[cfg(feature = "email")]
mod tls {
    use super::{quote, uid_list, ImapConnection, ImapConnector, ImapSession};
    use crate::result::{PageflowError, PageflowResult};
    use native_tls::{TlsConnector, TlsStream};
    use std::fmt;
    use std::net::TcpStream;

    fn email_error(e: impl fmt::Display) -> PageflowError {
        PageflowError::email(e.to_string())
    }

    /// IMAP over TLS using the `imap` crate
    #[derive(Debug, Default, Clone, Copy)]
    pub struct TlsImapConnector;

    struct TlsConnection(imap::Client<TlsStream<TcpStream>>);

    struct TlsSession(imap::Session<TlsStream<TcpStream>>);

    impl ImapConnector for TlsImapConnector {
        fn connect(&self, host: &str, port: u16) -> PageflowResult<Box<dyn ImapConnection>> {
            let tls = TlsConnector::builder().build().map_err(email_error)?;
            let client = imap::connect((host, port), host, &tls).map_err(email_error)?;
            Ok(Box::new(TlsConnection(client)))
        }
    }

    impl ImapConnection for TlsConnection {
        fn login(self: Box<Self>, user: &str, password: &str) -> PageflowResult<Box<dyn ImapSession>> {
            let session = self.0.login(user, password).map_err(|(e, _)| email_error(e))?;
            Ok(Box::new(TlsSession(session)))
        }
    }

    impl TlsSession {
        fn uid_search(&mut self, query: &str) -> PageflowResult<Vec<u32>> {
            let mut uids: Vec<u32> = self
                .0
                .uid_search(query)
                .map_err(email_error)?
                .into_iter()
                .collect();
            uids.sort_unstable();
            Ok(uids)
        }
    }

    impl ImapSession for TlsSession {
        fn select(&mut self, mailbox: &str) -> PageflowResult<()> {
            let _ = self.0.select(mailbox).map_err(email_error)?;
            Ok(())
        }

        fn search(&mut self, criteria: &str) -> PageflowResult<Vec<u32>> {
            self.uid_search(criteria)
        }

        fn gmail_search(&mut self, query: &str) -> PageflowResult<Vec<u32>> {
            self.uid_search(&format!("X-GM-RAW {}", quote(query)))
        }

        fn fetch_rfc822(&mut self, uids: &[u32]) -> PageflowResult<Vec<Vec<u8>>> {
            let fetches = self.0.uid_fetch(uid_list(uids), "RFC822").map_err(email_error)?;
            Ok(fetches
                .iter()
                .filter_map(|f| f.body().map(<[u8]>::to_vec))
                .collect())
        }

        fn delete(&mut self, uids: &[u32]) -> PageflowResult<()> {
            let _ = self
                .0
                .uid_store(uid_list(uids), "+FLAGS (\\Deleted)")
                .map_err(email_error)?;
            Ok(())
        }

        fn expunge(&mut self) -> PageflowResult<()> {
            let _ = self.0.expunge().map_err(email_error)?;
            Ok(())
        }

        fn logout(&mut self) -> PageflowResult<()> {
            self.0.logout().map_err(email_error)
        }
    }
}
