//! Per-connection MRIM session.
//!
//! A session starts unauthenticated, becomes authenticated after a successful LOGIN2 and is
//! closed exactly once when its connection ends. Every reply goes through the session's own
//! [`SessionHandle`], so replies and pushes from other sessions reach the socket through the
//! same single writer.
//!
//! Store calls are awaited while the connection's reader is parked on this session, so input
//! that arrives meanwhile stays in the framing buffer. After a store call, the session checks
//! that it is still the registered owner of its user before pushing anything to others.

use std::future::Future;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use futures::future::BoxFuture;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::core::packet::{Packet, ProtocolVersion};
use crate::engine::{ConnectionId, Rejection};
use crate::error::{constants, ProtocolError, Result};
use crate::mrim::rate_limit::SearchLimiter;
use crate::mrim::registry::{RegistryEntry, SessionHandle};
use crate::mrim::MrimContext;
use crate::protocol::commands::*;
use crate::protocol::messages::*;
use crate::protocol::{Dispatcher, HandlerResult};
use crate::store::{NewContact, StoreError, StoreResult};
use crate::utils::metrics::{global_metrics, Timer};
use crate::utils::timeout::{with_timeout_error, STORE_TIMEOUT};

/// The authenticated user behind a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: u32,
    pub login: String,
    pub status: u32,
    /// Logins on the user's contact list, for presence fan-out.
    pub contacts: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated(Identity),
    Closed,
}

/// Status other users get to see.
pub fn visible_status(status: u32) -> u32 {
    if status & status::STATUS_FLAG_INVISIBLE != 0 {
        status::STATUS_OFFLINE
    } else {
        status
    }
}

/// Time a store call and bound it by [`STORE_TIMEOUT`].
async fn store_op<T, F>(operation: &'static str, fut: F) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    let _timer = Timer::start(operation);
    with_timeout_error(fut, STORE_TIMEOUT).await
}

fn server_time() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

pub struct Session {
    ctx: Arc<MrimContext>,
    conn: ConnectionId,
    handle: SessionHandle,
    state: SessionState,
    version: ProtocolVersion,
    limiter: SearchLimiter,
}

impl Session {
    pub fn new(ctx: Arc<MrimContext>, conn: ConnectionId, handle: SessionHandle) -> Self {
        let limiter = SearchLimiter::new(
            ctx.config.search_quota,
            ctx.config.search_refill_window,
            Instant::now(),
        );
        Self {
            ctx,
            conn,
            handle,
            state: SessionState::Unauthenticated,
            version: ProtocolVersion::SERVER,
            limiter,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn identity(&self) -> Option<&Identity> {
        match &self.state {
            SessionState::Authenticated(identity) => Some(identity),
            _ => None,
        }
    }

    pub fn conn(&self) -> ConnectionId {
        self.conn
    }

    /// Route one inbound packet through the context's dispatcher.
    pub async fn dispatch(&mut self, packet: Packet) -> HandlerResult {
        let ctx = Arc::clone(&self.ctx);
        ctx.dispatcher.dispatch(self, packet).await
    }

    fn require_auth(&self) -> std::result::Result<Identity, Rejection> {
        self.identity().cloned().ok_or_else(|| {
            Rejection::new(ProtocolError::UnsupportedOperation(
                constants::ERR_NOT_AUTHENTICATED.into(),
            ))
        })
    }

    fn frame<M: WireMessage>(&self, seq: u32, msg: &M) -> Result<Bytes> {
        Packet::new(M::COMMAND, seq, self.version, msg.encode()?).to_bytes()
    }

    fn reply<M: WireMessage>(&self, seq: u32, msg: &M) -> Result<()> {
        self.reply_raw(M::COMMAND, seq, msg.encode()?)
    }

    fn reply_raw(&self, command: u32, seq: u32, payload: Bytes) -> Result<()> {
        let frame = Packet::new(command, seq, self.version, payload).to_bytes()?;
        if !self.handle.send(frame) {
            debug!("own connection already closed, reply dropped");
        }
        Ok(())
    }

    /// Queue a server-initiated frame on another session.
    fn push<M: WireMessage>(target: &RegistryEntry, msg: &M) -> Result<bool> {
        let frame = Packet::new(M::COMMAND, 0, target.version, msg.encode()?).to_bytes()?;
        Ok(target.handle.send(frame))
    }

    async fn still_owner(&self, user_id: u32) -> bool {
        self.ctx.registry.is_live(user_id, self.conn).await
    }

    /// Tell every online contact about `status`.
    async fn broadcast_status(&self, identity: &Identity, status: u32) -> Result<()> {
        let update = UserStatus {
            status: visible_status(status),
            user: identity.login.clone(),
        };
        let online = self
            .ctx
            .registry
            .online_among(identity.contacts.iter().map(String::as_str))
            .await;
        for entry in online.iter().filter(|e| e.user_id != identity.user_id) {
            if !Self::push(entry, &update)? {
                debug!(to = %entry.login, "presence target went away");
            }
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Command handlers
    // ---------------------------------------------------------------------

    async fn on_hello(&mut self, packet: Packet) -> HandlerResult {
        self.version = packet.header.version;
        debug!(version = %self.version, "client hello");
        self.reply(
            packet.seq(),
            &HelloAck {
                ping_period: self.ctx.config.ping_period_secs,
            },
        )?;
        Ok(())
    }

    async fn on_login(&mut self, packet: Packet) -> HandlerResult {
        if self.state != SessionState::Unauthenticated {
            return Err(Rejection::new(ProtocolError::UnsupportedOperation(
                constants::ERR_ALREADY_AUTHENTICATED.into(),
            )));
        }
        let seq = packet.seq();
        let login = Login2::decode(&packet.payload)?;
        self.version = packet.header.version;
        let metrics = global_metrics();

        let account = store_op(
            "authenticate",
            self.ctx.store.authenticate(&login.login, &login.password),
        )
        .await;
        let account = match account {
            Ok(account) => account,
            Err(StoreError::AuthFailure) => {
                metrics.login_failed();
                info!(login = %login.login, "login rejected");
                return Err(self.login_rejection(
                    seq,
                    ProtocolError::AuthenticationFailure,
                    constants::LOGIN_REJ_INVALID,
                ));
            }
            Err(e) => {
                metrics.login_failed();
                return Err(self.login_rejection(seq, e.into(), constants::LOGIN_REJ_INTERNAL));
            }
        };

        let declared = if login.status == status::STATUS_OFFLINE {
            status::STATUS_ONLINE
        } else {
            login.status
        };
        let user_id = account.user_id;

        let displaced = self
            .ctx
            .registry
            .insert(RegistryEntry {
                user_id,
                login: account.login.clone(),
                status: declared,
                version: self.version,
                conn: self.conn,
                handle: self.handle.clone(),
            })
            .await;
        if let Some(old) = displaced.filter(|old| old.conn != self.conn) {
            metrics.session_displaced();
            info!(user_id, displaced = %old.conn, "user logged in elsewhere, closing previous session");
            let _ = Self::push(
                &old,
                &Logout {
                    reason: logout::LOGOUT_NO_RELOGIN_FLAG,
                },
            );
            old.handle.close();
        }

        let store = &self.ctx.store;
        let loaded = tokio::try_join!(
            store_op("contact_groups", store.contact_groups(user_id)),
            store_op("contacts", store.contacts(user_id)),
            store_op("set_status", store.set_status(user_id, declared)),
        );
        let (groups, contacts, ()) = match loaded {
            Ok(loaded) => loaded,
            Err(e) => {
                self.ctx.registry.remove(user_id, self.conn).await;
                metrics.login_failed();
                return Err(self.login_rejection(seq, e.into(), constants::LOGIN_REJ_INTERNAL));
            }
        };

        if !self.still_owner(user_id).await {
            debug!(user_id, "session displaced while logging in");
            if self.ctx.registry.remove(user_id, self.conn).await.is_some() {
                let offline = store.set_status(user_id, status::STATUS_OFFLINE);
                if let Err(e) = store_op("set_status", offline).await {
                    warn!(user_id, error = %e, "failed to record offline status");
                }
            }
            return Ok(());
        }

        let identity = Identity {
            user_id,
            login: account.login,
            status: declared,
            contacts: contacts.iter().map(|c| c.login.clone()).collect(),
        };
        self.state = SessionState::Authenticated(identity.clone());
        metrics.login_success();
        info!(user_id, login = %identity.login, status = declared, "login accepted");

        self.broadcast_status(&identity, declared).await?;

        let online = self
            .ctx
            .registry
            .online_among(identity.contacts.iter().map(String::as_str))
            .await;
        let live_status = |login: &str| {
            online
                .iter()
                .find(|e| e.login.eq_ignore_ascii_case(login))
                .map_or(status::STATUS_OFFLINE, |e| visible_status(e.status))
        };
        let list = ContactList2 {
            status: contact_list::GET_CONTACTS_OK,
            groups,
            contacts: contacts
                .iter()
                .map(|c| ContactEntry::from_contact(c, live_status(&c.login)))
                .collect(),
        };

        self.reply_raw(MRIM_CS_LOGIN_ACK, seq, Bytes::new())?;
        self.reply(seq, &MailboxStatus { unread: 0 })?;
        self.reply_raw(ContactList2::COMMAND, seq, list.encode()?)?;
        Ok(())
    }

    fn login_rejection(&self, seq: u32, error: ProtocolError, reason: &str) -> Rejection {
        let mut rejection = Rejection::new(error);
        match self.frame(
            seq,
            &LoginRej {
                reason: reason.to_string(),
            },
        ) {
            Ok(frame) => rejection.reply.push(frame),
            Err(e) => warn!(error = %e, "failed to encode LOGIN_REJ"),
        }
        rejection
    }

    async fn on_message(&mut self, packet: Packet) -> HandlerResult {
        let identity = self.require_auth()?;
        let seq = packet.seq();
        let msg = Message::decode(&packet.payload)?;
        let metrics = global_metrics();

        let delivered = match self.ctx.registry.lookup_login(&msg.to).await {
            Some(target) => {
                let relay = MessageAck {
                    msg_id: self.ctx.registry.next_message_id(),
                    flags: msg.flags,
                    from: identity.login.clone(),
                    text: msg.text,
                    rtf: msg.rtf,
                };
                Self::push(&target, &relay)?
            }
            None => false,
        };

        let status = if delivered {
            metrics.message_relayed();
            debug!(to = %msg.to, "message relayed");
            message_status::MESSAGE_DELIVERED
        } else {
            metrics.message_undeliverable();
            debug!(to = %msg.to, "recipient offline, message refused");
            message_status::MESSAGE_REJECTED_DENY_OFFMSG
        };

        if msg.flags & message_flags::MESSAGE_FLAG_NORECV == 0 {
            self.reply(seq, &MessageStatus { status })?;
        }
        Ok(())
    }

    async fn on_message_recv(&mut self, _packet: Packet) -> HandlerResult {
        self.require_auth()?;
        Ok(())
    }

    async fn on_search(&mut self, packet: Packet) -> HandlerResult {
        self.require_auth()?;
        let seq = packet.seq();
        let query = parse_wp_request(&packet.payload)?;
        let metrics = global_metrics();
        let now = server_time();

        if !self.limiter.try_acquire(Instant::now()) {
            metrics.search_rate_limited();
            let reply =
                AnketaInfo::status_only(anketa_status::MRIM_ANKETA_INFO_STATUS_RATELIMERR, now);
            let frame =
                Packet::new(AnketaInfo::COMMAND, seq, self.version, reply.encode()?).to_bytes()?;
            return Err(Rejection::new(ProtocolError::RateLimited).with_reply(frame));
        }
        metrics.search();

        let max_rows = self.ctx.config.max_search_rows;
        let found = store_op("search", self.ctx.store.search(&query, max_rows as usize)).await;

        let info = match found {
            Err(e) => {
                warn!(error = %e, "directory search failed");
                AnketaInfo::status_only(anketa_status::MRIM_ANKETA_INFO_STATUS_DBERR, now)
            }
            Ok(mut profiles) => {
                let online = self
                    .ctx
                    .registry
                    .online_among(profiles.iter().map(|p| p.login.as_str()))
                    .await;
                for profile in profiles.iter_mut() {
                    profile.status = online
                        .iter()
                        .find(|e| e.login.eq_ignore_ascii_case(&profile.login))
                        .map_or(status::STATUS_OFFLINE, |e| visible_status(e.status));
                }
                if query.online_only {
                    profiles.retain(|p| p.status != status::STATUS_OFFLINE);
                }
                if profiles.is_empty() {
                    AnketaInfo::status_only(anketa_status::MRIM_ANKETA_INFO_STATUS_NOUSER, now)
                } else {
                    AnketaInfo::from_profiles(&profiles, max_rows, now)
                }
            }
        };

        self.reply_raw(AnketaInfo::COMMAND, seq, info.encode()?)?;
        Ok(())
    }

    async fn on_change_status(&mut self, packet: Packet) -> HandlerResult {
        let mut identity = self.require_auth()?;
        let change = ChangeStatus::decode(&packet.payload)?;

        store_op(
            "set_status",
            self.ctx.store.set_status(identity.user_id, change.status),
        )
        .await
        .map_err(ProtocolError::from)?;
        if !self
            .ctx
            .registry
            .set_status(identity.user_id, self.conn, change.status)
            .await
        {
            debug!(user_id = identity.user_id, "status change on a displaced session");
            return Ok(());
        }

        identity.status = change.status;
        self.state = SessionState::Authenticated(identity.clone());
        debug!(user_id = identity.user_id, status = change.status, "status changed");
        self.broadcast_status(&identity, change.status).await?;
        Ok(())
    }

    async fn on_add_contact(&mut self, packet: Packet) -> HandlerResult {
        let mut identity = self.require_auth()?;
        let seq = packet.seq();
        let request = AddContact::decode(&packet.payload)?;
        let is_group = request.flags & contact_oper::CONTACT_FLAG_GROUP != 0;

        let added = store_op(
            "add_contact",
            self.ctx.store.add_contact(
                identity.user_id,
                NewContact {
                    flags: request.flags,
                    group_id: request.group_id,
                    login: request.email.clone(),
                    nickname: request.name.clone(),
                },
            ),
        )
        .await;

        let contact_id = match added {
            Ok(id) => id,
            Err(e) => {
                let status = match &e {
                    StoreError::NoSuchUser(_) => contact_oper::CONTACT_OPER_NO_SUCH_USER,
                    StoreError::AlreadyExists(_) => contact_oper::CONTACT_OPER_USER_EXISTS,
                    StoreError::Invalid(_) => contact_oper::CONTACT_OPER_INVALID_INFO,
                    StoreError::AuthFailure => contact_oper::CONTACT_OPER_ERROR,
                    StoreError::Backend(_) => contact_oper::CONTACT_OPER_INTERR,
                };
                debug!(error = %e, status, "add contact refused");
                self.reply(
                    seq,
                    &AddContactAck {
                        status,
                        contact_id: 0,
                    },
                )?;
                return Ok(());
            }
        };

        self.reply(
            seq,
            &AddContactAck {
                status: contact_oper::CONTACT_OPER_SUCCESS,
                contact_id,
            },
        )?;
        if is_group {
            return Ok(());
        }

        identity.contacts.push(request.email.clone());
        self.state = SessionState::Authenticated(identity);
        self.reply(
            0,
            &AuthorizeAck {
                user: request.email.clone(),
            },
        )?;
        if let Some(entry) = self.ctx.registry.lookup_login(&request.email).await {
            self.reply(
                0,
                &UserStatus {
                    status: visible_status(entry.status),
                    user: entry.login,
                },
            )?;
        }
        Ok(())
    }

    /// Release the session. Safe to call more than once.
    pub async fn close(&mut self) {
        let state = std::mem::replace(&mut self.state, SessionState::Closed);
        let SessionState::Authenticated(identity) = state else {
            return;
        };

        if self
            .ctx
            .registry
            .remove(identity.user_id, self.conn)
            .await
            .is_none()
        {
            debug!(user_id = identity.user_id, "session was displaced, nothing to release");
            return;
        }

        if let Err(e) = self.broadcast_status(&identity, status::STATUS_OFFLINE).await {
            warn!(error = %e, "failed to broadcast offline status");
        }
        if let Err(e) = store_op(
            "set_status",
            self.ctx.store.set_status(identity.user_id, status::STATUS_OFFLINE),
        )
        .await
        {
            warn!(error = %e, "failed to persist offline status");
        }
        info!(user_id = identity.user_id, "session closed");
    }
}

// Route adaptors: the dispatcher stores plain fn pointers.

fn hello(s: &mut Session, p: Packet) -> BoxFuture<'_, HandlerResult> {
    Box::pin(s.on_hello(p))
}

fn login2(s: &mut Session, p: Packet) -> BoxFuture<'_, HandlerResult> {
    Box::pin(s.on_login(p))
}

fn message(s: &mut Session, p: Packet) -> BoxFuture<'_, HandlerResult> {
    Box::pin(s.on_message(p))
}

fn message_recv(s: &mut Session, p: Packet) -> BoxFuture<'_, HandlerResult> {
    Box::pin(s.on_message_recv(p))
}

fn wp_request(s: &mut Session, p: Packet) -> BoxFuture<'_, HandlerResult> {
    Box::pin(s.on_search(p))
}

fn change_status(s: &mut Session, p: Packet) -> BoxFuture<'_, HandlerResult> {
    Box::pin(s.on_change_status(p))
}

fn add_contact(s: &mut Session, p: Packet) -> BoxFuture<'_, HandlerResult> {
    Box::pin(s.on_add_contact(p))
}

/// The server's command table.
pub fn routes() -> Dispatcher<Session> {
    let mut dispatcher = Dispatcher::new();
    dispatcher
        .register(MRIM_CS_HELLO, "hello", hello)
        .register(MRIM_CS_LOGIN2, "login2", login2)
        .register(MRIM_CS_MESSAGE, "message", message)
        .register(MRIM_CS_MESSAGE_RECV, "message_recv", message_recv)
        .register(MRIM_CS_WP_REQUEST, "wp_request", wp_request)
        .register(MRIM_CS_CHANGE_STATUS, "change_status", change_status)
        .register(MRIM_CS_ADD_CONTACT, "add_contact", add_contact)
        .ignore(MRIM_CS_PING, "ping");
    dispatcher
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use std::time::Duration;

    use tokio::sync::mpsc::UnboundedReceiver;

    use super::*;
    use crate::config::MrimConfig;
    use crate::error::ErrorKind;
    use crate::mrim::registry::Outgoing;
    use crate::store::memory::MemoryStore;
    use crate::store::UserStore;

    struct Client {
        session: Session,
        rx: UnboundedReceiver<Outgoing>,
    }

    impl Client {
        fn new(ctx: &Arc<MrimContext>) -> Self {
            let (handle, rx) = SessionHandle::channel();
            Self {
                session: Session::new(Arc::clone(ctx), ConnectionId::random(), handle),
                rx,
            }
        }

        async fn send<M: WireMessage>(&mut self, seq: u32, msg: &M) -> HandlerResult {
            let packet = Packet::new(M::COMMAND, seq, ProtocolVersion::SERVER, msg.encode().unwrap());
            self.session.dispatch(packet).await
        }

        async fn login(&mut self, login: &str, password: &str) -> HandlerResult {
            self.send(
                1,
                &Login2 {
                    login: login.into(),
                    password: password.into(),
                    status: status::STATUS_ONLINE,
                    user_agent: "test".into(),
                },
            )
            .await
        }

        /// Frames queued so far; a queued close shows up as `None`.
        fn drain(&mut self) -> Vec<Option<Packet>> {
            let mut out = Vec::new();
            while let Ok(item) = self.rx.try_recv() {
                out.push(match item {
                    Outgoing::Frame(bytes) => Some(Packet::from_bytes(&bytes).unwrap()),
                    Outgoing::Close => None,
                });
            }
            out
        }

        fn commands(&mut self) -> Vec<u32> {
            self.drain().into_iter().flatten().map(|p| p.command()).collect()
        }
    }

    async fn setup() -> (Arc<MemoryStore>, Arc<MrimContext>) {
        let store = Arc::new(MemoryStore::new());
        let alice = store.add_user("alice@mail.ru", "secret", "Alice").await.unwrap();
        let bob = store.add_user("bob@mail.ru", "hunter2", "Bob").await.unwrap();
        for (owner, other) in [(alice, "bob@mail.ru"), (bob, "alice@mail.ru")] {
            store
                .add_contact(
                    owner,
                    NewContact {
                        flags: 0,
                        group_id: 0,
                        login: other.into(),
                        nickname: other.into(),
                    },
                )
                .await
                .unwrap();
        }
        let dyn_store: Arc<dyn UserStore> = store.clone();
        let ctx = MrimContext::new(dyn_store, MrimConfig::default());
        (store, ctx)
    }

    #[tokio::test]
    async fn test_hello_announces_ping_period() {
        let (_store, ctx) = setup().await;
        let mut client = Client::new(&ctx);
        let packet = Packet::new(MRIM_CS_HELLO, 5, ProtocolVersion { major: 1, minor: 9 }, Bytes::new());
        client.session.dispatch(packet).await.unwrap();

        let frames: Vec<Packet> = client.drain().into_iter().flatten().collect();
        let ack = frames.last().unwrap();
        assert_eq!(ack.command(), MRIM_CS_HELLO_ACK);
        assert_eq!(ack.seq(), 5);
        assert_eq!(ack.header.version, ProtocolVersion { major: 1, minor: 9 });
        assert_eq!(HelloAck::decode(&ack.payload).unwrap().ping_period, 30);
    }

    #[tokio::test]
    async fn test_valid_login_sends_ack_mailbox_and_contact_list() {
        let (store, ctx) = setup().await;
        let mut alice = Client::new(&ctx);
        alice.login("Alice@mail.ru", "secret").await.unwrap();

        let frames: Vec<Packet> = alice.drain().into_iter().flatten().collect();
        let commands: Vec<u32> = frames.iter().map(Packet::command).collect();
        assert_eq!(
            commands,
            vec![MRIM_CS_LOGIN_ACK, MRIM_CS_MAILBOX_STATUS, MRIM_CS_CONTACT_LIST2]
        );
        assert!(frames.iter().all(|p| p.seq() == 1));

        let list = ContactList2::decode(&frames[2].payload).unwrap();
        assert_eq!(list.groups.len(), 1);
        assert_eq!(list.contacts.len(), 1);
        assert_eq!(list.contacts[0].email, "bob@mail.ru");
        assert_eq!(list.contacts[0].status, status::STATUS_OFFLINE);

        assert_eq!(alice.session.identity().unwrap().login, "alice@mail.ru");
        let user_id = alice.session.identity().unwrap().user_id;
        assert_eq!(store.status_of(user_id).await, Some(status::STATUS_ONLINE));
        assert!(ctx.registry.lookup_login("alice@mail.ru").await.is_some());
    }

    #[tokio::test]
    async fn test_invalid_login_is_rejected_without_closing() {
        let (_store, ctx) = setup().await;
        let mut alice = Client::new(&ctx);
        let rejection = alice.login("alice@mail.ru", "wrong").await.unwrap_err();

        assert_eq!(rejection.error.kind(), ErrorKind::AuthenticationFailure);
        assert!(!rejection.close);
        let reply = Packet::from_bytes(&rejection.reply[0]).unwrap();
        assert_eq!(reply.command(), MRIM_CS_LOGIN_REJ);
        assert_eq!(
            LoginRej::decode(&reply.payload).unwrap().reason,
            constants::LOGIN_REJ_INVALID
        );
        assert_eq!(alice.session.state(), &SessionState::Unauthenticated);
        assert!(ctx.registry.is_empty().await);

        alice.login("alice@mail.ru", "secret").await.unwrap();
        assert!(alice.session.identity().is_some());
    }

    #[tokio::test]
    async fn test_store_failure_during_login_reports_database_error() {
        let (store, ctx) = setup().await;
        store.set_unavailable(true);
        let mut alice = Client::new(&ctx);
        let rejection = alice.login("alice@mail.ru", "secret").await.unwrap_err();

        assert_eq!(rejection.error.kind(), ErrorKind::Internal);
        let reply = Packet::from_bytes(&rejection.reply[0]).unwrap();
        assert_eq!(
            LoginRej::decode(&reply.payload).unwrap().reason,
            constants::LOGIN_REJ_INTERNAL
        );
    }

    #[tokio::test]
    async fn test_commands_before_login_are_refused() {
        let (_store, ctx) = setup().await;
        let mut alice = Client::new(&ctx);
        let rejection = alice
            .send(
                2,
                &Message {
                    flags: 0,
                    to: "bob@mail.ru".into(),
                    text: "hi".into(),
                    rtf: Bytes::new(),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(rejection.error.kind(), ErrorKind::UnsupportedOperation);
        assert!(alice.drain().is_empty());
    }

    #[tokio::test]
    async fn test_message_to_online_user_is_relayed() {
        let (_store, ctx) = setup().await;
        let mut alice = Client::new(&ctx);
        let mut bob = Client::new(&ctx);
        alice.login("alice@mail.ru", "secret").await.unwrap();
        bob.login("bob@mail.ru", "hunter2").await.unwrap();
        alice.drain();
        bob.drain();

        alice
            .send(
                7,
                &Message {
                    flags: 0,
                    to: "BOB@mail.ru".into(),
                    text: "Привет".into(),
                    rtf: Bytes::new(),
                },
            )
            .await
            .unwrap();

        let relayed: Vec<Packet> = bob.drain().into_iter().flatten().collect();
        assert_eq!(relayed.len(), 1);
        let ack = MessageAck::decode(&relayed[0].payload).unwrap();
        assert_eq!(relayed[0].command(), MRIM_CS_MESSAGE_ACK);
        assert_eq!(ack.from, "alice@mail.ru");
        assert_eq!(ack.text, "Привет");
        assert_ne!(ack.msg_id, 0);

        let status: Vec<Packet> = alice.drain().into_iter().flatten().collect();
        assert_eq!(status[0].command(), MRIM_CS_MESSAGE_STATUS);
        assert_eq!(status[0].seq(), 7);
        assert_eq!(
            MessageStatus::decode(&status[0].payload).unwrap().status,
            message_status::MESSAGE_DELIVERED
        );
    }

    #[tokio::test]
    async fn test_message_to_offline_user_is_refused() {
        let (_store, ctx) = setup().await;
        let mut alice = Client::new(&ctx);
        alice.login("alice@mail.ru", "secret").await.unwrap();
        alice.drain();

        let msg = Message {
            flags: 0,
            to: "bob@mail.ru".into(),
            text: "anyone?".into(),
            rtf: Bytes::new(),
        };
        alice.send(3, &msg).await.unwrap();
        let frames: Vec<Packet> = alice.drain().into_iter().flatten().collect();
        assert_eq!(
            MessageStatus::decode(&frames[0].payload).unwrap().status,
            message_status::MESSAGE_REJECTED_DENY_OFFMSG
        );

        let quiet = Message {
            flags: message_flags::MESSAGE_FLAG_NORECV,
            ..msg
        };
        alice.send(4, &quiet).await.unwrap();
        assert!(alice.drain().is_empty());
    }

    #[tokio::test]
    async fn test_presence_reaches_online_contacts() {
        let (_store, ctx) = setup().await;
        let mut alice = Client::new(&ctx);
        alice.login("alice@mail.ru", "secret").await.unwrap();
        alice.drain();

        let mut bob = Client::new(&ctx);
        bob.login("bob@mail.ru", "hunter2").await.unwrap();
        let frames: Vec<Packet> = alice.drain().into_iter().flatten().collect();
        let update = UserStatus::decode(&frames[0].payload).unwrap();
        assert_eq!(update.user, "bob@mail.ru");
        assert_eq!(update.status, status::STATUS_ONLINE);

        bob.send(
            2,
            &ChangeStatus {
                status: status::STATUS_ONLINE | status::STATUS_FLAG_INVISIBLE,
            },
        )
        .await
        .unwrap();
        let frames: Vec<Packet> = alice.drain().into_iter().flatten().collect();
        assert_eq!(
            UserStatus::decode(&frames[0].payload).unwrap().status,
            status::STATUS_OFFLINE
        );

        bob.session.close().await;
        let frames: Vec<Packet> = alice.drain().into_iter().flatten().collect();
        assert_eq!(frames[0].command(), MRIM_CS_USER_STATUS);
        assert!(ctx.registry.lookup_login("bob@mail.ru").await.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_login_evicts_previous_session() {
        let (store, ctx) = setup().await;
        let mut first = Client::new(&ctx);
        first.login("alice@mail.ru", "secret").await.unwrap();
        first.drain();

        let mut second = Client::new(&ctx);
        second.login("alice@mail.ru", "secret").await.unwrap();

        let evicted = first.drain();
        assert_eq!(evicted.len(), 2);
        let logout = evicted[0].as_ref().unwrap();
        assert_eq!(logout.command(), MRIM_CS_LOGOUT);
        assert_eq!(
            Logout::decode(&logout.payload).unwrap().reason,
            logout::LOGOUT_NO_RELOGIN_FLAG
        );
        assert!(evicted[1].is_none());

        // The old session's teardown must not unregister the new one.
        first.session.close().await;
        let entry = ctx.registry.lookup_login("alice@mail.ru").await.unwrap();
        assert_eq!(entry.conn, second.session.conn());
        assert_eq!(store.status_of(entry.user_id).await, Some(status::STATUS_ONLINE));
    }

    #[tokio::test]
    async fn test_login_on_dead_connection_leaves_no_registry_entry() {
        let (store, ctx) = setup().await;
        let mut alice = Client::new(&ctx);
        drop(std::mem::replace(&mut alice.rx, SessionHandle::channel().1));

        alice.login("alice@mail.ru", "secret").await.unwrap();
        assert_eq!(alice.session.state(), &SessionState::Unauthenticated);
        assert!(ctx.registry.is_empty().await);
        let account = store.authenticate("alice@mail.ru", "secret").await.unwrap();
        assert_eq!(store.status_of(account.user_id).await, Some(status::STATUS_OFFLINE));

        alice.session.close().await;
        assert!(ctx.registry.lookup_login("alice@mail.ru").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_quota_and_refill() {
        let (_store, ctx) = setup().await;
        let mut alice = Client::new(&ctx);
        alice.login("alice@mail.ru", "secret").await.unwrap();
        alice.drain();

        let payload = encode_wp_request(&[(wp_request::MRIM_CS_WP_REQUEST_PARAM_USER, "bob")]).unwrap();
        let search = |seq| Packet::new(MRIM_CS_WP_REQUEST, seq, ProtocolVersion::SERVER, payload.clone());

        for seq in 0..ctx.config.search_quota {
            alice.session.dispatch(search(seq)).await.unwrap();
        }
        let results: Vec<Packet> = alice.drain().into_iter().flatten().collect();
        assert_eq!(results.len(), ctx.config.search_quota as usize);
        let info = AnketaInfo::decode(&results[0].payload).unwrap();
        assert_eq!(info.status, anketa_status::MRIM_ANKETA_INFO_STATUS_OK);
        assert_eq!(info.rows.len(), 1);
        assert_eq!(info.rows[0][0], "bob");

        let rejection = alice.session.dispatch(search(99)).await.unwrap_err();
        assert_eq!(rejection.error.kind(), ErrorKind::RateLimited);
        let limited = Packet::from_bytes(&rejection.reply[0]).unwrap();
        assert_eq!(
            AnketaInfo::decode(&limited.payload).unwrap().status,
            anketa_status::MRIM_ANKETA_INFO_STATUS_RATELIMERR
        );

        tokio::time::advance(ctx.config.search_refill_window + Duration::from_millis(1)).await;
        alice.session.dispatch(search(100)).await.unwrap();
        assert_eq!(alice.commands(), vec![MRIM_CS_ANKETA_INFO]);
    }

    #[tokio::test]
    async fn test_search_without_matches_reports_no_user() {
        let (_store, ctx) = setup().await;
        let mut alice = Client::new(&ctx);
        alice.login("alice@mail.ru", "secret").await.unwrap();
        alice.drain();

        let payload = encode_wp_request(&[
            (wp_request::MRIM_CS_WP_REQUEST_PARAM_USER, "bob"),
            (wp_request::MRIM_CS_WP_REQUEST_PARAM_ONLINE, "1"),
        ])
        .unwrap();
        alice
            .session
            .dispatch(Packet::new(MRIM_CS_WP_REQUEST, 1, ProtocolVersion::SERVER, payload))
            .await
            .unwrap();
        let frames: Vec<Packet> = alice.drain().into_iter().flatten().collect();
        assert_eq!(
            AnketaInfo::decode(&frames[0].payload).unwrap().status,
            anketa_status::MRIM_ANKETA_INFO_STATUS_NOUSER
        );
    }

    #[tokio::test]
    async fn test_add_contact_acks_and_authorizes() {
        let (store, ctx) = setup().await;
        store.add_user("carol@mail.ru", "pw", "Carol").await.unwrap();
        let mut alice = Client::new(&ctx);
        alice.login("alice@mail.ru", "secret").await.unwrap();
        alice.drain();

        let request = AddContact {
            flags: 0,
            group_id: 0,
            email: "carol@mail.ru".into(),
            name: "Carol".into(),
            unused: String::new(),
        };
        alice.send(9, &request).await.unwrap();
        let frames: Vec<Packet> = alice.drain().into_iter().flatten().collect();
        assert_eq!(frames[0].command(), MRIM_CS_ADD_CONTACT_ACK);
        let ack = AddContactAck::decode(&frames[0].payload).unwrap();
        assert_eq!(ack.status, contact_oper::CONTACT_OPER_SUCCESS);
        assert_eq!(frames[1].command(), MRIM_CS_AUTHORIZE_ACK);
        assert!(alice
            .session
            .identity()
            .unwrap()
            .contacts
            .contains(&"carol@mail.ru".to_string()));

        alice.send(10, &request).await.unwrap();
        let frames: Vec<Packet> = alice.drain().into_iter().flatten().collect();
        assert_eq!(
            AddContactAck::decode(&frames[0].payload).unwrap().status,
            contact_oper::CONTACT_OPER_USER_EXISTS
        );

        let ghost = AddContact {
            email: "ghost@mail.ru".into(),
            ..request
        };
        alice.send(11, &ghost).await.unwrap();
        let frames: Vec<Packet> = alice.drain().into_iter().flatten().collect();
        assert_eq!(
            AddContactAck::decode(&frames[0].payload).unwrap().status,
            contact_oper::CONTACT_OPER_NO_SUCH_USER
        );
    }

    #[tokio::test]
    async fn test_second_login_on_same_session_is_refused() {
        let (_store, ctx) = setup().await;
        let mut alice = Client::new(&ctx);
        alice.login("alice@mail.ru", "secret").await.unwrap();
        let rejection = alice.login("bob@mail.ru", "hunter2").await.unwrap_err();
        assert_eq!(rejection.error.kind(), ErrorKind::UnsupportedOperation);
        assert_eq!(alice.session.identity().unwrap().login, "alice@mail.ru");
    }
}
