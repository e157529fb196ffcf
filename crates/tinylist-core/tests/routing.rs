//! End-to-end routing through the bot with an in-memory store and the
//! capturing transport.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use tinylist_core::bounce::MAX_BOUNCES;
use tinylist_core::{
    ArchivedMessage, Bot, BotConfig, DebugTransport, Definition, Error, ListStore, MemoryStore,
    Result, SentMessage, Subscription, Transport, TransportError,
};
use tinylist_mime::Message;

const COMMAND: &str = "lists@example.com";
const BOUNCES: &str = "bounces@example.com";
const ADMIN: &str = "admin@example.com";

struct Harness {
    bot: Bot,
    store: MemoryStore,
    transport: DebugTransport,
}

impl Harness {
    async fn new() -> Self {
        Self::wrapped(|store| Box::new(store), |transport| Box::new(transport))
    }

    /// Runs the bot on wrappers around the store and transport the test
    /// inspects.
    fn wrapped(
        wrap_store: impl FnOnce(MemoryStore) -> Box<dyn ListStore>,
        wrap_transport: impl FnOnce(DebugTransport) -> Box<dyn Transport>,
    ) -> Self {
        let store = MemoryStore::new();
        let transport = DebugTransport::new();
        let config = BotConfig {
            command_address: COMMAND.to_string(),
            bounces_address: BOUNCES.to_string(),
            admin_addresses: vec![ADMIN.to_string()],
            ..BotConfig::default()
        };
        let bot = Bot::new(
            config,
            wrap_store(store.clone()),
            wrap_transport(transport.clone()),
        );
        Self {
            bot,
            store,
            transport,
        }
    }

    /// `mylist` with two subscribers and one bcc address.
    async fn with_mylist() -> Self {
        let harness = Self::new().await;
        let mut def = Definition::new("mylist@example.com", "My List");
        def.description = "General discussion".to_string();
        def.bcc = vec!["archive@example.net".to_string()];
        harness.store.create_list(&def).await.unwrap();
        for address in ["alice@example.org", "bob@example.org"] {
            harness
                .store
                .subscribe("mylist@example.com", address)
                .await
                .unwrap();
        }
        harness
    }

    async fn create(&self, def: Definition) {
        self.store.create_list(&def).await.unwrap();
    }

    async fn deliver(&self, raw: &str) {
        self.bot.handle(raw.as_bytes()).await.unwrap();
    }

    fn sent(&self) -> Vec<SentMessage> {
        self.transport.sent()
    }

    /// The single reply sent so far, parsed.
    fn only_reply(&self) -> (SentMessage, Message) {
        let sent = self.sent();
        assert_eq!(sent.len(), 1, "expected exactly one message, got {sent:#?}");
        let message = Message::parse(&sent[0].message).unwrap();
        (sent[0].clone(), message)
    }
}

fn mail(from: &str, to: &str, subject: &str) -> String {
    format!(
        "Received: from mx.example.org by mx.example.com\r\n\
         Return-Path: <{from}>\r\n\
         From: Sender <{from}>\r\n\
         To: {to}\r\n\
         Subject: {subject}\r\n\
         Message-Id: <1234@example.org>\r\n\
         X-Custom: foo\r\n\
         \r\n\
         Hello everyone\r\n"
    )
}

fn body(message: &Message) -> String {
    String::from_utf8_lossy(&message.body).into_owned()
}

#[tokio::test]
async fn post_reaches_every_recipient_with_its_own_envelope() {
    let h = Harness::with_mylist().await;
    h.deliver(&mail("alice@example.org", "mylist@example.com", "hello"))
        .await;

    let sent = h.sent();
    assert_eq!(sent.len(), 3);

    let recipients: Vec<_> = sent.iter().map(|m| m.envelope_to.as_str()).collect();
    assert_eq!(
        recipients,
        vec!["alice@example.org", "bob@example.org", "archive@example.net"]
    );
    let envelopes: Vec<_> = sent.iter().map(|m| m.envelope_from.as_str()).collect();
    assert_eq!(
        envelopes,
        vec![
            "bounces+mylist=example.com+alice=example.org@example.com",
            "bounces+mylist=example.com+bob=example.org@example.com",
            "bounces+mylist=example.com+archive=example.net@example.com",
        ]
    );

    // No reply: nothing went to the command address' sender side
    assert!(sent.iter().all(|m| m.envelope_from != COMMAND));
}

#[tokio::test]
async fn post_copy_is_rewritten_for_the_list() {
    let h = Harness::with_mylist().await;
    h.deliver(&mail("alice@example.org", "mylist@example.com", "hello"))
        .await;

    let copy = Message::parse(&h.sent()[0].message).unwrap();
    assert_eq!(copy.subject, "hello");
    assert_eq!(copy.from, "Sender <alice@example.org>");
    assert_eq!(copy.precedence, "list");
    assert_eq!(
        copy.headers.get("List-ID"),
        Some("My List <mylist@example.com>")
    );
    assert_eq!(
        copy.headers.get("Sender"),
        Some("My List <mylist@example.com>")
    );
    assert_eq!(
        copy.headers.get("List-Unsubscribe"),
        Some("<mailto:lists@example.com?subject=unsubscribe%20mylist@example.com>")
    );
    assert_eq!(copy.headers.get("X-Custom"), Some("foo"));
    assert!(!copy.headers.contains("Received"));
    assert!(!copy.headers.contains("Return-Path"));
    assert_eq!(body(&copy), "Hello everyone\r\n");
}

#[tokio::test]
async fn post_is_archived_once() {
    let h = Harness::with_mylist().await;
    let raw = mail("alice@example.org", "mylist@example.com", "hello");
    h.deliver(&raw).await;

    let archived = h.store.archived("mylist@example.com").await.unwrap();
    assert_eq!(archived.len(), 1);
    assert_eq!(archived[0].sender, "alice@example.org");
    assert_eq!(archived[0].subject, "hello");
    assert_eq!(archived[0].message, h.sent()[0].message);
}

#[tokio::test]
async fn list_addressed_twice_is_delivered_once() {
    let h = Harness::with_mylist().await;
    let raw = mail("alice@example.org", "mylist@example.com", "hello")
        .replace("X-Custom: foo\r\n", "Cc: MyList@Example.com\r\n");
    h.deliver(&raw).await;
    assert_eq!(h.sent().len(), 3);
}

#[tokio::test]
async fn bouncing_subscriber_is_skipped() {
    let h = Harness::with_mylist().await;
    h.store
        .set_bounce(
            "mylist@example.com",
            "bob@example.org",
            2,
            Utc::now() - TimeDelta::days(6),
        )
        .await
        .unwrap();

    h.deliver(&mail("alice@example.org", "mylist@example.com", "hello"))
        .await;
    let recipients: Vec<_> = h.sent().into_iter().map(|m| m.envelope_to).collect();
    assert_eq!(recipients, vec!["alice@example.org", "archive@example.net"]);
}

#[tokio::test]
async fn unauthorised_post_is_refused_with_a_reply() {
    let h = Harness::new().await;
    let mut def = Definition::new("announce@example.com", "Announcements");
    def.posters = vec!["boss@example.com".to_string()];
    h.create(def).await;

    h.deliver(&mail("carol@example.org", "announce@example.com", "hi"))
        .await;

    let (sent, reply) = h.only_reply();
    assert_eq!(sent.envelope_from, COMMAND);
    assert_eq!(sent.envelope_to, "carol@example.org");
    assert_eq!(reply.subject, "Re: hi");
    assert_eq!(reply.in_reply_to, "<1234@example.org>");
    assert_eq!(
        body(&reply),
        "You are not an approved poster for this mailing list. \
         Your message has not been delivered to announce@example.com\r\n"
    );
    assert!(h.store.archived("announce@example.com").await.unwrap().is_empty());
}

#[tokio::test]
async fn subscribers_only_list_needs_a_subscription() {
    let h = Harness::new().await;
    let mut def = Definition::new("members@example.com", "Members");
    def.subscribers_only = true;
    h.create(def).await;
    h.store
        .subscribe("members@example.com", "dave@example.org")
        .await
        .unwrap();

    h.deliver(&mail("Dave@Example.org", "members@example.com", "hi"))
        .await;
    assert_eq!(h.sent().len(), 1);
    assert_eq!(h.sent()[0].envelope_to, "dave@example.org");

    h.deliver(&mail("eve@example.org", "members@example.com", "hi"))
        .await;
    let sent = h.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1].envelope_from, COMMAND);
    assert_eq!(sent[1].envelope_to, "eve@example.org");
}

#[tokio::test]
async fn every_addressed_list_is_processed() {
    let h = Harness::with_mylist().await;
    let mut closed = Definition::new("closed@example.com", "Closed");
    closed.posters = vec!["boss@example.com".to_string()];
    h.create(closed).await;

    h.deliver(&mail(
        "alice@example.org",
        "closed@example.com, mylist@example.com",
        "hello",
    ))
    .await;

    let sent = h.sent();
    // three list copies plus one reply about the refused list
    assert_eq!(sent.len(), 4);
    let reply = sent.last().unwrap();
    assert_eq!(reply.envelope_from, COMMAND);
    let reply = Message::parse(&reply.message).unwrap();
    assert!(body(&reply).contains("delivered to closed@example.com"));
    assert!(!body(&reply).contains("mylist"));
}

#[tokio::test]
async fn subscribe_command() {
    let h = Harness::new().await;
    h.create(Definition::new("mylist@example.com", "My List")).await;

    h.deliver(&mail("Frank@Example.org", COMMAND, "subscribe mylist"))
        .await;

    let (sent, reply) = h.only_reply();
    assert_eq!(sent.envelope_to, "Frank@Example.org");
    assert!(body(&reply).contains("now subscribed to mylist"));
    assert!(
        h.store
            .subscription("mylist@example.com", "frank@example.org")
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn failing_command_reports_the_error() {
    let h = Harness::new().await;
    let mut def = Definition::new("staff@example.com", "Staff");
    def.locked = true;
    h.create(def).await;

    h.deliver(&mail("frank@example.org", COMMAND, "subscribe staff"))
        .await;

    let (_, reply) = h.only_reply();
    assert_eq!(
        body(&reply),
        "Command failed: List staff@example.com is locked, only admins can add subscribers\r\n"
    );
    assert!(h.store.subscribers("staff@example.com").await.unwrap().is_empty());
}

#[tokio::test]
async fn admin_may_change_locked_lists() {
    let h = Harness::new().await;
    let mut def = Definition::new("staff@example.com", "Staff");
    def.locked = true;
    h.create(def).await;

    h.deliver(&mail(ADMIN, COMMAND, "subscribe staff@example.com"))
        .await;
    assert!(
        h.store
            .subscription("staff@example.com", ADMIN)
            .await
            .unwrap()
            .is_some()
    );

    h.deliver(&mail(ADMIN, COMMAND, "unsubscribe staff")).await;
    assert!(h.store.subscribers("staff@example.com").await.unwrap().is_empty());
}

#[tokio::test]
async fn leaving_a_locked_list_disables_delivery() {
    let h = Harness::new().await;
    let mut def = Definition::new("staff@example.com", "Staff");
    def.locked = true;
    h.create(def).await;
    h.store
        .subscribe("staff@example.com", "grace@example.org")
        .await
        .unwrap();

    h.deliver(&mail("grace@example.org", COMMAND, "unsubscribe staff"))
        .await;

    let (_, reply) = h.only_reply();
    assert_eq!(
        body(&reply),
        "You are now unsubscribed from staff@example.com\r\n"
    );
    let sub = h
        .store
        .subscription("staff@example.com", "grace@example.org")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(sub.bounces, MAX_BOUNCES);
}

#[tokio::test]
async fn unsubscribe_everywhere() {
    let h = Harness::with_mylist().await;
    h.create(Definition::new("other@example.com", "Other")).await;
    h.store
        .subscribe("other@example.com", "bob@example.org")
        .await
        .unwrap();

    h.deliver(&mail("bob@example.org", COMMAND, "unsubscribe")).await;

    let (_, reply) = h.only_reply();
    assert_eq!(
        body(&reply),
        "You are now unsubscribed from mylist@example.com\r\n\
         You are now unsubscribed from other@example.com\r\n"
    );
    assert_eq!(h.store.subscribers("mylist@example.com").await.unwrap().len(), 1);
}

#[tokio::test]
async fn lists_command_hides_hidden_lists() {
    let h = Harness::with_mylist().await;
    let mut hidden = Definition::new("secret@example.com", "Secret");
    hidden.hidden = true;
    h.create(hidden).await;

    h.deliver(&mail("bob@example.org", COMMAND, "lists")).await;
    let (_, reply) = h.only_reply();
    let text = body(&reply);
    assert!(text.starts_with("Available mailing lists:\r\n\r\n"));
    assert!(text.contains("My List <mylist@example.com>: General discussion\r\n"));
    assert!(!text.contains("secret@example.com"));
}

#[tokio::test]
async fn admin_lists_show_everything() {
    let h = Harness::with_mylist().await;
    let mut hidden = Definition::new("secret@example.com", "Secret");
    hidden.hidden = true;
    h.create(hidden).await;

    h.deliver(&mail(ADMIN, COMMAND, "LIST")).await;
    let (_, reply) = h.only_reply();
    let text = body(&reply);
    assert!(text.contains("Secret <secret@example.com>"));
    assert!(text.contains("Hidden: true"));
    assert!(text.contains("  - bob@example.org (0 bounces"));
}

#[tokio::test]
async fn help_and_unknown_commands() {
    let h = Harness::new().await;
    h.deliver(&mail("bob@example.org", COMMAND, "help")).await;
    h.deliver(&mail("bob@example.org", COMMAND, "dance")).await;

    let sent = h.sent();
    assert_eq!(sent.len(), 2);
    let help = body(&Message::parse(&sent[0].message).unwrap());
    assert!(help.starts_with("Available commands:"));
    let unknown = body(&Message::parse(&sent[1].message).unwrap());
    assert!(unknown.starts_with("dance is not a valid command.\r\n\r\nAvailable commands:"));
}

#[tokio::test]
async fn command_address_wins_over_lists() {
    let h = Harness::with_mylist().await;
    h.deliver(&mail(
        "carol@example.org",
        "mylist@example.com, Lists@Example.com",
        "subscribe mylist",
    ))
    .await;

    let (_, reply) = h.only_reply();
    assert!(body(&reply).contains("now subscribed to mylist@example.com"));
}

#[tokio::test]
async fn bounce_is_recorded_without_reply() {
    let h = Harness::with_mylist().await;
    h.deliver(&mail(
        "mailer-daemon@example.org",
        "bounces+mylist=example.com+bob=example.org@example.com",
        "Undelivered Mail Returned to Sender",
    ))
    .await;

    assert!(h.sent().is_empty());
    let sub = h
        .store
        .subscription("mylist@example.com", "bob@example.org")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(sub.bounces, 1);
    assert!(Utc::now() - sub.last_bounce < TimeDelta::minutes(1));
}

#[tokio::test]
async fn bounce_found_in_delivery_header() {
    let h = Harness::with_mylist().await;
    let raw = mail("mailer-daemon@example.org", "undisclosed-recipients:;", "failure")
        .replace(
            "X-Custom: foo\r\n",
            "Delivered-To: bounces+mylist=example.com+alice=example.org@example.com\r\n",
        );
    h.deliver(&raw).await;

    assert!(h.sent().is_empty());
    let sub = h
        .store
        .subscription("mylist@example.com", "alice@example.org")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(sub.bounces, 1);
}

#[tokio::test]
async fn unusable_bounces_are_dropped_silently() {
    let h = Harness::with_mylist().await;
    for to in [
        "bounces@example.com",
        "bounces+mylist=example.com@example.com",
        "bounces+nope=example.com+bob=example.org@example.com",
        "bounces+mylist=example.com+zed=example.org@example.com",
    ] {
        h.deliver(&mail("mailer-daemon@example.org", to, "failure"))
            .await;
    }

    assert!(h.sent().is_empty());
    for sub in h.store.subscribers("mylist@example.com").await.unwrap() {
        assert_eq!(sub.bounces, 0);
    }
}

#[tokio::test]
async fn no_destination_gets_one_reply_and_changes_nothing() {
    let h = Harness::with_mylist().await;
    let before = h.store.subscribers("mylist@example.com").await.unwrap();

    h.deliver(&mail("carol@example.org", "someone@example.net", "hello"))
        .await;

    let (sent, reply) = h.only_reply();
    assert_eq!(sent.envelope_to, "carol@example.org");
    assert_eq!(
        body(&reply),
        "No mailing lists addressed. Your message has not been delivered.\r\n"
    );
    assert_eq!(h.store.subscribers("mylist@example.com").await.unwrap(), before);
    assert!(h.store.archived("mylist@example.com").await.unwrap().is_empty());
}

#[tokio::test]
async fn malformed_input_is_an_error() {
    let h = Harness::new().await;
    assert!(h.bot.handle(b"   \r\n").await.is_err());
    assert!(h.bot.handle(b"no header here\r\n\r\nbody").await.is_err());
    assert!(h.sent().is_empty());
}

/// Store whose archive is unavailable for one list.
struct ArchiveDown {
    inner: MemoryStore,
    list: &'static str,
}

#[async_trait]
impl ListStore for ArchiveDown {
    async fn lists(&self) -> Result<Vec<Definition>> {
        self.inner.lists().await
    }

    async fn lookup_list(&self, address: &str) -> Result<Option<Definition>> {
        self.inner.lookup_list(address).await
    }

    async fn create_list(&self, def: &Definition) -> Result<()> {
        self.inner.create_list(def).await
    }

    async fn modify_list(&self, address: &str, def: &Definition) -> Result<()> {
        self.inner.modify_list(address, def).await
    }

    async fn delete_list(&self, address: &str) -> Result<()> {
        self.inner.delete_list(address).await
    }

    async fn subscribe(&self, list: &str, address: &str) -> Result<()> {
        self.inner.subscribe(list, address).await
    }

    async fn unsubscribe(&self, list: &str, address: &str) -> Result<()> {
        self.inner.unsubscribe(list, address).await
    }

    async fn set_bounce(
        &self,
        list: &str,
        address: &str,
        bounces: u16,
        last_bounce: DateTime<Utc>,
    ) -> Result<()> {
        self.inner.set_bounce(list, address, bounces, last_bounce).await
    }

    async fn subscribers(&self, list: &str) -> Result<Vec<Subscription>> {
        self.inner.subscribers(list).await
    }

    async fn subscription(&self, list: &str, address: &str) -> Result<Option<Subscription>> {
        self.inner.subscription(list, address).await
    }

    async fn archive(&self, list: &str, entry: &ArchivedMessage) -> Result<bool> {
        if list.eq_ignore_ascii_case(self.list) {
            return Err(Error::Storage("archive unavailable".to_string()));
        }
        self.inner.archive(list, entry).await
    }

    async fn archived(&self, list: &str) -> Result<Vec<ArchivedMessage>> {
        self.inner.archived(list).await
    }
}

/// Transport whose relay refuses one recipient.
struct Refusing {
    inner: DebugTransport,
    recipient: &'static str,
}

#[async_trait]
impl Transport for Refusing {
    async fn send(
        &self,
        envelope_from: &str,
        envelope_to: &str,
        message: &[u8],
    ) -> std::result::Result<(), TransportError> {
        if envelope_to == self.recipient {
            return Err(tinylist_smtp::Error::smtp_error(550, "mailbox unavailable").into());
        }
        self.inner.send(envelope_from, envelope_to, message).await
    }
}

#[tokio::test]
async fn archive_failure_stops_only_that_list() {
    let h = Harness::wrapped(
        |store| {
            Box::new(ArchiveDown {
                inner: store,
                list: "broken@example.com",
            })
        },
        |transport| Box::new(transport),
    );
    h.create(Definition::new("mylist@example.com", "My List")).await;
    h.create(Definition::new("broken@example.com", "Broken")).await;
    h.store
        .subscribe("mylist@example.com", "bob@example.org")
        .await
        .unwrap();
    h.store
        .subscribe("broken@example.com", "carol@example.org")
        .await
        .unwrap();

    h.deliver(&mail(
        "alice@example.org",
        "mylist@example.com, broken@example.com",
        "hello",
    ))
    .await;

    let sent = h.sent();
    let recipients: Vec<_> = sent.iter().map(|m| m.envelope_to.as_str()).collect();
    assert_eq!(recipients, vec!["bob@example.org", "alice@example.org"]);

    let reply = &sent[1];
    assert_eq!(reply.envelope_from, COMMAND);
    let text = body(&Message::parse(&reply.message).unwrap());
    assert!(text.contains("Storage error: archive unavailable"), "{text}");

    assert_eq!(h.store.archived("mylist@example.com").await.unwrap().len(), 1);
    assert!(h.store.archived("broken@example.com").await.unwrap().is_empty());
}

#[tokio::test]
async fn refused_recipient_is_reported_to_the_poster() {
    let h = Harness::wrapped(
        |store| Box::new(store),
        |transport| {
            Box::new(Refusing {
                inner: transport,
                recipient: "bob@example.org",
            })
        },
    );
    let mut def = Definition::new("mylist@example.com", "My List");
    def.bcc = vec!["archive@example.net".to_string()];
    h.create(def).await;
    for address in ["alice@example.org", "bob@example.org"] {
        h.store
            .subscribe("mylist@example.com", address)
            .await
            .unwrap();
    }

    h.deliver(&mail("alice@example.org", "mylist@example.com", "hello"))
        .await;

    let sent = h.sent();
    let recipients: Vec<_> = sent.iter().map(|m| m.envelope_to.as_str()).collect();
    assert_eq!(
        recipients,
        vec!["alice@example.org", "archive@example.net", "alice@example.org"]
    );

    let reply = sent.last().unwrap();
    assert_eq!(reply.envelope_from, COMMAND);
    let text = body(&Message::parse(&reply.message).unwrap());
    assert!(
        text.contains(
            "Delivery to mylist@example.com failed for 1 of 3 recipients: bob@example.org"
        ),
        "{text}"
    );
    assert!(text.contains("SMTP error 550: mailbox unavailable"), "{text}");

    assert_eq!(h.store.archived("mylist@example.com").await.unwrap().len(), 1);
}
