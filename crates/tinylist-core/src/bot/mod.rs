//! The list bot: routes one inbound message.
//!
//! A message is handled as the first of these that applies:
//!
//! 1. a command, when it is addressed to the command address
//! 2. a bounce, when it is addressed to the bounce address
//! 3. a post, when it is addressed to one or more lists
//! 4. otherwise the sender is told nothing was delivered
//!
//! Commands and posts report failures back to the sender. Bounces never
//! get a reply.

mod admin;
pub mod command;

pub use admin::ListUpdate;
pub use command::Command;

use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::Utc;
use tinylist_mime::Message;

use crate::config::BotConfig;
use crate::delivery::{self, Transport, verp::BounceTarget};
use crate::list::{ArchivedMessage, Definition, List};
use crate::store::ListStore;
use crate::{Error, Result, bounce};

/// Headers an MTA adds naming the address a message was delivered to.
const DELIVERY_HEADERS: &[&str] = &["Delivered-To", "X-Original-To"];

/// The mailing list bot.
pub struct Bot {
    config: BotConfig,
    store: Box<dyn ListStore>,
    transport: Box<dyn Transport>,
}

impl Bot {
    /// Creates a bot over a store and a transport.
    #[must_use]
    pub fn new(config: BotConfig, store: Box<dyn ListStore>, transport: Box<dyn Transport>) -> Self {
        Self {
            config,
            store,
            transport,
        }
    }

    /// Parses and handles one raw message.
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be parsed or a reply to the
    /// sender cannot be sent.
    pub async fn handle(&self, raw: &[u8]) -> Result<()> {
        let msg = Message::parse(raw)?;
        tracing::info!(
            id = %msg.message_id,
            from = %msg.from,
            to = %msg.to,
            cc = %msg.cc,
            subject = %msg.subject,
            "MESSAGE_RECEIVED"
        );
        self.handle_message(&msg).await
    }

    /// Handles one parsed message.
    ///
    /// Failures of individual commands, lists and recipients are reported to
    /// the sender rather than returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the sender address is unusable or the reply to
    /// the sender cannot be sent.
    pub async fn handle_message(&self, msg: &Message) -> Result<()> {
        let recipients = msg.recipients();

        if recipients
            .iter()
            .any(|to| to.eq_ignore_ascii_case(&self.config.command_address))
        {
            return self.handle_command(msg).await;
        }

        if let Some(target) = self.bounce_target(msg, &recipients) {
            self.handle_bounce(msg, &target).await;
            return Ok(());
        }

        let lists = self.addressed_lists(&recipients).await?;
        if !lists.is_empty() {
            return self.handle_post(msg, &lists).await;
        }

        tracing::info!(from = %msg.from, to = %msg.to, cc = %msg.cc, "UNKNOWN_DESTINATION");
        self.reply(
            msg,
            "No mailing lists addressed. Your message has not been delivered.",
        )
        .await
    }

    async fn handle_command(&self, msg: &Message) -> Result<()> {
        let sender = msg.sender()?.address.to_lowercase();
        let admin = self.config.is_admin(&sender);

        let reply = match self.execute(&sender, admin, &msg.subject).await {
            Ok(reply) => {
                tracing::info!(from = %sender, command = %msg.subject, admin, "COMMAND_SUCCEEDED");
                reply
            }
            Err(err) => {
                tracing::warn!(from = %sender, command = %msg.subject, error = %err, "COMMAND_FAILED");
                format!("Command failed: {err}")
            }
        };
        self.reply(msg, &reply).await
    }

    async fn execute(&self, sender: &str, admin: bool, subject: &str) -> Result<String> {
        match Command::parse(subject) {
            Command::Lists => self.lists_reply(admin).await,
            Command::Help => Ok(command::help(&self.config.command_address)),
            Command::Subscribe(list) => {
                let def = self.subscribe(sender, &list, admin).await?;
                Ok(format!("You are now subscribed to {}", def.address))
            }
            Command::Unsubscribe(Some(list)) => {
                let def = self.unsubscribe(sender, &list, admin).await?;
                Ok(format!("You are now unsubscribed from {}", def.address))
            }
            Command::Unsubscribe(None) => {
                let lists = self.unsubscribe_all(sender, admin).await?;
                Ok(lists
                    .iter()
                    .map(|def| format!("You are now unsubscribed from {}", def.address))
                    .collect::<Vec<_>>()
                    .join("\n"))
            }
            Command::Unknown => {
                tracing::warn!(from = %sender, command = %subject, "Unknown command");
                Ok(format!(
                    "{subject} is not a valid command.\n\n{}",
                    command::help(&self.config.command_address)
                ))
            }
        }
    }

    async fn lists_reply(&self, admin: bool) -> Result<String> {
        let mut out = String::from("Available mailing lists:\n\n");
        for def in self.lists(admin).await? {
            if admin {
                out.push_str(&self.describe_list(&def).await?);
                out.push_str("\n\n");
            } else {
                let _ = writeln!(out, "{} <{}>: {}", def.name, def.address, def.description);
            }
        }
        let _ = write!(
            out,
            "\nTo subscribe to a mailing list, email {} with 'subscribe <list-address>' as the subject.",
            self.config.command_address
        );
        Ok(out)
    }

    /// The first recipient, or delivery header, on the bounce address.
    fn bounce_target(&self, msg: &Message, recipients: &[String]) -> Option<BounceTarget> {
        let delivered = DELIVERY_HEADERS
            .iter()
            .flat_map(|name| msg.headers.get_all(name));

        recipients
            .iter()
            .map(String::as_str)
            .chain(delivered)
            .filter_map(BounceTarget::parse)
            .find(|target| target.base.eq_ignore_ascii_case(&self.config.bounces_address))
    }

    async fn handle_bounce(&self, msg: &Message, target: &BounceTarget) {
        let Some((list, address)) = target.resolved() else {
            tracing::warn!(from = %msg.from, subject = %msg.subject, "UNKNOWN_BOUNCE");
            return;
        };

        match self.record_bounce(list, address).await {
            Ok(bounces) => {
                tracing::info!(list = %list, address = %address, bounces, "BOUNCE_HANDLED");
            }
            Err(err) => {
                tracing::warn!(list = %list, address = %address, error = %err, "BOUNCE_FAILED");
            }
        }
    }

    async fn record_bounce(&self, list: &str, address: &str) -> Result<u16> {
        let def = self
            .store
            .lookup_list(list)
            .await?
            .ok_or_else(|| Error::UnknownList(list.to_string()))?;
        let list = List::new(&def, self.store.as_ref());

        let subscription = list
            .is_subscribed(address)
            .await?
            .ok_or_else(|| Error::NotSubscribed {
                list: def.address.clone(),
                address: address.to_string(),
            })?;

        let (bounces, at) = bounce::record_bounce(&subscription, Utc::now());
        list.set_bounce(&subscription.address, bounces, at).await?;
        Ok(bounces)
    }

    /// Lists addressed by the message, each once, in header order.
    async fn addressed_lists(&self, recipients: &[String]) -> Result<Vec<Definition>> {
        let mut lists: Vec<Definition> = Vec::new();
        for recipient in recipients {
            if let Some(def) = self.store.lookup_list(recipient).await?
                && !lists.iter().any(|seen| seen.address == def.address)
            {
                lists.push(def);
            }
        }
        Ok(lists)
    }

    async fn handle_post(&self, msg: &Message, lists: &[Definition]) -> Result<()> {
        let sender = msg.sender()?.address.to_lowercase();
        let mut errors: BTreeMap<&str, Error> = BTreeMap::new();

        for def in lists {
            if let Err(err) = self.post(msg, &sender, List::new(def, self.store.as_ref())).await {
                errors.insert(&def.address, err);
            }
        }

        if errors.is_empty() {
            return Ok(());
        }
        let report = errors
            .values()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n");
        self.reply(msg, &report).await
    }

    async fn post(&self, msg: &Message, sender: &str, list: List<'_>) -> Result<()> {
        if !list.can_post(sender).await? {
            tracing::warn!(from = %sender, list = %list.address, "UNAUTHORISED_POST");
            return Err(Error::NotAuthorized(list.address.clone()));
        }

        let copy = msg.resend_as(&list.identity(&self.config.command_address));
        let bytes = copy.serialize();
        let now = Utc::now();

        let entry = ArchivedMessage::new(bytes.clone(), sender, &copy.subject, now);
        if let Err(err) = list.archive(&entry).await {
            tracing::error!(list = %list.address, id = %copy.message_id, error = %err, "ARCHIVAL_FAILED");
            return Err(err);
        }

        match delivery::send_to_list(
            self.transport.as_ref(),
            list,
            &bytes,
            &self.config.bounces_address,
            now,
        )
        .await
        {
            Ok(sent) => {
                tracing::info!(list = %list.address, id = %copy.message_id, from = %sender, subject = %copy.subject, sent, "MESSAGE_SENT");
                Ok(())
            }
            Err(err) => {
                tracing::error!(list = %list.address, id = %copy.message_id, from = %sender, error = %err, "MESSAGE_FAILED");
                Err(err)
            }
        }
    }

    /// Sends `text` back to the sender of `msg` from the command address.
    async fn reply(&self, msg: &Message, text: &str) -> Result<()> {
        let to = msg.sender()?.address;

        let mut reply = msg.reply();
        reply.from.clone_from(&self.config.command_address);
        reply.body = format!("{}\r\n", text.replace('\n', "\r\n")).into_bytes();

        self.transport
            .send(&self.config.command_address, &to, &reply.serialize())
            .await?;
        Ok(())
    }
}

impl std::fmt::Debug for Bot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bot")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
