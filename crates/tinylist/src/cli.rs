//! Command-line interface.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tinylist_core::bot::ListUpdate;

/// Mailing list exploder.
///
/// `tinylist message` is meant to be run by the MTA with one message on
/// stdin. The other subcommands administer the lists directly.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (default: first of ./tinylist.toml,
    /// /usr/local/etc/tinylist.toml, /etc/tinylist.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log outbound mail instead of sending it
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// What to do.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Check the configuration, log file and SMTP relay
    Check,
    /// Handle one message read from stdin
    Message,
    /// Show lists, or one list with its subscribers
    List {
        /// List address or local part
        list: Option<String>,
        /// Include hidden lists and show subscribers
        #[arg(short, long)]
        all: bool,
    },
    /// Create a list
    Create {
        /// List address
        list: String,
        #[command(flatten)]
        settings: Settings,
    },
    /// Change a list's settings
    Modify {
        /// List address or local part
        list: String,
        /// New list address
        #[arg(long)]
        rename: Option<String>,
        #[command(flatten)]
        settings: Settings,
        /// Clear every flag
        #[arg(long, conflicts_with = "flags")]
        no_flags: bool,
    },
    /// Delete a list and its subscriptions
    Delete {
        /// List address or local part
        list: String,
    },
    /// Subscribe an address to a list, ignoring the lock
    Subscribe {
        /// Subscriber address
        address: String,
        /// List address or local part
        list: String,
    },
    /// Unsubscribe an address from one list, or from every list
    Unsubscribe {
        /// Subscriber address
        address: String,
        /// List address or local part
        list: Option<String>,
    },
}

/// A list flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Flag {
    /// Left out of the public `lists` reply
    Hidden,
    /// Only admins may change membership
    Locked,
    /// Only subscribers may post
    SubscribersOnly,
}

/// Settings shared by `create` and `modify`.
#[derive(Args, Debug, Default)]
pub struct Settings {
    /// Display name
    #[arg(long)]
    pub name: Option<String>,
    /// Description
    #[arg(long)]
    pub description: Option<String>,
    /// Flag to set; repeat for several. On `modify`, replaces all flags
    #[arg(short, long = "flag", value_enum)]
    pub flags: Vec<Flag>,
    /// Allowed poster; repeat for several. Pass "" to clear
    #[arg(long = "poster")]
    pub posters: Vec<String>,
    /// Address copied on every post; repeat for several. Pass "" to clear
    #[arg(long)]
    pub bcc: Vec<String>,
}

fn addresses(values: &[String]) -> Option<Vec<String>> {
    if values.is_empty() {
        return None;
    }
    Some(
        values
            .iter()
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .collect(),
    )
}

impl Settings {
    /// The changes these settings ask for. Absent options leave the current
    /// value alone.
    #[must_use]
    pub fn to_update(&self, rename: Option<String>, no_flags: bool) -> ListUpdate {
        let flags = (no_flags || !self.flags.is_empty()).then_some(&self.flags);
        let flag = |wanted: Flag| flags.map(|flags| flags.contains(&wanted));

        ListUpdate {
            address: rename,
            name: self.name.clone(),
            description: self.description.clone(),
            hidden: flag(Flag::Hidden),
            locked: flag(Flag::Locked),
            subscribers_only: flag(Flag::SubscribersOnly),
            posters: addresses(&self.posters),
            bcc: addresses(&self.bcc),
        }
    }
}
