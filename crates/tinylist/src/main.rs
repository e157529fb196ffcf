//! tinylist: a small mailing list exploder.
//!
//! The MTA pipes each message for the list domain into `tinylist message`.
//! Commands, bounces and posts are told apart by their recipients; see
//! [`tinylist_core::Bot`].

mod cli;
mod config;
mod logging;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::AsyncReadExt;

use tinylist_core::{
    Bot, Definition, ListStore, MySqlStore, SmtpTransport, SqliteStore, delivery,
};

use cli::{Cli, Command};
use config::{Config, DatabaseConfig, Driver};

async fn open_store(database: &DatabaseConfig) -> Result<Box<dyn ListStore>> {
    let store: Box<dyn ListStore> = match database.driver {
        Driver::Sqlite => Box::new(SqliteStore::new(&database.url).await?),
        Driver::Mysql => Box::new(MySqlStore::new(&database.url).await?),
    };
    Ok(store)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (mut config, path) = Config::load(cli.config.as_deref())?;
    if cli.debug {
        config.bot.debug = true;
    }

    logging::init(config.log.as_deref())?;
    tracing::debug!(config = %path.display(), debug = config.bot.debug, "Configuration loaded");

    let store = open_store(&config.database)
        .await
        .with_context(|| format!("Cannot open {:?} database", config.database.driver))?;
    let transport = delivery::from_config(&config.bot);
    let bot = Bot::new(config.bot.clone(), store, transport);

    run(&config, &bot, cli.command).await
}

async fn check(config: &Config) -> Result<()> {
    if let Some(log) = &config.log {
        logging::open_log_file(log)?;
        println!("Log file {} is writable", log.display());
    }
    println!("Database {} is reachable", config.database.url);

    if config.bot.debug {
        println!("Debug mode: outbound mail is logged, not sent");
        return Ok(());
    }

    let smtp = &config.bot.smtp;
    let info = SmtpTransport::new(smtp.clone())
        .check()
        .await
        .with_context(|| format!("SMTP check against {}:{} failed", smtp.host, smtp.port))?;
    println!(
        "SMTP server {} ({}:{}, {}) accepted the connection",
        info.hostname,
        smtp.host,
        smtp.port,
        smtp.security.display_name()
    );
    if let Some(size) = info.max_message_size() {
        println!("Maximum message size: {size} bytes");
    }
    Ok(())
}

async fn run(config: &Config, bot: &Bot, command: Command) -> Result<()> {
    match command {
        Command::Check => check(config).await?,
        Command::Message => {
            let mut raw = Vec::new();
            tokio::io::stdin()
                .read_to_end(&mut raw)
                .await
                .context("Failed to read message from stdin")?;
            if let Err(err) = bot.handle(&raw).await {
                tracing::error!(error = %err, "MESSAGE_HANDLING_FAILED");
                return Err(err.into());
            }
        }
        Command::List { list: Some(list), .. } => {
            let def = bot
                .lookup_list(&list)
                .await?
                .with_context(|| format!("No such list: {list}"))?;
            println!("{}", bot.describe_list(&def).await?);
        }
        Command::List { list: None, all } => {
            for def in bot.lists(all).await? {
                if all {
                    println!("{}\n", bot.describe_list(&def).await?);
                } else {
                    println!("{} <{}>: {}", def.name, def.address, def.description);
                }
            }
        }
        Command::Create { list, settings } => {
            let template = Definition::new(list.to_lowercase(), String::new());
            let mut def = settings.to_update(None, false).apply(&template);
            if def.name.is_empty() {
                def.name = def.local_part().to_string();
            }
            println!("{}", bot.create_list(def).await?);
        }
        Command::Modify {
            list,
            rename,
            settings,
            no_flags,
        } => {
            let update = settings.to_update(rename.map(|address| address.to_lowercase()), no_flags);
            println!("{}", bot.modify_list(&list, &update).await?);
        }
        Command::Delete { list } => {
            let def = bot.delete_list(&list).await?;
            println!("Deleted {}", def.address);
        }
        Command::Subscribe { address, list } => {
            let def = bot.subscribe(&address, &list, true).await?;
            println!("{address} is now subscribed to {}", def.address);
        }
        Command::Unsubscribe {
            address,
            list: Some(list),
        } => {
            let def = bot.unsubscribe(&address, &list, true).await?;
            println!("{address} is now unsubscribed from {}", def.address);
        }
        Command::Unsubscribe {
            address,
            list: None,
        } => {
            for def in bot.unsubscribe_all(&address, true).await? {
                println!("{address} is now unsubscribed from {}", def.address);
            }
        }
    }
    Ok(())
}
