//! Command handlers for all CLI operations
//!
//! This module contains the implementation of all command handlers,
//! providing clean separation between CLI parsing and business logic.

use super::{CliContext, Commands, ConfigAction};

use anyhow::{Context, Result};
use live_toasts::config::ConfigManager;
use live_toasts::decoder::{self, DomainEvent};
use live_toasts::hub::NotificationHub;
use live_toasts::queue::{Mutation, QueueUpdate};
use std::io::{self, BufRead};
use std::path::PathBuf;
use tracing::{debug, error, info};

/// Coordinates all command handling operations with dependency injection via CliContext
pub struct CommandHandler {
    context: CliContext,
}

impl CommandHandler {
    pub fn new(context: CliContext) -> Self {
        Self { context }
    }

    /// Route commands to their appropriate handlers
    pub async fn handle_command(&self, command: Commands) -> Result<()> {
        match command {
            Commands::Watch { url, max_active } => self.handle_watch(url, max_active).await,
            Commands::Decode => self.handle_decode(),
            Commands::Config { action } => self.handle_config(action),
        }
    }

    /// Connect and print queue changes until Ctrl+C
    async fn handle_watch(&self, url: Option<String>, max_active: Option<usize>) -> Result<()> {
        let mut config = self.context.config_manager.config().clone();
        if let Some(url) = url {
            config.connection.url = url;
        }
        if let Some(max_active) = max_active {
            config.queue.max_active = max_active;
        }
        config.validate()?;

        let hub = NotificationHub::connect_from_config(&config)
            .await
            .with_context(|| format!("Failed to start watching {}", config.connection.url))?;

        let _subscription = hub.subscribe(|update: &QueueUpdate| println!("{}", format_update(update)));

        let mut states = hub.connection_changes();
        let state_task = tokio::spawn(async move {
            while states.changed().await.is_ok() {
                let state = *states.borrow_and_update();
                eprintln!("connection: {}", state);
            }
        });

        println!("Watching {} (Ctrl+C to stop)", config.connection.url);
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }

        info!("Received Ctrl+C signal, stopping");
        let stats = hub.connection_stats();
        hub.shutdown().await;
        state_task.abort();

        debug!("Connection stats: {:?}", stats);
        println!(
            "Stopped: {} connects, {} reconnect attempts, {} frames received",
            stats.connects, stats.reconnect_attempts, stats.frames_received
        );
        Ok(())
    }

    /// Decode stdin line by line; bad lines are reported, not fatal
    fn handle_decode(&self) -> Result<()> {
        let stdin = io::stdin();
        let mut failures = 0usize;

        for (index, line) in stdin.lock().lines().enumerate() {
            let line = line.context("Failed to read frame from stdin")?;
            if line.trim().is_empty() {
                continue;
            }

            match decoder::decode(line.as_bytes()) {
                Ok(event) => println!("{}", format_event(&event)),
                Err(e) => {
                    failures += 1;
                    let label = if e.is_ignorable() { "ignored" } else { "error" };
                    println!("line {}: {}: {}", index + 1, label, e);
                }
            }
        }

        if failures > 0 {
            debug!("{} frame(s) did not decode", failures);
        }
        Ok(())
    }

    /// Handle configuration management
    fn handle_config(&self, action: ConfigAction) -> Result<()> {
        match action {
            ConfigAction::Show => {
                let config = self.context.config_manager.config();
                println!("{}", toml::to_string_pretty(config)?);
            }
            ConfigAction::Path => {
                println!("{}", self.context.config_manager.config_path().display());
            }
            ConfigAction::Init { global, force } => self.handle_init(global, force)?,
        }
        Ok(())
    }

    fn handle_init(&self, global: bool, force: bool) -> Result<()> {
        let path = if global {
            None
        } else {
            Some(self.context.project_path.clone().unwrap_or_else(|| PathBuf::from(".")))
        };

        let config_path = ConfigManager::get_config_path(path.clone())?;
        if config_path.exists() {
            if !force {
                println!("Configuration already initialized at: {}", config_path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }
            std::fs::remove_file(&config_path)
                .with_context(|| format!("Failed to remove {}", config_path.display()))?;
        }

        let config_manager = match path {
            Some(project) => ConfigManager::new_project_config(project)?,
            None => ConfigManager::new(None)?,
        };
        config_manager.save()?;
        println!(
            "Configuration initialized successfully at: {}",
            config_manager.config_path().display()
        );
        Ok(())
    }
}

fn format_event(event: &DomainEvent) -> String {
    match event {
        DomainEvent::Notification(n) => {
            let ttl = n
                .ttl
                .map(|ttl| format!(" (ttl {}ms)", ttl.as_millis()))
                .unwrap_or_default();
            format!("notification [{}] {}: {}{}", n.kind, n.title, n.message, ttl)
        }
        DomainEvent::Heartbeat => "heartbeat".to_string(),
    }
}

fn format_update(update: &QueueUpdate) -> String {
    let notification = update.mutation.notification();
    let detail = match &update.mutation {
        Mutation::Inserted(n) => format!("[{}] {}: {}", n.kind, n.title, n.message),
        _ => notification.title.clone(),
    };
    format!(
        "{} {} {} {} (active: {})",
        notification.received_at.format("%H:%M:%S"),
        update.mutation.kind(),
        notification.id,
        detail,
        update.active.len()
    )
}
