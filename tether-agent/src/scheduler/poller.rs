//! Command poller
//!
//! Polls the control plane for lifecycle commands and dispatches them to the
//! lifecycle service one at a time, in delivery order.

use anyhow::Result;
use std::sync::Arc;
use tokio::time::{self, Duration};
use tracing::{debug, error, info, warn};

use tether_core::dto::command::{CommandAck, CommandAction, LifecycleCommand};

use crate::repository::CommandRepository;
use crate::service::{LifecycleError, LifecycleService, Outcome};

/// Command poller that continuously fetches and handles commands
pub struct CommandPoller {
    poll_interval: Duration,
    commands: Arc<dyn CommandRepository>,
    lifecycle: Arc<dyn LifecycleService>,
}

impl CommandPoller {
    pub fn new(
        poll_interval: Duration,
        commands: Arc<dyn CommandRepository>,
        lifecycle: Arc<dyn LifecycleService>,
    ) -> Self {
        Self {
            poll_interval,
            commands,
            lifecycle,
        }
    }

    /// Starts the polling loop
    pub async fn run(&self) -> Result<()> {
        info!(
            "Starting command poller (interval: {:?})",
            self.poll_interval
        );

        let mut interval = time::interval(self.poll_interval);

        loop {
            interval.tick().await;

            debug!("Polling for lifecycle commands");

            match self.poll_once().await {
                Ok(handled) if handled > 0 => info!("Handled {} command(s) this cycle", handled),
                Ok(_) => {}
                Err(e) => error!("Error during poll cycle: {:#}", e),
            }
        }
    }

    /// Performs a single poll cycle
    ///
    /// # Returns
    /// Number of commands handled
    pub async fn poll_once(&self) -> Result<usize> {
        let commands = self.commands.fetch_pending().await?;

        if commands.is_empty() {
            debug!("No commands pending");
            return Ok(0);
        }

        info!("Found {} command(s) to handle", commands.len());

        for command in &commands {
            let ack = self.handle_command(command).await;
            if let Err(e) = self.commands.acknowledge(ack).await {
                // The command will be re-delivered; handling it again is a no-op
                warn!("{:#}", e);
            }
        }

        Ok(commands.len())
    }

    /// Runs one command to completion and builds its acknowledgement
    pub async fn handle_command(&self, command: &LifecycleCommand) -> CommandAck {
        let application = command.action.application();
        info!(
            "Handling {} command {} for {}",
            command.action.name(),
            command.id,
            application
        );

        let result = match &command.action {
            CommandAction::Deploy { manifest } => self.lifecycle.deploy(manifest).await,
            CommandAction::Stop { application } => self.lifecycle.stop(application).await,
            CommandAction::Resume { application } => self.lifecycle.resume(application).await,
            CommandAction::Undeploy { application } => self.lifecycle.undeploy(application).await,
            CommandAction::Remove { application } => self.lifecycle.remove(application).await,
        };

        ack_for(command, result)
    }
}

fn ack_for(command: &LifecycleCommand, result: Result<Outcome, LifecycleError>) -> CommandAck {
    let (success, message) = match result {
        Ok(Outcome::Applied) => (true, None),
        Ok(Outcome::Skipped(reason)) => (true, Some(reason.to_string())),
        Err(e) => {
            error!(
                "{} command {} failed: {}",
                command.action.name(),
                command.id,
                e
            );
            (false, Some(e.to_string()))
        }
    };

    CommandAck {
        command_id: command.id,
        success,
        message,
    }
}
