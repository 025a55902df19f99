use std::net::SocketAddr;

use clap::Parser;

use crate::config::{DEFAULT_LISTEN, HubConfig};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Socket address to serve the hub on. Use port 0 for an ephemeral port.
    #[arg(long, default_value = DEFAULT_LISTEN)]
    pub listen: SocketAddr,

    /// Messages buffered per client before it is dropped as unresponsive.
    #[arg(long, default_value_t = HubConfig::default().queue_capacity)]
    pub queue_capacity: usize,

    /// Events buffered in front of the hub's control loop.
    #[arg(long, default_value_t = HubConfig::default().event_capacity)]
    pub event_capacity: usize,

    /// Also deliver each message back to the client that sent it.
    #[arg(long)]
    pub echo: bool,
}

impl Cli {
    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            queue_capacity: self.queue_capacity,
            event_capacity: self.event_capacity,
            echo_to_sender: self.echo,
        }
    }
}
