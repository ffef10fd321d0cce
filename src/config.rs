use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Full-mesh video call signaling server
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:3000", env = "MESHCALL_BIND")]
    pub bind: SocketAddr,

    /// Port override for hosts that only hand out `PORT`
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Directory of static assets served at `/`
    #[arg(long, default_value = "public", env = "MESHCALL_STATIC_DIR")]
    pub static_dir: PathBuf,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info", env = "MESHCALL_LOG")]
    pub log: String,

    /// Send `peer-unavailable` back when a relayed message has no live target
    #[arg(long, env = "MESHCALL_NOTIFY_UNREACHABLE")]
    pub notify_unreachable: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 3000)),
            port: None,
            static_dir: PathBuf::from("public"),
            log: "info".to_string(),
            notify_unreachable: false,
        }
    }
}

impl Config {
    /// Address the server actually listens on: `bind`, with its port
    /// replaced by `port` when one is given.
    pub fn listen_addr(&self) -> SocketAddr {
        let mut addr = self.bind;
        if let Some(port) = self.port {
            addr.set_port(port);
        }
        addr
    }
}
