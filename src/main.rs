use argh::FromArgs;
use std::net;
use std::path::PathBuf;

use lightsync_common::network::Network;

mod node;

#[derive(FromArgs)]
/// A Bitcoin light client.
pub struct Options {
    #[argh(option)]
    /// peer addresses to connect to, instead of DNS seeds
    pub connect: Vec<net::SocketAddr>,

    #[argh(switch)]
    /// use the bitcoin test network (default: false)
    pub testnet: bool,

    #[argh(switch)]
    /// use the bitcoin regtest network (default: false)
    pub regtest: bool,

    #[argh(option, default = "lightsync_p2p::group::TARGET_PEER_COUNT")]
    /// number of peers to keep connected (default: 8)
    pub peers: usize,

    #[argh(option)]
    /// file to load known peer addresses from, and save them to
    pub addresses: Option<PathBuf>,

    #[argh(option, default = "log::LevelFilter::Info")]
    /// log level (default: info)
    pub log: log::LevelFilter,
}

impl Options {
    pub fn from_env() -> Self {
        argh::from_env()
    }

    pub fn network(&self) -> Network {
        if self.regtest {
            Network::Regtest
        } else if self.testnet {
            Network::Testnet
        } else {
            Network::Mainnet
        }
    }
}

fn main() {
    let opts = Options::from_env();

    {
        use atty::Stream;
        use fern::colors::{Color, ColoredLevelConfig};

        let colors = ColoredLevelConfig::new().info(Color::Green);
        let stream = Stream::Stderr;
        let io = std::io::stderr();
        let isatty = atty::is(stream);

        let result = fern::Dispatch::new()
            .format(move |out, message, record| {
                if isatty {
                    out.finish(format_args!(
                        "{:5} [{}] {}",
                        colors.color(record.level()),
                        record.target(),
                        message
                    ))
                } else {
                    out.finish(format_args!(
                        "{:5} [{}] {}",
                        record.level(),
                        record.target(),
                        message
                    ))
                }
            })
            .level(opts.log)
            .chain(io)
            .apply();

        if let Err(err) = result {
            eprintln!("error: failed to initialize logger: {}", err);
        }
    }

    let cfg = node::Config {
        network: opts.network(),
        connect: opts.connect.clone(),
        target_peer_count: opts.peers,
        addresses: opts.addresses.clone(),
    };

    if let Err(err) = node::run(cfg) {
        log::error!("{}", err);
        std::process::exit(1);
    }
}
