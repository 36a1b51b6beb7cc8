//! Single uniform entry point for all four roles:
//! `paxos-node -r {client|proposer|acceptor|learner} -p <pid> [-d]
//! [-b <batch_size>]`, dispatching on `--role` instead of shipping
//! four separate per-role launchers.

use std::io;
use std::process::ExitCode;

use clap::Parser;
use log::error;

use paxos_broadcast::acceptor::Acceptor;
use paxos_broadcast::client::Client;
use paxos_broadcast::cli::{Cli, Role};
use paxos_broadcast::config::{default_config_path, load_config};
use paxos_broadcast::learner::{stdout_sink, Learner};
use paxos_broadcast::proposer::Proposer;
use paxos_broadcast::transport::UdpMulticastTransport;

fn init_logging(debug: bool) {
    let level = if debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let config = match load_config(&config_path) {
        Ok(c) => c,
        Err(e) => {
            error!("fatal: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let logs_dir = config_path
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| std::path::PathBuf::from("logs"));

    // Every role exits 0 on SIGINT, including the client while it's
    // still blocked waiting on stdin.
    let _ = ctrlc::set_handler(move || std::process::exit(0));

    let own_group = match cli.role {
        Role::Client if cli.measure => config.learners,
        Role::Client => config.clients,
        Role::Proposer => config.proposers,
        Role::Acceptor => config.acceptors,
        Role::Learner => config.learners,
    };

    let transport = match UdpMulticastTransport::new(own_group) {
        Ok(t) => t,
        Err(e) => {
            error!("fatal: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match cli.role {
        Role::Client => {
            let mut client = Client::new(cli.pid, transport, &config);
            if cli.measure {
                client = client.with_latency_measurement(&logs_dir);
            }
            let stdin = io::stdin();
            client.run(stdin.lock());
        }
        Role::Proposer => {
            Proposer::new(cli.pid, transport, &config, cli.batch_size).run();
        }
        Role::Acceptor => {
            Acceptor::new(cli.pid, transport, &config).run();
        }
        Role::Learner => {
            Learner::new(cli.pid, transport, &config, stdout_sink()).run();
        }
    }

    ExitCode::SUCCESS
}
