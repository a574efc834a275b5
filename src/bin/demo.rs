//! A minimal CLI that loads a runtime configuration, resolves one
//! hostname through it, and prints the metrics report — exercising the
//! wiring in `driver::Runtime` the way the teacher's `main.rs` drives
//! `linkerd_tcp::app`.

#[macro_use]
extern crate clap;
#[macro_use]
extern crate log;
extern crate pretty_env_logger;
extern crate armeria_client;

use std::fs;
use std::io::Read;

use clap::{App, Arg};

use armeria_client::config;
use armeria_client::driver::Runtime;
use armeria_client::error::Result;
use armeria_client::pool::{ConnectionKey, Dialer};

struct LoggingDialer;

impl Dialer for LoggingDialer {
    fn dial(&self, key: &ConnectionKey) -> Result<()> {
        debug!("dialing {:?}", key);
        Ok(())
    }
}

static CONFIG_PATH_ARG: &'static str = "PATH";
static HOST_ARG: &'static str = "HOST";

fn mk_app() -> App<'static, 'static> {
    App::new(crate_name!())
        .version(crate_version!())
        .about(crate_description!())
        .arg(Arg::with_name(CONFIG_PATH_ARG).required(true).index(1).help("Config file path."))
        .arg(Arg::with_name(HOST_ARG).required(true).index(2).help("Hostname to resolve."))
}

fn main() {
    drop(pretty_env_logger::init());

    let opts = mk_app().get_matches();
    let config_path = opts.value_of(CONFIG_PATH_ARG).unwrap();
    let host = opts.value_of(HOST_ARG).unwrap().to_string();

    let config_str = {
        let mut s = String::new();
        fs::File::open(config_path)
            .and_then(|mut f| f.read_to_string(&mut s))
            .expect("could not read config file");
        s
    };

    let runtime_config = config::from_str(&config_str).expect("configuration error");
    let mut runtime = Runtime::new(runtime_config, LoggingDialer).expect("could not start runtime");

    let lookup = runtime.resolver().resolve(&host, 80);
    let resolved = runtime.run(lookup);
    match resolved {
        Ok(addr) => info!("{} resolved to {}", host, addr),
        Err(e) => error!("failed to resolve {}: {}", host, e),
    }

    let report = runtime.report();
    info!("{:?}", report);
}
