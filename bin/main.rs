use tracing::info;
use tracing_subscriber::EnvFilter;

use clap::{App, Arg};

use zfx_snow::server::{node, Settings};
use zfx_snow::Result;

fn main() -> Result<()> {
    let matches = App::new("zfx-snow")
        .version("0.1")
        .author("zero.fx labs ltd.")
        .about("Runs a Snowman consensus node")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("CONFIG_FILE")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("listener-ip")
                .short("a")
                .long("listener-ip")
                .value_name("LISTENER_IP")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("bootstrap-ip")
                .short("b")
                .long("bootstrap-ip")
                .value_name("BOOTSTRAP_IP")
                .multiple(true),
        )
        .arg(
            Arg::with_name("keypair")
                .short("k")
                .long("keypair")
                .value_name("KEYPAIR_FILE")
                .takes_value(true)
                .required(false),
        )
        .get_matches();

    let mut settings = match Settings::load(matches.value_of("config")) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("invalid settings: {}", err);
            std::process::exit(1);
        }
    };
    if let Some(listener_ip) = matches.value_of("listener-ip") {
        settings.listener_ip = listener_ip.to_owned();
    }
    if let Some(bootstrap_ips) = matches.values_of("bootstrap-ip") {
        settings.bootstrap_peers = bootstrap_ips.map(str::to_owned).collect();
    }
    if let Some(keypair) = matches.value_of("keypair") {
        settings.keypair_file = Some(keypair.to_owned());
    }

    tracing_subscriber::fmt()
        .with_level(false)
        .with_target(false)
        .without_time()
        .compact()
        .with_env_filter(EnvFilter::new(&settings.log_level))
        .init();

    let sys = actix::System::new();
    let result = sys.block_on(async move {
        let node = node::run(settings).await?;

        let sig = if cfg!(unix) {
            use futures::future::FutureExt;
            use tokio::signal::unix::{signal, SignalKind};

            let mut sigint = signal(SignalKind::interrupt())?;
            let mut sigterm = signal(SignalKind::terminate())?;

            futures::select! {
                _ = sigint.recv().fuse() => "SIGINT",
                _ = sigterm.recv().fuse() => "SIGTERM"
            }
        } else {
            tokio::signal::ctrl_c().await?;
            "Ctrl+C"
        };
        info!("Got {}, stopping...", sig);

        let result = node.shutdown().await;
        actix::System::current().stop();
        result
    });
    sys.run()?;
    result
}
