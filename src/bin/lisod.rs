use std::env;
use std::process::exit;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use liso::config::Config;
use liso::error::Result;
use liso::server::Server;
use signal_hook::consts::{SIGINT, SIGTERM};

fn usage() {
    eprintln!(
        "Usage: lisod <HTTP port> <HTTPS port> <log file> <lock file> <www folder> \
         <CGI script path> <private key file> <certificate file>"
    );
    eprintln!("  HTTP port - the port for the HTTP server to listen on");
    eprintln!("  HTTPS port - the port for the HTTPS server to listen on");
    eprintln!("  log file - file to send log messages to (debug, info, error)");
    eprintln!("  lock file - file recording the pid of the running server");
    eprintln!("  www folder - folder served as the root of the website");
    eprintln!("  CGI script path - executable receiving all /cgi/* URIs");
    eprintln!("  private key file - PEM private key path");
    eprintln!("  certificate file - PEM certificate chain path");
}

fn main() -> Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let config = match Config::from_args(&args) {
        Ok(config) => config,
        Err(_) => {
            usage();
            exit(1);
        }
    };

    liso_log::set_log_file(&config.log_file)?;
    config.validate()?;
    config.display_config();

    std::fs::write(&config.lock_file, format!("{}\n", std::process::id()))?;

    let terminate = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(SIGTERM, Arc::clone(&terminate))?;
    signal_hook::flag::register(SIGINT, Arc::clone(&terminate))?;

    let mut server = Server::new(config, terminate)?;
    server.run()
}
