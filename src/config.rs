use crate::error::Result;
use liso_log::info;
use std::path::PathBuf;

/// Everything the server is told from the outside, in the order it appears
/// on the command line:
///
/// `lisod <HTTP port> <HTTPS port> <log file> <lock file> <www folder>
///        <CGI script path> <private key file> <certificate file>`
#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub https_port: u16,
    pub log_file: PathBuf,
    pub lock_file: PathBuf,
    pub www_folder: PathBuf,
    pub cgi_path: PathBuf,
    pub private_key_file: PathBuf,
    pub certificate_file: PathBuf,
}

impl Config {
    pub fn from_args(args: &[String]) -> Result<Self> {
        if args.len() < 8 {
            return Err("expected 8 arguments".into());
        }

        Ok(Config {
            http_port: args[0].parse()?,
            https_port: args[1].parse()?,
            log_file: PathBuf::from(&args[2]),
            lock_file: PathBuf::from(&args[3]),
            www_folder: PathBuf::from(&args[4]),
            cgi_path: PathBuf::from(&args[5]),
            private_key_file: PathBuf::from(&args[6]),
            certificate_file: PathBuf::from(&args[7]),
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.http_port == 0 || self.https_port == 0 {
            return Err("ports must be nonzero".into());
        }
        if self.http_port == self.https_port {
            return Err("HTTP and HTTPS ports must differ".into());
        }
        if !self.www_folder.is_dir() {
            return Err(format!("www folder {} is not a directory", self.www_folder.display()).into());
        }
        if !self.private_key_file.is_file() {
            return Err(format!(
                "private key file {} not found",
                self.private_key_file.display()
            )
            .into());
        }
        if !self.certificate_file.is_file() {
            return Err(format!(
                "certificate file {} not found",
                self.certificate_file.display()
            )
            .into());
        }
        Ok(())
    }

    pub fn display_config(&self) {
        info!("http port:   {}", self.http_port);
        info!("https port:  {}", self.https_port);
        info!("www folder:  {}", self.www_folder.display());
        info!("cgi script:  {}", self.cgi_path.display());
        info!("private key: {}", self.private_key_file.display());
        info!("certificate: {}", self.certificate_file.display());
    }
}
