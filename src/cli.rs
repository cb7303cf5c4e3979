/*
 * Copyright 2023 Google LLC
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

mod crds;
mod manage;

use std::path::{Path, PathBuf};

use crate::config::Settings;

pub use self::{crds::Crds, manage::Manage};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const ETC_CONFIG_PATH: &str = "/etc/portcullis/portcullis.yaml";

/// The Command-Line Interface for Portcullis.
#[derive(clap::Parser)]
#[command(version, about)]
#[non_exhaustive]
pub struct Cli {
    /// The path to the configuration file.
    #[clap(short, long, env = "PORTCULLIS_CONFIG", default_value = "portcullis.yaml")]
    pub config: PathBuf,
    /// The address to bind the admin server to.
    #[clap(long, env = "PORTCULLIS_ADMIN_ADDRESS")]
    pub admin_address: Option<std::net::SocketAddr>,
    /// Whether Portcullis will report any results to stdout/stderr.
    #[clap(short, long, env)]
    pub quiet: bool,
    #[clap(subcommand)]
    pub command: Commands,
}

/// The various Portcullis commands.
#[derive(Clone, clap::Subcommand)]
pub enum Commands {
    Manage(Manage),
    Crds(Crds),
}

impl Cli {
    /// Drives the application lifecycle using the command line arguments.
    #[tracing::instrument(skip_all)]
    pub async fn drive(self) -> crate::Result<()> {
        let version: std::borrow::Cow<'static, str> = if cfg!(debug_assertions) {
            format!("{VERSION}+debug").into()
        } else {
            VERSION.into()
        };

        if !self.quiet {
            let env_filter = tracing_subscriber::EnvFilter::builder()
                .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
                .from_env_lossy();
            tracing_subscriber::fmt()
                .json()
                .with_file(true)
                .with_env_filter(env_filter)
                .init();
        }

        tracing::info!(version = &*version, "starting portcullis");

        match self.command {
            Commands::Crds(crds) => crds.print(),
            Commands::Manage(manager) => {
                let mut settings = Self::read_config(&self.config)?;
                if let Some(address) = self.admin_address {
                    settings.admin.address = address;
                }
                settings.validate()?;
                manager.manage(settings).await
            }
        }
    }

    /// Reads the settings at `path`, falling back to the `/etc` path and then
    /// to defaults when neither exists.
    fn read_config(path: &Path) -> crate::Result<Settings> {
        let from_reader = |file| Settings::from_reader(file).map_err(From::from);

        match std::fs::File::open(path) {
            Ok(file) => (from_reader)(file),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path=%path.display(), "provided path not found");
                match cfg!(unix).then(|| std::fs::File::open(ETC_CONFIG_PATH)) {
                    Some(Ok(file)) => (from_reader)(file),
                    Some(Err(error)) if error.kind() == std::io::ErrorKind::NotFound => {
                        tracing::debug!(path = ETC_CONFIG_PATH, "/etc path not found");
                        Ok(Settings::default())
                    }
                    Some(Err(error)) => Err(error.into()),
                    None => Ok(Settings::default()),
                }
            }
            Err(error) => Err(error.into()),
        }
    }
}
