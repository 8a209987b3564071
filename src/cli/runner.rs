//! Runner: turns parsed arguments into one install or tag-listing run

use crate::cli::args::Args;
use crate::error::{RegistryError, Result};
use crate::image::{ImageManager, InstallOutcome};
use crate::logging::Logger;

pub struct Runner {
    args: Args,
    output: Logger,
}

impl Runner {
    pub fn new(args: Args) -> Self {
        let output = Logger::new(args.debug);
        Self { args, output }
    }

    pub async fn run(&self) -> Result<()> {
        self.args.validate()?;
        let reference = self.args.reference()?;

        let client_config = self.args.client_config();
        client_config.validate()?;
        let manager = ImageManager::new(client_config, self.args.pull_config(), self.output.clone());

        if self.args.tags {
            for tag in manager.list_tags(&reference).await? {
                println!("{}", tag);
            }
            return Ok(());
        }

        match manager.install(&reference).await? {
            InstallOutcome::Printed(body) => println!("{}", body),
            InstallOutcome::Archived(path) => {
                self.output
                    .info(&format!("Load it with: docker load -i {}", path.display()));
            }
        }
        Ok(())
    }

    /// Log a failed run; informational failures are warnings
    pub fn report(&self, error: &RegistryError) {
        if error.is_informational() {
            self.output.warning(&error.to_string());
        } else {
            self.output.error(&error.to_string());
        }
    }
}
