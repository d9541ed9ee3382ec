//! Config subcommand handlers.

use std::path::Path;

use batchview_config::{self as config, Config};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

pub fn handle(args: ConfigArgs, global: &GlobalOpts, path: &Path) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            output::print_output(&path.display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::Show => {
            let cfg = config::load_config_from(path)?;
            let text = toml::to_string_pretty(&cfg).map_err(config::ConfigError::from)?;
            let format = global.output.unwrap_or(OutputFormat::Table);
            let out = output::render_single(format, &cfg, |_| text.clone(), |_| text.clone())?;
            output::print_output(out.trim_end(), global.quiet);
            Ok(())
        }

        ConfigCommand::Init {
            with_fixture,
            force,
        } => {
            if path.exists() && !force {
                return Err(CliError::Validation {
                    field: "config".into(),
                    reason: format!(
                        "{} already exists; pass --force to overwrite it",
                        path.display()
                    ),
                });
            }
            let cfg = Config {
                fixture: with_fixture,
                ..Config::default()
            };
            config::save_config_to(&cfg, path)?;
            if !global.quiet {
                eprintln!("Config written to {}", path.display());
            }
            Ok(())
        }
    }
}
