//! CLI command implementations.

pub mod goal;

use anyhow::Result;
use dockit_core::BuildOptions;
use std::path::Path;

pub fn validate(path: &str) -> Result<()> {
    match dockit_config::load_config(Path::new(path)) {
        Ok(config) => {
            let options = BuildOptions::default().merge(config.build);
            println!("Configuration is valid");
            println!("  builder: {} ({})", options.builder, options.builder_path());
            match options.push {
                Some(push) => println!("  push: {}", push),
                None => println!("  push: default"),
            }
            for registry in &options.registries {
                let host = if registry.host.is_empty() {
                    "docker.io"
                } else {
                    registry.host.as_str()
                };
                let login = if registry.has_login() {
                    "with login"
                } else {
                    "no login"
                };
                println!("  registry: {} ({})", host, login);
            }
            if let Some(orchestrator) = &config.orchestrator {
                println!("  orchestrator: {}", orchestrator.graphql_url);
            }
            Ok(())
        }
        Err(e) => {
            println!("Configuration error: {}", e);
            std::process::exit(1);
        }
    }
}
